use serde::{Deserialize, Serialize};

pub(super) const STATE_SUCCESSFUL: &str = "Successful";
pub(super) const STATE_UNKNOWN: &str = "Unknown";
pub(super) const LIFECYCLE_IN_PROGRESS: &str = "InProgress";

/// Raw build result as returned by `GET /rest/api/latest/result/{plan}/{number}`.
///
/// Every field is optional: the error document Bamboo returns for a missing
/// build shares none of them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BambooResult {
    pub state: Option<String>,
    pub build_number: Option<u64>,
    pub build_started_time: Option<String>,
    pub build_completed_time: Option<String>,
    pub build_relative_time: Option<String>,
    pub pretty_build_started_time: Option<String>,
    pub life_cycle_state: Option<String>,
    pub progress: Option<BambooProgress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BambooProgress {
    pub percentage_completed_pretty: Option<String>,
    pub pretty_time_remaining: Option<String>,
    pub started_time_formatted: Option<String>,
    pub pretty_started_time: Option<String>,
}

/// One CI run of an environment's deployment plan.
///
/// Built fresh for every query and never updated afterwards. A build whose
/// `state` is `None` stands for "no such build".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Build {
    /// Raw status from the CI server ("Successful", "Failed", "Unknown", ...)
    pub state: Option<String>,
    /// Build number, increasing within one plan
    pub number: Option<u64>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Human phrase such as "2 hours ago"
    pub relative_completion_text: Option<String>,
    /// Raw lifecycle phase ("InProgress", "Finished", ...)
    pub lifecycle_state: Option<String>,
    pub progress_percent_text: Option<String>,
    pub time_remaining_text: Option<String>,
    pub started_at_text: Option<String>,
}

impl Build {
    /// The record standing for a build number the CI server does not know.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_successful(&self) -> bool {
        self.state.as_deref() == Some(STATE_SUCCESSFUL)
    }

    /// Accepted by the CI server and actually started, but not finished.
    pub fn is_in_progress(&self) -> bool {
        self.state.as_deref() == Some(STATE_UNKNOWN)
            && self.lifecycle_state.as_deref() == Some(LIFECYCLE_IN_PROGRESS)
    }
}

impl From<BambooResult> for Build {
    fn from(result: BambooResult) -> Self {
        let progress = result.progress.unwrap_or_default();
        Self {
            state: result.state,
            number: result.build_number,
            started_at: result.build_started_time.or(progress.started_time_formatted),
            completed_at: result.build_completed_time,
            relative_completion_text: result.build_relative_time,
            lifecycle_state: result.life_cycle_state,
            progress_percent_text: progress.percentage_completed_pretty,
            time_remaining_text: progress.pretty_time_remaining,
            started_at_text: progress
                .pretty_started_time
                .or(result.pretty_build_started_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_finished_build() {
        let body = r#"{
            "planName": "IBank Deploy",
            "buildResultKey": "DEPL-IBD2-1527",
            "lifeCycleState": "Finished",
            "buildStartedTime": "2017-01-02T00:00:04.000+03:00",
            "prettyBuildStartedTime": "Mon, 2 Jan, 12:00 AM",
            "buildCompletedTime": "2017-01-02T00:21:30.000+03:00",
            "buildRelativeTime": "2 hours ago",
            "state": "Successful",
            "buildState": "Successful",
            "number": 1527,
            "buildNumber": 1527
        }"#;
        let build: Build = serde_json::from_str::<BambooResult>(body).unwrap().into();

        assert_eq!(build.state.as_deref(), Some("Successful"));
        assert_eq!(build.number, Some(1527));
        assert_eq!(build.relative_completion_text.as_deref(), Some("2 hours ago"));
        assert_eq!(build.started_at_text.as_deref(), Some("Mon, 2 Jan, 12:00 AM"));
        assert!(build.is_successful());
        assert!(!build.is_in_progress());
    }

    #[test]
    fn decodes_running_build_progress() {
        let body = r#"{
            "lifeCycleState": "InProgress",
            "state": "Unknown",
            "buildNumber": 1528,
            "progress": {
                "percentageCompletedPretty": "40%",
                "prettyTimeRemaining": "12 minutes remaining",
                "startedTimeFormatted": "02 Jan 2017, 00:00:03",
                "prettyStartedTime": "9 minutes ago"
            }
        }"#;
        let build: Build = serde_json::from_str::<BambooResult>(body).unwrap().into();

        assert!(build.is_in_progress());
        assert_eq!(build.progress_percent_text.as_deref(), Some("40%"));
        assert_eq!(build.time_remaining_text.as_deref(), Some("12 minutes remaining"));
        assert_eq!(build.started_at.as_deref(), Some("02 Jan 2017, 00:00:03"));
        assert_eq!(build.started_at_text.as_deref(), Some("9 minutes ago"));
    }

    #[test]
    fn unknown_state_without_lifecycle_is_not_in_progress() {
        let build = Build {
            state: Some("Unknown".to_string()),
            lifecycle_state: Some("NotBuilt".to_string()),
            ..Build::default()
        };
        assert!(!build.is_in_progress());
    }

    #[test]
    fn error_document_decodes_as_absent_build() {
        let body = r#"{"message":"Result DEPL-IBD2-1528 not found","status-code":404}"#;
        let build: Build = serde_json::from_str::<BambooResult>(body).unwrap().into();
        assert_eq!(build, Build::absent());
    }
}
