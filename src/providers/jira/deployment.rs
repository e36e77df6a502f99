use chrono::{DateTime, FixedOffset, Utc};
use log::debug;
use std::sync::Arc;

use crate::config::JiraConfig;
use crate::error::Result;
use crate::providers::bamboo::{EnvironmentTable, NextRun};

use super::client::JiraClient;
use super::types::{FullIssue, Issue};

const STATUS_FIELD: &str = "status";

/// Tracker conventions the deployment rules depend on.
#[derive(Debug, Clone)]
pub struct DeploymentRules {
    pub release_project: String,
    pub done_status_category: u32,
    pub done_resolution_id: u32,
    pub ready_status: String,
    pub deploy_environment: String,
}

impl From<&JiraConfig> for DeploymentRules {
    fn from(config: &JiraConfig) -> Self {
        Self {
            release_project: config.release_project.clone(),
            done_status_category: config.done_status_category,
            done_resolution_id: config.done_resolution_id,
            ready_status: config.ready_status.clone(),
            deploy_environment: config.deploy_environment.clone(),
        }
    }
}

/// Everything known about an issue's deployment after one hydration of its
/// release issue.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentStatus {
    pub release: Option<FullIssue>,
    pub deployed: bool,
    pub deployed_at: Option<DateTime<FixedOffset>>,
    pub next_deployment: Option<NextRun>,
}

/// Latest time the issue's status field changed, if it ever did.
pub fn last_transition_date(issue: &FullIssue) -> Option<DateTime<FixedOffset>> {
    issue
        .changelog
        .iter()
        .filter(|entry| entry.field == STATUS_FIELD)
        .map(|entry| entry.changed_at)
        .max()
}

/// Decides whether and when an issue shipped by following its links to the
/// release issue that represents the deployment.
pub struct DeploymentResolver {
    client: Arc<JiraClient>,
    environments: Arc<EnvironmentTable>,
    rules: DeploymentRules,
}

impl DeploymentResolver {
    pub fn new(
        client: Arc<JiraClient>,
        environments: Arc<EnvironmentTable>,
        rules: DeploymentRules,
    ) -> Self {
        Self {
            client,
            environments,
            rules,
        }
    }

    pub fn is_release(&self, issue: &FullIssue) -> bool {
        issue.key.project() == self.rules.release_project
    }

    /// The most recent release issue among `issue`'s links, by key number.
    pub fn latest_release_link<'a>(&self, issue: &'a FullIssue) -> Option<&'a Issue> {
        issue
            .links
            .iter()
            .filter(|link| link.key().project() == self.rules.release_project)
            .max_by(|a, b| a.key().cmp_recency(b.key()))
    }

    /// The release issue that decides `issue`'s deployment: the issue itself
    /// for a release issue, else its most recent linked release issue,
    /// hydrated.
    pub async fn last_release_issue(&self, issue: &FullIssue) -> Result<Option<FullIssue>> {
        if self.is_release(issue) {
            return Ok(Some(issue.clone()));
        }
        match self.latest_release_link(issue) {
            Some(link) => {
                debug!("{} is released through {}", issue.key, link.key());
                Ok(Some(self.client.ensure_hydrated(link).await?))
            }
            None => Ok(None),
        }
    }

    fn release_is_deployed(&self, release: &FullIssue) -> bool {
        release.status_category_id == Some(self.rules.done_status_category)
            && release.resolution_id == Some(self.rules.done_resolution_id)
    }

    fn release_deployment_date(&self, release: &FullIssue) -> Option<DateTime<FixedOffset>> {
        if self.release_is_deployed(release) {
            release.resolution_date
        } else {
            None
        }
    }

    /// Next run of the deployment environment in the release's selected
    /// window. Only defined while the release waits in the ready state.
    fn release_next_deployment(
        &self,
        release: &FullIssue,
        now: DateTime<Utc>,
    ) -> Result<Option<NextRun>> {
        if release.status_name != self.rules.ready_status {
            return Ok(None);
        }
        let Some(window) = release.scheduled_deploy_window.as_deref() else {
            return Ok(None);
        };
        self.environments
            .predict_next_named_run(&self.rules.deploy_environment, window, now)
    }

    pub async fn is_deployed(&self, issue: &FullIssue) -> Result<bool> {
        Ok(self
            .last_release_issue(issue)
            .await?
            .is_some_and(|release| self.release_is_deployed(&release)))
    }

    pub async fn deployment_date(&self, issue: &FullIssue) -> Result<Option<DateTime<FixedOffset>>> {
        Ok(self
            .last_release_issue(issue)
            .await?
            .and_then(|release| self.release_deployment_date(&release)))
    }

    pub async fn time_to_next_deployment(
        &self,
        issue: &FullIssue,
        now: DateTime<Utc>,
    ) -> Result<Option<NextRun>> {
        match self.last_release_issue(issue).await? {
            Some(release) => self.release_next_deployment(&release, now),
            None => Ok(None),
        }
    }

    /// All deployment facts at once, hydrating the release issue a single time.
    pub async fn assess(&self, issue: &FullIssue, now: DateTime<Utc>) -> Result<DeploymentStatus> {
        let Some(release) = self.last_release_issue(issue).await? else {
            return Ok(DeploymentStatus {
                release: None,
                deployed: false,
                deployed_at: None,
                next_deployment: None,
            });
        };

        Ok(DeploymentStatus {
            deployed: self.release_is_deployed(&release),
            deployed_at: self.release_deployment_date(&release),
            next_deployment: self.release_next_deployment(&release, now)?,
            release: Some(release),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::providers::jira::{ChangelogEntry, IssueKey};
    use chrono::{Duration, NaiveTime, TimeZone};
    use mockito::Matcher;

    fn timestamp(value: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(value).unwrap()
    }

    fn issue(key: &str) -> FullIssue {
        FullIssue {
            key: IssueKey::new(key),
            id: None,
            status_name: "Open".to_string(),
            status_category_id: Some(2),
            resolution_id: None,
            resolution_name: None,
            resolution_date: None,
            links: Vec::new(),
            changelog: Vec::new(),
            scheduled_deploy_window: None,
        }
    }

    fn deployed_release(key: &str, at: &str) -> FullIssue {
        FullIssue {
            status_name: "Closed".to_string(),
            status_category_id: Some(3),
            resolution_id: Some(1),
            resolution_name: Some("Fixed".to_string()),
            resolution_date: Some(timestamp(at)),
            ..issue(key)
        }
    }

    fn resolver_for(url: &str) -> DeploymentResolver {
        let config = JiraConfig {
            base_url: url.to_string(),
            ..JiraConfig::default()
        };
        let client = JiraClient::new(&config).unwrap();
        let table = EnvironmentTable::from_config(&ScheduleConfig::default()).unwrap();
        DeploymentResolver::new(Arc::new(client), Arc::new(table), (&config).into())
    }

    // Resolver whose tests never reach the network
    fn offline_resolver() -> DeploymentResolver {
        resolver_for("http://127.0.0.1:9")
    }

    #[cfg(test)]
    mod last_transition_date {
        use super::*;

        #[test]
        fn returns_latest_status_change() {
            let mut release = issue("CDBR-909");
            release.changelog = vec![
                ChangelogEntry {
                    changed_at: timestamp("2016-12-28T19:01:00.959+02:00"),
                    field: "status".to_string(),
                    from: Some("Open".to_string()),
                    to: Some("Ready To Deploy".to_string()),
                },
                ChangelogEntry {
                    changed_at: timestamp("2016-12-29T09:00:00+02:00"),
                    field: "assignee".to_string(),
                    from: None,
                    to: Some("jupiter".to_string()),
                },
                ChangelogEntry {
                    changed_at: timestamp("2016-12-27T10:00:00+02:00"),
                    field: "status".to_string(),
                    from: None,
                    to: Some("Open".to_string()),
                },
            ];

            assert_eq!(
                last_transition_date(&release),
                Some(timestamp("2016-12-28T19:01:00.959+02:00"))
            );
        }

        #[test]
        fn none_without_status_changes() {
            assert_eq!(last_transition_date(&issue("CDBR-1")), None);
        }
    }

    #[test]
    fn latest_release_link_orders_by_number() {
        let resolver = offline_resolver();
        let mut work = issue("CDBT-4289");
        work.links = vec![
            Issue::Stub(IssueKey::new("CDBR-899")),
            Issue::Stub(IssueKey::new("CDBR-900")),
            Issue::Stub(IssueKey::new("CDBT-5000")),
            Issue::Stub(IssueKey::new("CDBR-879")),
        ];

        let link = resolver.latest_release_link(&work).unwrap();
        assert_eq!(link.key().as_str(), "CDBR-900");
    }

    #[tokio::test]
    async fn work_issue_without_release_is_not_deployed() {
        let resolver = offline_resolver();
        let mut work = issue("CDB-1089");
        work.links = vec![Issue::Stub(IssueKey::new("CDB-1090"))];

        assert!(!resolver.is_deployed(&work).await.unwrap());
        assert_eq!(resolver.deployment_date(&work).await.unwrap(), None);
        assert_eq!(
            resolver.time_to_next_deployment(&work, Utc::now()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn deployed_release_issue_reports_its_resolution_date() {
        let resolver = offline_resolver();
        let release = deployed_release("CDBR-898", "2016-12-26T15:21:55.097+02:00");

        assert!(resolver.is_deployed(&release).await.unwrap());
        assert_eq!(
            resolver.deployment_date(&release).await.unwrap(),
            Some(timestamp("2016-12-26T15:21:55.097+02:00"))
        );
    }

    #[tokio::test]
    async fn done_category_with_other_resolution_is_not_deployed() {
        let resolver = offline_resolver();
        let mut release = deployed_release("CDBR-898", "2016-12-26T15:21:55.097+02:00");
        release.resolution_id = Some(3);

        assert!(!resolver.is_deployed(&release).await.unwrap());
        assert_eq!(resolver.deployment_date(&release).await.unwrap(), None);
    }

    #[tokio::test]
    async fn work_issue_delegates_to_hydrated_release_link() {
        let resolver = offline_resolver();
        let mut work = issue("CDBT-4289");
        work.links = vec![
            Issue::Full(Box::new(deployed_release(
                "CDBR-897",
                "2016-12-20T10:00:00+02:00",
            ))),
            Issue::Full(Box::new(deployed_release(
                "CDBR-898",
                "2016-12-26T15:21:55.097+02:00",
            ))),
        ];

        let status = resolver.assess(&work, Utc::now()).await.unwrap();
        assert!(status.deployed);
        assert_eq!(
            status.deployed_at,
            Some(timestamp("2016-12-26T15:21:55.097+02:00"))
        );
        assert_eq!(status.release.unwrap().key.as_str(), "CDBR-898");
    }

    #[tokio::test]
    async fn work_issue_hydrates_stub_release_link_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/api/2/issue/CDBR-915")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"key": "CDBR-915", "fields": {
                    "status": {"name": "Ready To Deploy", "statusCategory": {"id": 4}},
                    "customfield_10500": {"value": "Akşam"}
                }}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let resolver = resolver_for(&server.url());
        let mut work = issue("CDBT-4301");
        work.links = vec![Issue::Stub(IssueKey::new("CDBR-915"))];

        // 07:00 UTC is 10:00 in Istanbul; the evening run is at 22:00
        let now = Utc.with_ymd_and_hms(2017, 1, 2, 7, 0, 0).unwrap();
        let status = resolver.assess(&work, now).await.unwrap();

        mock.assert_async().await;
        assert!(!status.deployed);
        assert_eq!(status.deployed_at, None);
        let next = status.next_deployment.unwrap();
        assert_eq!(next.at, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert_eq!(next.wait, Duration::hours(12));
    }

    #[tokio::test]
    async fn next_deployment_needs_ready_status_and_window() {
        let resolver = offline_resolver();
        let now = Utc::now();

        let mut release = issue("CDBR-916");
        release.status_name = "Ready To Deploy".to_string();
        assert_eq!(resolver.time_to_next_deployment(&release, now).await.unwrap(), None);

        release.scheduled_deploy_window = Some("Öğlen".to_string());
        assert!(resolver
            .time_to_next_deployment(&release, now)
            .await
            .unwrap()
            .is_some());

        release.status_name = "In Test".to_string();
        assert_eq!(resolver.time_to_next_deployment(&release, now).await.unwrap(), None);
    }
}
