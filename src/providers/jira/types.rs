use chrono::{DateTime, FixedOffset};
use log::debug;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::{ReleaseBotError, Result};

/// Raw issue document of `GET /rest/api/2/issue/{key}?expand=changelog`.
#[derive(Debug, Deserialize)]
pub(super) struct IssueDocument {
    pub key: String,
    #[serde(default)]
    pub id: Option<String>,
    pub fields: IssueFields,
    #[serde(default)]
    pub changelog: Option<Changelog>,
}

#[derive(Debug, Deserialize)]
pub(super) struct IssueFields {
    pub status: Status,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub resolutiondate: Option<String>,
    #[serde(default)]
    pub issuelinks: Vec<IssueLinkDocument>,
    /// Custom fields, looked up by their configured id
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Status {
    pub name: String,
    #[serde(default)]
    pub status_category: Option<StatusCategory>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusCategory {
    pub id: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct Resolution {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct IssueLinkDocument {
    #[serde(default)]
    pub inward_issue: Option<LinkedIssueDocument>,
    #[serde(default)]
    pub outward_issue: Option<LinkedIssueDocument>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LinkedIssueDocument {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct Changelog {
    #[serde(default)]
    pub histories: Vec<History>,
}

#[derive(Debug, Deserialize)]
pub(super) struct History {
    pub created: String,
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HistoryItem {
    pub field: String,
    #[serde(default)]
    pub from_string: Option<String>,
    #[serde(default)]
    pub to_string: Option<String>,
}

/// An issue key of the form `PROJECT-NUMBER`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey(String);

impl IssueKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Accepts only `PROJECT-NUMBER`: a project of ASCII letters, digits or
    /// underscores starting with a letter, then a decimal number. Keys are
    /// spliced into request paths, so anything else is refused.
    pub fn parse(value: &str) -> Option<Self> {
        let (project, number) = value.split_once('-')?;
        let mut project_chars = project.chars();
        let project_ok = project_chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && project_chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        let number_ok = !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
        (project_ok && number_ok).then(|| Self::new(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn project(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// Numeric suffix, if the key has one.
    pub fn number(&self) -> Option<u64> {
        self.0.rsplit_once('-').and_then(|(_, n)| n.parse().ok())
    }

    /// Orders keys by numeric suffix, falling back to the raw string so
    /// "CDBR-900" sorts after "CDBR-899".
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        self.number()
            .cmp(&other.number())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One field transition from an issue's history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogEntry {
    pub changed_at: DateTime<FixedOffset>,
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// A fully fetched tracker issue.
#[derive(Debug, Clone, PartialEq)]
pub struct FullIssue {
    pub key: IssueKey,
    pub id: Option<String>,
    pub status_name: String,
    pub status_category_id: Option<u32>,
    pub resolution_id: Option<u32>,
    pub resolution_name: Option<String>,
    pub resolution_date: Option<DateTime<FixedOffset>>,
    pub links: Vec<Issue>,
    pub changelog: Vec<ChangelogEntry>,
    /// Selected deployment window (a run-slot label)
    pub scheduled_deploy_window: Option<String>,
}

/// An issue either known only by key or fully fetched.
///
/// Linked issues start as stubs; every consumer that needs more than the
/// key must hydrate them through the client first.
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    Stub(IssueKey),
    Full(Box<FullIssue>),
}

impl Issue {
    pub fn key(&self) -> &IssueKey {
        match self {
            Self::Stub(key) => key,
            Self::Full(issue) => &issue.key,
        }
    }

    pub fn is_hydrated(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub fn as_full(&self) -> Result<&FullIssue> {
        match self {
            Self::Full(issue) => Ok(&**issue),
            Self::Stub(key) => Err(ReleaseBotError::NotHydrated(key.to_string())),
        }
    }
}

/// Parses tracker timestamps such as `2016-12-16T14:57:35.687+0200`.
pub(super) fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
}

impl IssueDocument {
    /// Converts the document, leaving every linked issue as a stub.
    pub fn into_issue(self, deploy_window_field: &str) -> FullIssue {
        let IssueDocument {
            key,
            id,
            mut fields,
            changelog,
        } = self;

        let links = fields
            .issuelinks
            .into_iter()
            .filter_map(|link| link.inward_issue.or(link.outward_issue))
            .map(|linked| Issue::Stub(IssueKey::new(linked.key)))
            .collect();

        let scheduled_deploy_window = fields
            .extra
            .remove(deploy_window_field)
            .and_then(|value| match value {
                serde_json::Value::Object(mut option) => match option.remove("value") {
                    Some(serde_json::Value::String(label)) => Some(label),
                    _ => None,
                },
                serde_json::Value::String(label) => Some(label),
                _ => None,
            });

        let changelog = changelog
            .map(|changelog| {
                changelog
                    .histories
                    .into_iter()
                    .filter_map(|history| {
                        let Some(changed_at) = parse_timestamp(&history.created) else {
                            debug!(
                                "Skipping {} changelog entries of {key}, unreadable timestamp '{}'",
                                history.items.len(),
                                history.created
                            );
                            return None;
                        };
                        Some(history.items.into_iter().map(move |item| ChangelogEntry {
                            changed_at,
                            field: item.field,
                            from: item.from_string,
                            to: item.to_string,
                        }))
                    })
                    .flatten()
                    .collect()
            })
            .unwrap_or_default();

        let (resolution_id, resolution_name) = match fields.resolution {
            Some(resolution) => (resolution.id.parse().ok(), Some(resolution.name)),
            None => (None, None),
        };

        FullIssue {
            key: IssueKey::new(key),
            id,
            status_name: fields.status.name,
            status_category_id: fields.status.status_category.map(|category| category.id),
            resolution_id,
            resolution_name,
            resolution_date: fields.resolutiondate.as_deref().and_then(parse_timestamp),
            links,
            changelog,
            scheduled_deploy_window,
        }
    }
}
