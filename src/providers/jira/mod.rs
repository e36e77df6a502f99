mod client;
mod deployment;
mod types;

pub use client::JiraClient;
pub use deployment::{last_transition_date, DeploymentResolver, DeploymentRules, DeploymentStatus};
pub use types::{ChangelogEntry, FullIssue, Issue, IssueKey};
