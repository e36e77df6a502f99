use log::{debug, info};

use crate::config::JiraConfig;
use crate::error::Result;
use crate::providers::http::{api_error, RestClient};

use super::types::{FullIssue, Issue, IssueDocument, IssueKey};

/// Read-only client for Jira issues.
pub struct JiraClient {
    rest: RestClient,
    deploy_window_field: String,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self> {
        let rest = RestClient::new(
            &config.base_url,
            "rest/api/2/",
            config.username.clone(),
            config.password.clone(),
            config.timeout_secs,
        )?;
        Ok(Self {
            rest,
            deploy_window_field: config.deploy_window_field.clone(),
        })
    }

    /// Fetches an issue with its changelog. Linked issues are left as stubs.
    pub async fn fetch_issue(&self, key: &IssueKey) -> Result<FullIssue> {
        let mut url = self.rest.endpoint(&format!("issue/{key}"))?;
        url.query_pairs_mut().append_pair("expand", "changelog");

        let response = self.rest.get(url).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let document: IssueDocument = response.json().await?;
        let issue = document.into_issue(&self.deploy_window_field);
        debug!(
            "{} is {} with {} links",
            issue.key,
            issue.status_name,
            issue.links.len()
        );
        Ok(issue)
    }

    /// Fetches every linked issue of `issue`, one request each.
    pub async fn hydrate_links(&self, issue: &mut FullIssue) -> Result<()> {
        info!("Hydrating {} links of {}", issue.links.len(), issue.key);

        let mut links = Vec::with_capacity(issue.links.len());
        for link in &issue.links {
            links.push(Issue::Full(Box::new(self.ensure_hydrated(link).await?)));
        }
        issue.links = links;
        Ok(())
    }

    /// Returns the full form of `issue`, fetching it when it is only a stub.
    pub async fn ensure_hydrated(&self, issue: &Issue) -> Result<FullIssue> {
        match issue {
            Issue::Full(full) => Ok(full.as_ref().clone()),
            Issue::Stub(key) => self.fetch_issue(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseBotError;
    use mockito::Matcher;

    const WORK_ISSUE: &str = r#"{
        "id": "46601",
        "key": "CDBT-4289",
        "fields": {
            "status": {"name": "Closed", "statusCategory": {"id": 3}},
            "resolution": {"id": "1", "name": "Fixed"},
            "resolutiondate": "2016-12-16T14:57:35.687+0200",
            "issuelinks": [
                {"outwardIssue": {"key": "CDBR-897"}},
                {"inwardIssue": {"key": "CDBR-898"}}
            ]
        }
    }"#;

    fn release_issue(key: &str) -> String {
        format!(
            r#"{{"key": "{key}", "fields": {{"status": {{"name": "Closed", "statusCategory": {{"id": 3}}}}}}}}"#
        )
    }

    fn client_for(url: &str) -> JiraClient {
        JiraClient::new(&JiraConfig {
            base_url: url.to_string(),
            ..JiraConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_issue_with_changelog_expanded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/api/2/issue/CDBT-4289")
            .match_query(Matcher::UrlEncoded("expand".into(), "changelog".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(WORK_ISSUE)
            .create_async()
            .await;

        let issue = client_for(&server.url())
            .fetch_issue(&IssueKey::new("CDBT-4289"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(issue.key.as_str(), "CDBT-4289");
        assert_eq!(issue.status_name, "Closed");
        assert_eq!(issue.status_category_id, Some(3));
        assert!(issue.links.iter().all(|link| !link.is_hydrated()));
    }

    #[tokio::test]
    async fn hydrates_every_link() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/api/2/issue/CDBT-4289")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(WORK_ISSUE)
            .create_async()
            .await;
        for key in ["CDBR-897", "CDBR-898"] {
            server
                .mock("GET", format!("/rest/api/2/issue/{key}").as_str())
                .match_query(Matcher::Any)
                .with_status(200)
                .with_body(release_issue(key))
                .expect(1)
                .create_async()
                .await;
        }

        let client = client_for(&server.url());
        let mut issue = client.fetch_issue(&IssueKey::new("CDBT-4289")).await.unwrap();
        client.hydrate_links(&mut issue).await.unwrap();

        assert_eq!(issue.links.len(), 2);
        let first = issue.links[0].as_full().unwrap();
        assert_eq!(first.key, IssueKey::new("CDBR-897"));
        assert_eq!(first.status_name, "Closed");
        assert!(issue.links[1].is_hydrated());
    }

    #[tokio::test]
    async fn hydrated_issue_is_not_fetched_again() {
        let server = mockito::Server::new_async().await;
        let document: IssueDocument = serde_json::from_str(&release_issue("CDBR-1")).unwrap();
        let full = document.into_issue("customfield_10500");

        let hydrated = client_for(&server.url())
            .ensure_hydrated(&Issue::Full(Box::new(full.clone())))
            .await
            .unwrap();

        assert_eq!(hydrated, full);
    }

    #[tokio::test]
    async fn missing_issue_is_an_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/api/2/issue/CDB-9999")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"errorMessages":["Issue Does Not Exist"],"errors":{}}"#)
            .create_async()
            .await;

        let result = client_for(&server.url())
            .fetch_issue(&IssueKey::new("CDB-9999"))
            .await;

        assert!(matches!(
            result,
            Err(ReleaseBotError::Api { status: 404, .. })
        ));
    }
}
