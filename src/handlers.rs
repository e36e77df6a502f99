use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ReleaseBotError, Result};
use crate::intent::{WebhookRequest, RELEASE_CONTEXT};
use crate::providers::bamboo::{BambooClient, BuildStateResolver, EnvironmentTable};
use crate::providers::jira::{
    last_transition_date, DeploymentResolver, DeploymentRules, FullIssue, IssueKey, JiraClient,
};
use crate::response::{format_timestamp, format_wait, Reply, ResponseEnvelope};
use crate::template::{Parameters, RuleTable, Scalar, TemplateContext, Value};

const CHECK_RELEASE_STATE: &str = "check-release-state";
const CHECK_RELEASE_TIME: &str = "check-release-time";
const CHECK_ISSUE_STATE: &str = "check-issue-state";
const CHECK_ISSUE_DEPLOYMENT: &str = "check-issue-deployment";

/// Answers fulfillment requests about releases and issues.
///
/// Built once at start-up; holds no per-request state.
pub struct ReleaseBot {
    environments: Arc<EnvironmentTable>,
    builds: BuildStateResolver,
    issues: Arc<JiraClient>,
    deployments: DeploymentResolver,
    rules: RuleTable,
    source: String,
    eager_links: bool,
}

impl ReleaseBot {
    /// Wires clients and resolvers from `config`. The rule table comes from
    /// `config.rules` when set, else the bundled one.
    pub fn from_config(config: &Config) -> Result<Self> {
        let rules = match &config.rules {
            Some(path) => RuleTable::load(path)?,
            None => RuleTable::bundled()?,
        };
        Self::with_rules(config, rules)
    }

    pub fn with_rules(config: &Config, rules: RuleTable) -> Result<Self> {
        let environments = Arc::new(EnvironmentTable::from_config(&config.schedule)?);
        let bamboo = Arc::new(BambooClient::new(&config.bamboo)?);
        let issues = Arc::new(JiraClient::new(&config.jira)?);

        Ok(Self {
            builds: BuildStateResolver::new(bamboo, Arc::clone(&environments)),
            deployments: DeploymentResolver::new(
                Arc::clone(&issues),
                Arc::clone(&environments),
                DeploymentRules::from(&config.jira),
            ),
            environments,
            issues,
            rules,
            source: config.server.source.clone(),
            eager_links: config.jira.eager_links,
        })
    }

    /// Processes a request, turning failures that have a sensible spoken
    /// answer into replies.
    ///
    /// Upstream failures become the templated failure reply. Whatever is
    /// left (template and configuration problems) is returned as an error.
    pub async fn answer(&self, request: &WebhookRequest, now: DateTime<Utc>) -> Result<Reply> {
        match self.process(request, now).await {
            Err(e) if e.is_upstream() => {
                error!("Upstream failure answering {:?}: {e}", request.action());
                self.render("failure", &Parameters::new(), &TemplateContext::new())
            }
            outcome => outcome,
        }
    }

    /// Routes the request to the handler for its action. Unknown actions get
    /// an empty reply.
    pub async fn process(&self, request: &WebhookRequest, now: DateTime<Utc>) -> Result<Reply> {
        let action = request.action().unwrap_or_default();
        info!("Handling action '{action}'");

        match action {
            CHECK_RELEASE_STATE => self.check_release_state(request).await,
            CHECK_RELEASE_TIME => self.check_release_time(request, now).await,
            CHECK_ISSUE_STATE => self.check_issue_state(request).await,
            CHECK_ISSUE_DEPLOYMENT => self.check_issue_deployment(request, now).await,
            other => {
                warn!("Ignoring unknown action '{other}'");
                Ok(Reply::empty())
            }
        }
    }

    async fn check_release_state(&self, request: &WebhookRequest) -> Result<Reply> {
        if !request.has_parameters() {
            return Ok(Reply::empty());
        }
        let Some(release_name) = request.parameter(Some(RELEASE_CONTEXT), "release-name") else {
            return Ok(Reply::empty());
        };
        if request
            .parameter(Some(RELEASE_CONTEXT), "release-state")
            .is_none()
        {
            return Ok(Reply::empty());
        }

        let resolution = match self.builds.resolve(&release_name).await {
            Ok(resolution) => resolution,
            Err(e) => return self.release_failure(&release_name, e),
        };

        let parameters = parameters([("currentBuildState", resolution.state.as_str().into())]);
        let context = TemplateContext::new()
            .with("releaseName", Value::literal(&release_name))
            .with("releaseState", Value::literal(resolution.state.as_str()))
            .with("build", Value::record(&resolution.build));
        self.render("checkReleaseState", &parameters, &context)
    }

    async fn check_release_time(&self, request: &WebhookRequest, now: DateTime<Utc>) -> Result<Reply> {
        if !request.has_parameters() {
            return Ok(Reply::empty());
        }
        let Some(release_name) = request.parameter(Some(RELEASE_CONTEXT), "release-name") else {
            return Ok(Reply::empty());
        };
        let tense = request.parameter(Some(RELEASE_CONTEXT), "tense");
        let asked_state = request.parameter(Some(RELEASE_CONTEXT), "release-state");

        let resolution = match self.builds.resolve(&release_name).await {
            Ok(resolution) => resolution,
            Err(e) => return self.release_failure(&release_name, e),
        };

        let parameters = parameters([
            ("askedBuildState", asked_state.into()),
            ("tense", tense.into()),
            ("currentBuildState", resolution.state.as_str().into()),
        ]);

        let wait_environments = Arc::clone(&self.environments);
        let wait_release = release_name.clone();
        let time_environments = Arc::clone(&self.environments);
        let time_release = release_name.clone();
        let context = TemplateContext::new()
            .with("releaseName", Value::literal(&release_name))
            .with("releaseState", Value::literal(resolution.state.as_str()))
            .with("build", Value::record(&resolution.build))
            .with(
                "timeToNextBuild",
                Value::computed(move |_| {
                    wait_environments
                        .predict_next_run(&wait_release, now)
                        .ok()
                        .flatten()
                        .map(|next| format_wait(next.wait))
                }),
            )
            .with(
                "nextBuildTime",
                Value::computed(move |_| {
                    time_environments
                        .predict_next_run(&time_release, now)
                        .ok()
                        .flatten()
                        .map(|next| next.at.format("%H:%M").to_string())
                }),
            );
        self.render("checkTimeResults", &parameters, &context)
    }

    async fn check_issue_state(&self, request: &WebhookRequest) -> Result<Reply> {
        if !request.has_parameters() {
            return Ok(Reply::empty());
        }
        let Some(issue_no) = request.parameter(None, "issueNo") else {
            return Ok(Reply::empty());
        };

        let Some(issue) = self.lookup_issue(&issue_no).await? else {
            return self.unknown_issue(&issue_no);
        };

        let transitioned_at = last_transition_date(&issue);
        let parameters = parameters([("hasTransitionDate", transitioned_at.is_some().into())]);
        let mut context = TemplateContext::new()
            .with("issueNo", Value::literal(issue.key.as_str()))
            .with("statusName", Value::literal(&issue.status_name));
        if let Some(at) = transitioned_at {
            context.insert(
                "lastTransitionDate",
                Value::literal(format_timestamp(&at, &self.environments.timezone())),
            );
        }
        self.render("checkIssueState", &parameters, &context)
    }

    async fn check_issue_deployment(
        &self,
        request: &WebhookRequest,
        now: DateTime<Utc>,
    ) -> Result<Reply> {
        if !request.has_parameters() {
            return Ok(Reply::empty());
        }
        let Some(issue_no) = request.parameter(None, "issueNo") else {
            return Ok(Reply::empty());
        };
        let tense = request.parameter(None, "tense");

        let Some(mut issue) = self.lookup_issue(&issue_no).await? else {
            return self.unknown_issue(&issue_no);
        };
        // From here on a 404 concerns a linked issue, not the asked one.
        if self.eager_links {
            self.issues.hydrate_links(&mut issue).await?;
        }
        let status = self.deployments.assess(&issue, now).await?;

        let parameters = parameters([
            ("isDeployed", status.deployed.into()),
            ("tense", tense.into()),
            ("hasNextDeployment", status.next_deployment.is_some().into()),
            ("hasRelease", status.release.is_some().into()),
        ]);

        let mut context = TemplateContext::new().with("issueNo", Value::literal(&issue_no));
        if let Some(release) = &status.release {
            context.insert("releaseNo", Value::literal(release.key.as_str()));
        }
        if let Some(at) = status.deployed_at {
            context.insert(
                "deploymentDate",
                Value::literal(format_timestamp(&at, &self.environments.timezone())),
            );
        }
        if let Some(next) = status.next_deployment {
            context.insert("nextDeploymentDate", Value::literal(format_wait(next.wait)));
        }
        self.render("checkIssueDeployment", &parameters, &context)
    }

    /// Fetches the asked issue. `None` when the key is malformed or Jira
    /// does not know it; malformed keys never reach Jira.
    async fn lookup_issue(&self, issue_no: &str) -> Result<Option<FullIssue>> {
        let Some(key) = IssueKey::parse(issue_no) else {
            warn!("Refusing malformed issue key '{issue_no}'");
            return Ok(None);
        };
        match self.issues.fetch_issue(&key).await {
            Ok(issue) => Ok(Some(issue)),
            Err(e @ ReleaseBotError::Api { status: 404, .. }) => {
                warn!("{key}: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Replies for build-state failures that are about the request rather
    /// than the servers.
    fn release_failure(&self, release_name: &str, error: ReleaseBotError) -> Result<Reply> {
        let group = match &error {
            ReleaseBotError::UnknownEnvironment(_) => "unknownRelease",
            ReleaseBotError::UnresolvedBuildState { .. } => "releaseStateUnknown",
            _ => return Err(error),
        };
        warn!("{error}");
        let context = TemplateContext::new().with("releaseName", Value::literal(release_name));
        self.render(group, &Parameters::new(), &context)
    }

    fn unknown_issue(&self, issue_no: &str) -> Result<Reply> {
        let context = TemplateContext::new().with("issueNo", Value::literal(issue_no));
        self.render("unknownIssue", &Parameters::new(), &context)
    }

    fn render(&self, group: &str, parameters: &Parameters, context: &TemplateContext) -> Result<Reply> {
        let speech = self.rules.render(group, parameters, context)?;
        Ok(ResponseEnvelope::new(speech, &self.source).into())
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Builds a parameter bag. Absent values stay in the bag as null so rules
/// that expect a value count them as a mismatch.
fn parameters<const N: usize>(pairs: [(&str, Scalar); N]) -> Parameters {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
