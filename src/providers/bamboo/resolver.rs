use chrono::{DateTime, Utc};
use log::info;
use std::fmt;
use std::sync::Arc;

use crate::error::{ReleaseBotError, Result};

use super::client::{BambooClient, BuildRef};
use super::schedule::{EnvironmentTable, NextRun};
use super::types::Build;

/// Semantic state of an environment's release, derived from its builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    Complete,
    Running,
    Failed,
}

impl ReleaseState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "Complete",
            Self::Running => "Running",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A release state together with the build it is reported on.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub state: ReleaseState,
    pub build: Build,
}

/// Settles the state once the latest build is known to be successful and
/// the build after it has been probed.
///
/// | probe                          | result             |
/// |--------------------------------|--------------------|
/// | no such build                  | Complete, latest   |
/// | `Unknown` + `InProgress`       | Running, probe     |
/// | `Successful`                   | Complete, probe    |
/// | anything else                  | error              |
pub(crate) fn settle(environment: &str, latest: Build, probe: Build) -> Result<Resolution> {
    if probe.state.is_none() {
        return Ok(Resolution {
            state: ReleaseState::Complete,
            build: latest,
        });
    }
    if probe.is_in_progress() {
        return Ok(Resolution {
            state: ReleaseState::Running,
            build: probe,
        });
    }
    if probe.is_successful() {
        return Ok(Resolution {
            state: ReleaseState::Complete,
            build: probe,
        });
    }

    Err(ReleaseBotError::UnresolvedBuildState {
        environment: environment.to_string(),
        state: probe.state,
        lifecycle: probe.lifecycle_state,
    })
}

/// Turns an environment's build stream into a [`Resolution`] and predicts
/// its next scheduled run.
pub struct BuildStateResolver {
    client: Arc<BambooClient>,
    environments: Arc<EnvironmentTable>,
}

impl BuildStateResolver {
    pub fn new(client: Arc<BambooClient>, environments: Arc<EnvironmentTable>) -> Self {
        Self {
            client,
            environments,
        }
    }

    /// Resolves the release state of `environment`.
    ///
    /// A latest build that is not successful means the environment is broken
    /// whatever newer builds exist, so the probe is skipped in that case.
    pub async fn resolve(&self, environment: &str) -> Result<Resolution> {
        let env = self.environments.get(environment)?;

        let latest = self.client.fetch_build(env, BuildRef::Latest).await?;
        if !latest.is_successful() {
            info!(
                "{environment}: latest build {:?} is {:?}",
                latest.number, latest.state
            );
            return Ok(Resolution {
                state: ReleaseState::Failed,
                build: latest,
            });
        }

        let Some(number) = latest.number else {
            return Err(ReleaseBotError::UnresolvedBuildState {
                environment: environment.to_string(),
                state: latest.state,
                lifecycle: latest.lifecycle_state,
            });
        };

        let probe = self
            .client
            .fetch_build(env, BuildRef::Number(number + 1))
            .await?;
        let resolution = settle(environment, latest, probe)?;
        info!(
            "{environment}: {} (build {:?})",
            resolution.state, resolution.build.number
        );
        Ok(resolution)
    }

    pub fn predict_next_run(&self, environment: &str, now: DateTime<Utc>) -> Result<Option<NextRun>> {
        self.environments.predict_next_run(environment, now)
    }
}
