use log::{debug, warn};
use std::fmt;

use crate::config::BambooConfig;
use crate::error::Result;
use crate::providers::http::{api_error, RestClient};

use super::schedule::Environment;
use super::types::{BambooResult, Build};

/// Which build of a plan to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRef {
    Latest,
    Number(u64),
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

/// Read-only client for Bamboo build results.
pub struct BambooClient {
    rest: RestClient,
}

impl BambooClient {
    pub fn new(config: &BambooConfig) -> Result<Self> {
        let rest = RestClient::new(
            &config.base_url,
            "rest/api/latest/",
            config.username.clone(),
            config.password.clone(),
            config.timeout_secs,
        )?;
        Ok(Self { rest })
    }

    /// Fetches one build record of the environment's plan.
    ///
    /// A 404 or a body that cannot be decoded yields [`Build::absent`], the
    /// "no such build" record. Other non-2xx responses are errors.
    pub async fn fetch_build(&self, environment: &Environment, build: BuildRef) -> Result<Build> {
        let url = self
            .rest
            .endpoint(&format!("result/{}/{build}", environment.plan))?;

        let response = self.rest.get(url).await?;
        let status = response.status();

        if status.as_u16() == 404 {
            debug!("No build {build} for {} ({})", environment.name, environment.plan);
            return Ok(Build::absent());
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        let body = response.text().await?;
        match serde_json::from_str::<BambooResult>(&body) {
            Ok(result) => {
                let record = Build::from(result);
                debug!(
                    "Build {build} of {} is {:?}",
                    environment.name, record.state
                );
                Ok(record)
            }
            Err(e) => {
                warn!("Unparsable build result for {} {build}: {e}", environment.name);
                Ok(Build::absent())
            }
        }
    }
}
