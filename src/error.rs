use thiserror::Error;

use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum ReleaseBotError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API request failed with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error(
        "Unresolved build state for {environment} (state: {state:?}, lifecycle: {lifecycle:?})"
    )]
    UnresolvedBuildState {
        environment: String,
        state: Option<String>,
        lifecycle: Option<String>,
    },

    #[error("Issue {0} was read before being hydrated")]
    NotHydrated(String),

    #[error("Rule table error: {0}")]
    Template(#[from] TemplateError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReleaseBotError {
    /// Whether the error comes from an unreachable or failing upstream service.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Api { .. } | Self::ApiErrorAfterRetries { .. } | Self::Network(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReleaseBotError>;
