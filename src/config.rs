use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure for the release bot.
///
/// Server URLs, build plans and run schedules live here and are read once at
/// start-up. Configuration files are loaded from the current directory, the user
/// configuration directory or an explicit path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Webhook server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// CI server (Bamboo) connection
    #[serde(default)]
    pub bamboo: BambooConfig,

    /// Issue tracker (Jira) connection and conventions
    #[serde(default)]
    pub jira: JiraConfig,

    /// Environments, their build plans and run schedules
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Path to a YAML rule table; the bundled table is used when absent
    #[serde(default)]
    pub rules: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Log request and reply bodies at info level
    #[serde(default)]
    pub debug: bool,

    /// Bot identifier written into every reply envelope
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BambooConfig {
    #[serde(default = "default_bamboo_base_url")]
    pub base_url: String,

    pub username: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JiraConfig {
    #[serde(default = "default_jira_base_url")]
    pub base_url: String,

    pub username: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Project key of release issues
    #[serde(default = "default_release_project")]
    pub release_project: String,

    /// Status category id the tracker uses for "done"
    #[serde(default = "default_done_status_category")]
    pub done_status_category: u32,

    /// Resolution id meaning "Done"/"Fixed"
    #[serde(default = "default_done_resolution_id")]
    pub done_resolution_id: u32,

    /// Status name of a release issue waiting for its deployment window
    #[serde(default = "default_ready_status")]
    pub ready_status: String,

    /// Custom field holding the selected deployment window
    #[serde(default = "default_deploy_window_field")]
    pub deploy_window_field: String,

    /// Environment whose schedule deployment windows refer to
    #[serde(default = "default_deploy_environment")]
    pub deploy_environment: String,

    /// Fetch every linked issue together with the issue itself
    #[serde(default)]
    pub eager_links: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// IANA time zone the run times are expressed in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_environments")]
    pub environments: IndexMap<String, EnvironmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnvironmentConfig {
    /// CI plan key (e.g., "DEPL-BET1")
    pub plan: String,

    /// Daily run times, "HH:MM" or "HH:MM:SS"
    #[serde(default)]
    pub runs: Vec<RunSlotConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSlotConfig {
    pub at: String,

    #[serde(default)]
    pub label: Option<String>,
}

/// Credentials given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub bamboo_user: Option<String>,
    pub bamboo_pass: Option<String>,
    pub jira_user: Option<String>,
    pub jira_pass: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            source: default_source(),
        }
    }
}

impl Default for BambooConfig {
    fn default() -> Self {
        Self {
            base_url: default_bamboo_base_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: default_jira_base_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            release_project: default_release_project(),
            done_status_category: default_done_status_category(),
            done_resolution_id: default_done_resolution_id(),
            ready_status: default_ready_status(),
            deploy_window_field: default_deploy_window_field(),
            deploy_environment: default_deploy_environment(),
            eager_links: false,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            environments: default_environments(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_source() -> String {
    "csreleasebot".to_string()
}

fn default_bamboo_base_url() -> String {
    "http://build.orioncb.com".to_string()
}

fn default_jira_base_url() -> String {
    "http://issues.orioncb.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_release_project() -> String {
    "CDBR".to_string()
}

fn default_done_status_category() -> u32 {
    3
}

fn default_done_resolution_id() -> u32 {
    1
}

fn default_ready_status() -> String {
    "Ready To Deploy".to_string()
}

fn default_deploy_window_field() -> String {
    "customfield_10500".to_string()
}

fn default_deploy_environment() -> String {
    "prod".to_string()
}

fn default_timezone() -> String {
    "Europe/Istanbul".to_string()
}

fn slots(times: &[&str]) -> Vec<RunSlotConfig> {
    times
        .iter()
        .map(|at| RunSlotConfig {
            at: (*at).to_string(),
            label: None,
        })
        .collect()
}

fn default_environments() -> IndexMap<String, EnvironmentConfig> {
    let mut environments = IndexMap::new();
    environments.insert(
        "beta".to_string(),
        EnvironmentConfig {
            plan: "DEPL-BET0".to_string(),
            runs: slots(&["07:00", "12:00", "16:00", "19:00"]),
        },
    );
    environments.insert(
        "prod".to_string(),
        EnvironmentConfig {
            plan: "DEPL-BET1".to_string(),
            runs: vec![
                RunSlotConfig {
                    at: "12:00".to_string(),
                    label: Some("Öğlen".to_string()),
                },
                RunSlotConfig {
                    at: "22:00".to_string(),
                    label: Some("Akşam".to_string()),
                },
            ],
        },
    );
    environments.insert(
        "dev".to_string(),
        EnvironmentConfig {
            plan: "DEPL-GEN0".to_string(),
            runs: slots(&[
                "10:00", "11:00", "12:00", "14:00", "15:00", "16:00", "17:00", "18:00", "19:00",
                "20:00", "21:00",
            ]),
        },
    );
    environments.insert(
        "alfa".to_string(),
        EnvironmentConfig {
            plan: "DEPL-GEN1".to_string(),
            runs: slots(&[
                "10:30", "12:30", "15:30", "17:30", "19:30", "20:30", "21:30", "22:30",
            ]),
        },
    );
    environments.insert(
        "ibank".to_string(),
        EnvironmentConfig {
            plan: "DEPL-IBD2".to_string(),
            runs: slots(&["00:00"]),
        },
    );
    environments
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path (must exist)
    /// 2. ./releasebot.toml, ./releasebot.json, ./releasebot.yaml, ./releasebot.yml
    /// 3. `<config dir>/releasebot/releasebot.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let mut candidates: Vec<PathBuf> = [
            "releasebot.toml",
            "releasebot.json",
            "releasebot.yaml",
            "releasebot.yml",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("releasebot").join("releasebot.toml"));
        }

        for candidate in &candidates {
            if candidate.exists() {
                log::info!("Loading configuration from {}", candidate.display());
                return Self::load_from_path(candidate);
            }
        }

        log::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Overrides file credentials with the ones given by the process.
    pub fn apply_credentials(&mut self, credentials: Credentials) {
        if credentials.bamboo_user.is_some() {
            self.bamboo.username = credentials.bamboo_user;
        }
        if credentials.bamboo_pass.is_some() {
            self.bamboo.password = credentials.bamboo_pass;
        }
        if credentials.jira_user.is_some() {
            self.jira.username = credentials.jira_user;
        }
        if credentials.jira_pass.is_some() {
            self.jira.password = credentials.jira_pass;
        }
    }
}
