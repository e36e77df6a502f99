use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, Credentials};
use crate::handlers::ReleaseBot;
use crate::intent::WebhookRequest;
use crate::server;

#[derive(Parser)]
#[command(name = "releasebot")]
#[command(author, version, about = "Answers chat questions about releases and issue deployments", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the reply of `ask` to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[arg(long, global = true, env = "BAMBOO_USER", hide_env_values = true)]
    bamboo_user: Option<String>,

    #[arg(long, global = true, env = "BAMBOO_PASS", hide_env_values = true)]
    bamboo_pass: Option<String>,

    #[arg(long, global = true, env = "JIRA_USER", hide_env_values = true)]
    jira_user: Option<String>,

    #[arg(long, global = true, env = "JIRA_PASS", hide_env_values = true)]
    jira_pass: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Address to bind, overrides the configuration
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on, overrides the configuration
        #[arg(short = 'P', long, env = "PORT")]
        port: Option<u16>,
    },
    /// Answer a single intent payload and print the reply
    Ask {
        /// Payload file, or `-` for stdin
        payload: PathBuf,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_credentials(Credentials {
            bamboo_user: self.bamboo_user.clone(),
            bamboo_pass: self.bamboo_pass.clone(),
            jira_user: self.jira_user.clone(),
            jira_pass: self.jira_pass.clone(),
        });
        Ok(config)
    }

    async fn execute_serve(&self, host: Option<&str>, port: Option<u16>) -> Result<()> {
        let config = self.load_config()?;
        let bot = ReleaseBot::from_config(&config).context("Failed to set up the release bot")?;

        let host = host.unwrap_or(&config.server.host);
        let port = port.unwrap_or(config.server.port);
        server::serve(Arc::new(bot), host, port, config.server.debug).await
    }

    async fn execute_ask(&self, payload: &Path) -> Result<()> {
        let config = self.load_config()?;
        let bot = ReleaseBot::from_config(&config).context("Failed to set up the release bot")?;

        let body = if payload == Path::new("-") {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            body
        } else {
            std::fs::read_to_string(payload)
                .with_context(|| format!("Failed to read payload: {}", payload.display()))?
        };
        let request: WebhookRequest =
            serde_json::from_str(&body).context("Payload is not a valid intent request")?;

        let reply = bot.answer(&request, Utc::now()).await?;

        let json_output = if self.pretty {
            serde_json::to_string_pretty(&reply)?
        } else {
            serde_json::to_string(&reply)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Reply written to: {}", output_path.display());
        } else {
            println!("{}", json_output);
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Serve { host, port } => self.execute_serve(host.as_deref(), *port).await,
            Commands::Ask { payload } => self.execute_ask(payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "releasebot",
            "--config",
            "bot.toml",
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some(Path::new("bot.toml")));
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(8080));
            }
            Commands::Ask { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn parses_ask_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["releasebot", "ask", "-", "--pretty"]).unwrap();

        assert!(cli.pretty);
        assert!(matches!(cli.command, Commands::Ask { ref payload } if payload == Path::new("-")));
    }

    #[test]
    fn credential_flags_parse_and_missing_config_fails() {
        let cli = Cli::try_parse_from([
            "releasebot",
            "--config",
            "/nonexistent/releasebot.toml",
            "--jira-user",
            "bot",
            "ask",
            "payload.json",
        ])
        .unwrap();

        assert_eq!(cli.jira_user.as_deref(), Some("bot"));
        assert!(cli.load_config().is_err());
    }
}
