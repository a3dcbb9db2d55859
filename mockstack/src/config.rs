//! Configuration management

use mockstack_core::{account, AccountContext};
use mockstack_sqs::SqsConfig;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sqs: SqsSettings,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Host name written into queue URLs handed back to clients
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            hostname: default_hostname(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SqsSettings {
    #[serde(default = "default_account_id")]
    pub account_id: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Return undeleted messages to the queue once their visibility
    /// timeout elapses
    #[serde(default = "default_true")]
    pub requeue_expired_inflight: bool,
}

impl Default for SqsSettings {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            region: default_region(),
            requeue_expired_inflight: true,
        }
    }
}

fn default_port() -> u16 {
    4566
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_account_id() -> String {
    account::DEFAULT_ACCOUNT_ID.to_string()
}

fn default_region() -> String {
    account::DEFAULT_REGION.to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from an optional file and `MOCKSTACK__*` variables.
    ///
    /// Without an explicit path, `mockstack.toml` in the working directory is
    /// read if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("mockstack").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("MOCKSTACK").separator("__"))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    /// Public base URL of the emulator
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.server.hostname, self.server.port)
    }

    /// Engine construction input derived from this configuration
    pub fn sqs_config(&self) -> SqsConfig {
        SqsConfig {
            account: AccountContext::new(
                self.sqs.account_id.clone(),
                self.sqs.region.clone(),
                self.endpoint(),
            ),
            requeue_expired_inflight: self.sqs.requeue_expired_inflight,
        }
    }
}
