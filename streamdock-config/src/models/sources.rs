use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use streamdock_core::ShardIteratorType;

use crate::util::{DurationValue, parse_bool, parse_csv};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Stages the emulator runs for; empty or missing means all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub start: FileStartConfig,
    #[serde(default)]
    pub emulator: FileEmulatorConfig,
    #[serde(default)]
    pub stream: FileStreamConfig,
    #[serde(default)]
    pub lambda: FileLambdaConfig,
    #[serde(default)]
    pub credentials: FileCredentialsConfig,
    /// Resources of the default stack, keyed by logical id.
    #[serde(default)]
    pub resources: BTreeMap<String, FileResource>,
    #[serde(default)]
    pub additional_stacks: Vec<FileStack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_additional_stacks: Option<bool>,
    #[serde(default)]
    pub functions: Vec<FileFunction>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStartConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_memory: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_db: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_transient_statuses: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_db_before_startup: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_initial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_max: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_start: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileEmulatorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_timeout: Option<DurationValue>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStreamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterator: Option<ShardIteratorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_interval: Option<DurationValue>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLambdaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCredentialsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

/// A CloudFormation-style resource entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileResource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Properties", default)]
    pub properties: Value,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, FileResource>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileFunction {
    pub name: String,
    #[serde(default)]
    pub events: Vec<FileFunctionEvent>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileFunctionEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<FileStreamEvent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileStreamEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_position: Option<ShardIteratorType>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub service: Option<String>,
    pub stage: Option<String>,
    pub stages: Option<Vec<String>>,
    pub region: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub in_memory: Option<bool>,
    pub migrate: Option<bool>,
    pub no_start: Option<bool>,
    pub java: Option<String>,
    pub install_dir: Option<PathBuf>,
    pub startup_timeout: Option<String>,
    pub stream_iterator: Option<String>,
    pub read_interval: Option<String>,
    pub lambda_host: Option<String>,
    pub lambda_port: Option<u16>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub skip_additional_stacks: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment layer from any variable source. Credentials
    /// only come from `STREAMDOCK_*` names so ambient AWS keys never reach
    /// DynamoDB Local.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name).filter(|value| !value.trim().is_empty())
        };
        let path = |name: &str| text(name).map(PathBuf::from);
        let flag = |name: &str| lookup(name).and_then(|raw| parse_bool(&raw));
        let port = |name: &str| {
            lookup(name).and_then(|raw| raw.trim().parse::<u16>().ok())
        };

        Self {
            config_path: path("STREAMDOCK_CONFIG"),
            service: text("STREAMDOCK_SERVICE"),
            stage: text("STREAMDOCK_STAGE"),
            stages: lookup("STREAMDOCK_STAGES").map(|raw| parse_csv(&raw)),
            region: text("STREAMDOCK_REGION"),
            port: port("STREAMDOCK_PORT"),
            host: text("STREAMDOCK_HOST"),
            db_path: path("STREAMDOCK_DB_PATH"),
            in_memory: flag("STREAMDOCK_IN_MEMORY"),
            migrate: flag("STREAMDOCK_MIGRATE"),
            no_start: flag("STREAMDOCK_NO_START"),
            java: text("STREAMDOCK_JAVA"),
            install_dir: path("STREAMDOCK_INSTALL_DIR"),
            startup_timeout: text("STREAMDOCK_STARTUP_TIMEOUT"),
            stream_iterator: text("STREAMDOCK_STREAM_ITERATOR"),
            read_interval: text("STREAMDOCK_READ_INTERVAL"),
            lambda_host: text("STREAMDOCK_LAMBDA_HOST"),
            lambda_port: port("STREAMDOCK_LAMBDA_PORT"),
            access_key_id: text("STREAMDOCK_ACCESS_KEY_ID"),
            secret_access_key: text("STREAMDOCK_SECRET_ACCESS_KEY"),
            skip_additional_stacks: flag("STREAMDOCK_SKIP_ADDITIONAL_STACKS"),
        }
    }
}
