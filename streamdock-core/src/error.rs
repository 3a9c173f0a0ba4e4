use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamdockError {
    #[error("failed to launch emulator process: {0}")]
    ProcessLaunch(#[source] std::io::Error),

    #[error("emulator exited before becoming ready ({status})")]
    ProcessExited { status: String },

    #[error("emulator on port {port} was not ready after {timeout:?}")]
    StartupTimeout { port: u16, timeout: Duration },

    #[error("an emulator instance is already registered on port {port}")]
    InstanceAlreadyRunning { port: u16 },

    #[error("stream description unavailable for {resource}: {reason}")]
    StreamDescriptionUnavailable { resource: String, reason: String },

    #[error("failed to read shard {shard_id}: {reason}")]
    ShardFetch { shard_id: String, reason: String },

    #[error("failed to invoke function {function}: {reason}")]
    Invocation { function: String, reason: String },

    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamdockError {
    /// Service error code (e.g. `ResourceInUseException`), if this came from
    /// the API.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            StreamdockError::Service { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn is_resource_in_use(&self) -> bool {
        self.service_code() == Some("ResourceInUseException")
    }
}

pub type Result<T> = std::result::Result<T, StreamdockError>;
