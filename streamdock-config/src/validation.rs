use std::time::Duration;

use streamdock_core::launch::EMULATOR_JAR;
use thiserror::Error;

use crate::models::Config;

/// Largest batch DynamoDB Streams hands out per `GetRecords` call.
pub const MAX_BATCH_SIZE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("service name must not be empty")]
    MissingService,
    #[error("stage name must not be empty")]
    MissingStage,
    #[error("{field} port must be between 1 and 65535")]
    InvalidPort { field: &'static str },
    #[error("stream read interval must be greater than zero")]
    ZeroReadInterval,
    #[error(
        "function {function}: batch size {batch_size} \
         must be between 1 and {max}",
        max = MAX_BATCH_SIZE
    )]
    InvalidBatchSize { function: String, batch_size: u32 },
    #[error("emulator and handler endpoints both use port {port}")]
    PortConflict { port: u16 },
}

/// Hard errors abort loading; everything else becomes a warning.
pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    if config.service.trim().is_empty() {
        return Err(ConfigGuardRailError::MissingService);
    }
    if config.stage.trim().is_empty() {
        return Err(ConfigGuardRailError::MissingStage);
    }
    if config.start.launch.resolved_port() == 0 {
        return Err(ConfigGuardRailError::InvalidPort {
            field: "emulator",
        });
    }
    if config.lambda.port == 0 {
        return Err(ConfigGuardRailError::InvalidPort { field: "lambda" });
    }
    if config.stream.read_interval == Duration::ZERO {
        return Err(ConfigGuardRailError::ZeroReadInterval);
    }
    if config.lambda.port == config.start.launch.resolved_port() {
        return Err(ConfigGuardRailError::PortConflict {
            port: config.lambda.port,
        });
    }

    for subscription in config.subscriptions() {
        let batch_size = subscription.resolved_batch_size();
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ConfigGuardRailError::InvalidBatchSize {
                function: subscription.function_name,
                batch_size,
            });
        }
    }

    let mut warnings = ConfigWarnings::default();

    if !config.stage_enabled() {
        warnings.push_with_hint(
            format!(
                "stage '{}' is not listed in stages {:?}; \
                 the emulator will not run",
                config.stage, config.stages
            ),
            "add the stage to `stages` or remove the list to run everywhere",
        );
    }

    if config.stream.iterator.is_some()
        && (config.stream.start_at.is_some()
            || config.stream.start_after.is_some())
    {
        warnings
            .push("stream.iterator is set; start_at/start_after are ignored");
    } else if config.stream.start_at.is_some()
        && config.stream.start_after.is_some()
    {
        warnings.push(
            "both stream.start_at and stream.start_after are set; start_at wins",
        );
    }

    for function in &config.functions {
        for event in &function.stream_events {
            if !event.is_dynamodb() {
                warnings.push(format!(
                    "function {}: stream event type '{}' is not dispatched",
                    function.name, event.kind
                ));
                continue;
            }
            if !config.declares_table(&event.table_name) {
                warnings.push_with_hint(
                    format!(
                        "function {} subscribes to table '{}' \
                         which no stack declares",
                        function.name, event.table_name
                    ),
                    "the table must exist in DynamoDB Local before records flow",
                );
            } else if !config.tables.iter().any(|table| {
                table.table_name() == Some(event.table_name.as_str())
                    && table.has_stream()
            }) {
                warnings.push_with_hint(
                    format!(
                        "table '{}' has no StreamSpecification",
                        event.table_name
                    ),
                    "set StreamSpecification.StreamViewType to produce a stream",
                );
            }
        }
    }

    if config.start.migrate && config.tables.is_empty() {
        warnings.push("start.migrate is enabled but no tables are declared");
    }

    let jar = config.emulator.install_dir.join(EMULATOR_JAR);
    if !config.start.no_start && !jar.exists() {
        warnings.push_with_hint(
            format!(
                "{EMULATOR_JAR} not found in {}",
                config.emulator.install_dir.display()
            ),
            "download DynamoDB Local into emulator.install_dir \
             or set STREAMDOCK_INSTALL_DIR",
        );
    }

    Ok(warnings)
}
