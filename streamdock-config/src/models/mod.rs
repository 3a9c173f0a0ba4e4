pub mod sources;

use std::path::PathBuf;

use streamdock_core::provision::TABLE_RESOURCE_TYPE;
use streamdock_core::{
    ClientConfig, Credentials, EmulatorRuntime, LambdaInvokerConfig,
    LaunchOptions, SessionOptions, ShardIteratorType, StreamReadConfig,
    StreamSubscription, TableResource,
};

/// Event type a function uses to subscribe to a DynamoDB change stream.
pub const DYNAMODB_STREAM_EVENT: &str = "dynamodb";

#[derive(Debug, Clone)]
pub struct Config {
    pub service: String,
    pub stage: String,
    pub stages: Vec<String>,
    pub region: String,
    pub credentials: Credentials,
    pub start: StartConfig,
    pub emulator: EmulatorRuntime,
    pub stream: StreamReadConfig,
    pub lambda: LambdaConfig,
    pub tables: Vec<TableResource>,
    pub functions: Vec<FunctionConfig>,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn stage_enabled(&self) -> bool {
        self.stages.is_empty() || self.stages.contains(&self.stage)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            region: self.region.clone(),
            credentials: self.credentials.clone(),
            ..ClientConfig::new(self.start.launch.endpoint())
        }
    }

    pub fn invoker_config(&self) -> LambdaInvokerConfig {
        let endpoint = self.lambda.endpoint();
        LambdaInvokerConfig {
            region: self.region.clone(),
            credentials: self.credentials.clone(),
            ..LambdaInvokerConfig::new(endpoint, &self.service, &self.stage)
        }
    }

    /// One subscription per DynamoDB stream event, disabled ones included.
    pub fn subscriptions(&self) -> Vec<StreamSubscription> {
        self.functions
            .iter()
            .flat_map(|function| {
                function
                    .stream_events
                    .iter()
                    .filter(|event| event.is_dynamodb())
                    .map(|event| StreamSubscription {
                        function_name: function.name.clone(),
                        table_name: event.table_name.clone(),
                        batch_size: event.batch_size,
                        enabled: event.enabled,
                        starting_position: event.starting_position,
                    })
            })
            .collect()
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            stage: self.stage.clone(),
            stages: self.stages.clone(),
            no_start: self.start.no_start,
            migrate: self.start.migrate,
            launch: self.start.launch.clone(),
            runtime: self.emulator.clone(),
            read: self.stream.clone(),
            tables: self.tables.clone(),
            subscriptions: self.subscriptions(),
        }
    }

    pub fn declares_table(&self, table_name: &str) -> bool {
        self.tables
            .iter()
            .any(|table| table.table_name() == Some(table_name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartConfig {
    pub launch: LaunchOptions,
    pub migrate: bool,
    pub no_start: bool,
}

#[derive(Debug, Clone)]
pub struct LambdaConfig {
    pub host: String,
    pub port: u16,
}

impl LambdaConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionConfig {
    pub name: String,
    pub stream_events: Vec<StreamEventConfig>,
}

#[derive(Debug, Clone)]
pub struct StreamEventConfig {
    pub kind: String,
    pub table_name: String,
    pub batch_size: Option<u32>,
    pub enabled: bool,
    pub starting_position: Option<ShardIteratorType>,
}

impl StreamEventConfig {
    pub fn is_dynamodb(&self) -> bool {
        self.kind.eq_ignore_ascii_case(DYNAMODB_STREAM_EVENT)
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
    /// Number of stacks tables were collected from, default stack included.
    pub stacks: usize,
}

pub(crate) fn is_table(kind: &str) -> bool {
    kind == TABLE_RESOURCE_TYPE
}
