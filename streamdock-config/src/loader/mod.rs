pub mod error;

use once_cell::sync::Lazy;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use streamdock_core::cursor::DEFAULT_READ_INTERVAL;
use streamdock_core::invoker::DEFAULT_LAMBDA_PORT;
use streamdock_core::launch::DEFAULT_HOST;
use streamdock_core::streams::client::DEFAULT_REGION;
use streamdock_core::{
    Credentials, EmulatorRuntime, LaunchOptions, Persistence, StreamReadConfig,
    TableResource,
};

use crate::models::{
    Config, ConfigMetadata, FunctionConfig, LambdaConfig, StartConfig,
    StreamEventConfig, is_table,
    sources::{EnvConfig, FileConfig, FileResource},
};
use crate::util::{DurationValue, parse_iterator_type};
use crate::validation::{self, ConfigWarnings};
use error::ConfigLoadError;

pub const DEFAULT_STAGE: &str = "dev";

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("streamdock.toml"),
        PathBuf::from("config/streamdock.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| ()),
            None => dotenvy::dotenv().map(|_| ()),
        };
        let env_file_loaded = match loaded {
            Ok(()) => true,
            Err(dotenvy::Error::Io(_)) => false,
            Err(err) => return Err(err.into()),
        };

        let env_config = EnvConfig::gather();
        let (file_config, config_path) = self.load_file_config(&env_config)?;

        compose_config(file_config, env_config, config_path, env_file_loaded)
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit_path = &self.options.config_path;
        let (path, explicit) = if let Some(explicit) = explicit_path {
            (explicit.clone(), true)
        } else if let Some(from_env) = &env_config.config_path {
            (from_env.clone(), true)
        } else {
            match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(found) => (found.clone(), false),
                None => return Ok((None, None)),
            }
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

pub fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
    debug!(path = %path.display(), "parsing configuration file");
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

/// Merges file and environment values over the defaults, environment first,
/// then applies the guard rails.
pub fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
) -> Result<ConfigLoad, ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if file_config.is_none() {
        warnings.push_with_hint(
            "No streamdock.toml detected; falling back to environment variables",
            "Create streamdock.toml or point STREAMDOCK_CONFIG at one",
        );
    }

    let file = file_config.unwrap_or_default();

    let service = env.service.or(file.service).unwrap_or_default();
    let stage = env
        .stage
        .or(file.stage)
        .unwrap_or_else(|| DEFAULT_STAGE.to_string());
    let stages = env.stages.or(file.stages).unwrap_or_default();
    let region = env
        .region
        .or(file.region)
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let defaults = Credentials::default();
    let credentials = Credentials::new(
        env.access_key_id
            .or(file.credentials.access_key_id)
            .unwrap_or(defaults.access_key_id),
        env.secret_access_key
            .or(file.credentials.secret_access_key)
            .unwrap_or(defaults.secret_access_key),
    );

    let start_file = file.start;
    let db_path = env.db_path.or(start_file.db_path);
    let in_memory = env.in_memory.or(start_file.in_memory);
    let persistence = match db_path {
        Some(path) => {
            if in_memory == Some(true) {
                warnings
                    .push("start.db_path is set; start.in_memory is ignored");
            }
            Persistence::OnDisk(path)
        }
        None => Persistence::InMemory,
    };

    let launch = LaunchOptions {
        port: env.port.or(start_file.port),
        host: env.host.or(start_file.host),
        heap_initial: start_file.heap_initial,
        heap_max: start_file.heap_max,
        persistence,
        cors: start_file.cors,
        shared_db: start_file.shared_db.unwrap_or(false),
        delay_transient_statuses: start_file
            .delay_transient_statuses
            .unwrap_or(false),
        optimize_db_before_startup: start_file
            .optimize_db_before_startup
            .unwrap_or(false),
    };
    let start = StartConfig {
        launch,
        migrate: env.migrate.or(start_file.migrate).unwrap_or(false),
        no_start: env.no_start.or(start_file.no_start).unwrap_or(false),
    };

    let runtime_defaults = EmulatorRuntime::default();
    let startup_timeout = match env.startup_timeout.map(DurationValue::Text) {
        Some(value) => {
            Some(parse_duration("emulator.startup_timeout", &value)?)
        }
        None => match &file.emulator.startup_timeout {
            Some(value) => {
                Some(parse_duration("emulator.startup_timeout", value)?)
            }
            None => runtime_defaults.startup_timeout,
        },
    }
    .filter(|timeout| !timeout.is_zero());
    let emulator = EmulatorRuntime {
        java: env
            .java
            .or(file.emulator.java)
            .unwrap_or(runtime_defaults.java),
        java_args: file.emulator.java_args.unwrap_or_default(),
        install_dir: env
            .install_dir
            .or(file.emulator.install_dir)
            .unwrap_or(runtime_defaults.install_dir),
        startup_timeout,
    };

    let iterator = match &env.stream_iterator {
        Some(raw) => Some(parse_iterator_type(raw).ok_or_else(|| {
            ConfigLoadError::InvalidValue {
                field: "stream.iterator",
                value: raw.clone(),
            }
        })?),
        None => file.stream.iterator,
    };
    let read_interval = match env.read_interval.map(DurationValue::Text) {
        Some(value) => parse_duration("stream.read_interval", &value)?,
        None => match &file.stream.read_interval {
            Some(value) => parse_duration("stream.read_interval", value)?,
            None => DEFAULT_READ_INTERVAL,
        },
    };
    let stream = StreamReadConfig {
        iterator,
        start_at: file.stream.start_at,
        start_after: file.stream.start_after,
        read_interval,
    };

    let lambda = LambdaConfig {
        host: env
            .lambda_host
            .or(file.lambda.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env
            .lambda_port
            .or(file.lambda.port)
            .unwrap_or(DEFAULT_LAMBDA_PORT),
    };

    let skip_additional_stacks = env
        .skip_additional_stacks
        .or(file.skip_additional_stacks)
        .unwrap_or(false);
    let mut tables = collect_tables(&file.resources);
    let mut stacks = 1;
    if !skip_additional_stacks {
        for stack in &file.additional_stacks {
            tables.extend(collect_tables(&stack.resources));
            stacks += 1;
        }
    }

    let functions = file
        .functions
        .into_iter()
        .map(|function| FunctionConfig {
            name: function.name,
            stream_events: function
                .events
                .into_iter()
                .filter_map(|event| event.stream)
                .map(|stream| StreamEventConfig {
                    kind: stream.kind,
                    table_name: stream.table_name,
                    batch_size: stream.batch_size,
                    enabled: stream.enabled.unwrap_or(true),
                    starting_position: stream.starting_position,
                })
                .collect(),
        })
        .collect();

    let config = Config {
        service,
        stage,
        stages,
        region,
        credentials,
        start,
        emulator,
        stream,
        lambda,
        tables,
        functions,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded,
            stacks,
        },
    };

    let guard_warnings = validation::apply_guard_rails(&config)?;
    warnings.extend(guard_warnings);

    Ok(ConfigLoad { config, warnings })
}

fn collect_tables(
    resources: &BTreeMap<String, FileResource>,
) -> Vec<TableResource> {
    resources
        .iter()
        .filter(|(_, resource)| is_table(&resource.kind))
        .map(|(logical_id, resource)| {
            TableResource::new(logical_id.as_str(), resource.properties.clone())
        })
        .collect()
}

fn parse_duration(
    field: &'static str,
    value: &DurationValue,
) -> Result<Duration, ConfigLoadError> {
    value
        .resolve()
        .map_err(|source| ConfigLoadError::InvalidDuration {
            field,
            value: value.display(),
            source,
        })
}
