use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use streamdock_config::loader::{compose_config, read_file_config};
use streamdock_config::models::sources::EnvConfig;
use streamdock_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, ConfigWarnings,
};
use streamdock_core::{Credentials, Persistence, ShardIteratorType};
use tempfile::TempDir;

const ORDERS_TOML: &str = r#"
service = "orders-api"
stage = "dev"
stages = ["dev", "test"]

[start]
port = 8123
migrate = true
cors = "*"
shared_db = true
heap_max = "1g"

[emulator]
install_dir = "/opt/dynamodb-local"
startup_timeout = "90s"

[stream]
start_after = "000042"
read_interval = 250

[lambda]
port = 3010

[resources.OrdersTable]
Type = "AWS::DynamoDB::Table"

[resources.OrdersTable.Properties]
TableName = "Orders"
BillingMode = "PAY_PER_REQUEST"
KeySchema = [{ AttributeName = "id", KeyType = "HASH" }]
StreamSpecification = { StreamViewType = "NEW_AND_OLD_IMAGES" }

[resources.OrdersQueue]
Type = "AWS::SQS::Queue"

[[additional_stacks]]
name = "audit"

[additional_stacks.resources.AuditTable]
Type = "AWS::DynamoDB::Table"
Properties = { TableName = "Audit" }

[[functions]]
name = "processOrders"

[[functions.events]]
stream = { type = "dynamodb", table_name = "Orders", batch_size = 10, starting_position = "TRIM_HORIZON" }

[[functions]]
name = "archiveOrders"

[[functions.events]]
stream = { type = "dynamodb", table_name = "Orders", enabled = false }

[[functions.events]]
stream = { type = "kinesis", table_name = "Clicks" }
"#;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("streamdock.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn mentions(warnings: &ConfigWarnings, needle: &str) -> bool {
    warnings
        .items
        .iter()
        .any(|warning| warning.message.contains(needle))
}

fn env_from(vars: &[(&str, &str)]) -> EnvConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    EnvConfig::from_lookup(|name| vars.get(name).cloned())
}

fn load(contents: &str) -> streamdock_config::ConfigLoad {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, contents);
    ConfigLoader::new()
        .with_config_path(&path)
        .with_env_file(dir.path().join("missing.env"))
        .load()
        .unwrap()
}

#[test]
fn loads_file_values() {
    let load = load(ORDERS_TOML);
    let config = &load.config;

    assert_eq!(config.service, "orders-api");
    assert_eq!(config.stage, "dev");
    assert!(config.stage_enabled());
    assert_eq!(config.region, "local");

    let launch = &config.start.launch;
    assert_eq!(launch.resolved_port(), 8123);
    assert_eq!(launch.persistence, Persistence::InMemory);
    assert_eq!(launch.cors.as_deref(), Some("*"));
    assert!(launch.shared_db);
    assert_eq!(launch.heap_max.as_deref(), Some("1g"));
    assert!(config.start.migrate);
    assert!(!config.start.no_start);

    assert_eq!(config.emulator.java, "java");
    assert_eq!(
        config.emulator.install_dir,
        PathBuf::from("/opt/dynamodb-local")
    );
    assert_eq!(
        config.emulator.startup_timeout,
        Some(Duration::from_secs(90))
    );

    assert_eq!(config.stream.start_after.as_deref(), Some("000042"));
    assert_eq!(config.stream.read_interval, Duration::from_millis(250));
    assert_eq!(config.lambda.endpoint(), "http://127.0.0.1:3010");
    assert_eq!(config.metadata.stacks, 2);
    assert!(!config.metadata.env_file_loaded);
}

#[test]
fn collects_tables_from_every_stack() {
    let config = load(ORDERS_TOML).config;

    let names: Vec<_> = config
        .tables
        .iter()
        .filter_map(|table| table.table_name())
        .collect();
    assert_eq!(names, vec!["Orders", "Audit"]);
    assert!(config.tables[0].has_stream());
}

#[test]
fn skipping_additional_stacks_keeps_default_tables() {
    let contents = format!("skip_additional_stacks = true\n{ORDERS_TOML}");
    let config = load(&contents).config;

    assert_eq!(config.tables.len(), 1);
    assert_eq!(config.metadata.stacks, 1);
}

#[test]
fn subscriptions_cover_dynamodb_events_only() {
    let load = load(ORDERS_TOML);
    let subscriptions = load.config.subscriptions();

    assert_eq!(subscriptions.len(), 2);
    let process = &subscriptions[0];
    assert_eq!(process.function_name, "processOrders");
    assert_eq!(process.table_name, "Orders");
    assert_eq!(process.resolved_batch_size(), 10);
    assert_eq!(
        process.starting_position,
        Some(ShardIteratorType::TrimHorizon)
    );
    assert!(process.enabled);

    let archive = &subscriptions[1];
    assert_eq!(archive.resolved_batch_size(), 20);
    assert!(!archive.enabled);

    assert!(mentions(&load.warnings, "'kinesis' is not dispatched"));

    let options = load.config.session_options();
    assert_eq!(options.subscriptions, subscriptions);
    assert_eq!(options.tables.len(), 2);
    assert!(options.migrate);
}

#[test]
fn environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let file =
        read_file_config(&write_config(&dir, ORDERS_TOML)).unwrap();
    let env = EnvConfig {
        stage: Some("ci".into()),
        port: Some(9000),
        db_path: Some(PathBuf::from("/tmp/ddb")),
        stream_iterator: Some("trim_horizon".into()),
        read_interval: Some("2s".into()),
        lambda_port: Some(3999),
        access_key_id: Some("AKIDEXAMPLE".into()),
        ..EnvConfig::default()
    };

    let load = compose_config(Some(file), env, None, true).unwrap();
    let config = load.config;

    assert_eq!(config.stage, "ci");
    assert!(!config.stage_enabled());
    assert_eq!(config.start.launch.resolved_port(), 9000);
    assert_eq!(
        config.start.launch.persistence,
        Persistence::OnDisk(PathBuf::from("/tmp/ddb"))
    );
    assert_eq!(config.stream.iterator, Some(ShardIteratorType::TrimHorizon));
    assert_eq!(config.stream.read_interval, Duration::from_secs(2));
    assert_eq!(config.lambda.port, 3999);
    assert_eq!(config.credentials.access_key_id, "AKIDEXAMPLE");
    assert_eq!(
        config.credentials.secret_access_key,
        "localAwsSecretAccessKey"
    );
    assert_eq!(config.invoker_config().stage, "ci");
    assert!(config.metadata.env_file_loaded);

    assert!(mentions(&load.warnings, "stage 'ci' is not listed"));
    assert!(mentions(&load.warnings, "start_at/start_after are ignored"));
}

#[test]
fn defaults_apply_without_file() {
    let env = EnvConfig {
        service: Some("orders-api".into()),
        no_start: Some(true),
        ..EnvConfig::default()
    };

    let load = compose_config(None, env, None, false).unwrap();
    let config = &load.config;

    assert_eq!(config.stage, "dev");
    assert!(config.stages.is_empty());
    assert_eq!(config.start.launch.endpoint(), "http://127.0.0.1:8000");
    assert_eq!(config.stream.read_interval, Duration::from_millis(500));
    assert_eq!(config.stream.iterator, None);
    assert_eq!(config.lambda.endpoint(), "http://127.0.0.1:3002");
    assert_eq!(config.client_config().endpoint, "http://127.0.0.1:8000");
    assert_eq!(
        config.emulator.startup_timeout,
        Some(Duration::from_secs(60))
    );
    assert!(mentions(&load.warnings, "No streamdock.toml detected"));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .with_env_file(dir.path().join("missing.env"))
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "service = [unterminated");

    let err = read_file_config(&path).unwrap_err();
    match err {
        ConfigLoadError::Parse { path: reported, .. } => {
            assert_eq!(reported, path)
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn guard_rails_reject_bad_values() {
    let env = EnvConfig {
        service: Some("orders-api".into()),
        ..EnvConfig::default()
    };
    let err = compose_config(None, EnvConfig::default(), None, false)
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::MissingService)
    ));

    let clash = EnvConfig {
        port: Some(3002),
        ..env.clone()
    };
    let err = compose_config(None, clash, None, false).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::PortConflict {
            port: 3002
        })
    ));

    let zero = EnvConfig {
        read_interval: Some("0ms".into()),
        ..env.clone()
    };
    let err = compose_config(None, zero, None, false).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroReadInterval)
    ));

    let bad_iterator = EnvConfig {
        stream_iterator: Some("OLDEST".into()),
        ..env
    };
    let err = compose_config(None, bad_iterator, None, false).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::InvalidValue {
            field: "stream.iterator",
            ..
        }
    ));
}

#[test]
fn oversized_batch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let file = read_file_config(&write_config(
        &dir,
        r#"
service = "orders-api"

[[functions]]
name = "processOrders"

[[functions.events]]
stream = { type = "dynamodb", table_name = "Orders", batch_size = 5000 }
"#,
    ))
    .unwrap();

    let err = compose_config(Some(file), EnvConfig::default(), None, false)
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::InvalidBatchSize {
            batch_size: 5000,
            ..
        })
    ));
}

#[test]
fn undeclared_stream_table_is_a_warning() {
    let dir = TempDir::new().unwrap();
    let file = read_file_config(&write_config(
        &dir,
        r#"
service = "orders-api"

[start]
no_start = true

[resources.PlainTable]
Type = "AWS::DynamoDB::Table"
Properties = { TableName = "Plain" }

[[functions]]
name = "processOrders"

[[functions.events]]
stream = { type = "dynamodb", table_name = "Orders" }

[[functions]]
name = "processPlain"

[[functions.events]]
stream = { type = "dynamodb", table_name = "Plain" }
"#,
    ))
    .unwrap();

    let load =
        compose_config(Some(file), EnvConfig::default(), None, false).unwrap();

    assert!(mentions(&load.warnings, "'Orders' which no stack declares"));
    assert!(mentions(
        &load.warnings,
        "table 'Plain' has no StreamSpecification"
    ));
    assert!(!mentions(&load.warnings, "not found in"));
}

#[test]
fn environment_variables_are_parsed() {
    let env = env_from(&[
        ("STREAMDOCK_SERVICE", "orders-api"),
        ("STREAMDOCK_STAGE", "  "),
        ("STREAMDOCK_STAGES", "dev, ,test"),
        ("STREAMDOCK_PORT", " 8124 "),
        ("STREAMDOCK_LAMBDA_PORT", "not-a-port"),
        ("STREAMDOCK_NO_START", "Yes"),
        ("STREAMDOCK_MIGRATE", "off"),
        ("STREAMDOCK_IN_MEMORY", "maybe"),
        ("STREAMDOCK_DB_PATH", "/tmp/ddb"),
        ("STREAMDOCK_ACCESS_KEY_ID", "localKey"),
        ("STREAMDOCK_SECRET_ACCESS_KEY", "localSecret"),
    ]);

    assert_eq!(env.service.as_deref(), Some("orders-api"));
    assert_eq!(env.stage, None);
    assert_eq!(
        env.stages,
        Some(vec!["dev".to_string(), "test".to_string()])
    );
    assert_eq!(env.port, Some(8124));
    assert_eq!(env.lambda_port, None);
    assert_eq!(env.no_start, Some(true));
    assert_eq!(env.migrate, Some(false));
    assert_eq!(env.in_memory, None);
    assert_eq!(env.db_path, Some(PathBuf::from("/tmp/ddb")));

    let config = compose_config(None, env, None, false).unwrap().config;
    assert_eq!(config.credentials.access_key_id, "localKey");
    assert_eq!(config.credentials.secret_access_key, "localSecret");
}

#[test]
fn ambient_aws_credentials_are_ignored() {
    let env = env_from(&[
        ("STREAMDOCK_SERVICE", "orders-api"),
        ("AWS_ACCESS_KEY_ID", "AKIAREALACCOUNT"),
        ("AWS_SECRET_ACCESS_KEY", "real-secret"),
    ]);

    assert_eq!(env.access_key_id, None);
    assert_eq!(env.secret_access_key, None);

    let config = compose_config(None, env, None, false).unwrap().config;
    assert_eq!(config.credentials, Credentials::default());
}
