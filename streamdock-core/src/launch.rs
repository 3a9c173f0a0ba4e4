//! Launch parameters for DynamoDB Local and the command line derived from them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Native library directory shipped next to `DynamoDBLocal.jar`.
pub const NATIVE_LIB_DIR: &str = "DynamoDBLocal_lib";
pub const EMULATOR_JAR: &str = "DynamoDBLocal.jar";

/// Where the emulator keeps its tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    #[default]
    InMemory,
    OnDisk(PathBuf),
}

/// How a single emulator instance should be started.
///
/// Built once from configuration and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub port: Option<u16>,
    /// Host used to reach the emulator once it is running.
    pub host: Option<String>,
    pub heap_initial: Option<String>,
    pub heap_max: Option<String>,
    pub persistence: Persistence,
    pub cors: Option<String>,
    pub shared_db: bool,
    pub delay_transient_statuses: bool,
    pub optimize_db_before_startup: bool,
}

impl LaunchOptions {
    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn resolved_host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    /// Base URL clients use to talk to this instance.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.resolved_host(), self.resolved_port())
    }

    /// Emulator arguments in the order DynamoDB Local expects them.
    pub fn command_args(&self, install_dir: &Path) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(heap) = &self.heap_initial {
            args.push(format!("-Xms{heap}"));
        }
        if let Some(heap) = &self.heap_max {
            args.push(format!("-Xmx{heap}"));
        }

        args.push(format!(
            "-Djava.library.path={}",
            install_dir.join(NATIVE_LIB_DIR).display()
        ));
        args.push("-jar".to_string());
        args.push(EMULATOR_JAR.to_string());

        if let Some(origin) = &self.cors {
            args.push("-cors".to_string());
            args.push(origin.clone());
        }

        match &self.persistence {
            Persistence::OnDisk(path) => {
                args.push("-dbPath".to_string());
                args.push(path.display().to_string());
            }
            Persistence::InMemory => args.push("-inMemory".to_string()),
        }

        if self.delay_transient_statuses {
            args.push("-delayTransientStatuses".to_string());
        }
        if self.optimize_db_before_startup {
            args.push("-optimizeDbBeforeStartup".to_string());
        }

        args.push("-port".to_string());
        args.push(self.resolved_port().to_string());

        if self.shared_db {
            args.push("-sharedDb".to_string());
        }

        args
    }
}

/// Installation-specific knobs for running the emulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorRuntime {
    /// Java executable.
    pub java: String,
    /// Extra arguments placed before everything derived from [`LaunchOptions`].
    pub java_args: Vec<String>,
    /// Directory holding `DynamoDBLocal.jar`; also the child's working
    /// directory.
    pub install_dir: PathBuf,
    pub startup_timeout: Option<Duration>,
}

impl EmulatorRuntime {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            ..Self::default()
        }
    }

    /// Full argument vector passed to [`EmulatorRuntime::java`].
    pub fn argv(&self, options: &LaunchOptions) -> Vec<String> {
        let mut argv = self.java_args.clone();
        argv.extend(options.command_args(&self.install_dir));
        argv
    }
}

impl Default for EmulatorRuntime {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            java_args: Vec::new(),
            install_dir: PathBuf::from(".dynamodb"),
            startup_timeout: Some(Duration::from_secs(60)),
        }
    }
}
