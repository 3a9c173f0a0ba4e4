//! Lifecycle of DynamoDB Local child processes.
//!
//! Instances are keyed by port. The registry is the only record of what is
//! running: an entry is inserted when the child is spawned and removed when
//! it is stopped, fails to come up, or is seen to exit.

use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StreamdockError};
use crate::launch::{EmulatorRuntime, LaunchOptions};
use crate::port_probe::is_port_available;
use crate::shutdown::ShutdownCoordinator;

/// Line DynamoDB Local prints once its configuration is parsed.
pub const READY_BANNER: &str =
    "Initializing DynamoDB Local with the following configuration";

const PROBE_INTERVAL: Duration = Duration::from_millis(100);
const EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Ready,
}

#[derive(Debug)]
struct EmulatorInstance {
    id: Uuid,
    pid: u32,
    state: InstanceState,
    child: Child,
}

/// Identifies a started emulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmulatorHandle {
    pub id: Uuid,
    pub pid: u32,
    pub port: u16,
}

type Registry = Arc<Mutex<HashMap<u16, EmulatorInstance>>>;

#[derive(Clone, Debug, Default)]
pub struct ProcessSupervisor {
    instances: Registry,
    coordinator: Option<ShutdownCoordinator>,
    cleanup_registered: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supervisor whose instances are stopped when `coordinator` shuts down.
    pub fn with_shutdown(coordinator: ShutdownCoordinator) -> Self {
        Self {
            coordinator: Some(coordinator),
            ..Self::default()
        }
    }

    /// Spawns the emulator and resolves once it accepts connections.
    pub async fn start(
        &self,
        runtime: &EmulatorRuntime,
        options: &LaunchOptions,
    ) -> Result<EmulatorHandle> {
        let port = options.resolved_port();
        let id = Uuid::now_v7();
        let (pid, stdout) = self.spawn(runtime, options, port, id)?;

        let readiness = self.wait_until_ready(port, id, stdout);
        let outcome = match runtime.startup_timeout {
            Some(timeout) => tokio::time::timeout(timeout, readiness)
                .await
                .unwrap_or(Err(StreamdockError::StartupTimeout {
                    port,
                    timeout,
                })),
            None => readiness.await,
        };

        match outcome {
            Ok(true) => {}
            Ok(false) => {
                let status = self.reap(port, id).await;
                warn!(
                    port,
                    pid,
                    %status,
                    "DynamoDB Local exited during startup"
                );
                return Err(StreamdockError::ProcessExited { status });
            }
            Err(err) => {
                self.kill(port, id);
                return Err(err);
            }
        }

        if let Some(instance) = self.instances.lock().get_mut(&port)
            && instance.id == id
        {
            instance.state = InstanceState::Ready;
        }
        self.register_cleanup();

        info!(port, pid, instance = %id, "DynamoDB Local ready");
        Ok(EmulatorHandle { id, pid, port })
    }

    fn spawn(
        &self,
        runtime: &EmulatorRuntime,
        options: &LaunchOptions,
        port: u16,
        id: Uuid,
    ) -> Result<(u32, ChildStdout)> {
        let mut instances = self.instances.lock();
        if instances.contains_key(&port) {
            return Err(StreamdockError::InstanceAlreadyRunning { port });
        }

        let argv = runtime.argv(options);
        info!(
            port,
            java = %runtime.java,
            args = ?argv,
            "launching DynamoDB Local"
        );

        let mut child = Command::new(&runtime.java)
            .args(&argv)
            .current_dir(&runtime.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(StreamdockError::ProcessLaunch)?;

        let Some(pid) = child.id() else {
            return Err(StreamdockError::ProcessLaunch(io::Error::other(
                "emulator process has no pid",
            )));
        };
        let Some(stdout) = child.stdout.take() else {
            return Err(StreamdockError::ProcessLaunch(io::Error::other(
                "emulator stdout was not captured",
            )));
        };

        instances.insert(
            port,
            EmulatorInstance {
                id,
                pid,
                state: InstanceState::Starting,
                child,
            },
        );
        Ok((pid, stdout))
    }

    /// `Ok(false)` when stdout closed before the banner appeared.
    async fn wait_until_ready(
        &self,
        port: u16,
        id: Uuid,
        stdout: ChildStdout,
    ) -> Result<bool> {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let Some(line) = lines.next_line().await? else {
                return Ok(false);
            };
            info!(target: "streamdock::emulator", port, "{line}");
            if line.contains(READY_BANNER) {
                break;
            }
        }

        self.spawn_drain(port, id, lines);

        while is_port_available(port).await {
            if !self.owns(port, id) {
                return Err(StreamdockError::ProcessExited {
                    status: "exited before binding its port".to_string(),
                });
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
        Ok(true)
    }

    /// Keeps logging stdout after readiness and drops the registry entry once
    /// the process is seen to exit.
    fn spawn_drain(
        &self,
        port: u16,
        id: Uuid,
        mut lines: Lines<BufReader<ChildStdout>>,
    ) {
        let instances = Arc::clone(&self.instances);
        tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        info!(target: "streamdock::emulator", port, "{line}")
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!(
                            port,
                            error = %err,
                            "emulator stdout read failed"
                        );
                        break;
                    }
                }
            }

            loop {
                let exited = {
                    let mut guard = instances.lock();
                    let Some(instance) = guard
                        .get_mut(&port)
                        .filter(|instance| instance.id == id)
                    else {
                        return;
                    };
                    match instance.child.try_wait() {
                        Ok(Some(status)) => Some(status),
                        Ok(None) => None,
                        Err(err) => {
                            warn!(
                                port,
                                error = %err,
                                "failed to poll emulator status"
                            );
                            return;
                        }
                    }
                };

                if let Some(status) = exited {
                    instances.lock().remove(&port);
                    if status.success() {
                        info!(port, "DynamoDB Local stopped");
                    } else {
                        warn!(
                            port,
                            %status,
                            "DynamoDB Local exited unexpectedly"
                        );
                    }
                    return;
                }
                tokio::time::sleep(PROBE_INTERVAL).await;
            }
        });
    }

    fn owns(&self, port: u16, id: Uuid) -> bool {
        self.instances
            .lock()
            .get(&port)
            .is_some_and(|instance| instance.id == id)
    }

    fn take(&self, port: u16, id: Uuid) -> Option<EmulatorInstance> {
        let mut instances = self.instances.lock();
        if instances.get(&port).is_some_and(|instance| instance.id == id) {
            instances.remove(&port)
        } else {
            None
        }
    }

    fn kill(&self, port: u16, id: Uuid) {
        if let Some(mut instance) = self.take(port, id)
            && let Err(err) = instance.child.start_kill()
        {
            debug!(port, error = %err, "failed to kill emulator");
        }
    }

    /// Collects the exit status of a child whose stdout already closed.
    async fn reap(&self, port: u16, id: Uuid) -> String {
        let Some(mut instance) = self.take(port, id) else {
            return "unknown".to_string();
        };
        match tokio::time::timeout(EXIT_GRACE, instance.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(err)) => err.to_string(),
            Err(_) => {
                let _ = instance.child.start_kill();
                "stdout closed while the process kept running".to_string()
            }
        }
    }

    fn register_cleanup(&self) {
        let Some(coordinator) = &self.coordinator else {
            return;
        };
        if self
            .cleanup_registered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let supervisor = self.clone();
        coordinator
            .register("stop DynamoDB Local", move || supervisor.stop_all());
    }

    /// Kills the instance on `port`. Returns whether one was running.
    pub fn stop(&self, port: u16) -> bool {
        let Some(mut instance) = self.instances.lock().remove(&port) else {
            debug!(port, "no emulator registered; nothing to stop");
            return false;
        };

        if let Err(err) = instance.child.start_kill() {
            warn!(
                port,
                pid = instance.pid,
                error = %err,
                "failed to kill emulator"
            );
        }
        info!(port, pid = instance.pid, "DynamoDB Local stopped");
        true
    }

    pub fn stop_options(&self, options: &LaunchOptions) -> bool {
        self.stop(options.resolved_port())
    }

    pub fn stop_all(&self) {
        for port in self.running_ports() {
            self.stop(port);
        }
    }

    pub fn is_running(&self, port: u16) -> bool {
        self.instances.lock().contains_key(&port)
    }

    pub fn state(&self, port: u16) -> Option<InstanceState> {
        self.instances.lock().get(&port).map(|instance| instance.state)
    }

    pub fn instance(&self, port: u16) -> Option<EmulatorHandle> {
        self.instances.lock().get(&port).map(|instance| EmulatorHandle {
            id: instance.id,
            pid: instance.pid,
            port,
        })
    }

    pub fn running_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> =
            self.instances.lock().keys().copied().collect();
        ports.sort_unstable();
        ports
    }
}
