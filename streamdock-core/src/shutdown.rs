//! Process-wide shutdown coordination.
//!
//! A single [`ShutdownCoordinator`] is created at program start. It owns the
//! cancellation token every long-running loop listens to and an ordered list
//! of cleanup callbacks (killing emulator processes, mostly). OS signals, a
//! panic, or the [`ShutdownGuard`] going out of scope at the end of `main` all
//! funnel into [`ShutdownCoordinator::shutdown`], which runs the callbacks
//! once. A second signal while shutdown is still running exits the process.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Exit status used when a repeated signal cuts a graceful shutdown short.
pub const FORCED_EXIT_CODE: i32 = 130;

/// What the signal task should do after a signal arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal; graceful shutdown has started.
    Shutdown,
    /// Shutdown was already underway; exit without waiting for it.
    ForceExit,
}

struct Inner {
    token: CancellationToken,
    callbacks: Mutex<Vec<(String, Cleanup)>>,
    shut_down: AtomicBool,
    signals_installed: AtomicBool,
    panic_hook_installed: AtomicBool,
}

#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .inner
            .callbacks
            .try_lock()
            .map(|guard| guard.len())
            .unwrap_or_default();
        f.debug_struct("ShutdownCoordinator")
            .field("pending_callbacks", &pending)
            .field("shut_down", &self.is_shutting_down())
            .field(
                "signals_installed",
                &self.inner.signals_installed.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                callbacks: Mutex::new(Vec::new()),
                shut_down: AtomicBool::new(false),
                signals_installed: AtomicBool::new(false),
                panic_hook_installed: AtomicBool::new(false),
            }),
        }
    }

    /// Token cancelled as soon as shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Registers a cleanup callback. Callbacks run in registration order.
    ///
    /// Registering after shutdown has already happened runs the callback
    /// immediately so late resources are not leaked.
    pub fn register<F>(&self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        {
            let mut callbacks = self.inner.callbacks.lock();
            if !self.is_shutting_down() {
                debug!(callback = %name, "registered shutdown callback");
                callbacks.push((name, Box::new(callback)));
                return;
            }
        }

        warn!(
            callback = %name,
            "shutdown already in progress; running callback now"
        );
        callback();
    }

    /// Cancels the token and runs every registered callback exactly once.
    pub fn shutdown(&self) {
        if self
            .inner
            .shut_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!("Initiating shutdown");
        self.inner.token.cancel();

        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
        for (name, callback) in callbacks {
            debug!(callback = %name, "running shutdown callback");
            callback();
        }
    }

    /// Resolves once shutdown has started.
    pub async fn wait_for_shutdown(&self) {
        self.inner.token.cancelled().await;
    }

    /// Reacts to a termination signal: the first one starts a graceful
    /// shutdown, any later one asks for an immediate exit.
    pub fn handle_signal(&self, signal: &str) -> SignalAction {
        if self.is_shutting_down() {
            warn!(signal, "received another signal during shutdown; exiting");
            return SignalAction::ForceExit;
        }
        info!(signal, "received termination signal");
        self.shutdown();
        SignalAction::Shutdown
    }

    /// Subscribes to termination signals. Must be called from within a Tokio
    /// runtime. Returns `Ok(false)` when the handlers were already installed.
    pub fn install_signal_handlers(&self) -> io::Result<bool> {
        if self
            .inner
            .signals_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        let coordinator = self.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigusr1 = signal(SignalKind::user_defined1())?;
            let mut sigusr2 = signal(SignalKind::user_defined2())?;

            tokio::spawn(async move {
                loop {
                    let received = tokio::select! {
                        _ = sigint.recv() => "SIGINT",
                        _ = sigterm.recv() => "SIGTERM",
                        _ = sigusr1.recv() => "SIGUSR1",
                        _ = sigusr2.recv() => "SIGUSR2",
                    };
                    if coordinator.handle_signal(received)
                        == SignalAction::ForceExit
                    {
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                }
            });
        }

        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                loop {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "failed to listen for Ctrl+C");
                        return;
                    }
                    if coordinator.handle_signal("Ctrl+C")
                        == SignalAction::ForceExit
                    {
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                }
            });
        }

        Ok(true)
    }

    /// Chains a panic hook that runs shutdown before the previous hook.
    pub fn install_panic_hook(&self) {
        if self
            .inner
            .panic_hook_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let coordinator = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            coordinator.shutdown();
            previous(panic_info);
        }));
    }

    /// Guard that triggers shutdown when dropped, covering normal returns
    /// from `main` as well as early `?` exits.
    pub fn guard(&self) -> ShutdownGuard {
        ShutdownGuard {
            coordinator: self.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ShutdownGuard {
    coordinator: ShutdownCoordinator,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.coordinator.shutdown();
    }
}
