//! One offline run: emulator, tables, then stream dispatch.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cursor::StreamReadConfig;
use crate::dispatcher::{
    DispatchHandle, StreamDispatcher, StreamSubscription,
};
use crate::error::Result;
use crate::invoker::Invoker;
use crate::launch::{EmulatorRuntime, LaunchOptions};
use crate::provision::{CreateOutcome, TableResource, provision_tables};
use crate::streams::{StreamsApi, TableApi};
use crate::supervisor::{EmulatorHandle, ProcessSupervisor};

/// Everything a session needs, already resolved from configuration.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    pub stage: String,
    /// Stages the session runs for. Empty means every stage.
    pub stages: Vec<String>,
    /// Assume an emulator is already listening instead of launching one.
    pub no_start: bool,
    /// Create tables and dispatch streams once the emulator is up.
    pub migrate: bool,
    pub launch: LaunchOptions,
    pub runtime: EmulatorRuntime,
    pub read: StreamReadConfig,
    pub tables: Vec<TableResource>,
    pub subscriptions: Vec<StreamSubscription>,
}

impl SessionOptions {
    pub fn stage_enabled(&self) -> bool {
        self.stages.is_empty()
            || self.stages.iter().any(|stage| stage == &self.stage)
    }
}

/// What [`OfflineSession::run`] did.
#[derive(Debug, Default)]
pub struct SessionRun {
    /// `true` when the current stage is not in the configured stage list.
    pub skipped: bool,
    pub emulator: Option<EmulatorHandle>,
    pub tables: Vec<CreateOutcome>,
    pub dispatches: Vec<DispatchHandle>,
}

#[derive(Debug)]
pub struct OfflineSession<C: ?Sized, I: ?Sized> {
    options: SessionOptions,
    supervisor: ProcessSupervisor,
    client: Arc<C>,
    dispatcher: StreamDispatcher<C, I>,
}

impl<C, I> OfflineSession<C, I>
where
    C: StreamsApi + TableApi + ?Sized + 'static,
    I: Invoker + ?Sized + 'static,
{
    pub fn new(
        options: SessionOptions,
        supervisor: ProcessSupervisor,
        client: Arc<C>,
        invoker: Arc<I>,
        shutdown: CancellationToken,
    ) -> Self {
        let dispatcher = StreamDispatcher::new(
            Arc::clone(&client),
            invoker,
            options.read.clone(),
            shutdown,
        );
        Self {
            options,
            supervisor,
            client,
            dispatcher,
        }
    }

    pub async fn run(&self) -> Result<SessionRun> {
        let mut run = SessionRun::default();

        if !self.options.stage_enabled() {
            info!(
                stage = %self.options.stage,
                stages = ?self.options.stages,
                "stage not enabled; skipping DynamoDB Local"
            );
            run.skipped = true;
            return Ok(run);
        }

        if !self.options.no_start {
            let handle = self
                .supervisor
                .start(&self.options.runtime, &self.options.launch)
                .await?;
            info!(
                port = handle.port,
                "DynamoDB Local started, visit {}/shell",
                self.options.launch.endpoint()
            );
            run.emulator = Some(handle);
        }

        if !self.options.migrate {
            info!(
                "migrations disabled; skipping table creation and stream \
                 dispatch"
            );
            return Ok(run);
        }

        if self.options.tables.is_empty() {
            info!("no tables configured");
            return Ok(run);
        }
        run.tables =
            provision_tables(self.client.as_ref(), &self.options.tables)
                .await?;

        let subscriptions = &self.options.subscriptions;
        for subscription in subscriptions.iter().filter(|sub| sub.enabled) {
            run.dispatches.push(self.dispatcher.dispatch(subscription).await);
        }

        Ok(run)
    }

    /// Stops the emulator this session started, if any.
    pub fn shutdown(&self) {
        self.supervisor.stop_options(&self.options.launch);
    }
}
