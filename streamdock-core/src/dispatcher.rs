//! Change-stream polling and batch delivery.
//!
//! [`StreamDispatcher::dispatch`] resolves a table's stream, then runs one
//! independent polling loop per shard. Each loop fetches a batch, hands
//! non-empty batches to the [`Invoker`] as `{"Records": [...]}`, and waits the
//! read interval before fetching again. Delivery is at-least-once and nothing
//! is checkpointed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cursor::{
    IteratorRequest, ShardCursor, ShardIteratorType, StreamReadConfig,
    initial_iterator,
};
use crate::error::{Result, StreamdockError};
use crate::invoker::Invoker;
use crate::streams::{GetRecordsOutput, StreamsApi};

pub const DEFAULT_BATCH_SIZE: u32 = 20;

/// A function's subscription to one table's change stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSubscription {
    pub function_name: String,
    pub table_name: String,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Recorded for diagnostics only; see [`initial_iterator`].
    #[serde(default)]
    pub starting_position: Option<ShardIteratorType>,
}

fn enabled_by_default() -> bool {
    true
}

impl StreamSubscription {
    pub fn new(
        function_name: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            table_name: table_name.into(),
            batch_size: None,
            enabled: true,
            starting_position: None,
        }
    }

    pub fn resolved_batch_size(&self) -> u32 {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

/// Why a shard loop stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardExit {
    /// The stream returned no next iterator.
    Exhausted,
    /// No initial iterator was handed out for the shard.
    NoIterator,
    Cancelled,
}

/// Final state of one shard loop.
#[derive(Debug)]
pub struct ShardReport {
    pub shard_id: String,
    pub outcome: Result<ShardExit>,
    pub fetches: u64,
    pub invocations: u64,
    pub records: u64,
}

impl ShardReport {
    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    fn log(&self, function: &str) {
        match &self.outcome {
            Ok(exit) => info!(
                function,
                shard = %self.shard_id,
                exit = ?exit,
                fetches = self.fetches,
                invocations = self.invocations,
                records = self.records,
                "shard finished"
            ),
            Err(err) => warn!(
                function,
                shard = %self.shard_id,
                error = %err,
                fetches = self.fetches,
                invocations = self.invocations,
                "shard failed"
            ),
        }
    }
}

#[derive(Debug, Default)]
struct ShardStats {
    fetches: u64,
    invocations: u64,
    records: u64,
}

type ShardKey = (String, String, String);

/// Starts shard loops for stream subscriptions.
#[derive(Debug)]
pub struct StreamDispatcher<S: ?Sized, I: ?Sized> {
    streams: Arc<S>,
    invoker: Arc<I>,
    config: StreamReadConfig,
    shutdown: CancellationToken,
    claimed: Mutex<HashSet<ShardKey>>,
}

impl<S, I> StreamDispatcher<S, I>
where
    S: StreamsApi + ?Sized + 'static,
    I: Invoker + ?Sized + 'static,
{
    pub fn new(
        streams: Arc<S>,
        invoker: Arc<I>,
        config: StreamReadConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            streams,
            invoker,
            config,
            shutdown,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Resolves the subscription's stream and spawns a loop for every shard
    /// not already being polled for this function. Never waits on the loops.
    pub async fn dispatch(
        &self,
        subscription: &StreamSubscription,
    ) -> DispatchHandle {
        let mut handle =
            DispatchHandle::new(subscription, self.shutdown.child_token());

        if !subscription.enabled {
            debug!(
                function = %subscription.function_name,
                table = %subscription.table_name,
                "subscription disabled"
            );
            return handle;
        }

        let described = self.describe(&subscription.table_name).await;
        let (stream_arn, shards) = match described {
            Ok(Some(found)) => found,
            Ok(None) => return handle,
            Err(err) => {
                warn!(
                    function = %subscription.function_name,
                    table = %subscription.table_name,
                    error = %err,
                    "stream description unavailable; subscription inactive"
                );
                handle.unavailable = Some(err);
                return handle;
            }
        };

        let request = initial_iterator(&self.config);
        if let Some(hint) = subscription.starting_position
            && hint != request.iterator_type
        {
            debug!(
                function = %subscription.function_name,
                hint = %hint,
                iterator = %request.iterator_type,
                "starting position hint not applied"
            );
        }

        for shard_id in shards {
            let key = (
                subscription.function_name.clone(),
                stream_arn.clone(),
                shard_id.clone(),
            );
            if !self.claimed.lock().insert(key) {
                debug!(
                    function = %subscription.function_name,
                    shard = %shard_id,
                    "shard already polled"
                );
                continue;
            }

            let shard = ShardLoop {
                streams: Arc::clone(&self.streams),
                invoker: Arc::clone(&self.invoker),
                function: subscription.function_name.clone(),
                stream_arn: stream_arn.clone(),
                shard_id: shard_id.clone(),
                batch_size: subscription.resolved_batch_size(),
                read_interval: self.config.read_interval,
                request: request.clone(),
                cancel: handle.cancel.clone(),
            };
            handle.tasks.push((shard_id, tokio::spawn(shard.run())));
        }

        info!(
            function = %subscription.function_name,
            table = %subscription.table_name,
            stream = %stream_arn,
            shards = handle.tasks.len(),
            "dispatching stream records"
        );
        handle.stream_arn = Some(stream_arn);
        handle
    }

    /// Stream ARN and shard ids, or `None` when the table has no stream.
    async fn describe(
        &self,
        table_name: &str,
    ) -> Result<Option<(String, Vec<String>)>> {
        let unavailable = |err: StreamdockError| {
            StreamdockError::StreamDescriptionUnavailable {
                resource: table_name.to_string(),
                reason: err.to_string(),
            }
        };

        let table = self
            .streams
            .describe_table(table_name)
            .await
            .map_err(unavailable)?;
        let Some(stream_arn) = table.latest_stream_arn else {
            info!(table = %table_name, "table has no stream; nothing to do");
            return Ok(None);
        };

        let description = self
            .streams
            .describe_stream(&stream_arn)
            .await
            .map_err(unavailable)?;
        if description.shards.is_empty() {
            info!(
                table = %table_name,
                stream = %stream_arn,
                "stream has no shards"
            );
            return Ok(None);
        }

        let shards = description
            .shards
            .into_iter()
            .map(|shard| shard.shard_id)
            .collect();
        Ok(Some((stream_arn, shards)))
    }
}

struct ShardLoop<S: ?Sized, I: ?Sized> {
    streams: Arc<S>,
    invoker: Arc<I>,
    function: String,
    stream_arn: String,
    shard_id: String,
    batch_size: u32,
    read_interval: Duration,
    request: IteratorRequest,
    cancel: CancellationToken,
}

impl<S, I> ShardLoop<S, I>
where
    S: StreamsApi + ?Sized,
    I: Invoker + ?Sized,
{
    async fn run(self) -> ShardReport {
        let mut stats = ShardStats::default();
        let outcome = self.poll(&mut stats).await;

        match &outcome {
            Ok(exit) => debug!(
                function = %self.function,
                shard = %self.shard_id,
                exit = ?exit,
                fetches = stats.fetches,
                "shard loop finished"
            ),
            Err(err) => warn!(
                function = %self.function,
                shard = %self.shard_id,
                error = %err,
                "shard loop failed"
            ),
        }

        ShardReport {
            shard_id: self.shard_id,
            outcome,
            fetches: stats.fetches,
            invocations: stats.invocations,
            records: stats.records,
        }
    }

    async fn poll(&self, stats: &mut ShardStats) -> Result<ShardExit> {
        let initial = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(ShardExit::Cancelled),
            result = self.streams.get_shard_iterator(
                &self.stream_arn,
                &self.shard_id,
                &self.request,
            ) => result.map_err(|err| self.fetch_error(err))?,
        };
        let Some(token) = initial else {
            debug!(shard = %self.shard_id, "no shard iterator returned");
            return Ok(ShardExit::NoIterator);
        };

        let mut cursor = ShardCursor::new(
            self.stream_arn.as_str(),
            self.shard_id.as_str(),
            token,
        );
        loop {
            let page = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(ShardExit::Cancelled),
                result = self.streams.get_records(
                    cursor.token(),
                    self.batch_size,
                ) => result.map_err(|err| self.fetch_error(err))?,
            };
            stats.fetches += 1;

            let GetRecordsOutput {
                records,
                next_shard_iterator,
            } = page;

            if !records.is_empty() {
                let count = records.len() as u64;
                let payload = json!({ "Records": records });
                self.invoker
                    .invoke(&self.function, &payload)
                    .await
                    .map_err(|err| self.invocation_error(err))?;
                stats.invocations += 1;
                stats.records += count;
                debug!(
                    function = %self.function,
                    shard = %self.shard_id,
                    records = count,
                    "batch delivered"
                );
            }

            let Some(next) = next_shard_iterator else {
                return Ok(ShardExit::Exhausted);
            };
            cursor = cursor.advance(next);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Ok(ShardExit::Cancelled);
                }
                _ = tokio::time::sleep(self.read_interval) => {}
            }
        }
    }

    fn fetch_error(&self, err: StreamdockError) -> StreamdockError {
        match err {
            err @ StreamdockError::ShardFetch { .. } => err,
            other => StreamdockError::ShardFetch {
                shard_id: self.shard_id.clone(),
                reason: other.to_string(),
            },
        }
    }

    fn invocation_error(&self, err: StreamdockError) -> StreamdockError {
        match err {
            err @ StreamdockError::Invocation { .. } => err,
            other => StreamdockError::Invocation {
                function: self.function.clone(),
                reason: other.to_string(),
            },
        }
    }
}

/// The shard loops started for one subscription.
///
/// Dropping the handle leaves the loops running; use
/// [`DispatchHandle::cancel`] to stop them.
#[derive(Debug)]
pub struct DispatchHandle {
    function: String,
    table: String,
    stream_arn: Option<String>,
    tasks: Vec<(String, JoinHandle<ShardReport>)>,
    cancel: CancellationToken,
    unavailable: Option<StreamdockError>,
}

impl DispatchHandle {
    fn new(
        subscription: &StreamSubscription,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            function: subscription.function_name.clone(),
            table: subscription.table_name.clone(),
            stream_arn: None,
            tasks: Vec::new(),
            cancel,
            unavailable: None,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn stream_arn(&self) -> Option<&str> {
        self.stream_arn.as_deref()
    }

    pub fn is_active(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn shard_count(&self) -> usize {
        self.tasks.len()
    }

    /// Why the stream could not be described, if that is why nothing runs.
    pub fn unavailable(&self) -> Option<&StreamdockError> {
        self.unavailable.as_ref()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for every shard loop to settle. One report per shard, in the
    /// order the stream listed them.
    pub async fn join(self) -> Vec<ShardReport> {
        let (shard_ids, tasks): (Vec<_>, Vec<_>) =
            self.tasks.into_iter().unzip();
        join_all(tasks)
            .await
            .into_iter()
            .zip(shard_ids)
            .map(|(joined, shard_id)| match joined {
                Ok(report) => report,
                Err(err) => ShardReport {
                    outcome: Err(StreamdockError::ShardFetch {
                        shard_id: shard_id.clone(),
                        reason: format!("shard task aborted: {err}"),
                    }),
                    shard_id,
                    fetches: 0,
                    invocations: 0,
                    records: 0,
                },
            })
            .collect()
    }

    /// Joins in the background and logs every shard report plus a summary
    /// once every loop settled. The returned handle resolves after the
    /// summary is written.
    pub fn detach(self) -> JoinHandle<()> {
        let function = self.function.clone();
        let table = self.table.clone();
        tokio::spawn(async move {
            if !self.is_active() {
                return;
            }
            let reports = self.join().await;
            for report in &reports {
                report.log(&function);
            }
            let shards = reports.len();
            let failed = reports.iter().filter(|r| r.is_failure()).count();
            let records: u64 = reports.iter().map(|r| r.records).sum();
            if failed > 0 {
                warn!(
                    function = %function,
                    table = %table,
                    shards,
                    failed,
                    records,
                    "stream dispatch ended with failures"
                );
            } else {
                info!(
                    function = %function,
                    table = %table,
                    shards,
                    records,
                    "stream dispatch ended"
                );
            }
        })
    }
}
