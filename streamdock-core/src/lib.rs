//! # Streamdock Core
//!
//! Runs DynamoDB Local as a supervised child process and forwards the change
//! streams of its tables to locally served handler functions, the way a
//! managed event-source mapping would in production.
//!
//! ## Architecture
//!
//! - [`supervisor`]: launches the emulator, waits for readiness, kills it on
//!   shutdown
//! - [`dispatcher`]: one polling loop per shard, batches delivered through an
//!   [`Invoker`]
//! - [`cursor`]: where a shard's first read starts
//! - [`streams`]: the table and stream API traits and their HTTP client
//! - [`provision`]: idempotent table creation
//! - [`session`]: ties the above together for one offline run
//! - [`shutdown`]: signal, panic and scope-exit cleanup
//!
//! Delivery is at-least-once and in-memory only; nothing is checkpointed.

pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod launch;
pub mod port_probe;
pub mod provision;
pub mod session;
pub mod shutdown;
pub mod sigv4;
pub mod streams;
pub mod supervisor;

pub use cursor::{
    ShardCursor, ShardIteratorType, StreamReadConfig, initial_iterator,
};
pub use dispatcher::{
    DispatchHandle, ShardExit, ShardReport, StreamDispatcher,
    StreamSubscription,
};
pub use error::{Result, StreamdockError};
pub use invoker::{Invoker, LambdaInvoker, LambdaInvokerConfig};
pub use launch::{EmulatorRuntime, LaunchOptions, Persistence};
pub use port_probe::is_port_available;
pub use provision::{CreateOutcome, TableResource};
pub use session::{OfflineSession, SessionOptions, SessionRun};
pub use shutdown::{ShutdownCoordinator, ShutdownGuard, SignalAction};
pub use sigv4::Credentials;
pub use streams::{ClientConfig, DynamoClient, StreamsApi, TableApi};
pub use supervisor::{EmulatorHandle, InstanceState, ProcessSupervisor};
