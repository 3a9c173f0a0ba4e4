//! Contracts for the table and stream APIs exposed by the emulator.
//!
//! The dispatcher and provisioner only depend on [`StreamsApi`] and
//! [`TableApi`]; [`DynamoClient`] implements both over the DynamoDB JSON wire
//! protocol.

pub mod client;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::cursor::IteratorRequest;
use crate::error::Result;

pub use client::{ClientConfig, DynamoClient};
pub use types::{
    GetRecordsOutput, SequenceNumberRange, Shard, StreamDescription,
    TableDescription,
};

#[async_trait]
pub trait StreamsApi: Send + Sync {
    async fn describe_table(
        &self,
        table_name: &str,
    ) -> Result<TableDescription>;

    /// Full shard list of a stream; implementations follow pagination.
    async fn describe_stream(
        &self,
        stream_arn: &str,
    ) -> Result<StreamDescription>;

    async fn get_shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        request: &IteratorRequest,
    ) -> Result<Option<String>>;

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: u32,
    ) -> Result<GetRecordsOutput>;
}

#[async_trait]
pub trait TableApi: Send + Sync {
    /// Issues `CreateTable` with already-sanitized properties.
    async fn create_table(&self, properties: &Value) -> Result<()>;
}
