#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use streamdock_core::cursor::IteratorRequest;
use streamdock_core::streams::{
    GetRecordsOutput, Shard, StreamDescription, TableDescription,
};
use streamdock_core::{
    Invoker, Result, StreamdockError, StreamsApi, TableApi,
};

pub fn record(id: &str) -> Value {
    json!({
        "eventID": id,
        "eventName": "INSERT",
        "dynamodb": {"Keys": {"id": {"S": id}}}
    })
}

pub fn arn(table: &str) -> String {
    format!(
        "arn:aws:dynamodb:ddblocal:000000000000:table/{table}\
         /stream/2024-01-01T00:00:00.000"
    )
}

enum Page {
    Records(GetRecordsOutput),
    Idle,
    Fail(String),
}

/// Streams API answering from a fixed script of tables, shards and pages.
#[derive(Default)]
pub struct ScriptedStreams {
    tables: HashMap<String, Option<String>>,
    shards: HashMap<String, Vec<Shard>>,
    iterators: HashMap<String, Option<String>>,
    pages: HashMap<String, Page>,
    pub created: Mutex<Vec<Value>>,
    pub iterator_requests: Mutex<Vec<(String, IteratorRequest)>>,
    pub fetched: Mutex<Vec<String>>,
    pub limits: Mutex<Vec<u32>>,
}

impl ScriptedStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: &str) -> Self {
        self.tables.insert(name.to_string(), Some(arn(name)));
        self
    }

    pub fn table_without_stream(mut self, name: &str) -> Self {
        self.tables.insert(name.to_string(), None);
        self
    }

    /// Adds a shard to `table`'s stream handing out `token` as its first
    /// iterator.
    pub fn shard(
        mut self,
        table: &str,
        shard_id: &str,
        token: Option<&str>,
    ) -> Self {
        self.shards
            .entry(arn(table))
            .or_default()
            .push(Shard::new(shard_id));
        self.iterators
            .insert(shard_id.to_string(), token.map(str::to_string));
        self
    }

    pub fn page(
        mut self,
        token: &str,
        records: Vec<Value>,
        next: Option<&str>,
    ) -> Self {
        self.pages.insert(
            token.to_string(),
            Page::Records(GetRecordsOutput {
                records,
                next_shard_iterator: next.map(str::to_string),
            }),
        );
        self
    }

    /// Empty page pointing back at the same token, like an open shard with
    /// no traffic.
    pub fn idle(mut self, token: &str) -> Self {
        self.pages.insert(token.to_string(), Page::Idle);
        self
    }

    pub fn failing_page(mut self, token: &str, reason: &str) -> Self {
        self.pages
            .insert(token.to_string(), Page::Fail(reason.to_string()));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().len()
    }

    pub fn limits(&self) -> Vec<u32> {
        self.limits.lock().clone()
    }
}

#[async_trait]
impl StreamsApi for ScriptedStreams {
    async fn describe_table(
        &self,
        table_name: &str,
    ) -> Result<TableDescription> {
        match self.tables.get(table_name) {
            Some(stream_arn) => Ok(TableDescription {
                table_name: Some(table_name.to_string()),
                table_status: Some("ACTIVE".to_string()),
                latest_stream_arn: stream_arn.clone(),
            }),
            None => Err(StreamdockError::Service {
                code: "ResourceNotFoundException".to_string(),
                message: format!(
                    "Requested resource not found: Table: {table_name} not found"
                ),
            }),
        }
    }

    async fn describe_stream(
        &self,
        stream_arn: &str,
    ) -> Result<StreamDescription> {
        Ok(StreamDescription {
            stream_arn: Some(stream_arn.to_string()),
            stream_status: Some("ENABLED".to_string()),
            shards: self.shards.get(stream_arn).cloned().unwrap_or_default(),
            last_evaluated_shard_id: None,
        })
    }

    async fn get_shard_iterator(
        &self,
        _stream_arn: &str,
        shard_id: &str,
        request: &IteratorRequest,
    ) -> Result<Option<String>> {
        self.iterator_requests
            .lock()
            .push((shard_id.to_string(), request.clone()));
        Ok(self.iterators.get(shard_id).cloned().flatten())
    }

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: u32,
    ) -> Result<GetRecordsOutput> {
        self.fetched.lock().push(shard_iterator.to_string());
        self.limits.lock().push(limit);
        match self.pages.get(shard_iterator) {
            Some(Page::Records(output)) => Ok(output.clone()),
            Some(Page::Idle) => Ok(GetRecordsOutput {
                records: Vec::new(),
                next_shard_iterator: Some(shard_iterator.to_string()),
            }),
            Some(Page::Fail(reason)) => Err(StreamdockError::Service {
                code: "InternalServerError".to_string(),
                message: reason.clone(),
            }),
            None => Err(StreamdockError::Service {
                code: "ExpiredIteratorException".to_string(),
                message: format!("unknown iterator {shard_iterator}"),
            }),
        }
    }
}

#[async_trait]
impl TableApi for ScriptedStreams {
    async fn create_table(&self, properties: &Value) -> Result<()> {
        self.created.lock().push(properties.clone());
        Ok(())
    }
}

/// Invoker remembering every call; selected functions fail.
#[derive(Default)]
pub struct RecordingInvoker {
    pub calls: Mutex<Vec<(String, Value)>>,
    failing: HashSet<String>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(function: &str) -> Self {
        Self {
            failing: HashSet::from([function.to_string()]),
            ..Self::default()
        }
    }

    pub fn calls_for(&self, function: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == function)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &Value,
    ) -> Result<()> {
        self.calls
            .lock()
            .push((function_name.to_string(), payload.clone()));
        if self.failing.contains(function_name) {
            return Err(StreamdockError::Invocation {
                function: function_name.to_string(),
                reason: "handler returned 500".to_string(),
            });
        }
        Ok(())
    }
}
