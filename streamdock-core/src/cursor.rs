//! Shard iterator positioning and the per-shard cursor.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardIteratorType {
    TrimHorizon,
    Latest,
    AtSequenceNumber,
    AfterSequenceNumber,
}

impl ShardIteratorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardIteratorType::TrimHorizon => "TRIM_HORIZON",
            ShardIteratorType::Latest => "LATEST",
            ShardIteratorType::AtSequenceNumber => "AT_SEQUENCE_NUMBER",
            ShardIteratorType::AfterSequenceNumber => "AFTER_SEQUENCE_NUMBER",
        }
    }
}

impl fmt::Display for ShardIteratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream-wide read settings shared by every subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamReadConfig {
    /// Iterator type forced for every shard.
    pub iterator: Option<ShardIteratorType>,
    pub start_at: Option<String>,
    pub start_after: Option<String>,
    /// Pause between two fetches on the same shard.
    pub read_interval: Duration,
}

impl Default for StreamReadConfig {
    fn default() -> Self {
        Self {
            iterator: None,
            start_at: None,
            start_after: None,
            read_interval: DEFAULT_READ_INTERVAL,
        }
    }
}

/// Parameters for the first `GetShardIterator` call of a shard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IteratorRequest {
    pub iterator_type: ShardIteratorType,
    pub sequence_number: Option<String>,
}

impl IteratorRequest {
    fn of(iterator_type: ShardIteratorType) -> Self {
        Self {
            iterator_type,
            sequence_number: None,
        }
    }

    fn anchored(
        iterator_type: ShardIteratorType,
        sequence_number: &str,
    ) -> Self {
        Self {
            iterator_type,
            sequence_number: Some(sequence_number.to_string()),
        }
    }
}

/// Resolves where a shard's first read starts.
///
/// Precedence: explicit iterator override, then `start_at`, then
/// `start_after`, then `LATEST`. A subscription's own starting-position hint
/// never takes part in this decision.
pub fn initial_iterator(config: &StreamReadConfig) -> IteratorRequest {
    use ShardIteratorType::{AfterSequenceNumber, AtSequenceNumber};

    if let Some(iterator) = config.iterator {
        IteratorRequest::of(iterator)
    } else if let Some(sequence) = config.start_at.as_deref() {
        IteratorRequest::anchored(AtSequenceNumber, sequence)
    } else if let Some(sequence) = config.start_after.as_deref() {
        IteratorRequest::anchored(AfterSequenceNumber, sequence)
    } else {
        IteratorRequest::of(ShardIteratorType::Latest)
    }
}

/// Position of one shard-polling loop. Each new iterator token produces a new
/// cursor; a cursor never carries more than one token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardCursor {
    stream_arn: String,
    shard_id: String,
    token: String,
}

impl ShardCursor {
    pub fn new(
        stream_arn: impl Into<String>,
        shard_id: impl Into<String>,
        token: String,
    ) -> Self {
        Self {
            stream_arn: stream_arn.into(),
            shard_id: shard_id.into(),
            token,
        }
    }

    pub fn stream_arn(&self) -> &str {
        &self.stream_arn
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Consumes the cursor and yields the one positioned at `next_token`.
    pub fn advance(self, next_token: String) -> Self {
        Self {
            token: next_token,
            ..self
        }
    }
}
