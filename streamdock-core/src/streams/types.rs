use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableDescription {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub table_status: Option<String>,
    #[serde(default)]
    pub latest_stream_arn: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SequenceNumberRange {
    #[serde(default)]
    pub starting_sequence_number: Option<String>,
    #[serde(default)]
    pub ending_sequence_number: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Shard {
    pub shard_id: String,
    #[serde(default)]
    pub parent_shard_id: Option<String>,
    #[serde(default)]
    pub sequence_number_range: Option<SequenceNumberRange>,
}

impl Shard {
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamDescription {
    #[serde(default)]
    pub stream_arn: Option<String>,
    #[serde(default)]
    pub stream_status: Option<String>,
    #[serde(default)]
    pub shards: Vec<Shard>,
    #[serde(default)]
    pub last_evaluated_shard_id: Option<String>,
}

/// One `GetRecords` page. Records are kept as raw JSON so they can be
/// forwarded to handlers untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetRecordsOutput {
    #[serde(default)]
    pub records: Vec<Value>,
    #[serde(default)]
    pub next_shard_iterator: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DescribeTableOutput {
    pub table: Option<TableDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DescribeStreamOutput {
    pub stream_description: Option<StreamDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GetShardIteratorOutput {
    #[serde(default)]
    pub shard_iterator: Option<String>,
}

/// Error body returned by the JSON protocol, e.g.
/// `{"__type":"com.amazonaws.dynamodb.v20120810#ResourceInUseException",
/// "message":"..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "__type", default)]
    pub kind: Option<String>,
    #[serde(alias = "Message", default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn code(&self) -> &str {
        self.kind
            .as_deref()
            .map(|kind| kind.rsplit('#').next().unwrap_or(kind))
            .unwrap_or("UnknownError")
    }
}
