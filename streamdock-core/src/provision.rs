//! Idempotent creation of the configured tables.

use futures::future::try_join_all;
use serde_json::{Value, json};
use tracing::info;

use crate::error::Result;
use crate::streams::TableApi;

pub const TABLE_RESOURCE_TYPE: &str = "AWS::DynamoDB::Table";

/// A table resource as declared in a stack template.
#[derive(Clone, Debug, PartialEq)]
pub struct TableResource {
    pub logical_id: String,
    /// `CreateTable` input in CloudFormation property form.
    pub properties: Value,
}

impl TableResource {
    pub fn new(logical_id: impl Into<String>, properties: Value) -> Self {
        Self {
            logical_id: logical_id.into(),
            properties,
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.properties.get("TableName").and_then(Value::as_str)
    }

    /// Whether the template asks for a change stream on this table.
    pub fn has_stream(&self) -> bool {
        self.properties
            .get("StreamSpecification")
            .and_then(|spec| spec.get("StreamViewType"))
            .is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Strips properties DynamoDB Local rejects and turns on the stream whenever
/// a view type is requested.
pub fn sanitize_table_properties(properties: &Value) -> Value {
    let mut sanitized = properties.clone();
    let Some(object) = sanitized.as_object_mut() else {
        return sanitized;
    };

    if let Some(sse) = object
        .get_mut("SSESpecification")
        .and_then(Value::as_object_mut)
    {
        sse.remove("SSEEnabled");
    }
    object.remove("PointInTimeRecoverySpecification");
    object.remove("TimeToLiveSpecification");

    if let Some(stream) = object
        .get_mut("StreamSpecification")
        .and_then(Value::as_object_mut)
        && stream.contains_key("StreamViewType")
    {
        stream.insert("StreamEnabled".to_string(), json!(true));
    }

    sanitized
}

/// Creates one table; an existing table is not an error.
pub async fn create_table<T>(
    api: &T,
    table: &TableResource,
) -> Result<CreateOutcome>
where
    T: TableApi + ?Sized,
{
    let properties = sanitize_table_properties(&table.properties);
    let name = table.table_name().unwrap_or(&table.logical_id);

    match api.create_table(&properties).await {
        Ok(()) => {
            info!(table = %name, "table created");
            Ok(CreateOutcome::Created)
        }
        Err(err) if err.is_resource_in_use() => {
            info!(table = %name, "table already exists");
            Ok(CreateOutcome::AlreadyExists)
        }
        Err(err) => Err(err),
    }
}

/// Creates every table concurrently; the first failure aborts provisioning.
pub async fn provision_tables<T>(
    api: &T,
    tables: &[TableResource],
) -> Result<Vec<CreateOutcome>>
where
    T: TableApi + ?Sized,
{
    try_join_all(tables.iter().map(|table| create_table(api, table))).await
}
