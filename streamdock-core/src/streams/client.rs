use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};
use url::Url;

use super::types::{
    DescribeStreamOutput, DescribeTableOutput, ErrorBody, GetRecordsOutput,
    GetShardIteratorOutput, StreamDescription, TableDescription,
};
use super::{StreamsApi, TableApi};
use crate::cursor::IteratorRequest;
use crate::error::{Result, StreamdockError};
use crate::sigv4::{Credentials, Signer};

const AMZ_JSON: &str = "application/x-amz-json-1.0";
const DYNAMODB_PREFIX: &str = "DynamoDB_20120810";
const STREAMS_PREFIX: &str = "DynamoDBStreams_20120810";
pub const DEFAULT_REGION: &str = "local";

/// Connection settings for the emulator's API endpoint.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub endpoint: String,
    pub region: String,
    pub credentials: Credentials,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: DEFAULT_REGION.to_string(),
            credentials: Credentials::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// DynamoDB + DynamoDB Streams client speaking the JSON 1.0 protocol.
#[derive(Clone, Debug)]
pub struct DynamoClient {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    signer: Signer,
}

impl DynamoClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let (endpoint, host) = parse_endpoint(&config.endpoint)?;
        let http =
            reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            endpoint,
            host,
            signer: Signer::new(config.credentials, config.region, "dynamodb"),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        target: &str,
        body: &Value,
    ) -> Result<T> {
        let payload = serde_json::to_vec(body)?;
        let signed = self.signer.sign(
            "POST",
            &self.host,
            self.endpoint.path(),
            &[("content-type", AMZ_JSON), ("x-amz-target", target)],
            &payload,
            Utc::now(),
        );

        trace!(operation = target, "sending request");
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", &signed.amz_date)
            .header(AUTHORIZATION, &signed.authorization)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let error = match serde_json::from_slice::<ErrorBody>(&bytes) {
                Ok(body) => StreamdockError::Service {
                    code: body.code().to_string(),
                    message: body.message.unwrap_or_default(),
                },
                Err(_) => StreamdockError::Service {
                    code: format!("Http{}", status.as_u16()),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                },
            };
            debug!(
                operation = target,
                status = status.as_u16(),
                error = %error,
                "request failed"
            );
            return Err(error);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Parses an endpoint URL and derives the `Host` header value it signs with.
pub(crate) fn parse_endpoint(raw: &str) -> Result<(Url, String)> {
    let invalid = |reason: String| StreamdockError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    let host = host_header(&url)
        .ok_or_else(|| invalid("endpoint has no host".to_string()))?;
    Ok((url, host))
}

fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[async_trait]
impl StreamsApi for DynamoClient {
    async fn describe_table(
        &self,
        table_name: &str,
    ) -> Result<TableDescription> {
        let output: DescribeTableOutput = self
            .call(
                &format!("{DYNAMODB_PREFIX}.DescribeTable"),
                &json!({ "TableName": table_name }),
            )
            .await?;
        Ok(output.table.unwrap_or_default())
    }

    async fn describe_stream(
        &self,
        stream_arn: &str,
    ) -> Result<StreamDescription> {
        let target = format!("{STREAMS_PREFIX}.DescribeStream");
        let mut merged: Option<StreamDescription> = None;
        let mut exclusive_start: Option<String> = None;

        loop {
            let mut body = json!({ "StreamArn": stream_arn });
            if let Some(start) = &exclusive_start {
                body["ExclusiveStartShardId"] = json!(start);
            }

            let output: DescribeStreamOutput = self.call(&target, &body).await?;
            let Some(mut page) = output.stream_description else {
                break;
            };
            let next = page.last_evaluated_shard_id.take();

            match merged.as_mut() {
                Some(description) => {
                    description.shards.append(&mut page.shards)
                }
                None => merged = Some(page),
            }

            // a repeated cursor would page forever
            match next {
                Some(shard_id)
                    if exclusive_start.as_deref() != Some(shard_id.as_str()) =>
                {
                    exclusive_start = Some(shard_id);
                }
                _ => break,
            }
        }

        Ok(merged.unwrap_or_default())
    }

    async fn get_shard_iterator(
        &self,
        stream_arn: &str,
        shard_id: &str,
        request: &IteratorRequest,
    ) -> Result<Option<String>> {
        let mut body = json!({
            "StreamArn": stream_arn,
            "ShardId": shard_id,
            "ShardIteratorType": request.iterator_type.as_str(),
        });
        if let Some(sequence) = &request.sequence_number {
            body["SequenceNumber"] = json!(sequence);
        }

        let output: GetShardIteratorOutput = self
            .call(&format!("{STREAMS_PREFIX}.GetShardIterator"), &body)
            .await?;
        Ok(output.shard_iterator)
    }

    async fn get_records(
        &self,
        shard_iterator: &str,
        limit: u32,
    ) -> Result<GetRecordsOutput> {
        let body = json!({ "ShardIterator": shard_iterator, "Limit": limit });
        self.call(&format!("{STREAMS_PREFIX}.GetRecords"), &body)
            .await
    }
}

#[async_trait]
impl TableApi for DynamoClient {
    async fn create_table(&self, properties: &Value) -> Result<()> {
        let _: Value = self
            .call(&format!("{DYNAMODB_PREFIX}.CreateTable"), properties)
            .await?;
        Ok(())
    }
}
