//! Handler invocation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{Result, StreamdockError};
use crate::sigv4::{Credentials, Signer};
use crate::streams::client::{DEFAULT_REGION, parse_endpoint};

pub const DEFAULT_LAMBDA_PORT: u16 = 3002;

/// Executes a named handler with a JSON payload. Only success or failure is
/// reported back; the handler's response body is not used.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, function_name: &str, payload: &Value) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LambdaInvokerConfig {
    /// Base URL of the local Lambda API, e.g. `http://127.0.0.1:3002`.
    pub endpoint: String,
    pub region: String,
    pub credentials: Credentials,
    /// Service name and stage used to qualify function names as
    /// `<service>-<stage>-<function>`.
    pub service: String,
    pub stage: String,
    pub timeout: Duration,
}

impl LambdaInvokerConfig {
    pub fn new(
        endpoint: impl Into<String>,
        service: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: DEFAULT_REGION.to_string(),
            credentials: Credentials::default(),
            service: service.into(),
            stage: stage.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Sends asynchronous (`Event`) invocations to a Lambda-compatible endpoint.
#[derive(Clone, Debug)]
pub struct LambdaInvoker {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    signer: Signer,
    service: String,
    stage: String,
}

impl LambdaInvoker {
    pub fn new(config: LambdaInvokerConfig) -> Result<Self> {
        let (endpoint, host) = parse_endpoint(&config.endpoint)?;

        Ok(Self {
            http: reqwest::Client::builder().timeout(config.timeout).build()?,
            endpoint,
            host,
            signer: Signer::new(config.credentials, config.region, "lambda"),
            service: config.service,
            stage: config.stage,
        })
    }

    pub fn qualified_name(&self, function_name: &str) -> String {
        format!("{}-{}-{}", self.service, self.stage, function_name)
    }

    fn invocation_url(&self, qualified: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StreamdockError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
                reason: "endpoint cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["2015-03-31", "functions", qualified, "invocations"]);
        Ok(url)
    }
}

#[async_trait]
impl Invoker for LambdaInvoker {
    async fn invoke(&self, function_name: &str, payload: &Value) -> Result<()> {
        let qualified = self.qualified_name(function_name);
        let url = self.invocation_url(&qualified)?;
        let body = serde_json::to_vec(payload)?;

        let signed = self.signer.sign(
            "POST",
            &self.host,
            url.path(),
            &[("x-amz-invocation-type", "Event")],
            &body,
            Utc::now(),
        );

        debug!(function = %qualified, bytes = body.len(), "invoking handler");
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Amz-Invocation-Type", "Event")
            .header("X-Amz-Date", &signed.amz_date)
            .header(AUTHORIZATION, &signed.authorization)
            .body(body)
            .send()
            .await
            .map_err(|err| StreamdockError::Invocation {
                function: qualified.clone(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StreamdockError::Invocation {
                function: qualified,
                reason: format!(
                    "status {}: {}",
                    status.as_u16(),
                    detail.trim()
                ),
            });
        }

        Ok(())
    }
}
