use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use parking_lot::Mutex;
use serde_json::{Value, json};
use streamdock_core::cursor::{IteratorRequest, ShardIteratorType};
use streamdock_core::provision::{CreateOutcome, TableResource, create_table};
use streamdock_core::{
    ClientConfig, DynamoClient, Invoker, LambdaInvoker, LambdaInvokerConfig,
    ShardExit, StreamDispatcher, StreamReadConfig, StreamSubscription,
    StreamdockError, StreamsApi,
};
use tokio_util::sync::CancellationToken;

const ORDERS_ARN: &str =
    "arn:aws:dynamodb:ddblocal:000000000000:table/Orders/stream/2024";

async fn serve(router: Router) -> String {
    let listener =
        tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn amz_json(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/x-amz-json-1.0")],
        body.to_string(),
    )
        .into_response()
}

fn service_error(code: &str, message: &str) -> Response {
    amz_json(
        StatusCode::BAD_REQUEST,
        json!({
            "__type": format!("com.amazonaws.dynamodb.v20120810#{code}"),
            "message": message,
        }),
    )
}

#[derive(Clone, Default)]
struct DynamoLog {
    limits: Arc<Mutex<Vec<u64>>>,
}

/// Minimal DynamoDB Local stand-in: one `Orders` table whose stream has two
/// shards, listed one page at a time.
async fn fake_dynamo(
    State(log): State<DynamoLog>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let credential = "AWS4-HMAC-SHA256 Credential=localAwsAccessKeyId/";
    if !authorization.starts_with(credential)
        || !authorization.contains("/local/dynamodb/aws4_request")
    {
        return service_error("UnrecognizedClientException", "bad signature");
    }

    let target = headers
        .get("x-amz-target")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

    match target.as_str() {
        "DynamoDB_20120810.DescribeTable" => {
            match request["TableName"].as_str() {
                Some("Orders") => amz_json(
                    StatusCode::OK,
                    json!({"Table": {
                        "TableName": "Orders",
                        "TableStatus": "ACTIVE",
                        "LatestStreamArn": ORDERS_ARN
                    }}),
                ),
                _ => service_error(
                    "ResourceNotFoundException",
                    "Cannot do operations on a non-existent table",
                ),
            }
        }
        "DynamoDB_20120810.CreateTable" => {
            match request["TableName"].as_str() {
                Some("Orders") => service_error(
                    "ResourceInUseException",
                    "Cannot create preexisting table",
                ),
                _ => amz_json(
                    StatusCode::OK,
                    json!({"TableDescription": request}),
                ),
            }
        }
        "DynamoDBStreams_20120810.DescribeStream" => {
            let page = match request["ExclusiveStartShardId"].as_str() {
                None => json!({
                    "StreamArn": ORDERS_ARN,
                    "StreamStatus": "ENABLED",
                    "Shards": [{"ShardId": "shardId-0001"}],
                    "LastEvaluatedShardId": "shardId-0001"
                }),
                Some(_) => json!({
                    "StreamArn": ORDERS_ARN,
                    "StreamStatus": "ENABLED",
                    "Shards": [{"ShardId": "shardId-0002"}]
                }),
            };
            amz_json(StatusCode::OK, json!({"StreamDescription": page}))
        }
        "DynamoDBStreams_20120810.GetShardIterator" => {
            let shard = request["ShardId"].as_str().unwrap_or_default();
            let kind =
                request["ShardIteratorType"].as_str().unwrap_or_default();
            let iterator = format!("{shard}|{kind}");
            amz_json(StatusCode::OK, json!({"ShardIterator": iterator}))
        }
        "DynamoDBStreams_20120810.GetRecords" => {
            let Some(limit) = request["Limit"]
                .as_u64()
                .filter(|limit| (1..=1000).contains(limit))
            else {
                return service_error(
                    "ValidationException",
                    "Limit must be between 1 and 1000",
                );
            };
            log.limits.lock().push(limit);
            let records = match request["ShardIterator"].as_str() {
                Some("shardId-0001|LATEST") => {
                    json!([{"eventID": "1", "eventName": "INSERT"}])
                }
                _ => json!([]),
            };
            amz_json(StatusCode::OK, json!({"Records": records}))
        }
        _ => {
            service_error("UnknownOperationException", "unknown operation")
        }
    }
}

#[derive(Clone, Default)]
struct LambdaLog {
    calls: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn fake_lambda(
    State(log): State<LambdaLog>,
    Path(function): Path<String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let invocation_type = headers
        .get("x-amz-invocation-type")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let payload = serde_json::from_str(&body).unwrap_or(Value::Null);
    log.calls
        .lock()
        .push((function.clone(), invocation_type, payload));

    if function.ends_with("-broken") {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::ACCEPTED
    }
}

async fn dynamo_client() -> DynamoClient {
    dynamo_client_with_log().await.0
}

async fn dynamo_client_with_log() -> (DynamoClient, DynamoLog) {
    let log = DynamoLog::default();
    let router = Router::new()
        .route("/", post(fake_dynamo))
        .with_state(log.clone());
    let endpoint = serve(router).await;
    let client = DynamoClient::new(ClientConfig::new(endpoint)).unwrap();
    (client, log)
}

async fn lambda_invoker() -> (LambdaInvoker, LambdaLog) {
    let log = LambdaLog::default();
    let router = Router::new()
        .route(
            "/2015-03-31/functions/{function}/invocations",
            post(fake_lambda),
        )
        .with_state(log.clone());
    let endpoint = serve(router).await;
    let config = LambdaInvokerConfig::new(endpoint, "orders-api", "dev");
    let invoker = LambdaInvoker::new(config).unwrap();
    (invoker, log)
}

#[tokio::test]
async fn describe_stream_follows_pagination() {
    let client = dynamo_client().await;

    let table = client.describe_table("Orders").await.unwrap();
    assert_eq!(table.latest_stream_arn.as_deref(), Some(ORDERS_ARN));

    let stream = client.describe_stream(ORDERS_ARN).await.unwrap();
    let shard_ids: Vec<_> = stream
        .shards
        .iter()
        .map(|shard| shard.shard_id.as_str())
        .collect();
    assert_eq!(shard_ids, vec!["shardId-0001", "shardId-0002"]);
    assert_eq!(stream.last_evaluated_shard_id, None);
}

#[tokio::test]
async fn service_errors_carry_their_code() {
    let client = dynamo_client().await;

    let err = client.describe_table("Missing").await.unwrap_err();
    assert_eq!(err.service_code(), Some("ResourceNotFoundException"));

    let iterator = client
        .get_shard_iterator(
            ORDERS_ARN,
            "shardId-0001",
            &IteratorRequest {
                iterator_type: ShardIteratorType::TrimHorizon,
                sequence_number: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(iterator.as_deref(), Some("shardId-0001|TRIM_HORIZON"));

    let err = client
        .get_records("shardId-0001|TRIM_HORIZON", 0)
        .await
        .unwrap_err();
    assert_eq!(err.service_code(), Some("ValidationException"));
}

#[tokio::test]
async fn existing_table_counts_as_provisioned() {
    let client = dynamo_client().await;

    let orders =
        TableResource::new("OrdersTable", json!({"TableName": "Orders"}));
    let audit =
        TableResource::new("AuditTable", json!({"TableName": "Audit"}));

    assert_eq!(
        create_table(&client, &orders).await.unwrap(),
        CreateOutcome::AlreadyExists
    );
    assert_eq!(
        create_table(&client, &audit).await.unwrap(),
        CreateOutcome::Created
    );
}

#[tokio::test]
async fn invoker_posts_event_invocations() {
    let (invoker, log) = lambda_invoker().await;

    invoker
        .invoke("processor", &json!({"Records": [{"eventID": "1"}]}))
        .await
        .unwrap();

    let calls = log.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "orders-api-dev-processor");
    assert_eq!(calls[0].1.as_deref(), Some("Event"));
    assert_eq!(calls[0].2, json!({"Records": [{"eventID": "1"}]}));
}

#[tokio::test]
async fn invoker_maps_failures() {
    let (invoker, _log) = lambda_invoker().await;

    let err = invoker
        .invoke("broken", &json!({"Records": []}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StreamdockError::Invocation { ref function, .. }
            if function == "orders-api-dev-broken"
    ));
}

#[tokio::test]
async fn records_flow_from_stream_to_handler() {
    let (client, dynamo_log) = dynamo_client_with_log().await;
    let (invoker, log) = lambda_invoker().await;
    let config = StreamReadConfig {
        read_interval: Duration::from_millis(10),
        ..StreamReadConfig::default()
    };
    let dispatcher = StreamDispatcher::new(
        Arc::new(client),
        Arc::new(invoker),
        config,
        CancellationToken::new(),
    );

    let subscription = StreamSubscription {
        batch_size: Some(7),
        ..StreamSubscription::new("processor", "Orders")
    };
    let handle = dispatcher.dispatch(&subscription).await;
    assert_eq!(handle.shard_count(), 2);

    let reports = handle.join().await;
    assert!(reports.iter().all(|report| {
        matches!(report.outcome, Ok(ShardExit::Exhausted))
    }));
    let invocations: u64 =
        reports.iter().map(|report| report.invocations).sum();
    assert_eq!(invocations, 1);
    assert_eq!(*dynamo_log.limits.lock(), vec![7, 7]);

    let calls = log.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].2,
        json!({"Records": [{"eventID": "1", "eventName": "INSERT"}]})
    );
}
