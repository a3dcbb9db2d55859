//! SQS JSON protocol tests
//!
//! Drive the SQS router in-process with `X-Amz-Target` requests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mockstack_sqs::{router, SqsConfig, SqsState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_router() -> Router {
    router(Arc::new(SqsState::new(SqsConfig::default())))
}

/// Send one JSON protocol request and return status, headers and body
async fn call(
    app: &Router,
    operation: &str,
    body: Value,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/x-amz-json-1.0")
        .header("x-amz-target", format!("AmazonSQS.{operation}"))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, value)
}

async fn create_queue(app: &Router, name: &str, attributes: Value) -> String {
    let (status, _, body) = call(
        app,
        "CreateQueue",
        json!({ "QueueName": name, "Attributes": attributes }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["QueueUrl"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_queue_returns_url() {
    let app = create_test_router();
    let url = create_queue(&app, "orders", json!({})).await;
    assert_eq!(url, "http://localhost:4566/000000000000/orders");

    // Idempotent
    let again = create_queue(&app, "orders", json!({ "VisibilityTimeout": "5" })).await;
    assert_eq!(again, url);
}

#[tokio::test]
async fn test_send_receive_delete() {
    let app = create_test_router();
    let url = create_queue(&app, "orders", json!({})).await;

    let (status, headers, sent) = call(
        &app,
        "SendMessage",
        json!({ "QueueUrl": url, "MessageBody": "hello" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-amzn-requestid"));
    assert_eq!(sent["MD5OfMessageBody"], "5d41402abc4b2a76b9719d911017c592");
    let message_id = sent["MessageId"].as_str().unwrap().to_string();

    let (_, _, received) = call(
        &app,
        "ReceiveMessage",
        json!({
            "QueueUrl": url,
            "MaxNumberOfMessages": 5,
            "AttributeNames": ["All"]
        }),
    )
    .await;
    let messages = received["Messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["MessageId"], message_id.as_str());
    assert_eq!(messages[0]["Body"], "hello");
    assert_eq!(messages[0]["MD5OfBody"], "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(messages[0]["Attributes"]["ApproximateReceiveCount"], "1");

    let handle = messages[0]["ReceiptHandle"].as_str().unwrap().to_string();
    let (status, _, _) = call(
        &app,
        "DeleteMessage",
        json!({ "QueueUrl": url, "ReceiptHandle": handle }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, error) = call(
        &app,
        "DeleteMessage",
        json!({ "QueueUrl": url, "ReceiptHandle": handle }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["__type"], "com.amazonaws.sqs#ReceiptHandleIsInvalid");
    assert_eq!(
        headers.get("x-amzn-query-error").unwrap(),
        "ReceiptHandleIsInvalid;Sender"
    );
}

#[tokio::test]
async fn test_empty_receive_omits_messages() {
    let app = create_test_router();
    let url = create_queue(&app, "empty", json!({})).await;

    let (status, _, body) = call(&app, "ReceiveMessage", json!({ "QueueUrl": url })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("Messages").is_none());
}

#[tokio::test]
async fn test_missing_queue_error() {
    let app = create_test_router();
    let (status, headers, error) = call(
        &app,
        "GetQueueUrl",
        json!({ "QueueName": "nope" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["__type"], "com.amazonaws.sqs#QueueDoesNotExist");
    assert_eq!(
        headers.get("x-amzn-query-error").unwrap(),
        "AWS.SimpleQueueService.NonExistentQueue;Sender"
    );
}

#[tokio::test]
async fn test_missing_parameter() {
    let app = create_test_router();
    let (status, _, error) = call(&app, "SendMessage", json!({ "MessageBody": "x" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["__type"], "com.amazonaws.sqs#MissingParameter");
}

#[tokio::test]
async fn test_unknown_operation() {
    let app = create_test_router();
    let (status, _, error) = call(&app, "FrobnicateQueue", json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["__type"], "com.amazonaws.sqs#InvalidAction");
}

#[tokio::test]
async fn test_fifo_deduplication() {
    let app = create_test_router();
    let url = create_queue(
        &app,
        "orders.fifo",
        json!({ "FifoQueue": "true", "ContentBasedDeduplication": "true" }),
    )
    .await;

    let send = || {
        call(
            &app,
            "SendMessage",
            json!({ "QueueUrl": url, "MessageBody": "A", "MessageGroupId": "g1" }),
        )
    };
    let (_, _, first) = send().await;
    let (_, _, second) = send().await;

    assert_eq!(first["MessageId"], second["MessageId"]);
    assert_eq!(first["SequenceNumber"], "00000000000000000001");

    let (_, _, attrs) = call(
        &app,
        "GetQueueAttributes",
        json!({ "QueueUrl": url, "AttributeNames": ["ApproximateNumberOfMessages", "FifoQueue"] }),
    )
    .await;
    assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessages"], "1");
    assert_eq!(attrs["Attributes"]["FifoQueue"], "true");
}

#[tokio::test]
async fn test_message_attributes_filtered_on_receive() {
    let app = create_test_router();
    let url = create_queue(&app, "attrs", json!({})).await;

    let (_, _, sent) = call(
        &app,
        "SendMessage",
        json!({
            "QueueUrl": url,
            "MessageBody": "x",
            "MessageAttributes": {
                "color": { "DataType": "String", "StringValue": "red" },
                "size": { "DataType": "Number", "StringValue": "3" }
            }
        }),
    )
    .await;
    assert!(sent["MD5OfMessageAttributes"].is_string());

    let (_, _, received) = call(
        &app,
        "ReceiveMessage",
        json!({ "QueueUrl": url, "MessageAttributeNames": ["color"] }),
    )
    .await;
    let message = &received["Messages"][0];
    assert_eq!(message["MessageAttributes"]["color"]["StringValue"], "red");
    assert!(message["MessageAttributes"].get("size").is_none());
    assert_ne!(message["MD5OfMessageAttributes"], sent["MD5OfMessageAttributes"]);
}

#[tokio::test]
async fn test_attributes_and_tags() {
    let app = create_test_router();
    let (_, _, created) = call(
        &app,
        "CreateQueue",
        json!({ "QueueName": "tagged", "tags": { "team": "core" } }),
    )
    .await;
    let url = created["QueueUrl"].as_str().unwrap().to_string();

    let (status, _, _) = call(
        &app,
        "SetQueueAttributes",
        json!({ "QueueUrl": url, "Attributes": { "VisibilityTimeout": "45", "Bogus": "1" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, attrs) = call(
        &app,
        "GetQueueAttributes",
        json!({ "QueueUrl": url, "AttributeNames": ["All"] }),
    )
    .await;
    assert_eq!(attrs["Attributes"]["VisibilityTimeout"], "45");
    assert_eq!(
        attrs["Attributes"]["QueueArn"],
        "arn:aws:sqs:us-east-1:000000000000:tagged"
    );

    call(
        &app,
        "TagQueue",
        json!({ "QueueUrl": url, "Tags": { "env": "dev" } }),
    )
    .await;
    call(
        &app,
        "UntagQueue",
        json!({ "QueueUrl": url, "TagKeys": ["team"] }),
    )
    .await;
    let (_, _, tags) = call(&app, "ListQueueTags", json!({ "QueueUrl": url })).await;
    assert_eq!(tags["Tags"], json!({ "env": "dev" }));
}

#[tokio::test]
async fn test_list_queues_paginates() {
    let app = create_test_router();
    for name in ["a1", "a2", "a3", "b1"] {
        create_queue(&app, name, json!({})).await;
    }

    let (_, _, page) = call(
        &app,
        "ListQueues",
        json!({ "QueueNamePrefix": "a", "MaxResults": 2 }),
    )
    .await;
    assert_eq!(page["QueueUrls"].as_array().unwrap().len(), 2);
    let token = page["NextToken"].as_str().unwrap().to_string();

    let (_, _, rest) = call(
        &app,
        "ListQueues",
        json!({ "QueueNamePrefix": "a", "MaxResults": 2, "NextToken": token }),
    )
    .await;
    assert_eq!(
        rest["QueueUrls"],
        json!(["http://localhost:4566/000000000000/a3"])
    );
    assert!(rest.get("NextToken").is_none());
}

#[tokio::test]
async fn test_change_visibility_and_purge() {
    let app = create_test_router();
    let url = create_queue(&app, "work", json!({})).await;
    call(
        &app,
        "SendMessage",
        json!({ "QueueUrl": url, "MessageBody": "job" }),
    )
    .await;

    let (_, _, received) = call(&app, "ReceiveMessage", json!({ "QueueUrl": url })).await;
    let handle = received["Messages"][0]["ReceiptHandle"].as_str().unwrap().to_string();

    let (status, _, _) = call(
        &app,
        "ChangeMessageVisibility",
        json!({ "QueueUrl": url, "ReceiptHandle": handle, "VisibilityTimeout": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, again) = call(&app, "ReceiveMessage", json!({ "QueueUrl": url })).await;
    assert_eq!(again["Messages"].as_array().unwrap().len(), 1);

    call(&app, "PurgeQueue", json!({ "QueueUrl": url })).await;
    let (_, _, attrs) = call(
        &app,
        "GetQueueAttributes",
        json!({ "QueueUrl": url, "AttributeNames": ["All"] }),
    )
    .await;
    assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessages"], "0");
    assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessagesNotVisible"], "0");

    let (status, _, _) = call(&app, "DeleteQueue", json!({ "QueueUrl": url })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = call(&app, "PurgeQueue", json!({ "QueueUrl": url })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
