//! HTTP handlers for SQS
//!
//! Requests carrying `X-Amz-Target: AmazonSQS.<Operation>` use the JSON
//! protocol handled here; everything else is treated as a Query protocol
//! request and handed to [`crate::query`].

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri},
    response::Response,
    routing::any,
    Router,
};
use bytes::Bytes;
use mockstack_core::{AwsError, ErrorCode, RequestId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SqsError;
use crate::protocol::{
    build_response, error_status, paginate, require, shape_received, SQS_JSON_TYPE_PREFIX,
};
use crate::query;
use crate::queue::{MessageAttributeValue, ReceiveMessageInput, SendMessageInput};
use crate::storage::SqsState;

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "AmazonSQS.";

/// Routes for both SQS protocols.
///
/// Query clients may post to the queue URL itself, in which case the path
/// stands in for the `QueueUrl` parameter.
pub fn router(state: Arc<SqsState>) -> Router {
    Router::new()
        .route("/", any(handle_request))
        .route("/:account_id/:queue_name", any(handle_queue_request))
        .with_state(state)
}

/// Handle SQS requests posted to the service root
pub async fn handle_request(
    State(state): State<Arc<SqsState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(&state, None, &uri, &headers, &body).await
}

/// Handle SQS requests posted to a queue URL
pub async fn handle_queue_request(
    State(state): State<Arc<SqsState>>,
    Path((_account_id, queue_name)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let queue_url = state.storage().queue_url(&queue_name);
    dispatch(&state, Some(queue_url), &uri, &headers, &body).await
}

async fn dispatch(
    state: &SqsState,
    path_queue_url: Option<String>,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Response {
    let target = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match target.strip_prefix(TARGET_PREFIX) {
        Some(operation) => handle_json(state, operation, body).await,
        None => query::handle_query(state, path_queue_url, uri, body).await,
    }
}

async fn handle_json(state: &SqsState, operation: &str, body: &Bytes) -> Response {
    let request_id = RequestId::new();
    info!(operation = %operation, request_id = %request_id, "SQS JSON request");

    let result = match operation {
        "CreateQueue" => create_queue(state, body),
        "DeleteQueue" => delete_queue(state, body),
        "ListQueues" => list_queues(state, body),
        "GetQueueUrl" => get_queue_url(state, body),
        "SendMessage" => send_message(state, body),
        "ReceiveMessage" => receive_message(state, body).await,
        "DeleteMessage" => delete_message(state, body),
        "PurgeQueue" => purge_queue(state, body),
        "ChangeMessageVisibility" => change_message_visibility(state, body),
        "GetQueueAttributes" => get_queue_attributes(state, body),
        "SetQueueAttributes" => set_queue_attributes(state, body),
        "TagQueue" => tag_queue(state, body),
        "UntagQueue" => untag_queue(state, body),
        "ListQueueTags" => list_queue_tags(state, body),
        _ => {
            warn!(operation = %operation, "Unknown SQS operation");
            Err(AwsError::new(
                ErrorCode::InvalidAction,
                format!("The action {operation} is not valid for this endpoint."),
            ))
        }
    };

    match result {
        Ok(json) => build_response(StatusCode::OK, JSON_CONTENT_TYPE, &request_id, json),
        Err(err) => json_error(err.with_request_id(request_id.as_str()), &request_id),
    }
}

// === Request/Response types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateQueueRequest {
    queue_name: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default, rename = "tags")]
    tags: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueueUrlResponse {
    queue_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueUrlRequest {
    queue_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListQueuesRequest {
    queue_name_prefix: Option<String>,
    max_results: Option<usize>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListQueuesResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    queue_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueUrlRequest {
    queue_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageRequest {
    queue_url: Option<String>,
    message_body: Option<String>,
    delay_seconds: Option<i64>,
    #[serde(default)]
    message_attributes: HashMap<String, MessageAttributeValue>,
    message_group_id: Option<String>,
    message_deduplication_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    message_id: String,
    #[serde(rename = "MD5OfMessageBody")]
    md5_of_message_body: String,
    #[serde(rename = "MD5OfMessageAttributes", skip_serializing_if = "Option::is_none")]
    md5_of_message_attributes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageRequest {
    queue_url: Option<String>,
    max_number_of_messages: Option<i32>,
    visibility_timeout: Option<i64>,
    wait_time_seconds: Option<i64>,
    #[serde(default)]
    attribute_names: Vec<String>,
    #[serde(default)]
    message_system_attribute_names: Vec<String>,
    #[serde(default)]
    message_attribute_names: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<JsonMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct JsonMessage {
    message_id: String,
    receipt_handle: String,
    #[serde(rename = "MD5OfBody")]
    md5_of_body: String,
    body: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<String, String>,
    #[serde(rename = "MD5OfMessageAttributes", skip_serializing_if = "Option::is_none")]
    md5_of_message_attributes: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    message_attributes: HashMap<String, MessageAttributeValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageRequest {
    queue_url: Option<String>,
    receipt_handle: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeMessageVisibilityRequest {
    queue_url: Option<String>,
    receipt_handle: Option<String>,
    visibility_timeout: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesRequest {
    queue_url: Option<String>,
    #[serde(default)]
    attribute_names: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AttributesResponse {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SetQueueAttributesRequest {
    queue_url: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TagQueueRequest {
    queue_url: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UntagQueueRequest {
    queue_url: Option<String>,
    #[serde(default)]
    tag_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListQueueTagsResponse {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    tags: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct EmptyResponse {}

// === Handlers ===

type HandlerResult = Result<String, AwsError>;

fn create_queue(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: CreateQueueRequest = parse_body(body)?;
    let name = require(req.queue_name, "QueueName")?;
    let queue = state.storage().create_queue(&name, &req.attributes, req.tags)?;
    to_json(&QueueUrlResponse { queue_url: queue.url })
}

fn delete_queue(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: QueueUrlRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    state.storage().delete_queue(&queue_url)?;
    to_json(&EmptyResponse {})
}

fn list_queues(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: ListQueuesRequest = parse_body(body)?;
    let urls = state.storage().list_queues(req.queue_name_prefix.as_deref());
    let (queue_urls, next_token) = paginate(urls, req.max_results, req.next_token.as_deref())?;
    to_json(&ListQueuesResponse {
        queue_urls,
        next_token,
    })
}

fn get_queue_url(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: GetQueueUrlRequest = parse_body(body)?;
    let name = require(req.queue_name, "QueueName")?;
    let queue_url = state.storage().get_queue_url(&name)?;
    to_json(&QueueUrlResponse { queue_url })
}

fn send_message(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: SendMessageRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    let input = SendMessageInput {
        body: require(req.message_body, "MessageBody")?,
        delay_seconds: req.delay_seconds,
        message_attributes: req.message_attributes,
        message_group_id: req.message_group_id,
        deduplication_id: req.message_deduplication_id,
    };

    let result = state.send_message(&queue_url, input)?;
    to_json(&SendMessageResponse {
        message_id: result.message_id,
        md5_of_message_body: result.md5_of_message_body,
        md5_of_message_attributes: result.md5_of_message_attributes,
        sequence_number: result.sequence_number,
    })
}

async fn receive_message(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: ReceiveMessageRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    let input = ReceiveMessageInput {
        max_messages: req.max_number_of_messages.unwrap_or(1),
        visibility_timeout: req.visibility_timeout,
        wait_time_seconds: req.wait_time_seconds,
    };

    let mut attribute_names = req.attribute_names;
    attribute_names.extend(req.message_system_attribute_names);

    let messages = state
        .receive_message(&queue_url, input)
        .await?
        .into_iter()
        .map(|m| shape_received(m, &attribute_names, &req.message_attribute_names))
        .map(|m| JsonMessage {
            message_id: m.message_id,
            receipt_handle: m.receipt_handle,
            md5_of_body: m.md5_of_body,
            body: m.body,
            attributes: m.attributes,
            md5_of_message_attributes: m.md5_of_message_attributes,
            message_attributes: m.message_attributes,
        })
        .collect();

    to_json(&ReceiveMessageResponse { messages })
}

fn delete_message(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: DeleteMessageRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    let receipt_handle = require(req.receipt_handle, "ReceiptHandle")?;
    state.storage().delete_message(&queue_url, &receipt_handle)?;
    to_json(&EmptyResponse {})
}

fn purge_queue(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: QueueUrlRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    state.storage().purge_queue(&queue_url)?;
    to_json(&EmptyResponse {})
}

fn change_message_visibility(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: ChangeMessageVisibilityRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    let receipt_handle = require(req.receipt_handle, "ReceiptHandle")?;
    let timeout = require(req.visibility_timeout, "VisibilityTimeout")?;
    state
        .storage()
        .change_message_visibility(&queue_url, &receipt_handle, timeout)?;
    to_json(&EmptyResponse {})
}

fn get_queue_attributes(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: GetQueueAttributesRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    let attributes = state
        .storage()
        .get_queue_attributes(&queue_url, &req.attribute_names)?;
    to_json(&AttributesResponse { attributes })
}

fn set_queue_attributes(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: SetQueueAttributesRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    state
        .storage()
        .set_queue_attributes(&queue_url, &req.attributes)?;
    to_json(&EmptyResponse {})
}

fn tag_queue(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: TagQueueRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    state.storage().tag_queue(&queue_url, req.tags)?;
    to_json(&EmptyResponse {})
}

fn untag_queue(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: UntagQueueRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    state.storage().untag_queue(&queue_url, &req.tag_keys)?;
    to_json(&EmptyResponse {})
}

fn list_queue_tags(state: &SqsState, body: &Bytes) -> HandlerResult {
    let req: QueueUrlRequest = parse_body(body)?;
    let queue_url = require(req.queue_url, "QueueUrl")?;
    let tags = state.storage().list_queue_tags(&queue_url)?;
    to_json(&ListQueueTagsResponse { tags })
}

// === Helpers ===

/// Decode a JSON request body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AwsError> {
    let raw: &[u8] = if body.is_empty() { b"{}" } else { body };
    serde_json::from_slice(raw).map_err(|e| {
        SqsError::InvalidParameterValue(format!("Unable to parse request body: {e}")).into()
    })
}

fn to_json<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_string(value)
        .map_err(|e| AwsError::new(ErrorCode::InternalFailure, e.to_string()))
}

fn json_error(err: AwsError, request_id: &RequestId) -> Response {
    let mut response = build_response(
        error_status(&err),
        JSON_CONTENT_TYPE,
        request_id,
        err.to_json(SQS_JSON_TYPE_PREFIX),
    );
    if let Ok(value) = HeaderValue::from_str(&err.query_error_header()) {
        response.headers_mut().insert("x-amzn-query-error", value);
    }
    response
}
