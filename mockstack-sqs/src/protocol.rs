//! Pieces shared by the JSON and Query protocol handlers

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use mockstack_core::{request_id::REQUEST_ID_HEADER, AwsError, RequestId};

use crate::checksum::md5_of_message_attributes;
use crate::error::SqsError;
use crate::queue::{MessageAttributeValue, ReceivedMessage, ATTR_ALL};

/// XML namespace of Query protocol responses
pub const SQS_XML_NAMESPACE: &str = "http://queue.amazonaws.com/doc/2012-11-05/";

/// `__type` prefix of JSON protocol errors
pub const SQS_JSON_TYPE_PREFIX: &str = "com.amazonaws.sqs";

pub(crate) fn require<T>(value: Option<T>, name: &str) -> Result<T, SqsError> {
    value.ok_or_else(|| {
        SqsError::MissingParameter(format!("The request must contain the parameter {name}."))
    })
}

/// Keep the system attributes a receive asked for (`All` keeps everything)
pub(crate) fn select_system_attributes(
    attributes: HashMap<String, String>,
    names: &[String],
) -> HashMap<String, String> {
    if names.iter().any(|n| n == ATTR_ALL) {
        return attributes;
    }
    attributes
        .into_iter()
        .filter(|(k, _)| names.contains(k))
        .collect()
}

/// Keep the message attributes a receive asked for. Accepts exact names,
/// `All`, `.*` and `prefix.*` patterns.
pub(crate) fn select_message_attributes(
    attributes: HashMap<String, MessageAttributeValue>,
    names: &[String],
) -> HashMap<String, MessageAttributeValue> {
    attributes
        .into_iter()
        .filter(|(key, _)| {
            names.iter().any(|pattern| {
                if pattern == ATTR_ALL || pattern == ".*" {
                    true
                } else if let Some(prefix) = pattern.strip_suffix(".*") {
                    key.starts_with(prefix)
                } else {
                    pattern == key
                }
            })
        })
        .collect()
}

/// Trim a received message down to the requested attributes. The attribute
/// MD5 is recomputed over what is actually returned, since clients verify it.
pub(crate) fn shape_received(
    mut message: ReceivedMessage,
    attribute_names: &[String],
    message_attribute_names: &[String],
) -> ReceivedMessage {
    message.attributes = select_system_attributes(message.attributes, attribute_names);
    message.message_attributes =
        select_message_attributes(message.message_attributes, message_attribute_names);
    message.md5_of_message_attributes = md5_of_message_attributes(&message.message_attributes);
    message
}

/// Sort and page queue URLs. The token is the offset of the next page.
pub(crate) fn paginate(
    mut urls: Vec<String>,
    max_results: Option<usize>,
    next_token: Option<&str>,
) -> Result<(Vec<String>, Option<String>), SqsError> {
    urls.sort();
    let start = match next_token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| SqsError::InvalidParameterValue(format!("Invalid NextToken: {token}")))?,
        None => 0,
    };
    let Some(max) = max_results else {
        return Ok((urls.into_iter().skip(start).collect(), None));
    };
    if !(1..=1000).contains(&max) {
        return Err(SqsError::InvalidParameterValue(
            "MaxResults must be between 1 and 1000".to_string(),
        ));
    }
    let end = start.saturating_add(max).min(urls.len());
    let page = urls.get(start..end).map(<[String]>::to_vec).unwrap_or_default();
    let next = (end < urls.len()).then(|| end.to_string());
    Ok((page, next))
}

pub(crate) fn build_response(
    status: StatusCode,
    content_type: &'static str,
    request_id: &RequestId,
    body: String,
) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type),
    );
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub(crate) fn error_status(err: &AwsError) -> StatusCode {
    StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::BAD_REQUEST)
}
