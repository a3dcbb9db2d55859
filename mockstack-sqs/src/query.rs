//! Query protocol (form-encoded `Action=` requests, XML responses)

use axum::{
    http::{StatusCode, Uri},
    response::Response,
};
use bytes::Bytes;
use mockstack_core::{error::escape_xml, AwsError, ErrorCode, RequestId};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::SqsError;
use crate::protocol::{
    build_response, error_status, paginate, shape_received, SQS_XML_NAMESPACE,
};
use crate::queue::{MessageAttributeValue, ReceiveMessageInput, ReceivedMessage, SendMessageInput};
use crate::storage::SqsState;

const XML_CONTENT_TYPE: &str = "text/xml";

/// Handle a Query protocol request.
///
/// `path_queue_url` is set when the request was addressed to a queue URL; an
/// explicit `QueueUrl` parameter still wins.
pub async fn handle_query(
    state: &SqsState,
    path_queue_url: Option<String>,
    uri: &Uri,
    body: &Bytes,
) -> Response {
    let request_id = RequestId::new();
    let params = Params::from_request(uri, body);
    let action = params.get("Action").unwrap_or_default().to_string();
    info!(action = %action, request_id = %request_id, "SQS query request");

    let result = dispatch(state, &action, &params, path_queue_url).await;
    match result {
        Ok(inner) => build_response(
            StatusCode::OK,
            XML_CONTENT_TYPE,
            &request_id,
            xml_document(&action, &inner, &request_id),
        ),
        Err(err) => {
            let err = err.with_request_id(request_id.as_str());
            build_response(
                error_status(&err),
                XML_CONTENT_TYPE,
                &request_id,
                err.to_xml(SQS_XML_NAMESPACE),
            )
        }
    }
}

async fn dispatch(
    state: &SqsState,
    action: &str,
    params: &Params,
    path_queue_url: Option<String>,
) -> Result<String, AwsError> {
    let queue_url = || -> Result<String, SqsError> {
        params
            .get("QueueUrl")
            .map(str::to_string)
            .or_else(|| path_queue_url.clone())
            .ok_or_else(|| {
                SqsError::MissingParameter(
                    "The request must contain the parameter QueueUrl.".to_string(),
                )
            })
    };

    let storage = state.storage();
    let inner = match action {
        "CreateQueue" => {
            let name = params.required("QueueName")?;
            let attributes = params.entries("Attribute", "Name", "Value");
            let tags = params.entries("Tag", "Key", "Value");
            let queue = storage.create_queue(&name, &attributes, tags)?;
            result_element(action, &element("QueueUrl", &queue.url))
        }
        "DeleteQueue" => {
            storage.delete_queue(&queue_url()?)?;
            String::new()
        }
        "ListQueues" => {
            let urls = storage.list_queues(params.get("QueueNamePrefix"));
            let (urls, next_token) = paginate(
                urls,
                params.number("MaxResults")?,
                params.get("NextToken"),
            )?;
            let mut xml: String = urls.iter().map(|u| element("QueueUrl", u)).collect();
            if let Some(token) = next_token {
                xml.push_str(&element("NextToken", &token));
            }
            result_element(action, &xml)
        }
        "GetQueueUrl" => {
            let name = params.required("QueueName")?;
            let url = storage.get_queue_url(&name)?;
            result_element(action, &element("QueueUrl", &url))
        }
        "SendMessage" => {
            let input = SendMessageInput {
                body: params.required("MessageBody")?,
                delay_seconds: params.number("DelaySeconds")?,
                message_attributes: params.message_attributes(),
                message_group_id: params.get("MessageGroupId").map(str::to_string),
                deduplication_id: params.get("MessageDeduplicationId").map(str::to_string),
            };
            let result = state.send_message(&queue_url()?, input)?;

            let mut xml = element("MessageId", &result.message_id);
            xml.push_str(&element("MD5OfMessageBody", &result.md5_of_message_body));
            if let Some(md5) = &result.md5_of_message_attributes {
                xml.push_str(&element("MD5OfMessageAttributes", md5));
            }
            if let Some(seq) = &result.sequence_number {
                xml.push_str(&element("SequenceNumber", seq));
            }
            result_element(action, &xml)
        }
        "ReceiveMessage" => {
            let input = ReceiveMessageInput {
                max_messages: params.number("MaxNumberOfMessages")?.unwrap_or(1),
                visibility_timeout: params.number("VisibilityTimeout")?,
                wait_time_seconds: params.number("WaitTimeSeconds")?,
            };
            let mut attribute_names = params.list("AttributeName");
            attribute_names.extend(params.list("MessageSystemAttributeName"));
            let message_attribute_names = params.list("MessageAttributeName");

            let messages = state.receive_message(&queue_url()?, input).await?;
            let xml: String = messages
                .into_iter()
                .map(|m| shape_received(m, &attribute_names, &message_attribute_names))
                .map(|m| message_element(&m))
                .collect();
            result_element(action, &xml)
        }
        "DeleteMessage" => {
            let handle = params.required("ReceiptHandle")?;
            storage.delete_message(&queue_url()?, &handle)?;
            String::new()
        }
        "PurgeQueue" => {
            storage.purge_queue(&queue_url()?)?;
            String::new()
        }
        "ChangeMessageVisibility" => {
            let handle = params.required("ReceiptHandle")?;
            let timeout = params.number("VisibilityTimeout")?.ok_or_else(|| {
                SqsError::MissingParameter(
                    "The request must contain the parameter VisibilityTimeout.".to_string(),
                )
            })?;
            storage.change_message_visibility(&queue_url()?, &handle, timeout)?;
            String::new()
        }
        "GetQueueAttributes" => {
            let names = params.list("AttributeName");
            let attributes = storage.get_queue_attributes(&queue_url()?, &names)?;
            result_element(action, &name_value_elements("Attribute", &attributes))
        }
        "SetQueueAttributes" => {
            let attributes = params.entries("Attribute", "Name", "Value");
            storage.set_queue_attributes(&queue_url()?, &attributes)?;
            String::new()
        }
        "TagQueue" => {
            let tags = params.entries("Tag", "Key", "Value");
            storage.tag_queue(&queue_url()?, tags)?;
            String::new()
        }
        "UntagQueue" => {
            let keys = params.list("TagKey");
            storage.untag_queue(&queue_url()?, &keys)?;
            String::new()
        }
        "ListQueueTags" => {
            let tags = storage.list_queue_tags(&queue_url()?)?;
            let xml: String = sorted(&tags)
                .map(|(k, v)| {
                    format!("<Tag>{}{}</Tag>", element("Key", k), element("Value", v))
                })
                .collect();
            result_element(action, &xml)
        }
        "" => {
            return Err(AwsError::new(
                ErrorCode::MissingParameter,
                "The request must contain the parameter Action.",
            ))
        }
        _ => {
            warn!(action = %action, "Unknown SQS action");
            return Err(AwsError::new(
                ErrorCode::InvalidAction,
                format!("The action {action} is not valid for this endpoint."),
            ));
        }
    };

    Ok(inner)
}

// === Request parameters ===

/// Flattened form parameters from the query string and the body
#[derive(Debug, Default)]
struct Params(HashMap<String, String>);

impl Params {
    fn from_request(uri: &Uri, body: &Bytes) -> Self {
        let query = uri.query().unwrap_or_default().as_bytes();
        let params = form_urlencoded::parse(query)
            .chain(form_urlencoded::parse(body))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self(params)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    fn required(&self, name: &str) -> Result<String, SqsError> {
        self.get(name).map(str::to_string).ok_or_else(|| {
            SqsError::MissingParameter(format!("The request must contain the parameter {name}."))
        })
    }

    fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>, SqsError> {
        self.get(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|_| {
                    SqsError::InvalidParameterValue(format!(
                        "Value {raw} for parameter {name} is invalid."
                    ))
                })
            })
            .transpose()
    }

    /// Values of `prefix.1`, `prefix.2`, ... ordered by index. A bare
    /// `prefix` is accepted as a single value.
    fn list(&self, prefix: &str) -> Vec<String> {
        let mut indexed = BTreeMap::new();
        for (key, value) in &self.0 {
            if key == prefix {
                indexed.insert(0, value.clone());
            } else if let Some(n) = key
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|n| n.parse::<u32>().ok())
            {
                indexed.insert(n, value.clone());
            }
        }
        indexed.into_values().collect()
    }

    /// Indexed `prefix.N.key` / `prefix.N.value` pairs as a map
    fn entries(&self, prefix: &str, key: &str, value: &str) -> HashMap<String, String> {
        self.indices(prefix)
            .into_iter()
            .filter_map(|n| {
                let k = self.get(&format!("{prefix}.{n}.{key}"))?;
                let v = self.get(&format!("{prefix}.{n}.{value}"))?;
                Some((k.to_string(), v.to_string()))
            })
            .collect()
    }

    /// `MessageAttribute.N.Name` with `MessageAttribute.N.Value.*`
    fn message_attributes(&self) -> HashMap<String, MessageAttributeValue> {
        let prefix = "MessageAttribute";
        self.indices(prefix)
            .into_iter()
            .filter_map(|n| {
                let name = self.get(&format!("{prefix}.{n}.Name"))?;
                let field = |f: &str| self.get(&format!("{prefix}.{n}.Value.{f}")).map(str::to_string);
                let value = MessageAttributeValue {
                    data_type: field("DataType").unwrap_or_default(),
                    string_value: field("StringValue"),
                    binary_value: field("BinaryValue"),
                };
                Some((name.to_string(), value))
            })
            .collect()
    }

    /// Distinct N of every `prefix.N.*` key
    fn indices(&self, prefix: &str) -> Vec<u32> {
        let mut found: Vec<u32> = self
            .0
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(prefix)?.strip_prefix('.')?;
                rest.split('.').next()?.parse().ok()
            })
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }
}

// === XML rendering ===

fn element(name: &str, value: &str) -> String {
    format!("<{name}>{}</{name}>", escape_xml(value))
}

fn result_element(action: &str, inner: &str) -> String {
    format!("<{action}Result>{inner}</{action}Result>")
}

fn sorted(map: &HashMap<String, String>) -> impl Iterator<Item = (&String, &String)> {
    map.iter().collect::<BTreeMap<_, _>>().into_iter()
}

fn name_value_elements(tag: &str, map: &HashMap<String, String>) -> String {
    sorted(map)
        .map(|(k, v)| format!("<{tag}>{}{}</{tag}>", element("Name", k), element("Value", v)))
        .collect()
}

fn message_element(message: &ReceivedMessage) -> String {
    let mut xml = String::from("<Message>");
    xml.push_str(&element("MessageId", &message.message_id));
    xml.push_str(&element("ReceiptHandle", &message.receipt_handle));
    xml.push_str(&element("MD5OfBody", &message.md5_of_body));
    xml.push_str(&element("Body", &message.body));
    xml.push_str(&name_value_elements("Attribute", &message.attributes));
    if let Some(md5) = &message.md5_of_message_attributes {
        xml.push_str(&element("MD5OfMessageAttributes", md5));
    }

    let attributes: BTreeMap<_, _> = message.message_attributes.iter().collect();
    for (name, value) in attributes {
        xml.push_str("<MessageAttribute>");
        xml.push_str(&element("Name", name));
        xml.push_str("<Value>");
        if let Some(s) = &value.string_value {
            xml.push_str(&element("StringValue", s));
        }
        if let Some(b) = &value.binary_value {
            xml.push_str(&element("BinaryValue", b));
        }
        xml.push_str(&element("DataType", &value.data_type));
        xml.push_str("</Value></MessageAttribute>");
    }

    xml.push_str("</Message>");
    xml
}

fn xml_document(action: &str, inner: &str, request_id: &RequestId) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<{action}Response xmlns="{SQS_XML_NAMESPACE}">{inner}<ResponseMetadata><RequestId>{request_id}</RequestId></ResponseMetadata></{action}Response>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(query: &str) -> Params {
        let uri: Uri = format!("/?{query}").parse().unwrap();
        Params::from_request(&uri, &Bytes::new())
    }

    #[test]
    fn test_params_merge_query_and_body() {
        let uri: Uri = "/?Action=SendMessage".parse().unwrap();
        let body = Bytes::from_static(b"MessageBody=hello%20world&DelaySeconds=5");
        let p = Params::from_request(&uri, &body);

        assert_eq!(p.get("Action"), Some("SendMessage"));
        assert_eq!(p.get("MessageBody"), Some("hello world"));
        assert_eq!(p.number::<i64>("DelaySeconds").unwrap(), Some(5));
    }

    #[test]
    fn test_number_rejects_garbage() {
        let p = params("MaxNumberOfMessages=lots");
        assert!(matches!(
            p.number::<i32>("MaxNumberOfMessages"),
            Err(SqsError::InvalidParameterValue(_))
        ));
        assert_eq!(p.number::<i32>("Missing").unwrap(), None);
    }

    #[test]
    fn test_list_orders_by_index() {
        let p = params("AttributeName.2=B&AttributeName.1=A&AttributeName.10=C");
        assert_eq!(p.list("AttributeName"), vec!["A", "B", "C"]);
        assert_eq!(params("AttributeName=All").list("AttributeName"), vec!["All"]);
    }

    #[test]
    fn test_entries() {
        let p = params(
            "Attribute.1.Name=VisibilityTimeout&Attribute.1.Value=60&Attribute.2.Name=DelaySeconds&Attribute.2.Value=5",
        );
        let entries = p.entries("Attribute", "Name", "Value");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get("VisibilityTimeout").map(String::as_str), Some("60"));
    }

    #[test]
    fn test_message_attributes() {
        let p = params(
            "MessageAttribute.1.Name=color&MessageAttribute.1.Value.DataType=String&MessageAttribute.1.Value.StringValue=red",
        );
        let attrs = p.message_attributes();
        assert_eq!(attrs.get("color"), Some(&MessageAttributeValue::string("red")));
    }

    #[test]
    fn test_element_escapes_value() {
        assert_eq!(element("Body", "a<b&c"), "<Body>a&lt;b&amp;c</Body>");
    }
}
