//! AWS error types and formatting

use serde::Serialize;
use thiserror::Error;

/// Wire error codes understood by the emulated services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Common
    InvalidAction,
    InternalFailure,

    // SQS specific
    QueueDoesNotExist,
    QueueAlreadyExists,
    InvalidParameterValue,
    MissingParameter,
    ReceiptHandleIsInvalid,
}

impl ErrorCode {
    /// Code reported by JSON protocol responses (`__type` suffix)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAction => "InvalidAction",
            Self::InternalFailure => "InternalFailure",
            Self::QueueDoesNotExist => "QueueDoesNotExist",
            Self::QueueAlreadyExists => "QueueAlreadyExists",
            Self::InvalidParameterValue => "InvalidParameterValue",
            Self::MissingParameter => "MissingParameter",
            Self::ReceiptHandleIsInvalid => "ReceiptHandleIsInvalid",
        }
    }

    /// Code reported by Query protocol responses.
    ///
    /// A few SQS errors kept their legacy dotted names on the Query protocol
    /// and SDKs still match on them.
    pub fn query_code(&self) -> &'static str {
        match self {
            Self::QueueDoesNotExist => "AWS.SimpleQueueService.NonExistentQueue",
            other => other.as_str(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidAction
            | Self::QueueDoesNotExist
            | Self::QueueAlreadyExists
            | Self::InvalidParameterValue
            | Self::MissingParameter
            | Self::ReceiptHandleIsInvalid => 400,
            Self::InternalFailure => 500,
        }
    }

    /// `Sender` for client faults, `Receiver` for server faults
    pub fn fault(&self) -> &'static str {
        if self.http_status() >= 500 {
            "Receiver"
        } else {
            "Sender"
        }
    }
}

/// AWS-style error
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct AwsError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl AwsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Value for the `x-amzn-query-error` header that lets JSON clients
    /// recover the Query protocol code
    pub fn query_error_header(&self) -> String {
        format!("{};{}", self.code.query_code(), self.code.fault())
    }

    /// Format as a Query protocol `ErrorResponse` document
    pub fn to_xml(&self, namespace: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ErrorResponse xmlns="{}">
  <Error>
    <Type>{}</Type>
    <Code>{}</Code>
    <Message>{}</Message>
    <Detail/>
  </Error>
  <RequestId>{}</RequestId>
</ErrorResponse>"#,
            namespace,
            self.code.fault(),
            self.code.query_code(),
            escape_xml(&self.message),
            self.request_id
        )
    }

    /// Format as a JSON protocol error, e.g. `com.amazonaws.sqs#QueueDoesNotExist`
    pub fn to_json(&self, type_prefix: &str) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            #[serde(rename = "__type")]
            error_type: String,
            message: &'a str,
        }

        let error = JsonError {
            error_type: format!("{}#{}", type_prefix, self.code.as_str()),
            message: &self.message,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(
                r#"{{"__type":"{}#{}","message":"internal error"}}"#,
                type_prefix,
                self.code.as_str()
            )
        })
    }
}

/// Escape the five XML special characters
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_xml_format() {
        let error = AwsError::new(ErrorCode::QueueDoesNotExist, "The specified queue does not exist.")
            .with_request_id("test-request-id");

        let xml = error.to_xml("http://queue.amazonaws.com/doc/2012-11-05/");
        assert!(xml.contains("<Code>AWS.SimpleQueueService.NonExistentQueue</Code>"));
        assert!(xml.contains("<Type>Sender</Type>"));
        assert!(xml.contains("<RequestId>test-request-id</RequestId>"));
    }

    #[test]
    fn test_error_xml_escapes_message() {
        let error = AwsError::new(ErrorCode::InvalidParameterValue, "bad <value> & more");
        let xml = error.to_xml("ns");
        assert!(xml.contains("bad &lt;value&gt; &amp; more"));
    }

    #[test]
    fn test_error_json_format() {
        let error = AwsError::new(ErrorCode::ReceiptHandleIsInvalid, "handle not found");

        let json: serde_json::Value =
            serde_json::from_str(&error.to_json("com.amazonaws.sqs")).unwrap();
        assert_eq!(json["__type"], "com.amazonaws.sqs#ReceiptHandleIsInvalid");
        assert_eq!(json["message"], "handle not found");
    }

    #[test]
    fn test_query_error_header() {
        let error = AwsError::new(ErrorCode::QueueDoesNotExist, "missing");
        assert_eq!(
            error.query_error_header(),
            "AWS.SimpleQueueService.NonExistentQueue;Sender"
        );

        let error = AwsError::new(ErrorCode::InternalFailure, "boom");
        assert_eq!(error.query_error_header(), "InternalFailure;Receiver");
        assert_eq!(error.code.http_status(), 500);
    }
}
