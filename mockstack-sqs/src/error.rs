//! SQS engine errors

use mockstack_core::{AwsError, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqsError {
    #[error("The specified queue does not exist: {0}")]
    QueueDoesNotExist(String),
    /// Never produced by `create_queue`, which is idempotent by name
    #[error("Queue already exists: {0}")]
    QueueAlreadyExists(String),
    #[error("{0}")]
    InvalidParameterValue(String),
    #[error("{0}")]
    MissingParameter(String),
    #[error("The receipt handle is not valid: {0}")]
    ReceiptHandleIsInvalid(String),
}

impl SqsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::QueueDoesNotExist(_) => ErrorCode::QueueDoesNotExist,
            Self::QueueAlreadyExists(_) => ErrorCode::QueueAlreadyExists,
            Self::InvalidParameterValue(_) => ErrorCode::InvalidParameterValue,
            Self::MissingParameter(_) => ErrorCode::MissingParameter,
            Self::ReceiptHandleIsInvalid(_) => ErrorCode::ReceiptHandleIsInvalid,
        }
    }
}

impl From<SqsError> for AwsError {
    fn from(err: SqsError) -> Self {
        AwsError::new(err.code(), err.to_string())
    }
}
