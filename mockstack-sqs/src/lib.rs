//! In-memory SQS emulation for mockstack
//!
//! Provides a queue engine with:
//! - Idempotent queue lifecycle (create, delete, list, lookup)
//! - Visibility-timeout based at-least-once delivery
//! - FIFO queues with explicit or content-based deduplication
//! - Queue attributes and tags
//!
//! served over both the JSON (`X-Amz-Target`) and Query (`Action=`) protocols.

pub mod checksum;
pub mod clock;
pub mod dedup;
pub mod error;
pub mod handlers;
mod protocol;
pub mod query;
pub mod queue;
mod storage;


pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SqsError;
pub use handlers::{handle_request, router};
pub use queue::{
    MessageAttributeValue, QueueAttributes, QueueSummary, ReceiveMessageInput, ReceivedMessage,
    SendMessageInput, SendMessageResult,
};
pub use storage::{SqsConfig, SqsState, SqsStorage, MAX_WAIT_TIME_SECONDS};
