//! Core types for MockStack
//!
//! This crate provides the pieces every emulated service shares: wire error
//! codes and their XML/JSON renderings, request ids, and the account/region
//! context baked into generated URLs and ARNs.

pub mod account;
pub mod error;
pub mod request_id;

pub use account::AccountContext;
pub use error::{AwsError, ErrorCode};
pub use request_id::RequestId;
