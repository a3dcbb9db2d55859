//! Queue configuration, messages and the per-queue message store

use std::collections::{HashMap, VecDeque};

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::checksum::{md5_hex, md5_of_message_attributes, sha256_hex};
use crate::dedup::DeduplicationCache;
use crate::error::SqsError;

pub const FIFO_SUFFIX: &str = ".fifo";
pub const MAX_QUEUE_NAME_LEN: usize = 80;
pub const MAX_RECEIVE_BATCH: i32 = 10;
pub const MAX_VISIBILITY_TIMEOUT: i64 = 43_200;
pub const MAX_DELAY_SECONDS: i64 = 900;

static QUEUE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\.fifo)?$").expect("queue name pattern is valid")
});

/// Check a queue name against the provider's naming rules
pub fn validate_queue_name(name: &str) -> Result<(), SqsError> {
    if name.is_empty() || name.len() > MAX_QUEUE_NAME_LEN || !QUEUE_NAME_RE.is_match(name) {
        return Err(SqsError::InvalidParameterValue(format!(
            "Can only include alphanumeric characters, hyphens, or underscores. 1 to 80 in length: {name}"
        )));
    }
    Ok(())
}

// === Attribute names ===

pub const ATTR_ALL: &str = "All";
pub const ATTR_VISIBILITY_TIMEOUT: &str = "VisibilityTimeout";
pub const ATTR_MESSAGE_RETENTION_PERIOD: &str = "MessageRetentionPeriod";
pub const ATTR_DELAY_SECONDS: &str = "DelaySeconds";
pub const ATTR_MAXIMUM_MESSAGE_SIZE: &str = "MaximumMessageSize";
pub const ATTR_RECEIVE_WAIT_TIME: &str = "ReceiveMessageWaitTimeSeconds";
pub const ATTR_FIFO_QUEUE: &str = "FifoQueue";
pub const ATTR_CONTENT_BASED_DEDUPLICATION: &str = "ContentBasedDeduplication";
pub const ATTR_QUEUE_ARN: &str = "QueueArn";
pub const ATTR_CREATED_TIMESTAMP: &str = "CreatedTimestamp";
pub const ATTR_LAST_MODIFIED_TIMESTAMP: &str = "LastModifiedTimestamp";
pub const ATTR_APPROX_MESSAGES: &str = "ApproximateNumberOfMessages";
pub const ATTR_APPROX_NOT_VISIBLE: &str = "ApproximateNumberOfMessagesNotVisible";
pub const ATTR_APPROX_DELAYED: &str = "ApproximateNumberOfMessagesDelayed";

// === Wire-facing value types ===

/// A typed message attribute. `binary_value` holds base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttributeValue {
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<String>,
}

impl MessageAttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    pub fn number(value: impl Into<String>) -> Self {
        Self {
            data_type: "Number".to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    pub fn binary(base64_value: impl Into<String>) -> Self {
        Self {
            data_type: "Binary".to_string(),
            string_value: None,
            binary_value: Some(base64_value.into()),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.data_type.starts_with("Binary")
    }

    fn validate(&self, name: &str) -> Result<(), SqsError> {
        let base = self.data_type.split('.').next().unwrap_or_default();
        let value_present = match base {
            "String" | "Number" => self.string_value.is_some(),
            "Binary" => self
                .binary_value
                .as_deref()
                .is_some_and(|v| base64::engine::general_purpose::STANDARD.decode(v).is_ok()),
            _ => {
                return Err(SqsError::InvalidParameterValue(format!(
                    "The message attribute '{name}' has an invalid message attribute type: {}",
                    self.data_type
                )))
            }
        };
        if !value_present {
            return Err(SqsError::InvalidParameterValue(format!(
                "The message attribute '{name}' must contain a non-empty value of type {}",
                self.data_type
            )));
        }
        Ok(())
    }
}

/// Inputs of a single send
#[derive(Debug, Clone, Default)]
pub struct SendMessageInput {
    pub body: String,
    pub delay_seconds: Option<i64>,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
    pub message_group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

impl SendMessageInput {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.message_group_id = Some(group_id.into());
        self
    }

    pub fn with_deduplication_id(mut self, id: impl Into<String>) -> Self {
        self.deduplication_id = Some(id.into());
        self
    }

    pub fn with_delay(mut self, seconds: i64) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }
}

/// What a send reports back. Deduplicated sends return the original one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageResult {
    pub message_id: String,
    pub md5_of_message_body: String,
    pub md5_of_message_attributes: Option<String>,
    pub sequence_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiveMessageInput {
    pub max_messages: i32,
    /// `None` or zero falls back to the queue's `VisibilityTimeout`
    pub visibility_timeout: Option<i64>,
    /// Accepted for the protocol layer's long poll; the engine never blocks
    pub wait_time_seconds: Option<i64>,
}

impl ReceiveMessageInput {
    pub fn new(max_messages: i32) -> Self {
        Self {
            max_messages,
            ..Self::default()
        }
    }

    pub fn with_visibility_timeout(mut self, seconds: i64) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }
}

/// A delivered message as the protocol layer sees it
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub md5_of_body: String,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
    pub md5_of_message_attributes: Option<String>,
    /// System attributes (`SentTimestamp`, `ApproximateReceiveCount`, ...)
    pub attributes: HashMap<String, String>,
}

// === Attribute Manager ===

/// Typed queue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAttributes {
    pub visibility_timeout: u32,
    pub message_retention_period: u32,
    pub delay_seconds: u32,
    pub maximum_message_size: u32,
    pub receive_message_wait_time_seconds: u32,
    pub fifo_queue: bool,
    pub content_based_deduplication: bool,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            visibility_timeout: 30,
            message_retention_period: 345_600, // 4 days
            delay_seconds: 0,
            maximum_message_size: 262_144, // 256KB
            receive_message_wait_time_seconds: 0,
            fifo_queue: false,
            content_based_deduplication: false,
        }
    }
}

impl QueueAttributes {
    /// Defaults overlaid with creation attributes.
    ///
    /// `FifoQueue` is only honoured here; a FIFO queue's name must carry the
    /// `.fifo` suffix.
    pub fn for_new_queue(name: &str, attrs: &HashMap<String, String>) -> Result<Self, SqsError> {
        let mut attributes = Self::default();
        if let Some(value) = attrs.get(ATTR_FIFO_QUEUE) {
            attributes.fifo_queue = parse_bool(ATTR_FIFO_QUEUE, value)?;
        }
        if attributes.fifo_queue && !name.ends_with(FIFO_SUFFIX) {
            return Err(SqsError::InvalidParameterValue(format!(
                "The name of a FIFO queue can only include alphanumeric characters, hyphens, or underscores, must end with .fifo suffix: {name}"
            )));
        }
        attributes.apply(attrs)?;
        Ok(attributes)
    }

    /// Apply writable attributes from a string bag.
    ///
    /// Unknown and read-only names are skipped. A bad value for a known name
    /// fails the whole call and leaves `self` untouched.
    pub fn apply(&mut self, attrs: &HashMap<String, String>) -> Result<(), SqsError> {
        let mut next = self.clone();
        for (name, value) in attrs {
            match name.as_str() {
                ATTR_VISIBILITY_TIMEOUT => {
                    next.visibility_timeout = parse_ranged(name, value, 0, 43_200)?;
                }
                ATTR_MESSAGE_RETENTION_PERIOD => {
                    next.message_retention_period = parse_ranged(name, value, 60, 1_209_600)?;
                }
                ATTR_DELAY_SECONDS => {
                    next.delay_seconds = parse_ranged(name, value, 0, 900)?;
                }
                ATTR_MAXIMUM_MESSAGE_SIZE => {
                    next.maximum_message_size = parse_ranged(name, value, 1024, 262_144)?;
                }
                ATTR_RECEIVE_WAIT_TIME => {
                    next.receive_message_wait_time_seconds = parse_ranged(name, value, 0, 20)?;
                }
                ATTR_CONTENT_BASED_DEDUPLICATION => {
                    next.content_based_deduplication = parse_bool(name, value)?;
                }
                _ => {}
            }
        }
        *self = next;
        Ok(())
    }

    /// Configured (non-derived) attributes as strings
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(ATTR_VISIBILITY_TIMEOUT.into(), self.visibility_timeout.to_string());
        map.insert(
            ATTR_MESSAGE_RETENTION_PERIOD.into(),
            self.message_retention_period.to_string(),
        );
        map.insert(ATTR_DELAY_SECONDS.into(), self.delay_seconds.to_string());
        map.insert(ATTR_MAXIMUM_MESSAGE_SIZE.into(), self.maximum_message_size.to_string());
        map.insert(
            ATTR_RECEIVE_WAIT_TIME.into(),
            self.receive_message_wait_time_seconds.to_string(),
        );
        if self.fifo_queue {
            map.insert(ATTR_FIFO_QUEUE.into(), "true".into());
            map.insert(
                ATTR_CONTENT_BASED_DEDUPLICATION.into(),
                self.content_based_deduplication.to_string(),
            );
        }
        map
    }
}

fn parse_ranged(name: &str, value: &str, min: u32, max: u32) -> Result<u32, SqsError> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|v| (min..=max).contains(v))
        .ok_or_else(|| {
            SqsError::InvalidParameterValue(format!(
                "Invalid value for the parameter {name}: {value} (must be between {min} and {max})"
            ))
        })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, SqsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(SqsError::InvalidParameterValue(format!(
            "Invalid value for the parameter {name}: {value}"
        ))),
    }
}

// === Messages ===

#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: String,
    pub body: String,
    pub md5_of_body: String,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
    pub md5_of_message_attributes: Option<String>,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
    /// Eligible for receive once `now >= visible_at`
    pub visible_at: DateTime<Utc>,
    pub receive_count: u32,
    pub first_received_at: Option<DateTime<Utc>>,
    pub receipt_handle: Option<String>,
    pub message_group_id: Option<String>,
    pub deduplication_id: Option<String>,
    pub sequence_number: Option<String>,
    /// Enqueue order within the queue, used to slot returned messages back
    position: u64,
}

impl Message {
    /// System attributes as reported on receive
    pub fn system_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("SenderId".to_string(), self.sender_id.clone());
        attrs.insert(
            "SentTimestamp".to_string(),
            self.sent_at.timestamp_millis().to_string(),
        );
        attrs.insert(
            "ApproximateReceiveCount".to_string(),
            self.receive_count.to_string(),
        );
        if let Some(first) = self.first_received_at {
            attrs.insert(
                "ApproximateFirstReceiveTimestamp".to_string(),
                first.timestamp_millis().to_string(),
            );
        }
        if let Some(group) = &self.message_group_id {
            attrs.insert("MessageGroupId".to_string(), group.clone());
        }
        if let Some(dedup) = &self.deduplication_id {
            attrs.insert("MessageDeduplicationId".to_string(), dedup.clone());
        }
        if let Some(seq) = &self.sequence_number {
            attrs.insert("SequenceNumber".to_string(), seq.clone());
        }
        attrs
    }

    fn to_received(&self, receipt_handle: String) -> ReceivedMessage {
        ReceivedMessage {
            message_id: self.message_id.clone(),
            receipt_handle,
            body: self.body.clone(),
            md5_of_body: self.md5_of_body.clone(),
            message_attributes: self.message_attributes.clone(),
            md5_of_message_attributes: self.md5_of_message_attributes.clone(),
            attributes: self.system_attributes(),
        }
    }
}

// === Queue ===

/// Queue metadata without its messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub name: String,
    pub url: String,
    pub arn: String,
    pub attributes: QueueAttributes,
    pub created_at: i64,
    pub last_modified_at: i64,
}

/// A queue and the messages it owns.
///
/// Pending messages live in `messages` in enqueue order; received messages
/// move to `inflight`, keyed by their current receipt handle.
#[derive(Debug)]
pub struct Queue {
    pub name: String,
    pub url: String,
    pub arn: String,
    pub attributes: QueueAttributes,
    pub created_at: i64,
    pub last_modified_at: i64,
    pub tags: HashMap<String, String>,
    messages: VecDeque<Message>,
    inflight: HashMap<String, Message>,
    next_position: u64,
    sequence_counter: u64,
    dedup: Option<DeduplicationCache>,
    requeue_expired_inflight: bool,
}

impl Queue {
    pub fn new(
        name: String,
        url: String,
        arn: String,
        attributes: QueueAttributes,
        requeue_expired_inflight: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let dedup = attributes.fifo_queue.then(DeduplicationCache::new);
        Self {
            name,
            url,
            arn,
            attributes,
            created_at: now.timestamp(),
            last_modified_at: now.timestamp(),
            tags: HashMap::new(),
            messages: VecDeque::new(),
            inflight: HashMap::new(),
            next_position: 0,
            sequence_counter: 0,
            dedup,
            requeue_expired_inflight,
        }
    }

    pub fn is_fifo(&self) -> bool {
        self.attributes.fifo_queue
    }

    pub fn summary(&self) -> QueueSummary {
        QueueSummary {
            name: self.name.clone(),
            url: self.url.clone(),
            arn: self.arn.clone(),
            attributes: self.attributes.clone(),
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
        }
    }

    /// Messages waiting in the pending sequence, visible or delayed
    pub fn pending_len(&self) -> usize {
        self.messages.len()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn send_message(
        &mut self,
        input: SendMessageInput,
        sender_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SendMessageResult, SqsError> {
        self.validate_send(&input)?;

        let deduplication_id = if self.is_fifo() {
            let key = self.deduplication_key(&input)?;
            if let Some(cache) = self.dedup.as_mut() {
                cache.sweep(now);
                if let Some(original) = cache.lookup(&key, now) {
                    debug!(queue = %self.name, dedup_id = %key, message_id = %original.message_id, "Duplicate send collapsed");
                    return Ok(original.clone());
                }
            }
            Some(key)
        } else {
            None
        };

        let delay = input
            .delay_seconds
            .unwrap_or_else(|| i64::from(self.attributes.delay_seconds))
            .max(0);

        let sequence_number = if self.is_fifo() {
            self.sequence_counter += 1;
            Some(format!("{:020}", self.sequence_counter))
        } else {
            None
        };

        let md5_of_body = md5_hex(input.body.as_bytes());
        let md5_of_message_attributes = md5_of_message_attributes(&input.message_attributes);
        let message = Message {
            message_id: Uuid::new_v4().to_string(),
            body: input.body,
            md5_of_body,
            message_attributes: input.message_attributes,
            md5_of_message_attributes,
            sender_id: sender_id.to_string(),
            sent_at: now,
            visible_at: now + Duration::seconds(delay),
            receive_count: 0,
            first_received_at: None,
            receipt_handle: None,
            message_group_id: if self.is_fifo() {
                input.message_group_id
            } else {
                None
            },
            deduplication_id: deduplication_id.clone(),
            sequence_number: sequence_number.clone(),
            position: self.next_position,
        };
        self.next_position += 1;

        let result = SendMessageResult {
            message_id: message.message_id.clone(),
            md5_of_message_body: message.md5_of_body.clone(),
            md5_of_message_attributes: message.md5_of_message_attributes.clone(),
            sequence_number,
        };

        if let (Some(key), Some(cache)) = (deduplication_id, self.dedup.as_mut()) {
            cache.record(key, result.clone(), now);
        }

        self.messages.push_back(message);
        Ok(result)
    }

    fn validate_send(&self, input: &SendMessageInput) -> Result<(), SqsError> {
        if input.body.is_empty() {
            return Err(SqsError::InvalidParameterValue(
                "The request must contain the parameter MessageBody.".to_string(),
            ));
        }
        let max_size = self.attributes.maximum_message_size as usize;
        if input.body.len() > max_size {
            return Err(SqsError::InvalidParameterValue(format!(
                "One or more parameters are invalid. Reason: Message must be shorter than {max_size} bytes."
            )));
        }
        if let Some(delay) = input.delay_seconds {
            if delay > MAX_DELAY_SECONDS {
                return Err(SqsError::InvalidParameterValue(format!(
                    "Value {delay} for parameter DelaySeconds is invalid. Reason: must be between 0 and 900."
                )));
            }
        }
        for (name, value) in &input.message_attributes {
            value.validate(name)?;
        }
        if self.is_fifo()
            && input
                .message_group_id
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(SqsError::MissingParameter(
                "The request must contain the parameter MessageGroupId.".to_string(),
            ));
        }
        Ok(())
    }

    fn deduplication_key(&self, input: &SendMessageInput) -> Result<String, SqsError> {
        match input.deduplication_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ if self.attributes.content_based_deduplication => {
                Ok(sha256_hex(input.body.as_bytes()))
            }
            _ => Err(SqsError::InvalidParameterValue(
                "The queue should either have ContentBasedDeduplication enabled or MessageDeduplicationId provided explicitly".to_string(),
            )),
        }
    }

    /// Move up to `max_messages` eligible messages in-flight.
    ///
    /// One ordered pass over the pending sequence; messages past their
    /// retention period are dropped on the way, everything else that is not
    /// taken keeps its relative order.
    pub fn receive_messages(
        &mut self,
        input: &ReceiveMessageInput,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReceivedMessage>, SqsError> {
        let visibility_timeout = match input.visibility_timeout {
            Some(t) if !(0..=MAX_VISIBILITY_TIMEOUT).contains(&t) => {
                return Err(SqsError::InvalidParameterValue(format!(
                    "Value {t} for parameter VisibilityTimeout is invalid. Reason: must be between 0 and 43200."
                )))
            }
            Some(t) => t,
            None => i64::from(self.attributes.visibility_timeout),
        };
        let max = usize::try_from(input.max_messages.clamp(1, MAX_RECEIVE_BATCH)).unwrap_or(1);

        if self.requeue_expired_inflight {
            self.requeue_expired(now);
        }

        let pending = std::mem::take(&mut self.messages);
        let mut received = Vec::new();

        for mut message in pending {
            if !self.is_retained(&message, now) {
                debug!(queue = %self.name, message_id = %message.message_id, "Dropping message past retention");
                continue;
            }
            if received.len() < max && message.visible_at <= now {
                let receipt_handle = Uuid::new_v4().to_string();
                message.receipt_handle = Some(receipt_handle.clone());
                message.visible_at = now + Duration::seconds(visibility_timeout);
                message.receive_count += 1;
                message.first_received_at.get_or_insert(now);

                received.push(message.to_received(receipt_handle.clone()));
                self.inflight.insert(receipt_handle, message);
            } else {
                self.messages.push_back(message);
            }
        }

        Ok(received)
    }

    /// Whether `message` is still inside the queue's retention period
    fn is_retained(&self, message: &Message, now: DateTime<Utc>) -> bool {
        message.sent_at > now - Duration::seconds(i64::from(self.attributes.message_retention_period))
    }

    /// Return in-flight messages whose visibility window has elapsed
    fn requeue_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .inflight
            .iter()
            .filter(|(_, m)| m.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some(message) = self.inflight.remove(&handle) {
                debug!(queue = %self.name, message_id = %message.message_id, "Visibility timeout elapsed, message returned");
                self.readmit(message, now);
            }
        }
    }

    /// Put a message back into the pending sequence at its enqueue position
    fn readmit(&mut self, mut message: Message, now: DateTime<Utc>) {
        message.receipt_handle = None;
        message.visible_at = message.visible_at.min(now);
        let index = self.messages.partition_point(|m| m.position < message.position);
        self.messages.insert(index, message);
    }

    pub fn delete_message(&mut self, receipt_handle: &str) -> Result<(), SqsError> {
        self.inflight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| SqsError::ReceiptHandleIsInvalid(receipt_handle.to_string()))
    }

    pub fn change_message_visibility(
        &mut self,
        receipt_handle: &str,
        timeout: i64,
        now: DateTime<Utc>,
    ) -> Result<(), SqsError> {
        if !(0..=MAX_VISIBILITY_TIMEOUT).contains(&timeout) {
            return Err(SqsError::InvalidParameterValue(format!(
                "Value {timeout} for parameter VisibilityTimeout is invalid. Reason: must be between 0 and 43200."
            )));
        }
        if !self.inflight.contains_key(receipt_handle) {
            return Err(SqsError::ReceiptHandleIsInvalid(receipt_handle.to_string()));
        }

        if timeout == 0 {
            if let Some(message) = self.inflight.remove(receipt_handle) {
                self.readmit(message, now);
            }
        } else if let Some(message) = self.inflight.get_mut(receipt_handle) {
            message.visible_at = now + Duration::seconds(timeout);
        }
        Ok(())
    }

    /// Drop all pending and in-flight messages. The deduplication cache is kept.
    pub fn purge(&mut self) {
        self.messages.clear();
        self.inflight.clear();
    }

    /// Read attributes by name; `All` (or no names) selects everything and
    /// unknown names are skipped.
    pub fn get_attributes(&self, names: &[String], now: DateTime<Utc>) -> HashMap<String, String> {
        let mut all = self.attributes.to_map();
        all.insert(ATTR_QUEUE_ARN.into(), self.arn.clone());
        all.insert(ATTR_CREATED_TIMESTAMP.into(), self.created_at.to_string());
        all.insert(ATTR_LAST_MODIFIED_TIMESTAMP.into(), self.last_modified_at.to_string());

        // Counts mirror what the next receive would see: messages past
        // retention are dropped there, so they are not counted here.
        let (visible, delayed) = self
            .messages
            .iter()
            .filter(|m| self.is_retained(m, now))
            .fold((0usize, 0usize), |(visible, delayed), m| {
                if m.visible_at <= now {
                    (visible + 1, delayed)
                } else {
                    (visible, delayed + 1)
                }
            });
        let (expired_inflight, readmittable) = if self.requeue_expired_inflight {
            self.inflight
                .values()
                .filter(|m| m.visible_at <= now)
                .fold((0usize, 0usize), |(expired, readmittable), m| {
                    (expired + 1, readmittable + usize::from(self.is_retained(m, now)))
                })
        } else {
            (0, 0)
        };
        all.insert(ATTR_APPROX_MESSAGES.into(), (visible + readmittable).to_string());
        all.insert(
            ATTR_APPROX_NOT_VISIBLE.into(),
            (self.inflight.len() - expired_inflight).to_string(),
        );
        all.insert(ATTR_APPROX_DELAYED.into(), delayed.to_string());

        if names.is_empty() || names.iter().any(|n| n == ATTR_ALL) {
            return all;
        }
        names
            .iter()
            .filter_map(|n| all.get(n).map(|v| (n.clone(), v.clone())))
            .collect()
    }

    pub fn set_attributes(
        &mut self,
        attrs: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), SqsError> {
        self.attributes.apply(attrs)?;
        self.last_modified_at = now.timestamp();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn dedup_len(&self) -> usize {
        self.dedup.as_ref().map_or(0, DeduplicationCache::len)
    }
}
