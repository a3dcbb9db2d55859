//! SQS in-memory storage

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mockstack_core::AccountContext;
use tokio::sync::Notify;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::error::SqsError;
use crate::queue::{
    validate_queue_name, Queue, QueueAttributes, QueueSummary, ReceiveMessageInput,
    ReceivedMessage, SendMessageInput, SendMessageResult,
};

/// Longest long-poll wait a request may ask for
pub const MAX_WAIT_TIME_SECONDS: i64 = 20;

/// How often a long poll re-checks for delayed or returned messages
const LONG_POLL_TICK: StdDuration = StdDuration::from_millis(200);

/// Construction inputs for the queue engine
#[derive(Debug, Clone)]
pub struct SqsConfig {
    pub account: AccountContext,
    /// Return in-flight messages to the pending sequence once their
    /// visibility window elapses. When false, an undeleted message stays
    /// in-flight until deleted, purged or made visible explicitly.
    pub requeue_expired_inflight: bool,
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            account: AccountContext::default(),
            requeue_expired_inflight: true,
        }
    }
}

/// Registry of queues, keyed by queue URL.
///
/// Each queue sits behind its own map shard lock, so operations on one queue
/// are serialized while unrelated queues proceed independently.
#[derive(Debug)]
pub struct SqsStorage {
    config: SqsConfig,
    clock: Arc<dyn Clock>,
    queues: DashMap<String, Queue>,
}

impl SqsStorage {
    pub fn new(config: SqsConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SqsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            queues: DashMap::new(),
        }
    }

    /// The URL a queue called `name` gets
    pub fn queue_url(&self, name: &str) -> String {
        self.config.account.resource_url(name)
    }

    /// Map a client-supplied queue URL onto the registry key.
    ///
    /// Clients may reach the emulator through another host name than the one
    /// baked into generated URLs, so unknown URLs fall back to their last path
    /// segment as the queue name.
    fn resolve(&self, queue_url: &str) -> String {
        if self.queues.contains_key(queue_url) {
            return queue_url.to_string();
        }
        let name = queue_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(queue_url);
        self.queue_url(name)
    }

    fn with_queue<T>(
        &self,
        queue_url: &str,
        f: impl FnOnce(&Queue) -> T,
    ) -> Result<T, SqsError> {
        let key = self.resolve(queue_url);
        self.queues
            .get(&key)
            .map(|q| f(q.value()))
            .ok_or_else(|| SqsError::QueueDoesNotExist(queue_url.to_string()))
    }

    fn with_queue_mut<T>(
        &self,
        queue_url: &str,
        f: impl FnOnce(&mut Queue) -> Result<T, SqsError>,
    ) -> Result<T, SqsError> {
        let key = self.resolve(queue_url);
        let mut queue = self
            .queues
            .get_mut(&key)
            .ok_or_else(|| SqsError::QueueDoesNotExist(queue_url.to_string()))?;
        f(queue.value_mut())
    }

    /// Create a queue, or return the existing one with the same name untouched
    pub fn create_queue(
        &self,
        name: &str,
        attributes: &HashMap<String, String>,
        tags: HashMap<String, String>,
    ) -> Result<QueueSummary, SqsError> {
        validate_queue_name(name)?;
        let url = self.queue_url(name);

        match self.queues.entry(url.clone()) {
            Entry::Occupied(existing) => Ok(existing.get().summary()),
            Entry::Vacant(slot) => {
                let queue_attributes = QueueAttributes::for_new_queue(name, attributes)?;
                let mut queue = Queue::new(
                    name.to_string(),
                    url.clone(),
                    self.config.account.arn("sqs", name),
                    queue_attributes,
                    self.config.requeue_expired_inflight,
                    self.clock.now(),
                );
                queue.tags = tags;
                info!(name = %name, url = %url, fifo = queue.is_fifo(), "Creating queue");
                let summary = queue.summary();
                slot.insert(queue);
                Ok(summary)
            }
        }
    }

    /// Delete a queue with all of its messages and deduplication state
    pub fn delete_queue(&self, queue_url: &str) -> Result<(), SqsError> {
        let key = self.resolve(queue_url);
        let (_, queue) = self
            .queues
            .remove(&key)
            .ok_or_else(|| SqsError::QueueDoesNotExist(queue_url.to_string()))?;
        info!(name = %queue.name, "Deleting queue");
        Ok(())
    }

    pub fn get_queue_url(&self, name: &str) -> Result<String, SqsError> {
        let url = self.queue_url(name);
        if self.queues.contains_key(&url) {
            Ok(url)
        } else {
            Err(SqsError::QueueDoesNotExist(name.to_string()))
        }
    }

    pub fn get_queue(&self, queue_url: &str) -> Result<QueueSummary, SqsError> {
        self.with_queue(queue_url, Queue::summary)
    }

    /// URLs of queues whose name starts with `prefix`, in no particular order
    pub fn list_queues(&self, prefix: Option<&str>) -> Vec<String> {
        self.queues
            .iter()
            .filter(|q| prefix.map_or(true, |p| q.value().name.starts_with(p)))
            .map(|q| q.value().url.clone())
            .collect()
    }

    pub fn send_message(
        &self,
        queue_url: &str,
        input: SendMessageInput,
    ) -> Result<SendMessageResult, SqsError> {
        let sender_id = &self.config.account.account_id;
        let result = self.with_queue_mut(queue_url, |queue| {
            queue.send_message(input, sender_id, self.clock.now())
        })?;

        info!(queue = %queue_url, message_id = %result.message_id, "Sent message");
        Ok(result)
    }

    pub fn receive_message(
        &self,
        queue_url: &str,
        input: &ReceiveMessageInput,
    ) -> Result<Vec<ReceivedMessage>, SqsError> {
        let messages = self.with_queue_mut(queue_url, |queue| {
            queue.receive_messages(input, self.clock.now())
        })?;

        if !messages.is_empty() {
            info!(queue = %queue_url, count = messages.len(), "Received messages");
        }
        Ok(messages)
    }

    pub fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), SqsError> {
        self.with_queue_mut(queue_url, |queue| queue.delete_message(receipt_handle))?;
        info!(queue = %queue_url, receipt = %receipt_handle, "Deleted message");
        Ok(())
    }

    pub fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i64,
    ) -> Result<(), SqsError> {
        self.with_queue_mut(queue_url, |queue| {
            queue.change_message_visibility(receipt_handle, visibility_timeout, self.clock.now())
        })
    }

    pub fn purge_queue(&self, queue_url: &str) -> Result<(), SqsError> {
        self.with_queue_mut(queue_url, |queue| {
            queue.purge();
            Ok(())
        })?;
        info!(queue = %queue_url, "Purged queue");
        Ok(())
    }

    pub fn get_queue_attributes(
        &self,
        queue_url: &str,
        names: &[String],
    ) -> Result<HashMap<String, String>, SqsError> {
        self.with_queue(queue_url, |queue| queue.get_attributes(names, self.clock.now()))
    }

    pub fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), SqsError> {
        self.with_queue_mut(queue_url, |queue| {
            queue.set_attributes(attributes, self.clock.now())
        })?;
        info!(queue = %queue_url, "Updated queue attributes");
        Ok(())
    }

    pub fn tag_queue(
        &self,
        queue_url: &str,
        tags: HashMap<String, String>,
    ) -> Result<(), SqsError> {
        self.with_queue_mut(queue_url, |queue| {
            queue.tags.extend(tags);
            Ok(())
        })
    }

    pub fn untag_queue(&self, queue_url: &str, keys: &[String]) -> Result<(), SqsError> {
        self.with_queue_mut(queue_url, |queue| {
            for key in keys {
                queue.tags.remove(key);
            }
            Ok(())
        })
    }

    pub fn list_queue_tags(&self, queue_url: &str) -> Result<HashMap<String, String>, SqsError> {
        self.with_queue(queue_url, |queue| queue.tags.clone())
    }

    #[cfg(test)]
    pub(crate) fn inspect<T>(
        &self,
        queue_url: &str,
        f: impl FnOnce(&Queue) -> T,
    ) -> Result<T, SqsError> {
        self.with_queue(queue_url, f)
    }
}

/// State for SQS handlers
///
/// Wraps the engine and wakes long-polling receivers whenever a message is
/// sent. The engine itself never waits.
#[derive(Debug)]
pub struct SqsState {
    storage: SqsStorage,
    message_sent: Notify,
}

impl SqsState {
    pub fn new(config: SqsConfig) -> Self {
        Self::from_storage(SqsStorage::new(config))
    }

    pub fn from_storage(storage: SqsStorage) -> Self {
        Self {
            storage,
            message_sent: Notify::new(),
        }
    }

    pub fn storage(&self) -> &SqsStorage {
        &self.storage
    }

    pub fn send_message(
        &self,
        queue_url: &str,
        input: SendMessageInput,
    ) -> Result<SendMessageResult, SqsError> {
        let result = self.storage.send_message(queue_url, input)?;
        self.message_sent.notify_waiters();
        Ok(result)
    }

    /// Receive, long-polling for up to `WaitTimeSeconds` (or the queue's
    /// `ReceiveMessageWaitTimeSeconds`) while nothing is eligible.
    ///
    /// Dropping the returned future abandons the wait.
    pub async fn receive_message(
        &self,
        queue_url: &str,
        input: ReceiveMessageInput,
    ) -> Result<Vec<ReceivedMessage>, SqsError> {
        let wait_seconds = match input.wait_time_seconds {
            Some(w) if !(0..=MAX_WAIT_TIME_SECONDS).contains(&w) => {
                return Err(SqsError::InvalidParameterValue(format!(
                    "Value {w} for parameter WaitTimeSeconds is invalid. Reason: must be between 0 and 20."
                )))
            }
            Some(w) => w,
            None => {
                let summary = self.storage.get_queue(queue_url)?;
                i64::from(summary.attributes.receive_message_wait_time_seconds)
            }
        };
        let deadline = tokio::time::Instant::now()
            + StdDuration::from_secs(u64::try_from(wait_seconds).unwrap_or(0));

        loop {
            // Register interest before looking so a send in between is not missed
            let notified = self.message_sent.notified();

            let messages = self.storage.receive_message(queue_url, &input)?;
            let now = tokio::time::Instant::now();
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }

            let tick = (deadline - now).min(LONG_POLL_TICK);
            let _ = tokio::time::timeout(tick, notified).await;
        }
    }
}
