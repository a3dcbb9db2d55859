//! FIFO deduplication cache

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::queue::SendMessageResult;

/// How long a deduplication id collapses repeated sends
pub const DEDUPLICATION_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct DedupEntry {
    result: SendMessageResult,
    expires_at: DateTime<Utc>,
}

/// Maps deduplication ids to the result of the send that first used them.
///
/// Entries expire `DEDUPLICATION_WINDOW_SECS` after that first send. Expired
/// entries are only removed by `sweep`, which the queue runs on every FIFO
/// send; `lookup` ignores them regardless.
#[derive(Debug, Default)]
pub struct DeduplicationCache {
    entries: HashMap<String, DedupEntry>,
}

impl DeduplicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry whose window has elapsed
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// The original result for `key`, if its window is still open
    pub fn lookup(&self, key: &str, now: DateTime<Utc>) -> Option<&SendMessageResult> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| &entry.result)
    }

    pub fn record(&mut self, key: String, result: SendMessageResult, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            DedupEntry {
                result,
                expires_at: now + Duration::seconds(DEDUPLICATION_WINDOW_SECS),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> SendMessageResult {
        SendMessageResult {
            message_id: id.to_string(),
            md5_of_message_body: "md5".to_string(),
            md5_of_message_attributes: None,
            sequence_number: Some("00000000000000000001".to_string()),
        }
    }

    #[test]
    fn test_lookup_within_window() {
        let now = Utc::now();
        let mut cache = DeduplicationCache::new();
        cache.record("key".to_string(), result("m1"), now);

        let hit = cache.lookup("key", now + Duration::seconds(299)).unwrap();
        assert_eq!(hit.message_id, "m1");
        assert!(cache.lookup("other", now).is_none());
    }

    #[test]
    fn test_lookup_ignores_expired_entry() {
        let now = Utc::now();
        let mut cache = DeduplicationCache::new();
        cache.record("key".to_string(), result("m1"), now);

        let later = now + Duration::seconds(DEDUPLICATION_WINDOW_SECS);
        assert!(cache.lookup("key", later).is_none());
        // Still present until swept
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let now = Utc::now();
        let mut cache = DeduplicationCache::new();
        cache.record("old".to_string(), result("m1"), now);
        cache.record("new".to_string(), result("m2"), now + Duration::seconds(200));

        cache.sweep(now + Duration::seconds(301));
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("new", now + Duration::seconds(301)).is_some());

        cache.sweep(now + Duration::seconds(600));
        assert!(cache.is_empty());
    }
}
