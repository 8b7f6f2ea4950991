use chrono::Duration;

use crate::{
    domain::Timestamp,
    storage::{Entries, KvStore, StoreError},
};

/// A write that may be delayed and merged with later writes to the same keys.
#[derive(Debug, Clone, Default)]
pub struct Coalesced(pub Entries);

/// A write that must reach the store before anything else happens. Used for
/// archival and removal, where a lost write would resurrect an entity.
#[derive(Debug, Clone, Default)]
pub struct Urgent(pub Entries);

/// Dirty buffer flushed once the debounce delay has passed without a new stage.
#[derive(Debug)]
pub struct WriteBuffer {
    pending: Entries,
    due_at: Option<Timestamp>,
    delay: Duration,
}

impl WriteBuffer {
    pub fn new(delay_ms: i64) -> Self {
        Self {
            pending: Entries::new(),
            due_at: None,
            delay: Duration::milliseconds(delay_ms),
        }
    }

    pub fn stage(&mut self, write: Coalesced, now: Timestamp) {
        if write.0.is_empty() {
            return;
        }
        self.pending.extend(write.0);
        self.due_at = Some(now + self.delay);
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Drops everything staged. Used when an external reset makes local writes obsolete.
    pub fn discard_all(&mut self) {
        if !self.pending.is_empty() {
            log::debug!("Discarding {} pending keys", self.pending.len());
        }
        self.pending.clear();
        self.due_at = None;
    }

    /// Drops one staged key, e.g. a local list the store has since replaced.
    pub fn discard(&mut self, key: &str) {
        self.pending.remove(key);
        if self.pending.is_empty() {
            self.due_at = None;
        }
    }

    /// Flushes if the delay elapsed. A failed flush keeps the entries for the next try.
    pub fn flush_due(&mut self, store: &dyn KvStore, now: Timestamp) -> Result<bool, StoreError> {
        match self.due_at {
            Some(due) if now >= due => self.flush_now(store),
            _ => Ok(false),
        }
    }

    pub fn flush_now(&mut self, store: &dyn KvStore) -> Result<bool, StoreError> {
        if !self.is_dirty() {
            self.due_at = None;
            return Ok(false);
        }
        store.set(self.pending.clone())?;
        log::debug!("Flushed {} debounced keys", self.pending.len());
        self.pending.clear();
        self.due_at = None;
        Ok(true)
    }

    /// Writes immediately and drops any pending values the write supersedes.
    /// On failure the entries are kept as a pending write due right away.
    pub fn write_urgent(&mut self, store: &dyn KvStore, write: Urgent, now: Timestamp) -> Result<(), StoreError> {
        match store.set(write.0.clone()) {
            Ok(()) => {
                for key in write.0.keys() {
                    self.pending.remove(key);
                }
                if self.pending.is_empty() {
                    self.due_at = None;
                }
                Ok(())
            }
            Err(e) => {
                self.pending.extend(write.0);
                self.due_at = Some(now);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStore;

    fn entries(key: &str, value: i64) -> Entries {
        let mut e = Entries::new();
        e.insert(key.to_string(), json!(value));
        e
    }

    #[test]
    fn test_stages_coalesce_into_one_write() {
        let store = MemoryStore::new();
        let mut buffer = WriteBuffer::new(250);
        let t0 = Utc::now();

        buffer.stage(Coalesced(entries("a", 1)), t0);
        buffer.stage(Coalesced(entries("a", 2)), t0 + Duration::milliseconds(200));
        assert!(!buffer.flush_due(&store, t0 + Duration::milliseconds(300)).unwrap());

        assert!(buffer.flush_due(&store, t0 + Duration::milliseconds(450)).unwrap());
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.contents().get("a"), Some(&json!(2)));
        assert!(!buffer.is_dirty());
    }

    #[test]
    fn test_failed_flush_is_retried() {
        let store = MemoryStore::new();
        let mut buffer = WriteBuffer::new(0);
        let now = Utc::now();
        buffer.stage(Coalesced(entries("a", 1)), now);

        store.set_available(false);
        assert!(buffer.flush_due(&store, now).is_err());
        assert!(buffer.has_pending("a"));

        store.set_available(true);
        assert!(buffer.flush_due(&store, now).unwrap());
        assert_eq!(store.contents().get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_discarded_key_is_not_flushed() {
        let store = MemoryStore::new();
        let mut buffer = WriteBuffer::new(0);
        let now = Utc::now();
        buffer.stage(Coalesced(entries("tankFish", 1)), now);
        buffer.stage(Coalesced(entries("foodSupply", 3)), now);

        buffer.discard("tankFish");
        assert!(buffer.flush_now(&store).unwrap());
        assert_eq!(store.contents().get("tankFish"), None);
        assert_eq!(store.contents().get("foodSupply"), Some(&json!(3)));

        buffer.stage(Coalesced(entries("tankFish", 1)), now);
        buffer.discard("tankFish");
        assert!(!buffer.is_dirty());
        assert!(!buffer.flush_due(&store, now).unwrap());
    }

    #[test]
    fn test_urgent_write_supersedes_pending_key() {
        let store = MemoryStore::new();
        let mut buffer = WriteBuffer::new(250);
        let now = Utc::now();
        buffer.stage(Coalesced(entries("tankFish", 1)), now);

        buffer
            .write_urgent(&store, Urgent(entries("tankFish", 2)), now)
            .unwrap();
        assert!(!buffer.is_dirty());

        assert!(!buffer.flush_now(&store).unwrap());
        assert_eq!(store.contents().get("tankFish"), Some(&json!(2)));
        assert_eq!(store.write_count(), 1);
    }
}
