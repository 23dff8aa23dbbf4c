//! Per-key client-side write throttle.
//!
//! Tracks the last write time for each remote key. State is in-memory and
//! lives as long as its owner; each remote sync client owns its own
//! throttle so unrelated clients never throttle each other.
//!
//! A write takes its slot with [`WriteThrottle::try_acquire`] before it
//! starts, so concurrent writers to one key cannot both get through. The
//! returned [`ThrottleSlot`] is then either committed with the completion
//! time or released, so a failed write does not start a window.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{SyncError, SyncResult};

#[derive(Debug)]
pub struct WriteThrottle {
    window_ms: i64,
    last_write: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    at: i64,
    in_flight: bool,
}

/// A reserved write slot for one key.
#[derive(Debug)]
#[must_use = "commit or release the slot once the write finishes"]
pub struct ThrottleSlot {
    key: String,
    reserved_at: i64,
}

impl WriteThrottle {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            last_write: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Fail with [`SyncError::RateLimited`] if `key` was written, or is
    /// being written, less than one window before `now_ms`. Otherwise
    /// reserve it under the same lock. Entries whose window has passed are
    /// pruned on the way.
    pub fn try_acquire(&self, key: &str, now_ms: i64) -> SyncResult<ThrottleSlot> {
        let mut last = self.last_write.lock().unwrap();
        let window = self.window_ms;
        last.retain(|_, e| e.in_flight || now_ms - e.at < window);

        if last.contains_key(key) {
            return Err(rate_limited());
        }
        last.insert(
            key.to_string(),
            Entry {
                at: now_ms,
                in_flight: true,
            },
        );
        Ok(ThrottleSlot {
            key: key.to_string(),
            reserved_at: now_ms,
        })
    }

    /// The write finished at `now_ms`; the window runs from there.
    pub fn commit(&self, slot: ThrottleSlot, now_ms: i64) {
        let mut last = self.last_write.lock().unwrap();
        last.insert(
            slot.key,
            Entry {
                at: now_ms.max(slot.reserved_at),
                in_flight: false,
            },
        );
    }

    /// The write failed. A slot is only handed out when the key had no
    /// live window, so dropping the reservation restores the previous state.
    pub fn release(&self, slot: ThrottleSlot) {
        let reserved = Entry {
            at: slot.reserved_at,
            in_flight: true,
        };
        let mut last = self.last_write.lock().unwrap();
        if last.get(&slot.key) == Some(&reserved) {
            last.remove(&slot.key);
        }
    }

    /// Number of keys currently inside a window.
    pub fn tracked(&self) -> usize {
        self.last_write.lock().unwrap().len()
    }
}

fn rate_limited() -> SyncError {
    SyncError::RateLimited("please wait before saving again".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(t: &WriteThrottle, key: &str, at: i64) {
        let slot = t.try_acquire(key, at).unwrap();
        t.commit(slot, at);
    }

    #[test]
    fn test_first_write_allowed() {
        let t = WriteThrottle::new(1000);
        assert!(t.try_acquire("domain_example.com", 0).is_ok());
    }

    #[test]
    fn test_window_boundary() {
        let t = WriteThrottle::new(1000);
        written(&t, "k", 10_000);
        assert!(matches!(
            t.try_acquire("k", 10_999),
            Err(SyncError::RateLimited(_))
        ));
        assert!(t.try_acquire("k", 11_000).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let t = WriteThrottle::new(1000);
        written(&t, "page_example.com~a", 5_000);
        assert!(t.try_acquire("domain_example.com", 5_001).is_ok());
        assert!(t.try_acquire("page_example.com~a", 5_001).is_err());
    }

    #[test]
    fn test_rejection_does_not_extend_window() {
        let t = WriteThrottle::new(1000);
        written(&t, "k", 0);
        assert!(t.try_acquire("k", 500).is_err());
        assert!(t.try_acquire("k", 1000).is_ok());
    }

    #[test]
    fn test_reservation_blocks_second_writer() {
        let t = WriteThrottle::new(1000);
        let slot = t.try_acquire("k", 100).unwrap();
        assert!(matches!(
            t.try_acquire("k", 150),
            Err(SyncError::RateLimited(_))
        ));
        t.commit(slot, 300);
        assert!(t.try_acquire("k", 1_299).is_err());
        assert!(t.try_acquire("k", 1_300).is_ok());
    }

    #[test]
    fn test_slow_write_keeps_its_reservation() {
        let t = WriteThrottle::new(1000);
        let slot = t.try_acquire("k", 0).unwrap();
        assert!(t.try_acquire("k", 5_000).is_err());
        t.commit(slot, 5_000);
        assert!(t.try_acquire("k", 5_500).is_err());
        assert!(t.try_acquire("k", 6_000).is_ok());
    }

    #[test]
    fn test_release_restores_previous_state() {
        let t = WriteThrottle::new(1000);
        let slot = t.try_acquire("k", 0).unwrap();
        t.release(slot);
        assert!(t.try_acquire("k", 1).is_ok());
    }

    #[test]
    fn test_expired_entries_are_pruned() {
        let t = WriteThrottle::new(1000);
        for i in 0..10 {
            written(&t, &format!("k{}", i), 0);
        }
        assert_eq!(t.tracked(), 10);
        written(&t, "fresh", 5_000);
        assert_eq!(t.tracked(), 1);
    }
}
