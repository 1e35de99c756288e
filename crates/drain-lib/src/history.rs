//! Drain history tracking
//!
//! Remembers, per service instance, the virtual time of the most recent
//! kill. Lives for a single scheduling run.

use crate::models::ServiceInstanceKey;
use std::collections::HashMap;
use tracing::trace;

/// Most recent kill of a service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainRecord {
    pub killed_at: u64,
}

/// In-memory map of service instance to its last kill
#[derive(Debug, Default)]
pub struct DrainHistory {
    records: HashMap<ServiceInstanceKey, DrainRecord>,
}

impl DrainHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last kill, or `None` if the key was never drained
    pub fn last_kill_time(&self, key: &ServiceInstanceKey) -> Option<u64> {
        self.records.get(key).map(|r| r.killed_at)
    }

    /// Record a kill, superseding any earlier record for the key
    pub fn record_kill(&mut self, key: ServiceInstanceKey, at: u64) {
        trace!(key = %key, at, "Recording kill");
        self.records.insert(key, DrainRecord { killed_at: at });
    }

    /// Seconds elapsed between the last kill of `key` and `now`
    ///
    /// `None` means the key has never been killed and any cooldown is satisfied.
    pub fn since_last_kill(&self, key: &ServiceInstanceKey, now: u64) -> Option<u64> {
        self.last_kill_time(key).map(|t| now.saturating_sub(t))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_has_no_kill() {
        let history = DrainHistory::new();
        let key = ServiceInstanceKey::new("api", "main");
        assert_eq!(history.last_kill_time(&key), None);
        assert_eq!(history.since_last_kill(&key, 500), None);
        assert!(history.is_empty());
    }

    #[test]
    fn test_record_supersedes_previous() {
        let mut history = DrainHistory::new();
        let key = ServiceInstanceKey::new("api", "main");

        history.record_kill(key.clone(), 10);
        history.record_kill(key.clone(), 90);

        assert_eq!(history.len(), 1);
        assert_eq!(history.last_kill_time(&key), Some(90));
        assert_eq!(history.since_last_kill(&key, 100), Some(10));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut history = DrainHistory::new();
        history.record_kill(ServiceInstanceKey::new("api", "main"), 10);

        assert_eq!(
            history.last_kill_time(&ServiceInstanceKey::new("api", "canary")),
            None
        );
        assert_eq!(
            history.last_kill_time(&ServiceInstanceKey::new("web", "main")),
            None
        );
    }
}
