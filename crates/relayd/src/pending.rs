//! Pending registry: requests whose caller already got the placeholder.
//!
//! Advisory only. Correctness decisions go through the ledger; this map exists
//! so operators can see outstanding work. Not persisted.

use chrono::Utc;
use relay_shared::{PendingEntry, PendingItem};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, request_id: &str, entry: PendingEntry) {
        debug!("Pending insert: {}", request_id);
        self.lock().insert(request_id.to_string(), entry);
    }

    pub fn remove(&self, request_id: &str) -> Option<PendingEntry> {
        let removed = self.lock().remove(request_id);
        if removed.is_some() {
            debug!("Pending remove: {}", request_id);
        }
        removed
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<PendingItem> {
        let now = Utc::now();
        let mut items: Vec<PendingItem> = self
            .lock()
            .iter()
            .map(|(id, entry)| PendingItem {
                request_id: id.clone(),
                user_id: entry.user_id.clone(),
                question: entry.question.clone(),
                start_time: entry.start_time,
                age_seconds: (now - entry.start_time).num_seconds(),
            })
            .collect();
        items.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        items
    }

    /// Insert and return a guard that removes the entry when dropped,
    /// including when the owning task unwinds.
    pub fn track(&self, request_id: &str, entry: PendingEntry) -> PendingGuard {
        self.insert(request_id, entry);
        PendingGuard {
            registry: self.clone(),
            request_id: request_id.to_string(),
        }
    }
}

/// Removes its pending entry on drop
pub struct PendingGuard {
    registry: PendingRegistry,
    request_id: String,
}

impl PendingGuard {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(user: &str) -> PendingEntry {
        PendingEntry::new(user, "question", Utc::now())
    }

    #[test]
    fn test_insert_remove() {
        let reg = PendingRegistry::new();
        reg.insert("r1", entry("u1"));
        assert!(reg.contains("r1"));
        assert_eq!(reg.len(), 1);

        assert_eq!(reg.remove("r1").unwrap().user_id, "u1");
        assert!(reg.remove("r1").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_snapshot_oldest_first() {
        let reg = PendingRegistry::new();
        let now = Utc::now();
        reg.insert("new", PendingEntry::new("u1", "q", now));
        reg.insert("old", PendingEntry::new("u2", "q", now - Duration::seconds(90)));

        let snap = reg.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].request_id, "old");
        assert!(snap[0].age_seconds >= 90);
    }

    #[test]
    fn test_guard_removes_on_drop() {
        let reg = PendingRegistry::new();
        {
            let guard = reg.track("r1", entry("u1"));
            assert_eq!(guard.request_id(), "r1");
            assert!(reg.contains("r1"));
        }
        assert!(!reg.contains("r1"));
    }

    #[test]
    fn test_guard_removes_on_panic() {
        let reg = PendingRegistry::new();
        let inner = reg.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.track("r1", entry("u1"));
            panic!("continuation blew up");
        }));
        assert!(result.is_err());
        assert!(reg.is_empty());
    }
}
