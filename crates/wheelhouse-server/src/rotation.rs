use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

const PRUNE_THRESHOLD: usize = 4096;

/// Refresh-token ids that have already been rotated, kept until the token would have
/// expired anyway. A second presentation of the same id is a replay.
#[derive(Debug, Clone)]
pub struct RefreshLedger {
    consumed: Arc<DashMap<String, i64>>,
    // Size at which the next automatic prune runs.
    prune_at: Arc<AtomicUsize>,
}

impl Default for RefreshLedger {
    fn default() -> Self {
        Self {
            consumed: Arc::default(),
            prune_at: Arc::new(AtomicUsize::new(PRUNE_THRESHOLD)),
        }
    }
}

impl RefreshLedger {
    /// Mark `token_id` as used. Returns `false` if it was already used.
    pub fn consume(&self, token_id: &str, expires_at: i64, now: i64) -> bool {
        let prune_at = self.prune_at.load(Ordering::Relaxed);
        if self.consumed.len() >= prune_at
            && self
                .prune_at
                .compare_exchange(prune_at, usize::MAX, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.prune(now);
        }
        match self.consumed.entry(token_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }

    /// Forget ids whose token has expired. The next automatic prune waits until the
    /// survivors have doubled.
    pub fn prune(&self, now: i64) {
        self.consumed.retain(|_, expires_at| *expires_at > now);
        let next = self.consumed.len().saturating_mul(2).max(PRUNE_THRESHOLD);
        self.prune_at.store(next, Ordering::Release);
    }

    #[cfg(test)]
    fn next_prune_at(&self) -> usize {
        self.prune_at.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_use_is_rejected() {
        let ledger = RefreshLedger::default();
        assert!(ledger.consume("jti-1", 200, 100));
        assert!(!ledger.consume("jti-1", 200, 101));
        assert!(ledger.consume("jti-2", 200, 101));
    }

    #[test]
    fn clones_share_state() {
        let ledger = RefreshLedger::default();
        let other = ledger.clone();
        assert!(ledger.consume("jti", 200, 100));
        assert!(!other.consume("jti", 200, 100));
    }

    #[test]
    fn prune_drops_expired_ids() {
        let ledger = RefreshLedger::default();
        ledger.consume("old", 150, 100);
        ledger.consume("new", 500, 100);
        ledger.prune(200);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.consume("old", 150, 200));
    }

    #[test]
    fn full_ledger_of_live_ids_is_not_rescanned_every_call() {
        let ledger = RefreshLedger::default();
        for i in 0..PRUNE_THRESHOLD {
            assert!(ledger.consume(&format!("live-{i}"), 1_000, 100));
        }
        assert_eq!(ledger.next_prune_at(), PRUNE_THRESHOLD);

        // Crossing the threshold prunes once and pushes the next prune out.
        assert!(ledger.consume("one-more", 1_000, 100));
        assert_eq!(ledger.next_prune_at(), PRUNE_THRESHOLD * 2);
        assert_eq!(ledger.len(), PRUNE_THRESHOLD + 1);

        // An expired id stays put until the map has doubled.
        ledger.consumed.insert("stale".to_string(), 50);
        assert!(ledger.consume("after", 1_000, 100));
        assert!(ledger.consumed.contains_key("stale"));
    }

    #[test]
    fn automatic_prune_drops_expired_ids_and_resets_threshold() {
        let ledger = RefreshLedger::default();
        for i in 0..PRUNE_THRESHOLD {
            ledger.consume(&format!("old-{i}"), 150, 100);
        }
        assert!(ledger.consume("fresh", 500, 200));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.next_prune_at(), PRUNE_THRESHOLD);
    }
}
