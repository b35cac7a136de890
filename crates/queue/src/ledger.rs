//! Process-wide record of generation ids already claimed for upload.
//!
//! The ledger is the sole cross-sweep ordering guarantee: a slow sweep
//! overlapping a fast one cannot double-upload an artifact because each
//! generation id is claimed exactly once, synchronously, before any
//! asynchronous upload work is dispatched for it.

use std::collections::HashSet;
use std::sync::Mutex;

/// Set of claimed generation ids.
///
/// Claims are permanent for the process lifetime; an id is never removed,
/// even when its upload subsequently fails. Constructed once at startup
/// and shared via `Arc` between the poller and the upload orchestrator.
#[derive(Default)]
pub struct UploadLedger {
    claimed: Mutex<HashSet<String>>,
}

impl UploadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a generation id for upload.
    ///
    /// Returns `true` on the first call for a given id and `false` on
    /// every later call. The check-and-set happens under one lock
    /// acquisition, so concurrent callers for the same id observe exactly
    /// one `true`.
    pub fn claim(&self, generation_id: &str) -> bool {
        let mut claimed = self.claimed.lock().expect("ledger lock poisoned");
        claimed.insert(generation_id.to_string())
    }

    /// Whether an id has already been claimed.
    pub fn is_claimed(&self, generation_id: &str) -> bool {
        let claimed = self.claimed.lock().expect("ledger lock poisoned");
        claimed.contains(generation_id)
    }

    /// Number of claimed ids.
    pub fn len(&self) -> usize {
        self.claimed.lock().expect("ledger lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_claim_wins_later_claims_lose() {
        let ledger = UploadLedger::new();
        assert!(ledger.claim("gen_1"));
        assert!(!ledger.claim("gen_1"));
        assert!(!ledger.claim("gen_1"));
        assert!(ledger.claim("gen_2"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn claims_are_permanent() {
        let ledger = UploadLedger::new();
        ledger.claim("gen_1");
        assert!(ledger.is_claimed("gen_1"));
        // There is no removal API; a failed upload never frees the claim.
        assert!(!ledger.claim("gen_1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn exactly_one_winner_under_concurrent_claims() {
        let ledger = Arc::new(UploadLedger::new());

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move { ledger.claim("contested") })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
