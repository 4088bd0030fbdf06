//! Per-chat warning counters with an auto-escalation threshold.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarnOutcome {
    pub count: u32,
    /// True exactly when this warning made the count reach the threshold.
    /// Later warnings past the threshold do not re-escalate.
    pub escalated: bool,
}

/// Counters are keyed by (chat, user): a user warned in one chat starts clean
/// in another. The count is NOT reset on escalation, so a user who is
/// unbanned and returns still sits at the threshold until `clear` is called.
#[derive(Debug, Clone)]
pub struct WarningLedger {
    counts: HashMap<(i64, i64), u32>,
    threshold: u32,
}

impl WarningLedger {
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: HashMap::new(),
            threshold,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn warn(&mut self, chat_id: i64, user_id: i64) -> WarnOutcome {
        let count = self.counts.entry((chat_id, user_id)).or_insert(0);
        *count += 1;
        WarnOutcome {
            count: *count,
            escalated: *count == self.threshold,
        }
    }

    /// Removes the entry entirely; the next `warn` starts from 1 again.
    /// Idempotent on missing entries.
    pub fn clear(&mut self, chat_id: i64, user_id: i64) {
        self.counts.remove(&(chat_id, user_id));
    }

    pub fn count(&self, chat_id: i64, user_id: i64) -> u32 {
        self.counts.get(&(chat_id, user_id)).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_increase_by_one_per_warn() {
        let mut ledger = WarningLedger::new(3);
        for expected in 1..=5 {
            let outcome = ledger.warn(10, 20);
            assert_eq!(outcome.count, expected);
        }
    }

    #[test]
    fn escalation_fires_exactly_at_the_threshold() {
        let mut ledger = WarningLedger::new(3);
        assert!(!ledger.warn(10, 20).escalated);
        assert!(!ledger.warn(10, 20).escalated);
        assert!(ledger.warn(10, 20).escalated);
        // Past the threshold the signal stays quiet.
        assert!(!ledger.warn(10, 20).escalated);
    }

    #[test]
    fn clear_resets_the_next_count_to_one() {
        let mut ledger = WarningLedger::new(3);
        ledger.warn(10, 20);
        ledger.warn(10, 20);
        ledger.clear(10, 20);
        let outcome = ledger.warn(10, 20);
        assert_eq!(outcome.count, 1);
        assert!(!outcome.escalated);
    }

    #[test]
    fn clear_is_idempotent_on_missing_entries() {
        let mut ledger = WarningLedger::new(3);
        ledger.clear(10, 20);
        ledger.clear(10, 20);
        assert_eq!(ledger.count(10, 20), 0);
    }

    #[test]
    fn warnings_are_scoped_per_chat() {
        let mut ledger = WarningLedger::new(3);
        ledger.warn(10, 20);
        ledger.warn(10, 20);
        assert_eq!(ledger.count(10, 20), 2);
        assert_eq!(ledger.count(11, 20), 0);
        let outcome = ledger.warn(11, 20);
        assert_eq!(outcome.count, 1);
    }

    #[test]
    fn clear_then_rewarn_escalates_again_at_threshold() {
        let mut ledger = WarningLedger::new(2);
        ledger.warn(1, 2);
        assert!(ledger.warn(1, 2).escalated);
        ledger.clear(1, 2);
        ledger.warn(1, 2);
        assert!(ledger.warn(1, 2).escalated);
    }
}
