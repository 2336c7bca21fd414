//! Run statistics: named monotone counters.
//!
//! The ledger owns the driver-level counters (steps, rejections, events,
//! indicator evaluations) and merges backend-owned counters (right-hand-side
//! and Jacobian evaluations) by delta, so it can be queried at any point of
//! a run without double counting.

use indexmap::IndexMap;

use crate::backend::BackendCounters;

/// Counter name: internal step advances that produced a (possibly
/// event-truncated) step.
pub const STEPS: &str = "steps";
/// Counter name: rejected step attempts.
pub const REJECTED_STEPS: &str = "rejected_steps";
/// Counter name: right-hand-side evaluations (backend-owned).
pub const RHS_EVALS: &str = "rhs_evals";
/// Counter name: Jacobian evaluations (backend-owned).
pub const JAC_EVALS: &str = "jac_evals";
/// Counter name: detected state events.
pub const EVENTS: &str = "events";
/// Counter name: event-indicator vector evaluations.
pub const INDICATOR_EVALS: &str = "indicator_evals";

/// Named-counter accumulator for one run.
///
/// Counters are monotone non-decreasing between `reset` calls and appear in
/// snapshots in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct StatisticsLedger {
    counters: IndexMap<&'static str, u64>,
    last_backend: BackendCounters,
}

impl StatisticsLedger {
    /// Create a ledger with all counters at zero.
    pub fn new() -> Self {
        let mut ledger = Self {
            counters: IndexMap::new(),
            last_backend: BackendCounters::default(),
        };
        ledger.reset();
        ledger
    }

    /// Zero every counter. Called once at run start.
    pub fn reset(&mut self) {
        self.counters.clear();
        for name in [
            STEPS,
            REJECTED_STEPS,
            RHS_EVALS,
            JAC_EVALS,
            EVENTS,
            INDICATOR_EVALS,
        ] {
            self.counters.insert(name, 0);
        }
        self.last_backend = BackendCounters::default();
    }

    /// Add `amount` to the named counter.
    pub fn increment(&mut self, name: &'static str, amount: u64) {
        *self.counters.entry(name).or_insert(0) += amount;
    }

    /// Fold in a backend counter snapshot.
    ///
    /// Backend counters are cumulative since `initialize`; only the delta
    /// against the previously merged snapshot is added, so merging after
    /// every call is safe.
    pub fn merge_backend(&mut self, counters: BackendCounters) {
        self.increment(RHS_EVALS, counters.rhs_evals - self.last_backend.rhs_evals);
        self.increment(JAC_EVALS, counters.jac_evals - self.last_backend.jac_evals);
        self.last_backend = counters;
    }

    /// Current value of a named counter (zero if never incremented).
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Copy of all counters in insertion order.
    pub fn snapshot(&self) -> IndexMap<&'static str, u64> {
        self.counters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_all_counters() {
        let mut ledger = StatisticsLedger::new();
        ledger.increment(STEPS, 3);
        ledger.increment(EVENTS, 1);
        ledger.reset();
        for (_, v) in ledger.snapshot() {
            assert_eq!(v, 0);
        }
    }

    #[test]
    fn backend_merge_is_delta_based() {
        let mut ledger = StatisticsLedger::new();
        ledger.merge_backend(BackendCounters {
            rhs_evals: 14,
            jac_evals: 0,
        });
        // Merging the same snapshot again must not double count.
        ledger.merge_backend(BackendCounters {
            rhs_evals: 14,
            jac_evals: 0,
        });
        assert_eq!(ledger.get(RHS_EVALS), 14);

        ledger.merge_backend(BackendCounters {
            rhs_evals: 28,
            jac_evals: 2,
        });
        assert_eq!(ledger.get(RHS_EVALS), 28);
        assert_eq!(ledger.get(JAC_EVALS), 2);
    }

    #[test]
    fn snapshot_order_is_stable() {
        let ledger = StatisticsLedger::new();
        let names: Vec<_> = ledger.snapshot().keys().copied().collect();
        assert_eq!(
            names,
            vec![
                STEPS,
                REJECTED_STEPS,
                RHS_EVALS,
                JAC_EVALS,
                EVENTS,
                INDICATOR_EVALS
            ]
        );
    }
}
