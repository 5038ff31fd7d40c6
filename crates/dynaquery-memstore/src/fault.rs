//! Call accounting and scripted faults.
//!
//! Tests use these hooks to make the store misbehave the way a real one
//! does under load: failing a specific call, leaving part of a batch
//! unprocessed, or evaluating fewer items per read than asked.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;

use dynaquery_model::{StoreError, StoreErrorCode, StoreOperation};

#[derive(Debug)]
struct PlannedFailure {
    operation: StoreOperation,
    calls_left: usize,
    code: StoreErrorCode,
}

/// Counts calls per operation and fires scripted faults.
#[derive(Debug, Default)]
pub struct FaultPlan {
    calls: DashMap<StoreOperation, usize>,
    failures: Mutex<Vec<PlannedFailure>>,
    unprocessed: Mutex<HashMap<StoreOperation, usize>>,
    evaluation_ceiling: Mutex<Option<usize>>,
}

impl FaultPlan {
    /// Records one call of `operation` and fails it if a failure is due.
    ///
    /// # Errors
    ///
    /// Returns the scripted [`StoreError`] when this is the call it targets.
    pub fn record(&self, operation: StoreOperation) -> Result<(), StoreError> {
        *self.calls.entry(operation).or_default() += 1;

        let mut failures = self.failures.lock();
        let mut fired = None;
        for (i, failure) in failures.iter_mut().enumerate() {
            if failure.operation != operation {
                continue;
            }
            failure.calls_left = failure.calls_left.saturating_sub(1);
            if failure.calls_left == 0 && fired.is_none() {
                fired = Some(i);
            }
        }
        match fired {
            Some(i) => {
                let failure = failures.remove(i);
                Err(StoreError::with_message(
                    failure.code,
                    format!("injected failure on {operation}"),
                ))
            }
            None => Ok(()),
        }
    }

    /// Fails the `nth` next call of `operation` (1 is the very next call).
    pub fn fail_nth(&self, operation: StoreOperation, nth: usize, code: StoreErrorCode) {
        self.failures.lock().push(PlannedFailure {
            operation,
            calls_left: nth.max(1),
            code,
        });
    }

    /// Makes the next batch call of `operation` leave `count` entries
    /// unprocessed.
    pub fn leave_unprocessed(&self, operation: StoreOperation, count: usize) {
        self.unprocessed.lock().insert(operation, count);
    }

    /// Takes the pending unprocessed count for `operation`.
    pub fn take_unprocessed(&self, operation: StoreOperation) -> usize {
        self.unprocessed.lock().remove(&operation).unwrap_or(0)
    }

    /// Caps how many items a single read evaluates.
    pub fn set_evaluation_ceiling(&self, ceiling: Option<usize>) {
        *self.evaluation_ceiling.lock() = ceiling;
    }

    /// Combines a requested limit with the ceiling.
    #[must_use]
    pub fn effective_limit(&self, requested: Option<usize>) -> Option<usize> {
        match (requested, *self.evaluation_ceiling.lock()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Calls of `operation` so far, including failed ones.
    #[must_use]
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.calls.get(&operation).map_or(0, |count| *count)
    }
}
