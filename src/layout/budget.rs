use std::time::{Duration, Instant};

/// Wall-clock deadline plus iteration cap for one iterative stage.
///
/// Running out is not an error: the stage keeps its best state so far and
/// reports the timeout in the pass statistics.
#[derive(Debug, Clone)]
pub(crate) struct Budget {
    deadline: Instant,
    max_iterations: usize,
    used: usize,
    timed_out: bool,
}

impl Budget {
    pub(crate) fn new(millis: u64, max_iterations: usize) -> Self {
        Self {
            deadline: Instant::now() + Duration::from_millis(millis),
            max_iterations,
            used: 0,
            timed_out: false,
        }
    }

    /// Claim one more iteration. Returns `false` once the cap or the deadline
    /// is reached.
    pub(crate) fn next_iteration(&mut self) -> bool {
        if self.used >= self.max_iterations || self.expired() {
            return false;
        }
        self.used += 1;
        true
    }

    /// Deadline check for use inside an iteration.
    pub(crate) fn expired(&mut self) -> bool {
        if !self.timed_out && Instant::now() >= self.deadline {
            self.timed_out = true;
        }
        self.timed_out
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_cap_is_respected() {
        let mut budget = Budget::new(60_000, 3);
        let mut count = 0;
        while budget.next_iteration() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(budget.used(), 3);
        assert!(!budget.timed_out());
    }

    #[test]
    fn zero_time_budget_expires_immediately() {
        let mut budget = Budget::new(0, 100);
        assert!(!budget.next_iteration());
        assert!(budget.timed_out());
    }
}
