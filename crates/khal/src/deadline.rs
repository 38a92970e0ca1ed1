//! Deadlines for blocking terminal reads.
//!
//! Serial reads poll the channel. Every time a poll comes back empty the
//! reader asks its deadline whether to keep waiting.

/// Decides when a blocking read gives up.
pub trait Deadline {
    /// Called after each empty poll. Returning `true` abandons the read.
    fn expired(&mut self) -> bool;
}

/// Never expires: the read blocks until data arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forever;

impl Deadline for Forever {
    fn expired(&mut self) -> bool {
        false
    }
}

/// Expires after a fixed number of empty polls.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    remaining: u64,
}

impl PollBudget {
    pub const fn new(polls: u64) -> Self {
        Self { remaining: polls }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Deadline for PollBudget {
    fn expired(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                false
            }
            None => true,
        }
    }
}

impl<F: FnMut() -> bool> Deadline for F {
    fn expired(&mut self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_exactly_n_idle_polls() {
        let mut budget = PollBudget::new(2);
        assert!(!budget.expired());
        assert!(!budget.expired());
        assert!(budget.expired());
        assert!(budget.expired());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn closures_act_as_deadlines() {
        let mut ticks = 0;
        let mut deadline = || {
            ticks += 1;
            ticks > 3
        };
        let expired = (0..5).filter(|_| Deadline::expired(&mut deadline)).count();
        assert_eq!(expired, 2);
    }
}
