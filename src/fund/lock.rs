//! Lock scheduler: when deposits start carrying voting power.

use super::clock::Timestamp;
use super::ledger::{DepositLedger, Depositor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockScheduler {
    lock_duration: Timestamp,
}

impl LockScheduler {
    pub fn new(lock_duration: Timestamp) -> Self {
        Self { lock_duration }
    }

    pub fn lock_duration(&self) -> Timestamp {
        self.lock_duration
    }

    /// True once `lock_duration` has elapsed since the first deposit.
    pub fn is_eligible(&self, depositor: &Depositor, now: Timestamp) -> bool {
        now.saturating_sub(depositor.first_deposit_at) >= self.lock_duration
    }

    /// Time at which the depositor becomes eligible.
    pub fn eligible_at(&self, depositor: &Depositor) -> Timestamp {
        depositor.first_deposit_at.saturating_add(self.lock_duration)
    }

    /// Cumulative deposit if eligible, otherwise 0.
    pub fn voting_power(&self, depositor: &Depositor, now: Timestamp) -> u64 {
        if self.is_eligible(depositor, now) {
            depositor.cumulative_amount
        } else {
            0
        }
    }

    /// Sum of voting power across all depositors at `now`.
    ///
    /// Bounded by the pool's total deposited, which the ledger keeps within u64.
    pub fn total_eligible_power(&self, ledger: &DepositLedger, now: Timestamp) -> u64 {
        ledger
            .depositors()
            .map(|d| self.voting_power(d, now))
            .fold(0u64, u64::saturating_add)
    }
}
