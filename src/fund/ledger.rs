//! Deposit ledger and pool totals.
//!
//! Depositor records are never removed. The pool keeps two monotonic
//! counters; the balance is always derived from them.

use super::clock::Timestamp;
use super::error::{FundError, FundResult};
use super::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single depositor's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depositor {
    pub identity: Identity,
    /// Sum of all deposits. Never decreases.
    pub cumulative_amount: u64,
    /// Time of the first deposit. Never changes once set.
    pub first_deposit_at: Timestamp,
    /// Milestone ids this depositor has voted on.
    pub voted_milestones: BTreeSet<u64>,
    /// Principal returned through emergency recovery.
    #[serde(default)]
    pub recovered_amount: u64,
}

impl Depositor {
    pub fn has_voted_on(&self, milestone_id: u64) -> bool {
        self.voted_milestones.contains(&milestone_id)
    }
}

/// Aggregate pool accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub total_deposited: u64,
    pub total_released: u64,
}

impl Pool {
    /// Funds deposited and not yet released.
    ///
    /// Saturates instead of wrapping; the release executor treats any
    /// released > deposited state as a fault before it can be stored.
    pub fn balance(&self) -> u64 {
        self.total_deposited.saturating_sub(self.total_released)
    }
}

/// Depositor records plus pool totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositLedger {
    depositors: BTreeMap<Identity, Depositor>,
    pool: Pool,
}

impl DepositLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deposit.
    ///
    /// Creates the depositor on first contribution, stamping `now` as the
    /// first-deposit time. Later deposits only grow the cumulative amount.
    pub fn deposit(
        &mut self,
        identity: &Identity,
        amount: u64,
        now: Timestamp,
        min_deposit: u64,
    ) -> FundResult<&Depositor> {
        if amount == 0 {
            return Err(FundError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }
        if amount < min_deposit {
            return Err(FundError::InvalidAmount(format!(
                "deposit of {} is below the minimum of {}",
                amount, min_deposit
            )));
        }

        let current = self
            .depositors
            .get(identity)
            .map(|d| d.cumulative_amount)
            .unwrap_or(0);
        let new_cumulative = current.checked_add(amount).ok_or_else(|| {
            FundError::InvalidAmount("deposit overflows depositor total".to_string())
        })?;
        let new_total = self.pool.total_deposited.checked_add(amount).ok_or_else(|| {
            FundError::InvalidAmount("deposit overflows pool total".to_string())
        })?;

        self.pool.total_deposited = new_total;
        let depositor = self
            .depositors
            .entry(identity.clone())
            .or_insert_with(|| Depositor {
                identity: identity.clone(),
                cumulative_amount: 0,
                first_deposit_at: now,
                voted_milestones: BTreeSet::new(),
                recovered_amount: 0,
            });
        depositor.cumulative_amount = new_cumulative;
        Ok(depositor)
    }

    pub fn get(&self, identity: &Identity) -> Option<&Depositor> {
        self.depositors.get(identity)
    }

    pub(crate) fn get_mut(&mut self, identity: &Identity) -> Option<&mut Depositor> {
        self.depositors.get_mut(identity)
    }

    /// All depositors in identity order.
    pub fn depositors(&self) -> impl Iterator<Item = &Depositor> {
        self.depositors.values()
    }

    pub fn len(&self) -> usize {
        self.depositors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depositors.is_empty()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub(crate) fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    /// Sum of cumulative amounts, recomputed from the records.
    pub fn sum_of_deposits(&self) -> u128 {
        self.depositors
            .values()
            .map(|d| d.cumulative_amount as u128)
            .sum()
    }
}
