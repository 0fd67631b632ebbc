//! Release executor.
//!
//! The only code path that moves funds out of the pool. Milestone passes
//! release a single amount to the milestone's recipient; approved emergency
//! recoveries return the whole balance to depositors pro rata by principal.
//!
//! The executor re-checks the pool arithmetic itself regardless of what the
//! caller already validated. Any mismatch is an `InternalConsistencyFault`.

use super::clock::Timestamp;
use super::error::{FundError, FundResult};
use super::identity::Identity;
use super::ledger::DepositLedger;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// What a payout was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseSource {
    Milestone(u64),
    /// Emergency recovery, by declaration id.
    Recovery(u64),
}

/// A single disbursement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub recipient: Identity,
    pub amount: u64,
    pub source: ReleaseSource,
    pub at: Timestamp,
}

/// A release request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOrder {
    /// Full milestone amount to one recipient.
    Milestone {
        milestone: u64,
        recipient: Identity,
        amount: u64,
    },
    /// Entire remaining balance to every depositor.
    Recovery { declaration: u64 },
}

/// Split `balance` across depositors in proportion to their cumulative deposit.
///
/// Shares are floored; the last depositor in identity order receives the
/// rounding remainder, so the shares always sum to exactly `balance`.
pub fn pro_rata_shares(ledger: &DepositLedger, balance: u64) -> FundResult<Vec<(Identity, u64)>> {
    let total = ledger.pool().total_deposited;
    if total == 0 || ledger.is_empty() {
        if balance == 0 {
            return Ok(Vec::new());
        }
        return Err(FundError::InternalConsistencyFault(format!(
            "pool balance {} with no deposits to distribute against",
            balance
        )));
    }

    let count = ledger.len();
    let mut shares = Vec::with_capacity(count);
    let mut assigned: u64 = 0;
    for (index, depositor) in ledger.depositors().enumerate() {
        let share = if index + 1 == count {
            balance.checked_sub(assigned).ok_or_else(|| {
                FundError::InternalConsistencyFault(format!(
                    "pro-rata shares {} exceed balance {}",
                    assigned, balance
                ))
            })?
        } else {
            let exact = depositor.cumulative_amount as u128 * balance as u128 / total as u128;
            // exact <= balance because cumulative <= total
            exact as u64
        };
        assigned = assigned.saturating_add(share);
        shares.push((depositor.identity.clone(), share));
    }
    Ok(shares)
}

/// Execute a release against the pool.
///
/// Returns the payouts made. Zero-amount shares are not recorded.
pub fn execute_release(
    ledger: &mut DepositLedger,
    order: &ReleaseOrder,
    now: Timestamp,
) -> FundResult<Vec<Payout>> {
    let pool = ledger.pool().clone();
    if pool.total_released > pool.total_deposited {
        return fault(format!(
            "released {} exceeds deposited {}",
            pool.total_released, pool.total_deposited
        ));
    }
    let pre_balance = pool.balance();

    let payouts: Vec<Payout> = match order {
        ReleaseOrder::Milestone {
            milestone,
            recipient,
            amount,
        } => vec![Payout {
            recipient: recipient.clone(),
            amount: *amount,
            source: ReleaseSource::Milestone(*milestone),
            at: now,
        }],
        ReleaseOrder::Recovery { declaration } => pro_rata_shares(ledger, pre_balance)?
            .into_iter()
            .filter(|(_, amount)| *amount > 0)
            .map(|(recipient, amount)| Payout {
                recipient,
                amount,
                source: ReleaseSource::Recovery(*declaration),
                at: now,
            })
            .collect(),
    };

    let disbursed = payouts
        .iter()
        .try_fold(0u64, |acc, p| acc.checked_add(p.amount));
    let disbursed = match disbursed {
        Some(d) if d <= pre_balance => d,
        Some(d) => {
            return fault(format!(
                "release of {} exceeds pool balance {}",
                d, pre_balance
            ))
        }
        None => return fault("release total overflows".to_string()),
    };
    if let ReleaseOrder::Recovery { .. } = order {
        if disbursed != pre_balance {
            return fault(format!(
                "recovery disbursed {} of balance {}",
                disbursed, pre_balance
            ));
        }
    }

    let new_released = match pool.total_released.checked_add(disbursed) {
        Some(r) => r,
        None => return fault("total released overflows".to_string()),
    };
    ledger.pool_mut().total_released = new_released;

    let post_balance = ledger.pool().balance();
    if ledger.pool().total_released > ledger.pool().total_deposited
        || post_balance != pre_balance - disbursed
    {
        return fault(format!(
            "post-release balance {} != {} - {}",
            post_balance, pre_balance, disbursed
        ));
    }

    if let ReleaseOrder::Recovery { .. } = order {
        for payout in &payouts {
            if let Some(depositor) = ledger.get_mut(&payout.recipient) {
                depositor.recovered_amount = depositor.recovered_amount.saturating_add(payout.amount);
            }
        }
    }

    info!(
        ?order,
        disbursed,
        pre_balance,
        post_balance,
        payouts = payouts.len(),
        "funds released"
    );
    Ok(payouts)
}

fn fault<T>(reason: String) -> FundResult<T> {
    error!(%reason, "release invariant violated");
    Err(FundError::InternalConsistencyFault(reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(deposits: &[(&str, u64)]) -> DepositLedger {
        let mut ledger = DepositLedger::new();
        for (name, amount) in deposits {
            ledger.deposit(&Identity::new(*name), *amount, 0, 1).unwrap();
        }
        ledger
    }

    #[test]
    fn test_milestone_release_reduces_balance() {
        let mut ledger = ledger_with(&[("alice", 1_000), ("bob", 500)]);
        let payouts = execute_release(
            &mut ledger,
            &ReleaseOrder::Milestone {
                milestone: 0,
                recipient: Identity::new("builder"),
                amount: 300,
            },
            11,
        )
        .unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].source, ReleaseSource::Milestone(0));
        assert_eq!(ledger.pool().balance(), 1_200);
        assert_eq!(ledger.pool().total_released, 300);
    }

    #[test]
    fn test_overdraw_is_fault_and_pool_untouched() {
        let mut ledger = ledger_with(&[("alice", 100)]);
        let before = ledger.clone();
        let err = execute_release(
            &mut ledger,
            &ReleaseOrder::Milestone {
                milestone: 0,
                recipient: Identity::new("builder"),
                amount: 101,
            },
            1,
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_corrupt_pool_is_fault() {
        let mut ledger = ledger_with(&[("alice", 100)]);
        ledger.pool_mut().total_released = 150;
        let err = execute_release(
            &mut ledger,
            &ReleaseOrder::Milestone {
                milestone: 0,
                recipient: Identity::new("builder"),
                amount: 1,
            },
            1,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_pro_rata_remainder_goes_to_last() {
        let ledger = ledger_with(&[("a", 1), ("b", 1), ("c", 1)]);
        let shares = pro_rata_shares(&ledger, 100).unwrap();
        assert_eq!(
            shares,
            vec![
                (Identity::new("a"), 33),
                (Identity::new("b"), 33),
                (Identity::new("c"), 34),
            ]
        );
    }

    #[test]
    fn test_recovery_drains_pool_by_principal() {
        let mut ledger = ledger_with(&[("alice", 1_000), ("bob", 500)]);
        execute_release(
            &mut ledger,
            &ReleaseOrder::Milestone {
                milestone: 0,
                recipient: Identity::new("builder"),
                amount: 300,
            },
            11,
        )
        .unwrap();
        let payouts =
            execute_release(&mut ledger, &ReleaseOrder::Recovery { declaration: 0 }, 20).unwrap();
        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[0].amount, 800);
        assert_eq!(payouts[1].amount, 400);
        assert_eq!(ledger.pool().balance(), 0);
        assert_eq!(
            ledger.get(&Identity::new("bob")).unwrap().recovered_amount,
            400
        );
    }

    #[test]
    fn test_recovery_of_empty_pool_is_noop() {
        let mut ledger = DepositLedger::new();
        let payouts =
            execute_release(&mut ledger, &ReleaseOrder::Recovery { declaration: 0 }, 0).unwrap();
        assert!(payouts.is_empty());
    }
}
