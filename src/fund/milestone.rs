//! Milestone tracker.
//!
//! Milestones run strictly one after another:
//! - ids start at 0 and increase by one
//! - at most one milestone is Active
//! - a new milestone needs the previous one Released
//! - a Failed milestone is terminal and stalls the sequence for good;
//!   only emergency recovery can move funds after that

use super::clock::Timestamp;
use super::error::{FundError, FundResult};
use super::identity::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MilestoneStatus {
    /// Only exists while creation is being validated.
    Pending,
    Active,
    /// Vote passed; becomes Released in the same operation.
    Passed,
    Failed,
    Released,
}

impl MilestoneStatus {
    fn can_become(self, next: MilestoneStatus) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Passed) | (Active, Failed) | (Passed, Released)
        )
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: u64,
    /// Requested release amount.
    pub amount: u64,
    /// Receives the release when the milestone passes.
    pub recipient: Identity,
    pub status: MilestoneStatus,
    pub approval_stake: u64,
    pub rejection_stake: u64,
    pub created_at: Timestamp,
    pub decided_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneTracker {
    milestones: Vec<Milestone>,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the next milestone and make it Active.
    ///
    /// Returns the new milestone id.
    pub fn create(
        &mut self,
        caller: &Identity,
        proposer: &Identity,
        amount: u64,
        recipient: Option<Identity>,
        pool_balance: u64,
        now: Timestamp,
    ) -> FundResult<u64> {
        if caller != proposer {
            return Err(FundError::Unauthorized(format!(
                "only the proposer may create milestones (caller {})",
                caller.fingerprint()
            )));
        }
        if amount == 0 {
            return Err(FundError::InvalidAmount(
                "milestone amount must be positive".to_string(),
            ));
        }
        if let Some(last) = self.milestones.last() {
            match last.status {
                MilestoneStatus::Released => {}
                MilestoneStatus::Failed => {
                    return Err(FundError::SequenceViolation(format!(
                        "milestone {} failed; the fund is stalled",
                        last.id
                    )));
                }
                status => {
                    return Err(FundError::SequenceViolation(format!(
                        "milestone {} is still {}",
                        last.id, status
                    )));
                }
            }
        }
        if amount > pool_balance {
            return Err(FundError::InsufficientPool(format!(
                "milestone requests {} but the pool holds {}",
                amount, pool_balance
            )));
        }

        let id = self.milestones.len() as u64;
        let mut milestone = Milestone {
            id,
            amount,
            recipient: recipient.unwrap_or_else(|| proposer.clone()),
            status: MilestoneStatus::Pending,
            approval_stake: 0,
            rejection_stake: 0,
            created_at: now,
            decided_at: None,
        };
        milestone.status = MilestoneStatus::Active;
        info!(
            milestone = id,
            amount,
            recipient = %milestone.recipient.fingerprint(),
            "milestone activated"
        );
        self.milestones.push(milestone);
        Ok(id)
    }

    /// The Active milestone, if any.
    pub fn active(&self) -> Option<&Milestone> {
        self.milestones
            .last()
            .filter(|m| m.status == MilestoneStatus::Active)
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut Milestone> {
        self.milestones
            .last_mut()
            .filter(|m| m.status == MilestoneStatus::Active)
    }

    pub fn get(&self, id: u64) -> Option<&Milestone> {
        usize::try_from(id).ok().and_then(|i| self.milestones.get(i))
    }

    pub fn all(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }

    /// True once a milestone has failed.
    pub fn is_stalled(&self) -> bool {
        self.milestones
            .last()
            .is_some_and(|m| m.status == MilestoneStatus::Failed)
    }

    /// Move milestone `id` to `next`, enforcing the allowed transitions.
    ///
    /// An illegal transition is an internal bug, not a user error.
    pub(crate) fn transition(
        &mut self,
        id: u64,
        next: MilestoneStatus,
        now: Timestamp,
    ) -> FundResult<()> {
        let milestone = usize::try_from(id)
            .ok()
            .and_then(|i| self.milestones.get_mut(i))
            .ok_or_else(|| {
                FundError::InternalConsistencyFault(format!("milestone {} does not exist", id))
            })?;
        if !milestone.status.can_become(next) {
            return Err(FundError::InternalConsistencyFault(format!(
                "milestone {} cannot move from {} to {}",
                id, milestone.status, next
            )));
        }
        milestone.status = next;
        if matches!(next, MilestoneStatus::Passed | MilestoneStatus::Failed) {
            milestone.decided_at = Some(now);
        }
        Ok(())
    }
}
