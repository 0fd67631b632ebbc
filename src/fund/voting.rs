//! Voting engine: stake-weighted votes on the Active milestone.
//!
//! Each eligible depositor votes at most once per milestone with the voting
//! power they hold at the time of the vote. After every vote the decision
//! rule is evaluated against the eligible power at that moment, which can
//! grow between votes as lock windows elapse.
//!
//! ## Decision rule
//!
//! With `E` the total eligible power, `T` the threshold and `Q` the quorum:
//!
//! - pass as soon as `approval >= T * E`
//! - fail as soon as `E - rejection < T * E` (approval can no longer reach T)
//! - otherwise, once `approval + rejection >= Q * E`, fail
//! - otherwise undecided

use super::clock::Timestamp;
use super::config::Fraction;
use super::error::{FundError, FundResult};
use super::identity::Identity;
use super::ledger::DepositLedger;
use super::lock::LockScheduler;
use super::milestone::MilestoneTracker;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of evaluating a milestone's tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteDecision {
    Undecided,
    Passed,
    Failed,
}

/// Threshold and quorum evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionRule {
    pub threshold: Fraction,
    pub quorum: Fraction,
}

impl DecisionRule {
    pub fn new(threshold: Fraction, quorum: Fraction) -> Self {
        Self { threshold, quorum }
    }

    pub fn evaluate(&self, approval: u64, rejection: u64, eligible_power: u64) -> VoteDecision {
        if eligible_power == 0 {
            return VoteDecision::Undecided;
        }
        if self.threshold.is_met_by(approval, eligible_power) {
            return VoteDecision::Passed;
        }
        let best_case_approval = eligible_power.saturating_sub(rejection);
        if !self.threshold.is_met_by(best_case_approval, eligible_power) {
            return VoteDecision::Failed;
        }
        if self
            .quorum
            .is_met_by(approval.saturating_add(rejection), eligible_power)
        {
            return VoteDecision::Failed;
        }
        VoteDecision::Undecided
    }
}

/// Result of a recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub milestone: u64,
    pub approve: bool,
    /// Voting power added to the tally.
    pub power: u64,
    pub approval_stake: u64,
    pub rejection_stake: u64,
    /// Eligible power the decision was evaluated against.
    pub eligible_power: u64,
    pub decision: VoteDecision,
}

#[derive(Debug, Clone, Copy)]
pub struct VotingEngine {
    lock: LockScheduler,
    rule: DecisionRule,
}

impl VotingEngine {
    pub fn new(lock: LockScheduler, rule: DecisionRule) -> Self {
        Self { lock, rule }
    }

    /// Record a vote and evaluate the decision rule.
    ///
    /// Validation happens before any mutation: a rejected vote leaves the
    /// ledger and tracker untouched. Applying the decision (status change
    /// and release) is left to the caller so it can happen in the same
    /// transaction as the vote.
    pub fn cast(
        &self,
        ledger: &mut DepositLedger,
        tracker: &mut MilestoneTracker,
        identity: &Identity,
        milestone_id: u64,
        approve: bool,
        now: Timestamp,
    ) -> FundResult<VoteReceipt> {
        let depositor = ledger.get(identity).ok_or_else(|| {
            FundError::NotEligible(format!("{} has not deposited", identity.fingerprint()))
        })?;
        if !self.lock.is_eligible(depositor, now) {
            return Err(FundError::NotEligible(format!(
                "{} is locked until {}",
                identity.fingerprint(),
                self.lock.eligible_at(depositor)
            )));
        }
        let power = self.lock.voting_power(depositor, now);

        let active_id = tracker.active().map(|m| m.id);
        if active_id != Some(milestone_id) {
            return Err(FundError::NoActiveMilestone(match active_id {
                Some(active) => format!(
                    "milestone {} is not active (active is {})",
                    milestone_id, active
                ),
                None => format!("milestone {} is not active", milestone_id),
            }));
        }
        if depositor.has_voted_on(milestone_id) {
            return Err(FundError::DuplicateVote(format!(
                "{} already voted on milestone {}",
                identity.fingerprint(),
                milestone_id
            )));
        }

        let eligible_power = self.lock.total_eligible_power(ledger, now);

        let milestone = tracker.active_mut().ok_or_else(|| {
            FundError::InternalConsistencyFault("active milestone disappeared".to_string())
        })?;
        let (approval, rejection) = if approve {
            (
                milestone.approval_stake.checked_add(power),
                Some(milestone.rejection_stake),
            )
        } else {
            (
                Some(milestone.approval_stake),
                milestone.rejection_stake.checked_add(power),
            )
        };
        let (approval, rejection) = match (approval, rejection) {
            (Some(a), Some(r)) => (a, r),
            _ => {
                return Err(FundError::InternalConsistencyFault(format!(
                    "tally overflow on milestone {}",
                    milestone_id
                )))
            }
        };
        milestone.approval_stake = approval;
        milestone.rejection_stake = rejection;

        if let Some(depositor) = ledger.get_mut(identity) {
            depositor.voted_milestones.insert(milestone_id);
        }

        let decision = self.rule.evaluate(approval, rejection, eligible_power);
        debug!(
            milestone = milestone_id,
            voter = %identity.fingerprint(),
            approve,
            power,
            approval,
            rejection,
            eligible_power,
            ?decision,
            "vote recorded"
        );

        Ok(VoteReceipt {
            milestone: milestone_id,
            approve,
            power,
            approval_stake: approval,
            rejection_stake: rejection,
            eligible_power,
            decision,
        })
    }
}
