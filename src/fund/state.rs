//! Fund state and operations.
//!
//! `FundState` is the single owned object holding every ledger, milestone and
//! declaration record. Each mutating operation runs as a transaction over a
//! working copy of the books: it either commits completely (tallies,
//! decisions, releases, events) or leaves the state exactly as it was.
//!
//! An `InternalConsistencyFault` from any operation halts the fund: every
//! later mutating call fails with `Halted` until `acknowledge_fault` passes
//! an invariant audit. Queries keep working while halted.

use super::audit::{EventKind, FundEvent};
use super::clock::Timestamp;
use super::config::FundConfig;
use super::emergency::{EmergencyArbiter, EmergencyPolicy, EmergencyReceipt, EmergencyStatus};
use super::error::{FundError, FundResult};
use super::identity::Identity;
use super::ledger::{DepositLedger, Depositor, Pool};
use super::lock::LockScheduler;
use super::milestone::{Milestone, MilestoneStatus, MilestoneTracker};
use super::release::{execute_release, Payout, ReleaseOrder, ReleaseSource};
use super::voting::{DecisionRule, VoteDecision, VoteReceipt, VotingEngine};
use crate::serialization::{from_cbor, to_cbor, SerializationError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const SCHEMA_VERSION: u64 = 1;

/// Mutable records that a transaction works on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Books {
    ledger: DepositLedger,
    milestones: MilestoneTracker,
    emergency: EmergencyArbiter,
}

/// Append-only output staged by a transaction.
#[derive(Debug, Default)]
struct Journal {
    events: Vec<FundEvent>,
    payouts: Vec<Payout>,
}

impl Journal {
    fn event(&mut self, now: Timestamp, actor: &Identity, kind: EventKind, details: String) {
        self.events.push(FundEvent::new(now, actor, kind, details));
    }
}

/// Result of a successful deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub cumulative_amount: u64,
    pub pool_balance: u64,
}

/// Result of a successful vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub receipt: VoteReceipt,
    /// Non-empty when the vote passed the milestone.
    pub payouts: Vec<Payout>,
}

/// Result of a successful declare or sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyOutcome {
    pub receipt: EmergencyReceipt,
    /// Non-empty when the call approved the recovery.
    pub payouts: Vec<Payout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundState {
    config: FundConfig,
    books: Books,
    payouts: Vec<Payout>,
    events: Vec<FundEvent>,
    /// Set by an internal-consistency fault.
    fault: Option<String>,
    schema_version: u64,
}

impl FundState {
    /// Initialize an empty fund.
    pub fn new(config: FundConfig) -> FundResult<Self> {
        config.validate()?;
        info!(
            proposer = %config.proposer.fingerprint(),
            lock_duration = config.lock_duration,
            threshold = %config.threshold_fraction,
            quorum = %config.quorum_fraction,
            emergency_threshold = %config.emergency_threshold_fraction,
            "fund initialized"
        );
        Ok(Self {
            config,
            books: Books::default(),
            payouts: Vec::new(),
            events: Vec::new(),
            fault: None,
            schema_version: SCHEMA_VERSION,
        })
    }

    fn lock(&self) -> LockScheduler {
        LockScheduler::new(self.config.lock_duration)
    }

    fn run<T>(
        &mut self,
        op: &'static str,
        apply: impl FnOnce(&FundConfig, &mut Books, &mut Journal) -> FundResult<T>,
    ) -> FundResult<T> {
        if let Some(reason) = &self.fault {
            warn!(op, "rejected: fund halted");
            return Err(FundError::Halted(format!(
                "{} refused until the fault is audited: {}",
                op, reason
            )));
        }

        let mut books = self.books.clone();
        let mut journal = Journal::default();
        match apply(&self.config, &mut books, &mut journal) {
            Ok(value) => {
                self.books = books;
                self.events.append(&mut journal.events);
                self.payouts.append(&mut journal.payouts);
                Ok(value)
            }
            Err(err) if err.is_fatal() => {
                error!(op, reason = %err.reason(), "internal consistency fault, halting fund");
                self.fault = Some(err.reason().to_string());
                Err(err)
            }
            Err(err) => {
                warn!(op, kind = %err.kind(), reason = %err.reason(), "call rejected");
                Err(err)
            }
        }
    }

    /// Add `amount` to the caller's deposit.
    pub fn deposit(
        &mut self,
        identity: &Identity,
        amount: u64,
        now: Timestamp,
    ) -> FundResult<DepositReceipt> {
        self.run("deposit", |config, books, journal| {
            ensure_open(books)?;
            let cumulative_amount = books
                .ledger
                .deposit(identity, amount, now, config.min_deposit)?
                .cumulative_amount;
            let pool_balance = books.ledger.pool().balance();
            info!(
                depositor = %identity.fingerprint(),
                amount,
                cumulative_amount,
                pool_balance,
                "deposit recorded"
            );
            journal.event(
                now,
                identity,
                EventKind::Deposit,
                format!("deposited {} (total {})", amount, cumulative_amount),
            );
            Ok(DepositReceipt {
                cumulative_amount,
                pool_balance,
            })
        })
    }

    /// Create and activate the next milestone. Proposer only.
    pub fn create_milestone(
        &mut self,
        caller: &Identity,
        amount: u64,
        recipient: Option<Identity>,
        now: Timestamp,
    ) -> FundResult<u64> {
        self.run("create_milestone", |config, books, journal| {
            ensure_open(books)?;
            let balance = books.ledger.pool().balance();
            let id = books.milestones.create(
                caller,
                &config.proposer,
                amount,
                recipient,
                balance,
                now,
            )?;
            journal.event(
                now,
                caller,
                EventKind::MilestoneCreated,
                format!("milestone {} requests {}", id, amount),
            );
            Ok(id)
        })
    }

    /// Vote on the Active milestone, deciding and releasing if the vote settles it.
    pub fn vote(
        &mut self,
        identity: &Identity,
        milestone: u64,
        approve: bool,
        now: Timestamp,
    ) -> FundResult<VoteOutcome> {
        self.run("vote", |config, books, journal| {
            ensure_open(books)?;
            let engine = VotingEngine::new(
                LockScheduler::new(config.lock_duration),
                DecisionRule::new(config.threshold_fraction, config.quorum_fraction),
            );
            let receipt = engine.cast(
                &mut books.ledger,
                &mut books.milestones,
                identity,
                milestone,
                approve,
                now,
            )?;
            journal.event(
                now,
                identity,
                EventKind::VoteCast,
                format!(
                    "{} milestone {} with {}",
                    if approve { "approved" } else { "rejected" },
                    milestone,
                    receipt.power
                ),
            );

            let payouts = match receipt.decision {
                VoteDecision::Undecided => Vec::new(),
                VoteDecision::Passed => release_milestone(books, journal, identity, milestone, now)?,
                VoteDecision::Failed => {
                    books
                        .milestones
                        .transition(milestone, MilestoneStatus::Failed, now)?;
                    info!(
                        milestone,
                        approval = receipt.approval_stake,
                        rejection = receipt.rejection_stake,
                        eligible = receipt.eligible_power,
                        "milestone failed; non-emergency disbursement halted"
                    );
                    journal.event(
                        now,
                        identity,
                        EventKind::MilestoneFailed,
                        format!(
                            "milestone {} failed ({} approve / {} reject of {})",
                            milestone,
                            receipt.approval_stake,
                            receipt.rejection_stake,
                            receipt.eligible_power
                        ),
                    );
                    Vec::new()
                }
            };
            Ok(VoteOutcome { receipt, payouts })
        })
    }

    /// Open an emergency declaration.
    pub fn declare_emergency(
        &mut self,
        identity: &Identity,
        now: Timestamp,
    ) -> FundResult<EmergencyOutcome> {
        self.run("declare_emergency", |config, books, journal| {
            ensure_open(books)?;
            let lock = LockScheduler::new(config.lock_duration);
            let power = books
                .ledger
                .get(identity)
                .map_or(0, |d| lock.voting_power(d, now));
            let eligible = lock.total_eligible_power(&books.ledger, now);
            let receipt =
                books
                    .emergency
                    .declare(&emergency_policy(config), identity, power, eligible, now)?;
            journal.event(
                now,
                identity,
                EventKind::EmergencyDeclared,
                format!("declaration {} opened with {}", receipt.declaration, power),
            );
            let payouts = recover_if_approved(books, journal, identity, &receipt, now)?;
            Ok(EmergencyOutcome { receipt, payouts })
        })
    }

    /// Sign the pending emergency declaration.
    pub fn sign_emergency(
        &mut self,
        identity: &Identity,
        now: Timestamp,
    ) -> FundResult<EmergencyOutcome> {
        self.run("sign_emergency", |config, books, journal| {
            ensure_open(books)?;
            let lock = LockScheduler::new(config.lock_duration);
            let power = books
                .ledger
                .get(identity)
                .map_or(0, |d| lock.voting_power(d, now));
            let eligible = lock.total_eligible_power(&books.ledger, now);
            let receipt =
                books
                    .emergency
                    .sign(&emergency_policy(config), identity, power, eligible, now)?;
            journal.event(
                now,
                identity,
                EventKind::EmergencySigned,
                format!(
                    "signed declaration {} with {} (total {})",
                    receipt.declaration, power, receipt.signer_stake
                ),
            );
            let payouts = recover_if_approved(books, journal, identity, &receipt, now)?;
            Ok(EmergencyOutcome { receipt, payouts })
        })
    }

    /// Clear a fault after a manual audit. Proposer only.
    ///
    /// Fails with `InternalConsistencyFault` (and stays halted) if the pool
    /// invariants still do not hold.
    pub fn acknowledge_fault(&mut self, auditor: &Identity, now: Timestamp) -> FundResult<()> {
        let Some(reason) = self.fault.clone() else {
            return Ok(());
        };
        if auditor != &self.config.proposer {
            return Err(FundError::Unauthorized(format!(
                "only the proposer may acknowledge faults (caller {})",
                auditor.fingerprint()
            )));
        }
        self.check_invariants()?;
        info!(auditor = %auditor.fingerprint(), %reason, "fault acknowledged, fund resumed");
        self.events.push(FundEvent::new(
            now,
            auditor,
            EventKind::FaultAcknowledged,
            reason,
        ));
        self.fault = None;
        Ok(())
    }

    /// Recompute the pool invariants from the records.
    pub fn check_invariants(&self) -> FundResult<()> {
        let pool = self.books.ledger.pool();
        let sum = self.books.ledger.sum_of_deposits();
        if sum != pool.total_deposited as u128 {
            return Err(FundError::InternalConsistencyFault(format!(
                "total deposited {} != sum of depositor amounts {}",
                pool.total_deposited, sum
            )));
        }
        if pool.total_released > pool.total_deposited {
            return Err(FundError::InternalConsistencyFault(format!(
                "released {} exceeds deposited {}",
                pool.total_released, pool.total_deposited
            )));
        }
        let paid: u128 = self.payouts.iter().map(|p| p.amount as u128).sum();
        if paid != pool.total_released as u128 {
            return Err(FundError::InternalConsistencyFault(format!(
                "total released {} != sum of payouts {}",
                pool.total_released, paid
            )));
        }
        let released_milestones: u128 = self
            .books
            .milestones
            .all()
            .iter()
            .filter(|m| m.status == MilestoneStatus::Released)
            .map(|m| m.amount as u128)
            .sum();
        let milestone_payouts: u128 = self
            .payouts
            .iter()
            .filter(|p| matches!(p.source, ReleaseSource::Milestone(_)))
            .map(|p| p.amount as u128)
            .sum();
        if released_milestones != milestone_payouts {
            return Err(FundError::InternalConsistencyFault(format!(
                "released milestones total {} but milestone payouts total {}",
                released_milestones, milestone_payouts
            )));
        }
        let active = self
            .books
            .milestones
            .all()
            .iter()
            .filter(|m| m.status == MilestoneStatus::Active)
            .count();
        if active > 1 {
            return Err(FundError::InternalConsistencyFault(format!(
                "{} milestones active at once",
                active
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn config(&self) -> &FundConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool {
        self.books.ledger.pool()
    }

    pub fn pool_balance(&self) -> u64 {
        self.pool().balance()
    }

    pub fn milestone_status(&self, id: u64) -> Option<MilestoneStatus> {
        self.books.milestones.get(id).map(|m| m.status)
    }

    pub fn milestone(&self, id: u64) -> Option<&Milestone> {
        self.books.milestones.get(id)
    }

    pub fn milestones(&self) -> &[Milestone] {
        self.books.milestones.all()
    }

    pub fn active_milestone(&self) -> Option<&Milestone> {
        self.books.milestones.active()
    }

    pub fn voting_power(&self, identity: &Identity, now: Timestamp) -> u64 {
        let lock = self.lock();
        self.books
            .ledger
            .get(identity)
            .map_or(0, |d| lock.voting_power(d, now))
    }

    pub fn total_eligible_power(&self, now: Timestamp) -> u64 {
        self.lock().total_eligible_power(&self.books.ledger, now)
    }

    pub fn emergency_status(&self, now: Timestamp) -> EmergencyStatus {
        self.books
            .emergency
            .status(&emergency_policy(&self.config), now)
    }

    pub fn emergency(&self) -> &EmergencyArbiter {
        &self.books.emergency
    }

    pub fn depositor(&self, identity: &Identity) -> Option<&Depositor> {
        self.books.ledger.get(identity)
    }

    pub fn depositors(&self) -> impl Iterator<Item = &Depositor> {
        self.books.ledger.depositors()
    }

    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    pub fn events(&self) -> &[FundEvent] {
        &self.events
    }

    /// Time of the latest successful call, or 0 for a new fund.
    pub fn last_activity(&self) -> Timestamp {
        self.events.iter().map(|e| e.timestamp).max().unwrap_or(0)
    }

    /// True after an approved emergency recovery.
    pub fn is_closed(&self) -> bool {
        self.books.emergency.is_approved()
    }

    /// True once a milestone vote has failed.
    pub fn is_stalled(&self) -> bool {
        self.books.milestones.is_stalled()
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_cbor(self)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        from_cbor(bytes)
    }

    /// Run a closure against the books directly, outside a transaction.
    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&mut self, f: impl FnOnce(&mut DepositLedger)) {
        f(&mut self.books.ledger);
    }
}

fn emergency_policy(config: &FundConfig) -> EmergencyPolicy {
    EmergencyPolicy {
        threshold: config.emergency_threshold_fraction,
        expiry_window: config.emergency_expiry_window,
        min_stake: config.min_emergency_stake,
    }
}

fn ensure_open(books: &Books) -> FundResult<()> {
    if books.emergency.is_approved() {
        return Err(FundError::FundClosed(
            "emergency recovery returned the pool to depositors".to_string(),
        ));
    }
    Ok(())
}

/// Passed and Released in one step: no gap between decision and payout.
fn release_milestone(
    books: &mut Books,
    journal: &mut Journal,
    actor: &Identity,
    milestone: u64,
    now: Timestamp,
) -> FundResult<Vec<Payout>> {
    books
        .milestones
        .transition(milestone, MilestoneStatus::Passed, now)?;
    let (recipient, amount) = books
        .milestones
        .get(milestone)
        .map(|m| (m.recipient.clone(), m.amount))
        .ok_or_else(|| {
            FundError::InternalConsistencyFault(format!("milestone {} vanished", milestone))
        })?;
    let payouts = execute_release(
        &mut books.ledger,
        &ReleaseOrder::Milestone {
            milestone,
            recipient: recipient.clone(),
            amount,
        },
        now,
    )?;
    books
        .milestones
        .transition(milestone, MilestoneStatus::Released, now)?;

    info!(milestone, amount, recipient = %recipient.fingerprint(), "milestone passed and released");
    journal.event(
        now,
        actor,
        EventKind::MilestonePassed,
        format!("milestone {} passed", milestone),
    );
    journal.event(
        now,
        &recipient,
        EventKind::FundsReleased,
        format!("released {} for milestone {}", amount, milestone),
    );
    journal.payouts.extend(payouts.iter().cloned());
    Ok(payouts)
}

/// Freeze milestone flow and return the pool if the declaration was approved.
fn recover_if_approved(
    books: &mut Books,
    journal: &mut Journal,
    actor: &Identity,
    receipt: &EmergencyReceipt,
    now: Timestamp,
) -> FundResult<Vec<Payout>> {
    if receipt.status != EmergencyStatus::Approved {
        return Ok(Vec::new());
    }

    if let Some(active) = books.milestones.active().map(|m| m.id) {
        books
            .milestones
            .transition(active, MilestoneStatus::Failed, now)?;
        journal.event(
            now,
            actor,
            EventKind::MilestoneFailed,
            format!("milestone {} frozen by emergency recovery", active),
        );
    }

    let payouts = execute_release(
        &mut books.ledger,
        &ReleaseOrder::Recovery {
            declaration: receipt.declaration,
        },
        now,
    )?;
    let recovered: u64 = payouts.iter().map(|p| p.amount).sum();
    journal.event(
        now,
        actor,
        EventKind::EmergencyApproved,
        format!(
            "declaration {} approved with {} of {}",
            receipt.declaration, receipt.signer_stake, receipt.eligible_power
        ),
    );
    journal.event(
        now,
        actor,
        EventKind::FundsRecovered,
        format!("returned {} to {} depositors", recovered, payouts.len()),
    );
    journal.payouts.extend(payouts.iter().cloned());
    Ok(payouts)
}
