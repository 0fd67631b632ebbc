//! Call dispatch.
//!
//! `FundContract` is what the authenticated-call layer talks to. It stamps
//! each call with the clock and routes it to the matching `FundState`
//! operation. Calls are expected one at a time, already ordered.

use super::clock::{Clock, Timestamp};
use super::config::FundConfig;
use super::emergency::EmergencyStatus;
use super::error::FundResult;
use super::identity::{AuthenticatedCall, CallPayload, Identity};
use super::milestone::MilestoneStatus;
use super::state::{DepositReceipt, EmergencyOutcome, FundState, VoteOutcome};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Success value of a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallOutcome {
    Deposited(DepositReceipt),
    MilestoneCreated { milestone: u64 },
    Voted(VoteOutcome),
    Emergency(EmergencyOutcome),
}

pub struct FundContract<C: Clock> {
    state: FundState,
    clock: C,
    last_seen: Timestamp,
}

impl<C: Clock> FundContract<C> {
    pub fn new(config: FundConfig, clock: C) -> FundResult<Self> {
        Ok(Self::from_state(FundState::new(config)?, clock))
    }

    /// Resume from an existing state (e.g. a decoded snapshot).
    ///
    /// Time is held at or after the state's latest recorded call.
    pub fn from_state(state: FundState, clock: C) -> Self {
        let last_seen = state.last_activity();
        Self {
            state,
            clock,
            last_seen,
        }
    }

    /// Current time, never earlier than any time already used.
    fn tick(&mut self) -> Timestamp {
        let reading = self.clock.now();
        if reading < self.last_seen {
            warn!(
                reading,
                last_seen = self.last_seen,
                "clock went backwards; holding last observed time"
            );
            return self.last_seen;
        }
        self.last_seen = reading;
        reading
    }

    fn peek(&self) -> Timestamp {
        self.clock.now().max(self.last_seen)
    }

    /// Apply one authenticated call.
    pub fn execute(&mut self, call: &AuthenticatedCall) -> FundResult<CallOutcome> {
        let now = self.tick();
        let who = &call.identity;
        match &call.payload {
            CallPayload::Deposit { amount } => self
                .state
                .deposit(who, *amount, now)
                .map(CallOutcome::Deposited),
            CallPayload::CreateMilestone { amount, recipient } => self
                .state
                .create_milestone(who, *amount, recipient.clone(), now)
                .map(|milestone| CallOutcome::MilestoneCreated { milestone }),
            CallPayload::Vote { milestone, approve } => self
                .state
                .vote(who, *milestone, *approve, now)
                .map(CallOutcome::Voted),
            CallPayload::DeclareEmergency => self
                .state
                .declare_emergency(who, now)
                .map(CallOutcome::Emergency),
            CallPayload::SignEmergency => self
                .state
                .sign_emergency(who, now)
                .map(CallOutcome::Emergency),
        }
    }

    /// Clear a halted fund after audit. Proposer only.
    pub fn acknowledge_fault(&mut self, auditor: &Identity) -> FundResult<()> {
        let now = self.tick();
        self.state.acknowledge_fault(auditor, now)
    }

    pub fn pool_balance(&self) -> u64 {
        self.state.pool_balance()
    }

    pub fn milestone_status(&self, id: u64) -> Option<MilestoneStatus> {
        self.state.milestone_status(id)
    }

    pub fn voting_power(&self, identity: &Identity) -> u64 {
        self.state.voting_power(identity, self.peek())
    }

    pub fn emergency_status(&self) -> EmergencyStatus {
        self.state.emergency_status(self.peek())
    }

    pub fn state(&self) -> &FundState {
        &self.state
    }

    pub fn into_state(self) -> FundState {
        self.state
    }
}
