//! Emergency recovery arbiter.
//!
//! An out-of-band stake vote that, once approved, returns the whole remaining
//! pool to depositors. Only one declaration can be pending at a time.
//! Expiry is lazy: a pending declaration older than the expiry window is
//! treated as Expired whenever it is next looked at, and cleared by the next
//! declare/sign call so a fresh declaration can be opened.

use super::clock::Timestamp;
use super::config::Fraction;
use super::error::{FundError, FundResult};
use super::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmergencyStatus {
    None,
    Pending,
    Approved,
    Expired,
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyDeclaration {
    pub id: u64,
    pub initiator: Identity,
    /// Everyone who signed, initiator included.
    pub signers: BTreeSet<Identity>,
    /// Sum of signer voting power at signing time.
    pub signer_stake: u64,
    pub created_at: Timestamp,
    pub status: EmergencyStatus,
    pub decided_at: Option<Timestamp>,
}

impl EmergencyDeclaration {
    pub fn has_signed(&self, identity: &Identity) -> bool {
        self.signers.contains(identity)
    }

    fn is_past_expiry(&self, window: Timestamp, now: Timestamp) -> bool {
        now > self.created_at.saturating_add(window)
    }
}

/// Parameters the arbiter decides against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyPolicy {
    pub threshold: Fraction,
    pub expiry_window: Timestamp,
    pub min_stake: u64,
}

/// Result of a declare or sign call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyReceipt {
    pub declaration: u64,
    pub signer_stake: u64,
    pub eligible_power: u64,
    pub status: EmergencyStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyArbiter {
    current: Option<EmergencyDeclaration>,
    /// Expired declarations, oldest first.
    history: Vec<EmergencyDeclaration>,
    next_id: u64,
}

impl EmergencyArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status as observed at `now`, including lazy expiry.
    pub fn status(&self, policy: &EmergencyPolicy, now: Timestamp) -> EmergencyStatus {
        match &self.current {
            None => EmergencyStatus::None,
            Some(d)
                if d.status == EmergencyStatus::Pending
                    && d.is_past_expiry(policy.expiry_window, now) =>
            {
                EmergencyStatus::Expired
            }
            Some(d) => d.status,
        }
    }

    pub fn current(&self) -> Option<&EmergencyDeclaration> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[EmergencyDeclaration] {
        &self.history
    }

    pub fn is_approved(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|d| d.status == EmergencyStatus::Approved)
    }

    /// Clear a pending declaration whose window has elapsed.
    fn expire_if_due(&mut self, policy: &EmergencyPolicy, now: Timestamp) {
        let due = self.current.as_ref().is_some_and(|d| {
            d.status == EmergencyStatus::Pending && d.is_past_expiry(policy.expiry_window, now)
        });
        if !due {
            return;
        }
        if let Some(mut expired) = self.current.take() {
            expired.status = EmergencyStatus::Expired;
            expired.decided_at = Some(now);
            info!(
                declaration = expired.id,
                signer_stake = expired.signer_stake,
                "emergency declaration expired"
            );
            self.history.push(expired);
        }
    }

    /// Open a new declaration with the caller as first signer.
    pub fn declare(
        &mut self,
        policy: &EmergencyPolicy,
        identity: &Identity,
        power: u64,
        eligible_power: u64,
        now: Timestamp,
    ) -> FundResult<EmergencyReceipt> {
        if power == 0 {
            return Err(FundError::NotEligible(format!(
                "{} has no voting power",
                identity.fingerprint()
            )));
        }
        if power < policy.min_stake {
            return Err(FundError::NotEligible(format!(
                "{} holds {} voting power, {} required to declare",
                identity.fingerprint(),
                power,
                policy.min_stake
            )));
        }

        self.expire_if_due(policy, now);
        if let Some(current) = &self.current {
            return Err(match current.status {
                EmergencyStatus::Approved => FundError::FundClosed(format!(
                    "emergency declaration {} was already approved",
                    current.id
                )),
                _ => FundError::EmergencyAlreadyPending(format!(
                    "declaration {} is pending until {}",
                    current.id,
                    current.created_at.saturating_add(policy.expiry_window)
                )),
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(EmergencyDeclaration {
            id,
            initiator: identity.clone(),
            signers: BTreeSet::from([identity.clone()]),
            signer_stake: power,
            created_at: now,
            status: EmergencyStatus::Pending,
            decided_at: None,
        });
        info!(
            declaration = id,
            initiator = %identity.fingerprint(),
            power,
            "emergency declared"
        );
        self.evaluate(policy, eligible_power, now)
    }

    /// Add the caller's voting power to the pending declaration.
    pub fn sign(
        &mut self,
        policy: &EmergencyPolicy,
        identity: &Identity,
        power: u64,
        eligible_power: u64,
        now: Timestamp,
    ) -> FundResult<EmergencyReceipt> {
        self.expire_if_due(policy, now);
        let current = match self.current.as_mut() {
            Some(d) if d.status == EmergencyStatus::Pending => d,
            _ => {
                return Err(FundError::NoActiveDeclaration(
                    "no emergency declaration is pending".to_string(),
                ))
            }
        };
        if current.has_signed(identity) {
            return Err(FundError::AlreadySigned(format!(
                "{} already signed declaration {}",
                identity.fingerprint(),
                current.id
            )));
        }
        if power == 0 {
            return Err(FundError::NotEligible(format!(
                "{} has no voting power",
                identity.fingerprint()
            )));
        }

        current.signer_stake = current.signer_stake.checked_add(power).ok_or_else(|| {
            FundError::InternalConsistencyFault("signer stake overflow".to_string())
        })?;
        current.signers.insert(identity.clone());
        info!(
            declaration = current.id,
            signer = %identity.fingerprint(),
            power,
            signer_stake = current.signer_stake,
            "emergency signed"
        );
        self.evaluate(policy, eligible_power, now)
    }

    /// Approve the pending declaration if signer stake meets the threshold.
    fn evaluate(
        &mut self,
        policy: &EmergencyPolicy,
        eligible_power: u64,
        now: Timestamp,
    ) -> FundResult<EmergencyReceipt> {
        let current = self.current.as_mut().ok_or_else(|| {
            FundError::InternalConsistencyFault("no declaration to evaluate".to_string())
        })?;
        if eligible_power > 0 && policy.threshold.is_met_by(current.signer_stake, eligible_power)
        {
            current.status = EmergencyStatus::Approved;
            current.decided_at = Some(now);
            info!(
                declaration = current.id,
                signer_stake = current.signer_stake,
                eligible_power,
                "emergency approved"
            );
        }
        Ok(EmergencyReceipt {
            declaration: current.id,
            signer_stake: current.signer_stake,
            eligible_power,
            status: current.status,
        })
    }
}
