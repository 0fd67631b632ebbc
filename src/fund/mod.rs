//! Custodial time-lock fund.
//!
//! Pooled deposits are released only through milestone votes weighted by
//! stake, or returned in full through emergency recovery.
//!
//! Control flow:
//! - deposits populate the ledger
//! - the lock scheduler decides who can vote
//! - the milestone tracker exposes the single Active milestone
//! - the voting engine tallies votes and decides the milestone
//! - the release executor pays out and the milestone becomes Released
//!
//! Emergency recovery bypasses milestone sequencing but still pays out
//! through the release executor.

pub mod audit;
pub mod clock;
pub mod config;
pub mod contract;
pub mod emergency;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod lock;
pub mod milestone;
pub mod release;
pub mod state;
pub mod voting;

#[cfg(test)]
mod proptests;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{Fraction, FundConfig};
pub use contract::{CallOutcome, FundContract};
pub use emergency::EmergencyStatus;
pub use error::{ErrorKind, FundError, FundResult};
pub use identity::{AuthenticatedCall, CallPayload, Identity};
pub use milestone::MilestoneStatus;
pub use state::FundState;
pub use voting::VoteDecision;
