//! Fund operation errors.
//!
//! Every variant except `InternalConsistencyFault` is a recoverable rejection
//! of a single call: the state is left exactly as it was before the call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors returned by fund operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FundError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient pool: {0}")]
    InsufficientPool(String),

    #[error("not eligible: {0}")]
    NotEligible(String),

    #[error("no active milestone: {0}")]
    NoActiveMilestone(String),

    #[error("duplicate vote: {0}")]
    DuplicateVote(String),

    #[error("emergency already pending: {0}")]
    EmergencyAlreadyPending(String),

    #[error("no active declaration: {0}")]
    NoActiveDeclaration(String),

    #[error("already signed: {0}")]
    AlreadySigned(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("milestone sequence violation: {0}")]
    SequenceViolation(String),

    #[error("fund closed: {0}")]
    FundClosed(String),

    #[error("fund halted pending audit: {0}")]
    Halted(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Accounting bug inside the core. Halts all further mutation.
    #[error("internal consistency fault: {0}")]
    InternalConsistencyFault(String),
}

/// Fieldless mirror of `FundError` for matching on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidAmount,
    InsufficientPool,
    NotEligible,
    NoActiveMilestone,
    DuplicateVote,
    EmergencyAlreadyPending,
    NoActiveDeclaration,
    AlreadySigned,
    Unauthorized,
    SequenceViolation,
    FundClosed,
    Halted,
    InvalidConfig,
    InternalConsistencyFault,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FundError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            FundError::InsufficientPool(_) => ErrorKind::InsufficientPool,
            FundError::NotEligible(_) => ErrorKind::NotEligible,
            FundError::NoActiveMilestone(_) => ErrorKind::NoActiveMilestone,
            FundError::DuplicateVote(_) => ErrorKind::DuplicateVote,
            FundError::EmergencyAlreadyPending(_) => ErrorKind::EmergencyAlreadyPending,
            FundError::NoActiveDeclaration(_) => ErrorKind::NoActiveDeclaration,
            FundError::AlreadySigned(_) => ErrorKind::AlreadySigned,
            FundError::Unauthorized(_) => ErrorKind::Unauthorized,
            FundError::SequenceViolation(_) => ErrorKind::SequenceViolation,
            FundError::FundClosed(_) => ErrorKind::FundClosed,
            FundError::Halted(_) => ErrorKind::Halted,
            FundError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            FundError::InternalConsistencyFault(_) => ErrorKind::InternalConsistencyFault,
        }
    }

    /// Human-readable reason without the kind prefix.
    pub fn reason(&self) -> &str {
        match self {
            FundError::InvalidAmount(r)
            | FundError::InsufficientPool(r)
            | FundError::NotEligible(r)
            | FundError::NoActiveMilestone(r)
            | FundError::DuplicateVote(r)
            | FundError::EmergencyAlreadyPending(r)
            | FundError::NoActiveDeclaration(r)
            | FundError::AlreadySigned(r)
            | FundError::Unauthorized(r)
            | FundError::SequenceViolation(r)
            | FundError::FundClosed(r)
            | FundError::Halted(r)
            | FundError::InvalidConfig(r)
            | FundError::InternalConsistencyFault(r) => r,
        }
    }

    /// True only for faults that must halt the fund.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FundError::InternalConsistencyFault(_))
    }
}

/// Result type for fund operations.
pub type FundResult<T> = Result<T, FundError>;
