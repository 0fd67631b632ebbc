//! TimeFund - custodial fund with milestone-gated release
//!
//! Holds pooled deposits under a time lock and releases them only through
//! stake-weighted milestone votes, with an emergency recovery path that
//! returns the remaining pool to depositors.
//!
//! Key principles:
//! - One owned state object, mutated only through its operations
//! - Every operation is all-or-nothing
//! - Released funds never exceed deposited funds
//! - Signature checking, transport and storage live outside this crate

pub mod fund;
pub mod serialization;
