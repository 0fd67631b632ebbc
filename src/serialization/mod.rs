//! CBOR encoding for fund snapshots.
//!
//! - CBOR via `ciborium`
//! - Fields added later carry `#[serde(default)]` so older snapshots still load

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("CBOR encoding failed: {0}")]
    Encode(String),

    #[error("CBOR decoding failed: {0}")]
    Decode(String),
}

pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| SerializationError::Encode(format!("{:?}", e)))?;
    Ok(bytes)
}

pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    ciborium::from_reader(bytes).map_err(|e| SerializationError::Decode(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fund::ledger::Depositor;
    use crate::fund::Identity;
    use serde::Deserialize;
    use std::collections::BTreeSet;

    #[test]
    fn test_depositor_without_recovered_amount_still_decodes() {
        #[derive(Serialize)]
        struct DepositorV0 {
            identity: Identity,
            cumulative_amount: u64,
            first_deposit_at: u64,
            voted_milestones: BTreeSet<u64>,
        }

        let old = DepositorV0 {
            identity: Identity::new("alice"),
            cumulative_amount: 1_000,
            first_deposit_at: 3,
            voted_milestones: BTreeSet::from([0]),
        };
        let decoded: Depositor = from_cbor(&to_cbor(&old).unwrap()).unwrap();
        assert_eq!(decoded.cumulative_amount, 1_000);
        assert_eq!(decoded.recovered_amount, 0);
        assert!(decoded.has_voted_on(0));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Anything {
            value: u64,
        }
        let err = from_cbor::<Anything>(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, SerializationError::Decode(_)));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let value = (Identity::new("bob"), 500u64);
        assert_eq!(to_cbor(&value).unwrap(), to_cbor(&value).unwrap());
    }
}
