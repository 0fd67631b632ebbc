//! Caller identities and authenticated calls.
//!
//! The core never verifies signatures. The authenticated-call layer in front
//! of it hands over an `AuthenticatedCall` whose identity has already been
//! checked; the core only compares identities for equality and ordering.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque caller handle (account address, key fingerprint, etc).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an already-authenticated handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Raw handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 fingerprint (first 4 bytes, hex) for log lines.
    ///
    /// Raw handles are kept out of logs the same way member hashes are
    /// shortened for display elsewhere.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(handle: &str) -> Self {
        Self::new(handle)
    }
}

/// Operation requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallPayload {
    Deposit {
        amount: u64,
    },
    CreateMilestone {
        amount: u64,
        #[serde(default)]
        recipient: Option<Identity>,
    },
    Vote {
        milestone: u64,
        approve: bool,
    },
    DeclareEmergency,
    SignEmergency,
}

impl CallPayload {
    /// Operation name used in logs and audit entries.
    pub fn name(&self) -> &'static str {
        match self {
            CallPayload::Deposit { .. } => "deposit",
            CallPayload::CreateMilestone { .. } => "create_milestone",
            CallPayload::Vote { .. } => "vote",
            CallPayload::DeclareEmergency => "declare_emergency",
            CallPayload::SignEmergency => "sign_emergency",
        }
    }
}

/// A call whose identity was authenticated outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedCall {
    pub identity: Identity,
    pub payload: CallPayload,
}

impl AuthenticatedCall {
    pub fn new(identity: impl Into<Identity>, payload: CallPayload) -> Self {
        Self {
            identity: identity.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let alice = Identity::new("alice");
        assert_eq!(alice.fingerprint(), Identity::new("alice").fingerprint());
        assert_eq!(alice.fingerprint().len(), 8);
        assert_ne!(alice.fingerprint(), Identity::new("bob").fingerprint());
    }

    #[test]
    fn test_payload_json_shape() {
        let call: AuthenticatedCall = serde_json::from_str(
            r#"{"identity":"alice","payload":{"type":"vote","milestone":0,"approve":true}}"#,
        )
        .unwrap();
        assert_eq!(call.identity, Identity::new("alice"));
        assert_eq!(
            call.payload,
            CallPayload::Vote {
                milestone: 0,
                approve: true
            }
        );
    }

    #[test]
    fn test_create_milestone_recipient_defaults_to_none() {
        let payload: CallPayload =
            serde_json::from_str(r#"{"type":"create_milestone","amount":300}"#).unwrap();
        assert_eq!(
            payload,
            CallPayload::CreateMilestone {
                amount: 300,
                recipient: None
            }
        );
    }
}
