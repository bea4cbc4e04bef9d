//! Identifiers used throughout OpenBond.
//!
//! Bonds and traders are identified by decentralized identifiers
//! (`did:<method>:<id>`); resolution of DID documents is the host's concern,
//! the engine only checks the shape. Batches are numbered per bond.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Denomination of a coin (bond token or reserve token), e.g. `"abc"`.
pub type Denom = String;

/// Whether `denom` matches `[a-z][a-z0-9]{2,15}`.
#[must_use]
pub fn is_valid_denom(denom: &str) -> bool {
    let len = denom.len();
    if !(constants::MIN_DENOM_LEN..=constants::MAX_DENOM_LEN).contains(&len) {
        return false;
    }
    let mut chars = denom.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Whether `did` has the shape `did:<method>:<id>` with alphanumeric
/// method and a non-empty id.
#[must_use]
pub fn is_valid_did(did: &str) -> bool {
    let mut parts = did.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("did"), Some(method), Some(id)) => {
            !method.is_empty()
                && method.chars().all(|c| c.is_ascii_alphanumeric())
                && !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '/' | '.' | '-' | '_'))
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// BondDid
// ---------------------------------------------------------------------------

/// Identity of a bond. All per-bond state is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BondDid(pub String);

impl BondDid {
    #[must_use]
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_valid_did(&self.0)
    }
}

impl fmt::Display for BondDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AccountDid
// ---------------------------------------------------------------------------

/// Identity of a trader, bond creator/editor, or fee collector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountDid(pub String);

impl AccountDid {
    #[must_use]
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_valid_did(&self.0)
    }
}

impl fmt::Display for AccountDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// BatchSeq
// ---------------------------------------------------------------------------

/// Per-bond batch sequence number. The first batch of a bond is `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchSeq(pub u64);

impl BatchSeq {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BatchSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}
