//! Node Addressing
//!
//! Alamat node DTLN adalah gabungan peer id transport dan DID identitas,
//! dalam bentuk kanonik `"<peer-id>.<did>"`. Kedua komponen wajib non-empty.
//!
//! # Canonical Form
//!
//! - Pemisah adalah titik PERTAMA dalam string; DID boleh mengandung titik.
//! - `Display` dan serde selalu menghasilkan bentuk kanonik yang sama.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ════════════════════════════════════════════════════════════════════════════
// PARSE ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Error saat parsing alamat node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError {
    /// Input yang gagal di-parse.
    pub input: String,
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node address: {:?}", self.input)
    }
}

impl std::error::Error for AddressParseError {}

// ════════════════════════════════════════════════════════════════════════════
// ADDRESS
// ════════════════════════════════════════════════════════════════════════════

/// Alamat node: peer id transport + DID pemiliknya.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    /// Peer id pada layer transport.
    pub peer_id: String,
    /// DID identitas node.
    pub did: String,
}

impl Address {
    /// Membuat Address dari komponen yang sudah tervalidasi.
    ///
    /// # Errors
    ///
    /// `AddressParseError` jika salah satu komponen empty atau `peer_id`
    /// mengandung titik.
    pub fn new(peer_id: &str, did: &str) -> Result<Self, AddressParseError> {
        if peer_id.is_empty() || did.is_empty() || peer_id.contains('.') {
            return Err(AddressParseError {
                input: format!("{}.{}", peer_id, did),
            });
        }
        Ok(Self {
            peer_id: peer_id.to_string(),
            did: did.to_string(),
        })
    }

    /// Parse bentuk kanonik `"<peer-id>.<did>"`.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        match s.split_once('.') {
            Some((peer_id, did)) if !peer_id.is_empty() && !did.is_empty() => Ok(Self {
                peer_id: peer_id.to_string(),
                did: did.to_string(),
            }),
            _ => Err(AddressParseError {
                input: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.peer_id, self.did)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
