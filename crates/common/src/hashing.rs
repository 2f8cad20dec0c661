//! SHA3-256 helpers untuk seluruh workspace.
//!
//! Transaction id, block hash, dan shard hint semuanya diturunkan dari
//! SHA3-256 atas bytes kanonik.

use hex::encode as hex_encode;
use sha3::{Digest, Sha3_256};

/// Menghitung digest SHA3-256 (32 bytes).
#[must_use]
pub fn sha3_256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Menghitung digest SHA3-256 sebagai lowercase hex string (64 chars).
#[must_use]
pub fn sha3_256_hex(data: &[u8]) -> String {
    hex_encode(sha3_256_bytes(data))
}
