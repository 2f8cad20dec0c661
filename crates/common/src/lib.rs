//! # DTLN Common Crate
//!
//! Primitif bersama untuk seluruh workspace DTLN (Distributed Token Ledger
//! Network): pengalamatan peer, hashing SHA3-256, dan aritmetika nilai token
//! dengan presisi desimal tetap.
//!
//! ## Modules
//!
//! | Module | Fungsi |
//! |--------|--------|
//! | `address` | Alamat node dalam bentuk kanonik `peer-id.did` |
//! | `hashing` | Helper SHA3-256 (transaction id, block hash, shard hint) |
//! | `amount` | Pembulatan nilai token ke 10 digit desimal |

pub mod address;
pub mod amount;
pub mod hashing;

pub use address::{Address, AddressParseError};
pub use amount::{round_places, round_token_amount, TOKEN_DECIMAL_PLACES};
pub use hashing::{sha3_256_bytes, sha3_256_hex};
