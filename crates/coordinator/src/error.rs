//! Error types untuk ronde konsensus.
//!
//! Semua kegagalan non-transient sebuah ronde direpresentasikan melalui
//! [`ConsensusError`]. Kegagalan transient (credit return, publikasi event,
//! GC content store) TIDAK muncul di sini: hanya di-log dan ronde lanjut.

use std::fmt;

/// Error yang menggagalkan satu ronde konsensus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Konfigurasi atau setup quorum tidak valid (DID tidak terdaftar,
    /// config tidak lolos validasi, request id kosong).
    Config {
        /// Deskripsi penyebab.
        reason: String,
    },

    /// Directory mengembalikan kandidat lebih sedikit dari minimum.
    InsufficientQuorum {
        /// Jumlah kandidat yang didapat.
        got: usize,
        /// Minimum yang dibutuhkan.
        required: usize,
    },

    /// Semua dial selesai tanpa mencapai jumlah sukses minimum.
    ConsensusFailed {
        /// Jumlah sukses yang tercapai.
        success: usize,
        /// Minimum yang dibutuhkan.
        required: usize,
    },

    /// Target pledge tidak terpenuhi, atau commit pledge ditolak validator.
    PledgeFailed {
        /// Deskripsi penyebab.
        reason: String,
    },

    /// Block pledge hilang/korup saat assembly, atau pembuatan block gagal.
    BlockInvalid {
        /// Deskripsi penyebab.
        reason: String,
    },

    /// Validator menolak atau gagal memenuhi signature request.
    SignatureFailed {
        /// DID validator.
        did: String,
        /// Deskripsi penyebab.
        reason: String,
    },

    /// Receiver menolak atau gagal menerima token.
    DeliveryFailed {
        /// Deskripsi penyebab.
        reason: String,
    },

    /// Mutasi wallet gagal.
    Persistence {
        /// Deskripsi penyebab.
        reason: String,
    },

    /// Request id tidak terdaftar di registry (ronde sudah berakhir).
    NotRegistered {
        /// Request id yang dicari.
        req_id: String,
    },
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::Config { reason } => {
                write!(f, "consensus configuration error: {}", reason)
            }
            ConsensusError::InsufficientQuorum { got, required } => {
                write!(f, "insufficient quorum: got {}, required {}", got, required)
            }
            ConsensusError::ConsensusFailed { success, required } => {
                write!(
                    f,
                    "consensus failed: {} of {} required successes",
                    success, required
                )
            }
            ConsensusError::PledgeFailed { reason } => {
                write!(f, "pledge failed: {}", reason)
            }
            ConsensusError::BlockInvalid { reason } => {
                write!(f, "invalid block: {}", reason)
            }
            ConsensusError::SignatureFailed { did, reason } => {
                write!(f, "signature failed for {}: {}", did, reason)
            }
            ConsensusError::DeliveryFailed { reason } => {
                write!(f, "delivery to receiver failed: {}", reason)
            }
            ConsensusError::Persistence { reason } => {
                write!(f, "wallet persistence failed: {}", reason)
            }
            ConsensusError::NotRegistered { req_id } => {
                write!(f, "request not registered: {}", req_id)
            }
        }
    }
}

impl std::error::Error for ConsensusError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_variants() {
        let cases: Vec<(ConsensusError, &str)> = vec![
            (
                ConsensusError::InsufficientQuorum {
                    got: 3,
                    required: 5,
                },
                "insufficient quorum",
            ),
            (
                ConsensusError::ConsensusFailed {
                    success: 2,
                    required: 5,
                },
                "consensus failed",
            ),
            (
                ConsensusError::PledgeFailed {
                    reason: "timeout".to_string(),
                },
                "pledge failed",
            ),
            (
                ConsensusError::SignatureFailed {
                    did: "did-v".to_string(),
                    reason: "refused".to_string(),
                },
                "did-v",
            ),
            (
                ConsensusError::NotRegistered {
                    req_id: "req-1".to_string(),
                },
                "req-1",
            ),
        ];
        for (err, needle) in cases {
            assert!(err.to_string().contains(needle), "{}", err);
        }
    }
}
