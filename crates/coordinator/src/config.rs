//! Konfigurasi ronde konsensus.
//!
//! # Time Unit
//!
//! **SEMUA durasi dalam module ini menggunakan MILLISECONDS.**

use std::fmt;

use crate::{MIN_CONSENSUS_REQUIRED, MIN_QUORUM_REQUIRED};

// ════════════════════════════════════════════════════════════════════════════
// CONFIG ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Error validasi [`ConsensusConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfigError {
    /// Deskripsi penyebab kegagalan validasi.
    pub reason: String,
}

impl fmt::Display for ConsensusConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consensus config validation failed: {}", self.reason)
    }
}

impl std::error::Error for ConsensusConfigError {}

// ════════════════════════════════════════════════════════════════════════════
// CONSENSUS CONFIG
// ════════════════════════════════════════════════════════════════════════════

/// Konfigurasi quorum coordinator.
///
/// # Fields
///
/// - `min_quorum` - Minimum kandidat validator dari directory
/// - `min_consensus` - Minimum dial sukses supaya ronde lolos barrier
/// - `consensus_timeout_ms` - Deadline RPC konsensus per validator
/// - `rpc_timeout_ms` - Deadline default RPC lainnya
/// - `pledge_poll_interval_ms` - Interval polling pledge collector
/// - `pledge_poll_attempts` - Maksimum iterasi polling pledge
/// - `barrier_ceiling_ms` - Batas atas tunggu barrier initiator
///
/// # Validation
///
/// - Semua count dan durasi HARUS > 0
/// - `min_consensus <= min_quorum`
/// - `barrier_ceiling_ms >= consensus_timeout_ms` (barrier tidak boleh
///   menyerah sebelum deadline konsensus terjauh)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// Minimum kandidat validator.
    pub min_quorum: usize,
    /// Minimum dial sukses.
    pub min_consensus: usize,
    /// Deadline RPC konsensus (10 menit).
    pub consensus_timeout_ms: u64,
    /// Deadline default RPC non-konsensus.
    pub rpc_timeout_ms: u64,
    /// Interval polling pledge collector.
    pub pledge_poll_interval_ms: u64,
    /// Maksimum iterasi polling pledge (300 x 1 detik).
    pub pledge_poll_attempts: u32,
    /// Batas atas tunggu barrier.
    pub barrier_ceiling_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_quorum: MIN_QUORUM_REQUIRED,
            min_consensus: MIN_CONSENSUS_REQUIRED,
            consensus_timeout_ms: 600_000,
            rpc_timeout_ms: 60_000,
            pledge_poll_interval_ms: 1_000,
            pledge_poll_attempts: 300,
            barrier_ceiling_ms: 900_000,
        }
    }
}

impl ConsensusConfig {
    /// Validasi seluruh field.
    ///
    /// # Errors
    ///
    /// `ConsensusConfigError` dengan alasan field pertama yang tidak valid.
    pub fn validate(&self) -> Result<(), ConsensusConfigError> {
        if self.min_quorum == 0 {
            return Err(ConsensusConfigError {
                reason: "min_quorum must be > 0".to_string(),
            });
        }
        if self.min_consensus == 0 {
            return Err(ConsensusConfigError {
                reason: "min_consensus must be > 0".to_string(),
            });
        }
        if self.min_consensus > self.min_quorum {
            return Err(ConsensusConfigError {
                reason: "min_consensus must not exceed min_quorum".to_string(),
            });
        }
        if self.consensus_timeout_ms == 0
            || self.rpc_timeout_ms == 0
            || self.pledge_poll_interval_ms == 0
            || self.barrier_ceiling_ms == 0
        {
            return Err(ConsensusConfigError {
                reason: "all timeouts must be > 0".to_string(),
            });
        }
        if self.pledge_poll_attempts == 0 {
            return Err(ConsensusConfigError {
                reason: "pledge_poll_attempts must be > 0".to_string(),
            });
        }
        if self.barrier_ceiling_ms < self.consensus_timeout_ms {
            return Err(ConsensusConfigError {
                reason: "barrier_ceiling_ms must cover consensus_timeout_ms".to_string(),
            });
        }
        Ok(())
    }
}
