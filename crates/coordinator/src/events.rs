//! Publikasi event smart contract.
//!
//! Event deploy/execute dipublikasikan best-effort setelah ronde sukses;
//! kegagalan publikasi hanya di-log dan TIDAK menggagalkan ronde.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

// ════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Jenis event contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractEventKind {
    Deploy,
    Execute,
}

/// Event lifecycle smart contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContractEvent {
    pub smart_contract_token: String,
    /// DID deployer atau executor.
    pub did: String,
    pub kind: ContractEventKind,
    /// Block id block smart contract yang baru.
    pub block_hash: String,
}

/// Error publikasi event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventError {
    /// Deskripsi penyebab.
    pub reason: String,
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event publish failed: {}", self.reason)
    }
}

impl std::error::Error for EventError {}

// ════════════════════════════════════════════════════════════════════════════
// PUBLISHER
// ════════════════════════════════════════════════════════════════════════════

/// Jalur publikasi event contract keluar dari coordinator.
pub trait EventPublisher: Send + Sync {
    /// Publikasikan satu event. Best-effort di sisi pemanggil.
    fn publish(&self, event: &NewContractEvent) -> Result<(), EventError>;
}

/// Publisher in-memory: merekam event untuk inspeksi test.
#[derive(Default)]
pub struct MemoryEventPublisher {
    events: Mutex<Vec<NewContractEvent>>,
    failing: AtomicBool,
}

impl MemoryEventPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seluruh event yang sudah dipublikasikan.
    #[must_use]
    pub fn events(&self) -> Vec<NewContractEvent> {
        self.events.lock().clone()
    }

    /// Paksa publish gagal (untuk menguji jalur transient).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EventPublisher for MemoryEventPublisher {
    fn publish(&self, event: &NewContractEvent) -> Result<(), EventError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventError {
                reason: "publisher offline".to_string(),
            });
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
