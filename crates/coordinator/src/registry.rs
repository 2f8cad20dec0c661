//! Request State Registry.
//!
//! Registry memegang state per ronde konsensus: counter dial, credit
//! signature, handle peer yang dipertahankan, pledge lock, dan detail pledge.
//! Satu mutex pendek menjaga seluruh map; TIDAK ADA I/O yang boleh terjadi
//! saat mutex dipegang.
//!
//! # Lock Order
//!
//! Registry lock -> per-request pledge lock, tidak pernah sebaliknya.
//! Pledge lock diambil SETELAH registry lock dilepas (yang diambil dari
//! registry hanyalah `Arc` locknya).
//!
//! # Barrier
//!
//! Initiator menunggu `success >= required` ATAU `running == 0` melalui
//! `tokio::sync::Notify`, bukan busy-wait: setiap `finish_dial` membangunkan
//! barrier. Barrier juga dibatasi ceiling waktu.
//!
//! # Late Completions
//!
//! Dial yang selesai setelah state di-drop menemukan entry kosong, menutup
//! handle peer yang dibawanya, dan tidak memutasi apa pun.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::ConsensusError;
use crate::transport::Peer;
use crate::types::CreditSignature;

// ════════════════════════════════════════════════════════════════════════════
// STATE TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Counter hasil dial satu ronde.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialCounters {
    /// Dial yang masih berjalan.
    pub running: usize,
    /// Dial yang sukses konsensus.
    pub success: usize,
    /// Dial yang gagal.
    pub failed: usize,
}

/// State satu request: credit, peer yang dipertahankan, counter.
pub struct RequestState {
    /// Credit signature, maksimum `min_consensus` entry.
    pub credit: Vec<CreditSignature>,
    /// Handle peer validator yang signature-nya diterima, keyed DID.
    pub peers: HashMap<String, Arc<Peer>>,
    /// Serialisasi solicitasi pledge lintas dial.
    pub pledge_lock: Arc<tokio::sync::Mutex<()>>,
    /// Counter dial.
    pub result: DialCounters,
}

/// Detail pledge satu request.
pub struct PledgeState {
    /// Target collateral total (tetap sepanjang ronde).
    pub transfer_amount: f64,
    /// Sisa target; turun sampai nol.
    pub remaining: f64,
    /// Jumlah token yang diterima.
    pub num_pledged: usize,
    /// DID validator -> token yang dipledge-nya, urut penerimaan.
    pub pledged_tokens: BTreeMap<String, Vec<String>>,
    /// Token -> chain block terbaru yang disaksikan untuk token itu.
    pub pledged_blocks: BTreeMap<String, Vec<u8>>,
    /// Seluruh token pledge, flat, urut penerimaan.
    pub token_list: Vec<String>,
}

struct RequestEntry {
    state: RequestState,
    pledge: PledgeState,
    done: Arc<Notify>,
}

/// Hasil satu dial yang dilaporkan ke registry.
pub enum DialOutcome {
    /// Konsensus sukses; membawa handle peer dan attestation validator.
    Success {
        peer: Peer,
        hash: String,
        share_sig: Vec<u8>,
        priv_sig: Vec<u8>,
    },
    /// Dial gagal; handle peer (bila sempat terbuka) ditutup reporter.
    Failure { peer: Option<Peer> },
}

// ════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ════════════════════════════════════════════════════════════════════════════

/// Registry state ronde, dimiliki eksplisit oleh coordinator.
pub struct Registry {
    entries: Mutex<HashMap<String, RequestEntry>>,
    min_consensus: usize,
}

impl Registry {
    #[must_use]
    pub fn new(min_consensus: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            min_consensus,
        }
    }

    /// Mendaftarkan state ronde baru dengan target collateral.
    pub fn register(&self, req_id: &str, transfer_amount: f64) {
        let entry = RequestEntry {
            state: RequestState {
                credit: Vec::new(),
                peers: HashMap::new(),
                pledge_lock: Arc::new(tokio::sync::Mutex::new(())),
                result: DialCounters::default(),
            },
            pledge: PledgeState {
                transfer_amount,
                remaining: transfer_amount,
                num_pledged: 0,
                pledged_tokens: BTreeMap::new(),
                pledged_blocks: BTreeMap::new(),
                token_list: Vec::new(),
            },
            done: Arc::new(Notify::new()),
        };
        self.entries.lock().insert(req_id.to_string(), entry);
    }

    /// Akses mutable ke request state di bawah registry lock.
    pub fn with_state<R>(
        &self,
        req_id: &str,
        f: impl FnOnce(&mut RequestState) -> R,
    ) -> Result<R, ConsensusError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(req_id) {
            Some(entry) => Ok(f(&mut entry.state)),
            None => Err(ConsensusError::NotRegistered {
                req_id: req_id.to_string(),
            }),
        }
    }

    /// Akses mutable ke pledge state di bawah registry lock.
    pub fn with_pledge<R>(
        &self,
        req_id: &str,
        f: impl FnOnce(&mut PledgeState) -> R,
    ) -> Result<R, ConsensusError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(req_id) {
            Some(entry) => Ok(f(&mut entry.pledge)),
            None => Err(ConsensusError::NotRegistered {
                req_id: req_id.to_string(),
            }),
        }
    }

    /// Ambil `Arc` pledge lock; lock-nya sendiri diambil SETELAH registry
    /// lock lepas.
    pub fn pledge_lock(&self, req_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, ConsensusError> {
        self.with_state(req_id, |st| st.pledge_lock.clone())
    }

    /// Drop state ronde; seluruh handle peer yang dipertahankan tertutup.
    pub fn drop_request(&self, req_id: &str) {
        let removed = self.entries.lock().remove(req_id);
        if let Some(entry) = removed {
            // Drop di luar critical section; guard peer hanya menurunkan
            // counter atomic.
            let open = entry.state.peers.len();
            drop(entry);
            debug!(req_id, released_peers = open, "request state dropped");
        }
    }

    /// Dial dimulai: bump `running` sebelum I/O apa pun.
    pub fn start_dial(&self, req_id: &str) -> Result<(), ConsensusError> {
        self.with_state(req_id, |st| {
            st.result.running += 1;
        })
    }

    /// Reporter hasil dial.
    ///
    /// Tepat satu outcome per dial. Sukses ke-`min_consensus` pertama
    /// merekam credit dan mempertahankan peer; sukses berlebih dan semua
    /// kegagalan menutup peer. Entry yang sudah hilang berarti ronde telah
    /// berakhir: peer ditutup tanpa mutasi.
    pub fn finish_dial(&self, req_id: &str, outcome: DialOutcome) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(req_id) else {
            drop(entries);
            // Late completion: peer dalam outcome ditutup saat drop.
            warn!(req_id, "dial finished after round ended");
            return;
        };
        entry.state.result.running = entry.state.result.running.saturating_sub(1);
        match outcome {
            DialOutcome::Success {
                peer,
                hash,
                share_sig,
                priv_sig,
            } => {
                if entry.state.result.success < self.min_consensus {
                    let did = peer.did().to_string();
                    entry.state.credit.push(CreditSignature {
                        signature: hex::encode(share_sig),
                        priv_signature: hex::encode(priv_sig),
                        did: did.clone(),
                        hash,
                    });
                    entry.state.peers.insert(did, Arc::new(peer));
                }
                // Sukses berlebih: peer keluar dari scope dan tertutup.
                entry.state.result.success += 1;
            }
            DialOutcome::Failure { peer: _ } => {
                entry.state.result.failed += 1;
            }
        }
        let done = entry.done.clone();
        drop(entries);
        done.notify_waiters();
    }

    /// Barrier initiator: menunggu `success >= required` ATAU `running == 0`.
    ///
    /// Event-driven via `Notify` dengan batas `ceiling`; setiap pengecekan
    /// berlangsung di bawah registry lock.
    pub async fn barrier(
        &self,
        req_id: &str,
        required: usize,
        ceiling: Duration,
    ) -> Result<(), ConsensusError> {
        let deadline = tokio::time::Instant::now() + ceiling;
        loop {
            let done = {
                let entries = self.entries.lock();
                let entry = entries.get(req_id).ok_or(ConsensusError::NotRegistered {
                    req_id: req_id.to_string(),
                })?;
                entry.done.clone()
            };
            // Daftarkan interest SEBELUM cek kondisi supaya notifikasi yang
            // datang di sela pengecekan tidak hilang.
            let notified = done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let entries = self.entries.lock();
                let entry = entries.get(req_id).ok_or(ConsensusError::NotRegistered {
                    req_id: req_id.to_string(),
                })?;
                let counters = entry.state.result;
                if counters.success >= required {
                    return Ok(());
                }
                if counters.running == 0 {
                    return Err(ConsensusError::ConsensusFailed {
                        success: counters.success,
                        required,
                    });
                }
            }

            if tokio::time::Instant::now() >= deadline {
                let success = self.with_state(req_id, |st| st.result.success)?;
                warn!(req_id, success, required, "barrier ceiling reached");
                return Err(ConsensusError::ConsensusFailed { success, required });
            }
            tokio::select! {
                _ = notified.as_mut() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    /// Counter dial saat ini (dipakai test invariant).
    pub fn counters(&self, req_id: &str) -> Result<DialCounters, ConsensusError> {
        self.with_state(req_id, |st| st.result)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
