//! Quorum Coordinator: driver ronde konsensus di sisi initiator.
//!
//! # Flow
//!
//! 1. Hitung target collateral dari mode + contract.
//! 2. Transaction id + shard hint -> directory -> daftar quorum.
//! 3. Daftarkan state ronde; fan-out satu dial task per kandidat.
//! 4. Barrier: `success >= min_consensus` ATAU `running == 0`.
//! 5. Assembler: block + signature + commit pledge.
//! 6. Kirim credit receipt ke validator (best-effort).
//! 7. Finalizer per mode.
//!
//! State ronde di-drop pada SEMUA jalur keluar; dial yang terlambat menutup
//! handle-nya sendiri.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use dtln_chain::{Contract, DidCrypto, TokenWallet};
use dtln_common::{round_token_amount, sha3_256_hex, Address};

use crate::assembler::assemble_and_commit;
use crate::config::ConsensusConfig;
use crate::dialer::dial_quorum;
use crate::directory::{shard_hint, QuorumDirectory};
use crate::error::ConsensusError;
use crate::events::EventPublisher;
use crate::finalizer::finalize_round;
use crate::registry::Registry;
use crate::transport::PeerTransport;
use crate::types::{
    routes, BasicResponse, ConsensusRequest, CreditScore, QuorumRole, TransactionDetails,
    TransactionKind,
};

/// Peta DID validator -> token yang dipledge-nya untuk ronde ini.
pub type PledgedTokenMap = BTreeMap<String, Vec<String>>;

/// Guard drop state ronde pada semua jalur keluar.
struct RoundGuard {
    registry: Arc<Registry>,
    req_id: String,
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        self.registry.drop_request(&self.req_id);
    }
}

/// Coordinator quorum milik satu node initiator.
///
/// Seluruh kolaborator (transport, directory, wallet, publisher event)
/// di-inject sebagai trait object; tidak ada state global.
pub struct QuorumCoordinator {
    config: Arc<ConsensusConfig>,
    transport: Arc<dyn PeerTransport>,
    directory: Arc<dyn QuorumDirectory>,
    wallet: Arc<dyn TokenWallet>,
    events: Arc<dyn EventPublisher>,
    registry: Arc<Registry>,
    quorum_keys: RwLock<std::collections::HashMap<String, Arc<dyn DidCrypto>>>,
}

impl QuorumCoordinator {
    /// Membuat coordinator; config divalidasi di sini.
    pub fn new(
        config: ConsensusConfig,
        transport: Arc<dyn PeerTransport>,
        directory: Arc<dyn QuorumDirectory>,
        wallet: Arc<dyn TokenWallet>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, ConsensusError> {
        config.validate().map_err(|e| ConsensusError::Config {
            reason: e.to_string(),
        })?;
        let registry = Arc::new(Registry::new(config.min_consensus));
        Ok(Self {
            config: Arc::new(config),
            transport,
            directory,
            wallet,
            events,
            registry,
            quorum_keys: RwLock::new(std::collections::HashMap::new()),
        })
    }

    /// Siapkan DID node ini untuk berperan sebagai quorum.
    ///
    /// # Errors
    ///
    /// `Config` bila DID tidak terdaftar di wallet.
    pub fn setup_quorum(&self, dc: Arc<dyn DidCrypto>) -> Result<(), ConsensusError> {
        let did = dc.did().to_string();
        if !self.wallet.is_did_registered(&did) {
            error!(%did, "did does not exist, quorum setup failed");
            return Err(ConsensusError::Config {
                reason: format!("did does not exist: {}", did),
            });
        }
        self.quorum_keys.write().insert(did, dc);
        Ok(())
    }

    /// DID crypto quorum yang sudah di-setup.
    #[must_use]
    pub fn quorum_key(&self, did: &str) -> Option<Arc<dyn DidCrypto>> {
        self.quorum_keys.read().get(did).cloned()
    }

    /// Kandidat quorum untuk satu shard hint.
    #[must_use]
    pub fn quorum_members(&self, hint: &str) -> Option<Vec<String>> {
        self.directory.quorum(hint)
    }

    /// Tambahkan anggota quorum ke directory.
    pub fn add_quorum_members(&self, members: Vec<String>) {
        self.directory.add_members(members);
    }

    /// Kosongkan directory quorum.
    pub fn clear_quorum(&self) {
        self.directory.remove_all();
    }

    /// Jalankan satu ronde konsensus penuh atas contract yang sudah
    /// ditandatangani caller.
    ///
    /// Mengembalikan transaction details dan peta token pledge per validator.
    pub async fn initiate_consensus(
        &self,
        mut request: ConsensusRequest,
        contract: &Contract,
        dc: &dyn DidCrypto,
    ) -> Result<(TransactionDetails, PledgedTokenMap), ConsensusError> {
        if request.req_id.is_empty() {
            return Err(ConsensusError::Config {
                reason: "request id must not be empty".to_string(),
            });
        }

        let required_pledge = match request.mode.kind() {
            TransactionKind::Transfer | TransactionKind::NftSale | TransactionKind::Deploy => {
                round_token_amount(
                    contract
                        .trans_token_info()
                        .iter()
                        .map(|ti| ti.token_value)
                        .sum(),
                )
            }
            TransactionKind::DataCommit => 1.0,
            TransactionKind::Execute => contract.total_rbts(),
        };

        let tid = sha3_256_hex(contract.block());
        let hint = shard_hint(contract.block());
        let quorum_list = self.directory.quorum(&hint).unwrap_or_default();
        if quorum_list.len() < self.config.min_quorum {
            error!(
                %hint,
                got = quorum_list.len(),
                required = self.config.min_quorum,
                "failed to get required quorums"
            );
            return Err(ConsensusError::InsufficientQuorum {
                got: quorum_list.len(),
                required: self.config.min_quorum,
            });
        }
        request.quorum_list = quorum_list.clone();

        self.registry.register(&request.req_id, required_pledge);
        let _guard = RoundGuard {
            registry: self.registry.clone(),
            req_id: request.req_id.clone(),
        };

        info!(
            req_id = %request.req_id,
            %tid,
            %hint,
            candidates = quorum_list.len(),
            required_pledge,
            "starting consensus round"
        );
        let shared_request = Arc::new(request.clone());
        for addr in &quorum_list {
            // `running` di-bump sebelum task spawn; barrier tidak mungkin
            // melihat nol palsu selagi fan-out masih berlangsung.
            self.registry.start_dial(&request.req_id)?;
            tokio::spawn(dial_quorum(
                self.registry.clone(),
                self.transport.clone(),
                self.config.clone(),
                shared_request.clone(),
                addr.clone(),
                QuorumRole::Alpha,
            ));
        }

        self.registry
            .barrier(
                &request.req_id,
                self.config.min_consensus,
                Duration::from_millis(self.config.barrier_ceiling_ms),
            )
            .await?;

        let assembled = assemble_and_commit(
            &self.registry,
            self.wallet.as_ref(),
            &self.config,
            &request,
            contract,
            &tid,
        )
        .await
        .map_err(|e| {
            error!(req_id = %request.req_id, "failed to pledge token: {}", e);
            e
        })?;

        self.send_quorum_credit(&request.req_id).await;

        let mut pledged_by_quorum = PledgedTokenMap::new();
        for addr in &request.quorum_list {
            if let Ok(address) = Address::parse(addr) {
                if let Some(tokens) = assembled.pledged_tokens.get(&address.did) {
                    pledged_by_quorum.insert(address.did, tokens.clone());
                }
            }
        }

        let details = finalize_round(
            self.transport.as_ref(),
            self.wallet.as_ref(),
            self.events.as_ref(),
            &self.config,
            &request,
            contract,
            dc,
            &tid,
            &assembled.block,
        )
        .await?;

        info!(req_id = %request.req_id, %tid, "consensus round complete");
        Ok((details, pledged_by_quorum))
    }

    /// Kirim agregat credit ke setiap validator yang dipertahankan.
    ///
    /// Receipt pasca ronde: kegagalan hanya di-log, handle dilepas setelah
    /// setiap pengiriman.
    async fn send_quorum_credit(&self, req_id: &str) {
        let snapshot = self.registry.with_state(req_id, |st| {
            let score = CreditScore {
                credit: st.credit.clone(),
            };
            let dids: Vec<String> = st.credit.iter().map(|c| c.did.clone()).collect();
            let peers = st.peers.clone();
            (score, dids, peers)
        });
        let (score, dids, peers) = match snapshot {
            Ok(v) => v,
            Err(_) => {
                error!(req_id, "no quorum state, not able to send credit");
                return;
            }
        };
        for did in dids {
            let Some(peer) = peers.get(&did) else {
                error!(%did, "failed to get peer connection, not able to send credit");
                continue;
            };
            let result: Result<BasicResponse, _> = peer
                .send_request(
                    routes::QUORUM_CREDIT,
                    &score,
                    Duration::from_millis(self.config.rpc_timeout_ms),
                )
                .await;
            match result {
                Ok(reply) if reply.status => {
                    debug!(%did, "quorum credit delivered");
                }
                Ok(reply) => {
                    error!(%did, message = %reply.message, "quorum failed to accept credits");
                }
                Err(e) => {
                    error!(%did, "failed to send quorum credits: {}", e);
                }
            }
            // Lepas handle setelah credit terkirim (atau gagal terkirim).
            let _ = self.registry.with_state(req_id, |st| {
                st.peers.remove(&did);
            });
        }
    }
}
