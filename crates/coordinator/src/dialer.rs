//! Quorum Dialer.
//!
//! Satu task per kandidat validator menjalankan urutan penuh
//! connect -> pledge -> konsensus, lalu melaporkan TEPAT SATU outcome ke
//! registry pada setiap jalur keluar.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use dtln_common::Address;

use crate::config::ConsensusConfig;
use crate::registry::{DialOutcome, Registry};
use crate::transport::PeerTransport;
use crate::types::{routes, ConsensusReply, ConsensusRequest, QuorumRole};

/// Dial satu kandidat validator.
///
/// `running` sudah di-bump initiator saat fan-out, SEBELUM task ini spawn;
/// barrier karenanya tidak pernah melihat `running == 0` saat masih ada dial
/// yang berangkat. Task ini wajib melaporkan tepat satu outcome.
pub(crate) async fn dial_quorum(
    registry: Arc<Registry>,
    transport: Arc<dyn PeerTransport>,
    config: Arc<ConsensusConfig>,
    request: Arc<ConsensusRequest>,
    addr: String,
    role: QuorumRole,
) {
    let address = match Address::parse(&addr) {
        Ok(address) => address,
        Err(e) => {
            error!(req_id = %request.req_id, %addr, "invalid quorum address: {}", e);
            registry.finish_dial(&request.req_id, DialOutcome::Failure { peer: None });
            return;
        }
    };

    let peer = match transport.open(&address).await {
        Ok(peer) => peer,
        Err(e) => {
            error!(req_id = %request.req_id, %addr, "failed to get peer connection: {}", e);
            registry.finish_dial(&request.req_id, DialOutcome::Failure { peer: None });
            return;
        }
    };

    if let Err(e) =
        crate::pledge::collect_pledge(&registry, &config, &request.req_id, &peer, role).await
    {
        error!(req_id = %request.req_id, did = peer.did(), "failed to pledge token: {}", e);
        registry.finish_dial(&request.req_id, DialOutcome::Failure { peer: Some(peer) });
        return;
    }

    let reply: ConsensusReply = match peer
        .send_request(
            routes::QUORUM_CONSENSUS,
            request.as_ref(),
            Duration::from_millis(config.consensus_timeout_ms),
        )
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            error!(req_id = %request.req_id, did = peer.did(), "failed to get consensus: {}", e);
            registry.finish_dial(&request.req_id, DialOutcome::Failure { peer: Some(peer) });
            return;
        }
    };
    if !reply.status {
        error!(
            req_id = %request.req_id,
            did = peer.did(),
            message = %reply.message,
            "validator refused consensus"
        );
        registry.finish_dial(&request.req_id, DialOutcome::Failure { peer: Some(peer) });
        return;
    }

    debug!(req_id = %request.req_id, did = peer.did(), "consensus succeeded");
    registry.finish_dial(
        &request.req_id,
        DialOutcome::Success {
            peer,
            hash: reply.hash,
            share_sig: reply.share_sig,
            priv_sig: reply.priv_sig,
        },
    );
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
