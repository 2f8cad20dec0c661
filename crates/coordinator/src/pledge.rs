//! Pledge Collector.
//!
//! Setiap dial alpha meminta bagian collateral dari validatornya, lalu SEMUA
//! dial menunggu target agregat terpenuhi. Solicitasi diserialisasi oleh
//! pledge lock per request supaya dua dial tidak meminta bagian yang sama.
//!
//! # Target
//!
//! Target per validator = `transfer_amount / min_quorum`. Collector tidak
//! memeriksa kecukupan per validator: validator boleh memberi lebih sedikit
//! (ditutup validator lain) atau lebih banyak (sisa target di-clamp nol).
//!
//! # Filter
//!
//! Token hanya diterima bila chain block terbarunya valid dan transaction
//! type-nya BUKAN `TOKEN_PLEDGED`; token yang sedang dipledge untuk ronde
//! lain tidak boleh menjadi collateral ganda.

use std::time::Duration;

use tracing::{debug, warn};

use dtln_chain::Block;
use dtln_common::round_token_amount;

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::registry::Registry;
use crate::transport::Peer;
use crate::types::{routes, PledgeReply, PledgeRequest, QuorumRole};

/// Solicit collateral dari satu peer lalu tunggu target agregat.
///
/// Dipanggil dialer setelah koneksi peer terbuka, sebelum RPC konsensus.
pub(crate) async fn collect_pledge(
    registry: &Registry,
    config: &ConsensusConfig,
    req_id: &str,
    peer: &Peer,
    role: QuorumRole,
) -> Result<(), ConsensusError> {
    if role == QuorumRole::Alpha {
        solicit(registry, config, req_id, peer).await?;
    }
    await_target(registry, config, req_id).await
}

/// Satu putaran solicitasi di bawah pledge lock.
async fn solicit(
    registry: &Registry,
    config: &ConsensusConfig,
    req_id: &str,
    peer: &Peer,
) -> Result<(), ConsensusError> {
    // Lock order: registry lock (di dalam pledge_lock/with_pledge) selalu
    // dilepas sebelum pledge lock diambil; pledge lock boleh dipegang
    // melintasi satu RPC pledge.
    let lock = registry.pledge_lock(req_id)?;
    let _guard = lock.lock().await;

    let (remaining, per_validator) = registry.with_pledge(req_id, |pd| {
        (
            pd.remaining,
            pd.transfer_amount / config.min_quorum as f64,
        )
    })?;
    if remaining <= 0.0 {
        return Ok(());
    }

    let request = PledgeRequest {
        tokens_required: per_validator,
    };
    let reply: PledgeReply = peer
        .send_request(
            routes::REQ_PLEDGE_TOKEN,
            &request,
            Duration::from_millis(config.rpc_timeout_ms),
        )
        .await
        .map_err(|e| ConsensusError::PledgeFailed {
            reason: format!("pledge request to {} failed: {}", peer.did(), e),
        })?;

    if !reply.status {
        // Validator menolak memberi collateral; validator lain masih bisa
        // menutup target.
        warn!(
            req_id,
            did = peer.did(),
            message = %reply.message,
            "pledge refused"
        );
        return Ok(());
    }
    if reply.tokens.len() != reply.token_value.len()
        || reply.tokens.len() != reply.token_chain_block.len()
    {
        return Err(ConsensusError::PledgeFailed {
            reason: format!("malformed pledge reply from {}", peer.did()),
        });
    }

    let did = peer.did().to_string();
    registry.with_pledge(req_id, |pd| {
        let mut accepted = Vec::new();
        for ((token, value), block_bytes) in reply
            .tokens
            .iter()
            .zip(reply.token_value.iter())
            .zip(reply.token_chain_block.iter())
        {
            let latest = match Block::from_bytes(block_bytes) {
                Ok(block) => block,
                Err(e) => {
                    warn!(req_id, %token, "undecodable pledge block: {}", e);
                    continue;
                }
            };
            if latest.is_pledged() {
                debug!(req_id, %token, "token already pledged, skipping");
                continue;
            }
            pd.num_pledged += 1;
            pd.remaining = round_token_amount(pd.remaining - value).max(0.0);
            pd.pledged_blocks.insert(token.clone(), block_bytes.clone());
            accepted.push(token.clone());
            pd.token_list.push(token.clone());
        }
        debug!(
            req_id,
            %did,
            accepted = accepted.len(),
            remaining = pd.remaining,
            "pledge solicitation round complete"
        );
        pd.pledged_tokens.entry(did.clone()).or_default().extend(accepted);
    })
}

/// Poll pledge state sampai `remaining == 0` atau batas iterasi habis.
async fn await_target(
    registry: &Registry,
    config: &ConsensusConfig,
    req_id: &str,
) -> Result<(), ConsensusError> {
    for attempt in 0..config.pledge_poll_attempts {
        let remaining = registry.with_pledge(req_id, |pd| pd.remaining)?;
        if remaining == 0.0 {
            return Ok(());
        }
        if attempt + 1 == config.pledge_poll_attempts {
            break;
        }
        tokio::time::sleep(Duration::from_millis(config.pledge_poll_interval_ms)).await;
    }
    warn!(req_id, "pledge target not met before poll limit");
    Err(ConsensusError::PledgeFailed {
        reason: format!(
            "pledge target not met after {} polls",
            config.pledge_poll_attempts
        ),
    })
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, PeerTransport};
    use dtln_chain::{TokenChainBlock, TokenType, TransInfo, TransTokens, TOKEN_GENERATED, TOKEN_PLEDGED};
    use dtln_common::Address;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn test_config() -> ConsensusConfig {
        ConsensusConfig {
            pledge_poll_interval_ms: 10,
            pledge_poll_attempts: 20,
            ..ConsensusConfig::default()
        }
    }

    fn chain_block(token: &str, trans_type: &str) -> Vec<u8> {
        let tcb = TokenChainBlock {
            transaction_type: trans_type.to_string(),
            token_owner: "did-v".to_string(),
            trans_info: TransInfo {
                tokens: vec![TransTokens {
                    token: token.to_string(),
                    token_type: TokenType::Rbt,
                    commited_did: None,
                }],
                ..TransInfo::default()
            },
            ..TokenChainBlock::default()
        };
        let mut ctcb = BTreeMap::new();
        ctcb.insert(token.to_string(), None);
        Block::create_new(&ctcb, tcb)
            .expect("block")
            .to_bytes()
            .expect("bytes")
    }

    fn pledge_reply(tokens: &[(&str, f64)], trans_type: &str) -> serde_json::Value {
        json!({
            "status": true,
            "message": "",
            "tokens": tokens.iter().map(|(t, _)| (*t).to_string()).collect::<Vec<_>>(),
            "token_value": tokens.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            "token_chain_block": tokens
                .iter()
                .map(|(t, _)| chain_block(t, trans_type))
                .collect::<Vec<_>>(),
        })
    }

    async fn open_peer(transport: &MockTransport, n: u8) -> Peer {
        let addr = Address::parse(&format!("peer{}.did{}", n, n)).expect("addr");
        transport.open(&addr).await.expect("open")
    }

    #[tokio::test]
    async fn test_collect_pledge_reaches_target() {
        let transport = MockTransport::new();
        let registry = Registry::new(5);
        let config = test_config();
        registry.register("req-1", 1.0);
        transport.script(
            "did1",
            routes::REQ_PLEDGE_TOKEN,
            pledge_reply(&[("pt1", 1.0)], TOKEN_GENERATED),
        );
        let peer = open_peer(&transport, 1).await;
        collect_pledge(&registry, &config, "req-1", &peer, QuorumRole::Alpha)
            .await
            .expect("pledge");
        let (remaining, tokens) = registry
            .with_pledge("req-1", |pd| {
                (pd.remaining, pd.pledged_tokens.get("did1").cloned())
            })
            .expect("pledge state");
        assert_eq!(remaining, 0.0);
        assert_eq!(tokens, Some(vec!["pt1".to_string()]));
    }

    #[tokio::test]
    async fn test_already_pledged_token_filtered() {
        let transport = MockTransport::new();
        let registry = Registry::new(5);
        let config = test_config();
        registry.register("req-1", 1.0);
        transport.script(
            "did1",
            routes::REQ_PLEDGE_TOKEN,
            pledge_reply(&[("pt1", 1.0)], TOKEN_PLEDGED),
        );
        let peer = open_peer(&transport, 1).await;
        let err = collect_pledge(&registry, &config, "req-1", &peer, QuorumRole::Alpha)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::PledgeFailed { .. }));
        let (remaining, num) = registry
            .with_pledge("req-1", |pd| (pd.remaining, pd.num_pledged))
            .expect("pledge state");
        assert_eq!(remaining, 1.0);
        assert_eq!(num, 0);
    }

    #[tokio::test]
    async fn test_over_pledge_clamped_to_zero() {
        let transport = MockTransport::new();
        let registry = Registry::new(5);
        let config = test_config();
        registry.register("req-1", 0.3);
        transport.script(
            "did1",
            routes::REQ_PLEDGE_TOKEN,
            pledge_reply(&[("pt1", 1.0)], TOKEN_GENERATED),
        );
        let peer = open_peer(&transport, 1).await;
        collect_pledge(&registry, &config, "req-1", &peer, QuorumRole::Alpha)
            .await
            .expect("pledge");
        let remaining = registry
            .with_pledge("req-1", |pd| pd.remaining)
            .expect("pledge state");
        assert_eq!(remaining, 0.0);
    }

    #[tokio::test]
    async fn test_wait_sees_other_validators_pledges() {
        let transport = MockTransport::new();
        let registry = std::sync::Arc::new(Registry::new(5));
        let config = test_config();
        registry.register("req-1", 1.0);
        // Peer beta tidak solicit; target dipenuhi pihak lain di background.
        let registry2 = registry.clone();
        let filler = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            registry2
                .with_pledge("req-1", |pd| {
                    pd.remaining = 0.0;
                })
                .expect("fill");
        });
        let peer = open_peer(&transport, 2).await;
        collect_pledge(&registry, &config, "req-1", &peer, QuorumRole::Beta)
            .await
            .expect("pledge");
        filler.await.expect("filler");
    }

    #[tokio::test]
    async fn test_poll_limit_expires() {
        let transport = MockTransport::new();
        let registry = Registry::new(5);
        let config = ConsensusConfig {
            pledge_poll_interval_ms: 5,
            pledge_poll_attempts: 3,
            ..ConsensusConfig::default()
        };
        registry.register("req-1", 2.0);
        transport.script(
            "did1",
            routes::REQ_PLEDGE_TOKEN,
            pledge_reply(&[("pt1", 0.5)], TOKEN_GENERATED),
        );
        let peer = open_peer(&transport, 1).await;
        let err = collect_pledge(&registry, &config, "req-1", &peer, QuorumRole::Alpha)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::PledgeFailed { .. }));
    }

    #[tokio::test]
    async fn test_dropped_state_fails_cleanly() {
        let transport = MockTransport::new();
        let registry = Registry::new(5);
        let config = test_config();
        let peer = open_peer(&transport, 1).await;
        let err = collect_pledge(&registry, &config, "req-gone", &peer, QuorumRole::Alpha)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::NotRegistered { .. }));
    }

    #[tokio::test]
    async fn test_refused_pledge_does_not_record() {
        let transport = MockTransport::new();
        let registry = Registry::new(5);
        let config = ConsensusConfig {
            pledge_poll_interval_ms: 5,
            pledge_poll_attempts: 2,
            ..ConsensusConfig::default()
        };
        registry.register("req-1", 1.0);
        transport.script(
            "did1",
            routes::REQ_PLEDGE_TOKEN,
            json!({"status": false, "message": "no free tokens"}),
        );
        let peer = open_peer(&transport, 1).await;
        let err = collect_pledge(&registry, &config, "req-1", &peer, QuorumRole::Alpha)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::PledgeFailed { .. }));
        let has_entry = registry
            .with_pledge("req-1", |pd| pd.pledged_tokens.contains_key("did1"))
            .expect("pledge state");
        assert!(!has_entry);
    }
}
