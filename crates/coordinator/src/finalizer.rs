//! Finalizer: aksi pasca-konsensus per mode transaksi.
//!
//! - Transfer/NFT-sale: kirim token ke receiver, mutasi wallet, unpin + GC.
//! - Data-commit: persist block baru.
//! - Deploy: buat chain smart-contract token, block committed-tokens, kunci
//!   token backing, publikasi event.
//! - Execute: buat chain, tandai executed, publikasi event.
//!
//! Kegagalan transient (unpin, GC, publikasi event) hanya di-log.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, warn};

use dtln_chain::{
    Block, Contract, DidCrypto, PinRole, TokenChainBlock, TokenStatus, TokenType, TokenWallet,
    TransInfo, TransTokens, TOKEN_CONTRACT_COMMITTED,
};

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::events::{ContractEventKind, EventPublisher, NewContractEvent};
use crate::transport::PeerTransport;
use crate::types::{
    routes, BasicResponse, ConsensusRequest, SendTokenRequest, TransactionDetails, TransactionMode,
};

/// Jalankan aksi finalisasi mode dan bangun transaction details.
pub(crate) async fn finalize_round(
    transport: &dyn PeerTransport,
    wallet: &dyn TokenWallet,
    events: &dyn EventPublisher,
    config: &ConsensusConfig,
    request: &ConsensusRequest,
    contract: &Contract,
    dc: &dyn DidCrypto,
    tid: &str,
    block: &Block,
) -> Result<TransactionDetails, ConsensusError> {
    match &request.mode {
        TransactionMode::Transfer { sender, receiver }
        | TransactionMode::NftSale { sender, receiver } => {
            deliver_to_receiver(
                transport, wallet, config, request, contract, tid, block, sender, receiver,
            )
            .await
        }
        TransactionMode::DataCommit { .. } => {
            wallet
                .create_token_block(block)
                .map_err(|e| ConsensusError::Persistence {
                    reason: e.to_string(),
                })?;
            Ok(TransactionDetails {
                transaction_id: tid.to_string(),
                transaction_type: block.trans_type().to_string(),
                block_id: String::new(),
                mode: request.mode.kind(),
                sender_did: contract.sender_did().map(str::to_string),
                receiver_did: contract.receiver_did().map(str::to_string),
                deployer_did: None,
                executor_did: None,
                comment: contract.comment().to_string(),
                date_time: Utc::now(),
                status: true,
            })
        }
        TransactionMode::Deploy {
            smart_contract_token,
            ..
        } => {
            finalize_deploy(
                wallet,
                events,
                request,
                contract,
                dc,
                tid,
                block,
                smart_contract_token,
            )
            .await
        }
        TransactionMode::Execute {
            smart_contract_token,
            ..
        } => {
            finalize_execute(wallet, events, request, contract, tid, block, smart_contract_token)
                .await
        }
    }
}

/// Transfer / NFT-sale: delivery ke receiver lalu mutasi wallet sender.
#[allow(clippy::too_many_arguments)]
async fn deliver_to_receiver(
    transport: &dyn PeerTransport,
    wallet: &dyn TokenWallet,
    config: &ConsensusConfig,
    request: &ConsensusRequest,
    contract: &Contract,
    tid: &str,
    block: &Block,
    sender: &dtln_common::Address,
    receiver: &dtln_common::Address,
) -> Result<TransactionDetails, ConsensusError> {
    let token_info = contract.trans_token_info().to_vec();
    let receiver_peer =
        transport
            .open(receiver)
            .await
            .map_err(|e| ConsensusError::DeliveryFailed {
                reason: format!("receiver not connected: {}", e),
            })?;
    let send = SendTokenRequest {
        address: sender.to_string(),
        token_info: token_info.clone(),
        token_chain_block: block.to_bytes().map_err(|e| ConsensusError::BlockInvalid {
            reason: e.to_string(),
        })?,
        quorum_list: request.quorum_list.clone(),
    };
    let reply: BasicResponse = receiver_peer
        .send_request(
            routes::SEND_RECEIVER_TOKEN,
            &send,
            Duration::from_millis(config.rpc_timeout_ms),
        )
        .await
        .map_err(|e| ConsensusError::DeliveryFailed {
            reason: format!("unable to send tokens to receiver: {}", e),
        })?;
    if !reply.status {
        return Err(ConsensusError::DeliveryFailed {
            reason: format!("receiver refused tokens: {}", reply.message),
        });
    }
    // Handle receiver tertutup saat keluar scope.
    drop(receiver_peer);

    let sender_did = sender.did.as_str();
    wallet
        .tokens_transferred(sender_did, &token_info, block)
        .map_err(|e| ConsensusError::Persistence {
            reason: e.to_string(),
        })?;
    for ti in &token_info {
        if let Err(e) = wallet.unpin(&ti.token, PinRole::PrevSender, sender_did) {
            warn!(token = %ti.token, "failed to unpin transferred token: {}", e);
        }
    }
    if let Err(e) = wallet.run_gc() {
        warn!("content store gc failed: {}", e);
    }

    let first_token = token_info
        .first()
        .ok_or_else(|| ConsensusError::BlockInvalid {
            reason: "transfer contract carries no tokens".to_string(),
        })?;
    let block_id = block
        .block_id(&first_token.token)
        .map_err(|e| ConsensusError::BlockInvalid {
            reason: e.to_string(),
        })?;
    debug!(tid, %block_id, "tokens delivered to receiver");

    Ok(TransactionDetails {
        transaction_id: tid.to_string(),
        transaction_type: block.trans_type().to_string(),
        block_id,
        mode: request.mode.kind(),
        sender_did: Some(sender.did.clone()),
        receiver_did: Some(receiver.did.clone()),
        deployer_did: None,
        executor_did: None,
        comment: contract.comment().to_string(),
        date_time: Utc::now(),
        status: true,
    })
}

/// Deploy: chain baru + committed-tokens block + penguncian token backing.
#[allow(clippy::too_many_arguments)]
async fn finalize_deploy(
    wallet: &dyn TokenWallet,
    events: &dyn EventPublisher,
    request: &ConsensusRequest,
    contract: &Contract,
    dc: &dyn DidCrypto,
    tid: &str,
    block: &Block,
    smart_contract_token: &str,
) -> Result<TransactionDetails, ConsensusError> {
    let deployer_did = contract
        .deployer_did()
        .ok_or_else(|| ConsensusError::BlockInvalid {
            reason: "deploy contract carries no deployer did".to_string(),
        })?;

    wallet
        .add_token_block(smart_contract_token, block)
        .map_err(|e| ConsensusError::Persistence {
            reason: format!("smart contract token chain creation failed: {}", e),
        })?;
    wallet
        .update_smart_contract_status(smart_contract_token, TokenStatus::Deployed)
        .map_err(|e| ConsensusError::Persistence {
            reason: e.to_string(),
        })?;

    debug!(smart_contract_token, "creating committed tokens block");
    create_committed_tokens_block(wallet, block, smart_contract_token, dc)?;

    let committed =
        block
            .committed_token_details(smart_contract_token)
            .map_err(|e| ConsensusError::BlockInvalid {
                reason: e.to_string(),
            })?;
    wallet
        .commit_tokens(deployer_did, &committed)
        .map_err(|e| ConsensusError::Persistence {
            reason: e.to_string(),
        })?;

    let block_id =
        block
            .block_id(smart_contract_token)
            .map_err(|e| ConsensusError::BlockInvalid {
                reason: e.to_string(),
            })?;
    publish_event(
        events,
        NewContractEvent {
            smart_contract_token: smart_contract_token.to_string(),
            did: deployer_did.to_string(),
            kind: ContractEventKind::Deploy,
            block_hash: block_id.clone(),
        },
    );

    Ok(TransactionDetails {
        transaction_id: tid.to_string(),
        transaction_type: block.trans_type().to_string(),
        block_id,
        mode: request.mode.kind(),
        sender_did: None,
        receiver_did: None,
        deployer_did: Some(deployer_did.to_string()),
        executor_did: None,
        comment: contract.comment().to_string(),
        date_time: Utc::now(),
        status: true,
    })
}

/// Execute: chain baru + status executed + event.
async fn finalize_execute(
    wallet: &dyn TokenWallet,
    events: &dyn EventPublisher,
    request: &ConsensusRequest,
    contract: &Contract,
    tid: &str,
    block: &Block,
    smart_contract_token: &str,
) -> Result<TransactionDetails, ConsensusError> {
    let executor_did = contract
        .executor_did()
        .ok_or_else(|| ConsensusError::BlockInvalid {
            reason: "execute contract carries no executor did".to_string(),
        })?;

    wallet
        .add_token_block(smart_contract_token, block)
        .map_err(|e| ConsensusError::Persistence {
            reason: format!("smart contract token chain creation failed: {}", e),
        })?;
    wallet
        .update_smart_contract_status(smart_contract_token, TokenStatus::Executed)
        .map_err(|e| ConsensusError::Persistence {
            reason: e.to_string(),
        })?;

    let block_id =
        block
            .block_id(smart_contract_token)
            .map_err(|e| ConsensusError::BlockInvalid {
                reason: e.to_string(),
            })?;
    publish_event(
        events,
        NewContractEvent {
            smart_contract_token: smart_contract_token.to_string(),
            did: executor_did.to_string(),
            kind: ContractEventKind::Execute,
            block_hash: block_id.clone(),
        },
    );

    Ok(TransactionDetails {
        transaction_id: tid.to_string(),
        transaction_type: block.trans_type().to_string(),
        block_id,
        mode: request.mode.kind(),
        sender_did: None,
        receiver_did: None,
        deployer_did: None,
        executor_did: Some(executor_did.to_string()),
        comment: contract.comment().to_string(),
        date_time: Utc::now(),
        status: true,
    })
}

/// Block `TOKEN_CONTRACT_COMMITTED` yang mengunci token backing ke smart
/// contract, ditandatangani lokal dan dipersist.
fn create_committed_tokens_block(
    wallet: &dyn TokenWallet,
    new_block: &Block,
    smart_contract_token: &str,
    dc: &dyn DidCrypto,
) -> Result<(), ConsensusError> {
    let committed =
        new_block
            .committed_token_details(smart_contract_token)
            .map_err(|e| ConsensusError::BlockInvalid {
                reason: format!("error fetching committed token details: {}", e),
            })?;
    let sc_block_id =
        new_block
            .block_id(smart_contract_token)
            .map_err(|e| ConsensusError::BlockInvalid {
                reason: e.to_string(),
            })?;
    let sc_token_type =
        new_block
            .token_type(smart_contract_token)
            .map_err(|e| ConsensusError::BlockInvalid {
                reason: e.to_string(),
            })?;
    let ref_id = format!(
        "{},{},{}",
        smart_contract_token,
        sc_token_type.code(),
        sc_block_id
    );

    let mut ctcb = std::collections::BTreeMap::new();
    let mut tokens = Vec::new();
    for token in &committed {
        let detail = wallet
            .read_token(token)
            .map_err(|e| ConsensusError::Persistence {
                reason: e.to_string(),
            })?;
        let token_type = TokenType::rbt_for_value(detail.token_value);
        let latest =
            wallet
                .latest_block(token, token_type)
                .ok_or_else(|| ConsensusError::BlockInvalid {
                    reason: format!("failed to get latest block for token {}", token),
                })?;
        ctcb.insert(token.clone(), Some(latest));
        tokens.push(TransTokens {
            token: token.clone(),
            token_type,
            commited_did: None,
        });
    }

    let owner = new_block
        .deployer_did()
        .ok_or_else(|| ConsensusError::BlockInvalid {
            reason: "deploy block carries no deployer did".to_string(),
        })?;
    let tcb = TokenChainBlock {
        transaction_type: TOKEN_CONTRACT_COMMITTED.to_string(),
        token_owner: owner.to_string(),
        trans_info: TransInfo {
            comment: format!(
                "token committed at {} for smart contract token {}",
                Utc::now().to_rfc3339(),
                smart_contract_token
            ),
            ref_id: Some(ref_id),
            tokens,
            ..TransInfo::default()
        },
        ..TokenChainBlock::default()
    };
    let mut nb = Block::create_new(&ctcb, tcb).map_err(|e| ConsensusError::BlockInvalid {
        reason: format!("failed to create committed tokens block: {}", e),
    })?;
    nb.sign_with(dc).map_err(|e| ConsensusError::BlockInvalid {
        reason: format!("failed to sign committed tokens block: {}", e),
    })?;
    wallet
        .create_token_block(&nb)
        .map_err(|e| ConsensusError::Persistence {
            reason: e.to_string(),
        })?;
    Ok(())
}

/// Publikasi best-effort; kegagalan hanya di-log.
fn publish_event(events: &dyn EventPublisher, event: NewContractEvent) {
    if let Err(e) = events.publish(&event) {
        error!(
            token = %event.smart_contract_token,
            "failed to publish contract event: {}",
            e
        );
    }
}
