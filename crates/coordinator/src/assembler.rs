//! Block Assembler.
//!
//! Dipanggil initiator tepat sekali setelah barrier terpenuhi: menyusun
//! token-chain block bertipe dari contract + pledge details, mengumpulkan
//! signature seluruh validator pledging, lalu memerintahkan mereka
//! meng-commit pledge.
//!
//! # Ordering Rule
//!
//! SELURUH `SIGNATURE_REQUEST` harus selesai sebelum `UPDATE_PLEDGE_TOKEN`
//! pertama dikirim: block yang dipersist validator harus sudah membawa semua
//! signature.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use dtln_chain::{
    Block, GenesisBlock, GenesisTokenInfo, TokenChainBlock, TokenType, TokenWallet, TransInfo,
    TransTokens, PledgeDetail, TOKEN_COMMITTED, TOKEN_GENERATED, TOKEN_TRANSFERRED,
};
use dtln_common::round_token_amount;

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::registry::Registry;
use crate::transport::Peer;
use crate::types::{
    routes, BasicResponse, ConsensusRequest, SignatureReply, SignatureRequest, TransactionMode,
    UpdatePledgeRequest,
};

/// Hasil assembly: block final + peta token pledge per validator.
pub(crate) struct AssembledRound {
    pub block: Block,
    pub pledged_tokens: BTreeMap<String, Vec<String>>,
}

/// Susun block, kumpulkan signature, lalu commit pledge.
pub(crate) async fn assemble_and_commit(
    registry: &Registry,
    wallet: &dyn TokenWallet,
    config: &ConsensusConfig,
    request: &ConsensusRequest,
    contract: &dtln_chain::Contract,
    tid: &str,
) -> Result<AssembledRound, ConsensusError> {
    let req_id = request.req_id.as_str();

    // Snapshot konsisten; mutasi pledge oleh dial yang masih berjalan tidak
    // memengaruhi ronde ini.
    let (credits, peers) =
        registry.with_state(req_id, |st| (st.credit.clone(), st.peers.clone()))?;
    let (pledged_tokens, pledged_blocks) = registry.with_pledge(req_id, |pd| {
        (pd.pledged_tokens.clone(), pd.pledged_blocks.clone())
    })?;

    // Credit quorum menjadi record terserialisasi dalam block.
    let mut quorum_signature = Vec::with_capacity(credits.len());
    for csig in &credits {
        let record = serde_json::to_string(csig).map_err(|e| ConsensusError::BlockInvalid {
            reason: format!("failed to serialize quorum credit: {}", e),
        })?;
        quorum_signature.push(record);
    }

    // Pledge detail per (validator, token) dari block yang disaksikan saat
    // solicitasi.
    let mut pledge_details = Vec::new();
    for (did, tokens) in &pledged_tokens {
        for token in tokens {
            let bytes =
                pledged_blocks
                    .get(token)
                    .ok_or_else(|| ConsensusError::BlockInvalid {
                        reason: format!("missing pledged block for token {}", token),
                    })?;
            let witness = Block::from_bytes(bytes).map_err(|e| ConsensusError::BlockInvalid {
                reason: format!("invalid pledged block for token {}: {}", token, e),
            })?;
            let token_type =
                witness
                    .token_type(token)
                    .map_err(|e| ConsensusError::BlockInvalid {
                        reason: e.to_string(),
                    })?;
            let token_block_id =
                witness
                    .block_id(token)
                    .map_err(|e| ConsensusError::BlockInvalid {
                        reason: e.to_string(),
                    })?;
            pledge_details.push(PledgeDetail {
                token: token.clone(),
                token_type,
                did: did.clone(),
                token_block_id,
            });
        }
    }

    let tcb = compose_block(request, contract, tid, quorum_signature, pledge_details)?;
    let ctcb = previous_chain_map(request, contract, wallet);
    let mut draft = Block::create_new(&ctcb, tcb).map_err(|e| ConsensusError::BlockInvalid {
        reason: format!("failed to create new token chain block: {}", e),
    })?;

    collect_signatures(config, &pledged_tokens, &peers, &mut draft).await?;
    commit_pledges(config, request, &pledged_tokens, &peers, &draft).await?;

    Ok(AssembledRound {
        block: draft,
        pledged_tokens,
    })
}

/// Peta previous-chain per mode.
fn previous_chain_map(
    request: &ConsensusRequest,
    contract: &dtln_chain::Contract,
    wallet: &dyn TokenWallet,
) -> BTreeMap<String, Option<Block>> {
    let mut ctcb = BTreeMap::new();
    match &request.mode {
        TransactionMode::Deploy {
            smart_contract_token,
            ..
        } => {
            // Genesis: belum ada chain untuk smart-contract token.
            ctcb.insert(smart_contract_token.clone(), None);
        }
        TransactionMode::Execute {
            smart_contract_token,
            ..
        } => {
            let latest = wallet.latest_block(smart_contract_token, TokenType::SmartContract);
            ctcb.insert(smart_contract_token.clone(), latest);
        }
        _ => {
            for ti in contract.trans_token_info() {
                let latest = wallet.latest_block(&ti.token, ti.token_type);
                ctcb.insert(ti.token.clone(), latest);
            }
        }
    }
    ctcb
}

/// Komposisi `TokenChainBlock` per mode transaksi.
fn compose_block(
    request: &ConsensusRequest,
    contract: &dtln_chain::Contract,
    tid: &str,
    quorum_signature: Vec<String>,
    pledge_details: Vec<PledgeDetail>,
) -> Result<TokenChainBlock, ConsensusError> {
    let base_info = TransInfo {
        comment: contract.comment().to_string(),
        tid: tid.to_string(),
        ..TransInfo::default()
    };

    let tcb = match &request.mode {
        TransactionMode::Deploy {
            smart_contract_token,
            ..
        } => {
            let deployer_did =
                contract
                    .deployer_did()
                    .ok_or_else(|| ConsensusError::BlockInvalid {
                        reason: "deploy contract carries no deployer did".to_string(),
                    })?;
            let mut committed = Vec::new();
            let mut smart_contract_value = 0.0;
            for ti in contract.committed_tokens_info() {
                committed.push(TransTokens {
                    token: ti.token.clone(),
                    token_type: ti.token_type,
                    commited_did: Some(ti.owner_did.clone()),
                });
                smart_contract_value = round_token_amount(smart_contract_value + ti.token_value);
            }
            let genesis = GenesisBlock {
                block_type: TOKEN_GENERATED.to_string(),
                info: vec![GenesisTokenInfo {
                    token: smart_contract_token.clone(),
                    commited_tokens: committed,
                    smart_contract_value,
                }],
            };
            TokenChainBlock {
                transaction_type: TOKEN_GENERATED.to_string(),
                token_owner: deployer_did.to_string(),
                trans_info: TransInfo {
                    deployer_did: Some(deployer_did.to_string()),
                    tokens: vec![TransTokens {
                        token: smart_contract_token.clone(),
                        token_type: TokenType::SmartContract,
                        commited_did: None,
                    }],
                    ..base_info
                },
                quorum_signature,
                smart_contract: Some(contract.block().to_vec()),
                genesis_block: Some(genesis),
                pledge_details,
                ..TokenChainBlock::default()
            }
        }
        TransactionMode::Execute {
            smart_contract_token,
            ..
        } => {
            let executor_did =
                contract
                    .executor_did()
                    .ok_or_else(|| ConsensusError::BlockInvalid {
                        reason: "execute contract carries no executor did".to_string(),
                    })?;
            TokenChainBlock {
                transaction_type: TOKEN_GENERATED.to_string(),
                token_owner: executor_did.to_string(),
                trans_info: TransInfo {
                    executor_did: Some(executor_did.to_string()),
                    tokens: vec![TransTokens {
                        token: smart_contract_token.clone(),
                        token_type: TokenType::SmartContract,
                        commited_did: None,
                    }],
                    ..base_info
                },
                quorum_signature,
                smart_contract: Some(contract.block().to_vec()),
                pledge_details,
                smart_contract_data: contract.smart_contract_data().map(str::to_string),
                ..TokenChainBlock::default()
            }
        }
        mode => {
            let transaction_type = match mode.kind() {
                crate::types::TransactionKind::DataCommit => TOKEN_COMMITTED,
                _ => TOKEN_TRANSFERRED,
            };
            let owner = contract.receiver_did().unwrap_or_default();
            TokenChainBlock {
                transaction_type: transaction_type.to_string(),
                token_owner: owner.to_string(),
                trans_info: TransInfo {
                    sender_did: contract.sender_did().map(str::to_string),
                    receiver_did: contract.receiver_did().map(str::to_string),
                    tokens: contract
                        .trans_token_info()
                        .iter()
                        .map(|ti| TransTokens {
                            token: ti.token.clone(),
                            token_type: ti.token_type,
                            commited_did: None,
                        })
                        .collect(),
                    ..base_info
                },
                quorum_signature,
                smart_contract: Some(contract.block().to_vec()),
                pledge_details,
                ..TokenChainBlock::default()
            }
        }
    };
    Ok(tcb)
}

/// Kumpulkan signature SEMUA validator pledging atas draft.
async fn collect_signatures(
    config: &ConsensusConfig,
    pledged_tokens: &BTreeMap<String, Vec<String>>,
    peers: &std::collections::HashMap<String, Arc<Peer>>,
    draft: &mut Block,
) -> Result<(), ConsensusError> {
    let draft_bytes = draft.to_bytes().map_err(|e| ConsensusError::BlockInvalid {
        reason: e.to_string(),
    })?;
    let request = SignatureRequest {
        token_chain_block: draft_bytes,
    };
    for did in pledged_tokens.keys() {
        let peer = peers.get(did).ok_or_else(|| ConsensusError::SignatureFailed {
            did: did.clone(),
            reason: "no open peer handle for pledged validator".to_string(),
        })?;
        let reply: SignatureReply = peer
            .send_request(
                routes::SIGNATURE_REQUEST,
                &request,
                Duration::from_millis(config.rpc_timeout_ms),
            )
            .await
            .map_err(|e| ConsensusError::SignatureFailed {
                did: did.clone(),
                reason: e.to_string(),
            })?;
        if !reply.status {
            error!(did = %did, message = %reply.message, "validator refused signature");
            return Err(ConsensusError::SignatureFailed {
                did: did.clone(),
                reason: reply.message,
            });
        }
        draft
            .replace_signature(did, &reply.signature)
            .map_err(|e| ConsensusError::BlockInvalid {
                reason: e.to_string(),
            })?;
        debug!(did = %did, "signature collected");
    }
    Ok(())
}

/// Commit pledge ke setiap validator dengan block final.
async fn commit_pledges(
    config: &ConsensusConfig,
    request: &ConsensusRequest,
    pledged_tokens: &BTreeMap<String, Vec<String>>,
    peers: &std::collections::HashMap<String, Arc<Peer>>,
    finalized: &Block,
) -> Result<(), ConsensusError> {
    let block_bytes = finalized
        .to_bytes()
        .map_err(|e| ConsensusError::BlockInvalid {
            reason: e.to_string(),
        })?;
    for (did, tokens) in pledged_tokens {
        let peer = peers.get(did).ok_or_else(|| ConsensusError::PledgeFailed {
            reason: format!("no open peer handle for pledged validator {}", did),
        })?;
        let update = UpdatePledgeRequest {
            mode: request.mode.kind(),
            pledged_tokens: tokens.clone(),
            token_chain_block: block_bytes.clone(),
        };
        let reply: BasicResponse = peer
            .send_request(
                routes::UPDATE_PLEDGE_TOKEN,
                &update,
                Duration::from_millis(config.rpc_timeout_ms),
            )
            .await
            .map_err(|e| ConsensusError::PledgeFailed {
                reason: format!("failed to update pledge on {}: {}", did, e),
            })?;
        if !reply.status {
            error!(did = %did, message = %reply.message, "validator refused pledge update");
            return Err(ConsensusError::PledgeFailed {
                reason: format!("pledge update refused by {}: {}", did, reply.message),
            });
        }
    }
    Ok(())
}
