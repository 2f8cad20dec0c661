//! Wire types ronde konsensus.
//!
//! Semua body RPC initiator <-> validator/receiver didefinisikan di sini.
//! [`ConsensusRequest`] WAJIB round-trip byte-for-byte melalui serde, karena
//! validator menandatangani hash atas payload yang mereka terima.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dtln_chain::TokenInfo;
use dtln_common::Address;

// ════════════════════════════════════════════════════════════════════════════
// ROUTES
// ════════════════════════════════════════════════════════════════════════════

/// Route RPC yang dikonsumsi initiator (semua POST JSON).
pub mod routes {
    /// Minta collateral pledge dari validator.
    pub const REQ_PLEDGE_TOKEN: &str = "/req_pledge_token";
    /// Jalankan konsensus validator atas contract.
    pub const QUORUM_CONSENSUS: &str = "/quorum_consensus";
    /// Minta signature atas block ter-finalisasi.
    pub const SIGNATURE_REQUEST: &str = "/signature_request";
    /// Commit pledge pada validator.
    pub const UPDATE_PLEDGE_TOKEN: &str = "/update_pledge_token";
    /// Kirim token ke receiver.
    pub const SEND_RECEIVER_TOKEN: &str = "/send_receiver_token";
    /// Kirim credit receipt pasca ronde.
    pub const QUORUM_CREDIT: &str = "/quorum_credit";
}

// ════════════════════════════════════════════════════════════════════════════
// TRANSACTION MODE
// ════════════════════════════════════════════════════════════════════════════

/// Jenis transaksi (discriminant dari [`TransactionMode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    NftSale,
    DataCommit,
    Deploy,
    Execute,
}

/// Mode transaksi; setiap variant hanya membawa field yang dibutuhkannya.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionMode {
    /// Transfer token RBT sender -> receiver.
    Transfer { sender: Address, receiver: Address },
    /// Penjualan NFT; alur sama dengan transfer.
    NftSale { sender: Address, receiver: Address },
    /// Commit data token oleh committer.
    DataCommit { committer: Address },
    /// Deploy smart-contract token baru.
    Deploy {
        deployer: Address,
        smart_contract_token: String,
    },
    /// Eksekusi smart contract yang sudah ter-deploy.
    Execute {
        executor: Address,
        smart_contract_token: String,
    },
}

impl TransactionMode {
    /// Discriminant mode.
    #[must_use]
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionMode::Transfer { .. } => TransactionKind::Transfer,
            TransactionMode::NftSale { .. } => TransactionKind::NftSale,
            TransactionMode::DataCommit { .. } => TransactionKind::DataCommit,
            TransactionMode::Deploy { .. } => TransactionKind::Deploy,
            TransactionMode::Execute { .. } => TransactionKind::Execute,
        }
    }

    /// Smart-contract token id untuk mode deploy/execute.
    #[must_use]
    pub fn smart_contract_token(&self) -> Option<&str> {
        match self {
            TransactionMode::Deploy {
                smart_contract_token,
                ..
            }
            | TransactionMode::Execute {
                smart_contract_token,
                ..
            } => Some(smart_contract_token),
            _ => None,
        }
    }
}

/// Peran quorum. Saat ini hanya `Alpha` yang ikut pledge collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumRole {
    Alpha,
    Beta,
    Gamma,
}

// ════════════════════════════════════════════════════════════════════════════
// CONSENSUS WIRE TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Payload konsensus yang dikirim ke setiap validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRequest {
    /// Request id opaque, unik per ronde.
    pub req_id: String,
    /// Mode transaksi beserta pihak-pihaknya.
    pub mode: TransactionMode,
    /// Contract block ter-serialisasi.
    pub contract_block: Vec<u8>,
    /// Quorum terpilih; diisi initiator sebelum fan-out.
    pub quorum_list: Vec<String>,
}

/// Balasan konsensus validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReply {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub share_sig: Vec<u8>,
    #[serde(default)]
    pub priv_sig: Vec<u8>,
}

/// Balasan generik status + message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicResponse {
    pub status: bool,
    #[serde(default)]
    pub message: String,
}

// ════════════════════════════════════════════════════════════════════════════
// PLEDGE WIRE TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Permintaan collateral ke satu validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PledgeRequest {
    /// Nilai token yang diminta dari validator ini.
    pub tokens_required: f64,
}

/// Balasan pledge: tiga list paralel (token, nilai, chain block terbaru).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PledgeReply {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub token_value: Vec<f64>,
    #[serde(default)]
    pub token_chain_block: Vec<Vec<u8>>,
}

/// Commit pledge ke validator setelah block final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePledgeRequest {
    pub mode: TransactionKind,
    pub pledged_tokens: Vec<String>,
    pub token_chain_block: Vec<u8>,
}

// ════════════════════════════════════════════════════════════════════════════
// SIGNATURE WIRE TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Permintaan signature atas draft block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub token_chain_block: Vec<u8>,
}

/// Balasan signature validator (hex).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureReply {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub signature: String,
}

// ════════════════════════════════════════════════════════════════════════════
// RECEIVER DELIVERY
// ════════════════════════════════════════════════════════════════════════════

/// Pengiriman token ke receiver setelah ronde sukses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTokenRequest {
    /// Alamat sender dalam bentuk kanonik `peer.did`.
    pub address: String,
    pub token_info: Vec<TokenInfo>,
    pub token_chain_block: Vec<u8>,
    pub quorum_list: Vec<String>,
}

// ════════════════════════════════════════════════════════════════════════════
// CREDIT
// ════════════════════════════════════════════════════════════════════════════

/// Attestation satu validator dari konsensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSignature {
    /// Share signature (hex).
    pub signature: String,
    /// Private signature (hex).
    pub priv_signature: String,
    /// DID validator.
    pub did: String,
    /// Hash yang ditandatangani.
    pub hash: String,
}

/// Agregat credit seluruh quorum; dikirim balik sebagai receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditScore {
    pub credit: Vec<CreditSignature>,
}

// ════════════════════════════════════════════════════════════════════════════
// TRANSACTION DETAILS
// ════════════════════════════════════════════════════════════════════════════

/// Record hasil ronde yang dikembalikan ke caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    /// Transaction id (hex SHA3-256 atas contract block).
    pub transaction_id: String,
    pub transaction_type: String,
    /// Block id baru; kosong untuk data-commit.
    #[serde(default)]
    pub block_id: String,
    pub mode: TransactionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_did: Option<String>,
    #[serde(default)]
    pub comment: String,
    pub date_time: DateTime<Utc>,
    pub status: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
