//! Transfer contract: payload yang ditandatangani caller sebelum ronde
//! konsensus dimulai.
//!
//! Contract dibawa dalam bentuk bytes kanonik; transaction id adalah
//! SHA3-256 atas bytes tersebut, jadi bytes TIDAK BOLEH di-serialize ulang
//! setelah dibuat.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::TokenInfo;

/// Isi contract yang ditandatangani caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractData {
    /// Token yang ditransaksikan (transfer / commit / smart-contract token).
    pub trans_tokens: Vec<TokenInfo>,
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
    /// Total nilai RBT yang terlibat (dipakai mode execute).
    #[serde(default)]
    pub total_rbts: f64,
    /// Token RBT yang di-commit sebagai backing smart contract (mode deploy).
    #[serde(default)]
    pub committed_tokens: Vec<TokenInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_contract_data: Option<String>,
    /// Signature caller (hex) atas isi contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Contract ter-serialisasi dengan akses bertipe ke isinya.
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    bytes: Vec<u8>,
    data: ContractData,
}

impl Contract {
    /// Membuat contract baru dari isi bertipe (serialisasi kanonik sekali).
    pub fn new(data: ContractData) -> Result<Self> {
        let bytes = serde_json::to_vec(&data).context("failed to serialize contract")?;
        Ok(Self { bytes, data })
    }

    /// Decode contract dari bytes kanonik; bytes asli dipertahankan.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let data: ContractData =
            serde_json::from_slice(bytes).context("failed to decode contract")?;
        Ok(Self {
            bytes: bytes.to_vec(),
            data,
        })
    }

    /// Bytes kanonik contract (basis transaction id).
    #[must_use]
    pub fn block(&self) -> &[u8] {
        &self.bytes
    }

    /// Token yang ditransaksikan.
    #[must_use]
    pub fn trans_token_info(&self) -> &[TokenInfo] {
        &self.data.trans_tokens
    }

    #[must_use]
    pub fn sender_did(&self) -> Option<&str> {
        self.data.sender_did.as_deref()
    }

    #[must_use]
    pub fn receiver_did(&self) -> Option<&str> {
        self.data.receiver_did.as_deref()
    }

    #[must_use]
    pub fn deployer_did(&self) -> Option<&str> {
        self.data.deployer_did.as_deref()
    }

    #[must_use]
    pub fn executor_did(&self) -> Option<&str> {
        self.data.executor_did.as_deref()
    }

    #[must_use]
    pub fn comment(&self) -> &str {
        &self.data.comment
    }

    #[must_use]
    pub fn total_rbts(&self) -> f64 {
        self.data.total_rbts
    }

    /// Token backing smart contract (mode deploy).
    #[must_use]
    pub fn committed_tokens_info(&self) -> &[TokenInfo] {
        &self.data.committed_tokens
    }

    #[must_use]
    pub fn smart_contract_data(&self) -> Option<&str> {
        self.data.smart_contract_data.as_deref()
    }
}
