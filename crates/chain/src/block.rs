//! Token-chain block library.
//!
//! Setiap token memiliki hash chain sendiri. Satu transaksi menghasilkan satu
//! [`Block`] yang menjadi block terbaru pada chain SEMUA token yang
//! ditransaksikan; karena itu height dan previous-block-id disimpan per token.
//!
//! # Hash & Signature
//!
//! Hash block dihitung SEKALI saat [`Block::create_new`] atas serialisasi
//! kanonik dengan semua signature masih placeholder (string kosong).
//! [`Block::replace_signature`] mengisi placeholder tanpa mengubah hash,
//! sehingga validator menandatangani hash yang sama yang mereka lihat pada
//! draft.
//!
//! # Block Id
//!
//! `block_id(token) = "<height>-<hash>"`; unik per token karena height
//! mengikuti chain token tersebut.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use dtln_common::sha3_256_hex;

use crate::did::DidCrypto;
use crate::types::{TokenType, TOKEN_PLEDGED, TOKEN_UNPLEDGED};

// ════════════════════════════════════════════════════════════════════════════
// COMPOSITION TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Satu token yang ditransaksikan dalam block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransTokens {
    pub token: String,
    pub token_type: TokenType,
    /// DID pemilik token committed (hanya untuk genesis smart contract).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commited_did: Option<String>,
}

/// Info transaksi yang dibawa block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransInfo {
    #[serde(default)]
    pub comment: String,
    /// Transaction id (hex SHA3-256 atas contract block).
    #[serde(default)]
    pub tid: String,
    /// Referensi ke block lain, format `"<token>,<type-code>,<block-id>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_did: Option<String>,
    pub tokens: Vec<TransTokens>,
}

/// Info genesis untuk satu smart-contract token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisTokenInfo {
    pub token: String,
    /// Token RBT yang di-commit sebagai backing.
    pub commited_tokens: Vec<TransTokens>,
    /// Nilai agregat seluruh token backing.
    pub smart_contract_value: f64,
}

/// Genesis block smart contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisBlock {
    pub block_type: String,
    pub info: Vec<GenesisTokenInfo>,
}

/// Detail satu token yang dipledge validator untuk transaksi ini.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeDetail {
    pub token: String,
    pub token_type: TokenType,
    /// DID validator pemilik pledge.
    pub did: String,
    /// Block id terbaru pada chain token yang dipledge.
    pub token_block_id: String,
}

/// Isi block sebelum finalisasi (hash + chaining).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenChainBlock {
    pub transaction_type: String,
    pub token_owner: String,
    pub trans_info: TransInfo,
    /// Credit signature quorum dalam bentuk record terserialisasi.
    #[serde(default)]
    pub quorum_signature: Vec<String>,
    /// Contract block asal transaksi.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_contract: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_block: Option<GenesisBlock>,
    #[serde(default)]
    pub pledge_details: Vec<PledgeDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_contract_data: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════
// FINALIZED BLOCK
// ════════════════════════════════════════════════════════════════════════════

/// Block ter-finalisasi: isi + chaining per token + hash + signature map.
///
/// # Invariants
///
/// - `heights` dan `prev_ids` memiliki key yang sama dengan
///   `block.trans_info.tokens`.
/// - `signatures` memiliki satu entry per DID validator pledging; nilai
///   kosong berarti placeholder yang belum diganti.
/// - `hash` tidak pernah berubah setelah pembuatan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    block: TokenChainBlock,
    heights: BTreeMap<String, u64>,
    prev_ids: BTreeMap<String, String>,
    signatures: BTreeMap<String, String>,
    hash: String,
}

impl Block {
    /// Membangun block baru dari previous-chain map dan isi transaksi.
    ///
    /// `ctcb` memetakan token ke block terbaru pada chain token tersebut;
    /// `None` berarti genesis (belum ada chain).
    ///
    /// # Errors
    ///
    /// Gagal jika tidak ada token yang ditransaksikan, atau previous block
    /// yang diberikan tidak memuat token yang bersangkutan.
    pub fn create_new(
        ctcb: &BTreeMap<String, Option<Block>>,
        tcb: TokenChainBlock,
    ) -> Result<Block> {
        if tcb.trans_info.tokens.is_empty() {
            bail!("token chain block carries no transacted tokens");
        }
        let mut heights = BTreeMap::new();
        let mut prev_ids = BTreeMap::new();
        for tt in &tcb.trans_info.tokens {
            match ctcb.get(&tt.token).and_then(|prev| prev.as_ref()) {
                Some(prev) => {
                    let prev_height = prev
                        .height_of(&tt.token)
                        .ok_or_else(|| anyhow!("previous block does not contain token {}", tt.token))?;
                    heights.insert(tt.token.clone(), prev_height + 1);
                    prev_ids.insert(tt.token.clone(), prev.block_id(&tt.token)?);
                }
                None => {
                    heights.insert(tt.token.clone(), 0);
                    prev_ids.insert(tt.token.clone(), String::new());
                }
            }
        }

        // Placeholder signature per DID validator pledging.
        let mut signatures = BTreeMap::new();
        for pd in &tcb.pledge_details {
            signatures.insert(pd.did.clone(), String::new());
        }

        let payload = serde_json::to_vec(&(&tcb, &heights, &prev_ids, &signatures))?;
        let hash = sha3_256_hex(&payload);

        Ok(Block {
            block: tcb,
            heights,
            prev_ids,
            signatures,
            hash,
        })
    }

    /// Decode block dari bytes (serialisasi JSON kanonik).
    pub fn from_bytes(bytes: &[u8]) -> Result<Block> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialisasi kanonik block.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Block id untuk satu token: `"<height>-<hash>"`.
    pub fn block_id(&self, token: &str) -> Result<String> {
        let height = self
            .heights
            .get(token)
            .ok_or_else(|| anyhow!("block does not contain token {}", token))?;
        Ok(format!("{}-{}", height, self.hash))
    }

    /// Height chain token dalam block ini.
    #[must_use]
    pub fn height_of(&self, token: &str) -> Option<u64> {
        self.heights.get(token).copied()
    }

    /// Block id previous pada chain token; kosong untuk genesis.
    #[must_use]
    pub fn prev_block_id(&self, token: &str) -> Option<&str> {
        self.prev_ids.get(token).map(String::as_str)
    }

    /// Hash block (hex).
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Transaction type block.
    #[must_use]
    pub fn trans_type(&self) -> &str {
        &self.block.transaction_type
    }

    /// Pemilik block.
    #[must_use]
    pub fn token_owner(&self) -> &str {
        &self.block.token_owner
    }

    /// DID deployer bila ada.
    #[must_use]
    pub fn deployer_did(&self) -> Option<&str> {
        self.block.trans_info.deployer_did.as_deref()
    }

    /// Akses isi block.
    #[must_use]
    pub fn contents(&self) -> &TokenChainBlock {
        &self.block
    }

    /// Jenis token untuk satu token dalam block.
    pub fn token_type(&self, token: &str) -> Result<TokenType> {
        self.block
            .trans_info
            .tokens
            .iter()
            .find(|tt| tt.token == token)
            .map(|tt| tt.token_type)
            .ok_or_else(|| anyhow!("block does not contain token {}", token))
    }

    /// Mengganti placeholder signature milik `did`.
    ///
    /// # Errors
    ///
    /// DID yang tidak memiliki placeholder adalah error; signature untuk
    /// pihak yang tidak dikenal tidak boleh masuk ke block.
    pub fn replace_signature(&mut self, did: &str, signature_hex: &str) -> Result<()> {
        match self.signatures.get_mut(did) {
            Some(slot) => {
                *slot = signature_hex.to_string();
                Ok(())
            }
            None => bail!("no signature placeholder for did {}", did),
        }
    }

    /// Signature (hex) milik satu DID, bila ada.
    #[must_use]
    pub fn signature_of(&self, did: &str) -> Option<&str> {
        self.signatures.get(did).map(String::as_str)
    }

    /// Benar jika masih ada placeholder signature kosong.
    #[must_use]
    pub fn has_unsigned_placeholders(&self) -> bool {
        self.signatures.values().any(String::is_empty)
    }

    /// Menandatangani hash block secara lokal dengan DID crypto initiator.
    ///
    /// Dipakai untuk block yang tidak melalui quorum (committed-tokens
    /// block): menambahkan entry signature untuk DID penandatangan.
    pub fn sign_with(&mut self, dc: &dyn DidCrypto) -> Result<()> {
        let sig = dc.sign(self.hash.as_bytes())?;
        self.signatures.insert(dc.did().to_string(), hex::encode(sig));
        Ok(())
    }

    /// Daftar token committed dalam genesis info smart-contract token.
    pub fn committed_token_details(&self, sc_token: &str) -> Result<Vec<String>> {
        let gb = self
            .block
            .genesis_block
            .as_ref()
            .ok_or_else(|| anyhow!("block has no genesis info"))?;
        let info = gb
            .info
            .iter()
            .find(|gi| gi.token == sc_token)
            .ok_or_else(|| anyhow!("no genesis info for token {}", sc_token))?;
        Ok(info
            .commited_tokens
            .iter()
            .map(|tt| tt.token.clone())
            .collect())
    }

    /// Benar jika block ini adalah pledge.
    #[must_use]
    pub fn is_pledged(&self) -> bool {
        self.block.transaction_type == TOKEN_PLEDGED
    }

    /// Benar jika block ini adalah unpledge.
    #[must_use]
    pub fn is_unpledged(&self) -> bool {
        self.block.transaction_type == TOKEN_UNPLEDGED
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::did::Ed25519Did;
    use crate::types::{TOKEN_GENERATED, TOKEN_TRANSFERRED};

    fn simple_tcb(tokens: &[&str], trans_type: &str) -> TokenChainBlock {
        TokenChainBlock {
            transaction_type: trans_type.to_string(),
            token_owner: "did-owner".to_string(),
            trans_info: TransInfo {
                comment: "test".to_string(),
                tid: "tid-1".to_string(),
                tokens: tokens
                    .iter()
                    .map(|t| TransTokens {
                        token: (*t).to_string(),
                        token_type: TokenType::Rbt,
                        commited_did: None,
                    })
                    .collect(),
                ..TransInfo::default()
            },
            ..TokenChainBlock::default()
        }
    }

    fn genesis_block(tokens: &[&str]) -> Block {
        let ctcb = tokens
            .iter()
            .map(|t| ((*t).to_string(), None))
            .collect::<BTreeMap<_, _>>();
        Block::create_new(&ctcb, simple_tcb(tokens, TOKEN_GENERATED)).expect("genesis")
    }

    #[test]
    fn test_create_new_genesis_heights() {
        let blk = genesis_block(&["t1", "t2"]);
        assert_eq!(blk.height_of("t1"), Some(0));
        assert_eq!(blk.height_of("t2"), Some(0));
        assert_eq!(blk.prev_block_id("t1"), Some(""));
        let id = blk.block_id("t1").expect("id");
        assert!(id.starts_with("0-"));
        assert_eq!(id, format!("0-{}", blk.hash()));
    }

    #[test]
    fn test_create_new_chains_heights() {
        let prev = genesis_block(&["t1"]);
        let mut ctcb = BTreeMap::new();
        ctcb.insert("t1".to_string(), Some(prev.clone()));
        let next =
            Block::create_new(&ctcb, simple_tcb(&["t1"], TOKEN_TRANSFERRED)).expect("next block");
        assert_eq!(next.height_of("t1"), Some(1));
        assert_eq!(
            next.prev_block_id("t1"),
            Some(prev.block_id("t1").expect("prev id").as_str())
        );
    }

    #[test]
    fn test_create_new_rejects_empty_tokens() {
        let tcb = simple_tcb(&[], TOKEN_TRANSFERRED);
        assert!(Block::create_new(&BTreeMap::new(), tcb).is_err());
    }

    #[test]
    fn test_signature_placeholders_from_pledge_details() {
        let mut tcb = simple_tcb(&["t1"], TOKEN_TRANSFERRED);
        tcb.pledge_details = vec![
            PledgeDetail {
                token: "p1".to_string(),
                token_type: TokenType::Rbt,
                did: "did-v1".to_string(),
                token_block_id: "0-abc".to_string(),
            },
            PledgeDetail {
                token: "p2".to_string(),
                token_type: TokenType::Rbt,
                did: "did-v2".to_string(),
                token_block_id: "0-def".to_string(),
            },
        ];
        let mut ctcb = BTreeMap::new();
        ctcb.insert("t1".to_string(), None);
        let mut blk = Block::create_new(&ctcb, tcb).expect("block");
        assert!(blk.has_unsigned_placeholders());
        assert_eq!(blk.signature_of("did-v1"), Some(""));

        let hash_before = blk.hash().to_string();
        blk.replace_signature("did-v1", "aabb").expect("replace");
        blk.replace_signature("did-v2", "ccdd").expect("replace");
        assert!(!blk.has_unsigned_placeholders());
        assert_eq!(blk.signature_of("did-v1"), Some("aabb"));
        // Hash tidak berubah karena dihitung atas placeholder kosong.
        assert_eq!(blk.hash(), hash_before);
    }

    #[test]
    fn test_replace_signature_unknown_did() {
        let mut blk = genesis_block(&["t1"]);
        assert!(blk.replace_signature("did-stranger", "aa").is_err());
    }

    #[test]
    fn test_round_trip_bytes() {
        let blk = genesis_block(&["t1", "t2"]);
        let bytes = blk.to_bytes().expect("bytes");
        let back = Block::from_bytes(&bytes).expect("decode");
        assert_eq!(back, blk);
    }

    #[test]
    fn test_pledged_type_checks() {
        let pledged = {
            let mut ctcb = BTreeMap::new();
            ctcb.insert("t1".to_string(), None);
            Block::create_new(&ctcb, simple_tcb(&["t1"], TOKEN_PLEDGED)).expect("block")
        };
        assert!(pledged.is_pledged());
        assert!(!pledged.is_unpledged());
        assert!(!genesis_block(&["t1"]).is_pledged());
    }

    #[test]
    fn test_sign_with_local_did() {
        let dc = Ed25519Did::from_seed("did-initiator", [7u8; 32]).expect("did");
        let mut blk = genesis_block(&["t1"]);
        blk.sign_with(&dc).expect("sign");
        let sig = blk.signature_of("did-initiator").expect("entry");
        assert!(!sig.is_empty());
    }

    #[test]
    fn test_committed_token_details() {
        let mut tcb = simple_tcb(&["sc-token"], TOKEN_GENERATED);
        tcb.genesis_block = Some(GenesisBlock {
            block_type: TOKEN_GENERATED.to_string(),
            info: vec![GenesisTokenInfo {
                token: "sc-token".to_string(),
                commited_tokens: vec![
                    TransTokens {
                        token: "r1".to_string(),
                        token_type: TokenType::Rbt,
                        commited_did: Some("did-deployer".to_string()),
                    },
                    TransTokens {
                        token: "r2".to_string(),
                        token_type: TokenType::PartRbt,
                        commited_did: Some("did-deployer".to_string()),
                    },
                ],
                smart_contract_value: 1.5,
            }],
        });
        let mut ctcb = BTreeMap::new();
        ctcb.insert("sc-token".to_string(), None);
        let blk = Block::create_new(&ctcb, tcb).expect("block");
        assert_eq!(
            blk.committed_token_details("sc-token").expect("details"),
            vec!["r1".to_string(), "r2".to_string()]
        );
        assert!(blk.committed_token_details("other").is_err());
    }
}
