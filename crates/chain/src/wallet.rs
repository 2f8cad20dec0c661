//! Wallet store: token, chain, dan pin milik node ini.
//!
//! [`TokenWallet`] adalah kontrak yang dipakai coordinator; engine persistence
//! yang sebenarnya berada di luar crate ini. [`MemoryWallet`] adalah
//! implementasi in-memory lengkap, dipakai node uji dan seluruh test suite.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::block::Block;
use crate::types::{TokenInfo, TokenStatus, TokenType};

// ════════════════════════════════════════════════════════════════════════════
// ERROR TYPE
// ════════════════════════════════════════════════════════════════════════════

/// Error operasi wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Token tidak ditemukan dalam store.
    TokenNotFound(String),
    /// DID tidak terdaftar.
    DidNotFound(String),
    /// Chain token belum ada.
    ChainMissing(String),
    /// Kegagalan storage engine.
    Storage(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::TokenNotFound(t) => write!(f, "token not found: {}", t),
            WalletError::DidNotFound(d) => write!(f, "did not registered: {}", d),
            WalletError::ChainMissing(t) => write!(f, "token chain missing: {}", t),
            WalletError::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

// ════════════════════════════════════════════════════════════════════════════
// SUPPORTING TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Peran pin konten token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    /// Pin sebagai pemilik saat ini.
    Owner,
    /// Pin sisa peran pengirim sebelumnya.
    PrevSender,
}

/// Row token dalam store.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenDetail {
    pub token: String,
    pub token_type: TokenType,
    pub token_value: f64,
    pub owner_did: String,
    pub status: TokenStatus,
}

// ════════════════════════════════════════════════════════════════════════════
// WALLET TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Kontrak wallet store yang dipakai quorum coordinator.
///
/// Semua operasi synchronous; engine persistence di baliknya bebas.
pub trait TokenWallet: Send + Sync {
    /// Benar jika DID terdaftar pada node ini.
    fn is_did_registered(&self, did: &str) -> bool;

    /// Membaca row token.
    fn read_token(&self, token: &str) -> Result<TokenDetail, WalletError>;

    /// Block terbaru pada chain token, bila chain ada.
    fn latest_block(&self, token: &str, token_type: TokenType) -> Option<Block>;

    /// Append block ke chain SATU token (membuat chain bila belum ada).
    fn add_token_block(&self, token: &str, block: &Block) -> Result<(), WalletError>;

    /// Append block ke chain SEMUA token yang ditransaksikan block tersebut.
    fn create_token_block(&self, block: &Block) -> Result<(), WalletError>;

    /// Menandai token sudah ditransfer keluar dan meng-append block baru.
    fn tokens_transferred(
        &self,
        sender_did: &str,
        tokens: &[TokenInfo],
        block: &Block,
    ) -> Result<(), WalletError>;

    /// Mengunci token committed ke deployer (status `Committed`).
    fn commit_tokens(&self, deployer_did: &str, tokens: &[String]) -> Result<(), WalletError>;

    /// Update status smart-contract token (deployed / executed).
    fn update_smart_contract_status(
        &self,
        token: &str,
        status: TokenStatus,
    ) -> Result<(), WalletError>;

    /// Melepas pin konten token untuk satu peran.
    fn unpin(&self, token: &str, role: PinRole, did: &str) -> Result<(), WalletError>;

    /// Garbage-collect content store setelah unpin.
    fn run_gc(&self) -> Result<(), WalletError>;
}

// ════════════════════════════════════════════════════════════════════════════
// MEMORY WALLET
// ════════════════════════════════════════════════════════════════════════════

/// Wallet store in-memory.
///
/// # Thread Safety
///
/// Semua state di balik `parking_lot::RwLock`; aman dipakai lintas task.
#[derive(Default)]
pub struct MemoryWallet {
    dids: RwLock<HashSet<String>>,
    tokens: RwLock<HashMap<String, TokenDetail>>,
    chains: RwLock<HashMap<String, Vec<Block>>>,
    pins: RwLock<HashMap<String, HashSet<(PinRole, String)>>>,
    gc_runs: AtomicU32,
}

impl MemoryWallet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mendaftarkan DID pada node ini.
    pub fn register_did(&self, did: &str) {
        self.dids.write().insert(did.to_string());
    }

    /// Menambahkan row token (status awal `Free`) dan pin owner-nya.
    pub fn add_token(&self, token: &str, token_type: TokenType, value: f64, owner_did: &str) {
        self.tokens.write().insert(
            token.to_string(),
            TokenDetail {
                token: token.to_string(),
                token_type,
                token_value: value,
                owner_did: owner_did.to_string(),
                status: TokenStatus::Free,
            },
        );
        self.pins
            .write()
            .entry(token.to_string())
            .or_default()
            .insert((PinRole::Owner, owner_did.to_string()));
    }

    /// Chain satu token (kosong bila belum ada).
    #[must_use]
    pub fn chain(&self, token: &str) -> Vec<Block> {
        self.chains.read().get(token).cloned().unwrap_or_default()
    }

    /// Status token saat ini.
    #[must_use]
    pub fn token_status(&self, token: &str) -> Option<TokenStatus> {
        self.tokens.read().get(token).map(|d| d.status)
    }

    /// Menambahkan pin (helper untuk seeding test).
    pub fn pin(&self, token: &str, role: PinRole, did: &str) {
        self.pins
            .write()
            .entry(token.to_string())
            .or_default()
            .insert((role, did.to_string()));
    }

    /// Seluruh pin satu token.
    #[must_use]
    pub fn pins(&self, token: &str) -> HashSet<(PinRole, String)> {
        self.pins.read().get(token).cloned().unwrap_or_default()
    }

    /// Berapa kali GC sudah berjalan.
    #[must_use]
    pub fn gc_count(&self) -> u32 {
        self.gc_runs.load(Ordering::SeqCst)
    }
}

impl TokenWallet for MemoryWallet {
    fn is_did_registered(&self, did: &str) -> bool {
        self.dids.read().contains(did)
    }

    fn read_token(&self, token: &str) -> Result<TokenDetail, WalletError> {
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| WalletError::TokenNotFound(token.to_string()))
    }

    fn latest_block(&self, token: &str, _token_type: TokenType) -> Option<Block> {
        self.chains
            .read()
            .get(token)
            .and_then(|chain| chain.last().cloned())
    }

    fn add_token_block(&self, token: &str, block: &Block) -> Result<(), WalletError> {
        self.chains
            .write()
            .entry(token.to_string())
            .or_default()
            .push(block.clone());
        Ok(())
    }

    fn create_token_block(&self, block: &Block) -> Result<(), WalletError> {
        let mut chains = self.chains.write();
        for tt in &block.contents().trans_info.tokens {
            chains
                .entry(tt.token.clone())
                .or_default()
                .push(block.clone());
        }
        Ok(())
    }

    fn tokens_transferred(
        &self,
        sender_did: &str,
        tokens: &[TokenInfo],
        block: &Block,
    ) -> Result<(), WalletError> {
        if !self.is_did_registered(sender_did) {
            return Err(WalletError::DidNotFound(sender_did.to_string()));
        }
        let mut table = self.tokens.write();
        for ti in tokens {
            let detail = table
                .get_mut(&ti.token)
                .ok_or_else(|| WalletError::TokenNotFound(ti.token.clone()))?;
            detail.status = TokenStatus::Transferred;
        }
        drop(table);
        self.create_token_block(block)
    }

    fn commit_tokens(&self, deployer_did: &str, tokens: &[String]) -> Result<(), WalletError> {
        let mut table = self.tokens.write();
        for token in tokens {
            let detail = table
                .get_mut(token)
                .ok_or_else(|| WalletError::TokenNotFound(token.clone()))?;
            detail.status = TokenStatus::Committed;
            detail.owner_did = deployer_did.to_string();
        }
        Ok(())
    }

    fn update_smart_contract_status(
        &self,
        token: &str,
        status: TokenStatus,
    ) -> Result<(), WalletError> {
        let mut table = self.tokens.write();
        let detail = table
            .get_mut(token)
            .ok_or_else(|| WalletError::TokenNotFound(token.to_string()))?;
        detail.status = status;
        Ok(())
    }

    fn unpin(&self, token: &str, role: PinRole, did: &str) -> Result<(), WalletError> {
        let mut pins = self.pins.write();
        if let Some(set) = pins.get_mut(token) {
            set.remove(&(role, did.to_string()));
        }
        Ok(())
    }

    fn run_gc(&self) -> Result<(), WalletError> {
        self.gc_runs.fetch_add(1, Ordering::SeqCst);
        debug!("content store gc completed");
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{TokenChainBlock, TransInfo, TransTokens};
    use crate::types::TOKEN_TRANSFERRED;
    use std::collections::BTreeMap;

    fn block_for(tokens: &[&str]) -> Block {
        let tcb = TokenChainBlock {
            transaction_type: TOKEN_TRANSFERRED.to_string(),
            token_owner: "did-r".to_string(),
            trans_info: TransInfo {
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
        };
        let ctcb = tokens
            .iter()
            .map(|t| ((*t).to_string(), None))
            .collect::<BTreeMap<_, _>>();
        Block::create_new(&ctcb, tcb).expect("block")
    }

    fn seeded_wallet() -> MemoryWallet {
        let w = MemoryWallet::new();
        w.register_did("did-s");
        w.add_token("t1", TokenType::Rbt, 1.0, "did-s");
        w.add_token("t2", TokenType::Rbt, 1.0, "did-s");
        w
    }

    #[test]
    fn test_read_token() {
        let w = seeded_wallet();
        let d = w.read_token("t1").expect("token");
        assert_eq!(d.status, TokenStatus::Free);
        assert_eq!(d.owner_did, "did-s");
        assert!(w.read_token("missing").is_err());
    }

    #[test]
    fn test_latest_block_follows_appends() {
        let w = seeded_wallet();
        assert!(w.latest_block("t1", TokenType::Rbt).is_none());
        let b1 = block_for(&["t1"]);
        w.add_token_block("t1", &b1).expect("append");
        let latest = w.latest_block("t1", TokenType::Rbt).expect("latest");
        assert_eq!(latest, b1);
    }

    #[test]
    fn test_create_token_block_appends_all() {
        let w = seeded_wallet();
        let b = block_for(&["t1", "t2"]);
        w.create_token_block(&b).expect("append");
        assert_eq!(w.chain("t1").len(), 1);
        assert_eq!(w.chain("t2").len(), 1);
    }

    #[test]
    fn test_tokens_transferred_marks_and_appends() {
        let w = seeded_wallet();
        let b = block_for(&["t1"]);
        let ti = vec![TokenInfo {
            token: "t1".to_string(),
            token_type: TokenType::Rbt,
            token_value: 1.0,
            owner_did: "did-s".to_string(),
        }];
        w.tokens_transferred("did-s", &ti, &b).expect("transfer");
        assert_eq!(w.token_status("t1"), Some(TokenStatus::Transferred));
        assert_eq!(w.chain("t1").len(), 1);
    }

    #[test]
    fn test_tokens_transferred_unknown_did() {
        let w = seeded_wallet();
        let b = block_for(&["t1"]);
        let err = w.tokens_transferred("did-x", &[], &b).unwrap_err();
        assert!(matches!(err, WalletError::DidNotFound(_)));
    }

    #[test]
    fn test_commit_tokens_locks_to_deployer() {
        let w = seeded_wallet();
        w.commit_tokens("did-deployer", &["t1".to_string(), "t2".to_string()])
            .expect("commit");
        assert_eq!(w.token_status("t1"), Some(TokenStatus::Committed));
        assert_eq!(w.read_token("t2").expect("token").owner_did, "did-deployer");
    }

    #[test]
    fn test_unpin_and_gc() {
        let w = seeded_wallet();
        w.pin("t1", PinRole::PrevSender, "did-s");
        assert!(w.pins("t1").contains(&(PinRole::PrevSender, "did-s".to_string())));
        w.unpin("t1", PinRole::PrevSender, "did-s").expect("unpin");
        assert!(!w.pins("t1").contains(&(PinRole::PrevSender, "did-s".to_string())));
        assert_eq!(w.gc_count(), 0);
        w.run_gc().expect("gc");
        assert_eq!(w.gc_count(), 1);
    }

    #[test]
    fn test_update_smart_contract_status() {
        let w = seeded_wallet();
        w.add_token("sc", TokenType::SmartContract, 1.5, "did-s");
        w.update_smart_contract_status("sc", TokenStatus::Deployed)
            .expect("status");
        assert_eq!(w.token_status("sc"), Some(TokenStatus::Deployed));
        assert!(w
            .update_smart_contract_status("nope", TokenStatus::Deployed)
            .is_err());
    }
}
