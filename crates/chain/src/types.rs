//! Token types, statuses and transaction-type constants.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Transaction-type strings yang muncul dalam token-chain block.
pub const TOKEN_TRANSFERRED: &str = "TOKEN_TRANSFERRED";
pub const TOKEN_COMMITTED: &str = "TOKEN_COMMITTED";
pub const TOKEN_GENERATED: &str = "TOKEN_GENERATED";
pub const TOKEN_CONTRACT_COMMITTED: &str = "TOKEN_CONTRACT_COMMITTED";
pub const TOKEN_PLEDGED: &str = "TOKEN_PLEDGED";
pub const TOKEN_UNPLEDGED: &str = "TOKEN_UNPLEDGED";

// ════════════════════════════════════════════════════════════════════════════
// TOKEN TYPE
// ════════════════════════════════════════════════════════════════════════════

/// Jenis token dalam ledger.
///
/// Kode numerik stabil dan dipakai pada wire maupun dalam `ref_id`
/// committed-tokens block, jadi TIDAK BOLEH diubah.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenType {
    /// Token RBT utuh (nilai 1.0).
    Rbt,
    /// Pecahan token RBT (nilai < 1.0).
    PartRbt,
    /// Token NFT.
    Nft,
    /// Token smart contract.
    SmartContract,
    /// Token data (data-commit).
    Data,
}

impl TokenType {
    /// Kode wire numerik.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            TokenType::Rbt => 1,
            TokenType::PartRbt => 2,
            TokenType::Nft => 3,
            TokenType::SmartContract => 4,
            TokenType::Data => 5,
        }
    }

    /// Memilih tipe RBT berdasarkan nilai token: 1.0 utuh, selain itu pecahan.
    #[must_use]
    pub fn rbt_for_value(value: f64) -> Self {
        if value == 1.0 {
            TokenType::Rbt
        } else {
            TokenType::PartRbt
        }
    }
}

impl TryFrom<u8> for TokenType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TokenType::Rbt),
            2 => Ok(TokenType::PartRbt),
            3 => Ok(TokenType::Nft),
            4 => Ok(TokenType::SmartContract),
            5 => Ok(TokenType::Data),
            other => Err(format!("unknown token type code: {}", other)),
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for TokenType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for TokenType {
    fn deserialize<D>(deserializer: D) -> Result<TokenType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        TokenType::try_from(code).map_err(serde::de::Error::custom)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TOKEN STATUS
// ════════════════════════════════════════════════════════════════════════════

/// Status token dalam wallet store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Bebas dipakai untuk transaksi atau pledge.
    Free,
    /// Sudah ditransfer keluar.
    Transferred,
    /// Terkunci sebagai backing smart contract.
    Committed,
    /// Smart contract sudah ter-deploy.
    Deployed,
    /// Smart contract sudah dieksekusi.
    Executed,
    /// Sedang dipledge sebagai collateral.
    Pledged,
}

// ════════════════════════════════════════════════════════════════════════════
// TOKEN INFO
// ════════════════════════════════════════════════════════════════════════════

/// Info satu token yang terlibat dalam transaksi.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token id.
    pub token: String,
    /// Jenis token.
    pub token_type: TokenType,
    /// Nilai desimal token.
    pub token_value: f64,
    /// DID pemilik saat ini.
    pub owner_did: String,
}
