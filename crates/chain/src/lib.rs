//! # DTLN Chain Crate
//!
//! Library token-chain untuk DTLN: setiap token memiliki hash chain sendiri,
//! dan satu transaksi menghasilkan satu block yang di-append ke chain semua
//! token yang terlibat.
//!
//! ## Modules
//!
//! | Module | Fungsi |
//! |--------|--------|
//! | `types` | Token type, status, info, dan konstanta transaction type |
//! | `block` | `TokenChainBlock` + `Block` ter-finalisasi (hash, signature) |
//! | `contract` | Kontrak transfer yang ditandatangani caller |
//! | `did` | Trait `DidCrypto` + backend Ed25519 |
//! | `wallet` | Trait `TokenWallet` + implementasi in-memory |

pub mod block;
pub mod contract;
pub mod did;
pub mod types;
pub mod wallet;

pub use block::{
    Block, GenesisBlock, GenesisTokenInfo, PledgeDetail, TokenChainBlock, TransInfo, TransTokens,
};
pub use contract::{Contract, ContractData};
pub use did::{DidCrypto, Ed25519Did};
pub use types::{
    TokenInfo, TokenStatus, TokenType, TOKEN_COMMITTED, TOKEN_CONTRACT_COMMITTED, TOKEN_GENERATED,
    TOKEN_PLEDGED, TOKEN_TRANSFERRED, TOKEN_UNPLEDGED,
};
pub use wallet::{MemoryWallet, PinRole, TokenDetail, TokenWallet, WalletError};
