//! # DTLN Quorum Coordinator
//!
//! Inti quorum-initiator node DTLN: atas nama originator transaksi,
//! coordinator memilih quorum validator, mengumpulkan collateral pledge,
//! menjalankan ronde konsensus, merakit signature ke dalam token-chain block,
//! dan menyelesaikan delivery ke receiver.
//!
//! ## Components
//!
//! | Module | Fungsi |
//! |--------|--------|
//! | `config` | Konfigurasi ronde (quorum minimum, deadline, polling) |
//! | `error` | `ConsensusError` untuk semua kegagalan non-transient |
//! | `types` | Wire types RPC + `TransactionMode` + route constants |
//! | `transport` | Handle peer, transport HTTP JSON, mock ter-script |
//! | `directory` | Oracle keanggotaan quorum + shard hint |
//! | `registry` | State per ronde: counter, credit, peer, pledge |
//! | `pledge` | Pledge collector (solicitasi + tunggu target) |
//! | `dialer` | Dial task per kandidat validator |
//! | `assembler` | Penyusunan block + pengumpulan signature |
//! | `finalizer` | Aksi pasca-konsensus per mode |
//! | `events` | Publikasi event smart contract best-effort |
//! | `initiator` | `QuorumCoordinator`: driver ronde |
//!
//! ## Flow
//!
//! ```text
//! contract ──► QuorumCoordinator::initiate_consensus
//!                │
//!                ├── directory.quorum(shard hint)        (>= 5 kandidat)
//!                ├── registry.register(req_id)
//!                │
//!                ├── dial task x N (paralel):
//!                │     connect ─► pledge ─► QUORUM_CONSENSUS ─► report
//!                │
//!                ├── barrier: success >= 5  ATAU  running == 0
//!                ├── assembler: block ─► SIGNATURE_REQUEST x N
//!                │                    ─► UPDATE_PLEDGE_TOKEN x N
//!                ├── QUORUM_CREDIT x N                   (best-effort)
//!                └── finalizer per mode (receiver / wallet / event)
//! ```
//!
//! ## Ordering Guarantees
//!
//! - Per validator: pledge -> konsensus -> signature -> update, strict.
//! - Lintas validator: solicitasi pledge terserialisasi pledge lock;
//!   konsensus paralel; SEMUA signature selesai sebelum update pertama.
//! - Registry lock selalu diambil sebelum pledge lock, tidak pernah dipegang
//!   melintasi I/O.

pub mod assembler;
pub mod config;
pub mod dialer;
pub mod directory;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod initiator;
pub mod pledge;
pub mod registry;
pub mod transport;
pub mod types;

/// Minimum kandidat validator dari directory.
pub const MIN_QUORUM_REQUIRED: usize = 5;
/// Minimum dial sukses supaya ronde lolos barrier.
pub const MIN_CONSENSUS_REQUIRED: usize = 5;

pub use config::{ConsensusConfig, ConsensusConfigError};
pub use directory::{shard_hint, QuorumDirectory, StaticDirectory};
pub use error::ConsensusError;
pub use events::{ContractEventKind, EventError, EventPublisher, MemoryEventPublisher, NewContractEvent};
pub use initiator::{PledgedTokenMap, QuorumCoordinator};
pub use registry::{DialCounters, DialOutcome, Registry};
pub use transport::{
    AddressResolver, HttpTransport, MockReply, MockTransport, Peer, PeerChannel, PeerTransport,
    StaticResolver, TransportError,
};
pub use types::{
    routes, BasicResponse, ConsensusReply, ConsensusRequest, CreditScore, CreditSignature,
    PledgeReply, PledgeRequest, QuorumRole, SendTokenRequest, SignatureReply, SignatureRequest,
    TransactionDetails, TransactionKind, TransactionMode, UpdatePledgeRequest,
};
