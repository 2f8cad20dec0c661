//! Peer transport: JSON-over-HTTP RPC ke validator dan receiver.
//!
//! # Types
//!
//! | Type | Fungsi |
//! |------|--------|
//! | `TransportError` | Error type untuk kegagalan transport |
//! | `PeerChannel` | Async trait satu koneksi peer |
//! | `Peer` | Handle peer dengan akuntansi open-handle |
//! | `PeerTransport` | Async trait resolve alamat -> `Peer` |
//! | `AddressResolver` / `StaticResolver` | Pemetaan alamat ke base URL |
//! | `HttpTransport` | Implementasi reqwest POST JSON |
//! | `MockTransport` | Mock in-memory dengan scripted reply untuk testing |
//!
//! # Peer Handle Ownership
//!
//! `Peer` dibuat open, tidak clonable, dan menutup dirinya TEPAT SEKALI saat
//! drop (guard menurunkan counter open-handle transport). Registry memegang
//! `Arc<Peer>`; handle tertutup ketika reference terakhir dilepas, baik pada
//! jalur sukses maupun jalur error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use dtln_common::Address;

// ════════════════════════════════════════════════════════════════════════════
// TRANSPORT ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Error operasi transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Koneksi atau pengiriman request gagal.
    ConnectionFailed {
        /// Deskripsi penyebab.
        reason: String,
    },

    /// Request melewati deadline.
    Timeout {
        /// Deadline dalam milliseconds.
        duration_ms: u64,
    },

    /// Peer membalas dengan status HTTP non-sukses.
    BadStatus {
        /// Kode status HTTP.
        status: u16,
    },

    /// Encode/decode body gagal.
    Encoding {
        /// Deskripsi error.
        reason: String,
    },

    /// Alamat tidak bisa di-resolve ke endpoint.
    Unresolvable {
        /// Alamat kanonik yang dicari.
        addr: String,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionFailed { reason } => {
                write!(f, "connection failed: {}", reason)
            }
            TransportError::Timeout { duration_ms } => {
                write!(f, "request timed out after {}ms", duration_ms)
            }
            TransportError::BadStatus { status } => {
                write!(f, "peer replied with http status {}", status)
            }
            TransportError::Encoding { reason } => {
                write!(f, "encoding error: {}", reason)
            }
            TransportError::Unresolvable { addr } => {
                write!(f, "address not resolvable: {}", addr)
            }
        }
    }
}

impl std::error::Error for TransportError {}

// ════════════════════════════════════════════════════════════════════════════
// PEER CHANNEL + PEER
// ════════════════════════════════════════════════════════════════════════════

/// Satu koneksi terbuka ke peer: kirim JSON, terima JSON.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// POST `body` ke `route` dengan deadline; balasan adalah body JSON.
    async fn request(
        &self,
        route: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError>;
}

/// Guard open-handle; menurunkan counter transport tepat sekali saat drop.
struct OpenGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle peer terbuka.
pub struct Peer {
    addr: Address,
    channel: Box<dyn PeerChannel>,
    _guard: OpenGuard,
}

impl Peer {
    fn new(addr: Address, channel: Box<dyn PeerChannel>, counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            addr,
            channel,
            _guard: OpenGuard { counter },
        }
    }

    /// Alamat peer.
    #[must_use]
    pub fn addr(&self) -> &Address {
        &self.addr
    }

    /// DID peer.
    #[must_use]
    pub fn did(&self) -> &str {
        &self.addr.did
    }

    /// Kirim request bertipe dan decode balasannya.
    pub async fn send_request<T, R>(
        &self,
        route: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<R, TransportError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| TransportError::Encoding {
            reason: e.to_string(),
        })?;
        let reply = self.channel.request(route, body, timeout).await?;
        serde_json::from_value(reply).map_err(|e| TransportError::Encoding {
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer").field("addr", &self.addr).finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PEER TRANSPORT TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Resolve alamat node menjadi handle peer terbuka.
///
/// # Object Safety
///
/// Trait ini object-safe; coordinator memegang `Arc<dyn PeerTransport>`.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Buka koneksi ke alamat; handle yang dikembalikan open.
    async fn open(&self, addr: &Address) -> Result<Peer, TransportError>;

    /// Jumlah handle yang masih open pada transport ini.
    fn open_handles(&self) -> usize;
}

// ════════════════════════════════════════════════════════════════════════════
// ADDRESS RESOLVER
// ════════════════════════════════════════════════════════════════════════════

/// Pemetaan alamat kanonik ke base URL endpoint peer.
pub trait AddressResolver: Send + Sync {
    /// Base URL (tanpa trailing slash) untuk alamat, bila dikenal.
    fn base_url(&self, addr: &Address) -> Option<String>;
}

/// Resolver statis berbasis map.
#[derive(Default)]
pub struct StaticResolver {
    map: RwLock<HashMap<String, String>>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Daftarkan endpoint untuk alamat kanonik.
    pub fn insert(&self, addr: &Address, base_url: &str) {
        self.map
            .write()
            .insert(addr.to_string(), base_url.trim_end_matches('/').to_string());
    }
}

impl AddressResolver for StaticResolver {
    fn base_url(&self, addr: &Address) -> Option<String> {
        self.map.read().get(&addr.to_string()).cloned()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP TRANSPORT
// ════════════════════════════════════════════════════════════════════════════

struct HttpChannel {
    client: reqwest::Client,
    base_url: String,
}

#[async_trait]
impl PeerChannel for HttpChannel {
    async fn request(
        &self,
        route: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, route);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        duration_ms: timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadStatus {
                status: status.as_u16(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Encoding {
                reason: e.to_string(),
            })
    }
}

/// Transport JSON-over-HTTP dengan client ter-inject.
pub struct HttpTransport {
    client: reqwest::Client,
    resolver: Arc<dyn AddressResolver>,
    open: Arc<AtomicUsize>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: reqwest::Client, resolver: Arc<dyn AddressResolver>) -> Self {
        Self {
            client,
            resolver,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn open(&self, addr: &Address) -> Result<Peer, TransportError> {
        let base_url = self
            .resolver
            .base_url(addr)
            .ok_or_else(|| TransportError::Unresolvable {
                addr: addr.to_string(),
            })?;
        let channel = HttpChannel {
            client: self.client.clone(),
            base_url,
        };
        Ok(Peer::new(addr.clone(), Box::new(channel), self.open.clone()))
    }

    fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// MOCK TRANSPORT
// ════════════════════════════════════════════════════════════════════════════

/// Satu balasan ter-script untuk mock.
#[derive(Debug, Clone)]
pub struct MockReply {
    /// Body balasan.
    pub body: Value,
    /// Delay sebelum balasan diberikan.
    pub delay: Duration,
}

impl MockReply {
    /// Balasan instan.
    #[must_use]
    pub fn value(body: Value) -> Self {
        Self {
            body,
            delay: Duration::ZERO,
        }
    }

    /// Balasan dengan delay (untuk mensimulasikan validator lambat).
    #[must_use]
    pub fn delayed(body: Value, delay_ms: u64) -> Self {
        Self {
            body,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

struct MockState {
    scripts: Mutex<HashMap<String, HashMap<String, VecDeque<MockReply>>>>,
    unreachable: RwLock<HashSet<String>>,
    log: Mutex<Vec<(String, String)>>,
    open: Arc<AtomicUsize>,
}

/// Transport mock in-memory: balasan validator di-script per (DID, route).
///
/// Setiap request tercatat dalam log urut `(did, route)`; test memakai log
/// untuk assert urutan RPC lintas validator.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                scripts: Mutex::new(HashMap::new()),
                unreachable: RwLock::new(HashSet::new()),
                log: Mutex::new(Vec::new()),
                open: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Antrikan balasan instan untuk `(did, route)`.
    pub fn script(&self, did: &str, route: &str, body: Value) {
        self.script_reply(did, route, MockReply::value(body));
    }

    /// Antrikan balasan dengan delay untuk `(did, route)`.
    pub fn script_delayed(&self, did: &str, route: &str, body: Value, delay_ms: u64) {
        self.script_reply(did, route, MockReply::delayed(body, delay_ms));
    }

    /// Antrikan balasan ter-script.
    pub fn script_reply(&self, did: &str, route: &str, reply: MockReply) {
        self.state
            .scripts
            .lock()
            .entry(did.to_string())
            .or_default()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Tandai DID tidak bisa dihubungi (open gagal).
    pub fn set_unreachable(&self, did: &str) {
        self.state.unreachable.write().insert(did.to_string());
    }

    /// Log seluruh request `(did, route)` urut waktu kirim.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.log.lock().clone()
    }

    /// DID pemanggil satu route, urut waktu kirim.
    #[must_use]
    pub fn calls_to(&self, route: &str) -> Vec<String> {
        self.state
            .log
            .lock()
            .iter()
            .filter(|(_, r)| r == route)
            .map(|(did, _)| did.clone())
            .collect()
    }
}

struct MockChannel {
    state: Arc<MockState>,
    did: String,
}

#[async_trait]
impl PeerChannel for MockChannel {
    async fn request(
        &self,
        route: &str,
        _body: Value,
        _timeout: Duration,
    ) -> Result<Value, TransportError> {
        self.state
            .log
            .lock()
            .push((self.did.clone(), route.to_string()));
        let reply = self
            .state
            .scripts
            .lock()
            .get_mut(&self.did)
            .and_then(|routes| routes.get_mut(route))
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => {
                if !reply.delay.is_zero() {
                    tokio::time::sleep(reply.delay).await;
                }
                Ok(reply.body)
            }
            None => Err(TransportError::ConnectionFailed {
                reason: format!("no scripted reply for {} {}", self.did, route),
            }),
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn open(&self, addr: &Address) -> Result<Peer, TransportError> {
        if self.state.unreachable.read().contains(&addr.did) {
            return Err(TransportError::ConnectionFailed {
                reason: format!("peer {} unreachable", addr),
            });
        }
        let channel = MockChannel {
            state: self.state.clone(),
            did: addr.did.clone(),
        };
        Ok(Peer::new(
            addr.clone(),
            Box::new(channel),
            self.state.open.clone(),
        ))
    }

    fn open_handles(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BasicResponse;
    use serde_json::json;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("peer{}.did{}", n, n)).expect("addr")
    }

    #[tokio::test]
    async fn test_mock_open_close_accounting() {
        let transport = MockTransport::new();
        assert_eq!(transport.open_handles(), 0);
        let p1 = transport.open(&addr(1)).await.expect("open");
        let p2 = transport.open(&addr(2)).await.expect("open");
        assert_eq!(transport.open_handles(), 2);
        drop(p1);
        assert_eq!(transport.open_handles(), 1);
        drop(p2);
        assert_eq!(transport.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_mock_scripted_reply_typed() {
        let transport = MockTransport::new();
        transport.script("did1", "/ping", json!({"status": true, "message": "ok"}));
        let peer = transport.open(&addr(1)).await.expect("open");
        let reply: BasicResponse = peer
            .send_request("/ping", &json!({}), Duration::from_secs(1))
            .await
            .expect("reply");
        assert!(reply.status);
        assert_eq!(reply.message, "ok");
    }

    #[tokio::test]
    async fn test_mock_missing_script_fails() {
        let transport = MockTransport::new();
        let peer = transport.open(&addr(1)).await.expect("open");
        let result: Result<BasicResponse, _> = peer
            .send_request("/nope", &json!({}), Duration::from_secs(1))
            .await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_unreachable() {
        let transport = MockTransport::new();
        transport.set_unreachable("did1");
        assert!(transport.open(&addr(1)).await.is_err());
        assert_eq!(transport.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_mock_replies_consumed_in_order() {
        let transport = MockTransport::new();
        transport.script("did1", "/r", json!({"status": true, "message": "first"}));
        transport.script("did1", "/r", json!({"status": true, "message": "second"}));
        let peer = transport.open(&addr(1)).await.expect("open");
        let a: BasicResponse = peer
            .send_request("/r", &json!({}), Duration::from_secs(1))
            .await
            .expect("a");
        let b: BasicResponse = peer
            .send_request("/r", &json!({}), Duration::from_secs(1))
            .await
            .expect("b");
        assert_eq!(a.message, "first");
        assert_eq!(b.message, "second");
    }

    #[tokio::test]
    async fn test_mock_call_log_order() {
        let transport = MockTransport::new();
        transport.script("did1", "/a", json!({"status": true}));
        transport.script("did1", "/b", json!({"status": true}));
        let peer = transport.open(&addr(1)).await.expect("open");
        let _: BasicResponse = peer
            .send_request("/a", &json!({}), Duration::from_secs(1))
            .await
            .expect("a");
        let _: BasicResponse = peer
            .send_request("/b", &json!({}), Duration::from_secs(1))
            .await
            .expect("b");
        assert_eq!(
            transport.calls(),
            vec![
                ("did1".to_string(), "/a".to_string()),
                ("did1".to_string(), "/b".to_string()),
            ]
        );
        assert_eq!(transport.calls_to("/b"), vec!["did1".to_string()]);
    }

    #[tokio::test]
    async fn test_http_transport_unresolvable() {
        let resolver = Arc::new(StaticResolver::new());
        let transport = HttpTransport::new(reqwest::Client::new(), resolver);
        let err = transport.open(&addr(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Unresolvable { .. }));
    }

    #[test]
    fn test_static_resolver_trims_trailing_slash() {
        let resolver = StaticResolver::new();
        resolver.insert(&addr(1), "http://localhost:9999/");
        assert_eq!(
            resolver.base_url(&addr(1)),
            Some("http://localhost:9999".to_string())
        );
    }
}
