//! Quorum directory: oracle keanggotaan validator.
//!
//! Directory mengembalikan daftar alamat kandidat validator untuk satu shard
//! hint. Shard hint adalah karakter hex TERAKHIR dari SHA3-256 contract
//! block, sehingga pemilihan kandidat deterministik terhadap transaksi.

use std::collections::HashMap;

use parking_lot::RwLock;

use dtln_common::sha3_256_hex;

/// Shard hint sebuah transaksi: karakter hex terakhir dari transaction id.
#[must_use]
pub fn shard_hint(contract_block: &[u8]) -> String {
    let tid = sha3_256_hex(contract_block);
    tid.chars()
        .next_back()
        .map(|c| c.to_string())
        .unwrap_or_default()
}

/// Oracle keanggotaan quorum.
pub trait QuorumDirectory: Send + Sync {
    /// Kandidat validator untuk satu shard hint; `None` bila tidak ada.
    fn quorum(&self, hint: &str) -> Option<Vec<String>>;

    /// Menambahkan anggota ke daftar default.
    fn add_members(&self, members: Vec<String>);

    /// Menghapus seluruh anggota.
    fn remove_all(&self);
}

/// Directory statis: daftar default + override per shard.
#[derive(Default)]
pub struct StaticDirectory {
    default: RwLock<Vec<String>>,
    shards: RwLock<HashMap<String, Vec<String>>>,
}

impl StaticDirectory {
    /// Directory dengan daftar default.
    #[must_use]
    pub fn new(members: Vec<String>) -> Self {
        Self {
            default: RwLock::new(members),
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Override kandidat untuk satu shard hint.
    pub fn set_shard(&self, hint: &str, members: Vec<String>) {
        self.shards.write().insert(hint.to_string(), members);
    }
}

impl QuorumDirectory for StaticDirectory {
    fn quorum(&self, hint: &str) -> Option<Vec<String>> {
        if let Some(members) = self.shards.read().get(hint) {
            return Some(members.clone());
        }
        let default = self.default.read();
        if default.is_empty() {
            None
        } else {
            Some(default.clone())
        }
    }

    fn add_members(&self, members: Vec<String>) {
        self.default.write().extend(members);
    }

    fn remove_all(&self) {
        self.default.write().clear();
        self.shards.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_hint_is_last_hex_char() {
        let block = b"contract-bytes";
        let tid = sha3_256_hex(block);
        let hint = shard_hint(block);
        assert_eq!(hint.len(), 1);
        assert!(tid.ends_with(&hint));
    }

    #[test]
    fn test_shard_hint_deterministic() {
        assert_eq!(shard_hint(b"abc"), shard_hint(b"abc"));
    }

    #[test]
    fn test_static_directory_default_and_shard() {
        let dir = StaticDirectory::new(vec!["peer1.did1".to_string()]);
        assert_eq!(dir.quorum("0"), Some(vec!["peer1.did1".to_string()]));

        dir.set_shard("f", vec!["peer9.did9".to_string()]);
        assert_eq!(dir.quorum("f"), Some(vec!["peer9.did9".to_string()]));
        assert_eq!(dir.quorum("0"), Some(vec!["peer1.did1".to_string()]));
    }

    #[test]
    fn test_static_directory_empty_returns_none() {
        let dir = StaticDirectory::new(Vec::new());
        assert_eq!(dir.quorum("0"), None);
    }

    #[test]
    fn test_add_and_remove_members() {
        let dir = StaticDirectory::new(vec!["a.d1".to_string()]);
        dir.add_members(vec!["b.d2".to_string()]);
        assert_eq!(
            dir.quorum("0"),
            Some(vec!["a.d1".to_string(), "b.d2".to_string()])
        );
        dir.remove_all();
        assert_eq!(dir.quorum("0"), None);
    }
}
