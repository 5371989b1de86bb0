//! Keyspace Store
//!
//! One [`Db`] exists per logical database. It owns two maps: the primary
//! key-to-object map, and an expiration index holding only the keys that
//! carry a non-zero deadline, so the active-expiration cycle never scans the
//! full keyspace.
//!
//! ## Invariants
//!
//! - A key in the expiration index is present in the primary map with the
//!   same non-zero `expires_at`; [`Db::remove_key`] and [`Db::insert`] keep
//!   the two in step.
//! - Every mutating access goes through [`Db::lookup`], which evicts an
//!   expired object before reporting it absent ("lazy expiry"). The
//!   background cycle handles keys nobody touches.
//!
//! ## Concurrency
//!
//! A `Db` has no interior locking: it is owned by its database's dispatcher
//! worker, which executes one command at a time (see the `dispatch` module).
//! The server wraps each `Db` in a mutex only for the narrow cross-database
//! cases (MOVE, FLUSHALL).

use std::collections::HashMap;

use rand::seq::IteratorRandom;
use thiserror::Error;

use crate::glob::GlobPattern;
use crate::storage::object::{now_ms, Object, ObjectType};

/// Errors surfaced by keyspace operations. The display strings are the
/// exact wire error texts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key exists but holds a different type
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// The operation requires the key to exist
    #[error("ERR no such key")]
    NoSuchKey,

    /// The value cannot be treated as a 64-bit signed integer
    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    /// A positional index outside the collection
    #[error("ERR index out of range")]
    OutOfRange,
}

/// One logical database: the key-to-object map plus its expiration index.
#[derive(Debug, Default)]
pub struct Db {
    pub(in crate::storage) data: HashMap<String, Object>,
    pub(in crate::storage) expires: HashMap<String, u64>,
}

impl Db {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored (expired-but-unswept keys included).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drops every key and the whole expiration index.
    pub fn clear(&mut self) {
        self.data.clear();
        self.expires.clear();
    }

    /// Looks up a key for mutation.
    ///
    /// An expired object is evicted and reported absent. When `expected` is
    /// given and the live object's type differs, the lookup fails with
    /// WrongType.
    pub(in crate::storage) fn lookup(
        &mut self,
        key: &str,
        expected: Option<ObjectType>,
    ) -> Result<Option<&mut Object>, StoreError> {
        if self
            .data
            .get(key)
            .is_some_and(|obj| obj.is_expired(now_ms()))
        {
            self.remove_key(key);
            return Ok(None);
        }

        match self.data.get_mut(key) {
            None => Ok(None),
            Some(obj) => {
                if let Some(expected) = expected {
                    if obj.object_type() != expected {
                        return Err(StoreError::WrongType);
                    }
                }
                Ok(Some(obj))
            }
        }
    }

    /// Informational probe: returns the object as-is, expired or not, and
    /// never evicts. Callers check `is_expired` themselves.
    pub(in crate::storage) fn peek(&self, key: &str) -> Option<&Object> {
        self.data.get(key)
    }

    /// Evict-aware existence check.
    pub(in crate::storage) fn contains(&mut self, key: &str) -> bool {
        matches!(self.lookup(key, None), Ok(Some(_)))
    }

    /// Stores an object under `key`, replacing any previous object and
    /// keeping the expiration index in step.
    pub(in crate::storage) fn insert(&mut self, key: &str, obj: Object) {
        if obj.expires_at > 0 {
            self.expires.insert(key.to_string(), obj.expires_at);
        } else {
            self.expires.remove(key);
        }
        self.data.insert(key.to_string(), obj);
    }

    /// Removes a key from the primary map and the expiration index in one
    /// step.
    pub(in crate::storage) fn remove_key(&mut self, key: &str) {
        self.data.remove(key);
        self.expires.remove(key);
    }

    /// Deletes the given keys; returns how many actually existed.
    pub fn del(&mut self, keys: &[String]) -> usize {
        let mut count = 0;
        for key in keys {
            if self.contains(key) {
                self.remove_key(key);
                count += 1;
            }
        }
        count
    }

    /// Counts how many of the given keys exist (expired keys are evicted
    /// and not counted).
    pub fn exists(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|key| self.contains(key.as_str())).count()
    }

    /// Sets an absolute expiration deadline on an existing key. A deadline
    /// already in the past evicts the key immediately and still reports
    /// success.
    pub fn expire_at(&mut self, key: &str, at: u64) -> bool {
        if !self.contains(key) {
            return false;
        }
        if at < now_ms() {
            self.remove_key(key);
            return true;
        }
        if let Some(obj) = self.data.get_mut(key) {
            obj.expires_at = at;
            self.expires.insert(key.to_string(), at);
        }
        true
    }

    /// Remaining lifetime: -2 when the key is absent, -1 when it carries no
    /// expiration, otherwise the remaining milliseconds.
    pub fn ttl(&mut self, key: &str) -> i64 {
        if !self.contains(key) {
            return -2;
        }
        match self.data.get(key) {
            Some(obj) if obj.expires_at == 0 => -1,
            Some(obj) => obj.expires_at.saturating_sub(now_ms()) as i64,
            None => -2,
        }
    }

    /// Moves the object (and its expiration) to `new_key`.
    ///
    /// Fails with NoSuchKey when the source is absent. With `nx` set and a
    /// live destination, nothing happens and `false` is returned. The
    /// destination is otherwise overwritten, its old index entry included.
    pub fn rename(&mut self, key: &str, new_key: &str, nx: bool) -> Result<bool, StoreError> {
        if !self.contains(key) {
            return Err(StoreError::NoSuchKey);
        }
        if nx && self.contains(new_key) {
            return Ok(false);
        }
        if let Some(obj) = self.data.remove(key) {
            self.expires.remove(key);
            self.remove_key(new_key);
            self.insert(new_key, obj);
        }
        Ok(true)
    }

    /// Relocates a key into `dest` if it is absent there. The caller (the
    /// MOVE handler) holds both stores locked in index order.
    pub fn move_to(&mut self, key: &str, dest: &mut Db) -> bool {
        if !self.contains(key) {
            return false;
        }
        if dest.contains(key) {
            return false;
        }
        let Some(obj) = self.data.remove(key) else {
            return false;
        };
        self.expires.remove(key);
        dest.insert(key, obj);
        true
    }

    /// All live keys matching the pattern. O(n) over the keyspace; expired
    /// keys encountered during the scan are evicted.
    pub fn keys(&mut self, pattern: &GlobPattern) -> Vec<String> {
        let candidates: Vec<String> = self.data.keys().cloned().collect();
        candidates
            .into_iter()
            .filter(|key| self.contains(key) && pattern.matches(key))
            .collect()
    }

    /// An arbitrary live key, or None when the database is empty. Expired
    /// picks are evicted and the draw repeats, so every failed round
    /// shrinks the keyspace.
    pub fn random_key(&mut self) -> Option<String> {
        loop {
            let picked = {
                let mut rng = rand::thread_rng();
                self.data.keys().choose(&mut rng).cloned()
            };
            let key = picked?;
            if self.contains(&key) {
                return Some(key);
            }
        }
    }

    /// The key's type tag, or "none".
    pub fn type_of(&mut self, key: &str) -> &'static str {
        match self.lookup(key, None) {
            Ok(Some(obj)) => obj.object_type().as_str(),
            _ => "none",
        }
    }

    /// One sampling round of the active-expiration cycle: draws up to
    /// `samples` keys from the expiration index, evicts the expired ones,
    /// and returns how many were evicted.
    pub fn sweep_expired(&mut self, samples: usize) -> usize {
        let now = now_ms();
        let sampled: Vec<String> = {
            let mut rng = rand::thread_rng();
            self.expires
                .keys()
                .choose_multiple(&mut rng, samples)
                .into_iter()
                .cloned()
                .collect()
        };

        let mut evicted = 0;
        for key in sampled {
            if self.data.get(&key).is_some_and(|obj| obj.is_expired(now)) {
                self.remove_key(&key);
                evicted += 1;
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::string::SetFlag;

    fn set(db: &mut Db, key: &str, value: &str) {
        db.set(key, value, SetFlag::None, 0);
    }

    #[test]
    fn test_fresh_key_probes() {
        let mut db = Db::new();
        assert_eq!(db.get("nope").unwrap(), None);
        assert_eq!(db.ttl("nope"), -2);
        assert_eq!(db.type_of("nope"), "none");
        assert_eq!(db.exists(&["nope".to_string()]), 0);
    }

    #[test]
    fn test_del_and_exists() {
        let mut db = Db::new();
        set(&mut db, "a", "1");
        set(&mut db, "b", "2");

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(db.exists(&keys), 2);
        assert_eq!(db.del(&keys), 2);
        assert_eq!(db.exists(&keys), 0);
        assert_eq!(db.del(&keys), 0);
    }

    #[test]
    fn test_expire_and_ttl() {
        let mut db = Db::new();
        set(&mut db, "k", "v");

        assert_eq!(db.ttl("k"), -1);
        assert!(db.expire_at("k", now_ms() + 10_000));
        let ttl = db.ttl("k");
        assert!(ttl > 0 && ttl <= 10_000);

        assert!(!db.expire_at("missing", now_ms() + 1_000));
    }

    #[test]
    fn test_expire_in_the_past_evicts_immediately() {
        let mut db = Db::new();
        set(&mut db, "k", "v");

        assert!(db.expire_at("k", now_ms().saturating_sub(1_000)));
        assert_eq!(db.exists(&["k".to_string()]), 0);
        assert_eq!(db.ttl("k"), -2);
    }

    #[test]
    fn test_lazy_eviction_on_lookup() {
        let mut db = Db::new();
        set(&mut db, "k", "v");
        db.data.get_mut("k").unwrap().expires_at = now_ms() - 1;
        db.expires.insert("k".to_string(), now_ms() - 1);

        assert_eq!(db.get("k").unwrap(), None);
        assert!(db.data.is_empty());
        assert!(db.expires.is_empty());
    }

    #[test]
    fn test_rename() {
        let mut db = Db::new();
        set(&mut db, "old", "v");
        db.expire_at("old", now_ms() + 60_000);

        assert_eq!(db.rename("old", "new", false).unwrap(), true);
        assert_eq!(db.get("new").unwrap(), Some("v".to_string()));
        assert_eq!(db.get("old").unwrap(), None);
        // The expiration rode along
        assert!(db.ttl("new") > 0);
        assert_eq!(db.expires.len(), 1);

        assert_eq!(
            db.rename("missing", "x", false).unwrap_err(),
            StoreError::NoSuchKey
        );
    }

    #[test]
    fn test_rename_nx() {
        let mut db = Db::new();
        set(&mut db, "a", "1");
        set(&mut db, "b", "2");

        assert_eq!(db.rename("a", "b", true).unwrap(), false);
        assert_eq!(db.get("b").unwrap(), Some("2".to_string()));

        assert_eq!(db.rename("a", "c", true).unwrap(), true);
        assert_eq!(db.get("c").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_rename_overwrite_clears_old_deadline() {
        let mut db = Db::new();
        set(&mut db, "src", "v");
        set(&mut db, "dst", "old");
        db.expire_at("dst", now_ms() + 60_000);

        assert_eq!(db.rename("src", "dst", false).unwrap(), true);
        assert_eq!(db.ttl("dst"), -1);
        assert!(db.expires.is_empty());
    }

    #[test]
    fn test_move_to() {
        let mut src = Db::new();
        let mut dst = Db::new();
        set(&mut src, "k", "v");

        assert!(src.move_to("k", &mut dst));
        assert_eq!(src.get("k").unwrap(), None);
        assert_eq!(dst.get("k").unwrap(), Some("v".to_string()));

        // Occupied destination blocks the move
        set(&mut src, "k", "other");
        assert!(!src.move_to("k", &mut dst));
        assert_eq!(src.get("k").unwrap(), Some("other".to_string()));
    }

    #[test]
    fn test_keys_glob() {
        let mut db = Db::new();
        for k in ["user:1", "user:2", "session:1"] {
            set(&mut db, k, "x");
        }

        let mut matched = db.keys(&GlobPattern::new("user:*"));
        matched.sort();
        assert_eq!(matched, vec!["user:1", "user:2"]);
        assert_eq!(db.keys(&GlobPattern::new("*")).len(), 3);
        assert!(db.keys(&GlobPattern::new("nope*")).is_empty());
    }

    #[test]
    fn test_random_key() {
        let mut db = Db::new();
        assert_eq!(db.random_key(), None);

        set(&mut db, "only", "v");
        assert_eq!(db.random_key(), Some("only".to_string()));
    }

    #[test]
    fn test_random_key_skips_expired() {
        let mut db = Db::new();
        set(&mut db, "dead", "v");
        db.data.get_mut("dead").unwrap().expires_at = now_ms() - 1;
        db.expires.insert("dead".to_string(), now_ms() - 1);

        assert_eq!(db.random_key(), None);
        assert!(db.data.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut db = Db::new();
        set(&mut db, "a", "1");
        db.expire_at("a", now_ms() + 60_000);

        db.clear();
        assert!(db.is_empty());
        assert!(db.expires.is_empty());
    }

    #[test]
    fn test_sweep_expired() {
        let mut db = Db::new();
        for i in 0..10 {
            let key = format!("dead:{}", i);
            set(&mut db, &key, "v");
            db.data.get_mut(&key).unwrap().expires_at = now_ms() - 1;
            db.expires.insert(key, now_ms() - 1);
        }
        set(&mut db, "alive", "v");
        db.expire_at("alive", now_ms() + 60_000);
        set(&mut db, "forever", "v");

        let evicted = db.sweep_expired(100);
        assert_eq!(evicted, 10);
        assert_eq!(db.len(), 2);
        assert_eq!(db.expires.len(), 1);
    }

    #[test]
    fn test_sweep_is_bounded_by_sample_size() {
        let mut db = Db::new();
        for i in 0..50 {
            let key = format!("dead:{}", i);
            set(&mut db, &key, "v");
            db.data.get_mut(&key).unwrap().expires_at = now_ms() - 1;
            db.expires.insert(key, now_ms() - 1);
        }

        let evicted = db.sweep_expired(5);
        assert_eq!(evicted, 5);
        assert_eq!(db.len(), 45);
    }
}
