//! Set Operations
//!
//! Sets are hash-based collections of unique string members. Add and remove
//! report how many members actually changed; touching a member that is
//! already present (or already missing) is a no-op, not an error. Like
//! lists, a set-typed key never exists empty.
//!
//! The algebra operations (DIFF/INTER/UNION) compute over evict-aware
//! snapshots of the involved sets and can materialize their result into a
//! destination key, overwriting whatever was there.

use std::collections::{HashMap, HashSet};

use rand::seq::IteratorRandom;

use crate::storage::db::{Db, StoreError};
use crate::storage::object::{Object, ObjectType, Value};

impl Db {
    /// Adds members to the set at `key`, creating it if absent. Returns the
    /// number of members that were not already present.
    pub fn set_add(&mut self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        match self.lookup(key, Some(ObjectType::Set))? {
            Some(obj) => {
                let set = obj.as_set_mut().ok_or(StoreError::WrongType)?;
                let mut added = 0;
                for member in members {
                    if set.insert(member.clone()) {
                        added += 1;
                    }
                }
                Ok(added)
            }
            None => {
                let set: HashSet<String> = members.iter().cloned().collect();
                let added = set.len();
                self.insert(key, Object::new(Value::Set(set)));
                Ok(added)
            }
        }
    }

    /// Removes members; returns how many were present. The key is deleted
    /// once the set drains.
    pub fn set_remove(&mut self, key: &str, members: &[String]) -> Result<usize, StoreError> {
        let Some(obj) = self.lookup(key, Some(ObjectType::Set))? else {
            return Ok(0);
        };
        let set = obj.as_set_mut().ok_or(StoreError::WrongType)?;
        let mut removed = 0;
        for member in members {
            if set.remove(member) {
                removed += 1;
            }
        }
        if set.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }

    /// The set's cardinality; 0 when the key is absent.
    pub fn set_card(&mut self, key: &str) -> Result<usize, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::Set))?
            .and_then(|obj| obj.as_set())
            .map_or(0, HashSet::len))
    }

    /// Membership test.
    pub fn set_is_member(&mut self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::Set))?
            .and_then(|obj| obj.as_set())
            .is_some_and(|set| set.contains(member)))
    }

    /// All members, in no particular order.
    pub fn set_members(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::Set))?
            .and_then(|obj| obj.as_set())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Removes and returns an arbitrary member; deletes the key if the set
    /// drains.
    pub fn set_pop(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(obj) = self.lookup(key, Some(ObjectType::Set))? else {
            return Ok(None);
        };
        let set = obj.as_set_mut().ok_or(StoreError::WrongType)?;
        let picked = {
            let mut rng = rand::thread_rng();
            set.iter().choose(&mut rng).cloned()
        };
        let Some(member) = picked else {
            return Ok(None);
        };
        set.remove(&member);
        if set.is_empty() {
            self.remove_key(key);
        }
        Ok(Some(member))
    }

    /// An arbitrary member, left in place.
    pub fn set_rand_member(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::Set))?
            .and_then(|obj| obj.as_set())
            .and_then(|set| {
                let mut rng = rand::thread_rng();
                set.iter().choose(&mut rng).cloned()
            }))
    }

    /// Moves `member` from `src` to `dst`, creating `dst` if needed. An
    /// absent member (or source) is a no-op reported as `false`. The
    /// destination's type is validated (and an expired destination evicted)
    /// before the source is touched.
    pub fn set_move(&mut self, src: &str, dst: &str, member: &str) -> Result<bool, StoreError> {
        if src == dst {
            let Some(obj) = self.lookup(src, Some(ObjectType::Set))? else {
                return Ok(false);
            };
            return Ok(obj.as_set().is_some_and(|set| set.contains(member)));
        }

        self.lookup(dst, Some(ObjectType::Set))?;

        let Some(obj) = self.lookup(src, Some(ObjectType::Set))? else {
            return Ok(false);
        };
        let set = obj.as_set_mut().ok_or(StoreError::WrongType)?;
        if !set.remove(member) {
            return Ok(false);
        }
        if set.is_empty() {
            self.remove_key(src);
        }

        match self.lookup(dst, Some(ObjectType::Set))? {
            Some(obj) => {
                let set = obj.as_set_mut().ok_or(StoreError::WrongType)?;
                set.insert(member.to_string());
            }
            None => {
                let mut set = HashSet::new();
                set.insert(member.to_string());
                self.insert(dst, Object::new(Value::Set(set)));
            }
        }
        Ok(true)
    }

    /// Members of the base set minus the members of every other set.
    pub fn set_diff(
        &mut self,
        key: &str,
        others: &[String],
        dest: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let mut result = self.snapshot_set(key)?;
        for other in others {
            if let Some(set) = self.lookup(other, Some(ObjectType::Set))?.and_then(|o| o.as_set()) {
                for member in set {
                    result.remove(member);
                }
            }
        }
        self.store_set_result(dest, &result);
        Ok(result.into_iter().collect())
    }

    /// Members present in the base set and every other set. Membership is
    /// decided by occurrence counting: a member qualifies when it was seen
    /// in all `others.len() + 1` sets.
    pub fn set_inter(
        &mut self,
        key: &str,
        others: &[String],
        dest: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let base = self.snapshot_set(key)?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for member in &base {
            *counts.entry(member.clone()).or_insert(0) += 1;
        }
        for other in others {
            if let Some(set) = self.lookup(other, Some(ObjectType::Set))?.and_then(|o| o.as_set()) {
                for member in set {
                    *counts.entry(member.clone()).or_insert(0) += 1;
                }
            }
        }

        let needed = others.len() + 1;
        let result: HashSet<String> = counts
            .into_iter()
            .filter(|(_, count)| *count == needed)
            .map(|(member, _)| member)
            .collect();

        self.store_set_result(dest, &result);
        Ok(result.into_iter().collect())
    }

    /// Members present in the base set or any other set.
    pub fn set_union(
        &mut self,
        key: &str,
        others: &[String],
        dest: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let mut result = self.snapshot_set(key)?;
        for other in others {
            if let Some(set) = self.lookup(other, Some(ObjectType::Set))?.and_then(|o| o.as_set()) {
                for member in set {
                    result.insert(member.clone());
                }
            }
        }
        self.store_set_result(dest, &result);
        Ok(result.into_iter().collect())
    }

    /// An owned copy of the set at `key`; empty when the key is absent.
    fn snapshot_set(&mut self, key: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::Set))?
            .and_then(|obj| obj.as_set())
            .cloned()
            .unwrap_or_default())
    }

    /// Materializes an algebra result, overwriting the destination. An
    /// empty result leaves the destination absent: a set-typed key never
    /// exists empty.
    fn store_set_result(&mut self, dest: Option<&str>, result: &HashSet<String>) {
        let Some(dest) = dest else { return };
        self.remove_key(dest);
        if !result.is_empty() {
            self.insert(dest, Object::new(Value::Set(result.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::string::SetFlag;

    fn add(db: &mut Db, key: &str, members: &[&str]) {
        let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
        db.set_add(key, &members).unwrap();
    }

    fn sorted(mut members: Vec<String>) -> Vec<String> {
        members.sort();
        members
    }

    #[test]
    fn test_add_counts_new_members_only() {
        let mut db = Db::new();
        let members = vec!["x".to_string(), "y".to_string()];
        assert_eq!(db.set_add("s", &members).unwrap(), 2);
        assert_eq!(db.set_add("s", &["x".to_string()]).unwrap(), 0);
        assert_eq!(db.set_card("s").unwrap(), 2);
    }

    #[test]
    fn test_remove_drains_key() {
        let mut db = Db::new();
        add(&mut db, "s", &["x", "y"]);

        let members = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        assert_eq!(db.set_remove("s", &members).unwrap(), 2);
        assert_eq!(db.type_of("s"), "none");
        assert_eq!(db.set_remove("s", &members).unwrap(), 0);
    }

    #[test]
    fn test_is_member() {
        let mut db = Db::new();
        add(&mut db, "s", &["x"]);
        assert!(db.set_is_member("s", "x").unwrap());
        assert!(!db.set_is_member("s", "y").unwrap());
        assert!(!db.set_is_member("missing", "x").unwrap());
    }

    #[test]
    fn test_members() {
        let mut db = Db::new();
        add(&mut db, "s", &["a", "b", "c"]);
        assert_eq!(sorted(db.set_members("s").unwrap()), vec!["a", "b", "c"]);
        assert!(db.set_members("missing").unwrap().is_empty());
    }

    #[test]
    fn test_pop_until_empty() {
        let mut db = Db::new();
        add(&mut db, "s", &["a", "b"]);

        let first = db.set_pop("s").unwrap().unwrap();
        let second = db.set_pop("s").unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(db.type_of("s"), "none");
        assert_eq!(db.set_pop("s").unwrap(), None);
    }

    #[test]
    fn test_rand_member_leaves_set_intact() {
        let mut db = Db::new();
        add(&mut db, "s", &["a", "b"]);

        let member = db.set_rand_member("s").unwrap().unwrap();
        assert!(member == "a" || member == "b");
        assert_eq!(db.set_card("s").unwrap(), 2);
        assert_eq!(db.set_rand_member("missing").unwrap(), None);
    }

    #[test]
    fn test_move() {
        let mut db = Db::new();
        add(&mut db, "src", &["m", "n"]);

        assert!(db.set_move("src", "dst", "m").unwrap());
        assert!(db.set_is_member("dst", "m").unwrap());
        assert!(!db.set_is_member("src", "m").unwrap());

        // Missing member is a no-op
        assert!(!db.set_move("src", "dst", "zzz").unwrap());

        // Draining the source deletes it
        assert!(db.set_move("src", "dst", "n").unwrap());
        assert_eq!(db.type_of("src"), "none");
        assert_eq!(db.set_card("dst").unwrap(), 2);
    }

    #[test]
    fn test_move_expired_destination_is_absent() {
        let mut db = Db::new();
        add(&mut db, "src", &["m"]);
        add(&mut db, "dst", &["stale"]);
        db.expire_at("dst", 1);

        assert!(db.set_move("src", "dst", "m").unwrap());
        assert_eq!(sorted(db.set_members("dst").unwrap()), vec!["m"]);
    }

    #[test]
    fn test_move_wrong_type_destination_leaves_source() {
        let mut db = Db::new();
        add(&mut db, "src", &["m"]);
        db.set("dst", "v", SetFlag::None, 0);

        assert_eq!(
            db.set_move("src", "dst", "m").unwrap_err(),
            StoreError::WrongType
        );
        assert!(db.set_is_member("src", "m").unwrap());
    }

    #[test]
    fn test_inter_shared_member() {
        let mut db = Db::new();
        add(&mut db, "a", &["m", "x", "y"]);
        add(&mut db, "b", &["m", "z"]);

        let result = db.set_inter("a", &["b".to_string()], None).unwrap();
        assert_eq!(sorted(result), vec!["m"]);
    }

    #[test]
    fn test_inter_with_missing_other_is_empty() {
        let mut db = Db::new();
        add(&mut db, "a", &["m"]);
        let result = db.set_inter("a", &["missing".to_string()], None).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_diff() {
        let mut db = Db::new();
        add(&mut db, "a", &["1", "2", "3"]);
        add(&mut db, "b", &["2", "3"]);

        let result = db.set_diff("a", &["b".to_string()], None).unwrap();
        assert_eq!(sorted(result), vec!["1"]);
    }

    #[test]
    fn test_union() {
        let mut db = Db::new();
        add(&mut db, "a", &["1", "2"]);
        add(&mut db, "b", &["2", "3"]);

        let result = db.set_union("a", &["b".to_string()], None).unwrap();
        assert_eq!(sorted(result), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_store_overwrites_destination() {
        let mut db = Db::new();
        add(&mut db, "a", &["1", "2"]);
        add(&mut db, "b", &["2", "3"]);
        db.set("dst", "old-string", SetFlag::None, 0);

        db.set_union("a", &["b".to_string()], Some("dst")).unwrap();
        assert_eq!(db.type_of("dst"), "set");
        assert_eq!(sorted(db.set_members("dst").unwrap()), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_store_empty_result_removes_destination() {
        let mut db = Db::new();
        add(&mut db, "a", &["1"]);
        add(&mut db, "b", &["1"]);
        add(&mut db, "dst", &["stale"]);

        db.set_diff("a", &["b".to_string()], Some("dst")).unwrap();
        assert_eq!(db.type_of("dst"), "none");
    }

    #[test]
    fn test_algebra_wrong_type_operand() {
        let mut db = Db::new();
        add(&mut db, "a", &["1"]);
        db.set("str", "v", SetFlag::None, 0);

        assert_eq!(
            db.set_union("a", &["str".to_string()], None).unwrap_err(),
            StoreError::WrongType
        );
        assert_eq!(
            db.set_diff("str", &[], None).unwrap_err(),
            StoreError::WrongType
        );
    }
}
