//! List Structure and List Operations
//!
//! A [`List`] is an ordered sequence of string elements with O(1) push/pop
//! at both ends, backed by a `VecDeque` ring buffer. Positional operations
//! accept negative indices counting from the tail (`-1` is the last
//! element), the addressing convention every list command shares.
//!
//! The second half of this module implements the list commands on [`Db`].
//! A list-typed key never exists empty: whichever operation drains the last
//! element also deletes the key.

use std::collections::VecDeque;

use crate::storage::db::{Db, StoreError};
use crate::storage::object::{Object, ObjectType, Value};

/// An ordered sequence of string elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List {
    items: VecDeque<String>,
}

impl List {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the list holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts an element at the head.
    pub fn push_front(&mut self, value: String) {
        self.items.push_front(value);
    }

    /// Inserts an element at the tail.
    pub fn push_back(&mut self, value: String) {
        self.items.push_back(value);
    }

    /// Removes and returns the head element.
    pub fn pop_front(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    /// Removes and returns the tail element.
    pub fn pop_back(&mut self) -> Option<String> {
        self.items.pop_back()
    }

    /// Resolves a possibly negative index to a position, or None when the
    /// index falls outside the list.
    fn resolve(&self, index: i64) -> Option<usize> {
        let len = self.items.len() as i64;
        let actual = if index < 0 { len + index } else { index };
        if actual < 0 || actual >= len {
            None
        } else {
            Some(actual as usize)
        }
    }

    /// Returns the element at `index` (negative counts from the tail).
    pub fn get(&self, index: i64) -> Option<&String> {
        self.resolve(index).and_then(|i| self.items.get(i))
    }

    /// Replaces the element at `index`.
    pub fn set(&mut self, index: i64, value: String) -> Result<(), StoreError> {
        match self.resolve(index) {
            Some(i) => {
                self.items[i] = value;
                Ok(())
            }
            None => Err(StoreError::OutOfRange),
        }
    }

    /// Normalizes an inclusive `[start, end]` range against the current
    /// size: negative indices are offset from the tail, then clamped.
    /// Returns None when the normalized range is empty.
    fn normalize_range(&self, start: i64, end: i64) -> Option<(usize, usize)> {
        let len = self.items.len() as i64;
        if len == 0 {
            return None;
        }

        let mut start = if start < 0 { len + start } else { start };
        let mut end = if end < 0 { len + end } else { end };
        if start < 0 {
            start = 0;
        }
        if end >= len {
            end = len - 1;
        }
        if start > end || start >= len {
            return None;
        }
        Some((start as usize, end as usize))
    }

    /// Returns a snapshot of the inclusive range, not a live view.
    pub fn range(&self, start: i64, end: i64) -> Vec<String> {
        match self.normalize_range(start, end) {
            Some((start, end)) => self
                .items
                .iter()
                .skip(start)
                .take(end - start + 1)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Removes elements equal to `value`.
    ///
    /// - count > 0: remove up to `count` occurrences, head to tail
    /// - count < 0: remove up to `|count|` occurrences, tail to head
    /// - count = 0: remove every occurrence
    ///
    /// Returns the number of removed elements.
    pub fn remove(&mut self, count: i64, value: &str) -> usize {
        let max_remove = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };

        let mut removed = 0usize;
        if count >= 0 {
            let mut i = 0;
            while i < self.items.len() && removed < max_remove {
                if self.items[i] == value {
                    self.items.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = self.items.len();
            while i > 0 && removed < max_remove {
                i -= 1;
                if self.items[i] == value {
                    self.items.remove(i);
                    removed += 1;
                }
            }
        }

        removed
    }

    /// Drops every element outside the normalized inclusive range.
    pub fn trim(&mut self, start: i64, end: i64) {
        match self.normalize_range(start, end) {
            Some((start, end)) => {
                self.items.truncate(end + 1);
                self.items.drain(..start);
            }
            None => self.items.clear(),
        }
    }
}

impl Db {
    /// Pushes a value onto the head (`left = true`) or tail of the list at
    /// `key`, creating the key if absent. Returns the resulting length.
    pub fn list_push(&mut self, key: &str, value: &str, left: bool) -> Result<usize, StoreError> {
        match self.lookup(key, Some(ObjectType::List))? {
            Some(obj) => {
                let list = obj.as_list_mut().ok_or(StoreError::WrongType)?;
                if left {
                    list.push_front(value.to_string());
                } else {
                    list.push_back(value.to_string());
                }
                Ok(list.len())
            }
            None => {
                let mut list = List::new();
                if left {
                    list.push_front(value.to_string());
                } else {
                    list.push_back(value.to_string());
                }
                self.insert(key, Object::new(Value::List(list)));
                Ok(1)
            }
        }
    }

    /// Pops from the head (`left = true`) or tail of the list at `key`.
    /// The key is deleted when the pop drains the list.
    pub fn list_pop(&mut self, key: &str, left: bool) -> Result<Option<String>, StoreError> {
        let Some(obj) = self.lookup(key, Some(ObjectType::List))? else {
            return Ok(None);
        };
        let list = obj.as_list_mut().ok_or(StoreError::WrongType)?;
        let value = if left {
            list.pop_front()
        } else {
            list.pop_back()
        };
        if list.is_empty() {
            self.remove_key(key);
        }
        Ok(value)
    }

    /// The length of the list at `key`; 0 when the key is absent.
    pub fn list_len(&mut self, key: &str) -> Result<usize, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::List))?
            .and_then(|obj| obj.as_list())
            .map_or(0, List::len))
    }

    /// The element at `index`, negative counting from the tail.
    pub fn list_index(&mut self, key: &str, index: i64) -> Result<Option<String>, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::List))?
            .and_then(|obj| obj.as_list())
            .and_then(|list| list.get(index))
            .cloned())
    }

    /// The inclusive `[start, end]` slice, or None when the key is absent.
    pub fn list_range(
        &mut self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::List))?
            .and_then(|obj| obj.as_list())
            .map(|list| list.range(start, end)))
    }

    /// Replaces the element at `index`. The key must exist.
    pub fn list_set(&mut self, key: &str, index: i64, value: &str) -> Result<(), StoreError> {
        let Some(obj) = self.lookup(key, Some(ObjectType::List))? else {
            return Err(StoreError::NoSuchKey);
        };
        let list = obj.as_list_mut().ok_or(StoreError::WrongType)?;
        list.set(index, value.to_string())
    }

    /// Removes occurrences of `value` per the LREM count convention and
    /// deletes the key if the list drains.
    pub fn list_remove(&mut self, key: &str, count: i64, value: &str) -> Result<usize, StoreError> {
        let Some(obj) = self.lookup(key, Some(ObjectType::List))? else {
            return Ok(0);
        };
        let list = obj.as_list_mut().ok_or(StoreError::WrongType)?;
        let removed = list.remove(count, value);
        if list.is_empty() {
            self.remove_key(key);
        }
        Ok(removed)
    }

    /// Trims the list to the normalized inclusive range; deletes the key if
    /// nothing survives. A missing key is a successful no-op.
    pub fn list_trim(&mut self, key: &str, start: i64, end: i64) -> Result<(), StoreError> {
        let Some(obj) = self.lookup(key, Some(ObjectType::List))? else {
            return Ok(());
        };
        let list = obj.as_list_mut().ok_or(StoreError::WrongType)?;
        list.trim(start, end);
        if list.is_empty() {
            self.remove_key(key);
        }
        Ok(())
    }

    /// Pops the tail of `src` and pushes it onto the head of `dst`, creating
    /// `dst` if needed. With `src == dst` the list rotates. The destination
    /// type is validated before anything is popped, so a WrongType error
    /// leaves the source untouched.
    pub fn list_rpoplpush(&mut self, src: &str, dst: &str) -> Result<Option<String>, StoreError> {
        if src == dst {
            let Some(obj) = self.lookup(src, Some(ObjectType::List))? else {
                return Ok(None);
            };
            let list = obj.as_list_mut().ok_or(StoreError::WrongType)?;
            let Some(value) = list.pop_back() else {
                return Ok(None);
            };
            list.push_front(value.clone());
            return Ok(Some(value));
        }

        self.lookup(dst, Some(ObjectType::List))?;

        let Some(value) = self.list_pop(src, false)? else {
            return Ok(None);
        };
        self.list_push(dst, &value, true)?;
        Ok(Some(value))
    }
}
