//! String Operations
//!
//! SET and friends. A written value is re-encoded on every store: text that
//! parses losslessly as a signed 64-bit decimal lands in the integer
//! encoding, everything else stays raw (see the object module). INCR and
//! DECR always leave the key integer-encoded.
//!
//! Arithmetic that would overflow an i64 fails with NotInteger rather than
//! wrapping.

use crate::storage::db::{Db, StoreError};
use crate::storage::object::{now_ms, Object, ObjectType, Value};

/// Precondition flag for SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetFlag {
    /// Unconditional write
    #[default]
    None,
    /// Write only if the key is absent or expired
    Nx,
    /// Write only if the key is present and unexpired
    Xx,
}

impl Db {
    /// Stores a string value under `key`.
    ///
    /// A violated NX/XX precondition is a no-op reported as `false`, not an
    /// error. On success any prior expiration is replaced by `expires_at`
    /// (0 clears it). Returns the previous live string value for
    /// GETSET-style callers.
    pub fn set(
        &mut self,
        key: &str,
        value: &str,
        flag: SetFlag,
        expires_at: u64,
    ) -> (bool, Option<String>) {
        let now = now_ms();
        let existing = self.peek(key);
        let live = existing.is_some_and(|obj| !obj.is_expired(now));

        match flag {
            SetFlag::Nx if live => return (false, None),
            SetFlag::Xx if !live => return (false, None),
            _ => {}
        }

        let old = if live {
            existing.and_then(Object::render_string)
        } else {
            None
        };

        let mut obj = Object::new(Value::from_string(value));
        obj.expires_at = expires_at;
        self.insert(key, obj);

        (true, old)
    }

    /// Renders the string value stored at `key`.
    pub fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lookup(key, Some(ObjectType::String))?
            .and_then(|obj| obj.render_string()))
    }

    /// Adds `delta` to the integer at `key`, creating the key as `delta`
    /// when absent. The existing value must parse as an integer whatever
    /// its current encoding.
    pub fn incr(&mut self, key: &str, delta: i64) -> Result<i64, StoreError> {
        if let Some(obj) = self.lookup(key, Some(ObjectType::String))? {
            let current = match &obj.value {
                Value::Int(n) => *n,
                Value::Raw(s) => s.parse::<i64>().map_err(|_| StoreError::NotInteger)?,
                Value::List(_) | Value::Set(_) => return Err(StoreError::WrongType),
            };
            let next = current.checked_add(delta).ok_or(StoreError::NotInteger)?;
            obj.value = Value::Int(next);
            Ok(next)
        } else {
            self.insert(key, Object::new(Value::Int(delta)));
            Ok(delta)
        }
    }

    /// Writes every pair. With `if_none_exist` the whole batch is refused
    /// unless every target key is absent or expired; nothing is written on
    /// refusal. Prior expirations of overwritten keys are cleared.
    pub fn mset(&mut self, pairs: &[(String, String)], if_none_exist: bool) -> bool {
        if if_none_exist {
            let now = now_ms();
            let any_live = pairs
                .iter()
                .any(|(key, _)| self.peek(key).is_some_and(|obj| !obj.is_expired(now)));
            if any_live {
                return false;
            }
        }

        for (key, value) in pairs {
            self.set(key, value, SetFlag::None, 0);
        }
        true
    }

    /// The inclusive `[start, end]` byte range of the rendered string,
    /// negative indices counting from the end. None when the key is absent.
    pub fn substr(&mut self, key: &str, start: i64, end: i64) -> Result<Option<String>, StoreError> {
        let Some(rendered) = self.get(key)? else {
            return Ok(None);
        };

        let bytes = rendered.as_bytes();
        let len = bytes.len() as i64;
        let mut start = if start < 0 { len + start } else { start };
        let mut end = if end < 0 { len + end } else { end };
        if start < 0 {
            start = 0;
        }
        if end >= len {
            end = len - 1;
        }
        if len == 0 || start > end || start >= len {
            return Ok(Some(String::new()));
        }

        let slice = &bytes[start as usize..=end as usize];
        Ok(Some(String::from_utf8_lossy(slice).into_owned()))
    }
}
