//! Credential store adapter
//!
//! Persistent key/value access within a single namespace (NVS partition,
//! EEPROM page, file). Fixed-length byte blocks and little-endian scalars
//! are the only value shapes the link needs.

pub mod credentials;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// Failed persistence call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The backend rejected the write
    WriteFailed,
    /// The backend rejected the removal
    RemoveFailed,
    /// The namespace has no room left
    Full,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::WriteFailed => f.write_str("storage write failed"),
            StoreError::RemoveFailed => f.write_str("storage removal failed"),
            StoreError::Full => f.write_str("storage namespace full"),
        }
    }
}

/// Key/value persistence within one namespace
pub trait CredentialStore {
    /// Fill `out` from `key`. Returns `false` when the key is absent or
    /// holds fewer than `out.len()` bytes; `out` is untouched in that case.
    fn get_bytes(&self, key: &str, out: &mut [u8]) -> bool;

    /// Store `value` under `key`
    fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Forget `key`. Removing an absent key succeeds.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Read a byte scalar
    fn get_u8(&self, key: &str) -> Option<u8> {
        let mut buf = [0u8; 1];
        self.get_bytes(key, &mut buf).then_some(buf[0])
    }

    /// Store a byte scalar
    fn put_u8(&mut self, key: &str, value: u8) -> Result<(), StoreError> {
        self.put_bytes(key, &[value])
    }

    /// Read a 32-bit scalar
    fn get_u32(&self, key: &str) -> Option<u32> {
        let mut buf = [0u8; 4];
        self.get_bytes(key, &mut buf).then(|| u32::from_le_bytes(buf))
    }

    /// Store a 32-bit scalar
    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError> {
        self.put_bytes(key, &value.to_le_bytes())
    }
}

impl<K: CredentialStore + ?Sized> CredentialStore for &mut K {
    fn get_bytes(&self, key: &str, out: &mut [u8]) -> bool {
        (**self).get_bytes(key, out)
    }

    fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put_bytes(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// RAM-backed store, for targets without persistent memory and for hosts
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn get_bytes(&self, key: &str, out: &mut [u8]) -> bool {
        match self.entries.get(key) {
            Some(value) if value.len() >= out.len() => {
                out.copy_from_slice(&value[..out.len()]);
                true
            }
            _ => false,
        }
    }

    fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
