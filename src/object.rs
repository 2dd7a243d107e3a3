//! Object Module
//!
//! The contract between the store and the values it keeps.
//!
//! The store never interprets payloads. Callers hand it a [`Storable`]
//! that knows its id and how to serialize itself, and read it back
//! through a [`Factory`] that turns bytes into a value.
//!
//! Any `Fn(&[u8]) -> Result<T>` is a factory, and [`Bincoded`] /
//! [`BincodeFactory`] cover serde types without hand-written codecs.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A value that can be written to the store
pub trait Storable {
    /// Identity of the object, unique among live objects
    fn id(&self) -> u64;

    /// Serialize the object into its payload bytes
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// Rebuilds a value from payload bytes
pub trait Factory<T> {
    fn restore(&self, bytes: &[u8]) -> Result<T>;
}

impl<T, F> Factory<T> for F
where
    F: Fn(&[u8]) -> Result<T>,
{
    fn restore(&self, bytes: &[u8]) -> Result<T> {
        self(bytes)
    }
}

// =============================================================================
// Raw Bytes
// =============================================================================

/// An id paired with an opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    id: u64,
    bytes: Vec<u8>,
}

impl RawObject {
    pub fn new(id: u64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Storable for RawObject {
    fn id(&self) -> u64 {
        self.id
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

/// Restores payloads as plain byte vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFactory;

impl Factory<Vec<u8>> for RawFactory {
    fn restore(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

// =============================================================================
// Serde (bincode)
// =============================================================================

/// A serde value stored under an explicit id, encoded with bincode
#[derive(Debug, Clone, PartialEq)]
pub struct Bincoded<T> {
    id: u64,
    value: T,
}

impl<T> Bincoded<T> {
    pub fn new(id: u64, value: T) -> Self {
        Self { id, value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Serialize> Storable for Bincoded<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.value)?)
    }
}

/// Restores any `DeserializeOwned` value from a bincode payload
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeFactory;

impl<T: DeserializeOwned> Factory<T> for BincodeFactory {
    fn restore(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}
