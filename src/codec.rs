//! Codecs
//!
//! Stores hold raw bytes. A `Codec` maps typed keys and values to those
//! bytes, and `TypedBuilder` / `TypedReader` apply a pair of codecs on the
//! way in and out.
//!
//! Lookups compare encoded keys byte for byte, so a key codec must be
//! deterministic: equal keys have to encode to equal bytes.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PalError, Result};
use crate::store::{StoreBuilder, StoreIterator, StoreReader, StoreSummary};

/// Byte encoding for one item type
pub trait Codec {
    type Item;

    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Item>;
}

// =============================================================================
// Built-in Codecs
// =============================================================================

/// Identity codec over byte vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Item = Vec<u8>;

    fn encode(&self, item: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(item.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 strings
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl Codec for Utf8Codec {
    type Item = String;

    fn encode(&self, item: &String) -> Result<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| PalError::Codec(format!("invalid UTF-8: {}", e)))
    }
}

/// Any serde type, through bincode's default (fixed-width integer) encoding
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for BincodeCodec<T> {}

impl<T> fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeCodec")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> Codec for BincodeCodec<T> {
    type Item = T;

    fn encode(&self, item: &T) -> Result<Vec<u8>> {
        bincode::serialize(item).map_err(|e| PalError::Codec(format!("encode failed: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| PalError::Codec(format!("decode failed: {}", e)))
    }
}

// =============================================================================
// Typed Adaptors
// =============================================================================

/// `StoreBuilder` that encodes keys and values on the way in
pub struct TypedBuilder<KC, VC> {
    inner: StoreBuilder,
    keys: KC,
    values: VC,
}

impl<KC: Codec, VC: Codec> TypedBuilder<KC, VC> {
    pub fn new(inner: StoreBuilder, keys: KC, values: VC) -> Self {
        Self {
            inner,
            keys,
            values,
        }
    }

    pub fn put(&mut self, key: &KC::Item, value: &VC::Item) -> Result<()> {
        let key = self.keys.encode(key)?;
        let value = self.values.encode(value)?;
        self.inner.add(&key, &value)
    }

    pub fn delete(&mut self, key: &KC::Item) -> Result<()> {
        let key = self.keys.encode(key)?;
        self.inner.delete(&key)
    }

    pub fn finish(self) -> Result<StoreSummary> {
        self.inner.finish()
    }

    pub fn into_inner(self) -> StoreBuilder {
        self.inner
    }
}

/// `StoreReader` view that decodes keys and values on the way out
pub struct TypedReader<'r, KC, VC> {
    reader: &'r StoreReader,
    keys: KC,
    values: VC,
}

impl<'r, KC: Codec, VC: Codec> TypedReader<'r, KC, VC> {
    pub fn new(reader: &'r StoreReader, keys: KC, values: VC) -> Self {
        Self {
            reader,
            keys,
            values,
        }
    }

    pub fn get(&self, key: &KC::Item) -> Result<Option<VC::Item>> {
        let key = self.keys.encode(key)?;
        match self.reader.get(&key)? {
            Some(bytes) => self.values.decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Decoded entries, in the order of `StoreReader::iter`
    pub fn iter(&self) -> TypedIter<'_, 'r, KC, VC> {
        TypedIter {
            inner: self.reader.iter(),
            keys: &self.keys,
            values: &self.values,
        }
    }

    pub fn reader(&self) -> &'r StoreReader {
        self.reader
    }
}

/// Iterator returned by `TypedReader::iter`
pub struct TypedIter<'c, 'r, KC, VC> {
    inner: StoreIterator<'r>,
    keys: &'c KC,
    values: &'c VC,
}

impl<'c, 'r, KC: Codec, VC: Codec> Iterator for TypedIter<'c, 'r, KC, VC> {
    type Item = Result<(KC::Item, VC::Item)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.and_then(|(key, value)| Ok((self.keys.decode(key)?, self.values.decode(value)?))))
    }
}
