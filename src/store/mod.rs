//! Embedded document store.
//!
//! Each collection is a `sled` tree of JSON documents keyed by a string.
//! Writes that must not race (first insert, read-modify-write, uniqueness
//! markers) go through compare-and-swap so concurrent requests cannot both
//! win.

use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Tree holding uniqueness markers
const META_TREE: &str = "meta";

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend failure
    #[error("store backend error: {0}")]
    Backend(String),
    /// Document could not be encoded or decoded
    #[error("document serialization error: {0}")]
    Serialization(String),
    /// Key already present
    #[error("duplicate key: {0}")]
    Duplicate(String),
    /// Key not present
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the database
#[derive(Clone)]
pub struct Database {
    db: sled::Db,
}

impl Database {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        debug!(path = %path.display(), "opening document store");
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// In-memory database removed on drop
    pub fn temporary() -> StoreResult<Self> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    /// Typed view of the collection `name`
    pub fn collection<T>(&self, name: &str) -> StoreResult<Collection<T>> {
        Ok(Collection {
            tree: self.db.open_tree(name)?,
            name: name.to_string(),
            _doc: PhantomData,
        })
    }

    /// Atomically set `marker` to `value` if it is unset.
    ///
    /// Returns `false` when another value already holds the marker.
    pub fn claim_unique(&self, marker: &str, value: &str) -> StoreResult<bool> {
        let meta = self.db.open_tree(META_TREE)?;
        let swapped = meta.compare_and_swap(marker, None as Option<&[u8]>, Some(value.as_bytes()))?;
        Ok(swapped.is_ok())
    }

    /// Clear `marker` if `value` holds it
    pub fn release_unique(&self, marker: &str, value: &str) -> StoreResult<()> {
        let meta = self.db.open_tree(META_TREE)?;
        // a different holder is left alone
        let _ = meta.compare_and_swap(marker, Some(value.as_bytes()), None as Option<&[u8]>)?;
        Ok(())
    }

    /// Current holder of `marker`
    pub fn unique_holder(&self, marker: &str) -> StoreResult<Option<String>> {
        let meta = self.db.open_tree(META_TREE)?;
        Ok(meta
            .get(marker)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// A collection of `T` documents
pub struct Collection<T> {
    tree: sled::Tree,
    name: String,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            name: self.name.clone(),
            _doc: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(doc: &T) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(doc).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> StoreResult<T> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Collection name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document stored under `key`
    pub fn find_one(&self, key: &str) -> StoreResult<Option<T>> {
        self.tree
            .get(key)?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    /// Whether `key` exists
    pub fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.tree.contains_key(key)?)
    }

    /// All documents matching `filter`, in key order
    pub fn find_many(&self, filter: impl Fn(&T) -> bool) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        for item in &self.tree {
            let (_, bytes) = item?;
            let doc = Self::decode(&bytes)?;
            if filter(&doc) {
                out.push(doc);
            }
        }
        Ok(out)
    }

    /// Every document, in key order
    pub fn all(&self) -> StoreResult<Vec<T>> {
        self.find_many(|_| true)
    }

    /// Insert `doc` under `key`, failing with [`StoreError::Duplicate`] if
    /// the key is taken
    pub fn insert(&self, key: &str, doc: &T) -> StoreResult<()> {
        let bytes = Self::encode(doc)?;
        match self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Duplicate(key.to_string())),
        }
    }

    /// Atomic read-modify-write of the document under `key`.
    ///
    /// `mutate` may run more than once if another writer gets in between;
    /// it must be safe to re-apply to a fresh copy.
    pub fn update<F>(&self, key: &str, mut mutate: F) -> StoreResult<T>
    where
        F: FnMut(&mut T) -> StoreResult<()>,
    {
        loop {
            let current = self
                .tree
                .get(key)?
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            let mut doc = Self::decode(&current)?;
            mutate(&mut doc)?;
            let next = Self::encode(&doc)?;
            if self
                .tree
                .compare_and_swap(key, Some(current), Some(next))?
                .is_ok()
            {
                return Ok(doc);
            }
            debug!(collection = %self.name, key, "concurrent update, retrying");
        }
    }

    /// Overwrite the document under `key`
    pub fn replace(&self, key: &str, doc: &T) -> StoreResult<()> {
        self.tree.insert(key, Self::encode(doc)?)?;
        Ok(())
    }

    /// Remove `key`; `false` if it was absent
    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.tree.remove(key)?.is_some())
    }

    /// Remove every document
    pub fn drop_all(&self) -> StoreResult<()> {
        self.tree.clear()?;
        Ok(())
    }
}
