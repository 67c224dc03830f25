//! Versioned persistent table.
//!
//! This module provides [`Table`], an immutable associative container keyed
//! by byte sequences that remembers every version it was derived from.
//!
//! # Overview
//!
//! Each [`set`](Table::set) or effective [`del`](Table::del) returns a new
//! table and leaves the receiver untouched. The new table shares every
//! subtree the mutation did not visit and links back to the receiver, so the
//! whole lineage can be walked with [`history`](Table::history).
//!
//! - O(log64 N) get, set and del (at most 12 levels for a 64-bit digest)
//! - O(1) len, `is_empty` and generation
//! - O(generations) history walk
//!
//! # Examples
//!
//! ```rust
//! use hmt::persistent::Table;
//!
//! # fn main() -> Result<(), hmt::persistent::HashError> {
//! let empty = Table::new();
//! let first = empty.set("a", 1)?;
//! let second = first.set("b", 2)?;
//!
//! assert_eq!(second.get("a")?.map(|entry| entry.value), Some(1));
//! assert_eq!(second.len(), 2);
//!
//! // Every version stays readable
//! let removed = second.del("a")?;
//! assert_eq!(removed.get("a")?, None);
//! assert_eq!(second.get("a")?.map(|entry| entry.value), Some(1));
//! assert_eq!(removed.history().count(), 4);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::iter::FromIterator;

use super::node::{Entries, Node};
use super::{Chain, Entry, HashError, Key, KeyHasher, ReferenceCounter, SeededHasher};

// =============================================================================
// Table Definition
// =============================================================================

/// An immutable, versioned map from byte-sequence keys to values.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log64 N)        |
/// | `set`          | O(log64 N)        |
/// | `del`          | O(log64 N)        |
/// | `len`          | O(1)              |
/// | `history`      | O(generations)    |
///
/// Cloning a table is O(1) and yields a handle to the same version.
pub struct Table<V, H = SeededHasher> {
    /// Digest seed, shared by the whole lineage
    hasher: ReferenceCounter<H>,
    /// Root node of this version
    root: ReferenceCounter<Node<V>>,
    /// The version this one was derived from
    previous: Option<ReferenceCounter<Self>>,
    /// Number of effective mutations since the empty table
    generation: usize,
    /// Number of entries
    length: usize,
}

impl<V> Table<V, SeededHasher> {
    /// Creates an empty table with a freshly generated random seed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hmt::persistent::Table;
    ///
    /// let table: Table<i32> = Table::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.generation(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(SeededHasher::new())
    }
}

impl<V, H> Table<V, H> {
    /// Creates an empty table that digests keys with `hasher`.
    ///
    /// Every table derived from the result shares the same hasher.
    #[must_use]
    pub fn with_hasher(hasher: H) -> Self {
        Self {
            hasher: ReferenceCounter::new(hasher),
            root: ReferenceCounter::new(Node::empty()),
            previous: None,
            generation: 0,
            length: 0,
        }
    }

    /// Returns the number of entries in this version.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if this version contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the number of effective mutations between the empty table
    /// and this version.
    ///
    /// Deleting an absent key is not a mutation and does not advance the
    /// generation.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> usize {
        self.generation
    }

    /// Returns the version this table was derived from, if any.
    #[inline]
    #[must_use]
    pub fn previous(&self) -> Option<&Self> {
        self.previous.as_deref()
    }

    /// Returns the hasher shared by this lineage.
    #[inline]
    #[must_use]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Returns an iterator over the entries of this version.
    ///
    /// The order is determined by key digests and is stable for a given
    /// version, but unrelated to insertion order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hmt::persistent::Table;
    ///
    /// # fn main() -> Result<(), hmt::persistent::HashError> {
    /// let table = Table::new().set("a", 1)?.set("b", 2)?;
    /// let sum: i32 = table.entries().map(|entry| entry.value).sum();
    /// assert_eq!(sum, 3);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn entries(&self) -> Entries<'_, V> {
        Entries::new(&self.root, self.length)
    }

    /// Returns an iterator over the entries of this version.
    ///
    /// Same as [`entries`](Self::entries).
    #[must_use]
    pub fn iter(&self) -> Entries<'_, V> {
        self.entries()
    }

    /// Returns an iterator over the keys of this version.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries().map(|entry| &entry.key)
    }

    /// Returns an iterator over the values of this version.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries().map(|entry| &entry.value)
    }

    /// Returns an iterator over this version and all of its predecessors,
    /// newest first, ending with the empty table the lineage started from.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hmt::persistent::Table;
    ///
    /// # fn main() -> Result<(), hmt::persistent::HashError> {
    /// let table = Table::new().set("a", 1)?.set("b", 2)?;
    /// let lengths: Vec<usize> = table.history().map(|version| version.len()).collect();
    /// assert_eq!(lengths, vec![2, 1, 0]);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub const fn history(&self) -> History<'_, V, H> {
        History {
            current: Some(self),
        }
    }

    /// Returns the number of nodes on the deepest path of this version's
    /// trie.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Starts a [`Chain`] of mutations from this version.
    #[must_use]
    pub fn chain(&self) -> Chain<V, H> {
        Chain::new(self.clone())
    }

    /// Links a new version to this one.
    fn successor(&self, root: Node<V>, length: usize) -> Self {
        let successor = Self {
            hasher: ReferenceCounter::clone(&self.hasher),
            root: ReferenceCounter::new(root),
            previous: Some(ReferenceCounter::new(self.clone())),
            generation: self.generation + 1,
            length,
        };
        tracing::trace!(
            generation = successor.generation,
            length = successor.length,
            "derived table version"
        );
        successor
    }

    /// Stores `entry` under an already computed digest.
    fn insert_digest(&self, digest: u64, entry: Entry<V>) -> Self {
        let (root, added) = self.root.insert(digest, ReferenceCounter::new(entry));
        let length = if added { self.length + 1 } else { self.length };
        self.successor(root, length)
    }

    /// Looks up `key` under an already computed digest.
    pub(crate) fn lookup(&self, digest: u64, key: &[u8]) -> Option<&Entry<V>> {
        self.root.retrieve(digest, key)
    }
}

impl<V, H: KeyHasher> Table<V, H> {
    /// Computes the digest of `key` with this lineage's hasher.
    pub(crate) fn digest(&self, key: &[u8]) -> Result<u64, HashError> {
        self.hasher.digest(key)
    }

    /// Returns the entry stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the key cannot be digested.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hmt::persistent::Table;
    ///
    /// # fn main() -> Result<(), hmt::persistent::HashError> {
    /// let table = Table::new().set("hello", 42)?;
    /// assert_eq!(table.get("hello")?.map(|entry| entry.value), Some(42));
    /// assert!(table.get("world")?.is_none());
    /// # Ok(())
    /// # }
    /// ```
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<&Entry<V>>, HashError> {
        let key = key.as_ref();
        let digest = self.digest(key)?;
        Ok(self.lookup(digest, key))
    }

    /// Returns `true` if this version stores a value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the key cannot be digested.
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool, HashError> {
        self.get(key).map(|entry| entry.is_some())
    }

    /// Returns a new version with `value` stored under `key`.
    ///
    /// The new version's predecessor is `self`. Setting a key that is
    /// already present replaces its value in the new version only.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the key cannot be digested.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hmt::persistent::Table;
    ///
    /// # fn main() -> Result<(), hmt::persistent::HashError> {
    /// let first = Table::new().set("key", 1)?;
    /// let second = first.set("key", 2)?;
    ///
    /// assert_eq!(first.get("key")?.map(|entry| entry.value), Some(1));
    /// assert_eq!(second.get("key")?.map(|entry| entry.value), Some(2));
    /// assert_eq!(second.generation(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn set(&self, key: impl Into<Key>, value: V) -> Result<Self, HashError> {
        let key = key.into();
        let digest = self.digest(&key)?;
        Ok(self.insert_digest(digest, Entry { key, value }))
    }

    /// Returns a version without `key`.
    ///
    /// When the key is present, the result is a new version whose
    /// predecessor is `self`. When it is absent, the result is a handle to
    /// `self`: no version is created and the history is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the key cannot be digested.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hmt::persistent::Table;
    ///
    /// # fn main() -> Result<(), hmt::persistent::HashError> {
    /// let table = Table::new().set("a", 1)?;
    ///
    /// let removed = table.del("a")?;
    /// assert!(removed.is_empty());
    /// assert_eq!(removed.generation(), 2);
    ///
    /// let unchanged = table.del("missing")?;
    /// assert_eq!(unchanged.generation(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn del(&self, key: impl AsRef<[u8]>) -> Result<Self, HashError> {
        let key = key.as_ref();
        let digest = self.digest(key)?;
        let Some(root) = self.root.delete(digest, key) else {
            tracing::debug!(
                generation = self.generation,
                "key absent, table left unchanged"
            );
            return Ok(self.clone());
        };
        Ok(self.successor(root, self.length.saturating_sub(1)))
    }
}

// =============================================================================
// History Iterator
// =============================================================================

/// An iterator over a table and its predecessors, newest first.
pub struct History<'a, V, H> {
    current: Option<&'a Table<V, H>>,
}

impl<'a, V, H> Iterator for History<'a, V, H> {
    type Item = &'a Table<V, H>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.current?;
        self.current = table.previous();
        Some(table)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.current.map_or(0, |table| table.generation + 1);
        (remaining, Some(remaining))
    }
}

impl<V, H> ExactSizeIterator for History<'_, V, H> {}

impl<V, H> std::iter::FusedIterator for History<'_, V, H> {}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<V, H> Clone for Table<V, H> {
    fn clone(&self) -> Self {
        Self {
            hasher: ReferenceCounter::clone(&self.hasher),
            root: ReferenceCounter::clone(&self.root),
            previous: self.previous.clone(),
            generation: self.generation,
            length: self.length,
        }
    }
}

impl<V, H> Drop for Table<V, H> {
    /// Releases the history iteratively so long lineages cannot exhaust the
    /// stack.
    fn drop(&mut self) {
        let mut previous = self.previous.take();
        while let Some(table) = previous {
            previous = ReferenceCounter::try_unwrap(table)
                .ok()
                .and_then(|mut table| table.previous.take());
        }
    }
}

impl<V> Default for Table<V, SeededHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<Key>, V> FromIterator<(K, V)> for Table<V, SeededHasher> {
    /// Builds a lineage by setting each pair in turn; the result has one
    /// generation per pair.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |table, (key, value)| {
                let key = key.into();
                let digest = table.hasher.hash_key(&key);
                table.insert_digest(digest, Entry { key, value })
            })
    }
}

impl<'a, V, H> IntoIterator for &'a Table<V, H> {
    type Item = &'a Entry<V>;
    type IntoIter = Entries<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries()
    }
}

impl<V: fmt::Debug, H> fmt::Debug for Table<V, H> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_map()
            .entries(self.entries().map(|entry| (&entry.key, &entry.value)))
            .finish()
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<V: serde::Serialize, H> serde::Serialize for Table<V, H> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for entry in self {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }
}

#[cfg(feature = "serde")]
struct TableVisitor<V> {
    marker: std::marker::PhantomData<V>,
}

#[cfg(feature = "serde")]
impl<'de, V> serde::de::Visitor<'de> for TableVisitor<V>
where
    V: serde::Deserialize<'de>,
{
    type Value = Table<V, SeededHasher>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence of entries")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut table = Table::new();
        while let Some(entry) = seq.next_element::<Entry<V>>()? {
            let digest = table.hasher.hash_key(&entry.key);
            table = table.insert_digest(digest, entry);
        }
        Ok(table)
    }
}

#[cfg(feature = "serde")]
impl<'de, V> serde::Deserialize<'de> for Table<V, SeededHasher>
where
    V: serde::Deserialize<'de>,
{
    /// Deserializes into a fresh lineage with a new random seed; history is
    /// not carried over.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(TableVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
