//! Key digests.
//!
//! A table routes every key by a 64-bit digest computed under a seed that is
//! drawn once, when the lineage's empty table is created, and then shared by
//! every version derived from it. Digests from different lineages are not
//! comparable.

use std::fmt;
use std::hash::BuildHasher;

use super::HashError;

/// Turns key bytes into a 64-bit digest.
///
/// Implementations must be deterministic for a fixed instance: the same
/// bytes always produce the same digest.
///
/// # Examples
///
/// ```rust
/// use hmt::persistent::{HashError, KeyHasher, Table};
///
/// struct Length;
///
/// impl KeyHasher for Length {
///     fn digest(&self, key: &[u8]) -> Result<u64, HashError> {
///         Ok(key.len() as u64)
///     }
/// }
///
/// let table = Table::with_hasher(Length).set("ab", 1).unwrap();
/// assert_eq!(table.get("ab").unwrap().map(|entry| entry.value), Some(1));
/// ```
pub trait KeyHasher {
    /// Computes the digest of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the underlying digest primitive fails.
    fn digest(&self, key: &[u8]) -> Result<u64, HashError>;
}

/// The default hasher: `ahash` keyed with a per-lineage random seed.
#[derive(Clone)]
pub struct SeededHasher {
    state: ahash::RandomState,
}

impl SeededHasher {
    /// Creates a hasher with a freshly generated random seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ahash::RandomState::new(),
        }
    }

    /// Creates a hasher with fixed seeds, for reproducible digests.
    ///
    /// ```rust
    /// use hmt::persistent::{KeyHasher, SeededHasher};
    ///
    /// let first = SeededHasher::with_seeds(1, 2, 3, 4);
    /// let second = SeededHasher::with_seeds(1, 2, 3, 4);
    /// assert_eq!(first.digest(b"key"), second.digest(b"key"));
    /// ```
    #[must_use]
    pub const fn with_seeds(k0: u64, k1: u64, k2: u64, k3: u64) -> Self {
        Self {
            state: ahash::RandomState::with_seeds(k0, k1, k2, k3),
        }
    }

    /// Infallible form of [`KeyHasher::digest`].
    #[inline]
    pub(crate) fn hash_key(&self, key: &[u8]) -> u64 {
        BuildHasher::hash_one(&self.state, key)
    }
}

impl Default for SeededHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyHasher for SeededHasher {
    #[inline]
    fn digest(&self, key: &[u8]) -> Result<u64, HashError> {
        Ok(self.hash_key(key))
    }
}

impl fmt::Debug for SeededHasher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("SeededHasher").finish_non_exhaustive()
    }
}
