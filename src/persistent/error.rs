//! Error types for table operations.

use thiserror::Error;

/// Raised when a key cannot be digested.
///
/// This is the only failure a table operation can report. The default
/// [`SeededHasher`](super::SeededHasher) never produces it; custom
/// [`KeyHasher`](super::KeyHasher) implementations may.
///
/// # Examples
///
/// ```rust
/// use hmt::persistent::HashError;
///
/// let error = HashError::digest(3, "primitive rejected input");
/// assert_eq!(
///     format!("{error}"),
///     "failed to digest a 3-byte key: primitive rejected input"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// The digest primitive rejected the key.
    #[error("failed to digest a {length}-byte key: {reason}")]
    Digest {
        /// Length of the rejected key in bytes.
        length: usize,
        /// Reason reported by the digest primitive.
        reason: String,
    },
}

impl HashError {
    /// Creates a [`HashError::Digest`] for a key of `length` bytes.
    pub fn digest(length: usize, reason: impl Into<String>) -> Self {
        Self::Digest {
            length,
            reason: reason.into(),
        }
    }
}
