//! Versioned persistent tables.
//!
//! This module provides [`Table`], an immutable map from byte-sequence keys
//! to values, implemented as a 64-way hash array mapped trie:
//!
//! - [`Table`]: a table version with its full generation history
//! - [`Chain`]: fluent mutations that stop at the first failure
//! - [`KeyHasher`] / [`SeededHasher`]: key digests under a per-lineage seed
//! - [`Key`] / [`Entry`]: keys and stored entries
//! - [`HashError`]: the only failure a table operation reports
//!
//! # Structural Sharing
//!
//! A mutation copies only the nodes on the path from the root to the
//! affected node. All other subtrees are shared between the old and the new
//! version, and no node is ever modified after construction, so any number
//! of versions can be read at once without coordination.
//!
//! # Examples
//!
//! ```rust
//! use hmt::persistent::Table;
//!
//! # fn main() -> Result<(), hmt::persistent::HashError> {
//! let original = Table::new().set("one", 1)?.set("two", 2)?;
//! let updated = original.set("one", 100)?;
//!
//! assert_eq!(original.get("one")?.map(|entry| entry.value), Some(1));
//! assert_eq!(updated.get("one")?.map(|entry| entry.value), Some(100));
//! assert_eq!(updated.history().count(), 4);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod chain;
mod entry;
mod error;
mod hasher;
mod node;
mod table;

pub use chain::Chain;
pub use entry::Entry;
pub use entry::Key;
pub use error::HashError;
pub use hasher::KeyHasher;
pub use hasher::SeededHasher;
pub use node::Entries;
pub use table::History;
pub use table::Table;

// =============================================================================
// Tests
// =============================================================================
