//! # hmt
//!
//! A versioned, hash-indexed persistent trie keyed by byte sequences.
//!
//! ## Overview
//!
//! Every mutation of a [`Table`](persistent::Table) produces a new version
//! and leaves the old one intact. Versions share all untouched subtrees and
//! link back to the version they came from, so the full history of a table
//! stays available for as long as its newest version is alive.
//!
//! - **Table**: get, set, del, entries and history over byte-sequence keys
//! - **Chain**: fluent mutation sequences that stop at the first failure
//! - **Hashing**: per-lineage random seeds via `ahash`, or a custom
//!   [`KeyHasher`](persistent::KeyHasher)
//!
//! ## Feature Flags
//!
//! - `arc`: share nodes with `Arc` instead of `Rc`, making tables `Send` and
//!   `Sync` when their values and hasher are
//! - `serde`: serialize a table's current entries; deserialization builds a
//!   new lineage
//! - `full`: enable all features
//!
//! ## Example
//!
//! ```rust
//! use hmt::prelude::*;
//!
//! # fn main() -> Result<(), HashError> {
//! let t1 = Table::new().set("a", 1)?;
//! let t2 = t1.set("b", 2)?;
//! let t3 = t2.del("a")?;
//!
//! assert_eq!(t2.get("a")?.map(|entry| entry.value), Some(1));
//! assert_eq!(t3.get("a")?, None);
//! assert_eq!(t3.history().count(), 4);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use hmt::prelude::*;
/// ```
pub mod prelude {
    pub use crate::persistent::*;
}

pub mod persistent;
