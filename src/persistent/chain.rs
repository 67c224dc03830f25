//! Fluent sequencing of table mutations.
//!
//! A [`Chain`] threads a [`Table`] through a series of `set`/`del` calls.
//! The first failing call freezes the chain: the table stays as it was right
//! before that call, the error is kept, and every later call is a no-op.
//!
//! # Examples
//!
//! ```rust
//! use hmt::persistent::Table;
//!
//! let (table, error) = Table::new()
//!     .chain()
//!     .set("a", 1)
//!     .set("b", 2)
//!     .del("a")
//!     .unwrap();
//!
//! assert!(error.is_none());
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.generation(), 3);
//! ```

use std::fmt;

use super::node::Entries;
use super::{Entry, HashError, Key, KeyHasher, SeededHasher, Table};

/// Chain state: still applying mutations, or frozen by the first failure.
enum State<V, H> {
    Active(Table<V, H>),
    Failed { table: Table<V, H>, error: HashError },
}

/// A sequence of table mutations that stops at the first failure.
pub struct Chain<V, H = SeededHasher> {
    state: State<V, H>,
}

impl<V, H> Chain<V, H> {
    /// Starts a chain from `table`.
    #[must_use]
    pub const fn new(table: Table<V, H>) -> Self {
        Self {
            state: State::Active(table),
        }
    }

    /// Returns the current table: the last one reached before any failure.
    #[must_use]
    pub const fn table(&self) -> &Table<V, H> {
        match &self.state {
            State::Active(table) | State::Failed { table, .. } => table,
        }
    }

    /// Returns `true` once a call has failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed { .. })
    }

    /// Returns the error that stopped the chain, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&HashError> {
        match &self.state {
            State::Active(_) => None,
            State::Failed { error, .. } => Some(error),
        }
    }

    /// Returns an iterator over the entries of the current table.
    #[must_use]
    pub fn entries(&self) -> Entries<'_, V> {
        self.table().entries()
    }

    /// Consumes the chain, returning the current table and the captured
    /// error.
    #[must_use]
    pub fn unwrap(self) -> (Table<V, H>, Option<HashError>) {
        match self.state {
            State::Active(table) => (table, None),
            State::Failed { table, error } => (table, Some(error)),
        }
    }

    /// Consumes the chain, returning the table or the captured error.
    ///
    /// # Errors
    ///
    /// Returns the [`HashError`] that stopped the chain.
    pub fn into_result(self) -> Result<Table<V, H>, HashError> {
        match self.state {
            State::Active(table) => Ok(table),
            State::Failed { error, .. } => Err(error),
        }
    }

    fn fail(table: Table<V, H>, error: HashError) -> Self {
        tracing::warn!(
            generation = table.generation(),
            %error,
            "chain stopped"
        );
        Self {
            state: State::Failed { table, error },
        }
    }
}

impl<V, H: KeyHasher> Chain<V, H> {
    /// Stores `value` under `key` in the current table.
    ///
    /// Does nothing once the chain has failed.
    #[must_use]
    pub fn set(self, key: impl Into<Key>, value: V) -> Self {
        match self.state {
            State::Active(table) => match table.set(key, value) {
                Ok(next) => Self::new(next),
                Err(error) => Self::fail(table, error),
            },
            failed @ State::Failed { .. } => Self { state: failed },
        }
    }

    /// Removes `key` from the current table.
    ///
    /// Does nothing once the chain has failed.
    #[must_use]
    pub fn del(self, key: impl AsRef<[u8]>) -> Self {
        match self.state {
            State::Active(table) => match table.del(key) {
                Ok(next) => Self::new(next),
                Err(error) => Self::fail(table, error),
            },
            failed @ State::Failed { .. } => Self { state: failed },
        }
    }

    /// Looks up `key` in the current table.
    ///
    /// Returns `None` without looking once the chain has failed. A key that
    /// cannot be digested stops the chain, leaving the table unchanged.
    pub fn get(&mut self, key: impl AsRef<[u8]>) -> Option<&Entry<V>> {
        let key = key.as_ref();
        let digest = match &self.state {
            State::Active(table) => table.digest(key),
            State::Failed { .. } => return None,
        };
        match digest {
            Ok(digest) => self.table().lookup(digest, key),
            Err(error) => {
                let table = self.table().clone();
                *self = Self::fail(table, error);
                None
            }
        }
    }
}

impl<V, H> From<Table<V, H>> for Chain<V, H> {
    fn from(table: Table<V, H>) -> Self {
        Self::new(table)
    }
}

impl<V: fmt::Debug, H> fmt::Debug for Chain<V, H> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Chain")
            .field("table", self.table())
            .field("error", &self.error())
            .finish()
    }
}
