//! Trie nodes and the path-copying algorithms over them.
//!
//! Each level consumes the lowest 6 bits of the key's residual digest, giving
//! 64-way branching. Children are stored bitmap-compressed: a `u64` records
//! which of the 64 slots are occupied and only occupied slots are allocated,
//! in ascending slot order.
//!
//! A node holds at most one resident slot. The slot is identified by the
//! residual digest its keys had at this depth and keeps a small bucket of
//! entries, so keys whose full digests collide stay distinct.
//!
//! Nodes are never modified after construction. `insert` and `delete` copy
//! only the nodes on the visited path and share every other subtree with the
//! source node.

use std::fmt;

use smallvec::{SmallVec, smallvec};

use super::{Entry, ReferenceCounter};

// =============================================================================
// Constants
// =============================================================================

/// Branching factor (2^6 = 64)
const BRANCHING_FACTOR: usize = 64;

/// Bits of the digest consumed per level
const BITS_PER_LEVEL: u32 = 6;

/// Bit mask for extracting the slot index within a node
const MASK: u64 = (BRANCHING_FACTOR - 1) as u64;

/// Levels of distinct branching a 64-bit digest supports (ceil(64 / 6))
#[cfg(test)]
const MAX_DEPTH: usize = 11;

/// Slot index selected by the lowest 6 bits of `residual`.
#[inline]
const fn slot_index(residual: u64) -> u32 {
    (residual & MASK) as u32
}

/// Residual seen one level further down.
#[inline]
const fn advance(residual: u64) -> u64 {
    residual >> BITS_PER_LEVEL
}

// =============================================================================
// Node Definition
// =============================================================================

type Bucket<V> = SmallVec<[ReferenceCounter<Entry<V>>; 1]>;

/// The entries stored directly at a node.
struct Resident<V> {
    /// Residual digest shared by every entry in the bucket
    residual: u64,
    /// Entries whose full digests collide; almost always exactly one
    bucket: Bucket<V>,
}

impl<V> Resident<V> {
    fn position(&self, key: &[u8]) -> Option<usize> {
        self.bucket
            .iter()
            .position(|entry| entry.key.as_bytes() == key)
    }

    fn matches(&self, residual: u64, key: &[u8]) -> Option<&ReferenceCounter<Entry<V>>> {
        if self.residual == residual {
            self.position(key).map(|position| &self.bucket[position])
        } else {
            None
        }
    }
}

impl<V> Clone for Resident<V> {
    fn clone(&self) -> Self {
        Self {
            residual: self.residual,
            bucket: self.bucket.clone(),
        }
    }
}

/// A 64-way trie node.
pub struct Node<V> {
    resident: Option<Resident<V>>,
    /// Occupied child slots
    bitmap: u64,
    /// Children of occupied slots, compressed, in ascending slot order
    children: ReferenceCounter<[ReferenceCounter<Self>]>,
}

impl<V> Clone for Node<V> {
    /// Shallow copy: the resident bucket and child array are shared.
    fn clone(&self) -> Self {
        Self {
            resident: self.resident.clone(),
            bitmap: self.bitmap,
            children: ReferenceCounter::clone(&self.children),
        }
    }
}

impl<V> Node<V> {
    /// Creates a node with no resident and no children.
    pub(crate) fn empty() -> Self {
        Self {
            resident: None,
            bitmap: 0,
            children: ReferenceCounter::from(Vec::new()),
        }
    }

    const fn is_empty(&self) -> bool {
        self.resident.is_none() && self.bitmap == 0
    }

    /// Position of `index` in the compressed child array, if occupied.
    #[inline]
    const fn child_position(&self, index: u32) -> Option<usize> {
        let bit = 1u64 << index;
        if self.bitmap & bit == 0 {
            None
        } else {
            Some((self.bitmap & (bit - 1)).count_ones() as usize)
        }
    }

    fn child(&self, index: u32) -> Option<&ReferenceCounter<Self>> {
        self.child_position(index)
            .map(|position| &self.children[position])
    }

    /// Copy of this node with the child at `index` replaced by `child`.
    ///
    /// An empty `child` unlinks the slot instead of storing an empty node.
    fn with_child(&self, index: u32, child: Self) -> Self {
        let bit = 1u64 << index;
        let position = (self.bitmap & (bit - 1)).count_ones() as usize;
        let occupied = self.bitmap & bit != 0;
        let mut children = self.children.to_vec();

        let bitmap = match (occupied, child.is_empty()) {
            (true, true) => {
                children.remove(position);
                self.bitmap & !bit
            }
            (true, false) => {
                children[position] = ReferenceCounter::new(child);
                self.bitmap
            }
            (false, true) => return self.clone(),
            (false, false) => {
                children.insert(position, ReferenceCounter::new(child));
                self.bitmap | bit
            }
        };

        Self {
            resident: self.resident.clone(),
            bitmap,
            children: ReferenceCounter::from(children),
        }
    }

    fn with_resident(&self, resident: Option<Resident<V>>) -> Self {
        Self {
            resident,
            bitmap: self.bitmap,
            children: ReferenceCounter::clone(&self.children),
        }
    }

    // =========================================================================
    // Retrieve
    // =========================================================================

    /// Finds the entry for `key`, whose residual digest at this depth is
    /// `residual`.
    pub(crate) fn retrieve(&self, residual: u64, key: &[u8]) -> Option<&Entry<V>> {
        if let Some(resident) = &self.resident
            && let Some(entry) = resident.matches(residual, key)
        {
            return Some(&**entry);
        }
        self.child(slot_index(residual))?
            .retrieve(advance(residual), key)
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Returns a copy of this node with `entry` stored, and whether the key
    /// was not present before.
    pub(crate) fn insert(&self, residual: u64, entry: ReferenceCounter<Entry<V>>) -> (Self, bool) {
        match &self.resident {
            Some(resident) if resident.residual == residual => {
                if let Some(position) = resident.position(&entry.key) {
                    let mut bucket = resident.bucket.clone();
                    bucket[position] = entry;
                    (self.with_resident(Some(Resident { residual, bucket })), false)
                } else if self.stored_below(residual, &entry.key) {
                    self.insert_below(residual, entry)
                } else {
                    let mut bucket = resident.bucket.clone();
                    bucket.push(entry);
                    (self.with_resident(Some(Resident { residual, bucket })), true)
                }
            }
            Some(_) => self.insert_below(residual, entry),
            None => {
                // A vacated slot may sit above an older copy of the same key.
                if self.stored_below(residual, &entry.key) {
                    self.insert_below(residual, entry)
                } else {
                    let resident = Resident {
                        residual,
                        bucket: smallvec![entry],
                    };
                    (self.with_resident(Some(resident)), true)
                }
            }
        }
    }

    fn stored_below(&self, residual: u64, key: &[u8]) -> bool {
        self.child(slot_index(residual))
            .is_some_and(|child| child.retrieve(advance(residual), key).is_some())
    }

    fn insert_below(&self, residual: u64, entry: ReferenceCounter<Entry<V>>) -> (Self, bool) {
        let index = slot_index(residual);
        let empty = Self::empty();
        let below = self.child(index).map_or(&empty, |child| &**child);
        let (child, added) = below.insert(advance(residual), entry);
        (self.with_child(index, child), added)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Returns a copy of this node without `key`, or `None` when the key is
    /// absent and nothing needs to change.
    pub(crate) fn delete(&self, residual: u64, key: &[u8]) -> Option<Self> {
        if let Some(resident) = &self.resident
            && resident.residual == residual
            && let Some(position) = resident.position(key)
        {
            let mut bucket = resident.bucket.clone();
            bucket.remove(position);
            let resident = (!bucket.is_empty()).then_some(Resident { residual, bucket });
            return Some(self.with_resident(resident));
        }

        let index = slot_index(residual);
        let child = self.child(index)?.delete(advance(residual), key)?;
        Some(self.with_child(index, child))
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Number of nodes on the deepest root-to-leaf path.
    pub(crate) fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| child.depth())
            .max()
            .unwrap_or(0)
    }

    /// Whether this node and `other` are the same allocation's contents,
    /// i.e. share their child array.
    #[cfg(test)]
    fn shares_children_with(&self, other: &Self) -> bool {
        ReferenceCounter::ptr_eq(&self.children, &other.children)
    }
}

impl<V> fmt::Debug for Node<V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Node")
            .field(
                "resident",
                &self.resident.as_ref().map(|resident| resident.bucket.len()),
            )
            .field("bitmap", &format_args!("{:#018x}", self.bitmap))
            .field("children", &self.children.len())
            .finish()
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An iterator over the entries of a table version.
///
/// Entries stored at a node come before the entries of its children, and
/// children are visited in ascending slot order. The order depends on the
/// digests, not on insertion order.
pub struct Entries<'a, V> {
    pending: Vec<&'a Node<V>>,
    bucket: std::slice::Iter<'a, ReferenceCounter<Entry<V>>>,
    remaining: usize,
}

impl<'a, V> Entries<'a, V> {
    pub(crate) fn new(root: &'a Node<V>, length: usize) -> Self {
        Self {
            pending: vec![root],
            bucket: [].iter(),
            remaining: length,
        }
    }
}

impl<'a, V> Iterator for Entries<'a, V> {
    type Item = &'a Entry<V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.bucket.next() {
                self.remaining = self.remaining.saturating_sub(1);
                return Some(&**entry);
            }
            let node = self.pending.pop()?;
            if let Some(resident) = &node.resident {
                self.bucket = resident.bucket.iter();
            }
            self.pending
                .extend(node.children.iter().rev().map(|child| &**child));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Entries<'_, V> {}

impl<V> std::iter::FusedIterator for Entries<'_, V> {}

// =============================================================================
// Tests
// =============================================================================
