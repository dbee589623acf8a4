// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The backstack container and helpers over transaction lists.

use alloc::vec::Vec;

use crate::indexer::TransactionIndexer;
use crate::transaction::{Opacity, Transaction};

/// Errors produced by [`Backstack`] mutations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackstackError {
    /// The key is already present in the backstack.
    #[error("entry is already present in the backstack")]
    Duplicate,
    /// The operation needs at least one entry.
    #[error("backstack is empty")]
    Empty,
}

/// Ordered sequence of transactions, root at the bottom and the most recent push on top.
///
/// ## Invariants
///
/// - A key appears at most once.
/// - Mutations bump [`revision`](Self::revision) and raise the changed flag read by
///   [`take_changed`](Self::take_changed).
#[derive(Clone, Debug)]
pub struct Backstack<K, H> {
    // root → top
    entries: Vec<Transaction<K, H>>,
    revision: u64,
    changed: bool,
}

impl<K, H> Default for Backstack<K, H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            revision: 0,
            changed: false,
        }
    }
}

impl<K: PartialEq, H> Backstack<K, H> {
    /// Create an empty backstack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push `tx` on top. Fails if its key is already present.
    pub fn push(&mut self, tx: Transaction<K, H>) -> Result<(), BackstackError> {
        if self.contains(tx.key()) {
            return Err(BackstackError::Duplicate);
        }
        self.entries.push(tx);
        self.touch();
        Ok(())
    }

    /// Remove and return the top entry. Fails if the backstack is empty.
    pub fn pop(&mut self) -> Result<Transaction<K, H>, BackstackError> {
        let tx = self.entries.pop().ok_or(BackstackError::Empty)?;
        self.touch();
        Ok(tx)
    }

    /// Remove every entry, returning them top first.
    pub fn pop_all(&mut self) -> Vec<Transaction<K, H>> {
        let mut out = core::mem::take(&mut self.entries);
        out.reverse();
        if !out.is_empty() {
            self.touch();
        }
        out
    }

    /// Remove the entry for `key` wherever it sits.
    pub fn remove(&mut self, key: &K) -> Option<Transaction<K, H>> {
        let pos = self.position(key)?;
        let tx = self.entries.remove(pos);
        self.touch();
        Some(tx)
    }

    /// Replace the whole sequence with `entries` (root first).
    ///
    /// Fails without modifying anything if `entries` holds a key twice.
    /// Returns the previous entries, root first.
    pub fn set_backstack(
        &mut self,
        entries: Vec<Transaction<K, H>>,
    ) -> Result<Vec<Transaction<K, H>>, BackstackError> {
        if has_duplicates(&entries) {
            return Err(BackstackError::Duplicate);
        }
        let old = core::mem::replace(&mut self.entries, entries);
        self.touch();
        Ok(old)
    }

    /// The top entry.
    pub fn peek(&self) -> Option<&Transaction<K, H>> {
        self.entries.last()
    }

    /// The bottom entry.
    pub fn root(&self) -> Option<&Transaction<K, H>> {
        self.entries.first()
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|t| t.key() == key)
    }

    /// Position of `key` counted from the root.
    pub fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|t| t.key() == key)
    }

    /// The entry for `key`.
    pub fn get(&self, key: &K) -> Option<&Transaction<K, H>> {
        self.entries.iter().find(|t| t.key() == key)
    }

    /// The entry for `key`, mutably.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut Transaction<K, H>> {
        self.entries.iter_mut().find(|t| t.key() == key)
    }

    /// Iterate top → root.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Transaction<K, H>> + '_ {
        self.entries.iter().rev()
    }

    /// Iterate root → top.
    pub fn iter_root_to_top(&self) -> impl DoubleEndedIterator<Item = &Transaction<K, H>> + '_ {
        self.entries.iter()
    }

    /// Iterate root → top, mutably. Does not count as a structural change.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Transaction<K, H>> + '_ {
        self.entries.iter_mut()
    }

    /// Assign indices to every entry and re-stabilize them; see [`stabilize_indices`].
    pub fn reindex(&mut self, indexer: &mut TransactionIndexer) {
        stabilize_indices(&mut self.entries, indexer);
    }

    /// Monotonic counter of structural changes.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns whether a structural change happened since the last call, clearing the flag.
    pub fn take_changed(&mut self) -> bool {
        core::mem::take(&mut self.changed)
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.changed = true;
    }
}

impl<K: PartialEq, H: Opacity> Backstack<K, H> {
    /// Visible entries of this backstack, root first. See [`visible_transactions`].
    pub fn visible(&self) -> Vec<&Transaction<K, H>> {
        visible_transactions(self.iter())
    }
}

/// Returns `true` if `entries` holds any key more than once.
pub fn has_duplicates<K: PartialEq, H>(entries: &[Transaction<K, H>]) -> bool {
    entries
        .iter()
        .enumerate()
        .any(|(i, a)| entries[i + 1..].iter().any(|b| a.key() == b.key()))
}

/// Make indices of `entries` (root first) strictly increase from root to top.
///
/// Entries without an index take a fresh one. The existing set of indices is then sorted and
/// handed back out in list order, so a caller can reorder a stack freely and still get a
/// consistent ordering that stays comparable with other stacks sharing the indexer.
pub fn stabilize_indices<K, H>(entries: &mut [Transaction<K, H>], indexer: &mut TransactionIndexer) {
    let mut indices: Vec<u64> = entries
        .iter_mut()
        .map(|t| t.ensure_index(indexer))
        .collect();
    indices.sort_unstable();
    for (tx, index) in entries.iter_mut().zip(indices) {
        tx.set_index(index);
    }
}

/// Compute the visible run of a stack given as a top → root iterator.
///
/// Walks from the top downward, including each entry, and stops after the first entry whose push
/// handler is opaque. The boundary entry is included. The result is ordered root first, so index
/// `0` is the lowest visible layer.
pub fn visible_transactions<'a, K: 'a, H: Opacity + 'a>(
    top_to_root: impl IntoIterator<Item = &'a Transaction<K, H>>,
) -> Vec<&'a Transaction<K, H>> {
    let mut out = Vec::new();
    for tx in top_to_root {
        out.push(tx);
        if tx.is_opaque() {
            break;
        }
    }
    out.reverse();
    out
}
