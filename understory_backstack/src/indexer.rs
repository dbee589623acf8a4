// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic transaction indices.

/// Issues monotonically increasing transaction indices.
///
/// A single indexer is owned by the root of a navigation tree and handed by reference to every
/// stack in it, so indices are comparable across nested stacks. Indices start at `0` and never
/// repeat for the lifetime of the indexer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionIndexer {
    next: u64,
}

impl TransactionIndexer {
    /// Create an indexer that starts at `0`.
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Take the next index.
    pub fn next_index(&mut self) -> u64 {
        let index = self.next;
        self.next = self.next.saturating_add(1);
        index
    }

    /// The index that the next call to [`next_index`](Self::next_index) will return.
    pub const fn peek(&self) -> u64 {
        self.next
    }

    /// Make sure future indices are strictly greater than `index`.
    ///
    /// Used when transactions carrying previously issued indices are restored.
    pub fn observe(&mut self, index: u64) {
        if index >= self.next {
            self.next = index.saturating_add(1);
        }
    }
}
