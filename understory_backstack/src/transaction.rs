// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transactions: one entry of a backstack.

use alloc::string::String;

use crate::indexer::TransactionIndexer;

/// Whether a transition strategy hides the layers beneath the entry it pushes.
///
/// A handler is opaque when it removes the "from" view on push. Transparent handlers model
/// stacked overlays (dialogs, sheets) that keep lower layers rendered.
pub trait Opacity {
    /// Returns `true` if pushing with this handler removes the previous view.
    fn is_opaque(&self) -> bool;
}

/// A request to show one keyed entry with its enter/exit transition strategies.
///
/// Transactions are built with the `with_*` methods and then handed to a [`Backstack`](crate::Backstack).
/// The ordering index is assigned lazily from a [`TransactionIndexer`] the first time it is needed.
#[derive(Clone, Debug)]
pub struct Transaction<K, H> {
    key: K,
    push_handler: Option<H>,
    pop_handler: Option<H>,
    tag: Option<String>,
    index: Option<u64>,
    attached_to_router: bool,
}

impl<K, H> Transaction<K, H> {
    /// Create a transaction for `key` with default handlers and no tag.
    pub const fn new(key: K) -> Self {
        Self {
            key,
            push_handler: None,
            pop_handler: None,
            tag: None,
            index: None,
            attached_to_router: false,
        }
    }

    /// Set the handler used when this entry is pushed.
    #[must_use]
    pub fn with_push_handler(mut self, handler: H) -> Self {
        self.push_handler = Some(handler);
        self
    }

    /// Set the handler used when this entry is popped.
    #[must_use]
    pub fn with_pop_handler(mut self, handler: H) -> Self {
        self.pop_handler = Some(handler);
        self
    }

    /// Attach a lookup tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Carry a previously issued index (used when restoring saved state).
    #[must_use]
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// The keyed entry.
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// The push handler, if one was set.
    pub fn push_handler(&self) -> Option<&H> {
        self.push_handler.as_ref()
    }

    /// The pop handler, if one was set.
    pub fn pop_handler(&self) -> Option<&H> {
        self.pop_handler.as_ref()
    }

    /// The tag, if one was set.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The ordering index, if one was assigned.
    pub const fn index(&self) -> Option<u64> {
        self.index
    }

    /// Return the ordering index, taking a fresh one from `indexer` on first use.
    pub fn ensure_index(&mut self, indexer: &mut TransactionIndexer) -> u64 {
        match self.index {
            Some(index) => index,
            None => {
                let index = indexer.next_index();
                self.index = Some(index);
                index
            }
        }
    }

    pub(crate) fn set_index(&mut self, index: u64) {
        self.index = Some(index);
    }

    /// Whether a router has taken ownership of this transaction.
    pub const fn is_attached_to_router(&self) -> bool {
        self.attached_to_router
    }

    /// Record that a router has taken ownership of this transaction.
    pub fn mark_attached_to_router(&mut self) {
        self.attached_to_router = true;
    }
}

impl<K, H: Opacity> Transaction<K, H> {
    /// Whether pushing this entry hides what is beneath it.
    ///
    /// Entries without a push handler use the default swap, which is opaque.
    pub fn is_opaque(&self) -> bool {
        self.push_handler.as_ref().is_none_or(Opacity::is_opaque)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Handler(bool);

    impl Opacity for Handler {
        fn is_opaque(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn index_is_assigned_once() {
        let mut indexer = TransactionIndexer::new();
        let mut a: Transaction<u32, Handler> = Transaction::new(1);
        assert_eq!(a.index(), None);
        assert_eq!(a.ensure_index(&mut indexer), 0);
        assert_eq!(a.ensure_index(&mut indexer), 0);
        let mut b: Transaction<u32, Handler> = Transaction::new(2);
        assert_eq!(b.ensure_index(&mut indexer), 1);
    }

    #[test]
    fn missing_push_handler_is_opaque() {
        let plain: Transaction<u32, Handler> = Transaction::new(1);
        assert!(plain.is_opaque());
        let overlay = Transaction::new(2).with_push_handler(Handler(false));
        assert!(!overlay.is_opaque());
    }

    #[test]
    fn builder_sets_tag_and_handlers() {
        let tx = Transaction::new(7_u32)
            .with_push_handler(Handler(true))
            .with_pop_handler(Handler(false))
            .with_tag("detail");
        assert_eq!(tx.tag(), Some("detail"));
        assert!(tx.push_handler().is_some_and(|h| h.0));
        assert!(tx.pop_handler().is_some_and(|h| !h.0));
        assert!(!tx.is_attached_to_router());
    }
}
