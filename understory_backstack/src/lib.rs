// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_backstack --heading-base-level=0

//! Understory Backstack: an ordered navigation stack of transactions.
//!
//! Understory Backstack is the leaf building block of a stack-based navigation engine.
//!
//! - [`Transaction`] pairs a key (usually a controller handle) with optional push/pop transition
//!   strategies, an optional tag, and a lazily assigned ordering index.
//! - [`Backstack`] holds transactions root→top and rejects duplicate keys.
//! - [`TransactionIndexer`] issues monotonically increasing indices shared by every stack in a tree,
//!   so relative order survives reordering and is comparable across nested stacks.
//! - [`visible_transactions`] computes the run of top entries not yet obscured by an opaque layer.
//!
//! It is generic over the key `K` and the handler type `H` and does not know how transitions are
//! performed. Higher layers (like a router) interpret handlers through the [`Opacity`] trait.
//!
//! ## Structural changes
//!
//! Every mutation bumps [`Backstack::revision`] and raises a changed flag.
//! Consumers poll [`Backstack::take_changed`] after an operation to recompute derived state
//! (for example back-navigation eligibility) once per structural change.
//!
//! # Example
//!
//! ```rust
//! use understory_backstack::{Backstack, Opacity, Transaction, TransactionIndexer, visible_transactions};
//!
//! #[derive(Clone, Debug)]
//! struct Overlay(bool);
//! impl Opacity for Overlay {
//!     fn is_opaque(&self) -> bool {
//!         self.0
//!     }
//! }
//!
//! let mut indexer = TransactionIndexer::new();
//! let mut stack: Backstack<u32, Overlay> = Backstack::new();
//! for (key, opaque) in [(1, true), (2, true), (3, false)] {
//!     let mut tx = Transaction::new(key).with_push_handler(Overlay(opaque));
//!     tx.ensure_index(&mut indexer);
//!     stack.push(tx).unwrap();
//! }
//!
//! // Pushing a key twice is rejected.
//! assert!(stack.push(Transaction::new(2)).is_err());
//!
//! // `3` is a transparent overlay, so `2` remains visible beneath it.
//! let visible: Vec<u32> = visible_transactions(stack.iter()).iter().map(|t| *t.key()).collect();
//! assert_eq!(visible, [2, 3]);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod backstack;
mod indexer;
mod transaction;

pub use backstack::{Backstack, BackstackError, has_duplicates, stabilize_indices, visible_transactions};
pub use indexer::TransactionIndexer;
pub use transaction::{Opacity, Transaction};
