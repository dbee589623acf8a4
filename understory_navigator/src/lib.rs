// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_navigator --heading-base-level=0

//! Understory Navigator: a deterministic navigation controller for stack-based UI.
//!
//! Understory Navigator manages navigable units ("controllers"), the views they put on a render
//! surface, and the transitions between them. Stacks nest: a controller's view can host its own
//! routers, each with an independent backstack.
//!
//! - [`Navigator`]: arena owning every controller and router of one tree, plus the host-facing
//!   entry points (container readiness, lifecycle events, back presses, transition completion).
//! - Router operations are `Navigator` methods taking a [`RouterId`]: push, pop, replace, and full
//!   reconciliation with [`Navigator::set_backstack`].
//! - [`Controller`]: user logic. It creates a view on demand and receives ordered lifecycle hooks.
//! - [`ChangeHandler`]: a transition strategy. Built-ins are [`SimpleSwapChangeHandler`],
//!   [`DeferredChangeHandler`], and [`NoOpChangeHandler`].
//! - [`Surface`]: the rendering primitive. [`HeadlessSurface`] is an in-memory implementation.
//! - [`SavedRouter`] and [`Registry`]: a `serde`-friendly snapshot and the constructors used to
//!   restore it.
//!
//! ## Lifecycle
//!
//! Each controller moves through [`LifecycleState`]: context available, view created, attached,
//! detached, view destroyed, being destroyed, destroyed. A controller attaches only once its view
//! is in its router's container, that container is attached, the host is started, and its parent
//! controller (if any) is attached. Child routers are finalized before their owner is destroyed.
//!
//! ## Transitions
//!
//! Transitions return immediately. A handler that reports [`ChangeStatus::Pending`] keeps its
//! "from" view on screen until the host calls [`Navigator::complete_change`]. Starting a change
//! that involves a controller already entering through a running change completes that change
//! first. Changes that would remove a view before the container is ready are queued and flushed
//! in submission order by [`Navigator::on_container_ready`].
//!
//! ## Logging
//!
//! Lifecycle transitions, change execution, and refused operations are reported through
//! [`tracing`]. The crate never installs a subscriber.
//!
//! # Example
//!
//! ```rust
//! use understory_navigator::{
//!     Controller, HeadlessSurface, LifecycleState, Navigator, RouterTransaction,
//! };
//!
//! struct Screen;
//!
//! impl Controller for Screen {
//!     fn type_name(&self) -> &'static str {
//!         "screen"
//!     }
//! }
//!
//! let mut surface = HeadlessSurface::new();
//! let container = surface.add_root_container(true);
//! let mut nav = Navigator::new(surface);
//! let router = nav.attach_router(container);
//!
//! let home = nav.insert_controller(Screen);
//! let details = nav.insert_controller(Screen);
//! nav.push_controller(router, RouterTransaction::new(home)).unwrap();
//! nav.push_controller(router, RouterTransaction::new(details)).unwrap();
//!
//! // An opaque push detaches what it covers.
//! assert!(nav.is_attached(details));
//! assert_eq!(nav.lifecycle_state(home), Some(LifecycleState::ViewDestroyed));
//!
//! // Back pops `details` and brings `home` back.
//! assert!(nav.handle_back());
//! assert!(nav.is_attached(home));
//! assert!(!nav.is_alive(details));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod bundle;
mod change;
mod controller;
mod error;
mod handler;
mod host;
mod lifecycle;
mod navigator;
mod router;
mod slots;
mod state;
mod surface;
mod types;

#[cfg(test)]
mod testing;

pub use bundle::{Bundle, StateValue};
pub use controller::{Controller, LifecycleListener, ListenerCaps, ViewContext};
pub use error::NavigationError;
pub use handler::{
    ChangeContext, ChangeHandler, ChangeStatus, DeferredChangeHandler, NoOpChangeHandler,
    SimpleSwapChangeHandler,
};
pub use host::Host;
pub use lifecycle::LifecycleState;
pub use navigator::Navigator;
pub use router::{RouterBackstack, RouterTransaction};
pub use state::{Registry, SavedHandler, SavedRouter, SavedTransaction};
pub use surface::{HeadlessSurface, Surface, SurfaceOp};
pub use types::{
    ChangeId, ChangeKind, ContainerId, ControllerFlags, ControllerId, HostEvent, InstanceId,
    NavigatorConfig, PopRootPolicy, RetainViewMode, RouterId, ViewId,
};
