// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors returned by navigator operations.

use alloc::string::String;

use crate::types::{ControllerId, RouterId};

/// Errors returned by [`Navigator`](crate::Navigator) operations.
///
/// A failing operation leaves the navigator unchanged.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    /// The controller is already in a backstack.
    #[error("controller {0:?} is already in a backstack")]
    AlreadyInBackstack(ControllerId),
    /// The controller was destroyed, is being destroyed, or its handle is stale.
    #[error("controller {0:?} is destroyed")]
    ControllerDestroyed(ControllerId),
    /// A new backstack lists the same controller more than once.
    #[error("controller {0:?} appears more than once in the new backstack")]
    DuplicateInBackstack(ControllerId),
    /// The operation needs a non-empty backstack.
    #[error("backstack is empty")]
    EmptyBackstack,
    /// The router handle is stale.
    #[error("router {0:?} does not exist")]
    UnknownRouter(RouterId),
    /// The operation forwards to a host and none is installed.
    #[error("no host is installed")]
    NoHost,
    /// Saved state names a controller type the registry does not know.
    #[error("no controller type registered as {0:?}")]
    UnknownControllerType(String),
    /// Saved state names a change handler type the registry does not know.
    #[error("no change handler type registered as {0:?}")]
    UnknownHandlerType(String),
}
