// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the navigator: handles, flags, and policies.

use serde::{Deserialize, Serialize};

/// Identifier for a controller owned by a [`Navigator`](crate::Navigator).
///
/// A small, copyable handle consisting of a slot index and a generation counter. Once a controller
/// is destroyed and no transition references it any more, its slot is freed and every existing
/// `ControllerId` for it becomes stale.
/// A reused slot carries a higher generation, so stale ids never alias a live controller.
///
/// Use [`Navigator::is_alive`](crate::Navigator::is_alive) to check liveness.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ControllerId(pub(crate) u32, pub(crate) u32);

/// Identifier for a router owned by a [`Navigator`](crate::Navigator).
///
/// Generational like [`ControllerId`]. Root routers live until the navigator is dropped;
/// child routers live as long as the controller that owns them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RouterId(pub(crate) u32, pub(crate) u32);

/// Identifier of a render container supplied by the [`Surface`](crate::Surface).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

/// Identifier of a view created through the [`Surface`](crate::Surface).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ViewId(pub u64);

/// Identifier of a transition that was started and has not completed yet.
///
/// Returned by [`Navigator::in_flight_changes`](crate::Navigator::in_flight_changes) and accepted by
/// [`Navigator::complete_change`](crate::Navigator::complete_change).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ChangeId(pub(crate) u64);

/// Stable identity of a controller instance that survives save and restore.
///
/// Host callbacks (activity results, permission results) are keyed by instance id.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

bitflags::bitflags! {
    /// Per-controller state flags tracked by the navigator.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ControllerFlags: u16 {
        /// The controller's router has a reachable context.
        const CONTEXT_AVAILABLE      = 1 << 0;
        /// The view is attached to an attached container and the controller received `on_attach`.
        const ATTACHED               = 1 << 1;
        /// The view must be (re)attached the next time the router rebinds.
        const NEEDS_ATTACH           = 1 << 2;
        /// The view is in place but the parent controller is not attached yet.
        const AWAITING_PARENT_ATTACH = 1 << 3;
        /// An ancestor is running an exit transition; detaches are deferred.
        const DETACH_FROZEN          = 1 << 4;
        /// A detach arrived while frozen and will be replayed on unfreeze.
        const VIEW_WAS_DETACHED      = 1 << 5;
        /// Removed from every backstack; destruction completes once the view is released.
        const BEING_DESTROYED        = 1 << 6;
        /// `on_destroy` has run.
        const DESTROYED              = 1 << 7;
        /// View state was captured since the last attach.
        const HAS_SAVED_VIEW_STATE   = 1 << 8;
        /// The controller is the "from" side of a running transition.
        const EXITING                = 1 << 9;
        /// Back navigation may pop this controller.
        const BACK_NAVIGABLE         = 1 << 10;
    }
}

/// What a router does when asked to pop its last (root) controller.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum PopRootPolicy {
    /// Refuse to pop the root controller.
    Never,
    /// Pop the root controller but leave its view in place; the host is expected to hide it.
    PopButNotView,
    /// Pop the root controller and transition its view out.
    #[default]
    PopAndView,
}

/// Whether a controller keeps its view across detach.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum RetainViewMode {
    /// Release the view on every detach (default).
    #[default]
    ReleaseDetach,
    /// Keep the view across detach. It is still released when the host surface is torn down.
    RetainDetach,
}

/// The role a controller plays in a transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ChangeKind {
    /// Shown by a push.
    PushEnter,
    /// Covered or removed by a push.
    PushExit,
    /// Shown by a pop.
    PopEnter,
    /// Removed by a pop.
    PopExit,
}

impl ChangeKind {
    /// Kinds for the (to, from) pair of a transition.
    pub const fn for_change(is_push: bool) -> (Self, Self) {
        if is_push {
            (Self::PushEnter, Self::PushExit)
        } else {
            (Self::PopEnter, Self::PopExit)
        }
    }

    /// Returns `true` for the entering side.
    pub const fn is_enter(self) -> bool {
        matches!(self, Self::PushEnter | Self::PopEnter)
    }

    /// Returns `true` for push transitions.
    pub const fn is_push(self) -> bool {
        matches!(self, Self::PushEnter | Self::PushExit)
    }
}

/// Platform lifecycle signals forwarded by the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HostEvent {
    /// The host has a usable context again after a configuration-change teardown.
    Created,
    /// The host became visible.
    Started,
    /// The host gained focus.
    Resumed,
    /// The host lost focus.
    Paused,
    /// The host is no longer visible.
    Stopped,
    /// The host is going away.
    Destroyed {
        /// `true` if the host will be recreated and controllers must survive.
        changing_configurations: bool,
    },
}

/// Navigator-wide defaults applied to newly created routers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NavigatorConfig {
    /// Root-pop policy for new routers.
    pub pop_root_policy: PopRootPolicy,
    /// Whether new routers take part in back dispatch.
    pub back_dispatch_enabled: bool,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            pop_root_policy: PopRootPolicy::PopAndView,
            back_dispatch_enabled: true,
        }
    }
}
