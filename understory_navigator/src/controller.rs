// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The controller contract and lifecycle listeners.
//!
//! A [`Controller`] is a navigable unit: it creates a view on demand and receives ordered
//! lifecycle callbacks while the navigator moves it through its states. Every hook has a no-op
//! default, so an implementation only overrides what it needs.
//!
//! [`LifecycleListener`]s observe controllers from the outside. Each listener is registered with a
//! [`ListenerCaps`] set, and only the hooks within those capabilities are invoked.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::bundle::Bundle;
use crate::lifecycle::LifecycleState;
use crate::surface::Surface;
use crate::types::{
    ChangeKind, ContainerId, ControllerFlags, ControllerId, HostEvent, InstanceId, RetainViewMode,
    RouterId, ViewId,
};

/// Access to the surface while a controller builds its view.
pub struct ViewContext<'a> {
    surface: &'a mut dyn Surface,
    container: ContainerId,
    saved_view_state: Option<&'a Bundle>,
    child_containers: Vec<(String, ContainerId)>,
}

impl Debug for ViewContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewContext")
            .field("container", &self.container)
            .field("saved_view_state", &self.saved_view_state)
            .field("child_containers", &self.child_containers)
            .finish_non_exhaustive()
    }
}

impl<'a> ViewContext<'a> {
    pub(crate) fn new(
        surface: &'a mut dyn Surface,
        container: ContainerId,
        saved_view_state: Option<&'a Bundle>,
    ) -> Self {
        Self {
            surface,
            container,
            saved_view_state,
            child_containers: Vec::new(),
        }
    }

    /// The container the view will be shown in.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// View state saved before the previous view was destroyed, if any.
    ///
    /// The same bundle is also delivered through [`Controller::on_restore_view_state`] once the
    /// view exists.
    pub fn saved_view_state(&self) -> Option<&Bundle> {
        self.saved_view_state
    }

    /// The surface, for building view content.
    pub fn surface(&mut self) -> &mut dyn Surface {
        &mut *self.surface
    }

    /// Create an empty view for the target container.
    pub fn create_view(&mut self) -> ViewId {
        self.surface.create_view(self.container)
    }

    /// Create a container inside `view` that hosts the child router tagged `tag`.
    ///
    /// Once the view is returned, the navigator binds the child router with that tag to the new
    /// container, creating the router on first use and rebinding it on later view creations.
    pub fn child_container(&mut self, view: ViewId, tag: impl Into<String>) -> ContainerId {
        let container = self.surface.create_container(view);
        self.child_containers.push((tag.into(), container));
        container
    }

    pub(crate) fn into_child_containers(self) -> Vec<(String, ContainerId)> {
        self.child_containers
    }
}

/// A navigable unit of UI and logic.
#[expect(unused_variables, reason = "Default hooks ignore their arguments.")]
pub trait Controller {
    /// Stable name used to persist and restore the controller through a
    /// [`Registry`](crate::Registry).
    fn type_name(&self) -> &'static str;

    /// Construction arguments, persisted and handed back to the registry constructor on restore.
    fn args(&self) -> Bundle {
        Bundle::new()
    }

    /// Create the view. The default creates an empty view.
    fn create_view(&mut self, cx: &mut ViewContext<'_>) -> ViewId {
        cx.create_view()
    }

    /// The router's context became reachable.
    fn on_context_available(&mut self) {}

    /// The router's context went away.
    fn on_context_unavailable(&mut self) {}

    /// The view is in an attached container.
    fn on_attach(&mut self, view: ViewId) {}

    /// The view left the attached container.
    fn on_detach(&mut self, view: ViewId) {}

    /// The view is about to be released.
    fn on_destroy_view(&mut self, view: ViewId) {}

    /// The controller is finished.
    fn on_destroy(&mut self) {}

    /// A transition involving this controller started.
    fn on_change_started(&mut self, kind: ChangeKind) {}

    /// A transition involving this controller ended.
    fn on_change_ended(&mut self, kind: ChangeKind) {}

    /// Write state that must survive the controller being recreated.
    fn on_save_instance_state(&self, out: &mut Bundle) {}

    /// Read state written by [`on_save_instance_state`](Self::on_save_instance_state).
    fn on_restore_instance_state(&mut self, saved: &Bundle) {}

    /// Write state that must survive the view being recreated.
    fn on_save_view_state(&self, view: ViewId, out: &mut Bundle) {}

    /// Read state written by [`on_save_view_state`](Self::on_save_view_state) into a new view.
    fn on_restore_view_state(&mut self, view: ViewId, saved: &Bundle) {}

    /// Handle a back press. Return `true` to consume it.
    fn handle_back(&mut self) -> bool {
        false
    }

    /// A platform lifecycle signal reached this controller.
    fn on_host_event(&mut self, event: HostEvent) {}

    /// A result for a launch started with
    /// [`Navigator::launch_for_result`](crate::Navigator::launch_for_result).
    fn on_activity_result(&mut self, request_code: i32, result_code: i32, data: Option<&Bundle>) {}

    /// A result for a permission request started with
    /// [`Navigator::request_permissions`](crate::Navigator::request_permissions).
    fn on_request_permissions_result(
        &mut self,
        request_code: i32,
        permissions: &[String],
        granted: &[bool],
    ) {
    }
}

bitflags::bitflags! {
    /// Hooks a [`LifecycleListener`] wants to receive.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ListenerCaps: u16 {
        /// `pre/post_context_available` and `pre/post_context_unavailable`.
        const CONTEXT       = 1 << 0;
        /// `pre/post_create_view`.
        const CREATE_VIEW   = 1 << 1;
        /// `pre/post_attach`.
        const ATTACH        = 1 << 2;
        /// `pre/post_detach`.
        const DETACH        = 1 << 3;
        /// `pre/post_destroy_view`.
        const DESTROY_VIEW  = 1 << 4;
        /// `pre/post_destroy`.
        const DESTROY       = 1 << 5;
        /// `on_change_start` and `on_change_end`.
        const CHANGE        = 1 << 6;
        /// Instance state save and restore.
        const INSTANCE_STATE = 1 << 7;
        /// View state save and restore.
        const VIEW_STATE    = 1 << 8;
    }
}

/// Observer of a controller's lifecycle.
///
/// Listeners cannot reach the navigator; use interior mutability to record what they see.
#[expect(unused_variables, reason = "Default hooks ignore their arguments.")]
pub trait LifecycleListener {
    /// Before `on_context_available`.
    fn pre_context_available(&self, controller: ControllerId) {}
    /// After `on_context_available`.
    fn post_context_available(&self, controller: ControllerId) {}
    /// Before `on_context_unavailable`.
    fn pre_context_unavailable(&self, controller: ControllerId) {}
    /// After `on_context_unavailable`.
    fn post_context_unavailable(&self, controller: ControllerId) {}
    /// Before the view is created.
    fn pre_create_view(&self, controller: ControllerId) {}
    /// After the view is created.
    fn post_create_view(&self, controller: ControllerId, view: ViewId) {}
    /// Before `on_attach`.
    fn pre_attach(&self, controller: ControllerId, view: ViewId) {}
    /// After `on_attach`.
    fn post_attach(&self, controller: ControllerId, view: ViewId) {}
    /// Before `on_detach`.
    fn pre_detach(&self, controller: ControllerId, view: ViewId) {}
    /// After `on_detach`.
    fn post_detach(&self, controller: ControllerId, view: ViewId) {}
    /// Before `on_destroy_view`.
    fn pre_destroy_view(&self, controller: ControllerId, view: ViewId) {}
    /// After the view was released.
    fn post_destroy_view(&self, controller: ControllerId) {}
    /// Before `on_destroy`.
    fn pre_destroy(&self, controller: ControllerId) {}
    /// After `on_destroy`.
    fn post_destroy(&self, controller: ControllerId) {}
    /// A transition involving the controller started.
    fn on_change_start(&self, controller: ControllerId, kind: ChangeKind) {}
    /// A transition involving the controller ended.
    fn on_change_end(&self, controller: ControllerId, kind: ChangeKind) {}
    /// Instance state is being saved.
    fn on_save_instance_state(&self, controller: ControllerId, out: &mut Bundle) {}
    /// Instance state was restored.
    fn on_restore_instance_state(&self, controller: ControllerId, saved: &Bundle) {}
    /// View state is being saved.
    fn on_save_view_state(&self, controller: ControllerId, out: &mut Bundle) {}
    /// View state was restored.
    fn on_restore_view_state(&self, controller: ControllerId, saved: &Bundle) {}
}

#[derive(Clone)]
pub(crate) struct ListenerRecord {
    pub(crate) caps: ListenerCaps,
    pub(crate) listener: Rc<dyn LifecycleListener>,
}

/// Per-controller navigator state.
pub(crate) struct ControllerSlot {
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) instance_id: InstanceId,
    pub(crate) flags: ControllerFlags,
    pub(crate) phase: LifecycleState,
    pub(crate) retain_mode: RetainViewMode,
    pub(crate) view: Option<ViewId>,
    pub(crate) router: Option<RouterId>,
    pub(crate) child_routers: Vec<RouterId>,
    pub(crate) listeners: Vec<ListenerRecord>,
    pub(crate) view_state: Option<Bundle>,
    pub(crate) restored_instance_state: Option<Bundle>,
}

impl ControllerSlot {
    pub(crate) fn new(controller: Box<dyn Controller>, instance_id: InstanceId) -> Self {
        Self {
            controller,
            instance_id,
            flags: ControllerFlags::empty(),
            phase: LifecycleState::Created,
            retain_mode: RetainViewMode::default(),
            view: None,
            router: None,
            child_routers: Vec::new(),
            listeners: Vec::new(),
            view_state: None,
            restored_instance_state: None,
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        if self.flags.contains(ControllerFlags::DESTROYED) {
            LifecycleState::Destroyed
        } else if self.flags.contains(ControllerFlags::BEING_DESTROYED) {
            LifecycleState::BeingDestroyed
        } else {
            self.phase
        }
    }

    pub(crate) fn is_gone(&self) -> bool {
        self.flags
            .intersects(ControllerFlags::DESTROYED | ControllerFlags::BEING_DESTROYED)
    }
}

impl Debug for ControllerSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerSlot")
            .field("type_name", &self.controller.type_name())
            .field("instance_id", &self.instance_id)
            .field("flags", &self.flags)
            .field("phase", &self.phase)
            .field("view", &self.view)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
