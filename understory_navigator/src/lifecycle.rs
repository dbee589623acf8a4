// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Controller lifecycle: states, legal edges, and the transitions the navigator drives.
//!
//! ## States
//!
//! ```text
//! Created          → ContextAvailable
//! ContextAvailable → ViewCreated | Created
//! ViewCreated      → Attached | ViewDestroyed
//! Attached         → Detached
//! Detached         → Attached | ViewDestroyed
//! ViewDestroyed    → ViewCreated | Created
//! ```
//!
//! Any state may move to `BeingDestroyed` and from there to `Destroyed`. The two terminal
//! states are derived from [`ControllerFlags`]; the others are tracked per controller and
//! every change is checked against [`LifecycleState::can_transition_to`] in debug builds.
//!
//! ## Rules
//!
//! - Context becomes available when the router's context is reachable: the navigator has one and,
//!   for child routers, the parent controller has one.
//! - A view is created on the first render request. A live view under another container is
//!   detached and released first.
//! - Attach requires the view to sit in the router's container, the container to be attached, the
//!   host to be started, and the parent controller (if any) to be attached. Otherwise the
//!   controller waits with [`ControllerFlags::AWAITING_PARENT_ATTACH`].
//! - Detach is deferred while [`ControllerFlags::DETACH_FROZEN`] is set and replayed on unfreeze.
//! - The view is released on detach when the retain mode is
//!   [`RetainViewMode::ReleaseDetach`], when removal is forced, or while being destroyed.
//! - Destruction completes once the view is gone and no transition uses the controller as its exit.

use alloc::vec::Vec;

use tracing::{debug, trace};

use crate::bundle::Bundle;
use crate::controller::{LifecycleListener, ListenerCaps, ViewContext};
use crate::navigator::Navigator;
use crate::router::RouterHost;
use crate::surface::Surface;
use crate::types::{ContainerId, ControllerFlags, ControllerId, RetainViewMode, RouterId, ViewId};

/// Lifecycle state of a controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LifecycleState {
    /// Constructed; no context yet.
    Created,
    /// The router's context is reachable.
    ContextAvailable,
    /// A view exists but is not attached.
    ViewCreated,
    /// The view is attached.
    Attached,
    /// The view was detached and is retained.
    Detached,
    /// The view was released.
    ViewDestroyed,
    /// Removed from every backstack; waiting for its view and transitions to finish.
    BeingDestroyed,
    /// Finished.
    Destroyed,
}

impl LifecycleState {
    /// Returns `true` if moving from `self` to `next` is a legal lifecycle edge.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::ContextAvailable)
                | (Self::ContextAvailable, Self::ViewCreated | Self::Created)
                | (Self::ViewCreated, Self::Attached | Self::ViewDestroyed)
                | (Self::Attached, Self::Detached)
                | (Self::Detached, Self::Attached | Self::ViewDestroyed)
                | (Self::ViewDestroyed, Self::ViewCreated | Self::Created)
                | (
                    Self::Created
                        | Self::ContextAvailable
                        | Self::ViewCreated
                        | Self::Attached
                        | Self::Detached
                        | Self::ViewDestroyed,
                    Self::BeingDestroyed
                )
                | (Self::BeingDestroyed, Self::Destroyed)
        )
    }

    /// Returns `true` while the controller holds a view.
    pub const fn has_view(self) -> bool {
        matches!(self, Self::ViewCreated | Self::Attached | Self::Detached)
    }
}

/// How a detach treats the view.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum DetachMode {
    /// Release according to the retain mode, and always while being destroyed.
    Normal,
    /// Always release.
    Release,
    /// Keep the view.
    Retain,
    /// Drop the reference but leave the view on the surface.
    Abandon,
}

impl<S: Surface> Navigator<S> {
    pub(crate) fn flags(&self, c: ControllerId) -> ControllerFlags {
        self.controllers
            .get(c)
            .map(|s| s.flags)
            .unwrap_or(ControllerFlags::empty())
    }

    pub(crate) fn notify(
        &self,
        c: ControllerId,
        caps: ListenerCaps,
        mut f: impl FnMut(&dyn LifecycleListener),
    ) {
        let Some(slot) = self.controllers.get(c) else {
            return;
        };
        let snapshot: Vec<_> = slot
            .listeners
            .iter()
            .filter(|r| r.caps.contains(caps))
            .map(|r| r.listener.clone())
            .collect();
        for listener in snapshot {
            f(&*listener);
        }
    }

    fn set_phase(&mut self, c: ControllerId, next: LifecycleState) {
        let Some(slot) = self.controllers.get_mut(c) else {
            return;
        };
        let prev = slot.phase;
        if prev == next {
            return;
        }
        debug_assert!(
            prev.can_transition_to(next),
            "illegal lifecycle transition {prev:?} -> {next:?}"
        );
        slot.phase = next;
        debug!(controller = ?c, from = ?prev, to = ?next, "lifecycle transition");
    }

    pub(crate) fn router_context_reachable(&self, r: RouterId) -> bool {
        if !self.context_available {
            return false;
        }
        match self.routers.get(r).map(|s| s.host) {
            Some(RouterHost::Root) => true,
            Some(RouterHost::Controller(parent)) => self
                .flags(parent)
                .contains(ControllerFlags::CONTEXT_AVAILABLE),
            None => false,
        }
    }

    /// Point `c` at `r` and make its context available when reachable.
    pub(crate) fn bind_controller(&mut self, c: ControllerId, r: RouterId) {
        let Some(slot) = self.controllers.get_mut(c) else {
            return;
        };
        slot.router = Some(r);
        if self.router_context_reachable(r) {
            self.make_context_available(c);
        }
    }

    pub(crate) fn make_context_available(&mut self, c: ControllerId) {
        let flags = self.flags(c);
        if self.controllers.get(c).is_none()
            || flags.intersects(ControllerFlags::CONTEXT_AVAILABLE | ControllerFlags::DESTROYED)
        {
            return;
        }
        self.notify(c, ListenerCaps::CONTEXT, |l| l.pre_context_available(c));
        let mut phase = LifecycleState::Created;
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.flags.insert(ControllerFlags::CONTEXT_AVAILABLE);
            phase = slot.phase;
        }
        if phase == LifecycleState::Created {
            self.set_phase(c, LifecycleState::ContextAvailable);
        }
        let mut restored = None;
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.controller.on_context_available();
            restored = slot.restored_instance_state.take();
        }
        self.notify(c, ListenerCaps::CONTEXT, |l| l.post_context_available(c));
        if let Some(saved) = restored {
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.controller.on_restore_instance_state(&saved);
            }
            self.notify(c, ListenerCaps::INSTANCE_STATE, |l| {
                l.on_restore_instance_state(c, &saved);
            });
        }
        for child in self.child_routers_of(c) {
            for cc in self.router_controllers(child) {
                self.make_context_available(cc);
            }
        }
    }

    pub(crate) fn make_context_unavailable(&mut self, c: ControllerId) {
        for child in self.child_routers_of(c) {
            for cc in self.router_all_controllers(child) {
                self.make_context_unavailable(cc);
            }
        }
        if !self.flags(c).contains(ControllerFlags::CONTEXT_AVAILABLE) {
            return;
        }
        self.notify(c, ListenerCaps::CONTEXT, |l| l.pre_context_unavailable(c));
        let mut phase = LifecycleState::Created;
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.flags.remove(ControllerFlags::CONTEXT_AVAILABLE);
            slot.controller.on_context_unavailable();
            phase = slot.phase;
        }
        if matches!(
            phase,
            LifecycleState::ContextAvailable | LifecycleState::ViewDestroyed
        ) {
            self.set_phase(c, LifecycleState::Created);
        }
        self.notify(c, ListenerCaps::CONTEXT, |l| l.post_context_unavailable(c));
    }

    /// Return the view of `c` for `container`, creating it if needed.
    pub(crate) fn inflate(&mut self, c: ControllerId, container: ContainerId) -> Option<ViewId> {
        let slot = self.controllers.get(c)?;
        if let Some(view) = slot.view {
            match self.surface.parent_of(view) {
                Some(parent) if parent != container => {
                    trace!(controller = ?c, ?view, "view lives in another container; recreating");
                    self.detach(c, DetachMode::Release);
                }
                _ => return Some(view),
            }
        }
        if !self.flags(c).contains(ControllerFlags::CONTEXT_AVAILABLE) {
            if let Some(r) = self.controllers.get(c).and_then(|s| s.router)
                && self.router_context_reachable(r)
            {
                self.make_context_available(c);
            }
            if !self.flags(c).contains(ControllerFlags::CONTEXT_AVAILABLE) {
                return None;
            }
        }
        self.notify(c, ListenerCaps::CREATE_VIEW, |l| l.pre_create_view(c));
        let slot = self.controllers.get_mut(c)?;
        let saved = slot.view_state.clone();
        let mut cx = ViewContext::new(&mut self.surface, container, saved.as_ref());
        let view = slot.controller.create_view(&mut cx);
        let child_containers = cx.into_child_containers();
        slot.view = Some(view);
        self.set_phase(c, LifecycleState::ViewCreated);
        self.notify(c, ListenerCaps::CREATE_VIEW, |l| l.post_create_view(c, view));
        if let Some(saved) = saved {
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.controller.on_restore_view_state(view, &saved);
            }
            self.notify(c, ListenerCaps::VIEW_STATE, |l| l.on_restore_view_state(c, &saved));
        }
        for (tag, child_container) in child_containers {
            self.bind_child_router(c, child_container, tag);
        }
        Some(view)
    }

    fn save_view_state(&mut self, c: ControllerId, view: ViewId) {
        let mut out = Bundle::new();
        if let Some(slot) = self.controllers.get(c) {
            slot.controller.on_save_view_state(view, &mut out);
        }
        self.notify(c, ListenerCaps::VIEW_STATE, |l| l.on_save_view_state(c, &mut out));
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.view_state = Some(out);
            slot.flags.insert(ControllerFlags::HAS_SAVED_VIEW_STATE);
        }
    }

    /// Attach `c` if every attach condition holds.
    pub(crate) fn try_attach(&mut self, c: ControllerId) {
        let Some(slot) = self.controllers.get(c) else {
            return;
        };
        if slot.is_gone() || slot.flags.contains(ControllerFlags::ATTACHED) {
            return;
        }
        let (Some(view), Some(r)) = (slot.view, slot.router) else {
            return;
        };
        let Some(router) = self.routers.get(r) else {
            return;
        };
        let Some(container) = router.container else {
            return;
        };
        if self.surface.parent_of(view) != Some(container) || !self.surface.is_attached(container)
        {
            return;
        }
        if let RouterHost::Controller(parent) = router.host
            && !self.flags(parent).contains(ControllerFlags::ATTACHED)
        {
            trace!(controller = ?c, ?parent, "waiting for parent attach");
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.flags.insert(ControllerFlags::AWAITING_PARENT_ATTACH);
            }
            return;
        }
        if !self.host_started {
            return;
        }
        self.notify(c, ListenerCaps::ATTACH, |l| l.pre_attach(c, view));
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.flags.insert(ControllerFlags::ATTACHED);
            slot.flags.remove(
                ControllerFlags::AWAITING_PARENT_ATTACH
                    | ControllerFlags::NEEDS_ATTACH
                    | ControllerFlags::HAS_SAVED_VIEW_STATE
                    | ControllerFlags::VIEW_WAS_DETACHED,
            );
        }
        self.set_phase(c, LifecycleState::Attached);
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.controller.on_attach(view);
        }
        self.notify(c, ListenerCaps::ATTACH, |l| l.post_attach(c, view));
        for child in self.child_routers_of(c) {
            self.on_parent_attached(child);
        }
    }

    fn on_parent_attached(&mut self, r: RouterId) {
        let Some(router) = self.routers.get_mut(r) else {
            return;
        };
        router.container_ready = router.container.is_some();
        self.rebind_router(r);
        for c in self.router_controllers(r) {
            self.try_attach(c);
        }
        self.flush_pending(r);
    }

    /// Detach `c`, cascading to attached controllers of its child routers first.
    pub(crate) fn detach(&mut self, c: ControllerId, mode: DetachMode) {
        let Some(slot) = self.controllers.get(c) else {
            return;
        };
        let release = match mode {
            DetachMode::Retain => false,
            DetachMode::Release | DetachMode::Abandon => true,
            DetachMode::Normal => {
                slot.retain_mode == RetainViewMode::ReleaseDetach
                    || slot.flags.contains(ControllerFlags::BEING_DESTROYED)
            }
        };
        let was_attached = slot.flags.contains(ControllerFlags::ATTACHED);
        let view = slot.view;
        if was_attached {
            let child_mode = match mode {
                DetachMode::Abandon => DetachMode::Normal,
                other => other,
            };
            let children = self.child_routers_of(c);
            for &child in &children {
                self.prepare_for_host_detach(child);
            }
            for &child in &children {
                for cc in self.router_all_controllers(child) {
                    if self.flags(cc).contains(ControllerFlags::ATTACHED) {
                        self.detach_child(cc, child_mode);
                    }
                }
            }
        }
        if was_attached && let Some(view) = view {
            self.notify(c, ListenerCaps::DETACH, |l| l.pre_detach(c, view));
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.flags.remove(ControllerFlags::ATTACHED);
            }
            self.set_phase(c, LifecycleState::Detached);
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.controller.on_detach(view);
            }
            self.notify(c, ListenerCaps::DETACH, |l| l.post_detach(c, view));
        }
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.flags.remove(ControllerFlags::AWAITING_PARENT_ATTACH);
        }
        if release {
            self.remove_view_reference(c, mode == DetachMode::Abandon);
        }
    }

    fn detach_child(&mut self, c: ControllerId, mode: DetachMode) {
        if self.flags(c).contains(ControllerFlags::DETACH_FROZEN) {
            trace!(controller = ?c, "detach deferred while frozen");
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.flags.insert(ControllerFlags::VIEW_WAS_DETACHED);
            }
            return;
        }
        self.detach(c, mode);
    }

    /// The view of `c` left its container.
    pub(crate) fn on_view_removed(&mut self, c: ControllerId) {
        self.detach_child(c, DetachMode::Normal);
    }

    /// Release the view of `c`, then finish destruction if it was pending.
    pub(crate) fn remove_view_reference(&mut self, c: ControllerId, keep_on_surface: bool) {
        let Some(slot) = self.controllers.get(c) else {
            return;
        };
        if let Some(view) = slot.view {
            if slot.flags.contains(ControllerFlags::ATTACHED) {
                self.detach(c, DetachMode::Retain);
            }
            if !self
                .flags(c)
                .intersects(ControllerFlags::BEING_DESTROYED | ControllerFlags::HAS_SAVED_VIEW_STATE)
            {
                self.save_view_state(c, view);
            }
            self.notify(c, ListenerCaps::DESTROY_VIEW, |l| l.pre_destroy_view(c, view));
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.controller.on_destroy_view(view);
            }
            for child in self.child_routers_of(c) {
                self.remove_router_host(child);
            }
            if !keep_on_surface {
                if let Some(parent) = self.surface.parent_of(view) {
                    self.surface.remove_view(parent, view);
                }
                self.surface.release_view(view);
            }
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.view = None;
            }
            self.set_phase(c, LifecycleState::ViewDestroyed);
            self.notify(c, ListenerCaps::DESTROY_VIEW, |l| l.post_destroy_view(c));
        }
        let flags = self.flags(c);
        if flags.contains(ControllerFlags::BEING_DESTROYED)
            && !flags.intersects(ControllerFlags::EXITING | ControllerFlags::DESTROYED)
            && !self.is_pending_from(c)
        {
            self.perform_destroy(c);
        }
    }

    /// Run `on_destroy` for `c` after finalizing its child routers.
    pub(crate) fn perform_destroy(&mut self, c: ControllerId) {
        if self.controllers.get(c).is_none() || self.flags(c).contains(ControllerFlags::DESTROYED)
        {
            return;
        }
        for child in self.child_routers_of(c) {
            self.destroy_child_router(child);
        }
        if self.flags(c).contains(ControllerFlags::CONTEXT_AVAILABLE) {
            self.make_context_unavailable(c);
        }
        self.notify(c, ListenerCaps::DESTROY, |l| l.pre_destroy(c));
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.flags
                .insert(ControllerFlags::BEING_DESTROYED | ControllerFlags::DESTROYED);
            slot.controller.on_destroy();
        }
        self.forget_requests(c);
        debug!(controller = ?c, "lifecycle transition to Destroyed");
        self.notify(c, ListenerCaps::DESTROY, |l| l.post_destroy(c));
    }

    /// Finish destroying `c` once nothing uses it as the exit of a transition.
    pub(crate) fn settle_destroy(&mut self, c: ControllerId) {
        let flags = self.flags(c);
        if !flags.contains(ControllerFlags::BEING_DESTROYED)
            || flags.intersects(ControllerFlags::DESTROYED | ControllerFlags::EXITING)
            || self.is_pending_from(c)
        {
            return;
        }
        for child in self.child_routers_of(c) {
            self.destroy_child_router(child);
        }
        if self.controllers.get(c).is_some_and(|s| s.view.is_some()) {
            self.detach(c, DetachMode::Release);
        } else {
            self.perform_destroy(c);
        }
    }

    /// Recursively freeze or unfreeze detaches for controllers of `r`.
    pub(crate) fn set_detach_frozen(&mut self, r: RouterId, frozen: bool) {
        for c in self.router_all_controllers(r) {
            let mut replay = false;
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.flags.set(ControllerFlags::DETACH_FROZEN, frozen);
                if !frozen && slot.flags.contains(ControllerFlags::VIEW_WAS_DETACHED) {
                    slot.flags.remove(ControllerFlags::VIEW_WAS_DETACHED);
                    replay = true;
                }
            }
            for child in self.child_routers_of(c) {
                self.set_detach_frozen(child, frozen);
            }
            if replay {
                self.detach(c, DetachMode::Normal);
            }
        }
    }

    /// Remember which controllers of `r` must reattach once its host returns.
    pub(crate) fn prepare_for_host_detach(&mut self, r: RouterId) {
        let controllers = self.router_controllers(r);
        for &c in &controllers {
            if self.complete_change_to(c)
                && let Some(slot) = self.controllers.get_mut(c)
            {
                slot.flags.insert(ControllerFlags::NEEDS_ATTACH);
            }
        }
        for c in controllers {
            if let Some(slot) = self.controllers.get_mut(c)
                && slot.flags.contains(ControllerFlags::ATTACHED)
            {
                slot.flags.insert(ControllerFlags::NEEDS_ATTACH);
            }
            for child in self.child_routers_of(c) {
                self.prepare_for_host_detach(child);
            }
        }
        if let Some(router) = self.routers.get_mut(r) {
            router.container_ready = false;
        }
    }

    /// Unbind `r` from its container: every view it shows is released.
    pub(crate) fn remove_router_host(&mut self, r: RouterId) {
        let Some(router) = self.routers.get(r) else {
            return;
        };
        let Some(container) = router.container else {
            return;
        };
        let members = self.router_all_controllers(r);
        for &c in &members {
            self.complete_changes_touching(c);
        }
        let shown: Vec<ControllerId> = self.router_controllers(r);
        for c in members {
            let Some(view) = self.controllers.get(c).and_then(|s| s.view) else {
                continue;
            };
            if shown.contains(&c)
                && self.surface.parent_of(view) == Some(container)
                && let Some(slot) = self.controllers.get_mut(c)
            {
                slot.flags.insert(ControllerFlags::NEEDS_ATTACH);
            }
            self.detach(c, DetachMode::Release);
        }
        let mut orphaned = Vec::new();
        if let Some(router) = self.routers.get_mut(r) {
            router.container = None;
            router.container_ready = false;
            orphaned.extend(router.pending.drain(..));
        }
        debug!(router = ?r, ?container, "router host removed");
        for change in orphaned {
            if let Some(to) = change.to
                && let Some(slot) = self.controllers.get_mut(to)
            {
                slot.flags.insert(ControllerFlags::NEEDS_ATTACH);
            }
            if let Some(from) = change.from {
                self.settle_destroy(from);
            }
        }
    }

    pub(crate) fn child_routers_of(&self, c: ControllerId) -> Vec<RouterId> {
        self.controllers
            .get(c)
            .map(|s| s.child_routers.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, entries};
    use crate::types::RetainViewMode;
    use crate::{HostEvent, RouterTransaction, SimpleSwapChangeHandler};
    use alloc::boxed::Box;
    use alloc::vec;

    #[test]
    fn lifecycle_edges() {
        use LifecycleState as L;
        assert!(L::Created.can_transition_to(L::ContextAvailable));
        assert!(L::Detached.can_transition_to(L::Attached));
        assert!(L::Attached.can_transition_to(L::BeingDestroyed));
        assert!(L::BeingDestroyed.can_transition_to(L::Destroyed));
        assert!(!L::Created.can_transition_to(L::Attached));
        assert!(!L::Attached.can_transition_to(L::ViewDestroyed));
        assert!(!L::Destroyed.can_transition_to(L::Created));
        assert!(L::Detached.has_view());
        assert!(!L::ViewDestroyed.has_view());
    }

    #[test]
    fn push_drives_first_controller_to_attached() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        assert_eq!(
            entries(&f.log, "A"),
            vec![
                "A:context_available",
                "A:create_view",
                "A:change_started PushEnter",
                "A:attach",
                "A:change_ended PushEnter",
            ]
        );
        assert_eq!(f.nav.lifecycle_state(a), Some(LifecycleState::Attached));
    }

    #[test]
    fn retained_views_survive_detach() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.set_retain_view_mode(a, RetainViewMode::RetainDetach).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        let view = f.nav.view_of(a).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        assert_eq!(f.nav.lifecycle_state(a), Some(LifecycleState::Detached));
        assert_eq!(f.nav.view_of(a), Some(view));
        f.nav.pop_current_controller(f.router).unwrap();
        assert_eq!(f.nav.view_of(a), Some(view));
        assert_eq!(f.count("A:create_view"), 1);
        assert_eq!(f.nav.lifecycle_state(a), Some(LifecycleState::Attached));
    }

    #[test]
    fn retained_view_moved_to_another_container_is_recreated() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.set_retain_view_mode(a, RetainViewMode::RetainDetach).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        let stale = f.nav.view_of(a).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        let elsewhere = f.nav.surface_mut().add_root_container(true);
        f.nav.surface_mut().add_view(elsewhere, stale);

        f.nav.pop_current_controller(f.router).unwrap();
        let view = f.nav.view_of(a).unwrap();
        assert_ne!(view, stale);
        assert!(f.nav.surface().is_released(stale));
        assert!(f.nav.surface().children(elsewhere).is_empty());
        assert_eq!(f.nav.surface().children(f.container), vec![view]);
        assert_eq!(f.count("A:create_view"), 2);
        assert_eq!(f.count("A:destroy_view"), 1);
        assert!(f.nav.is_attached(a));
    }

    #[test]
    fn switching_to_release_drops_a_detached_view() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.set_retain_view_mode(a, RetainViewMode::RetainDetach).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        f.nav.set_retain_view_mode(a, RetainViewMode::ReleaseDetach).unwrap();
        assert_eq!(f.nav.view_of(a), None);
        assert_eq!(f.nav.lifecycle_state(a), Some(LifecycleState::ViewDestroyed));
    }

    #[test]
    fn destroy_releases_view_before_on_destroy() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        f.log.borrow_mut().clear();
        f.nav.pop_current_controller(f.router).unwrap();
        let b_events = entries(&f.log, "B");
        assert_eq!(
            b_events,
            vec![
                "B:change_started PopExit",
                "B:detach",
                "B:destroy_view",
                "B:change_ended PopExit",
                "B:context_unavailable",
                "B:destroy",
            ]
        );
        assert!(!f.nav.is_alive(b));
    }

    #[test]
    fn child_controllers_wait_for_the_parent_to_attach() {
        let mut f = Fixture::new();
        let parent = f.parent("P", &["inner"]);
        let child = f.controller("C");
        f.nav.push_controller(f.router, RouterTransaction::new(parent)).unwrap();
        let inner = f.nav.child_routers(parent)[0];
        f.nav.on_host_event(HostEvent::Stopped);
        assert!(!f.nav.is_attached(parent));
        f.nav.push_controller(inner, RouterTransaction::new(child)).unwrap();
        assert!(f.nav.view_of(child).is_some());
        assert!(!f.nav.is_attached(child));
        assert!(
            f.nav
                .controller_flags(child)
                .unwrap()
                .contains(ControllerFlags::AWAITING_PARENT_ATTACH)
        );
        f.log.borrow_mut().clear();
        f.nav.on_host_event(HostEvent::Started);
        assert!(f.nav.is_attached(parent));
        assert!(f.nav.is_attached(child));
        assert!(f.index("P:attach") < f.index("C:attach"));
        assert!(
            !f.nav
                .controller_flags(child)
                .unwrap()
                .contains(ControllerFlags::AWAITING_PARENT_ATTACH)
        );
    }

    #[test]
    fn parent_destruction_finalizes_children_first() {
        let mut f = Fixture::new();
        let root = f.controller("R");
        let parent = f.parent("P", &["inner"]);
        let child = f.controller("C");
        f.nav.push_controller(f.router, RouterTransaction::new(root)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(parent)).unwrap();
        let inner = f.nav.child_routers(parent)[0];
        f.nav.push_controller(inner, RouterTransaction::new(child)).unwrap();
        assert!(f.nav.is_attached(child));
        f.nav.pop_current_controller(f.router).unwrap();
        assert!(f.index("C:detach") < f.index("C:destroy"));
        assert!(f.index("C:destroy") < f.index("P:destroy"));
        assert!(!f.nav.is_alive(child));
        assert!(!f.nav.is_alive(parent));
    }

    #[test]
    fn exiting_parent_freezes_child_detach_until_the_change_ends() {
        let mut f = Fixture::new();
        let parent = f.parent("P", &["inner"]);
        let child = f.controller("C");
        let next = f.controller("N");
        f.nav.set_retain_view_mode(parent, RetainViewMode::RetainDetach).unwrap();
        f.nav.set_retain_view_mode(child, RetainViewMode::RetainDetach).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(parent)).unwrap();
        let inner = f.nav.child_routers(parent)[0];
        f.nav.push_controller(inner, RouterTransaction::new(child)).unwrap();
        f.log.borrow_mut().clear();
        f.nav
            .push_controller(
                f.router,
                RouterTransaction::new(next)
                    .with_push_handler(Box::new(SimpleSwapChangeHandler::default())),
            )
            .unwrap();
        let detach_parent = f.index("P:detach");
        let detach_child = f.index("C:detach");
        let parent_ended = f.index("P:change_ended PushExit");
        assert!(detach_parent < detach_child);
        assert!(detach_child < parent_ended);
        assert!(!f.nav.is_attached(child));
    }
}
