// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Routers: one backstack bound to one container.
//!
//! ## Operations
//!
//! Every router operation is a [`Navigator`] method taking the [`RouterId`]. Mutations update the
//! backstack synchronously and then run (or queue) the transitions that bring the surface in line:
//!
//! - [`push_controller`](Navigator::push_controller) shows a new top. An opaque push over an overlay
//!   also transitions out the layers the overlay was keeping visible.
//! - [`pop_controller`](Navigator::pop_controller) removes a controller from the top or from the
//!   middle, honoring the router's [`PopRootPolicy`].
//! - [`replace_top_controller`](Navigator::replace_top_controller) swaps the top in place.
//! - [`set_backstack`](Navigator::set_backstack) reconciles the whole stack against a new one.
//!
//! ## Reconciliation
//!
//! `set_backstack` compares the visible sets (see
//! [`visible_transactions`](understory_backstack::visible_transactions)) of the old and new stacks.
//! When they differ it runs, in this order:
//!
//! 1) the new visible root against the old visible root,
//! 2) each old visible layer that is no longer visible, top to bottom, skipping the old root,
//! 3) each newly visible layer, bottom to top, paired with the layer beneath it.
//!
//! An empty new stack transitions every old visible layer out, bottom to top.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

use tracing::{debug, warn};
use understory_backstack::{Backstack, Transaction, visible_transactions};

use crate::change::PendingChange;
use crate::error::NavigationError;
use crate::handler::{ChangeHandler, NoOpChangeHandler, SimpleSwapChangeHandler};
use crate::navigator::Navigator;
use crate::surface::Surface;
use crate::types::{ContainerId, ControllerFlags, ControllerId, InstanceId, PopRootPolicy, RouterId};

/// A backstack entry as stored by a router.
pub type RouterTransaction = Transaction<ControllerId, Box<dyn ChangeHandler>>;

/// The backstack type stored by a router.
pub type RouterBackstack = Backstack<ControllerId, Box<dyn ChangeHandler>>;

/// What owns a router.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum RouterHost {
    /// Created by the host application through [`Navigator::attach_router`].
    Root,
    /// Owned by a controller and bound to a container inside its view.
    Controller(ControllerId),
}

/// Per-router state.
pub(crate) struct RouterSlot {
    pub(crate) backstack: RouterBackstack,
    /// Removed from the backstack but not destroyed yet.
    pub(crate) destroying: Vec<ControllerId>,
    pub(crate) pending: VecDeque<PendingChange>,
    pub(crate) container: Option<ContainerId>,
    pub(crate) container_ready: bool,
    pub(crate) host: RouterHost,
    pub(crate) pop_root_policy: PopRootPolicy,
    pub(crate) back_dispatch_enabled: bool,
    pub(crate) tag: Option<String>,
}

impl RouterSlot {
    pub(crate) fn new(host: RouterHost, pop_root_policy: PopRootPolicy, back_dispatch: bool) -> Self {
        Self {
            backstack: Backstack::new(),
            destroying: Vec::new(),
            pending: VecDeque::new(),
            container: None,
            container_ready: false,
            host,
            pop_root_policy,
            back_dispatch_enabled: back_dispatch,
            tag: None,
        }
    }

    fn keys(&self) -> Vec<ControllerId> {
        self.backstack.iter_root_to_top().map(|t| *t.key()).collect()
    }

    fn visible_keys(&self) -> Vec<ControllerId> {
        self.backstack.visible().into_iter().map(|t| *t.key()).collect()
    }
}

impl core::fmt::Debug for RouterSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RouterSlot")
            .field("backstack", &self.keys())
            .field("destroying", &self.destroying)
            .field("pending", &self.pending.len())
            .field("container", &self.container)
            .field("container_ready", &self.container_ready)
            .field("host", &self.host)
            .field("pop_root_policy", &self.pop_root_policy)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

fn default_handler() -> Box<dyn ChangeHandler> {
    Box::new(SimpleSwapChangeHandler::default())
}

impl<S: Surface> Navigator<S> {
    pub(crate) fn router(&self, r: RouterId) -> Result<&RouterSlot, NavigationError> {
        self.routers.get(r).ok_or(NavigationError::UnknownRouter(r))
    }

    /// Controllers in the backstack of `r`, root first.
    pub(crate) fn router_controllers(&self, r: RouterId) -> Vec<ControllerId> {
        self.routers.get(r).map(RouterSlot::keys).unwrap_or_default()
    }

    /// Backstack controllers of `r` plus those it is still destroying.
    pub(crate) fn router_all_controllers(&self, r: RouterId) -> Vec<ControllerId> {
        let Some(router) = self.routers.get(r) else {
            return Vec::new();
        };
        let mut out = router.keys();
        for &c in &router.destroying {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        out
    }

    fn check_pushable(&self, c: ControllerId) -> Result<(), NavigationError> {
        match self.controllers.get(c) {
            Some(slot) if !slot.is_gone() => {}
            _ => return Err(NavigationError::ControllerDestroyed(c)),
        }
        if self.routers.iter().any(|(_, r)| r.backstack.contains(&c)) {
            return Err(NavigationError::AlreadyInBackstack(c));
        }
        Ok(())
    }

    pub(crate) fn mark_being_destroyed(&mut self, r: RouterId, c: ControllerId) {
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.flags.insert(ControllerFlags::BEING_DESTROYED);
        }
        if let Some(router) = self.routers.get_mut(r)
            && !router.destroying.contains(&c)
        {
            router.destroying.push(c);
        }
    }

    /// Refresh back-navigation eligibility after a structural change, then reap.
    pub(crate) fn after_mutation(&mut self, r: RouterId) {
        if let Some(router) = self.routers.get_mut(r)
            && router.backstack.take_changed()
        {
            let root_navigable = router.pop_root_policy != PopRootPolicy::Never;
            let keys = router.keys();
            for (i, c) in keys.into_iter().enumerate() {
                if let Some(slot) = self.controllers.get_mut(c) {
                    slot.flags
                        .set(ControllerFlags::BACK_NAVIGABLE, i > 0 || root_navigable);
                }
            }
        }
        self.collect_garbage();
    }

    /// Visible layers of `r` beneath its top, root first.
    fn covered_layers(&self, r: RouterId) -> Vec<ControllerId> {
        let mut visible = self
            .routers
            .get(r)
            .map(RouterSlot::visible_keys)
            .unwrap_or_default();
        visible.pop();
        visible
    }

    fn hide_layers(
        &mut self,
        r: RouterId,
        layers: Vec<ControllerId>,
        handler: Option<&dyn ChangeHandler>,
    ) {
        for layer in layers {
            let handler = handler.map_or_else(default_handler, ChangeHandler::clone_handler);
            self.perform_change(
                r,
                PendingChange::new(None, Some(layer), true, Some(handler)).forcing_removal(),
            );
        }
    }

    /// Bring back visible layers beneath the top whose views are not in the container.
    fn reveal_layers(&mut self, r: RouterId) {
        let Some(router) = self.routers.get(r) else {
            return;
        };
        let container = router.container;
        let mut visible = router.visible_keys();
        visible.pop();
        for layer in visible {
            let shown = self
                .controllers
                .get(layer)
                .and_then(|s| s.view)
                .is_some_and(|v| container.is_some() && self.surface.parent_of(v) == container);
            if !shown && !self.is_change_target(layer) {
                self.perform_change(
                    r,
                    PendingChange::new(
                        Some(layer),
                        None,
                        false,
                        Some(Box::new(SimpleSwapChangeHandler::new(false))),
                    ),
                );
            }
        }
    }

    /// Push `transaction` on top of `router` and transition to it.
    ///
    /// Fails if the controller is destroyed or already in a backstack.
    pub fn push_controller(
        &mut self,
        router: RouterId,
        mut transaction: RouterTransaction,
    ) -> Result<(), NavigationError> {
        self.router(router)?;
        let c = *transaction.key();
        self.check_pushable(c)?;
        transaction.ensure_index(&mut self.indexer);
        transaction.mark_attached_to_router();
        let handler = transaction.push_handler().cloned();
        let covered = if transaction.is_opaque() {
            self.covered_layers(router)
        } else {
            Vec::new()
        };
        let slot = self
            .routers
            .get_mut(router)
            .ok_or(NavigationError::UnknownRouter(router))?;
        let from = slot.backstack.peek().map(|t| *t.key());
        slot.backstack
            .push(transaction)
            .map_err(|_| NavigationError::AlreadyInBackstack(c))?;
        debug!(?router, controller = ?c, ?from, "push");
        self.bind_controller(c, router);
        self.hide_layers(router, covered, handler.as_deref());
        self.perform_change(router, PendingChange::new(Some(c), from, true, handler));
        self.after_mutation(router);
        Ok(())
    }

    /// Pop `controller` from `router`, from the top or from the middle.
    ///
    /// Under [`PopRootPolicy::PopAndView`] returns whether something was popped; under the other
    /// policies returns whether the backstack is still non-empty. Popping the sole root under
    /// [`PopRootPolicy::Never`] is refused and returns `Ok(false)` without any transition.
    pub fn pop_controller(
        &mut self,
        router: RouterId,
        controller: ControllerId,
    ) -> Result<bool, NavigationError> {
        let slot = self.router(router)?;
        if self.controllers.get(controller).is_none() {
            return Err(NavigationError::ControllerDestroyed(controller));
        }
        let policy = slot.pop_root_policy;
        let Some(position) = slot.backstack.position(&controller) else {
            return Ok(policy != PopRootPolicy::PopAndView && !slot.backstack.is_empty());
        };
        let top_pos = slot.backstack.len() - 1;
        if position == top_pos && top_pos == 0 && policy == PopRootPolicy::Never {
            warn!(?router, ?controller, "refusing to pop the root controller");
            return Ok(false);
        }

        if position == top_pos {
            let Some(slot) = self.routers.get_mut(router) else {
                return Err(NavigationError::UnknownRouter(router));
            };
            let popped = slot
                .backstack
                .pop()
                .map_err(|_| NavigationError::EmptyBackstack)?;
            let handler = popped.pop_handler().cloned();
            let to = slot.backstack.peek().map(|t| *t.key());
            debug!(?router, ?controller, ?to, "pop");
            self.mark_being_destroyed(router, controller);
            if to.is_none() && policy == PopRootPolicy::PopButNotView {
                let mut change = PendingChange::new(
                    None,
                    Some(controller),
                    false,
                    Some(Box::new(NoOpChangeHandler)),
                );
                change.abandon_from_view = true;
                self.perform_change(router, change);
            } else {
                self.perform_change(router, PendingChange::new(to, Some(controller), false, handler));
                self.reveal_layers(router);
            }
        } else {
            let Some(slot) = self.routers.get_mut(router) else {
                return Err(NavigationError::UnknownRouter(router));
            };
            let top_opaque = slot.backstack.peek().is_none_or(Transaction::is_opaque);
            let below = position
                .checked_sub(1)
                .and_then(|i| slot.backstack.iter_root_to_top().nth(i))
                .map(|t| *t.key());
            let Some(removed) = slot.backstack.remove(&controller) else {
                return Ok(false);
            };
            let handler = removed.pop_handler().cloned();
            let to = below.filter(|&b| {
                !top_opaque && !self.flags(b).contains(ControllerFlags::ATTACHED)
            });
            debug!(?router, ?controller, ?to, "pop from the middle");
            self.mark_being_destroyed(router, controller);
            self.perform_change(router, PendingChange::new(to, Some(controller), false, handler));
            self.reveal_layers(router);
        }
        self.after_mutation(router);
        let empty = self.routers.get(router).is_none_or(|s| s.backstack.is_empty());
        Ok(policy == PopRootPolicy::PopAndView || !empty)
    }

    /// Pop the top controller of `router`.
    pub fn pop_current_controller(&mut self, router: RouterId) -> Result<bool, NavigationError> {
        let top = self
            .router(router)?
            .backstack
            .peek()
            .map(|t| *t.key())
            .ok_or(NavigationError::EmptyBackstack)?;
        self.pop_controller(router, top)
    }

    /// Pop everything above the root. Returns `false` if there was nothing to pop.
    ///
    /// Without a `handler`, the top's pop handler runs the transition.
    pub fn pop_to_root(
        &mut self,
        router: RouterId,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<bool, NavigationError> {
        let slot = self.router(router)?;
        if slot.backstack.len() <= 1 {
            return Ok(false);
        }
        let Some(root) = slot.backstack.root().map(|t| *t.key()) else {
            return Ok(false);
        };
        self.pop_to(router, root, handler)?;
        Ok(true)
    }

    /// Pop everything above the topmost transaction tagged `tag`.
    ///
    /// Returns `false` if no transaction carries the tag.
    pub fn pop_to_tag(
        &mut self,
        router: RouterId,
        tag: &str,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<bool, NavigationError> {
        let Some(target) = self
            .router(router)?
            .backstack
            .iter()
            .find(|t| t.tag() == Some(tag))
            .map(|t| *t.key())
        else {
            return Ok(false);
        };
        self.pop_to(router, target, handler)?;
        Ok(true)
    }

    fn pop_to(
        &mut self,
        router: RouterId,
        target: ControllerId,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<(), NavigationError> {
        let slot = self.router(router)?;
        let handler = handler.or_else(|| slot.backstack.peek().and_then(|t| t.pop_handler().cloned()));
        let mut kept = Vec::new();
        for tx in slot.backstack.iter_root_to_top() {
            kept.push(tx.clone());
            if *tx.key() == target {
                break;
            }
        }
        self.set_backstack(router, kept, handler)
    }

    /// Replace the whole backstack of `router` with `transaction`.
    pub fn set_root(
        &mut self,
        router: RouterId,
        transaction: RouterTransaction,
    ) -> Result<(), NavigationError> {
        let handler = transaction.push_handler().cloned();
        self.set_backstack(router, alloc::vec![transaction], handler)
    }

    /// Replace the top of `router` with `transaction`.
    ///
    /// When the old top was an overlay and the new top is opaque, every layer the overlay kept
    /// visible is transitioned out first with a copy of the new push handler.
    pub fn replace_top_controller(
        &mut self,
        router: RouterId,
        mut transaction: RouterTransaction,
    ) -> Result<(), NavigationError> {
        self.router(router)?;
        let c = *transaction.key();
        self.check_pushable(c)?;
        transaction.ensure_index(&mut self.indexer);
        transaction.mark_attached_to_router();
        let handler = transaction.push_handler().cloned();
        let new_opaque = transaction.is_opaque();

        let slot = self
            .routers
            .get_mut(router)
            .ok_or(NavigationError::UnknownRouter(router))?;
        let old_top = slot.backstack.pop().ok();
        let old_opaque = old_top.as_ref().is_none_or(Transaction::is_opaque);
        let from = old_top.as_ref().map(|t| *t.key());
        if let Some(from) = from {
            self.mark_being_destroyed(router, from);
        }
        if from.is_some() && !old_opaque && new_opaque {
            let layers = self
                .routers
                .get(router)
                .map(RouterSlot::visible_keys)
                .unwrap_or_default();
            self.hide_layers(router, layers, handler.as_deref());
        }
        if let Some(slot) = self.routers.get_mut(router) {
            slot.backstack
                .push(transaction)
                .map_err(|_| NavigationError::AlreadyInBackstack(c))?;
        }
        debug!(?router, controller = ?c, ?from, "replace top");
        self.bind_controller(c, router);
        let change = PendingChange::new(Some(c), from, true, handler);
        self.perform_change(router, change.forcing_removal());
        self.after_mutation(router);
        Ok(())
    }

    fn validate_backstack(
        &self,
        router: RouterId,
        entries: &[RouterTransaction],
    ) -> Result<(), NavigationError> {
        for (i, tx) in entries.iter().enumerate() {
            let c = *tx.key();
            if entries[i + 1..].iter().any(|t| *t.key() == c) {
                return Err(NavigationError::DuplicateInBackstack(c));
            }
            match self.controllers.get(c) {
                Some(slot) if !slot.is_gone() => {}
                _ => return Err(NavigationError::ControllerDestroyed(c)),
            }
            if self
                .routers
                .iter()
                .any(|(id, r)| id != router && r.backstack.contains(&c))
            {
                return Err(NavigationError::AlreadyInBackstack(c));
            }
        }
        Ok(())
    }

    /// Remove views in the container that are neither visible in `router` nor owned by a sibling
    /// router sharing the container.
    fn remove_all_except_visible_and_unowned(&mut self, router: RouterId, visible: &[ControllerId]) {
        let Some(container) = self.routers.get(router).and_then(|s| s.container) else {
            return;
        };
        let mut keep: Vec<_> = visible
            .iter()
            .filter_map(|&c| self.controllers.get(c).and_then(|s| s.view))
            .collect();
        for (id, sibling) in self.routers.iter() {
            if id != router && sibling.container == Some(container) {
                for c in sibling.keys().into_iter().chain(sibling.destroying.iter().copied()) {
                    keep.extend(self.controllers.get(c).and_then(|s| s.view));
                }
            }
        }
        for view in self.surface.children(container).into_iter().rev() {
            if keep.contains(&view) {
                continue;
            }
            self.surface.remove_view(container, view);
            if let Some(owner) = self.controller_for_view(view) {
                self.on_view_removed(owner);
            }
        }
    }

    /// Reconcile `router` against `entries` (root first).
    ///
    /// Controllers missing from `entries` are destroyed once no transition uses them. Without a
    /// `handler` the default swap runs the root and removal transitions; newly visible layers
    /// always use their own push handlers.
    pub fn set_backstack(
        &mut self,
        router: RouterId,
        mut entries: Vec<RouterTransaction>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<(), NavigationError> {
        let slot = self.router(router)?;
        self.validate_backstack(router, &entries)?;
        let old = slot.keys();
        let old_visible = slot.visible_keys();
        for tx in &mut entries {
            if tx.index().is_none()
                && let Some(index) = slot.backstack.get(tx.key()).and_then(Transaction::index)
            {
                *tx = tx.clone().with_index(index);
            }
        }

        self.remove_all_except_visible_and_unowned(router, &old_visible);
        understory_backstack::stabilize_indices(&mut entries, &mut self.indexer);
        for tx in &mut entries {
            tx.mark_attached_to_router();
        }
        let new: Vec<ControllerId> = entries.iter().map(|t| *t.key()).collect();
        let new_visible: Vec<ControllerId> = visible_transactions(entries.iter().rev())
            .into_iter()
            .map(|t| *t.key())
            .collect();
        let own_push: Vec<(ControllerId, Option<Box<dyn ChangeHandler>>)> = entries
            .iter()
            .map(|t| (*t.key(), t.push_handler().cloned()))
            .collect();
        let Some(slot) = self.routers.get_mut(router) else {
            return Err(NavigationError::UnknownRouter(router));
        };
        if let Err(err) = slot.backstack.set_backstack(entries) {
            warn!(?router, %err, "backstack rejected after validation");
            return Err(NavigationError::DuplicateInBackstack(new[0]));
        }
        debug!(?router, ?old, ?new, "set backstack");

        let removed: Vec<ControllerId> = old.iter().copied().filter(|c| !new.contains(c)).collect();
        for &c in &removed {
            self.mark_being_destroyed(router, c);
        }
        for &c in &new {
            self.bind_controller(c, router);
        }

        let clone_or_default = |h: &Option<Box<dyn ChangeHandler>>| h.clone().unwrap_or_else(default_handler);
        if new.is_empty() {
            for &layer in &old_visible {
                self.complete_change_to(layer);
                self.perform_change(
                    router,
                    PendingChange::new(None, Some(layer), false, Some(clone_or_default(&handler))),
                );
            }
        } else if new_visible != old_visible {
            let new_root = new_visible[0];
            let old_root = old_visible.first().copied();
            let new_root_requires_push = !old.contains(&new_root);

            if old_root != Some(new_root) {
                if let Some(old_root) = old_root {
                    self.complete_change_to(old_root);
                }
                self.perform_change(
                    router,
                    PendingChange::new(
                        Some(new_root),
                        old_root,
                        new_root_requires_push,
                        handler.clone(),
                    ),
                );
            }

            for &layer in old_visible.iter().skip(1).rev() {
                if new_visible.contains(&layer) {
                    continue;
                }
                self.complete_change_to(layer);
                self.perform_change(
                    router,
                    PendingChange::new(
                        None,
                        Some(layer),
                        new_root_requires_push,
                        Some(clone_or_default(&handler)),
                    )
                    .forcing_removal(),
                );
            }

            for i in 1..new_visible.len() {
                let layer = new_visible[i];
                if old_visible.contains(&layer) {
                    continue;
                }
                let push = own_push
                    .iter()
                    .find(|(c, _)| *c == layer)
                    .and_then(|(_, h)| h.clone());
                self.perform_change(
                    router,
                    PendingChange::new(Some(layer), Some(new_visible[i - 1]), true, push),
                );
            }
        }

        for c in removed {
            self.settle_destroy(c);
        }
        self.after_mutation(router);
        Ok(())
    }

    /// Re-attach controllers of `router` flagged as needing attach; bind the rest.
    ///
    /// Calling it again without a structural change in between does nothing.
    pub fn rebind_if_needed(&mut self, router: RouterId) -> Result<(), NavigationError> {
        self.router(router)?;
        self.rebind_router(router);
        Ok(())
    }

    pub(crate) fn rebind_router(&mut self, r: RouterId) {
        let container = self.routers.get(r).and_then(|s| s.container);
        for c in self.router_controllers(r) {
            let needs_attach = self.flags(c).contains(ControllerFlags::NEEDS_ATTACH);
            if !needs_attach || self.is_change_target(c) || container.is_none() {
                self.bind_controller(c, r);
                continue;
            }
            let in_place = self
                .controllers
                .get(c)
                .and_then(|s| s.view)
                .is_some_and(|v| self.surface.parent_of(v) == container);
            if in_place {
                self.bind_controller(c, r);
                self.try_attach(c);
            } else {
                self.perform_change(
                    r,
                    PendingChange::new(
                        Some(c),
                        None,
                        true,
                        Some(Box::new(SimpleSwapChangeHandler::new(false))),
                    ),
                );
            }
        }
    }

    /// Empty `router`, destroying every controller in it.
    ///
    /// With `pop_views` the former top plays its pop transition and, once it completes, the
    /// remaining layers that still hold views transition out from the root upward.
    pub fn destroy_router(&mut self, router: RouterId, pop_views: bool) -> Result<(), NavigationError> {
        let slot = self
            .routers
            .get_mut(router)
            .ok_or(NavigationError::UnknownRouter(router))?;
        let popped = slot.backstack.pop_all();
        let top_pop_handler = popped.first().and_then(|t| t.pop_handler().cloned());
        let popped: Vec<ControllerId> = popped.iter().map(|t| *t.key()).collect();
        debug!(?router, controllers = popped.len(), pop_views, "destroy router");
        for &c in &popped {
            self.mark_being_destroyed(router, c);
        }
        if pop_views && let Some((&top, rest)) = popped.split_first() {
            let mut cascade = Vec::new();
            for &layer in rest.iter().rev() {
                if self.controllers.get(layer).is_some_and(|s| s.view.is_some()) {
                    cascade.push(layer);
                } else {
                    self.settle_destroy(layer);
                }
            }
            let mut change = PendingChange::new(None, Some(top), false, top_pop_handler);
            change.cascade = cascade;
            self.perform_change(router, change);
        } else {
            for &c in &popped {
                self.complete_changes_touching(c);
            }
            for c in popped {
                self.settle_destroy(c);
            }
        }
        self.after_mutation(router);
        Ok(())
    }

    /// Tear down a child router whose owning controller is being destroyed.
    pub(crate) fn destroy_child_router(&mut self, r: RouterId) {
        for c in self.router_all_controllers(r) {
            self.complete_changes_touching(c);
        }
        let (popped, orphaned) = match self.routers.get_mut(r) {
            Some(router) => (
                router.backstack.pop_all(),
                router.pending.drain(..).collect::<Vec<_>>(),
            ),
            None => return,
        };
        for change in orphaned {
            if let Some(from) = change.from {
                self.settle_destroy(from);
            }
        }
        let popped: Vec<ControllerId> = popped.iter().map(|t| *t.key()).collect();
        for &c in &popped {
            self.mark_being_destroyed(r, c);
        }
        for c in self.router_all_controllers(r) {
            self.settle_destroy(c);
        }
    }

    /// Controllers in the backstack of `router`, root first. Empty for unknown routers.
    pub fn backstack(&self, router: RouterId) -> Vec<ControllerId> {
        self.router_controllers(router)
    }

    /// The backstack of `router`, for reading transactions.
    pub fn transactions(&self, router: RouterId) -> Option<&RouterBackstack> {
        self.routers.get(router).map(|s| &s.backstack)
    }

    /// Number of transactions in `router`.
    pub fn backstack_len(&self, router: RouterId) -> usize {
        self.routers.get(router).map_or(0, |s| s.backstack.len())
    }

    /// Returns `true` if `router` has at least one transaction.
    pub fn has_root_controller(&self, router: RouterId) -> bool {
        self.backstack_len(router) > 0
    }

    /// Controllers of `router` whose views should be on screen, root first.
    pub fn visible_controllers(&self, router: RouterId) -> Vec<ControllerId> {
        self.routers
            .get(router)
            .map(RouterSlot::visible_keys)
            .unwrap_or_default()
    }

    /// Find the controller tagged `tag` in `router` or in any router nested below it.
    pub fn controller_with_tag(&self, router: RouterId, tag: &str) -> Option<ControllerId> {
        let slot = self.routers.get(router)?;
        if let Some(found) = slot.backstack.iter().find(|t| t.tag() == Some(tag)) {
            return Some(*found.key());
        }
        slot.backstack.iter().find_map(|t| {
            self.child_routers_of(*t.key())
                .into_iter()
                .find_map(|child| self.controller_with_tag(child, tag))
        })
    }

    /// Find a live controller by its instance id anywhere in the navigator.
    pub fn find_controller_by_instance_id(&self, instance_id: InstanceId) -> Option<ControllerId> {
        self.controllers
            .iter()
            .find(|(_, s)| {
                s.instance_id == instance_id && !s.flags.contains(ControllerFlags::DESTROYED)
            })
            .map(|(c, _)| c)
    }

    /// The root-pop policy of `router`.
    pub fn pop_root_policy(&self, router: RouterId) -> Option<PopRootPolicy> {
        self.routers.get(router).map(|s| s.pop_root_policy)
    }

    /// Set what `router` does when asked to pop its last controller.
    pub fn set_pop_root_policy(
        &mut self,
        router: RouterId,
        policy: PopRootPolicy,
    ) -> Result<(), NavigationError> {
        let slot = self
            .routers
            .get_mut(router)
            .ok_or(NavigationError::UnknownRouter(router))?;
        slot.pop_root_policy = policy;
        if let Some(root) = slot.backstack.root().map(|t| *t.key())
            && let Some(c) = self.controllers.get_mut(root)
        {
            c.flags
                .set(ControllerFlags::BACK_NAVIGABLE, policy != PopRootPolicy::Never);
        }
        Ok(())
    }

    /// Include or exclude `router` from back dispatch.
    pub fn set_back_dispatch_enabled(
        &mut self,
        router: RouterId,
        enabled: bool,
    ) -> Result<(), NavigationError> {
        self.routers
            .get_mut(router)
            .ok_or(NavigationError::UnknownRouter(router))?
            .back_dispatch_enabled = enabled;
        Ok(())
    }

    /// The tag `router` was created with, if any.
    pub fn router_tag(&self, router: RouterId) -> Option<&str> {
        self.routers.get(router)?.tag.as_deref()
    }

    /// The container `router` is bound to.
    pub fn router_container(&self, router: RouterId) -> Option<ContainerId> {
        self.routers.get(router)?.container
    }

    /// Offer a back press to `router`: child routers of the top controller first (most recent
    /// transaction first), then the top controller, then a pop.
    pub fn handle_back_in(&mut self, router: RouterId) -> Result<bool, NavigationError> {
        let slot = self.router(router)?;
        if !slot.back_dispatch_enabled {
            return Ok(false);
        }
        let Some(top) = slot.backstack.peek().map(|t| *t.key()) else {
            return Ok(false);
        };
        if self.controller_handle_back(top) {
            return Ok(true);
        }
        if !self.flags(top).contains(ControllerFlags::BACK_NAVIGABLE) {
            return Ok(false);
        }
        self.pop_current_controller(router)
    }

    fn controller_handle_back(&mut self, c: ControllerId) -> bool {
        let mut children: Vec<(u64, RouterId, ControllerId)> = Vec::new();
        for child in self.child_routers_of(c) {
            if let Some(slot) = self.routers.get(child) {
                children.extend(
                    slot.backstack
                        .iter()
                        .map(|t| (t.index().unwrap_or(0), child, *t.key())),
                );
            }
        }
        children.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, child, cc) in children {
            if self.flags(cc).contains(ControllerFlags::ATTACHED)
                && self.handle_back_in(child) == Ok(true)
            {
                return true;
            }
        }
        self.controllers
            .get_mut(c)
            .is_some_and(|s| s.controller.handle_back())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, entries};
    use crate::{DeferredChangeHandler, LifecycleState};
    use alloc::vec;

    fn overlay(c: ControllerId) -> RouterTransaction {
        RouterTransaction::new(c).with_push_handler(Box::new(SimpleSwapChangeHandler::new(false)))
    }

    #[test]
    fn pushing_a_controller_twice_fails() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        assert_eq!(
            f.nav.push_controller(f.router, RouterTransaction::new(a)),
            Err(NavigationError::AlreadyInBackstack(a))
        );
        assert_eq!(f.nav.backstack(f.router), vec![a]);
    }

    #[test]
    fn pushing_a_destroyed_controller_fails() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        f.nav.pop_current_controller(f.router).unwrap();
        assert_eq!(
            f.nav.push_controller(f.router, RouterTransaction::new(b)),
            Err(NavigationError::ControllerDestroyed(b))
        );
    }

    #[test]
    fn indices_increase_from_root_to_top() {
        let mut f = Fixture::new();
        let ids: Vec<_> = ["A", "B", "C"].iter().map(|n| f.controller(n)).collect();
        for &c in &ids {
            f.nav.push_controller(f.router, RouterTransaction::new(c)).unwrap();
        }
        let reordered = vec![
            RouterTransaction::new(ids[2]),
            RouterTransaction::new(ids[0]),
            RouterTransaction::new(ids[1]),
        ];
        f.nav.set_backstack(f.router, reordered, None).unwrap();
        let indices: Vec<u64> = f
            .nav
            .transactions(f.router)
            .unwrap()
            .iter_root_to_top()
            .map(|t| t.index().unwrap())
            .collect();
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(f.nav.backstack(f.router), vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn opaque_push_detaches_then_pop_restores_view_state() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.scroll(a, 42);
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        assert!(f.index("A:detach") < f.index("B:attach"));
        assert_eq!(f.nav.view_of(a), None);

        f.nav.pop_current_controller(f.router).unwrap();
        assert!(f.nav.is_attached(a));
        assert_eq!(f.count("A:restore_view_state 42"), 1);
        assert_eq!(f.count("A:attach"), 2);
    }

    #[test]
    fn overlay_push_and_pop_never_detach_the_layer_below() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, overlay(b)).unwrap();
        assert!(f.nav.is_attached(a));
        assert!(f.nav.is_attached(b));
        assert_eq!(f.nav.visible_controllers(f.router), vec![a, b]);
        f.nav.pop_current_controller(f.router).unwrap();
        assert_eq!(f.count("A:detach"), 0);
        assert!(f.nav.is_attached(a));
    }

    #[test]
    fn opaque_push_over_an_overlay_hides_every_visible_layer() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        let c = f.controller("C");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, overlay(b)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(c)).unwrap();
        assert!(!f.nav.is_attached(a));
        assert!(!f.nav.is_attached(b));
        assert_eq!(f.nav.surface().children(f.container), vec![f.nav.view_of(c).unwrap()]);

        // Popping back to the overlay brings the layer beneath it back under it.
        f.nav.pop_current_controller(f.router).unwrap();
        let views: Vec<_> = [a, b].iter().map(|&x| f.nav.view_of(x).unwrap()).collect();
        assert_eq!(f.nav.surface().children(f.container), views);
        assert!(f.nav.is_attached(a));
        assert!(f.nav.is_attached(b));
    }

    #[test]
    fn set_backstack_on_empty_router_attaches_only_the_top() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        let c = f.controller("C");
        let list = [a, b, c].map(RouterTransaction::new).into();
        f.nav.set_backstack(f.router, list, None).unwrap();
        assert!(f.nav.is_attached(c));
        assert!(!f.nav.is_attached(a));
        assert!(!f.nav.is_attached(b));
        assert_eq!(f.nav.view_of(a), None);
        assert_eq!(f.nav.lifecycle_state(a), Some(LifecycleState::ContextAvailable));
        assert_eq!(f.nav.backstack(f.router), vec![a, b, c]);
    }

    #[test]
    fn set_backstack_rejects_duplicates_without_changes() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        let list = vec![RouterTransaction::new(b), RouterTransaction::new(b)];
        assert_eq!(
            f.nav.set_backstack(f.router, list, None),
            Err(NavigationError::DuplicateInBackstack(b))
        );
        assert_eq!(f.nav.backstack(f.router), vec![a]);
        assert!(f.nav.is_attached(a));
    }

    #[test]
    fn set_backstack_runs_root_then_removals_then_insertions() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        let c = f.controller("C");
        let d = f.controller("D");
        let e = f.controller("E");
        f.nav
            .set_backstack(f.router, vec![RouterTransaction::new(a), overlay(b), overlay(c)], None)
            .unwrap();
        assert_eq!(f.nav.visible_controllers(f.router), vec![a, b, c]);
        f.log.borrow_mut().clear();

        f.nav
            .set_backstack(f.router, vec![RouterTransaction::new(d), overlay(e)], None)
            .unwrap();
        let starts: Vec<_> = f
            .log
            .borrow()
            .iter()
            .filter(|e| e.contains("change_started"))
            .cloned()
            .collect();
        assert_eq!(
            starts,
            vec![
                "D:change_started PushEnter",
                "A:change_started PushExit",
                "C:change_started PushExit",
                "B:change_started PushExit",
                "E:change_started PushEnter",
                "D:change_started PushExit",
            ]
        );
        for x in [a, b, c] {
            assert!(!f.nav.is_alive(x));
        }
        assert!(f.nav.is_attached(d));
        assert!(f.nav.is_attached(e));
    }

    #[test]
    fn empty_set_backstack_transitions_out_bottom_to_top() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav
            .set_backstack(f.router, vec![RouterTransaction::new(a), overlay(b)], None)
            .unwrap();
        f.log.borrow_mut().clear();
        f.nav.set_backstack(f.router, Vec::new(), None).unwrap();
        assert!(f.index("A:change_started PopExit") < f.index("B:change_started PopExit"));
        assert!(!f.nav.is_alive(a));
        assert!(!f.nav.is_alive(b));
        assert!(f.nav.surface().children(f.container).is_empty());
    }

    #[test]
    fn never_policy_refuses_to_pop_the_root() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        f.nav.set_pop_root_policy(f.router, PopRootPolicy::Never).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.log.borrow_mut().clear();
        assert_eq!(f.nav.pop_current_controller(f.router), Ok(false));
        assert!(f.log.borrow().is_empty());
        assert_eq!(f.nav.backstack(f.router), vec![a]);
        assert!(f.nav.is_attached(a));
        assert!(!f.nav.handle_back());
    }

    #[test]
    fn pop_but_not_view_leaves_the_last_view_on_screen() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        f.nav
            .set_pop_root_policy(f.router, PopRootPolicy::PopButNotView)
            .unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        let view = f.nav.view_of(a).unwrap();
        assert_eq!(f.nav.pop_current_controller(f.router), Ok(false));
        assert!(!f.nav.is_alive(a));
        assert_eq!(f.nav.surface().children(f.container), vec![view]);
        assert_eq!(f.count("A:detach"), 1);
    }

    #[test]
    fn popping_from_the_middle_keeps_the_top() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        let c = f.controller("C");
        for x in [a, b, c] {
            f.nav.push_controller(f.router, RouterTransaction::new(x)).unwrap();
        }
        assert_eq!(f.nav.pop_controller(f.router, b), Ok(true));
        assert_eq!(f.nav.backstack(f.router), vec![a, c]);
        assert!(f.nav.is_attached(c));
        assert!(!f.nav.is_alive(b));
    }

    #[test]
    fn popping_below_an_overlay_reveals_the_next_layer() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        let c = f.controller("C");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        f.nav.push_controller(f.router, overlay(c)).unwrap();
        assert!(!f.nav.is_attached(a));
        f.nav.pop_controller(f.router, b).unwrap();
        assert!(f.nav.is_attached(a));
        assert!(f.nav.is_attached(c));
        let (va, vc) = (f.nav.view_of(a).unwrap(), f.nav.view_of(c).unwrap());
        // The revealed layer stays under the overlay.
        assert_eq!(f.nav.surface().children(f.container), vec![va, vc]);
        assert_eq!(f.count("A:change_started PopEnter"), 1);
    }

    #[test]
    fn popping_an_opaque_top_restores_every_layer_in_order() {
        let mut f = Fixture::new();
        let [a, b, c, d] = ["A", "B", "C", "D"].map(|n| f.controller(n));
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        f.nav.push_controller(f.router, overlay(c)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(d)).unwrap();
        assert_eq!(f.nav.surface().children(f.container), vec![f.nav.view_of(d).unwrap()]);

        f.nav.pop_current_controller(f.router).unwrap();
        let (vb, vc) = (f.nav.view_of(b).unwrap(), f.nav.view_of(c).unwrap());
        assert_eq!(f.nav.surface().children(f.container), vec![vb, vc]);
        assert!(f.nav.is_attached(b));
        assert!(!f.nav.is_attached(a));
    }

    #[test]
    fn set_backstack_keeps_views_of_sibling_routers() {
        let mut f = Fixture::new();
        let sibling = f.nav.attach_router(f.container);
        let x = f.controller("X");
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(sibling, RouterTransaction::new(x)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav
            .set_backstack(f.router, vec![RouterTransaction::new(b)], None)
            .unwrap();
        let (vx, vb) = (f.nav.view_of(x).unwrap(), f.nav.view_of(b).unwrap());
        assert_eq!(f.nav.surface().children(f.container), vec![vx, vb]);
        assert!(f.nav.is_attached(x));
        assert_eq!(f.nav.backstack(sibling), vec![x]);
        assert!(!f.nav.is_alive(a));
    }

    #[test]
    fn replace_top_over_an_overlay_hides_the_layers_it_showed() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        let c = f.controller("C");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, overlay(b)).unwrap();
        f.nav.replace_top_controller(f.router, RouterTransaction::new(c)).unwrap();
        assert_eq!(f.nav.backstack(f.router), vec![a, c]);
        assert!(!f.nav.is_alive(b));
        assert!(!f.nav.is_attached(a));
        assert!(f.nav.is_attached(c));
        assert_eq!(f.nav.surface().children(f.container), vec![f.nav.view_of(c).unwrap()]);
    }

    #[test]
    fn pop_to_root_and_tag() {
        let mut f = Fixture::new();
        let ids: Vec<_> = ["A", "B", "C", "D"].iter().map(|n| f.controller(n)).collect();
        for (i, &c) in ids.iter().enumerate() {
            let tx = RouterTransaction::new(c).with_tag(alloc::format!("t{i}"));
            f.nav.push_controller(f.router, tx).unwrap();
        }
        assert_eq!(f.nav.pop_to_tag(f.router, "missing", None), Ok(false));
        assert_eq!(f.nav.pop_to_tag(f.router, "t2", None), Ok(true));
        assert_eq!(f.nav.backstack(f.router), ids[..3].to_vec());
        assert!(f.nav.is_attached(ids[2]));
        assert!(!f.nav.is_alive(ids[3]));
        assert_eq!(f.nav.controller_with_tag(f.router, "t1"), Some(ids[1]));

        assert_eq!(f.nav.pop_to_root(f.router, None), Ok(true));
        assert_eq!(f.nav.backstack(f.router), vec![ids[0]]);
        assert!(f.nav.is_attached(ids[0]));
        assert_eq!(f.count("A:change_started PopEnter"), 1);
        assert_eq!(f.nav.pop_to_root(f.router, None), Ok(false));
    }

    #[test]
    fn set_root_replaces_everything() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.set_root(f.router, RouterTransaction::new(b)).unwrap();
        assert_eq!(f.nav.backstack(f.router), vec![b]);
        assert!(f.nav.is_attached(b));
        assert!(!f.nav.is_alive(a));
        assert_eq!(f.count("B:change_started PushEnter"), 1);
    }

    #[test]
    fn rebind_is_idempotent() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.on_host_event(crate::HostEvent::Destroyed {
            changing_configurations: true,
        });
        f.nav.on_host_event(crate::HostEvent::Created);
        let container = f.nav.surface_mut().add_root_container(true);
        f.nav.set_router_container(f.router, container).unwrap();
        assert!(f.nav.is_attached(a));
        let before = f.log.borrow().len();
        f.nav.rebind_if_needed(f.router).unwrap();
        f.nav.rebind_if_needed(f.router).unwrap();
        assert_eq!(f.log.borrow().len(), before);
    }

    #[test]
    fn destroy_with_pop_views_cascades_after_the_top_exits() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        let c = f.controller("C");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, overlay(b)).unwrap();
        f.nav
            .push_controller(
                f.router,
                overlay(c).with_pop_handler(Box::new(DeferredChangeHandler::new(100, true))),
            )
            .unwrap();
        f.log.borrow_mut().clear();
        f.nav.destroy_router(f.router, true).unwrap();
        assert!(f.nav.backstack(f.router).is_empty());
        // The lower layers wait for the top's exit.
        assert!(f.nav.is_attached(a));
        assert_eq!(f.count("A:change_started PushExit"), 0);
        let running = f.nav.in_flight_changes();
        assert!(f.nav.complete_change(running[0]));
        assert!(f.index("C:change_ended PopExit") < f.index("A:change_started PushExit"));
        assert!(f.index("A:change_started PushExit") < f.index("B:change_started PushExit"));
        for x in [a, b, c] {
            assert!(!f.nav.is_alive(x));
        }
        assert!(f.nav.surface().children(f.container).is_empty());
    }

    #[test]
    fn destroy_without_pop_views_finalizes_immediately() {
        let mut f = Fixture::new();
        let a = f.controller("A");
        let b = f.controller("B");
        f.nav.push_controller(f.router, RouterTransaction::new(a)).unwrap();
        f.nav.push_controller(f.router, RouterTransaction::new(b)).unwrap();
        f.nav.destroy_router(f.router, false).unwrap();
        assert!(!f.nav.is_alive(a));
        assert!(!f.nav.is_alive(b));
        assert_eq!(
            entries(&f.log, "A").last().map(String::as_str),
            Some("A:destroy")
        );
    }

    #[test]
    fn back_goes_to_the_most_recent_child_first() {
        let mut f = Fixture::new();
        let parent = f.parent("P", &["left", "right"]);
        f.nav.push_controller(f.router, RouterTransaction::new(parent)).unwrap();
        let routers = f.nav.child_routers(parent);
        let (left, right) = (routers[0], routers[1]);
        let l1 = f.controller("L1");
        let l2 = f.controller("L2");
        let r1 = f.controller("R1");
        let r2 = f.controller("R2");
        f.nav.push_controller(left, RouterTransaction::new(l1)).unwrap();
        f.nav.push_controller(right, RouterTransaction::new(r1)).unwrap();
        f.nav.push_controller(right, RouterTransaction::new(r2)).unwrap();
        f.nav.push_controller(left, RouterTransaction::new(l2)).unwrap();

        assert!(f.nav.handle_back());
        assert_eq!(f.nav.backstack(left), vec![l1]);
        assert!(f.nav.handle_back());
        assert_eq!(f.nav.backstack(right), vec![r1]);
        // Both children are at their roots; roots pop under the default policy.
        assert!(f.nav.handle_back());
        assert!(f.nav.backstack(right).is_empty());
    }
}
