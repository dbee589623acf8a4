// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transition execution: the pending queue, in-flight changes, and completion.
//!
//! Every transition is either queued on its router, running (in flight), or finished. A change
//! that removes its "from" view is queued while the router's container is not confirmed ready,
//! and once anything is queued every later change queues behind it. The queue flushes in
//! submission order.
//!
//! Running changes are completed exactly once, either by the host through
//! [`Navigator::complete_change`] or synchronously by the navigator when a newer change touches
//! the same controller.

use alloc::boxed::Box;
use alloc::vec::Vec;

use tracing::{debug, trace};

use crate::controller::ListenerCaps;
use crate::handler::{ChangeContext, ChangeHandler, ChangeStatus, SimpleSwapChangeHandler, ViewOp};
use crate::lifecycle::DetachMode;
use crate::navigator::Navigator;
use crate::surface::Surface;
use crate::types::{ChangeId, ChangeKind, ContainerId, ControllerFlags, ControllerId, RouterId, ViewId};

/// A transition waiting to run.
pub(crate) struct PendingChange {
    pub(crate) to: Option<ControllerId>,
    pub(crate) from: Option<ControllerId>,
    pub(crate) is_push: bool,
    pub(crate) handler: Option<Box<dyn ChangeHandler>>,
    /// Remove the "from" view on completion even if the handler kept it.
    pub(crate) force_remove: bool,
    /// Release the "from" controller's view reference on completion but keep it on the surface.
    pub(crate) abandon_from_view: bool,
    /// Layers that transition out, in order, after this change completes.
    pub(crate) cascade: Vec<ControllerId>,
}

impl PendingChange {
    pub(crate) fn new(
        to: Option<ControllerId>,
        from: Option<ControllerId>,
        is_push: bool,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Self {
        Self {
            to,
            from,
            is_push,
            handler,
            force_remove: false,
            abandon_from_view: false,
            cascade: Vec::new(),
        }
    }

    pub(crate) fn forcing_removal(mut self) -> Self {
        self.force_remove = true;
        self
    }

    fn touches(&self, c: ControllerId) -> bool {
        self.to == Some(c) || self.from == Some(c) || self.cascade.contains(&c)
    }
}

/// A transition that started and has not completed.
pub(crate) struct InFlightChange {
    pub(crate) id: ChangeId,
    pub(crate) router: RouterId,
    container: ContainerId,
    pub(crate) to: Option<ControllerId>,
    pub(crate) from: Option<ControllerId>,
    to_view: Option<ViewId>,
    from_view: Option<ViewId>,
    is_push: bool,
    handler: Box<dyn ChangeHandler>,
    force_remove: bool,
    abandon_from_view: bool,
    cascade: Vec<ControllerId>,
}

impl<S: Surface> Navigator<S> {
    /// Run or queue a transition on `r`.
    pub(crate) fn perform_change(&mut self, r: RouterId, change: PendingChange) {
        let Some(router) = self.routers.get_mut(r) else {
            return;
        };
        let removes = change
            .handler
            .as_ref()
            .is_none_or(|h| h.removes_from_view_on_push());
        let blocked = change.from.is_some()
            && removes
            && router.container.is_some()
            && !router.container_ready;
        if !router.pending.is_empty() || blocked {
            trace!(router = ?r, to = ?change.to, from = ?change.from, "change queued");
            let to = change.to;
            router.pending.push_back(change);
            if let Some(to) = to
                && let Some(slot) = self.controllers.get_mut(to)
            {
                slot.flags.insert(ControllerFlags::NEEDS_ATTACH);
            }
            return;
        }
        self.execute_change(r, change);
    }

    /// Run every queued change of `r` in submission order.
    pub(crate) fn flush_pending(&mut self, r: RouterId) {
        loop {
            let Some(router) = self.routers.get_mut(r) else {
                return;
            };
            if !router.container_ready {
                return;
            }
            let Some(change) = router.pending.pop_front() else {
                return;
            };
            self.execute_change(r, change);
        }
    }

    fn execute_change(&mut self, r: RouterId, mut change: PendingChange) {
        change.to = change.to.filter(|&c| self.controllers.get(c).is_some());
        change.from = change.from.filter(|&c| self.controllers.get(c).is_some());
        let Some(container) = self.routers.get(r).and_then(|s| s.container) else {
            trace!(router = ?r, "no container; change reduced to bookkeeping");
            if let Some(to) = change.to
                && let Some(slot) = self.controllers.get_mut(to)
            {
                slot.flags.insert(ControllerFlags::NEEDS_ATTACH);
            }
            if let Some(from) = change.from {
                self.settle_destroy(from);
            }
            return;
        };
        if change.to.is_none() && change.from.is_none() {
            return;
        }
        for c in [change.from, change.to].into_iter().flatten() {
            self.complete_change_to(c);
        }

        let handler = change
            .handler
            .take()
            .unwrap_or_else(|| Box::new(SimpleSwapChangeHandler::default()));
        let id = ChangeId(self.next_change);
        self.next_change += 1;
        let (to_kind, from_kind) = ChangeKind::for_change(change.is_push);

        let mut to_view = None;
        if let Some(to) = change.to {
            to_view = self.inflate(to, container);
            self.change_started(to, to_kind);
        }
        let mut from_view = None;
        if let Some(from) = change.from {
            from_view = self.controllers.get(from).and_then(|s| s.view);
            self.change_started(from, from_kind);
        }
        debug!(
            change = ?id,
            router = ?r,
            to = ?change.to,
            from = ?change.from,
            is_push = change.is_push,
            handler = handler.type_name(),
            "change started"
        );

        let mut record = InFlightChange {
            id,
            router: r,
            container,
            to: change.to,
            from: change.from,
            to_view,
            from_view,
            is_push: change.is_push,
            handler,
            force_remove: change.force_remove,
            abandon_from_view: change.abandon_from_view,
            cascade: change.cascade,
        };
        let above = self.views_above(r, change.to);
        let mut cx = ChangeContext::new(
            &mut self.surface,
            container,
            from_view,
            to_view,
            change.is_push,
        )
        .keeping_above(above);
        let status = record.handler.perform_change(&mut cx);
        let ops = cx.into_ops();
        self.in_flight.push(record);
        self.apply_view_ops(&ops);
        if let Some(to) = change.to {
            self.try_attach(to);
        }
        match status {
            ChangeStatus::Completed => {
                self.finish_change(id);
            }
            ChangeStatus::Pending => trace!(change = ?id, "change pending"),
        }
    }

    /// Views of the controllers stacked above `to` in `r`, root to top.
    fn views_above(&self, r: RouterId, to: Option<ControllerId>) -> Vec<ViewId> {
        let Some(to) = to else {
            return Vec::new();
        };
        self.router_controllers(r)
            .into_iter()
            .skip_while(|&c| c != to)
            .skip(1)
            .filter_map(|c| self.controllers.get(c).and_then(|s| s.view))
            .collect()
    }

    fn apply_view_ops(&mut self, ops: &[ViewOp]) {
        for op in ops {
            match *op {
                ViewOp::Added(view) => {
                    if let Some(c) = self.controller_for_view(view) {
                        self.try_attach(c);
                    }
                }
                ViewOp::Removed(view) => {
                    if let Some(c) = self.controller_for_view(view) {
                        self.on_view_removed(c);
                    }
                }
            }
        }
    }

    pub(crate) fn controller_for_view(&self, view: ViewId) -> Option<ControllerId> {
        self.controllers
            .iter()
            .find(|(_, s)| s.view == Some(view))
            .map(|(c, _)| c)
    }

    fn change_started(&mut self, c: ControllerId, kind: ChangeKind) {
        if !kind.is_enter() {
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.flags.insert(ControllerFlags::EXITING);
            }
            for child in self.child_routers_of(c) {
                self.set_detach_frozen(child, true);
            }
        }
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.controller.on_change_started(kind);
        }
        self.notify(c, ListenerCaps::CHANGE, |l| l.on_change_start(c, kind));
    }

    fn change_ended(&mut self, c: ControllerId, kind: ChangeKind) {
        if !kind.is_enter() {
            if let Some(slot) = self.controllers.get_mut(c) {
                slot.flags.remove(ControllerFlags::EXITING);
            }
            for child in self.child_routers_of(c) {
                self.set_detach_frozen(child, false);
            }
        }
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.controller.on_change_ended(kind);
        }
        self.notify(c, ListenerCaps::CHANGE, |l| l.on_change_end(c, kind));
    }

    /// Complete the in-flight change `id`. Returns `false` if it is not running.
    pub(crate) fn finish_change(&mut self, id: ChangeId) -> bool {
        let Some(pos) = self.in_flight.iter().position(|c| c.id == id) else {
            return false;
        };
        let mut change = self.in_flight.remove(pos);
        let above = self.views_above(change.router, change.to);
        let mut cx = ChangeContext::new(
            &mut self.surface,
            change.container,
            change.from_view,
            change.to_view,
            change.is_push,
        )
        .keeping_above(above);
        change.handler.complete(&mut cx);
        let ops = cx.into_ops();
        self.apply_view_ops(&ops);

        let (to_kind, from_kind) = ChangeKind::for_change(change.is_push);
        if let Some(from) = change.from {
            self.change_ended(from, from_kind);
        }
        if let Some(to) = change.to {
            self.change_ended(to, to_kind);
        }
        if change.force_remove
            && let Some(view) = change.from_view
            && self.surface.parent_of(view) == Some(change.container)
        {
            self.surface.remove_view(change.container, view);
            if let Some(owner) = self.controller_for_view(view) {
                self.on_view_removed(owner);
            }
        }
        if let Some(from) = change.from {
            if change.handler.removes_from_view_on_push()
                && let Some(slot) = self.controllers.get_mut(from)
            {
                slot.flags.remove(ControllerFlags::NEEDS_ATTACH);
            }
            if change.abandon_from_view {
                self.detach(from, DetachMode::Abandon);
            }
            self.settle_destroy(from);
        }
        debug!(change = ?id, "change completed");

        for layer in core::mem::take(&mut change.cascade) {
            if self.controllers.get(layer).is_some_and(|s| {
                !s.flags.contains(ControllerFlags::DESTROYED) && s.view.is_some()
            }) {
                self.perform_change(
                    change.router,
                    PendingChange::new(
                        None,
                        Some(layer),
                        true,
                        Some(Box::new(SimpleSwapChangeHandler::default())),
                    ),
                );
            } else {
                self.settle_destroy(layer);
            }
        }
        true
    }

    /// Force-complete the in-flight change that shows `c`. Returns whether one was running.
    pub(crate) fn complete_change_to(&mut self, c: ControllerId) -> bool {
        let mut completed = false;
        while let Some(id) = self
            .in_flight
            .iter()
            .find(|change| change.to == Some(c))
            .map(|change| change.id)
        {
            trace!(change = ?id, controller = ?c, "force-completing change");
            self.finish_change(id);
            completed = true;
        }
        completed
    }

    /// Force-complete every in-flight change that shows or hides `c`.
    pub(crate) fn complete_changes_touching(&mut self, c: ControllerId) {
        while let Some(id) = self
            .in_flight
            .iter()
            .find(|change| change.to == Some(c) || change.from == Some(c))
            .map(|change| change.id)
        {
            self.finish_change(id);
        }
    }

    /// Returns `true` if `c` is the exit of a queued change.
    pub(crate) fn is_pending_from(&self, c: ControllerId) -> bool {
        self.routers
            .iter()
            .any(|(_, r)| r.pending.iter().any(|p| p.from == Some(c)))
    }

    /// Returns `true` if `c` is the target of a queued or running change.
    pub(crate) fn is_change_target(&self, c: ControllerId) -> bool {
        self.in_flight.iter().any(|f| f.to == Some(c))
            || self
                .routers
                .iter()
                .any(|(_, r)| r.pending.iter().any(|p| p.to == Some(c)))
    }

    /// Returns `true` if any queued or running change refers to `c`.
    pub(crate) fn is_referenced_by_change(&self, c: ControllerId) -> bool {
        self.in_flight.iter().any(|f| {
            f.to == Some(c) || f.from == Some(c) || f.cascade.contains(&c)
        }) || self
            .routers
            .iter()
            .any(|(_, r)| r.pending.iter().any(|p| p.touches(c)))
    }
}
