// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change handlers: pluggable transition strategies between two views.
//!
//! ## Contract
//!
//! A [`ChangeHandler`] is an immutable configuration. The navigator clones it for every transition
//! it runs, so a handler stored in a transaction can be reused for the next push or pop, and no two
//! transitions ever share a mutable instance.
//!
//! A transition runs in two steps:
//!
//! 1) [`ChangeHandler::perform_change`] starts the transition and returns [`ChangeStatus`].
//!    Handlers that finish synchronously return [`ChangeStatus::Completed`].
//! 2) [`ChangeHandler::complete`] finishes it. For pending handlers this happens when the host's
//!    scheduler calls [`Navigator::complete_change`](crate::Navigator::complete_change), or
//!    synchronously when the navigator force-completes the change because a newer transition
//!    touches the same controller. A handler never observes a silent drop.
//!
//! View manipulation goes through [`ChangeContext`], which records every add and remove so the
//! navigator can drive attach/detach lifecycles in the exact order the handler produced them.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;

use understory_backstack::Opacity;

use crate::bundle::Bundle;
use crate::surface::Surface;
use crate::types::{ContainerId, ViewId};

/// Outcome of [`ChangeHandler::perform_change`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChangeStatus {
    /// The transition finished during `perform_change`.
    Completed,
    /// The transition keeps running until it is completed through the navigator.
    Pending,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ViewOp {
    Added(ViewId),
    Removed(ViewId),
}

/// The views and container a transition operates on.
pub struct ChangeContext<'a> {
    surface: &'a mut dyn Surface,
    container: ContainerId,
    from: Option<ViewId>,
    to: Option<ViewId>,
    is_push: bool,
    /// Views that stay above "to" when it is added.
    above: Vec<ViewId>,
    ops: Vec<ViewOp>,
}

impl Debug for ChangeContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeContext")
            .field("container", &self.container)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("is_push", &self.is_push)
            .finish_non_exhaustive()
    }
}

impl<'a> ChangeContext<'a> {
    pub(crate) fn new(
        surface: &'a mut dyn Surface,
        container: ContainerId,
        from: Option<ViewId>,
        to: Option<ViewId>,
        is_push: bool,
    ) -> Self {
        Self {
            surface,
            container,
            from,
            to,
            is_push,
            above: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Keep `views` above the incoming view when it is added.
    pub(crate) fn keeping_above(mut self, views: Vec<ViewId>) -> Self {
        self.above = views;
        self
    }

    /// Below the lowest view that must stay above the incoming one.
    fn insertion_index(&self) -> Option<usize> {
        let outgoing = self.from.filter(|_| !self.is_push);
        self.surface
            .children(self.container)
            .iter()
            .position(|v| self.above.contains(v) || Some(*v) == outgoing)
    }

    /// The container both views live in.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// The outgoing view, if any.
    pub fn from_view(&self) -> Option<ViewId> {
        self.from
    }

    /// The incoming view, if any.
    pub fn to_view(&self) -> Option<ViewId> {
        self.to
    }

    /// Returns `true` for push transitions.
    pub fn is_push(&self) -> bool {
        self.is_push
    }

    /// Add the incoming view to the container unless it is already there.
    ///
    /// The view goes on top unless a layer that stays in front of it is already in the container.
    /// On a pop, the outgoing view counts as such a layer while it is still there.
    pub fn add_to_view(&mut self) {
        if let Some(to) = self.to
            && self.surface.parent_of(to) != Some(self.container)
        {
            match self.insertion_index() {
                Some(index) => self.surface.insert_view(self.container, to, index),
                None => self.surface.add_view(self.container, to),
            }
            self.ops.push(ViewOp::Added(to));
        }
    }

    /// Remove the outgoing view from the container if it is there.
    pub fn remove_from_view(&mut self) {
        if let Some(from) = self.from
            && self.surface.parent_of(from) == Some(self.container)
        {
            self.surface.remove_view(self.container, from);
            self.ops.push(ViewOp::Removed(from));
        }
    }

    pub(crate) fn into_ops(self) -> Vec<ViewOp> {
        self.ops
    }
}

/// A transition strategy between two views.
pub trait ChangeHandler: Debug {
    /// Stable name used to persist and restore the handler.
    fn type_name(&self) -> &'static str;

    /// Start the transition.
    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) -> ChangeStatus;

    /// Finish the transition. Called exactly once per started transition.
    fn complete(&mut self, cx: &mut ChangeContext<'_>) {
        let _ = cx;
    }

    /// Whether pushing with this handler removes the "from" view (opaque push).
    fn removes_from_view_on_push(&self) -> bool {
        true
    }

    /// A fresh copy of this configuration.
    fn clone_handler(&self) -> Box<dyn ChangeHandler>;

    /// Write the configuration for persistence.
    fn save(&self, out: &mut Bundle) {
        let _ = out;
    }
}

impl Clone for Box<dyn ChangeHandler> {
    fn clone(&self) -> Self {
        self.clone_handler()
    }
}

impl Opacity for Box<dyn ChangeHandler> {
    fn is_opaque(&self) -> bool {
        self.removes_from_view_on_push()
    }
}

const REMOVES_FROM_VIEW_ON_PUSH: &str = "removes_from_view_on_push";

/// Swap views immediately: remove "from" (on pop, or on an opaque push), then add "to".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleSwapChangeHandler {
    removes_from_view_on_push: bool,
}

impl Default for SimpleSwapChangeHandler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SimpleSwapChangeHandler {
    /// Type name used for persistence.
    pub const TYPE_NAME: &'static str = "simple_swap";

    /// Create a swap handler; `removes_from_view_on_push = false` keeps lower layers rendered.
    pub const fn new(removes_from_view_on_push: bool) -> Self {
        Self {
            removes_from_view_on_push,
        }
    }

    /// Restore from a saved configuration.
    pub fn from_bundle(saved: &Bundle) -> Self {
        Self::new(saved.get_bool(REMOVES_FROM_VIEW_ON_PUSH).unwrap_or(true))
    }
}

impl ChangeHandler for SimpleSwapChangeHandler {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) -> ChangeStatus {
        if !cx.is_push() || self.removes_from_view_on_push {
            cx.remove_from_view();
        }
        cx.add_to_view();
        ChangeStatus::Completed
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn clone_handler(&self) -> Box<dyn ChangeHandler> {
        Box::new(self.clone())
    }

    fn save(&self, out: &mut Bundle) {
        out.put(REMOVES_FROM_VIEW_ON_PUSH, self.removes_from_view_on_push);
    }
}

/// A timed transition whose rendering is owned by the host.
///
/// The incoming view is added when the transition starts; the outgoing view is removed when the
/// transition completes. The host schedules completion after [`duration_ms`](Self::duration_ms)
/// through [`Navigator::complete_change`](crate::Navigator::complete_change).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredChangeHandler {
    duration_ms: u32,
    removes_from_view_on_push: bool,
}

impl DeferredChangeHandler {
    /// Type name used for persistence.
    pub const TYPE_NAME: &'static str = "deferred";

    /// Create a deferred handler.
    pub const fn new(duration_ms: u32, removes_from_view_on_push: bool) -> Self {
        Self {
            duration_ms,
            removes_from_view_on_push,
        }
    }

    /// Suggested duration for the host's scheduler.
    pub const fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// Restore from a saved configuration.
    pub fn from_bundle(saved: &Bundle) -> Self {
        let duration = saved
            .get_int("duration_ms")
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(0);
        Self::new(
            duration,
            saved.get_bool(REMOVES_FROM_VIEW_ON_PUSH).unwrap_or(true),
        )
    }
}

impl ChangeHandler for DeferredChangeHandler {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) -> ChangeStatus {
        cx.add_to_view();
        ChangeStatus::Pending
    }

    fn complete(&mut self, cx: &mut ChangeContext<'_>) {
        if !cx.is_push() || self.removes_from_view_on_push {
            cx.remove_from_view();
        }
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn clone_handler(&self) -> Box<dyn ChangeHandler> {
        Box::new(self.clone())
    }

    fn save(&self, out: &mut Bundle) {
        out.put("duration_ms", self.duration_ms);
        out.put(REMOVES_FROM_VIEW_ON_PUSH, self.removes_from_view_on_push);
    }
}

/// A transition that touches no views.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoOpChangeHandler;

impl NoOpChangeHandler {
    /// Type name used for persistence.
    pub const TYPE_NAME: &'static str = "no_op";
}

impl ChangeHandler for NoOpChangeHandler {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn perform_change(&mut self, _cx: &mut ChangeContext<'_>) -> ChangeStatus {
        ChangeStatus::Completed
    }

    fn clone_handler(&self) -> Box<dyn ChangeHandler> {
        Box::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessSurface;
    use alloc::vec;

    fn run(
        handler: &mut dyn ChangeHandler,
        surface: &mut HeadlessSurface,
        container: ContainerId,
        from: Option<ViewId>,
        to: Option<ViewId>,
        is_push: bool,
    ) -> (ChangeStatus, Vec<ViewOp>) {
        let mut cx = ChangeContext::new(surface, container, from, to, is_push);
        let status = handler.perform_change(&mut cx);
        (status, cx.into_ops())
    }

    fn setup() -> (HeadlessSurface, ContainerId, ViewId, ViewId) {
        let mut s = HeadlessSurface::new();
        let c = s.add_root_container(true);
        let a = s.create_view(c);
        let b = s.create_view(c);
        s.add_view(c, a);
        (s, c, a, b)
    }

    #[test]
    fn opaque_swap_removes_before_adding() {
        let (mut s, c, a, b) = setup();
        let mut h = SimpleSwapChangeHandler::default();
        let (status, ops) = run(&mut h, &mut s, c, Some(a), Some(b), true);
        assert_eq!(status, ChangeStatus::Completed);
        assert_eq!(ops, vec![ViewOp::Removed(a), ViewOp::Added(b)]);
        assert_eq!(s.children(c), vec![b]);
    }

    #[test]
    fn transparent_swap_keeps_from_on_push_but_not_on_pop() {
        let (mut s, c, a, b) = setup();
        let mut h = SimpleSwapChangeHandler::new(false);
        let (_, ops) = run(&mut h, &mut s, c, Some(a), Some(b), true);
        assert_eq!(ops, vec![ViewOp::Added(b)]);
        let (_, ops) = run(&mut h, &mut s, c, Some(b), Some(a), false);
        // `a` is already in the container, so only the removal is recorded.
        assert_eq!(ops, vec![ViewOp::Removed(b)]);
    }

    #[test]
    fn deferred_handler_removes_on_completion() {
        let (mut s, c, a, b) = setup();
        let mut h = DeferredChangeHandler::new(250, true);
        let (status, ops) = run(&mut h, &mut s, c, Some(a), Some(b), true);
        assert_eq!(status, ChangeStatus::Pending);
        assert_eq!(ops, vec![ViewOp::Added(b)]);
        let mut cx = ChangeContext::new(&mut s, c, Some(a), Some(b), true);
        h.complete(&mut cx);
        assert_eq!(cx.into_ops(), vec![ViewOp::Removed(a)]);
    }

    #[test]
    fn pops_insert_below_the_layers_that_stay_in_front() {
        let mut s = HeadlessSurface::new();
        let c = s.add_root_container(true);
        let [a, b, overlay] = [s.create_view(c), s.create_view(c), s.create_view(c)];
        s.add_view(c, b);
        s.add_view(c, overlay);
        let mut cx =
            ChangeContext::new(&mut s, c, Some(b), Some(a), false).keeping_above(vec![overlay]);
        SimpleSwapChangeHandler::default().perform_change(&mut cx);
        assert_eq!(cx.into_ops(), vec![ViewOp::Removed(b), ViewOp::Added(a)]);
        assert_eq!(s.children(c), vec![a, overlay]);
    }

    #[test]
    fn deferred_pop_adds_below_the_outgoing_view() {
        let (mut s, c, a, b) = setup();
        let mut h = DeferredChangeHandler::new(250, true);
        let (status, _) = run(&mut h, &mut s, c, Some(a), Some(b), false);
        assert_eq!(status, ChangeStatus::Pending);
        assert_eq!(s.children(c), vec![b, a]);
        let mut cx = ChangeContext::new(&mut s, c, Some(a), Some(b), false);
        h.complete(&mut cx);
        assert_eq!(s.children(c), vec![b]);
    }

    #[test]
    fn boxed_clones_are_independent_and_keep_opacity() {
        let h: Box<dyn ChangeHandler> = Box::new(SimpleSwapChangeHandler::new(false));
        let copy = h.clone();
        assert!(!copy.is_opaque());
        assert_eq!(copy.type_name(), SimpleSwapChangeHandler::TYPE_NAME);
        assert!(NoOpChangeHandler.clone_handler().is_opaque());
    }

    #[test]
    fn configurations_round_trip_through_bundles() {
        let mut saved = Bundle::new();
        DeferredChangeHandler::new(300, false).save(&mut saved);
        assert_eq!(
            DeferredChangeHandler::from_bundle(&saved),
            DeferredChangeHandler::new(300, false)
        );
        let mut saved = Bundle::new();
        SimpleSwapChangeHandler::new(false).save(&mut saved);
        assert_eq!(
            SimpleSwapChangeHandler::from_bundle(&saved),
            SimpleSwapChangeHandler::new(false)
        );
    }
}
