// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The rendering surface boundary and an in-memory implementation.
//!
//! ## Overview
//!
//! The navigator never renders. It asks a [`Surface`] to create views inside containers, to add and
//! remove them, and whether a container is currently attached to the platform window. Views and
//! containers are opaque ids chosen by the surface.
//!
//! [`HeadlessSurface`] keeps a tree of containers and views in memory. Containers are either roots
//! (attached when the host says so) or nested inside a view, in which case they are attached exactly
//! when that view sits in an attached container. It is enough to drive the navigator in tests, demos,
//! and headless hosts.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::types::{ContainerId, ViewId};

/// Render primitive used by the navigator.
pub trait Surface {
    /// Create a detached view meant to be shown in `parent`.
    fn create_view(&mut self, parent: ContainerId) -> ViewId;

    /// Create a container nested inside `host_view`, used to host child routers.
    fn create_container(&mut self, host_view: ViewId) -> ContainerId;

    /// Add `view` as the top-most child of `container`, detaching it from any previous container.
    fn add_view(&mut self, container: ContainerId, view: ViewId);

    /// Insert `view` into `container` at `index` (bottom is `0`), detaching it from any previous
    /// container. An index past the end adds it on top.
    fn insert_view(&mut self, container: ContainerId, view: ViewId, index: usize);

    /// Remove `view` from `container` if it is a child of it.
    fn remove_view(&mut self, container: ContainerId, view: ViewId);

    /// Drop every resource held by `view`. The navigator never uses the id again.
    fn release_view(&mut self, view: ViewId);

    /// The container `view` currently sits in.
    fn parent_of(&self, view: ViewId) -> Option<ContainerId>;

    /// Children of `container`, bottom to top.
    fn children(&self, container: ContainerId) -> Vec<ViewId>;

    /// Whether `container` is attached to the platform window.
    fn is_attached(&self, container: ContainerId) -> bool;
}

/// A view-level operation performed on a [`HeadlessSurface`], for inspection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceOp {
    /// A view was created for a container.
    Created(ViewId),
    /// A view was added to a container.
    Added(ContainerId, ViewId),
    /// A view was removed from a container.
    Removed(ContainerId, ViewId),
    /// A view was released.
    Released(ViewId),
}

#[derive(Clone, Debug, Default)]
struct ContainerNode {
    host_view: Option<ViewId>,
    attached: bool,
    children: Vec<ViewId>,
}

#[derive(Clone, Debug, Default)]
struct ViewNode {
    parent: Option<ContainerId>,
    released: bool,
}

/// In-memory [`Surface`] with nested containers and an operation log.
#[derive(Clone, Debug, Default)]
pub struct HeadlessSurface {
    next_id: u64,
    containers: BTreeMap<ContainerId, ContainerNode>,
    views: BTreeMap<ViewId, ViewNode>,
    ops: Vec<SurfaceOp>,
}

impl HeadlessSurface {
    /// Create an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Create a root container, attached or not.
    pub fn add_root_container(&mut self, attached: bool) -> ContainerId {
        let id = ContainerId(self.next());
        self.containers.insert(
            id,
            ContainerNode {
                attached,
                ..ContainerNode::default()
            },
        );
        id
    }

    /// Create a container nested inside `view`.
    pub fn add_container_in(&mut self, view: ViewId) -> ContainerId {
        let id = ContainerId(self.next());
        self.containers.insert(
            id,
            ContainerNode {
                host_view: Some(view),
                ..ContainerNode::default()
            },
        );
        id
    }

    /// Attach or detach a root container.
    pub fn set_attached(&mut self, container: ContainerId, attached: bool) {
        if let Some(c) = self.containers.get_mut(&container) {
            c.attached = attached;
        }
    }

    /// Returns `true` once `view` was released.
    pub fn is_released(&self, view: ViewId) -> bool {
        self.views.get(&view).is_some_and(|v| v.released)
    }

    /// Containers nested inside `view`.
    pub fn containers_in(&self, view: ViewId) -> Vec<ContainerId> {
        self.containers
            .iter()
            .filter(|(_, c)| c.host_view == Some(view))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Operations performed so far.
    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    /// Take and clear the operation log.
    pub fn take_ops(&mut self) -> Vec<SurfaceOp> {
        core::mem::take(&mut self.ops)
    }

    fn detach_from_parent(&mut self, view: ViewId) {
        let Some(parent) = self.views.get_mut(&view).and_then(|v| v.parent.take()) else {
            return;
        };
        if let Some(c) = self.containers.get_mut(&parent) {
            c.children.retain(|v| *v != view);
        }
        self.ops.push(SurfaceOp::Removed(parent, view));
    }
}

impl Surface for HeadlessSurface {
    fn create_view(&mut self, _parent: ContainerId) -> ViewId {
        let id = ViewId(self.next());
        self.views.insert(id, ViewNode::default());
        self.ops.push(SurfaceOp::Created(id));
        id
    }

    fn create_container(&mut self, host_view: ViewId) -> ContainerId {
        self.add_container_in(host_view)
    }

    fn add_view(&mut self, container: ContainerId, view: ViewId) {
        self.insert_view(container, view, usize::MAX);
    }

    fn insert_view(&mut self, container: ContainerId, view: ViewId, index: usize) {
        if !self.containers.contains_key(&container) {
            return;
        }
        self.detach_from_parent(view);
        self.views.entry(view).or_default().parent = Some(container);
        if let Some(c) = self.containers.get_mut(&container) {
            let index = index.min(c.children.len());
            c.children.insert(index, view);
        }
        self.ops.push(SurfaceOp::Added(container, view));
    }

    fn remove_view(&mut self, container: ContainerId, view: ViewId) {
        if self.parent_of(view) == Some(container) {
            self.detach_from_parent(view);
        }
    }

    fn release_view(&mut self, view: ViewId) {
        if let Some(v) = self.views.get_mut(&view) {
            v.released = true;
            self.ops.push(SurfaceOp::Released(view));
        }
    }

    fn parent_of(&self, view: ViewId) -> Option<ContainerId> {
        self.views.get(&view).and_then(|v| v.parent)
    }

    fn children(&self, container: ContainerId) -> Vec<ViewId> {
        self.containers
            .get(&container)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    fn is_attached(&self, container: ContainerId) -> bool {
        let mut current = container;
        // Containers nest at most as deep as the view tree; walk up to a root.
        loop {
            let Some(node) = self.containers.get(&current) else {
                return false;
            };
            match node.host_view {
                None => return node.attached,
                Some(view) => match self.parent_of(view) {
                    Some(parent) => current = parent,
                    None => return false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn add_moves_views_between_containers() {
        let mut s = HeadlessSurface::new();
        let a = s.add_root_container(true);
        let b = s.add_root_container(true);
        let v = s.create_view(a);
        s.add_view(a, v);
        s.add_view(b, v);
        assert_eq!(s.parent_of(v), Some(b));
        assert!(s.children(a).is_empty());
        assert_eq!(s.children(b), vec![v]);
    }

    #[test]
    fn insert_places_views_by_index() {
        let mut s = HeadlessSurface::new();
        let c = s.add_root_container(true);
        let [a, b, d] = [s.create_view(c), s.create_view(c), s.create_view(c)];
        s.add_view(c, a);
        s.add_view(c, b);
        s.insert_view(c, d, 1);
        assert_eq!(s.children(c), vec![a, d, b]);
        // Re-inserting moves the view; indices past the end add on top.
        s.insert_view(c, a, 10);
        assert_eq!(s.children(c), vec![d, b, a]);
    }

    #[test]
    fn remove_ignores_foreign_containers() {
        let mut s = HeadlessSurface::new();
        let a = s.add_root_container(true);
        let b = s.add_root_container(true);
        let v = s.create_view(a);
        s.add_view(a, v);
        s.remove_view(b, v);
        assert_eq!(s.parent_of(v), Some(a));
        s.remove_view(a, v);
        assert_eq!(s.parent_of(v), None);
    }

    #[test]
    fn nested_containers_follow_their_host_view() {
        let mut s = HeadlessSurface::new();
        let root = s.add_root_container(false);
        let v = s.create_view(root);
        let inner = s.add_container_in(v);
        assert!(!s.is_attached(inner));
        s.add_view(root, v);
        assert!(!s.is_attached(inner));
        s.set_attached(root, true);
        assert!(s.is_attached(inner));
        s.remove_view(root, v);
        assert!(!s.is_attached(inner));
        assert_eq!(s.containers_in(v), vec![inner]);
    }

    #[test]
    fn ops_are_logged() {
        let mut s = HeadlessSurface::new();
        let root = s.add_root_container(true);
        let v = s.create_view(root);
        s.add_view(root, v);
        s.remove_view(root, v);
        s.release_view(v);
        assert_eq!(
            s.take_ops(),
            vec![
                SurfaceOp::Created(v),
                SurfaceOp::Added(root, v),
                SurfaceOp::Removed(root, v),
                SurfaceOp::Released(v),
            ]
        );
        assert!(s.is_released(v));
        assert!(s.ops().is_empty());
    }
}
