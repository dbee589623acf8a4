// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The navigator: arena of controllers and routers plus host-facing entry points.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use tracing::{debug, warn};
use understory_backstack::TransactionIndexer;

use crate::change::InFlightChange;
use crate::controller::{Controller, ControllerSlot, LifecycleListener, ListenerCaps, ListenerRecord};
use crate::error::NavigationError;
use crate::host::Host;
use crate::lifecycle::{DetachMode, LifecycleState};
use crate::router::{RouterHost, RouterSlot};
use crate::slots::Slots;
use crate::surface::{HeadlessSurface, Surface};
use crate::types::{
    ChangeId, ContainerId, ControllerFlags, ControllerId, HostEvent, InstanceId, NavigatorConfig,
    RetainViewMode, RouterId, ViewId,
};

/// Owner of every controller and router in one navigation tree.
///
/// Root routers are created with [`attach_router`](Self::attach_router); child routers appear when a
/// controller's view creates a tagged container through
/// [`ViewContext::child_container`](crate::ViewContext::child_container). All routers share one
/// [`TransactionIndexer`], so transaction indices are comparable across the whole tree.
///
/// The navigator is single-threaded: it holds reference-counted listeners and boxed controllers,
/// so it is neither `Send` nor `Sync`.
pub struct Navigator<S: Surface = HeadlessSurface> {
    pub(crate) surface: S,
    pub(crate) controllers: Slots<ControllerId, ControllerSlot>,
    pub(crate) routers: Slots<RouterId, RouterSlot>,
    pub(crate) root_routers: Vec<RouterId>,
    pub(crate) indexer: TransactionIndexer,
    pub(crate) in_flight: Vec<InFlightChange>,
    pub(crate) next_change: u64,
    pub(crate) next_instance: u64,
    pub(crate) config: NavigatorConfig,
    pub(crate) host: Option<Box<dyn Host>>,
    pub(crate) result_requests: BTreeMap<i32, InstanceId>,
    pub(crate) permission_requests: BTreeMap<i32, InstanceId>,
    pub(crate) context_available: bool,
    pub(crate) host_started: bool,
}

impl<S: Surface> core::fmt::Debug for Navigator<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let controllers: Vec<_> = self.controllers.iter().map(|(_, s)| s).collect();
        let routers: Vec<_> = self.routers.iter().map(|(_, s)| s).collect();
        f.debug_struct("Navigator")
            .field("controllers", &controllers)
            .field("routers", &routers)
            .field("root_routers", &self.root_routers)
            .field("in_flight", &self.in_flight.len())
            .field("config", &self.config)
            .field("context_available", &self.context_available)
            .field("host_started", &self.host_started)
            .finish_non_exhaustive()
    }
}

impl<S: Surface> Navigator<S> {
    /// Create a navigator over `surface` with the default configuration.
    pub fn new(surface: S) -> Self {
        Self::with_config(surface, NavigatorConfig::default())
    }

    /// Create a navigator over `surface`.
    pub fn with_config(surface: S, config: NavigatorConfig) -> Self {
        Self {
            surface,
            controllers: Slots::default(),
            routers: Slots::default(),
            root_routers: Vec::new(),
            indexer: TransactionIndexer::new(),
            in_flight: Vec::new(),
            next_change: 0,
            next_instance: 0,
            config,
            host: None,
            result_requests: BTreeMap::new(),
            permission_requests: BTreeMap::new(),
            context_available: true,
            host_started: true,
        }
    }

    /// The render surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// The render surface, mutably.
    ///
    /// Changing container attachment through it does not notify the navigator; follow up with
    /// [`on_container_ready`](Self::on_container_ready).
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Navigator-wide defaults.
    pub fn config(&self) -> NavigatorConfig {
        self.config
    }

    /// Hand `controller` to the navigator. It stays inert until pushed.
    pub fn insert_controller(&mut self, controller: impl Controller + 'static) -> ControllerId {
        self.insert_boxed_controller(Box::new(controller))
    }

    /// Like [`insert_controller`](Self::insert_controller) for an already boxed controller.
    pub fn insert_boxed_controller(&mut self, controller: Box<dyn Controller>) -> ControllerId {
        let instance_id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.insert_slot(ControllerSlot::new(controller, instance_id))
    }

    pub(crate) fn insert_slot(&mut self, slot: ControllerSlot) -> ControllerId {
        let type_name = slot.controller.type_name();
        let instance_id = slot.instance_id;
        let id = self.controllers.insert(slot);
        debug!(controller = ?id, type_name, ?instance_id, "controller created");
        id
    }

    /// Create a root router bound to `container`.
    ///
    /// The container counts as ready if the surface reports it attached; otherwise confirm with
    /// [`on_container_ready`](Self::on_container_ready).
    pub fn attach_router(&mut self, container: ContainerId) -> RouterId {
        let mut slot = RouterSlot::new(
            RouterHost::Root,
            self.config.pop_root_policy,
            self.config.back_dispatch_enabled,
        );
        slot.container = Some(container);
        slot.container_ready = self.surface.is_attached(container);
        let id = self.routers.insert(slot);
        self.root_routers.push(id);
        debug!(router = ?id, ?container, "root router attached");
        id
    }

    /// Root routers in creation order.
    pub fn root_routers(&self) -> &[RouterId] {
        &self.root_routers
    }

    /// Bind `router` to a new container, re-attaching whatever it shows.
    pub fn set_router_container(
        &mut self,
        router: RouterId,
        container: ContainerId,
    ) -> Result<(), NavigationError> {
        let attached = self.surface.is_attached(container);
        let slot = self
            .routers
            .get_mut(router)
            .ok_or(NavigationError::UnknownRouter(router))?;
        if slot.container != Some(container) {
            if slot.container.is_some() {
                self.remove_router_host(router);
            }
            if let Some(slot) = self.routers.get_mut(router) {
                slot.container = Some(container);
                slot.container_ready = attached;
            }
            debug!(?router, ?container, "router container set");
        }
        self.refresh_router(router);
        Ok(())
    }

    fn refresh_router(&mut self, r: RouterId) {
        self.rebind_router(r);
        for c in self.router_controllers(r) {
            self.try_attach(c);
        }
        self.flush_pending(r);
        self.collect_garbage();
    }

    /// Find or create the child router of `parent` tagged `tag` and bind it to `container`.
    pub(crate) fn bind_child_router(
        &mut self,
        parent: ControllerId,
        container: ContainerId,
        tag: String,
    ) -> RouterId {
        let existing = self.child_routers_of(parent).into_iter().find(|&r| {
            self.routers
                .get(r)
                .is_some_and(|s| s.tag.as_deref() == Some(tag.as_str()))
        });
        let attached = self.surface.is_attached(container);
        let r = match existing {
            Some(r) => r,
            None => {
                let mut slot = RouterSlot::new(
                    RouterHost::Controller(parent),
                    self.config.pop_root_policy,
                    self.config.back_dispatch_enabled,
                );
                slot.tag = Some(tag);
                let r = self.routers.insert(slot);
                if let Some(p) = self.controllers.get_mut(parent) {
                    p.child_routers.push(r);
                }
                debug!(router = ?r, ?parent, "child router created");
                r
            }
        };
        if let Some(slot) = self.routers.get_mut(r) {
            slot.container = Some(container);
            slot.container_ready = attached;
        }
        self.rebind_router(r);
        r
    }

    /// Child routers owned by `parent`, in creation order.
    pub fn child_routers(&self, parent: ControllerId) -> Vec<RouterId> {
        self.child_routers_of(parent)
    }

    /// The host confirmed that `container` is fully attached.
    ///
    /// Every router bound to it attaches what it shows and flushes its queued changes in
    /// submission order.
    pub fn on_container_ready(&mut self, container: ContainerId) {
        let routers: Vec<RouterId> = self
            .routers
            .iter()
            .filter(|(_, s)| s.container == Some(container))
            .map(|(r, _)| r)
            .collect();
        for r in routers {
            if let Some(slot) = self.routers.get_mut(r) {
                slot.container_ready = true;
            }
            debug!(router = ?r, ?container, "container ready");
            self.refresh_router(r);
        }
    }

    /// Forward a platform lifecycle signal.
    pub fn on_host_event(&mut self, event: HostEvent) {
        debug!(?event, "host event");
        for c in self.controllers.keys() {
            if let Some(slot) = self.controllers.get_mut(c)
                && !slot.flags.contains(ControllerFlags::DESTROYED)
            {
                slot.controller.on_host_event(event);
            }
        }
        let roots = self.root_routers.clone();
        match event {
            HostEvent::Created => {
                self.context_available = true;
                for &r in &roots {
                    for c in self.router_controllers(r) {
                        self.make_context_available(c);
                    }
                }
            }
            HostEvent::Started => {
                self.host_started = true;
                for &r in &roots {
                    if let Some(slot) = self.routers.get_mut(r) {
                        slot.container_ready = slot
                            .container
                            .is_some_and(|c| self.surface.is_attached(c));
                    }
                    self.refresh_router(r);
                }
            }
            HostEvent::Resumed | HostEvent::Paused => {}
            HostEvent::Stopped => {
                self.host_started = false;
                for &r in &roots {
                    for c in self.router_controllers(r) {
                        if self.flags(c).contains(ControllerFlags::ATTACHED) {
                            self.detach(c, DetachMode::Retain);
                        }
                    }
                }
            }
            HostEvent::Destroyed {
                changing_configurations: false,
            } => {
                for &r in &roots {
                    if let Err(err) = self.destroy_router(r, false) {
                        warn!(router = ?r, %err, "root router could not be destroyed");
                    }
                    self.remove_router_host(r);
                }
                self.context_available = false;
            }
            HostEvent::Destroyed {
                changing_configurations: true,
            } => {
                while let Some(id) = self.in_flight.first().map(|c| c.id) {
                    self.finish_change(id);
                }
                for &r in &roots {
                    self.prepare_for_host_detach(r);
                    self.remove_router_host(r);
                }
                for &r in &roots {
                    for c in self.router_all_controllers(r) {
                        self.make_context_unavailable(c);
                    }
                }
                self.context_available = false;
            }
        }
        self.collect_garbage();
    }

    /// Complete the running change `id`. Returns `false` if it is not running.
    pub fn complete_change(&mut self, id: ChangeId) -> bool {
        let completed = self.finish_change(id);
        self.collect_garbage();
        completed
    }

    /// Changes that started and have not completed, oldest first.
    pub fn in_flight_changes(&self) -> Vec<ChangeId> {
        self.in_flight.iter().map(|c| c.id).collect()
    }

    /// Offer a back press to every root router, most recently created first.
    pub fn handle_back(&mut self) -> bool {
        let roots = self.root_routers.clone();
        roots
            .into_iter()
            .rev()
            .any(|r| self.handle_back_in(r) == Ok(true))
    }

    /// Number of controllers held, including destroyed ones a running change still references.
    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Returns `true` while `controller` exists and has not been destroyed.
    pub fn is_alive(&self, controller: ControllerId) -> bool {
        self.controllers
            .get(controller)
            .is_some_and(|s| !s.flags.contains(ControllerFlags::DESTROYED))
    }

    /// Lifecycle state of `controller`. `None` once its slot was reclaimed.
    pub fn lifecycle_state(&self, controller: ControllerId) -> Option<LifecycleState> {
        self.controllers.get(controller).map(ControllerSlot::state)
    }

    /// State flags of `controller`.
    pub fn controller_flags(&self, controller: ControllerId) -> Option<ControllerFlags> {
        self.controllers.get(controller).map(|s| s.flags)
    }

    /// Returns `true` if `controller` is attached.
    pub fn is_attached(&self, controller: ControllerId) -> bool {
        self.flags(controller).contains(ControllerFlags::ATTACHED)
    }

    /// The current view of `controller`.
    pub fn view_of(&self, controller: ControllerId) -> Option<ViewId> {
        self.controllers.get(controller)?.view
    }

    /// Stable instance id of `controller`.
    pub fn instance_id(&self, controller: ControllerId) -> Option<InstanceId> {
        self.controllers.get(controller).map(|s| s.instance_id)
    }

    /// The router `controller` was last bound to.
    pub fn router_of(&self, controller: ControllerId) -> Option<RouterId> {
        self.controllers.get(controller)?.router
    }

    /// The controller behind `controller`.
    pub fn controller(&self, controller: ControllerId) -> Option<&dyn Controller> {
        let slot = self.controllers.get(controller)?;
        Some(slot.controller.as_ref())
    }

    /// The controller behind `controller`, mutably.
    pub fn controller_mut(&mut self, controller: ControllerId) -> Option<&mut dyn Controller> {
        let slot = self.controllers.get_mut(controller)?;
        Some(slot.controller.as_mut())
    }

    /// Whether `controller` keeps its view across detach.
    ///
    /// Switching to [`RetainViewMode::ReleaseDetach`] while detached releases the retained view.
    pub fn set_retain_view_mode(
        &mut self,
        controller: ControllerId,
        mode: RetainViewMode,
    ) -> Result<(), NavigationError> {
        let slot = self
            .controllers
            .get_mut(controller)
            .filter(|s| !s.flags.contains(ControllerFlags::DESTROYED))
            .ok_or(NavigationError::ControllerDestroyed(controller))?;
        slot.retain_mode = mode;
        if mode == RetainViewMode::ReleaseDetach
            && slot.view.is_some()
            && !slot.flags.contains(ControllerFlags::ATTACHED)
        {
            self.remove_view_reference(controller, false);
        }
        Ok(())
    }

    /// Observe `controller` with `listener`, limited to the hooks in `caps`.
    pub fn add_lifecycle_listener(
        &mut self,
        controller: ControllerId,
        caps: ListenerCaps,
        listener: Rc<dyn LifecycleListener>,
    ) -> Result<(), NavigationError> {
        let slot = self
            .controllers
            .get_mut(controller)
            .ok_or(NavigationError::ControllerDestroyed(controller))?;
        slot.listeners.push(ListenerRecord { caps, listener });
        Ok(())
    }

    /// Stop notifying `listener`. Returns `false` if it was not registered.
    pub fn remove_lifecycle_listener(
        &mut self,
        controller: ControllerId,
        listener: &Rc<dyn LifecycleListener>,
    ) -> bool {
        let Some(slot) = self.controllers.get_mut(controller) else {
            return false;
        };
        let before = slot.listeners.len();
        slot.listeners
            .retain(|r| !Rc::ptr_eq(&r.listener, listener));
        slot.listeners.len() != before
    }

    /// Free destroyed controllers nothing refers to, then child routers whose owner is gone.
    pub(crate) fn collect_garbage(&mut self) {
        loop {
            let dead: Vec<ControllerId> = self
                .controllers
                .iter()
                .filter(|(c, s)| {
                    s.flags.contains(ControllerFlags::DESTROYED) && !self.is_referenced_by_change(*c)
                })
                .map(|(c, _)| c)
                .collect();
            let orphans: Vec<RouterId> = self
                .routers
                .iter()
                .filter(|(_, s)| match s.host {
                    RouterHost::Root => false,
                    RouterHost::Controller(p) => {
                        !self.controllers.contains(p)
                            && s.backstack.is_empty()
                            && s.pending.is_empty()
                            && s.destroying.iter().all(|&c| !self.controllers.contains(c))
                    }
                })
                .map(|(r, _)| r)
                .collect();
            if dead.is_empty() && orphans.is_empty() {
                return;
            }
            for c in dead {
                for r in self.routers.keys() {
                    if let Some(slot) = self.routers.get_mut(r) {
                        slot.destroying.retain(|&d| d != c);
                    }
                }
                self.controllers.remove(c);
                debug!(controller = ?c, "controller reclaimed");
            }
            for r in orphans {
                self.routers.remove(r);
                debug!(router = ?r, "child router reclaimed");
            }
        }
    }
}
