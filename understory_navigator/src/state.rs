// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Saved state: a logical, `serde`-friendly snapshot of a router tree.
//!
//! [`Navigator::save_router`] walks a router and every child router below it and produces a
//! [`SavedRouter`]. [`Navigator::restore_router`] rebuilds the controllers through a [`Registry`]
//! of constructors keyed by type name. The navigator never picks a wire format; any `serde`
//! encoder works.
//!
//! ## Restoring
//!
//! - Controllers keep their saved [`InstanceId`], so pending host results still find them.
//! - Transaction indices are restored and the shared indexer moves past them.
//! - Controllers that were attached when saved are flagged to reattach; their views are created
//!   when the router is bound to a ready container, and saved view state is handed back right
//!   after creation.
//! - Child routers are recreated empty of containers and bound again, by tag, when their parent's
//!   new view creates its containers.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use tracing::debug;
use understory_backstack::Transaction;

use crate::bundle::Bundle;
use crate::controller::{Controller, ControllerSlot, ListenerCaps};
use crate::error::NavigationError;
use crate::handler::{ChangeHandler, DeferredChangeHandler, NoOpChangeHandler, SimpleSwapChangeHandler};
use crate::navigator::Navigator;
use crate::router::{RouterHost, RouterSlot, RouterTransaction};
use crate::surface::Surface;
use crate::types::{
    ContainerId, ControllerFlags, ControllerId, InstanceId, PopRootPolicy, RetainViewMode, RouterId,
};

/// A persisted change handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedHandler {
    /// [`ChangeHandler::type_name`].
    pub handler_type: String,
    /// [`ChangeHandler::save`] output.
    pub state: Bundle,
}

/// A persisted backstack entry and the controller it holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedTransaction {
    /// [`Controller::type_name`].
    pub controller_type: String,
    /// Stable instance id.
    pub instance_id: InstanceId,
    /// [`Controller::args`] output.
    pub args: Bundle,
    /// View state, if the controller had a view or a saved one.
    pub view_state: Option<Bundle>,
    /// Instance state.
    pub instance_state: Bundle,
    /// Push handler.
    pub push_handler: Option<SavedHandler>,
    /// Pop handler.
    pub pop_handler: Option<SavedHandler>,
    /// Transaction index, if one was taken.
    pub transaction_index: Option<u64>,
    /// Transaction tag.
    pub tag: Option<String>,
    /// Whether the controller must be reattached after restore.
    pub needs_attach: bool,
    /// Retain mode.
    pub retain_mode: RetainViewMode,
    /// Child routers owned by the controller.
    pub child_routers: Vec<SavedRouter>,
}

/// A persisted router.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedRouter {
    /// Backstack, root first.
    pub backstack: Vec<SavedTransaction>,
    /// Root-pop policy.
    pub pop_root_policy: PopRootPolicy,
    /// Back dispatch participation.
    pub back_dispatch_enabled: bool,
    /// The container the router was bound to when saved.
    pub container: Option<ContainerId>,
    /// Router tag; child routers are matched by it on restore.
    pub tag: Option<String>,
}

type ControllerFactory = Box<dyn Fn(&Bundle) -> Box<dyn Controller>>;
type HandlerFactory = Box<dyn Fn(&Bundle) -> Box<dyn ChangeHandler>>;

/// Constructors for controllers and change handlers, keyed by type name.
///
/// The built-in handlers are registered by [`Registry::new`].
pub struct Registry {
    controllers: BTreeMap<String, ControllerFactory>,
    handlers: BTreeMap<String, HandlerFactory>,
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry knowing the built-in change handlers.
    pub fn new() -> Self {
        let mut registry = Self {
            controllers: BTreeMap::new(),
            handlers: BTreeMap::new(),
        };
        registry.register_handler(SimpleSwapChangeHandler::TYPE_NAME, |b| {
            Box::new(SimpleSwapChangeHandler::from_bundle(b))
        });
        registry.register_handler(DeferredChangeHandler::TYPE_NAME, |b| {
            Box::new(DeferredChangeHandler::from_bundle(b))
        });
        registry.register_handler(NoOpChangeHandler::TYPE_NAME, |_| Box::new(NoOpChangeHandler));
        registry
    }

    /// Register the constructor for controllers named `type_name`. It receives the saved args.
    pub fn register_controller(
        &mut self,
        type_name: impl Into<String>,
        ctor: impl Fn(&Bundle) -> Box<dyn Controller> + 'static,
    ) {
        self.controllers.insert(type_name.into(), Box::new(ctor));
    }

    /// Register the constructor for change handlers named `type_name`.
    pub fn register_handler(
        &mut self,
        type_name: impl Into<String>,
        ctor: impl Fn(&Bundle) -> Box<dyn ChangeHandler> + 'static,
    ) {
        self.handlers.insert(type_name.into(), Box::new(ctor));
    }

    fn controller(&self, saved: &SavedTransaction) -> Result<Box<dyn Controller>, NavigationError> {
        let ctor = self
            .controllers
            .get(&saved.controller_type)
            .ok_or_else(|| NavigationError::UnknownControllerType(saved.controller_type.clone()))?;
        Ok(ctor(&saved.args))
    }

    fn handler(
        &self,
        saved: Option<&SavedHandler>,
    ) -> Result<Option<Box<dyn ChangeHandler>>, NavigationError> {
        let Some(saved) = saved else {
            return Ok(None);
        };
        let ctor = self
            .handlers
            .get(&saved.handler_type)
            .ok_or_else(|| NavigationError::UnknownHandlerType(saved.handler_type.clone()))?;
        Ok(Some(ctor(&saved.state)))
    }

    /// Check that every type named in `saved` is registered.
    pub fn validate(&self, saved: &SavedRouter) -> Result<(), NavigationError> {
        for tx in &saved.backstack {
            if !self.controllers.contains_key(&tx.controller_type) {
                return Err(NavigationError::UnknownControllerType(
                    tx.controller_type.clone(),
                ));
            }
            for handler in [&tx.push_handler, &tx.pop_handler].into_iter().flatten() {
                if !self.handlers.contains_key(&handler.handler_type) {
                    return Err(NavigationError::UnknownHandlerType(
                        handler.handler_type.clone(),
                    ));
                }
            }
            for child in &tx.child_routers {
                self.validate(child)?;
            }
        }
        Ok(())
    }
}

fn save_handler(handler: Option<&dyn ChangeHandler>) -> Option<SavedHandler> {
    handler.map(|h| {
        let mut state = Bundle::new();
        h.save(&mut state);
        SavedHandler {
            handler_type: h.type_name().to_string(),
            state,
        }
    })
}

impl<S: Surface> Navigator<S> {
    /// Snapshot `router` and every router nested below it.
    ///
    /// Controllers with a live view have their view state captured fresh.
    pub fn save_router(&self, router: RouterId) -> Result<SavedRouter, NavigationError> {
        let slot = self.router(router)?;
        let mut backstack = Vec::with_capacity(slot.backstack.len());
        for tx in slot.backstack.iter_root_to_top() {
            backstack.push(self.save_transaction(tx)?);
        }
        Ok(SavedRouter {
            backstack,
            pop_root_policy: slot.pop_root_policy,
            back_dispatch_enabled: slot.back_dispatch_enabled,
            container: slot.container,
            tag: slot.tag.clone(),
        })
    }

    fn save_transaction(&self, tx: &RouterTransaction) -> Result<SavedTransaction, NavigationError> {
        let c = *tx.key();
        let slot = self
            .controllers
            .get(c)
            .ok_or(NavigationError::ControllerDestroyed(c))?;
        let view_state = match slot.view {
            Some(view) => {
                let mut out = Bundle::new();
                slot.controller.on_save_view_state(view, &mut out);
                self.notify(c, ListenerCaps::VIEW_STATE, |l| l.on_save_view_state(c, &mut out));
                Some(out)
            }
            None => slot.view_state.clone(),
        };
        let mut instance_state = Bundle::new();
        slot.controller.on_save_instance_state(&mut instance_state);
        self.notify(c, ListenerCaps::INSTANCE_STATE, |l| {
            l.on_save_instance_state(c, &mut instance_state);
        });
        let mut child_routers = Vec::new();
        for child in &slot.child_routers {
            child_routers.push(self.save_router(*child)?);
        }
        Ok(SavedTransaction {
            controller_type: slot.controller.type_name().to_string(),
            instance_id: slot.instance_id,
            args: slot.controller.args(),
            view_state,
            instance_state,
            push_handler: save_handler(tx.push_handler().map(|h| &**h)),
            pop_handler: save_handler(tx.pop_handler().map(|h| &**h)),
            transaction_index: tx.index(),
            tag: tx.tag().map(ToString::to_string),
            needs_attach: slot
                .flags
                .intersects(ControllerFlags::NEEDS_ATTACH | ControllerFlags::ATTACHED),
            retain_mode: slot.retain_mode,
            child_routers,
        })
    }

    /// Rebuild `router` from `saved`.
    ///
    /// Every type is checked against `registry` before anything changes. Controllers already in
    /// `router` are destroyed first.
    pub fn restore_router(
        &mut self,
        router: RouterId,
        saved: &SavedRouter,
        registry: &Registry,
    ) -> Result<(), NavigationError> {
        self.router(router)?;
        registry.validate(saved)?;
        if !self.router_controllers(router).is_empty() {
            self.destroy_router(router, false)?;
        }
        self.restore_into(router, saved, registry)?;
        debug!(?router, controllers = saved.backstack.len(), "router restored");
        self.rebind_router(router);
        self.flush_pending(router);
        self.collect_garbage();
        Ok(())
    }

    fn restore_into(
        &mut self,
        r: RouterId,
        saved: &SavedRouter,
        registry: &Registry,
    ) -> Result<(), NavigationError> {
        let mut entries = Vec::with_capacity(saved.backstack.len());
        for tx in &saved.backstack {
            let c = self.restore_controller(tx, registry)?;
            let mut entry = Transaction::new(c);
            if let Some(h) = registry.handler(tx.push_handler.as_ref())? {
                entry = entry.with_push_handler(h);
            }
            if let Some(h) = registry.handler(tx.pop_handler.as_ref())? {
                entry = entry.with_pop_handler(h);
            }
            if let Some(tag) = &tx.tag {
                entry = entry.with_tag(tag.clone());
            }
            if let Some(index) = tx.transaction_index {
                self.indexer.observe(index);
                entry = entry.with_index(index);
            }
            entry.mark_attached_to_router();
            entries.push(entry);
        }
        let slot = self
            .routers
            .get_mut(r)
            .ok_or(NavigationError::UnknownRouter(r))?;
        slot.pop_root_policy = saved.pop_root_policy;
        slot.back_dispatch_enabled = saved.back_dispatch_enabled;
        let keys: Vec<ControllerId> = entries.iter().map(|t| *t.key()).collect();
        if let Err(err) = slot.backstack.set_backstack(entries) {
            debug!(router = ?r, ?err, "restored backstack rejected");
            return Err(keys.first().copied().map_or(
                NavigationError::EmptyBackstack,
                NavigationError::DuplicateInBackstack,
            ));
        }
        for c in keys {
            self.bind_controller(c, r);
        }
        self.after_mutation(r);
        Ok(())
    }

    fn restore_controller(
        &mut self,
        saved: &SavedTransaction,
        registry: &Registry,
    ) -> Result<ControllerId, NavigationError> {
        let controller = registry.controller(saved)?;
        let mut slot = ControllerSlot::new(controller, saved.instance_id);
        self.next_instance = self.next_instance.max(saved.instance_id.0 + 1);
        slot.retain_mode = saved.retain_mode;
        slot.view_state = saved.view_state.clone();
        if slot.view_state.is_some() {
            slot.flags.insert(ControllerFlags::HAS_SAVED_VIEW_STATE);
        }
        if saved.needs_attach {
            slot.flags.insert(ControllerFlags::NEEDS_ATTACH);
        }
        slot.restored_instance_state = Some(saved.instance_state.clone());
        let c = self.insert_slot(slot);
        for child in &saved.child_routers {
            let mut router = RouterSlot::new(
                RouterHost::Controller(c),
                child.pop_root_policy,
                child.back_dispatch_enabled,
            );
            router.tag = child.tag.clone();
            let r = self.routers.insert(router);
            if let Some(parent) = self.controllers.get_mut(c) {
                parent.child_routers.push(r);
            }
            self.restore_into(r, child, registry)?;
        }
        Ok(c)
    }
}
