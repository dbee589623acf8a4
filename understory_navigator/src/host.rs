// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Platform action forwarding.
//!
//! Controllers cannot reach the platform directly. They ask the navigator to launch something or
//! to request permissions; the navigator forwards to the installed [`Host`], remembers which
//! controller instance asked, and routes the eventual result back by request code.

use alloc::boxed::Box;
use alloc::string::String;

use tracing::{debug, warn};

use crate::bundle::Bundle;
use crate::error::NavigationError;
use crate::navigator::Navigator;
use crate::surface::Surface;
use crate::types::{ControllerFlags, ControllerId, InstanceId};

/// The platform side of action forwarding.
pub trait Host {
    /// Start an external action whose result comes back through
    /// [`Navigator::on_activity_result`].
    fn launch(&mut self, instance: InstanceId, request_code: i32, request: &Bundle);

    /// Ask for `permissions`; the answer comes back through
    /// [`Navigator::on_request_permissions_result`].
    fn request_permissions(&mut self, instance: InstanceId, request_code: i32, permissions: &[String]);
}

impl<S: Surface> Navigator<S> {
    /// Install the host that receives forwarded actions, returning the previous one.
    pub fn set_host(&mut self, host: Box<dyn Host>) -> Option<Box<dyn Host>> {
        self.host.replace(host)
    }

    /// Remove the installed host.
    pub fn take_host(&mut self) -> Option<Box<dyn Host>> {
        self.host.take()
    }

    fn requester(&self, c: ControllerId) -> Result<InstanceId, NavigationError> {
        let slot = self
            .controllers
            .get(c)
            .filter(|s| !s.is_gone())
            .ok_or(NavigationError::ControllerDestroyed(c))?;
        if self.host.is_none() {
            return Err(NavigationError::NoHost);
        }
        Ok(slot.instance_id)
    }

    /// Forward a launch on behalf of `controller`.
    ///
    /// The result is delivered to the controller with the same instance id, so it survives a
    /// save and restore in between.
    pub fn launch_for_result(
        &mut self,
        controller: ControllerId,
        request_code: i32,
        request: &Bundle,
    ) -> Result<(), NavigationError> {
        let instance = self.requester(controller)?;
        self.result_requests.insert(request_code, instance);
        debug!(?controller, request_code, "launch for result");
        if let Some(host) = self.host.as_mut() {
            host.launch(instance, request_code, request);
        }
        Ok(())
    }

    /// Forward a permission request on behalf of `controller`.
    pub fn request_permissions(
        &mut self,
        controller: ControllerId,
        request_code: i32,
        permissions: &[String],
    ) -> Result<(), NavigationError> {
        let instance = self.requester(controller)?;
        self.permission_requests.insert(request_code, instance);
        debug!(?controller, request_code, count = permissions.len(), "request permissions");
        if let Some(host) = self.host.as_mut() {
            host.request_permissions(instance, request_code, permissions);
        }
        Ok(())
    }

    /// Drop the outstanding requests of a destroyed controller.
    pub(crate) fn forget_requests(&mut self, c: ControllerId) {
        let Some(instance) = self.controllers.get(c).map(|s| s.instance_id) else {
            return;
        };
        self.result_requests.retain(|_, i| *i != instance);
        self.permission_requests.retain(|_, i| *i != instance);
    }

    fn live_instance(&self, instance: InstanceId) -> Option<ControllerId> {
        self.find_controller_by_instance_id(instance)
            .filter(|&c| !self.flags(c).contains(ControllerFlags::BEING_DESTROYED))
    }

    /// Route an activity result to the controller that launched `request_code`.
    ///
    /// Returns `false` if nobody is waiting for it.
    pub fn on_activity_result(
        &mut self,
        request_code: i32,
        result_code: i32,
        data: Option<&Bundle>,
    ) -> bool {
        let Some(instance) = self.result_requests.remove(&request_code) else {
            return false;
        };
        let Some(c) = self.live_instance(instance) else {
            warn!(request_code, ?instance, "activity result for a controller that is gone");
            return false;
        };
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.controller
                .on_activity_result(request_code, result_code, data);
        }
        true
    }

    /// Route a permission result to the controller that requested `request_code`.
    pub fn on_request_permissions_result(
        &mut self,
        request_code: i32,
        permissions: &[String],
        granted: &[bool],
    ) -> bool {
        let Some(instance) = self.permission_requests.remove(&request_code) else {
            return false;
        };
        let Some(c) = self.live_instance(instance) else {
            warn!(request_code, ?instance, "permission result for a controller that is gone");
            return false;
        };
        if let Some(slot) = self.controllers.get_mut(c) {
            slot.controller
                .on_request_permissions_result(request_code, permissions, granted);
        }
        true
    }
}
