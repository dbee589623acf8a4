// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording controllers and a ready-made navigator for unit tests.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::bundle::Bundle;
use crate::controller::{Controller, ViewContext};
use crate::navigator::Navigator;
use crate::surface::HeadlessSurface;
use crate::types::{ChangeKind, ContainerId, ControllerId, HostEvent, RouterId, ViewId};

pub(crate) type Log = Rc<RefCell<Vec<String>>>;

/// Entries logged by the controller named `name`, in order.
pub(crate) fn entries(log: &Log, name: &str) -> Vec<String> {
    let prefix = format!("{name}:");
    log.borrow()
        .iter()
        .filter(|e| e.starts_with(&prefix))
        .cloned()
        .collect()
}

/// Logs every hook as `"<name>:<hook>"`.
pub(crate) struct Recorder {
    pub(crate) name: String,
    pub(crate) log: Log,
    /// Tags of the child routers hosted by each created view.
    pub(crate) tags: Vec<String>,
    pub(crate) scroll: Rc<Cell<i64>>,
}

impl Recorder {
    pub(crate) const TYPE_NAME: &'static str = "recorder";

    pub(crate) fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            tags: Vec::new(),
            scroll: Rc::new(Cell::new(0)),
        }
    }

    /// Rebuild from [`Controller::args`].
    pub(crate) fn from_args(args: &Bundle, log: &Log) -> Self {
        let mut recorder = Self::new(args.get_str("name").unwrap_or("?"), log);
        if let Some(tags) = args.get_bundle("tags") {
            recorder.tags = tags.iter().map(|(k, _)| k.to_string()).collect();
        }
        recorder
    }

    fn record(&self, entry: &str) {
        self.log.borrow_mut().push(format!("{}:{entry}", self.name));
    }
}

impl Controller for Recorder {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn args(&self) -> Bundle {
        let mut tags = Bundle::new();
        for tag in &self.tags {
            tags.put(tag.clone(), true);
        }
        Bundle::new().with("name", self.name.as_str()).with("tags", tags)
    }

    fn create_view(&mut self, cx: &mut ViewContext<'_>) -> ViewId {
        self.record("create_view");
        let view = cx.create_view();
        for tag in &self.tags {
            cx.child_container(view, tag.clone());
        }
        view
    }

    fn on_context_available(&mut self) {
        self.record("context_available");
    }

    fn on_context_unavailable(&mut self) {
        self.record("context_unavailable");
    }

    fn on_attach(&mut self, _: ViewId) {
        self.record("attach");
    }

    fn on_detach(&mut self, _: ViewId) {
        self.record("detach");
    }

    fn on_destroy_view(&mut self, _: ViewId) {
        self.record("destroy_view");
    }

    fn on_destroy(&mut self) {
        self.record("destroy");
    }

    fn on_change_started(&mut self, kind: ChangeKind) {
        self.record(&format!("change_started {kind:?}"));
    }

    fn on_change_ended(&mut self, kind: ChangeKind) {
        self.record(&format!("change_ended {kind:?}"));
    }

    fn on_save_instance_state(&self, out: &mut Bundle) {
        out.put("scroll", self.scroll.get());
    }

    fn on_restore_instance_state(&mut self, saved: &Bundle) {
        let scroll = saved.get_int("scroll").unwrap_or(0);
        self.scroll.set(scroll);
        self.record(&format!("restore_instance_state {scroll}"));
    }

    fn on_save_view_state(&self, _: ViewId, out: &mut Bundle) {
        out.put("scroll", self.scroll.get());
    }

    fn on_restore_view_state(&mut self, _: ViewId, saved: &Bundle) {
        let scroll = saved.get_int("scroll").unwrap_or(0);
        self.scroll.set(scroll);
        self.record(&format!("restore_view_state {scroll}"));
    }

    fn on_host_event(&mut self, event: HostEvent) {
        self.record(&format!("host_event {event:?}"));
    }
}

/// A navigator over a headless surface with one root router.
pub(crate) struct Fixture {
    pub(crate) nav: Navigator,
    pub(crate) router: RouterId,
    pub(crate) container: ContainerId,
    pub(crate) log: Log,
    scrolls: BTreeMap<ControllerId, Rc<Cell<i64>>>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_container_attached(true)
    }

    pub(crate) fn with_container_attached(attached: bool) -> Self {
        let mut surface = HeadlessSurface::new();
        let container = surface.add_root_container(attached);
        let mut nav = Navigator::new(surface);
        let router = nav.attach_router(container);
        Self {
            nav,
            router,
            container,
            log: Log::default(),
            scrolls: BTreeMap::new(),
        }
    }

    /// Insert a recording controller.
    pub(crate) fn controller(&mut self, name: &str) -> ControllerId {
        self.insert(Recorder::new(name, &self.log))
    }

    /// Insert a recording controller whose view hosts one child router per tag.
    pub(crate) fn parent(&mut self, name: &str, tags: &[&str]) -> ControllerId {
        let mut recorder = Recorder::new(name, &self.log);
        recorder.tags = tags.iter().map(|t| t.to_string()).collect();
        self.insert(recorder)
    }

    pub(crate) fn insert(&mut self, recorder: Recorder) -> ControllerId {
        let scroll = recorder.scroll.clone();
        let id = self.nav.insert_boxed_controller(Box::new(recorder));
        self.scrolls.insert(id, scroll);
        id
    }

    /// Set the scroll position `c` saves into its view and instance state.
    pub(crate) fn scroll(&self, c: ControllerId, value: i64) {
        if let Some(scroll) = self.scrolls.get(&c) {
            scroll.set(value);
        }
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.log.borrow().iter().filter(|e| *e == entry).count()
    }

    /// Position of the first occurrence of `entry`.
    ///
    /// Panics if it was never logged.
    pub(crate) fn index(&self, entry: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{entry:?} not logged in {:?}", self.log.borrow()))
    }
}
