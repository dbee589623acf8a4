// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Navigator basics.
//!
//! Push an opaque screen, an overlay on top of it, then walk back with back presses while a
//! lifecycle listener prints what each controller goes through.
//!
//! Run:
//! - `cargo run -p understory_demos --example navigator_basics`
//! - `RUST_LOG=debug cargo run -p understory_demos --example navigator_basics` for navigator logs

use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use understory_navigator::{
    ChangeKind, Controller, ControllerId, HeadlessSurface, LifecycleListener, ListenerCaps,
    Navigator, RouterTransaction, SimpleSwapChangeHandler, Surface, ViewId,
};

struct Screen(&'static str);

impl Controller for Screen {
    fn type_name(&self) -> &'static str {
        "screen"
    }

    fn on_destroy_view(&mut self, view: ViewId) {
        println!("  {} released {view:?}", self.0);
    }
}

struct Printer(&'static str);

impl LifecycleListener for Printer {
    fn post_attach(&self, _: ControllerId, view: ViewId) {
        println!("  {} attached as {view:?}", self.0);
    }
    fn post_detach(&self, _: ControllerId, _: ViewId) {
        println!("  {} detached", self.0);
    }
    fn post_destroy(&self, _: ControllerId) {
        println!("  {} destroyed", self.0);
    }
    fn on_change_start(&self, _: ControllerId, kind: ChangeKind) {
        println!("  {} {kind:?}", self.0);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut surface = HeadlessSurface::new();
    let container = surface.add_root_container(true);
    let mut nav = Navigator::new(surface);
    let router = nav.attach_router(container);

    let add = |nav: &mut Navigator, name: &'static str| {
        let c = nav.insert_controller(Screen(name));
        let caps = ListenerCaps::ATTACH
            | ListenerCaps::DETACH
            | ListenerCaps::DESTROY
            | ListenerCaps::CHANGE;
        nav.add_lifecycle_listener(c, caps, Rc::new(Printer(name)))
            .unwrap();
        c
    };
    let home = add(&mut nav, "home");
    let list = add(&mut nav, "list");
    let dialog = add(&mut nav, "dialog");

    println!("== push home, list ==");
    nav.push_controller(router, RouterTransaction::new(home)).unwrap();
    nav.push_controller(router, RouterTransaction::new(list)).unwrap();

    println!("== push dialog as an overlay ==");
    nav.push_controller(
        router,
        RouterTransaction::new(dialog)
            .with_push_handler(Box::new(SimpleSwapChangeHandler::new(false))),
    )
    .unwrap();
    println!(
        "  visible: {:?}, views in container: {}",
        nav.visible_controllers(router),
        nav.surface().children(container).len()
    );

    println!("== back, back ==");
    while nav.backstack_len(router) > 1 && nav.handle_back() {}
    println!("  backstack: {:?}", nav.backstack(router));
    println!("  home attached: {}", nav.is_attached(home));
    println!("  surface ops: {}", nav.surface().ops().len());
}
