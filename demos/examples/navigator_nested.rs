// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nested routers and reconciliation.
//!
//! A tabbed screen hosts two child routers. Back presses reach the most recent child stack first.
//! The root stack is then rewritten with `set_backstack`, and the surface operations show which
//! views were touched.
//!
//! Run:
//! - `cargo run -p understory_demos --example navigator_nested`

use tracing_subscriber::EnvFilter;
use understory_navigator::{
    Controller, HeadlessSurface, Navigator, RouterTransaction, Surface, ViewContext, ViewId,
};

struct Screen(&'static str);

impl Controller for Screen {
    fn type_name(&self) -> &'static str {
        "screen"
    }

    fn on_attach(&mut self, view: ViewId) {
        println!("  {} on screen as {view:?}", self.0);
    }
}

/// A screen whose view hosts one child router per tab.
struct Tabs(&'static [&'static str]);

impl Controller for Tabs {
    fn type_name(&self) -> &'static str {
        "tabs"
    }

    fn create_view(&mut self, cx: &mut ViewContext<'_>) -> ViewId {
        let view = cx.create_view();
        for tab in self.0 {
            cx.child_container(view, *tab);
        }
        view
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut surface = HeadlessSurface::new();
    let container = surface.add_root_container(true);
    let mut nav = Navigator::new(surface);
    let root = nav.attach_router(container);

    let tabs = nav.insert_controller(Tabs(&["feed", "inbox"]));
    nav.push_controller(root, RouterTransaction::new(tabs).with_tag("tabs"))
        .unwrap();
    let children = nav.child_routers(tabs);
    let (feed, inbox) = (children[0], children[1]);

    for (router, names) in [(feed, ["feed", "post"]), (inbox, ["inbox", "thread"])] {
        for name in names {
            let c = nav.insert_controller(Screen(name));
            nav.push_controller(router, RouterTransaction::new(c)).unwrap();
        }
    }
    println!("== nested ==");
    println!("  feed:  {:?}", nav.backstack(feed));
    println!("  inbox: {:?}", nav.backstack(inbox));

    println!("== back goes to the most recent child stack ==");
    nav.handle_back();
    println!("  feed:  {:?}", nav.backstack(feed));
    println!("  inbox: {:?}", nav.backstack(inbox));

    println!("== reconcile the root stack ==");
    let settings = nav.insert_controller(Screen("settings"));
    let about = nav.insert_controller(Screen("about"));
    nav.surface_mut().take_ops();
    nav.set_backstack(
        root,
        vec![
            RouterTransaction::new(tabs).with_tag("tabs"),
            RouterTransaction::new(settings),
            RouterTransaction::new(about),
        ],
        None,
    )
    .unwrap();
    for op in nav.surface_mut().take_ops() {
        println!("  {op:?}");
    }
    println!("  root: {:?}", nav.backstack(root));
    println!("  tabs attached: {}", nav.is_attached(tabs));
    println!("  views in root container: {}", nav.surface().children(container).len());

    println!("== pop back to the tabs ==");
    nav.pop_to_tag(root, "tabs", None).unwrap();
    println!("  root: {:?}", nav.backstack(root));
    println!("  feed is rebound: {}", nav.router_container(feed).is_some());
}
