// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Save and restore.
//!
//! Snapshot a router to JSON, then rebuild it in a fresh navigator through a registry of
//! controller constructors. Instance state and transaction order survive the trip.
//!
//! Run:
//! - `cargo run -p understory_demos --example navigator_save_restore`

use tracing_subscriber::EnvFilter;
use understory_navigator::{
    Bundle, Controller, DeferredChangeHandler, HeadlessSurface, Navigator, Registry,
    RouterTransaction, SavedRouter,
};

/// A page that remembers how far it was read.
struct Page {
    title: String,
    read: i64,
}

impl Page {
    const TYPE_NAME: &'static str = "page";

    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            read: 0,
        }
    }
}

impl Controller for Page {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn args(&self) -> Bundle {
        Bundle::new().with("title", self.title.as_str())
    }

    fn on_save_instance_state(&self, out: &mut Bundle) {
        out.put("read", self.read);
    }

    fn on_restore_instance_state(&mut self, saved: &Bundle) {
        self.read = saved.get_int("read").unwrap_or(0);
        println!("  {} restored at {}%", self.title, self.read);
    }
}

fn navigator() -> Navigator {
    let mut surface = HeadlessSurface::new();
    let container = surface.add_root_container(true);
    let mut nav = Navigator::new(surface);
    nav.attach_router(container);
    nav
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut nav = navigator();
    let router = nav.root_routers()[0];
    for (title, read) in [("contents", 100), ("chapter 1", 40)] {
        let mut page = Page::new(title);
        page.read = read;
        let c = nav.insert_controller(page);
        nav.push_controller(
            router,
            RouterTransaction::new(c)
                .with_tag(title)
                .with_pop_handler(Box::new(DeferredChangeHandler::new(250, true))),
        )
        .unwrap();
    }

    let saved = nav.save_router(router).unwrap();
    let json = serde_json::to_string_pretty(&saved).unwrap();
    println!("== saved ({} bytes) ==", json.len());

    let mut registry = Registry::new();
    registry.register_controller(Page::TYPE_NAME, |args| {
        Box::new(Page::new(args.get_str("title").unwrap_or("untitled")))
    });

    println!("== restored ==");
    let saved: SavedRouter = serde_json::from_str(&json).unwrap();
    let mut restored = navigator();
    let router = restored.root_routers()[0];
    restored.restore_router(router, &saved, &registry).unwrap();
    let top = restored.controller_with_tag(router, "chapter 1").unwrap();
    println!("  backstack: {:?}", restored.backstack(router));
    println!("  top attached: {}", restored.is_attached(top));

    println!("== deferred pop ==");
    restored.pop_current_controller(router).unwrap();
    for change in restored.in_flight_changes() {
        println!("  completing {change:?}");
        restored.complete_change(change);
    }
    println!("  backstack: {:?}", restored.backstack(router));
}
