// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_backstack::{Backstack, Opacity, Transaction, TransactionIndexer, visible_transactions};
use understory_navigator::{
    Controller, ControllerId, HeadlessSurface, Navigator, RouterId, RouterTransaction,
    SimpleSwapChangeHandler,
};

#[derive(Clone, Debug)]
struct Layer(bool);

impl Opacity for Layer {
    fn is_opaque(&self) -> bool {
        self.0
    }
}

struct Screen;

impl Controller for Screen {
    fn type_name(&self) -> &'static str {
        "screen"
    }
}

fn overlay(c: ControllerId) -> RouterTransaction {
    RouterTransaction::new(c).with_push_handler(Box::new(SimpleSwapChangeHandler::new(false)))
}

/// A navigator whose router holds `n` controllers; every `overlay_every`-th push is an overlay.
fn stacked(n: usize, overlay_every: usize) -> (Navigator, RouterId, Vec<ControllerId>) {
    let mut surface = HeadlessSurface::new();
    let container = surface.add_root_container(true);
    let mut nav = Navigator::new(surface);
    let router = nav.attach_router(container);
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let c = nav.insert_controller(Screen);
        let tx = if overlay_every > 0 && i % overlay_every == 0 && i > 0 {
            overlay(c)
        } else {
            RouterTransaction::new(c)
        };
        nav.push_controller(router, tx).unwrap();
        ids.push(c);
    }
    (nav, router, ids)
}

fn bench_backstack(c: &mut Criterion) {
    let mut group = c.benchmark_group("backstack");
    for &n in &[16usize, 128, 1024] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("push_visible_n{}", n), |b| {
            b.iter_batched(
                || (Backstack::<u32, Layer>::new(), TransactionIndexer::new()),
                |(mut stack, mut indexer)| {
                    for i in 0..n as u32 {
                        let mut tx = Transaction::new(i).with_push_handler(Layer(i % 4 == 0));
                        tx.ensure_index(&mut indexer);
                        stack.push(tx).unwrap();
                    }
                    black_box(visible_transactions(stack.iter()).len());
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("reverse_reindex_n{}", n), |b| {
            b.iter_batched(
                || {
                    let mut indexer = TransactionIndexer::new();
                    let mut stack = Backstack::<u32, Layer>::new();
                    for i in 0..n as u32 {
                        let mut tx = Transaction::new(i);
                        tx.ensure_index(&mut indexer);
                        stack.push(tx).unwrap();
                    }
                    (stack, indexer)
                },
                |(mut stack, mut indexer)| {
                    let reversed: Vec<_> = stack.iter().cloned().collect();
                    let _ = stack.set_backstack(reversed);
                    stack.reindex(&mut indexer);
                    black_box(stack.revision());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("navigator");
    for &n in &[16usize, 64, 256] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("push_then_pop_n{}", n), |b| {
            b.iter_batched(
                || stacked(0, 0),
                |(mut nav, router, _)| {
                    for _ in 0..n {
                        let c = nav.insert_controller(Screen);
                        nav.push_controller(router, RouterTransaction::new(c)).unwrap();
                    }
                    while nav.backstack_len(router) > 0 {
                        nav.pop_current_controller(router).unwrap();
                    }
                    black_box(nav.controller_count());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_set_backstack(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_backstack");
    for &n in &[16usize, 64, 256] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("reverse_n{}", n), |b| {
            b.iter_batched(
                || stacked(n, 3),
                |(mut nav, router, ids)| {
                    let entries: Vec<_> = ids.iter().rev().map(|&c| RouterTransaction::new(c)).collect();
                    nav.set_backstack(router, entries, None).unwrap();
                    black_box(nav.visible_controllers(router).len());
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("replace_half_n{}", n), |b| {
            b.iter_batched(
                || stacked(n, 0),
                |(mut nav, router, ids)| {
                    let mut entries: Vec<_> =
                        ids[..n / 2].iter().map(|&c| RouterTransaction::new(c)).collect();
                    for _ in 0..n / 2 {
                        entries.push(RouterTransaction::new(nav.insert_controller(Screen)));
                    }
                    nav.set_backstack(router, entries, None).unwrap();
                    black_box(nav.controller_count());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_backstack, bench_push_pop, bench_set_backstack);
criterion_main!(benches);
