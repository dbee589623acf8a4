// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational slot storage backing controller and router handles.

use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::types::{ControllerId, RouterId};

pub(crate) trait SlotKey: Copy {
    fn from_parts(idx: u32, generation: u32) -> Self;
    fn idx(self) -> usize;
    fn generation(self) -> u32;
}

impl SlotKey for ControllerId {
    fn from_parts(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    fn idx(self) -> usize {
        self.0 as usize
    }

    fn generation(self) -> u32 {
        self.1
    }
}

impl SlotKey for RouterId {
    fn from_parts(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    fn idx(self) -> usize {
        self.0 as usize
    }

    fn generation(self) -> u32 {
        self.1
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Handles use 32-bit slot indices."
)]
fn key_at<K: SlotKey>(idx: usize, generation: u32) -> K {
    K::from_parts(idx as u32, generation)
}

/// Slab of `T` addressed by generational keys.
pub(crate) struct Slots<K, T> {
    entries: Vec<Option<T>>,
    generations: Vec<u32>, // last generation per slot (persists across frees)
    free_list: Vec<usize>,
    _key: PhantomData<K>,
}

impl<K, T> Default for Slots<K, T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            _key: PhantomData,
        }
    }
}

impl<K: SlotKey, T> Slots<K, T> {
    pub(crate) fn insert(&mut self, value: T) -> K {
        if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.entries[idx] = Some(value);
            key_at(idx, generation)
        } else {
            self.entries.push(Some(value));
            self.generations.push(1);
            key_at(self.entries.len() - 1, 1)
        }
    }

    pub(crate) fn remove(&mut self, key: K) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        let value = self.entries[key.idx()].take();
        self.free_list.push(key.idx());
        value
    }

    pub(crate) fn contains(&self, key: K) -> bool {
        self.generations.get(key.idx()) == Some(&key.generation())
            && self.entries.get(key.idx()).is_some_and(Option::is_some)
    }

    pub(crate) fn get(&self, key: K) -> Option<&T> {
        if !self.contains(key) {
            return None;
        }
        self.entries[key.idx()].as_ref()
    }

    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut T> {
        if !self.contains(key) {
            return None;
        }
        self.entries[key.idx()].as_mut()
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(idx, _)| key_at(idx, self.generations[idx]))
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| e.as_ref().map(|v| (key_at(idx, self.generations[idx]), v)))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len() - self.free_list.len()
    }
}
