// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logical saved-state values.
//!
//! A [`Bundle`] is an ordered string-keyed map of [`StateValue`]s. It is the unit controllers
//! write their arguments, instance state, and view state into. It derives `serde` traits so hosts
//! can pick any wire format; the navigator itself never encodes bytes.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

/// A single saved-state value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered list.
    List(Vec<StateValue>),
    /// Nested bundle.
    Bundle(Bundle),
}

/// Ordered, string-keyed saved state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    entries: BTreeMap<String, StateValue>,
}

impl Bundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, returning the previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Option<StateValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder form of [`put`](Self::put).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.put(key, value);
        self
    }

    /// The value under `key`.
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.entries.get(key)
    }

    /// Remove the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<StateValue> {
        self.entries.remove(key)
    }

    /// The boolean under `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer under `key`.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            StateValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The string under `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            StateValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The nested bundle under `key`.
    pub fn get_bundle(&self, key: &str) -> Option<&Self> {
        match self.get(key)? {
            StateValue::Bundle(b) => Some(b),
            _ => None,
        }
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for StateValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::Str(String::from(v))
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for StateValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Bundle> for StateValue {
    fn from(v: Bundle) -> Self {
        Self::Bundle(v)
    }
}
