// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static labels attached to every entry a sink produces.
//!
//! Loki indexes streams by their label set, so a sink normally has exactly one
//! set that is shared (behind an `Arc`) by all of its entries.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar label value.
///
/// Values keep their configured type so that configuration round-trips, and
/// are rendered to strings only when placed on a Loki stream.
#[derive(Debug, Clone, PartialEq, Display, From, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    #[display("{_0}")]
    Str(String),
    #[display("{_0}")]
    Bool(bool),
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Float(f64),
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Str(value.to_string())
    }
}

impl LabelValue {
    /// Interprets a bare configuration token: integers, floats and booleans
    /// become typed values, anything else stays a string.
    #[must_use]
    pub fn from_scalar(token: &str) -> Self {
        if let Ok(int) = token.parse::<i64>() {
            return LabelValue::Int(int);
        }
        if let Ok(float) = token.parse::<f64>() {
            if float.is_finite() {
                return LabelValue::Float(float);
            }
        }
        match token {
            "true" => LabelValue::Bool(true),
            "false" => LabelValue::Bool(false),
            _ => LabelValue::Str(token.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LabelValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Single-byte tag identifying the variant in canonical encodings.
    pub(crate) fn type_tag(&self) -> u8 {
        match self {
            LabelValue::Str(_) => b's',
            LabelValue::Bool(_) => b'b',
            LabelValue::Int(_) => b'i',
            LabelValue::Float(_) => b'f',
        }
    }
}

/// Ordered mapping from label name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, LabelValue>);

impl LabelSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<LabelValue>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LabelValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LabelValue)> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut LabelValue)> {
        self.0.iter_mut()
    }

    /// String-valued view used as a Loki stream selector.
    #[must_use]
    pub fn to_stream(&self) -> BTreeMap<&str, String> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_string()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<LabelValue>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        LabelSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
