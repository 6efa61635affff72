//! Nested metric snapshots produced by collectors.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// Numeric sample value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    /// Round a float to two decimals, the precision used for sizes and ratios.
    pub fn float_2dp(value: f64) -> Self {
        MetricValue::Float((value * 100.0).round() / 100.0)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Int(v) => v as f64,
            MetricValue::Float(v) => v,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) if v.is_nan() => f.write_str("NaN"),
            MetricValue::Float(v) if v.is_infinite() && v.is_sign_positive() => f.write_str("+Inf"),
            MetricValue::Float(v) if v.is_infinite() => f.write_str("-Inf"),
            MetricValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

/// One collector's snapshot: numeric leaves under string-keyed nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricTree {
    Value(MetricValue),
    /// A field the backend did not report; never published.
    Missing,
    Node(BTreeMap<String, MetricTree>),
}

/// A publishable leaf together with the keys leading to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricLeaf {
    pub path: Vec<String>,
    pub value: MetricValue,
}

impl MetricTree {
    /// Empty interior node.
    pub fn node() -> Self {
        MetricTree::Node(BTreeMap::new())
    }

    /// Insert `value` under `key`. A non-node tree is first turned into an
    /// empty node.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetricTree>) {
        if !matches!(self, MetricTree::Node(_)) {
            *self = MetricTree::node();
        }
        if let MetricTree::Node(children) = self {
            children.insert(key.into(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetricTree> {
        match self {
            MetricTree::Node(children) => children.get(key),
            _ => None,
        }
    }

    /// Follow a key path from this tree.
    pub fn lookup(&self, path: &[&str]) -> Option<&MetricTree> {
        path.iter().try_fold(self, |tree, key| tree.get(key))
    }

    /// Merge `other` into `self`, recursing where both sides are nodes and
    /// letting `other` win everywhere else.
    pub fn merge(&mut self, other: MetricTree) {
        match (self, other) {
            (MetricTree::Node(ours), MetricTree::Node(theirs)) => {
                for (key, value) in theirs {
                    match ours.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            ours.insert(key, value);
                        }
                    }
                }
            }
            (slot, other) => *slot = other,
        }
    }

    /// True for an empty node or a missing leaf.
    pub fn is_empty(&self) -> bool {
        match self {
            MetricTree::Value(_) => false,
            MetricTree::Missing => true,
            MetricTree::Node(children) => children.is_empty(),
        }
    }

    /// Every present leaf, depth first in key order.
    pub fn leaves(&self) -> Vec<MetricLeaf> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        collect_leaves(self, &mut path, &mut out);
        out
    }
}

fn collect_leaves(tree: &MetricTree, path: &mut Vec<String>, out: &mut Vec<MetricLeaf>) {
    match tree {
        MetricTree::Value(value) => out.push(MetricLeaf {
            path: path.clone(),
            value: *value,
        }),
        MetricTree::Missing => {}
        MetricTree::Node(children) => {
            for (key, child) in children {
                path.push(key.clone());
                collect_leaves(child, path, out);
                path.pop();
            }
        }
    }
}

impl Default for MetricTree {
    fn default() -> Self {
        MetricTree::node()
    }
}

impl From<MetricValue> for MetricTree {
    fn from(value: MetricValue) -> Self {
        MetricTree::Value(value)
    }
}

impl From<i64> for MetricTree {
    fn from(value: i64) -> Self {
        MetricTree::Value(MetricValue::Int(value))
    }
}

impl From<f64> for MetricTree {
    fn from(value: f64) -> Self {
        MetricTree::Value(MetricValue::Float(value))
    }
}

impl<T: Into<MetricTree>> From<Option<T>> for MetricTree {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(MetricTree::Missing)
    }
}

impl From<&JsonValue> for MetricTree {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null | JsonValue::Array(_) => MetricTree::Missing,
            JsonValue::Bool(flag) => MetricTree::from(i64::from(*flag)),
            JsonValue::Number(number) => match number.as_i64() {
                Some(int) => MetricTree::from(int),
                None => MetricTree::from(number.as_f64()),
            },
            JsonValue::String(raw) => {
                let raw = raw.trim();
                if let Ok(int) = raw.parse::<i64>() {
                    MetricTree::from(int)
                } else if let Ok(float) = raw.parse::<f64>() {
                    MetricTree::from(float)
                } else {
                    MetricTree::Missing
                }
            }
            JsonValue::Object(map) => MetricTree::Node(
                map.iter()
                    .map(|(key, value)| (key.clone(), MetricTree::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<JsonValue> for MetricTree {
    fn from(value: JsonValue) -> Self {
        MetricTree::from(&value)
    }
}
