//! Bibcode reconciliation against the canonical list.
//!
//! Pure set algebra: given the canonical identifier set and one set per
//! comparison target, compute which identifiers are missing from each target
//! and which are present but unexpected. An empty canonical set short-circuits
//! the whole comparison and an empty target set is skipped, so a failed fetch
//! upstream never shows up as a mass deletion.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::bibcode::IdentifierSet;
use crate::exemption::Exemptions;
use crate::metrics::{MetricTree, MetricValue};

/// Backends whose identifier sets are compared with the canonical list.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TargetName {
    /// Master pipeline `records` table.
    Database,
    /// Solr collection.
    SearchIndex,
}

impl TargetName {
    /// Short name used in summary and batch keys.
    pub fn slug(self) -> &'static str {
        match self {
            TargetName::Database => "db",
            TargetName::SearchIndex => "solr",
        }
    }

    pub fn extra_key(self) -> String {
        format!("extra_in_{}", self.slug())
    }

    pub fn missing_key(self) -> String {
        format!("missing_in_{}", self.slug())
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Timestamp-derived name shared by every batch entry of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunPrefix(String);

impl RunPrefix {
    const FORMAT: &'static str = "%Y%m%d_%H%M";

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// `YYYYMMDD_HHMM` in UTC.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(Self::FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.0, suffix)
    }
}

impl fmt::Display for RunPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named discrepancy counts (`extra_in_<target>`, `missing_in_<target>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    counts: BTreeMap<String, u64>,
}

impl Summary {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.counts.iter()
    }

    /// Flat metric tree, one integer leaf per count.
    pub fn to_metric_tree(&self) -> MetricTree {
        let mut tree = MetricTree::node();
        for (key, count) in &self.counts {
            let value = i64::try_from(*count).unwrap_or(i64::MAX);
            tree.insert(key.clone(), MetricValue::Int(value));
        }
        tree
    }

    fn record(&mut self, key: String, count: usize) {
        self.counts.insert(key, count as u64);
    }
}

/// Discrepancy sets keyed by report name, ready for archival.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: BTreeMap<String, IdentifierSet>,
}

impl Batch {
    pub fn get(&self, key: &str) -> Option<&IdentifierSet> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, IdentifierSet> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, set: IdentifierSet) {
        self.entries.insert(key.into(), set);
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = (&'a String, &'a IdentifierSet);
    type IntoIter = btree_map::Iter<'a, String, IdentifierSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Reconcile `targets` against `canonical` using a prefix taken from the
/// current time.
pub fn reconcile<'a, I>(
    canonical: &IdentifierSet,
    targets: I,
    exemptions: &Exemptions,
) -> (Summary, Batch)
where
    I: IntoIterator<Item = (TargetName, &'a IdentifierSet)>,
{
    reconcile_with_prefix(canonical, targets, exemptions, &RunPrefix::now())
}

/// Reconcile `targets` against `canonical`, naming batch entries with `prefix`.
///
/// - empty `canonical`: nothing is compared, both results are empty.
/// - empty target: that target is absent from both results.
/// - `extra` is filtered through `exemptions`; `missing` never is.
pub fn reconcile_with_prefix<'a, I>(
    canonical: &IdentifierSet,
    targets: I,
    exemptions: &Exemptions,
    prefix: &RunPrefix,
) -> (Summary, Batch)
where
    I: IntoIterator<Item = (TargetName, &'a IdentifierSet)>,
{
    let mut summary = Summary::default();
    let mut batch = Batch::default();

    if canonical.is_empty() {
        return (summary, batch);
    }

    for (target, set) in targets {
        if set.is_empty() {
            continue;
        }

        let mut extra = set.difference(canonical);
        extra.retain_not(exemptions);
        let missing = canonical.difference(set);

        let extra_key = target.extra_key();
        let missing_key = target.missing_key();
        summary.record(extra_key.clone(), extra.len());
        summary.record(missing_key.clone(), missing.len());
        batch.insert(prefix.key(&extra_key), extra);
        batch.insert(prefix.key(&missing_key), missing);
    }

    (summary, batch)
}
