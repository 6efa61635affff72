//! Bibliographic identifiers and the deduplicated sets built from them.

use std::collections::HashSet;
use std::collections::hash_set;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exemption::Exemptions;

/// Opaque bibliographic identifier (e.g. `2020ApJ...900..100A`).
///
/// The conventional fixed-width layout (year, journal, volume, page, initial)
/// is never parsed; only equality and hashing matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bibcode(String);

impl Bibcode {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Bibcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Bibcode {
    fn from(value: &str) -> Self {
        Bibcode::new(value)
    }
}

impl From<String> for Bibcode {
    fn from(value: String) -> Self {
        Bibcode::new(value)
    }
}

impl AsRef<str> for Bibcode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deduplicated identifiers sourced from a single backend.
///
/// Iteration order follows the underlying hash set and is not stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet {
    inner: HashSet<Bibcode>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from raw strings, dropping blank entries.
    pub fn from_strs<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        items.into_iter().map(Bibcode::new).collect()
    }

    pub fn insert(&mut self, bibcode: Bibcode) -> bool {
        if bibcode.is_blank() {
            return false;
        }
        self.inner.insert(bibcode)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, bibcode: &Bibcode) -> bool {
        self.inner.contains(bibcode)
    }

    pub fn iter(&self) -> hash_set::Iter<'_, Bibcode> {
        self.inner.iter()
    }

    /// Identifiers present in `self` but not in `other`.
    ///
    /// Linear in `self.len()`: each membership probe into `other` is a hash
    /// lookup.
    pub fn difference(&self, other: &IdentifierSet) -> IdentifierSet {
        let inner = self
            .inner
            .iter()
            .filter(|bibcode| !other.inner.contains(*bibcode))
            .cloned()
            .collect();
        IdentifierSet { inner }
    }

    /// Drop every identifier matched by `exemptions`.
    pub fn retain_not(&mut self, exemptions: &Exemptions) {
        self.inner.retain(|bibcode| !exemptions.is_exempt(bibcode));
    }

    /// Identifiers in ascending order, for stable rendering.
    pub fn sorted(&self) -> Vec<&Bibcode> {
        let mut items: Vec<&Bibcode> = self.inner.iter().collect();
        items.sort_unstable();
        items
    }
}

impl FromIterator<Bibcode> for IdentifierSet {
    fn from_iter<T: IntoIterator<Item = Bibcode>>(iter: T) -> Self {
        let mut set = IdentifierSet::new();
        for bibcode in iter {
            set.insert(bibcode);
        }
        set
    }
}

impl Extend<Bibcode> for IdentifierSet {
    fn extend<T: IntoIterator<Item = Bibcode>>(&mut self, iter: T) {
        for bibcode in iter {
            self.insert(bibcode);
        }
    }
}

impl IntoIterator for IdentifierSet {
    type Item = Bibcode;
    type IntoIter = hash_set::IntoIter<Bibcode>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a> IntoIterator for &'a IdentifierSet {
    type Item = &'a Bibcode;
    type IntoIter = hash_set::Iter<'a, Bibcode>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
