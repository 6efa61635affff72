//! Rules that excuse identifiers from "extra" discrepancy counts.

use serde::{Deserialize, Serialize};

use crate::bibcode::Bibcode;

/// Marker used by records deposited through Zenodo, which never appear in the
/// canonical list.
pub const ZENODO_MARKER: &str = "zndo";

/// Predicate over a single identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemptionRule {
    /// Identifier contains the given substring.
    Contains(String),
}

impl ExemptionRule {
    pub fn matches(&self, bibcode: &Bibcode) -> bool {
        match self {
            ExemptionRule::Contains(marker) => {
                !marker.is_empty() && bibcode.as_str().contains(marker.as_str())
            }
        }
    }
}

/// Ordered collection of exemption rules; an identifier is exempt when any
/// rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemptions {
    rules: Vec<ExemptionRule>,
}

impl Exemptions {
    /// No identifier is ever exempt.
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// One `Contains` rule per non-empty marker.
    pub fn from_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = markers
            .into_iter()
            .map(|marker| marker.as_ref().trim().to_string())
            .filter(|marker| !marker.is_empty())
            .map(ExemptionRule::Contains)
            .collect();
        Self { rules }
    }

    pub fn is_exempt(&self, bibcode: &Bibcode) -> bool {
        self.rules.iter().any(|rule| rule.matches(bibcode))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for Exemptions {
    fn default() -> Self {
        Self::from_markers([ZENODO_MARKER])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_exempts_zenodo_records() {
        let exemptions = Exemptions::default();
        assert!(exemptions.is_exempt(&Bibcode::from("2020zndo...3912345D")));
        assert!(!exemptions.is_exempt(&Bibcode::from("2020ApJ...900..100A")));
    }

    #[test]
    fn blank_markers_are_ignored() {
        let exemptions = Exemptions::from_markers(["", "  "]);
        assert!(exemptions.is_empty());
        assert!(!exemptions.is_exempt(&Bibcode::from("anything")));
    }

    #[test]
    fn any_matching_rule_exempts() {
        let exemptions = Exemptions::from_markers(["zndo", "arXiv"]);
        assert!(exemptions.is_exempt(&Bibcode::from("2021arXiv210100001X")));
        assert!(exemptions.is_exempt(&Bibcode::from("2021zndo...1")));
        assert!(!exemptions.is_exempt(&Bibcode::from("2021MNRAS.500..1A")));
    }

    #[test]
    fn empty_contains_rule_never_matches() {
        assert!(!ExemptionRule::Contains(String::new()).matches(&Bibcode::from("2020ApJ")));
    }
}
