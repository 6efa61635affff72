//! Scheduled statistics collection: metric collectors feeding a Prometheus
//! push gateway, and reconciliation of bibcode sets against a canonical list
//! with archival of the discrepancies.

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod run;
pub mod services;
pub mod sources;

pub use statscollector_core::{
    Batch, Bibcode, Exemptions, IdentifierSet, MetricTree, MetricValue, Summary, TargetName,
};
