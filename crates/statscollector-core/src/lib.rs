pub mod bibcode;
pub mod exemption;
pub mod exposition;
pub mod metrics;
pub mod reconcile;

pub use bibcode::{Bibcode, IdentifierSet};
pub use exemption::{ExemptionRule, Exemptions};
pub use exposition::{DEFAULT_SAMPLE_TYPE, Sample, grouping_segments, metric_name, render_sample};
pub use metrics::{MetricLeaf, MetricTree, MetricValue};
pub use reconcile::{Batch, RunPrefix, Summary, TargetName, reconcile, reconcile_with_prefix};
