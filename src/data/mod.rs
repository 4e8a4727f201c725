//! Data structures flowing between pipeline stages

mod counts;
mod gene_set;
mod matrix;
mod metadata;

pub use counts::{strip_version, CollapsedCounts, RawCounts};
pub use gene_set::{GeneSet, Provenance};
pub use matrix::{ExpressionMatrix, MatrixKind};
pub use metadata::{normalize_drug, parse_hours, parse_response, GroupKey, Metadata, Sample, SampleKey};
