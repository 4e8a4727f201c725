//! Comparison baselines: a seeded random gene set and the genes most
//! correlated with the measured response

mod correlated;
mod random;

pub use correlated::{top_correlated_gene_set, write_top_correlated, GeneCorrelation, TopCorrelated};
pub use random::random_gene_set;

use crate::config::PipelineConfig;
use crate::data::{ExpressionMatrix, GeneSet, Metadata};
use crate::error::Result;

/// Both baselines of one matrix kind
#[derive(Debug, Clone)]
pub struct Baselines {
    pub random: GeneSet,
    /// Absent when too few samples carry a response value
    pub top_correlated: Option<TopCorrelated>,
}

/// Generate both baselines over the full gene universe of `matrix`.
///
/// A missing response only drops the top-correlated baseline; neither
/// baseline feeds differential expression.
pub fn generate_baselines(matrix: &ExpressionMatrix, metadata: &Metadata, config: &PipelineConfig) -> Result<Baselines> {
    let params = &config.baseline;
    let top_correlated = match top_correlated_gene_set(matrix, metadata, params.size, config) {
        Ok(top) => Some(top),
        Err(e) if !e.is_fatal() => {
            log::warn!("Skipping the top-correlated baseline: {}", e);
            None
        }
        Err(e) => return Err(e),
    };
    Ok(Baselines {
        random: random_gene_set(matrix, params.size, params.seed),
        top_correlated,
    })
}
