//! Feature selection and filtering of the modelling matrices
//!
//! Each matrix kind is scored, ranked and filtered on its own; the two
//! tracks never share intermediate results.

mod delta;
mod selection;

pub use delta::{compute_delta_shapes, control_contrasts, write_delta_shapes, DeltaShape, DeltaShapes};
pub use selection::{select_features, FeatureSet};

use crate::config::PipelineConfig;
use crate::data::{ExpressionMatrix, Metadata};
use crate::error::Result;

/// Everything the selector derives from one matrix
#[derive(Debug, Clone)]
pub struct FeatureSelection {
    pub shapes: DeltaShapes,
    pub features: FeatureSet,
    /// Input matrix restricted to `features`, in the input row order
    pub filtered: ExpressionMatrix,
}

/// Score, select and filter one modelling matrix
pub fn select_and_filter(
    matrix: &ExpressionMatrix,
    metadata: &Metadata,
    config: &PipelineConfig,
) -> Result<FeatureSelection> {
    let shapes = compute_delta_shapes(matrix, metadata, config)?;
    let features = select_features(&shapes, &config.features)?;
    let filtered = matrix.retain_genes(&features.genes)?;
    Ok(FeatureSelection {
        shapes,
        features,
        filtered,
    })
}
