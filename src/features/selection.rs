//! Ranking and thresholding of delta shapes

use std::cmp::Ordering;

use crate::config::FeatureParams;
use crate::data::MatrixKind;
use crate::error::{PipelineError, Result};
use crate::stats::cmp_f64;

use super::delta::DeltaShapes;

/// Genes selected from one matrix, best score first
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub kind: MatrixKind,
    pub genes: Vec<String>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Rank eligible genes by score (descending, ties by gene id) and keep
/// those passing `min_score`, at most `top_k` of them
pub fn select_features(shapes: &DeltaShapes, params: &FeatureParams) -> Result<FeatureSet> {
    let mut ranked: Vec<(&str, f64)> = shapes
        .rows
        .iter()
        .filter(|row| row.mean_expression >= params.min_mean_expression)
        .filter(|row| row.score.is_finite() && row.score >= params.min_score)
        .map(|row| (row.gene_id.as_str(), row.score))
        .collect();

    ranked.sort_by(|a, b| match cmp_f64(&b.1, &a.1) {
        Ordering::Equal => a.0.cmp(b.0),
        other => other,
    });
    if let Some(k) = params.top_k {
        ranked.truncate(k);
    }

    if ranked.is_empty() {
        return Err(PipelineError::EmptyFeatureSet {
            kind: shapes.kind,
            reason: format!(
                "none of {} genes has mean expression >= {} and score >= {}",
                shapes.rows.len(),
                params.min_mean_expression,
                params.min_score
            ),
        });
    }

    log::info!(
        "Selected {} of {} genes from the {} matrix",
        ranked.len(),
        shapes.rows.len(),
        shapes.kind
    );
    Ok(FeatureSet {
        kind: shapes.kind,
        genes: ranked.into_iter().map(|(g, _)| g.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::delta::DeltaShape;

    fn shape(gene: &str, mean: f64, score: f64) -> DeltaShape {
        DeltaShape {
            gene_id: gene.to_string(),
            mean_expression: mean,
            mean_log: 0.0,
            sd_log: 0.0,
            deltas: vec![score],
            score,
        }
    }

    fn shapes(rows: Vec<DeltaShape>) -> DeltaShapes {
        DeltaShapes {
            kind: MatrixKind::NormalizedReads,
            contrasts: vec![],
            rows,
        }
    }

    #[test]
    fn test_ties_broken_by_gene_id() {
        let input = shapes(vec![
            shape("G3", 10.0, 1.0),
            shape("G1", 10.0, 1.0),
            shape("G2", 10.0, 2.0),
            shape("G4", 10.0, 0.5),
        ]);
        let params = FeatureParams {
            top_k: Some(3),
            min_score: 0.0,
            min_mean_expression: 1.0,
        };
        let selected = select_features(&input, &params).unwrap();
        assert_eq!(selected.genes, vec!["G2", "G1", "G3"]);
        assert_eq!(selected, select_features(&input, &params).unwrap());
    }

    #[test]
    fn test_low_expression_and_threshold() {
        let input = shapes(vec![shape("A", 0.5, 3.0), shape("B", 5.0, 0.2), shape("C", 5.0, 0.8)]);
        let params = FeatureParams {
            top_k: None,
            min_score: 0.5,
            min_mean_expression: 1.0,
        };
        assert_eq!(select_features(&input, &params).unwrap().genes, vec!["C"]);
    }

    #[test]
    fn test_nothing_passes() {
        let input = shapes(vec![shape("A", 5.0, 0.1)]);
        let params = FeatureParams {
            top_k: None,
            min_score: 1.0,
            min_mean_expression: 0.0,
        };
        let err = select_features(&input, &params).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyFeatureSet { kind: MatrixKind::NormalizedReads, .. }));
    }
}
