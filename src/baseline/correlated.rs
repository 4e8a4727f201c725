//! Genes ranked by correlation with the measured response

use std::cmp::Ordering;
use std::path::Path;

use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::data::{ExpressionMatrix, GeneSet, Metadata, Provenance};
use crate::error::{PipelineError, Result};
use crate::io::{format_f64, write_csv_atomic};
use crate::stats::{cmp_f64, pearson};

/// Minimum samples with a response value for a correlation
const MIN_RESPONSE_SAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneCorrelation {
    pub gene_id: String,
    /// Pearson r of log2(x + 1) expression against the response
    pub r: f64,
}

/// Top-correlated baseline with the correlations behind it, best first
#[derive(Debug, Clone)]
pub struct TopCorrelated {
    pub set: GeneSet,
    pub ranked: Vec<GeneCorrelation>,
}

/// Rank genes by |r| (descending, ties by gene id) and keep the first `size`.
///
/// Only samples with a recorded response take part; each sample's response
/// is the one measured at its own timepoint.
pub fn top_correlated_gene_set(
    matrix: &ExpressionMatrix,
    metadata: &Metadata,
    size: usize,
    config: &PipelineConfig,
) -> Result<TopCorrelated> {
    let context = format!("top-correlated baseline ({})", matrix.kind());
    let samples = metadata.resolve_all(matrix.sample_labels(), &context)?;

    let (columns, response): (Vec<usize>, Vec<f64>) = samples
        .iter()
        .enumerate()
        .filter_map(|(col, &s)| metadata.sample(s).response.map(|r| (col, r)))
        .unzip();
    if columns.len() < MIN_RESPONSE_SAMPLES {
        return Err(PipelineError::InsufficientResponse {
            context,
            column: config.response_col.clone(),
            n: columns.len(),
            required: MIN_RESPONSE_SAMPLES,
        });
    }

    let log_values = matrix.log2p1();
    let mut ranked: Vec<GeneCorrelation> = (0..matrix.n_genes())
        .into_par_iter()
        .map(|i| {
            let row = log_values.row(i);
            let x: Vec<f64> = columns.iter().map(|&c| row[c]).collect();
            GeneCorrelation {
                gene_id: matrix.gene_ids()[i].clone(),
                r: pearson(&x, &response),
            }
        })
        .collect();

    ranked.sort_by(|a, b| match cmp_f64(&b.r.abs(), &a.r.abs()) {
        Ordering::Equal => a.gene_id.cmp(&b.gene_id),
        other => other,
    });
    ranked.truncate(size);

    log::debug!(
        "Top-correlated baseline for {}: {} genes over {} samples with response",
        matrix.kind(),
        ranked.len(),
        columns.len()
    );
    let set = GeneSet::new(
        &format!("top_corr_{}", matrix.kind().tag()),
        Provenance::TopCorrelated,
        ranked.iter().map(|g| g.gene_id.clone()),
    );
    Ok(TopCorrelated { set, ranked })
}

/// Write `top_corr_gene_set_{kind}.csv`; without a baseline only the header is written
pub fn write_top_correlated<P: AsRef<Path>>(path: P, top: Option<&TopCorrelated>, config: &PipelineConfig) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record([config.gene_col.as_str(), "r", "abs_r"])?;
        for g in top.into_iter().flat_map(|t| t.ranked.iter()) {
            w.write_record([g.gene_id.clone(), format_f64(g.r), format_f64(g.r.abs())])?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MatrixKind, Sample, SampleKey};
    use ndarray::array;

    fn sample(id: &str, hours: u32, response: Option<f64>) -> Sample {
        Sample {
            key: SampleKey {
                drug: "drugx".to_string(),
                hours,
                sample: id.to_string(),
                duplicate_id: "1".to_string(),
            },
            is_control: false,
            is_vehicle: false,
            response,
        }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (ExpressionMatrix, Metadata) {
        let meta = Metadata::new(vec![
            sample("s1", 24, Some(10.0)),
            sample("s2", 48, Some(20.0)),
            sample("s3", 72, Some(30.0)),
            sample("s4", 96, None),
        ])
        .unwrap();
        // log2(x + 1) of 0, 1, 3, 7 is 0, 1, 2, 3
        let matrix = ExpressionMatrix::new(
            MatrixKind::NormalizedReads,
            array![
                [0.0, 1.0, 3.0, 0.0],
                [3.0, 1.0, 0.0, 0.0],
                [5.0, 5.0, 5.0, 5.0],
                [7.0, 1.0, 3.0, 0.0]
            ],
            ids(&["UP", "DOWN", "FLAT", "MIXED"]),
            ids(&["UP", "DOWN", "FLAT", "MIXED"]),
            ids(&["s1", "s2", "s3", "s4"]),
        )
        .unwrap();
        (matrix, meta)
    }

    #[test]
    fn test_ranking_by_absolute_correlation() {
        let (matrix, meta) = fixture();
        let top = top_correlated_gene_set(&matrix, &meta, 2, &PipelineConfig::default()).unwrap();
        // UP and DOWN are both perfectly correlated; DOWN wins the tie by id
        assert_eq!(top.set.genes(), &["DOWN", "UP"]);
        assert!((top.ranked[0].r + 1.0).abs() < 1e-12);
        assert!((top.ranked[1].r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_oversized_k_returns_universe() {
        let (matrix, meta) = fixture();
        let top = top_correlated_gene_set(&matrix, &meta, 100, &PipelineConfig::default()).unwrap();
        assert_eq!(top.set.len(), 4);
        assert_eq!(top.ranked.last().unwrap().gene_id, "FLAT");
        assert_eq!(top.ranked.last().unwrap().r, 0.0);
    }

    #[test]
    fn test_too_few_responses() {
        let meta = Metadata::new(vec![
            sample("s1", 24, Some(1.0)),
            sample("s2", 48, None),
            sample("s3", 72, Some(2.0)),
        ])
        .unwrap();
        let matrix = ExpressionMatrix::new(
            MatrixKind::Tpm,
            array![[1.0, 2.0, 3.0]],
            ids(&["A"]),
            ids(&["A"]),
            ids(&["s1", "s2", "s3"]),
        )
        .unwrap();
        let err = top_correlated_gene_set(&matrix, &meta, 5, &PipelineConfig::default()).unwrap_err();
        match err {
            PipelineError::InsufficientResponse { n, required, .. } => assert_eq!((n, required), (2, 3)),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
