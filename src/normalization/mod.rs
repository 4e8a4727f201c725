//! Normalization of raw counts into the two modelling representations

mod counts;
mod size_factors;

pub use counts::{normalized_reads, tpm, DEFAULT_GENE_LENGTH};
pub use size_factors::{estimate_size_factors, median_of_ratios, SizeFactorMethod};

use std::collections::BTreeMap;

use ndarray::Array1;

use crate::data::{CollapsedCounts, ExpressionMatrix, MatrixKind, Metadata, RawCounts};
use crate::error::{PipelineError, Result};

const CONTEXT: &str = "count matrix normalizer";

/// Output of the normalizer: aligned inputs plus both modelling matrices
#[derive(Debug, Clone)]
pub struct NormalizedCounts {
    /// Samples that have a count column, in identity order
    pub metadata: Metadata,
    /// Gene-level raw counts, columns in metadata order
    pub counts: CollapsedCounts,
    pub size_factors: Array1<f64>,
    pub normalized_reads: ExpressionMatrix,
    pub tpm: ExpressionMatrix,
}

impl NormalizedCounts {
    pub fn matrix(&self, kind: MatrixKind) -> &ExpressionMatrix {
        match kind {
            MatrixKind::NormalizedReads => &self.normalized_reads,
            MatrixKind::Tpm => &self.tpm,
        }
    }
}

/// Align raw counts with the metadata and derive both representations.
///
/// Every count column must match a sample; samples without a count column
/// are dropped with a warning, so both matrices carry the same samples,
/// a subset of the metadata.
pub fn normalize(raw: &RawCounts, metadata: &Metadata) -> Result<NormalizedCounts> {
    let resolved = metadata.resolve_all(raw.sample_labels(), CONTEXT)?;

    // metadata index -> count column
    let mut column_of: BTreeMap<usize, usize> = BTreeMap::new();
    for (col, &sample) in resolved.iter().enumerate() {
        if let Some(prev) = column_of.insert(sample, col) {
            return Err(PipelineError::alignment(
                CONTEXT,
                format!(
                    "columns '{}' and '{}' both match sample {}",
                    raw.sample_labels()[prev],
                    raw.sample_labels()[col],
                    metadata.sample(sample).key.composite_label()
                ),
            ));
        }
    }
    for (i, label) in metadata.labels().iter().enumerate() {
        if !column_of.contains_key(&i) {
            log::warn!("Sample '{}' has no count column and is dropped", label);
        }
    }

    let present: Vec<usize> = column_of.keys().copied().collect();
    let columns: Vec<usize> = column_of.values().copied().collect();
    let metadata = metadata.subset(&present)?;
    let aligned = raw
        .select_samples(&columns)?
        .with_sample_labels(metadata.labels().to_vec())?;
    let counts = aligned.collapse_to_genes();
    log::info!(
        "Aligned {} samples; {} rows collapsed onto {} genes",
        metadata.n_samples(),
        raw.n_genes(),
        counts.gene_ids.len()
    );

    let size_factors = median_of_ratios(counts.counts.view())?;
    log::debug!("Size factors: {:?}", size_factors.to_vec());

    let build = |kind: MatrixKind, values| {
        ExpressionMatrix::new(
            kind,
            values,
            counts.gene_ids.clone(),
            counts.names.clone(),
            counts.sample_labels.clone(),
        )
    };
    let normalized_reads = build(
        MatrixKind::NormalizedReads,
        normalized_reads(counts.counts.view(), size_factors.as_slice().unwrap_or(&[]))?,
    )?;
    let tpm = build(MatrixKind::Tpm, tpm(counts.counts.view(), counts.lengths.as_deref())?)?;

    Ok(NormalizedCounts {
        metadata,
        counts,
        size_factors,
        normalized_reads,
        tpm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::{Sample, SampleKey};
    use ndarray::array;

    fn sample(drug: &str, hours: u32, id: &str, dup: &str) -> Sample {
        let config = PipelineConfig::default();
        Sample {
            key: SampleKey {
                drug: drug.to_string(),
                hours,
                sample: id.to_string(),
                duplicate_id: dup.to_string(),
            },
            is_control: config.is_control(drug),
            is_vehicle: config.is_vehicle(drug),
            response: None,
        }
    }

    fn scenario_metadata() -> Metadata {
        Metadata::new(vec![
            sample("untreated", 24, "s1", "1"),
            sample("drugx", 24, "s2", "1"),
            sample("untreated", 24, "s3", "2"),
            sample("drugx", 24, "s4", "2"),
        ])
        .unwrap()
    }

    fn labels(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matrices_share_aligned_samples() {
        let raw = RawCounts::new(
            array![
                [10.0, 50.0, 12.0, 48.0],
                [100.0, 100.0, 100.0, 100.0],
                [200.0, 200.0, 200.0, 200.0],
                [50.0, 50.0, 50.0, 50.0]
            ],
            labels(&["G1", "H1", "H2", "H3"]),
            None,
            labels(&["s1", "s2", "s3", "s4"]),
        )
        .unwrap();
        let meta = scenario_metadata();
        let out = normalize(&raw, &meta).unwrap();

        assert_eq!(out.normalized_reads.sample_labels(), out.tpm.sample_labels());
        for label in out.tpm.sample_labels() {
            assert!(meta.resolve(label).is_some());
        }
        // metadata order: drugx s2, drugx s4, untreated s1, untreated s3
        assert_eq!(out.tpm.sample_labels(), &["s2", "s4", "s1", "s3"]);

        let g1 = out.normalized_reads.gene_index("G1").unwrap();
        let row = out.normalized_reads.gene_values(g1);
        assert!((row[0] - row[1]).abs() / row[0] < 0.1);
        assert!((row[2] - row[3]).abs() / row[2] < 0.25);
        assert!(row[0] > row[2]);
    }

    #[test]
    fn test_unknown_count_column_is_alignment_error() {
        let raw = RawCounts::new(
            array![[1.0, 2.0]],
            labels(&["G1"]),
            None,
            labels(&["s1", "ghost"]),
        )
        .unwrap();
        let err = normalize(&raw, &scenario_metadata()).unwrap_err();
        assert!(matches!(err, PipelineError::Alignment { .. }));
    }

    #[test]
    fn test_samples_without_counts_are_dropped() {
        let raw = RawCounts::new(
            array![[5.0, 7.0], [3.0, 9.0]],
            labels(&["G1.2", "G2.1"]),
            Some(vec![1000.0, 2000.0]),
            labels(&["s3", "s1"]),
        )
        .unwrap();
        let out = normalize(&raw, &scenario_metadata()).unwrap();
        assert_eq!(out.metadata.n_samples(), 2);
        assert_eq!(out.tpm.sample_labels(), &["s1", "s3"]);
        assert_eq!(out.counts.counts.column(0).to_vec(), vec![7.0, 9.0]);
        assert_eq!(out.tpm.gene_ids(), &["G1", "G2"]);
    }
}
