//! Normalized count representations
//!
//! Provides size-factor normalized reads and TPM (transcripts per million).

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{PipelineError, Result};

/// Length assumed for every gene when the count table carries none (bp)
pub const DEFAULT_GENE_LENGTH: f64 = 1000.0;

/// Counts divided by the sample's size factor
pub fn normalized_reads(counts: ArrayView2<f64>, size_factors: &[f64]) -> Result<Array2<f64>> {
    let n_samples = counts.ncols();
    if size_factors.len() != n_samples {
        return Err(PipelineError::InvalidInput {
            reason: format!(
                "{} size factors for {} samples",
                size_factors.len(),
                n_samples
            ),
        });
    }

    let mut result = counts.to_owned();
    for (mut column, &sf) in result.axis_iter_mut(Axis(1)).zip(size_factors) {
        column.mapv_inplace(|c| c / sf);
    }
    Ok(result)
}

/// Transcripts per million
///
/// rate = count / length_kb; each sample's rates are scaled to sum to 1e6.
/// Without lengths every gene is taken as [`DEFAULT_GENE_LENGTH`] long, which
/// reduces TPM to counts per million.
pub fn tpm(counts: ArrayView2<f64>, gene_lengths: Option<&[f64]>) -> Result<Array2<f64>> {
    let n_genes = counts.nrows();
    if let Some(lengths) = gene_lengths {
        if lengths.len() != n_genes {
            return Err(PipelineError::InvalidInput {
                reason: format!("{} gene lengths for {} genes", lengths.len(), n_genes),
            });
        }
    }

    let mut rates = counts.to_owned();
    for (i, mut row) in rates.axis_iter_mut(Axis(0)).enumerate() {
        let length_kb = gene_lengths.map_or(DEFAULT_GENE_LENGTH, |l| l[i]) / 1000.0;
        row.mapv_inplace(|c| c / length_kb);
    }

    for mut column in rates.axis_iter_mut(Axis(1)) {
        let total = column.sum();
        if total > 0.0 {
            column.mapv_inplace(|r| r / total * 1e6);
        }
    }
    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalized_reads() {
        let counts = array![[100.0, 200.0], [300.0, 400.0]];
        let nr = normalized_reads(counts.view(), &[1.0, 2.0]).unwrap();
        assert_eq!(nr, array![[100.0, 100.0], [300.0, 200.0]]);
        assert!(normalized_reads(counts.view(), &[1.0]).is_err());
    }

    #[test]
    fn test_tpm_sums_to_million() {
        let counts = array![[100.0, 200.0], [300.0, 400.0]];
        let result = tpm(counts.view(), Some(&[1000.0, 2000.0])).unwrap();
        for column in result.axis_iter(Axis(1)) {
            assert!((column.sum() - 1e6).abs() < 1e-6);
        }
        // rates 100 and 150 in the first sample
        assert!((result[[0, 0]] - 400_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_tpm_without_lengths_is_cpm() {
        let counts = array![[1.0, 0.0], [3.0, 0.0]];
        let result = tpm(counts.view(), None).unwrap();
        assert!((result[[0, 0]] - 250_000.0).abs() < 1e-6);
        assert_eq!(result[[1, 1]], 0.0);
    }
}
