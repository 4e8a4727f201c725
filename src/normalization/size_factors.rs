//! Size factor estimation using the median of ratios method

use ndarray::{Array1, ArrayView2, Axis};

use crate::error::{PipelineError, Result};
use crate::stats::median;

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeFactorMethod {
    /// Standard median of ratios over genes with all counts positive
    Ratio,
    /// Geometric means over positive counts only, for tables where every gene has a zero
    PosCounts,
}

/// Median-of-ratios size factors, falling back to positive counts when no
/// gene is expressed in every sample
pub fn median_of_ratios(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    let has_complete_gene = counts.axis_iter(Axis(0)).any(|row| row.iter().all(|&x| x > 0.0));
    if has_complete_gene {
        estimate_size_factors(counts, SizeFactorMethod::Ratio)
    } else {
        log::warn!("Every gene has at least one zero count; using positive-count geometric means for size factors");
        estimate_size_factors(counts, SizeFactorMethod::PosCounts)
    }
}

/// Estimate one size factor per column of a genes x samples count table
pub fn estimate_size_factors(counts: ArrayView2<f64>, method: SizeFactorMethod) -> Result<Array1<f64>> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(PipelineError::schema("size factor estimation", "count table is empty"));
    }

    // Log geometric mean per gene; genes that cannot serve as reference are None
    let log_geo_means: Vec<Option<f64>> = counts
        .axis_iter(Axis(0))
        .map(|row| match method {
            SizeFactorMethod::Ratio if row.iter().all(|&x| x > 0.0) => {
                Some(row.iter().map(|x| x.ln()).sum::<f64>() / n_samples as f64)
            }
            // divide by the total number of samples, not by the positive ones
            SizeFactorMethod::PosCounts if row.iter().any(|&x| x > 0.0) => {
                Some(row.iter().filter(|&&x| x > 0.0).map(|x| x.ln()).sum::<f64>() / n_samples as f64)
            }
            _ => None,
        })
        .collect();

    if log_geo_means.iter().all(Option::is_none) {
        return Err(PipelineError::NumericalInstability {
            operation: "size factor estimation".to_string(),
            details: "no gene usable as reference".to_string(),
        });
    }

    let mut size_factors = Array1::zeros(n_samples);
    for (j, column) in counts.axis_iter(Axis(1)).enumerate() {
        let log_ratios: Vec<f64> = column
            .iter()
            .zip(&log_geo_means)
            .filter_map(|(&c, g)| match g {
                Some(g) if c > 0.0 => Some(c.ln() - g),
                _ => None,
            })
            .collect();

        size_factors[j] = if log_ratios.is_empty() {
            1.0
        } else {
            median(&log_ratios).exp()
        };
    }

    if method == SizeFactorMethod::PosCounts {
        // geometric mean of the factors is 1
        let center = (size_factors.iter().map(|x: &f64| x.ln()).sum::<f64>() / n_samples as f64).exp();
        size_factors.mapv_inplace(|x| x / center);
    }

    if size_factors.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(PipelineError::NumericalInstability {
            operation: "size factor estimation".to_string(),
            details: "non-positive size factor".to_string(),
        });
    }
    Ok(size_factors)
}
