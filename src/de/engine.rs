//! Negative binomial Wald test of one comparison pair

use ndarray::Array2;
use rayon::prelude::*;

use crate::config::DeParams;
use crate::data::{ExpressionMatrix, GroupKey};
use crate::dispersion::{estimate_dispersions, DispersionParams, DispersionTrend};
use crate::error::{PipelineError, Result};
use crate::glm::{fit_single_gene, GlmFitParams, TwoGroupDesign};
use crate::normalization::median_of_ratios;
use crate::testing::{benjamini_hochberg, wald_test, WaldResult};

use super::comparisons::ComparisonPair;

/// Test outcome of one gene in one comparison
#[derive(Debug, Clone, PartialEq)]
pub struct GeneResult {
    pub gene_id: String,
    pub base_mean: f64,
    pub dispersion: f64,
    pub wald: WaldResult,
    pub padj: f64,
    pub converged: bool,
}

impl GeneResult {
    /// Gene with a p-value
    pub fn is_tested(&self) -> bool {
        !self.wald.pvalue.is_nan()
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.padj < alpha
    }
}

/// Per-gene results of one pair, in matrix gene order
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub pair: ComparisonPair,
    pub n_numerator: usize,
    pub n_denominator: usize,
    pub size_factors: Vec<f64>,
    pub trend: DispersionTrend,
    pub prior_var: f64,
    pub genes: Vec<GeneResult>,
}

impl ComparisonResult {
    pub fn n_tested(&self) -> usize {
        self.genes.iter().filter(|g| g.is_tested()).count()
    }
}

/// Reject a group smaller than the replicate minimum
pub fn check_replicates(pair: &ComparisonPair, group: &GroupKey, n: usize, required: usize) -> Result<()> {
    if n < required {
        return Err(PipelineError::InsufficientReplicates {
            comparison: pair.id(),
            group: group.to_string(),
            n,
            required,
        });
    }
    Ok(())
}

/// Fit and test every gene of `matrix` for one pair.
///
/// `numerator` and `denominator` are matrix column indices. Values are
/// rounded to non-negative integer pseudo-counts and normalized with
/// median-of-ratios size factors over the pair's samples only.
pub fn run_comparison(
    matrix: &ExpressionMatrix,
    pair: &ComparisonPair,
    numerator: &[usize],
    denominator: &[usize],
    params: &DeParams,
) -> Result<ComparisonResult> {
    check_replicates(pair, &pair.numerator, numerator.len(), params.min_replicates)?;
    check_replicates(pair, &pair.denominator, denominator.len(), params.min_replicates)?;

    let columns: Vec<usize> = denominator.iter().chain(numerator).copied().collect();
    let values = matrix.values();
    let counts = Array2::from_shape_fn((matrix.n_genes(), columns.len()), |(i, j)| {
        values[[i, columns[j]]].round().max(0.0)
    });
    let size_factors = median_of_ratios(counts.view())?.to_vec();

    let design = TwoGroupDesign::new(
        std::iter::repeat(false)
            .take(denominator.len())
            .chain(std::iter::repeat(true).take(numerator.len()))
            .collect(),
    )?;
    let dispersions = estimate_dispersions(counts.view(), &size_factors, &design, &DispersionParams::from(params))?;

    let glm_params = GlmFitParams::from(params);
    let fits: Vec<(WaldResult, bool)> = (0..matrix.n_genes())
        .into_par_iter()
        .map(|i| {
            let row = counts.row(i).to_vec();
            if row.iter().all(|&c| c == 0.0) {
                return (WaldResult::missing(), false);
            }
            let fit = fit_single_gene(&row, &size_factors, &design, dispersions.map[i], &glm_params);
            (wald_test(&fit), fit.converged)
        })
        .collect();

    let n_unconverged = fits.iter().filter(|(w, converged)| !w.pvalue.is_nan() && !converged).count();
    if n_unconverged > 0 {
        log::debug!("{}: {} genes did not converge", pair, n_unconverged);
    }

    let pvalues: Vec<f64> = fits.iter().map(|(w, _)| w.pvalue).collect();
    let padj = benjamini_hochberg(&pvalues);

    let genes = fits
        .into_iter()
        .enumerate()
        .map(|(i, (wald, converged))| GeneResult {
            gene_id: matrix.gene_ids()[i].clone(),
            base_mean: dispersions.base_means[i],
            dispersion: dispersions.map[i],
            wald,
            padj: padj[i],
            converged,
        })
        .collect();

    Ok(ComparisonResult {
        pair: pair.clone(),
        n_numerator: numerator.len(),
        n_denominator: denominator.len(),
        size_factors,
        trend: dispersions.trend,
        prior_var: dispersions.prior_var,
        genes,
    })
}
