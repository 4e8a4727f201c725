//! Dispersion estimation for negative binomial models

mod gene_wise;
mod map;
mod trend;

pub use gene_wise::{estimate_dispersion_gene, max_dispersion, GeneDispersion};
pub use map::{fit_map_dispersion, is_dispersion_outlier, prior_variance};
pub use trend::{fit_dispersion_trend, DispersionTrend};

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::config::DeParams;
use crate::error::{PipelineError, Result};
use crate::glm::TwoGroupDesign;

/// Parameters of the gene-wise and MAP line searches
#[derive(Debug, Clone)]
pub struct DispersionParams {
    /// Lower bound on dispersions
    pub min_disp: f64,
    /// Log-posterior change at which the line search stops
    pub disp_tol: f64,
    /// Initial step size
    pub kappa_0: f64,
    pub maxit: usize,
    /// Residual SDs above the trend beyond which a gene keeps its own estimate
    pub outlier_sd: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            disp_tol: 1e-6,
            kappa_0: 1.0,
            maxit: 100,
            outlier_sd: 2.0,
        }
    }
}

impl From<&DeParams> for DispersionParams {
    fn from(params: &DeParams) -> Self {
        Self {
            min_disp: params.min_disp,
            disp_tol: params.disp_tol,
            maxit: params.disp_maxit,
            ..Self::default()
        }
    }
}

/// All dispersion estimates of one comparison, indexed by gene
#[derive(Debug, Clone)]
pub struct Dispersions {
    pub base_means: Vec<f64>,
    pub gene_wise: Vec<f64>,
    pub trend: DispersionTrend,
    pub trended: Vec<f64>,
    pub prior_var: f64,
    /// Final per-gene dispersions used by the GLM fit
    pub map: Vec<f64>,
    pub n_outliers: usize,
}

/// Gene-wise estimates, trend and MAP shrinkage for a genes x samples count matrix
pub fn estimate_dispersions(
    counts: ArrayView2<'_, f64>,
    size_factors: &[f64],
    design: &TwoGroupDesign,
    params: &DispersionParams,
) -> Result<Dispersions> {
    let n_samples = counts.ncols();
    if n_samples != design.n_samples() || size_factors.len() != n_samples {
        return Err(PipelineError::InvalidInput {
            reason: format!(
                "{} count columns, {} design rows, {} size factors",
                n_samples,
                design.n_samples(),
                size_factors.len()
            ),
        });
    }
    if n_samples <= TwoGroupDesign::N_COEFS {
        return Err(PipelineError::InvalidInput {
            reason: format!("{} samples leave no residual degrees of freedom for dispersion estimation", n_samples),
        });
    }

    let n_genes = counts.nrows();
    let xim = size_factors.iter().map(|&s| 1.0 / s).sum::<f64>() / n_samples as f64;
    let max_disp = max_dispersion(n_samples);

    let rows: Vec<Vec<f64>> = counts.outer_iter().map(|row| row.to_vec()).collect();
    let base_means: Vec<f64> = rows
        .iter()
        .map(|row| row.iter().zip(size_factors).map(|(&c, &s)| c / s).sum::<f64>() / n_samples as f64)
        .collect();

    let gene_fits: Vec<GeneDispersion> = rows
        .par_iter()
        .map(|row| estimate_dispersion_gene(row, size_factors, design, xim, params))
        .collect();
    let gene_wise: Vec<f64> = gene_fits.iter().map(|g| g.alpha).collect();

    let trend = fit_dispersion_trend(&base_means, &gene_wise, params.min_disp);
    let trended: Vec<f64> = base_means.iter().map(|&m| trend.value(m)).collect();

    let (prior_var, var_log_disp_ests) =
        prior_variance(&gene_wise, &trended, n_samples, TwoGroupDesign::N_COEFS, params.min_disp);

    let map: Vec<f64> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            if is_dispersion_outlier(gene_wise[i], trended[i], var_log_disp_ests, params.outlier_sd) {
                return gene_wise[i];
            }
            fit_map_dispersion(
                &rows[i],
                design,
                &gene_fits[i].mu,
                gene_wise[i],
                trended[i],
                prior_var,
                max_disp,
                params,
            )
        })
        .collect();

    let n_outliers = (0..n_genes)
        .filter(|&i| is_dispersion_outlier(gene_wise[i], trended[i], var_log_disp_ests, params.outlier_sd))
        .count();
    log::debug!(
        "dispersions: {} genes, trend {:?}, prior variance {:.4}, {} outliers",
        n_genes,
        trend,
        prior_var,
        n_outliers
    );

    Ok(Dispersions {
        base_means,
        gene_wise,
        trend,
        trended,
        prior_var,
        map,
        n_outliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_estimates_are_bounded() {
        let counts = array![
            [100.0, 110.0, 90.0, 400.0, 380.0, 420.0],
            [50.0, 52.0, 49.0, 51.0, 50.0, 48.0],
            [10.0, 40.0, 5.0, 30.0, 8.0, 60.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [1000.0, 980.0, 1020.0, 990.0, 1010.0, 1000.0],
        ];
        let design = TwoGroupDesign::new(vec![false, false, false, true, true, true]).unwrap();
        let params = DispersionParams::default();
        let disp = estimate_dispersions(counts.view(), &[1.0; 6], &design, &params).unwrap();

        assert_eq!(disp.map.len(), 5);
        assert!(disp.gene_wise[3].is_nan());
        for (i, &d) in disp.map.iter().enumerate() {
            assert!(d.is_finite(), "gene {} has dispersion {}", i, d);
            assert!(d >= params.min_disp && d <= max_dispersion(6));
        }
        // the noisy gene keeps a larger dispersion than the flat ones
        assert!(disp.map[2] > disp.map[1]);
        assert!(disp.prior_var >= 0.25);
    }

    #[test]
    fn test_requires_residual_df() {
        let counts = array![[1.0, 2.0]];
        let design = TwoGroupDesign::new(vec![false, true]).unwrap();
        assert!(estimate_dispersions(counts.view(), &[1.0; 2], &design, &DispersionParams::default()).is_err());
    }
}
