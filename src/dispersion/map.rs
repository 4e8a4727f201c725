//! MAP (maximum a posteriori) dispersion estimation
//!
//! Gene-wise estimates are shrunk toward the fitted trend with a normal
//! prior on log(alpha) centred at log(trend). The prior width comes from
//! the spread of the gene-wise residuals around the trend, less the
//! sampling variance expected from the residual degrees of freedom.

use crate::dispersion::gene_wise::{armijo_line_search, cox_reid_log_likelihood, d_cox_reid_log_likelihood, grid_search};
use crate::dispersion::DispersionParams;
use crate::glm::TwoGroupDesign;
use crate::stats::{mad_squared, trigamma};

/// Lower bound on the prior variance of log(alpha)
const MIN_PRIOR_VAR: f64 = 0.25;

/// Prior variance of log dispersions and the raw residual variance
/// (varLogDispEsts) used for outlier detection.
///
/// Residuals log(gene) - log(trend) are taken from genes whose gene-wise
/// estimate is at least 100 * min_disp.
pub fn prior_variance(
    gene_dispersions: &[f64],
    trended_dispersions: &[f64],
    n_samples: usize,
    n_coef: usize,
    min_disp: f64,
) -> (f64, f64) {
    let residuals: Vec<f64> = gene_dispersions
        .iter()
        .zip(trended_dispersions)
        .filter(|(&g, &t)| g.is_finite() && t.is_finite() && g >= 100.0 * min_disp && t > 0.0)
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();

    if residuals.len() < 3 {
        return (MIN_PRIOR_VAR, MIN_PRIOR_VAR);
    }
    let var_log_disp_ests = mad_squared(&residuals);
    if n_samples <= n_coef {
        return (MIN_PRIOR_VAR, var_log_disp_ests);
    }

    let df = (n_samples - n_coef) as f64;
    let prior_var = (var_log_disp_ests - trigamma(df / 2.0)).max(MIN_PRIOR_VAR);
    log::debug!(
        "dispersion prior: df = {}, varLogDispEsts = {:.4}, prior variance = {:.4}",
        df,
        var_log_disp_ests,
        prior_var
    );
    (prior_var, var_log_disp_ests)
}

/// Posterior mode of log(alpha) for one gene, bounded to [min_disp, max_disp].
///
/// Genes with an invalid trend get 0.1 and genes without a gene-wise
/// estimate take the trend.
#[allow(clippy::too_many_arguments)]
pub fn fit_map_dispersion(
    counts: &[f64],
    design: &TwoGroupDesign,
    mu: &[f64],
    gene_disp: f64,
    trend_disp: f64,
    prior_var: f64,
    max_disp: f64,
    params: &DispersionParams,
) -> f64 {
    if !trend_disp.is_finite() || trend_disp <= 0.0 {
        return 0.1;
    }
    if !gene_disp.is_finite() {
        return trend_disp;
    }

    let prior_mean = trend_disp.ln();
    let lp = |a: f64| cox_reid_log_likelihood(counts, design, mu, a) - (a - prior_mean).powi(2) / (2.0 * prior_var);
    let dlp = |a: f64| d_cox_reid_log_likelihood(counts, design, mu, a) - (a - prior_mean) / prior_var;

    let disp_init = if gene_disp > 0.1 * trend_disp { gene_disp } else { trend_disp };
    let start = disp_init.ln().clamp((params.min_disp / 10.0).ln(), max_disp.ln());
    let search = armijo_line_search(lp, dlp, start, params);

    let alpha = if search.converged {
        search.log_alpha.exp()
    } else {
        grid_search(lp, params.min_disp.ln(), max_disp.ln())
    };
    alpha.clamp(params.min_disp, max_disp)
}

/// Genes whose gene-wise estimate sits more than `outlier_sd` residual SDs
/// above the trend keep their gene-wise value.
pub fn is_dispersion_outlier(gene_disp: f64, trend_disp: f64, var_log_disp_ests: f64, outlier_sd: f64) -> bool {
    gene_disp.is_finite()
        && trend_disp.is_finite()
        && gene_disp > 0.0
        && trend_disp > 0.0
        && gene_disp.ln() - trend_disp.ln() > outlier_sd * var_log_disp_ests.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design() -> TwoGroupDesign {
        TwoGroupDesign::new(vec![false, false, false, true, true, true]).unwrap()
    }

    #[test]
    fn test_map_lies_between_gene_and_trend() {
        let counts = [100.0, 110.0, 90.0, 200.0, 210.0, 190.0];
        let mu = [100.0, 100.0, 100.0, 200.0, 200.0, 200.0];
        let map = fit_map_dispersion(&counts, &design(), &mu, 0.5, 0.1, 0.5, 10.0, &DispersionParams::default());
        assert!(map > 0.0 && map < 10.0);
        // tight counts pull below the trend, the prior holds it above min_disp
        assert!(map < 0.5);
    }

    #[test]
    fn test_invalid_inputs() {
        let counts = [1.0; 6];
        let mu = [1.0; 6];
        let params = DispersionParams::default();
        assert_eq!(fit_map_dispersion(&counts, &design(), &mu, 0.3, f64::NAN, 1.0, 10.0, &params), 0.1);
        assert_eq!(fit_map_dispersion(&counts, &design(), &mu, f64::NAN, 0.2, 1.0, 10.0, &params), 0.2);
    }

    #[test]
    fn test_prior_variance_floor() {
        let gene = [0.1, 0.2, 0.15, 0.12, 0.18];
        let trend = [0.1; 5];
        let (prior_var, var_log) = prior_variance(&gene, &trend, 6, 2, 1e-8);
        assert!(var_log > 0.0);
        // trigamma(2) exceeds the residual spread here
        assert_eq!(prior_var, MIN_PRIOR_VAR);
    }

    #[test]
    fn test_prior_variance_needs_three_residuals() {
        let (prior_var, var_log) = prior_variance(&[0.1, 1e-9], &[0.1, 0.1], 10, 2, 1e-8);
        assert_eq!((prior_var, var_log), (MIN_PRIOR_VAR, MIN_PRIOR_VAR));
    }

    #[test]
    fn test_outlier_rule() {
        assert!(is_dispersion_outlier(2.0, 0.1, 0.25, 2.0));
        assert!(!is_dispersion_outlier(0.15, 0.1, 0.25, 2.0));
        assert!(!is_dispersion_outlier(f64::NAN, 0.1, 0.25, 2.0));
    }
}
