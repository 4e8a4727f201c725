//! Gene-wise dispersion estimation using Cox-Reid adjusted profile likelihood

use statrs::function::gamma::{digamma, ln_gamma};

use crate::dispersion::DispersionParams;
use crate::glm::{TwoGroupDesign, MIN_MU};
use crate::stats::{mean, variance};

/// Hard bounds on proposals of log(alpha) during the line search
const MIN_LOG_ALPHA_HARD: f64 = -30.0;
const MAX_LOG_ALPHA_HARD: f64 = 10.0;
/// Armijo sufficient-increase constant
const EPSILON: f64 = 1e-4;

/// Gene-wise estimate and the fitted means it was profiled at
#[derive(Debug, Clone)]
pub struct GeneDispersion {
    pub alpha: f64,
    /// Fitted means per sample; reused by the MAP step
    pub mu: Vec<f64>,
}

/// Upper bound on dispersions: max(m, 10)
pub fn max_dispersion(n_samples: usize) -> f64 {
    (n_samples as f64).max(10.0)
}

/// Cox-Reid adjusted log-likelihood of log(alpha) at fixed means
pub(crate) fn cox_reid_log_likelihood(counts: &[f64], design: &TwoGroupDesign, mu: &[f64], log_alpha: f64) -> f64 {
    let alpha = log_alpha.exp();
    let alpha_inv = 1.0 / alpha;
    let mut ll = 0.0;
    let mut weights = Vec::with_capacity(counts.len());
    for (&y, &m) in counts.iter().zip(mu) {
        let m = m.max(1e-10);
        ll += ln_gamma(y + alpha_inv) - ln_gamma(alpha_inv) - y * (m + alpha_inv).ln()
            - alpha_inv * (1.0 + m * alpha).ln();
        weights.push(1.0 / (1.0 / m + alpha));
    }

    let det = design.gram(&weights).det();
    let cr_term = if det > 1e-10 { -0.5 * det.ln() } else { 0.0 };
    ll + cr_term
}

/// Derivative of [`cox_reid_log_likelihood`] with respect to log(alpha)
pub(crate) fn d_cox_reid_log_likelihood(counts: &[f64], design: &TwoGroupDesign, mu: &[f64], log_alpha: f64) -> f64 {
    let alpha = log_alpha.exp();
    let alpha_sq = alpha * alpha;
    let alpha_inv = 1.0 / alpha;

    let mut dll = 0.0;
    let mut w = Vec::with_capacity(counts.len());
    let mut dw = Vec::with_capacity(counts.len());
    for (&y, &m) in counts.iter().zip(mu) {
        let m = m.max(1e-10);
        dll += -digamma(y + alpha_inv) / alpha_sq + digamma(alpha_inv) / alpha_sq
            + y / (alpha_sq * (m + alpha_inv))
            + (1.0 + m * alpha).ln() / alpha_sq
            - m / (alpha * (1.0 + m * alpha));
        let wi = 1.0 / (1.0 / m + alpha);
        w.push(wi);
        dw.push(-wi * wi);
    }

    // d/dalpha of -0.5 log|X'WX| = -0.5 tr((X'WX)^-1 X' dW X)
    let dcr = design
        .gram(&w)
        .trace_inv_times(&design.gram(&dw))
        .map_or(0.0, |tr| -0.5 * tr);

    (dll + dcr) * alpha
}

/// Outcome of an Armijo line search in log(alpha)
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineSearch {
    pub log_alpha: f64,
    pub initial_lp: f64,
    pub last_lp: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Gradient ascent with backtracking on a log-posterior in log(alpha).
///
/// Steps are accepted under the Armijo rule; kappa grows by 1.1 (capped at
/// `kappa_0`) after an accepted step and halves every fifth acceptance and
/// on every rejection.
pub(crate) fn armijo_line_search<F, G>(lp_fn: F, dlp_fn: G, start: f64, params: &DispersionParams) -> LineSearch
where
    F: Fn(f64) -> f64,
    G: Fn(f64) -> f64,
{
    let min_log_alpha = (params.min_disp / 10.0).ln();
    let mut log_alpha = start;
    let initial_lp = lp_fn(log_alpha);
    let mut lp = initial_lp;
    let mut dlp = dlp_fn(log_alpha);
    let mut kappa = params.kappa_0;
    let mut accepted = 0;

    for iter in 0..params.maxit {
        let raw = log_alpha + kappa * dlp;
        if raw < MIN_LOG_ALPHA_HARD {
            kappa = (MIN_LOG_ALPHA_HARD - log_alpha) / dlp;
        }
        if raw > MAX_LOG_ALPHA_HARD {
            kappa = (MAX_LOG_ALPHA_HARD - log_alpha) / dlp;
        }
        let proposal = log_alpha + kappa * dlp;
        let lp_proposal = lp_fn(proposal);

        if -lp_proposal <= -lp - kappa * EPSILON * dlp * dlp {
            accepted += 1;
            log_alpha = proposal;
            let change = lp_proposal - lp;
            lp = lp_proposal;
            if change < params.disp_tol || log_alpha < min_log_alpha {
                return LineSearch {
                    log_alpha,
                    initial_lp,
                    last_lp: lp,
                    iterations: iter + 1,
                    converged: true,
                };
            }
            dlp = dlp_fn(log_alpha);
            kappa = (kappa * 1.1).min(params.kappa_0);
            if accepted % 5 == 0 {
                kappa /= 2.0;
            }
        } else {
            kappa /= 2.0;
        }
    }

    LineSearch {
        log_alpha,
        initial_lp,
        last_lp: lp,
        iterations: params.maxit,
        converged: false,
    }
}

/// Coarse-then-fine grid maximisation of a log-posterior over log(alpha)
pub(crate) fn grid_search<F: Fn(f64) -> f64>(lp_fn: F, min_log_alpha: f64, max_log_alpha: f64) -> f64 {
    const N_GRID: usize = 20;
    let argmax = |lo: f64, hi: f64| -> (f64, f64) {
        let step = (hi - lo) / (N_GRID - 1) as f64;
        (0..N_GRID)
            .map(|i| lo + i as f64 * step)
            .map(|x| (x, lp_fn(x)))
            .fold((lo, f64::NEG_INFINITY), |best, (x, lp)| if lp > best.1 { (x, lp) } else { best })
    };

    let delta = (max_log_alpha - min_log_alpha) / (N_GRID - 1) as f64;
    let (coarse, _) = argmax(min_log_alpha, max_log_alpha);
    let (fine, _) = argmax(coarse - delta, coarse + delta);
    fine.exp()
}

/// Moment estimate sum(((y - mu)^2 - mu) / mu^2) / (m - p) on normalized
/// counts with group-mean fits floored at 1
fn rough_disp_estimate(normalized: &[f64], design: &TwoGroupDesign) -> f64 {
    let mu = design.group_means(normalized);
    let sum: f64 = normalized
        .iter()
        .zip(&mu)
        .map(|(&y, &m)| {
            let m = m.max(1.0);
            ((y - m).powi(2) - m) / (m * m)
        })
        .sum();
    (sum / design.residual_df().max(1) as f64).max(0.0)
}

/// (variance - xim * mean) / mean^2 over all samples
fn moments_disp_estimate(normalized: &[f64], xim: f64) -> f64 {
    let base_mean = mean(normalized);
    if base_mean > 1e-10 {
        (variance(normalized) - xim * base_mean) / (base_mean * base_mean)
    } else {
        f64::INFINITY
    }
}

/// Group means of the normalized counts scaled back by the size factors
fn linear_model_mu(normalized: &[f64], size_factors: &[f64], design: &TwoGroupDesign) -> Vec<f64> {
    design
        .group_means(normalized)
        .iter()
        .zip(size_factors)
        .map(|(&m, &s)| (m * s).max(MIN_MU))
        .collect()
}

/// Gene-wise maximum of the Cox-Reid adjusted likelihood.
///
/// Starts at min(rough, moments) estimate; keeps the start when the search
/// did not improve the likelihood, and falls back to a grid when it did not
/// converge. All-zero genes get NaN.
pub fn estimate_dispersion_gene(
    counts: &[f64],
    size_factors: &[f64],
    design: &TwoGroupDesign,
    xim: f64,
    params: &DispersionParams,
) -> GeneDispersion {
    let n = counts.len();
    if counts.iter().all(|&c| c == 0.0) {
        return GeneDispersion {
            alpha: f64::NAN,
            mu: vec![0.0; n],
        };
    }

    let max_disp = max_dispersion(n);
    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&c, &s)| c / s).collect();
    let alpha_init = rough_disp_estimate(&normalized, design)
        .min(moments_disp_estimate(&normalized, xim))
        .clamp(params.min_disp, max_disp);
    let mu = linear_model_mu(&normalized, size_factors, design);

    let lp = |a: f64| cox_reid_log_likelihood(counts, design, &mu, a);
    let dlp = |a: f64| d_cox_reid_log_likelihood(counts, design, &mu, a);
    let start = alpha_init.ln().clamp(MIN_LOG_ALPHA_HARD, max_disp.ln());
    let search = armijo_line_search(lp, dlp, start, params);

    let no_increase = search.last_lp < search.initial_lp + search.initial_lp.abs() / 1e6;
    let mut alpha = if no_increase {
        alpha_init
    } else {
        search.log_alpha.exp()
    };

    let converged = search.iterations < params.maxit && search.iterations != 1;
    if !converged && alpha > params.min_disp * 10.0 {
        alpha = grid_search(lp, params.min_disp.ln(), max_disp.ln());
    }

    GeneDispersion {
        alpha: alpha.clamp(params.min_disp, max_disp),
        mu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design() -> TwoGroupDesign {
        TwoGroupDesign::new(vec![false, false, false, true, true, true]).unwrap()
    }

    fn xim(sf: &[f64]) -> f64 {
        sf.iter().map(|s| 1.0 / s).sum::<f64>() / sf.len() as f64
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let counts = [25.0, 24.0, 25.0, 10.0, 20.0, 11.0];
        let mu = [24.0, 24.0, 24.0, 14.0, 14.0, 14.0];
        let d = design();
        for log_alpha in [-4.0, -2.0, 0.0] {
            let h = 1e-5;
            let numeric = (cox_reid_log_likelihood(&counts, &d, &mu, log_alpha + h)
                - cox_reid_log_likelihood(&counts, &d, &mu, log_alpha - h))
                / (2.0 * h);
            let analytic = d_cox_reid_log_likelihood(&counts, &d, &mu, log_alpha);
            assert!((numeric - analytic).abs() < 1e-4 * (1.0 + analytic.abs()));
        }
    }

    #[test]
    fn test_overdispersed_gene_gets_larger_estimate() {
        let sf = [1.0; 6];
        let params = DispersionParams::default();
        let tight = estimate_dispersion_gene(&[100.0, 102.0, 98.0, 200.0, 205.0, 195.0], &sf, &design(), xim(&sf), &params);
        let noisy = estimate_dispersion_gene(&[40.0, 180.0, 90.0, 80.0, 400.0, 150.0], &sf, &design(), xim(&sf), &params);
        assert!(tight.alpha > 0.0 && noisy.alpha > 0.0);
        assert!(noisy.alpha > tight.alpha);
        assert!(noisy.alpha <= max_dispersion(6));
    }

    #[test]
    fn test_all_zero_gene_is_nan() {
        let sf = [1.0; 6];
        let est = estimate_dispersion_gene(&[0.0; 6], &sf, &design(), 1.0, &DispersionParams::default());
        assert!(est.alpha.is_nan());
    }

    #[test]
    fn test_grid_search_finds_peak() {
        let peak = grid_search(|x| -(x + 2.0).powi(2), -10.0, 2.0);
        assert!((peak.ln() + 2.0).abs() < 0.1);
    }
}
