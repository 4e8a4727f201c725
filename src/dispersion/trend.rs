//! Dispersion-mean trend fitting

use crate::error::{PipelineError, Result};
use crate::stats::cmp_f64;

/// Fitted dispersion as a function of the mean of normalized counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispersionTrend {
    /// asympt_disp + extra_pois / mean
    Parametric { asympt_disp: f64, extra_pois: f64 },
    /// One value for every gene
    Mean(f64),
}

impl DispersionTrend {
    pub fn value(&self, base_mean: f64) -> f64 {
        match *self {
            DispersionTrend::Parametric { asympt_disp, extra_pois } => {
                if base_mean > 0.0 {
                    asympt_disp + extra_pois / base_mean
                } else {
                    asympt_disp
                }
            }
            DispersionTrend::Mean(value) => value,
        }
    }
}

/// Fit the trend: parametric gamma GLM first, trimmed mean when that fails
pub fn fit_dispersion_trend(base_means: &[f64], dispersions: &[f64], min_disp: f64) -> DispersionTrend {
    match fit_parametric_trend(base_means, dispersions, min_disp) {
        Ok(trend) => trend,
        Err(e) => {
            log::debug!("{}; using the mean dispersion", e);
            DispersionTrend::Mean(mean_dispersion(dispersions, min_disp))
        }
    }
}

/// Trimmed (0.1%) mean of estimates above 10 * min_disp
fn mean_dispersion(dispersions: &[f64], min_disp: f64) -> f64 {
    let mut valid: Vec<f64> = dispersions
        .iter()
        .copied()
        .filter(|&d| d.is_finite() && d > 10.0 * min_disp)
        .collect();
    if valid.is_empty() {
        let finite: Vec<f64> = dispersions.iter().copied().filter(|d| d.is_finite()).collect();
        return if finite.is_empty() {
            0.1
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
    }
    valid.sort_by(cmp_f64);
    let trim = (valid.len() as f64 * 0.001).floor() as usize;
    let kept = &valid[trim..valid.len() - trim];
    kept.iter().sum::<f64>() / kept.len() as f64
}

fn trend_failed(reason: impl Into<String>) -> PipelineError {
    PipelineError::NumericalInstability {
        operation: "parametric dispersion trend".to_string(),
        details: reason.into(),
    }
}

/// Iterative gamma GLM fit of dispersion ~ a0 + a1 / mean, refit on genes
/// whose residual dispersion / fit lies in (1e-4, 15)
fn fit_parametric_trend(base_means: &[f64], dispersions: &[f64], min_disp: f64) -> Result<DispersionTrend> {
    let data: Vec<(f64, f64)> = base_means
        .iter()
        .zip(dispersions)
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d > 100.0 * min_disp)
        .map(|(&m, &d)| (m, d))
        .collect();
    if data.len() < 3 {
        return Err(trend_failed(format!("{} usable genes", data.len())));
    }

    let mut coefs = (0.1_f64, 1.0_f64);
    for _ in 0..11 {
        let old = coefs;
        let good: Vec<(f64, f64)> = data
            .iter()
            .copied()
            .filter(|&(m, d)| {
                let fitted = coefs.0 + coefs.1 / m;
                fitted > 0.0 && d / fitted > 1e-4 && d / fitted < 15.0
            })
            .collect();
        if good.len() < 3 {
            return Err(trend_failed("fewer than 3 genes within the residual window"));
        }

        let (next, glm_converged) = fit_gamma_identity(&good, coefs);
        coefs = next;
        if coefs.0 <= 0.0 || coefs.1 <= 0.0 {
            return Err(trend_failed(format!(
                "coefficients not positive (a0 = {:.4}, a1 = {:.4})",
                coefs.0, coefs.1
            )));
        }

        let change = (coefs.0 / old.0).ln().powi(2) + (coefs.1 / old.1).ln().powi(2);
        if change < 1e-6 && glm_converged {
            return Ok(DispersionTrend::Parametric {
                asympt_disp: coefs.0,
                extra_pois: coefs.1,
            });
        }
    }
    Err(trend_failed("did not converge"))
}

fn gamma_deviance(data: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    data.iter()
        .map(|&(m, d)| {
            let mu = (a0 + a1 / m).max(1e-8);
            2.0 * (-(d / mu).ln() + (d - mu) / mu)
        })
        .sum()
}

/// Gamma GLM with identity link, y ~ 1 + 1/x, from the given start
fn fit_gamma_identity(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(data, a0, a1);

    for _ in 0..25 {
        let (mut sw, mut swx, mut swz, mut swxx, mut swxz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(m, d) in data {
            let x = 1.0 / m;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swz += w * d;
            swxx += w * x * x;
            swxz += w * x * d;
        }
        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-10 {
            break;
        }
        a0 = (swxx * swz - swx * swxz) / det;
        a1 = (sw * swxz - swx * swz) / det;

        let dev = gamma_deviance(data, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < 1e-8 {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }
    ((a0, a1), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parametric_trend_recovers_curve() {
        let means: Vec<f64> = (1..=200).map(|i| i as f64 * 5.0).collect();
        let disps: Vec<f64> = means
            .iter()
            .enumerate()
            .map(|(i, &m)| (0.05 + 2.0 / m) * if i % 2 == 0 { 1.2 } else { 0.8 })
            .collect();
        match fit_dispersion_trend(&means, &disps, 1e-8) {
            DispersionTrend::Parametric { asympt_disp, extra_pois } => {
                assert!((asympt_disp - 0.05).abs() < 0.02);
                assert!((extra_pois - 2.0).abs() < 0.8);
            }
            other => panic!("expected a parametric trend, got {:?}", other),
        }
    }

    #[test]
    fn test_few_genes_fall_back_to_mean() {
        let trend = fit_dispersion_trend(&[10.0, 20.0], &[0.1, 0.3], 1e-8);
        assert!(matches!(trend, DispersionTrend::Mean(_)));
        assert!((trend.value(1000.0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_mean_ignores_nan() {
        let trend = fit_dispersion_trend(&[10.0, 0.0, 5.0], &[0.4, f64::NAN, 1e-9], 1e-8);
        assert_eq!(trend, DispersionTrend::Mean(0.4));
    }
}
