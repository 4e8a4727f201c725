//! Wald test of the group coefficient

use std::f64::consts::LN_2;

use super::pvalue::wald_pvalue;
use crate::glm::GlmFitResult;

/// Wald test of one gene on the log2 scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaldResult {
    pub log2_fold_change: f64,
    pub lfc_se: f64,
    pub stat: f64,
    pub pvalue: f64,
}

impl WaldResult {
    /// Untestable gene
    pub fn missing() -> Self {
        Self {
            log2_fold_change: f64::NAN,
            lfc_se: f64::NAN,
            stat: f64::NAN,
            pvalue: f64::NAN,
        }
    }
}

/// Test beta_1 = 0 for a fitted gene; a zero or non-finite standard error
/// leaves the statistic and p-value NaN
pub fn wald_test(fit: &GlmFitResult) -> WaldResult {
    let log2_fold_change = fit.beta[1] / LN_2;
    let lfc_se = fit.standard_errors[1] / LN_2;
    let stat = if lfc_se.is_finite() && lfc_se > 0.0 {
        fit.beta[1] / fit.standard_errors[1]
    } else {
        f64::NAN
    };
    WaldResult {
        log2_fold_change,
        lfc_se,
        stat,
        pvalue: wald_pvalue(stat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(beta1: f64, se1: f64) -> GlmFitResult {
        GlmFitResult {
            beta: [1.0, beta1],
            standard_errors: [0.1, se1],
            deviance: 0.0,
            converged: true,
            iterations: 3,
        }
    }

    #[test]
    fn test_log2_scale() {
        let result = wald_test(&fit(2.0 * LN_2, 0.5 * LN_2));
        assert!((result.log2_fold_change - 2.0).abs() < 1e-12);
        assert!((result.lfc_se - 0.5).abs() < 1e-12);
        assert!((result.stat - 4.0).abs() < 1e-12);
        assert!(result.pvalue < 1e-4);
    }

    #[test]
    fn test_zero_se_is_untestable() {
        let result = wald_test(&fit(1.0, 0.0));
        assert!(result.stat.is_nan());
        assert!(result.pvalue.is_nan());
    }
}
