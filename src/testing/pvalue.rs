//! P-value calculation from test statistics

use statrs::distribution::{ContinuousCDF, Normal};

/// Two-sided p-value of a standard normal statistic, 2 * pnorm(-|z|)
pub fn wald_pvalue(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| 2.0 * normal.cdf(-z.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pvalue_symmetric() {
        assert!((wald_pvalue(2.0) - wald_pvalue(-2.0)).abs() < 1e-15);
    }

    #[test]
    fn test_pvalue_known_values() {
        assert!((wald_pvalue(0.0) - 1.0).abs() < 1e-12);
        assert!((wald_pvalue(1.959964) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_pvalue_nonfinite() {
        assert!(wald_pvalue(f64::NAN).is_nan());
        assert!(wald_pvalue(f64::INFINITY).is_nan());
    }
}
