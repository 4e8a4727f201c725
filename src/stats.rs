//! Statistical utility functions shared across modules

use std::cmp::Ordering;

/// R's `mad()` consistency constant
const MAD_CONSTANT: f64 = 1.4826;

/// Total order on floats for sorting; NaN sorts last
pub fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Sample variance (n - 1 denominator)
pub fn variance(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let m = mean(x);
    x.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / (x.len() - 1) as f64
}

pub fn sd(x: &[f64]) -> f64 {
    variance(x).sqrt()
}

pub fn median(x: &[f64]) -> f64 {
    quantile(x, 0.5)
}

/// Quantile with linear interpolation between order statistics (R type 7)
pub fn quantile(x: &[f64], prob: f64) -> f64 {
    let mut sorted: Vec<f64> = x.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(cmp_f64);
    let h = (sorted.len() - 1) as f64 * prob.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Median absolute deviation, squared, scaled like R's `mad()`
pub fn mad_squared(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let center = median(x);
    let deviations: Vec<f64> = x.iter().map(|&v| (v - center).abs()).collect();
    let mad = median(&deviations) * MAD_CONSTANT;
    mad * mad
}

/// Pearson correlation; 0 when either side has no variance
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx <= f64::EPSILON * n as f64 || syy <= f64::EPSILON * n as f64 {
        return 0.0;
    }
    (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
}

/// Trigamma function (derivative of digamma)
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }
    let mut acc = 0.0;
    let mut z = x;
    while z < 8.0 {
        acc += 1.0 / (z * z);
        z += 1.0;
    }
    let z2 = z * z;
    let z3 = z2 * z;
    acc + 1.0 / z + 0.5 / z2 + 1.0 / (6.0 * z3) - 1.0 / (30.0 * z3 * z2) + 1.0 / (42.0 * z3 * z2 * z2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_type7() {
        let x = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(median(&x), 3.0);
        assert_eq!(quantile(&x, 0.25), 2.0);
        assert!((quantile(&[1.0, 2.0], 0.5) - 1.5).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_variance_and_sd() {
        let x = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((variance(&x) - 32.0 / 7.0).abs() < 1e-12);
        assert!((sd(&x) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(variance(&[3.0]), 0.0);
    }

    #[test]
    fn test_pearson() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((pearson(&x, &[2.0, 4.0, 6.0, 8.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&x, &[8.0, 6.0, 4.0, 2.0]) + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&x, &[5.0, 5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_mad_squared() {
        // mad(c(1, 2, 3, 4, 100)) = 1.4826
        let m = mad_squared(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        assert!((m - MAD_CONSTANT * MAD_CONSTANT).abs() < 1e-12);
    }

    #[test]
    fn test_trigamma() {
        // trigamma(1) = pi^2 / 6
        let expected = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - expected).abs() < 1e-8);
        assert!((trigamma(0.5) - std::f64::consts::PI.powi(2) / 2.0).abs() < 1e-8);
    }

    #[test]
    fn test_cmp_nan_last() {
        let mut v = vec![2.0, f64::NAN, 1.0];
        v.sort_by(cmp_f64);
        assert_eq!(&v[..2], &[1.0, 2.0]);
        assert!(v[2].is_nan());
    }
}
