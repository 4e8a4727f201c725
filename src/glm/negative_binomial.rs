//! Negative binomial distribution utilities

use statrs::function::gamma::ln_gamma;

/// Lower bound on fitted means during GLM fitting
pub const MIN_MU: f64 = 0.5;

/// IRLS stops once any |beta| exceeds this (natural log scale)
pub const MAX_LFC_BETA: f64 = 30.0;

/// Clamp on the linear predictor to keep exp() finite
pub const MAX_ETA: f64 = 700.0;

/// mu = size_factor * exp(eta)
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// IRLS working weight mu / (1 + alpha * mu)
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

/// log P(Y = y) with mean `mu` and dispersion `alpha` (R's `dnbinom_mu(log = TRUE)`)
pub fn nb_log_density(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let size = 1.0 / alpha;
    let prob = size / (size + mu);
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0) + size * prob.ln() + y * (1.0 - prob).ln()
}

/// -2 * log-likelihood of a gene's counts
pub fn nb_deviance(counts: &[f64], mu: &[f64], alpha: f64) -> f64 {
    counts
        .iter()
        .zip(mu)
        .map(|(&y, &m)| -2.0 * nb_log_density(y, m, alpha))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean_scales_by_size_factor() {
        assert!((nb_mean(2.0, 1.5) - 1.5 * 2.0f64.exp()).abs() < 1e-10);
        assert!(nb_mean(1e6, 1.0).is_finite());
    }

    #[test]
    fn test_log_density_sums_to_one() {
        let total: f64 = (0..400).map(|k| nb_log_density(k as f64, 8.0, 0.2).exp()).sum();
        assert!((total - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_poisson_limit() {
        // Poisson(5) at 5: exp(-5) * 5^5 / 120
        let poisson = (-5.0f64).exp() * 5.0f64.powi(5) / 120.0;
        assert!((nb_log_density(5.0, 5.0, 1e-5).exp() - poisson).abs() < 1e-4);
    }

    #[test]
    fn test_weight() {
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-12);
    }
}
