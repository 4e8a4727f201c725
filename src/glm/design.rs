//! Two-group design `~ group` and the 2x2 algebra it needs

use crate::error::{PipelineError, Result};

/// Intercept plus one 0/1 indicator marking the numerator group.
///
/// Column 0 is the intercept (denominator mean on the log scale), column 1
/// the log fold change of the numerator over the denominator.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoGroupDesign {
    numerator: Vec<bool>,
}

impl TwoGroupDesign {
    pub const N_COEFS: usize = 2;

    /// Both groups must be non-empty
    pub fn new(numerator: Vec<bool>) -> Result<Self> {
        let n_num = numerator.iter().filter(|&&x| x).count();
        if n_num == 0 || n_num == numerator.len() {
            return Err(PipelineError::InvalidInput {
                reason: format!(
                    "two-group design needs samples in both groups ({} numerator of {})",
                    n_num,
                    numerator.len()
                ),
            });
        }
        Ok(Self { numerator })
    }

    pub fn n_samples(&self) -> usize {
        self.numerator.len()
    }

    /// Design value of column 1 for sample `i`
    pub fn indicator(&self, i: usize) -> f64 {
        if self.numerator[i] {
            1.0
        } else {
            0.0
        }
    }

    pub fn is_numerator(&self, i: usize) -> bool {
        self.numerator[i]
    }

    /// Residual degrees of freedom (m - p)
    pub fn residual_df(&self) -> usize {
        self.n_samples().saturating_sub(Self::N_COEFS)
    }

    /// Linear predictor x_i' beta
    pub fn eta(&self, i: usize, beta: &[f64; 2]) -> f64 {
        beta[0] + self.indicator(i) * beta[1]
    }

    /// X' diag(w) X
    pub fn gram(&self, weights: &[f64]) -> Sym2 {
        let mut g = Sym2::default();
        for (i, &w) in weights.iter().enumerate() {
            let x = self.indicator(i);
            g.a += w;
            g.b += w * x;
            g.d += w * x * x;
        }
        g
    }

    /// X' diag(w) z
    pub fn cross(&self, weights: &[f64], z: &[f64]) -> [f64; 2] {
        let mut out = [0.0; 2];
        for (i, (&w, &zi)) in weights.iter().zip(z).enumerate() {
            out[0] += w * zi;
            out[1] += w * self.indicator(i) * zi;
        }
        out
    }

    /// Per-sample fitted values of the ordinary least squares fit, i.e. group means
    pub fn group_means(&self, y: &[f64]) -> Vec<f64> {
        let (mut sum, mut n) = ([0.0; 2], [0usize; 2]);
        for (i, &v) in y.iter().enumerate() {
            let g = self.numerator[i] as usize;
            sum[g] += v;
            n[g] += 1;
        }
        let means = [sum[0] / n[0] as f64, sum[1] / n[1] as f64];
        self.numerator.iter().map(|&g| means[g as usize]).collect()
    }
}

/// Symmetric 2x2 matrix [[a, b], [b, d]]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sym2 {
    pub a: f64,
    pub b: f64,
    pub d: f64,
}

impl Sym2 {
    pub fn det(&self) -> f64 {
        self.a * self.d - self.b * self.b
    }

    pub fn with_ridge(mut self, lambda: f64) -> Self {
        self.a += lambda;
        self.d += lambda;
        self
    }

    pub fn inverse(&self) -> Option<Sym2> {
        let det = self.det();
        if det.abs() < 1e-300 || !det.is_finite() {
            return None;
        }
        Some(Sym2 {
            a: self.d / det,
            b: -self.b / det,
            d: self.a / det,
        })
    }

    pub fn solve(&self, rhs: [f64; 2]) -> Option<[f64; 2]> {
        let inv = self.inverse()?;
        Some([inv.a * rhs[0] + inv.b * rhs[1], inv.b * rhs[0] + inv.d * rhs[1]])
    }

    /// Product A * B
    fn mul(&self, other: &Sym2) -> [[f64; 2]; 2] {
        [
            [self.a * other.a + self.b * other.b, self.a * other.b + self.b * other.d],
            [self.b * other.a + self.d * other.b, self.b * other.b + self.d * other.d],
        ]
    }

    /// Diagonal of A * M * A
    pub fn sandwich_diag(&self, middle: &Sym2) -> [f64; 2] {
        let am = self.mul(middle);
        [
            am[0][0] * self.a + am[0][1] * self.b,
            am[1][0] * self.b + am[1][1] * self.d,
        ]
    }

    /// tr(A^-1 B)
    pub fn trace_inv_times(&self, other: &Sym2) -> Option<f64> {
        let det = self.det();
        if det.abs() <= 1e-10 {
            return None;
        }
        Some((self.d * other.a + self.a * other.d - 2.0 * self.b * other.b) / det)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_design_requires_both_groups() {
        assert!(TwoGroupDesign::new(vec![true, true]).is_err());
        assert!(TwoGroupDesign::new(vec![false, false]).is_err());
        let d = TwoGroupDesign::new(vec![false, false, true, true]).unwrap();
        assert_eq!(d.residual_df(), 2);
        assert_eq!(d.eta(2, &[1.0, 0.5]), 1.5);
        assert_eq!(d.eta(0, &[1.0, 0.5]), 1.0);
    }

    #[test]
    fn test_group_means() {
        let d = TwoGroupDesign::new(vec![false, true, false, true]).unwrap();
        assert_eq!(d.group_means(&[1.0, 10.0, 3.0, 20.0]), vec![2.0, 15.0, 2.0, 15.0]);
    }

    #[test]
    fn test_solve_and_inverse() {
        let m = Sym2 { a: 4.0, b: 1.0, d: 3.0 };
        let x = m.solve([1.0, 2.0]).unwrap();
        assert!((4.0 * x[0] + x[1] - 1.0).abs() < 1e-12);
        assert!((x[0] + 3.0 * x[1] - 2.0).abs() < 1e-12);
        assert!(Sym2 { a: 1.0, b: 1.0, d: 1.0 }.inverse().is_none());
    }

    #[test]
    fn test_sandwich_without_ridge_is_inverse() {
        let m = Sym2 { a: 4.0, b: 1.0, d: 3.0 };
        let inv = m.inverse().unwrap();
        let diag = inv.sandwich_diag(&m);
        assert!((diag[0] - inv.a).abs() < 1e-12);
        assert!((diag[1] - inv.d).abs() < 1e-12);
    }
}
