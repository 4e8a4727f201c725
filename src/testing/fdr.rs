//! Benjamini-Hochberg adjustment for multiple testing

use crate::stats::cmp_f64;

/// BH adjusted p-values (R's `p.adjust(method = "BH")`).
///
/// NaN p-values are excluded from the number of tests and stay NaN.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let mut order: Vec<usize> = (0..n).filter(|&i| !pvalues[i].is_nan()).collect();
    let m = order.len();
    let mut padj = vec![f64::NAN; n];
    if m == 0 {
        return padj;
    }

    order.sort_by(|&a, &b| cmp_f64(&pvalues[a], &pvalues[b]));

    let mut cummin = f64::INFINITY;
    for (rank, &i) in order.iter().enumerate().rev() {
        let adj = (pvalues[i] * m as f64 / (rank + 1) as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
    }
    padj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_matches_p_adjust() {
        // p.adjust(c(0.01, 0.04, 0.03, 0.02), "BH") = 0.04 0.04 0.04 0.04
        let padj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.02]);
        for adj in padj {
            assert!((adj - 0.04).abs() < 1e-12);
        }

        // p.adjust(c(0.001, 0.01, 0.05, 0.1), "BH") = 0.004 0.02 0.0667 0.1
        let padj = benjamini_hochberg(&[0.001, 0.01, 0.05, 0.1]);
        let expected = [0.004, 0.02, 0.2 / 3.0, 0.1];
        for (a, e) in padj.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_bh_with_nan() {
        let padj = benjamini_hochberg(&[0.01, f64::NAN, 0.03, 0.02]);
        assert!(padj[1].is_nan());
        // three tests, not four
        assert!((padj[0] - 0.03).abs() < 1e-12);
        assert!((padj[2] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_bh_empty_and_all_nan() {
        assert!(benjamini_hochberg(&[]).is_empty());
        assert!(benjamini_hochberg(&[f64::NAN, f64::NAN]).iter().all(|p| p.is_nan()));
    }
}
