//! Significance tabulation across comparisons

use std::cmp::Ordering;

use crate::stats::cmp_f64;

use super::engine::{ComparisonResult, GeneResult};

/// Significant genes of one comparison at one threshold
#[derive(Debug, Clone, PartialEq)]
pub struct DegCount {
    pub comparison: String,
    pub threshold: f64,
    pub n_significant: usize,
    pub n_up: usize,
    pub n_down: usize,
}

/// Significant genes among the strongest fold changes of one comparison
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileCount {
    pub comparison: String,
    pub percentile: f64,
    /// Tested genes within the top `percentile` % by |log2FC|
    pub n_top: usize,
    pub n_significant: usize,
}

/// Genes with padj below `alpha`
pub fn differentially_expressed(result: &ComparisonResult, alpha: f64) -> Vec<&GeneResult> {
    result.genes.iter().filter(|g| g.is_significant(alpha)).collect()
}

pub fn deg_counts(result: &ComparisonResult, thresholds: &[f64]) -> Vec<DegCount> {
    thresholds
        .iter()
        .map(|&threshold| {
            let significant = differentially_expressed(result, threshold);
            DegCount {
                comparison: result.pair.id(),
                threshold,
                n_significant: significant.len(),
                n_up: significant.iter().filter(|g| g.wald.log2_fold_change > 0.0).count(),
                n_down: significant.iter().filter(|g| g.wald.log2_fold_change < 0.0).count(),
            }
        })
        .collect()
}

/// For each percentile p, how many of the ceil(p% of tested) genes with the
/// largest |log2FC| are also significant at `alpha`
pub fn percentile_counts(result: &ComparisonResult, percentiles: &[f64], alpha: f64) -> Vec<PercentileCount> {
    let mut tested: Vec<&GeneResult> = result
        .genes
        .iter()
        .filter(|g| g.is_tested() && g.wald.log2_fold_change.is_finite())
        .collect();
    tested.sort_by(|a, b| {
        match cmp_f64(&b.wald.log2_fold_change.abs(), &a.wald.log2_fold_change.abs()) {
            Ordering::Equal => a.gene_id.cmp(&b.gene_id),
            other => other,
        }
    });

    percentiles
        .iter()
        .map(|&percentile| {
            let n_top = ((percentile / 100.0) * tested.len() as f64).ceil() as usize;
            let n_top = n_top.min(tested.len());
            PercentileCount {
                comparison: result.pair.id(),
                percentile,
                n_top,
                n_significant: tested[..n_top].iter().filter(|g| g.is_significant(alpha)).count(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GroupKey;
    use crate::de::{ComparisonMode, ComparisonPair};
    use crate::dispersion::DispersionTrend;
    use crate::testing::WaldResult;

    fn gene(id: &str, lfc: f64, padj: f64) -> GeneResult {
        GeneResult {
            gene_id: id.to_string(),
            base_mean: 10.0,
            dispersion: 0.1,
            wald: WaldResult {
                log2_fold_change: lfc,
                lfc_se: 0.1,
                stat: lfc / 0.1,
                pvalue: if padj.is_nan() { f64::NAN } else { padj / 2.0 },
            },
            padj,
            converged: true,
        }
    }

    fn result() -> ComparisonResult {
        let key = |drug: &str| GroupKey {
            drug: drug.to_string(),
            hours: 24,
        };
        ComparisonResult {
            pair: ComparisonPair {
                mode: ComparisonMode::SameTimepoint,
                numerator: key("drugx"),
                denominator: key("untreated"),
            },
            n_numerator: 3,
            n_denominator: 3,
            size_factors: vec![1.0; 6],
            trend: DispersionTrend::Mean(0.1),
            prior_var: 0.25,
            genes: vec![
                gene("A", 3.0, 0.001),
                gene("B", -2.0, 0.03),
                gene("C", 0.5, 0.5),
                gene("D", -0.1, 0.9),
                gene("E", f64::NAN, f64::NAN),
            ],
        }
    }

    #[test]
    fn test_deg_counts_split_direction() {
        let counts = deg_counts(&result(), &[0.05, 0.01]);
        assert_eq!(counts[0].n_significant, 2);
        assert_eq!((counts[0].n_up, counts[0].n_down), (1, 1));
        assert_eq!(counts[1].n_significant, 1);
        assert_eq!(counts[1].comparison, "drugx@24_vs_untreated@24");
    }

    #[test]
    fn test_percentiles_rank_tested_genes_by_abs_lfc() {
        let counts = percentile_counts(&result(), &[25.0, 50.0, 100.0], 0.05);
        // four tested genes: A, B, C, D
        assert_eq!((counts[0].n_top, counts[0].n_significant), (1, 1));
        assert_eq!((counts[1].n_top, counts[1].n_significant), (2, 2));
        assert_eq!((counts[2].n_top, counts[2].n_significant), (4, 2));
    }
}
