//! Differential expression across comparison pairs
//!
//! Every pair of (drug, hours) groups selected by [`enumerate_comparisons`]
//! is fitted independently on the filtered matrix of one kind. Pairs run in
//! parallel and each produces its own [`ComparisonResult`]; a pair whose
//! groups are too small is recorded as skipped instead of failing the run.

mod comparisons;
mod engine;
mod summary;

pub use comparisons::{enumerate_comparisons, ComparisonMode, ComparisonPair};
pub use engine::{check_replicates, run_comparison, ComparisonResult, GeneResult};
pub use summary::{deg_counts, differentially_expressed, percentile_counts, DegCount, PercentileCount};

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::data::{ExpressionMatrix, GroupKey, MatrixKind, Metadata};
use crate::error::{PipelineError, Result};
use crate::io::{format_f64, write_csv_atomic};

/// What happened to one enumerated pair
#[derive(Debug, Clone, PartialEq)]
pub enum PairStatus {
    Tested,
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub pair: ComparisonPair,
    pub n_numerator: usize,
    pub n_denominator: usize,
    pub status: PairStatus,
}

/// All comparisons of one matrix kind
#[derive(Debug, Clone)]
pub struct DeRun {
    pub kind: MatrixKind,
    pub outcomes: Vec<PairOutcome>,
    /// Tested pairs, in enumeration order
    pub results: Vec<ComparisonResult>,
}

impl DeRun {
    /// Union of genes with padj below `alpha` in any tested pair
    pub fn significant_genes(&self, alpha: f64) -> BTreeSet<String> {
        self.results
            .iter()
            .flat_map(|r| differentially_expressed(r, alpha))
            .map(|g| g.gene_id.clone())
            .collect()
    }
}

/// Enumerate and run every comparison pair on `matrix`
pub fn run_differential_expression(
    matrix: &ExpressionMatrix,
    metadata: &Metadata,
    config: &PipelineConfig,
) -> Result<DeRun> {
    let context = format!("differential expression ({})", matrix.kind());
    let sample_of_column = metadata.resolve_all(matrix.sample_labels(), &context)?;
    let column_of_sample: HashMap<usize, usize> = sample_of_column
        .iter()
        .enumerate()
        .map(|(col, &s)| (s, col))
        .collect();
    let groups = metadata.groups(&sample_of_column);
    let pairs = enumerate_comparisons(&groups, metadata, config);
    log::info!("{}: {} comparison pairs", context, pairs.len());

    let columns = |key: &GroupKey| -> Vec<usize> {
        groups
            .get(key)
            .map(|samples| samples.iter().map(|s| column_of_sample[s]).collect())
            .unwrap_or_default()
    };

    let run_all = || -> Vec<(PairOutcome, Result<ComparisonResult>)> {
        pairs
            .par_iter()
            .map(|pair| {
                let numerator = columns(&pair.numerator);
                let denominator = columns(&pair.denominator);
                let outcome = PairOutcome {
                    pair: pair.clone(),
                    n_numerator: numerator.len(),
                    n_denominator: denominator.len(),
                    status: PairStatus::Tested,
                };
                let result = run_comparison(matrix, pair, &numerator, &denominator, &config.de);
                (outcome, result)
            })
            .collect()
    };

    let runs = if config.de.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.de.threads)
            .build()
            .map_err(|e| PipelineError::InvalidConfig {
                reason: format!("cannot start {} worker threads: {}", config.de.threads, e),
            })?
            .install(run_all)
    } else {
        run_all()
    };

    let mut outcomes = Vec::with_capacity(runs.len());
    let mut results = Vec::new();
    for (mut outcome, result) in runs {
        match result {
            Ok(result) => {
                log::debug!("{}: {} of {} genes tested", outcome.pair, result.n_tested(), result.genes.len());
                results.push(result);
            }
            Err(e) if !e.is_fatal() => {
                log::warn!("Skipping {}: {}", outcome.pair, e);
                outcome.status = PairStatus::Skipped { reason: e.to_string() };
            }
            Err(e) => return Err(e),
        }
        outcomes.push(outcome);
    }

    Ok(DeRun {
        kind: matrix.kind(),
        outcomes,
        results,
    })
}

/// Write `deseq2_compared_pairs_{kind}.csv`
pub fn write_compared_pairs<P: AsRef<Path>>(path: P, run: &DeRun) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record([
            "comparison",
            "mode",
            "numerator",
            "denominator",
            "n_numerator",
            "n_denominator",
            "status",
            "reason",
        ])?;
        for o in &run.outcomes {
            let (status, reason) = match &o.status {
                PairStatus::Tested => ("tested", ""),
                PairStatus::Skipped { reason } => ("skipped", reason.as_str()),
            };
            w.write_record([
                o.pair.id().as_str(),
                o.pair.mode.tag(),
                o.pair.numerator.to_string().as_str(),
                o.pair.denominator.to_string().as_str(),
                o.n_numerator.to_string().as_str(),
                o.n_denominator.to_string().as_str(),
                status,
                reason,
            ])?;
        }
        Ok(())
    })
}

const RESULT_COLUMNS: [&str; 7] = ["comparison", "base_mean", "log2_fold_change", "lfc_se", "stat", "pvalue", "padj"];

fn write_gene_results<'a, P, I>(path: P, config: &PipelineConfig, rows: I) -> Result<()>
where
    P: AsRef<Path>,
    I: Iterator<Item = (&'a ComparisonResult, &'a GeneResult)>,
{
    write_csv_atomic(path, |w| {
        let mut header = vec![config.gene_col.as_str()];
        header.extend(RESULT_COLUMNS);
        w.write_record(&header)?;
        for (result, g) in rows {
            w.write_record([
                g.gene_id.clone(),
                result.pair.id(),
                format_f64(g.base_mean),
                format_f64(g.wald.log2_fold_change),
                format_f64(g.wald.lfc_se),
                format_f64(g.wald.stat),
                format_f64(g.wald.pvalue),
                format_f64(g.padj),
            ])?;
        }
        Ok(())
    })
}

/// Write `deseq2_results_{kind}.csv`: every gene of every tested pair
pub fn write_results<P: AsRef<Path>>(path: P, run: &DeRun, config: &PipelineConfig) -> Result<()> {
    write_gene_results(
        path,
        config,
        run.results.iter().flat_map(|r| r.genes.iter().map(move |g| (r, g))),
    )
}

/// Write `deseq2_degs_results_{kind}.csv`: rows with padj below `deg_alpha`
pub fn write_degs<P: AsRef<Path>>(path: P, run: &DeRun, config: &PipelineConfig) -> Result<()> {
    let alpha = config.de.deg_alpha;
    write_gene_results(
        path,
        config,
        run.results
            .iter()
            .flat_map(move |r| differentially_expressed(r, alpha).into_iter().map(move |g| (r, g))),
    )
}

/// Write `deg_counts_{kind}.csv`; skipped pairs are absent
pub fn write_deg_counts<P: AsRef<Path>>(path: P, run: &DeRun, config: &PipelineConfig) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record(["comparison", "threshold", "n_significant", "n_up", "n_down"])?;
        for result in &run.results {
            for c in deg_counts(result, &config.de.alpha_thresholds) {
                w.write_record([
                    c.comparison,
                    format_f64(c.threshold),
                    c.n_significant.to_string(),
                    c.n_up.to_string(),
                    c.n_down.to_string(),
                ])?;
            }
        }
        Ok(())
    })
}

/// Write `deseq2_percentile_counts_{kind}.csv`
pub fn write_percentile_counts<P: AsRef<Path>>(path: P, run: &DeRun, config: &PipelineConfig) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record(["comparison", "percentile", "n_top", "n_significant"])?;
        for result in &run.results {
            for c in percentile_counts(result, &config.de.percentiles, config.de.deg_alpha) {
                w.write_record([
                    c.comparison,
                    format_f64(c.percentile),
                    c.n_top.to_string(),
                    c.n_significant.to_string(),
                ])?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Sample, SampleKey};
    use ndarray::Array2;
    use std::fs;
    use tempfile::TempDir;

    fn sample(drug: &str, hours: u32, id: &str) -> Sample {
        let config = PipelineConfig::default();
        Sample {
            key: SampleKey {
                drug: drug.to_string(),
                hours,
                sample: id.to_string(),
                duplicate_id: "1".to_string(),
            },
            is_control: config.is_control(drug),
            is_vehicle: config.is_vehicle(drug),
            response: None,
        }
    }

    /// untreated@24 x3, drugx@24 x3, drugy@24 x1
    fn fixture() -> (ExpressionMatrix, Metadata) {
        let meta = Metadata::new(vec![
            sample("untreated", 24, "u1"),
            sample("untreated", 24, "u2"),
            sample("untreated", 24, "u3"),
            sample("drugx", 24, "x1"),
            sample("drugx", 24, "x2"),
            sample("drugx", 24, "x3"),
            sample("drugy", 24, "y1"),
        ])
        .unwrap();
        let labels = meta.labels().to_vec();
        // label order: drugx x3, drugy, untreated x3
        let rows = [
            [160.0, 150.0, 170.0, 12.0, 10.0, 12.0, 11.0],
            [101.0, 99.0, 100.0, 100.0, 100.0, 102.0, 98.0],
            [201.0, 199.0, 202.0, 200.0, 200.0, 198.0, 205.0],
            [50.0, 52.0, 48.0, 50.0, 50.0, 51.0, 49.0],
        ];
        let values = Array2::from_shape_fn((4, 7), |(i, j)| rows[i][j]);
        let genes: Vec<String> = ["G1", "H1", "H2", "H3"].iter().map(|s| s.to_string()).collect();
        let matrix = ExpressionMatrix::new(MatrixKind::NormalizedReads, values, genes.clone(), genes, labels).unwrap();
        (matrix, meta)
    }

    #[test]
    fn test_small_group_is_skipped_not_fatal() {
        let (matrix, meta) = fixture();
        let run = run_differential_expression(&matrix, &meta, &PipelineConfig::default()).unwrap();
        assert_eq!(run.outcomes.len(), 2);
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].pair.id(), "drugx@24_vs_untreated@24");
        let skipped = run.outcomes.iter().find(|o| o.pair.numerator.drug == "drugy").unwrap();
        assert!(matches!(skipped.status, PairStatus::Skipped { .. }));

        let significant = run.significant_genes(0.05);
        assert!(significant.contains("G1"));
        assert!(!significant.contains("H1"));
    }

    #[test]
    fn test_counts_tables_omit_skipped_pairs() {
        let (matrix, meta) = fixture();
        let config = PipelineConfig::default();
        let run = run_differential_expression(&matrix, &meta, &config).unwrap();
        let dir = TempDir::new().unwrap();

        write_compared_pairs(dir.path().join("pairs.csv"), &run).unwrap();
        write_deg_counts(dir.path().join("counts.csv"), &run, &config).unwrap();
        write_degs(dir.path().join("degs.csv"), &run, &config).unwrap();

        let pairs = fs::read_to_string(dir.path().join("pairs.csv")).unwrap();
        assert!(pairs.contains("drugy@24_vs_untreated@24,same_timepoint"));
        assert!(pairs.contains(",skipped,"));

        let counts = fs::read_to_string(dir.path().join("counts.csv")).unwrap();
        assert!(!counts.contains("drugy"));
        assert_eq!(counts.lines().count(), 1 + config.de.alpha_thresholds.len());

        let degs = fs::read_to_string(dir.path().join("degs.csv")).unwrap();
        assert!(degs.starts_with("gene_id,comparison,"));
        assert!(degs.lines().any(|l| l.starts_with("G1,drugx@24_vs_untreated@24,")));
    }

    #[test]
    fn test_thread_count_is_honoured() {
        let (matrix, meta) = fixture();
        let mut config = PipelineConfig::default();
        config.de.threads = 2;
        let run = run_differential_expression(&matrix, &meta, &config).unwrap();
        assert_eq!(run.results.len(), 1);
    }
}
