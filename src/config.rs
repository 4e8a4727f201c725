//! Immutable pipeline configuration
//!
//! Column names, control values, thresholds and numerical parameters are
//! collected in one [`PipelineConfig`] value that is passed by reference to
//! every stage, so several runs with different settings can coexist in one
//! process.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Configuration of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Metadata column holding the treatment label
    pub control_col: String,
    /// Treatment label of the untreated control
    pub control_val: String,
    /// Treatment label of the vehicle control
    pub vehicle_control_val: String,
    /// Metadata column holding the sample identifier
    pub sample_col: String,
    /// Raw count column holding the source gene identifier
    pub raw_gene_col: String,
    /// Modelling matrix column holding the gene identifier
    pub gene_col: String,
    /// Metadata column holding the elapsed hours
    pub time_col: String,
    /// Metadata column holding the replicate identifier
    pub duplicate_col: String,
    /// Columns that identify one sample in the metadata
    pub groupby_cols: Vec<String>,
    /// Metadata column holding the measured response
    pub response_col: String,
    /// Compare each treatment against itself at the next allowed timepoint
    pub next_time_point_prediction: bool,
    /// Allow-list of "next" timepoints (hours)
    pub keep_next_tp: Vec<u32>,
    pub features: FeatureParams,
    pub baseline: BaselineParams,
    pub de: DeParams,
    pub enrichment: EnrichmentParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            control_col: "drug".to_string(),
            control_val: "untreated".to_string(),
            vehicle_control_val: "dmso".to_string(),
            sample_col: "sample".to_string(),
            raw_gene_col: "Name".to_string(),
            gene_col: "gene_id".to_string(),
            time_col: "hours".to_string(),
            duplicate_col: "duplicate_id".to_string(),
            groupby_cols: vec![
                "drug".to_string(),
                "hours".to_string(),
                "sample".to_string(),
                "duplicate_id".to_string(),
            ],
            response_col: "beat_per_min".to_string(),
            next_time_point_prediction: true,
            keep_next_tp: vec![48, 168],
            features: FeatureParams::default(),
            baseline: BaselineParams::default(),
            de: DeParams::default(),
            enrichment: EnrichmentParams::default(),
        }
    }
}

/// Delta-shape feature selection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Keep at most this many genes (after thresholding); `None` keeps all passing genes
    pub top_k: Option<usize>,
    /// Minimum delta-shape score for a gene to be selected
    pub min_score: f64,
    /// Minimum mean expression (in matrix units) for a gene to be eligible
    pub min_mean_expression: f64,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            top_k: Some(2000),
            min_score: 0.0,
            min_mean_expression: 1.0,
        }
    }
}

/// Baseline gene-set parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParams {
    /// Size of the random and top-correlated gene sets
    pub size: usize,
    /// Seed of the random gene-set generator
    pub seed: u32,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self { size: 100, seed: 42 }
    }
}

/// Differential expression parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeParams {
    /// Adjusted p-value thresholds tabulated in the counts table
    pub alpha_thresholds: Vec<f64>,
    /// Adjusted p-value threshold defining a DEG
    pub deg_alpha: f64,
    /// Percentiles (of genes ranked by |log2FC|) tabulated in the percentile table
    pub percentiles: Vec<f64>,
    /// Minimum samples per group
    pub min_replicates: usize,
    /// Worker threads for comparison pairs (0 = rayon default)
    pub threads: usize,
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// IRLS deviance convergence tolerance
    pub beta_tol: f64,
    /// Minimum dispersion value
    pub min_disp: f64,
    /// Dispersion line-search convergence tolerance
    pub disp_tol: f64,
    /// Maximum dispersion line-search iterations
    pub disp_maxit: usize,
}

impl Default for DeParams {
    fn default() -> Self {
        Self {
            alpha_thresholds: vec![0.05, 0.01],
            deg_alpha: 0.05,
            percentiles: vec![1.0, 5.0, 10.0, 25.0],
            min_replicates: 2,
            threads: 0,
            maxit: 100,
            beta_tol: 1e-8,
            min_disp: 1e-8,
            disp_tol: 1e-6,
            disp_maxit: 100,
        }
    }
}

/// Pathway enrichment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentParams {
    /// BH-adjusted hypergeometric threshold for a significant pathway
    pub pathway_alpha: f64,
    /// Minimum significant genes a pathway must contain
    pub min_pathway_hits: usize,
    /// Use the literature set alone when no pathway is hit
    pub literature_fallback: bool,
    /// Reference link template; `{id}` is replaced by the pathway identifier
    pub link_template: String,
}

impl Default for EnrichmentParams {
    fn default() -> Self {
        Self {
            pathway_alpha: 0.05,
            min_pathway_hits: 1,
            literature_fallback: true,
            link_template: "https://reactome.org/content/detail/{id}".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file; absent keys take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject contradictory settings before any stage runs
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(PipelineError::InvalidConfig { reason });

        for (name, value) in [
            ("control_col", &self.control_col),
            ("control_val", &self.control_val),
            ("sample_col", &self.sample_col),
            ("raw_gene_col", &self.raw_gene_col),
            ("gene_col", &self.gene_col),
            ("time_col", &self.time_col),
            ("duplicate_col", &self.duplicate_col),
            ("response_col", &self.response_col),
        ] {
            if value.trim().is_empty() {
                return invalid(format!("{} must not be empty", name));
            }
        }
        if self.control_val.eq_ignore_ascii_case(&self.vehicle_control_val) {
            return invalid("control_val and vehicle_control_val must differ".to_string());
        }
        for col in [&self.control_col, &self.time_col, &self.sample_col, &self.duplicate_col] {
            if !self.groupby_cols.contains(col) {
                return invalid(format!("groupby_cols must contain '{}'", col));
            }
        }
        if self.next_time_point_prediction && self.keep_next_tp.is_empty() {
            return invalid("keep_next_tp is empty while next_time_point_prediction is enabled".to_string());
        }
        if self.features.top_k == Some(0) {
            return invalid("features.top_k must be positive".to_string());
        }
        if self.baseline.size == 0 {
            return invalid("baseline.size must be positive".to_string());
        }
        let in_unit = |x: f64| x > 0.0 && x < 1.0;
        if self.de.alpha_thresholds.is_empty() || !self.de.alpha_thresholds.iter().all(|&a| in_unit(a)) {
            return invalid("de.alpha_thresholds must be non-empty and within (0, 1)".to_string());
        }
        if !in_unit(self.de.deg_alpha) {
            return invalid("de.deg_alpha must be within (0, 1)".to_string());
        }
        if !self.de.percentiles.iter().all(|&p| p > 0.0 && p <= 100.0) {
            return invalid("de.percentiles must be within (0, 100]".to_string());
        }
        if self.de.min_replicates < 2 {
            return invalid("de.min_replicates must be at least 2 to estimate dispersion".to_string());
        }
        if !in_unit(self.enrichment.pathway_alpha) {
            return invalid("enrichment.pathway_alpha must be within (0, 1)".to_string());
        }
        Ok(())
    }

    /// Columns forming a sample's identity; the metadata loader requires all of them.
    /// Further `groupby_cols` entries are accepted but not carried.
    pub fn required_metadata_columns(&self) -> [&str; 4] {
        [&self.control_col, &self.time_col, &self.sample_col, &self.duplicate_col]
    }

    pub fn is_control(&self, drug: &str) -> bool {
        drug.eq_ignore_ascii_case(&self.control_val)
    }

    pub fn is_vehicle(&self, drug: &str) -> bool {
        drug.eq_ignore_ascii_case(&self.vehicle_control_val)
    }
}
