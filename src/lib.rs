//! gene_modelling: a staged gene-expression modelling pipeline
//!
//! Raw RNA-seq counts and sample metadata go through three committed stages:
//!
//! 1. alignment and normalization into normalized reads and TPM,
//! 2. delta-shape feature selection and matrix filtering,
//! 3. baseline gene sets, negative binomial differential expression across
//!    treatment/timepoint comparisons, and pathway enrichment into a curated
//!    modelling table.
//!
//! # Example
//!
//! ```ignore
//! use gene_modelling::prelude::*;
//!
//! let inputs = PipelineInputs {
//!     metadata: "metadata.csv".into(),
//!     counts: "counts.csv".into(),
//!     pathways: Some("reactome.gmt".into()),
//!     literature: None,
//! };
//! let pipeline = Pipeline::new(PipelineConfig::default(), "out", inputs)?;
//! pipeline.run_all(false)?;
//! ```

pub mod baseline;
pub mod cli;
pub mod config;
pub mod data;
pub mod de;
pub mod dispersion;
pub mod enrichment;
pub mod error;
pub mod features;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod pipeline;
pub mod rng;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::baseline::{generate_baselines, random_gene_set, top_correlated_gene_set, Baselines};
    pub use crate::config::PipelineConfig;
    pub use crate::data::{ExpressionMatrix, GeneSet, GroupKey, MatrixKind, Metadata, Provenance, RawCounts, Sample, SampleKey};
    pub use crate::de::{enumerate_comparisons, run_differential_expression, ComparisonPair, DeRun};
    pub use crate::dispersion::{estimate_dispersions, DispersionParams};
    pub use crate::enrichment::{aggregate_enrichment, GmtPathwayLookup, InMemoryPathways, Pathway, PathwayLookup};
    pub use crate::error::{PipelineError, Result, Stage};
    pub use crate::features::{select_and_filter, FeatureSelection};
    pub use crate::glm::{fit_single_gene, GlmFitParams, TwoGroupDesign};
    pub use crate::io::{read_expression_matrix, read_metadata, read_raw_counts};
    pub use crate::normalization::{normalize, NormalizedCounts};
    pub use crate::pipeline::{ArtifactLayout, Pipeline, PipelineInputs, RunState};
    pub use crate::testing::{benjamini_hochberg, wald_test};
}
