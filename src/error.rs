//! Error types for the gene modelling pipeline

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::MatrixKind;

/// The three committed stages of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Metadata loading and count normalization
    Step1,
    /// Delta shapes, feature selection and matrix filtering
    Step2,
    /// Baselines, differential expression and enrichment
    Step3,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Step1, Stage::Step2, Stage::Step3];

    /// Directory name of the stage's artifacts
    pub fn folder(&self) -> &'static str {
        match self {
            Stage::Step1 => "step_1",
            Stage::Step2 => "step_2",
            Stage::Step3 => "step_3",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::Step1 => "preprocessing",
            Stage::Step2 => "feature selection",
            Stage::Step3 => "differential expression and enrichment",
        }
    }

    /// Stage that must be committed before this one may start
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Step1 => None,
            Stage::Step2 => Some(Stage::Step1),
            Stage::Step3 => Some(Stage::Step2),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.folder(), self.description())
    }
}

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error in {context}: {reason}{}", missing_suffix(.missing))]
    Schema {
        context: String,
        missing: Vec<String>,
        reason: String,
    },

    #[error("Alignment error in {context}: {reason}")]
    Alignment { context: String, reason: String },

    #[error("Empty feature set for {kind}: no gene passed the selection threshold ({reason})")]
    EmptyFeatureSet { kind: MatrixKind, reason: String },

    #[error("Insufficient replicates for {comparison}: group {group} has {n} sample(s), at least {required} required")]
    InsufficientReplicates {
        comparison: String,
        group: String,
        n: usize,
        required: usize,
    },

    #[error("Insufficient response values in {context}: {n} sample(s) carry a '{column}' value, at least {required} required")]
    InsufficientResponse {
        context: String,
        column: String,
        n: usize,
        required: usize,
    },

    #[error("No enrichment hits for {kind}: no pathway intersects the significant genes")]
    NoEnrichmentHits { kind: MatrixKind },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Could not commit artifact: {0}")]
    PersistError(#[from] tempfile::PersistError),
}

fn missing_suffix(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!(" (missing: {})", missing.join(", "))
    }
}

impl PipelineError {
    pub fn schema(context: &str, reason: impl Into<String>) -> Self {
        PipelineError::Schema {
            context: context.to_string(),
            missing: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn missing_columns(context: &str, missing: Vec<String>) -> Self {
        PipelineError::Schema {
            context: context.to_string(),
            missing,
            reason: "required columns are absent".to_string(),
        }
    }

    pub fn alignment(context: &str, reason: impl Into<String>) -> Self {
        PipelineError::Alignment {
            context: context.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that only affect one comparison or one fallback path.
    /// Everything else halts the stage.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::InsufficientReplicates { .. }
            | PipelineError::InsufficientResponse { .. }
            | PipelineError::NoEnrichmentHits { .. } => false,
            PipelineError::StageFailed { source, .. } => source.is_fatal(),
            _ => true,
        }
    }

    /// Stage reported by the orchestrator, if this error crossed a stage boundary
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, skipping stage wrappers
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_message_lists_missing_columns() {
        let err = PipelineError::missing_columns(
            "metadata loader",
            vec!["hours".to_string(), "duplicate_id".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("metadata loader"));
        assert!(msg.contains("hours, duplicate_id"));
    }

    #[test]
    fn test_non_fatal_errors() {
        let skipped = PipelineError::InsufficientReplicates {
            comparison: "drugx@24_vs_untreated@24".to_string(),
            group: "drugx@24".to_string(),
            n: 1,
            required: 2,
        };
        assert!(!skipped.is_fatal());
        assert!(PipelineError::schema("normalizer", "empty").is_fatal());

        let no_response = PipelineError::InsufficientResponse {
            context: "top-correlated baseline (TPM)".to_string(),
            column: "beat_per_min".to_string(),
            n: 0,
            required: 3,
        };
        assert!(!no_response.is_fatal());
        assert!(no_response.to_string().contains("0 sample(s) carry a 'beat_per_min' value"));
    }

    #[test]
    fn test_stage_wrapper_exposes_stage_and_root() {
        let err = PipelineError::StageFailed {
            stage: Stage::Step2,
            source: Box::new(PipelineError::EmptyFeatureSet {
                kind: MatrixKind::Tpm,
                reason: "threshold 5".to_string(),
            }),
        };
        assert_eq!(err.stage(), Some(Stage::Step2));
        assert!(matches!(err.root(), PipelineError::EmptyFeatureSet { .. }));
        assert!(err.to_string().contains("step_2"));
    }
}
