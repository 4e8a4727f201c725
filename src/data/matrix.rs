//! Modelling matrices: genes x samples in one quantitative representation

use std::collections::{HashMap, HashSet};
use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// The two parallel representations carried through every stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatrixKind {
    /// Size-factor normalized reads
    NormalizedReads,
    /// Transcripts per million
    Tpm,
}

impl MatrixKind {
    pub const ALL: [MatrixKind; 2] = [MatrixKind::NormalizedReads, MatrixKind::Tpm];

    /// Short tag used in artifact file names
    pub fn tag(&self) -> &'static str {
        match self {
            MatrixKind::NormalizedReads => "nr",
            MatrixKind::Tpm => "tpm",
        }
    }
}

impl fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixKind::NormalizedReads => write!(f, "normalized reads"),
            MatrixKind::Tpm => write!(f, "TPM"),
        }
    }
}

/// A gene expression matrix (genes x samples) of one [`MatrixKind`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    kind: MatrixKind,
    values: Array2<f64>,
    /// Unique gene identifiers (row keys)
    gene_ids: Vec<String>,
    /// Raw source identifiers, one per row
    names: Vec<String>,
    /// Unique sample labels (column keys)
    sample_labels: Vec<String>,
    gene_index: HashMap<String, usize>,
}

impl ExpressionMatrix {
    pub fn new(
        kind: MatrixKind,
        values: Array2<f64>,
        gene_ids: Vec<String>,
        names: Vec<String>,
        sample_labels: Vec<String>,
    ) -> Result<Self> {
        let context = format!("{} matrix", kind);
        let (n_genes, n_samples) = values.dim();

        if gene_ids.len() != n_genes || names.len() != n_genes {
            return Err(PipelineError::schema(
                &context,
                format!(
                    "{} rows but {} gene ids and {} names",
                    n_genes,
                    gene_ids.len(),
                    names.len()
                ),
            ));
        }
        if sample_labels.len() != n_samples {
            return Err(PipelineError::schema(
                &context,
                format!("{} columns but {} sample labels", n_samples, sample_labels.len()),
            ));
        }
        if values.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(PipelineError::schema(&context, "values must be non-negative finite numbers"));
        }

        let mut gene_index = HashMap::with_capacity(n_genes);
        for (i, id) in gene_ids.iter().enumerate() {
            if gene_index.insert(id.clone(), i).is_some() {
                return Err(PipelineError::schema(&context, format!("gene id '{}' is not unique", id)));
            }
        }
        let mut seen = HashSet::with_capacity(n_samples);
        for label in &sample_labels {
            if !seen.insert(label.as_str()) {
                return Err(PipelineError::schema(&context, format!("sample '{}' is not unique", label)));
            }
        }

        Ok(Self {
            kind,
            values,
            gene_ids,
            names,
            sample_labels,
            gene_index,
        })
    }

    pub fn kind(&self) -> MatrixKind {
        self.kind
    }

    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn sample_labels(&self) -> &[String] {
        &self.sample_labels
    }

    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_index.get(gene_id).copied()
    }

    pub fn gene_values(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(gene_idx)
    }

    /// Mean per gene across samples
    pub fn gene_means(&self) -> Vec<f64> {
        let n = self.n_samples() as f64;
        self.values.axis_iter(Axis(0)).map(|row| row.sum() / n).collect()
    }

    /// log2(x + 1) of every value
    pub fn log2p1(&self) -> Array2<f64> {
        self.values.mapv(|x| (x + 1.0).log2())
    }

    /// Restrict to the given genes, keeping this matrix's row order.
    /// Unknown identifiers are ignored.
    pub fn retain_genes<S: AsRef<str>>(&self, genes: &[S]) -> Result<Self> {
        let wanted: HashSet<&str> = genes.iter().map(|g| g.as_ref()).collect();
        let rows: Vec<usize> = (0..self.n_genes())
            .filter(|&i| wanted.contains(self.gene_ids[i].as_str()))
            .collect();
        self.select_genes(&rows)
    }

    pub fn select_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        Self::new(
            self.kind,
            self.values.select(Axis(0), gene_indices),
            gene_indices.iter().map(|&i| self.gene_ids[i].clone()).collect(),
            gene_indices.iter().map(|&i| self.names[i].clone()).collect(),
            self.sample_labels.clone(),
        )
    }

    pub fn select_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        Self::new(
            self.kind,
            self.values.select(Axis(1), sample_indices),
            self.gene_ids.clone(),
            self.names.clone(),
            sample_indices.iter().map(|&i| self.sample_labels[i].clone()).collect(),
        )
    }
}
