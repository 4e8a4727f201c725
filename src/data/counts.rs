//! Raw per-sample gene counts as uploaded

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{PipelineError, Result};

const CONTEXT: &str = "raw count table";

/// Strip a trailing version suffix: `ENSG00000141510.17` -> `ENSG00000141510`
pub fn strip_version(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, version)) if !stem.is_empty() && !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) => stem,
        _ => name,
    }
}

/// Raw read counts (genes x samples)
#[derive(Debug, Clone)]
pub struct RawCounts {
    /// Count data (genes x samples)
    counts: Array2<f64>,
    /// Source identifiers (`Name` column)
    names: Vec<String>,
    /// Transcript lengths in base pairs, when the table carries them
    lengths: Option<Vec<f64>>,
    /// Column labels as they appear in the table
    sample_labels: Vec<String>,
}

impl RawCounts {
    pub fn new(
        counts: Array2<f64>,
        names: Vec<String>,
        lengths: Option<Vec<f64>>,
        sample_labels: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if n_genes == 0 || n_samples == 0 {
            return Err(PipelineError::schema(
                CONTEXT,
                format!("count table is empty ({} genes x {} samples)", n_genes, n_samples),
            ));
        }
        if names.len() != n_genes {
            return Err(PipelineError::schema(
                CONTEXT,
                format!("{} gene names for {} rows", names.len(), n_genes),
            ));
        }
        if sample_labels.len() != n_samples {
            return Err(PipelineError::schema(
                CONTEXT,
                format!("{} sample labels for {} columns", sample_labels.len(), n_samples),
            ));
        }
        if let Some(lengths) = &lengths {
            if lengths.len() != n_genes {
                return Err(PipelineError::schema(
                    CONTEXT,
                    format!("{} lengths for {} rows", lengths.len(), n_genes),
                ));
            }
            if lengths.iter().any(|&l| l <= 0.0 || !l.is_finite()) {
                return Err(PipelineError::schema(CONTEXT, "gene lengths must be positive"));
            }
        }
        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(PipelineError::schema(CONTEXT, "counts must be non-negative finite values"));
        }
        if counts.iter().all(|&x| x == 0.0) {
            return Err(PipelineError::schema(CONTEXT, "all samples have 0 counts for all genes"));
        }
        if counts.iter().any(|&x| x != x.round()) {
            log::warn!("Some count values are not integers; they are rounded before negative binomial testing");
        }

        let mut seen = std::collections::HashSet::new();
        for label in &sample_labels {
            if !seen.insert(label.as_str()) {
                return Err(PipelineError::schema(CONTEXT, format!("sample column '{}' appears twice", label)));
            }
        }

        Ok(Self {
            counts,
            names,
            lengths,
            sample_labels,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn lengths(&self) -> Option<&[f64]> {
        self.lengths.as_deref()
    }

    pub fn sample_labels(&self) -> &[String] {
        &self.sample_labels
    }

    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    /// Library size per sample
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(1)).map(|col| col.sum()).collect()
    }

    /// Reorder/subset columns
    pub fn select_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let counts = self.counts.select(Axis(1), sample_indices);
        let labels = sample_indices.iter().map(|&i| self.sample_labels[i].clone()).collect();
        Self::new(counts, self.names.clone(), self.lengths.clone(), labels)
    }

    /// Rename the sample columns (same order)
    pub fn with_sample_labels(mut self, labels: Vec<String>) -> Result<Self> {
        if labels.len() != self.n_samples() {
            return Err(PipelineError::schema(CONTEXT, "label count does not match sample count"));
        }
        self.sample_labels = labels;
        Ok(self)
    }

    /// Collapse rows onto version-less gene identifiers.
    ///
    /// Rows whose `Name` maps to the same gene id are summed; their names are
    /// joined with `|` and their lengths averaged. Output is ordered by gene id.
    pub fn collapse_to_genes(&self) -> CollapsedCounts {
        let mut by_gene: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, name) in self.names.iter().enumerate() {
            by_gene.entry(strip_version(name.trim())).or_default().push(i);
        }

        let n_samples = self.n_samples();
        let mut counts = Array2::zeros((by_gene.len(), n_samples));
        let mut gene_ids = Vec::with_capacity(by_gene.len());
        let mut names = Vec::with_capacity(by_gene.len());
        let mut lengths = self.lengths.as_ref().map(|_| Vec::with_capacity(by_gene.len()));

        for (row, (gene_id, members)) in by_gene.iter().enumerate() {
            if members.len() > 1 {
                log::debug!("Collapsing {} rows onto gene '{}'", members.len(), gene_id);
            }
            for &i in members {
                for j in 0..n_samples {
                    counts[[row, j]] += self.counts[[i, j]];
                }
            }
            gene_ids.push(gene_id.to_string());
            names.push(
                members
                    .iter()
                    .map(|&i| self.names[i].trim())
                    .collect::<Vec<_>>()
                    .join("|"),
            );
            if let (Some(out), Some(src)) = (lengths.as_mut(), self.lengths.as_ref()) {
                let mean = members.iter().map(|&i| src[i]).sum::<f64>() / members.len() as f64;
                out.push(mean);
            }
        }

        CollapsedCounts {
            counts,
            gene_ids,
            names,
            lengths,
            sample_labels: self.sample_labels.clone(),
        }
    }
}

/// Counts keyed by unique gene identifier
#[derive(Debug, Clone)]
pub struct CollapsedCounts {
    pub counts: Array2<f64>,
    pub gene_ids: Vec<String>,
    pub names: Vec<String>,
    pub lengths: Option<Vec<f64>>,
    pub sample_labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("s{}", i)).collect()
    }

    #[test]
    fn test_raw_counts_creation() {
        let raw = RawCounts::new(
            array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]],
            vec!["g1".to_string(), "g2".to_string()],
            None,
            labels(3),
        )
        .unwrap();
        assert_eq!(raw.n_genes(), 2);
        assert_eq!(raw.n_samples(), 3);
        assert_eq!(raw.library_sizes(), vec![15.0, 35.0, 55.0]);
    }

    #[test]
    fn test_empty_table_is_schema_error() {
        let result = RawCounts::new(Array2::zeros((0, 3)), vec![], None, labels(3));
        assert!(matches!(result, Err(PipelineError::Schema { .. })));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let result = RawCounts::new(
            array![[10.0, -5.0]],
            vec!["g1".to_string()],
            None,
            labels(2),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("ENSG00000141510.17"), "ENSG00000141510");
        assert_eq!(strip_version("MT-CO1"), "MT-CO1");
        assert_eq!(strip_version("ACTB.v2"), "ACTB.v2");
        assert_eq!(strip_version(".5"), ".5");
    }

    #[test]
    fn test_collapse_sums_versions() {
        let raw = RawCounts::new(
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            vec!["G2.1".to_string(), "G1.1".to_string(), "G2.3".to_string()],
            Some(vec![1000.0, 500.0, 3000.0]),
            labels(2),
        )
        .unwrap();
        let collapsed = raw.collapse_to_genes();
        assert_eq!(collapsed.gene_ids, vec!["G1", "G2"]);
        assert_eq!(collapsed.names[1], "G2.1|G2.3");
        assert_eq!(collapsed.counts.row(1).to_vec(), vec![6.0, 8.0]);
        assert_eq!(collapsed.lengths.unwrap(), vec![500.0, 2000.0]);
    }
}
