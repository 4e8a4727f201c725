//! Named gene sets with provenance

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a gene set came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Provenance {
    /// Uniform draw from a gene universe
    Random { seed: u32 },
    /// Top genes by |correlation| with the response
    TopCorrelated,
    /// Literature curation supplied by the caller
    Literature,
    /// Genes hitting significantly enriched pathways
    PathwaySignificant,
    /// Union of validated and literature genes
    Curated,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Random { seed } => write!(f, "random (seed {})", seed),
            Provenance::TopCorrelated => write!(f, "top correlated"),
            Provenance::Literature => write!(f, "literature"),
            Provenance::PathwaySignificant => write!(f, "pathway significant"),
            Provenance::Curated => write!(f, "curated"),
        }
    }
}

/// An immutable gene set; first occurrence wins on duplicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSet {
    name: String,
    provenance: Provenance,
    genes: Vec<String>,
}

impl GeneSet {
    pub fn new<I, S>(name: &str, provenance: Provenance, genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let genes = genes
            .into_iter()
            .map(Into::into)
            .filter(|g: &String| seen.insert(g.clone()))
            .collect();
        Self {
            name: name.to_string(),
            provenance,
            genes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.genes.iter().any(|g| g == gene)
    }
}
