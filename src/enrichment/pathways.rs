//! Pathway gene sets

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// One pathway and its member genes
#[derive(Debug, Clone, PartialEq)]
pub struct Pathway {
    pub id: String,
    pub name: String,
    pub genes: Vec<String>,
}

/// Source of pathway annotations
pub trait PathwayLookup: Send + Sync {
    fn pathways(&self) -> Result<Vec<Pathway>>;
}

/// Pathways held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryPathways {
    pathways: Vec<Pathway>,
}

impl InMemoryPathways {
    pub fn new(pathways: Vec<Pathway>) -> Self {
        Self { pathways }
    }
}

impl PathwayLookup for InMemoryPathways {
    fn pathways(&self) -> Result<Vec<Pathway>> {
        Ok(self.pathways.clone())
    }
}

/// Pathways from a GMT file: `name<TAB>identifier<TAB>gene<TAB>gene...`
/// (the Reactome export layout). Lines starting with `#` are ignored.
#[derive(Debug, Clone)]
pub struct GmtPathwayLookup {
    path: PathBuf,
}

impl GmtPathwayLookup {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PathwayLookup for GmtPathwayLookup {
    fn pathways(&self) -> Result<Vec<Pathway>> {
        let context = format!("pathway file {}", self.path.display());
        let file = File::open(&self.path).map_err(|e| PipelineError::schema(&context, e.to_string()))?;

        // A repeated identifier merges its gene lists
        let mut by_id: BTreeMap<String, Pathway> = BTreeMap::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() < 3 {
                return Err(PipelineError::schema(
                    &context,
                    format!("line {} has {} fields, expected name, identifier and genes", line_no + 1, fields.len()),
                ));
            }
            let id = if fields[1].is_empty() { fields[0] } else { fields[1] };
            let entry = by_id.entry(id.to_string()).or_insert_with(|| Pathway {
                id: id.to_string(),
                name: fields[0].to_string(),
                genes: Vec::new(),
            });
            entry
                .genes
                .extend(fields[2..].iter().filter(|g| !g.is_empty()).map(|g| g.to_string()));
        }

        let mut pathways: Vec<Pathway> = by_id.into_values().collect();
        for p in &mut pathways {
            p.genes.sort();
            p.genes.dedup();
        }
        log::info!("Loaded {} pathways from {}", pathways.len(), self.path.display());
        Ok(pathways)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_gmt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pathways.gmt");
        fs::write(
            &path,
            "# comment\nCell Cycle\tR-HSA-1640170\tG2\tG1\tG2\nApoptosis\tR-HSA-109581\tG5\n\n",
        )
        .unwrap();

        let pathways = GmtPathwayLookup::new(&path).pathways().unwrap();
        assert_eq!(pathways.len(), 2);
        assert_eq!(pathways[0].id, "R-HSA-109581");
        assert_eq!(pathways[1].name, "Cell Cycle");
        assert_eq!(pathways[1].genes, vec!["G1", "G2"]);
    }

    #[test]
    fn test_short_line_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.gmt");
        fs::write(&path, "Cell Cycle\tR-HSA-1640170\n").unwrap();
        assert!(matches!(
            GmtPathwayLookup::new(&path).pathways(),
            Err(PipelineError::Schema { .. })
        ));
    }
}
