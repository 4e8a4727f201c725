//! Pathway enrichment of significant genes and the curated modelling set
//!
//! Significant genes from all tested comparisons are tested for
//! over-representation in each pathway. Genes hitting a significant pathway
//! are combined with an optional literature list into the curated set, and
//! the filtered matrix restricted to that set is the final modelling table.

mod hypergeometric;
mod pathways;

pub use hypergeometric::{hypergeometric_upper_tail, pathway_enrichment, PathwayHit};
pub use pathways::{GmtPathwayLookup, InMemoryPathways, Pathway, PathwayLookup};

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::config::{EnrichmentParams, PipelineConfig};
use crate::data::{ExpressionMatrix, GeneSet, MatrixKind, Provenance};
use crate::error::{PipelineError, Result};
use crate::io::{format_f64, write_csv_atomic};

/// Enrichment outcome of one matrix kind
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub kind: MatrixKind,
    /// Every pathway overlapping the universe
    pub tested: Vec<PathwayHit>,
    /// Genes of significant pathways
    pub pathway_genes: GeneSet,
    pub literature: GeneSet,
    pub curated: GeneSet,
    /// The curated set is the literature set alone
    pub used_fallback: bool,
    /// Filtered matrix restricted to the curated genes
    pub modelling: ExpressionMatrix,
}

impl Enrichment {
    pub fn significant_pathways(&self, params: &EnrichmentParams) -> Vec<&PathwayHit> {
        self.tested.iter().filter(|h| is_significant(h, params)).collect()
    }
}

fn is_significant(hit: &PathwayHit, params: &EnrichmentParams) -> bool {
    hit.n_hits() >= params.min_pathway_hits.max(1) && hit.padj < params.pathway_alpha
}

/// Reference link of a pathway
pub fn pathway_link(template: &str, pathway_id: &str) -> String {
    template.replace("{id}", pathway_id)
}

/// Test `significant` against the pathways over the genes of `filtered`,
/// then build the curated set and its modelling matrix.
///
/// When no pathway contains a significant gene the curated set is the
/// literature set (or empty with the fallback disabled).
pub fn aggregate_enrichment(
    filtered: &ExpressionMatrix,
    significant: &BTreeSet<String>,
    lookup: &dyn PathwayLookup,
    literature: &[String],
    config: &PipelineConfig,
) -> Result<Enrichment> {
    let params = &config.enrichment;
    let kind = filtered.kind();
    let universe: HashSet<&str> = filtered.gene_ids().iter().map(String::as_str).collect();
    let significant_ids: HashSet<&str> = significant.iter().map(String::as_str).collect();

    let pathways = lookup.pathways()?;
    let tested = pathway_enrichment(&pathways, &significant_ids, &universe);

    let mut pathway_genes: BTreeSet<&str> = BTreeSet::new();
    for hit in tested.iter().filter(|h| is_significant(h, params)) {
        pathway_genes.extend(hit.hits.iter().map(String::as_str));
    }
    let pathway_genes = GeneSet::new(
        &format!("pathway_{}", kind.tag()),
        Provenance::PathwaySignificant,
        pathway_genes,
    );

    let literature_in_matrix: Vec<&str> = literature
        .iter()
        .map(String::as_str)
        .filter(|g| universe.contains(g))
        .collect();
    if literature_in_matrix.len() < literature.len() {
        log::info!(
            "{} of {} literature genes are absent from the filtered {} matrix",
            literature.len() - literature_in_matrix.len(),
            literature.len(),
            kind
        );
    }
    let literature_set = GeneSet::new("literature", Provenance::Literature, literature.iter().cloned());

    let any_hit = tested.iter().any(|h| h.n_hits() > 0);
    let (curated_genes, used_fallback): (BTreeSet<&str>, bool) = if any_hit {
        let mut genes: BTreeSet<&str> = pathway_genes.genes().iter().map(String::as_str).collect();
        genes.extend(literature_in_matrix.iter().copied());
        (genes, false)
    } else {
        log::warn!("{}", PipelineError::NoEnrichmentHits { kind });
        if params.literature_fallback {
            log::info!("Using the literature gene list as the curated {} set", kind);
            (literature_in_matrix.iter().copied().collect(), true)
        } else {
            (BTreeSet::new(), false)
        }
    };

    let curated = GeneSet::new(&format!("curated_{}", kind.tag()), Provenance::Curated, curated_genes);
    let modelling = filtered.retain_genes(curated.genes())?;
    log::info!(
        "{}: {} pathways tested, {} significant, {} curated genes",
        kind,
        tested.len(),
        tested.iter().filter(|h| is_significant(h, params)).count(),
        curated.len()
    );

    Ok(Enrichment {
        kind,
        tested,
        pathway_genes,
        literature: literature_set,
        curated,
        used_fallback,
        modelling,
    })
}

/// Write `reactome_links_{kind}.csv`: significant pathways with their links
pub fn write_pathway_links<P: AsRef<Path>>(path: P, enrichment: &Enrichment, params: &EnrichmentParams) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record(["pathway_id", "name", "link", "n_hits", "pathway_size", "pvalue", "padj", "genes"])?;
        for hit in enrichment.significant_pathways(params) {
            w.write_record([
                hit.pathway_id.clone(),
                hit.name.clone(),
                pathway_link(&params.link_template, &hit.pathway_id),
                hit.n_hits().to_string(),
                hit.pathway_size.to_string(),
                format_f64(hit.pvalue),
                format_f64(hit.padj),
                hit.hits.join(";"),
            ])?;
        }
        Ok(())
    })
}
