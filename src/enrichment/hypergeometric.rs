//! Over-representation test of significant genes in pathways

use std::cmp::Ordering;
use std::collections::HashSet;

use statrs::distribution::{DiscreteCDF, Hypergeometric};

use crate::stats::cmp_f64;
use crate::testing::benjamini_hochberg;

use super::pathways::Pathway;

/// Test result of one pathway
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayHit {
    pub pathway_id: String,
    pub name: String,
    /// Pathway genes within the universe
    pub pathway_size: usize,
    /// Significant pathway genes, sorted
    pub hits: Vec<String>,
    pub pvalue: f64,
    pub padj: f64,
}

impl PathwayHit {
    pub fn n_hits(&self) -> usize {
        self.hits.len()
    }
}

/// P(X >= k) for X ~ Hypergeometric(universe, successes, draws)
pub fn hypergeometric_upper_tail(k: u64, universe: u64, successes: u64, draws: u64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    Hypergeometric::new(universe, successes, draws).map_or(f64::NAN, |dist| dist.sf(k - 1).clamp(0.0, 1.0))
}

/// Test every pathway that overlaps the universe, BH-adjusted across them.
///
/// Sorted by p-value, ties by pathway id.
pub fn pathway_enrichment(pathways: &[Pathway], significant: &HashSet<&str>, universe: &HashSet<&str>) -> Vec<PathwayHit> {
    let draws = significant.iter().filter(|g| universe.contains(*g)).count() as u64;

    let mut hits: Vec<PathwayHit> = pathways
        .iter()
        .filter_map(|p| {
            let members: Vec<&str> = p
                .genes
                .iter()
                .map(String::as_str)
                .filter(|g| universe.contains(g))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            if members.is_empty() {
                return None;
            }
            let mut genes: Vec<String> = members
                .iter()
                .filter(|g| significant.contains(*g))
                .map(|g| g.to_string())
                .collect();
            genes.sort();
            let pvalue = hypergeometric_upper_tail(genes.len() as u64, universe.len() as u64, members.len() as u64, draws);
            Some(PathwayHit {
                pathway_id: p.id.clone(),
                name: p.name.clone(),
                pathway_size: members.len(),
                hits: genes,
                pvalue,
                padj: f64::NAN,
            })
        })
        .collect();

    let padj = benjamini_hochberg(&hits.iter().map(|h| h.pvalue).collect::<Vec<_>>());
    for (hit, q) in hits.iter_mut().zip(padj) {
        hit.padj = q;
    }
    hits.sort_by(|a, b| match cmp_f64(&a.pvalue, &b.pvalue) {
        Ordering::Equal => a.pathway_id.cmp(&b.pathway_id),
        other => other,
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper_tail() {
        // all 2 draws from a universe of 10 land in a 2-gene pathway: 1 / C(10, 2)
        assert!((hypergeometric_upper_tail(2, 10, 2, 2) - 1.0 / 45.0).abs() < 1e-12);
        assert_eq!(hypergeometric_upper_tail(0, 10, 2, 2), 1.0);
    }

    #[test]
    fn test_pathways_are_tested_within_universe() {
        let universe_ids: Vec<String> = (1..=10).map(|i| format!("G{}", i)).collect();
        let universe: HashSet<&str> = universe_ids.iter().map(String::as_str).collect();
        let significant: HashSet<&str> = ["G1", "G2"].into_iter().collect();
        let pathways = vec![
            Pathway {
                id: "P1".to_string(),
                name: "hit".to_string(),
                genes: vec!["G1".to_string(), "G2".to_string(), "X".to_string()],
            },
            Pathway {
                id: "P2".to_string(),
                name: "miss".to_string(),
                genes: vec!["G5".to_string(), "G6".to_string()],
            },
            Pathway {
                id: "P3".to_string(),
                name: "outside".to_string(),
                genes: vec!["X".to_string()],
            },
        ];

        let hits = pathway_enrichment(&pathways, &significant, &universe);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].pathway_id, "P1");
        assert_eq!(hits[0].pathway_size, 2);
        assert_eq!(hits[0].hits, vec!["G1", "G2"]);
        assert!((hits[0].pvalue - 1.0 / 45.0).abs() < 1e-12);
        assert!((hits[0].padj - 2.0 / 45.0).abs() < 1e-12);
        assert_eq!(hits[1].n_hits(), 0);
        assert_eq!(hits[1].pvalue, 1.0);
    }
}
