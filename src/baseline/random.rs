//! Seeded uniform gene draw

use crate::data::{ExpressionMatrix, GeneSet, Provenance};
use crate::rng::MersenneTwister;

/// Draw `size` distinct genes from the matrix's gene universe.
///
/// The draw depends on the seed and the universe only; the returned set is
/// sorted by gene id. `size` larger than the universe returns every gene.
pub fn random_gene_set(matrix: &ExpressionMatrix, size: usize, seed: u32) -> GeneSet {
    let mut rng = MersenneTwister::new(seed);
    let mut genes: Vec<&str> = rng
        .sample_without_replacement(matrix.n_genes(), size)
        .into_iter()
        .map(|i| matrix.gene_ids()[i].as_str())
        .collect();
    genes.sort_unstable();

    log::debug!(
        "Random baseline for {}: {} of {} genes (seed {})",
        matrix.kind(),
        genes.len(),
        matrix.n_genes(),
        seed
    );
    GeneSet::new(
        &format!("random_{}", matrix.kind().tag()),
        Provenance::Random { seed },
        genes,
    )
}
