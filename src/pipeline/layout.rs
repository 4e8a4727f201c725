//! Locations of every staged artifact

use std::path::{Path, PathBuf};

use crate::data::MatrixKind;
use crate::error::Stage;

/// Artifact paths under one working directory:
/// `<workdir>/step_1`, `<workdir>/step_2`, `<workdir>/step_3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
    /// Stage whose artifacts resolve into its staging directory
    staging: Option<Stage>,
}

impl ArtifactLayout {
    pub fn new<P: AsRef<Path>>(workdir: P) -> Self {
        Self {
            root: workdir.as_ref().to_path_buf(),
            staging: None,
        }
    }

    /// Same layout with the artifacts of `stage` redirected to
    /// [`staging_dir`](Self::staging_dir); other stages keep their
    /// committed locations.
    pub fn staged(&self, stage: Stage) -> Self {
        Self {
            root: self.root.clone(),
            staging: Some(stage),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        if self.staging == Some(stage) {
            self.staging_dir(stage)
        } else {
            self.root.join(stage.folder())
        }
    }

    /// Directory a stage writes into until it is committed
    pub fn staging_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(format!(".{}.staging", stage.folder()))
    }

    /// Where the previous commit of a stage is parked during the swap
    pub fn retired_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(format!(".{}.old", stage.folder()))
    }

    fn file(&self, stage: Stage, name: String) -> PathBuf {
        self.stage_dir(stage).join(name)
    }

    pub fn run_state(&self) -> PathBuf {
        self.root.join("run_state.json")
    }

    // step 1

    pub fn metadata(&self) -> PathBuf {
        self.file(Stage::Step1, "metadata.csv".to_string())
    }

    pub fn preprocessed_counts(&self) -> PathBuf {
        self.file(Stage::Step1, "preprocessed_counts.csv".to_string())
    }

    pub fn modelling_matrix(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step1, format!("modelling_{}.csv", kind.tag()))
    }

    pub fn size_factors(&self) -> PathBuf {
        self.file(Stage::Step1, "size_factors.csv".to_string())
    }

    // step 2

    pub fn delta_shapes(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step2, format!("delta_shapes_{}.csv", kind.tag()))
    }

    pub fn features(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step2, format!("{}_features.csv", kind.tag()))
    }

    pub fn filtered_matrix(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step2, format!("filtered_{}.csv", kind.tag()))
    }

    // step 3

    pub fn random_gene_set(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("random_gene_set_{}.csv", kind.tag()))
    }

    pub fn top_correlated_gene_set(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("top_corr_gene_set_{}.csv", kind.tag()))
    }

    pub fn compared_pairs(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("deseq2_compared_pairs_{}.csv", kind.tag()))
    }

    pub fn de_results(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("deseq2_results_{}.csv", kind.tag()))
    }

    pub fn degs(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("deseq2_degs_results_{}.csv", kind.tag()))
    }

    pub fn deg_counts(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("deg_counts_{}.csv", kind.tag()))
    }

    pub fn percentile_counts(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("deseq2_percentile_counts_{}.csv", kind.tag()))
    }

    pub fn pathway_links(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("reactome_links_{}.csv", kind.tag()))
    }

    pub fn pathway_genes(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("reactome_genes_{}.csv", kind.tag()))
    }

    pub fn literature_genes(&self) -> PathBuf {
        self.file(Stage::Step3, "literature_genes.csv".to_string())
    }

    pub fn modelling_df(&self, kind: MatrixKind) -> PathBuf {
        self.file(Stage::Step3, format!("filtered_modelling_df_{}.csv", kind.tag()))
    }

    /// Every artifact a stage commits
    pub fn stage_artifacts(&self, stage: Stage) -> Vec<PathBuf> {
        match stage {
            Stage::Step1 => {
                let mut paths = vec![self.metadata(), self.preprocessed_counts(), self.size_factors()];
                paths.extend(MatrixKind::ALL.iter().map(|&k| self.modelling_matrix(k)));
                paths
            }
            Stage::Step2 => MatrixKind::ALL
                .iter()
                .flat_map(|&k| [self.delta_shapes(k), self.features(k), self.filtered_matrix(k)])
                .collect(),
            Stage::Step3 => {
                let mut paths = vec![self.literature_genes()];
                for k in MatrixKind::ALL {
                    paths.extend([
                        self.random_gene_set(k),
                        self.top_correlated_gene_set(k),
                        self.compared_pairs(k),
                        self.de_results(k),
                        self.degs(k),
                        self.deg_counts(k),
                        self.percentile_counts(k),
                        self.pathway_links(k),
                        self.pathway_genes(k),
                        self.modelling_df(k),
                    ]);
                }
                paths
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_paths_are_distinct_per_kind() {
        let layout = ArtifactLayout::new("/work");
        assert_eq!(layout.filtered_matrix(MatrixKind::Tpm), PathBuf::from("/work/step_2/filtered_tpm.csv"));
        assert_eq!(
            layout.delta_shapes(MatrixKind::NormalizedReads),
            PathBuf::from("/work/step_2/delta_shapes_nr.csv")
        );

        let all: Vec<PathBuf> = Stage::ALL.iter().flat_map(|&s| layout.stage_artifacts(s)).collect();
        let unique: HashSet<&PathBuf> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_staged_layout_redirects_one_stage() {
        let staged = ArtifactLayout::new("/work").staged(Stage::Step2);
        assert_eq!(
            staged.filtered_matrix(MatrixKind::Tpm),
            PathBuf::from("/work/.step_2.staging/filtered_tpm.csv")
        );
        assert_eq!(
            staged.modelling_matrix(MatrixKind::Tpm),
            PathBuf::from("/work/step_1/modelling_tpm.csv")
        );
        assert_eq!(staged.run_state(), PathBuf::from("/work/run_state.json"));
    }
}
