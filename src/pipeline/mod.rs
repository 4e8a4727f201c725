//! Three-stage orchestration over a working directory
//!
//! Each stage reads only the committed artifacts of earlier stages, so any
//! stage can be rerun on its own once its inputs exist. A stage writes into
//! a staging directory that replaces its folder only after every artifact
//! is written. Progress is recorded in `run_state.json`; a resumed run
//! starts after the last committed stage.

mod layout;
mod state;

pub use layout::ArtifactLayout;
pub use state::{RunState, StageFailure};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::baseline::{generate_baselines, write_top_correlated};
use crate::config::PipelineConfig;
use crate::data::{ExpressionMatrix, MatrixKind};
use crate::de::{
    run_differential_expression, write_compared_pairs, write_deg_counts, write_degs, write_percentile_counts,
    write_results,
};
use crate::enrichment::{aggregate_enrichment, write_pathway_links, GmtPathwayLookup, InMemoryPathways, PathwayLookup};
use crate::error::{PipelineError, Result, Stage};
use crate::features::{select_and_filter, write_delta_shapes};
use crate::io::{
    read_expression_matrix, read_gene_list, read_metadata, read_raw_counts, write_expression_matrix,
    write_gene_list, write_gene_table, write_metadata, write_size_factors,
};
use crate::normalization::normalize;

/// User-supplied inputs of a run
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub metadata: PathBuf,
    pub counts: PathBuf,
    /// Pathway annotations in GMT layout
    pub pathways: Option<PathBuf>,
    /// One-column list of genes reported in the literature
    pub literature: Option<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    layout: ArtifactLayout,
    inputs: PipelineInputs,
    lookup: Box<dyn PathwayLookup>,
}

impl Pipeline {
    pub fn new<P: AsRef<Path>>(config: PipelineConfig, workdir: P, inputs: PipelineInputs) -> Result<Self> {
        config.validate()?;
        let lookup: Box<dyn PathwayLookup> = match &inputs.pathways {
            Some(path) => Box::new(GmtPathwayLookup::new(path)),
            None => {
                log::warn!("No pathway file given; enrichment will find no pathways");
                Box::new(InMemoryPathways::default())
            }
        };
        Ok(Self {
            config,
            layout: ArtifactLayout::new(workdir),
            inputs,
            lookup,
        })
    }

    /// Replace the pathway source
    pub fn with_lookup(mut self, lookup: Box<dyn PathwayLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn status(&self) -> Result<RunState> {
        RunState::load(self.layout.run_state())
    }

    /// Run every stage in order. With `resume`, stages committed by an
    /// earlier run are not repeated.
    pub fn run_all(&self, resume: bool) -> Result<RunState> {
        let mut state = if resume { self.status()? } else { RunState::default() };
        let first = match state.next_stage() {
            Some(stage) => stage,
            None => {
                log::info!("All stages already completed in {}", self.layout.root().display());
                return Ok(state);
            }
        };
        if resume && first != Stage::Step1 {
            log::info!("Resuming at {}", first);
        }

        for stage in Stage::ALL.into_iter().filter(|&s| s >= first) {
            self.run_stage_recorded(stage, &mut state)?;
        }
        Ok(state)
    }

    /// Run a single stage against whatever the previous stage committed
    pub fn run_stage(&self, stage: Stage) -> Result<RunState> {
        let mut state = self.status()?;
        self.run_stage_recorded(stage, &mut state)?;
        Ok(state)
    }

    fn run_stage_recorded(&self, stage: Stage, state: &mut RunState) -> Result<()> {
        log::info!("Starting {}", stage);
        let outcome = self.check_prerequisites(stage).and_then(|()| self.run_staged(stage));
        match outcome {
            Ok(()) => {
                state.mark_completed(stage);
                state.save(self.layout.run_state())?;
                log::info!("Completed {}", stage);
                Ok(())
            }
            Err(e) => {
                log::error!("{} failed: {}", stage, e);
                state.mark_failed(stage, e.to_string());
                state.save(self.layout.run_state())?;
                Err(PipelineError::StageFailed {
                    stage,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Every artifact of the earlier stages must be committed
    fn check_prerequisites(&self, stage: Stage) -> Result<()> {
        for earlier in Stage::ALL.into_iter().filter(|&s| s < stage) {
            let missing: Vec<String> = self
                .layout
                .stage_artifacts(earlier)
                .iter()
                .filter(|path| !path.is_file())
                .map(|path| path.display().to_string())
                .collect();
            if !missing.is_empty() {
                return Err(PipelineError::Schema {
                    context: format!("{} artifacts", earlier),
                    missing,
                    reason: format!("{} must be committed before {}", earlier.folder(), stage.folder()),
                });
            }
        }
        Ok(())
    }

    /// Run `stage` into its staging directory and swap it in on success.
    /// On failure the committed folder is left untouched.
    fn run_staged(&self, stage: Stage) -> Result<()> {
        let staging = self.layout.staging_dir(stage);
        if staging.exists() {
            log::debug!("Removing leftover {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let out = self.layout.staged(stage);
        let outcome = match stage {
            Stage::Step1 => self.run_step1(&out),
            Stage::Step2 => self.run_step2(&out),
            Stage::Step3 => self.run_step3(&out),
        };
        match outcome {
            Ok(()) => self.commit_stage(stage),
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    log::warn!("Could not remove {}: {}", staging.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    fn commit_stage(&self, stage: Stage) -> Result<()> {
        let live = self.layout.stage_dir(stage);
        let retired = self.layout.retired_dir(stage);
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        if live.exists() {
            fs::rename(&live, &retired)?;
        }
        fs::rename(self.layout.staging_dir(stage), &live)?;
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        log::debug!("Committed {}", live.display());
        Ok(())
    }

    /// Load, align and normalize the user inputs
    fn run_step1(&self, out: &ArtifactLayout) -> Result<()> {
        let config = &self.config;
        let metadata = read_metadata(&self.inputs.metadata, config)?;
        let raw = read_raw_counts(&self.inputs.counts, config)?;
        let normalized = normalize(&raw, &metadata)?;

        write_metadata(out.metadata(), &normalized.metadata, config)?;
        let counts = &normalized.counts;
        write_gene_table(
            out.preprocessed_counts(),
            config,
            &counts.gene_ids,
            &counts.names,
            &counts.sample_labels,
            |i, j| counts.counts[[i, j]],
        )?;
        for kind in MatrixKind::ALL {
            write_expression_matrix(out.modelling_matrix(kind), normalized.matrix(kind), config)?;
        }
        write_size_factors(
            out.size_factors(),
            &counts.sample_labels,
            &normalized.size_factors.to_vec(),
        )?;
        Ok(())
    }

    /// Score, select and filter each modelling matrix
    fn run_step2(&self, out: &ArtifactLayout) -> Result<()> {
        let config = &self.config;
        let metadata = read_metadata(self.layout.metadata(), config)?;
        for kind in MatrixKind::ALL {
            let matrix = read_expression_matrix(self.layout.modelling_matrix(kind), kind, config)?;
            let selection = select_and_filter(&matrix, &metadata, config)?;

            write_delta_shapes(out.delta_shapes(kind), &selection.shapes, config)?;
            write_gene_list(out.features(kind), &selection.features.genes, config)?;
            write_expression_matrix(out.filtered_matrix(kind), &selection.filtered, config)?;
        }
        Ok(())
    }

    /// Baselines, differential expression and enrichment per matrix kind
    fn run_step3(&self, out: &ArtifactLayout) -> Result<()> {
        let config = &self.config;
        let metadata = read_metadata(self.layout.metadata(), config)?;
        let literature = match &self.inputs.literature {
            Some(path) => read_gene_list(path, config)?,
            None => Vec::new(),
        };

        let mut literature_written = false;
        for kind in MatrixKind::ALL {
            let modelling = read_expression_matrix(self.layout.modelling_matrix(kind), kind, config)?;
            let filtered = self.read_filtered(kind)?;

            let baselines = generate_baselines(&modelling, &metadata, config)?;
            write_gene_list(out.random_gene_set(kind), baselines.random.genes(), config)?;
            write_top_correlated(out.top_correlated_gene_set(kind), baselines.top_correlated.as_ref(), config)?;

            let run = run_differential_expression(&filtered, &metadata, config)?;
            write_compared_pairs(out.compared_pairs(kind), &run)?;
            write_results(out.de_results(kind), &run, config)?;
            write_degs(out.degs(kind), &run, config)?;
            write_deg_counts(out.deg_counts(kind), &run, config)?;
            write_percentile_counts(out.percentile_counts(kind), &run, config)?;

            let significant = run.significant_genes(config.de.deg_alpha);
            let enrichment = aggregate_enrichment(&filtered, &significant, self.lookup.as_ref(), &literature, config)?;
            write_pathway_links(out.pathway_links(kind), &enrichment, &config.enrichment)?;
            write_gene_list(out.pathway_genes(kind), enrichment.pathway_genes.genes(), config)?;
            if !literature_written {
                write_gene_list(out.literature_genes(), enrichment.literature.genes(), config)?;
                literature_written = true;
            }
            write_expression_matrix(out.modelling_df(kind), &enrichment.modelling, config)?;
        }
        Ok(())
    }

    /// Filtered matrix of step 2, checked against its feature list
    fn read_filtered(&self, kind: MatrixKind) -> Result<ExpressionMatrix> {
        let path = self.layout.filtered_matrix(kind);
        let filtered = read_expression_matrix(&path, kind, &self.config)?;
        let features = read_gene_list(self.layout.features(kind), &self.config)?;

        let expected: HashSet<&str> = features.iter().map(String::as_str).collect();
        let found: HashSet<&str> = filtered.gene_ids().iter().map(String::as_str).collect();
        if expected != found {
            return Err(PipelineError::schema(
                &format!("{} matrix {}", kind, path.display()),
                format!(
                    "{} genes do not match the {} selected features",
                    found.len(),
                    expected.len()
                ),
            ));
        }
        Ok(filtered)
    }
}
