//! Command-line interface for gene_modelling

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::PipelineInputs;

#[derive(Parser)]
#[command(name = "gene_modelling")]
#[command(version)]
#[command(about = "Staged gene-expression modelling pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads (0 = one per core)
    #[arg(short = 't', long, global = true, default_value = "0")]
    pub threads: usize,
}

/// Inputs and settings shared by every pipeline command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Sample metadata CSV
    #[arg(short, long,
        long_help = "Sample metadata CSV.\n\
            Required columns: drug, hours, sample, duplicate_id (names configurable).\n\
            An optional beat_per_min column holds the measured response.")]
    pub metadata: PathBuf,

    /// Raw count CSV
    #[arg(short, long,
        long_help = "Raw count CSV.\n\
            A Name column with gene identifiers, an optional Length or\n\
            EffectiveLength column and one column per sample.")]
    pub counts: PathBuf,

    /// Working directory for staged artifacts [default: gene_modelling_run]
    #[arg(short, long, default_value = "gene_modelling_run")]
    pub workdir: PathBuf,

    /// JSON configuration; absent keys take their defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Pathway annotations in GMT layout
    #[arg(short, long)]
    pub pathways: Option<PathBuf>,

    /// One-column list of genes reported in the literature
    #[arg(short, long)]
    pub literature: Option<PathBuf>,
}

impl RunArgs {
    pub fn load_config(&self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::from_json_file(path),
            None => Ok(PipelineConfig::default()),
        }
    }

    pub fn inputs(&self) -> PipelineInputs {
        PipelineInputs {
            metadata: self.metadata.clone(),
            counts: self.counts.clone(),
            pathways: self.pathways.clone(),
            literature: self.literature.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run all three stages
    #[command(
        long_about = "Run all three stages.\n\n\
            step_1 normalizes the counts, step_2 selects and filters features,\n\
            step_3 runs baselines, differential expression and pathway enrichment.",
        after_long_help = "\
Examples:
  gene_modelling run -m metadata.csv -c counts.csv -w out

  # Continue after the last committed stage
  gene_modelling run -m metadata.csv -c counts.csv -w out --resume

  # With pathway annotations and a literature gene list
  gene_modelling run -m metadata.csv -c counts.csv -w out \\
    --pathways reactome.gmt --literature literature.csv"
    )]
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Skip stages committed by an earlier run
        #[arg(long)]
        resume: bool,
    },

    /// Load and normalize the counts (step_1)
    Step1 {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Select features and filter the matrices (step_2)
    Step2 {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Baselines, differential expression and enrichment (step_3)
    Step3 {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Show the recorded progress of a working directory
    Status {
        #[arg(short, long, default_value = "gene_modelling_run")]
        workdir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_resume() {
        let cli = Cli::try_parse_from([
            "gene_modelling",
            "run",
            "-m",
            "meta.csv",
            "-c",
            "counts.csv",
            "--pathways",
            "reactome.gmt",
            "--resume",
            "-t",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.threads, 4);
        match cli.command {
            Some(Commands::Run { args, resume }) => {
                assert!(resume);
                assert_eq!(args.workdir, PathBuf::from("gene_modelling_run"));
                assert_eq!(args.pathways, Some(PathBuf::from("reactome.gmt")));
                assert!(args.literature.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_single_stage_commands() {
        let cli = Cli::try_parse_from(["gene_modelling", "step2", "-m", "m.csv", "-c", "c.csv", "-w", "out"]).unwrap();
        match cli.command {
            Some(Commands::Step2 { args }) => assert_eq!(args.workdir, PathBuf::from("out")),
            _ => panic!("expected step2"),
        }
        assert!(Cli::try_parse_from(["gene_modelling", "step1", "-m", "m.csv"]).is_err());
    }
}
