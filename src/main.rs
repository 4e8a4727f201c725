//! gene_modelling command-line interface

use clap::Parser;
use log::{info, LevelFilter};

use gene_modelling::cli::{Cli, Commands, RunArgs};
use gene_modelling::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    if std::env::args().len() == 1 {
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(cli.threads).build_global() {
            log::warn!("Could not configure {} worker threads: {}", cli.threads, e);
        }
    }

    let command = match cli.command {
        Some(command) => command,
        None => {
            print_no_args();
            return;
        }
    };

    let result = match command {
        Commands::Run { args, resume } => run_pipeline(&args, resume),
        Commands::Step1 { args } => run_single_stage(&args, Stage::Step1),
        Commands::Step2 { args } => run_single_stage(&args, Stage::Step2),
        Commands::Step3 { args } => run_single_stage(&args, Stage::Step3),
        Commands::Status { workdir } => print_status(&workdir),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_no_args() {
    println!("gene_modelling v{}", VERSION);
    println!("Run `gene_modelling -h` for usage or `gene_modelling --help` for detailed information.");
}

fn build_pipeline(args: &RunArgs) -> Result<Pipeline> {
    let config = args.load_config()?;
    info!("Working directory: {}", args.workdir.display());
    Pipeline::new(config, &args.workdir, args.inputs())
}

fn run_pipeline(args: &RunArgs, resume: bool) -> Result<()> {
    let pipeline = build_pipeline(args)?;
    let state = pipeline.run_all(resume)?;
    if let Some(stage) = state.completed {
        info!("Run complete through {}", stage);
    }
    Ok(())
}

fn run_single_stage(args: &RunArgs, stage: Stage) -> Result<()> {
    build_pipeline(args)?.run_stage(stage)?;
    Ok(())
}

fn print_status(workdir: &std::path::Path) -> Result<()> {
    let layout = ArtifactLayout::new(workdir);
    let state = RunState::load(layout.run_state())?;
    println!("Working directory: {}", workdir.display());
    match state.completed {
        Some(stage) => println!("Last completed stage: {}", stage),
        None => println!("Last completed stage: none"),
    }
    if let Some(failure) = &state.failed {
        println!("Failed stage: {}", failure.stage);
        println!("  {}", failure.message);
    }
    match state.next_stage() {
        Some(stage) => println!("Next stage: {}", stage),
        None => println!("All stages completed"),
    }
    Ok(())
}
