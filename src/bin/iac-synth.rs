// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Synthesizer
//!
//! Builds every part of the workshop deployment and writes the resulting
//! templates and manifest to the output directory.
//!
//! Run with: cargo run --bin iac-synth -- synth -c branch=main \
//!     -c private-subnets=subnet-a,subnet-b -c public-subnets=subnet-c
//!
//! The workshop VPC is looked up by id; its subnet ids come from the
//! `private-subnets` and `public-subnets` context values.
//!
//! Account and region come from `CDK_DEFAULT_ACCOUNT` and
//! `CDK_DEFAULT_REGION`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use iac_stacks::assembly::Assembly;
use iac_stacks::composition::{BuildReport, PartOutcome, RecordingObserver, StackBuilder, TracingObserver};
use iac_stacks::config::{parse_context_arg, DeploymentConfig, NetworkSettings};
use iac_stacks::logging::{init_logging, LogFormat, LoggingConfig};
use iac_stacks::workshop::{workshop_parts, ModulePaths, WORKSHOP_REPOSITORY, WORKSHOP_VPC_ID};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// Synthesize deployment templates for the workshop stacks
#[derive(Parser, Debug)]
#[command(name = "iac-synth", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Debug logging")]
    verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Only log errors"
    )]
    quiet: bool,

    #[arg(long, global = true, help = "Log as JSON lines")]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every part and write the assembly
    Synth(RunArgs),
    /// Build every part and print the stack ids in deployment order
    List(RunArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[arg(
        short = 'c',
        long = "context",
        value_name = "KEY=VALUE",
        value_parser = parse_context_arg,
        help = "Context value, e.g. branch=main (repeatable)"
    )]
    context: Vec<(String, String)>,

    #[arg(long, value_name = "FILE", help = "JSON deployment config")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ID", help = "Project (repository) id")]
    project: Option<String>,

    #[arg(long, value_name = "ID", help = "Existing VPC to deploy into")]
    vpc_id: Option<String>,

    #[arg(long, value_name = "DIR", help = "Output directory")]
    out: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Repository root holding the build inputs")]
    source_root: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(
        &LoggingConfig::from_flags(cli.log_level.as_deref(), cli.verbose, cli.quiet)
            .with_format(format),
    );
    debug!("Arguments: {:?}", cli);

    let exit_code = match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "Synthesis failed");
            eprintln!("Error: {:#}", err);
            1
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<()> {
    let (args, write) = match &cli.command {
        Command::Synth(args) => (args, true),
        Command::List(args) => (args, false),
    };

    let config = load_config(args)?;
    let recorder = Arc::new(RecordingObserver::forwarding(Arc::new(TracingObserver)));

    let builder = StackBuilder::new(&config, recorder.clone())
        .context("Failed to resolve shared prerequisites")?;
    let paths = ModulePaths::workshop(builder.props().source_root.clone());
    if write && !cli.quiet {
        print_module_paths(&paths);
    }

    let parts = workshop_parts(builder.props(), &paths);
    let report = builder.build(parts).context("Stack build halted")?;
    let assembly = Assembly::from_report(&report).context("Failed to assemble stacks")?;

    if write {
        let manifest = assembly
            .write(&config.out_dir)
            .with_context(|| format!("Failed to write assembly to {}", config.out_dir.display()))?;
        if !cli.quiet {
            print_summary(&report, &assembly);
            println!("Manifest: {}", manifest.display());
        }
    } else {
        for stack_id in assembly.stack_ids() {
            println!("{}", stack_id);
        }
    }

    for warning in recorder.warnings() {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Config file or defaults, then command line overrides
fn load_config(args: &RunArgs) -> Result<DeploymentConfig> {
    let mut config = match &args.config {
        Some(path) => DeploymentConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DeploymentConfig::from_env(
            WORKSHOP_REPOSITORY,
            NetworkSettings::lookup(WORKSHOP_VPC_ID),
        ),
    };

    if let Some(project) = &args.project {
        config.project_id = project.clone();
    }
    if let Some(vpc_id) = &args.vpc_id {
        match &mut config.network {
            NetworkSettings::Lookup { vpc_id: current, .. } => *current = vpc_id.clone(),
            NetworkSettings::Provision(_) => config.network = NetworkSettings::lookup(vpc_id),
        }
    }
    if let Some(out) = &args.out {
        config.out_dir = out.clone();
    }
    if let Some(root) = &args.source_root {
        config.source_root = root.clone();
    }
    for (key, value) in &args.context {
        config.context.insert(key.clone(), value.clone());
    }

    config.validate().context("Invalid deployment config")?;
    Ok(config)
}

/// Rounded table with cyan headers
fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|title| Cell::new(title).fg(Color::Cyan)));
    table
}

/// Build inputs, green when present on disk
fn module_paths_table(paths: &ModulePaths) -> Table {
    let mut table = new_table(&["Module", "Path"]);
    for (label, path) in paths.entries() {
        let color = if path.exists() { Color::Green } else { Color::Yellow };
        table.add_row(vec![Cell::new(label), Cell::new(path.display()).fg(color)]);
    }
    table
}

fn print_module_paths(paths: &ModulePaths) {
    println!("{}", module_paths_table(paths));
}

fn print_summary(report: &BuildReport, assembly: &Assembly) {
    println!("Branch: {}", report.branch);

    let mut parts = new_table(&["Part", "Outcome", "Stacks"]);
    for part in &report.parts {
        match &part.outcome {
            PartOutcome::Built { units } => parts.add_row(vec![
                Cell::new(&part.name),
                Cell::new("built").fg(Color::Green),
                Cell::new(units.len()),
            ]),
            PartOutcome::Skipped { reason } => parts.add_row(vec![
                Cell::new(&part.name),
                Cell::new("skipped").fg(Color::Yellow),
                Cell::new(reason),
            ]),
        };
    }
    println!("{parts}");

    let mut order = new_table(&["#", "Stack"]);
    for (position, stack_id) in assembly.stack_ids().into_iter().enumerate() {
        order.add_row(vec![Cell::new(position + 1), Cell::new(stack_id)]);
    }
    println!("{order}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_paths_render_as_rounded_table() {
        let paths = ModulePaths::workshop("/nonexistent/workshop");
        let rendered = module_paths_table(&paths).to_string();

        assert!(rendered.starts_with('╭'));
        assert!(rendered.contains("Module"));
        assert!(rendered.contains("Path"));
        for label in ["Repository Root", "API Dockerfile", "Frontend Dist"] {
            assert!(rendered.contains(label), "missing {label}");
        }
        assert!(rendered.contains("/nonexistent/workshop"));
    }
}
