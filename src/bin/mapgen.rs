//! Mapping compiler command line
//!
//! # Usage
//!
//! ```bash
//! # Check a mapper file, printing diagnostics only
//! mapgen --schema types.yaml --mappers mappers.yaml check
//!
//! # Print the ordered plans
//! mapgen --schema types.yaml --mappers mappers.yaml plan --format yaml
//!
//! # Render one `.g.cs` file per mapper unit
//! mapgen --schema types.yaml --mappers mappers.yaml render --out generated/
//! ```
//!
//! `RUST_LOG` controls log output (default `info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use mapgen::config::CONFIG_ENV;
use mapgen::{
    load_mappers, load_schema, CompilationOutput, CompilerConfig, Diagnostic, MappingCompiler,
    Severity,
};

#[derive(Parser)]
#[command(name = "mapgen")]
#[command(version)]
#[command(about = "Compile declarative object mappings into ordered plans and source code")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Type schema (YAML)
    #[arg(long, short, global = true)]
    schema: Option<PathBuf>,

    /// Mapper units (YAML)
    #[arg(long, short, global = true)]
    mappers: Option<PathBuf>,

    /// Compiler config (YAML)
    #[arg(long, short, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,

    /// Plan declarations on one thread
    #[arg(long, global = true)]
    sequential: bool,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate mappings and report diagnostics
    Check,

    /// Print the ordered mapping plans
    Plan {
        /// Only this declaration (`Unit.Method` or `Method`)
        #[arg(long)]
        only: Option<String>,
    },

    /// Render source code for every mapper unit
    Render {
        /// Output directory (prints to stdout if not provided)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the batch compiled without errors.
fn run(cli: &Cli) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };
    if cli.sequential {
        config.parallel = false;
    }

    let schema = cli.schema.as_deref().context("--schema is required")?;
    let mappers = cli.mappers.as_deref().context("--mappers is required")?;
    let registry = load_schema(schema)?;
    let units = load_mappers(mappers, &registry)?;

    let output = MappingCompiler::new(&registry, config).compile(&units);

    match &cli.command {
        Commands::Check => cmd_check(&output, cli)?,
        Commands::Plan { only } => cmd_plan(&output, only.as_deref(), cli)?,
        Commands::Render { out } => cmd_render(&output, out.as_deref(), cli)?,
    }

    if cli.format == OutputFormat::Pretty {
        print_diagnostics(&output.diagnostics, cli.quiet);
    }
    Ok(!output.has_errors())
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_check(output: &CompilationOutput, cli: &Cli) -> Result<()> {
    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output.diagnostics)?);
        }
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&output.diagnostics)?),
        OutputFormat::Pretty => {
            if !cli.quiet {
                println!(
                    "{} {} declaration(s) planned across {} unit(s)",
                    "OK".green().bold(),
                    output.plans.len(),
                    output.units.len()
                );
            }
        }
    }
    Ok(())
}

fn cmd_plan(output: &CompilationOutput, only: Option<&str>, cli: &Cli) -> Result<()> {
    let plans: Vec<_> = output
        .plans
        .iter()
        .filter(|p| match only {
            Some(name) => {
                p.declaration.name == name
                    || format!("{}.{}", p.declaration.unit, p.declaration.name) == name
            }
            None => true,
        })
        .collect();

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plans)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&plans)?),
        OutputFormat::Pretty => {
            for plan in plans {
                println!("{}", plan.declaration.to_string().cyan().bold());
                if let Some(condition) = &plan.condition {
                    println!("  condition: {}", condition.call_name());
                }
                for inst in &plan.instantiations {
                    println!("  new {}", inst.path);
                }
                for a in &plan.assignments {
                    println!("  {} <- {} ({:?})", a.destination, a.source, a.conversion.conversion);
                }
                for group in &plan.guarded {
                    println!("  if {:?}:", group.guard.key());
                    for a in &group.assignments {
                        println!("    {} <- {}", a.destination, a.source);
                    }
                }
                for c in &plan.constants {
                    println!("  {} = {:?}", c.destination, c.value);
                }
                for e in &plan.expressions {
                    println!("  {} = {}", e.destination, e.expression);
                }
                for m in &plan.map_using {
                    println!("  {} = {}(source)", m.destination, m.method.call_name());
                }
                for m in &plan.map_from {
                    println!("  {} <- {:?}", m.destination, m.from);
                }
                for n in &plan.nested {
                    println!("  {} <- {}({})", n.destination, n.method.call_name(), n.source);
                }
                for c in &plan.collections {
                    println!(
                        "  {} <- {}.{}({}, {})",
                        c.destination,
                        c.converter,
                        c.shape.builder(),
                        c.source,
                        c.method.call_name()
                    );
                }
                println!();
            }
        }
    }
    Ok(())
}

fn cmd_render(output: &CompilationOutput, out: Option<&Path>, cli: &Cli) -> Result<()> {
    let Some(dir) = out else {
        for unit in &output.units {
            match cli.format {
                OutputFormat::Pretty => {
                    println!("{}", format!("// {}", unit.file_name).dimmed());
                    println!("{}", unit.source);
                }
                _ => println!("{}", unit.source),
            }
        }
        return Ok(());
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for unit in &output.units {
        let path = dir.join(&unit.file_name);
        std::fs::write(&path, &unit.source)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            println!("{} {}", "wrote".green(), path.display());
        }
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &[Diagnostic], quiet: bool) {
    for d in diagnostics {
        let line = d.to_string();
        match d.severity {
            Severity::Error => eprintln!("{}", line.red()),
            Severity::Warning => eprintln!("{}", line.yellow()),
            Severity::Hint | Severity::Info if !quiet => eprintln!("{}", line.dimmed()),
            _ => {}
        }
    }
}
