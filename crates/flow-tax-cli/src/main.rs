mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::graph::{GraphArgs, ValidateFlowArgs};
use commands::simulate::SimulateArgs;
use commands::tax::{ComprehensiveArgs, EdgeFrictionArgs, IncomeTaxArgs, VatArgs};

/// Tax friction along entity fund-flow chains
#[derive(Parser)]
#[command(
    name = "ftx",
    version,
    about = "Tax friction along entity fund-flow chains",
    long_about = "A CLI for tracing money from funding companies through intermediate \
                  companies and pass-through partnerships to individuals, with decimal \
                  precision. Computes VAT, surtax, EIT and PIT per transfer and \
                  reconciles each individual's comprehensive income."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Repository snapshot (.json, .yaml or .yml); defaults to the bundled sample
    #[arg(long, global = true)]
    snapshot: Option<String>,

    /// Log at debug level to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Progressive, annual-bonus or dividend income tax on one amount
    IncomeTax(IncomeTaxArgs),
    /// VAT and surtax on a VAT-inclusive price
    Vat(VatArgs),
    /// Friction of a single transfer given explicit rates
    EdgeFriction(EdgeFrictionArgs),
    /// Reconcile one individual's salary, bonus, service and dividend income
    Comprehensive(ComprehensiveArgs),
    /// List entities, rules or flow limits of the loaded graph
    Graph(GraphArgs),
    /// Check whether a transfer between two entities is legal
    ValidateFlow(ValidateFlowArgs),
    /// Run a whole fund-flow scenario through the graph
    Simulate(SimulateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let snapshot = cli.snapshot.as_deref();
    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::IncomeTax(args) => commands::tax::run_income_tax(args),
        Commands::Vat(args) => commands::tax::run_vat(args),
        Commands::EdgeFriction(args) => commands::tax::run_edge_friction(args),
        Commands::Comprehensive(args) => commands::tax::run_comprehensive(args),
        Commands::Graph(args) => commands::graph::run_graph(args, snapshot),
        Commands::ValidateFlow(args) => commands::graph::run_validate_flow(args, snapshot),
        Commands::Simulate(args) => commands::simulate::run_simulate(args, snapshot),
        Commands::Version => {
            println!("ftx {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
