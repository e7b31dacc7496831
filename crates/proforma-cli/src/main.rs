mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::monte_carlo::{MonteCarloArgs, RiskArgs};
use commands::statements::StatementsArgs;
use commands::valuation::{ScenariosArgs, SensitivityArgs, ValuationArgs};

/// Pro-forma statements and valuation for service businesses
#[derive(Parser)]
#[command(
    name = "proforma",
    version,
    about = "Pro-forma financial statements and valuation for service businesses",
    long_about = "Builds income statement, balance sheet and cash flow projections from \
                  historical service records, then values them with DCF, NPV, IRR, \
                  sensitivity grids, scenarios and Monte Carlo simulation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Debug logging on stderr unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate input and generate all three statements
    Statements(StatementsArgs),
    /// Check historical data without generating statements
    Validate(StatementsArgs),
    /// Service business metrics
    Metrics(StatementsArgs),
    /// Statements plus dashboard KPIs
    Dashboard(StatementsArgs),
    /// Terminal value, DCF, NPV, IRR, payback and owner ROI
    Valuation(ValuationArgs),
    /// WACC x growth matrix, tornado and heatmap
    Sensitivity(SensitivityArgs),
    /// Base, best and worst case KPIs with driver sensitivity
    Scenarios(ScenariosArgs),
    /// Monte Carlo NPV histogram
    MonteCarlo(MonteCarloArgs),
    /// Simulated NPV probabilities and confidence bands
    Risk(RiskArgs),
    /// List supported company types
    CompanyTypes,
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

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Statements(args) => commands::statements::run_statements(args),
        Commands::Validate(args) => commands::statements::run_validate(args),
        Commands::Metrics(args) => commands::statements::run_metrics(args),
        Commands::Dashboard(args) => commands::statements::run_dashboard(args),
        Commands::Valuation(args) => commands::valuation::run_valuation(args),
        Commands::Sensitivity(args) => commands::valuation::run_sensitivity_cmd(args),
        Commands::Scenarios(args) => commands::valuation::run_scenarios_cmd(args),
        Commands::MonteCarlo(args) => commands::monte_carlo::run_monte_carlo(args),
        Commands::Risk(args) => commands::monte_carlo::run_risk(args),
        Commands::CompanyTypes => commands::statements::run_company_types(),
        Commands::Version => {
            println!("proforma {}", env!("CARGO_PKG_VERSION"));
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
