use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rx_advisor::config::{Config, ConfigOverrides, KnowledgeSourceKind};
use rx_advisor::coverage::CoverageReport;
use rx_advisor::evaluator::{Evaluator, DEFAULT_SEARCH_LIMIT};
use rx_advisor::interactions::InteractionSummary;
use rx_advisor::output::csv::{alternatives_to_csv, coverage_to_csv, interactions_to_csv};
use rx_advisor::output::json::{render_json, StampedReport};
use rx_advisor::output::table::{
    render_alternatives_table, render_coverage_table, render_interactions_table,
    render_report_tables, render_search_table,
};
use rx_advisor::report::{AlternativesEntry, Prescription, PrescriptionReport};
use rx_advisor::server::run_server;
use rx_advisor::sources::DrugSummary;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "rx-advisor",
    about = "Medication alternatives, interaction checks and insurance coverage"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// static, http or layered
    #[arg(short, long)]
    source: Option<KnowledgeSourceKind>,
    #[arg(long = "base-url")]
    base_url: Option<String>,
    #[arg(long)]
    dataset: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Alternatives {
        #[arg(short, long)]
        file: PathBuf,
    },
    Interactions {
        #[arg(short, long)]
        file: PathBuf,
    },
    Coverage {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long = "policy-id")]
        policy_id: Option<String>,
        #[arg(long)]
        plan: Option<String>,
    },
    Evaluate {
        #[arg(short, long)]
        file: PathBuf,
    },
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    let (provider, policy_id, plan_name) = match &cli.command {
        Commands::Coverage {
            provider,
            policy_id,
            plan,
            ..
        } => (provider.clone(), policy_id.clone(), plan.clone()),
        _ => (None, None, None),
    };
    config.apply_overrides(ConfigOverrides {
        source: cli.source,
        base_url: cli.base_url.clone(),
        dataset_path: cli.dataset.clone(),
        provider,
        policy_id,
        plan_name,
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }
    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
        let bind = config.bind_address();
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
        return run_server(config, addr).await;
    }

    let evaluator = Evaluator::from_config(&config)?;

    match &cli.command {
        Commands::Alternatives { file } => {
            let prescription = read_prescription(file)?;
            let insurance = prescription.insurance_or(evaluator.default_insurance());
            let entries = evaluator
                .alternatives_for_all(&prescription.medications, &insurance)
                .await?;
            print_alternatives(&entries, cli.output)?;
        }
        Commands::Interactions { file } => {
            let prescription = read_prescription(file)?;
            let summary = evaluator
                .check_interactions(&prescription.medications)
                .await?;
            print_interactions(&summary, cli.output)?;
        }
        Commands::Coverage { file, .. } => {
            let prescription = read_prescription(file)?;
            let insurance = prescription.insurance_or(evaluator.default_insurance());
            let report = evaluator
                .reconcile_coverage(&prescription.medications, &insurance)
                .await?;
            print_coverage(&report, cli.output)?;
        }
        Commands::Evaluate { file } => {
            let prescription = read_prescription(file)?;
            let report = evaluator.evaluate_prescription(&prescription).await?;
            print_report(&report, cli.output)?;
        }
        Commands::Search { query, limit } => {
            let hits = evaluator.search(query, *limit).await?;
            print_search(&hits, cli.output)?;
        }
        Commands::Config { .. } | Commands::Serve { .. } => {}
    }

    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, config_path: &Path) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if *show || !*init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

/// Accepts a `Prescription` document or a bare array of medications.
fn read_prescription(path: &Path) -> Result<Prescription> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading prescription: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let prescription = if value.is_array() {
        Prescription::new(serde_json::from_value(value)?)
    } else {
        serde_json::from_value(value)
            .with_context(|| format!("invalid prescription document: {}", path.display()))?
    };
    Ok(prescription)
}

fn print_alternatives(entries: &[AlternativesEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_alternatives_table(entries)),
        OutputFormat::Json => println!("{}", render_json(entries)?),
        OutputFormat::Csv => println!("{}", alternatives_to_csv(entries)?),
    }
    Ok(())
}

fn print_interactions(summary: &InteractionSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_interactions_table(summary)),
        OutputFormat::Json => println!("{}", render_json(summary)?),
        OutputFormat::Csv => println!("{}", interactions_to_csv(summary)?),
    }
    Ok(())
}

fn print_coverage(report: &CoverageReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_coverage_table(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => println!("{}", coverage_to_csv(report)?),
    }
    Ok(())
}

fn print_report(report: &PrescriptionReport, format: OutputFormat) -> Result<()> {
    let stamped = StampedReport::new(report)?;
    match format {
        OutputFormat::Table => println!("{}", render_report_tables(report, &stamped.fingerprint)),
        OutputFormat::Json => println!("{}", render_json(&stamped)?),
        OutputFormat::Csv => {
            warn!("CSV output for evaluate not implemented, using JSON");
            println!("{}", render_json(&stamped)?);
        }
    }
    Ok(())
}

fn print_search(hits: &[DrugSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_search_table(hits)),
        OutputFormat::Json => println!("{}", render_json(hits)?),
        OutputFormat::Csv => {
            warn!("CSV output for search not implemented, using JSON");
            println!("{}", render_json(hits)?);
        }
    }
    Ok(())
}
