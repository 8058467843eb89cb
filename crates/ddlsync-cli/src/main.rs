use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ddlsync_catalog::{CatalogState, MemoryCatalog};
use ddlsync_core::{fingerprint, DatabaseSpec, DeploymentConfig, Report, Severity};
use ddlsync_engine::{DeployOptions, Deployer};

const DEFAULT_CONFIG: &str = "ddlsync.toml";
const DEFAULT_STATE: &str = ".ddlsync/state.json";

/// ddlsync - Declarative DDL deployment for analytic catalogs
#[derive(Parser)]
#[command(name = "ddlsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ddlsync.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and resolve the configuration
    Validate,

    /// Show resolved databases and tables with their fingerprints
    Plan,

    /// Converge the catalog to the declared databases and tables
    Deploy {
        /// Only reconcile this database
        #[arg(long)]
        database: Option<String>,

        /// Only reconcile this table
        #[arg(long)]
        table: Option<String>,

        /// Local catalog state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        report: PathBuf,
    },

    /// Delete the declared databases
    Remove {
        /// Only remove this database
        #[arg(long)]
        database: Option<String>,

        /// Local catalog state file
        #[arg(long, default_value = DEFAULT_STATE)]
        state: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = DeploymentConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    if cli.verbose {
        eprintln!("{} {}", "Using config:".cyan(), config_path.display());
        eprintln!("{} {}", "Stack:".cyan(), config.deployment.stack);
    }

    match cli.command {
        Commands::Validate => validate_command(&config),
        Commands::Plan => plan_command(&config),
        Commands::Deploy {
            database,
            table,
            state,
            report,
        } => deploy_command(&config, database, table, &state, &report).await,
        Commands::Remove { database, state } => remove_command(&config, database, &state).await,
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `-v`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

fn validate_command(config: &DeploymentConfig) -> Result<()> {
    let specs = config.resolve()?;
    let tables: usize = specs.iter().map(|db| db.tables.len()).sum();

    println!("{}", "✓ Configuration is valid".green().bold());
    println!("  Databases: {}", specs.len());
    println!("  Tables:    {}", tables);

    Ok(())
}

fn plan_command(config: &DeploymentConfig) -> Result<()> {
    let specs = config.resolve()?;

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Deployment Plan".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
    println!("{} {}", "Stack:".bold(), config.deployment.stack);

    for spec in &specs {
        print_database_plan(spec);
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

fn print_database_plan(spec: &DatabaseSpec) {
    println!();
    println!(
        "{} {}.{}",
        "Database".bold(),
        spec.catalog.as_str(),
        spec.name.green()
    );
    println!("  Workgroup: {}", spec.workgroup);
    println!("  Output:    {}", spec.output);
    for line in spec.ddl.lines() {
        println!("    {}", line.dimmed());
    }

    if spec.tables.is_empty() {
        println!("  {}", "(no tables)".yellow());
    }
    for table in &spec.tables {
        let partitions = if table.keep_partitions {
            "keep partitions"
        } else {
            "discard partitions"
        };
        println!(
            "  - {} {} ({})",
            table.name.green(),
            fingerprint(&table.ddl).cyan(),
            partitions
        );
    }
}

async fn deploy_command(
    config: &DeploymentConfig,
    database: Option<String>,
    table: Option<String>,
    state: &Path,
    report_path: &Path,
) -> Result<()> {
    let specs = config.resolve()?;
    let catalog = load_state(state)?;

    let mut options = DeployOptions::from_settings(&config.deployment);
    if let Some(database) = database {
        options = options.with_database(database);
    }
    if let Some(table) = table {
        options = options.with_table(table);
    }

    let deployer = Deployer::from_config(Arc::new(catalog.clone()), config);
    let report = deployer.deploy(&specs, &options).await;

    save_state(&catalog, state).await?;
    report
        .save_to_file(report_path)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    eprintln!("{} {}", "Report saved to:".green(), report_path.display());

    print_report_summary("Deploy Report", &report);

    if report.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

async fn remove_command(
    config: &DeploymentConfig,
    database: Option<String>,
    state: &Path,
) -> Result<()> {
    let specs = config.resolve()?;
    let catalog = load_state(state)?;

    let mut options = DeployOptions::from_settings(&config.deployment);
    if let Some(database) = database {
        options = options.with_database(database);
    }

    let deployer = Deployer::from_config(Arc::new(catalog.clone()), config);
    let report = deployer.remove(&specs, &options).await;

    save_state(&catalog, state).await?;
    print_report_summary("Remove Report", &report);

    if report.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

/// Catalog contents from a previous run, or an empty catalog
fn load_state(path: &Path) -> Result<MemoryCatalog> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no state file; starting from an empty catalog");
        return Ok(MemoryCatalog::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let state: CatalogState = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(MemoryCatalog::from_state(state))
}

async fn save_state(catalog: &MemoryCatalog, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(&catalog.state().await)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Print report summary to stdout
fn print_report_summary(title: &str, report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", title.bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!("Stack: {}", report.stack);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Tables changed:   {}", report.summary.tables_changed);
    println!("  Tables unchanged: {}", report.summary.tables_unchanged);
    println!("  Orphans dropped:  {}", report.summary.orphans_dropped);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ Nothing to do".green().bold());
    } else {
        println!("{}", "Outcomes:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(phase) = &diag.phase {
                println!("    Phase:  {}", phase);
            }
            if let Some(reason) = &diag.reason {
                println!("    Reason: {}", reason);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}
