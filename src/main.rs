//! CLI entry point for `rls-probe`.

use std::path::{Path, PathBuf};
use std::process;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rls_probe::classifier::state_classifier::filter_for_output;
use rls_probe::classifier::states::ConfidenceLevel;
use rls_probe::config::{InsertMode, ProbeConfig};
use rls_probe::output::formatter;
use rls_probe::output::report::{run_id_for, ProbeReport};
use rls_probe::parser::schema::{parse_schema, SchemaCatalog};
use rls_probe::planner::criticality::{assess_tables, count_references};
use rls_probe::planner::remediation::plan_remediation;
use rls_probe::probe::client::RestClient;
use rls_probe::probe::payload::PayloadBuilder;
use rls_probe::probe::runner::{run_audit, RunOptions};

#[derive(Parser)]
#[command(
    name = "rls-probe",
    version,
    about = "Infer row-level security state of PostgREST tables and plan remediation SQL"
)]
struct Cli {
    /// Print debug diagnostics
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe tables with the anonymous key and write reports plus SQL
    Probe(ProbeArgs),
    /// Re-plan a saved probe report without network access
    Plan(PlanArgs),
    /// Score table criticality from source references
    Criticality(CriticalityArgs),
}

#[derive(clap::Args)]
struct ProbeArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the project (overrides config and RLS_PROBE_URL)
    #[arg(long)]
    url: Option<String>,

    /// Table to probe; repeatable (overrides the config list)
    #[arg(long = "table")]
    tables: Vec<String>,

    /// DDL file describing the tables
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// INSERT payload mode: minimal or schema-aware
    #[arg(long)]
    insert_mode: Option<InsertMode>,

    /// Also probe UPDATE on inserted test rows
    #[arg(long)]
    full_crud: bool,

    /// Minimum confidence level to include in the plan
    #[arg(long, default_value = "D")]
    min_confidence: ConfidenceLevel,

    /// Output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
struct PlanArgs {
    /// Probe report JSON written by `rls-probe probe`
    #[arg(long)]
    report: PathBuf,

    /// Schema for unqualified table names
    #[arg(long, default_value = "public")]
    schema: String,

    /// Minimum confidence level to include in the plan
    #[arg(long, default_value = "D")]
    min_confidence: ConfidenceLevel,

    /// Output directory
    #[arg(long, default_value = "rls-probe-output")]
    output_dir: PathBuf,
}

#[derive(clap::Args)]
struct CriticalityArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source directory to scan for table references; repeatable
    #[arg(long = "source", required = true)]
    sources: Vec<PathBuf>,

    /// Table to score; repeatable
    #[arg(long = "table")]
    tables: Vec<String>,

    /// DDL file; its tables are scored when no --table is given
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Probe report JSON; policy-blocked tables are marked for fixing
    #[arg(long)]
    probe_report: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Command::Probe(args) => run_probe(args).await,
        Command::Plan(args) => run_plan(args),
        Command::Criticality(args) => run_criticality(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run_probe(args: ProbeArgs) -> Result<(), String> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(url) = args.url {
        config.target.base_url = url;
    }
    if let Some(mode) = args.insert_mode {
        config.probe.insert_mode = mode;
    }
    if args.full_crud {
        config.probe.full_crud = true;
    }
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }

    let catalog = args.schema_file.as_deref().map(read_schema).transpose()?;
    if !args.tables.is_empty() {
        config.probe.tables = args.tables;
    } else if config.probe.tables.is_empty() {
        if let Some(catalog) = &catalog {
            config.probe.tables = catalog.table_names();
        }
    }
    config.validate_for_probe().map_err(|e| e.to_string())?;

    let payloads = match (config.probe.insert_mode, catalog) {
        (InsertMode::Minimal, _) => PayloadBuilder::minimal(),
        (InsertMode::SchemaAware, Some(catalog)) => PayloadBuilder::schema_aware(catalog),
        (InsertMode::SchemaAware, None) => {
            return Err("--insert-mode schema-aware requires --schema-file".to_string());
        }
    };

    let client = RestClient::from_config(&config).map_err(|e| e.to_string())?;
    info!(
        url = %config.target.base_url,
        tables = config.probe.tables.len(),
        mode = ?payloads.mode(),
        "starting probe run"
    );

    let options = RunOptions {
        delay: config.probe.delay(),
        full_crud: config.probe.full_crud,
    };
    let results = run_audit(&client, &config.probe.tables, &payloads, &options).await;

    let now = Utc::now();
    let report = ProbeReport::new(
        run_id_for(now),
        now,
        config.target.base_url.clone(),
        payloads.mode(),
        results,
    );
    write_probe_files(
        &config.output.dir,
        &report,
        &config.target.schema,
        args.min_confidence,
    )
}

fn run_plan(args: PlanArgs) -> Result<(), String> {
    let mut report = formatter::load_probe_report(&args.report).map_err(|e| e.to_string())?;
    report.reclassify();
    debug!(run_id = %report.run_id, tables = report.tables.len(), "loaded probe report");
    write_probe_files(&args.output_dir, &report, &args.schema, args.min_confidence)
}

fn write_probe_files(
    output_dir: &Path,
    report: &ProbeReport,
    schema: &str,
    min_confidence: ConfidenceLevel,
) -> Result<(), String> {
    let classified = report.classified();
    for table in &classified {
        debug!(
            table = %table.table_name,
            state = %table.state(),
            confidence = %table.confidence(),
            "classified table"
        );
    }
    let output_tables = filter_for_output(&classified, min_confidence);
    let plan = plan_remediation(&output_tables, schema);

    let artifacts =
        formatter::write_probe_output(output_dir, report, &plan).map_err(|e| e.to_string())?;
    println!("{}", artifacts.report_json.display());
    println!("{}", artifacts.report_markdown.display());
    println!("{}", artifacts.permissive_sql.display());
    println!("{}", artifacts.cleanup_sql.display());
    Ok(())
}

fn run_criticality(args: CriticalityArgs) -> Result<(), String> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }

    let tables = if !args.tables.is_empty() {
        args.tables
    } else if let Some(path) = &args.schema_file {
        read_schema(path)?.table_names()
    } else {
        config.probe.tables.clone()
    };
    if tables.is_empty() {
        return Err("no tables to score (use --table, --schema-file, or probe.tables)".to_string());
    }

    let probe_states = args
        .probe_report
        .as_deref()
        .map(|path| {
            formatter::load_probe_report(path)
                .map(|report| report.classified())
                .map_err(|e| e.to_string())
        })
        .transpose()?;

    let references =
        count_references(&args.sources, &config.criticality.source_extensions, &tables)?;
    let report = assess_tables(
        &tables,
        &references,
        &config.criticality,
        probe_states.as_deref(),
    );

    let run_id = run_id_for(Utc::now());
    let artifacts = formatter::write_criticality_output(&config.output.dir, &run_id, &report)
        .map_err(|e| e.to_string())?;
    println!("{}", artifacts.report_json.display());
    println!("{}", artifacts.summary_markdown.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ProbeConfig, String> {
    let config = match path {
        Some(path) => ProbeConfig::load(path).map_err(|e| e.to_string())?,
        None => ProbeConfig::from_env(),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn read_schema(path: &Path) -> Result<SchemaCatalog, String> {
    let sql = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let catalog = parse_schema(&sql)?;
    debug!(path = %path.display(), tables = catalog.number_of_tables(), "parsed schema file");
    Ok(catalog)
}
