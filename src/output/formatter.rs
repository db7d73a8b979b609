use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::output::report::{self, ProbeReport};
use crate::planner::criticality::CriticalityReport;
use crate::planner::remediation::RemediationPlan;

/// Cleanup SQL file name. Fixed so operators always find it in the same place.
pub const CLEANUP_SQL_FILE: &str = "RLS_CLEANUP_POLICIES.sql";
/// Permissive policy SQL file name.
pub const PERMISSIVE_SQL_FILE: &str = "RLS_PERMISSIVE_POLICIES.sql";

/// Errors while reading or writing report files.
#[derive(Error, Debug)]
pub enum OutputError {
    /// A run id or file name that would escape the output directory.
    #[error("Invalid output name: {0}")]
    InvalidName(String),

    /// Filesystem failure on a specific path.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// JSON (de)serialization failure.
    #[error("Invalid report JSON in {path}: {source}")]
    Json {
        /// Report path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Paths written by [`write_probe_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeArtifacts {
    /// `RLS_PROBE_REPORT_<run_id>.json`
    pub report_json: PathBuf,
    /// `RLS_PROBE_REPORT_<run_id>.md`
    pub report_markdown: PathBuf,
    /// `RLS_CLEANUP_POLICIES.sql`
    pub cleanup_sql: PathBuf,
    /// `RLS_PERMISSIVE_POLICIES.sql`
    pub permissive_sql: PathBuf,
}

/// Paths written by [`write_criticality_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalityArtifacts {
    /// `TABLAS_CRITICAS_IDENTIFICADAS_<run_id>.json`
    pub report_json: PathBuf,
    /// `TABLAS_CRITICAS_IDENTIFICADAS_<run_id>.md`
    pub summary_markdown: PathBuf,
}

/// Write the probe report, its markdown rendering, and both SQL files.
pub fn write_probe_output(
    output_dir: &Path,
    probe_report: &ProbeReport,
    plan: &RemediationPlan,
) -> Result<ProbeArtifacts, OutputError> {
    validate_output_name(&probe_report.run_id)?;
    create_dir(output_dir)?;

    let report_json = output_dir.join(format!("RLS_PROBE_REPORT_{}.json", probe_report.run_id));
    write_json(&report_json, probe_report)?;

    let report_markdown = output_dir.join(format!("RLS_PROBE_REPORT_{}.md", probe_report.run_id));
    write_file(&report_markdown, &report::build_probe_report(probe_report, plan))?;

    let cleanup_sql = output_dir.join(CLEANUP_SQL_FILE);
    write_file(&cleanup_sql, &plan.cleanup_sql())?;

    let permissive_sql = output_dir.join(PERMISSIVE_SQL_FILE);
    write_file(&permissive_sql, &plan.permissive_sql())?;

    info!(
        dir = %output_dir.display(),
        tables = probe_report.tables.len(),
        policies = plan.policy_actions().count(),
        "wrote probe output"
    );

    Ok(ProbeArtifacts {
        report_json,
        report_markdown,
        cleanup_sql,
        permissive_sql,
    })
}

/// Write the criticality report as JSON plus a markdown summary.
pub fn write_criticality_output(
    output_dir: &Path,
    run_id: &str,
    criticality: &CriticalityReport,
) -> Result<CriticalityArtifacts, OutputError> {
    validate_output_name(run_id)?;
    create_dir(output_dir)?;

    let report_json = output_dir.join(format!("TABLAS_CRITICAS_IDENTIFICADAS_{run_id}.json"));
    write_json(&report_json, criticality)?;

    let summary_markdown = output_dir.join(format!("TABLAS_CRITICAS_IDENTIFICADAS_{run_id}.md"));
    write_file(&summary_markdown, &report::build_criticality_summary(criticality))?;

    info!(
        dir = %output_dir.display(),
        tables = criticality.tables.len(),
        eliminated = criticality.eliminated().count(),
        "wrote criticality output"
    );

    Ok(CriticalityArtifacts {
        report_json,
        summary_markdown,
    })
}

/// Read back a report written by [`write_probe_output`].
pub fn load_probe_report(path: &Path) -> Result<ProbeReport, OutputError> {
    let content = std::fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(dir: &Path) -> Result<(), OutputError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), OutputError> {
    std::fs::write(path, content).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    write_file(path, &json)
}

fn validate_output_name(name: &str) -> Result<(), OutputError> {
    if name.trim().is_empty() {
        return Err(OutputError::InvalidName(
            "output name must not be empty".to_string(),
        ));
    }
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return Err(OutputError::InvalidName(format!(
            "'{name}': absolute paths are not allowed"
        )));
    }
    if candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return Err(OutputError::InvalidName(format!(
            "'{name}': traversal segments are not allowed"
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(OutputError::InvalidName(format!(
            "'{name}': path separators are not allowed"
        )));
    }
    Ok(())
}
