use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::state_classifier::classify;
use crate::classifier::states::{ClassifiedState, ClassifiedTable};
use crate::config::InsertMode;
use crate::planner::criticality::{CriticalityReport, Disposition, EliminationReason};
use crate::planner::remediation::{PlannedAction, RemediationPlan};
use crate::probe::runner::TableProbeResult;

/// One table's raw probe data plus its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Raw outcomes.
    #[serde(flatten)]
    pub probe: TableProbeResult,
    /// Classification at the time the report was written.
    #[serde(flatten)]
    pub classification: ClassifiedState,
}

impl TableEntry {
    /// Pair a probe result with its classification.
    pub fn new(probe: TableProbeResult) -> Self {
        let classification = classify(&probe.select_outcome, &probe.insert_outcome);
        Self {
            probe,
            classification,
        }
    }

    /// The classified view used by the planner.
    pub fn classified(&self) -> ClassifiedTable {
        ClassifiedTable {
            table_name: self.probe.table_name.clone(),
            classification: self.classification.clone(),
        }
    }
}

/// Everything a probe run produced, serialized as `RLS_PROBE_REPORT_<run_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Timestamp id shared by the run's files.
    pub run_id: String,
    /// When the run finished.
    pub generated_at: DateTime<Utc>,
    /// Probed endpoint (never the key).
    pub base_url: String,
    /// Payload mode used for INSERT probes.
    pub insert_mode: InsertMode,
    /// Per-table results in probe order.
    pub tables: Vec<TableEntry>,
}

impl ProbeReport {
    /// Build a report, classifying each result.
    pub fn new(
        run_id: impl Into<String>,
        generated_at: DateTime<Utc>,
        base_url: impl Into<String>,
        insert_mode: InsertMode,
        results: Vec<TableProbeResult>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            generated_at,
            base_url: base_url.into(),
            insert_mode,
            tables: results.into_iter().map(TableEntry::new).collect(),
        }
    }

    /// Classifications as stored in the report.
    pub fn classified(&self) -> Vec<ClassifiedTable> {
        self.tables.iter().map(TableEntry::classified).collect()
    }

    /// Re-run classification on the stored raw outcomes.
    pub fn reclassify(&mut self) {
        for entry in &mut self.tables {
            entry.classification =
                classify(&entry.probe.select_outcome, &entry.probe.insert_outcome);
        }
    }
}

/// Timestamp id for a run, e.g. `20241019T153000Z`.
pub fn run_id_for(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Build a markdown report with the state table, follow-ups, and leftover rows.
pub fn build_probe_report(report: &ProbeReport, plan: &RemediationPlan) -> String {
    let mut out = String::new();

    writeln!(out, "# RLS Probe Report").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "- Run: `{}`", report.run_id).unwrap();
    writeln!(out, "- Endpoint: `{}`", report.base_url).unwrap();
    writeln!(out, "- Generated: {}", report.generated_at.to_rfc3339()).unwrap();
    writeln!(out, "- Tables probed: {}", report.tables.len()).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "## Table States").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "| Table | State | Confidence | Evidence | Action |").unwrap();
    writeln!(out, "|-------|-------|------------|----------|--------|").unwrap();
    for action in &plan.actions {
        let evidence = report
            .tables
            .iter()
            .find(|t| t.probe.table_name == action.table_name)
            .map(|t| t.classification.evidence.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            action.table_name,
            action.state,
            action.confidence,
            evidence,
            format_action(&action.action)
        )
        .unwrap();
    }

    let needs_data = plan.tables_needing_schema_data();
    if !needs_data.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "## Needs Schema-Compliant Test Data").unwrap();
        writeln!(out).unwrap();
        writeln!(
            out,
            "These INSERT failures come from the probe row itself, not from a policy. \
             Re-run with `--insert-mode schema-aware` and a schema file."
        )
        .unwrap();
        writeln!(out).unwrap();
        for table in needs_data {
            writeln!(out, "- {table}").unwrap();
        }
    }

    let leftovers: Vec<&TableEntry> = report
        .tables
        .iter()
        .filter(|t| t.probe.left_test_row())
        .collect();
    if !leftovers.is_empty() {
        writeln!(out).unwrap();
        writeln!(out, "## Leftover Test Rows").unwrap();
        writeln!(out).unwrap();
        for entry in leftovers {
            let id = entry
                .probe
                .insert_outcome
                .inserted_id()
                .unwrap_or_else(|| "unknown id".to_string());
            writeln!(out, "- {} ({id})", entry.probe.table_name).unwrap();
        }
    }

    let policies = plan.policy_actions().count();
    writeln!(out).unwrap();
    writeln!(out, "## Generated SQL").unwrap();
    writeln!(out).unwrap();
    if policies == 0 {
        writeln!(out, "No policy changes are needed.").unwrap();
    } else {
        writeln!(
            out,
            "{policies} table(s) get a permissive policy in `RLS_PERMISSIVE_POLICIES.sql`; \
             `RLS_CLEANUP_POLICIES.sql` drops them again."
        )
        .unwrap();
    }

    out
}

fn format_action(action: &PlannedAction) -> String {
    match action {
        PlannedAction::ApplyPermissivePolicy { policy_name, .. } => {
            format!("apply permissive policy `{policy_name}`")
        }
        PlannedAction::NeedsSchemaData => "needs schema-compliant test data".to_string(),
        PlannedAction::ReviewForeignKeys => "review foreign keys in test data".to_string(),
        PlannedAction::Investigate { reason } => format!("investigate: {reason}"),
        PlannedAction::NoAction => "none".to_string(),
    }
}

/// Build a markdown summary of a criticality report.
pub fn build_criticality_summary(report: &CriticalityReport) -> String {
    let mut out = String::new();

    writeln!(out, "# Table Criticality").unwrap();
    writeln!(out).unwrap();
    for (level, count) in report.level_counts().iter().rev() {
        writeln!(out, "- {level}: {count}").unwrap();
    }
    writeln!(out).unwrap();

    writeln!(out, "| Table | Score | Level | References | Disposition |").unwrap();
    writeln!(out, "|-------|-------|-------|------------|-------------|").unwrap();
    for t in &report.tables {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            t.score.table_name,
            t.score.score,
            t.score.level,
            t.score.reference_count,
            format_disposition(&t.disposition)
        )
        .unwrap();
    }

    out
}

fn format_disposition(disposition: &Disposition) -> String {
    match disposition {
        Disposition::Keep => "keep".to_string(),
        Disposition::Fix { state } => format!("fix ({state})"),
        Disposition::Eliminate {
            reason: EliminationReason::Orphan,
        } => "eliminate (orphan)".to_string(),
        Disposition::Eliminate {
            reason: EliminationReason::Redundant { kept },
        } => format!("eliminate (redundant with {kept})"),
    }
}
