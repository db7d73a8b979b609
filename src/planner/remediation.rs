use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::classifier::states::{ClassifiedTable, ConfidenceLevel, InferredState};
use crate::parser::names::{policy_safe_name, qualified_table_name, quote_identifier};

/// Prefix shared by every generated policy so cleanup can target them by name.
pub const PERMISSIVE_POLICY_PREFIX: &str = "rls_probe_permissive_";

/// `PostgreSQL` truncates identifiers to 63 bytes; generated names stay within that.
const MAX_IDENTIFIER_LEN: usize = 63;

/// What the planner recommends for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    /// Replace blocking policies with a permissive `FOR ALL` policy.
    ApplyPermissivePolicy {
        /// Fixed policy name for the table.
        policy_name: String,
        /// `DROP POLICY IF EXISTS` statement.
        drop_sql: String,
        /// `CREATE POLICY` statement.
        create_sql: String,
    },
    /// The probe row was incomplete; re-run with schema-aware payloads.
    NeedsSchemaData,
    /// The probe row referenced a missing parent row.
    ReviewForeignKeys,
    /// Classification did not match any rule.
    Investigate {
        /// Observation that did not match.
        reason: String,
    },
    /// Nothing to do.
    NoAction,
}

/// Planned action for one table, with the classification that led to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAction {
    /// Table as probed.
    pub table_name: String,
    /// Inferred state.
    pub state: InferredState,
    /// Confidence of the inferred state.
    pub confidence: ConfidenceLevel,
    /// Recommendation.
    pub action: PlannedAction,
}

/// Actions for every classified table, in probe order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPlan {
    /// Schema used for unqualified table names.
    pub schema: String,
    /// One entry per table.
    pub actions: Vec<TableAction>,
}

/// Policy name for `table`. Stable across runs so `DROP POLICY IF EXISTS` is idempotent.
pub fn permissive_policy_name(table: &str) -> String {
    let mut name = format!("{PERMISSIVE_POLICY_PREFIX}{}", policy_safe_name(table));
    if name.len() > MAX_IDENTIFIER_LEN {
        // policy_safe_name yields ASCII only, so byte truncation is char-safe.
        name.truncate(MAX_IDENTIFIER_LEN);
    }
    name
}

/// `DROP POLICY IF EXISTS "<name>" ON <schema>."<table>";`
pub fn drop_policy_sql(schema: &str, table: &str) -> String {
    format!(
        "DROP POLICY IF EXISTS {} ON {};",
        quote_identifier(&permissive_policy_name(table)),
        qualified_table_name(schema, table)
    )
}

/// `CREATE POLICY "<name>" ON <schema>."<table>" FOR ALL USING (true) WITH CHECK (true);`
pub fn create_permissive_policy_sql(schema: &str, table: &str) -> String {
    format!(
        "CREATE POLICY {} ON {} FOR ALL USING (true) WITH CHECK (true);",
        quote_identifier(&permissive_policy_name(table)),
        qualified_table_name(schema, table)
    )
}

/// Turn classified tables into an action plan.
pub fn plan_remediation(tables: &[ClassifiedTable], schema: &str) -> RemediationPlan {
    let actions = tables
        .iter()
        .map(|table| {
            let action = match table.state() {
                InferredState::PolicyBlocksInsert | InferredState::PolicyBlocksSelect => {
                    PlannedAction::ApplyPermissivePolicy {
                        policy_name: permissive_policy_name(&table.table_name),
                        drop_sql: drop_policy_sql(schema, &table.table_name),
                        create_sql: create_permissive_policy_sql(schema, &table.table_name),
                    }
                }
                InferredState::SchemaConstraintViolation => PlannedAction::NeedsSchemaData,
                InferredState::ForeignKeyViolation => PlannedAction::ReviewForeignKeys,
                InferredState::Unknown { reason } => PlannedAction::Investigate {
                    reason: reason.clone(),
                },
                InferredState::NoRestriction => PlannedAction::NoAction,
            };
            TableAction {
                table_name: table.table_name.clone(),
                state: table.state().clone(),
                confidence: table.confidence(),
                action,
            }
        })
        .collect();

    RemediationPlan {
        schema: schema.to_string(),
        actions,
    }
}

impl RemediationPlan {
    /// Actions that carry SQL.
    pub fn policy_actions(&self) -> impl Iterator<Item = &TableAction> {
        self.actions
            .iter()
            .filter(|a| matches!(a.action, PlannedAction::ApplyPermissivePolicy { .. }))
    }

    /// Tables whose INSERT failed only because the probe row was incomplete.
    pub fn tables_needing_schema_data(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|a| a.action == PlannedAction::NeedsSchemaData)
            .map(|a| a.table_name.as_str())
            .collect()
    }

    /// SQL dropping every generated policy. Safe to run any number of times.
    pub fn cleanup_sql(&self) -> String {
        let mut out = String::new();
        writeln!(out, "-- RLS cleanup: drops policies created by RLS_PERMISSIVE_POLICIES.sql").unwrap();
        writeln!(out, "-- Every statement uses IF EXISTS and can be re-run.").unwrap();

        let mut any = false;
        for action in self.policy_actions() {
            if let PlannedAction::ApplyPermissivePolicy { drop_sql, .. } = &action.action {
                writeln!(out).unwrap();
                writeln!(out, "{}", action_comment(action)).unwrap();
                writeln!(out, "{drop_sql}").unwrap();
                any = true;
            }
        }
        if !any {
            writeln!(out).unwrap();
            writeln!(out, "-- No tables require policy changes.").unwrap();
        }
        out
    }

    /// SQL replacing blocking policies with permissive ones (DROP then CREATE per table).
    pub fn permissive_sql(&self) -> String {
        let mut out = String::new();
        writeln!(out, "-- RLS permissive policies for tables whose probes were blocked").unwrap();
        writeln!(out, "-- Each policy is dropped before it is created, so the file can be re-run.").unwrap();

        let mut any = false;
        for action in self.policy_actions() {
            if let PlannedAction::ApplyPermissivePolicy {
                drop_sql,
                create_sql,
                ..
            } = &action.action
            {
                writeln!(out).unwrap();
                writeln!(out, "{}", action_comment(action)).unwrap();
                writeln!(out, "{drop_sql}").unwrap();
                writeln!(out, "{create_sql}").unwrap();
                any = true;
            }
        }
        if !any {
            writeln!(out).unwrap();
            writeln!(out, "-- No tables require policy changes.").unwrap();
        }
        out
    }
}

fn action_comment(action: &TableAction) -> String {
    format!(
        "-- {} ({}, confidence {})",
        action.table_name,
        action.state.label(),
        action.confidence
    )
}
