use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::probe::client::RestProbe;
use crate::probe::outcome::Outcome;
use crate::probe::payload::PayloadBuilder;

/// Everything observed while probing one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProbeResult {
    /// Table as given in the run's table list.
    pub table_name: String,
    /// Outcome of the SELECT probe.
    pub select_outcome: Outcome,
    /// Outcome of the INSERT probe.
    pub insert_outcome: Outcome,
    /// Outcome of the UPDATE probe, when full CRUD probing ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_outcome: Option<Outcome>,
    /// Outcome of the DELETE that removed the test row, when one was inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_outcome: Option<Outcome>,
    /// Error bodies of the SELECT and INSERT probes, joined.
    pub raw_error_text: String,
}

impl TableProbeResult {
    /// Assemble a result from the two classification-relevant outcomes.
    pub fn new(table_name: impl Into<String>, select_outcome: Outcome, insert_outcome: Outcome) -> Self {
        let raw_error_text = [select_outcome.error_body(), insert_outcome.error_body()]
            .into_iter()
            .flatten()
            .filter(|body| !body.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        Self {
            table_name: table_name.into(),
            select_outcome,
            insert_outcome,
            update_outcome: None,
            cleanup_outcome: None,
            raw_error_text,
        }
    }

    /// True when the INSERT succeeded but the test row is still in the table.
    pub fn left_test_row(&self) -> bool {
        self.insert_outcome.is_success()
            && !self
                .cleanup_outcome
                .as_ref()
                .is_some_and(Outcome::is_success)
    }
}

/// Knobs for [`run_audit`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Pause between tables.
    pub delay: Duration,
    /// Probe UPDATE on the inserted row before deleting it.
    pub full_crud: bool,
}

/// Probe every table in order, one at a time, pausing `options.delay` between tables.
///
/// A failed probe is recorded and the run moves on to the next table.
pub async fn run_audit<P>(
    probe: &P,
    tables: &[String],
    payloads: &PayloadBuilder,
    options: &RunOptions,
) -> Vec<TableProbeResult>
where
    P: RestProbe + ?Sized,
{
    let mut results = Vec::with_capacity(tables.len());

    for (index, table) in tables.iter().enumerate() {
        if index > 0 && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }

        let result = probe_table(probe, table, payloads, options.full_crud).await;
        info!(
            table = %table,
            select = ?result.select_outcome.status(),
            insert = ?result.insert_outcome.status(),
            "probed table ({}/{})",
            index + 1,
            tables.len()
        );
        results.push(result);
    }

    results
}

/// Probe a single table: SELECT, INSERT, optional UPDATE, then cleanup DELETE.
pub async fn probe_table<P>(
    probe: &P,
    table: &str,
    payloads: &PayloadBuilder,
    full_crud: bool,
) -> TableProbeResult
where
    P: RestProbe + ?Sized,
{
    let select_outcome = probe.probe_select(table).await;
    let insert_outcome = probe.probe_insert(table, &payloads.insert_payload(table)).await;

    let inserted_id = insert_outcome.inserted_id();
    let inserted = insert_outcome.is_success();
    let mut result = TableProbeResult::new(table, select_outcome, insert_outcome);

    if !inserted {
        return result;
    }

    let Some(id) = inserted_id else {
        warn!(
            table = %table,
            "insert succeeded without returning an id; test row was not cleaned up"
        );
        return result;
    };

    if full_crud {
        result.update_outcome = Some(
            probe
                .probe_update(table, &id, &payloads.update_payload(table))
                .await,
        );
    }

    let cleanup = probe.probe_delete(table, &id).await;
    if !cleanup.is_success() {
        warn!(
            table = %table,
            id = %id,
            status = ?cleanup.status(),
            "cleanup delete failed; test row remains"
        );
    }
    result.cleanup_outcome = Some(cleanup);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedProbe {
        calls: Mutex<Vec<String>>,
        insert: Option<Outcome>,
        delete_fails: bool,
    }

    impl ScriptedProbe {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl RestProbe for ScriptedProbe {
        async fn probe_select(&self, table: &str) -> Outcome {
            self.record(format!("select {table}"));
            Outcome::success(json!([]))
        }

        async fn probe_insert(&self, table: &str, payload: &Value) -> Outcome {
            self.record(format!("insert {table} {payload}"));
            self.insert
                .clone()
                .unwrap_or_else(|| Outcome::success(json!([{"id": 7}])))
        }

        async fn probe_update(&self, table: &str, id: &str, _payload: &Value) -> Outcome {
            self.record(format!("update {table} {id}"));
            Outcome::success(Value::Null)
        }

        async fn probe_delete(&self, table: &str, id: &str) -> Outcome {
            self.record(format!("delete {table} {id}"));
            if self.delete_fails {
                Outcome::http_error(401, "permission denied")
            } else {
                Outcome::success(Value::Null)
            }
        }
    }

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn tables_are_probed_in_order_with_cleanup_after_each_insert() {
        let probe = ScriptedProbe::default();
        let results = run_audit(
            &probe,
            &tables(&["organizaciones", "proveedores"]),
            &PayloadBuilder::minimal(),
            &RunOptions::default(),
        )
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(
            probe.calls(),
            vec![
                "select organizaciones",
                "insert organizaciones {}",
                "delete organizaciones 7",
                "select proveedores",
                "insert proveedores {}",
                "delete proveedores 7",
            ]
        );
        assert!(results.iter().all(|r| !r.left_test_row()));
        assert!(results[0].raw_error_text.is_empty());
    }

    #[tokio::test]
    async fn full_crud_updates_before_cleanup() {
        let probe = ScriptedProbe::default();
        let options = RunOptions {
            delay: Duration::ZERO,
            full_crud: true,
        };
        let results = run_audit(&probe, &tables(&["rat_registros"]), &PayloadBuilder::minimal(), &options).await;

        assert_eq!(
            probe.calls(),
            vec![
                "select rat_registros",
                "insert rat_registros {}",
                "update rat_registros 7",
                "delete rat_registros 7",
            ]
        );
        assert_eq!(results[0].update_outcome, Some(Outcome::success(Value::Null)));
    }

    #[tokio::test]
    async fn failed_insert_skips_cleanup_and_records_error_text() {
        let probe = ScriptedProbe {
            insert: Some(Outcome::http_error(
                403,
                "new row violates row-level security policy",
            )),
            ..ScriptedProbe::default()
        };
        let results = run_audit(
            &probe,
            &tables(&["audit_log"]),
            &PayloadBuilder::minimal(),
            &RunOptions::default(),
        )
        .await;

        assert_eq!(probe.calls(), vec!["select audit_log", "insert audit_log {}"]);
        assert_eq!(results[0].cleanup_outcome, None);
        assert_eq!(
            results[0].raw_error_text,
            "new row violates row-level security policy"
        );
    }

    #[tokio::test]
    async fn insert_without_id_or_failed_cleanup_leaves_test_row() {
        let no_id = ScriptedProbe {
            insert: Some(Outcome::success(Value::Null)),
            ..ScriptedProbe::default()
        };
        let result = probe_table(&no_id, "activities", &PayloadBuilder::minimal(), false).await;
        assert!(result.left_test_row());
        assert_eq!(no_id.calls().len(), 2);

        let failing_delete = ScriptedProbe {
            delete_fails: true,
            ..ScriptedProbe::default()
        };
        let result =
            probe_table(&failing_delete, "activities", &PayloadBuilder::minimal(), false).await;
        assert!(result.left_test_row());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_inserted_between_tables_only() {
        let probe = ScriptedProbe::default();
        let options = RunOptions {
            delay: Duration::from_millis(300),
            full_crud: false,
        };
        let start = tokio::time::Instant::now();
        run_audit(
            &probe,
            &tables(&["a", "b", "c"]),
            &PayloadBuilder::minimal(),
            &options,
        )
        .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(900), "elapsed {elapsed:?}");
    }
}
