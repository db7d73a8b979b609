use rls_probe::classifier::state_classifier::{classify, classify_results};
use rls_probe::classifier::states::InferredState;
use rls_probe::planner::remediation::{plan_remediation, PlannedAction, RemediationPlan};
use rls_probe::probe::outcome::Outcome;
use rls_probe::probe::runner::TableProbeResult;
use serde_json::json;
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

fn ok() -> Outcome {
    Outcome::success(json!([]))
}

fn sample_plan() -> RemediationPlan {
    let results = vec![
        TableProbeResult::new(
            "proveedores",
            ok(),
            Outcome::http_error(
                403,
                r#"{"code":"42501","message":"new row violates row-level security policy for table \"proveedores\""}"#,
            ),
        ),
        TableProbeResult::new(
            "audit_log",
            Outcome::http_error(
                401,
                r#"{"code":"42501","message":"permission denied for table audit_log"}"#,
            ),
            Outcome::http_error(
                401,
                r#"{"code":"42501","message":"permission denied for table audit_log"}"#,
            ),
        ),
        TableProbeResult::new(
            "rat_registros",
            ok(),
            Outcome::http_error(
                400,
                r#"{"code":"23502","message":"null value in column \"nombre\" violates not-null constraint"}"#,
            ),
        ),
        TableProbeResult::new("organizaciones", ok(), ok()),
    ];
    plan_remediation(&classify_results(&results), "public")
}

#[test]
fn rls_insert_denial_plans_drop_then_create() {
    for status in [401, 403] {
        let state = classify(
            &ok(),
            &Outcome::http_error(status, "new row violates row-level security policy"),
        );
        assert_eq!(state.state, InferredState::PolicyBlocksInsert);

        let classified = classify_results(&[TableProbeResult::new(
            "proveedores",
            ok(),
            Outcome::http_error(status, "new row violates row-level security policy"),
        )]);
        let plan = plan_remediation(&classified, "public");
        let sql = plan.permissive_sql();

        let statements = Parser::parse_sql(&PostgreSqlDialect {}, &sql).expect("SQL should parse");
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Statement::DropPolicy { .. }));
        assert!(matches!(statements[1], Statement::CreatePolicy { .. }));
        assert!(sql.contains("USING (true) WITH CHECK (true)"));
    }
}

#[test]
fn both_probes_succeeding_needs_no_action() {
    let plan = plan_remediation(
        &classify_results(&[TableProbeResult::new(
            "organizaciones",
            ok(),
            Outcome::success(json!([{"id": "1"}])),
        )]),
        "public",
    );
    assert_eq!(plan.actions[0].state, InferredState::NoRestriction);
    assert_eq!(plan.actions[0].action, PlannedAction::NoAction);
}

#[test]
fn cleanup_sql_is_safe_to_run_twice() {
    let plan = sample_plan();
    let cleanup = plan.cleanup_sql();

    // Running the file twice is the same as concatenating it with itself.
    let twice = format!("{cleanup}\n{cleanup}");
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, &twice).expect("SQL should parse");
    assert_eq!(statements.len(), 4);
    for statement in &statements {
        assert!(matches!(statement, Statement::DropPolicy { .. }));
        assert!(
            statement.to_string().starts_with("DROP POLICY IF EXISTS"),
            "every DROP must use IF EXISTS: {statement}"
        );
    }
}

#[test]
fn plan_reports_schema_data_follow_ups() {
    let plan = sample_plan();
    assert_eq!(plan.tables_needing_schema_data(), vec!["rat_registros"]);
    assert_eq!(plan.policy_actions().count(), 2);
}

#[test]
fn permissive_policy_sql_snapshot() {
    insta::assert_snapshot!("permissive_policies", sample_plan().permissive_sql());
}

#[test]
fn cleanup_policy_sql_snapshot() {
    insta::assert_snapshot!("cleanup_policies", sample_plan().cleanup_sql());
}
