use crate::classifier::rules::{default_rules, RulePhase, StateRule};
use crate::classifier::states::*;
use crate::probe::outcome::{Outcome, NO_RESPONSE_STATUS};
use crate::probe::runner::TableProbeResult;

/// Classify a `(select, insert)` outcome pair with the default rule list.
pub fn classify(select: &Outcome, insert: &Outcome) -> ClassifiedState {
    classify_with_rules(select, insert, &default_rules())
}

/// Classify a `(select, insert)` outcome pair with an explicit rule list.
///
/// Evaluation order:
/// 1. SELECT failed: `SelectFailed` rules.
/// 2. SELECT ok, INSERT failed: `InsertFailed` rules in order, else
///    `Unknown("other insert constraint")`.
/// 3. Both ok: `NoRestriction`.
/// 4. Otherwise `Unknown`.
pub fn classify_with_rules(
    select: &Outcome,
    insert: &Outcome,
    rules: &[StateRule],
) -> ClassifiedState {
    let (phase, inspected) = match (select.is_success(), insert.is_success()) {
        (false, _) => (RulePhase::SelectFailed, select),
        (true, false) => (RulePhase::InsertFailed, insert),
        (true, true) => {
            return ClassifiedState {
                state: InferredState::NoRestriction,
                confidence: ConfidenceLevel::A,
                evidence: Evidence::None,
            };
        }
    };

    for rule in rules.iter().filter(|r| r.phase == phase) {
        if let Some(evidence) = rule.matches(inspected) {
            return ClassifiedState {
                state: rule.state.clone(),
                confidence: evidence.confidence(),
                evidence,
            };
        }
    }

    let reason = match phase {
        RulePhase::InsertFailed => "other insert constraint".to_string(),
        RulePhase::SelectFailed => describe_select_failure(select),
    };
    ClassifiedState {
        state: InferredState::Unknown { reason },
        confidence: ConfidenceLevel::D,
        evidence: Evidence::None,
    }
}

fn describe_select_failure(select: &Outcome) -> String {
    match (select.status(), select.error_body()) {
        (Some(NO_RESPONSE_STATUS), Some(body)) => format!("select failed without response: {body}"),
        (Some(status), _) => format!("select failed with HTTP {status}"),
        _ => "select failed".to_string(),
    }
}

/// Classify one probed table.
pub fn classify_result(result: &TableProbeResult) -> ClassifiedTable {
    ClassifiedTable {
        table_name: result.table_name.clone(),
        classification: classify(&result.select_outcome, &result.insert_outcome),
    }
}

/// Classify every probed table, preserving order.
pub fn classify_results(results: &[TableProbeResult]) -> Vec<ClassifiedTable> {
    results.iter().map(classify_result).collect()
}

/// Keep only tables classified at or above the requested confidence level.
pub fn filter_for_output(
    tables: &[ClassifiedTable],
    min_confidence: ConfidenceLevel,
) -> Vec<ClassifiedTable> {
    tables
        .iter()
        .filter(|t| t.confidence() >= min_confidence)
        .cloned()
        .collect()
}
