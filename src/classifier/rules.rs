use crate::classifier::states::{Evidence, InferredState};
use crate::probe::outcome::Outcome;

/// Which probe a rule inspects, and when it is eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePhase {
    /// The SELECT probe failed; inspect its error.
    SelectFailed,
    /// The SELECT probe succeeded and the INSERT failed; inspect the INSERT error.
    InsertFailed,
}

/// One entry in the prioritized rule list.
///
/// A rule matches on `codes` when the error body carries a structured code,
/// and on `keywords` (case-insensitive) only when it does not. A code match
/// also needs one of `code_keywords` in the body when that list is non-empty.
#[derive(Debug, Clone)]
pub struct StateRule {
    /// Eligibility.
    pub phase: RulePhase,
    /// State produced on match.
    pub state: InferredState,
    /// SQLSTATE / `PostgREST` codes that select this rule.
    pub codes: &'static [&'static str],
    /// Lowercase message fragments that select this rule when no code is present.
    pub keywords: &'static [&'static str],
    /// Lowercase fragments one of which must accompany a matching code.
    pub code_keywords: &'static [&'static str],
}

impl StateRule {
    /// Evidence for a match against `outcome`, or `None`.
    pub fn matches(&self, outcome: &Outcome) -> Option<Evidence> {
        let lower = outcome.error_body()?.to_ascii_lowercase();

        if let Some(code) = outcome.error_code() {
            let code_matches = self.codes.iter().any(|c| c.eq_ignore_ascii_case(&code));
            let confirmed = self.code_keywords.is_empty()
                || self.code_keywords.iter().any(|k| lower.contains(k));
            return (code_matches && confirmed).then_some(Evidence::ErrorCode(code));
        }

        self.keywords
            .iter()
            .find(|keyword| lower.contains(*keyword))
            .map(|keyword| Evidence::MessageText((*keyword).to_string()))
    }
}

/// SQLSTATE `insufficient_privilege`, raised for RLS `WITH CHECK` failures and missing grants.
///
/// On INSERT the code counts only when the message names row-level security.
pub const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE `not_null_violation`.
pub const SQLSTATE_NOT_NULL_VIOLATION: &str = "23502";
/// SQLSTATE `foreign_key_violation`.
pub const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";

/// The rule list, in evaluation order. The first eligible match wins.
///
/// Reordering changes results for bodies that mention more than one
/// condition.
pub fn default_rules() -> Vec<StateRule> {
    vec![
        StateRule {
            phase: RulePhase::SelectFailed,
            state: InferredState::PolicyBlocksSelect,
            codes: &[SQLSTATE_INSUFFICIENT_PRIVILEGE],
            keywords: &["permission denied", "row-level security"],
            code_keywords: &[],
        },
        StateRule {
            phase: RulePhase::InsertFailed,
            state: InferredState::PolicyBlocksInsert,
            codes: &[SQLSTATE_INSUFFICIENT_PRIVILEGE],
            keywords: &["row-level security"],
            code_keywords: &["row-level security"],
        },
        StateRule {
            phase: RulePhase::InsertFailed,
            state: InferredState::SchemaConstraintViolation,
            codes: &[SQLSTATE_NOT_NULL_VIOLATION],
            keywords: &["violates not-null constraint"],
            code_keywords: &[],
        },
        StateRule {
            phase: RulePhase::InsertFailed,
            state: InferredState::ForeignKeyViolation,
            codes: &[SQLSTATE_FOREIGN_KEY_VIOLATION],
            keywords: &["violates foreign key"],
            code_keywords: &[],
        },
    ]
}
