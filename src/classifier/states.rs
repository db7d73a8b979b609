use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission state inferred for one table from its SELECT/INSERT probe pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InferredState {
    /// Both probes succeeded with the anonymous key.
    NoRestriction,
    /// INSERT rejected by a row-level security policy.
    PolicyBlocksInsert,
    /// SELECT rejected by a policy or missing privilege.
    PolicyBlocksSelect,
    /// INSERT rejected because the probe row omitted a NOT NULL column.
    SchemaConstraintViolation,
    /// INSERT rejected because the probe row referenced a missing parent.
    ForeignKeyViolation,
    /// Nothing matched; `reason` says what was observed.
    Unknown {
        /// Human-readable description of the unmatched observation.
        reason: String,
    },
}

impl InferredState {
    /// Short snake-case label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            InferredState::NoRestriction => "no_restriction",
            InferredState::PolicyBlocksInsert => "policy_blocks_insert",
            InferredState::PolicyBlocksSelect => "policy_blocks_select",
            InferredState::SchemaConstraintViolation => "schema_constraint_violation",
            InferredState::ForeignKeyViolation => "foreign_key_violation",
            InferredState::Unknown { .. } => "unknown",
        }
    }

    /// True for states caused by an RLS policy or privilege check.
    pub fn is_policy_block(&self) -> bool {
        matches!(
            self,
            InferredState::PolicyBlocksInsert | InferredState::PolicyBlocksSelect
        )
    }
}

impl fmt::Display for InferredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferredState::Unknown { reason } => write!(f, "unknown ({reason})"),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Confidence level for a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    /// Nothing matched; the state is `Unknown`.
    D,
    /// Matched on error message text, which can change between server versions.
    B,
    /// Matched on a structured error code, or both probes succeeded.
    A,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::A => write!(f, "A"),
            ConfidenceLevel::B => write!(f, "B"),
            ConfidenceLevel::D => write!(f, "D"),
        }
    }
}

impl std::str::FromStr for ConfidenceLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(ConfidenceLevel::A),
            "B" => Ok(ConfidenceLevel::B),
            "D" => Ok(ConfidenceLevel::D),
            _ => Err(format!("Invalid confidence level: {s}")),
        }
    }
}

/// What a classification rule matched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Evidence {
    /// SQLSTATE or `PostgREST` code from the JSON error body.
    ErrorCode(String),
    /// Keyword found in the error message.
    MessageText(String),
    /// Structural match (both probes succeeded) or no match at all.
    None,
}

impl Evidence {
    /// Confidence implied by this evidence for a matched rule.
    pub fn confidence(&self) -> ConfidenceLevel {
        match self {
            Evidence::ErrorCode(_) | Evidence::None => ConfidenceLevel::A,
            Evidence::MessageText(_) => ConfidenceLevel::B,
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evidence::ErrorCode(code) => write!(f, "code {code}"),
            Evidence::MessageText(text) => write!(f, "message contains '{text}'"),
            Evidence::None => write!(f, "-"),
        }
    }
}

/// A state with the confidence and evidence that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedState {
    /// Inferred state.
    pub state: InferredState,
    /// How much to trust it.
    pub confidence: ConfidenceLevel,
    /// What matched.
    pub evidence: Evidence,
}

/// A classified table, ready for the remediation planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedTable {
    /// Table as probed.
    pub table_name: String,
    /// Classification of its probe pair.
    #[serde(flatten)]
    pub classification: ClassifiedState,
}

impl ClassifiedTable {
    /// Inferred state.
    pub fn state(&self) -> &InferredState {
        &self.classification.state
    }

    /// Confidence of the inferred state.
    pub fn confidence(&self) -> ConfidenceLevel {
        self.classification.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn confidence_level_parsing_is_case_insensitive_and_ordered() {
        assert_eq!(ConfidenceLevel::from_str("a"), Ok(ConfidenceLevel::A));
        assert_eq!(ConfidenceLevel::from_str("B"), Ok(ConfidenceLevel::B));
        assert_eq!(ConfidenceLevel::from_str("d"), Ok(ConfidenceLevel::D));
        assert_eq!(format!("{}", ConfidenceLevel::B), "B");
        assert!(ConfidenceLevel::A > ConfidenceLevel::B);
        assert!(ConfidenceLevel::B > ConfidenceLevel::D);

        let err = ConfidenceLevel::from_str("c").expect_err("C is not a level");
        assert!(err.contains("Invalid confidence level: c"));
    }

    #[test]
    fn state_labels_and_display() {
        assert_eq!(InferredState::PolicyBlocksInsert.label(), "policy_blocks_insert");
        assert!(InferredState::PolicyBlocksSelect.is_policy_block());
        assert!(!InferredState::SchemaConstraintViolation.is_policy_block());
        assert_eq!(
            InferredState::Unknown {
                reason: "other insert constraint".to_string()
            }
            .to_string(),
            "unknown (other insert constraint)"
        );
    }

    #[test]
    fn classified_table_serializes_flat() {
        let table = ClassifiedTable {
            table_name: "proveedores".to_string(),
            classification: ClassifiedState {
                state: InferredState::PolicyBlocksInsert,
                confidence: ConfidenceLevel::A,
                evidence: Evidence::ErrorCode("42501".to_string()),
            },
        };
        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(value["table_name"], "proveedores");
        assert_eq!(value["state"]["state"], "policy_blocks_insert");
        assert_eq!(value["confidence"], "A");
        assert_eq!(value["evidence"]["kind"], "error_code");

        let back: ClassifiedTable = serde_json::from_value(value).unwrap();
        assert_eq!(back, table);
    }
}
