//! Probe `PostgREST` tables, infer their Row-Level Security state, and plan remediation SQL.
#![warn(missing_docs)]

/// Probe outcome classification: prioritized rules, inferred states, and confidence levels.
pub mod classifier;
/// TOML configuration, environment overrides, and validation.
pub mod config;
/// Report files (JSON, SQL, markdown) written at the end of a run.
pub mod output;
/// DDL parsing and identifier helpers.
pub mod parser;
/// Remediation SQL planning and table criticality scoring.
pub mod planner;
/// HTTP probe client, retry policy, test payloads, and the sequential audit runner.
pub mod probe;
