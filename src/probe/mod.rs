/// `RestProbe` trait and the reqwest-backed `PostgREST` client.
pub mod client;
/// Probe outcomes and the internal error taxonomy they are normalized from.
pub mod outcome;
/// INSERT/UPDATE payload construction (minimal or schema-aware).
pub mod payload;
/// Bounded retry with exponential backoff for transient failures.
pub mod retry;
/// Sequential per-table audit runs with cleanup of inserted test rows.
pub mod runner;
