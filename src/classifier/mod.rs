/// The prioritized rule list mapping error codes and message text to states.
pub mod rules;
/// Top-level classification of SELECT/INSERT outcome pairs.
pub mod state_classifier;
/// Inferred states, confidence levels, and evidence types.
pub mod states;
