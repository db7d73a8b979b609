/// Table criticality scoring and keep/fix/eliminate recommendations.
pub mod criticality;
/// Remediation actions and generated policy SQL.
pub mod remediation;
