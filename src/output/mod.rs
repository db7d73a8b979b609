/// Writes probe and criticality reports plus generated SQL to disk.
pub mod formatter;
/// Probe report data model and Markdown renderings.
pub mod report;
