//! Table criticality scoring.
//!
//! The score is a weighted sum driven by an explicit rule table so that each
//! weight can be checked on its own:
//!
//! | Condition | Weight | Tier |
//! |-----------|--------|------|
//! | each source file referencing the table | 10 | additive |
//! | core table | 50 | exclusive |
//! | security table | 30 | exclusive |
//! | config table | 25 | exclusive |
//! | name contains an identity keyword | 20 | exclusive |
//! | LPDP function table | 40 | additive |
//!
//! Only the first matching exclusive rule counts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::classifier::states::ClassifiedTable;
use crate::config::CriticalityConfig;
use crate::parser::names::normalize_relation_name;

/// Weight per source file that references the table.
pub const REFERENCE_WEIGHT: u32 = 10;

/// Directories never scanned for references.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "target", "dist", "build", "coverage"];

/// Criticality tier derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CriticalityLevel {
    /// Score below 5.
    Unused,
    /// Score 5..15.
    Low,
    /// Score 15..30.
    Medium,
    /// Score 30..60.
    High,
    /// Score 60 and above.
    Critical,
}

impl CriticalityLevel {
    /// Fixed thresholds; each tier's lower bound is inclusive.
    pub fn from_score(score: u32) -> Self {
        match score {
            60.. => CriticalityLevel::Critical,
            30.. => CriticalityLevel::High,
            15.. => CriticalityLevel::Medium,
            5.. => CriticalityLevel::Low,
            _ => CriticalityLevel::Unused,
        }
    }
}

impl fmt::Display for CriticalityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CriticalityLevel::Critical => "CRITICAL",
            CriticalityLevel::High => "HIGH",
            CriticalityLevel::Medium => "MEDIUM",
            CriticalityLevel::Low => "LOW",
            CriticalityLevel::Unused => "UNUSED",
        };
        write!(f, "{label}")
    }
}

/// Membership test used by a [`ScoreRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreCondition {
    /// Listed in `core_tables`.
    CoreTable,
    /// Listed in `security_tables`.
    SecurityTable,
    /// Listed in `config_tables`.
    ConfigTable,
    /// Name contains one of `identity_keywords`.
    IdentityKeyword,
    /// Listed in `lpdp_tables`.
    LpdpFunctionTable,
}

impl ScoreCondition {
    fn holds(self, table: &str, lists: &CriticalityConfig) -> bool {
        let listed = |list: &[String]| list.iter().any(|t| normalize_relation_name(t) == table);
        match self {
            ScoreCondition::CoreTable => listed(&lists.core_tables),
            ScoreCondition::SecurityTable => listed(&lists.security_tables),
            ScoreCondition::ConfigTable => listed(&lists.config_tables),
            ScoreCondition::LpdpFunctionTable => listed(&lists.lpdp_tables),
            ScoreCondition::IdentityKeyword => lists
                .identity_keywords
                .iter()
                .any(|k| !k.is_empty() && table.contains(&k.to_ascii_lowercase())),
        }
    }
}

/// One `condition -> weight` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRule {
    /// When the rule applies.
    pub condition: ScoreCondition,
    /// Points added.
    pub weight: u32,
    /// Exclusive rules stop at the first match among themselves.
    pub exclusive: bool,
    /// Report label.
    pub label: &'static str,
}

/// The rule table, in evaluation order.
pub const SCORE_RULES: &[ScoreRule] = &[
    ScoreRule {
        condition: ScoreCondition::CoreTable,
        weight: 50,
        exclusive: true,
        label: "core table",
    },
    ScoreRule {
        condition: ScoreCondition::SecurityTable,
        weight: 30,
        exclusive: true,
        label: "security table",
    },
    ScoreRule {
        condition: ScoreCondition::ConfigTable,
        weight: 25,
        exclusive: true,
        label: "config table",
    },
    ScoreRule {
        condition: ScoreCondition::IdentityKeyword,
        weight: 20,
        exclusive: true,
        label: "identity/tenancy name",
    },
    ScoreRule {
        condition: ScoreCondition::LpdpFunctionTable,
        weight: 40,
        exclusive: false,
        label: "LPDP function table",
    },
];

/// Score for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalityScore {
    /// Normalized table name.
    pub table_name: String,
    /// Number of source files referencing the table.
    pub reference_count: usize,
    /// Weighted sum.
    pub score: u32,
    /// Tier derived from `score`.
    pub level: CriticalityLevel,
    /// Contributions, in rule order.
    pub reasons: Vec<String>,
}

/// Score `table` from its reference count and the configured lists. Pure.
pub fn score_table(table: &str, reference_count: usize, lists: &CriticalityConfig) -> CriticalityScore {
    let table_name = normalize_relation_name(table);
    let mut score = 0u32;
    let mut reasons = Vec::new();

    if reference_count > 0 {
        let points = REFERENCE_WEIGHT.saturating_mul(u32::try_from(reference_count).unwrap_or(u32::MAX));
        score = score.saturating_add(points);
        reasons.push(format!("referenced in {reference_count} source files (+{points})"));
    }

    let mut exclusive_matched = false;
    for rule in SCORE_RULES {
        if rule.exclusive && exclusive_matched {
            continue;
        }
        if rule.condition.holds(&table_name, lists) {
            score = score.saturating_add(rule.weight);
            reasons.push(format!("{} (+{})", rule.label, rule.weight));
            exclusive_matched |= rule.exclusive;
        }
    }

    CriticalityScore {
        table_name,
        reference_count,
        score,
        level: CriticalityLevel::from_score(score),
        reasons,
    }
}

/// Why a table is recommended for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EliminationReason {
    /// Zero score and zero references.
    Orphan,
    /// Duplicates the function of a better-referenced table.
    Redundant {
        /// The group member that is kept.
        kept: String,
    },
}

/// Keep / fix / eliminate bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// Leave as is.
    Keep,
    /// Its probes were blocked by policy; see the remediation plan.
    Fix {
        /// Inferred state label.
        state: String,
    },
    /// Recommend dropping.
    Eliminate {
        /// Why.
        reason: EliminationReason,
    },
}

/// Score plus disposition for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAssessment {
    /// Score details.
    #[serde(flatten)]
    pub score: CriticalityScore,
    /// Recommendation.
    pub disposition: Disposition,
}

/// Assessments for a table set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalityReport {
    /// One entry per table, sorted by descending score then name.
    pub tables: Vec<TableAssessment>,
}

impl CriticalityReport {
    /// Number of tables per level.
    pub fn level_counts(&self) -> BTreeMap<CriticalityLevel, usize> {
        let mut counts = BTreeMap::new();
        for t in &self.tables {
            *counts.entry(t.score.level).or_insert(0) += 1;
        }
        counts
    }

    /// Tables recommended for elimination.
    pub fn eliminated(&self) -> impl Iterator<Item = &TableAssessment> {
        self.tables
            .iter()
            .filter(|t| matches!(t.disposition, Disposition::Eliminate { .. }))
    }
}

/// Score every table and assign a disposition.
///
/// `references` maps normalized table names to referencing-file counts;
/// missing entries count as zero. `probe_states`, when given, marks tables
/// whose probes were blocked by policy as `Fix`.
pub fn assess_tables(
    tables: &[String],
    references: &BTreeMap<String, usize>,
    lists: &CriticalityConfig,
    probe_states: Option<&[ClassifiedTable]>,
) -> CriticalityReport {
    let mut seen = Vec::new();
    for table in tables {
        let normalized = normalize_relation_name(table);
        if !seen.contains(&normalized) {
            seen.push(normalized);
        }
    }

    let ref_count = |t: &str| references.get(t).copied().unwrap_or(0);
    let redundant = redundant_members(&seen, lists, &ref_count);

    let blocked: HashMap<String, String> = probe_states
        .unwrap_or_default()
        .iter()
        .filter(|c| c.state().is_policy_block())
        .map(|c| (normalize_relation_name(&c.table_name), c.state().label().to_string()))
        .collect();

    let mut assessments: Vec<TableAssessment> = seen
        .iter()
        .map(|table| {
            let score = score_table(table, ref_count(table), lists);
            let disposition = if score.score == 0 && score.reference_count == 0 {
                Disposition::Eliminate {
                    reason: EliminationReason::Orphan,
                }
            } else if let Some(kept) = redundant.get(table) {
                Disposition::Eliminate {
                    reason: EliminationReason::Redundant { kept: kept.clone() },
                }
            } else if let Some(state) = blocked.get(table) {
                Disposition::Fix {
                    state: state.clone(),
                }
            } else {
                Disposition::Keep
            };
            TableAssessment { score, disposition }
        })
        .collect();

    assessments.sort_by(|a, b| {
        b.score
            .score
            .cmp(&a.score.score)
            .then_with(|| a.score.table_name.cmp(&b.score.table_name))
    });

    CriticalityReport {
        tables: assessments,
    }
}

/// Map each redundant table to the group member kept in its place.
fn redundant_members(
    present: &[String],
    lists: &CriticalityConfig,
    ref_count: &dyn Fn(&str) -> usize,
) -> HashMap<String, String> {
    let mut redundant = HashMap::new();

    for group in &lists.functional_groups {
        let members: Vec<String> = group
            .iter()
            .map(|t| normalize_relation_name(t))
            .filter(|t| present.contains(t))
            .collect();
        if members.len() < 2 {
            continue;
        }

        // Earliest member wins ties: max_by_key keeps the last maximum, so scan reversed.
        let Some(kept) = members.iter().rev().max_by_key(|t| ref_count(t)) else {
            continue;
        };
        for member in &members {
            if member != kept {
                redundant.entry(member.clone()).or_insert_with(|| kept.clone());
            }
        }
    }

    redundant
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Count, per table, how many source files under `roots` mention it as a whole word.
///
/// Every table gets an entry, zero included.
pub fn count_references(
    roots: &[PathBuf],
    extensions: &[String],
    tables: &[String],
) -> Result<BTreeMap<String, usize>, String> {
    let patterns: Vec<(String, Regex)> = tables
        .iter()
        .map(|t| {
            let name = normalize_relation_name(t);
            Regex::new(&format!(r"\b{}\b", regex::escape(&name)))
                .map(|re| (name, re))
                .map_err(|e| format!("Invalid table name pattern '{t}': {e}"))
        })
        .collect::<Result<_, _>>()?;

    let mut counts: BTreeMap<String, usize> =
        patterns.iter().map(|(name, _)| (name.clone(), 0)).collect();

    for root in roots {
        if !root.exists() {
            return Err(format!("Source directory not found: {}", root.display()));
        }
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                debug!(path = %entry.path().display(), "skipping non-UTF-8 file");
                continue;
            };
            for (name, re) in &patterns {
                if re.is_match(&content) {
                    *counts.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    Ok(counts)
}
