//! Configuration for probe runs and criticality scoring.
//!
//! Values come from a TOML file, then environment overrides, then CLI flags
//! (applied by the binary). Credentials are expected from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The config file is not valid TOML for [`ProbeConfig`].
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Endpoint and credentials.
    pub target: TargetConfig,
    /// Probe behaviour and table list.
    pub probe: ProbeSettings,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
    /// Keyword lists and weights inputs for criticality scoring.
    pub criticality: CriticalityConfig,
    /// Where report files are written.
    pub output: OutputConfig,
}

/// `PostgREST` endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Project URL, e.g. `https://xyz.supabase.co` (the `/rest/v1` suffix is added per call).
    pub base_url: String,
    /// Anonymous API key. Prefer `RLS_PROBE_ANON_KEY` over storing it in the file.
    pub anon_key: String,
    /// Schema used when generating DDL for unqualified table names.
    pub schema: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            anon_key: String::new(),
            schema: "public".to_string(),
        }
    }
}

/// How INSERT probe payloads are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Send `{}`; constraint violations are expected and informational.
    #[default]
    Minimal,
    /// Fill every required column from the parsed DDL.
    SchemaAware,
}

impl std::str::FromStr for InsertMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "minimal" => Ok(InsertMode::Minimal),
            "schema_aware" => Ok(InsertMode::SchemaAware),
            _ => Err(format!("Invalid insert mode: {s}")),
        }
    }
}

/// Probe run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Pause between tables in milliseconds.
    pub delay_ms: u64,
    /// Payload construction mode.
    pub insert_mode: InsertMode,
    /// Also probe UPDATE on the inserted test row before cleanup.
    pub full_crud: bool,
    /// Tables to probe, in order.
    pub tables: Vec<String>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            delay_ms: 200,
            insert_mode: InsertMode::Minimal,
            full_crud: false,
            tables: Vec::new(),
        }
    }
}

impl ProbeSettings {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Inter-table delay as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Retry settings for transient probe failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles afterwards.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
        }
    }
}

/// Hand-maintained lists feeding the criticality score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticalityConfig {
    /// Tables the application cannot run without.
    pub core_tables: Vec<String>,
    /// Tables holding access control or audit data.
    pub security_tables: Vec<String>,
    /// Tables holding tenant or application settings.
    pub config_tables: Vec<String>,
    /// Tables backing LPDP compliance features (RAT, EIPD, providers, DPAs).
    pub lpdp_tables: Vec<String>,
    /// Name fragments that mark identity/tenancy tables.
    pub identity_keywords: Vec<String>,
    /// Groups of tables that serve the same function; only one member is kept.
    pub functional_groups: Vec<Vec<String>>,
    /// File extensions scanned for table references.
    pub source_extensions: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl Default for CriticalityConfig {
    fn default() -> Self {
        Self {
            core_tables: strings(&[
                "organizaciones",
                "tenants",
                "usuarios",
                "users",
                "empresas",
                "user_profiles",
            ]),
            security_tables: strings(&[
                "audit_log",
                "user_sessions",
                "user_roles",
                "roles",
                "permissions",
                "security_events",
            ]),
            config_tables: strings(&[
                "tenant_settings",
                "system_config",
                "configuracion_empresa",
                "notification_settings",
            ]),
            lpdp_tables: strings(&[
                "mapeo_datos_rat",
                "rat_registros",
                "evaluaciones_eipd",
                "evaluaciones_dpia",
                "proveedores",
                "dpas",
                "actividades_dpo",
                "brechas_seguridad",
                "solicitudes_arcop",
                "consentimientos",
            ]),
            identity_keywords: strings(&["tenant", "user", "organizacion", "empresa"]),
            functional_groups: vec![
                strings(&["audit_log", "audit_logs", "activities"]),
                strings(&["evaluaciones_eipd", "evaluaciones_dpia", "eipd_evaluations"]),
                strings(&["rat_registros", "mapeo_datos_rat", "rat_records"]),
                strings(&["proveedores", "providers"]),
            ],
            source_extensions: strings(&["js", "jsx", "ts", "tsx", "sql"]),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving report files.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("rls-probe-output"),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Parse configuration from TOML text without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("RLS_PROBE_URL") {
            self.target.base_url = val;
        }
        if let Some(val) = lookup("RLS_PROBE_ANON_KEY").or_else(|| lookup("SUPABASE_ANON_KEY")) {
            self.target.anon_key = val;
        }
        if let Some(ms) = lookup("RLS_PROBE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.probe.timeout_ms = ms;
        }
        if let Some(ms) = lookup("RLS_PROBE_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.probe.delay_ms = ms;
        }
        if let Some(dir) = lookup("RLS_PROBE_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
    }

    /// Validate settings shared by every command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe.timeout_ms must be > 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".to_string()));
        }
        if self.target.schema.trim().is_empty() {
            return Err(ConfigError::Invalid("target.schema must not be empty".to_string()));
        }
        Ok(())
    }

    /// Validate settings needed before any network call.
    pub fn validate_for_probe(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let url = self.target.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid(
                "target.base_url is required (or set RLS_PROBE_URL)".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "target.base_url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.target.anon_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "anon key is required (set RLS_PROBE_ANON_KEY or SUPABASE_ANON_KEY)".to_string(),
            ));
        }
        if self.probe.tables.is_empty() {
            return Err(ConfigError::Invalid("no tables to probe".to_string()));
        }
        Ok(())
    }
}
