//! Configuration loading, validation, and management for Waypoint.
//!
//! Loads configuration from `~/.waypoint/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use waypoint_core::NodeId;

/// The root configuration structure.
///
/// Maps directly to `~/.waypoint/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local UTC offset (hours) used for relative dates and the curfew window
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Graph executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Security rule settings
    #[serde(default)]
    pub rules: RulesConfig,

    /// Tool collaborator settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Conversation state persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Turn tracing
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_utc_offset() -> i32 {
    8
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Internal transitions allowed per turn before the loop guard stops it
    #[serde(default = "default_max_auto_chain")]
    pub max_auto_chain: usize,

    /// History turns handed to the generator for side chat
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default)]
    pub ambiguity: AmbiguityConfig,
}

fn default_max_auto_chain() -> usize {
    6
}
fn default_history_window() -> usize {
    12
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_auto_chain: default_max_auto_chain(),
            history_window: default_history_window(),
            ambiguity: AmbiguityConfig::default(),
        }
    }
}

/// Where the router sends messages the classifier could not place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguityConfig {
    /// Fallback when the message belongs to the booking track
    #[serde(default = "default_business_fallback")]
    pub business_fallback: NodeId,

    /// Fallback for everything else
    #[serde(default = "default_chat_fallback")]
    pub chat_fallback: NodeId,

    /// Classifications below this confidence count as ambiguous
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_business_fallback() -> NodeId {
    NodeId::Collect
}
fn default_chat_fallback() -> NodeId {
    NodeId::SideChat
}
fn default_min_confidence() -> f32 {
    0.5
}

impl Default for AmbiguityConfig {
    fn default() -> Self {
        Self {
            business_fallback: default_business_fallback(),
            chat_fallback: default_chat_fallback(),
            min_confidence: default_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Block national IDs, card numbers and passport numbers
    #[serde(default = "default_true")]
    pub pii: bool,

    /// Block instruction-override phrasing
    #[serde(default = "default_true")]
    pub prompt_injection: bool,

    /// Destinations that may not be booked (canonical or alias names)
    #[serde(default)]
    pub sensitive_locations: Vec<String>,

    #[serde(default)]
    pub financial: FinancialRuleConfig,

    #[serde(default)]
    pub curfew: CurfewConfig,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            pii: true,
            prompt_injection: true,
            sensitive_locations: Vec::new(),
            financial: FinancialRuleConfig::default(),
            curfew: CurfewConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialRuleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Payments above this amount (CNY) need explicit confirmation
    #[serde(default = "default_review_threshold")]
    pub review_threshold: Option<u32>,
}

fn default_review_threshold() -> Option<u32> {
    Some(5000)
}

impl Default for FinancialRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            review_threshold: default_review_threshold(),
        }
    }
}

/// Night window during which selections and payments are refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurfewConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First blocked hour (local, inclusive)
    #[serde(default = "default_curfew_start")]
    pub start_hour: u32,

    /// First allowed hour after the window (local, exclusive)
    #[serde(default = "default_curfew_end")]
    pub end_hour: u32,

    /// Operator override: lets bookings through during the window
    #[serde(default)]
    pub override_active: bool,
}

fn default_curfew_start() -> u32 {
    23
}
fn default_curfew_end() -> u32 {
    6
}

impl Default for CurfewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: default_curfew_start(),
            end_hour: default_curfew_end(),
            override_active: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-call timeout for every tool collaborator
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Nights quoted by hotel search
    #[serde(default = "default_hotel_nights")]
    pub hotel_nights: u32,
}

fn default_tool_timeout() -> u64 {
    10
}
fn default_hotel_nights() -> u32 {
    3
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            hotel_nights: default_hotel_nights(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory", "file" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database file (sqlite) or directory (file). Defaults under ~/.waypoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// Resolved storage location for file-backed backends.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(p),
            None if self.backend == "file" => AppConfig::config_dir().join("threads"),
            None => AppConfig::config_dir().join("waypoint.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Extra CORS origin allowed to call the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_origin: Option<String>,
}

fn default_port() -> u16 {
    8600
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allow_origin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Completed turn traces kept in memory
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
}

fn default_max_traces() -> usize {
    1000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_traces: default_max_traces(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.waypoint/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `WAYPOINT_PORT`
    /// - `WAYPOINT_STORE` (backend name)
    /// - `WAYPOINT_UTC_OFFSET`
    /// - `WAYPOINT_CURFEW_OVERRIDE` (`1` / `true`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable source (the process environment in
    /// production).
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = var("WAYPOINT_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("WAYPOINT_PORT is not a port: {port}"))
            })?;
        }
        if let Some(backend) = var("WAYPOINT_STORE") {
            self.store.backend = backend;
        }
        if let Some(offset) = var("WAYPOINT_UTC_OFFSET") {
            self.utc_offset_hours = offset.parse().map_err(|_| {
                ConfigError::ValidationError(format!("WAYPOINT_UTC_OFFSET is not an integer: {offset}"))
            })?;
        }
        if let Some(flag) = var("WAYPOINT_CURFEW_OVERRIDE") {
            self.rules.curfew.override_active = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".waypoint")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::ValidationError(
                "utc_offset_hours must be between -12 and 14".into(),
            ));
        }

        if self.executor.max_auto_chain == 0 || self.executor.max_auto_chain > 32 {
            return Err(ConfigError::ValidationError(
                "executor.max_auto_chain must be between 1 and 32".into(),
            ));
        }

        let ambiguity = &self.executor.ambiguity;
        if !(0.0..=1.0).contains(&ambiguity.min_confidence) {
            return Err(ConfigError::ValidationError(
                "executor.ambiguity.min_confidence must be between 0.0 and 1.0".into(),
            ));
        }
        for fallback in [ambiguity.business_fallback, ambiguity.chat_fallback] {
            if !fallback.is_routable() || fallback.is_gated() {
                return Err(ConfigError::ValidationError(format!(
                    "ambiguity fallback '{fallback}' must be an ungated routable node"
                )));
            }
        }

        let curfew = &self.rules.curfew;
        if curfew.start_hour > 23 || curfew.end_hour > 23 {
            return Err(ConfigError::ValidationError(
                "rules.curfew hours must be between 0 and 23".into(),
            ));
        }

        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.timeout_secs must be > 0".into(),
            ));
        }
        if self.tools.hotel_nights == 0 {
            return Err(ConfigError::ValidationError(
                "tools.hotel_nights must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "memory" | "file" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected memory, file or sqlite)",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
            executor: ExecutorConfig::default(),
            rules: RulesConfig::default(),
            tools: ToolsConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.max_auto_chain, 6);
        assert_eq!(config.utc_offset_hours, 8);
        assert_eq!(config.rules.curfew.start_hour, 23);
        assert_eq!(config.rules.curfew.end_hour, 6);
    }

    #[test]
    fn ambiguity_defaults_are_pinned() {
        let ambiguity = AmbiguityConfig::default();
        assert_eq!(ambiguity.business_fallback, NodeId::Collect);
        assert_eq!(ambiguity.chat_fallback, NodeId::SideChat);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(
            parsed.rules.financial.review_threshold,
            config.rules.financial.review_threshold
        );
        assert_eq!(parsed.executor.ambiguity.business_fallback, NodeId::Collect);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
[executor.ambiguity]
business_fallback = "guide"

[rules]
sensitive_locations = ["Dubai"]
"#,
        )
        .unwrap();
        assert_eq!(parsed.executor.ambiguity.business_fallback, NodeId::Guide);
        assert_eq!(parsed.executor.ambiguity.chat_fallback, NodeId::SideChat);
        assert_eq!(parsed.rules.sensitive_locations, vec!["Dubai".to_string()]);
        assert!(parsed.rules.pii);
    }

    #[test]
    fn gated_fallback_rejected() {
        let mut config = AppConfig::default();
        config.executor.ambiguity.business_fallback = NodeId::PayFlight;
        assert!(config.validate().is_err());

        config.executor.ambiguity.business_fallback = NodeId::Sentinel;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_auto_chain_rejected() {
        let mut config = AppConfig::default();
        config.executor.max_auto_chain = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("WAYPOINT_PORT", "9100"),
            ("WAYPOINT_STORE", "memory"),
            ("WAYPOINT_UTC_OFFSET", "9"),
            ("WAYPOINT_CURFEW_OVERRIDE", "true"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.gateway.port, 9100);
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.utc_offset_hours, 9);
        assert!(config.rules.curfew.override_active);
    }

    #[test]
    fn bad_port_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|k| (k == "WAYPOINT_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("WAYPOINT_PORT"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.store.backend, "sqlite");
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "utc_offset_hours = \"eight\"").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_auto_chain"));
        assert!(toml_str.contains("8600"));
    }

    #[test]
    fn store_path_defaults_by_backend() {
        let sqlite = StoreConfig::default();
        assert!(sqlite.resolved_path().ends_with("waypoint.db"));
        let file = StoreConfig {
            backend: "file".into(),
            path: None,
        };
        assert!(file.resolved_path().ends_with("threads"));
    }
}
