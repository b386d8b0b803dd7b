//! NavPilot settings: `~/.navpilot/config.toml`, then environment
//! overrides, then validation. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything in `config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Key for the default provider unless its table sets one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider answering oracle requests
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model requested from that provider
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature for every oracle request
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Completion length cap for every oracle request
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Sampling seed for reproducible oracle output
    #[serde(default = "default_seed", skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// `[providers.<name>]` tables
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Oracle request shaping
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Which surface to drive and how
    #[serde(default)]
    pub surface: SurfaceConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_seed() -> Option<u64> {
    Some(923)
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("seed", &self.seed)
            .field("providers", &self.providers)
            .field("agent", &self.agent)
            .field("oracle", &self.oracle)
            .field("surface", &self.surface)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Code synthesis attempts per action
    #[serde(default = "default_max_code_retries")]
    pub max_code_retries: u32,

    /// Iteration budget per run (absent = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Wall-clock budget per run in seconds (absent = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// What to do with the live surface after a rejected action:
    /// "forward_only" or "restore_location"
    #[serde(default = "default_backtrack")]
    pub backtrack: String,
}

fn default_max_code_retries() -> u32 {
    3
}
fn default_max_iterations() -> Option<u32> {
    Some(30)
}
fn default_backtrack() -> String {
    "forward_only".into()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_code_retries: default_max_code_retries(),
            max_iterations: default_max_iterations(),
            timeout_secs: None,
            backtrack: default_backtrack(),
        }
    }
}

/// How much of a snapshot is sent to the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    #[serde(default = "default_max_snapshot_chars")]
    pub max_snapshot_chars: usize,

    #[serde(default = "default_max_elements")]
    pub max_elements: usize,

    /// Ask the oracle to rank candidate snippets before running them
    #[serde(default = "default_true")]
    pub rank_candidates: bool,
}

fn default_max_snapshot_chars() -> usize {
    6000
}
fn default_max_elements() -> usize {
    80
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            max_snapshot_chars: default_max_snapshot_chars(),
            max_elements: default_max_elements(),
            rank_candidates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// "web" or "desktop"
    #[serde(default = "default_surface_kind")]
    pub kind: String,

    #[serde(default)]
    pub web: WebSurfaceConfig,

    #[serde(default)]
    pub desktop: DesktopSurfaceConfig,
}

fn default_surface_kind() -> String {
    "web".into()
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            kind: default_surface_kind(),
            web: WebSurfaceConfig::default(),
            desktop: DesktopSurfaceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSurfaceConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Wait after opening the start location
    #[serde(default = "default_navigation_wait_ms")]
    pub navigation_wait_ms: u64,

    /// Wait after each executed snippet
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_navigation_wait_ms() -> u64 {
    5000
}
fn default_settle_ms() -> u64 {
    1500
}
fn default_max_content_chars() -> usize {
    8000
}

impl Default for WebSurfaceConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: true,
            navigation_wait_ms: default_navigation_wait_ms(),
            settle_ms: default_settle_ms(),
            max_content_chars: default_max_content_chars(),
            max_elements: default_max_elements(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopSurfaceConfig {
    /// Interpreter and leading arguments; the script is appended last
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,

    /// Command launching a tool; `{target}` is the tool id and `{path}`
    /// its launch path
    #[serde(default = "default_launch_command")]
    pub launch_command: String,

    /// Command printing a JSON snapshot of the focused window
    #[serde(default = "default_snapshot_command")]
    pub snapshot_command: String,

    /// Command printing a JSON array of installed tools (`id`/`Title`, `path`/`Path`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_command: Option<String>,

    /// Quoting for substituted values: "posix", "single" (PowerShell) or "none"
    #[serde(default = "default_quote_style")]
    pub quote_style: String,

    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
}

fn default_shell() -> Vec<String> {
    if cfg!(target_os = "windows") {
        vec![
            "powershell".into(),
            "-NonInteractive".into(),
            "-Command".into(),
        ]
    } else {
        vec!["sh".into(), "-c".into()]
    }
}
fn default_launch_command() -> String {
    if cfg!(target_os = "windows") {
        "Start-Application -AppName {target} -LaunchPath {path}".into()
    } else {
        "nohup {path} >/dev/null 2>&1 &".into()
    }
}
fn default_snapshot_command() -> String {
    if cfg!(target_os = "windows") {
        "Get-ActiveWindowSnapshot | ConvertTo-Json -Depth 6".into()
    } else {
        r#"id=$(xdotool getactivewindow) && xdotool getwindowname "$id" | jq -Rc --arg id "$id" '{window: $id, title: .}'"#.into()
    }
}
fn default_quote_style() -> String {
    if cfg!(target_os = "windows") {
        "single".into()
    } else {
        "posix".into()
    }
}
fn default_script_timeout_secs() -> u64 {
    30
}

impl Default for DesktopSurfaceConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            launch_command: default_launch_command(),
            snapshot_command: default_snapshot_command(),
            inventory_command: None,
            quote_style: default_quote_style(),
            script_timeout_secs: default_script_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.navpilot/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `NAVPILOT_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    /// - `OPENROUTER_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read `path` without environment overrides.
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

    /// Apply environment overrides using `lookup` to read variables.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("NAVPILOT_API_KEY")
                .or_else(|| lookup("OPENAI_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"));
        }
        if let Some(provider) = lookup("NAVPILOT_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("NAVPILOT_MODEL") {
            self.default_model = model;
        }
    }

    /// `~/.navpilot`
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".navpilot")
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_code_retries == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_code_retries must be at least 1".into(),
            ));
        }

        if self.agent.max_iterations == Some(0) {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1 when set".into(),
            ));
        }

        if !matches!(self.agent.backtrack.as_str(), "forward_only" | "restore_location") {
            return Err(ConfigError::ValidationError(format!(
                "agent.backtrack must be 'forward_only' or 'restore_location', got '{}'",
                self.agent.backtrack
            )));
        }

        if !matches!(self.surface.kind.as_str(), "web" | "desktop") {
            return Err(ConfigError::ValidationError(format!(
                "surface.kind must be 'web' or 'desktop', got '{}'",
                self.surface.kind
            )));
        }

        if !matches!(
            self.surface.desktop.quote_style.as_str(),
            "posix" | "single" | "none"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "surface.desktop.quote_style must be 'posix', 'single' or 'none', got '{}'",
                self.surface.desktop.quote_style
            )));
        }

        if self.surface.desktop.shell.is_empty() {
            return Err(ConfigError::ValidationError(
                "surface.desktop.shell must name an interpreter".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config, environment or a provider table).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// The model to request: the default provider's `default_model` when its
    /// table sets one, otherwise the top-level `default_model`.
    pub fn model(&self) -> &str {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.as_deref())
            .unwrap_or(&self.default_model)
    }

    /// The defaults as TOML, written by `navpilot onboard`.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            seed: default_seed(),
            providers: HashMap::new(),
            agent: AgentSettings::default(),
            oracle: OracleSettings::default(),
            surface: SurfaceConfig::default(),
        }
    }
}

/// `$HOME`, or `%USERPROFILE%` on Windows.
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

/// Why settings could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
