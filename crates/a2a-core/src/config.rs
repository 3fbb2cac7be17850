use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Top-level config (`a2a.toml` + `A2A_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub runtime: RuntimeAdapterConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            runtime: RuntimeAdapterConfig::default(),
            monitor: MonitorConfig::default(),
            database: DatabaseConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum `timeout_seconds` an `/invoke` caller may request; larger
    /// values are clamped down to this ceiling.
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,
    /// Minimum adaptive turns before a `close_signal` is honoured.
    #[serde(default = "default_min_turns")]
    pub min_turns: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_timeout_secs: default_max_timeout_secs(),
            min_turns: default_min_turns(),
        }
    }
}

/// Selects how the Runtime Adapter reaches the local agent brain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeMode {
    /// Probe for a host-integrated tool; fall back to generic if absent.
    #[default]
    Auto,
    /// Force the host-integrated tool.
    HostIntegrated,
    /// Force the generic stdin/stdout bridge command.
    Generic,
    /// Deterministic canned responses only — used in tests and demos.
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeAdapterConfig {
    #[serde(default)]
    pub mode: RuntimeMode,
    /// Downgrade a failing host-integrated call to generic mode for that
    /// single call, rather than failing the request. Defaults to on.
    #[serde(default = "bool_true")]
    pub failover: bool,
    /// Name of the host-integrated CLI tool, e.g. `"openclaw"`.
    #[serde(default = "default_host_tool")]
    pub host_tool: String,
    /// Generic-mode command that performs one conversational turn.
    pub agent_command: Option<String>,
    /// Generic-mode command invoked to produce a conversation summary.
    pub summary_command: Option<String>,
    /// Generic-mode command invoked to notify the owner.
    pub notify_command: Option<String>,
    /// Per-call subprocess timeout, independent of the caller's requested
    /// `timeout_seconds` (the effective deadline is the smaller of the two).
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
}

impl Default for RuntimeAdapterConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::default(),
            failover: true,
            host_tool: default_host_tool(),
            agent_command: None,
            summary_command: None,
            notify_command: None,
            adapter_timeout_secs: default_adapter_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_tokens_path")]
    pub tokens_path: String,
    #[serde(default = "default_conversations_path")]
    pub conversations_path: String,
    #[serde(default = "default_log_path")]
    pub log_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            tokens_path: default_tokens_path(),
            conversations_path: default_conversations_path(),
            log_path: default_log_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_timeout_secs() -> u64 {
    65
}
fn default_min_turns() -> u32 {
    8
}
fn default_host_tool() -> String {
    "openclaw".to_string()
}
fn default_adapter_timeout_secs() -> u64 {
    60
}
fn default_tick_secs() -> u64 {
    10
}
fn default_idle_timeout_secs() -> u64 {
    60
}
fn default_max_duration_secs() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_state_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.a2a")
}
fn default_tokens_path() -> String {
    format!("{}/tokens.json", default_state_dir())
}
fn default_conversations_path() -> String {
    format!("{}/conversations.db", default_state_dir())
}
fn default_log_path() -> String {
    format!("{}/log.db", default_state_dir())
}

impl RuntimeConfig {
    /// Load config from a TOML file with `A2A_*` env var overrides.
    ///
    /// A missing file is not an error — callers should fall back to
    /// [`RuntimeConfig::default`] and log a warning, as the gateway binary
    /// does at startup.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: RuntimeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("A2A_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/a2a.toml", default_state_dir())
}
