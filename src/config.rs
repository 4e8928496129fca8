//! Configuration parsing and validation.
//!
//! Settings come from a TOML file (every section and key is optional) and
//! are then overridden by `RAG_DEBUG_*` environment variables:
//!
//! ```toml
//! [bus]
//! enabled = true
//! buffer_capacity = 1000
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3847
//! max_clients = 5
//! handshake_timeout_ms = 500
//! legacy_handshake = true
//! transport = "auto"        # auto | axum | tungstenite
//!
//! [client]
//! url = "ws://127.0.0.1:3847"
//! reconnect = true
//! max_reconnect_attempts = 10
//! reconnect_delay_ms = 2000
//! request_timeout_ms = 30000
//!
//! [eval]
//! installed = false
//! module_path = ".rag/eval"
//! ```
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `RAG_DEBUG` | `1`/`true` enables the bus, `0`/`false` disables it |
//! | `RAG_DEBUG_HOST` | overrides `server.host` |
//! | `RAG_DEBUG_PORT` | overrides `server.port` |
//! | `RAG_DEBUG_MAX_CLIENTS` | overrides `server.max_clients` |
//! | `RAG_DEBUG_URL` | overrides `client.url` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rag_debug_protocol::DEFAULT_PORT;

use crate::bus::DEFAULT_BUFFER_CAPACITY;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub eval: EvalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

/// Which socket stack serves the debug channel.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportChoice {
    /// First stack compiled into this build, in preference order.
    #[default]
    Auto,
    Axum,
    Tungstenite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Welcome clients that never send `hello` once the handshake timer
    /// fires, and treat a command before `hello` as an implicit handshake.
    #[serde(default = "default_true")]
    pub legacy_handshake: bool,
    #[serde(default)]
    pub transport: TransportChoice,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_clients: default_max_clients(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            legacy_handshake: true,
            transport: TransportChoice::Auto,
        }
    }
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", bracket_host(&self.host), self.port)
    }

    /// `ws://host:port` for a server listening on `port`.
    pub fn endpoint(&self, port: u16) -> String {
        format!("ws://{}:{}", bracket_host(&self.host), port)
    }
}

/// IPv6 literals need brackets inside an authority.
fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_max_clients() -> usize {
    5
}
fn default_handshake_timeout_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Server URL; derived from `[server]` host and port when absent.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub reconnect: bool,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            client_name: default_client_name(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_client_name() -> String {
    "ragdbg".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvalConfig {
    /// Whether the eval module is declared installed.
    #[serde(default)]
    pub installed: bool,
    /// Where the eval module lives on disk.
    #[serde(default = "default_eval_module_path")]
    pub module_path: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            installed: false,
            module_path: default_eval_module_path(),
        }
    }
}

impl EvalConfig {
    /// Whether the eval module directory (or file) exists.
    pub fn is_present(&self) -> bool {
        self.module_path.exists()
    }
}

fn default_eval_module_path() -> PathBuf {
    PathBuf::from(".rag/eval")
}

impl Config {
    /// URL the inspector client should dial.
    pub fn client_url(&self) -> String {
        self.client
            .url
            .clone()
            .unwrap_or_else(|| self.server.endpoint(self.server.port))
    }

    /// Apply `RAG_DEBUG_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("RAG_DEBUG") {
            self.bus.enabled = parse_flag(&v)
                .with_context(|| format!("RAG_DEBUG must be a boolean flag, got '{}'", v))?;
        }
        if let Some(v) = lookup("RAG_DEBUG_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("RAG_DEBUG_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .with_context(|| format!("RAG_DEBUG_PORT must be a port number, got '{}'", v))?;
        }
        if let Some(v) = lookup("RAG_DEBUG_MAX_CLIENTS") {
            self.server.max_clients = v.trim().parse().with_context(|| {
                format!("RAG_DEBUG_MAX_CLIENTS must be a positive integer, got '{}'", v)
            })?;
        }
        if let Some(v) = lookup("RAG_DEBUG_URL") {
            self.client.url = Some(v);
        }
        Ok(())
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.bus.buffer_capacity == 0 {
            anyhow::bail!("bus.buffer_capacity must be >= 1");
        }
        if self.server.max_clients == 0 {
            anyhow::bail!("server.max_clients must be >= 1");
        }
        if self.server.handshake_timeout_ms == 0 {
            anyhow::bail!("server.handshake_timeout_ms must be > 0");
        }
        if self.client.request_timeout_ms == 0 {
            anyhow::bail!("client.request_timeout_ms must be > 0");
        }
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if let Some(url) = &self.client.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                anyhow::bail!("client.url must start with ws:// or wss://, got '{}'", url);
            }
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Parse a TOML string into a validated [`Config`] (no env overrides).
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`, apply environment overrides, validate.
///
/// A missing file is not an error: the debug channel works with defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        Config::default()
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
}
