use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use convoy_gateway_protocol::StreamingMode;

use crate::admission::DEFAULT_MAX_CONCURRENT;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Root for storage and cloned repositories (relative to the config file).
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub gateways: GatewaysConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }

    /// Workspace directory, resolved against the config file.
    pub fn workspace_dir(&self, config_path: &Path) -> PathBuf {
        let workspace = self
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE));
        resolve_path(config_path, &workspace)
    }

    /// Storage root: `storage.path` if set, else `<workspace>/data`.
    pub fn storage_dir(&self, config_path: &Path) -> PathBuf {
        match &self.storage.path {
            Some(path) => resolve_path(config_path, path),
            None => self.workspace_dir(config_path).join(DEFAULT_DATA_DIR),
        }
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// Default Paths
// ============================================================================

/// Default workspace directory (relative to config file).
pub const DEFAULT_WORKSPACE: &str = ".convoy";
/// Default storage directory (relative to workspace).
pub const DEFAULT_DATA_DIR: &str = "data";
/// Conversation records (relative to storage).
pub const CONVERSATIONS_DIR: &str = "conversations";
/// Session records (relative to storage).
pub const SESSIONS_DIR: &str = "sessions";
/// Codebase records (relative to storage).
pub const CODEBASES_DIR: &str = "codebases";

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_stream_timeout() -> u64 {
    600
}

fn default_assistant() -> String {
    "claude".to_string()
}

fn default_claude_command() -> String {
    "claude".to_string()
}

fn default_plan_command() -> String {
    "plan-feature".to_string()
}

fn default_execute_command() -> String {
    "execute".to_string()
}

/// Serde default for bool fields that should be `true` (serde's default is `false`).
fn default_true() -> bool {
    true
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports the following syntax (shell-compatible):
/// - `${VAR}` - Required variable, errors if not set
/// - `${VAR:-default}` - Optional variable with default value
/// - `${VAR:-}` - Optional variable, empty string if not set
/// - `$$` - Escaped `$`
///
/// Nested expansion (`${VAR:-${OTHER}}`) is not supported.
///
/// ```yaml
/// assistant:
///   claude:
///     command: ${CLAUDE_BIN:-claude}
/// server:
///   port: ${PORT:-8080}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                result.push_str(&parse_var_reference(&mut chars)?);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Parse `VAR}` or `VAR:-default}` after a `${`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut closed = false;

    while let Some(c) = chars.next() {
        match (c, default_value.as_mut()) {
            ('}', _) => {
                closed = true;
                break;
            }
            (':', None) if chars.peek() == Some(&'-') => {
                chars.next();
                default_value = Some(String::new());
            }
            (c, Some(default)) => default.push(c),
            (c, None) => var_name.push(c),
        }
    }

    if !closed {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => default_value.ok_or(ConfigError::MissingEnvVar(var_name)),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

// ============================================================================
// ConcurrencyConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConcurrencyConfig {
    /// Ceiling on conversations processed at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_conversations: usize,
    /// Upper bound on one assistant run. `0` disables the limit.
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_seconds: u64,
}

impl ConcurrencyConfig {
    pub fn stream_timeout(&self) -> Option<Duration> {
        (self.stream_timeout_seconds > 0).then(|| Duration::from_secs(self.stream_timeout_seconds))
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_conversations: default_max_concurrent(),
            stream_timeout_seconds: default_stream_timeout(),
        }
    }
}

// ============================================================================
// StorageConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Override for the storage root (default `<workspace>/data`).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// AssistantConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AssistantConfig {
    /// Assistant type assigned to new conversations.
    #[serde(default = "default_assistant")]
    pub default: String,
    #[serde(default)]
    pub claude: ClaudeConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            default: default_assistant(),
            claude: ClaudeConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClaudeConfig {
    #[serde(default = "default_claude_command")]
    pub command: String,
    /// Extra arguments appended after the stream-json flags.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            command: default_claude_command(),
            args: Vec::new(),
        }
    }
}

// ============================================================================
// WorkflowConfig
// ============================================================================

/// Command pair that forces a fresh session between planning and execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_plan_command")]
    pub plan_command: String,
    #[serde(default = "default_execute_command")]
    pub execute_command: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            plan_command: default_plan_command(),
            execute_command: default_execute_command(),
        }
    }
}

// ============================================================================
// GatewaysConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct GatewaysConfig {
    #[serde(default)]
    pub test: TestGatewayConfig,
}

#[derive(Debug, Deserialize)]
pub struct TestGatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub streaming_mode: StreamingMode,
}

impl Default for TestGatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            streaming_mode: StreamingMode::default(),
        }
    }
}
