//! Configuration model and loader.
//!
//! Sources are layered: built-in defaults, the TOML config file, then
//! `TERMRELAY__SECTION__KEY` environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const APP_NAME: &str = "termrelay";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub interpreter: InterpreterConfig,
    pub workspace: WorkspaceConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to call the API from a browser.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "https://code-sama.netlify.app".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

/// How submitted programs are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Interpreter binary, resolved through `PATH` when not absolute.
    pub program: String,
    /// Arguments placed before the script path (`-u` keeps output unbuffered).
    pub args: Vec<String>,
    /// File name the submitted source is written to.
    pub script_name: String,
    /// Extra environment for the child.
    pub env: HashMap<String, String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-u".to_string()],
            script_name: "temp_code.py".to_string(),
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for per-session scratch directories.
    /// Defaults to the system temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Name prefix of each scratch directory.
    pub prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: format!("{APP_NAME}-"),
        }
    }
}

impl WorkspaceConfig {
    pub fn root_dir(&self) -> Result<Option<PathBuf>> {
        self.root.as_deref().map(expand_str_path).transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum bytes read from a child pipe per message.
    pub chunk_size: usize,
    /// Capacity of the outbound message queue.
    pub outbound_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            outbound_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.interpreter.program.trim().is_empty() {
            bail!("interpreter.program must not be empty");
        }
        if self.interpreter.script_name.trim().is_empty() {
            bail!("interpreter.script_name must not be empty");
        }
        if Path::new(&self.interpreter.script_name).components().count() != 1 {
            bail!(
                "interpreter.script_name must be a plain file name, got {:?}",
                self.interpreter.script_name
            );
        }
        if self.relay.chunk_size == 0 {
            bail!("relay.chunk_size must be greater than zero");
        }
        if self.relay.outbound_buffer == 0 {
            bail!("relay.outbound_buffer must be greater than zero");
        }
        Ok(())
    }
}

/// Load configuration from `path` (if present) and the environment.
pub fn load(path: &Path) -> Result<AppConfig> {
    let built = Config::builder()
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix(&env_prefix()).separator("__"))
        .build()
        .with_context(|| format!("reading config from {}", path.display()))?;

    let config: AppConfig = built
        .try_deserialize()
        .context("deserializing configuration")?;
    Ok(config)
}

/// Like [`load`], but writes a default config file first when none exists.
pub fn load_or_init(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        write_default_config(path)?;
        info!("wrote default config to {}", path.display());
    }
    load(path)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let toml = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# File: ");
    body.push_str(&path.display().to_string());
    body.push_str("\n\n");
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

/// Resolve the config file path from an optional override.
///
/// A directory override resolves to `config.toml` inside it.
pub fn config_file_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                expanded.join("config.toml")
            } else {
                expanded
            }
        }
        None => default_config_dir()?.join("config.toml"),
    };

    if path.parent().is_none() {
        return Err(anyhow!("invalid config file path: {path:?}"));
    }
    Ok(path)
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
