use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toml::Value;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "todo-helper.toml";
pub const API_BASE_ENV: &str = "TODO_API_BASE";

fn default_base_url() -> String {
    "http://127.0.0.1:8000/api".into()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_storage_path() -> String {
    ".todo-helper/state.json".into()
}

fn default_message_ttl_ms() -> u64 {
    3000
}

fn default_tick_ms() -> u64 {
    100
}

fn default_log_file() -> String {
    ".todo-helper/client.log".into()
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Re-open the last active goal on startup (only if the server still lists it).
    #[serde(default)]
    pub restore_last_goal: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            restore_last_goal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_message_ttl_ms")]
    pub message_ttl_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            message_ttl_ms: default_message_ttl_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub ui: UiConfig,
    pub log: LogConfig,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::msg(format!(
                "api.base_url must start with http:// or https:// (got '{base}')"
            )));
        }
        if self.ui.message_ttl_ms == 0 {
            return Err(Error::msg("ui.message_ttl_ms must be positive"));
        }
        if self.ui.tick_ms == 0 {
            return Err(Error::msg("ui.tick_ms must be positive"));
        }
        Ok(())
    }
}

// Tables merge key by key; anything else replaces.
fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        let base_path = resolve_ref_path(path, ext);
        out = load_value_inner(&base_path, stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load_file(path: &Path) -> Result<Value> {
    let mut stack = HashSet::<PathBuf>::new();
    load_value_inner(path, &mut stack)
}

pub fn env_overlay() -> Value {
    let mut root = toml::Table::new();
    if let Ok(base) = std::env::var(API_BASE_ENV) {
        let base = base.trim();
        if !base.is_empty() {
            let mut api = toml::Table::new();
            api.insert("base_url".into(), Value::String(base.to_string()));
            root.insert("api".into(), Value::Table(api));
        }
    }
    Value::Table(root)
}

pub fn cli_overlay(api_base: Option<&str>) -> Value {
    let mut root = toml::Table::new();
    if let Some(base) = api_base {
        let mut api = toml::Table::new();
        api.insert("base_url".into(), Value::String(base.to_string()));
        root.insert("api".into(), Value::Table(api));
    }
    Value::Table(root)
}

// defaults < file (explicit path, else todo-helper.toml if present) < overlays in order
pub fn resolve(path: Option<&Path>, overlays: Vec<Value>) -> Result<ClientConfig> {
    let mut value = Value::Table(Default::default());
    match path {
        Some(p) => merge_values(&mut value, load_file(p)?),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.is_file() {
                merge_values(&mut value, load_file(default_path)?);
            }
        }
    }
    for overlay in overlays {
        merge_values(&mut value, overlay);
    }

    let cfg: ClientConfig = value
        .try_into()
        .map_err(|e| Error::msg(format!("invalid client config: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load(path: Option<&Path>, api_base: Option<&str>) -> Result<ClientConfig> {
    dotenv::dotenv().ok();
    resolve(path, vec![env_overlay(), cli_overlay(api_base)])
}
