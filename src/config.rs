use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

const DEFAULT_ENV_PREFIX: &str = "CAPTION_TUI";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/caption";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Unset means the transport decides; the controller never times out a request.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: default_user_agent(),
            request_timeout: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_user_agent() -> String {
    format!("caption-tui/{}", crate::VERSION)
}

/// Light/dark display mode. The only piece of session state that survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            other => anyhow::bail!("unknown theme {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UIConfig {
    #[serde(default)]
    pub theme: ThemeMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("caption-tui").join("caption-tui.log"))
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let path = options.config_file.or_else(default_path);

    let mut cfg = match path {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "service.endpoint" => cfg.service.endpoint = value,
        "service.user_agent" => cfg.service.user_agent = value,
        "service.request_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.service.request_timeout = Some(duration);
            }
        }
        "ui.theme" => {
            if let Ok(theme) = value.parse() {
                cfg.ui.theme = theme;
            }
        }
        "logging.level" => cfg.logging.level = value,
        "logging.file" => cfg.logging.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("caption-tui").join("config.yaml"))
}

/// Rewrite `ui.theme` in the config file at `path`, keeping every other setting.
/// Only keys already in the file are written back; defaults stay implicit.
pub fn save_theme(path: &Path, theme: ThemeMode) -> Result<()> {
    let data = if path.exists() {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?
    } else {
        String::new()
    };
    let mut doc = if data.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str::<Value>(&data)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?
    };
    if doc.is_null() {
        doc = Value::Mapping(Mapping::new());
    }

    let root = doc.as_mapping_mut().ok_or_else(|| {
        anyhow::anyhow!("config: {} is not a YAML mapping", path.display())
    })?;
    let ui = root
        .entry(Value::from("ui"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !ui.is_mapping() {
        *ui = Value::Mapping(Mapping::new());
    }
    if let Some(ui) = ui.as_mapping_mut() {
        ui.insert(Value::from("theme"), Value::from(theme.as_str()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&doc).context("config: failed to serialize config")?;
    fs::write(path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated(path: PathBuf, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(path),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("missing.yaml"), "CAPTION_TUI_T1")).unwrap();
        assert_eq!(cfg.service.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.ui.theme, ThemeMode::Light);
        assert!(cfg.service.request_timeout.is_none());
    }

    #[test]
    fn reads_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "service:\n  endpoint: http://10.0.0.2:5000/caption\n  request_timeout: 90s\nui:\n  theme: dark\n",
        )
        .unwrap();
        let cfg = load(isolated(path, "CAPTION_TUI_T2")).unwrap();
        assert_eq!(cfg.service.endpoint, "http://10.0.0.2:5000/caption");
        assert_eq!(cfg.service.request_timeout, Some(Duration::from_secs(90)));
        assert_eq!(cfg.ui.theme, ThemeMode::Dark);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "ui: [not, a, map").unwrap();
        let err = load(isolated(path, "CAPTION_TUI_T3")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn save_theme_preserves_other_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        save_theme(&path, ThemeMode::Dark).unwrap();
        assert_eq!(read_config_file(&path).unwrap().ui.theme, ThemeMode::Dark);

        fs::write(
            &path,
            "service:\n  endpoint: http://example.test/caption\nui:\n  theme: dark\n",
        )
        .unwrap();
        save_theme(&path, ThemeMode::Light).unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.ui.theme, ThemeMode::Light);
        assert_eq!(saved.service.endpoint, "http://example.test/caption");
    }

    #[test]
    fn save_theme_leaves_defaults_implicit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "ui:\n  theme: light\n").unwrap();
        save_theme(&path, ThemeMode::Dark).unwrap();

        let written: Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let root = written.as_mapping().unwrap();
        assert_eq!(root.len(), 1);
        let ui = root.get("ui").and_then(Value::as_mapping).unwrap();
        assert_eq!(ui.len(), 1);
        assert_eq!(ui.get("theme").and_then(Value::as_str), Some("dark"));
    }

    #[test]
    fn save_theme_keeps_unrelated_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "logging:\n  level: debug\nui:\n  theme: dark\n  extra: 3\n",
        )
        .unwrap();
        save_theme(&path, ThemeMode::Light).unwrap();

        let written: Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.get("service").is_none());
        assert_eq!(written["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(written["ui"]["extra"].as_u64(), Some(3));
        assert_eq!(written["ui"]["theme"].as_str(), Some("light"));
    }

    #[test]
    fn env_overrides() {
        let dir = tempdir().unwrap();
        env::set_var("CAPTION_TUI_T4_UI__THEME", "dark");
        env::set_var("CAPTION_TUI_T4_SERVICE__REQUEST_TIMEOUT", "2m");
        env::set_var("CAPTION_TUI_T4_SERVICE__ENDPOINT", "http://gpu-box:5000/caption");
        let cfg = load(isolated(dir.path().join("none.yaml"), "CAPTION_TUI_T4")).unwrap();
        assert_eq!(cfg.ui.theme, ThemeMode::Dark);
        assert_eq!(cfg.service.request_timeout, Some(Duration::from_secs(120)));
        assert_eq!(cfg.service.endpoint, "http://gpu-box:5000/caption");
        env::remove_var("CAPTION_TUI_T4_UI__THEME");
        env::remove_var("CAPTION_TUI_T4_SERVICE__REQUEST_TIMEOUT");
        env::remove_var("CAPTION_TUI_T4_SERVICE__ENDPOINT");
    }

    #[test]
    fn invalid_env_theme_is_ignored() {
        let dir = tempdir().unwrap();
        env::set_var("CAPTION_TUI_T5_UI__THEME", "sepia");
        let cfg = load(isolated(dir.path().join("none.yaml"), "CAPTION_TUI_T5")).unwrap();
        assert_eq!(cfg.ui.theme, ThemeMode::Light);
        env::remove_var("CAPTION_TUI_T5_UI__THEME");
    }

    #[test]
    fn theme_toggles_back() {
        assert_eq!(ThemeMode::Light.toggled().toggled(), ThemeMode::Light);
        assert_eq!(ThemeMode::Light.toggled(), ThemeMode::Dark);
        assert_eq!("Dark".parse::<ThemeMode>().unwrap(), ThemeMode::Dark);
    }
}
