use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub ui: UiConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollConfig {
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            poll: PollConfig {
                interval_ms: DEFAULT_POLL_INTERVAL_MS,
            },
            ui: UiConfig {
                color: true,
                max_table_rows: 20,
            },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    api: Option<RawApiConfig>,
    poll: Option<RawPollConfig>,
    ui: Option<RawUiConfig>,
}

#[derive(Debug, Deserialize)]
struct RawApiConfig {
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPollConfig {
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

pub fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("the HOME environment variable is not set"))
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/sentra/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s).context("parsing config file (TOML)")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(api) = raw.api {
        if let Some(base_url) = api.base_url {
            cfg.api.base_url = base_url;
        }
    }

    if let Some(poll) = raw.poll {
        if let Some(interval_ms) = poll.interval_ms {
            cfg.poll.interval_ms = interval_ms;
        }
    }

    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("SENTRA_API_BASE_URL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.api.base_url = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("SENTRA_POLL_INTERVAL_MS") {
        cfg.poll.interval_ms = v
            .trim()
            .parse::<u64>()
            .with_context(|| "SENTRA_POLL_INTERVAL_MS")?;
    }
    if let Ok(v) = std::env::var("SENTRA_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "SENTRA_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("SENTRA_UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v
            .trim()
            .parse::<usize>()
            .with_context(|| "SENTRA_UI_MAX_TABLE_ROWS")?;
    }

    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!(
            "invalid boolean: {s} (use true|false|1|0|yes|no|on|off)"
        )),
    }
}
