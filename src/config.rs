use crate::task::{MarkerCycle, DEFAULT_MARKERS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cycle order, one marker per character.
    pub markers: String,
    pub start_in_preview: bool,
    pub debounce_ms: u64,
    pub preview_max_chars: usize,
    pub wrap: bool,
    pub tab_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.concat(),
            start_in_preview: true,
            debounce_ms: 250,
            preview_max_chars: 300,
            wrap: true,
            tab_width: 4,
        }
    }
}

impl Config {
    pub fn marker_cycle(&self) -> Result<MarkerCycle> {
        MarkerCycle::from_chars(&self.markers)
            .with_context(|| format!("Invalid markers setting {:?}", self.markers))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PartialConfig {
    markers: Option<String>,
    start_in_preview: Option<bool>,
    debounce_ms: Option<u64>,
    preview_max_chars: Option<usize>,
    wrap: Option<bool>,
    tab_width: Option<usize>,
}

fn or_default<T>(value: Option<T>, default: T, changed: &mut bool) -> T {
    match value {
        Some(v) => v,
        None => {
            *changed = true;
            default
        }
    }
}

impl PartialConfig {
    fn apply_defaults(self) -> (Config, bool) {
        let defaults = Config::default();
        let mut changed = false;

        let config = Config {
            markers: or_default(self.markers, defaults.markers, &mut changed),
            start_in_preview: or_default(
                self.start_in_preview,
                defaults.start_in_preview,
                &mut changed,
            ),
            debounce_ms: or_default(self.debounce_ms, defaults.debounce_ms, &mut changed),
            preview_max_chars: or_default(
                self.preview_max_chars,
                defaults.preview_max_chars,
                &mut changed,
            ),
            wrap: or_default(self.wrap, defaults.wrap, &mut changed),
            tab_width: or_default(self.tab_width, defaults.tab_width, &mut changed),
        };
        (config, changed)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("taskmark").join("config.toml"))
}

pub fn log_path() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("Could not determine cache directory")?;
    Ok(base.join("taskmark").join("taskmark.log"))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        write_config_to(path, &cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let partial: PartialConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let (cfg, changed) = partial.apply_defaults();
    cfg.marker_cycle()
        .with_context(|| format!("Bad configuration in {}", path.display()))?;
    if changed {
        write_config_to(path, &cfg)?;
    }
    Ok(cfg)
}

pub fn write_config_to(path: &Path, cfg: &Config) -> Result<()> {
    ensure_parent_dir(path)?;
    let text = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn open_config_in_editor() -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        write_config_to(&path, &Config::default())?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "nvim".to_string());
    let mut parts = match shell_words::split(&editor) {
        Ok(p) if !p.is_empty() => p,
        _ => vec![editor],
    };
    let cmd = parts.remove(0);
    let status = Command::new(cmd)
        .args(parts)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to launch editor for {}", path.display()))?;
    if !status.success() {
        anyhow::bail!("Editor exited with status {}", status);
    }
    Ok(())
}
