use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("KIFU_CONFIG_PATH").unwrap_or("/usr/local/etc/kifu/config.toml"))
});

/// The side to move the initialiser assumes when it cannot otherwise
/// infer it (handicap games, a gap that opens before any move has been
/// recorded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitMode {
    Strict,
    Transparent,
}

impl Default for InitMode {
    fn default() -> Self {
        InitMode::Transparent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub analysis_interval_seconds: f64,
    pub max_init_frames: u32,
    pub mode: InitMode,
    pub double_transform: bool,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub detector_model_path: Option<PathBuf>,
    pub classifier_model_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis_interval_seconds: 0.1,
            max_init_frames: 300,
            mode: InitMode::default(),
            double_transform: false,
            score_threshold: 0.15,
            nms_threshold: 0.5,
            detector_model_path: None,
            classifier_model_path: None,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.max_init_frames, 300);
        assert_eq!(cfg.mode, InitMode::Transparent);
    }

    #[test]
    fn test_round_trip_toml() {
        let cfg = Config::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.analysis_interval_seconds, cfg.analysis_interval_seconds);
    }
}
