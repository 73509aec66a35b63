use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default poll period between Gmail checks (seconds).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1800;
/// Shorter delay used after a failed cycle (seconds).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 60;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub check_interval_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub redirect_uri: Option<String>,
    /// Path to the Google "installed app" credentials.json document.
    pub credentials_path: Option<String>,
    /// Sound file played in a loop while the alarm is active.
    pub sound_file: Option<String>,
}

impl Config {
    pub fn check_interval_secs(&self) -> u64 {
        self.check_interval_secs
            .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS)
    }

    pub fn retry_delay_secs(&self) -> u64 {
        self.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS)
    }

    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8080/callback".to_string())
    }

    pub fn sound_file(&self) -> String {
        self.sound_file.clone().unwrap_or_else(default_sound_file)
    }
}

#[cfg(target_os = "macos")]
fn default_sound_file() -> String {
    "/System/Library/Sounds/Sosumi.aiff".to_string()
}

#[cfg(not(target_os = "macos"))]
fn default_sound_file() -> String {
    "/usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga".to_string()
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mailwatch"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn tokens_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("tokens.json");
    Ok(p)
}

pub fn default_credentials_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("credentials.json");
    Ok(p)
}

/// Load config.toml, writing a template with the defaults on first run.
/// Every field has a usable default, so a fresh template is not an error.
pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let sample = Config {
            check_interval_secs: Some(DEFAULT_CHECK_INTERVAL_SECS),
            retry_delay_secs: Some(DEFAULT_RETRY_DELAY_SECS),
            redirect_uri: Some("http://127.0.0.1:8080/callback".to_string()),
            credentials_path: None,
            sound_file: Some(default_sound_file()),
        };
        let tom = toml::to_string_pretty(&sample)?;
        fs::write(&path, tom)?;
        log::info!("wrote template config at {}", path.display());
        return Ok(sample);
    }
    let s = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}

pub fn resolve_credentials_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.credentials_path {
        Ok(PathBuf::from(p))
    } else {
        default_credentials_path()
    }
}
