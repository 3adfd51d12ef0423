use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;

pub const CONFIG_PATH_ENV: &str = "IPA_SIDELOADER_CONFIG_PATH";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Shells out to `idevice_id`, `ideviceinfo` and `ideviceinstaller`.
    #[default]
    Libimobiledevice,
    /// Reads USB descriptors directly; installs are simulated.
    Usb,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "libimobiledevice" | "idevice" => Some(BackendKind::Libimobiledevice),
            "usb" => Some(BackendKind::Usb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ToolSettings {
    pub device_list_path: String,
    pub device_info_path: String,
    pub installer_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingSettings {
    pub presence_interval_ms: u64,
    pub retry_delay_ms: u64,
    pub idle_backoff_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            presence_interval_ms: 2_000,
            retry_delay_ms: 5_000,
            idle_backoff_ms: 1_000,
        }
    }
}

impl PollingSettings {
    pub fn presence_interval(&self) -> Duration {
        Duration::from_millis(self.presence_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    pub query_timeout_secs: u64,
    pub install_timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            query_timeout_secs: 10,
            install_timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UsbSettings {
    pub vendor_id: u16,
    pub product_id_min: u16,
    pub product_id_max: u16,
    pub simulated_stage_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            vendor_id: 0x05ac,
            product_id_min: 0x1290,
            product_id_max: 0x12af,
            simulated_stage_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub max_log_entries: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            max_log_entries: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub commands: CommandSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub last_package_path: String,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    home_dir().join(".ipa_sideloader_config.json")
}

pub fn backup_config_path() -> PathBuf {
    let primary = config_path();
    primary.with_extension("backup.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path(), trace_id)
}

/// Where the user's text is kept when some sections could not be read.
pub fn rejected_config_path(path: &Path) -> PathBuf {
    path.with_extension("rejected.json")
}

/// Result of reading a config file. Sections listed in `rejected` fell back
/// to their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub rejected: Vec<String>,
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    Ok(load_config_checked(path, trace_id)?.config)
}

/// Reads each section on its own so one bad value does not discard the rest.
/// When anything is rejected the original file is copied aside before it can
/// be overwritten by a later save.
pub fn load_config_checked(path: &Path, trace_id: &str) -> Result<LoadedConfig, AppError> {
    if !path.exists() {
        return Ok(LoadedConfig {
            config: AppConfig::default(),
            rejected: Vec::new(),
        });
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    if !value.is_object() {
        return Err(AppError::validation(
            "Failed to parse config: expected a JSON object",
            trace_id,
        ));
    }

    let mut rejected = Vec::new();
    let config = AppConfig {
        backend: read_section(&value, "backend", &mut rejected),
        tools: read_section(&value, "tools", &mut rejected),
        polling: read_section(&value, "polling", &mut rejected),
        commands: read_section(&value, "commands", &mut rejected),
        usb: read_section(&value, "usb", &mut rejected),
        logging: read_section(&value, "logging", &mut rejected),
        last_package_path: read_section(&value, "last_package_path", &mut rejected),
    };

    if !rejected.is_empty() {
        fs::write(rejected_config_path(path), &raw).map_err(|err| {
            AppError::system(format!("Failed to preserve rejected config: {err}"), trace_id)
        })?;
    }
    Ok(LoadedConfig {
        config: validate_config(config),
        rejected,
    })
}

fn read_section<T>(value: &serde_json::Value, key: &str, rejected: &mut Vec<String>) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(section) = value.get(key) else {
        return T::default();
    };
    serde_json::from_value(section.clone()).unwrap_or_else(|err| {
        rejected.push(format!("{key}: {err}"));
        T::default()
    })
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = AppConfig::default();
    if !(100..=60_000).contains(&config.polling.presence_interval_ms) {
        config.polling.presence_interval_ms = defaults.polling.presence_interval_ms;
    }
    if !(100..=300_000).contains(&config.polling.retry_delay_ms) {
        config.polling.retry_delay_ms = defaults.polling.retry_delay_ms;
    }
    // Zero would bring back the tight loop on the "no package" branch.
    if !(50..=60_000).contains(&config.polling.idle_backoff_ms) {
        config.polling.idle_backoff_ms = defaults.polling.idle_backoff_ms;
    }
    if config.commands.query_timeout_secs == 0 {
        config.commands.query_timeout_secs = defaults.commands.query_timeout_secs;
    }
    if config.commands.install_timeout_secs == 0 {
        config.commands.install_timeout_secs = defaults.commands.install_timeout_secs;
    }
    if config.usb.product_id_min > config.usb.product_id_max {
        config.usb.product_id_min = defaults.usb.product_id_min;
        config.usb.product_id_max = defaults.usb.product_id_max;
    }
    if config.logging.max_log_entries < 10 {
        config.logging.max_log_entries = defaults.logging.max_log_entries;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = defaults.logging.log_level;
    }
    config
}
