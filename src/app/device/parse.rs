use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::app::models::{DeviceSnapshot, UNKNOWN_PLACEHOLDER};

pub const UNKNOWN_INSTALL_ERROR: &str = "Unknown error";

/// Identifiers from `idevice_id -l`, one per line. Newer builds append a
/// connection hint such as `(USB)`; only the first token is kept.
pub fn parse_device_ids(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.to_lowercase().starts_with("error"))
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| token.to_string())
        .collect()
}

pub fn first_device_id(output: &str) -> Option<String> {
    parse_device_ids(output).into_iter().next()
}

pub fn parse_device_info_map(output: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // Nested plist values are indented; only top-level keys matter here.
        if key.starts_with(char::is_whitespace) {
            continue;
        }
        let key = key.trim();
        if !key.is_empty() {
            map.insert(key.to_string(), value.trim().to_string());
        }
    }
    map
}

pub fn build_device_snapshot(identifier: &str, info: &HashMap<String, String>) -> DeviceSnapshot {
    let pick = |key: &str| {
        info.get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_PLACEHOLDER)
            .to_string()
    };
    DeviceSnapshot::connected(identifier, pick("DeviceName"), pick("ProductVersion"))
}

fn installer_error_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)got error\s+"?([A-Za-z0-9_]+)"?"#).ok())
        .as_ref()
}

/// The symbolic error name from `ideviceinstaller` output, e.g. `ApplicationVerificationFailed`.
pub fn extract_installer_error(output: &str) -> Option<String> {
    installer_error_re()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().to_string())
}

pub fn installer_failure_reason(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        UNKNOWN_INSTALL_ERROR.to_string()
    } else {
        trimmed.to_string()
    }
}
