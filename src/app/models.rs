use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_PLACEHOLDER: &str = "Unknown";

/// Result of one presence poll. Replaced wholesale every cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub present: bool,
    pub display_name: String,
    pub os_version: String,
    pub identifier: String,
    pub error: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn connected(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        Self {
            present: true,
            display_name: display_name.into(),
            os_version: os_version.into(),
            identifier: identifier.into(),
            error: None,
            observed_at: Utc::now(),
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            display_name: String::new(),
            os_version: String::new(),
            identifier: String::new(),
            error: None,
            observed_at: Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::absent()
        }
    }

    pub fn status_line(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Status: Error checking device connection - {error}");
        }
        if !self.present {
            return "Status: No iPhone detected".to_string();
        }
        format!(
            "Status: iPhone connected - {} (iOS {}) [{}]",
            self.display_name, self.os_version, self.identifier
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Idle,
    Running,
}

impl TransferState {
    pub fn label(&self) -> &'static str {
        match self {
            TransferState::Idle => "idle",
            TransferState::Running => "running",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageInfo {
    pub path: String,
    pub bundle_name: Option<String>,
    pub file_size_bytes: u64,
    pub error: Option<String>,
}

impl PackageInfo {
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.bundle_name.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstallErrorCode {
    Success,
    ApplicationVerificationFailed,
    DeviceOsVersionTooLow,
    PackageInspectionFailed,
    ApplicationAlreadyInstalled,
    InsufficientStorage,
    DeviceLocked,
    NotPaired,
    UnknownError,
}

impl InstallErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            InstallErrorCode::Success => "SUCCESS",
            InstallErrorCode::ApplicationVerificationFailed => "ApplicationVerificationFailed",
            InstallErrorCode::DeviceOsVersionTooLow => "DeviceOSVersionTooLow",
            InstallErrorCode::PackageInspectionFailed => "PackageInspectionFailed",
            InstallErrorCode::ApplicationAlreadyInstalled => "ApplicationAlreadyInstalled",
            InstallErrorCode::InsufficientStorage => "InsufficientStorage",
            InstallErrorCode::DeviceLocked => "DeviceLocked",
            InstallErrorCode::NotPaired => "NotPaired",
            InstallErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            InstallErrorCode::Success => "Installation successful",
            InstallErrorCode::ApplicationVerificationFailed => {
                "Signature or provisioning profile rejected by the device"
            }
            InstallErrorCode::DeviceOsVersionTooLow => "Device iOS version too old for this IPA",
            InstallErrorCode::PackageInspectionFailed => "IPA file is corrupted or invalid",
            InstallErrorCode::ApplicationAlreadyInstalled => {
                "App already installed with a conflicting signature"
            }
            InstallErrorCode::InsufficientStorage => "Not enough storage space on device",
            InstallErrorCode::DeviceLocked => "Device is locked - unlock it and retry",
            InstallErrorCode::NotPaired => "Device is not paired - trust this computer first",
            InstallErrorCode::UnknownError => "Unknown installation error",
        }
    }

    /// Classifies installer output. Callers decide success from the exit code;
    /// this only names the failure.
    pub fn from_output(output: &str) -> Self {
        let lower = output.to_lowercase();
        if lower.trim().is_empty() {
            return InstallErrorCode::UnknownError;
        }
        for code in [
            InstallErrorCode::ApplicationVerificationFailed,
            InstallErrorCode::DeviceOsVersionTooLow,
            InstallErrorCode::PackageInspectionFailed,
            InstallErrorCode::ApplicationAlreadyInstalled,
            InstallErrorCode::InsufficientStorage,
        ] {
            if lower.contains(&code.code().to_lowercase()) {
                return code;
            }
        }
        if lower.contains("passcode") || lower.contains("device is locked") {
            return InstallErrorCode::DeviceLocked;
        }
        if lower.contains("not paired") || lower.contains("pairing") {
            return InstallErrorCode::NotPaired;
        }
        InstallErrorCode::UnknownError
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallOutcome {
    pub identifier: String,
    pub package_path: String,
    pub success: bool,
    pub error_code: InstallErrorCode,
    pub message: String,
    pub raw_output: String,
    pub duration_seconds: f64,
    pub simulated: bool,
}
