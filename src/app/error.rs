use serde::Serialize;
use std::fmt;

pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";
pub const ERR_BOUNDARY_UNAVAILABLE: &str = "ERR_BOUNDARY_UNAVAILABLE";
pub const ERR_NO_DEVICE: &str = "ERR_NO_DEVICE";
pub const ERR_NO_FILE_SELECTED: &str = "ERR_NO_FILE_SELECTED";
pub const ERR_FILE_MISSING: &str = "ERR_FILE_MISSING";
pub const ERR_INSTALL_FAILED: &str = "ERR_INSTALL_FAILED";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    /// The external tool or USB subsystem is missing or returned an error.
    pub fn boundary_unavailable(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_BOUNDARY_UNAVAILABLE, message, trace_id)
    }

    pub fn no_device(trace_id: impl Into<String>) -> Self {
        Self::new(ERR_NO_DEVICE, "No device connected", trace_id)
    }

    pub fn no_file_selected(trace_id: impl Into<String>) -> Self {
        Self::new(ERR_NO_FILE_SELECTED, "Please select an IPA file first", trace_id)
    }

    pub fn file_missing(path: &str, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_FILE_MISSING, format!("IPA file not found: {path}"), trace_id)
    }

    pub fn install_failed(reason: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_INSTALL_FAILED, reason, trace_id)
    }

    pub fn is_code(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
