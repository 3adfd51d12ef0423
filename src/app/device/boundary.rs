use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::config::AppConfig;
use crate::app::device::locator::{
    resolve_tool_program, validate_tool_program, DEFAULT_DEVICE_INFO_PROGRAM,
    DEFAULT_DEVICE_LIST_PROGRAM, DEFAULT_INSTALLER_PROGRAM,
};
use crate::app::device::parse::{
    build_device_snapshot, extract_installer_error, installer_failure_reason, parse_device_ids,
    parse_device_info_map,
};
use crate::app::device::runner::run_command_with_timeout;
use crate::app::error::AppError;
use crate::app::models::{DeviceSnapshot, InstallErrorCode, InstallOutcome, UNKNOWN_PLACEHOLDER};

/// Progress messages reported while an install is underway.
pub type ProgressSink<'a> = &'a dyn Fn(&str);

/// Everything outside the process that can tell us about an attached phone.
///
/// Each call is a fresh query; implementations keep no presence cache, so two
/// callers polling independently may briefly disagree.
pub trait DeviceBoundary: Send + Sync {
    fn name(&self) -> &'static str;

    fn list_devices(&self, trace_id: &str) -> Result<Vec<String>, AppError>;

    fn describe_device(&self, identifier: &str, trace_id: &str) -> Result<DeviceSnapshot, AppError>;

    /// `Ok` carries both successful and failed installs; `Err` means the
    /// installer itself could not be run.
    fn install(
        &self,
        identifier: &str,
        package: &Path,
        trace_id: &str,
        progress: ProgressSink<'_>,
    ) -> Result<InstallOutcome, AppError>;

    /// At most one device is targeted: the first one listed.
    fn first_device(&self, trace_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.list_devices(trace_id)?.into_iter().next())
    }
}

#[derive(Debug, Clone)]
pub struct LibimobiledeviceBoundary {
    list_program: String,
    info_program: String,
    installer_program: String,
    query_timeout: Duration,
    install_timeout: Duration,
}

impl LibimobiledeviceBoundary {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            list_program: resolve_tool_program(
                &config.tools.device_list_path,
                DEFAULT_DEVICE_LIST_PROGRAM,
            ),
            info_program: resolve_tool_program(
                &config.tools.device_info_path,
                DEFAULT_DEVICE_INFO_PROGRAM,
            ),
            installer_program: resolve_tool_program(
                &config.tools.installer_path,
                DEFAULT_INSTALLER_PROGRAM,
            ),
            query_timeout: Duration::from_secs(config.commands.query_timeout_secs),
            install_timeout: Duration::from_secs(config.commands.install_timeout_secs),
        }
    }

    fn ensure_program(program: &str, trace_id: &str) -> Result<(), AppError> {
        validate_tool_program(program)
            .map_err(|message| AppError::boundary_unavailable(message, trace_id))
    }
}

impl DeviceBoundary for LibimobiledeviceBoundary {
    fn name(&self) -> &'static str {
        "libimobiledevice"
    }

    fn list_devices(&self, trace_id: &str) -> Result<Vec<String>, AppError> {
        Self::ensure_program(&self.list_program, trace_id)?;
        let args = vec!["-l".to_string()];
        let output =
            run_command_with_timeout(&self.list_program, &args, self.query_timeout, trace_id)?;
        if !output.succeeded() && !output.stderr.trim().is_empty() {
            return Err(AppError::boundary_unavailable(
                format!("idevice_id failed: {}", output.stderr.trim()),
                trace_id,
            ));
        }
        Ok(parse_device_ids(&output.stdout))
    }

    fn describe_device(&self, identifier: &str, trace_id: &str) -> Result<DeviceSnapshot, AppError> {
        Self::ensure_program(&self.info_program, trace_id)?;
        let args = vec!["-u".to_string(), identifier.to_string()];
        let output =
            run_command_with_timeout(&self.info_program, &args, self.query_timeout, trace_id)?;
        if !output.succeeded() {
            return Err(AppError::boundary_unavailable(
                format!(
                    "ideviceinfo failed: {}",
                    installer_failure_reason(&output.stderr)
                ),
                trace_id,
            ));
        }
        let info = parse_device_info_map(&output.stdout);
        Ok(build_device_snapshot(identifier, &info))
    }

    fn install(
        &self,
        identifier: &str,
        package: &Path,
        trace_id: &str,
        progress: ProgressSink<'_>,
    ) -> Result<InstallOutcome, AppError> {
        Self::ensure_program(&self.installer_program, trace_id)?;
        let package_path = package.to_string_lossy().to_string();
        let args = vec![
            "-u".to_string(),
            identifier.to_string(),
            "-i".to_string(),
            package_path.clone(),
        ];
        progress("Installing with ideviceinstaller...");
        let started = Instant::now();
        let output =
            run_command_with_timeout(&self.installer_program, &args, self.install_timeout, trace_id)?;
        let duration_seconds = started.elapsed().as_secs_f64();

        // Exit status alone decides success; stderr chatter on a zero exit is ignored.
        if output.succeeded() {
            debug!(trace_id = %trace_id, identifier = %identifier, "ideviceinstaller exited 0");
            return Ok(InstallOutcome {
                identifier: identifier.to_string(),
                package_path,
                success: true,
                error_code: InstallErrorCode::Success,
                message: "Sideload successful".to_string(),
                raw_output: output.stdout,
                duration_seconds,
                simulated: false,
            });
        }

        let reason = installer_failure_reason(&output.stderr);
        let combined = format!("{}\n{}", output.stderr, output.stdout);
        let error_code = extract_installer_error(&combined)
            .map(|name| InstallErrorCode::from_output(&name))
            .unwrap_or_else(|| InstallErrorCode::from_output(&output.stderr));
        warn!(
            trace_id = %trace_id,
            identifier = %identifier,
            exit_code = ?output.exit_code,
            error_code = error_code.code(),
            "ideviceinstaller failed"
        );
        Ok(InstallOutcome {
            identifier: identifier.to_string(),
            package_path,
            success: false,
            error_code,
            message: format!("Sideload failed - {reason}"),
            raw_output: combined.trim().to_string(),
            duration_seconds,
            simulated: false,
        })
    }
}

/// Snapshot used when the metadata lookup fails but the device is listed.
pub fn placeholder_snapshot(identifier: &str) -> DeviceSnapshot {
    DeviceSnapshot::connected(identifier, UNKNOWN_PLACEHOLDER, UNKNOWN_PLACEHOLDER)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::app::error::ERR_BOUNDARY_UNAVAILABLE;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    fn boundary_with(dir: &Path, list: &str, info: &str, install: &str) -> LibimobiledeviceBoundary {
        let mut config = AppConfig::default();
        config.tools.device_list_path = write_script(dir, "idevice_id", list)
            .to_string_lossy()
            .to_string();
        config.tools.device_info_path = write_script(dir, "ideviceinfo", info)
            .to_string_lossy()
            .to_string();
        config.tools.installer_path = write_script(dir, "ideviceinstaller", install)
            .to_string_lossy()
            .to_string();
        config.commands.query_timeout_secs = 5;
        config.commands.install_timeout_secs = 5;
        LibimobiledeviceBoundary::from_config(&config)
    }

    #[test]
    fn first_of_two_listed_devices_is_selected() {
        let tmp = TempDir::new().expect("tmp");
        let boundary = boundary_with(tmp.path(), "printf 'UDID-A\\nUDID-B\\n'", "true", "true");
        assert_eq!(boundary.list_devices("t").expect("list").len(), 2);
        assert_eq!(boundary.first_device("t").expect("first").as_deref(), Some("UDID-A"));
    }

    #[test]
    fn describes_device_from_info_output() {
        let tmp = TempDir::new().expect("tmp");
        let boundary = boundary_with(
            tmp.path(),
            "echo UDID-A",
            "printf 'DeviceName: Bob Phone\\nProductVersion: 16.7\\n'",
            "true",
        );
        let snapshot = boundary.describe_device("UDID-A", "t").expect("describe");
        assert_eq!(snapshot.display_name, "Bob Phone");
        assert_eq!(snapshot.os_version, "16.7");
    }

    #[test]
    fn zero_exit_is_success_even_with_stderr() {
        let tmp = TempDir::new().expect("tmp");
        let boundary = boundary_with(
            tmp.path(),
            "echo UDID-A",
            "true",
            "echo 'WARNING: something noisy' 1>&2; exit 0",
        );
        let outcome = boundary
            .install("UDID-A", Path::new("/tmp/App.ipa"), "t", &|_: &str| {})
            .expect("install");
        assert!(outcome.success);
        assert_eq!(outcome.error_code, InstallErrorCode::Success);
        assert!(!outcome.simulated);
    }

    #[test]
    fn non_zero_exit_with_empty_stderr_is_unknown_error() {
        let tmp = TempDir::new().expect("tmp");
        let boundary = boundary_with(tmp.path(), "echo UDID-A", "true", "exit 1");
        let outcome = boundary
            .install("UDID-A", Path::new("/tmp/App.ipa"), "t", &|_: &str| {})
            .expect("install");
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Sideload failed - Unknown error");
        assert_eq!(outcome.error_code, InstallErrorCode::UnknownError);
    }

    #[test]
    fn non_zero_exit_reports_stderr_and_classifies_it() {
        let tmp = TempDir::new().expect("tmp");
        let boundary = boundary_with(
            tmp.path(),
            "echo UDID-A",
            "true",
            "echo 'ERROR: Install failed. Got error \"ApplicationVerificationFailed\"' 1>&2; exit 1",
        );
        let outcome = boundary
            .install("UDID-A", Path::new("/tmp/App.ipa"), "t", &|_: &str| {})
            .expect("install");
        assert!(!outcome.success);
        assert!(outcome.message.contains("ApplicationVerificationFailed"));
        assert_eq!(outcome.error_code, InstallErrorCode::ApplicationVerificationFailed);
    }

    #[test]
    fn missing_tool_is_boundary_unavailable() {
        let mut config = AppConfig::default();
        config.tools.device_list_path = "/this/path/should/not/exist/idevice_id".to_string();
        let boundary = LibimobiledeviceBoundary::from_config(&config);
        let err = boundary.list_devices("trace-x").expect_err("expected error");
        assert_eq!(err.code, ERR_BOUNDARY_UNAVAILABLE);
    }

    #[test]
    fn listing_error_with_stderr_is_reported() {
        let tmp = TempDir::new().expect("tmp");
        let boundary = boundary_with(
            tmp.path(),
            "echo 'ERROR: Unable to retrieve device list!' 1>&2; exit 1",
            "true",
            "true",
        );
        let err = boundary.list_devices("t").expect_err("expected error");
        assert!(err.error.contains("Unable to retrieve device list"));
    }
}
