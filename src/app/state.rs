use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::app::config::AppConfig;
use crate::app::device::package::{has_package_extension, normalize_package_path};
use crate::app::error::AppError;
use crate::app::events::UiEvent;
use crate::app::log_book::LogBook;
use crate::app::models::{DeviceSnapshot, InstallOutcome, LogEntry, TransferState};
use crate::app::transfer::TransferController;

/// The user's chosen package path, shared with the sideload worker.
#[derive(Debug, Clone, Default)]
pub struct PackageSelection {
    inner: Arc<RwLock<Option<PathBuf>>>,
}

impl PackageSelection {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(path)),
        }
    }

    pub fn get(&self) -> Option<PathBuf> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, path: Option<PathBuf>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = path,
            Err(poisoned) => *poisoned.into_inner() = path,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.get().is_some()
    }
}

/// Applies the picker's extension filter. Contents are not checked here; the
/// sideload cycle only looks at the file when it is about to install it.
pub fn validate_package_choice(raw: &str, trace_id: &str) -> Result<PathBuf, AppError> {
    if raw.trim().is_empty() {
        return Err(AppError::validation("package path is required", trace_id));
    }
    let path = normalize_package_path(raw);
    if !has_package_extension(&path) {
        return Err(AppError::validation(
            format!("Only .ipa files can be selected: {}", path.display()),
            trace_id,
        ));
    }
    Ok(path)
}

/// Display state. Owned by the UI thread alone; workers reach it only
/// through [`UiEvent`]s.
pub struct AppState {
    pub config: AppConfig,
    pub backend_name: &'static str,
    pub controller: TransferController,
    pub status_line: String,
    pub snapshot: Option<DeviceSnapshot>,
    pub last_install: Option<InstallOutcome>,
    pub log: LogBook,
}

impl AppState {
    pub fn new(config: AppConfig, backend_name: &'static str, controller: TransferController) -> Self {
        let log = LogBook::new(config.logging.max_log_entries);
        Self {
            config,
            backend_name,
            controller,
            status_line: "Status: Waiting for iPhone...".to_string(),
            snapshot: None,
            last_install: None,
            log,
        }
    }

    pub fn selection(&self) -> &PackageSelection {
        self.controller.selection()
    }

    pub fn selected_path(&self) -> Option<PathBuf> {
        self.selection().get()
    }

    pub fn select_package(&mut self, path: &Path) {
        self.selection().set(Some(path.to_path_buf()));
        self.config.last_package_path = path.to_string_lossy().to_string();
    }

    pub fn clear_package(&mut self) {
        self.selection().set(None);
        self.config.last_package_path.clear();
    }

    pub fn transfer_state(&self) -> TransferState {
        self.controller.state()
    }

    /// Folds a worker event into display state. Returns the log entry it
    /// appended, if any, so the caller can render it.
    pub fn apply_event(&mut self, event: UiEvent) -> Option<LogEntry> {
        match event {
            UiEvent::Status(line) => {
                self.status_line = line;
                None
            }
            UiEvent::Log(message) => Some(self.log.append(message).clone()),
            UiEvent::Snapshot(snapshot) => {
                // The sideload loop owns the status line while it runs.
                if self.transfer_state() == TransferState::Idle {
                    self.status_line = snapshot.status_line();
                }
                self.snapshot = Some(snapshot);
                None
            }
            UiEvent::InstallFinished(outcome) => {
                self.last_install = Some(outcome);
                None
            }
            // A worker stopped before a restart drains after the new one began.
            UiEvent::TransferExited(generation) => {
                if generation != self.controller.generation()
                    || self.transfer_state() == TransferState::Running
                {
                    return None;
                }
                Some(self.log.append("Sideloading stopped").clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::device::build_boundary;
    use crate::app::events::UiEmitter;
    use crate::app::transfer::TransferTiming;
    use std::time::Duration;

    fn idle_state() -> AppState {
        let config = AppConfig::default();
        let boundary = build_boundary(&config);
        let emitter: UiEmitter = Arc::new(|_event: UiEvent| {});
        let controller = TransferController::new(
            boundary,
            PackageSelection::default(),
            emitter,
            TransferTiming {
                retry_delay: Duration::from_millis(10),
                idle_backoff: Duration::from_millis(10),
            },
        );
        AppState::new(config, "test", controller)
    }

    #[test]
    fn selection_is_shared_between_clones() {
        let selection = PackageSelection::default();
        let worker_view = selection.clone();
        assert!(!worker_view.is_selected());
        selection.set(Some(PathBuf::from("/tmp/App.ipa")));
        assert_eq!(worker_view.get(), Some(PathBuf::from("/tmp/App.ipa")));
        selection.set(None);
        assert!(!worker_view.is_selected());
    }

    #[test]
    fn package_choice_enforces_extension_only() {
        assert!(validate_package_choice("/nowhere/App.ipa", "t").is_ok());
        let err = validate_package_choice("/nowhere/App.zip", "t").expect_err("reject");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert!(validate_package_choice("  ", "t").is_err());
    }

    #[test]
    fn snapshot_updates_status_while_idle() {
        let mut state = idle_state();
        assert!(state
            .apply_event(UiEvent::Snapshot(DeviceSnapshot::absent()))
            .is_none());
        assert_eq!(state.status_line, "Status: No iPhone detected");
        assert!(state.snapshot.is_some());
    }

    #[test]
    fn log_events_are_appended_in_order() {
        let mut state = idle_state();
        let first = state.apply_event(UiEvent::Log("one".to_string())).expect("entry");
        let second = state.apply_event(UiEvent::Log("two".to_string())).expect("entry");
        assert!(first.sequence < second.sequence);
        assert_eq!(state.log.len(), 2);
    }

    #[test]
    fn exit_of_replaced_worker_is_not_logged() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let package = tmp.path().join("App.ipa");
        std::fs::write(&package, b"ipa").expect("write");
        let mut state = idle_state();
        state.select_package(&package);

        state.controller.start("t1").expect("first start");
        let first = state.controller.stop().expect("first worker");
        state.controller.start("t2").expect("second start");
        assert!(state.apply_event(UiEvent::TransferExited(1)).is_none());
        assert!(state.log.is_empty());

        let second = state.controller.stop().expect("second worker");
        let entry = state
            .apply_event(UiEvent::TransferExited(2))
            .expect("current worker exit is logged");
        assert_eq!(entry.message, "Sideloading stopped");
        first.join().expect("first joins");
        second.join().expect("second joins");
    }

    #[test]
    fn selecting_package_is_remembered_in_config() {
        let mut state = idle_state();
        state.select_package(Path::new("/tmp/App.ipa"));
        assert_eq!(state.config.last_package_path, "/tmp/App.ipa");
        assert!(state.selection().is_selected());
        state.clear_package();
        assert!(state.config.last_package_path.is_empty());
        assert!(state.selected_path().is_none());
    }
}
