use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::app::config::PollingSettings;
use crate::app::device::boundary::DeviceBoundary;
use crate::app::device::package::display_name;
use crate::app::error::AppError;
use crate::app::events::{emit_log, emit_status, emit_warning, UiEmitter, UiEvent};
use crate::app::models::{InstallOutcome, TransferState};
use crate::app::state::PackageSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTiming {
    /// Wait after any cycle that reached the device check.
    pub retry_delay: Duration,
    /// Wait when no package is selected.
    pub idle_backoff: Duration,
}

impl From<&PollingSettings> for TransferTiming {
    fn from(settings: &PollingSettings) -> Self {
        Self {
            retry_delay: settings.retry_delay(),
            idle_backoff: settings.idle_backoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferCycleOutcome {
    NoPackage,
    NoDevice,
    BoundaryError(AppError),
    FileMissing(AppError),
    Installed(InstallOutcome),
    Failed(InstallOutcome),
}

impl TransferCycleOutcome {
    pub fn delay(&self, timing: &TransferTiming) -> Duration {
        match self {
            TransferCycleOutcome::NoPackage => timing.idle_backoff,
            _ => timing.retry_delay,
        }
    }

    pub fn attempted_install(&self) -> bool {
        matches!(
            self,
            TransferCycleOutcome::Installed(_) | TransferCycleOutcome::Failed(_)
        )
    }
}

/// One pass of the sideload loop. Presence is re-queried here rather than
/// taken from the presence monitor, so the two may disagree for a moment.
pub fn run_transfer_cycle(
    boundary: &dyn DeviceBoundary,
    selection: &PackageSelection,
    emitter: &UiEmitter,
    trace_id: &str,
) -> TransferCycleOutcome {
    let Some(package) = selection.get() else {
        emit_status(emitter, "Status: No IPA file selected");
        emit_log(emitter, trace_id, "No IPA file selected");
        return TransferCycleOutcome::NoPackage;
    };

    let identifier = match boundary.first_device(trace_id) {
        Ok(Some(identifier)) => identifier,
        Ok(None) => {
            emit_status(emitter, "Status: No device connected");
            emit_log(emitter, trace_id, "No device connected; waiting before retry");
            return TransferCycleOutcome::NoDevice;
        }
        Err(err) => {
            emit_status(emitter, format!("Status: Error - {}", err.error));
            emit_warning(emitter, trace_id, format!("Device check failed: {}", err.error));
            return TransferCycleOutcome::BoundaryError(err);
        }
    };

    emit_status(emitter, "Status: Starting installation...");
    if !package.exists() {
        let err = AppError::file_missing(&package.to_string_lossy(), trace_id);
        emit_status(emitter, "Status: Error - IPA file not found");
        emit_warning(emitter, trace_id, err.error.clone());
        return TransferCycleOutcome::FileMissing(err);
    }

    emit_log(
        emitter,
        trace_id,
        format!("Installing {} on {identifier}", display_name(&package)),
    );
    let progress = |stage: &str| emit_status(emitter, format!("Status: {stage}"));
    let outcome = match boundary.install(&identifier, &package, trace_id, &progress) {
        Ok(outcome) => outcome,
        Err(err) => {
            emit_status(emitter, format!("Status: Error - {}", err.error));
            emit_warning(emitter, trace_id, format!("Installer unavailable: {}", err.error));
            return TransferCycleOutcome::BoundaryError(err);
        }
    };

    emit_status(emitter, format!("Status: {}", outcome.message));
    if outcome.success {
        emit_log(emitter, trace_id, outcome.message.clone());
        emitter(UiEvent::InstallFinished(outcome.clone()));
        TransferCycleOutcome::Installed(outcome)
    } else {
        emit_warning(emitter, trace_id, outcome.message.clone());
        emitter(UiEvent::InstallFinished(outcome.clone()));
        TransferCycleOutcome::Failed(outcome)
    }
}

fn run_transfer_loop(
    boundary: Arc<dyn DeviceBoundary>,
    selection: PackageSelection,
    emitter: UiEmitter,
    timing: TransferTiming,
    stop_flag: Arc<AtomicBool>,
    generation: u64,
) {
    // The flag is only checked here: a cycle that has started, including its
    // trailing sleep, always runs to completion.
    while !stop_flag.load(Ordering::Relaxed) {
        let trace_id = Uuid::new_v4().to_string();
        let outcome = run_transfer_cycle(boundary.as_ref(), &selection, &emitter, &trace_id);
        thread::sleep(outcome.delay(&timing));
    }
    info!(generation, "sideload loop exited");
    emitter(UiEvent::TransferExited(generation));
}

struct ActiveTransfer {
    stop_flag: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Owns the start/stop toggle. Every start spawns a fresh worker with its own
/// stop flag, so a worker that is still draining after `stop` is never revived.
pub struct TransferController {
    boundary: Arc<dyn DeviceBoundary>,
    selection: PackageSelection,
    emitter: UiEmitter,
    timing: TransferTiming,
    active: Option<ActiveTransfer>,
    generation: u64,
}

impl TransferController {
    pub fn new(
        boundary: Arc<dyn DeviceBoundary>,
        selection: PackageSelection,
        emitter: UiEmitter,
        timing: TransferTiming,
    ) -> Self {
        Self {
            boundary,
            selection,
            emitter,
            timing,
            active: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> TransferState {
        if self.active.is_some() {
            TransferState::Running
        } else {
            TransferState::Idle
        }
    }

    pub fn selection(&self) -> &PackageSelection {
        &self.selection
    }

    /// Generation of the most recently started worker; 0 before any start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn start(&mut self, trace_id: &str) -> Result<(), AppError> {
        if self.active.is_some() {
            return Err(AppError::validation("Sideloading is already running", trace_id));
        }
        let package: PathBuf = self
            .selection
            .get()
            .ok_or_else(|| AppError::no_file_selected(trace_id))?;
        info!(trace_id = %trace_id, path = %package.display(), "sideload started");

        let stop_flag = Arc::new(AtomicBool::new(false));
        let boundary = Arc::clone(&self.boundary);
        let selection = self.selection.clone();
        let emitter = Arc::clone(&self.emitter);
        let timing = self.timing;
        let stop_thread = Arc::clone(&stop_flag);
        self.generation += 1;
        let generation = self.generation;
        let join = thread::spawn(move || {
            run_transfer_loop(boundary, selection, emitter, timing, stop_thread, generation);
        });
        self.active = Some(ActiveTransfer { stop_flag, join });
        Ok(())
    }

    /// Flips the stop flag and returns the worker, which finishes its current
    /// cycle before exiting. Dropping the handle leaves it to finish detached.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        let active = self.active.take()?;
        active.stop_flag.store(true, Ordering::Relaxed);
        info!("sideload stop requested");
        Some(active.join)
    }

    pub fn toggle(&mut self, trace_id: &str) -> Result<TransferState, AppError> {
        match self.state() {
            TransferState::Idle => {
                self.start(trace_id)?;
            }
            TransferState::Running => {
                self.stop();
            }
        }
        Ok(self.state())
    }
}
