use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::device::boundary::{placeholder_snapshot, DeviceBoundary};
use crate::app::events::{emit_log, emit_warning, UiEmitter, UiEvent};
use crate::app::models::DeviceSnapshot;

const STOP_POLL_SLICE: Duration = Duration::from_millis(50);

pub struct PresenceMonitorHandle {
    stop_flag: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl PresenceMonitorHandle {
    pub fn stop(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}

/// One presence query. Boundary errors become an error snapshot; a failed
/// metadata lookup keeps the device present with placeholder metadata.
pub fn probe_presence(boundary: &dyn DeviceBoundary, trace_id: &str) -> DeviceSnapshot {
    let identifier = match boundary.first_device(trace_id) {
        Ok(Some(identifier)) => identifier,
        Ok(None) => return DeviceSnapshot::absent(),
        Err(err) => return DeviceSnapshot::failed(err.error),
    };
    match boundary.describe_device(&identifier, trace_id) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                identifier = %identifier,
                error = %err,
                "device metadata unavailable"
            );
            placeholder_snapshot(&identifier)
        }
    }
}

/// Runs one poll, publishes the snapshot and logs errors and connection changes.
pub fn run_presence_cycle(
    boundary: &dyn DeviceBoundary,
    emitter: &UiEmitter,
    previous: Option<&DeviceSnapshot>,
) -> DeviceSnapshot {
    let trace_id = Uuid::new_v4().to_string();
    let snapshot = probe_presence(boundary, &trace_id);
    debug!(
        trace_id = %trace_id,
        present = snapshot.present,
        identifier = %snapshot.identifier,
        "presence poll"
    );

    if let Some(error) = &snapshot.error {
        emit_warning(
            emitter,
            &trace_id,
            format!("Error checking device connection - {error}"),
        );
    } else {
        let was_present = previous.map(|prev| prev.present).unwrap_or(false);
        let previous_id = previous.map(|prev| prev.identifier.as_str()).unwrap_or("");
        if snapshot.present && (!was_present || previous_id != snapshot.identifier) {
            emit_log(
                emitter,
                &trace_id,
                format!(
                    "iPhone connected: {} (iOS {}) [{}]",
                    snapshot.display_name, snapshot.os_version, snapshot.identifier
                ),
            );
        } else if !snapshot.present && was_present {
            emit_log(emitter, &trace_id, "iPhone disconnected");
        }
    }

    emitter(UiEvent::Snapshot(snapshot.clone()));
    snapshot
}

/// Polls for the lifetime of the program. Errors never end the loop.
pub fn start_presence_monitor(
    boundary: Arc<dyn DeviceBoundary>,
    interval: Duration,
    emitter: UiEmitter,
) -> PresenceMonitorHandle {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_thread = Arc::clone(&stop_flag);

    let join = thread::spawn(move || {
        let mut previous: Option<DeviceSnapshot> = None;
        while !stop_thread.load(Ordering::Relaxed) {
            let started = Instant::now();
            let snapshot = run_presence_cycle(boundary.as_ref(), &emitter, previous.as_ref());
            previous = Some(snapshot);

            let deadline = started + interval;
            while !stop_thread.load(Ordering::Relaxed) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep((deadline - now).min(STOP_POLL_SLICE));
            }
        }
    });

    PresenceMonitorHandle { stop_flag, join }
}
