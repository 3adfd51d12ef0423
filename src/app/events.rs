use std::sync::mpsc::Sender;
use std::sync::Arc;

use tracing::{info, warn};

use crate::app::models::{DeviceSnapshot, InstallOutcome};

/// What background workers report to the UI thread. Workers never touch
/// display state directly.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Status(String),
    Log(String),
    Snapshot(DeviceSnapshot),
    InstallFinished(InstallOutcome),
    /// Carries the generation of the worker that ended.
    TransferExited(u64),
}

pub type UiEmitter = Arc<dyn Fn(UiEvent) + Send + Sync>;

/// Wraps worker events into whatever message type the receiving loop uses.
pub fn channel_emitter<M, F>(tx: Sender<M>, wrap: F) -> UiEmitter
where
    M: Send + 'static,
    F: Fn(UiEvent) -> M + Send + Sync + 'static,
{
    Arc::new(move |event| {
        // The UI thread is gone once the receiver drops; nothing left to show.
        let _ = tx.send(wrap(event));
    })
}

pub fn emit_status(emitter: &UiEmitter, message: impl Into<String>) {
    emitter(UiEvent::Status(message.into()));
}

pub fn emit_log(emitter: &UiEmitter, trace_id: &str, message: impl Into<String>) {
    let message = message.into();
    info!(trace_id = %trace_id, "{message}");
    emitter(UiEvent::Log(message));
}

pub fn emit_warning(emitter: &UiEmitter, trace_id: &str, message: impl Into<String>) {
    let message = message.into();
    warn!(trace_id = %trace_id, "{message}");
    emitter(UiEvent::Log(message));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_emitter_preserves_order() {
        let (tx, rx) = mpsc::channel::<UiEvent>();
        let emitter = channel_emitter(tx, |event| event);
        emit_status(&emitter, "Status: one");
        emit_log(&emitter, "trace", "two");
        emit_warning(&emitter, "trace", "three");
        let received = rx.try_iter().collect::<Vec<_>>();
        assert_eq!(
            received,
            vec![
                UiEvent::Status("Status: one".to_string()),
                UiEvent::Log("two".to_string()),
                UiEvent::Log("three".to_string()),
            ]
        );
    }

    #[test]
    fn send_after_receiver_drop_is_ignored() {
        let (tx, rx) = mpsc::channel::<UiEvent>();
        let emitter = channel_emitter(tx, |event| event);
        drop(rx);
        emit_status(&emitter, "Status: nobody listening");
    }
}
