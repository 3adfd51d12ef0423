use std::io::{self, BufRead, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::warn;
use uuid::Uuid;

use crate::app::config::save_config;
use crate::app::device::package::{display_name, inspect_package};
use crate::app::error::{AppError, ERR_NO_FILE_SELECTED};
use crate::app::events::UiEvent;
use crate::app::log_book::format_entry;
use crate::app::models::TransferState;
use crate::app::state::{validate_package_choice, AppState};

const DEFAULT_LOG_TAIL: usize = 20;

const HELP_TEXT: &str = "Commands:
  select <path>   choose the .ipa to sideload
  clear           forget the selected file
  start | stop    start or stop sideloading (toggle flips it)
  status          show device, file and loop state
  info            inspect the selected .ipa
  log [n]         show the last n log lines
  help            show this text
  quit            exit";

/// Everything the UI thread reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum AppMessage {
    Ui(UiEvent),
    Input(String),
    InputClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Select(String),
    Clear,
    Start,
    Stop,
    Toggle,
    Status,
    Info,
    Log(usize),
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (trimmed, ""),
        };
        let command = match verb.to_lowercase().as_str() {
            "select" | "open" => {
                if rest.is_empty() {
                    return Err("select requires a path".to_string());
                }
                ConsoleCommand::Select(rest.to_string())
            }
            "clear" => ConsoleCommand::Clear,
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "toggle" => ConsoleCommand::Toggle,
            "status" => ConsoleCommand::Status,
            "info" => ConsoleCommand::Info,
            "log" => {
                let count = if rest.is_empty() {
                    DEFAULT_LOG_TAIL
                } else {
                    rest.parse::<usize>()
                        .map_err(|_| "log expects a number of lines".to_string())?
                };
                ConsoleCommand::Log(count)
            }
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            other => return Err(format!("Unknown command: {other} (try 'help')")),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Text rendering of the window: a status line, an append-only log, and a
/// modal error box that swallows the next input line.
pub struct Console<W: Write> {
    out: W,
    persist: bool,
    dialog_open: bool,
    last_status: String,
}

impl<W: Write> Console<W> {
    /// With `persist` off, selections stay in memory only.
    pub fn new(out: W, persist: bool) -> Self {
        Self {
            out,
            persist,
            dialog_open: false,
            last_status: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn dialog_open(&self) -> bool {
        self.dialog_open
    }

    pub fn run(&mut self, state: &mut AppState, rx: Receiver<AppMessage>) -> io::Result<()> {
        writeln!(self.out, "IPA Sideloader ({} backend). Type 'help' for commands.", state.backend_name)?;
        self.render_status(state)?;
        for message in rx {
            if self.handle_message(state, message)? == Flow::Quit {
                break;
            }
        }
        // Leave the worker to finish its cycle on its own; nothing waits for it.
        drop(state.controller.stop());
        self.out.flush()
    }

    pub fn handle_message(&mut self, state: &mut AppState, message: AppMessage) -> io::Result<Flow> {
        match message {
            AppMessage::Ui(event) => {
                if let Some(entry) = state.apply_event(event) {
                    writeln!(self.out, "{}", format_entry(&entry))?;
                }
                self.render_status(state)?;
                Ok(Flow::Continue)
            }
            AppMessage::Input(line) => {
                if self.dialog_open {
                    self.dialog_open = false;
                    return Ok(Flow::Continue);
                }
                match ConsoleCommand::parse(&line) {
                    Ok(Some(command)) => self.handle_command(state, command),
                    Ok(None) => Ok(Flow::Continue),
                    Err(message) => {
                        writeln!(self.out, "{message}")?;
                        Ok(Flow::Continue)
                    }
                }
            }
            AppMessage::InputClosed => Ok(Flow::Quit),
        }
    }

    pub fn handle_command(&mut self, state: &mut AppState, command: ConsoleCommand) -> io::Result<Flow> {
        let trace_id = Uuid::new_v4().to_string();
        match command {
            ConsoleCommand::Select(raw) => match validate_package_choice(&raw, &trace_id) {
                Ok(path) => {
                    state.select_package(&path);
                    writeln!(self.out, "Selected: {}", display_name(&path))?;
                    self.save_selection(state, &trace_id);
                }
                Err(err) => writeln!(self.out, "{}", err.error)?,
            },
            ConsoleCommand::Clear => {
                state.clear_package();
                writeln!(self.out, "No file selected")?;
                self.save_selection(state, &trace_id);
            }
            ConsoleCommand::Start => {
                if state.transfer_state() == TransferState::Running {
                    writeln!(self.out, "Sideloading is already running")?;
                } else {
                    self.start(state, &trace_id)?;
                }
            }
            ConsoleCommand::Stop => self.stop(state)?,
            ConsoleCommand::Toggle => match state.controller.toggle(&trace_id) {
                Ok(TransferState::Running) => writeln!(self.out, "Sideloading started")?,
                Ok(TransferState::Idle) => writeln!(self.out, "Stopping after the current cycle...")?,
                Err(err) if err.is_code(ERR_NO_FILE_SELECTED) => self.show_error_dialog(&err)?,
                Err(err) => writeln!(self.out, "{}", err.error)?,
            },
            ConsoleCommand::Status => self.print_summary(state)?,
            ConsoleCommand::Info => match state.selected_path() {
                Some(path) => {
                    let info = inspect_package(&path);
                    writeln!(self.out, "File: {}", info.path)?;
                    writeln!(self.out, "Size: {} bytes", info.file_size_bytes)?;
                    match (&info.bundle_name, &info.error) {
                        (_, Some(error)) => writeln!(self.out, "Problem: {error}")?,
                        (Some(bundle), None) => writeln!(self.out, "Bundle: {bundle}.app")?,
                        (None, None) => {}
                    }
                }
                None => writeln!(self.out, "No file selected")?,
            },
            ConsoleCommand::Log(count) => {
                if state.log.evicted() > 0 {
                    writeln!(self.out, "({} older lines dropped)", state.log.evicted())?;
                }
                for entry in state.log.tail(count) {
                    writeln!(self.out, "{}", format_entry(entry))?;
                }
            }
            ConsoleCommand::Help => writeln!(self.out, "{HELP_TEXT}")?,
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn start(&mut self, state: &mut AppState, trace_id: &str) -> io::Result<()> {
        match state.controller.start(trace_id) {
            Ok(()) => {
                writeln!(self.out, "Sideloading started (type 'stop' to stop)")?;
                Ok(())
            }
            Err(err) if err.is_code(ERR_NO_FILE_SELECTED) => self.show_error_dialog(&err),
            Err(err) => writeln!(self.out, "{}", err.error),
        }
    }

    fn stop(&mut self, state: &mut AppState) -> io::Result<()> {
        if state.controller.stop().is_some() {
            writeln!(self.out, "Stopping after the current cycle...")
        } else {
            writeln!(self.out, "Sideloading is not running")
        }
    }

    fn show_error_dialog(&mut self, err: &AppError) -> io::Result<()> {
        let width = err.error.chars().count() + 4;
        writeln!(self.out, "+{}+", "-".repeat(width))?;
        writeln!(self.out, "|  Error{}|", " ".repeat(width.saturating_sub(7)))?;
        writeln!(self.out, "|  {}  |", err.error)?;
        writeln!(self.out, "+{}+", "-".repeat(width))?;
        writeln!(self.out, "Press Enter to continue.")?;
        self.dialog_open = true;
        Ok(())
    }

    fn render_status(&mut self, state: &AppState) -> io::Result<()> {
        if state.status_line != self.last_status {
            self.last_status = state.status_line.clone();
            writeln!(self.out, "{}", state.status_line)?;
        }
        Ok(())
    }

    fn print_summary(&mut self, state: &AppState) -> io::Result<()> {
        writeln!(self.out, "{}", state.status_line)?;
        match &state.snapshot {
            Some(snapshot) => writeln!(self.out, "Device: {}", snapshot.status_line())?,
            None => writeln!(self.out, "Device: not checked yet")?,
        }
        match state.selected_path() {
            Some(path) => writeln!(self.out, "Selected: {}", path.display())?,
            None => writeln!(self.out, "No file selected")?,
        }
        writeln!(self.out, "Sideloading: {}", state.transfer_state().label())?;
        if let Some(outcome) = &state.last_install {
            let note = if outcome.simulated { " (simulated)" } else { "" };
            writeln!(
                self.out,
                "Last install: {} [{}]{note}",
                outcome.message,
                outcome.error_code.description()
            )?;
        }
        Ok(())
    }

    fn save_selection(&self, state: &AppState, trace_id: &str) {
        if !self.persist {
            return;
        }
        if let Err(err) = save_config(&state.config, trace_id) {
            warn!(trace_id = %trace_id, error = %err, "failed to save selection");
        }
    }
}

/// Forwards stdin lines to the UI thread until EOF.
pub fn spawn_stdin_reader(tx: Sender<AppMessage>) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(AppMessage::Input(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(AppMessage::InputClosed);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::AppConfig;
    use crate::app::device::build_boundary;
    use crate::app::events::UiEmitter;
    use crate::app::models::DeviceSnapshot;
    use crate::app::state::PackageSelection;
    use crate::app::transfer::{TransferController, TransferTiming};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    fn state() -> AppState {
        let config = AppConfig::default();
        let emitter: UiEmitter = Arc::new(|_event: UiEvent| {});
        let controller = TransferController::new(
            build_boundary(&config),
            PackageSelection::default(),
            emitter,
            TransferTiming {
                retry_delay: Duration::from_millis(10),
                idle_backoff: Duration::from_millis(10),
            },
        );
        AppState::new(config, "test", controller)
    }

    fn output(console: Console<Vec<u8>>) -> String {
        String::from_utf8(console.into_inner()).expect("utf8")
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            ConsoleCommand::parse("select  ~/Apps/My App.ipa "),
            Ok(Some(ConsoleCommand::Select("~/Apps/My App.ipa".to_string())))
        );
        assert_eq!(ConsoleCommand::parse("LOG 5"), Ok(Some(ConsoleCommand::Log(5))));
        assert_eq!(ConsoleCommand::parse("log"), Ok(Some(ConsoleCommand::Log(DEFAULT_LOG_TAIL))));
        assert_eq!(ConsoleCommand::parse("   "), Ok(None));
        assert!(ConsoleCommand::parse("select").is_err());
        assert!(ConsoleCommand::parse("log many").is_err());
        assert!(ConsoleCommand::parse("fly").is_err());
    }

    #[test]
    fn start_without_file_opens_blocking_dialog() {
        let mut state = state();
        let mut console = Console::new(Vec::new(), false);
        let flow = console
            .handle_message(&mut state, AppMessage::Input("start".to_string()))
            .expect("handle");
        assert_eq!(flow, Flow::Continue);
        assert!(console.dialog_open());
        assert_eq!(state.transfer_state(), TransferState::Idle);

        // The next line only dismisses the dialog; it is not run as a command.
        console
            .handle_message(&mut state, AppMessage::Input("quit".to_string()))
            .expect("dismiss");
        assert!(!console.dialog_open());
        let text = output(console);
        assert!(text.contains("Please select an IPA file first"));
    }

    #[test]
    fn toggle_without_file_also_opens_dialog() {
        let mut state = state();
        let mut console = Console::new(Vec::new(), false);
        console
            .handle_command(&mut state, ConsoleCommand::Toggle)
            .expect("toggle");
        assert!(console.dialog_open());
        assert_eq!(state.transfer_state(), TransferState::Idle);
    }

    #[test]
    fn select_rejects_other_extensions() {
        let mut state = state();
        let mut console = Console::new(Vec::new(), false);
        console
            .handle_command(&mut state, ConsoleCommand::Select("/tmp/App.apk".to_string()))
            .expect("handle");
        assert!(state.selected_path().is_none());
        console
            .handle_command(&mut state, ConsoleCommand::Select("/tmp/App.ipa".to_string()))
            .expect("handle");
        assert_eq!(state.selected_path(), Some(std::path::PathBuf::from("/tmp/App.ipa")));
        let text = output(console);
        assert!(text.contains("Only .ipa files"));
        assert!(text.contains("Selected: App.ipa"));
    }

    #[test]
    fn worker_events_render_status_once_and_log_lines() {
        let mut state = state();
        let mut console = Console::new(Vec::new(), false);
        for _ in 0..3 {
            console
                .handle_message(
                    &mut state,
                    AppMessage::Ui(UiEvent::Snapshot(DeviceSnapshot::absent())),
                )
                .expect("snapshot");
        }
        console
            .handle_message(&mut state, AppMessage::Ui(UiEvent::Log("hello".to_string())))
            .expect("log");
        let text = output(console);
        assert_eq!(text.matches("Status: No iPhone detected").count(), 1);
        assert!(text.contains("] hello"));
    }

    #[test]
    fn run_exits_when_input_closes() {
        let mut state = state();
        let mut console = Console::new(Vec::new(), false);
        let (tx, rx) = mpsc::channel::<AppMessage>();
        tx.send(AppMessage::Input("help".to_string())).expect("send");
        tx.send(AppMessage::Ui(UiEvent::Log("queued".to_string()))).expect("send");
        tx.send(AppMessage::InputClosed).expect("send");
        tx.send(AppMessage::Input("status".to_string())).expect("send");
        console.run(&mut state, rx).expect("run");
        let text = output(console);
        assert!(text.contains("Commands:"));
        assert!(text.contains("] queued"));
        assert!(!text.contains("Sideloading: idle"));
    }
}
