pub mod app;

use std::io;
use std::sync::mpsc;

use tracing::{info, warn};
use uuid::Uuid;

use app::config::{config_path, load_config_checked, rejected_config_path, AppConfig, LoadedConfig};
use app::console::{spawn_stdin_reader, AppMessage, Console};
use app::device::build_boundary;
use app::error::AppError;
use app::events::channel_emitter;
use app::logging::init_logging;
use app::presence::start_presence_monitor;
use app::state::{validate_package_choice, AppState, PackageSelection};
use app::transfer::{TransferController, TransferTiming};

pub fn run() -> Result<(), AppError> {
    let trace_id = Uuid::new_v4().to_string();
    let path = config_path();
    let (loaded, config_error) = match load_config_checked(&path, &trace_id) {
        Ok(loaded) => (loaded, None),
        Err(err) => (
            LoadedConfig {
                config: AppConfig::default(),
                rejected: Vec::new(),
            },
            Some(err),
        ),
    };
    let LoadedConfig { config, rejected } = loaded;
    init_logging(&config.logging.log_level);
    for section in &rejected {
        warn!(
            trace_id = %trace_id,
            section = %section,
            kept_at = %rejected_config_path(&path).display(),
            "config section invalid; using defaults"
        );
    }
    // An unreadable file is never overwritten; selections stay in memory.
    let persist = config_error.is_none();
    if let Some(err) = config_error {
        warn!(trace_id = %trace_id, error = %err, "config unreadable; using defaults without saving");
    }

    let boundary = build_boundary(&config);
    info!(trace_id = %trace_id, backend = boundary.name(), "starting");

    let restored = if config.last_package_path.trim().is_empty() {
        None
    } else {
        validate_package_choice(&config.last_package_path, &trace_id).ok()
    };

    let (tx, rx) = mpsc::channel::<AppMessage>();
    let emitter = channel_emitter(tx.clone(), AppMessage::Ui);
    let controller = TransferController::new(
        boundary.clone(),
        PackageSelection::new(restored),
        emitter.clone(),
        TransferTiming::from(&config.polling),
    );
    // Runs until the process exits.
    let _monitor = start_presence_monitor(
        boundary.clone(),
        config.polling.presence_interval(),
        emitter,
    );
    spawn_stdin_reader(tx);

    let mut state = AppState::new(config, boundary.name(), controller);
    let mut console = Console::new(io::stdout(), persist);
    console
        .run(&mut state, rx)
        .map_err(|err| AppError::system(format!("console failed: {err}"), &trace_id))
}
