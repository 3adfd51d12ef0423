use std::sync::{Arc, Mutex};
use std::time::Instant;

use ipa_sideloader_lib::app::config::{load_config, AppConfig, BackendKind};
use ipa_sideloader_lib::app::device::build_boundary;
use ipa_sideloader_lib::app::device::package::inspect_package;
use ipa_sideloader_lib::app::error::AppError;
use ipa_sideloader_lib::app::events::{UiEmitter, UiEvent};
use ipa_sideloader_lib::app::logging::init_logging;
use ipa_sideloader_lib::app::models::{DeviceSnapshot, InstallOutcome};
use ipa_sideloader_lib::app::presence::probe_presence;
use ipa_sideloader_lib::app::state::{validate_package_choice, PackageSelection};
use ipa_sideloader_lib::app::transfer::{run_transfer_cycle, TransferCycleOutcome};
use serde::Serialize;
use uuid::Uuid;

const USAGE: &str =
    "usage: smoke [--package PATH] [--backend libimobiledevice|usb] [--json]";

#[derive(Debug, Clone)]
struct Args {
    package: Option<String>,
    backend: Option<BackendKind>,
    json: bool,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    backend: &'static str,
    device: DeviceSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    install: Option<InstallOutcome>,
    checks: Vec<SmokeCheck>,
    log: Vec<String>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn|skip
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SmokeCheck {
    fn skip(name: &'static str) -> Self {
        Self {
            name,
            status: "skip",
            duration_ms: 0,
            error_code: None,
            error: None,
        }
    }
}

fn parse_args() -> Result<Args, String> {
    let mut package: Option<String> = None;
    let mut backend: Option<BackendKind> = None;
    let mut json = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--package" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--package requires a value".to_string())?;
                package = Some(value);
            }
            "--backend" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--backend requires a value".to_string())?;
                backend = Some(
                    BackendKind::parse(&value)
                        .ok_or_else(|| format!("unknown backend: {value}"))?,
                );
            }
            "--json" => {
                json = true;
            }
            "-h" | "--help" => {
                return Err(USAGE.to_string());
            }
            other => {
                return Err(format!("unknown argument: {other}\n{USAGE}"));
            }
        }
    }

    Ok(Args {
        package,
        backend,
        json,
    })
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let mut config = load_config(&trace_id).unwrap_or_else(|_| AppConfig::default());
    init_logging(&config.logging.log_level);
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    let boundary = build_boundary(&config);

    let mut checks: Vec<SmokeCheck> = Vec::new();
    let mut status = "pass";

    let started = Instant::now();
    let device = probe_presence(boundary.as_ref(), &trace_id);
    checks.push(SmokeCheck {
        name: "presence",
        status: match (&device.error, device.present) {
            (Some(_), _) => "fail",
            (None, true) => "pass",
            (None, false) => "warn",
        },
        duration_ms: started.elapsed().as_millis(),
        error_code: device
            .error
            .as_ref()
            .map(|_| "ERR_BOUNDARY_UNAVAILABLE".to_string()),
        error: device.error.clone(),
    });
    if device.error.is_some() {
        status = "fail";
    }

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let emitter: UiEmitter = Arc::new(move |event: UiEvent| {
        if let UiEvent::Log(message) = event {
            if let Ok(mut guard) = sink.lock() {
                guard.push(message);
            }
        }
    });

    let mut install: Option<InstallOutcome> = None;
    match args.package.as_deref() {
        Some(raw) => match validate_package_choice(raw, &trace_id) {
            Ok(path) => {
                let started = Instant::now();
                let info = inspect_package(&path);
                checks.push(SmokeCheck {
                    name: "package",
                    status: if info.is_valid() { "pass" } else { "warn" },
                    duration_ms: started.elapsed().as_millis(),
                    error_code: None,
                    error: info.error.clone(),
                });

                let started = Instant::now();
                let selection = PackageSelection::new(Some(path));
                let outcome = run_transfer_cycle(boundary.as_ref(), &selection, &emitter, &trace_id);
                let (check_status, error_code, error) = match &outcome {
                    TransferCycleOutcome::Installed(result) => {
                        install = Some(result.clone());
                        ("pass", None, None)
                    }
                    TransferCycleOutcome::Failed(result) => {
                        install = Some(result.clone());
                        let err = AppError::install_failed(
                            format!("{} [{}]", result.message, result.error_code.code()),
                            &trace_id,
                        );
                        ("fail", Some(err.code), Some(err.error))
                    }
                    TransferCycleOutcome::BoundaryError(err)
                    | TransferCycleOutcome::FileMissing(err) => {
                        ("fail", Some(err.code.clone()), Some(err.error.clone()))
                    }
                    TransferCycleOutcome::NoDevice => {
                        let err = AppError::no_device(&trace_id);
                        ("fail", Some(err.code), Some(err.error))
                    }
                    TransferCycleOutcome::NoPackage => {
                        let err = AppError::no_file_selected(&trace_id);
                        ("fail", Some(err.code), Some(err.error))
                    }
                };
                if check_status == "fail" {
                    status = "fail";
                }
                checks.push(SmokeCheck {
                    name: "install",
                    status: check_status,
                    duration_ms: started.elapsed().as_millis(),
                    error_code,
                    error,
                });
            }
            Err(err) => {
                eprintln!("{}", err.error);
                std::process::exit(2);
            }
        },
        None => {
            checks.push(SmokeCheck::skip("package"));
            checks.push(SmokeCheck::skip("install"));
        }
    }

    let log = events.lock().map(|guard| guard.clone()).unwrap_or_default();
    let summary = SmokeSummary {
        tool: "ipa_sideloader_smoke",
        status,
        trace_id: trace_id.clone(),
        backend: boundary.name(),
        device,
        install,
        checks,
        log,
    };

    let output = if args.json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut text = format!(
            "status: {}\ntrace_id: {}\nbackend: {}\n{}\n",
            summary.status,
            summary.trace_id,
            summary.backend,
            summary.device.status_line()
        );
        for check in &summary.checks {
            text.push_str(&format!("{}: {}", check.name, check.status));
            if let Some(error) = &check.error {
                text.push_str(&format!(" ({error})"));
            }
            text.push('\n');
        }
        text
    };

    println!("{output}");
    if summary.status != "pass" {
        std::process::exit(1);
    }
}
