use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::app::config::UsbSettings;
use crate::app::device::boundary::{placeholder_snapshot, DeviceBoundary, ProgressSink};
use crate::app::error::AppError;
use crate::app::models::{DeviceSnapshot, InstallErrorCode, InstallOutcome, UNKNOWN_PLACEHOLDER};

const SIMULATED_STAGES: [&str; 4] = [
    "Preparing device...",
    "Transferring package...",
    "Installing application...",
    "Verifying installation...",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl UsbDeviceDescriptor {
    /// Descriptor strings are often unreadable without extra permissions.
    pub fn identifier(&self) -> String {
        descriptor_or_placeholder(self.serial_number.as_deref())
    }

    pub fn display_name(&self) -> String {
        descriptor_or_placeholder(self.product.as_deref())
    }
}

fn descriptor_or_placeholder(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_PLACEHOLDER)
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbFilter {
    pub vendor_id: u16,
    pub product_id_min: u16,
    pub product_id_max: u16,
}

impl UsbFilter {
    pub fn matches(&self, descriptor: &UsbDeviceDescriptor) -> bool {
        descriptor.vendor_id == self.vendor_id
            && (self.product_id_min..=self.product_id_max).contains(&descriptor.product_id)
    }
}

impl From<&UsbSettings> for UsbFilter {
    fn from(settings: &UsbSettings) -> Self {
        Self {
            vendor_id: settings.vendor_id,
            product_id_min: settings.product_id_min,
            product_id_max: settings.product_id_max,
        }
    }
}

pub type UsbEnumerator =
    Arc<dyn Fn(&str) -> Result<Vec<UsbDeviceDescriptor>, AppError> + Send + Sync>;

pub fn enumerate_system_usb(trace_id: &str) -> Result<Vec<UsbDeviceDescriptor>, AppError> {
    let devices = nusb::list_devices().map_err(|err| {
        AppError::boundary_unavailable(format!("USB enumeration failed: {err}"), trace_id)
    })?;
    Ok(devices
        .map(|info| UsbDeviceDescriptor {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            manufacturer: info.manufacturer_string().map(str::to_string),
            product: info.product_string().map(str::to_string),
            serial_number: info.serial_number().map(str::to_string),
        })
        .collect())
}

/// Presence from USB descriptors. Installation is only simulated: there is no
/// install protocol behind this boundary, so every outcome is flagged `simulated`.
pub struct UsbBoundary {
    filter: UsbFilter,
    stage_delay: Duration,
    enumerator: UsbEnumerator,
}

impl UsbBoundary {
    pub fn new(settings: &UsbSettings) -> Self {
        Self::with_enumerator(settings, Arc::new(enumerate_system_usb))
    }

    pub fn with_enumerator(settings: &UsbSettings, enumerator: UsbEnumerator) -> Self {
        Self {
            filter: UsbFilter::from(settings),
            stage_delay: Duration::from_millis(settings.simulated_stage_ms),
            enumerator,
        }
    }

    fn matching(&self, trace_id: &str) -> Result<Vec<UsbDeviceDescriptor>, AppError> {
        let devices = (self.enumerator)(trace_id)?;
        Ok(devices
            .into_iter()
            .filter(|descriptor| self.filter.matches(descriptor))
            .collect())
    }
}

impl DeviceBoundary for UsbBoundary {
    fn name(&self) -> &'static str {
        "usb"
    }

    fn list_devices(&self, trace_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .matching(trace_id)?
            .iter()
            .map(UsbDeviceDescriptor::identifier)
            .collect())
    }

    fn describe_device(&self, identifier: &str, trace_id: &str) -> Result<DeviceSnapshot, AppError> {
        let found = self
            .matching(trace_id)?
            .into_iter()
            .find(|descriptor| descriptor.identifier() == identifier);
        Ok(match found {
            // USB descriptors carry no OS version.
            Some(descriptor) => DeviceSnapshot::connected(
                identifier,
                descriptor.display_name(),
                UNKNOWN_PLACEHOLDER,
            ),
            None => placeholder_snapshot(identifier),
        })
    }

    fn install(
        &self,
        identifier: &str,
        package: &Path,
        trace_id: &str,
        progress: ProgressSink<'_>,
    ) -> Result<InstallOutcome, AppError> {
        warn!(
            trace_id = %trace_id,
            identifier = %identifier,
            "usb backend simulates installation; nothing is written to the device"
        );
        let started = Instant::now();
        for stage in SIMULATED_STAGES {
            progress(stage);
            thread::sleep(self.stage_delay);
        }
        Ok(InstallOutcome {
            identifier: identifier.to_string(),
            package_path: package.to_string_lossy().to_string(),
            success: true,
            error_code: InstallErrorCode::Success,
            message: "Sideload successful (simulated)".to_string(),
            raw_output: String::new(),
            duration_seconds: started.elapsed().as_secs_f64(),
            simulated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error::ERR_BOUNDARY_UNAVAILABLE;
    use std::sync::Mutex;

    fn descriptor(vendor_id: u16, product_id: u16, serial: Option<&str>) -> UsbDeviceDescriptor {
        UsbDeviceDescriptor {
            vendor_id,
            product_id,
            manufacturer: Some("Apple Inc.".to_string()),
            product: serial.map(|_| "iPhone".to_string()),
            serial_number: serial.map(str::to_string),
        }
    }

    fn fast_settings() -> UsbSettings {
        UsbSettings {
            simulated_stage_ms: 1,
            ..UsbSettings::default()
        }
    }

    fn boundary_over(devices: Vec<UsbDeviceDescriptor>) -> UsbBoundary {
        let enumerator: UsbEnumerator =
            Arc::new(move |_: &str| -> Result<Vec<UsbDeviceDescriptor>, AppError> {
                Ok(devices.clone())
            });
        UsbBoundary::with_enumerator(&fast_settings(), enumerator)
    }

    #[test]
    fn filters_by_vendor_and_product_range() {
        let boundary = boundary_over(vec![
            descriptor(0x046d, 0x1290, Some("logitech")),
            descriptor(0x05ac, 0x12a8, Some("iphone-1")),
            descriptor(0x05ac, 0x12b0, Some("out-of-range")),
            descriptor(0x05ac, 0x1290, Some("iphone-2")),
        ]);
        assert_eq!(
            boundary.list_devices("t").expect("list"),
            vec!["iphone-1".to_string(), "iphone-2".to_string()]
        );
        assert_eq!(boundary.first_device("t").expect("first").as_deref(), Some("iphone-1"));
    }

    #[test]
    fn unreadable_descriptors_degrade_to_placeholder() {
        let boundary = boundary_over(vec![descriptor(0x05ac, 0x12af, None)]);
        let id = boundary.first_device("t").expect("first").expect("device");
        assert_eq!(id, UNKNOWN_PLACEHOLDER);
        let snapshot = boundary.describe_device(&id, "t").expect("describe");
        assert!(snapshot.present);
        assert_eq!(snapshot.display_name, UNKNOWN_PLACEHOLDER);
        assert_eq!(snapshot.os_version, UNKNOWN_PLACEHOLDER);
    }

    #[test]
    fn simulated_install_reports_every_stage_and_succeeds() {
        let boundary = boundary_over(vec![descriptor(0x05ac, 0x12a8, Some("iphone-1"))]);
        let stages = Mutex::new(Vec::new());
        let outcome = boundary
            .install("iphone-1", Path::new("/tmp/App.ipa"), "t", &|stage: &str| {
                stages.lock().expect("stages").push(stage.to_string());
            })
            .expect("install");
        assert!(outcome.success);
        assert!(outcome.simulated);
        assert_eq!(stages.lock().expect("stages").len(), SIMULATED_STAGES.len());
    }

    #[test]
    fn enumeration_failure_propagates() {
        let enumerator: UsbEnumerator =
            Arc::new(|trace_id: &str| -> Result<Vec<UsbDeviceDescriptor>, AppError> {
                Err(AppError::boundary_unavailable("USB subsystem gone", trace_id))
            });
        let boundary = UsbBoundary::with_enumerator(&fast_settings(), enumerator);
        let err = boundary.list_devices("trace-usb").expect_err("expected error");
        assert_eq!(err.code, ERR_BOUNDARY_UNAVAILABLE);
        assert_eq!(err.trace_id, "trace-usb");
    }
}
