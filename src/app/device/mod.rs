pub mod boundary;
pub mod locator;
pub mod package;
pub mod parse;
pub mod runner;
pub mod usb;

use std::sync::Arc;

use crate::app::config::{AppConfig, BackendKind};
use boundary::{DeviceBoundary, LibimobiledeviceBoundary};
use usb::UsbBoundary;

pub fn build_boundary(config: &AppConfig) -> Arc<dyn DeviceBoundary> {
    match config.backend {
        BackendKind::Libimobiledevice => Arc::new(LibimobiledeviceBoundary::from_config(config)),
        BackendKind::Usb => Arc::new(UsbBoundary::new(&config.usb)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_selection_follows_config() {
        let mut config = AppConfig::default();
        assert_eq!(build_boundary(&config).name(), "libimobiledevice");
        config.backend = BackendKind::Usb;
        assert_eq!(build_boundary(&config).name(), "usb");
    }
}
