use std::fs::{self, File};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::app::models::PackageInfo;

pub const PACKAGE_EXTENSION: &str = "ipa";

pub fn normalize_package_path(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(trimmed)
}

/// The picker filter: only `*.ipa`, compared case-insensitively.
pub fn has_package_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
        .unwrap_or(false)
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn bundle_name_from_entry(entry: &str) -> Option<String> {
    let rest = entry.strip_prefix("Payload/")?;
    let (dir, _) = rest.split_once('/')?;
    dir.strip_suffix(".app")
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
}

pub fn inspect_package(path: &Path) -> PackageInfo {
    let mut info = PackageInfo {
        path: path.to_string_lossy().to_string(),
        bundle_name: None,
        file_size_bytes: 0,
        error: None,
    };

    if !path.is_file() {
        info.error = Some(format!("File not found: {}", path.display()));
        return info;
    }
    if let Ok(metadata) = fs::metadata(path) {
        info.file_size_bytes = metadata.len();
    }

    let archive = match File::open(path) {
        Ok(file) => ZipArchive::new(file),
        Err(err) => {
            info.error = Some(format!("Failed to open IPA: {err}"));
            return info;
        }
    };
    match archive {
        Ok(archive) => {
            info.bundle_name = archive.file_names().find_map(bundle_name_from_entry);
            if info.bundle_name.is_none() {
                info.error = Some("Invalid IPA: no Payload/*.app bundle".to_string());
            }
        }
        Err(err) => {
            info.error = Some(format!("Invalid IPA: {err}"));
        }
    }
    info
}
