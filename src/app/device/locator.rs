use std::path::Path;

pub const DEFAULT_DEVICE_LIST_PROGRAM: &str = "idevice_id";
pub const DEFAULT_DEVICE_INFO_PROGRAM: &str = "ideviceinfo";
pub const DEFAULT_INSTALLER_PROGRAM: &str = "ideviceinstaller";

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Falls back to `default_program` (looked up on PATH) when nothing is configured.
pub fn resolve_tool_program(config_command_path: &str, default_program: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        default_program.to_string()
    } else {
        normalized
    }
}

pub fn validate_tool_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("Tool command is empty".to_string());
    }
    // Bare names are resolved on PATH at spawn time.
    if !program.contains('/') && !program.contains('\\') {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(format!("{program} must point to an executable file"));
    }
    if !path.exists() {
        return Err(format!("{program} not found at the configured path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(
            normalize_command_path("  \"/opt/homebrew/bin/ideviceinstaller\"  "),
            "/opt/homebrew/bin/ideviceinstaller"
        );
        assert_eq!(
            normalize_command_path(" '/usr/local/bin/idevice_id' "),
            "/usr/local/bin/idevice_id"
        );
    }

    #[test]
    fn resolves_empty_to_default_program() {
        assert_eq!(resolve_tool_program("", DEFAULT_DEVICE_LIST_PROGRAM), "idevice_id");
        assert_eq!(resolve_tool_program("   ", DEFAULT_INSTALLER_PROGRAM), "ideviceinstaller");
        assert_eq!(resolve_tool_program("/bin/x", DEFAULT_INSTALLER_PROGRAM), "/bin/x");
    }

    #[test]
    fn validates_paths_but_accepts_bare_names() {
        assert!(validate_tool_program("ideviceinfo").is_ok());
        assert!(validate_tool_program("").is_err());
        let err = validate_tool_program("/this/path/should/not/exist/ideviceinfo").unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
        let dir = std::env::temp_dir();
        assert!(validate_tool_program(&dir.to_string_lossy()).is_err());
    }
}
