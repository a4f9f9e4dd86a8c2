//! Path resolution utilities.

use crate::env;
use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the Strongbox base directory (~/.strongbox, or `STRONGBOX_HOME`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = env::get_var(env::vars::STRONGBOX_HOME) {
        return Ok(expand_tilde(&home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".strongbox"))
}

/// Get the main config file path (~/.strongbox/strongbox.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("strongbox.json5"))
}

/// Get the bearer token file path (~/.strongbox/token).
pub fn token_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("token"))
}

/// Get the log file path (~/.strongbox/strongbox.log).
pub fn log_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("strongbox.log"))
}

/// Ensure the base directory exists, owner-only on Unix.
pub fn ensure_base_dir() -> Result<PathBuf, ConfigError> {
    let dir = base_dir()?;
    std::fs::create_dir_all(&dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir)
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
