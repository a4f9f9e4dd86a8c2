//! Environment variable handling.

use std::env;
use std::path::Path;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a u64.
pub fn get_u64(name: &str) -> Option<u64> {
    get_var(name).and_then(|v| v.trim().parse().ok())
}

/// Load environment variables from a .env file in the working directory.
pub fn load_dotenv() -> Result<(), std::io::Error> {
    load_env_file(Path::new(".env"))
}

/// Load `KEY=value` lines from `path`. Variables already set are left alone.
pub fn load_env_file(path: &Path) -> Result<(), std::io::Error> {
    if !path.exists() {
        return Ok(());
    }

    let content = std::fs::read_to_string(path)?;
    for (key, value) in parse_env_lines(&content) {
        if env::var(key).is_err() {
            env::set_var(key, value);
        }
    }
    Ok(())
}

/// Parse `.env` content into key/value pairs.
fn parse_env_lines(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim(), value)
        })
        .collect()
}

/// Environment variable names read by Strongbox.
pub mod vars {
    /// Base directory override.
    pub const STRONGBOX_HOME: &str = "STRONGBOX_HOME";

    /// Config file override.
    pub const STRONGBOX_CONFIG: &str = "STRONGBOX_CONFIG";

    /// Backend WebSocket URL.
    pub const STRONGBOX_SERVER_URL: &str = "STRONGBOX_SERVER_URL";

    /// Log level.
    pub const STRONGBOX_LOG: &str = "STRONGBOX_LOG";

    /// Per-call timeout in seconds.
    pub const STRONGBOX_CALL_TIMEOUT: &str = "STRONGBOX_CALL_TIMEOUT";

    /// PEM root certificate for `wss://` connections.
    pub const STRONGBOX_TLS_CERT_PATH: &str = "STRONGBOX_TLS_CERT_PATH";
}
