//! `.env` file loading.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;

const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Keys whose values are never echoed to the log.
const HIDDEN_KEYS: [&str; 2] = ["POSTGRES_PASSWORD", "SERVICE_ROLE_KEY"];

/// Loads the first env file found. Variables already set in the process
/// environment are not overridden.
pub fn load_env() {
    let mut loaded_env = false;
    for path in ENV_PATHS.iter() {
        if Path::new(path).exists() {
            if let Err(e) = load_env_from_file(path) {
                warn!("Failed to load environment from {}: {}", path, e);
            } else {
                info!("Loaded environment variables from {}", path);
                loaded_env = true;
                break;
            }
        }
    }
    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }
}

/// Parses one `KEY=value` line. Comments, blank lines and lines without `=`
/// yield `None`; surrounding double quotes are stripped.
pub fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') || line.is_empty() {
        return None;
    }
    let idx = line.find('=')?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[idx + 1..].trim().trim_matches('"')))
}

fn load_env_from_file(file_path: &str) -> Result<()> {
    let contents = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read env file {}", file_path))?;
    for (key, value) in contents.lines().filter_map(parse_env_line) {
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
            debug!(
                "Set env var from file: {} = {}",
                key,
                if HIDDEN_KEYS.contains(&key) { "[hidden]" } else { value }
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_line() {
        assert_eq!(parse_env_line("POSTGRES_HOST=db"), Some(("POSTGRES_HOST", "db")));
        assert_eq!(parse_env_line(" POSTGRES_DB = \"ledger\" "), Some(("POSTGRES_DB", "ledger")));
        assert_eq!(parse_env_line("URL=a=b"), Some(("URL", "a=b")));
        assert_eq!(parse_env_line("# comment"), None);
        assert_eq!(parse_env_line("   "), None);
        assert_eq!(parse_env_line("no_equals"), None);
        assert_eq!(parse_env_line("=value"), None);
    }
}
