//! Per-user directories for PushLink files.

use std::path::PathBuf;
use crate::constants::APP_NAME;
use crate::error::{PlError, PlResult};

/// Directory holding `config.toml`, e.g. `~/.config/PushLink` on Linux.
pub fn config_dir() -> PlResult<PathBuf> {
    app_dir(dirs::config_dir(), "config")
}

/// Directory holding logs and other runtime data, e.g. `~/.local/share/PushLink`.
pub fn data_dir() -> PlResult<PathBuf> {
    app_dir(dirs::data_dir(), "data")
}

fn app_dir(base: Option<PathBuf>, kind: &str) -> PlResult<PathBuf> {
    base.map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| PlError::Config(format!("could not determine {kind} directory")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dir_appends_app_name() {
        let dir = app_dir(Some(PathBuf::from("/home/amy/.config")), "config").unwrap();
        assert_eq!(dir, PathBuf::from("/home/amy/.config").join(APP_NAME));
    }

    #[test]
    fn test_missing_base_is_config_error() {
        let err = app_dir(None, "data").unwrap_err();
        assert!(matches!(err, PlError::Config(ref m) if m.contains("data directory")));
    }
}
