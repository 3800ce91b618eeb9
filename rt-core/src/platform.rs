//! Per-user directories for config and logs.
//!
//! `RTLINK_CONFIG_DIR` and `RTLINK_DATA_DIR` override the OS defaults, which
//! keeps containers and CI runs out of the real home directory.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{RtError, RtResult};

pub const CONFIG_DIR_ENV: &str = "RTLINK_CONFIG_DIR";
pub const DATA_DIR_ENV: &str = "RTLINK_DATA_DIR";

/// Operating system the binary was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Self::Windows,
            "macos" => Self::MacOs,
            "linux" => Self::Linux,
            _ => Self::Other,
        }
    }

    /// Data directory (logs live here), e.g. `~/.local/share/rtlink` on Linux.
    pub fn data_dir() -> RtResult<PathBuf> {
        resolve_dir(std::env::var_os(DATA_DIR_ENV), dirs::data_dir(), "data")
    }

    /// Config directory, e.g. `~/.config/rtlink` on Linux.
    pub fn config_dir() -> RtResult<PathBuf> {
        resolve_dir(std::env::var_os(CONFIG_DIR_ENV), dirs::config_dir(), "config")
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
            Self::Other => std::env::consts::OS,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An override is used verbatim; the OS default gets the app directory appended.
fn resolve_dir(
    override_dir: Option<OsString>,
    os_default: Option<PathBuf>,
    kind: &str,
) -> RtResult<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    os_default
        .map(|base| base.join(APP_NAME))
        .ok_or_else(|| RtError::Config(format!("could not determine {kind} directory")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = resolve_dir(
            Some("/tmp/rt-override".into()),
            Some(PathBuf::from("/home/u/.config")),
            "config",
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/rt-override"));
    }

    #[test]
    fn test_default_gets_app_dir() {
        let dir = resolve_dir(Some("".into()), Some(PathBuf::from("/home/u/.config")), "config").unwrap();
        assert_eq!(dir, PathBuf::from("/home/u/.config/rtlink"));
    }

    #[test]
    fn test_no_home_is_config_error() {
        let err = resolve_dir(None, None, "data").unwrap_err();
        assert!(matches!(err, RtError::Config(msg) if msg.contains("data")));
    }

    #[test]
    fn test_current_platform_has_name() {
        assert!(!Platform::current().to_string().is_empty());
        assert_eq!(Platform::MacOs.to_string(), "macOS");
    }
}
