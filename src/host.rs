//! VirtualBox installation discovery and the startup version gate.

use std::path::{Path, PathBuf};

use crate::error::VkdError;
use crate::paths;

/// Environment variables the VirtualBox installer sets, in lookup order.
const INSTALL_ENV_VARS: &[&str] = &["VBOX_MSI_INSTALL_PATH", "VBOX_INSTALL_PATH"];

/// Find the VirtualBox installation directory.
///
/// A configured directory is authoritative: if it is missing, discovery fails
/// instead of silently picking another installation.
pub fn locate_install_dir(
    configured: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<PathBuf, VkdError> {
    let candidates: Vec<PathBuf> = match configured {
        Some(dir) => vec![dir.to_path_buf()],
        None => INSTALL_ENV_VARS
            .iter()
            .filter_map(|var| env(var))
            .filter(|v| !v.trim().is_empty())
            .map(|v| PathBuf::from(v.trim_end_matches(['\\', '/'])))
            .chain(paths::default_install_dirs(env))
            .collect(),
    };

    for dir in &candidates {
        if dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "found VirtualBox installation");
            return Ok(dir.clone());
        }
    }

    let searched = if candidates.is_empty() {
        "no candidate locations".to_string()
    } else {
        candidates
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(VkdError::HostInstallationNotFound { searched })
}

/// Major version from a VirtualBox version string such as `7.0.14r161095`.
pub fn parse_major_version(version: &str) -> Option<u32> {
    version.trim().split('.').next()?.trim().parse().ok()
}

/// Reject hosts older than `minimum`. An unparsable version is treated as
/// unsupported rather than guessed at.
pub fn check_version(version: &str, minimum: u32) -> Result<u32, VkdError> {
    match parse_major_version(version) {
        Some(major) if major >= minimum => Ok(major),
        _ => Err(VkdError::HostVersionUnsupported {
            version: version.trim().to_string(),
            minimum,
        }),
    }
}

/// Start the VirtualBox GUI detached from this process.
pub fn launch_gui(install_dir: &Path) -> Result<(), VkdError> {
    let exe = paths::gui_exe(install_dir);
    std::process::Command::new(&exe)
        .spawn()
        .map_err(|source| VkdError::Io {
            context: format!("launching {}", exe.display()),
            source,
        })?;
    tracing::info!(exe = %exe.display(), "launched VirtualBox");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_parsed() {
        assert_eq!(parse_major_version("7.0.14r161095"), Some(7));
        assert_eq!(parse_major_version("5.0.0\n"), Some(5));
        assert_eq!(parse_major_version("4.9.2"), Some(4));
        assert_eq!(parse_major_version("garbage"), None);
        assert_eq!(parse_major_version(""), None);
    }

    #[test]
    fn version_below_minimum_is_unsupported() {
        let err = check_version("4.9.2r1", 5).unwrap_err();
        assert!(matches!(
            err,
            VkdError::HostVersionUnsupported { minimum: 5, .. }
        ));
        assert!(err.to_string().contains("older than 5.0"));
    }

    #[test]
    fn version_at_or_above_minimum_passes() {
        assert_eq!(check_version("5.0.40", 5).unwrap(), 5);
        assert_eq!(check_version("7.1.4r165100", 5).unwrap(), 7);
    }

    #[test]
    fn unparsable_version_is_unsupported() {
        assert!(check_version("unknown", 5).is_err());
    }

    #[test]
    fn configured_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        let found = locate_install_dir(Some(dir.path()), &|_| None).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn missing_configured_dir_does_not_fall_back() {
        let fallback = tempfile::tempdir().unwrap();
        let fallback_str = fallback.path().display().to_string();
        let env = move |k: &str| (k == "VBOX_MSI_INSTALL_PATH").then(|| fallback_str.clone());
        let err = locate_install_dir(Some(Path::new("/nonexistent/vbox")), &env).unwrap_err();
        match err {
            VkdError::HostInstallationNotFound { searched } => {
                assert!(searched.contains("/nonexistent/vbox"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn installer_env_var_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let value = format!("{}/", dir.path().display());
        let env = move |k: &str| (k == "VBOX_MSI_INSTALL_PATH").then(|| value.clone());
        let found = locate_install_dir(None, &env).unwrap();
        assert_eq!(found, dir.path());
    }
}
