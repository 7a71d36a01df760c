//! Making the payload directory readable by the VirtualBox VM process.

use std::path::Path;

use crate::error::VkdError;

pub trait PayloadAccess {
    /// Ensure VM processes can read and traverse `dir`.
    fn ensure_readable(&self, dir: &Path) -> Result<(), VkdError>;
}

/// Adjusts permission bits on the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPayloadAccess;

impl PayloadAccess for FsPayloadAccess {
    #[cfg(unix)]
    fn ensure_readable(&self, dir: &Path) -> Result<(), VkdError> {
        use std::os::unix::fs::PermissionsExt;

        let io_err = |context: String| move |source| VkdError::Io { context, source };

        let meta = std::fs::metadata(dir)
            .map_err(io_err(format!("reading permissions of {}", dir.display())))?;
        let mode = meta.permissions().mode();
        let wanted = mode | 0o005;
        if wanted != mode {
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(wanted))
                .map_err(io_err(format!("granting read access to {}", dir.display())))?;
            tracing::info!(dir = %dir.display(), mode = %format!("{wanted:o}"), "granted read access");
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn ensure_readable(&self, dir: &Path) -> Result<(), VkdError> {
        if !dir.is_dir() {
            return Err(VkdError::Io {
                context: format!("payload directory {} is missing", dir.display()),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        tracing::debug!(dir = %dir.display(), "leaving ACLs unchanged");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn grants_other_read_and_traverse() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700)).unwrap();
        FsPayloadAccess.ensure_readable(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o705);
    }

    #[test]
    fn missing_dir_is_an_error() {
        let err = FsPayloadAccess
            .ensure_readable(Path::new("/nonexistent/virtualkd"))
            .unwrap_err();
        assert!(matches!(err, VkdError::Io { .. }));
    }
}
