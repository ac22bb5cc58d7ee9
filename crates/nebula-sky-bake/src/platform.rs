//! Platform directory resolution for the bake tool.

use std::path::PathBuf;

/// Errors resolving or creating platform directories.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The OS did not provide a configuration directory.
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    /// A directory could not be created.
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// OS-specific directories, following XDG on Linux, Known Folders on Windows
/// and Library on macOS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    /// `config.ron`.
    pub config_dir: PathBuf,
    /// Default output for baked previews and manifests.
    pub cache_dir: PathBuf,
    /// JSON logs of debug builds.
    pub log_dir: PathBuf,
}

const APP_NAME: &str = "nebula-sky";

impl PlatformDirs {
    /// Resolve the directories without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NoConfigDir`] if the OS does not expose a
    /// configuration directory.
    pub fn resolve() -> Result<Self, PlatformError> {
        let config_dir = dirs::config_dir()
            .ok_or(PlatformError::NoConfigDir)?
            .join(APP_NAME);
        let cache_dir = dirs::cache_dir()
            .map(|base| base.join(APP_NAME))
            .unwrap_or_else(|| config_dir.join("cache"));
        Ok(Self {
            log_dir: cache_dir.join("logs"),
            config_dir,
            cache_dir,
        })
    }

    /// Directories rooted under `root`.
    #[cfg(test)]
    pub(crate) fn resolve_with_root(root: &std::path::Path) -> Self {
        let app_dir = root.join(APP_NAME);
        Self {
            config_dir: app_dir.join("config"),
            cache_dir: app_dir.join("cache"),
            log_dir: app_dir.join("logs"),
        }
    }

    /// Default output directory of the baked tables.
    pub fn tables_dir(&self) -> PathBuf {
        self.cache_dir.join("tables")
    }

    /// Create every directory.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Io`] naming the directory that failed.
    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        for dir in [&self.config_dir, &self.cache_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| PlatformError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
