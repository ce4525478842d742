//! Error type shared by every plugin operation.

use std::path::PathBuf;

/// Failure of a single marketplace operation. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("plugin not found in registry: {name}")]
    PluginNotFound { name: String },

    #[error("version {version} of plugin {name} not found in registry")]
    VersionNotFound { name: String, version: String },

    #[error("invalid {kind} {value:?}: must be a plain path segment")]
    InvalidName { kind: &'static str, value: String },

    #[error("download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("extraction failed: {0}")]
    ExtractFailed(String),

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry {path}: {reason}")]
    Registry { path: PathBuf, reason: String },

    #[error("invalid host registry {path}: {reason}")]
    HostRegistry { path: PathBuf, reason: String },

    #[error("plugin store is locked by another process ({path})")]
    Locked { path: PathBuf },
}

impl Error {
    /// Unknown plugin name or version.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PluginNotFound { .. } | Self::VersionNotFound { .. })
    }

    pub(crate) fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attach a filesystem context to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn fs_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn fs_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::fs(context(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        assert!(Error::PluginNotFound { name: "x".into() }.is_not_found());
        assert!(
            Error::VersionNotFound {
                name: "x".into(),
                version: "1".into()
            }
            .is_not_found()
        );
        assert!(!Error::ExtractFailed("bad".into()).is_not_found());
    }

    #[test]
    fn test_fs_context_message() {
        let io: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = io.fs_context(|| "create /plugins").unwrap_err();
        assert_eq!(err.to_string(), "create /plugins: denied");
    }
}
