use std::path::PathBuf;

/// Errors raised while loading or storing cached artifacts.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The source file does not exist.
    #[error("Source file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Reading source metadata or a cache blob failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The parser collaborator rejected the source file.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// A disk blob could not be encoded or decoded.
    #[error("Cache codec error: {0}")]
    Codec(String),

    /// A blocking task panicked or was cancelled.
    #[error("Cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            CacheError::NotFound(path)
        } else {
            CacheError::Io { path, source }
        }
    }
}
