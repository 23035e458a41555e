//! Source parser seam.
//!
//! The cache does not know how artifacts are produced. It calls an
//! [`ArtifactParser`] on a miss and stores whatever it returns. Parsers
//! run on the blocking thread pool, so they may do heavy synchronous
//! work.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Turns a source file into a ready-to-use artifact.
pub trait ArtifactParser: Send + Sync + 'static {
    /// The parsed artifact. Must round-trip through JSON for the disk tier.
    type Artifact: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn parse(&self, path: &Path) -> Result<Self::Artifact, CacheError>;
}

/// Parses JSON documents (network models, time-series exports) into
/// [`serde_json::Value`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArtifactParser;

impl ArtifactParser for JsonArtifactParser {
    type Artifact = serde_json::Value;

    fn parse(&self, path: &Path) -> Result<Self::Artifact, CacheError> {
        let bytes = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("net.json");
        std::fs::write(&file, r#"{"buses": 3}"#).unwrap();

        let value = JsonArtifactParser.parse(&file).unwrap();
        assert_eq!(value["buses"], 3);
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.json");
        std::fs::write(&file, "{").unwrap();

        let err = JsonArtifactParser.parse(&file).unwrap_err();
        assert!(matches!(err, CacheError::Parse { .. }));
    }
}
