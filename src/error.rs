use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by collaborators and the outer rendering helpers.
///
/// The directive walk itself never returns these: a failing fetch or include
/// is logged at the call site and treated as absence.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("path escapes the project root: {0}")]
    PathTraversal(String),

    #[error("failed to parse HTML: {0}")]
    Parse(String),

    #[error("failed to serialize HTML: {0}")]
    Serialize(String),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(origin: impl Into<String>, source: serde_json::Error) -> Self {
        EngineError::Json {
            origin: origin.into(),
            source,
        }
    }
}
