//! Error types for scene flattening.

use thiserror::Error;

/// Result type alias using FlattenError.
pub type Result<T> = std::result::Result<T, FlattenError>;

/// Upper bound, in bytes, of a load diagnostic.
pub const MAX_DIAGNOSTIC_LEN: usize = 1024;

/// Main error type for scene flattening operations.
#[derive(Error, Debug)]
pub enum FlattenError {
    /// The scene document could not be loaded. `message` is bounded to
    /// [`MAX_DIAGNOSTIC_LEN`] bytes.
    #[error("{message}")]
    Load { path: String, message: String },

    /// The vertex buffers of a part could not be allocated.
    #[error("Failed to allocate {vertex_count} vertices for part '{part}'")]
    PartAllocation { part: String, vertex_count: usize },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON data.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read or process an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Failed to format text output.
    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// Failed to export the scene.
    #[error("Export error: {0}")]
    Export(String),
}

impl FlattenError {
    /// Build a load error, formatting and truncating the diagnostic.
    pub fn load(path: &str, reason: &str) -> Self {
        let message = bounded_diagnostic(format!("Failed to load '{}': {}", path, reason));
        FlattenError::Load {
            path: path.to_string(),
            message,
        }
    }

    /// The human-readable diagnostic of a load failure, if this is one.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            FlattenError::Load { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Truncate a message to [`MAX_DIAGNOSTIC_LEN`] bytes on a char boundary.
fn bounded_diagnostic(mut message: String) -> String {
    if message.len() > MAX_DIAGNOSTIC_LEN {
        let mut end = MAX_DIAGNOSTIC_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_diagnostic_is_bounded() {
        let reason = "é".repeat(2000);
        let err = FlattenError::load("scene.json", &reason);
        let message = err.diagnostic().unwrap();
        assert!(message.len() <= MAX_DIAGNOSTIC_LEN);
        assert!(message.starts_with("Failed to load 'scene.json'"));
    }

    #[test]
    fn test_display_is_diagnostic() {
        let err = FlattenError::load("a.json", "File not found");
        assert_eq!(err.to_string(), "Failed to load 'a.json': File not found");
        assert!(FlattenError::Export("x".into()).diagnostic().is_none());
    }
}
