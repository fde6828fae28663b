//! Error handling for the preview player and exporter
//!
//! Every failure a controller can report maps onto one variant here. Engine
//! implementations report [`crate::engine::EngineError`], which the
//! controllers translate depending on the operation that failed.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for preview operations
pub type Result<T> = std::result::Result<T, PreviewError>;

/// Main error type for preview operations
#[derive(Error, Debug)]
pub enum PreviewError {
    // Source Errors
    #[error("Source unreadable: {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    // Request Errors
    #[error("Invalid configuration: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    // Engine Errors
    #[error("Render engine failed to start: {reason}")]
    EngineStartFailure { reason: String },

    #[error("Render engine failed to resume: {reason}")]
    EngineResumeFailure { reason: String },

    #[error("Render engine failed while rendering: {reason}")]
    EngineRenderFailure { reason: String },

    // Export Errors
    #[error("Cannot write output file {path}: {reason}")]
    OutputWriteFailure { path: PathBuf, reason: String },

    #[error("An export is already in progress")]
    ExportInProgress,

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PreviewError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        PreviewError::ConfigurationInvalid {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PreviewError::SourceUnreadable { .. } => "SOURCE_UNREADABLE",
            PreviewError::ConfigurationInvalid { .. } => "CONFIGURATION_INVALID",
            PreviewError::InvalidState { .. } => "INVALID_STATE",
            PreviewError::EngineStartFailure { .. } => "ENGINE_START_FAILURE",
            PreviewError::EngineResumeFailure { .. } => "ENGINE_RESUME_FAILURE",
            PreviewError::EngineRenderFailure { .. } => "ENGINE_RENDER_FAILURE",
            PreviewError::OutputWriteFailure { .. } => "OUTPUT_WRITE_FAILURE",
            PreviewError::ExportInProgress => "EXPORT_IN_PROGRESS",
            PreviewError::Io(_) => "IO_ERROR",
            PreviewError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if retrying the same call later can succeed without the caller
    /// changing its inputs
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PreviewError::EngineStartFailure { .. }
                | PreviewError::EngineResumeFailure { .. }
                | PreviewError::ExportInProgress
                | PreviewError::OutputWriteFailure { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PreviewError::SourceUnreadable { .. } => vec![
                "Check the file path is correct",
                "Verify the file is a readable WAV file",
                "Switch back to the original vocal track if the processed take is missing",
            ],
            PreviewError::ConfigurationInvalid { .. } => vec![
                "Use a positive duration and a non-negative start time",
                "Provide a background track when mixing audio",
            ],
            PreviewError::InvalidState { .. } => vec![
                "Call prepare before start",
                "Pause before calling unpause",
            ],
            PreviewError::EngineStartFailure { .. } | PreviewError::EngineResumeFailure { .. } => {
                vec![
                    "The audio output may be in use by another application",
                    "Try again in a moment",
                ]
            }
            PreviewError::OutputWriteFailure { .. } => vec![
                "Check the destination directory exists and is writable",
                "Free up disk space",
                "Export to a different location",
            ],
            PreviewError::ExportInProgress => {
                vec!["Wait for the running export to complete before starting another"]
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PreviewError::SourceUnreadable {
            path: PathBuf::from("vocal.wav"),
            reason: "missing".to_string(),
        };
        assert_eq!(err.error_code(), "SOURCE_UNREADABLE");
        assert_eq!(PreviewError::ExportInProgress.error_code(), "EXPORT_IN_PROGRESS");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = PreviewError::EngineStartFailure {
            reason: "audio session busy".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());

        let err = PreviewError::invalid_config("duration must be positive");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("duration must be positive"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = PreviewError::InvalidState {
            operation: "start",
            state: "Playing".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot start while Playing");
    }
}
