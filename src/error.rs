use thiserror::Error;

/// Main error type for the first-frame library
#[derive(Error, Debug)]
pub enum FirstFrameError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the transcoding engine and its virtual filesystem
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Transcoding engine is not loaded")]
    NotReady,

    #[error("Transcoding engine failed to load: {reason}")]
    LoadFailed { reason: String },

    #[error("Invalid artifact name: {name}")]
    InvalidArtifactName { name: String },

    #[error("Artifact not found: {name}")]
    ArtifactNotFound { name: String },

    #[error("{operation} failed: {diagnostics}")]
    TransformFailed { operation: String, diagnostics: String },

    #[error("Could not inspect {name}: {reason}")]
    InspectFailed { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage-tagged errors of a frame-replacement run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transcoding engine is not ready")]
    EngineNotReady,

    #[error("Transcoding engine failed to load: {reason}")]
    EngineLoad { reason: String },

    #[error("Invalid options: {details}")]
    InvalidOptions { details: String },

    #[error("Staging input assets failed: {reason}")]
    Staging { reason: String },

    #[error("Probe failed: {reason}")]
    ProbeDecode { reason: String },

    #[error("Frame synthesis failed: {reason}")]
    FrameSynthesis { reason: String },

    #[error("Trim failed: {reason}")]
    Trim { reason: String },

    #[error("Concatenation failed: {reason}")]
    Concat { reason: String },

    #[error("Run {run_id} was superseded by run {latest}")]
    Superseded { run_id: u64, latest: u64 },
}

/// The pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Staging,
    Probe,
    FrameSynthesis,
    Trim,
    Concat,
}

impl PipelineError {
    /// Stage that failed, if the error came from one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Staging { .. } => Some(Stage::Staging),
            Self::ProbeDecode { .. } => Some(Stage::Probe),
            Self::FrameSynthesis { .. } => Some(Stage::FrameSynthesis),
            Self::Trim { .. } => Some(Stage::Trim),
            Self::Concat { .. } => Some(Stage::Concat),
            _ => None,
        }
    }

    /// Whether the run was discarded in favour of a newer one rather than failing
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

/// Errors from on-demand container conversion
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Transcoding engine is not ready")]
    EngineNotReady,

    #[error("Conversion to {container} failed: {reason}")]
    Failed { container: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using FirstFrameError
pub type Result<T> = std::result::Result<T, FirstFrameError>;

impl FirstFrameError {
    /// Check if this error is recoverable (can be retried)
    ///
    /// Nothing is retried automatically; this only tells a caller whether
    /// trying again with the same inputs could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Engine(EngineError::Io(_)) => true,
            Self::Engine(EngineError::LoadFailed { .. }) => true,
            Self::Pipeline(PipelineError::EngineNotReady) => true,
            Self::Pipeline(PipelineError::Superseded { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Engine(EngineError::LoadFailed { reason })
            | Self::Pipeline(PipelineError::EngineLoad { reason }) => {
                format!("Could not start FFmpeg ({}). Please check that ffmpeg and ffprobe are installed.", reason)
            }
            Self::Pipeline(PipelineError::ProbeDecode { .. }) => {
                "Could not read the dimensions of the selected asset. Is it a valid image or video?".to_string()
            }
            Self::Pipeline(PipelineError::Trim { reason }) => {
                format!("Could not cut the source video: {}", reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        let err = PipelineError::Trim { reason: "too long".into() };
        assert_eq!(err.stage(), Some(Stage::Trim));
        assert_eq!(PipelineError::EngineNotReady.stage(), None);
        assert!(PipelineError::Superseded { run_id: 1, latest: 2 }.is_superseded());
    }

    #[test]
    fn test_user_message_for_trim() {
        let err: FirstFrameError = PipelineError::Trim { reason: "source is 3.0s".into() }.into();
        assert!(err.user_message().contains("source is 3.0s"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_engine_errors_convert() {
        let err: FirstFrameError = EngineError::NotReady.into();
        assert!(matches!(err, FirstFrameError::Engine(EngineError::NotReady)));
    }
}
