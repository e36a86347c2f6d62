use thiserror::Error;

/// All errors produced by vocmd-core.
#[derive(Debug, Error)]
pub enum VocmdError {
    /// The audio container could not be read as PCM.
    #[error("audio decode error: {0}")]
    Decode(String),

    /// The gated buffer is shorter than the coarse energy window.
    #[error("insufficient audio: {samples} samples, need at least {required}")]
    InsufficientAudio { samples: usize, required: usize },

    /// An internal precondition of the feature extractor was violated.
    #[error("feature extraction error: {0}")]
    FeatureExtraction(String),

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// A truncated data chunk surfaces from hound as an IO error, so every hound
// failure counts as a decode failure. Missing files are caught earlier by
// `File::open` and stay `Io`.
impl From<hound::Error> for VocmdError {
    fn from(e: hound::Error) -> Self {
        VocmdError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VocmdError>;
