/// Errors that can occur when compiling or checking payload shapes.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// The shape description is not valid JSON.
    #[error("shape description is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The shape description could not be compiled.
    #[error("failed to compile shape: {0}")]
    CompileFailed(String),

    /// The value failed shape validation.
    #[error("shape mismatch: {message}")]
    Mismatch { message: String },
}

pub type Result<T> = std::result::Result<T, ShapeError>;
