use thiserror::Error;

pub type Result<T, E = InspectoError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum InspectoError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("pixel buffer of {width}x{height} expects {expected} bytes, got {actual}")]
    InvalidPixelBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
