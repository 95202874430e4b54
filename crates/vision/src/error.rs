use thiserror::Error;

/// Errors from frame acquisition, recognition and snapshot storage.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("frame acquisition timed out after {0:?}")]
    FrameTimeout(std::time::Duration),

    #[error("recognition request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("recognition service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}
