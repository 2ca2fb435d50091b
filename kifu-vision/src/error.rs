use thiserror::Error;

/// Recoverable, per-frame failures surfaced by the vision pipeline.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("board detection failed: {0}")]
    DetectionFailure(String),

    #[error("expected 4 board corners, found {0}")]
    BadCornerCount(usize),

    #[error("unexpected class distribution in detector output: {0}")]
    BadClassCount(String),

    #[error("grid fit failed: {0}")]
    GridFailure(String),

    #[error("failed to open video: {0}")]
    VideoOpen(String),

    #[error("failed to decode frame: {0}")]
    FrameDecode(String),

    #[error("model error: {0}")]
    Model(#[from] anyhow::Error),
}
