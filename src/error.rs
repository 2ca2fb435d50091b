use thiserror::Error;

use kifu_vision::VisionError;

/// The reason a rule-violation-like transition was observed. Not used
/// for pipeline control flow — both correctors silently skip or defer
/// these transitions — this exists for the optional legality-replay
/// test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleViolationReason {
    SelfCapture,
    Occupied,
    Ko,
    WrongTurn,
}

/// The top-level result type for `run_pipeline`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not establish an initial board state within the init frame budget")]
    InitFailure,

    #[error("grid fit failed at frame {frame_index}: {source}")]
    GridFailure {
        frame_index: usize,
        #[source]
        source: VisionError,
    },

    #[error("detection failed at frame {frame_index}: {reason}")]
    DetectionFailure { frame_index: usize, reason: String },

    #[error("model error during {stage}: {source}")]
    ModelError {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("vision error: {0}")]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
