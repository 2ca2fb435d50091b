pub mod cancel;
pub mod config;
pub mod corrector_no_ai;
pub mod corrector_with_ai;
pub mod error;
pub mod initializer;
pub mod scheduler;
pub mod sgf;

use std::path::Path;

use kifu_vision::board_detector::BoardDetector;
use kifu_vision::grid::GridFitter;
use kifu_vision::model::OnnxClassifier;

pub use cancel::CancellationToken;
pub use error::PipelineError;
pub use scheduler::PipelineOptions;

/// Runs the full video-to-SGF pipeline and writes the result to
/// `out_sgf_path`, returning the SGF text on success.
pub fn run_pipeline(
    video_path: &Path,
    detector_model_path: &Path,
    classifier_model_path: &Path,
    out_sgf_path: &Path,
    options: PipelineOptions,
) -> Result<String, PipelineError> {
    run_pipeline_with_cancellation(
        video_path,
        detector_model_path,
        classifier_model_path,
        out_sgf_path,
        options,
        &CancellationToken::new(),
    )
}

pub fn run_pipeline_with_cancellation(
    video_path: &Path,
    detector_model_path: &Path,
    classifier_model_path: &Path,
    out_sgf_path: &Path,
    options: PipelineOptions,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    let detector_session = kifu_vision::model::detector_session(detector_model_path)
        .map_err(|e| PipelineError::ModelError {
            stage: "load detector model".into(),
            source: e,
        })?;
    let mut board_detector = BoardDetector::new(detector_session);
    let grid_fitter = GridFitter::default();

    let mut scheduler = scheduler::FrameScheduler::open(video_path, &options)?;
    let result = scheduler.run(&mut board_detector, &grid_fitter, &options, cancel)?;

    let prefix_moves = result.prefix_moves;

    let ai_moves = run_hybrid_corrector(&result.states, classifier_model_path);
    let mut moves = prefix_moves.clone();
    match ai_moves {
        Ok(ai_moves) => moves.extend(ai_moves),
        Err(e) => {
            log::warn!("hybrid corrector unavailable ({e}), falling back to heuristic corrector");
        }
    }

    if moves.is_empty() {
        log::warn!("hybrid corrector produced an empty move list, falling back to heuristic corrector");
        let mut fallback_moves = prefix_moves;
        fallback_moves.extend(corrector_no_ai::correct(&result.states));
        moves = fallback_moves;
    }

    if moves.is_empty() {
        return Err(PipelineError::ModelError {
            stage: "empty_sgf".into(),
            source: anyhow::anyhow!("both correctors produced an empty move list"),
        });
    }

    let sgf_text = sgf::emit(&moves);
    std::fs::write(out_sgf_path, &sgf_text).map_err(|e| PipelineError::Other(e.into()))?;
    log::info!(
        "wrote {} bytes to {}",
        sgf_text.len(),
        out_sgf_path.display()
    );

    Ok(sgf_text)
}

fn run_hybrid_corrector(
    states: &[kifu_vision::state::BoardState],
    classifier_model_path: &Path,
) -> Result<Vec<sgf::Move>, PipelineError> {
    let mut classifier = OnnxClassifier::load(classifier_model_path).map_err(|e| {
        PipelineError::ModelError {
            stage: "load classifier model".into(),
            source: e,
        }
    })?;
    corrector_with_ai::correct(states, &mut classifier)
}
