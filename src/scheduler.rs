//! Drives a video end to end: an init phase that hunts for a usable
//! starting frame, then a strided main phase that samples the rest of
//! the video into an append-only, gap-tolerant board-state sequence.

use std::path::Path;

use kifu_vision::board_detector::BoardDetector;
use kifu_vision::grid::GridFitter;
use kifu_vision::state::BoardState;
use kifu_vision::video::VideoSource;

use crate::cancel::CancellationToken;
use crate::config::InitMode;
use crate::error::PipelineError;
use crate::initializer::{Initializer, Mode};
use crate::sgf::{Color, Move};

/// Runtime knobs for one `run_pipeline` invocation, derived from
/// `Config` and overridable per call by CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub analysis_interval_seconds: f64,
    pub max_init_frames: u32,
    pub mode: InitMode,
    pub double_transform: bool,
    pub score_threshold: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            analysis_interval_seconds: 0.1,
            max_init_frames: 300,
            mode: InitMode::Transparent,
            double_transform: false,
            score_threshold: 0.15,
        }
    }
}

/// The result of driving a video through detection: an optional prefix
/// of moves the initialiser reconstructed, plus the sampled board-state
/// sequence for the correctors to diff.
pub struct ScheduleResult {
    pub prefix_moves: Vec<Move>,
    pub states: Vec<BoardState>,
}

pub struct FrameScheduler {
    source: VideoSource,
    stride: usize,
}

impl FrameScheduler {
    pub fn open(path: &Path, options: &PipelineOptions) -> Result<Self, PipelineError> {
        let source = VideoSource::open(path)?;
        let fps = source.fps();
        let stride = ((fps * options.analysis_interval_seconds).round() as usize).max(1);
        Ok(Self { source, stride })
    }

    pub fn run(
        &mut self,
        detector: &mut BoardDetector,
        grid_fitter: &GridFitter,
        options: &PipelineOptions,
        cancel: &CancellationToken,
    ) -> Result<ScheduleResult, PipelineError> {
        let initializer = Initializer::new(match options.mode {
            InitMode::Strict => Mode::Strict {
                side_to_move_hint: Color::Black,
            },
            InitMode::Transparent => Mode::Transparent,
        });

        let mut frame_index: u32 = 0;
        let mut prefix_moves = None;
        let mut initial_state = None;

        for frame in self.source.frames() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if frame_index >= options.max_init_frames {
                break;
            }
            let frame_index_usize = frame_index as usize;
            frame_index += 1;

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("init frame {frame_index_usize}: decode error: {e}");
                    continue;
                }
            };

            match detect_state(detector, grid_fitter, &frame, options, frame_index_usize) {
                Ok(state) => {
                    if let Some(moves) = initializer.initialize(&state) {
                        prefix_moves = Some(moves);
                        initial_state = Some(state);
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("init frame {frame_index_usize}: {e}");
                }
            }
        }

        let (prefix_moves, initial_state) = match (prefix_moves, initial_state) {
            (Some(moves), Some(state)) => (moves, state),
            _ => return Err(PipelineError::InitFailure),
        };

        let mut states = vec![initial_state];
        let mut since_last_sample = 0usize;

        for frame in self.source.frames() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            since_last_sample += 1;
            if since_last_sample % self.stride != 0 {
                continue;
            }

            let frame_index_usize = frame_index as usize;
            frame_index += 1;

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("frame {frame_index_usize}: decode error: {e}");
                    continue;
                }
            };

            match detect_state(detector, grid_fitter, &frame, options, frame_index_usize) {
                Ok(state) => states.push(state),
                Err(e) => {
                    log::warn!("frame {frame_index_usize}: {e}");
                }
            }
        }

        Ok(ScheduleResult {
            prefix_moves,
            states,
        })
    }
}

fn detect_state(
    detector: &mut BoardDetector,
    grid_fitter: &GridFitter,
    frame: &image::DynamicImage,
    options: &PipelineOptions,
    frame_index: usize,
) -> Result<BoardState, PipelineError> {
    let rectified = detector
        .detect_and_rectify(frame, options.score_threshold, options.double_transform)
        .map_err(|e| PipelineError::DetectionFailure {
            frame_index,
            reason: e.to_string(),
        })?;

    let grid = grid_fitter
        .fit(&rectified.empty_points)
        .map_err(|e| PipelineError::GridFailure {
            frame_index,
            source: e,
        })?;

    Ok(kifu_vision::assign::assign_stones(
        &grid,
        &rectified.black_points,
        &rectified.white_points,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.max_init_frames, 300);
    }
}
