use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array2, Array4};
use ort::{
    ep,
    session::{builder::GraphOptimizationLevel, Session},
};

/// Builds the 7-class board detector session from an operator-supplied
/// ONNX file.
pub fn detector_session(path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .with_execution_providers([
            #[cfg(feature = "openvino")]
            ep::OpenVINO::default().into(),
            #[cfg(feature = "cuda")]
            ep::CUDA::default().into(),
            ep::CPU::default().into(),
        ])?
        .commit_from_file(path)
        .with_context(|| format!("load detector model from {}", path.display()))
}

/// Builds the per-cell classifier session from an operator-supplied ONNX
/// file.
pub fn classifier_onnx_session(path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .with_execution_providers([
            #[cfg(feature = "openvino")]
            ep::OpenVINO::default().into(),
            #[cfg(feature = "cuda")]
            ep::CUDA::default().into(),
            ep::CPU::default().into(),
        ])?
        .commit_from_file(path)
        .with_context(|| format!("load classifier model from {}", path.display()))
}

/// Abstracts the per-cell classifier so the hybrid corrector can be
/// tested without a real ONNX runtime in the loop.
///
/// `score_batch` takes a batch of candidate boards, shape `(N, 19, 19,
/// 1)` float32 with cell values in `{0, 1, 2}` (empty, black, white),
/// and returns one `[2]` probability row per candidate (`[p_black,
/// p_white]`).
pub trait ClassifierSession {
    fn score_batch(&mut self, inputs: &Array4<f32>) -> Result<Array2<f32>>;
}

/// The real ONNX-backed classifier.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(classifier_onnx_session(path)?))
    }
}

impl ClassifierSession for OnnxClassifier {
    fn score_batch(&mut self, inputs: &Array4<f32>) -> Result<Array2<f32>> {
        let input_tensor = ort::value::Value::from_array(inputs.clone())?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let rows = shape[0] as usize;
        let cols = if shape.len() > 1 { shape[1] as usize } else { 1 };
        Array2::from_shape_vec((rows, cols), data.to_vec()).context("reshape classifier output")
    }
}

/// Deterministic in-memory test doubles for `ClassifierSession`, used by
/// both this crate's and `kifu`'s corrector tests in place of a live
/// `ort::Session`.
pub mod testing {
    use super::*;

    /// Always favors the first candidate in the batch.
    pub struct StubClassifier;

    impl ClassifierSession for StubClassifier {
        fn score_batch(&mut self, inputs: &Array4<f32>) -> Result<Array2<f32>> {
            let rows = inputs.shape()[0];
            let mut out = Array2::<f32>::zeros((rows, 2));
            if rows > 0 {
                out[[0, 0]] = 0.9;
                out[[0, 1]] = 0.1;
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubClassifier;
    use super::*;

    #[test]
    fn test_stub_classifier_scores_first_row_highest() {
        let mut clf = StubClassifier;
        let input = Array4::<f32>::zeros((3, 19, 19, 1));
        let scores = clf.score_batch(&input).unwrap();
        assert!(scores[[0, 0]] > scores[[1, 0]]);
    }
}
