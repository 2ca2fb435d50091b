//! Decodes the object detector's raw tensor outputs into boxes with a
//! class id and confidence, then applies per-class NMS.
//!
//! The detector is a single-stage, anchor-free 7-class head: one flat set
//! of `N` candidate boxes, one `[N, 7]` class-score tensor and one `[N,
//! 1]` objectness tensor, combined the same way a YuNet-style anchor-free
//! head combines `cls` and `obj` before thresholding.

use anyhow::Result;
use ndarray::Array2;

use crate::geometry::{non_max_suppression, ScoredBox};

/// The seven classes the board detector is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedClass {
    BlackStone,
    Board,
    Corner,
    EmptyIntersection,
    EmptyCorner,
    EmptyEdge,
    WhiteStone,
}

impl DetectedClass {
    pub const ALL: [DetectedClass; 7] = [
        DetectedClass::BlackStone,
        DetectedClass::Board,
        DetectedClass::Corner,
        DetectedClass::EmptyIntersection,
        DetectedClass::EmptyCorner,
        DetectedClass::EmptyEdge,
        DetectedClass::WhiteStone,
    ];

    fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x1, y1, x2, y2 in pixel space
    pub class: DetectedClass,
    pub score: f32,
}

/// Decodes `boxes` `[N, 4]`, `class_scores` `[N, 7]` and `objectness`
/// `[N, 1]` into per-class confidence-filtered detections.
///
/// Confidence for a box is `objectness * max(class_scores)`, matching the
/// `cls * obj` combination the teacher's anchor-free decoder performs
/// before thresholding.
pub fn decode_detections(
    boxes: &Array2<f32>,
    class_scores: &Array2<f32>,
    objectness: &Array2<f32>,
    score_threshold: f32,
) -> Result<Vec<RawDetection>> {
    let n = boxes.shape()[0];
    if class_scores.shape()[0] != n || objectness.shape()[0] != n {
        anyhow::bail!(
            "mismatched detector output rows: boxes={}, class_scores={}, objectness={}",
            n,
            class_scores.shape()[0],
            objectness.shape()[0]
        );
    }
    if class_scores.shape()[1] != DetectedClass::ALL.len() {
        anyhow::bail!(
            "expected {} classes, got {}",
            DetectedClass::ALL.len(),
            class_scores.shape()[1]
        );
    }

    let mut detections = Vec::new();
    for i in 0..n {
        let obj = objectness[[i, 0]];
        let mut best_class = 0usize;
        let mut best_score = f32::MIN;
        for c in 0..DetectedClass::ALL.len() {
            let s = class_scores[[i, c]];
            if s > best_score {
                best_score = s;
                best_class = c;
            }
        }
        let confidence = obj * best_score;
        if confidence < score_threshold {
            continue;
        }
        let class = DetectedClass::from_index(best_class)
            .ok_or_else(|| anyhow::anyhow!("invalid class index {}", best_class))?;

        detections.push(RawDetection {
            bbox: [
                boxes[[i, 0]],
                boxes[[i, 1]],
                boxes[[i, 2]],
                boxes[[i, 3]],
            ],
            class,
            score: confidence,
        });
    }

    Ok(detections)
}

/// Runs NMS independently within each class, so a stone and an
/// overlapping corner box never suppress each other.
pub fn nms_per_class(detections: &[RawDetection], overlap_thresh: f64) -> Vec<RawDetection> {
    let mut kept = Vec::new();
    for class in DetectedClass::ALL {
        let (class_dets, indices): (Vec<ScoredBox>, Vec<usize>) = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.class == class)
            .map(|(i, d)| {
                (
                    ScoredBox {
                        x1: d.bbox[0] as f64,
                        y1: d.bbox[1] as f64,
                        x2: d.bbox[2] as f64,
                        y2: d.bbox[3] as f64,
                        score: d.score,
                    },
                    i,
                )
            })
            .unzip();

        let suppressed = non_max_suppression(&class_dets, overlap_thresh);
        for kept_box in suppressed {
            let pos = class_dets
                .iter()
                .position(|b| *b == kept_box)
                .expect("kept box must originate from class_dets");
            kept.push(detections[indices[pos]]);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_picks_max_class() {
        let boxes = Array2::from_shape_vec((1, 4), vec![0.0, 0.0, 10.0, 10.0]).unwrap();
        let mut scores = vec![0.0f32; 7];
        scores[6] = 0.9; // WhiteStone
        let class_scores = Array2::from_shape_vec((1, 7), scores).unwrap();
        let objectness = Array2::from_shape_vec((1, 1), vec![0.8]).unwrap();

        let dets = decode_detections(&boxes, &class_scores, &objectness, 0.1).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class, DetectedClass::WhiteStone);
        assert!((dets[0].score - 0.72).abs() < 1e-5);
    }

    #[test]
    fn test_decode_filters_below_threshold() {
        let boxes = Array2::from_shape_vec((1, 4), vec![0.0, 0.0, 10.0, 10.0]).unwrap();
        let class_scores = Array2::from_shape_vec((1, 7), vec![0.1; 7]).unwrap();
        let objectness = Array2::from_shape_vec((1, 1), vec![0.1]).unwrap();

        let dets = decode_detections(&boxes, &class_scores, &objectness, 0.5).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn test_nms_per_class_keeps_distinct_classes() {
        let dets = vec![
            RawDetection {
                bbox: [0.0, 0.0, 10.0, 10.0],
                class: DetectedClass::BlackStone,
                score: 0.9,
            },
            RawDetection {
                bbox: [1.0, 1.0, 11.0, 11.0],
                class: DetectedClass::Corner,
                score: 0.85,
            },
        ];
        let kept = nms_per_class(&dets, 0.3);
        assert_eq!(kept.len(), 2);
    }
}
