//! Detects the physical board in a frame, finds its four corners and
//! rectifies it onto the canonical 600x600 frame the grid fitter and
//! stone assigner both expect.

use anyhow::Context as _;
use image::{DynamicImage, GenericImageView};
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::Value;

use crate::detect::{decode_detections, nms_per_class, DetectedClass, RawDetection};
use crate::error::VisionError;
use crate::geometry::Point2;
use crate::perspective::{
    canonical_square, Homography, CANONICAL_SIZE, DOUBLE_TRANSFORM_PADDING,
    DOUBLE_TRANSFORM_SIZE,
};

const INPUT_SIZE: u32 = 640;

/// Points extracted from a detection pass, split by class, still in the
/// coordinate frame the detection ran on.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedPoints {
    pub black: Vec<Point2>,
    pub white: Vec<Point2>,
    pub empty: Vec<Point2>,
    pub corners: Vec<Point2>,
    pub board: Option<(Point2, Point2)>,
}

/// Detections rectified onto the canonical 600x600 frame, ready for the
/// grid fitter and stone assigner.
#[derive(Debug, Clone)]
pub struct RectifiedDetections {
    pub empty_points: Vec<Point2>,
    pub black_points: Vec<Point2>,
    pub white_points: Vec<Point2>,
}

pub struct BoardDetector {
    session: Session,
}

impl BoardDetector {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Runs the detector on `frame` and returns decoded, per-class-NMS'd
    /// detections in the frame's own pixel coordinates.
    pub fn detect(
        &mut self,
        frame: &DynamicImage,
        score_threshold: f32,
    ) -> Result<Vec<RawDetection>, VisionError> {
        let (orig_w, orig_h) = frame.dimensions();
        let scale = INPUT_SIZE as f32 / orig_w.max(orig_h) as f32;
        let new_w = (orig_w as f32 * scale) as u32;
        let new_h = (orig_h as f32 * scale) as u32;

        let resized = frame.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);
        let mut canvas = DynamicImage::new_rgb8(INPUT_SIZE, INPUT_SIZE);
        image::imageops::overlay(&mut canvas, &resized, 0, 0);
        let rgb = canvas.to_rgb8();

        let pixel_count = (INPUT_SIZE * INPUT_SIZE) as usize;
        let mut input_data = vec![0.0f32; 3 * pixel_count];
        let pixels = rgb.as_raw();
        for i in 0..pixel_count {
            let idx = i * 3;
            input_data[i] = pixels[idx] as f32 / 255.0;
            input_data[pixel_count + i] = pixels[idx + 1] as f32 / 255.0;
            input_data[2 * pixel_count + i] = pixels[idx + 2] as f32 / 255.0;
        }

        let input_array = Array4::from_shape_vec(
            (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
            input_data,
        )
        .map_err(|e| VisionError::DetectionFailure(e.to_string()))?;
        let input_tensor =
            Value::from_array(input_array).map_err(|e| VisionError::Model(e.into()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .context("run detector session")
            .map_err(VisionError::Model)?;

        // Extract all three output tensors up front, matching the
        // teacher's pattern of collecting (shape, data) pairs before
        // handing them to a pure decoding function.
        let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Model(e.into()))?;
            output_data.push((shape.iter().copied().collect(), data.to_vec()));
        }

        if output_data.len() < 3 {
            return Err(VisionError::BadClassCount(format!(
                "expected 3 detector outputs (boxes, class_scores, objectness), got {}",
                output_data.len()
            )));
        }

        let boxes = to_array2(&output_data[0])?;
        let class_scores = to_array2(&output_data[1])?;
        let objectness = to_array2(&output_data[2])?;

        let raw = decode_detections(&boxes, &class_scores, &objectness, score_threshold)
            .map_err(VisionError::Model)?;
        let mut kept = nms_per_class(&raw, 0.5);

        // Rescale from the INPUT_SIZE canvas back to the source frame.
        for det in kept.iter_mut() {
            det.bbox[0] /= scale;
            det.bbox[1] /= scale;
            det.bbox[2] /= scale;
            det.bbox[3] /= scale;
        }

        Ok(kept)
    }

    /// Splits raw detections into the point sets downstream stages need.
    pub fn classify_points(detections: &[RawDetection]) -> ClassifiedPoints {
        let mut points = ClassifiedPoints::default();
        let mut board_box: Option<(f32, f32, f32, f32)> = None;

        for det in detections {
            let center = Point2::new(
                ((det.bbox[0] + det.bbox[2]) / 2.0) as f64,
                ((det.bbox[1] + det.bbox[3]) / 2.0) as f64,
            );
            match det.class {
                DetectedClass::BlackStone => points.black.push(center),
                DetectedClass::WhiteStone => points.white.push(center),
                DetectedClass::EmptyIntersection
                | DetectedClass::EmptyEdge
                | DetectedClass::EmptyCorner => points.empty.push(center),
                DetectedClass::Corner => points.corners.push(center),
                DetectedClass::Board => {
                    board_box = Some((det.bbox[0], det.bbox[1], det.bbox[2], det.bbox[3]));
                }
            }
        }

        if let Some((x1, y1, x2, y2)) = board_box {
            points.board = Some((
                Point2::new(x1 as f64, y1 as f64),
                Point2::new(x2 as f64, y2 as f64),
            ));
        }

        points
    }

    /// Orders four corner points as top-left, top-right, bottom-right,
    /// bottom-left by splitting on the median y, then sorting each half
    /// by x.
    pub fn order_corners(corners: &[Point2]) -> Result<[Point2; 4], VisionError> {
        if corners.len() != 4 {
            return Err(VisionError::BadCornerCount(corners.len()));
        }
        let mut sorted = corners.to_vec();
        sorted.sort_by(|a, b| a.y.partial_cmp(&b.y).unwrap());

        let mut top = sorted[0..2].to_vec();
        let mut bottom = sorted[2..4].to_vec();
        top.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
        bottom.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());

        Ok([top[0], top[1], bottom[1], bottom[0]])
    }

    /// Full detect + rectify pipeline, with an optional padded
    /// double-transform re-detection pass for sharper corner alignment.
    pub fn detect_and_rectify(
        &mut self,
        frame: &DynamicImage,
        score_threshold: f32,
        double_transform: bool,
    ) -> Result<RectifiedDetections, VisionError> {
        let first_pass = self.detect(frame, score_threshold)?;
        let points = Self::classify_points(&first_pass);
        let board_corners = corners_within_board(&points.corners, points.board);
        let corners = Self::order_corners(&board_corners)?;

        let dst = canonical_square(CANONICAL_SIZE);
        let homography = Homography::from_four_points(corners, dst)
            .map_err(|e| VisionError::DetectionFailure(e.to_string()))?;

        if !double_transform {
            return Ok(RectifiedDetections {
                empty_points: homography.apply_many(&points.empty),
                black_points: homography.apply_many(&points.black),
                white_points: homography.apply_many(&points.white),
            });
        }

        // Padded re-detection pass: warp into a larger canvas so corners
        // land inset from the edge, re-detect there, and rectify with
        // zero padding into the final 600x600 frame.
        let padded_dst = [
            Point2::new(DOUBLE_TRANSFORM_PADDING, DOUBLE_TRANSFORM_PADDING),
            Point2::new(
                DOUBLE_TRANSFORM_SIZE - DOUBLE_TRANSFORM_PADDING,
                DOUBLE_TRANSFORM_PADDING,
            ),
            Point2::new(
                DOUBLE_TRANSFORM_SIZE - DOUBLE_TRANSFORM_PADDING,
                DOUBLE_TRANSFORM_SIZE - DOUBLE_TRANSFORM_PADDING,
            ),
            Point2::new(
                DOUBLE_TRANSFORM_PADDING,
                DOUBLE_TRANSFORM_SIZE - DOUBLE_TRANSFORM_PADDING,
            ),
        ];
        let padded_homography = Homography::from_four_points(corners, padded_dst)
            .map_err(|e| VisionError::DetectionFailure(e.to_string()))?;

        let second_pass_points = ClassifiedPoints {
            black: padded_homography.apply_many(&points.black),
            white: padded_homography.apply_many(&points.white),
            empty: padded_homography.apply_many(&points.empty),
            corners: padded_homography.apply_many(&points.corners),
            board: None,
        };
        let refined_corners = Self::order_corners(&second_pass_points.corners)?;
        let final_homography = Homography::from_four_points(refined_corners, dst)
            .map_err(|e| VisionError::DetectionFailure(e.to_string()))?;

        Ok(RectifiedDetections {
            empty_points: final_homography.apply_many(&second_pass_points.empty),
            black_points: final_homography.apply_many(&second_pass_points.black),
            white_points: final_homography.apply_many(&second_pass_points.white),
        })
    }
}

/// Keeps only corner centres that fall inside the detected board box (a
/// small margin absorbs a corner marker's centre sitting slightly
/// outside the board box's own edge). With no board box detected, every
/// corner is passed through unfiltered.
fn corners_within_board(corners: &[Point2], board: Option<(Point2, Point2)>) -> Vec<Point2> {
    let Some((top_left, bottom_right)) = board else {
        return corners.to_vec();
    };
    let margin_x = (bottom_right.x - top_left.x).abs() * 0.05;
    let margin_y = (bottom_right.y - top_left.y).abs() * 0.05;
    let (min_x, max_x) = (
        top_left.x.min(bottom_right.x) - margin_x,
        top_left.x.max(bottom_right.x) + margin_x,
    );
    let (min_y, max_y) = (
        top_left.y.min(bottom_right.y) - margin_y,
        top_left.y.max(bottom_right.y) + margin_y,
    );
    corners
        .iter()
        .copied()
        .filter(|p| p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y)
        .collect()
}

fn to_array2(output: &(Vec<i64>, Vec<f32>)) -> Result<Array2<f32>, VisionError> {
    let (shape, data) = output;
    let rows = shape[0] as usize;
    let cols = if shape.len() > 1 { shape[1] as usize } else { 1 };
    Array2::from_shape_vec((rows, cols), data.clone())
        .map_err(|e| VisionError::BadClassCount(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_corners_rejects_wrong_count() {
        let pts = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)];
        assert!(BoardDetector::order_corners(&pts).is_err());
    }

    #[test]
    fn test_order_corners_basic_square() {
        let pts = vec![
            Point2::new(590.0, 5.0),
            Point2::new(5.0, 595.0),
            Point2::new(5.0, 5.0),
            Point2::new(595.0, 595.0),
        ];
        let ordered = BoardDetector::order_corners(&pts).unwrap();
        assert!(ordered[0].x < ordered[1].x);
        assert!(ordered[0].y < ordered[3].y);
    }

    #[test]
    fn test_corners_within_board_drops_off_board_detection() {
        let board = Some((Point2::new(0.0, 0.0), Point2::new(600.0, 600.0)));
        let corners = vec![
            Point2::new(5.0, 5.0),
            Point2::new(595.0, 5.0),
            Point2::new(595.0, 595.0),
            Point2::new(5.0, 595.0),
            Point2::new(1000.0, 1000.0),
        ];
        let kept = corners_within_board(&corners, board);
        assert_eq!(kept.len(), 4);
        assert!(!kept.contains(&Point2::new(1000.0, 1000.0)));
    }

    #[test]
    fn test_corners_within_board_passes_through_without_board() {
        let corners = vec![Point2::new(5.0, 5.0), Point2::new(1000.0, 1000.0)];
        let kept = corners_within_board(&corners, None);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_classify_points_splits_by_class() {
        let detections = vec![
            RawDetection {
                bbox: [0.0, 0.0, 10.0, 10.0],
                class: DetectedClass::BlackStone,
                score: 0.9,
            },
            RawDetection {
                bbox: [20.0, 20.0, 30.0, 30.0],
                class: DetectedClass::WhiteStone,
                score: 0.9,
            },
            RawDetection {
                bbox: [0.0, 0.0, 600.0, 600.0],
                class: DetectedClass::Board,
                score: 0.9,
            },
        ];
        let points = BoardDetector::classify_points(&detections);
        assert_eq!(points.black.len(), 1);
        assert_eq!(points.white.len(), 1);
        assert!(points.board.is_some());
    }
}
