//! Geometric primitives for board rectification and grid fitting.
//!
//! Line equations, intersections, similarity grouping, box NMS, and the
//! two 1-D clustering routines the grid fitter relies on: a deterministic
//! k-means-like partition and a DBSCAN-style density clustering used to
//! find the modal grid spacing.

/// A point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A line segment in the rectified frame, oriented so that
/// `(x1 + y1) <= (x2 + y2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl Line {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        let mut line = Self { x1, y1, x2, y2 };
        line.normalize_direction();
        line
    }

    /// Sorts the endpoints so `(x1, y1)` is the "top-left-most" point.
    pub fn normalize_direction(&mut self) {
        if (self.x1 + self.y1) > (self.x2 + self.y2) {
            std::mem::swap(&mut self.x1, &mut self.x2);
            std::mem::swap(&mut self.y1, &mut self.y2);
        }
    }

    /// True if the line is (mostly) vertical: `|dx| < 50 && |dy| > 50`.
    pub fn is_vertical(&self) -> bool {
        (self.x1 - self.x2).abs() < 50 && (self.y1 - self.y2).abs() > 50
    }

    pub fn average_distance_to(&self, other: &Line) -> f64 {
        let d_start = dist((self.x1, self.y1), (other.x1, other.y1));
        let d_end = dist((self.x2, self.y2), (other.x2, other.y2));
        (d_start + d_end) / 2.0
    }
}

fn dist(a: (i64, i64), b: (i64, i64)) -> f64 {
    let dx = (a.0 - b.0) as f64;
    let dy = (a.1 - b.1) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Slope/intercept form `y = mx + b`, or the vertical sentinel
/// `(None, x_intercept)` when the line is vertical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineEquation {
    Finite { slope: f64, intercept: f64 },
    Vertical { x: f64 },
}

pub fn line_equation(x1: f64, y1: f64, x2: f64, y2: f64) -> LineEquation {
    if x1 == x2 {
        LineEquation::Vertical { x: x1 }
    } else {
        let slope = (y2 - y1) / (x2 - x1);
        let intercept = y1 - slope * x1;
        LineEquation::Finite {
            slope,
            intercept,
        }
    }
}

/// Rounds half-away-from-zero, as required by every integer coordinate
/// this module hands back.
pub fn round_half_away_from_zero(v: f64) -> i64 {
    if v >= 0.0 {
        (v + 0.5).floor() as i64
    } else {
        (v - 0.5).ceil() as i64
    }
}

/// Intersection of two lines. `None` only for parallel, non-vertical
/// lines with equal slope.
pub fn intersect(l1: &Line, l2: &Line) -> Option<(i64, i64)> {
    let e1 = line_equation(l1.x1 as f64, l1.y1 as f64, l1.x2 as f64, l1.y2 as f64);
    let e2 = line_equation(l2.x1 as f64, l2.y1 as f64, l2.x2 as f64, l2.y2 as f64);

    let (x, y) = match (e1, e2) {
        (LineEquation::Vertical { x }, LineEquation::Finite { slope, intercept }) => {
            (x, slope * x + intercept)
        }
        (LineEquation::Finite { slope, intercept }, LineEquation::Vertical { x }) => {
            (x, slope * x + intercept)
        }
        (LineEquation::Vertical { x: x1 }, LineEquation::Vertical { x: x2 }) => {
            if x1 == x2 {
                return None;
            }
            // Two distinct vertical lines never meet at a finite y we can
            // pick deterministically; treat as parallel.
            return None;
        }
        (
            LineEquation::Finite {
                slope: s1,
                intercept: b1,
            },
            LineEquation::Finite {
                slope: s2,
                intercept: b2,
            },
        ) => {
            if s1 == s2 {
                return None;
            }
            let x = (b2 - b1) / (s1 - s2);
            (x, s1 * x + b1)
        }
    };

    Some((round_half_away_from_zero(x), round_half_away_from_zero(y)))
}

/// True iff all four coordinates of the two lines differ by at most `tau`.
pub fn are_similar(l1: &Line, l2: &Line, tau: i64) -> bool {
    (l1.x1 - l2.x1).abs() <= tau
        && (l1.y1 - l2.y1).abs() <= tau
        && (l1.x2 - l2.x2).abs() <= tau
        && (l1.y2 - l2.y2).abs() <= tau
}

/// Groups similar lines (threshold 10) and replaces each group with the
/// per-coordinate mean.
pub fn remove_duplicates(lines: &[Line]) -> Vec<Line> {
    let mut groups: Vec<Vec<Line>> = Vec::new();

    for &line in lines {
        let mut placed = false;
        for group in groups.iter_mut() {
            if are_similar(&group[0], &line, 10) {
                group.push(line);
                placed = true;
                break;
            }
        }
        if !placed {
            groups.push(vec![line]);
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let n = group.len() as f64;
            let (sx1, sy1, sx2, sy2) = group.iter().fold((0i64, 0i64, 0i64, 0i64), |acc, l| {
                (acc.0 + l.x1, acc.1 + l.y1, acc.2 + l.x2, acc.3 + l.y2)
            });
            Line {
                x1: round_half_away_from_zero(sx1 as f64 / n),
                y1: round_half_away_from_zero(sy1 as f64 / n),
                x2: round_half_away_from_zero(sx2 as f64 / n),
                y2: round_half_away_from_zero(sy2 as f64 / n),
            }
        })
        .collect()
}

/// An axis-aligned box `(x1, y1, x2, y2)` with a confidence score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f32,
}

impl ScoredBox {
    fn area(&self) -> f64 {
        (self.x2 - self.x1 + 1.0).max(0.0) * (self.y2 - self.y1 + 1.0).max(0.0)
    }
}

/// Standard greedy NMS, boxes sorted ascending by `y2`, picked from the
/// back (matching the teacher's `y2`-sorted sweep in `cv_utils.py`).
pub fn non_max_suppression(boxes: &[ScoredBox], overlap_thresh: f64) -> Vec<ScoredBox> {
    if boxes.is_empty() {
        return Vec::new();
    }

    let mut idxs: Vec<usize> = (0..boxes.len()).collect();
    idxs.sort_by(|&a, &b| boxes[a].y2.partial_cmp(&boxes[b].y2).unwrap());

    let mut keep = Vec::new();
    while let Some(&last) = idxs.last() {
        keep.push(last);
        let b_last = &boxes[last];

        idxs.pop();
        idxs.retain(|&i| {
            let b = &boxes[i];
            let xx1 = b_last.x1.max(b.x1);
            let yy1 = b_last.y1.max(b.y1);
            let xx2 = b_last.x2.min(b.x2);
            let yy2 = b_last.y2.min(b.y2);
            let w = (xx2 - xx1 + 1.0).max(0.0);
            let h = (yy2 - yy1 + 1.0).max(0.0);
            let overlap = (w * h) / b.area();
            overlap <= overlap_thresh
        });
    }

    keep.into_iter().map(|i| boxes[i]).collect()
}

/// Applies a 3x3 homography (row-major) to a batch of points.
pub fn perspective_transform_points(points: &[Point2], h: &[[f64; 3]; 3]) -> Vec<Point2> {
    points
        .iter()
        .map(|p| {
            let x = h[0][0] * p.x + h[0][1] * p.y + h[0][2];
            let y = h[1][0] * p.x + h[1][1] * p.y + h[1][2];
            let w = h[2][0] * p.x + h[2][1] * p.y + h[2][2];
            Point2::new(x / w, y / w)
        })
        .collect()
}

/// Deterministic k-means-like partition of 1-D values into `k` clusters.
/// Seeded by equispaced quantiles of the sorted input, so the same input
/// always yields the same clustering (no RNG involved).
pub fn cluster_1d(values: &[f64], k: usize) -> Vec<usize> {
    if values.is_empty() || k == 0 {
        return vec![0; values.len()];
    }
    let k = k.min(values.len());

    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut centroids: Vec<f64> = (0..k)
        .map(|i| {
            let q = if k == 1 {
                0.0
            } else {
                i as f64 / (k - 1) as f64
            };
            let idx = (q * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx]
        })
        .collect();

    let mut assignment = vec![0usize; values.len()];
    for _ in 0..100 {
        let mut changed = false;
        for (i, &v) in values.iter().enumerate() {
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for (c, &centroid) in centroids.iter().enumerate() {
                let d = (v - centroid).abs();
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }

        let mut sums = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for (i, &v) in values.iter().enumerate() {
            sums[assignment[i]] += v;
            counts[assignment[i]] += 1;
        }
        for c in 0..k {
            if counts[c] > 0 {
                centroids[c] = sums[c] / counts[c] as f64;
            }
        }

        if !changed {
            break;
        }
    }

    assignment
}

/// A DBSCAN cluster over a 1-D set of values.
#[derive(Debug, Clone)]
pub struct Cluster1d {
    pub mean: f64,
    pub members: Vec<f64>,
}

/// Density clustering (`eps`, `min_samples`) over 1-D values, used to
/// find the modal grid spacing. Values are processed in ascending order
/// so the output is deterministic.
pub fn dbscan_1d(values: &[f64], eps: f64, min_samples: usize) -> Vec<Cluster1d> {
    if values.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut visited = vec![false; sorted.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut noise: Vec<usize> = Vec::new();

    let neighbors = |i: usize| -> Vec<usize> {
        (0..sorted.len())
            .filter(|&j| (sorted[j] - sorted[i]).abs() <= eps)
            .collect()
    };

    for i in 0..sorted.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut neigh = neighbors(i);
        if neigh.len() < min_samples {
            noise.push(i);
            continue;
        }

        let mut cluster = vec![i];
        let mut queue = neigh.clone();
        while let Some(j) = queue.pop() {
            if cluster.contains(&j) {
                continue;
            }
            cluster.push(j);
            if !visited[j] {
                visited[j] = true;
                let j_neigh = neighbors(j);
                if j_neigh.len() >= min_samples {
                    queue.extend(j_neigh);
                }
            }
        }
        neigh.clear();
        clusters.push(cluster);
    }

    clusters
        .into_iter()
        .map(|idxs| {
            let members: Vec<f64> = idxs.iter().map(|&i| sorted[i]).collect();
            let mean = members.iter().sum::<f64>() / members.len() as f64;
            Cluster1d { mean, members }
        })
        .collect()
}

/// Finds the DBSCAN cluster mean closest to `target`, falling back to the
/// plain mean of all values when DBSCAN finds nothing (every point noise).
pub fn find_common_distance(distances: &[f64], target: f64) -> f64 {
    let clusters = dbscan_1d(distances, 1.0, 1);
    if clusters.is_empty() {
        if distances.is_empty() {
            return 0.0;
        }
        return distances.iter().sum::<f64>() / distances.len() as f64;
    }
    clusters
        .iter()
        .min_by(|a, b| {
            (a.mean - target)
                .abs()
                .partial_cmp(&(b.mean - target).abs())
                .unwrap()
        })
        .unwrap()
        .mean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_half_away_from_zero(2.5), 3);
        assert_eq!(round_half_away_from_zero(-2.5), -3);
        assert_eq!(round_half_away_from_zero(2.4), 2);
    }

    #[test]
    fn test_intersect_orthogonal() {
        let vertical = Line::new(5, 0, 5, 100);
        let horizontal = Line::new(0, 10, 100, 10);
        assert_eq!(intersect(&vertical, &horizontal), Some((5, 10)));
    }

    #[test]
    fn test_intersect_parallel() {
        let a = Line::new(0, 0, 10, 10);
        let b = Line::new(0, 5, 10, 15);
        assert_eq!(intersect(&a, &b), None);
    }

    #[test]
    fn test_are_similar() {
        let a = Line::new(0, 0, 100, 100);
        let b = Line::new(5, 5, 105, 95);
        assert!(are_similar(&a, &b, 10));
        assert!(!are_similar(&a, &b, 4));
    }

    #[test]
    fn test_remove_duplicates_averages() {
        let lines = vec![Line::new(0, 0, 100, 100), Line::new(2, 2, 102, 98)];
        let out = remove_duplicates(&lines);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].x1, 1);
    }

    #[test]
    fn test_is_vertical() {
        assert!(Line::new(10, 0, 10, 600).is_vertical());
        assert!(!Line::new(0, 10, 600, 10).is_vertical());
    }

    #[test]
    fn test_nms_keeps_disjoint() {
        let boxes = vec![
            ScoredBox {
                x1: 0.0,
                y1: 0.0,
                x2: 10.0,
                y2: 10.0,
                score: 0.9,
            },
            ScoredBox {
                x1: 1.0,
                y1: 1.0,
                x2: 11.0,
                y2: 11.0,
                score: 0.8,
            },
            ScoredBox {
                x1: 100.0,
                y1: 100.0,
                x2: 110.0,
                y2: 110.0,
                score: 0.85,
            },
        ];
        let kept = non_max_suppression(&boxes, 0.5);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_cluster_1d_separates_groups() {
        let values: Vec<f64> = vec![0.0, 1.0, 2.0, 100.0, 101.0, 102.0];
        let labels = cluster_1d(&values, 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_cluster_1d_deterministic() {
        let values: Vec<f64> = (0..19).map(|i| i as f64 * 30.0).collect();
        let a = cluster_1d(&values, 19);
        let b = cluster_1d(&values, 19);
        assert_eq!(a, b);
    }

    #[test]
    fn test_dbscan_1d_modal_spacing() {
        let distances = vec![30.0, 30.5, 29.5, 30.2, 60.0];
        let modal = find_common_distance(&distances, 30.0);
        assert!((modal - 30.05).abs() < 1.0);
    }

    #[test]
    fn test_dbscan_1d_empty() {
        assert!(dbscan_1d(&[], 1.0, 1).is_empty());
    }
}
