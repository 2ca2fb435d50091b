//! Fits the 19x19 intersection grid from the empty-intersection and
//! empty-edge/-corner detections on the rectified 600x600 frame.

use ndarray::Array2;

use crate::error::VisionError;
use crate::geometry::{cluster_1d, dbscan_1d, Point2};
use crate::perspective::gaussian_solve;
use crate::state::BOARD_SIZE;

/// One fitted grid line, recovered by a degree-1 polynomial fit through
/// its cluster of detected points: a column's position is `x = slope*y +
/// intercept`, a row's is `y = slope*x + intercept`, expressed in terms
/// of the perpendicular axis so a tilted line is still representable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLine {
    pub slope: f64,
    pub intercept: f64,
    /// Position evaluated at the frame's midline; the line's
    /// representative 1-D coordinate for spacing/ordering comparisons.
    pub coord: f64,
}

impl GridLine {
    fn at(slope: f64, intercept: f64, reference: f64) -> Self {
        Self {
            slope,
            intercept,
            coord: slope * reference + intercept,
        }
    }

    /// The line's primary-axis position at a given perpendicular-axis
    /// coordinate.
    pub fn eval(&self, perpendicular: f64) -> f64 {
        self.slope * perpendicular + self.intercept
    }
}

/// The fitted 19x19 intersection grid on the canonical frame.
#[derive(Debug, Clone)]
pub struct Grid {
    pub columns: [GridLine; BOARD_SIZE],
    pub rows: [GridLine; BOARD_SIZE],
    /// `intersections[row][col]` is the pixel location of that
    /// intersection, sorted so iterating row-major yields increasing y
    /// then increasing x, matching the 361-point sorted mapping.
    pub intersections: [[Point2; BOARD_SIZE]; BOARD_SIZE],
}

impl Grid {
    /// Nearest intersection to `p` by Euclidean distance, with a
    /// lexicographic `(col, row)` tie-break.
    pub fn nearest(&self, p: Point2) -> (usize, usize) {
        let mut best = (0usize, 0usize);
        let mut best_dist = f64::INFINITY;
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let q = self.intersections[row][col];
                let d = (q.x - p.x).powi(2) + (q.y - p.y).powi(2);
                if d < best_dist || (d == best_dist && (col, row) < best) {
                    best_dist = d;
                    best = (col, row);
                }
            }
        }
        best
    }
}

pub struct GridFitter {
    pub canonical_size: f64,
}

impl Default for GridFitter {
    fn default() -> Self {
        Self {
            canonical_size: crate::perspective::CANONICAL_SIZE,
        }
    }
}

impl GridFitter {
    pub fn new(canonical_size: f64) -> Self {
        Self { canonical_size }
    }

    /// Fits 19 column lines and 19 row lines from the coordinates of
    /// empty-intersection (and empty-edge/-corner) detections, then maps
    /// the 361 pairwise intersections.
    pub fn fit(&self, empty_points: &[Point2]) -> Result<Grid, VisionError> {
        if empty_points.is_empty() {
            return Err(VisionError::GridFailure("no empty points supplied".into()));
        }

        let reference = self.canonical_size / 2.0;

        let column_points: Vec<(f64, f64)> = empty_points.iter().map(|p| (p.x, p.y)).collect();
        let row_points: Vec<(f64, f64)> = empty_points.iter().map(|p| (p.y, p.x)).collect();

        let columns = self.fit_axis(&column_points, reference)?;
        let rows = self.fit_axis(&row_points, reference)?;

        let mut intersections = [[Point2::new(0.0, 0.0); BOARD_SIZE]; BOARD_SIZE];
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, col) in columns.iter().enumerate() {
                intersections[row_idx][col_idx] = intersect_lines(col, row);
            }
        }

        Ok(Grid {
            columns,
            rows,
            intersections,
        })
    }

    /// Clusters `(primary, perpendicular)` pairs along the primary axis
    /// into up to 19 groups with `cluster_1d`, fits a line through each,
    /// restores/removes and boundary-pads down to exactly 19 lines.
    fn fit_axis(
        &self,
        points: &[(f64, f64)],
        reference: f64,
    ) -> Result<[GridLine; BOARD_SIZE], VisionError> {
        let primary: Vec<f64> = points.iter().map(|&(p, _)| p).collect();
        let assignment = cluster_1d(&primary, BOARD_SIZE);
        let cluster_count = assignment.iter().copied().max().map(|m| m + 1).unwrap_or(0);

        let mut clusters: Vec<Vec<(f64, f64)>> = vec![Vec::new(); cluster_count];
        for (&cluster_id, &point) in assignment.iter().zip(points.iter()) {
            clusters[cluster_id].push(point);
        }

        // Fit clusters with enough points to support a genuine slope
        // estimate directly; sparser clusters borrow a slope below.
        let fits: Vec<Option<(f64, f64)>> = clusters
            .iter()
            .map(|cluster| {
                if cluster.len() >= 3 {
                    Some(linear_fit(cluster))
                } else {
                    None
                }
            })
            .collect();

        let confident: Vec<(f64, usize)> = clusters
            .iter()
            .zip(fits.iter())
            .filter_map(|(cluster, fit)| fit.map(|(slope, _)| (slope, cluster.len())))
            .collect();
        let fallback_slope = if confident.is_empty() {
            0.0
        } else {
            let (weighted, total) = confident
                .iter()
                .fold((0.0, 0usize), |(sum, total), &(slope, size)| {
                    (sum + slope * size as f64, total + size)
                });
            weighted / total as f64
        };

        let mut lines: Vec<GridLine> = Vec::new();
        for (cluster, fit) in clusters.into_iter().zip(fits.into_iter()) {
            if cluster.is_empty() {
                continue;
            }
            let (slope, intercept) = match fit {
                Some(fit) => fit,
                None => {
                    // Anchor the borrowed slope on the cluster's own
                    // mean point so a sparse cluster still lands at its
                    // observed location.
                    let n = cluster.len() as f64;
                    let (sum_primary, sum_perp) = cluster
                        .iter()
                        .fold((0.0, 0.0), |(sp, sq), &(p, q)| (sp + p, sq + q));
                    let (mean_primary, mean_perp) = (sum_primary / n, sum_perp / n);
                    (fallback_slope, mean_primary - fallback_slope * mean_perp)
                }
            };
            lines.push(GridLine::at(slope, intercept, reference));
        }
        lines.sort_by(|a, b| a.coord.partial_cmp(&b.coord).unwrap());

        let spacing = modal_spacing(&lines, self.canonical_size / (BOARD_SIZE - 1) as f64);

        restore_and_remove(&mut lines, spacing, fallback_slope, reference);
        pad_boundaries(&mut lines, spacing, self.canonical_size, fallback_slope, reference);

        if lines.len() != BOARD_SIZE {
            return Err(VisionError::GridFailure(format!(
                "expected {} lines, fit produced {}",
                BOARD_SIZE,
                lines.len()
            )));
        }
        for line in &lines {
            if line.coord < -1e-6 || line.coord > self.canonical_size + 1e-6 {
                return Err(VisionError::GridFailure(format!(
                    "line coordinate {} outside [0, {}]",
                    line.coord, self.canonical_size
                )));
            }
        }

        let mut out = [GridLine::at(0.0, 0.0, reference); BOARD_SIZE];
        out.copy_from_slice(&lines);
        Ok(out)
    }
}

/// Solves the intersection of a column line (`x = m_c*y + b_c`) and a
/// row line (`y = m_r*x + b_r`); falls back to the two lines' reference
/// coordinates if they are (near-)parallel in this parametrisation.
fn intersect_lines(column: &GridLine, row: &GridLine) -> Point2 {
    let denom = 1.0 - row.slope * column.slope;
    if denom.abs() < 1e-9 {
        return Point2::new(column.coord, row.coord);
    }
    let y = (row.slope * column.intercept + row.intercept) / denom;
    let x = column.slope * y + column.intercept;
    Point2::new(x, y)
}

/// Ordinary least-squares fit of `primary = slope*perp + intercept`
/// through a cluster's points, via the normal equations.
fn linear_fit(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len();
    let mut a = Array2::<f64>::zeros((n, 2));
    let mut b = Array2::<f64>::zeros((n, 1));
    for (i, &(primary, perp)) in points.iter().enumerate() {
        a[[i, 0]] = perp;
        a[[i, 1]] = 1.0;
        b[[i, 0]] = primary;
    }
    let at = a.t();
    let ata = at.dot(&a);
    let atb = at.dot(&b);

    match gaussian_solve(ata, atb) {
        Ok(coeffs) => (coeffs[0], coeffs[1]),
        Err(_) => {
            // All points share the same perpendicular coordinate (a
            // purely axis-aligned cluster with zero spread): flat line
            // through the mean.
            let mean_primary = points.iter().map(|&(p, _)| p).sum::<f64>() / n as f64;
            (0.0, mean_primary)
        }
    }
}

/// Finds the modal inter-line spacing via density clustering, falling
/// back to `expected` when fewer than two lines are present.
fn modal_spacing(lines: &[GridLine], expected: f64) -> f64 {
    if lines.len() < 2 {
        return expected;
    }
    let diffs: Vec<f64> = lines.windows(2).map(|w| w[1].coord - w[0].coord).collect();
    let clusters = dbscan_1d(&diffs, expected * 0.3, 1);
    if clusters.is_empty() {
        return expected;
    }
    clusters
        .iter()
        .min_by(|a, b| {
            (a.mean - expected)
                .abs()
                .partial_cmp(&(b.mean - expected).abs())
                .unwrap()
        })
        .unwrap()
        .mean
}

/// Inserts a line at any gap that is an (approximate) multiple of
/// `spacing`, and drops a line that sits closer to its neighbour than
/// half the modal spacing — restoration is tried before removal at each
/// gap, per the documented tie-break. Synthetic lines borrow the
/// borrowed/weighted-mean slope so a restored line still tilts with its
/// neighbours.
fn restore_and_remove(lines: &mut Vec<GridLine>, spacing: f64, fallback_slope: f64, reference: f64) {
    if spacing <= 0.0 {
        return;
    }

    let mut i = 0;
    while i + 1 < lines.len() {
        let gap = lines[i + 1].coord - lines[i].coord;
        let multiple = (gap / spacing).round();
        if multiple >= 2.0 && (gap - multiple * spacing).abs() < spacing * 0.25 {
            let missing = multiple as usize - 1;
            for k in 1..=missing {
                let coord = lines[i].coord + spacing * k as f64;
                let intercept = coord - fallback_slope * reference;
                lines.insert(i + k, GridLine::at(fallback_slope, intercept, reference));
            }
            i += missing;
        } else if gap < spacing * 0.5 {
            lines.remove(i + 1);
            continue;
        }
        i += 1;
    }
}

/// Adds a boundary line at either end when the first/last fitted line
/// sits farther than one modal spacing from the canonical edge.
fn pad_boundaries(
    lines: &mut Vec<GridLine>,
    spacing: f64,
    canonical_size: f64,
    fallback_slope: f64,
    reference: f64,
) {
    if spacing <= 0.0 {
        return;
    }
    if let Some(first) = lines.first() {
        if first.coord > spacing {
            let coord = (first.coord - spacing).max(0.0);
            let intercept = coord - fallback_slope * reference;
            lines.insert(0, GridLine::at(fallback_slope, intercept, reference));
        }
    }
    if let Some(last) = lines.last() {
        if canonical_size - last.coord > spacing {
            let coord = (last.coord + spacing).min(canonical_size);
            let intercept = coord - fallback_slope * reference;
            lines.push(GridLine::at(fallback_slope, intercept, reference));
        }
    }
    while lines.len() > BOARD_SIZE {
        // Trim from whichever end sits farther from the canonical
        // boundary; this only triggers when padding over-corrected.
        let first_margin = lines[0].coord;
        let last_margin = canonical_size - lines[lines.len() - 1].coord;
        if first_margin > last_margin {
            lines.remove(0);
        } else {
            lines.pop();
        }
    }
}
