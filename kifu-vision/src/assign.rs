//! Maps detected stone centres onto the fitted grid's intersections.

use crate::geometry::Point2;
use crate::grid::Grid;
use crate::state::{BoardState, Cell};

/// Assigns each black and white stone centre to its nearest grid
/// intersection. Black is processed before white, so a collision at the
/// same intersection resolves to white (the later-processed colour
/// wins).
pub fn assign_stones(grid: &Grid, black: &[Point2], white: &[Point2]) -> BoardState {
    let mut state = BoardState::new();

    for &p in black {
        let (col, row) = grid.nearest(p);
        state.set(col, row, Cell::Black);
    }
    for &p in white {
        let (col, row) = grid.nearest(p);
        state.set(col, row, Cell::White);
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridFitter;

    fn grid_600() -> Grid {
        let fitter = GridFitter::default();
        let axis: Vec<f64> = (0..19).map(|i| i as f64 * (600.0 / 18.0)).collect();
        let mut points = Vec::new();
        for &y in &axis {
            for &x in &axis {
                points.push(Point2::new(x, y));
            }
        }
        fitter.fit(&points).unwrap()
    }

    #[test]
    fn test_assign_single_stone() {
        let grid = grid_600();
        let black = vec![Point2::new(1.0, 1.0)];
        let state = assign_stones(&grid, &black, &[]);
        assert_eq!(state.get(0, 0), Cell::Black);
        assert_eq!(state.stone_count(), 1);
    }

    #[test]
    fn test_white_wins_collision() {
        let grid = grid_600();
        let p = Point2::new(1.0, 1.0);
        let state = assign_stones(&grid, &[p], &[p]);
        assert_eq!(state.get(0, 0), Cell::White);
    }
}
