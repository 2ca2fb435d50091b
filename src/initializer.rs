//! Establishes the first usable board state the scheduler hands off to
//! the correctors: either a strict, corner-sorted opening-position
//! reconstruction, or a transparent pass-through that just confirms the
//! sequence has started.

use kifu_vision::state::{BoardState, Cell};

use crate::sgf::{Color, Move};

/// Stones on a board with more than this many occupied intersections
/// can no longer be assumed to be an opening position; strict mode
/// refuses to guess at one.
const STRICT_MODE_STONE_LIMIT: usize = 10;

const BOARD_SIZE: i64 = 19;
const CORNERS: [(i64, i64); 4] = [
    (0, 0),
    (BOARD_SIZE - 1, 0),
    (BOARD_SIZE - 1, BOARD_SIZE - 1),
    (0, BOARD_SIZE - 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reconstructs the opening sequence from a low-stone-count starting
    /// frame. `side_to_move_hint` lets a handicap game seed the
    /// alternation at a colour other than black.
    Strict { side_to_move_hint: Color },
    /// Accepts whatever the first usable frame shows without trying to
    /// infer the moves that produced it.
    Transparent,
}

pub struct Initializer {
    mode: Mode,
}

impl Initializer {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Attempts to establish the initial position from `state`. Returns
    /// the prefix of moves the initialiser could reconstruct (empty in
    /// transparent mode), or `None` if strict mode can't make sense of
    /// this frame and the caller should fall back to transparent.
    pub fn initialize(&self, state: &BoardState) -> Option<Vec<Move>> {
        match self.mode {
            Mode::Transparent => Some(Vec::new()),
            Mode::Strict { side_to_move_hint } => self.initialize_strict(state, side_to_move_hint),
        }
    }

    fn initialize_strict(&self, state: &BoardState, side_to_move_hint: Color) -> Option<Vec<Move>> {
        let stones: Vec<(usize, usize, Color)> = state
            .iter()
            .filter_map(|(col, row, cell)| match cell {
                Cell::Black => Some((col, row, Color::Black)),
                Cell::White => Some((col, row, Color::White)),
                Cell::Empty => None,
            })
            .collect();

        if stones.len() >= STRICT_MODE_STONE_LIMIT {
            return None;
        }

        let mut sorted = stones;
        sorted.sort_by_key(|&(col, row, _)| nearest_corner_distance(col, row));

        let mut moves = Vec::with_capacity(sorted.len());
        let mut expected = side_to_move_hint;
        let mut passes = 0;

        for (col, row, observed_color) in sorted {
            while observed_color != expected {
                moves.push(Move::pass(expected));
                expected = expected.opposite();
                passes += 1;
                if passes > 2 {
                    // More mismatches than a plausible handicap setup
                    // explains; bail out to transparent mode instead of
                    // inventing an unbounded pass run.
                    return None;
                }
            }
            moves.push(Move::play(observed_color, col, row));
            expected = expected.opposite();
        }

        Some(moves)
    }
}

fn nearest_corner_distance(col: usize, row: usize) -> i64 {
    CORNERS
        .iter()
        .map(|&(cx, cy)| (col as i64 - cx).abs() + (row as i64 - cy).abs())
        .min()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_always_succeeds() {
        let init = Initializer::new(Mode::Transparent);
        let mut state = BoardState::new();
        for i in 0..15 {
            state.set(i, 0, Cell::Black);
        }
        assert_eq!(init.initialize(&state), Some(Vec::new()));
    }

    #[test]
    fn test_strict_fails_above_stone_limit() {
        let init = Initializer::new(Mode::Strict {
            side_to_move_hint: Color::Black,
        });
        let mut state = BoardState::new();
        for i in 0..10 {
            state.set(i, 0, Cell::Black);
        }
        assert_eq!(init.initialize(&state), None);
    }

    #[test]
    fn test_strict_alternates_from_corners() {
        let init = Initializer::new(Mode::Strict {
            side_to_move_hint: Color::Black,
        });
        let mut state = BoardState::new();
        state.set(0, 0, Cell::Black);
        state.set(18, 18, Cell::White);
        let moves = init.initialize(&state).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].color, Color::Black);
        assert_eq!(moves[1].color, Color::White);
    }

    #[test]
    fn test_strict_inserts_pass_on_mismatch() {
        let init = Initializer::new(Mode::Strict {
            side_to_move_hint: Color::Black,
        });
        let mut state = BoardState::new();
        // Nearest-corner stone is white, forcing a pass before it.
        state.set(0, 0, Cell::White);
        let moves = init.initialize(&state).unwrap();
        assert_eq!(moves[0], Move::pass(Color::Black));
        assert_eq!(moves[1], Move::play(Color::White, 0, 0));
    }
}
