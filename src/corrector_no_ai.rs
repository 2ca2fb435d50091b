//! Heuristic ("noAI") corrector: turns a sequence of noisy per-frame
//! board observations into a move list by diffing consecutive states and
//! classifying the transition.
//!
//! Per consecutive pair, checked in priority order:
//! 1. No addition — no move emitted (steady state, or a capture already
//!    accounted for by an earlier pair).
//! 2. The side to move added exactly one more stone than the other
//!    side: its first addition leads, then the two sides' remaining
//!    additions interleave. Turn flips.
//! 3. Both sides added the same non-zero count: emitted as (turn,
//!    ¬turn) pairs in order; turn does not flip (net parity unchanged).
//! 4. Displacement: a colour's additions and removals balance exactly —
//!    the same stones reappeared at nearby intersections. Overwrites
//!    the last occurrence of each removed stone in the move list with
//!    its distance-minimising match, leaving the move count unchanged.
//! 5. Anything else is an ambiguous, rule-violation-shaped transition
//!    and is silently skipped rather than guessed at.

use kifu_vision::state::{BoardState, Cell};

use crate::sgf::{Color, Move};

#[derive(Debug, Clone, Default)]
pub(crate) struct Diff {
    pub(crate) appeared_black: Vec<(usize, usize)>,
    pub(crate) appeared_white: Vec<(usize, usize)>,
    pub(crate) disappeared_black: Vec<(usize, usize)>,
    pub(crate) disappeared_white: Vec<(usize, usize)>,
}

impl Diff {
    pub(crate) fn appeared_count(&self) -> usize {
        self.appeared_black.len() + self.appeared_white.len()
    }

    pub(crate) fn disappeared_count(&self) -> usize {
        self.disappeared_black.len() + self.disappeared_white.len()
    }

    pub(crate) fn added(&self, color: Color) -> &[(usize, usize)] {
        match color {
            Color::Black => &self.appeared_black,
            Color::White => &self.appeared_white,
        }
    }

    pub(crate) fn removed(&self, color: Color) -> &[(usize, usize)] {
        match color {
            Color::Black => &self.disappeared_black,
            Color::White => &self.disappeared_white,
        }
    }
}

pub(crate) fn differences(prev: &BoardState, curr: &BoardState) -> Diff {
    let mut diff = Diff::default();
    for (col, row, prev_cell) in prev.iter() {
        let curr_cell = curr.get(col, row);
        if prev_cell == curr_cell {
            continue;
        }
        match prev_cell {
            Cell::Black => diff.disappeared_black.push((col, row)),
            Cell::White => diff.disappeared_white.push((col, row)),
            Cell::Empty => {}
        }
        match curr_cell {
            Cell::Black => diff.appeared_black.push((col, row)),
            Cell::White => diff.appeared_white.push((col, row)),
            Cell::Empty => {}
        }
    }
    diff
}

fn distance(a: (usize, usize), b: (usize, usize)) -> i64 {
    (a.0 as i64 - b.0 as i64).abs() + (a.1 as i64 - b.1 as i64).abs()
}

/// Recursively enumerates every permutation of `0..n`, invoking `visit`
/// on each. The candidate sets this is ever called on are small by
/// construction (a handful of same-colour stones moving between two
/// adjacent frames), so a full enumeration stays cheap.
fn permutations(n: usize, visit: &mut impl FnMut(&[usize])) {
    let mut indices: Vec<usize> = (0..n).collect();
    permute_from(&mut indices, 0, visit);
}

fn permute_from(indices: &mut [usize], start: usize, visit: &mut impl FnMut(&[usize])) {
    if start == indices.len() {
        visit(indices);
        return;
    }
    for i in start..indices.len() {
        indices.swap(start, i);
        permute_from(indices, start + 1, visit);
        indices.swap(start, i);
    }
}

/// Finds the assignment of `disappeared[i] -> appeared[perm[i]]` that
/// minimizes total Manhattan distance, by full enumeration.
fn opt_permutation(
    disappeared: &[(usize, usize)],
    appeared: &[(usize, usize)],
) -> Option<(Vec<usize>, i64)> {
    if disappeared.len() != appeared.len() || disappeared.is_empty() {
        return None;
    }
    let mut best: Option<(Vec<usize>, i64)> = None;
    permutations(appeared.len(), &mut |perm| {
        let cost: i64 = disappeared
            .iter()
            .zip(perm.iter())
            .map(|(&from, &idx)| distance(from, appeared[idx]))
            .sum();
        if best.as_ref().map(|(_, c)| cost < *c).unwrap_or(true) {
            best = Some((perm.to_vec(), cost));
        }
    });
    best
}

/// A displacement is a camera-jitter-sized nudge: the same count of
/// same-colour stones reappear close enough to their previous cell that
/// no intersection move of that magnitude is a plausible play. Used by
/// the hybrid corrector to recognise jitter without consulting the
/// classifier.
const DISPLACEMENT_MAX_DISTANCE: i64 = 2;

/// True if this colour's appearances/disappearances are consistent with
/// a displacement: either nothing of this colour changed, or the same
/// count reappeared close enough to its previous cell.
pub(crate) fn is_displacement(disappeared: &[(usize, usize)], appeared: &[(usize, usize)]) -> bool {
    if disappeared.is_empty() && appeared.is_empty() {
        return true;
    }
    if disappeared.len() != appeared.len() {
        return false;
    }
    match opt_permutation(disappeared, appeared) {
        Some((_, total_cost)) => total_cost <= DISPLACEMENT_MAX_DISTANCE * disappeared.len() as i64,
        None => false,
    }
}

/// Runs the full heuristic corrector over an observed state sequence.
pub fn correct(states: &[BoardState]) -> Vec<Move> {
    let mut moves: Vec<Move> = Vec::new();
    let mut turn = Color::Black;

    for window in states.windows(2) {
        let (prev, curr) = (&window[0], &window[1]);
        let diff = differences(prev, curr);

        let add_turn = diff.added(turn);
        let add_other = diff.added(turn.opposite());

        // Case 1: nothing appeared this pair.
        if diff.appeared_count() == 0 {
            continue;
        }

        let delta = add_turn.len() as i64 - add_other.len() as i64;

        // Case 2: the side to move contributed exactly one more
        // addition than the other side.
        if delta == 1 {
            moves.push(Move::play(turn, add_turn[0].0, add_turn[0].1));
            for i in 0..add_other.len() {
                moves.push(Move::play(turn.opposite(), add_other[i].0, add_other[i].1));
                if let Some(&(col, row)) = add_turn.get(i + 1) {
                    moves.push(Move::play(turn, col, row));
                }
            }
            turn = turn.opposite();
            continue;
        }

        // Case 3: both sides added the same non-zero count.
        if !add_turn.is_empty() && add_turn.len() == add_other.len() {
            for i in 0..add_turn.len() {
                moves.push(Move::play(turn, add_turn[i].0, add_turn[i].1));
                moves.push(Move::play(turn.opposite(), add_other[i].0, add_other[i].1));
            }
            continue;
        }

        // Case 4: displacement, checked independently per colour.
        let mut displaced = false;
        for color in [Color::Black, Color::White] {
            let added = diff.added(color);
            let removed = diff.removed(color);
            if added.is_empty() || added.len() != removed.len() {
                continue;
            }
            let permuted = match opt_permutation(removed, added) {
                Some(p) => p,
                None => continue,
            };
            let (perm, _cost) = permuted;
            for (i, &from) in removed.iter().enumerate() {
                let to = added[perm[i]];
                if let Some(idx) = moves
                    .iter()
                    .rposition(|m| m.color == color && m.coord == Some(from))
                {
                    moves[idx] = Move::play(color, to.0, to.1);
                }
            }
            displaced = true;
        }
        if displaced {
            continue;
        }

        // Case 5: ambiguous / rule-violation-shaped transition.
        // Deliberately no move is emitted; the hybrid corrector handles
        // these with model assistance instead.
        log::warn!(
            "corrector_no_ai: skipping ambiguous transition ({} appeared, {} disappeared)",
            diff.appeared_count(),
            diff.disappeared_count()
        );
    }

    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(stones: &[(usize, usize, Cell)]) -> BoardState {
        let mut state = BoardState::new();
        for &(col, row, cell) in stones {
            state.set(col, row, cell);
        }
        state
    }

    #[test]
    fn test_simple_move() {
        let a = state_with(&[]);
        let b = state_with(&[(3, 3, Cell::Black)]);
        let moves = correct(&[a, b]);
        assert_eq!(moves, vec![Move::play(Color::Black, 3, 3)]);
    }

    #[test]
    fn test_capture() {
        let a = state_with(&[(3, 3, Cell::White), (4, 3, Cell::Black), (3, 4, Cell::Black)]);
        let b = state_with(&[(4, 3, Cell::Black), (3, 4, Cell::Black), (3, 2, Cell::Black)]);
        let moves = correct(&[a, b]);
        assert_eq!(moves, vec![Move::play(Color::Black, 3, 2)]);
    }

    #[test]
    fn test_displacement_overwrites_last_occurrence() {
        // A previously committed black move at (4,4) reappears at (4,5);
        // nothing else changes. The move list keeps the same length,
        // with the stale coordinate overwritten.
        let s0 = state_with(&[]);
        let s1 = state_with(&[(4, 4, Cell::Black)]);
        let s2 = state_with(&[(4, 5, Cell::Black)]);
        let moves = correct(&[s0, s1, s2]);
        assert_eq!(moves, vec![Move::play(Color::Black, 4, 5)]);
    }

    #[test]
    fn test_displacement_permutation_matches_nearest_pairs() {
        // Two black stones both nudge by one cell; the corrector must
        // match each removed stone to its nearest reappearance, not an
        // arbitrary pairing.
        let s0 = state_with(&[]);
        let s1 = state_with(&[(2, 2, Cell::Black), (10, 10, Cell::Black)]);
        let s2 = state_with(&[(2, 3, Cell::Black), (10, 11, Cell::Black)]);
        let moves = correct(&[s0, s1, s2]);
        let mut coords: Vec<_> = moves.iter().filter_map(|m| m.coord).collect();
        coords.sort();
        assert_eq!(coords, vec![(2, 3), (10, 11)]);
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn test_rapid_double() {
        let a = state_with(&[]);
        let b = state_with(&[(3, 3, Cell::Black), (15, 15, Cell::White)]);
        let moves = correct(&[a, b]);
        assert_eq!(
            moves,
            vec![
                Move::play(Color::Black, 3, 3),
                Move::play(Color::White, 15, 15),
            ]
        );
    }

    #[test]
    fn test_opt_permutation_finds_minimum() {
        let disappeared = vec![(0, 0), (5, 5)];
        let appeared = vec![(5, 6), (0, 1)];
        let (perm, cost) = opt_permutation(&disappeared, &appeared).unwrap();
        assert_eq!(perm, vec![1, 0]);
        assert_eq!(cost, 2);
    }
}
