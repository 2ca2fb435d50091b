use anyhow::Result;

use kifu::corrector_no_ai;
use kifu::corrector_with_ai;
use kifu::initializer::{Initializer, Mode};
use kifu::sgf::{self, Color, Move};
use kifu_vision::model::testing::StubClassifier;
use kifu_vision::state::{BoardState, Cell};

fn state_with(stones: &[(usize, usize, Cell)]) -> BoardState {
    let mut state = BoardState::new();
    for &(col, row, cell) in stones {
        state.set(col, row, cell);
    }
    state
}

#[test]
fn test_opening_three_moves() -> Result<()> {
    let states = vec![
        state_with(&[]),
        state_with(&[(3, 3, Cell::Black)]),
        state_with(&[(3, 3, Cell::Black), (15, 15, Cell::White)]),
        state_with(&[
            (3, 3, Cell::Black),
            (15, 15, Cell::White),
            (15, 3, Cell::Black),
        ]),
    ];

    let moves = corrector_no_ai::correct(&states);
    assert_eq!(
        moves,
        vec![
            Move::play(Color::Black, 3, 3),
            Move::play(Color::White, 15, 15),
            Move::play(Color::Black, 15, 3),
        ]
    );

    let sgf_text = sgf::emit(&moves);
    assert_eq!(sgf::parse(&sgf_text)?, moves);
    Ok(())
}

#[test]
fn test_rapid_double_between_sampled_frames() -> Result<()> {
    let states = vec![
        state_with(&[]),
        state_with(&[(3, 3, Cell::Black), (4, 4, Cell::White)]),
    ];
    let moves = corrector_no_ai::correct(&states);
    assert_eq!(
        moves,
        vec![
            Move::play(Color::Black, 3, 3),
            Move::play(Color::White, 4, 4),
        ]
    );
    Ok(())
}

#[test]
fn test_displacement_overwrites_committed_move_in_place() -> Result<()> {
    // Black plays (10,10), then the camera jitters and the same stone is
    // observed at (10,11) with nothing else on the board changing. The
    // move list must keep its length — the committed move is overwritten
    // with the corrected coordinate, not dropped or appended to.
    let states = vec![
        state_with(&[]),
        state_with(&[(10, 10, Cell::Black)]),
        state_with(&[(10, 11, Cell::Black)]),
    ];
    let moves = corrector_no_ai::correct(&states);
    assert_eq!(moves, vec![Move::play(Color::Black, 10, 11)]);
    Ok(())
}

#[test]
fn test_capture_only_emits_the_capturing_move() -> Result<()> {
    let states = vec![
        state_with(&[
            (1, 1, Cell::White),
            (0, 1, Cell::Black),
            (1, 0, Cell::Black),
        ]),
        state_with(&[
            (0, 1, Cell::Black),
            (1, 0, Cell::Black),
            (1, 2, Cell::Black),
        ]),
    ];
    let moves = corrector_no_ai::correct(&states);
    assert_eq!(moves, vec![Move::play(Color::Black, 1, 2)]);
    Ok(())
}

#[test]
fn test_ai_gap_fill_reconstructs_every_candidate() -> Result<()> {
    let states = vec![
        state_with(&[]),
        state_with(&[
            (3, 3, Cell::Black),
            (15, 15, Cell::White),
            (4, 4, Cell::Black),
            (14, 14, Cell::White),
        ]),
    ];
    let mut classifier = StubClassifier;
    let moves = corrector_with_ai::correct(&states, &mut classifier)?;
    assert_eq!(moves.len(), 4);
    assert_eq!(moves[0].color, Color::Black);
    assert_eq!(moves[1].color, Color::White);
    assert_eq!(moves[2].color, Color::Black);
    assert_eq!(moves[3].color, Color::White);
    Ok(())
}

#[test]
fn test_strict_mode_corner_initialization() -> Result<()> {
    let init = Initializer::new(Mode::Strict {
        side_to_move_hint: Color::Black,
    });
    let state = state_with(&[(0, 0, Cell::Black), (18, 18, Cell::White)]);
    let prefix = init.initialize(&state).expect("strict init should succeed");
    assert_eq!(
        prefix,
        vec![
            Move::play(Color::Black, 0, 0),
            Move::play(Color::White, 18, 18),
        ]
    );
    Ok(())
}

#[test]
fn test_strict_mode_falls_back_above_stone_limit() -> Result<()> {
    let init = Initializer::new(Mode::Strict {
        side_to_move_hint: Color::Black,
    });
    let mut stones = Vec::new();
    for i in 0..12 {
        stones.push((i, 0, Cell::Black));
    }
    let state = state_with(&stones);
    assert!(init.initialize(&state).is_none());
    Ok(())
}
