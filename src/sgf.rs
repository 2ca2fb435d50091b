//! SGF move-list emission and parsing.
//!
//! Coordinate convention: column char is `'a' + col`, row char is
//! `'a' + (18 - row)` — chosen so the bottom-left intersection (the
//! usual board-coordinate origin) maps to SGF's top-left-origin `aa`.

use thiserror::Error;

use kifu_vision::state::BOARD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    fn tag(self) -> char {
        match self {
            Color::Black => 'B',
            Color::White => 'W',
        }
    }
}

/// A single recorded move. `coord` is `None` for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub color: Color,
    pub coord: Option<(usize, usize)>,
}

impl Move {
    pub fn play(color: Color, col: usize, row: usize) -> Self {
        Self {
            color,
            coord: Some((col, row)),
        }
    }

    pub fn pass(color: Color) -> Self {
        Self { color, coord: None }
    }
}

#[derive(Debug, Error)]
pub enum SgfError {
    #[error("unexpected token at byte offset {0}: {1:?}")]
    UnexpectedToken(usize, String),

    #[error("invalid coordinate {0:?}")]
    InvalidCoordinate(String),

    #[error("coordinate out of board range: col={0}, row={1}")]
    OutOfRange(usize, usize),
}

fn indices_to_sgf_coords(col: usize, row: usize) -> Result<String, SgfError> {
    if col >= BOARD_SIZE || row >= BOARD_SIZE {
        return Err(SgfError::OutOfRange(col, row));
    }
    let col_char = (b'a' + col as u8) as char;
    let row_char = (b'a' + (BOARD_SIZE - 1 - row) as u8) as char;
    Ok(format!("{col_char}{row_char}"))
}

fn sgf_coords_to_indices(text: &str) -> Result<(usize, usize), SgfError> {
    let bytes = text.as_bytes();
    if bytes.len() != 2 {
        return Err(SgfError::InvalidCoordinate(text.to_string()));
    }
    let col = (bytes[0] as i64) - (b'a' as i64);
    let row_from_top = (bytes[1] as i64) - (b'a' as i64);
    if !(0..BOARD_SIZE as i64).contains(&col) || !(0..BOARD_SIZE as i64).contains(&row_from_top) {
        return Err(SgfError::InvalidCoordinate(text.to_string()));
    }
    let row = BOARD_SIZE as i64 - 1 - row_from_top;
    Ok((col as usize, row as usize))
}

/// Emits a full SGF game record for `moves`.
pub fn emit(moves: &[Move]) -> String {
    let mut out = String::from("(;GM[1]FF[4]CA[UTF-8]SZ[19]");
    for mv in moves {
        out.push(';');
        out.push(mv.color.tag());
        match mv.coord {
            Some((col, row)) => {
                // Coordinates are validated at assignment time by the
                // stone assigner; a move built outside [0, 19) here would
                // be a caller bug, so emit without re-validating.
                let coords =
                    indices_to_sgf_coords(col, row).unwrap_or_else(|_| String::from(""));
                out.push('[');
                out.push_str(&coords);
                out.push(']');
            }
            None => out.push_str("[]"),
        }
    }
    out.push(')');
    out
}

/// Parses an SGF move record back into the move list `emit` would have
/// produced for it.
pub fn parse(text: &str) -> Result<Vec<Move>, SgfError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);

    let mut moves = Vec::new();
    for node in inner.split(';') {
        let node = node.trim();
        if node.is_empty() || !(node.starts_with('B') || node.starts_with('W')) {
            continue;
        }
        let color = match node.as_bytes()[0] {
            b'B' => Color::Black,
            b'W' => Color::White,
            _ => unreachable!(),
        };

        let open = node
            .find('[')
            .ok_or_else(|| SgfError::UnexpectedToken(0, node.to_string()))?;
        let close = node
            .find(']')
            .ok_or_else(|| SgfError::UnexpectedToken(0, node.to_string()))?;
        let coord_text = &node[open + 1..close];

        let coord = if coord_text.is_empty() {
            None
        } else {
            Some(sgf_coords_to_indices(coord_text)?)
        };

        moves.push(Move { color, coord });
    }

    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_round_trip() {
        for col in 0..BOARD_SIZE {
            for row in 0..BOARD_SIZE {
                let sgf = indices_to_sgf_coords(col, row).unwrap();
                let (c, r) = sgf_coords_to_indices(&sgf).unwrap();
                assert_eq!((c, r), (col, row));
            }
        }
    }

    #[test]
    fn test_corner_mapping() {
        assert_eq!(indices_to_sgf_coords(0, 18).unwrap(), "aa");
        assert_eq!(indices_to_sgf_coords(18, 0).unwrap(), "sa");
    }

    #[test]
    fn test_emit_parse_round_trip() {
        let moves = vec![
            Move::play(Color::Black, 3, 3),
            Move::play(Color::White, 15, 15),
            Move::pass(Color::Black),
            Move::play(Color::White, 9, 9),
        ];
        let text = emit(&moves);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed, moves);
    }

    #[test]
    fn test_parse_rejects_short_coord() {
        assert!(sgf_coords_to_indices("a").is_err());
    }
}
