//! Board coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side length of the square game board.
pub const BOARD_SIZE: u8 = 20;

/// A board cell. At most one reactor occupies a cell per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: u8,
    pub y: u8,
}

impl Cell {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Builds a cell from user coordinates, rejecting anything off a
    /// `board_size` x `board_size` board.
    pub fn checked(x: u32, y: u32, board_size: u8) -> Option<Self> {
        let size = u32::from(board_size);
        if x < size && y < size {
            Some(Self::new(x as u8, y as u8))
        } else {
            None
        }
    }

    pub fn in_bounds(&self, board_size: u8) -> bool {
        self.x < board_size && self.y < board_size
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_rejects_off_board() {
        assert_eq!(Cell::checked(19, 0, BOARD_SIZE), Some(Cell::new(19, 0)));
        assert_eq!(Cell::checked(20, 0, BOARD_SIZE), None);
        assert_eq!(Cell::checked(0, 300, BOARD_SIZE), None);
    }

    #[test]
    fn test_cell_key_format() {
        assert_eq!(Cell::new(5, 7).to_string(), "5:7");
    }
}
