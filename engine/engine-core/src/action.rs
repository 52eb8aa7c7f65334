//! The four grid moves and their fixed wire codes.

use crate::error::EngineError;
use std::fmt;

/// A unit move on the grid. Discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Action {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Action {
    /// All actions in code order. Q-table rows use the same order.
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Number of distinct actions (width of a Q-table row).
    pub const COUNT: usize = 4;

    /// Decode a wire code. Anything outside `0..=3` is an invalid action.
    pub fn from_code(code: i64) -> Result<Self, EngineError> {
        match code {
            0 => Ok(Action::Up),
            1 => Ok(Action::Down),
            2 => Ok(Action::Left),
            3 => Ok(Action::Right),
            other => Err(EngineError::InvalidAction(other)),
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Column index of this action in a Q-table row.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Row and column offsets of the move.
    #[inline]
    pub fn delta(self) -> (isize, isize) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }
}

impl TryFrom<i64> for Action {
    type Error = EngineError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Action::from_code(code)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Up => "UP",
            Action::Down => "DOWN",
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
        };
        f.write_str(name)
    }
}
