//! Board topology: the shared track, the private home stretches, and the
//! cells where capturing is disallowed.
//!
//! This module contains:
//! - Player seats and their start cells / turning points
//! - The `Cell` type covering pocket, shared track, stretch and home
//! - Step-by-step path computation used by the rule engine
//!
//! Travel counts are the single source of truth for where a piece stands:
//!
//! ```text
//! travel 0        pocket
//! travel 1..=51   shared track, starting at the owner's start cell
//! travel 51       the owner's turning point
//! travel 52..=56  home stretch cells 1..=5 (private to the owner)
//! travel 57       home
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of cells on the shared track
pub const TRACK_LENGTH: u8 = 52;

/// Number of cells in each private home stretch (home itself excluded)
pub const HOME_STRETCH_LENGTH: u8 = 5;

/// Travel count of a piece that has reached home
pub const HOME_TRAVEL: u8 = 57;

/// Travel count of a piece standing on its owner's turning point
pub const TURNING_TRAVEL: u8 = HOME_TRAVEL - HOME_STRETCH_LENGTH - 1;

/// Pieces owned by every player
pub const PIECES_PER_PLAYER: usize = 4;

/// The roll that releases a piece from the pocket and grants another roll
pub const BONUS_ROLL: u8 = 6;

/// Cells between two consecutive start cells
const SEAT_SPACING: u8 = 13;

/// Start cells. Capturing is not possible here.
pub const SAFE_CELLS: [u8; 4] = [1, 14, 27, 40];

/// Star cells, eight cells past every start. Capturing is not possible here.
pub const STAR_CELLS: [u8; 4] = [9, 22, 35, 48];

/// Player seat. Seats are fixed around the board; a match uses two, three
/// or all four of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlayerId {
    One,
    Two,
    Three,
    Four,
}

impl PlayerId {
    /// All seats in turn order
    pub const ALL: [PlayerId; 4] = [
        PlayerId::One,
        PlayerId::Two,
        PlayerId::Three,
        PlayerId::Four,
    ];

    /// Player number (1-4)
    pub fn number(self) -> u8 {
        match self {
            PlayerId::One => 1,
            PlayerId::Two => 2,
            PlayerId::Three => 3,
            PlayerId::Four => 4,
        }
    }

    /// Seat from a player number (1-4)
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(PlayerId::One),
            2 => Some(PlayerId::Two),
            3 => Some(PlayerId::Three),
            4 => Some(PlayerId::Four),
            _ => None,
        }
    }

    /// Seat from a piece tag ('A'-'D')
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag.to_ascii_uppercase() {
            'A' => Some(PlayerId::One),
            'B' => Some(PlayerId::Two),
            'C' => Some(PlayerId::Three),
            'D' => Some(PlayerId::Four),
            _ => None,
        }
    }

    /// Letter used in piece ids ("A1".."D4")
    pub fn tag(self) -> char {
        match self {
            PlayerId::One => 'A',
            PlayerId::Two => 'B',
            PlayerId::Three => 'C',
            PlayerId::Four => 'D',
        }
    }

    /// Zero-based seat index
    pub fn index(self) -> usize {
        self.number() as usize - 1
    }

    /// Shared-track cell where released pieces enter the board
    pub fn start_cell(self) -> u8 {
        1 + SEAT_SPACING * (self.number() - 1)
    }

    /// Shared-track cell where this player's pieces leave the loop
    pub fn turning_point(self) -> u8 {
        wrap_track(u16::from(self.start_cell()) + u16::from(TURNING_TRAVEL) - 1)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.number())
    }
}

/// Map any positive shared-track number onto 1..=52
pub fn wrap_track(cell: u16) -> u8 {
    let length = u16::from(TRACK_LENGTH);
    ((cell + length - 1) % length + 1) as u8
}

/// A place a piece can stand on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Off the board, waiting for a release roll
    Pocket,
    /// Shared track cell (1-52)
    Track(u8),
    /// Home stretch cell (1-5) owned by a single player
    Stretch(PlayerId, u8),
    /// Final cell
    Home(PlayerId),
}

impl Cell {
    /// Cell occupied by `player`'s piece after `travel` steps, if `travel`
    /// is in range
    pub fn for_travel(player: PlayerId, travel: u8) -> Option<Cell> {
        match travel {
            0 => Some(Cell::Pocket),
            1..=TURNING_TRAVEL => Some(Cell::Track(wrap_track(
                u16::from(player.start_cell()) + u16::from(travel) - 1,
            ))),
            t if t < HOME_TRAVEL => Some(Cell::Stretch(player, t - TURNING_TRAVEL)),
            HOME_TRAVEL => Some(Cell::Home(player)),
            _ => None,
        }
    }

    /// The next cell one unit step ahead for a piece owned by `player`.
    ///
    /// Pocket and home have no successor: leaving the pocket is a release,
    /// not a step.
    pub fn next(self, player: PlayerId) -> Option<Cell> {
        match self {
            Cell::Pocket | Cell::Home(_) => None,
            Cell::Track(cell) if cell == player.turning_point() => Some(Cell::Stretch(player, 1)),
            Cell::Track(cell) => Some(Cell::Track(wrap_track(u16::from(cell) + 1))),
            Cell::Stretch(owner, step) if step < HOME_STRETCH_LENGTH => {
                Some(Cell::Stretch(owner, step + 1))
            }
            Cell::Stretch(owner, _) => Some(Cell::Home(owner)),
        }
    }

    /// Start cell
    pub fn is_safe(&self) -> bool {
        matches!(self, Cell::Track(cell) if SAFE_CELLS.contains(cell))
    }

    /// Star cell
    pub fn is_star(&self) -> bool {
        matches!(self, Cell::Track(cell) if STAR_CELLS.contains(cell))
    }

    /// No capture can happen on this cell
    pub fn is_protected(&self) -> bool {
        self.is_safe() || self.is_star()
    }

    /// Cell on the shared track
    pub fn is_shared(&self) -> bool {
        matches!(self, Cell::Track(_))
    }

    /// The player this cell is private to, if any
    pub fn owner(&self) -> Option<PlayerId> {
        match self {
            Cell::Stretch(owner, _) | Cell::Home(owner) => Some(*owner),
            Cell::Pocket | Cell::Track(_) => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Pocket => write!(f, "pocket"),
            Cell::Track(cell) => write!(f, "{}", cell),
            Cell::Stretch(owner, step) => write!(f, "{}-stretch-{}", owner.tag(), step),
            Cell::Home(owner) => write!(f, "{}-home", owner.tag()),
        }
    }
}

/// Ordered cells visited by `player`'s piece moving `dice` unit steps from
/// `from`. Returns `None` if the move would overshoot home or starts from
/// the pocket.
pub fn path(player: PlayerId, from: Cell, dice: u8) -> Option<Vec<Cell>> {
    let mut steps = Vec::with_capacity(dice as usize);
    let mut current = from;
    for _ in 0..dice {
        current = current.next(player)?;
        steps.push(current);
    }
    Some(steps)
}
