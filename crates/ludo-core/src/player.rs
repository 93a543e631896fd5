//! Pieces and players.
//!
//! Every player owns exactly four pieces for the whole match. A capture
//! sends a piece back to its owner's pocket; ownership never changes.

use crate::board::{Cell, PlayerId, HOME_TRAVEL, PIECES_PER_PLAYER};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Piece identifier, displayed as the owner's tag and a 1-based index
/// ("A1".."D4")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PieceId {
    pub player: PlayerId,
    /// Zero-based index within the owner's pieces
    pub index: u8,
}

impl PieceId {
    pub fn new(player: PlayerId, index: u8) -> Self {
        Self { player, index }
    }

    /// Parse a display id such as "B3"
    pub fn parse(id: &str) -> Option<Self> {
        let mut chars = id.chars();
        let player = PlayerId::from_tag(chars.next()?)?;
        let number = chars.as_str().parse::<u8>().ok()?;
        if !(1..=PIECES_PER_PLAYER as u8).contains(&number) {
            return None;
        }
        Some(Self::new(player, number - 1))
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.player.tag(), self.index + 1)
    }
}

/// A single piece and where it stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub cell: Cell,
    /// Unit steps taken since release (0 in the pocket, 57 at home)
    pub travel: u8,
}

impl Piece {
    /// A new piece waiting in the pocket
    pub fn new(id: PieceId) -> Self {
        Self {
            id,
            cell: Cell::Pocket,
            travel: 0,
        }
    }

    pub fn is_in_pocket(&self) -> bool {
        self.cell == Cell::Pocket
    }

    pub fn is_home(&self) -> bool {
        matches!(self.cell, Cell::Home(_))
    }

    /// On the shared track or in the home stretch
    pub fn is_in_play(&self) -> bool {
        !self.is_in_pocket() && !self.is_home()
    }

    /// Whether a roll of `dice` can move this piece without overshooting home
    pub fn can_advance(&self, dice: u8) -> bool {
        !self.is_in_pocket()
            && self
                .travel
                .checked_add(dice)
                .is_some_and(|travel| travel <= HOME_TRAVEL)
    }

    /// Check the cell agrees with the travel count for the owner
    pub fn is_consistent(&self) -> bool {
        Cell::for_travel(self.id.player, self.travel) == Some(self.cell)
    }
}

/// A seat at the board and its four pieces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub pieces: [Piece; PIECES_PER_PLAYER],
}

impl Player {
    /// Create a player with every piece in the pocket
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            pieces: [0u8, 1, 2, 3].map(|index| Piece::new(PieceId::new(id, index))),
        }
    }

    /// Get a piece by its index
    pub fn piece(&self, index: u8) -> Option<&Piece> {
        self.pieces.get(index as usize)
    }

    pub(crate) fn piece_mut(&mut self, index: u8) -> Option<&mut Piece> {
        self.pieces.get_mut(index as usize)
    }

    /// Pieces on the track or in the stretch
    pub fn pieces_in_play(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.iter().filter(|p| p.is_in_play())
    }

    /// Pieces still waiting in the pocket
    pub fn pocketed(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.iter().filter(|p| p.is_in_pocket())
    }

    /// Number of pieces that have reached home
    pub fn pieces_home(&self) -> usize {
        self.pieces.iter().filter(|p| p.is_home()).count()
    }

    /// All four pieces are home
    pub fn all_home(&self) -> bool {
        self.pieces.iter().all(|p| p.travel == HOME_TRAVEL)
    }

    /// Sum of travel counts, a rough measure of progress
    pub fn total_travel(&self) -> u32 {
        self.pieces.iter().map(|p| u32::from(p.travel)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_has_four_pocketed_pieces() {
        let player = Player::new(PlayerId::Two);
        assert_eq!(player.pocketed().count(), 4);
        assert_eq!(player.pieces_in_play().count(), 0);
        assert!(!player.all_home());
        assert!(player.pieces.iter().all(|p| p.id.player == PlayerId::Two));
    }

    #[test]
    fn test_piece_id_display_and_parse() {
        let id = PieceId::new(PlayerId::Three, 1);
        assert_eq!(id.to_string(), "C2");
        assert_eq!(PieceId::parse("C2"), Some(id));
        assert_eq!(PieceId::parse("a1"), Some(PieceId::new(PlayerId::One, 0)));
        assert_eq!(PieceId::parse("E1"), None);
        assert_eq!(PieceId::parse("A5"), None);
        assert_eq!(PieceId::parse("A0"), None);
    }

    #[test]
    fn test_can_advance_respects_home() {
        let mut piece = Piece::new(PieceId::new(PlayerId::One, 0));
        assert!(!piece.can_advance(6));

        piece.travel = 54;
        piece.cell = Cell::for_travel(PlayerId::One, 54).unwrap();
        assert!(piece.is_consistent());
        assert!(piece.can_advance(3));
        assert!(!piece.can_advance(4));
    }

    #[test]
    fn test_can_advance_with_huge_dice() {
        let mut piece = Piece::new(PieceId::new(PlayerId::One, 0));
        piece.travel = 10;
        piece.cell = Cell::for_travel(PlayerId::One, 10).unwrap();

        assert!(!piece.can_advance(250));
        assert!(!piece.can_advance(u8::MAX));
    }
}
