//! Core game state machine.
//!
//! This module contains the main `GameState` struct and all rule logic:
//! dice application, movable-piece computation, step-by-step movement,
//! captures, turn rotation and win detection.

use crate::actions::{GameAction, GameEvent, PlayerInput};
use crate::board::{self, Cell, PlayerId, BONUS_ROLL, HOME_TRAVEL};
use crate::player::{Piece, PieceId, Player};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Which kind of follow-up selection is expected after a roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingSelection {
    /// Pick a pocketed piece to release
    Pile,
    /// Pick an in-play piece to advance
    Cell,
}

/// Turn phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    /// The current player must roll
    AwaitingRoll,

    /// The current player must pick a piece
    AwaitingSelection {
        /// Value rolled this turn
        dice: u8,
        /// Pile or cell selection
        selection: PendingSelection,
    },

    /// Match is over
    GameOver { champion: PlayerId },
}

/// Errors that can occur when applying actions
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid action for current phase")]
    InvalidPhase,

    #[error("Input is locked while an action resolves")]
    InputLocked,

    #[error("Invalid dice value {0}")]
    InvalidDice(u8),

    #[error("Unknown piece")]
    UnknownPiece,

    #[error("Piece belongs to another player")]
    NotYourPiece,

    #[error("Piece cannot be selected with this roll")]
    PieceNotMovable,

    #[error("Game is over")]
    GameOver,

    #[error("A match needs 2 to 4 players, got {0}")]
    InvalidPlayerCount(usize),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl GameError {
    /// Rejected input that left the state untouched. Everything else is a
    /// defect in the engine.
    pub fn is_illegal_input(&self) -> bool {
        !matches!(self, GameError::InvariantViolation(_))
    }
}

/// JSON-friendly representation of the game state.
///
/// The occupancy index is derived data and is rebuilt on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateJson {
    pub players: Vec<Player>,
    pub active_players: Vec<PlayerId>,
    pub chance_player: PlayerId,
    pub dice_no: u8,
    pub input_locked: bool,
    pub phase: TurnPhase,
    pub winners: Vec<PlayerId>,
    pub final_winner: Option<PlayerId>,
    pub turn_number: u32,
}

/// The complete game state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GameStateJson", into = "GameStateJson")]
pub struct GameState {
    /// All four seats, indexed by `PlayerId::index`. Seats outside
    /// `active_players` keep their pieces in the pocket.
    players: Vec<Player>,
    /// Seats taking part in this match, in turn order
    pub active_players: Vec<PlayerId>,
    /// Whose turn it is
    pub chance_player: PlayerId,
    /// Last rolled value (0 before the first roll)
    pub dice_no: u8,
    /// Blocks re-entrant input while an action resolves
    pub input_locked: bool,
    /// Current turn phase
    pub phase: TurnPhase,
    /// Players who brought every piece home, in finishing order
    pub winners: Vec<PlayerId>,
    /// Champion, once the match is over
    pub final_winner: Option<PlayerId>,
    /// Turn number (starts at 1)
    pub turn_number: u32,
    /// Cell -> pieces standing there, sorted by id (pocket excluded)
    occupied: BTreeMap<Cell, Vec<PieceId>>,
}

impl TryFrom<GameStateJson> for GameState {
    type Error = GameError;

    /// Rebuilds the occupancy index and refuses states that break an
    /// invariant
    fn try_from(json: GameStateJson) -> Result<Self, Self::Error> {
        let mut state = Self {
            players: json.players,
            active_players: json.active_players,
            chance_player: json.chance_player,
            dice_no: json.dice_no,
            input_locked: json.input_locked,
            phase: json.phase,
            winners: json.winners,
            final_winner: json.final_winner,
            turn_number: json.turn_number,
            occupied: BTreeMap::new(),
        };
        state.occupied = state.build_index();
        state.check_invariants()?;
        Ok(state)
    }
}

impl From<GameState> for GameStateJson {
    fn from(state: GameState) -> Self {
        Self {
            players: state.players,
            active_players: state.active_players,
            chance_player: state.chance_player,
            dice_no: state.dice_no,
            input_locked: state.input_locked,
            phase: state.phase,
            winners: state.winners,
            final_winner: state.final_winner,
            turn_number: state.turn_number,
        }
    }
}

impl GameState {
    /// Create a new match for `player_count` players, drawing the seats at
    /// random
    pub fn new(player_count: usize) -> Result<Self, GameError> {
        Self::new_with_rng(player_count, &mut rand::thread_rng())
    }

    /// Create a new match using the given RNG for the seat draw
    pub fn new_with_rng<R: Rng>(player_count: usize, rng: &mut R) -> Result<Self, GameError> {
        Self::with_players(Self::draw_active_players(player_count, rng)?)
    }

    /// Create a new match for an explicit set of seats
    pub fn with_players(mut active_players: Vec<PlayerId>) -> Result<Self, GameError> {
        active_players.sort();
        active_players.dedup();
        if !(2..=4).contains(&active_players.len()) {
            return Err(GameError::InvalidPlayerCount(active_players.len()));
        }
        Ok(Self::fresh(active_players))
    }

    /// Create a standard 4-player match
    pub fn new_standard_4player() -> Self {
        Self::fresh(PlayerId::ALL.to_vec())
    }

    fn fresh(active_players: Vec<PlayerId>) -> Self {
        Self {
            players: PlayerId::ALL.iter().map(|&id| Player::new(id)).collect(),
            chance_player: active_players[0],
            active_players,
            dice_no: 0,
            input_locked: false,
            phase: TurnPhase::AwaitingRoll,
            winners: Vec::new(),
            final_winner: None,
            turn_number: 1,
            occupied: BTreeMap::new(),
        }
    }

    /// Pick the seats for a match.
    ///
    /// Two players sit diagonally (1 & 3 or 2 & 4), three players take a
    /// random three of the four seats, four players take every seat.
    pub fn draw_active_players<R: Rng>(
        player_count: usize,
        rng: &mut R,
    ) -> Result<Vec<PlayerId>, GameError> {
        match player_count {
            2 => {
                let pairs = [
                    [PlayerId::One, PlayerId::Three],
                    [PlayerId::Two, PlayerId::Four],
                ];
                Ok(pairs[rng.gen_range(0..pairs.len())].to_vec())
            }
            3 => {
                let left_out = *PlayerId::ALL
                    .choose(rng)
                    .ok_or(GameError::InvalidPlayerCount(player_count))?;
                Ok(PlayerId::ALL
                    .iter()
                    .copied()
                    .filter(|&p| p != left_out)
                    .collect())
            }
            4 => Ok(PlayerId::ALL.to_vec()),
            n => Err(GameError::InvalidPlayerCount(n)),
        }
    }

    /// Throw the current match away and start a fresh one
    pub fn reset<R: Rng>(&mut self, player_count: usize, rng: &mut R) -> Result<(), GameError> {
        *self = Self::new_with_rng(player_count, rng)?;
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON, rebuilding the occupancy index. States that
    /// break an invariant are refused.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    // ==================== Queries ====================

    /// All four seats
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Get a player by seat
    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id.index()]
    }

    /// Get a piece by id
    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.players.get(id.player.index())?.piece(id.index)
    }

    fn piece_mut(&mut self, id: PieceId) -> Result<&mut Piece, GameError> {
        self.players
            .get_mut(id.player.index())
            .and_then(|p| p.piece_mut(id.index))
            .ok_or(GameError::UnknownPiece)
    }

    /// Pieces standing on `cell`
    pub fn occupants(&self, cell: Cell) -> &[PieceId] {
        self.occupied.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_active(&self, player: PlayerId) -> bool {
        self.active_players.contains(&player)
    }

    /// Check if the match is finished
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, TurnPhase::GameOver { .. })
    }

    /// Get the champion if the match is finished
    pub fn champion(&self) -> Option<PlayerId> {
        self.final_winner
    }

    pub fn is_dice_rolled(&self) -> bool {
        matches!(self.phase, TurnPhase::AwaitingSelection { .. })
    }

    /// The follow-up selection currently expected, if any
    pub fn pending_selection(&self) -> Option<PendingSelection> {
        match self.phase {
            TurnPhase::AwaitingSelection { selection, .. } => Some(selection),
            _ => None,
        }
    }

    /// In-play pieces of `player` that can move `dice` steps
    pub fn movable_pieces(&self, player: PlayerId, dice: u8) -> BTreeSet<PieceId> {
        if !(1..=6).contains(&dice) {
            return BTreeSet::new();
        }
        self.player(player)
            .pieces
            .iter()
            .filter(|p| p.can_advance(dice))
            .map(|p| p.id)
            .collect()
    }

    /// A six with nothing in play lets the player release a pocketed piece
    pub fn can_release(&self, player: PlayerId, dice: u8) -> bool {
        let p = self.player(player);
        dice == BONUS_ROLL && p.pieces_in_play().next().is_none() && p.pocketed().next().is_some()
    }

    /// The selection a roll of `dice` calls for and the pieces it allows.
    /// `None` means the turn passes without input.
    pub fn legal_selection(
        &self,
        player: PlayerId,
        dice: u8,
    ) -> Option<(PendingSelection, BTreeSet<PieceId>)> {
        if self.can_release(player, dice) {
            let pocketed = self.player(player).pocketed().map(|p| p.id).collect();
            return Some((PendingSelection::Pile, pocketed));
        }

        let movable = self.movable_pieces(player, dice);
        if movable.is_empty() {
            None
        } else {
            Some((PendingSelection::Cell, movable))
        }
    }

    /// Get all currently valid inputs for a player
    pub fn valid_inputs(&self, player: PlayerId) -> Vec<PlayerInput> {
        if self.input_locked || player != self.chance_player {
            return Vec::new();
        }

        match self.phase {
            TurnPhase::GameOver { .. } => Vec::new(),
            TurnPhase::AwaitingRoll => vec![PlayerInput::Roll],
            TurnPhase::AwaitingSelection { dice, .. } => match self.legal_selection(player, dice) {
                Some((PendingSelection::Pile, pieces)) => {
                    pieces.into_iter().map(PlayerInput::SelectPile).collect()
                }
                Some((PendingSelection::Cell, pieces)) => {
                    pieces.into_iter().map(PlayerInput::SelectCell).collect()
                }
                None => Vec::new(),
            },
        }
    }

    // ==================== Transitions ====================

    /// Apply an action to the game state.
    ///
    /// Illegal input is rejected before anything is mutated.
    pub fn apply_action(
        &mut self,
        player: PlayerId,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, GameError> {
        match action {
            GameAction::RollDice { value } => self.roll_dice(player, value),
            GameAction::SelectPile(piece) => self.release_from_pocket(player, piece),
            GameAction::SelectCell(piece) => {
                let dice = match self.phase {
                    TurnPhase::AwaitingSelection { dice, .. } => dice,
                    _ => self.dice_no,
                };
                self.advance_piece(player, piece, dice)
            }
        }
    }

    /// Like `apply_action`, but illegal input becomes an `ActionRejected`
    /// event. Only invariant violations are returned as errors.
    pub fn dispatch(
        &mut self,
        player: PlayerId,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, GameError> {
        match self.apply_action(player, action) {
            Ok(events) => Ok(events),
            Err(reason) if reason.is_illegal_input() => {
                Ok(vec![GameEvent::ActionRejected { player, reason }])
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a roll. With nothing to select the turn resolves immediately.
    pub fn roll_dice(&mut self, player: PlayerId, value: u8) -> Result<Vec<GameEvent>, GameError> {
        self.check_turn(player)?;
        if self.phase != TurnPhase::AwaitingRoll {
            return Err(GameError::InvalidPhase);
        }
        if !(1..=6).contains(&value) {
            return Err(GameError::InvalidDice(value));
        }

        self.dice_no = value;
        let mut events = vec![GameEvent::DiceRolled { player, value }];

        match self.legal_selection(player, value) {
            Some((selection, _)) => {
                self.phase = TurnPhase::AwaitingSelection {
                    dice: value,
                    selection,
                };
            }
            None => {
                events.push(GameEvent::NoLegalMove {
                    player,
                    dice: value,
                });
                self.end_move(player, value, false, &mut events)?;
            }
        }

        Ok(events)
    }

    /// Release a pocketed piece onto the player's start cell. Always grants
    /// another roll.
    pub fn release_from_pocket(
        &mut self,
        player: PlayerId,
        piece: PieceId,
    ) -> Result<Vec<GameEvent>, GameError> {
        let dice = self.check_selection(player, piece, PendingSelection::Pile)?;

        let cell = self.relocate(piece, 1)?;
        let mut events = vec![GameEvent::PieceMoved {
            piece,
            from: Cell::Pocket,
            to: cell,
            travel: 1,
        }];
        self.resolve_landing(piece, cell, &mut events);
        self.end_move(player, dice, false, &mut events)?;

        Ok(events)
    }

    /// Advance an in-play piece `dice` unit steps, then resolve captures,
    /// finishing and the turn
    pub fn advance_piece(
        &mut self,
        player: PlayerId,
        piece: PieceId,
        dice: u8,
    ) -> Result<Vec<GameEvent>, GameError> {
        let rolled = self.check_selection(player, piece, PendingSelection::Cell)?;
        if dice != rolled {
            return Err(GameError::InvalidDice(dice));
        }

        let (from, travel) = {
            let p = self.piece(piece).ok_or(GameError::UnknownPiece)?;
            (p.cell, p.travel)
        };
        let steps = board::path(player, from, dice).ok_or_else(|| {
            GameError::InvariantViolation(format!("{} has no {}-step path from {}", piece, dice, from))
        })?;

        let mut events = Vec::with_capacity(steps.len() + 2);
        let mut previous = from;
        for (i, &to) in steps.iter().enumerate() {
            events.push(GameEvent::PieceMoved {
                piece,
                from: previous,
                to,
                travel: travel + i as u8 + 1,
            });
            previous = to;
        }

        let final_travel = travel + dice;
        let cell = self.relocate(piece, final_travel)?;
        if cell != previous {
            return Err(GameError::InvariantViolation(format!(
                "{} walked to {} but travel {} maps to {}",
                piece, previous, final_travel, cell
            )));
        }

        self.resolve_landing(piece, cell, &mut events);

        let reached_home = final_travel == HOME_TRAVEL;
        if reached_home {
            self.record_finish(player, &mut events);
        }
        self.end_move(player, dice, reached_home, &mut events)?;

        Ok(events)
    }

    /// The next active player after `current` who has not finished.
    ///
    /// The search is bounded by the number of active players; running out
    /// means the match should already be over.
    pub fn next_player(&self, current: PlayerId) -> Result<PlayerId, GameError> {
        let count = self.active_players.len();
        let position = self
            .active_players
            .iter()
            .position(|&p| p == current)
            .ok_or_else(|| {
                GameError::InvariantViolation(format!("{} is not in this match", current))
            })?;

        (1..count)
            .map(|offset| self.active_players[(position + offset) % count])
            .find(|candidate| !self.winners.contains(candidate))
            .ok_or_else(|| {
                GameError::InvariantViolation(format!(
                    "no player left to take the turn after {}",
                    current
                ))
            })
    }

    /// Place a piece directly at a travel count, bypassing movement rules.
    /// Used to set up positions for puzzles, replays and tests.
    pub fn place_piece(&mut self, piece: PieceId, travel: u8) -> Result<(), GameError> {
        self.relocate(piece, travel).map(|_| ())
    }

    /// Verify every invariant of the state
    pub fn check_invariants(&self) -> Result<(), GameError> {
        let violation = |msg: String| Err(GameError::InvariantViolation(msg));

        if self.players.len() != PlayerId::ALL.len() {
            return violation(format!("{} seats instead of 4", self.players.len()));
        }
        if !(2..=4).contains(&self.active_players.len()) {
            return violation(format!("{} players in the match", self.active_players.len()));
        }

        for (seat, player) in PlayerId::ALL.iter().zip(&self.players) {
            if player.id != *seat {
                return violation(format!("seat {} holds {}", seat, player.id));
            }
            for (index, piece) in (0u8..).zip(&player.pieces) {
                if piece.id != PieceId::new(player.id, index) {
                    return violation(format!("{} is held by {}", piece.id, player.id));
                }
                if !piece.is_consistent() {
                    return violation(format!(
                        "{} stands on {} with travel {}",
                        piece.id, piece.cell, piece.travel
                    ));
                }
                if !self.is_active(player.id) && !piece.is_in_pocket() {
                    return violation(format!("{} is on the board but not in the match", piece.id));
                }
            }
        }

        if self.build_index() != self.occupied {
            return violation("occupancy index diverged from the piece table".to_string());
        }
        if !self.is_active(self.chance_player) {
            return violation(format!("{} holds the turn but is not playing", self.chance_player));
        }
        if let Some(outsider) = self.winners.iter().find(|w| !self.is_active(**w)) {
            return violation(format!("{} won without playing", outsider));
        }
        if let Some(champion) = self.final_winner {
            if self.winners.first() != Some(&champion) {
                return violation(format!("{} crowned but did not finish first", champion));
            }
        }

        Ok(())
    }

    // ==================== Helper Methods ====================

    fn check_turn(&self, player: PlayerId) -> Result<(), GameError> {
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        if self.input_locked {
            return Err(GameError::InputLocked);
        }
        if player != self.chance_player {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    /// Validate a selection and return the rolled value
    fn check_selection(
        &self,
        player: PlayerId,
        piece: PieceId,
        expected: PendingSelection,
    ) -> Result<u8, GameError> {
        self.check_turn(player)?;

        let dice = match self.phase {
            TurnPhase::AwaitingSelection { dice, selection } if selection == expected => dice,
            _ => return Err(GameError::InvalidPhase),
        };

        if self.piece(piece).is_none() {
            return Err(GameError::UnknownPiece);
        }
        if piece.player != player {
            return Err(GameError::NotYourPiece);
        }

        match self.legal_selection(player, dice) {
            Some((selection, pieces)) if selection == expected && pieces.contains(&piece) => {
                Ok(dice)
            }
            _ => Err(GameError::PieceNotMovable),
        }
    }

    /// Move a piece to the cell matching `travel`, keeping the index in step
    fn relocate(&mut self, id: PieceId, travel: u8) -> Result<Cell, GameError> {
        let cell = Cell::for_travel(id.player, travel).ok_or_else(|| {
            GameError::InvariantViolation(format!("travel {} is off the board", travel))
        })?;

        let piece = self.piece_mut(id)?;
        let old = piece.cell;
        piece.cell = cell;
        piece.travel = travel;

        if old != Cell::Pocket {
            if let Some(ids) = self.occupied.get_mut(&old) {
                ids.retain(|&p| p != id);
                if ids.is_empty() {
                    self.occupied.remove(&old);
                }
            }
        }
        if cell != Cell::Pocket {
            let ids = self.occupied.entry(cell).or_default();
            if let Err(slot) = ids.binary_search(&id) {
                ids.insert(slot, id);
            }
        }

        Ok(cell)
    }

    /// Captures (or safe landing) once a move has finished on `cell`
    fn resolve_landing(&mut self, mover: PieceId, cell: Cell, events: &mut Vec<GameEvent>) {
        if cell.is_protected() {
            events.push(GameEvent::SafeLanding { piece: mover, cell });
            return;
        }
        if !cell.is_shared() {
            return;
        }

        let victims: Vec<PieceId> = self
            .occupants(cell)
            .iter()
            .copied()
            .filter(|id| id.player != mover.player)
            .collect();

        for victim in victims {
            // relocating to the pocket cannot fail for a known piece
            if self.relocate(victim, 0).is_ok() {
                events.push(GameEvent::PieceCaptured {
                    piece: victim,
                    by: mover,
                    cell,
                    returned_to_pocket: true,
                });
            }
        }
    }

    fn record_finish(&mut self, player: PlayerId, events: &mut Vec<GameEvent>) {
        if !self.player(player).all_home() || self.winners.contains(&player) {
            return;
        }

        self.winners.push(player);
        events.push(GameEvent::PlayerFinished {
            player,
            finish_order: self.winners.len(),
        });

        if self.winners.len() + 1 >= self.active_players.len() {
            let champion = self.winners[0];
            self.final_winner = Some(champion);
            self.phase = TurnPhase::GameOver { champion };
            events.push(GameEvent::MatchOver { champion });
        }
    }

    /// Resolve the turn after a roll or a move: roll again, or rotate
    fn end_move(
        &mut self,
        player: PlayerId,
        dice: u8,
        reached_home: bool,
        events: &mut Vec<GameEvent>,
    ) -> Result<(), GameError> {
        if self.is_finished() {
            return Ok(());
        }

        let bonus = dice == BONUS_ROLL || reached_home;
        if bonus && !self.winners.contains(&player) {
            self.phase = TurnPhase::AwaitingRoll;
            events.push(GameEvent::ExtraRoll { player });
            return Ok(());
        }

        let next = self.next_player(player)?;
        self.chance_player = next;
        self.phase = TurnPhase::AwaitingRoll;
        self.turn_number += 1;
        events.push(GameEvent::TurnChanged { player: next });
        Ok(())
    }

    fn build_index(&self) -> BTreeMap<Cell, Vec<PieceId>> {
        let mut index: BTreeMap<Cell, Vec<PieceId>> = BTreeMap::new();
        for piece in self.players.iter().flat_map(|p| p.pieces.iter()) {
            if !piece.is_in_pocket() {
                index.entry(piece.cell).or_default().push(piece.id);
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn piece(tag: &str) -> PieceId {
        PieceId::parse(tag).unwrap()
    }

    /// Put the match into a selection phase for `player` with `dice`
    fn rolled(game: &mut GameState, player: PlayerId, dice: u8) -> Vec<GameEvent> {
        game.chance_player = player;
        game.phase = TurnPhase::AwaitingRoll;
        game.roll_dice(player, dice).unwrap()
    }

    #[test]
    fn test_new_game_starts_awaiting_roll() {
        let game = GameState::new_standard_4player();
        assert_eq!(game.phase, TurnPhase::AwaitingRoll);
        assert_eq!(game.chance_player, PlayerId::One);
        assert_eq!(game.pending_selection(), None);
        assert!(!game.is_dice_rolled());
        assert!(game.check_invariants().is_ok());
    }

    #[test]
    fn test_six_with_everything_pocketed_requires_pile_selection() {
        let mut game = GameState::new_standard_4player();
        game.roll_dice(PlayerId::One, 6).unwrap();

        assert_eq!(game.pending_selection(), Some(PendingSelection::Pile));
        assert_eq!(
            game.valid_inputs(PlayerId::One),
            (0..4)
                .map(|i| PlayerInput::SelectPile(PieceId::new(PlayerId::One, i)))
                .collect::<Vec<_>>()
        );

        let events = game.apply_action(PlayerId::One, GameAction::SelectPile(piece("A1"))).unwrap();
        let a1 = game.piece(piece("A1")).unwrap();
        assert_eq!(a1.cell, Cell::Track(PlayerId::One.start_cell()));
        assert_eq!(a1.travel, 1);
        assert_eq!(game.chance_player, PlayerId::One);
        assert_eq!(game.phase, TurnPhase::AwaitingRoll);
        assert!(events.contains(&GameEvent::ExtraRoll { player: PlayerId::One }));
    }

    #[test]
    fn test_no_legal_move_passes_turn() {
        let mut game = GameState::new_standard_4player();
        let events = game.roll_dice(PlayerId::One, 4).unwrap();

        assert_eq!(
            events,
            vec![
                GameEvent::DiceRolled { player: PlayerId::One, value: 4 },
                GameEvent::NoLegalMove { player: PlayerId::One, dice: 4 },
                GameEvent::TurnChanged { player: PlayerId::Two },
            ]
        );
        assert_eq!(game.chance_player, PlayerId::Two);
        assert_eq!(game.turn_number, 2);
    }

    #[test]
    fn test_six_with_piece_in_play_moves_instead_of_releasing() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 10).unwrap();
        rolled(&mut game, PlayerId::One, 6);

        assert_eq!(game.pending_selection(), Some(PendingSelection::Cell));
        let err = game
            .apply_action(PlayerId::One, GameAction::SelectPile(piece("A2")))
            .unwrap_err();
        assert_eq!(err, GameError::InvalidPhase);
    }

    #[test]
    fn test_advance_emits_one_event_per_step() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 10).unwrap();
        rolled(&mut game, PlayerId::One, 3);

        let events = game.apply_action(PlayerId::One, GameAction::SelectCell(piece("A1"))).unwrap();
        let steps: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::PieceMoved { from, to, travel, .. } => Some((*from, *to, *travel)),
                _ => None,
            })
            .collect();
        assert_eq!(
            steps,
            vec![
                (Cell::Track(10), Cell::Track(11), 11),
                (Cell::Track(11), Cell::Track(12), 12),
                (Cell::Track(12), Cell::Track(13), 13),
            ]
        );
        let a1 = game.piece(piece("A1")).unwrap();
        assert_eq!((a1.cell, a1.travel), (Cell::Track(13), 13));
        assert_eq!(game.chance_player, PlayerId::Two);
    }

    #[test]
    fn test_advance_wraps_around_the_track() {
        let mut game = GameState::new_standard_4player();
        // Player 2 starts on 14; travel 38 is cell 51
        game.place_piece(piece("B1"), 38).unwrap();
        rolled(&mut game, PlayerId::Two, 3);
        game.apply_action(PlayerId::Two, GameAction::SelectCell(piece("B1"))).unwrap();

        let b1 = game.piece(piece("B1")).unwrap();
        assert_eq!((b1.cell, b1.travel), (Cell::Track(2), 41));
    }

    #[test]
    fn test_capture_sends_opponent_to_pocket() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 17).unwrap();
        // Player 2 starts on 14, so travel 7 is cell 20
        game.place_piece(piece("B2"), 7).unwrap();
        assert_eq!(game.piece(piece("B2")).unwrap().cell, Cell::Track(20));

        rolled(&mut game, PlayerId::One, 3);
        let events = game.apply_action(PlayerId::One, GameAction::SelectCell(piece("A1"))).unwrap();

        assert!(events.contains(&GameEvent::PieceCaptured {
            piece: piece("B2"),
            by: piece("A1"),
            cell: Cell::Track(20),
            returned_to_pocket: true,
        }));
        let b2 = game.piece(piece("B2")).unwrap();
        assert_eq!((b2.cell, b2.travel), (Cell::Pocket, 0));
        assert_eq!(game.occupants(Cell::Track(20)), &[piece("A1")]);
        assert!(game.check_invariants().is_ok());
    }

    #[test]
    fn test_no_capture_on_star_cell() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 5).unwrap();
        // Cell 9 is a star; player 4 starts on 40, travel 22 is cell 9
        game.place_piece(piece("D1"), 22).unwrap();

        rolled(&mut game, PlayerId::One, 4);
        let events = game.apply_action(PlayerId::One, GameAction::SelectCell(piece("A1"))).unwrap();

        assert!(events.contains(&GameEvent::SafeLanding {
            piece: piece("A1"),
            cell: Cell::Track(9),
        }));
        assert_eq!(game.piece(piece("D1")).unwrap().travel, 22);
        assert_eq!(game.occupants(Cell::Track(9)).len(), 2);
    }

    #[test]
    fn test_own_pieces_stack_without_capture() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 10).unwrap();
        game.place_piece(piece("A2"), 12).unwrap();
        rolled(&mut game, PlayerId::One, 2);
        let events = game.apply_action(PlayerId::One, GameAction::SelectCell(piece("A1"))).unwrap();

        assert!(!events.iter().any(|e| matches!(e, GameEvent::PieceCaptured { .. })));
        assert_eq!(game.occupants(Cell::Track(12)), &[piece("A1"), piece("A2")]);
        assert!(game.check_invariants().is_ok());
    }

    #[test]
    fn test_turning_point_enters_home_stretch() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 50).unwrap();
        rolled(&mut game, PlayerId::One, 3);
        game.apply_action(PlayerId::One, GameAction::SelectCell(piece("A1"))).unwrap();

        let a1 = game.piece(piece("A1")).unwrap();
        assert_eq!((a1.cell, a1.travel), (Cell::Stretch(PlayerId::One, 2), 53));
    }

    #[test]
    fn test_overshooting_piece_is_not_movable() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 55).unwrap();
        game.place_piece(piece("A2"), 20).unwrap();
        rolled(&mut game, PlayerId::One, 4);

        assert_eq!(
            game.movable_pieces(PlayerId::One, 4),
            BTreeSet::from([piece("A2")])
        );
        let before = game.clone();
        let err = game
            .apply_action(PlayerId::One, GameAction::SelectCell(piece("A1")))
            .unwrap_err();
        assert_eq!(err, GameError::PieceNotMovable);
        assert_eq!(game, before);
    }

    #[test]
    fn test_reaching_home_grants_extra_roll() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 54).unwrap();
        rolled(&mut game, PlayerId::One, 3);
        let events = game.apply_action(PlayerId::One, GameAction::SelectCell(piece("A1"))).unwrap();

        assert!(game.piece(piece("A1")).unwrap().is_home());
        assert!(events.contains(&GameEvent::ExtraRoll { player: PlayerId::One }));
        assert_eq!(game.chance_player, PlayerId::One);
    }

    #[test]
    fn test_rejects_wrong_player_and_foreign_piece() {
        let mut game = GameState::new_standard_4player();
        assert_eq!(game.roll_dice(PlayerId::Two, 3), Err(GameError::NotYourTurn));
        assert_eq!(game.roll_dice(PlayerId::One, 7), Err(GameError::InvalidDice(7)));

        game.place_piece(piece("A1"), 10).unwrap();
        game.place_piece(piece("B1"), 10).unwrap();
        rolled(&mut game, PlayerId::One, 2);
        assert_eq!(
            game.apply_action(PlayerId::One, GameAction::SelectCell(piece("B1"))),
            Err(GameError::NotYourPiece)
        );
        assert_eq!(
            game.apply_action(PlayerId::One, GameAction::RollDice { value: 2 }),
            Err(GameError::InvalidPhase)
        );
    }

    #[test]
    fn test_dispatch_turns_illegal_input_into_event() {
        let mut game = GameState::new_standard_4player();
        let before = game.clone();
        let events = game.dispatch(PlayerId::Three, GameAction::RollDice { value: 2 }).unwrap();

        assert_eq!(
            events,
            vec![GameEvent::ActionRejected {
                player: PlayerId::Three,
                reason: GameError::NotYourTurn,
            }]
        );
        assert_eq!(game, before);
    }

    #[test]
    fn test_locked_input_is_rejected() {
        let mut game = GameState::new_standard_4player();
        game.input_locked = true;
        assert_eq!(game.roll_dice(PlayerId::One, 3), Err(GameError::InputLocked));
        assert!(game.valid_inputs(PlayerId::One).is_empty());
    }

    #[test]
    fn test_next_player_skips_winners() {
        let mut game = GameState::new_standard_4player();
        game.winners = vec![PlayerId::Two, PlayerId::Three];
        assert_eq!(game.next_player(PlayerId::One), Ok(PlayerId::Four));
        assert_eq!(game.next_player(PlayerId::Four), Ok(PlayerId::One));
    }

    #[test]
    fn test_next_player_without_candidates_is_invariant_violation() {
        let mut game = GameState::with_players(vec![PlayerId::One, PlayerId::Three]).unwrap();
        game.winners = vec![PlayerId::Three];
        assert!(matches!(
            game.next_player(PlayerId::One),
            Err(GameError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_draw_active_players() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pairs = BTreeSet::new();
        let mut left_out = BTreeSet::new();
        for _ in 0..50 {
            let two = GameState::draw_active_players(2, &mut rng).unwrap();
            assert!(
                two == vec![PlayerId::One, PlayerId::Three]
                    || two == vec![PlayerId::Two, PlayerId::Four]
            );
            pairs.insert(two);

            let three = GameState::draw_active_players(3, &mut rng).unwrap();
            assert_eq!(three.len(), 3);
            let missing: Vec<PlayerId> = PlayerId::ALL
                .iter()
                .copied()
                .filter(|p| !three.contains(p))
                .collect();
            assert_eq!(missing.len(), 1);
            left_out.insert(missing[0]);
        }
        // Draws vary from match to match
        assert_eq!(pairs.len(), 2);
        assert!(left_out.len() >= 2);

        assert_eq!(GameState::draw_active_players(4, &mut rng).unwrap(), PlayerId::ALL.to_vec());
        assert_eq!(
            GameState::draw_active_players(5, &mut rng),
            Err(GameError::InvalidPlayerCount(5))
        );
    }

    #[test]
    fn test_reset_redraws_seats() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut game = GameState::new_standard_4player();
        let mut seen = BTreeSet::new();
        for _ in 0..40 {
            game.reset(2, &mut rng).unwrap();
            assert_eq!(game.chance_player, game.active_players[0]);
            seen.insert(game.active_players.clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 30).unwrap();
        game.winners.push(PlayerId::Two);

        game.reset(4, &mut rng).unwrap();
        let once = game.clone();
        game.reset(4, &mut rng).unwrap();
        assert_eq!(game, once);
        assert_eq!(game, GameState::new_standard_4player());
    }

    #[test]
    fn test_json_round_trip_rebuilds_index() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 10).unwrap();
        game.place_piece(piece("C3"), 36).unwrap();

        let restored = GameState::from_json(&game.to_json().unwrap()).unwrap();
        assert_eq!(restored.occupants(Cell::Track(10)), &[piece("A1"), piece("C3")]);
        assert!(restored.check_invariants().is_ok());
    }

    #[test]
    fn test_from_json_refuses_impossible_states() {
        let game = GameState::new_standard_4player();
        let valid: serde_json::Value = serde_json::from_str(&game.to_json().unwrap()).unwrap();

        let mut no_seats = valid.clone();
        no_seats["players"] = serde_json::json!([]);
        assert!(GameState::from_json(&no_seats.to_string()).is_err());

        let mut outsider_turn = valid.clone();
        outsider_turn["active_players"] = serde_json::json!(["One", "Three"]);
        outsider_turn["chance_player"] = serde_json::json!("Two");
        assert!(GameState::from_json(&outsider_turn.to_string()).is_err());

        let mut bad_travel = valid.clone();
        bad_travel["players"][0]["pieces"][0]["travel"] = serde_json::json!(12);
        assert!(GameState::from_json(&bad_travel.to_string()).is_err());

        assert_eq!(GameState::from_json(&valid.to_string()).unwrap(), game);
    }

    #[test]
    fn test_check_invariants_catches_misnumbered_pieces() {
        let mut game = GameState::new_standard_4player();
        game.players[0].pieces[1].id = PieceId::new(PlayerId::One, 3);
        assert!(matches!(
            game.check_invariants(),
            Err(GameError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_movable_pieces_with_out_of_range_dice() {
        let mut game = GameState::new_standard_4player();
        game.place_piece(piece("A1"), 10).unwrap();

        assert!(game.movable_pieces(PlayerId::One, 250).is_empty());
        assert!(game.movable_pieces(PlayerId::One, u8::MAX).is_empty());
        assert!(game.movable_pieces(PlayerId::One, 0).is_empty());
        assert!(game.legal_selection(PlayerId::One, 200).is_none());
    }
}
