//! Game actions that players can take.
//!
//! This module defines the player inputs, the actions the rule engine
//! applies, and the events that result from those actions.

use crate::board::{Cell, PlayerId};
use crate::game::GameError;
use crate::player::PieceId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// An input event from a player, before any dice are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerInput {
    /// Ask for a dice roll
    Roll,
    /// Release a pocketed piece after rolling a six
    SelectPile(PieceId),
    /// Advance a piece already in play
    SelectCell(PieceId),
}

impl PlayerInput {
    /// Turn the input into an action, drawing the dice value if needed
    pub fn into_action<R: Rng>(self, rng: &mut R) -> GameAction {
        match self {
            PlayerInput::Roll => GameAction::RollDice {
                value: rng.gen_range(1..=6),
            },
            PlayerInput::SelectPile(piece) => GameAction::SelectPile(piece),
            PlayerInput::SelectCell(piece) => GameAction::SelectCell(piece),
        }
    }
}

/// All actions the rule engine applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameAction {
    /// Apply a dice roll (1-6) drawn by whoever originated the action
    RollDice { value: u8 },
    /// Release a pocketed piece onto its start cell
    SelectPile(PieceId),
    /// Advance an in-play piece by the rolled value
    SelectCell(PieceId),
}

impl GameAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            GameAction::RollDice { .. } => ActionKind::Roll,
            GameAction::SelectPile(_) | GameAction::SelectCell(_) => ActionKind::Move,
        }
    }
}

/// Coarse classification used when tracking predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Roll,
    Move,
}

/// Events that occur as a result of actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// Dice were rolled
    DiceRolled { player: PlayerId, value: u8 },

    /// A piece moved one cell. Emitted once per unit step, in order.
    PieceMoved {
        piece: PieceId,
        from: Cell,
        to: Cell,
        travel: u8,
    },

    /// A piece was sent back to its pocket
    PieceCaptured {
        piece: PieceId,
        by: PieceId,
        cell: Cell,
        returned_to_pocket: bool,
    },

    /// A piece finished its move on a safe or star cell
    SafeLanding { piece: PieceId, cell: Cell },

    /// The roll left nothing to move; the turn resolves without a selection
    NoLegalMove { player: PlayerId, dice: u8 },

    /// The same player rolls again
    ExtraRoll { player: PlayerId },

    /// The turn passed to another player
    TurnChanged { player: PlayerId },

    /// A player brought all four pieces home
    PlayerFinished {
        player: PlayerId,
        /// 1 for the first player to finish
        finish_order: usize,
    },

    /// The match is over
    MatchOver { champion: PlayerId },

    /// An input was illegal and changed nothing
    ActionRejected { player: PlayerId, reason: GameError },
}
