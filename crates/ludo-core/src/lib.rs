//! Ludo - a four-player race game engine
//!
//! This crate provides the core game logic, including:
//! - Board topology: shared track, home stretches, safe and star cells
//! - Piece and player state
//! - Rule engine and turn state machine with full rule enforcement
//! - Optimistic prediction with rollback against an authoritative state
//!
//! # Architecture
//!
//! The engine is deterministic and platform-agnostic. Dice values are part
//! of the actions it applies, so the same action sequence always produces
//! the same state and the same ordered events. Rendering, pacing and
//! transport are left to the caller.
//!
//! # Modules
//!
//! - [`board`]: Cells, seats and step-by-step paths
//! - [`player`]: Pieces and players
//! - [`actions`]: Inputs, actions and events
//! - [`game`]: Game state machine
//! - [`reconcile`]: Prediction, confirmation and rollback
//! - [`bot`]: Computer players

pub mod actions;
pub mod board;
pub mod bot;
pub mod game;
pub mod player;
pub mod reconcile;

// Re-export commonly used types
pub use actions::{ActionKind, GameAction, GameEvent, PlayerInput};
pub use board::{Cell, PlayerId, HOME_TRAVEL, TRACK_LENGTH};
pub use bot::{Bot, BotDifficulty};
pub use game::{GameError, GameState, GameStateJson, PendingSelection, TurnPhase};
pub use player::{Piece, PieceId, Player};
pub use reconcile::{
    ActionRequest, PendingMove, Prediction, ReconcileError, ReconcileStats, Reconciler,
    RequestId, Resolution,
};
