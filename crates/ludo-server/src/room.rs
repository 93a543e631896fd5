//! Match room management.

use ludo_core::{ActionRequest, GameAction, GameError, GameEvent, GameState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{MatchInfo, MatchStatus};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Match not found")]
    MatchNotFound,

    #[error("Invalid action: {0}")]
    InvalidAction(GameError),

    #[error("Match state corrupted: {0}")]
    Corrupted(GameError),
}

impl From<GameError> for RoomError {
    fn from(e: GameError) -> Self {
        if e.is_illegal_input() {
            RoomError::InvalidAction(e)
        } else {
            RoomError::Corrupted(e)
        }
    }
}

/// One authoritative match.
#[derive(Debug)]
pub struct MatchRoom {
    pub id: Uuid,
    pub status: MatchStatus,
    pub game: GameState,
    /// Roll dice here instead of trusting the client's value
    pub server_dice: bool,
    pub actions_applied: u64,
    rng: StdRng,
}

impl MatchRoom {
    pub fn new(id: Uuid, player_count: usize, server_dice: bool, seed: u64) -> Result<Self, RoomError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let game = GameState::new_with_rng(player_count, &mut rng)?;

        Ok(Self {
            id,
            status: MatchStatus::InProgress,
            game,
            server_dice,
            actions_applied: 0,
            rng,
        })
    }

    /// Apply a submitted action. The room's state only changes when the
    /// action is legal and the result passes every invariant check.
    pub fn apply_action(&mut self, request: ActionRequest) -> Result<Vec<GameEvent>, RoomError> {
        let action = match request.action {
            GameAction::RollDice { .. } if self.server_dice => GameAction::RollDice {
                value: self.rng.gen_range(1..=6),
            },
            other => other,
        };

        let mut next = self.game.clone();
        let events = next.apply_action(request.player, action)?;
        next.check_invariants()?;

        self.game = next;
        self.actions_applied += 1;
        if self.game.is_finished() {
            self.status = MatchStatus::Finished;
        }

        Ok(events)
    }

    pub fn reset(&mut self, player_count: usize) -> Result<(), RoomError> {
        self.game.reset(player_count, &mut self.rng)?;
        self.status = MatchStatus::InProgress;
        self.actions_applied = 0;
        Ok(())
    }

    pub fn to_info(&self) -> MatchInfo {
        MatchInfo {
            id: self.id,
            active_players: self.game.active_players.clone(),
            chance_player: self.game.chance_player,
            winners: self.game.winners.clone(),
            final_winner: self.game.final_winner,
            actions_applied: self.actions_applied,
            status: self.status,
        }
    }
}
