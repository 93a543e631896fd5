//! AI bot players.
//!
//! This module provides two difficulty levels:
//! - Easy: Random valid inputs
//! - Medium: One-move lookahead scoring captures, finishing and safety

use crate::actions::{GameAction, GameEvent, PlayerInput};
use crate::board::{self, Cell, PlayerId};
use crate::game::GameState;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Bot difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotDifficulty {
    Easy,
    Medium,
}

/// A bot player that can decide on inputs
#[derive(Debug)]
pub struct Bot {
    pub player_id: PlayerId,
    pub difficulty: BotDifficulty,
    rng: StdRng,
}

impl Bot {
    pub fn new(player_id: PlayerId, difficulty: BotDifficulty) -> Self {
        Self {
            player_id,
            difficulty,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(player_id: PlayerId, difficulty: BotDifficulty, seed: u64) -> Self {
        Self {
            player_id,
            difficulty,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Choose an input from the valid inputs
    pub fn choose_input(&mut self, game: &GameState) -> Option<PlayerInput> {
        let valid_inputs = game.valid_inputs(self.player_id);
        if valid_inputs.is_empty() {
            return None;
        }

        match self.difficulty {
            BotDifficulty::Easy => valid_inputs.choose(&mut self.rng).copied(),
            BotDifficulty::Medium => self.choose_medium(game, &valid_inputs),
        }
    }

    /// Choose an input and draw the dice for it if it is a roll
    pub fn choose_action(&mut self, game: &GameState) -> Option<GameAction> {
        let input = self.choose_input(game)?;
        Some(input.into_action(&mut self.rng))
    }

    fn choose_medium(&mut self, game: &GameState, inputs: &[PlayerInput]) -> Option<PlayerInput> {
        // Rolling is never a choice between alternatives
        if inputs.contains(&PlayerInput::Roll) {
            return Some(PlayerInput::Roll);
        }

        let mut best: Vec<(i64, PlayerInput)> = Vec::new();
        for &input in inputs {
            let score = self.score_input(game, input);
            match best.first() {
                Some((top, _)) if score < *top => {}
                Some((top, _)) if score == *top => best.push((score, input)),
                _ => best = vec![(score, input)],
            }
        }

        best.choose(&mut self.rng).map(|(_, input)| *input)
    }

    /// Score an input by playing it on a copy of the game
    fn score_input(&self, game: &GameState, input: PlayerInput) -> i64 {
        let action = match input {
            PlayerInput::SelectPile(piece) => GameAction::SelectPile(piece),
            PlayerInput::SelectCell(piece) => GameAction::SelectCell(piece),
            PlayerInput::Roll => return 0,
        };

        let mut trial = game.clone();
        let events = match trial.apply_action(self.player_id, action) {
            Ok(events) => events,
            Err(_) => return i64::MIN,
        };

        let mut score = 0;
        for event in &events {
            score += match event {
                GameEvent::PieceCaptured { .. } => 100,
                GameEvent::PlayerFinished { .. } => 200,
                GameEvent::SafeLanding { .. } => 20,
                GameEvent::ExtraRoll { .. } => 10,
                _ => 0,
            };
        }

        if let PlayerInput::SelectCell(piece) = input {
            if let Some(moved) = trial.piece(piece) {
                if moved.is_home() {
                    score += 80;
                }
                // Prefer moving pieces that are far along
                score += i64::from(moved.travel);
                if moved.cell.is_shared() && !moved.cell.is_protected() {
                    score -= 15 * threatened_by(&trial, self.player_id, moved.cell) as i64;
                }
            }
        } else {
            score += 50;
        }

        score
    }
}

/// Number of opposing pieces within six cells behind `cell` on the track
fn threatened_by(game: &GameState, player: PlayerId, cell: Cell) -> usize {
    game.active_players
        .iter()
        .filter(|&&p| p != player)
        .flat_map(|&p| game.player(p).pieces_in_play())
        .filter(|piece| {
            (1..=6u8).any(|dice| {
                board::path(piece.id.player, piece.cell, dice)
                    .and_then(|steps| steps.last().copied())
                    == Some(cell)
            })
        })
        .count()
}
