//! Authoritative match host.

use crate::protocol::{ClientMessage, MatchInfo, MatchStatus, ServerMessage};
use crate::room::{MatchRoom, RoomError};
use dashmap::DashMap;
use ludo_core::{ActionRequest, GameEvent, GameState};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server state shared by every session.
pub struct ServerState {
    /// All running matches
    pub matches: DashMap<Uuid, MatchRoom>,
    /// Whether rooms roll their own dice
    server_dice: bool,
    /// Seed handed to the next room
    next_seed: AtomicU64,
}

impl ServerState {
    /// Rooms are seeded from `seed`, one after the other
    pub fn with_seed(seed: u64, server_dice: bool) -> Self {
        Self {
            matches: DashMap::new(),
            server_dice,
            next_seed: AtomicU64::new(seed),
        }
    }

    pub fn create_match(&self, player_count: usize) -> Result<(Uuid, GameState), RoomError> {
        let match_id = Uuid::new_v4();
        let seed = self.next_seed.fetch_add(1, Ordering::Relaxed);
        let room = MatchRoom::new(match_id, player_count, self.server_dice, seed)?;
        let state = room.game.clone();

        info!(
            "Match {} created for {:?}",
            match_id, state.active_players
        );
        self.matches.insert(match_id, room);
        Ok((match_id, state))
    }

    /// Apply a submitted action and return the authoritative result.
    pub fn submit(
        &self,
        match_id: Uuid,
        request: ActionRequest,
    ) -> Result<(Vec<GameEvent>, GameState), RoomError> {
        let mut room = self
            .matches
            .get_mut(&match_id)
            .ok_or(RoomError::MatchNotFound)?;

        match room.apply_action(request) {
            Ok(events) => {
                debug!(
                    "Match {} applied request {} from {}",
                    match_id, request.request, request.player
                );
                if room.status == MatchStatus::Finished {
                    info!(
                        "Match {} finished, champion {:?}",
                        match_id, room.game.final_winner
                    );
                }
                Ok((events, room.game.clone()))
            }
            Err(e @ RoomError::Corrupted(_)) => {
                error!("Match {} refused request {}: {}", match_id, request.request, e);
                Err(e)
            }
            Err(e) => {
                warn!("Match {} rejected request {}: {}", match_id, request.request, e);
                Err(e)
            }
        }
    }

    pub fn snapshot(&self, match_id: Uuid) -> Result<GameState, RoomError> {
        self.matches
            .get(&match_id)
            .map(|room| room.game.clone())
            .ok_or(RoomError::MatchNotFound)
    }

    pub fn reset_match(&self, match_id: Uuid, player_count: usize) -> Result<GameState, RoomError> {
        let mut room = self
            .matches
            .get_mut(&match_id)
            .ok_or(RoomError::MatchNotFound)?;
        room.reset(player_count)?;

        info!(
            "Match {} reset for {:?}",
            match_id, room.game.active_players
        );
        Ok(room.game.clone())
    }

    /// Remove a match. Returns false if it did not exist.
    pub fn remove_match(&self, match_id: Uuid) -> bool {
        let removed = self.matches.remove(&match_id).is_some();
        if removed {
            info!("Match {} removed", match_id);
        }
        removed
    }

    /// Get list of matches.
    pub fn list_matches(&self) -> Vec<MatchInfo> {
        self.matches.iter().map(|room| room.to_info()).collect()
    }

    /// Handle a client message and produce the reply.
    pub fn handle_message(&self, msg: ClientMessage) -> ServerMessage {
        match msg {
            ClientMessage::CreateMatch { player_count } => match self.create_match(player_count) {
                Ok((match_id, state)) => ServerMessage::MatchCreated { match_id, state },
                Err(e) => error_message(e),
            },

            ClientMessage::SubmitAction { match_id, request } => {
                match self.submit(match_id, request) {
                    Ok((events, state)) => ServerMessage::ActionAccepted {
                        request: request.request,
                        events,
                        state,
                    },
                    Err(RoomError::MatchNotFound) => error_message(RoomError::MatchNotFound),
                    Err(e) => ServerMessage::ActionRejected {
                        request: request.request,
                        reason: e.to_string(),
                    },
                }
            }

            ClientMessage::FetchState { match_id } => match self.snapshot(match_id) {
                Ok(state) => ServerMessage::MatchState { match_id, state },
                Err(e) => error_message(e),
            },

            ClientMessage::ResetMatch {
                match_id,
                player_count,
            } => match self.reset_match(match_id, player_count) {
                Ok(state) => ServerMessage::MatchReset { match_id, state },
                Err(e) => error_message(e),
            },

            ClientMessage::LeaveMatch { match_id } => {
                if self.remove_match(match_id) {
                    ServerMessage::LeftMatch { match_id }
                } else {
                    error_message(RoomError::MatchNotFound)
                }
            }

            ClientMessage::ListMatches => ServerMessage::MatchList {
                matches: self.list_matches(),
            },

            ClientMessage::Ping => ServerMessage::Pong,
        }
    }
}

fn error_message(e: RoomError) -> ServerMessage {
    ServerMessage::Error {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludo_core::{GameAction, PlayerId};

    fn roll(request: u64, player: PlayerId, value: u8) -> ActionRequest {
        ActionRequest {
            request,
            player,
            action: GameAction::RollDice { value },
        }
    }

    #[test]
    fn test_create_and_submit() {
        let server = ServerState::with_seed(11, false);
        let (match_id, state) = server.create_match(4).unwrap();
        assert_eq!(state, GameState::new_standard_4player());

        let (events, state) = server.submit(match_id, roll(1, PlayerId::One, 4)).unwrap();
        assert!(!events.is_empty());
        // Nothing to move: the turn passes straight away
        assert_eq!(state.chance_player, PlayerId::Two);
        assert_eq!(server.snapshot(match_id).unwrap(), state);
    }

    #[test]
    fn test_unknown_match() {
        let server = ServerState::with_seed(0, false);
        let missing = Uuid::new_v4();

        assert!(matches!(
            server.submit(missing, roll(1, PlayerId::One, 3)),
            Err(RoomError::MatchNotFound)
        ));
        assert!(server.snapshot(missing).is_err());
        assert!(!server.remove_match(missing));
    }

    #[test]
    fn test_handle_message_flow() {
        let server = ServerState::with_seed(5, false);

        let match_id = match server.handle_message(ClientMessage::CreateMatch { player_count: 4 }) {
            ServerMessage::MatchCreated { match_id, .. } => match_id,
            other => panic!("unexpected reply {:?}", other),
        };

        let reply = server.handle_message(ClientMessage::SubmitAction {
            match_id,
            request: roll(7, PlayerId::Three, 2),
        });
        assert!(matches!(reply, ServerMessage::ActionRejected { request: 7, .. }));

        let reply = server.handle_message(ClientMessage::SubmitAction {
            match_id,
            request: roll(8, PlayerId::One, 6),
        });
        assert!(matches!(reply, ServerMessage::ActionAccepted { request: 8, .. }));

        let reply = server.handle_message(ClientMessage::ResetMatch {
            match_id,
            player_count: 2,
        });
        match reply {
            ServerMessage::MatchReset { state, .. } => assert_eq!(state.active_players.len(), 2),
            other => panic!("unexpected reply {:?}", other),
        }

        assert_eq!(server.list_matches().len(), 1);
        assert!(matches!(
            server.handle_message(ClientMessage::LeaveMatch { match_id }),
            ServerMessage::LeftMatch { .. }
        ));
        assert!(server.list_matches().is_empty());
        assert!(matches!(
            server.handle_message(ClientMessage::Ping),
            ServerMessage::Pong
        ));
    }

    #[test]
    fn test_message_json_shape() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"CreateMatch","payload":{"player_count":3}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreateMatch { player_count: 3 }));

        let json = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(json["type"], "Pong");

        let server = ServerState::with_seed(2, false);
        let reply = server.handle_message(ClientMessage::CreateMatch { player_count: 4 });
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "MatchCreated");
        assert_eq!(json["payload"]["state"]["dice_no"], 0);

        let back: ServerMessage = serde_json::from_value(json).unwrap();
        match (reply, back) {
            (
                ServerMessage::MatchCreated { state: a, .. },
                ServerMessage::MatchCreated { state: b, .. },
            ) => assert_eq!(a, b),
            other => panic!("unexpected replies {:?}", other),
        }
    }
}
