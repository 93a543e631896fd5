//! Message vocabulary between a match client and the authoritative host.
//!
//! The host dispatches these in process; any transport carrying them would
//! send the same tagged JSON.

use ludo_core::{ActionRequest, GameEvent, GameState, PlayerId, RequestId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Start a new match with 2 to 4 players
    CreateMatch { player_count: usize },

    /// Submit a predicted action for authoritative application
    SubmitAction { match_id: Uuid, request: ActionRequest },

    /// Ask for the current authoritative state
    FetchState { match_id: Uuid },

    /// Throw the match away and deal a fresh one
    ResetMatch { match_id: Uuid, player_count: usize },

    /// Abandon a match
    LeaveMatch { match_id: Uuid },

    /// Request match list
    ListMatches,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Match created successfully
    MatchCreated { match_id: Uuid, state: GameState },

    /// Action applied; `state` is authoritative
    ActionAccepted {
        request: RequestId,
        events: Vec<GameEvent>,
        state: GameState,
    },

    /// Action refused; nothing changed on the server
    ActionRejected { request: RequestId, reason: String },

    /// Current authoritative state
    MatchState { match_id: Uuid, state: GameState },

    /// Match dealt again
    MatchReset { match_id: Uuid, state: GameState },

    /// Match removed
    LeftMatch { match_id: Uuid },

    /// List of running matches
    MatchList { matches: Vec<MatchInfo> },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,
}

/// Match summary for clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    pub id: Uuid,
    pub active_players: Vec<PlayerId>,
    pub chance_player: PlayerId,
    pub winners: Vec<PlayerId>,
    pub final_winner: Option<PlayerId>,
    pub actions_applied: u64,
    pub status: MatchStatus,
}

/// Match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    InProgress,
    Finished,
}
