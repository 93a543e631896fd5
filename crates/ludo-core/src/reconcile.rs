//! Optimistic prediction and reconciliation against an authoritative state.
//!
//! A `Reconciler` owns the locally displayed `GameState`. Every action is
//! applied locally first (the prediction) and recorded together with a deep
//! copy of the state from before it. When the authority answers:
//!
//! - success: the authoritative state replaces the local one. If it differs
//!   from the prediction the outcome is reported as a conflict.
//! - failure or timeout: the snapshot is restored exactly.
//!
//! Only one prediction can be in flight at a time. The reconciler never
//! merges fields from two states.

use crate::actions::{ActionKind, GameAction, GameEvent};
use crate::board::PlayerId;
use crate::game::{GameError, GameState};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Locally generated id tying a response to its prediction
pub type RequestId = u64;

/// An action as sent to the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub request: RequestId,
    pub player: PlayerId,
    pub action: GameAction,
}

/// A prediction waiting for its authoritative result
#[derive(Debug, Clone)]
pub struct PendingMove {
    pub request: RequestId,
    pub kind: ActionKind,
    pub player: PlayerId,
    pub action: GameAction,
    pub requested_at: Instant,
    rollback_snapshot: GameState,
    predicted: GameState,
}

impl PendingMove {
    /// State from before the prediction was applied
    pub fn rollback_snapshot(&self) -> &GameState {
        &self.rollback_snapshot
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.requested_at) >= timeout
    }
}

/// A locally applied prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// What to send to the authority
    pub request: ActionRequest,
    /// Events produced by the local application
    pub events: Vec<GameEvent>,
}

/// How a successful response was reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// The authority agreed with the prediction
    Confirmed,
    /// The authority disagreed; its state was adopted
    Conflict,
}

/// Running totals, kept for telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub predicted: u64,
    pub confirmed: u64,
    pub conflicts: u64,
    pub rolled_back: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("Request {0} is still waiting for the server")]
    ActionInFlight(RequestId),

    #[error("Match session is closed")]
    Closed,

    #[error("Action rejected: {0}")]
    Rejected(#[from] GameError),

    #[error("No pending request {0}")]
    UnknownRequest(RequestId),

    #[error("Request {request} rolled back: {reason}")]
    RolledBack { request: RequestId, reason: String },

    #[error("Authoritative state refused: {0}")]
    CorruptAuthority(GameError),
}

impl ReconcileError {
    /// The match can continue and the user may retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReconcileError::Closed | ReconcileError::CorruptAuthority(_) => false,
            ReconcileError::Rejected(e) => e.is_illegal_input(),
            _ => true,
        }
    }
}

/// Owns the displayed game state and its single in-flight prediction
#[derive(Debug, Clone)]
pub struct Reconciler {
    state: GameState,
    pending: Option<PendingMove>,
    next_request: RequestId,
    closed: bool,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new(state: GameState) -> Self {
        Self {
            state,
            pending: None,
            next_request: 1,
            closed: false,
            stats: ReconcileStats::default(),
        }
    }

    /// The state to display
    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingMove> {
        self.pending.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Snapshot the state, apply `action` locally and lock input until the
    /// authority answers
    pub fn predict(
        &mut self,
        player: PlayerId,
        action: GameAction,
        now: Instant,
    ) -> Result<Prediction, ReconcileError> {
        if self.closed {
            return Err(ReconcileError::Closed);
        }
        if let Some(pending) = &self.pending {
            return Err(ReconcileError::ActionInFlight(pending.request));
        }

        let snapshot = self.state.clone();
        let events = match self.state.apply_action(player, action) {
            Ok(events) => events,
            Err(e) => {
                // Illegal input never mutates, but an invariant failure may
                // have left a half-applied move behind
                self.state = snapshot;
                return Err(e.into());
            }
        };

        let request = self.next_request;
        self.next_request += 1;
        self.pending = Some(PendingMove {
            request,
            kind: action.kind(),
            player,
            action,
            requested_at: now,
            rollback_snapshot: snapshot,
            predicted: self.state.clone(),
        });
        self.state.input_locked = true;
        self.stats.predicted += 1;

        Ok(Prediction {
            request: ActionRequest {
                request,
                player,
                action,
            },
            events,
        })
    }

    /// Settle the pending prediction with the authority's answer.
    ///
    /// `Err(reason)` restores the snapshot and returns a recoverable
    /// `RolledBack` error. An authoritative state that breaks an invariant
    /// is never displayed: the snapshot is restored and a non-recoverable
    /// `CorruptAuthority` error is returned.
    pub fn resolve(
        &mut self,
        request: RequestId,
        response: Result<GameState, String>,
    ) -> Result<Resolution, ReconcileError> {
        let pending = self.take_pending(request)?;

        match response {
            Ok(authoritative) => {
                if let Err(e) = authoritative.check_invariants() {
                    self.state = pending.rollback_snapshot;
                    self.stats.rolled_back += 1;
                    return Err(ReconcileError::CorruptAuthority(e));
                }

                let resolution = if authoritative == pending.predicted {
                    self.stats.confirmed += 1;
                    Resolution::Confirmed
                } else {
                    self.stats.conflicts += 1;
                    Resolution::Conflict
                };
                self.state = authoritative;
                self.state.input_locked = false;
                Ok(resolution)
            }
            Err(reason) => {
                self.state = pending.rollback_snapshot;
                self.stats.rolled_back += 1;
                Err(ReconcileError::RolledBack { request, reason })
            }
        }
    }

    /// Roll back a prediction that has waited longer than `timeout`
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Result<(), ReconcileError> {
        let request = match &self.pending {
            Some(pending) if pending.is_expired(now, timeout) => pending.request,
            _ => return Ok(()),
        };
        self.resolve(
            request,
            Err(format!("no authoritative response within {:?}", timeout)),
        )
        .map(|_| ())
    }

    /// Replace the local state with an authoritative one received out of
    /// band. Any prediction in flight is dropped: the server state wins.
    /// A state that breaks an invariant is refused and nothing changes.
    pub fn sync(&mut self, authoritative: GameState) -> Result<(), ReconcileError> {
        if self.closed {
            return Err(ReconcileError::Closed);
        }
        authoritative
            .check_invariants()
            .map_err(ReconcileError::CorruptAuthority)?;
        self.pending = None;
        self.state = authoritative;
        self.state.input_locked = false;
        Ok(())
    }

    /// Abandon the match: drop pending state without rolling back and
    /// refuse every further action
    pub fn cleanup(&mut self) {
        self.pending = None;
        self.closed = true;
    }

    fn take_pending(&mut self, request: RequestId) -> Result<PendingMove, ReconcileError> {
        if self.closed {
            return Err(ReconcileError::Closed);
        }
        match self.pending.take() {
            Some(pending) if pending.request == request => Ok(pending),
            other => {
                self.pending = other;
                Err(ReconcileError::UnknownRequest(request))
            }
        }
    }
}
