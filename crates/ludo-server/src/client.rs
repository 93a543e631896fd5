//! Client side of a match: predict locally, ask the host, reconcile.
//!
//! `MatchSession` wraps a [`Reconciler`] and drives it against anything
//! implementing [`Authority`]. Every input is applied locally first and its
//! events are published straight away; the authoritative answer then either
//! confirms the prediction, replaces it, or rolls it back.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::server::ServerState;
use ludo_core::{
    ActionRequest, GameEvent, GameState, PlayerId, PlayerInput, ReconcileError, ReconcileStats,
    Reconciler, Resolution,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("Connection to the host was lost")]
    Unavailable,

    #[error("Rejected by host: {0}")]
    Rejected(String),

    #[error("Host error: {0}")]
    Host(String),
}

/// The side that owns the authoritative game state.
pub trait Authority: Send + Sync {
    /// Apply `request` and return the resulting state
    fn submit(
        &self,
        match_id: Uuid,
        request: ActionRequest,
    ) -> impl Future<Output = Result<GameState, AuthorityError>> + Send;

    /// Current state, without applying anything
    fn fetch(&self, match_id: Uuid) -> impl Future<Output = Result<GameState, AuthorityError>> + Send;
}

/// In-process host behind a simulated link with latency and losses.
pub struct LocalAuthority {
    server: Arc<ServerState>,
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    /// The host never sees the request
    DropRequest,
    /// The host applies the request but the answer is lost
    DropReply,
}

impl LocalAuthority {
    pub fn new(server: Arc<ServerState>, latency: Duration, failure_rate: f64, seed: u64) -> Self {
        Self {
            server,
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// No latency, no losses
    #[cfg(test)]
    pub fn reliable(server: Arc<ServerState>) -> Self {
        Self::new(server, Duration::ZERO, 0.0, 0)
    }

    async fn draw_link(&self) -> (Duration, Duration, Fault) {
        let mut rng = self.rng.lock().await;
        let there = jittered_latency(&mut *rng, self.latency / 2);
        let back = jittered_latency(&mut *rng, self.latency / 2);
        let fault = if rng.gen_bool(self.failure_rate) {
            if rng.gen_bool(0.5) {
                Fault::DropRequest
            } else {
                Fault::DropReply
            }
        } else {
            Fault::None
        };
        (there, back, fault)
    }
}

impl Authority for LocalAuthority {
    async fn submit(&self, match_id: Uuid, request: ActionRequest) -> Result<GameState, AuthorityError> {
        let (there, back, fault) = self.draw_link().await;

        tokio::time::sleep(there).await;
        if fault == Fault::DropRequest {
            return Err(AuthorityError::Unavailable);
        }
        let reply = self
            .server
            .handle_message(ClientMessage::SubmitAction { match_id, request });

        tokio::time::sleep(back).await;
        if fault == Fault::DropReply {
            return Err(AuthorityError::Unavailable);
        }

        match reply {
            ServerMessage::ActionAccepted { state, .. } => Ok(state),
            ServerMessage::ActionRejected { reason, .. } => Err(AuthorityError::Rejected(reason)),
            ServerMessage::Error { message } => Err(AuthorityError::Host(message)),
            other => Err(AuthorityError::Host(format!("unexpected reply {:?}", other))),
        }
    }

    async fn fetch(&self, match_id: Uuid) -> Result<GameState, AuthorityError> {
        let (there, back, _) = self.draw_link().await;
        tokio::time::sleep(there + back).await;

        match self.server.handle_message(ClientMessage::FetchState { match_id }) {
            ServerMessage::MatchState { state, .. } => Ok(state),
            ServerMessage::Error { message } => Err(AuthorityError::Host(message)),
            other => Err(AuthorityError::Host(format!("unexpected reply {:?}", other))),
        }
    }
}

/// Delay in `[latency/2, latency]`
fn jittered_latency(rng: &mut impl RngCore, latency: Duration) -> Duration {
    let latency_ms = latency.as_millis() as u64;
    if latency_ms <= 1 {
        return latency;
    }

    let half_ms = latency_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}

/// Why the displayed state was replaced wholesale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceReason {
    /// The host disagreed with the prediction
    Conflict,
    /// The prediction was undone
    RolledBack,
    /// Fetched from the host
    Resynced,
}

/// What the rendering side receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Event(GameEvent),
    StateReplaced {
        reason: ReplaceReason,
        state: GameState,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Authority error: {0}")]
    Authority(#[from] AuthorityError),
}

impl SessionError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::Reconcile(e) => e.is_recoverable(),
            SessionError::Authority(_) => true,
        }
    }
}

/// One client's view of a match.
pub struct MatchSession<A: Authority> {
    match_id: Uuid,
    authority: A,
    reconciler: Reconciler,
    timeout: Duration,
    rng: StdRng,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl<A: Authority> MatchSession<A> {
    pub fn new(
        match_id: Uuid,
        authority: A,
        initial: GameState,
        timeout: Duration,
        seed: u64,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            match_id,
            authority,
            reconciler: Reconciler::new(initial),
            timeout,
            rng: StdRng::seed_from_u64(seed),
            updates: tx,
        };
        (session, rx)
    }

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    /// The state to display
    pub fn state(&self) -> &GameState {
        self.reconciler.state()
    }

    pub fn stats(&self) -> ReconcileStats {
        self.reconciler.stats()
    }

    /// Apply `input` locally, then wait for the host's verdict.
    ///
    /// Dice are drawn here, so a host that rolls its own may disagree.
    pub async fn predict_and_send(
        &mut self,
        player: PlayerId,
        input: PlayerInput,
    ) -> Result<Resolution, SessionError> {
        let action = input.into_action(&mut self.rng);
        let prediction = self.reconciler.predict(player, action, Instant::now())?;
        for event in prediction.events {
            self.publish(SessionUpdate::Event(event));
        }

        let request = prediction.request;
        let response = match tokio::time::timeout(
            self.timeout,
            self.authority.submit(self.match_id, request),
        )
        .await
        {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no response within {:?}", self.timeout)),
        };

        match self.reconciler.resolve(request.request, response) {
            Ok(Resolution::Confirmed) => {
                debug!("Request {} confirmed", request.request);
                Ok(Resolution::Confirmed)
            }
            Ok(Resolution::Conflict) => {
                warn!(
                    "Request {} conflicted with the host, adopting its state",
                    request.request
                );
                self.publish_state(ReplaceReason::Conflict);
                Ok(Resolution::Conflict)
            }
            Err(e) => {
                match e {
                    ReconcileError::RolledBack { .. } => {
                        self.publish_state(ReplaceReason::RolledBack)
                    }
                    ReconcileError::CorruptAuthority(_) => {
                        error!("Request {}: {}", request.request, e);
                        self.publish_state(ReplaceReason::RolledBack);
                    }
                    _ => error!("Request {} could not be settled: {}", request.request, e),
                }
                Err(e.into())
            }
        }
    }

    /// Replace the local state with the host's current one
    pub async fn resync(&mut self) -> Result<(), SessionError> {
        let state = self.authority.fetch(self.match_id).await?;
        self.reconciler.sync(state)?;
        self.publish_state(ReplaceReason::Resynced);
        Ok(())
    }

    /// Leave the match. Nothing is rolled back and no further input is taken.
    pub fn abandon(&mut self) {
        self.reconciler.cleanup();
    }

    fn publish_state(&self, reason: ReplaceReason) {
        self.publish(SessionUpdate::StateReplaced {
            reason,
            state: self.reconciler.state().clone(),
        });
    }

    fn publish(&self, update: SessionUpdate) {
        // Nobody rendering is not an error
        let _ = self.updates.send(update);
    }
}
