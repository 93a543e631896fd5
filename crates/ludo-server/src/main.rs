//! Ludo match simulator.
//!
//! Plays a bot match through a predicting client session against the
//! in-process authoritative host over a lossy, delayed link.

use ludo_core::{Bot, BotDifficulty, GameEvent, PlayerId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod client;
mod config;
mod protocol;
mod room;
mod server;

use client::{LocalAuthority, MatchSession, SessionUpdate};
use config::SimConfig;
use server::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SimConfig::from_env()?;
    info!("Starting Ludo simulator with {:?}", config);

    let server = Arc::new(ServerState::with_seed(config.seed, config.server_dice));
    let (match_id, initial) = server.create_match(config.players)?;

    let authority = LocalAuthority::new(
        Arc::clone(&server),
        config.latency,
        config.failure_rate,
        config.seed.wrapping_add(1),
    );
    let mut bots: HashMap<PlayerId, Bot> = initial
        .active_players
        .iter()
        .enumerate()
        .map(|(i, &player)| {
            let difficulty = if i % 2 == 0 {
                BotDifficulty::Medium
            } else {
                BotDifficulty::Easy
            };
            let seed = config.seed.wrapping_add(10 + i as u64);
            (player, Bot::with_seed(player, difficulty, seed))
        })
        .collect();
    let (mut session, mut updates) = MatchSession::new(
        match_id,
        authority,
        initial,
        config.timeout,
        config.seed.wrapping_add(2),
    );

    // Stand-in for the rendering side
    let renderer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            match update {
                SessionUpdate::Event(GameEvent::PlayerFinished {
                    player,
                    finish_order,
                }) => info!("{} finished in place {}", player, finish_order),
                SessionUpdate::Event(GameEvent::PieceCaptured { piece, by, cell, .. }) => {
                    info!("{} captured {} on {}", by, piece, cell)
                }
                SessionUpdate::Event(event) => debug!("{:?}", event),
                SessionUpdate::StateReplaced { reason, state } => info!(
                    "Display replaced ({:?}), {} to play",
                    reason, state.chance_player
                ),
            }
        }
    });

    let mut submitted = 0;
    while submitted < config.max_actions && !session.state().is_finished() {
        submitted += 1;
        let player = session.state().chance_player;
        let input = bots
            .get_mut(&player)
            .and_then(|bot| bot.choose_input(session.state()));
        let Some(input) = input else {
            warn!("{} has no input, fetching the host's state", player);
            session.resync().await?;
            continue;
        };

        if let Err(e) = session.predict_and_send(player, input).await {
            if !e.is_recoverable() {
                return Err(e.into());
            }
            // The host may have applied the action even though its answer was lost
            warn!("{}, fetching the host's state", e);
            session.resync().await?;
        }
    }

    let stats = session.stats();
    let final_state = session.state().clone();
    let authoritative = server.snapshot(session.match_id())?;
    session.abandon();
    drop(session);
    renderer.await?;

    if final_state != authoritative {
        warn!("Client and host disagree at the end of the match");
    }
    match final_state.final_winner {
        Some(champion) => info!(
            "Match over after {} actions: champion {}, finishing order {:?}",
            submitted, champion, final_state.winners
        ),
        None => warn!("Match not finished after {} actions", submitted),
    }
    info!(
        "Predictions: {} confirmed, {} conflicts, {} rolled back",
        stats.confirmed, stats.conflicts, stats.rolled_back
    );
    for info in server.list_matches() {
        debug!("Host view: {:?}", info);
    }
    server.remove_match(match_id);

    Ok(())
}
