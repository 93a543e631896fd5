//! Simulator configuration from environment variables.

use anyhow::{anyhow, ensure};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Players in the match (2-4)
    pub players: usize,
    /// Seed for seats, bots, dice and fault injection
    pub seed: u64,
    /// Mean simulated round trip to the host
    pub latency: Duration,
    /// How long a prediction may wait for the host
    pub timeout: Duration,
    /// Share of requests the simulated link loses (0.0-1.0)
    pub failure_rate: f64,
    /// Host rolls its own dice, ignoring the client's value
    pub server_dice: bool,
    /// Stop after this many submitted actions
    pub max_actions: usize,
}

impl SimConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            players: parse_or(&lookup, "LUDO_PLAYERS", 4)?,
            seed: match lookup("LUDO_SEED") {
                Some(_) => parse_or(&lookup, "LUDO_SEED", 0)?,
                None => rand::random(),
            },
            latency: Duration::from_millis(parse_or(&lookup, "LUDO_LATENCY_MS", 5)?),
            timeout: Duration::from_millis(parse_or(&lookup, "LUDO_TIMEOUT_MS", 250)?),
            failure_rate: parse_or(&lookup, "LUDO_FAILURE_RATE", 0.05)?,
            server_dice: parse_or(&lookup, "LUDO_SERVER_DICE", false)?,
            max_actions: parse_or(&lookup, "LUDO_MAX_ACTIONS", 5000)?,
        };

        ensure!(
            (2..=4).contains(&config.players),
            "LUDO_PLAYERS must be between 2 and 4, got {}",
            config.players
        );
        ensure!(
            (0.0..=1.0).contains(&config.failure_rate),
            "LUDO_FAILURE_RATE must be between 0 and 1, got {}",
            config.failure_rate
        );
        ensure!(!config.timeout.is_zero(), "LUDO_TIMEOUT_MS must be positive");

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}
