//! Runtime configuration read from the environment (after `.env` is loaded).

use chrono::{FixedOffset, Offset, Utc};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Joker uses granted by one purchase
pub const DEFAULT_HELP_ALLOWANCE: u32 = 3;
/// Hard cap on matches per round
pub const MAX_MATCHES_PER_ROUND: usize = 10;
pub const DEFAULT_MIRROR_DEBOUNCE_MS: u64 = 450;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Europe/Athens summer time
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 180;

/// Knobs the contest core consults
#[derive(Debug, Clone)]
pub struct ContestConfig {
    pub help_allowance: u32,
    pub max_matches: usize,
    /// Offset applied to a match's `date` + `time`
    pub utc_offset: FixedOffset,
}

impl Default for ContestConfig {
    fn default() -> Self {
        Self {
            help_allowance: DEFAULT_HELP_ALLOWANCE,
            max_matches: MAX_MATCHES_PER_ROUND,
            utc_offset: offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub contest: ContestConfig,
    pub mirror_debounce: Duration,
    /// Where published contest snapshots go; unset disables the mirror
    pub snapshot_file: Option<PathBuf>,
    /// Loaded on startup and rewritten while the server runs
    pub state_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid BIND_ADDR '{}', using {}", raw, DEFAULT_BIND_ADDR);
                default_bind_addr()
            }),
            Err(_) => default_bind_addr(),
        };

        let help_allowance = std::env::var("HELP_ALLOWANCE")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_HELP_ALLOWANCE);

        let utc_offset = match std::env::var("CONTEST_UTC_OFFSET_MINUTES") {
            Ok(raw) => match raw.trim().parse::<i32>().ok().and_then(offset_from_minutes) {
                Some(offset) => offset,
                None => {
                    tracing::warn!(
                        "Invalid CONTEST_UTC_OFFSET_MINUTES '{}', using {}",
                        raw,
                        DEFAULT_UTC_OFFSET_MINUTES
                    );
                    ContestConfig::default().utc_offset
                }
            },
            Err(_) => ContestConfig::default().utc_offset,
        };

        let debounce_ms = std::env::var("MIRROR_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_MIRROR_DEBOUNCE_MS);

        let snapshot_file = path_var("SNAPSHOT_FILE");
        let state_file = path_var("STATE_FILE");

        if snapshot_file.is_none() {
            tracing::warn!("SNAPSHOT_FILE not set - contest snapshots will not be published");
        }

        tracing::info!(
            %bind_addr,
            help_allowance,
            %utc_offset,
            debounce_ms,
            "Config loaded"
        );

        Self {
            bind_addr,
            contest: ContestConfig {
                help_allowance,
                utc_offset,
                ..ContestConfig::default()
            },
            mirror_debounce: Duration::from_millis(debounce_ms),
            snapshot_file,
            state_file,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn path_var(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}
