use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use log::LevelFilter;

/// Client-side clocks of the session protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long a player may hold the turn before forfeiting.
    pub forfeit_after: Duration,
    /// Interval between `*_last_active` stamps while holding the turn.
    pub heartbeat_every: Duration,
    /// Fallback poll interval next to the change subscription.
    pub poll_every: Duration,
    /// Time allowed for fleet placement before it is done automatically.
    pub placement_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            forfeit_after: Duration::from_secs(60),
            heartbeat_every: Duration::from_secs(10),
            poll_every: Duration::from_secs(2),
            placement_timeout: Duration::from_secs(150),
        }
    }
}

/// Inactivity sweep schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    pub timeout: Duration,
    pub every: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        SweepSettings {
            timeout: Duration::from_secs(2 * 60),
            every: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_duration: i64,
    pub listen_addr: SocketAddr,
    pub log_level: LevelFilter,
    pub timing: Timing,
    pub sweep: SweepSettings,
}

impl Settings {
    /// Reads settings from the environment. Missing required variables and
    /// unparsable values are errors; everything else has a default.
    pub fn from_env() -> anyhow::Result<Settings> {
        Settings::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("${} is not set", key));
        let timing = Timing::default();
        let sweep = SweepSettings::default();

        Ok(Settings {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            token_duration: parsed(&lookup, "TOKEN_DURATION", 3600)?,
            listen_addr: parsed(&lookup, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            log_level: parsed(&lookup, "LOG_LEVEL", LevelFilter::Debug)?,
            timing: Timing {
                forfeit_after: seconds(&lookup, "FORFEIT_SECONDS", timing.forfeit_after)?,
                heartbeat_every: seconds(&lookup, "HEARTBEAT_SECONDS", timing.heartbeat_every)?,
                poll_every: seconds(&lookup, "POLL_SECONDS", timing.poll_every)?,
                placement_timeout: seconds(&lookup, "PLACEMENT_SECONDS", timing.placement_timeout)?,
            },
            sweep: SweepSettings {
                timeout: minutes(&lookup, "SWEEP_TIMEOUT_MINUTES", sweep.timeout)?,
                every: seconds(&lookup, "SWEEP_INTERVAL_SECONDS", sweep.every)?,
            },
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow!("${} is not valid: {:?} ({})", key, raw, err)),
        None => Ok(default),
    }
}

fn seconds<F>(lookup: &F, key: &str, default: Duration) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parsed(lookup, key, default.as_secs())?;
    if secs == 0 {
        return Err(anyhow!("${} must be greater than zero", key));
    }
    Ok(Duration::from_secs(secs))
}

// Whole minutes, bounded so that a cutoff can still be computed from it
fn minutes<F>(lookup: &F, key: &str, default: Duration) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let minutes: u64 = parsed(lookup, key, default.as_secs() / 60)?;
    let span = minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .filter(|span| chrono::Duration::from_std(*span).is_ok())
        .ok_or_else(|| anyhow!("${} is too large: {}", key, minutes))?;
    Ok(span)
}
