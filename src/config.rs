use crate::error::{AppError, Result};

pub const COC_API_URL: &str = "https://api.clashofclans.com/v1";

/// Name shared by every per-tournament poll task. The registry key is the clan
/// tag, the full task name is `PollCWL_memberlist:<tag>`.
pub const LEAGUE_POLL_TASK: &str = "PollCWL_memberlist";

/// War tag the API publishes for a pairing that has not been drawn yet.
pub const UNASSIGNED_WAR_TAG: &str = "#0";

/// Clan-level poll interval (seconds): roster sync + raid snapshot.
pub const CLAN_POLL_INTERVAL_SECS: u64 = 600;

/// Per-tournament poll interval (seconds).
pub const LEAGUE_POLL_INTERVAL_SECS: u64 = 600;

pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Achievement names backing the raid statistic.
pub mod achievements {
    pub const CAPITAL_GOLD_COLLECTED: &str = "Aggressive Capitalism";
    pub const CAPITAL_GOLD_DONATED: &str = "Most Valuable Clanmate";
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_token: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between clan-level ticks (CLAN_POLL_INTERVAL_SECS)
    pub clan_poll_interval_secs: u64,
    /// Seconds between per-tournament ticks (LEAGUE_POLL_INTERVAL_SECS)
    pub league_poll_interval_secs: u64,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var("COC_API_TOKEN")
            .map_err(|_| AppError::Config("COC_API_TOKEN must be set".to_string()))?;

        Ok(Self {
            api_url: std::env::var("COC_API_URL")
                .unwrap_or_else(|_| COC_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_token,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "clan_sync.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            clan_poll_interval_secs: std::env::var("CLAN_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|s| *s > 0)
                .unwrap_or(CLAN_POLL_INTERVAL_SECS),
            league_poll_interval_secs: std::env::var("LEAGUE_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|s| *s > 0)
                .unwrap_or(LEAGUE_POLL_INTERVAL_SECS),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(HTTP_TIMEOUT_SECS),
        })
    }
}
