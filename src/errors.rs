//! Error types for the jornada engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("League not found: {0}")]
    LeagueNotFound(String),

    #[error("Member not found: league={league_id} user={user_id}")]
    MemberNotFound { league_id: String, user_id: String },

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Bet not found: {0}")]
    BetNotFound(String),

    #[error("Parlay not found: {0}")]
    ParlayNotFound(String),

    #[error("Unsupported bet type: type={bet_type} label={label}")]
    UnsupportedBetType { bet_type: String, label: String },

    #[error("Match facts unavailable for fixture {0}")]
    MissingMatchFacts(String),

    #[error("Betting locked: {0}")]
    BettingLocked(String),

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Invalid squad: {0}")]
    InvalidSquad(String),

    #[error("Provider HTTP error: {status_code} - {message}")]
    ProviderHttp { status_code: u16, message: String },

    #[error("Provider rate limited (retry after {retry_after}s)")]
    RateLimited { retry_after: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl EngineError {
    /// Whether this error is retryable at the provider boundary.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Network(_)
                | Self::Timeout(_)
                | Self::ProviderHttp {
                    status_code: 500..=599,
                    ..
                }
        )
    }
}
