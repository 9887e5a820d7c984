//! Configuration management.
//!
//! Loads settings from environment variables and .env file.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Settings {
    // Stats provider
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub provider_rate_limit: u32,
    pub provider_max_retries: u32,
    pub provider_timeout_secs: u64,

    // Season
    pub season: u16,

    // Engine constants
    pub base_budget: Decimal,
    pub betting_allowance: Decimal,
    pub clean_sheet_minutes: u32,
    pub squad_size: usize,

    // Logging
    pub log_level: String,
    pub log_json: bool,
}

impl Settings {
    /// Load settings from environment variables (and .env file).
    pub fn from_env() -> Self {
        // Try to load .env file (ignore if not found).
        let _ = dotenvy::dotenv();

        Self {
            provider_base_url: env_str("PROVIDER_BASE_URL", "https://v3.football.api-sports.io"),
            provider_api_key: env_str("PROVIDER_API_KEY", ""),
            provider_rate_limit: env_u32("PROVIDER_RATE_LIMIT", 10),
            provider_max_retries: env_u32("PROVIDER_MAX_RETRIES", 3),
            provider_timeout_secs: env_u64("PROVIDER_TIMEOUT_SECS", 30),

            season: env_u16("SEASON", 2025),

            base_budget: env_decimal("BASE_BUDGET", Decimal::new(500, 0)),
            betting_allowance: env_decimal("BETTING_ALLOWANCE", Decimal::new(250, 0)),
            clean_sheet_minutes: env_u32("CLEAN_SHEET_MINUTES", 60),
            squad_size: env_usize("SQUAD_SIZE", 11),

            log_level: env_str("LOG_LEVEL", "info"),
            log_json: env_bool("LOG_JSON", false),
        }
    }

    /// Validate configuration for critical requirements.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.base_budget <= Decimal::ZERO {
            errors.push("BASE_BUDGET must be positive".to_string());
        }

        if self.betting_allowance < Decimal::ZERO {
            errors.push("BETTING_ALLOWANCE must be non-negative".to_string());
        }

        if self.squad_size == 0 {
            errors.push("SQUAD_SIZE must be positive".to_string());
        }

        if self.provider_rate_limit == 0 {
            errors.push("PROVIDER_RATE_LIMIT must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// =============================================================================
// Environment helpers
// =============================================================================

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| Decimal::from_str(&v).ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
