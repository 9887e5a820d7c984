//! Async REST client for the football stats provider.
//!
//! Features:
//! - API-key authentication
//! - Rate limiting (configurable, default 10 req/sec)
//! - Automatic retries with exponential backoff
//! - Typed, drift-tolerant response parsing
//!
//! Provider payloads arrive deeply nested and with inconsistent field
//! spellings across plan tiers; everything is flattened here into the
//! canonical [`RawPlayerStats`] / [`MatchFacts`] shapes before any scoring
//! or settlement code sees it.

use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::data::models::{MatchFacts, Player, RawPlayerStats, Role};
use crate::errors::EngineError;

/// Async REST client for the stats provider.
pub struct StatsProvider {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    max_retries: u32,
}

impl StatsProvider {
    pub fn new(
        api_key: &str,
        base_url: &str,
        rate_limit: u32,
        max_retries: u32,
        timeout_secs: u64,
    ) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(20)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;

        let quota =
            Quota::per_second(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::new(10).unwrap()));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter,
            max_retries,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        Self::new(
            &settings.provider_api_key,
            &settings.provider_base_url,
            settings.provider_rate_limit,
            settings.provider_max_retries,
            settings.provider_timeout_secs,
        )
    }

    // =========================================================================
    // Core request method
    // =========================================================================

    async fn request(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<EngineError> = None;

        for attempt in 0..self.max_retries {
            // Rate limiting
            self.rate_limiter.until_ready().await;

            debug!(path = %path, attempt = attempt + 1, "Provider request");

            let result = self
                .client
                .get(&url)
                .header("x-apisports-key", &self.api_key)
                .query(params)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| EngineError::Network(e.to_string()))?;
                        let json: serde_json::Value = serde_json::from_str(&text)
                            .map_err(|e| EngineError::Deserialization(e.to_string()))?;
                        return Ok(json);
                    }

                    // Rate limit — always retry
                    if status.as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(1);
                        warn!(retry_after, attempt = attempt + 1, "Rate limited");
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        last_error = Some(EngineError::RateLimited { retry_after });
                        continue;
                    }

                    // Server errors — retry with backoff
                    if status.as_u16() >= 500 {
                        let delay_ms = 500 * 2u64.pow(attempt);
                        warn!(
                            status_code = status.as_u16(),
                            delay_ms,
                            attempt = attempt + 1,
                            "Server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        last_error = Some(EngineError::ProviderHttp {
                            status_code: status.as_u16(),
                            message: status.to_string(),
                        });
                        continue;
                    }

                    // Client errors — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EngineError::ProviderHttp {
                        status_code: status.as_u16(),
                        message: body_text,
                    });
                }
                Err(e) => {
                    let delay_ms = 500 * 2u64.pow(attempt);
                    warn!(
                        error = %e,
                        delay_ms,
                        attempt = attempt + 1,
                        "Network error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                    if e.is_timeout() {
                        last_error = Some(EngineError::Timeout(e.to_string()));
                    } else {
                        last_error = Some(EngineError::Network(e.to_string()));
                    }
                    continue;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: "Unknown error".to_string(),
        }))
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// Fetch every player's raw statistics for one fixture, flattened.
    pub async fn fetch_fixture_players(
        &self,
        fixture_id: &str,
    ) -> Result<Vec<FixturePlayerLine>, EngineError> {
        let data = self
            .request("/fixtures/players", &[("fixture", fixture_id)])
            .await?;

        let teams = data
            .get("response")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut lines = Vec::new();
        for team_entry in teams {
            let team_id = match team_entry
                .get("team")
                .and_then(|t| t.get("id"))
                .and_then(id_string)
            {
                Some(id) => id,
                None => continue,
            };

            let players = team_entry
                .get("players")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            // Parse each player individually; skip any that fail.
            for entry in players {
                match serde_json::from_value::<PlayerEntry>(entry) {
                    Ok(parsed) => {
                        if let Some(line) = parsed.flatten(&team_id) {
                            lines.push(line);
                        }
                    }
                    Err(e) => {
                        warn!(fixture_id, error = %e, "Skipping unparseable player line");
                    }
                }
            }
        }

        Ok(lines)
    }

    /// Fetch the realized outcome of one fixture for bet settlement.
    pub async fn fetch_match_facts(&self, fixture_id: &str) -> Result<MatchFacts, EngineError> {
        let data = self.request("/fixtures", &[("id", fixture_id)]).await?;

        let entry = data
            .get("response")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .cloned()
            .ok_or_else(|| EngineError::MissingMatchFacts(fixture_id.to_string()))?;

        let fixture: FixtureEntry = serde_json::from_value(entry)
            .map_err(|e| EngineError::Deserialization(e.to_string()))?;

        Ok(fixture.into_facts(fixture_id))
    }

    /// Fixture ids belonging to one jornada (provider "round") of a season.
    pub async fn fetch_jornada_fixtures(
        &self,
        competition_id: &str,
        season: u16,
        jornada: u32,
    ) -> Result<Vec<String>, EngineError> {
        let season_str = season.to_string();
        let round = format!("Regular Season - {jornada}");
        let data = self
            .request(
                "/fixtures",
                &[
                    ("league", competition_id),
                    ("season", &season_str),
                    ("round", &round),
                ],
            )
            .await?;

        let entries = data
            .get("response")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(entries
            .iter()
            .filter_map(|e| e.pointer("/fixture/id"))
            .filter_map(id_string)
            .collect())
    }
}

/// One player's flattened line from a fixture payload.
#[derive(Debug, Clone)]
pub struct FixturePlayerLine {
    pub player: Player,
    pub stats: RawPlayerStats,
}

// =============================================================================
// Provider wire shapes (nested, drift-tolerant)
// =============================================================================

#[derive(Debug, Deserialize)]
struct PlayerEntry {
    player: PlayerRef,
    #[serde(default)]
    statistics: Vec<StatisticsEntry>,
}

#[derive(Debug, Deserialize)]
struct PlayerRef {
    id: serde_json::Value,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct StatisticsEntry {
    #[serde(default)]
    games: GamesBlock,
    #[serde(default)]
    goals: GoalsBlock,
    #[serde(default)]
    shots: ShotsBlock,
    #[serde(default)]
    passes: PassesBlock,
    #[serde(default)]
    tackles: TacklesBlock,
    #[serde(default)]
    duels: DuelsBlock,
    #[serde(default)]
    dribbles: DribblesBlock,
    #[serde(default)]
    fouls: FoulsBlock,
    #[serde(default)]
    cards: CardsBlock,
    #[serde(default)]
    penalty: PenaltyBlock,
}

#[derive(Debug, Default, Deserialize)]
struct GamesBlock {
    #[serde(default)]
    minutes: Option<u32>,
    /// Arrives as a string ("7.2") on some plans, a number on others.
    #[serde(default)]
    rating: Option<serde_json::Value>,
    #[serde(default)]
    position: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoalsBlock {
    #[serde(default)]
    total: Option<u32>,
    #[serde(default)]
    conceded: Option<u32>,
    #[serde(default)]
    assists: Option<u32>,
    #[serde(default)]
    saves: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ShotsBlock {
    #[serde(default)]
    on: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PassesBlock {
    #[serde(default)]
    key: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TacklesBlock {
    #[serde(default)]
    total: Option<u32>,
    #[serde(default)]
    interceptions: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DuelsBlock {
    #[serde(default)]
    won: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DribblesBlock {
    #[serde(default)]
    success: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FoulsBlock {
    #[serde(default)]
    drawn: Option<u32>,
    #[serde(default)]
    committed: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CardsBlock {
    #[serde(default)]
    yellow: Option<u32>,
    #[serde(default)]
    red: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PenaltyBlock {
    #[serde(default)]
    won: Option<u32>,
    /// The provider spells it this way.
    #[serde(default, alias = "committed")]
    commited: Option<u32>,
    #[serde(default)]
    missed: Option<u32>,
    #[serde(default)]
    saved: Option<u32>,
}

impl PlayerEntry {
    /// Flatten the nested statistics blocks into one canonical line.
    /// Returns `None` when the entry carries no statistics at all.
    fn flatten(self, team_id: &str) -> Option<FixturePlayerLine> {
        let stat = self.statistics.into_iter().next()?;

        let role = stat
            .games
            .position
            .as_deref()
            .map(Role::normalize)
            .unwrap_or_default();

        let player = Player {
            id: id_string(&self.player.id)?,
            name: self.player.name,
            role,
            team_id: team_id.to_string(),
        };

        // A null/absent minutes block means the player stayed on the bench;
        // `games: None` marks the line as not featured.
        let featured = stat.games.minutes.is_some();

        let stats = RawPlayerStats {
            games: if featured { Some(1) } else { None },
            minutes: stat.games.minutes.unwrap_or(0),
            rating: stat.games.rating.as_ref().and_then(parse_rating),
            goals: stat.goals.total.unwrap_or(0),
            assists: stat.goals.assists.unwrap_or(0),
            goals_conceded: stat.goals.conceded.unwrap_or(0),
            saves: stat.goals.saves.unwrap_or(0),
            penalties_saved: stat.penalty.saved.unwrap_or(0),
            penalties_won: stat.penalty.won.unwrap_or(0),
            penalties_conceded: stat.penalty.commited.unwrap_or(0),
            penalties_missed: stat.penalty.missed.unwrap_or(0),
            shots_on_target: stat.shots.on.unwrap_or(0),
            key_passes: stat.passes.key.unwrap_or(0),
            dribbles_success: stat.dribbles.success.unwrap_or(0),
            duels_won: stat.duels.won.unwrap_or(0),
            interceptions: stat.tackles.interceptions.unwrap_or(0),
            fouls_drawn: stat.fouls.drawn.unwrap_or(0),
            fouls_committed: stat.fouls.committed.unwrap_or(0),
            tackles: stat.tackles.total.unwrap_or(0),
            yellow_cards: stat.cards.yellow.unwrap_or(0),
            red_cards: stat.cards.red.unwrap_or(0),
        };

        Some(FixturePlayerLine { player, stats })
    }
}

#[derive(Debug, Deserialize)]
struct FixtureEntry {
    #[serde(default)]
    fixture: FixtureBlock,
    #[serde(default)]
    teams: TeamsBlock,
    #[serde(default)]
    goals: ScoreBlock,
    #[serde(default)]
    statistics: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureBlock {
    #[serde(default)]
    status: StatusBlock,
}

#[derive(Debug, Default, Deserialize)]
struct StatusBlock {
    #[serde(default)]
    short: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TeamsBlock {
    #[serde(default)]
    home: Option<TeamRef>,
    #[serde(default)]
    away: Option<TeamRef>,
}

#[derive(Debug, Deserialize)]
struct TeamRef {
    id: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct ScoreBlock {
    #[serde(default)]
    home: Option<u32>,
    #[serde(default)]
    away: Option<u32>,
}

const FINISHED_STATUSES: &[&str] = &["FT", "AET", "PEN"];

impl FixtureEntry {
    fn into_facts(self, fixture_id: &str) -> MatchFacts {
        let finished = self
            .fixture
            .status
            .short
            .as_deref()
            .map(|s| FINISHED_STATUSES.contains(&s))
            .unwrap_or(false);

        let (total_corners, total_cards) = self
            .statistics
            .as_ref()
            .map(extract_match_totals)
            .unwrap_or((None, None));

        MatchFacts {
            fixture_id: fixture_id.to_string(),
            home_team_id: self
                .teams
                .home
                .as_ref()
                .and_then(|t| id_string(&t.id))
                .unwrap_or_default(),
            away_team_id: self
                .teams
                .away
                .as_ref()
                .and_then(|t| id_string(&t.id))
                .unwrap_or_default(),
            home_goals: self.goals.home.unwrap_or(0),
            away_goals: self.goals.away.unwrap_or(0),
            total_corners,
            total_cards,
            finished,
        }
    }
}

/// Sum "Corner Kicks" and card counts across both teams' statistics arrays.
/// Either total stays `None` when the provider omits the category, so the
/// corresponding markets surface as undecidable instead of settling at zero.
fn extract_match_totals(stats: &serde_json::Value) -> (Option<u32>, Option<u32>) {
    let mut corners: Option<u32> = None;
    let mut cards: Option<u32> = None;

    let teams = match stats.as_array() {
        Some(arr) => arr,
        None => return (None, None),
    };

    for team in teams {
        let entries = team
            .get("statistics")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for entry in entries {
            let kind = entry.get("type").and_then(|v| v.as_str()).unwrap_or("");
            let value = entry.get("value").and_then(|v| v.as_u64()).map(|v| v as u32);
            match kind {
                "Corner Kicks" => {
                    if let Some(v) = value {
                        corners = Some(corners.unwrap_or(0) + v);
                    }
                }
                "Yellow Cards" | "Red Cards" => {
                    if let Some(v) = value {
                        cards = Some(cards.unwrap_or(0) + v);
                    }
                }
                _ => {}
            }
        }
    }

    (corners, cards)
}

/// Provider ids arrive as numbers or strings depending on the endpoint.
fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_rating(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_nested_player_entry() {
        let json = r#"{
            "player": {"id": 874, "name": "Vini Jr."},
            "statistics": [{
                "games": {"minutes": 90, "rating": "8.3", "position": "F"},
                "goals": {"total": 2, "assists": 1},
                "shots": {"on": 4},
                "passes": {"key": 3},
                "dribbles": {"success": 5},
                "fouls": {"drawn": 2},
                "cards": {"yellow": 1}
            }]
        }"#;
        let entry: PlayerEntry = serde_json::from_str(json).unwrap();
        let line = entry.flatten("541").unwrap();

        assert_eq!(line.player.id, "874");
        assert_eq!(line.player.role, Role::Attacker);
        assert_eq!(line.player.team_id, "541");
        assert_eq!(line.stats.games, Some(1));
        assert_eq!(line.stats.minutes, 90);
        assert_eq!(line.stats.rating, Some(8.3));
        assert_eq!(line.stats.goals, 2);
        assert_eq!(line.stats.shots_on_target, 4);
        assert_eq!(line.stats.yellow_cards, 1);
    }

    #[test]
    fn bench_player_is_not_featured() {
        let json = r#"{
            "player": {"id": 99, "name": "Sub"},
            "statistics": [{
                "games": {"minutes": null, "rating": null, "position": "M"}
            }]
        }"#;
        let entry: PlayerEntry = serde_json::from_str(json).unwrap();
        let line = entry.flatten("541").unwrap();
        assert!(line.stats.games.is_none());
        assert_eq!(line.stats.minutes, 0);
    }

    #[test]
    fn penalty_spelling_drift_is_tolerated() {
        let a: PenaltyBlock = serde_json::from_str(r#"{"commited": 1}"#).unwrap();
        let b: PenaltyBlock = serde_json::from_str(r#"{"committed": 1}"#).unwrap();
        assert_eq!(a.commited, Some(1));
        assert_eq!(b.commited, Some(1));
    }

    #[test]
    fn fixture_entry_to_match_facts() {
        let json = r#"{
            "fixture": {"status": {"short": "FT"}},
            "teams": {"home": {"id": 541}, "away": {"id": 529}},
            "goals": {"home": 2, "away": 1},
            "statistics": [
                {"statistics": [{"type": "Corner Kicks", "value": 6}, {"type": "Yellow Cards", "value": 2}]},
                {"statistics": [{"type": "Corner Kicks", "value": 3}, {"type": "Yellow Cards", "value": 1}, {"type": "Red Cards", "value": 1}]}
            ]
        }"#;
        let entry: FixtureEntry = serde_json::from_str(json).unwrap();
        let facts = entry.into_facts("f100");

        assert!(facts.finished);
        assert_eq!(facts.home_team_id, "541");
        assert_eq!(facts.home_goals, 2);
        assert_eq!(facts.away_goals, 1);
        assert_eq!(facts.total_corners, Some(9));
        assert_eq!(facts.total_cards, Some(4));
    }

    #[test]
    fn unfinished_fixture_flagged() {
        let json = r#"{
            "fixture": {"status": {"short": "HT"}},
            "teams": {"home": {"id": 1}, "away": {"id": 2}},
            "goals": {"home": 0, "away": 0}
        }"#;
        let entry: FixtureEntry = serde_json::from_str(json).unwrap();
        assert!(!entry.into_facts("f1").finished);
    }
}
