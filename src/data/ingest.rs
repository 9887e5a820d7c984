//! Player performance ingestion.
//!
//! Pulls raw per-fixture statistics from the provider, normalizes them into
//! the canonical shape, scores them with the rule table and upserts one
//! [`PlayerMatchdayStats`] row per (player, jornada, season). Re-ingesting a
//! fixture overwrites the existing rows rather than duplicating them.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::data::models::{MatchFacts, PlayerMatchdayStats, Role};
use crate::data::provider::{FixturePlayerLine, StatsProvider};
use crate::errors::EngineError;
use crate::league::store::LeagueStore;
use crate::scoring::rules::score_with_threshold;

/// Result of an ingest sweep over one jornada.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub fixtures: usize,
    pub players_scored: usize,
    /// Per-fixture failures; one bad fixture never aborts the sweep.
    pub errors: Vec<String>,
}

pub struct PerformanceIngestor {
    provider: StatsProvider,
    store: LeagueStore,
    season: u16,
    clean_sheet_minutes: u32,
}

impl PerformanceIngestor {
    pub fn new(
        provider: StatsProvider,
        store: LeagueStore,
        season: u16,
        clean_sheet_minutes: u32,
    ) -> Self {
        Self {
            provider,
            store,
            season,
            clean_sheet_minutes,
        }
    }

    /// Ingest every fixture of a jornada. Returns per-fixture errors in the
    /// report instead of aborting on the first failure.
    pub async fn ingest_jornada(
        &self,
        competition_id: &str,
        jornada: u32,
    ) -> Result<IngestReport, EngineError> {
        let fixture_ids = self
            .provider
            .fetch_jornada_fixtures(competition_id, self.season, jornada)
            .await?;

        info!(
            competition_id,
            jornada,
            fixtures = fixture_ids.len(),
            "Ingesting jornada"
        );

        let mut report = IngestReport {
            fixtures: fixture_ids.len(),
            players_scored: 0,
            errors: Vec::new(),
        };

        for fixture_id in &fixture_ids {
            match self.ingest_fixture(fixture_id, jornada).await {
                Ok(scored) => report.players_scored += scored,
                Err(e) => {
                    warn!(fixture_id, error = %e, "Fixture ingest failed");
                    report.errors.push(format!("fixture {fixture_id}: {e}"));
                }
            }
        }

        Ok(report)
    }

    /// Ingest one fixture: match facts first (settlement input), then every
    /// player line, normalized and scored. Returns the number of players
    /// scored.
    pub async fn ingest_fixture(
        &self,
        fixture_id: &str,
        jornada: u32,
    ) -> Result<usize, EngineError> {
        let facts = self.provider.fetch_match_facts(fixture_id).await?;
        if !facts.finished {
            warn!(fixture_id, "Ingesting a fixture not marked finished");
        }
        self.store.upsert_facts(facts.clone());

        let lines = self.provider.fetch_fixture_players(fixture_id).await?;
        let mut scored = 0;
        for line in lines {
            let row = build_matchday_row(
                &line,
                &facts,
                jornada,
                self.season,
                self.clean_sheet_minutes,
            );
            self.store.upsert_player(line.player.clone());
            self.store.upsert_stats(row);
            scored += 1;
        }

        info!(fixture_id, jornada, scored, "Fixture ingested");
        Ok(scored)
    }

    /// Refresh a single player's row from one fixture.
    pub async fn ingest_player(
        &self,
        player_id: &str,
        fixture_id: &str,
        jornada: u32,
    ) -> Result<PlayerMatchdayStats, EngineError> {
        let facts = self.provider.fetch_match_facts(fixture_id).await?;
        self.store.upsert_facts(facts.clone());

        let line = self
            .provider
            .fetch_fixture_players(fixture_id)
            .await?
            .into_iter()
            .find(|l| l.player.id == player_id)
            .ok_or_else(|| EngineError::PlayerNotFound(player_id.to_string()))?;

        let row = build_matchday_row(
            &line,
            &facts,
            jornada,
            self.season,
            self.clean_sheet_minutes,
        );
        self.store.upsert_player(line.player);
        self.store.upsert_stats(row.clone());
        Ok(row)
    }
}

/// Normalize one provider line against the match facts and score it.
///
/// Defenders are scored against the team's goals-against, not their personal
/// concede count, so the team total is substituted before the rule table runs.
pub fn build_matchday_row(
    line: &FixturePlayerLine,
    facts: &MatchFacts,
    jornada: u32,
    season: u16,
    clean_sheet_minutes: u32,
) -> PlayerMatchdayStats {
    let mut stats = line.stats.clone();
    if line.player.role == Role::Defender {
        if let Some(team_conceded) = facts.conceded_by(&line.player.team_id) {
            stats.goals_conceded = team_conceded;
        }
    }

    let result = score_with_threshold(&stats, line.player.role, clean_sheet_minutes);

    PlayerMatchdayStats {
        player_id: line.player.id.clone(),
        jornada,
        season,
        stats,
        total_points: result.total,
        breakdown: result.breakdown,
        updated_at: Utc::now(),
    }
}

// =============================================================================
// Tests
// =============================================================================
