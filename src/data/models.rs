//! Core data models for the jornada engine.
//!
//! These models provide type safety and serialization for provider payloads
//! and the engine's persisted state: players, per-matchday stats, squads,
//! league members, bets and parlays.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Roles
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Goalkeeper,
    Defender,
    #[default]
    Midfielder,
    Attacker,
}

impl Role {
    /// Map a free-text provider position string to a canonical role.
    /// Unrecognized strings default to Midfielder.
    pub fn normalize(position: &str) -> Self {
        match position.trim().to_lowercase().as_str() {
            "g" | "gk" | "goalkeeper" | "keeper" | "portero" => Self::Goalkeeper,
            "d" | "def" | "defender" | "defence" | "defense" | "defensa" => Self::Defender,
            "m" | "mid" | "midfielder" | "midfield" | "centrocampista" => Self::Midfielder,
            "f" | "fw" | "a" | "att" | "attacker" | "forward" | "striker" | "delantero" => {
                Self::Attacker
            }
            _ => Self::Midfielder,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goalkeeper => write!(f, "Goalkeeper"),
            Self::Defender => write!(f, "Defender"),
            Self::Midfielder => write!(f, "Midfielder"),
            Self::Attacker => write!(f, "Attacker"),
        }
    }
}

// =============================================================================
// Players & per-matchday statistics
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    #[serde(alias = "displayName")]
    pub name: String,
    pub role: Role,
    #[serde(alias = "teamId")]
    pub team_id: String,
}

/// Canonical, flattened per-match raw statistics.
///
/// Provider payloads arrive nested and with drifting field spellings; the
/// provider module normalizes them into this one shape before scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlayerStats {
    /// Appearances in the fixture. `None` means the player did not feature
    /// and scores zero, not an error.
    #[serde(default)]
    pub games: Option<u32>,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    /// For goalkeepers this is the personal concede count; ingestion replaces
    /// it with the team's goals-against for defenders.
    #[serde(default, alias = "conceded")]
    pub goals_conceded: u32,
    #[serde(default)]
    pub saves: u32,
    #[serde(default, alias = "penaltySaved")]
    pub penalties_saved: u32,
    #[serde(default, alias = "penaltyWon")]
    pub penalties_won: u32,
    #[serde(default, alias = "penaltyCommitted", alias = "penalty_commited")]
    pub penalties_conceded: u32,
    #[serde(default, alias = "penaltyMissed")]
    pub penalties_missed: u32,
    #[serde(default, alias = "shotsOn")]
    pub shots_on_target: u32,
    #[serde(default, alias = "keyPasses")]
    pub key_passes: u32,
    #[serde(default, alias = "dribblesSuccess")]
    pub dribbles_success: u32,
    #[serde(default, alias = "duelsWon")]
    pub duels_won: u32,
    #[serde(default)]
    pub interceptions: u32,
    #[serde(default, alias = "foulsDrawn")]
    pub fouls_drawn: u32,
    #[serde(default, alias = "foulsCommitted")]
    pub fouls_committed: u32,
    #[serde(default)]
    pub tackles: u32,
    #[serde(default, alias = "yellow")]
    pub yellow_cards: u32,
    #[serde(default, alias = "red")]
    pub red_cards: u32,
}

impl RawPlayerStats {
    pub fn featured(&self) -> bool {
        self.games.is_some()
    }
}

/// One line of an itemized score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownItem {
    pub label: String,
    pub amount: i64,
    pub points: i32,
}

/// One row per (player, jornada, season). Upserted, never duplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerMatchdayStats {
    pub player_id: String,
    pub jornada: u32,
    pub season: u16,
    pub stats: RawPlayerStats,
    pub total_points: i32,
    pub breakdown: Vec<BreakdownItem>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Squads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadSlot {
    pub player_id: String,
    #[serde(default, alias = "isCaptain")]
    pub is_captain: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Squad {
    pub league_id: String,
    pub user_id: String,
    #[serde(default)]
    pub slots: Vec<SquadSlot>,
}

impl Squad {
    pub fn captain(&self) -> Option<&SquadSlot> {
        self.slots.iter().find(|s| s.is_captain)
    }

    pub fn captain_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_captain).count()
    }

    pub fn is_complete(&self, required: usize) -> bool {
        self.slots.len() >= required
    }
}

// =============================================================================
// Leagues & members
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JornadaStatus {
    #[default]
    Open,
    /// Betting-lock state: the matchday is locked for new wagers because
    /// results are being (or have been) processed.
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: String,
    pub name: String,
    #[serde(alias = "currentJornada")]
    pub current_jornada: u32,
    #[serde(default, alias = "jornadaStatus")]
    pub jornada_status: JornadaStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueMember {
    pub league_id: String,
    pub user_id: String,
    /// Cumulative points across all matchdays. Invariant after every close:
    /// equals the sum of `points_per_jornada` values.
    #[serde(default)]
    pub points: i32,
    #[serde(default, alias = "pointsPerJornada")]
    pub points_per_jornada: HashMap<u32, i32>,
    pub budget: Decimal,
    #[serde(alias = "initialBudget")]
    pub initial_budget: Decimal,
    #[serde(alias = "bettingBudget")]
    pub betting_budget: Decimal,
    /// Last jornada for which the budget formula has committed; guards the
    /// reconciliation step when a crashed close is re-run.
    #[serde(default, alias = "lastReconciledJornada")]
    pub last_reconciled_jornada: Option<u32>,
}

impl LeagueMember {
    pub fn new(league_id: &str, user_id: &str, budget: Decimal, allowance: Decimal) -> Self {
        Self {
            league_id: league_id.to_string(),
            user_id: user_id.to_string(),
            points: 0,
            points_per_jornada: HashMap::new(),
            budget,
            initial_budget: budget,
            betting_budget: allowance,
            last_reconciled_jornada: None,
        }
    }

    pub fn total_from_jornadas(&self) -> i32 {
        self.points_per_jornada.values().sum()
    }
}

// =============================================================================
// Bets & parlays
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    #[default]
    Pending,
    Won,
    Lost,
}

impl BetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub league_id: String,
    pub user_id: String,
    pub jornada: u32,
    #[serde(alias = "matchId", alias = "fixtureId")]
    pub fixture_id: String,
    #[serde(alias = "betType")]
    pub bet_type: String,
    pub label: String,
    pub odds: Decimal,
    pub stake: Decimal,
    #[serde(alias = "potentialPayout")]
    pub potential_payout: Decimal,
    #[serde(default)]
    pub status: BetStatus,
    /// Present when the bet is a leg of a parlay; leg payouts are never
    /// credited individually.
    #[serde(default, alias = "combiId")]
    pub combi_id: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn is_pending(&self) -> bool {
        self.status == BetStatus::Pending
    }
}

/// A multi-leg bet sharing one stake. Won iff every leg is won.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parlay {
    pub id: String,
    pub league_id: String,
    pub user_id: String,
    pub jornada: u32,
    pub stake: Decimal,
    /// Product of leg odds.
    pub odds: Decimal,
    #[serde(alias = "potentialPayout")]
    pub potential_payout: Decimal,
    #[serde(default)]
    pub status: BetStatus,
    #[serde(alias = "legIds")]
    pub leg_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Match facts (settlement input)
// =============================================================================

/// Realized outcome of a wagered match, supplied by the provider.
/// All bet-type predicates are pure functions of this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFacts {
    #[serde(alias = "fixtureId")]
    pub fixture_id: String,
    #[serde(alias = "homeTeamId")]
    pub home_team_id: String,
    #[serde(alias = "awayTeamId")]
    pub away_team_id: String,
    #[serde(alias = "homeGoals")]
    pub home_goals: u32,
    #[serde(alias = "awayGoals")]
    pub away_goals: u32,
    #[serde(default, alias = "totalCorners")]
    pub total_corners: Option<u32>,
    #[serde(default, alias = "totalCards")]
    pub total_cards: Option<u32>,
    #[serde(default)]
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Home,
    Draw,
    Away,
}

impl MatchFacts {
    pub fn total_goals(&self) -> u32 {
        self.home_goals + self.away_goals
    }

    pub fn outcome(&self) -> MatchOutcome {
        if self.home_goals > self.away_goals {
            MatchOutcome::Home
        } else if self.home_goals < self.away_goals {
            MatchOutcome::Away
        } else {
            MatchOutcome::Draw
        }
    }

    pub fn home_clean_sheet(&self) -> bool {
        self.away_goals == 0
    }

    pub fn away_clean_sheet(&self) -> bool {
        self.home_goals == 0
    }

    pub fn both_teams_scored(&self) -> bool {
        self.home_goals > 0 && self.away_goals > 0
    }

    /// Goals conceded by a team in this fixture, by team id.
    /// `None` when the team did not play in the fixture.
    pub fn conceded_by(&self, team_id: &str) -> Option<u32> {
        if team_id == self.home_team_id {
            Some(self.away_goals)
        } else if team_id == self.away_team_id {
            Some(self.home_goals)
        } else {
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
