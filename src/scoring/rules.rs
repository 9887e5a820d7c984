//! Fantasy scoring rule table.
//!
//! Pure, deterministic mapping from a player's raw match statistics and role
//! to a point total with an itemized breakdown. No I/O, no state: identical
//! inputs always produce identical output, which is what makes re-scoring and
//! jornada-close point syncs idempotent.
//!
//! Rule-set note: only goalkeepers are penalized per goal conceded. Defenders
//! keep a clean-sheet bonus measured against the team's goals-against;
//! midfielders and attackers have neither clean-sheet bonus nor conceded
//! penalty.

use serde::Serialize;

use crate::data::models::{BreakdownItem, RawPlayerStats, Role};

/// Minutes a player must be on the pitch for a clean sheet to count.
pub const DEFAULT_CLEAN_SHEET_MINUTES: u32 = 60;

// Base rules (every role).
const POINTS_MINUTES_PARTIAL: i32 = 1; // 1-44 minutes
const POINTS_MINUTES_FULL: i32 = 2; // >= 45 minutes
const MINUTES_FULL_THRESHOLD: u32 = 45;
const POINTS_PER_ASSIST: i32 = 3;
const POINTS_PER_YELLOW: i32 = -1;
const POINTS_PER_RED: i32 = -3;
const POINTS_PER_PENALTY_WON: i32 = 2;
const POINTS_PER_PENALTY_CONCEDED: i32 = -2;
const POINTS_PER_PENALTY_MISSED: i32 = -2;

// Goal points, weighted by how unusual a goal is for the role. Attackers hold
// the highest outfield multiplier.
const GOAL_POINTS_GOALKEEPER: i32 = 10;
const GOAL_POINTS_DEFENDER: i32 = 4;
const GOAL_POINTS_MIDFIELDER: i32 = 5;
const GOAL_POINTS_ATTACKER: i32 = 6;

const CLEAN_SHEET_BONUS: i32 = 4;
const POINTS_PER_GOAL_CONCEDED_GK: i32 = -1;
const POINTS_PER_SAVE: i32 = 1;
const POINTS_PER_PENALTY_SAVED: i32 = 5;
const POINTS_PER_SHOT_ON_TARGET_DEF: i32 = 1;

// Per-N bonuses, all floor division.
const DUELS_WON_PER_BONUS: u32 = 5;
const INTERCEPTIONS_PER_BONUS: u32 = 5;
const SHOTS_ON_PER_BONUS: u32 = 2;
const KEY_PASSES_PER_BONUS: u32 = 2;
const DRIBBLES_PER_BONUS: u32 = 2;
const FOULS_DRAWN_PER_BONUS: u32 = 3;

/// Result of scoring one player's match: integer total plus the itemized
/// contributions that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub total: i32,
    pub breakdown: Vec<BreakdownItem>,
}

impl ScoreResult {
    pub fn zero() -> Self {
        Self {
            total: 0,
            breakdown: Vec::new(),
        }
    }
}

/// Score a player's raw match statistics for their role.
///
/// A player with no `games` entry did not feature and scores `{0, []}`.
pub fn score(stats: &RawPlayerStats, role: Role) -> ScoreResult {
    score_with_threshold(stats, role, DEFAULT_CLEAN_SHEET_MINUTES)
}

/// Same as [`score`] with an explicit clean-sheet minutes threshold.
pub fn score_with_threshold(
    stats: &RawPlayerStats,
    role: Role,
    clean_sheet_minutes: u32,
) -> ScoreResult {
    if !stats.featured() {
        return ScoreResult::zero();
    }

    let mut items: Vec<BreakdownItem> = Vec::new();

    base_rules(stats, &mut items);

    match role {
        Role::Goalkeeper => goalkeeper_rules(stats, clean_sheet_minutes, &mut items),
        Role::Defender => defender_rules(stats, clean_sheet_minutes, &mut items),
        Role::Midfielder => {
            goal_rule(stats, GOAL_POINTS_MIDFIELDER, &mut items);
            attacking_bonuses(stats, &mut items);
            per_n_rule(
                "Interceptions",
                stats.interceptions,
                INTERCEPTIONS_PER_BONUS,
                1,
                &mut items,
            );
        }
        Role::Attacker => {
            goal_rule(stats, GOAL_POINTS_ATTACKER, &mut items);
            attacking_bonuses(stats, &mut items);
        }
    }

    let total = items.iter().map(|i| i.points).sum();
    ScoreResult {
        total,
        breakdown: items,
    }
}

// =============================================================================
// Rule groups
// =============================================================================

fn base_rules(stats: &RawPlayerStats, items: &mut Vec<BreakdownItem>) {
    if stats.minutes > 0 {
        let pts = if stats.minutes >= MINUTES_FULL_THRESHOLD {
            POINTS_MINUTES_FULL
        } else {
            POINTS_MINUTES_PARTIAL
        };
        push(items, "Minutes played", stats.minutes, pts);
    }

    count_rule("Assists", stats.assists, POINTS_PER_ASSIST, items);
    count_rule("Yellow cards", stats.yellow_cards, POINTS_PER_YELLOW, items);
    count_rule("Red cards", stats.red_cards, POINTS_PER_RED, items);
    count_rule(
        "Penalties won",
        stats.penalties_won,
        POINTS_PER_PENALTY_WON,
        items,
    );
    count_rule(
        "Penalties conceded",
        stats.penalties_conceded,
        POINTS_PER_PENALTY_CONCEDED,
        items,
    );
    count_rule(
        "Penalties missed",
        stats.penalties_missed,
        POINTS_PER_PENALTY_MISSED,
        items,
    );

    if let Some(rating) = stats.rating {
        let pts = if rating >= 8.0 {
            3
        } else if rating >= 6.5 {
            2
        } else if rating >= 5.0 {
            1
        } else {
            0
        };
        if pts > 0 {
            // Rating is the one fractional input; the tier truncates it to
            // whole points.
            items.push(BreakdownItem {
                label: "Match rating".to_string(),
                amount: rating as i64,
                points: pts,
            });
        }
    }
}

fn goalkeeper_rules(
    stats: &RawPlayerStats,
    clean_sheet_minutes: u32,
    items: &mut Vec<BreakdownItem>,
) {
    goal_rule(stats, GOAL_POINTS_GOALKEEPER, items);

    // Keeper clean sheet uses the personal conceded count.
    if stats.minutes >= clean_sheet_minutes && stats.goals_conceded == 0 {
        push(items, "Clean sheet", 1, CLEAN_SHEET_BONUS);
    }

    count_rule(
        "Goals conceded",
        stats.goals_conceded,
        POINTS_PER_GOAL_CONCEDED_GK,
        items,
    );
    count_rule("Saves", stats.saves, POINTS_PER_SAVE, items);
    count_rule(
        "Penalties saved",
        stats.penalties_saved,
        POINTS_PER_PENALTY_SAVED,
        items,
    );
    per_n_rule(
        "Interceptions",
        stats.interceptions,
        INTERCEPTIONS_PER_BONUS,
        1,
        items,
    );
}

fn defender_rules(
    stats: &RawPlayerStats,
    clean_sheet_minutes: u32,
    items: &mut Vec<BreakdownItem>,
) {
    goal_rule(stats, GOAL_POINTS_DEFENDER, items);

    // Defender clean sheet uses the team's goals-against, which ingestion has
    // already substituted into `goals_conceded`.
    if stats.minutes >= clean_sheet_minutes && stats.goals_conceded == 0 {
        push(items, "Clean sheet", 1, CLEAN_SHEET_BONUS);
    }

    count_rule(
        "Shots on target",
        stats.shots_on_target,
        POINTS_PER_SHOT_ON_TARGET_DEF,
        items,
    );
    per_n_rule("Duels won", stats.duels_won, DUELS_WON_PER_BONUS, 1, items);
    per_n_rule(
        "Interceptions",
        stats.interceptions,
        INTERCEPTIONS_PER_BONUS,
        1,
        items,
    );
}

/// Shared mid/attacker shot, key-pass, dribble and fouls-drawn bonuses.
fn attacking_bonuses(stats: &RawPlayerStats, items: &mut Vec<BreakdownItem>) {
    per_n_rule(
        "Shots on target",
        stats.shots_on_target,
        SHOTS_ON_PER_BONUS,
        1,
        items,
    );
    per_n_rule("Key passes", stats.key_passes, KEY_PASSES_PER_BONUS, 1, items);
    per_n_rule(
        "Successful dribbles",
        stats.dribbles_success,
        DRIBBLES_PER_BONUS,
        1,
        items,
    );
    per_n_rule(
        "Fouls drawn",
        stats.fouls_drawn,
        FOULS_DRAWN_PER_BONUS,
        1,
        items,
    );
}

// =============================================================================
// Helpers
// =============================================================================

fn push(items: &mut Vec<BreakdownItem>, label: &str, amount: u32, points: i32) {
    items.push(BreakdownItem {
        label: label.to_string(),
        amount: amount as i64,
        points,
    });
}

/// `points_each` per counted event; omitted entirely when the count is zero.
fn count_rule(label: &str, count: u32, points_each: i32, items: &mut Vec<BreakdownItem>) {
    if count > 0 {
        push(items, label, count, points_each * count as i32);
    }
}

/// Floor-division bonus: `floor(count / n) * points_per_bucket`.
fn per_n_rule(
    label: &str,
    count: u32,
    n: u32,
    points_per_bucket: i32,
    items: &mut Vec<BreakdownItem>,
) {
    let buckets = count / n;
    if buckets > 0 {
        push(items, label, count, points_per_bucket * buckets as i32);
    }
}

fn goal_rule(stats: &RawPlayerStats, points_each: i32, items: &mut Vec<BreakdownItem>) {
    count_rule("Goals", stats.goals, points_each, items);
}

// =============================================================================
// Tests
// =============================================================================
