//! Bet-type predicate registry.
//!
//! Settlement is type-directed: a bet's (type, label) pair selects one pure
//! predicate over the realized match facts. New bet types are additive — one
//! resolver registered here, no changes to settlement orchestration.
//!
//! A predicate returns `Some(won)` when the facts decide the wager, or `None`
//! when the facts lack the data the wager needs (e.g. a corners market with
//! no corner count); the engine reports the latter for operator attention
//! instead of guessing.

use std::collections::HashMap;

use crate::data::models::{MatchFacts, MatchOutcome};
use crate::errors::EngineError;

/// A settled-or-undecidable verdict over match facts.
pub type Predicate = Box<dyn Fn(&MatchFacts) -> Option<bool> + Send + Sync>;

/// Turns a bet label into a predicate, or `None` if the label shape is not
/// recognized for this bet type.
type Resolver = fn(&str) -> Option<Predicate>;

pub struct PredicateRegistry {
    resolvers: HashMap<String, Resolver>,
}

impl PredicateRegistry {
    /// Registry with the standard bet-type families.
    pub fn standard() -> Self {
        let mut resolvers: HashMap<String, Resolver> = HashMap::new();
        resolvers.insert("match winner".into(), resolve_match_winner);
        resolvers.insert("double chance".into(), resolve_double_chance);
        resolvers.insert("both teams to score".into(), resolve_both_teams_score);
        resolvers.insert("clean sheet - home".into(), resolve_clean_sheet_home);
        resolvers.insert("clean sheet - away".into(), resolve_clean_sheet_away);
        resolvers.insert("goals over/under".into(), resolve_total_goals);
        resolvers.insert("corners over/under".into(), resolve_total_corners);
        resolvers.insert("cards over/under".into(), resolve_total_cards);
        resolvers.insert("exact score".into(), resolve_exact_score);
        resolvers.insert("home team goals".into(), resolve_home_goals);
        resolvers.insert("away team goals".into(), resolve_away_goals);
        Self { resolvers }
    }

    /// Look up the predicate for a (type, label) pair.
    ///
    /// Unknown types and unrecognized label shapes surface as
    /// [`EngineError::UnsupportedBetType`] — never silently lost.
    pub fn resolve(&self, bet_type: &str, label: &str) -> Result<Predicate, EngineError> {
        let key = bet_type.trim().to_lowercase();
        let label_norm = label.trim().to_lowercase();

        self.resolvers
            .get(&key)
            .and_then(|resolver| resolver(&label_norm))
            .ok_or_else(|| EngineError::UnsupportedBetType {
                bet_type: bet_type.to_string(),
                label: label.to_string(),
            })
    }

    /// Placement-time check that a (type, label) pair is settleable, without
    /// keeping the built predicate around.
    pub fn validate(&self, bet_type: &str, label: &str) -> Result<(), EngineError> {
        self.resolve(bet_type, label).map(|_| ())
    }
}

// =============================================================================
// Resolvers (labels are pre-normalized to lowercase)
// =============================================================================

fn resolve_match_winner(label: &str) -> Option<Predicate> {
    let want = match label {
        "home" | "1" => MatchOutcome::Home,
        "draw" | "x" => MatchOutcome::Draw,
        "away" | "2" => MatchOutcome::Away,
        _ => return None,
    };
    Some(Box::new(move |f| Some(f.outcome() == want)))
}

fn resolve_double_chance(label: &str) -> Option<Predicate> {
    let (a, b) = match label {
        "home or draw" | "1x" => (MatchOutcome::Home, MatchOutcome::Draw),
        "home or away" | "12" => (MatchOutcome::Home, MatchOutcome::Away),
        "draw or away" | "x2" => (MatchOutcome::Draw, MatchOutcome::Away),
        _ => return None,
    };
    Some(Box::new(move |f| {
        let outcome = f.outcome();
        Some(outcome == a || outcome == b)
    }))
}

fn resolve_both_teams_score(label: &str) -> Option<Predicate> {
    let yes = parse_yes_no(label)?;
    Some(Box::new(move |f| Some(f.both_teams_scored() == yes)))
}

fn resolve_clean_sheet_home(label: &str) -> Option<Predicate> {
    let yes = parse_yes_no(label)?;
    Some(Box::new(move |f| Some(f.home_clean_sheet() == yes)))
}

fn resolve_clean_sheet_away(label: &str) -> Option<Predicate> {
    let yes = parse_yes_no(label)?;
    Some(Box::new(move |f| Some(f.away_clean_sheet() == yes)))
}

fn resolve_total_goals(label: &str) -> Option<Predicate> {
    let (over, line) = parse_line(label)?;
    Some(Box::new(move |f| {
        Some(over_under(f.total_goals() as f64, over, line))
    }))
}

fn resolve_total_corners(label: &str) -> Option<Predicate> {
    let (over, line) = parse_line(label)?;
    Some(Box::new(move |f| {
        f.total_corners
            .map(|c| over_under(c as f64, over, line))
    }))
}

fn resolve_total_cards(label: &str) -> Option<Predicate> {
    let (over, line) = parse_line(label)?;
    Some(Box::new(move |f| {
        f.total_cards.map(|c| over_under(c as f64, over, line))
    }))
}

fn resolve_exact_score(label: &str) -> Option<Predicate> {
    let (home, away) = parse_score(label)?;
    Some(Box::new(move |f| {
        Some(f.home_goals == home && f.away_goals == away)
    }))
}

fn resolve_home_goals(label: &str) -> Option<Predicate> {
    let (over, line) = parse_line(label)?;
    Some(Box::new(move |f| {
        Some(over_under(f.home_goals as f64, over, line))
    }))
}

fn resolve_away_goals(label: &str) -> Option<Predicate> {
    let (over, line) = parse_line(label)?;
    Some(Box::new(move |f| {
        Some(over_under(f.away_goals as f64, over, line))
    }))
}

// =============================================================================
// Label parsing helpers
// =============================================================================

fn parse_yes_no(label: &str) -> Option<bool> {
    match label {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Parse `"over 2.5"` / `"under 2.5"` into (is_over, line).
fn parse_line(label: &str) -> Option<(bool, f64)> {
    let mut parts = label.split_whitespace();
    let over = match parts.next()? {
        "over" => true,
        "under" => false,
        _ => return None,
    };
    let line: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((over, line))
}

/// Parse `"2-1"` into (home, away).
fn parse_score(label: &str) -> Option<(u32, u32)> {
    let (h, a) = label.split_once('-')?;
    Some((h.trim().parse().ok()?, a.trim().parse().ok()?))
}

fn over_under(value: f64, over: bool, line: f64) -> bool {
    if over {
        value > line
    } else {
        value < line
    }
}

// =============================================================================
// Tests
// =============================================================================
