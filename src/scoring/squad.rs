//! Squad scoring aggregator.
//!
//! Sums a member's starting players' matchday points with the captain's
//! contribution doubled. An incomplete squad scores zero for the matchday,
//! regardless of individual player totals.

use std::collections::HashMap;

use crate::data::models::Squad;

/// Number of players a squad must field to score.
pub const REQUIRED_SQUAD_SIZE: usize = 11;

/// Score a squad against the matchday's per-player point totals.
///
/// Missing entries in `points_by_player` mean the player did not feature in
/// the round and contribute 0. The zero-default applies before captain
/// doubling, so a captain with no stats row contributes 0 doubled, still 0.
pub fn score_squad(squad: &Squad, points_by_player: &HashMap<String, i32>) -> i32 {
    score_squad_sized(squad, points_by_player, REQUIRED_SQUAD_SIZE)
}

/// Same as [`score_squad`] with an explicit required squad size.
pub fn score_squad_sized(
    squad: &Squad,
    points_by_player: &HashMap<String, i32>,
    required: usize,
) -> i32 {
    if !squad.is_complete(required) {
        return 0;
    }

    squad
        .slots
        .iter()
        .map(|slot| {
            let pts = points_by_player
                .get(&slot.player_id)
                .copied()
                .unwrap_or(0);
            if slot.is_captain {
                pts * 2
            } else {
                pts
            }
        })
        .sum()
}

// =============================================================================
// Tests
// =============================================================================
