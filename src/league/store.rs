//! Thread-safe store for league, member, squad, bet and stats records.
//!
//! Stands in for the relational persistence collaborator: enforces the
//! uniqueness invariants ((player, jornada, season) for stats rows,
//! (league, user) for membership) and serializes read-then-write budget
//! mutations behind one lock so concurrent writers to the same member
//! cannot lose updates.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::data::models::{
    Bet, BetStatus, League, LeagueMember, MatchFacts, Parlay, Player, PlayerMatchdayStats, Squad,
};
use crate::errors::EngineError;

#[derive(Debug, Default)]
struct Inner {
    leagues: HashMap<String, League>,
    members: HashMap<String, LeagueMember>,
    squads: HashMap<String, Squad>,
    bets: HashMap<String, Bet>,
    parlays: HashMap<String, Parlay>,
    stats: HashMap<String, PlayerMatchdayStats>,
    players: HashMap<String, Player>,
    facts: HashMap<String, MatchFacts>,
}

/// Result of a status-guarded settlement transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The bet/parlay was already terminal; nothing changed.
    NoOp,
    /// The transition committed; `credited` is zero for losses and parlay legs.
    Settled { won: bool, credited: Decimal },
}

/// Thread-safe centralized store.
#[derive(Debug, Clone, Default)]
pub struct LeagueStore {
    inner: Arc<RwLock<Inner>>,
}

impl LeagueStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Leagues
    // =========================================================================

    pub fn upsert_league(&self, league: League) {
        let mut inner = self.inner.write().unwrap();
        inner.leagues.insert(league.id.clone(), league);
    }

    pub fn get_league(&self, league_id: &str) -> Result<League, EngineError> {
        self.inner
            .read()
            .unwrap()
            .leagues
            .get(league_id)
            .cloned()
            .ok_or_else(|| EngineError::LeagueNotFound(league_id.to_string()))
    }

    pub fn update_league<F>(&self, league_id: &str, f: F) -> Result<League, EngineError>
    where
        F: FnOnce(&mut League),
    {
        let mut inner = self.inner.write().unwrap();
        let league = inner
            .leagues
            .get_mut(league_id)
            .ok_or_else(|| EngineError::LeagueNotFound(league_id.to_string()))?;
        f(league);
        Ok(league.clone())
    }

    // =========================================================================
    // Members
    // =========================================================================

    pub fn upsert_member(&self, member: LeagueMember) {
        let key = member_key(&member.league_id, &member.user_id);
        self.inner.write().unwrap().members.insert(key, member);
    }

    pub fn get_member(&self, league_id: &str, user_id: &str) -> Result<LeagueMember, EngineError> {
        self.inner
            .read()
            .unwrap()
            .members
            .get(&member_key(league_id, user_id))
            .cloned()
            .ok_or_else(|| EngineError::MemberNotFound {
                league_id: league_id.to_string(),
                user_id: user_id.to_string(),
            })
    }

    pub fn members_of(&self, league_id: &str) -> Vec<LeagueMember> {
        self.inner
            .read()
            .unwrap()
            .members
            .values()
            .filter(|m| m.league_id == league_id)
            .cloned()
            .collect()
    }

    /// Read-modify-write a member under the write lock.
    pub fn update_member<F>(
        &self,
        league_id: &str,
        user_id: &str,
        f: F,
    ) -> Result<LeagueMember, EngineError>
    where
        F: FnOnce(&mut LeagueMember),
    {
        let mut inner = self.inner.write().unwrap();
        let member = inner
            .members
            .get_mut(&member_key(league_id, user_id))
            .ok_or_else(|| EngineError::MemberNotFound {
                league_id: league_id.to_string(),
                user_id: user_id.to_string(),
            })?;
        f(member);
        Ok(member.clone())
    }

    /// Read-modify-write where the closure can refuse the mutation. Check and
    /// write happen under one lock acquisition, so a balance guard cannot race
    /// a concurrent debit; on `Err` the member is left untouched.
    pub fn try_update_member<F>(
        &self,
        league_id: &str,
        user_id: &str,
        f: F,
    ) -> Result<LeagueMember, EngineError>
    where
        F: FnOnce(&mut LeagueMember) -> Result<(), EngineError>,
    {
        let mut inner = self.inner.write().unwrap();
        let member = inner
            .members
            .get_mut(&member_key(league_id, user_id))
            .ok_or_else(|| EngineError::MemberNotFound {
                league_id: league_id.to_string(),
                user_id: user_id.to_string(),
            })?;
        let mut updated = member.clone();
        f(&mut updated)?;
        *member = updated.clone();
        Ok(updated)
    }

    // =========================================================================
    // Squads
    // =========================================================================

    pub fn save_squad(&self, squad: Squad) {
        let key = member_key(&squad.league_id, &squad.user_id);
        self.inner.write().unwrap().squads.insert(key, squad);
    }

    pub fn get_squad(&self, league_id: &str, user_id: &str) -> Squad {
        self.inner
            .read()
            .unwrap()
            .squads
            .get(&member_key(league_id, user_id))
            .cloned()
            .unwrap_or_else(|| Squad {
                league_id: league_id.to_string(),
                user_id: user_id.to_string(),
                slots: Vec::new(),
            })
    }

    /// Remove every squad-player association in the league.
    /// Returns the number of squads cleared.
    pub fn clear_squads(&self, league_id: &str) -> usize {
        let mut inner = self.inner.write().unwrap();
        let mut cleared = 0;
        for squad in inner.squads.values_mut() {
            if squad.league_id == league_id && !squad.slots.is_empty() {
                squad.slots.clear();
                cleared += 1;
            }
        }
        cleared
    }

    pub fn squads_of(&self, league_id: &str) -> Vec<Squad> {
        self.inner
            .read()
            .unwrap()
            .squads
            .values()
            .filter(|s| s.league_id == league_id)
            .cloned()
            .collect()
    }

    // =========================================================================
    // Player matchday stats
    // =========================================================================

    /// Insert-or-overwrite the (player, jornada, season) row.
    pub fn upsert_stats(&self, row: PlayerMatchdayStats) {
        let key = stats_key(&row.player_id, row.jornada, row.season);
        self.inner.write().unwrap().stats.insert(key, row);
    }

    pub fn get_stats(
        &self,
        player_id: &str,
        jornada: u32,
        season: u16,
    ) -> Option<PlayerMatchdayStats> {
        self.inner
            .read()
            .unwrap()
            .stats
            .get(&stats_key(player_id, jornada, season))
            .cloned()
    }

    /// Per-player point totals for one matchday, for squad aggregation.
    pub fn points_map(&self, jornada: u32, season: u16) -> HashMap<String, i32> {
        self.inner
            .read()
            .unwrap()
            .stats
            .values()
            .filter(|r| r.jornada == jornada && r.season == season)
            .map(|r| (r.player_id.clone(), r.total_points))
            .collect()
    }

    // =========================================================================
    // Players
    // =========================================================================

    pub fn upsert_player(&self, player: Player) {
        let mut inner = self.inner.write().unwrap();
        inner.players.insert(player.id.clone(), player);
    }

    pub fn get_player(&self, player_id: &str) -> Result<Player, EngineError> {
        self.inner
            .read()
            .unwrap()
            .players
            .get(player_id)
            .cloned()
            .ok_or_else(|| EngineError::PlayerNotFound(player_id.to_string()))
    }

    // =========================================================================
    // Match facts
    // =========================================================================

    pub fn upsert_facts(&self, facts: MatchFacts) {
        let mut inner = self.inner.write().unwrap();
        inner.facts.insert(facts.fixture_id.clone(), facts);
    }

    pub fn get_facts(&self, fixture_id: &str) -> Option<MatchFacts> {
        self.inner.read().unwrap().facts.get(fixture_id).cloned()
    }

    // =========================================================================
    // Bets & parlays
    // =========================================================================

    pub fn insert_bet(&self, bet: Bet) {
        let mut inner = self.inner.write().unwrap();
        inner.bets.insert(bet.id.clone(), bet);
    }

    pub fn get_bet(&self, bet_id: &str) -> Result<Bet, EngineError> {
        self.inner
            .read()
            .unwrap()
            .bets
            .get(bet_id)
            .cloned()
            .ok_or_else(|| EngineError::BetNotFound(bet_id.to_string()))
    }

    /// Refund a pending single bet's stake and remove it, both under one
    /// write lock: a racing cancel finds the bet already gone instead of
    /// refunding twice.
    pub fn refund_and_remove_bet(&self, bet_id: &str) -> Result<Bet, EngineError> {
        let mut inner = self.inner.write().unwrap();
        let bet = inner
            .bets
            .get(bet_id)
            .cloned()
            .ok_or_else(|| EngineError::BetNotFound(bet_id.to_string()))?;
        if bet.combi_id.is_some() {
            return Err(EngineError::InvalidBet(format!(
                "bet {bet_id} is a parlay leg and cannot be cancelled alone"
            )));
        }
        if bet.status.is_terminal() {
            return Err(EngineError::InvalidBet(format!(
                "bet {bet_id} is already settled"
            )));
        }
        let member = inner
            .members
            .get_mut(&member_key(&bet.league_id, &bet.user_id))
            .ok_or_else(|| EngineError::MemberNotFound {
                league_id: bet.league_id.clone(),
                user_id: bet.user_id.clone(),
            })?;
        member.betting_budget += bet.stake;
        inner.bets.remove(bet_id);
        Ok(bet)
    }

    pub fn bets_for_jornada(&self, league_id: &str, jornada: u32) -> Vec<Bet> {
        self.inner
            .read()
            .unwrap()
            .bets
            .values()
            .filter(|b| b.league_id == league_id && b.jornada == jornada)
            .cloned()
            .collect()
    }

    pub fn insert_parlay(&self, parlay: Parlay) {
        let mut inner = self.inner.write().unwrap();
        inner.parlays.insert(parlay.id.clone(), parlay);
    }

    pub fn get_parlay(&self, parlay_id: &str) -> Result<Parlay, EngineError> {
        self.inner
            .read()
            .unwrap()
            .parlays
            .get(parlay_id)
            .cloned()
            .ok_or_else(|| EngineError::ParlayNotFound(parlay_id.to_string()))
    }

    pub fn parlays_for_jornada(&self, league_id: &str, jornada: u32) -> Vec<Parlay> {
        self.inner
            .read()
            .unwrap()
            .parlays
            .values()
            .filter(|p| p.league_id == league_id && p.jornada == jornada)
            .cloned()
            .collect()
    }

    // =========================================================================
    // Atomic settlement transitions
    // =========================================================================

    /// Transition a bet pending -> won|lost, crediting the payout for a
    /// winning single (parlay legs never credit individually).
    ///
    /// Holding the write lock across the status check and the budget write is
    /// what makes settlement at-most-once: a bet already terminal returns
    /// [`SettlementOutcome::NoOp`] and nothing changes.
    pub fn apply_bet_settlement(
        &self,
        bet_id: &str,
        won: bool,
        evidence: String,
    ) -> Result<SettlementOutcome, EngineError> {
        let mut inner = self.inner.write().unwrap();
        let bet = inner
            .bets
            .get_mut(bet_id)
            .ok_or_else(|| EngineError::BetNotFound(bet_id.to_string()))?;

        if bet.status.is_terminal() {
            return Ok(SettlementOutcome::NoOp);
        }

        bet.status = if won { BetStatus::Won } else { BetStatus::Lost };
        bet.evidence = Some(evidence);
        bet.settled_at = Some(Utc::now());

        let credit = if won && bet.combi_id.is_none() {
            Some((bet.potential_payout, member_key(&bet.league_id, &bet.user_id)))
        } else {
            None
        };

        let mut credited = Decimal::ZERO;
        if let Some((payout, key)) = credit {
            if let Some(member) = inner.members.get_mut(&key) {
                member.budget += payout;
                credited = payout;
            }
        }
        Ok(SettlementOutcome::Settled { won, credited })
    }

    /// Transition a parlay pending -> won|lost, crediting the combined payout
    /// on a win. Already-terminal parlays are a no-op.
    pub fn apply_parlay_settlement(
        &self,
        parlay_id: &str,
        won: bool,
    ) -> Result<SettlementOutcome, EngineError> {
        let mut inner = self.inner.write().unwrap();
        let parlay = inner
            .parlays
            .get_mut(parlay_id)
            .ok_or_else(|| EngineError::ParlayNotFound(parlay_id.to_string()))?;

        if parlay.status.is_terminal() {
            return Ok(SettlementOutcome::NoOp);
        }

        parlay.status = if won { BetStatus::Won } else { BetStatus::Lost };
        parlay.settled_at = Some(Utc::now());

        let mut credited = Decimal::ZERO;
        if won {
            let payout = parlay.potential_payout;
            let key = member_key(&parlay.league_id, &parlay.user_id);
            if let Some(member) = inner.members.get_mut(&key) {
                member.budget += payout;
                credited = payout;
            }
        }
        Ok(SettlementOutcome::Settled { won, credited })
    }

    /// Administrative reset: back to pending, evidence cleared, and any
    /// previously credited payout debited so the one settlement path can run
    /// again without double-paying.
    pub fn reset_bet(&self, bet_id: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.write().unwrap();
        let bet = inner
            .bets
            .get_mut(bet_id)
            .ok_or_else(|| EngineError::BetNotFound(bet_id.to_string()))?;

        let debit = if bet.status == BetStatus::Won && bet.combi_id.is_none() {
            Some((bet.potential_payout, member_key(&bet.league_id, &bet.user_id)))
        } else {
            None
        };

        bet.status = BetStatus::Pending;
        bet.evidence = None;
        bet.settled_at = None;

        if let Some((payout, key)) = debit {
            if let Some(member) = inner.members.get_mut(&key) {
                member.budget -= payout;
            }
        }
        Ok(())
    }

    /// Administrative reset for a parlay and all of its legs.
    pub fn reset_parlay(&self, parlay_id: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.write().unwrap();
        let parlay = inner
            .parlays
            .get_mut(parlay_id)
            .ok_or_else(|| EngineError::ParlayNotFound(parlay_id.to_string()))?;

        let debit = if parlay.status == BetStatus::Won {
            Some((
                parlay.potential_payout,
                member_key(&parlay.league_id, &parlay.user_id),
            ))
        } else {
            None
        };

        parlay.status = BetStatus::Pending;
        parlay.settled_at = None;
        let leg_ids = parlay.leg_ids.clone();

        for leg_id in &leg_ids {
            if let Some(leg) = inner.bets.get_mut(leg_id) {
                leg.status = BetStatus::Pending;
                leg.evidence = None;
                leg.settled_at = None;
            }
        }

        if let Some((payout, key)) = debit {
            if let Some(member) = inner.members.get_mut(&key) {
                member.budget -= payout;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Snapshots (operator CLI)
    // =========================================================================

    pub fn to_snapshot(&self) -> Snapshot {
        let inner = self.inner.read().unwrap();
        Snapshot {
            leagues: inner.leagues.values().cloned().collect(),
            members: inner.members.values().cloned().collect(),
            squads: inner.squads.values().cloned().collect(),
            bets: inner.bets.values().cloned().collect(),
            parlays: inner.parlays.values().cloned().collect(),
            stats: inner.stats.values().cloned().collect(),
            players: inner.players.values().cloned().collect(),
            facts: inner.facts.values().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        for league in snapshot.leagues {
            store.upsert_league(league);
        }
        for member in snapshot.members {
            store.upsert_member(member);
        }
        for squad in snapshot.squads {
            store.save_squad(squad);
        }
        for bet in snapshot.bets {
            store.insert_bet(bet);
        }
        for parlay in snapshot.parlays {
            store.insert_parlay(parlay);
        }
        for row in snapshot.stats {
            store.upsert_stats(row);
        }
        for player in snapshot.players {
            store.upsert_player(player);
        }
        for facts in snapshot.facts {
            store.upsert_facts(facts);
        }
        store
    }
}

/// Serializable dump of the store, the CLI's load/save format.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub leagues: Vec<League>,
    #[serde(default)]
    pub members: Vec<LeagueMember>,
    #[serde(default)]
    pub squads: Vec<Squad>,
    #[serde(default)]
    pub bets: Vec<Bet>,
    #[serde(default)]
    pub parlays: Vec<Parlay>,
    #[serde(default)]
    pub stats: Vec<PlayerMatchdayStats>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub facts: Vec<MatchFacts>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Membership storage key: `"{league_id}:{user_id}"`.
fn member_key(league_id: &str, user_id: &str) -> String {
    format!("{league_id}:{user_id}")
}

/// Stats-row storage key enforcing the (player, jornada, season) invariant.
fn stats_key(player_id: &str, jornada: u32, season: u16) -> String {
    format!("{player_id}:{jornada}:{season}")
}

// =============================================================================
// Tests
// =============================================================================
