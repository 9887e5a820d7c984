//! Engine facade.
//!
//! One entry point tying the store, settlement and close machinery together:
//! bet placement with allowance guard rails, settlement sweeps, squad scoring
//! and the jornada close. The operator CLI and the integration tests both
//! drive the engine through this type only.

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::config::Settings;
use crate::data::models::{
    Bet, BetStatus, JornadaStatus, Parlay, PlayerMatchdayStats, Squad, SquadSlot,
};
use crate::errors::EngineError;
use crate::league::close::{CloseConfig, CloseReport, JornadaCloser};
use crate::league::store::LeagueStore;
use crate::scoring::squad::score_squad_sized;
use crate::settlement::engine::{SettlementEngine, SettlementReport};
use crate::settlement::predicates::PredicateRegistry;

const PARLAY_MIN_LEGS: usize = 2;
const PARLAY_MAX_LEGS: usize = 3;

/// A single-bet placement request. For parlay legs the stake is ignored;
/// the parlay carries the one shared stake.
#[derive(Debug, Clone)]
pub struct BetRequest {
    pub fixture_id: String,
    pub bet_type: String,
    pub label: String,
    pub odds: Decimal,
    pub stake: Decimal,
}

pub struct FantasyEngine {
    store: LeagueStore,
    settlement: SettlementEngine,
    registry: PredicateRegistry,
    settings: Settings,
}

impl FantasyEngine {
    pub fn new(store: LeagueStore, settings: Settings) -> Self {
        let settlement = SettlementEngine::new(store.clone(), PredicateRegistry::standard());
        Self {
            store,
            settlement,
            registry: PredicateRegistry::standard(),
            settings,
        }
    }

    pub fn store(&self) -> &LeagueStore {
        &self.store
    }

    // =========================================================================
    // Bet placement
    // =========================================================================

    /// Place a single bet against the league's current jornada.
    ///
    /// Rejected when the jornada is closed, the bet type is unknown, or the
    /// stake exceeds the member's remaining betting allowance. The stake is
    /// debited from the allowance at placement; losses cost nothing more at
    /// settlement.
    pub fn place_bet(
        &self,
        league_id: &str,
        user_id: &str,
        request: BetRequest,
    ) -> Result<Bet, EngineError> {
        let league = self.store.get_league(league_id)?;
        if league.jornada_status == JornadaStatus::Closed {
            return Err(EngineError::BettingLocked(format!(
                "jornada {} of league {} is closed",
                league.current_jornada, league_id
            )));
        }

        // Fail now, not at settlement.
        self.registry.validate(&request.bet_type, &request.label)?;
        validate_odds(request.odds)?;

        let mut bet = self.build_bet(league_id, user_id, league.current_jornada, &request, None);
        bet.stake = request.stake;
        bet.potential_payout = (request.stake * request.odds).round_dp(2);

        self.debit_allowance(league_id, user_id, bet.stake)?;
        self.store.insert_bet(bet.clone());

        info!(
            bet_id = %bet.id,
            user_id,
            bet_type = %bet.bet_type,
            stake = %bet.stake,
            odds = %bet.odds,
            "Bet placed"
        );
        Ok(bet)
    }

    /// Place a parlay: one stake across 2-3 legs, combined odds the product
    /// of the leg odds. Legs are stored as bets tagged with the parlay id and
    /// never pay out individually.
    pub fn place_parlay(
        &self,
        league_id: &str,
        user_id: &str,
        stake: Decimal,
        legs: Vec<BetRequest>,
    ) -> Result<Parlay, EngineError> {
        let league = self.store.get_league(league_id)?;
        if league.jornada_status == JornadaStatus::Closed {
            return Err(EngineError::BettingLocked(format!(
                "jornada {} of league {} is closed",
                league.current_jornada, league_id
            )));
        }
        if !(PARLAY_MIN_LEGS..=PARLAY_MAX_LEGS).contains(&legs.len()) {
            return Err(EngineError::InvalidBet(format!(
                "parlay must have {PARLAY_MIN_LEGS}-{PARLAY_MAX_LEGS} legs, got {}",
                legs.len()
            )));
        }

        let mut combined_odds = Decimal::ONE;
        for leg in &legs {
            self.registry.validate(&leg.bet_type, &leg.label)?;
            validate_odds(leg.odds)?;
            combined_odds *= leg.odds;
        }

        let parlay_id = Uuid::new_v4().to_string();
        let jornada = league.current_jornada;
        // Legs carry zero stake/payout of their own.
        let leg_bets: Vec<Bet> = legs
            .iter()
            .map(|leg| self.build_bet(league_id, user_id, jornada, leg, Some(&parlay_id)))
            .collect();

        let parlay = Parlay {
            id: parlay_id,
            league_id: league_id.to_string(),
            user_id: user_id.to_string(),
            jornada,
            stake,
            odds: combined_odds,
            potential_payout: (stake * combined_odds).round_dp(2),
            status: BetStatus::Pending,
            leg_ids: leg_bets.iter().map(|b| b.id.clone()).collect(),
            created_at: chrono::Utc::now(),
            settled_at: None,
        };

        self.debit_allowance(league_id, user_id, stake)?;
        for bet in leg_bets {
            self.store.insert_bet(bet);
        }
        self.store.insert_parlay(parlay.clone());

        info!(
            parlay_id = %parlay.id,
            user_id,
            legs = parlay.leg_ids.len(),
            stake = %parlay.stake,
            odds = %parlay.odds,
            "Parlay placed"
        );
        Ok(parlay)
    }

    /// Cancel a still-pending single bet while its jornada is open, refunding
    /// the stake to the betting allowance. Parlay legs cannot be cancelled
    /// individually.
    pub fn cancel_bet(&self, bet_id: &str) -> Result<(), EngineError> {
        let bet = self.store.get_bet(bet_id)?;
        let league = self.store.get_league(&bet.league_id)?;
        if league.jornada_status == JornadaStatus::Closed || league.current_jornada != bet.jornada {
            return Err(EngineError::BettingLocked(format!(
                "jornada {} is no longer open for changes",
                bet.jornada
            )));
        }

        // Refund and removal commit together; a second cancel of the same
        // bet finds it gone and fails instead of refunding again.
        let bet = self.store.refund_and_remove_bet(bet_id)?;
        info!(bet_id, stake = %bet.stake, "Bet cancelled, stake refunded");
        Ok(())
    }

    // =========================================================================
    // Settlement & scoring
    // =========================================================================

    /// Settle pending bets and parlays; defaults to the current jornada.
    pub fn evaluate_pending_bets(
        &self,
        league_id: &str,
        jornada: Option<u32>,
    ) -> Result<SettlementReport, EngineError> {
        let jornada = self.resolve_jornada(league_id, jornada)?;
        Ok(self.settlement.settle_jornada(league_id, jornada))
    }

    /// Reset every bet and parlay of the jornada to pending (debiting prior
    /// credits) and settle again through the one settlement path.
    pub fn reevaluate_bets(
        &self,
        league_id: &str,
        jornada: Option<u32>,
    ) -> Result<SettlementReport, EngineError> {
        let jornada = self.resolve_jornada(league_id, jornada)?;
        Ok(self.settlement.reevaluate_jornada(league_id, jornada))
    }

    /// A member's squad score for a jornada; defaults to the current one.
    pub fn score_squad(
        &self,
        league_id: &str,
        user_id: &str,
        jornada: Option<u32>,
    ) -> Result<i32, EngineError> {
        let jornada = self.resolve_jornada(league_id, jornada)?;
        self.store.get_member(league_id, user_id)?;
        let squad = self.store.get_squad(league_id, user_id);
        let points = self.store.points_map(jornada, self.settings.season);
        Ok(score_squad_sized(&squad, &points, self.settings.squad_size))
    }

    /// A player's scored matchday row, breakdown included.
    pub fn player_matchday_points(
        &self,
        player_id: &str,
        jornada: u32,
    ) -> Result<PlayerMatchdayStats, EngineError> {
        self.store
            .get_stats(player_id, jornada, self.settings.season)
            .ok_or_else(|| EngineError::PlayerNotFound(format!("{player_id} (jornada {jornada})")))
    }

    // =========================================================================
    // Squads
    // =========================================================================

    /// Save a member's squad after validation: no more slots than the squad
    /// size, no duplicate players, and at most one captain (a complete squad
    /// must name exactly one).
    pub fn save_squad(
        &self,
        league_id: &str,
        user_id: &str,
        slots: Vec<SquadSlot>,
    ) -> Result<(), EngineError> {
        self.store.get_member(league_id, user_id)?;

        if slots.len() > self.settings.squad_size {
            return Err(EngineError::InvalidSquad(format!(
                "squad holds {} players, limit is {}",
                slots.len(),
                self.settings.squad_size
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for slot in &slots {
            if !seen.insert(slot.player_id.as_str()) {
                return Err(EngineError::InvalidSquad(format!(
                    "player {} appears twice",
                    slot.player_id
                )));
            }
        }

        let captains = slots.iter().filter(|s| s.is_captain).count();
        if captains > 1 || (slots.len() == self.settings.squad_size && captains != 1) {
            return Err(EngineError::InvalidSquad(format!(
                "squad must have exactly one captain, found {captains}"
            )));
        }

        self.store.save_squad(Squad {
            league_id: league_id.to_string(),
            user_id: user_id.to_string(),
            slots,
        });
        Ok(())
    }

    // =========================================================================
    // Jornada lifecycle
    // =========================================================================

    /// Close the current jornada: sync points, settle bets, reconcile
    /// budgets, reset allowances, clear squads, advance the league.
    pub fn close_jornada(&self, league_id: &str) -> Result<CloseReport, EngineError> {
        self.closer().close(league_id)
    }

    /// Reopen betting for the (already advanced) current jornada.
    pub fn open_jornada(&self, league_id: &str) -> Result<(), EngineError> {
        let league = self.store.update_league(league_id, |l| {
            l.jornada_status = JornadaStatus::Open;
        })?;
        info!(league_id, jornada = league.current_jornada, "Jornada opened");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn closer(&self) -> JornadaCloser {
        JornadaCloser::new(
            self.store.clone(),
            SettlementEngine::new(self.store.clone(), PredicateRegistry::standard()),
            CloseConfig {
                base_budget: self.settings.base_budget,
                betting_allowance: self.settings.betting_allowance,
                squad_size: self.settings.squad_size,
                season: self.settings.season,
            },
        )
    }

    fn resolve_jornada(&self, league_id: &str, jornada: Option<u32>) -> Result<u32, EngineError> {
        match jornada {
            Some(j) => Ok(j),
            None => Ok(self.store.get_league(league_id)?.current_jornada),
        }
    }

    fn build_bet(
        &self,
        league_id: &str,
        user_id: &str,
        jornada: u32,
        request: &BetRequest,
        combi_id: Option<&str>,
    ) -> Bet {
        Bet {
            id: Uuid::new_v4().to_string(),
            league_id: league_id.to_string(),
            user_id: user_id.to_string(),
            jornada,
            fixture_id: request.fixture_id.clone(),
            bet_type: request.bet_type.clone(),
            label: request.label.clone(),
            odds: request.odds,
            stake: Decimal::ZERO,
            potential_payout: Decimal::ZERO,
            status: BetStatus::Pending,
            combi_id: combi_id.map(str::to_string),
            evidence: None,
            created_at: chrono::Utc::now(),
            settled_at: None,
        }
    }

    /// Debit a stake from the member's betting allowance. The overdraft
    /// check and the debit run inside one store write lock, so two racing
    /// placements can never both pass the check.
    fn debit_allowance(
        &self,
        league_id: &str,
        user_id: &str,
        stake: Decimal,
    ) -> Result<(), EngineError> {
        if stake <= Decimal::ZERO {
            return Err(EngineError::InvalidBet("stake must be positive".into()));
        }
        self.store.try_update_member(league_id, user_id, |m| {
            if stake > m.betting_budget {
                return Err(EngineError::InvalidBet(format!(
                    "stake {stake} exceeds remaining betting allowance {}",
                    m.betting_budget
                )));
            }
            m.betting_budget -= stake;
            Ok(())
        })?;
        Ok(())
    }
}

fn validate_odds(odds: Decimal) -> Result<(), EngineError> {
    if odds <= Decimal::ONE {
        return Err(EngineError::InvalidBet(format!(
            "odds must exceed 1.0, got {odds}"
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
