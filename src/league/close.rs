//! Jornada close and budget reconciliation.
//!
//! The orchestrating state machine that ends a matchday, in strict order:
//! sync matchday points, settle pending bets and parlays, recompute each
//! member's budget from the fixed-baseline formula, reset betting allowances,
//! clear squads, advance the league. Per-member and per-bet failures are
//! collected into the report; they never abort the close of unrelated
//! members.
//!
//! Re-runnability: members record `last_reconciled_jornada` when their budget
//! formula commits, so a close that crashed between the budget step and the
//! squad clear can be re-run without re-applying the formula against the
//! already-reset balance (which would silently drop the matchday's betting
//! profit).

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::data::models::JornadaStatus;
use crate::errors::EngineError;
use crate::scoring::squad::score_squad_sized;
use crate::settlement::engine::SettlementEngine;

use super::store::LeagueStore;

/// Close-time constants, sourced from `Settings`.
#[derive(Debug, Clone)]
pub struct CloseConfig {
    /// Fixed baseline anchoring the initial-budget formula. Never the
    /// member's previous initial budget.
    pub base_budget: Decimal,
    /// Per-matchday betting allowance every member is reset to.
    pub betting_allowance: Decimal,
    pub squad_size: usize,
    pub season: u16,
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            base_budget: Decimal::new(500, 0),
            betting_allowance: Decimal::new(250, 0),
            squad_size: 11,
            season: 2025,
        }
    }
}

/// Result of one close invocation.
#[derive(Debug, Serialize)]
pub struct CloseReport {
    pub success: bool,
    pub jornada: u32,
    pub evaluated_bets: usize,
    pub updated_members: usize,
    /// user id -> budget after reconciliation.
    pub balances: HashMap<String, Decimal>,
    pub errors: Vec<String>,
}

pub struct JornadaCloser {
    store: LeagueStore,
    settlement: SettlementEngine,
    config: CloseConfig,
}

impl JornadaCloser {
    pub fn new(store: LeagueStore, settlement: SettlementEngine, config: CloseConfig) -> Self {
        Self {
            store,
            settlement,
            config,
        }
    }

    /// Close the league's current jornada.
    pub fn close(&self, league_id: &str) -> Result<CloseReport, EngineError> {
        let league = self.store.get_league(league_id)?;
        let jornada = league.current_jornada;
        let members = self.store.members_of(league_id);

        info!(
            league_id,
            jornada,
            members = members.len(),
            "Closing jornada"
        );

        let mut errors: Vec<String> = Vec::new();

        // Step 1: sync matchday points. Members already reconciled for this
        // jornada are a resumed partial close; their squads may have been
        // cleared, so their recorded points are left untouched.
        let points_map = self.store.points_map(jornada, self.config.season);
        for member in &members {
            if member.last_reconciled_jornada == Some(jornada) {
                debug!(user_id = %member.user_id, "Already reconciled, skipping sync");
                continue;
            }
            if let Err(e) = self.sync_member_points(member, jornada, &points_map) {
                errors.push(format!("points sync {}: {}", member.user_id, e));
            }
        }

        // Step 2: settle all pending bets and parlays for this jornada.
        let settlement_report = self.settlement.settle_jornada(league_id, jornada);
        let evaluated_bets = settlement_report.evaluated + settlement_report.parlays_settled;
        errors.extend(settlement_report.errors);

        // Steps 3-4: budget reconciliation and allowance reset per member.
        let mut balances: HashMap<String, Decimal> = HashMap::new();
        let mut updated_members = 0;
        for member in &members {
            match self.reconcile_member(league_id, &member.user_id, jornada) {
                Ok(budget) => {
                    balances.insert(member.user_id.clone(), budget);
                    updated_members += 1;
                }
                Err(e) => {
                    warn!(user_id = %member.user_id, error = %e, "Budget reconciliation failed");
                    errors.push(format!("budget {}: {}", member.user_id, e));
                }
            }
        }

        // Step 5: clear every squad; members redraft before the next jornada.
        let cleared = self.store.clear_squads(league_id);

        // Step 6: advance league state and lock betting.
        self.store.update_league(league_id, |l| {
            l.current_jornada = jornada + 1;
            l.jornada_status = JornadaStatus::Closed;
        })?;

        info!(
            league_id,
            jornada,
            evaluated_bets,
            updated_members,
            squads_cleared = cleared,
            errors = errors.len(),
            "Jornada closed"
        );

        Ok(CloseReport {
            success: true,
            jornada,
            evaluated_bets,
            updated_members,
            balances,
            errors,
        })
    }

    /// Step 1 for one member: recompute the squad score and write it only if
    /// it differs from the recorded value (no write on match, so repeated
    /// invocations are idempotent).
    fn sync_member_points(
        &self,
        member: &crate::data::models::LeagueMember,
        jornada: u32,
        points_map: &HashMap<String, i32>,
    ) -> Result<(), EngineError> {
        let squad = self.store.get_squad(&member.league_id, &member.user_id);
        let computed = score_squad_sized(&squad, points_map, self.config.squad_size);

        if member.points_per_jornada.get(&jornada) == Some(&computed) {
            return Ok(());
        }

        debug!(
            user_id = %member.user_id,
            jornada,
            recorded = ?member.points_per_jornada.get(&jornada),
            computed,
            "Syncing matchday points"
        );

        self.store
            .update_member(&member.league_id, &member.user_id, |m| {
                m.points_per_jornada.insert(jornada, computed);
                m.points = m.total_from_jornadas();
            })?;
        Ok(())
    }

    /// Steps 3-4 for one member: the fixed-baseline budget formula, then the
    /// allowance reset.
    ///
    /// `betting_balance` is measured against the member's *recorded* previous
    /// initial budget, not the BASE constant: a wrong prior baseline must be
    /// fixed explicitly, never silently re-derived.
    fn reconcile_member(
        &self,
        league_id: &str,
        user_id: &str,
        jornada: u32,
    ) -> Result<Decimal, EngineError> {
        let base = self.config.base_budget;
        let allowance = self.config.betting_allowance;

        let member = self
            .store
            .update_member(league_id, user_id, |m| {
                if m.last_reconciled_jornada == Some(jornada) {
                    return;
                }
                let betting_balance = m.budget - m.initial_budget;
                let jornada_points = m.points_per_jornada.get(&jornada).copied().unwrap_or(0);
                let new_initial = base + betting_balance + Decimal::from(jornada_points);

                m.initial_budget = new_initial;
                m.budget = new_initial;
                m.betting_budget = allowance;
                m.last_reconciled_jornada = Some(jornada);
            })?;

        Ok(member.budget)
    }
}

// =============================================================================
// Tests
// =============================================================================
