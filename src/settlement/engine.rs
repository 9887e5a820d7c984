//! Bet and parlay settlement engine.
//!
//! One settlement path for everything: live jornada closes, operator
//! `evaluate` sweeps and re-evaluation tooling all funnel through
//! [`SettlementEngine::settle_jornada`]. Re-evaluation is reset-then-settle,
//! never a second scoring code path.
//!
//! Status transitions are pending -> won | lost only; the store applies them
//! under its write lock so a bet can never be settled (or paid) twice.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::data::models::{Bet, BetStatus, MatchFacts, Parlay};
use crate::errors::EngineError;
use crate::league::store::{LeagueStore, SettlementOutcome};

use super::predicates::PredicateRegistry;

/// Outcome of evaluating one bet against realized match facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetEvaluation {
    pub won: bool,
    pub evidence: String,
}

/// Batch settlement result, returned alongside any per-bet errors so
/// operators can re-run only the failed subset.
#[derive(Debug, Default, Serialize)]
pub struct SettlementReport {
    pub evaluated: usize,
    pub won: usize,
    pub lost: usize,
    pub parlays_settled: usize,
    pub credited: Decimal,
    pub errors: Vec<String>,
}

/// Evaluate a single bet against match facts. Pure: no state is touched.
pub fn evaluate_bet(
    bet: &Bet,
    facts: &MatchFacts,
    registry: &PredicateRegistry,
) -> Result<BetEvaluation, EngineError> {
    let predicate = registry.resolve(&bet.bet_type, &bet.label)?;

    let won = predicate(facts).ok_or_else(|| {
        EngineError::InvalidBet(format!(
            "facts for fixture {} cannot decide '{} / {}'",
            facts.fixture_id, bet.bet_type, bet.label
        ))
    })?;

    let evidence = format!(
        "{} / {}: final {}-{}{} => {}",
        bet.bet_type,
        bet.label,
        facts.home_goals,
        facts.away_goals,
        match (facts.total_corners, facts.total_cards) {
            (Some(c), Some(k)) => format!(", corners {c}, cards {k}"),
            (Some(c), None) => format!(", corners {c}"),
            (None, Some(k)) => format!(", cards {k}"),
            (None, None) => String::new(),
        },
        if won { "won" } else { "lost" }
    );

    Ok(BetEvaluation { won, evidence })
}

/// Derive a parlay's status from its legs: lost if any leg lost, won iff all
/// legs won, otherwise still pending (never speculatively resolved).
pub fn parlay_status(legs: &[Bet]) -> BetStatus {
    if legs.iter().any(|l| l.status == BetStatus::Lost) {
        return BetStatus::Lost;
    }
    if !legs.is_empty() && legs.iter().all(|l| l.status == BetStatus::Won) {
        return BetStatus::Won;
    }
    BetStatus::Pending
}

/// Settlement orchestrator over the store.
pub struct SettlementEngine {
    store: LeagueStore,
    registry: PredicateRegistry,
}

impl SettlementEngine {
    pub fn new(store: LeagueStore, registry: PredicateRegistry) -> Self {
        Self { store, registry }
    }

    /// Settle every pending bet and parlay for (league, jornada).
    ///
    /// Per-bet failures (unsupported type, missing facts) are collected into
    /// the report and never abort the sweep. Already-terminal bets are
    /// skipped, which makes the sweep re-runnable.
    pub fn settle_jornada(&self, league_id: &str, jornada: u32) -> SettlementReport {
        let mut report = SettlementReport::default();

        for bet in self.store.bets_for_jornada(league_id, jornada) {
            if !bet.is_pending() {
                continue;
            }
            match self.settle_single(&bet) {
                Ok(Some((won, credited))) => {
                    report.evaluated += 1;
                    if won {
                        report.won += 1;
                    } else {
                        report.lost += 1;
                    }
                    report.credited += credited;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(bet_id = %bet.id, error = %e, "Bet settlement skipped");
                    report.errors.push(format!("bet {}: {}", bet.id, e));
                }
            }
        }

        self.settle_parlays(league_id, jornada, &mut report);

        info!(
            league_id,
            jornada,
            evaluated = report.evaluated,
            won = report.won,
            lost = report.lost,
            parlays = report.parlays_settled,
            credited = %report.credited,
            errors = report.errors.len(),
            "Settlement sweep done"
        );
        report
    }

    /// Evaluate and commit one bet. Returns `Ok(None)` when the transition
    /// was a no-op (bet already terminal — idempotence guard).
    fn settle_single(&self, bet: &Bet) -> Result<Option<(bool, Decimal)>, EngineError> {
        let facts = self
            .store
            .get_facts(&bet.fixture_id)
            .ok_or_else(|| EngineError::MissingMatchFacts(bet.fixture_id.clone()))?;

        let evaluation = evaluate_bet(bet, &facts, &self.registry)?;

        match self
            .store
            .apply_bet_settlement(&bet.id, evaluation.won, evaluation.evidence)?
        {
            SettlementOutcome::Settled { won, credited } => Ok(Some((won, credited))),
            SettlementOutcome::NoOp => Ok(None),
        }
    }

    /// Resolve parlays whose legs have all reached a terminal status.
    fn settle_parlays(&self, league_id: &str, jornada: u32, report: &mut SettlementReport) {
        for parlay in self.store.parlays_for_jornada(league_id, jornada) {
            if parlay.status.is_terminal() {
                continue;
            }
            match self.resolve_parlay(&parlay) {
                Ok(Some((won, credited))) => {
                    report.parlays_settled += 1;
                    if won {
                        report.won += 1;
                    } else {
                        report.lost += 1;
                    }
                    report.credited += credited;
                }
                Ok(None) => {} // legs still pending
                Err(e) => {
                    warn!(parlay_id = %parlay.id, error = %e, "Parlay settlement skipped");
                    report.errors.push(format!("parlay {}: {}", parlay.id, e));
                }
            }
        }
    }

    fn resolve_parlay(&self, parlay: &Parlay) -> Result<Option<(bool, Decimal)>, EngineError> {
        let legs: Vec<Bet> = parlay
            .leg_ids
            .iter()
            .map(|id| self.store.get_bet(id))
            .collect::<Result<_, _>>()?;

        match parlay_status(&legs) {
            BetStatus::Pending => Ok(None),
            BetStatus::Won => match self.store.apply_parlay_settlement(&parlay.id, true)? {
                SettlementOutcome::Settled { credited, .. } => Ok(Some((true, credited))),
                SettlementOutcome::NoOp => Ok(None),
            },
            BetStatus::Lost => match self.store.apply_parlay_settlement(&parlay.id, false)? {
                SettlementOutcome::Settled { .. } => Ok(Some((false, Decimal::ZERO))),
                SettlementOutcome::NoOp => Ok(None),
            },
        }
    }

    /// Re-evaluation tooling: reset every bet and parlay for the jornada to
    /// pending (debiting any payouts already credited), then run the one
    /// settlement path again.
    pub fn reevaluate_jornada(&self, league_id: &str, jornada: u32) -> SettlementReport {
        for parlay in self.store.parlays_for_jornada(league_id, jornada) {
            if let Err(e) = self.store.reset_parlay(&parlay.id) {
                warn!(parlay_id = %parlay.id, error = %e, "Parlay reset failed");
            }
        }
        for bet in self.store.bets_for_jornada(league_id, jornada) {
            if bet.combi_id.is_some() {
                continue; // already reset with its parlay
            }
            if let Err(e) = self.store.reset_bet(&bet.id) {
                warn!(bet_id = %bet.id, error = %e, "Bet reset failed");
            }
        }

        info!(league_id, jornada, "Reset complete, re-running settlement");
        self.settle_jornada(league_id, jornada)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::data::models::{League, LeagueMember};

    fn facts(fixture: &str, home: u32, away: u32) -> MatchFacts {
        MatchFacts {
            fixture_id: fixture.to_string(),
            home_team_id: "h".into(),
            away_team_id: "a".into(),
            home_goals: home,
            away_goals: away,
            total_corners: Some(10),
            total_cards: Some(3),
            finished: true,
        }
    }

    fn bet(id: &str, fixture: &str, bet_type: &str, label: &str, odds: Decimal) -> Bet {
        let stake = dec!(50);
        Bet {
            id: id.to_string(),
            league_id: "l1".into(),
            user_id: "u1".into(),
            jornada: 12,
            fixture_id: fixture.to_string(),
            bet_type: bet_type.to_string(),
            label: label.to_string(),
            odds,
            stake,
            potential_payout: (stake * odds).round_dp(2),
            status: BetStatus::Pending,
            combi_id: None,
            evidence: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    fn store_with_member() -> LeagueStore {
        let store = LeagueStore::new();
        store.upsert_league(League {
            id: "l1".into(),
            name: "Test".into(),
            current_jornada: 12,
            jornada_status: Default::default(),
        });
        store.upsert_member(LeagueMember::new("l1", "u1", dec!(500), dec!(250)));
        store
    }

    fn engine(store: &LeagueStore) -> SettlementEngine {
        SettlementEngine::new(store.clone(), PredicateRegistry::standard())
    }

    #[test]
    fn winning_single_credits_payout_once() {
        // Stake 50 @ 2.04 => payout 102.00 credited exactly once.
        let store = store_with_member();
        store.upsert_facts(facts("f1", 2, 0));
        store.insert_bet(bet("b1", "f1", "Match Winner", "Home", dec!(2.04)));

        let engine = engine(&store);
        let report = engine.settle_jornada("l1", 12);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.won, 1);
        assert_eq!(report.credited, dec!(102.00));
        assert_eq!(store.get_member("l1", "u1").unwrap().budget, dec!(602.00));

        // Second sweep without a reset: no-op, no double credit.
        let second = engine.settle_jornada("l1", 12);
        assert_eq!(second.evaluated, 0);
        assert_eq!(store.get_member("l1", "u1").unwrap().budget, dec!(602.00));
        assert_eq!(store.get_bet("b1").unwrap().status, BetStatus::Won);
    }

    #[test]
    fn losing_single_credits_nothing() {
        // Stake was deducted at placement, not here.
        let store = store_with_member();
        store.upsert_facts(facts("f1", 0, 1));
        store.insert_bet(bet("b1", "f1", "Match Winner", "Home", dec!(1.80)));

        let report = engine(&store).settle_jornada("l1", 12);
        assert_eq!(report.lost, 1);
        assert_eq!(report.credited, Decimal::ZERO);
        assert_eq!(store.get_member("l1", "u1").unwrap().budget, dec!(500));
        assert_eq!(store.get_bet("b1").unwrap().status, BetStatus::Lost);
    }

    #[test]
    fn unsupported_type_reported_not_lost() {
        let store = store_with_member();
        store.upsert_facts(facts("f1", 1, 0));
        store.insert_bet(bet("b1", "f1", "First Scorer", "Somebody", dec!(5.0)));

        let report = engine(&store).settle_jornada("l1", 12);
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.errors.len(), 1);
        // Bet stays pending for operator attention.
        assert_eq!(store.get_bet("b1").unwrap().status, BetStatus::Pending);
    }

    #[test]
    fn parlay_all_or_nothing() {
        // [won, won, lost] => lost; [won, won, won] => won;
        // [won, pending, won] => pending.
        let won = |id| {
            let mut b = bet(id, "f1", "Match Winner", "Home", dec!(1.5));
            b.status = BetStatus::Won;
            b
        };
        let lost = |id| {
            let mut b = bet(id, "f1", "Match Winner", "Away", dec!(1.5));
            b.status = BetStatus::Lost;
            b
        };
        let pending = |id| bet(id, "f1", "Match Winner", "Draw", dec!(1.5));

        assert_eq!(
            parlay_status(&[won("a"), won("b"), lost("c")]),
            BetStatus::Lost
        );
        assert_eq!(
            parlay_status(&[won("a"), won("b"), won("c")]),
            BetStatus::Won
        );
        assert_eq!(
            parlay_status(&[won("a"), pending("b"), won("c")]),
            BetStatus::Pending
        );
    }

    #[test]
    fn parlay_payout_is_product_of_leg_odds() {
        // Legs @ 2.0 and 1.5 on one 40 stake => payout 40 * 3.0 = 120.
        // Leg wins never credit individually.
        let store = store_with_member();
        store.upsert_facts(facts("f1", 2, 0)); // home win, home clean sheet
        store.upsert_facts(facts("f2", 1, 1)); // draw

        let mut leg1 = bet("b1", "f1", "Match Winner", "Home", dec!(2.0));
        leg1.combi_id = Some("c1".into());
        let mut leg2 = bet("b2", "f2", "Match Winner", "Draw", dec!(1.5));
        leg2.combi_id = Some("c1".into());
        store.insert_bet(leg1);
        store.insert_bet(leg2);
        store.insert_parlay(Parlay {
            id: "c1".into(),
            league_id: "l1".into(),
            user_id: "u1".into(),
            jornada: 12,
            stake: dec!(40),
            odds: dec!(3.0),
            potential_payout: dec!(120),
            status: BetStatus::Pending,
            leg_ids: vec!["b1".into(), "b2".into()],
            created_at: Utc::now(),
            settled_at: None,
        });

        let report = engine(&store).settle_jornada("l1", 12);
        assert_eq!(report.parlays_settled, 1);
        assert_eq!(report.credited, dec!(120));
        // Only the parlay payout landed: 500 + 120.
        assert_eq!(store.get_member("l1", "u1").unwrap().budget, dec!(620));
        assert_eq!(store.get_parlay("c1").unwrap().status, BetStatus::Won);
    }

    #[test]
    fn parlay_waits_for_pending_leg() {
        let store = store_with_member();
        store.upsert_facts(facts("f1", 2, 0));
        // No facts for f2: its leg stays pending.

        let mut leg1 = bet("b1", "f1", "Match Winner", "Home", dec!(2.0));
        leg1.combi_id = Some("c1".into());
        let mut leg2 = bet("b2", "f2", "Match Winner", "Draw", dec!(1.5));
        leg2.combi_id = Some("c1".into());
        store.insert_bet(leg1);
        store.insert_bet(leg2);
        store.insert_parlay(Parlay {
            id: "c1".into(),
            league_id: "l1".into(),
            user_id: "u1".into(),
            jornada: 12,
            stake: dec!(40),
            odds: dec!(3.0),
            potential_payout: dec!(120),
            status: BetStatus::Pending,
            leg_ids: vec!["b1".into(), "b2".into()],
            created_at: Utc::now(),
            settled_at: None,
        });

        let report = engine(&store).settle_jornada("l1", 12);
        assert_eq!(report.parlays_settled, 0);
        assert_eq!(store.get_parlay("c1").unwrap().status, BetStatus::Pending);
        // The missing-facts leg was reported.
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn reevaluate_resets_then_settles() {
        // A wrongly settled bet is corrected by reset-then-reevaluate,
        // debiting the earlier credit before re-crediting (or not).
        let store = store_with_member();
        store.upsert_facts(facts("f1", 0, 2));
        store.insert_bet(bet("b1", "f1", "Match Winner", "Home", dec!(2.0)));

        // Wrong manual settlement: marked won, 100 credited.
        store
            .apply_bet_settlement("b1", true, "manual".into())
            .unwrap();
        assert_eq!(store.get_member("l1", "u1").unwrap().budget, dec!(600.00));

        let report = engine(&store).reevaluate_jornada("l1", 12);
        assert_eq!(report.lost, 1);
        assert_eq!(store.get_bet("b1").unwrap().status, BetStatus::Lost);
        // The wrong credit was debited on reset and never re-credited.
        assert_eq!(store.get_member("l1", "u1").unwrap().budget, dec!(500.00));
    }
}
