//! End-to-end tests for the jornada engine.
//!
//! Every test includes a hand-calculated expected value comment so that any
//! scoring or budget-formula regression is caught BEFORE it reaches a league.
//!
//! Modules under test:
//!   1. Scoring pipeline           (src/scoring/rules.rs, src/data/ingest.rs)
//!   2. Squad aggregation          (src/scoring/squad.rs)
//!   3. Bet & parlay settlement    (src/settlement/engine.rs)
//!   4. Jornada close              (src/league/close.rs)
//!   5. Engine facade              (src/engine.rs)

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use jornada_engine::config::Settings;
use jornada_engine::data::ingest::build_matchday_row;
use jornada_engine::data::models::{
    BetStatus, JornadaStatus, League, LeagueMember, MatchFacts, Player, PlayerMatchdayStats,
    RawPlayerStats, Role, Squad, SquadSlot,
};
use jornada_engine::data::provider::FixturePlayerLine;
use jornada_engine::engine::{BetRequest, FantasyEngine};
use jornada_engine::league::store::LeagueStore;

// =============================================================================
// Helpers
// =============================================================================

fn settings() -> Settings {
    Settings {
        provider_base_url: String::new(),
        provider_api_key: String::new(),
        provider_rate_limit: 10,
        provider_max_retries: 3,
        provider_timeout_secs: 30,
        season: 2025,
        base_budget: dec!(500),
        betting_allowance: dec!(250),
        clean_sheet_minutes: 60,
        squad_size: 11,
        log_level: "info".into(),
        log_json: false,
    }
}

fn seeded_store(jornada: u32) -> LeagueStore {
    let store = LeagueStore::new();
    store.upsert_league(League {
        id: "liga".into(),
        name: "La Quiniela".into(),
        current_jornada: jornada,
        jornada_status: JornadaStatus::Open,
    });
    store.upsert_member(LeagueMember::new("liga", "ana", dec!(500), dec!(250)));
    store
}

fn facts(fixture: &str, home: u32, away: u32) -> MatchFacts {
    MatchFacts {
        fixture_id: fixture.to_string(),
        home_team_id: "rma".into(),
        away_team_id: "fcb".into(),
        home_goals: home,
        away_goals: away,
        total_corners: Some(8),
        total_cards: Some(3),
        finished: true,
    }
}

fn stats_row(player: &str, jornada: u32, points: i32) -> PlayerMatchdayStats {
    PlayerMatchdayStats {
        player_id: player.to_string(),
        jornada,
        season: 2025,
        stats: RawPlayerStats::default(),
        total_points: points,
        breakdown: Vec::new(),
        updated_at: chrono::Utc::now(),
    }
}

/// Captain worth 9 plus ten players worth 7 each: 9*2 + 70 = 88.
fn seed_squad_scoring_88(store: &LeagueStore, jornada: u32) {
    let mut slots = vec![SquadSlot {
        player_id: "cap".into(),
        is_captain: true,
    }];
    store.upsert_stats(stats_row("cap", jornada, 9));
    for i in 0..10 {
        let id = format!("p{i}");
        store.upsert_stats(stats_row(&id, jornada, 7));
        slots.push(SquadSlot {
            player_id: id,
            is_captain: false,
        });
    }
    store.save_squad(Squad {
        league_id: "liga".into(),
        user_id: "ana".into(),
        slots,
    });
}

fn request(fixture: &str, bet_type: &str, label: &str, odds: Decimal, stake: Decimal) -> BetRequest {
    BetRequest {
        fixture_id: fixture.to_string(),
        bet_type: bet_type.to_string(),
        label: label.to_string(),
        odds,
        stake,
    }
}

// =============================================================================
// 1. Scoring pipeline
// =============================================================================

#[test]
fn ingest_pipeline_scores_attacker() {
    // Attacker, 90 min: +2 minutes, 2 goals * 6 = +12, 1 assist = +3,
    // rating 8.3 => +3, 4 shots on => floor(4/2) = +2, 3 key passes => +1,
    // 1 yellow = -1. Total = 22.
    let line = FixturePlayerLine {
        player: Player {
            id: "vini".into(),
            name: "Vini".into(),
            role: Role::Attacker,
            team_id: "rma".into(),
        },
        stats: RawPlayerStats {
            games: Some(1),
            minutes: 90,
            rating: Some(8.3),
            goals: 2,
            assists: 1,
            shots_on_target: 4,
            key_passes: 3,
            yellow_cards: 1,
            ..Default::default()
        },
    };

    let row = build_matchday_row(&line, &facts("f1", 3, 1), 12, 2025, 60);
    assert_eq!(row.total_points, 22);
    let summed: i32 = row.breakdown.iter().map(|i| i.points).sum();
    assert_eq!(summed, 22);
}

#[test]
fn ingest_pipeline_defender_uses_team_concede_count() {
    // Defender on the away side; team conceded 3, so no clean sheet even
    // though the personal line says 0. 90 min => +2 only.
    let line = FixturePlayerLine {
        player: Player {
            id: "def".into(),
            name: "Def".into(),
            role: Role::Defender,
            team_id: "fcb".into(),
        },
        stats: RawPlayerStats {
            games: Some(1),
            minutes: 90,
            goals_conceded: 0,
            ..Default::default()
        },
    };

    let row = build_matchday_row(&line, &facts("f1", 3, 1), 12, 2025, 60);
    assert_eq!(row.stats.goals_conceded, 3);
    assert_eq!(row.total_points, 2);
}

#[test]
fn reingesting_overwrites_instead_of_duplicating() {
    let store = seeded_store(12);
    store.upsert_stats(stats_row("cap", 12, 5));
    store.upsert_stats(stats_row("cap", 12, 9));

    let map = store.points_map(12, 2025);
    assert_eq!(map.len(), 1);
    assert_eq!(map["cap"], 9);
}

// =============================================================================
// 2. Squad aggregation through the facade
// =============================================================================

#[test]
fn squad_score_doubles_captain() {
    // Captain 9 doubled + 10 * 7 = 88.
    let store = seeded_store(12);
    seed_squad_scoring_88(&store, 12);

    let engine = FantasyEngine::new(store, settings());
    assert_eq!(engine.score_squad("liga", "ana", None).unwrap(), 88);
}

#[test]
fn incomplete_squad_scores_zero_through_facade() {
    // 10 players, all with big totals: still 0.
    let store = seeded_store(12);
    let mut slots = Vec::new();
    for i in 0..10 {
        let id = format!("p{i}");
        store.upsert_stats(stats_row(&id, 12, 12));
        slots.push(SquadSlot {
            player_id: id,
            is_captain: i == 0,
        });
    }
    store.save_squad(Squad {
        league_id: "liga".into(),
        user_id: "ana".into(),
        slots,
    });

    let engine = FantasyEngine::new(store, settings());
    assert_eq!(engine.score_squad("liga", "ana", None).unwrap(), 0);
}

// =============================================================================
// 3. Settlement through the facade
// =============================================================================

#[test]
fn settlement_sweep_is_idempotent() {
    // Win 50 @ 2.04 => 102.00 credited exactly once across two sweeps.
    let store = seeded_store(12);
    store.upsert_facts(facts("f1", 2, 0));
    let engine = FantasyEngine::new(store.clone(), settings());

    engine
        .place_bet("liga", "ana", request("f1", "Match Winner", "Home", dec!(2.04), dec!(50)))
        .unwrap();

    let first = engine.evaluate_pending_bets("liga", None).unwrap();
    assert_eq!(first.won, 1);
    assert_eq!(first.credited, dec!(102.00));
    assert_eq!(store.get_member("liga", "ana").unwrap().budget, dec!(602.00));

    let second = engine.evaluate_pending_bets("liga", None).unwrap();
    assert_eq!(second.evaluated, 0);
    assert_eq!(store.get_member("liga", "ana").unwrap().budget, dec!(602.00));
}

#[test]
fn parlay_settles_all_or_nothing_through_facade() {
    // Legs: home win @ 2.0 (hits) and over 2.5 goals @ 1.5 (misses on 2-0).
    // One lost leg sinks the parlay: nothing credited.
    let store = seeded_store(12);
    store.upsert_facts(facts("f1", 2, 0));
    let engine = FantasyEngine::new(store.clone(), settings());

    let parlay = engine
        .place_parlay(
            "liga",
            "ana",
            dec!(40),
            vec![
                request("f1", "Match Winner", "Home", dec!(2.0), Decimal::ZERO),
                request("f1", "Goals Over/Under", "Over 2.5", dec!(1.5), Decimal::ZERO),
            ],
        )
        .unwrap();

    let report = engine.evaluate_pending_bets("liga", None).unwrap();
    assert_eq!(report.parlays_settled, 1);
    assert_eq!(report.credited, Decimal::ZERO);
    assert_eq!(store.get_parlay(&parlay.id).unwrap().status, BetStatus::Lost);
    // Budget never moved; the 40 stake came out of the allowance at placement.
    assert_eq!(store.get_member("liga", "ana").unwrap().budget, dec!(500));
    assert_eq!(
        store.get_member("liga", "ana").unwrap().betting_budget,
        dec!(210)
    );
}

// =============================================================================
// 4 & 5. Full jornada lifecycle
// =============================================================================

#[test]
fn full_jornada_lifecycle() {
    // Jornada 12. Ana starts at budget 500, initial 500, allowance 250.
    //
    // Bets (stakes debit the allowance, never the budget):
    //   A: 50 @ 2.04, Match Winner Home on f1 (2-0)      => won, +102.00
    //   B: 20 @ 1.75, Goals Over/Under Over 2.5 on f2 (2-2) => won, +35.00
    //   C: 30 @ 3.00, Match Winner Away on f1            => lost, +0
    // Allowance after placement: 250 - 100 = 150.
    // Budget after settlement: 500 + 102 + 35 = 637.
    //
    // Squad scores 88 (captain 9 doubled + 10 * 7).
    //
    // Close: new initial = 500 + (637 - 500) + 88 = 725; budget = 725;
    // allowance reset to 250; squads cleared; league at jornada 13, closed.
    let store = seeded_store(12);
    store.upsert_facts(facts("f1", 2, 0));
    store.upsert_facts(facts("f2", 2, 2));
    seed_squad_scoring_88(&store, 12);

    let engine = FantasyEngine::new(store.clone(), settings());
    engine
        .place_bet("liga", "ana", request("f1", "Match Winner", "Home", dec!(2.04), dec!(50)))
        .unwrap();
    engine
        .place_bet(
            "liga",
            "ana",
            request("f2", "Goals Over/Under", "Over 2.5", dec!(1.75), dec!(20)),
        )
        .unwrap();
    engine
        .place_bet("liga", "ana", request("f1", "Match Winner", "Away", dec!(3.00), dec!(30)))
        .unwrap();

    assert_eq!(
        store.get_member("liga", "ana").unwrap().betting_budget,
        dec!(150)
    );

    let report = engine.close_jornada("liga").unwrap();
    assert!(report.success);
    assert_eq!(report.jornada, 12);
    assert_eq!(report.evaluated_bets, 3);
    assert_eq!(report.updated_members, 1);
    assert!(report.errors.is_empty());
    assert_eq!(report.balances["ana"], dec!(725.00));

    let member = store.get_member("liga", "ana").unwrap();
    assert_eq!(member.points_per_jornada[&12], 88);
    assert_eq!(member.points, 88);
    assert_eq!(member.budget, dec!(725.00));
    assert_eq!(member.initial_budget, dec!(725.00));
    assert_eq!(member.betting_budget, dec!(250));

    let league = store.get_league("liga").unwrap();
    assert_eq!(league.current_jornada, 13);
    assert_eq!(league.jornada_status, JornadaStatus::Closed);

    assert!(store.get_squad("liga", "ana").slots.is_empty());

    // Betting stays locked until the next jornada opens.
    let err = engine
        .place_bet("liga", "ana", request("f3", "Match Winner", "Home", dec!(1.9), dec!(10)))
        .unwrap_err();
    assert!(matches!(
        err,
        jornada_engine::errors::EngineError::BettingLocked(_)
    ));
    engine.open_jornada("liga").unwrap();
    assert!(engine
        .place_bet("liga", "ana", request("f3", "Match Winner", "Home", dec!(1.9), dec!(10)))
        .is_ok());
}

#[test]
fn close_with_non_baseline_initial_budget() {
    // Ana's previous initial budget is 600 (not the baseline 500):
    // betting balance = 637 - 600 = 37, so new initial = 500 + 37 + 88 = 625.
    let store = seeded_store(12);
    store
        .update_member("liga", "ana", |m| {
            m.budget = dec!(637);
            m.initial_budget = dec!(600);
        })
        .unwrap();
    seed_squad_scoring_88(&store, 12);

    let engine = FantasyEngine::new(store.clone(), settings());
    let report = engine.close_jornada("liga").unwrap();
    assert_eq!(report.balances["ana"], dec!(625));

    let member = store.get_member("liga", "ana").unwrap();
    assert_eq!(member.initial_budget, dec!(625));
    assert_eq!(member.budget, dec!(625));
}

#[test]
fn closing_twice_advances_without_reapplying_budgets() {
    // Closing jornada 12 then (after reopening) jornada 13 with no activity:
    // second close formula = 500 + (725 - 725) + 0 = 500.
    let store = seeded_store(12);
    seed_squad_scoring_88(&store, 12);
    store
        .update_member("liga", "ana", |m| m.budget = dec!(637))
        .unwrap();

    let engine = FantasyEngine::new(store.clone(), settings());
    engine.close_jornada("liga").unwrap();
    assert_eq!(store.get_member("liga", "ana").unwrap().budget, dec!(725));

    engine.open_jornada("liga").unwrap();
    let report = engine.close_jornada("liga").unwrap();
    assert_eq!(report.jornada, 13);
    let member = store.get_member("liga", "ana").unwrap();
    // Empty squad, no bets: points 0, balance back to the baseline.
    assert_eq!(member.points_per_jornada[&13], 0);
    assert_eq!(member.budget, dec!(500));
    assert_eq!(member.points, 88, "jornada 12 points kept");
    assert_eq!(store.get_league("liga").unwrap().current_jornada, 14);
}
