//! Jornada Engine — operator CLI
//!
//! Fantasy-football matchday settlement and budget reconciliation over a
//! JSON snapshot of league state.
//!
//! Commands:
//! - ingest        pull and score player stats for a jornada's fixtures
//! - evaluate      settle pending bets and parlays
//! - reevaluate    reset and re-settle a jornada's bets
//! - close         run the full jornada close
//! - score         one member's squad score for a jornada
//! - player-points one player's scored matchday row

use anyhow::{bail, Context};
use std::fs;
use std::path::Path;
use tracing::{error, info};

use jornada_engine::config::Settings;
use jornada_engine::data::ingest::PerformanceIngestor;
use jornada_engine::data::provider::StatsProvider;
use jornada_engine::engine::FantasyEngine;
use jornada_engine::league::store::{LeagueStore, Snapshot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    init_logging(&settings);

    if let Err(errors) = settings.validate() {
        for e in &errors {
            error!(error = %e, "Configuration error");
        }
        bail!("Configuration validation failed");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, rest) = match args.split_first() {
        Some((c, rest)) => (c.as_str(), rest),
        None => {
            eprintln!("{USAGE}");
            bail!("No command given");
        }
    };

    match command {
        "close" => {
            let (path, league_id) = two_args(rest)?;
            let store = load_store(&path)?;
            let engine = FantasyEngine::new(store.clone(), settings);
            let report = engine.close_jornada(&league_id)?;
            save_store(&path, &store)?;
            print_json(&report)?;
        }
        "evaluate" => {
            let (path, league_id, jornada) = two_args_opt_jornada(rest)?;
            let store = load_store(&path)?;
            let engine = FantasyEngine::new(store.clone(), settings);
            let report = engine.evaluate_pending_bets(&league_id, jornada)?;
            save_store(&path, &store)?;
            print_json(&report)?;
        }
        "reevaluate" => {
            let (path, league_id, jornada) = two_args_opt_jornada(rest)?;
            let store = load_store(&path)?;
            let engine = FantasyEngine::new(store.clone(), settings);
            let report = engine.reevaluate_bets(&league_id, jornada)?;
            save_store(&path, &store)?;
            print_json(&report)?;
        }
        "score" => {
            let (path, league_id, user_id, jornada) = three_args_opt_jornada(rest)?;
            let store = load_store(&path)?;
            let engine = FantasyEngine::new(store, settings);
            let points = engine.score_squad(&league_id, &user_id, jornada)?;
            println!("{points}");
        }
        "player-points" => {
            let (path, player_id, jornada) = match rest {
                [p, pl, j] => (p.clone(), pl.clone(), j.parse::<u32>()?),
                _ => bail!("usage: player-points <snapshot.json> <player_id> <jornada>"),
            };
            let store = load_store(&path)?;
            let engine = FantasyEngine::new(store, settings);
            let row = engine.player_matchday_points(&player_id, jornada)?;
            print_json(&row)?;
        }
        "ingest" => {
            let (path, competition_id, jornada) = match rest {
                [p, c, j] => (p.clone(), c.clone(), j.parse::<u32>()?),
                _ => bail!("usage: ingest <snapshot.json> <competition_id> <jornada>"),
            };
            let store = load_store(&path)?;
            let provider = StatsProvider::from_settings(&settings)?;
            let ingestor = PerformanceIngestor::new(
                provider,
                store.clone(),
                settings.season,
                settings.clean_sheet_minutes,
            );
            let report = ingestor.ingest_jornada(&competition_id, jornada).await?;
            save_store(&path, &store)?;
            print_json(&report)?;
        }
        other => {
            eprintln!("{USAGE}");
            bail!("Unknown command: {other}");
        }
    }

    Ok(())
}

const USAGE: &str = "usage: jornada-engine <command> [args]
  ingest        <snapshot.json> <competition_id> <jornada>
  evaluate      <snapshot.json> <league_id> [jornada]
  reevaluate    <snapshot.json> <league_id> [jornada]
  close         <snapshot.json> <league_id>
  score         <snapshot.json> <league_id> <user_id> [jornada]
  player-points <snapshot.json> <player_id> <jornada>";

fn two_args(rest: &[String]) -> anyhow::Result<(String, String)> {
    match rest {
        [a, b] => Ok((a.clone(), b.clone())),
        _ => bail!("expected: <snapshot.json> <league_id>"),
    }
}

fn two_args_opt_jornada(rest: &[String]) -> anyhow::Result<(String, String, Option<u32>)> {
    match rest {
        [a, b] => Ok((a.clone(), b.clone(), None)),
        [a, b, j] => Ok((a.clone(), b.clone(), Some(j.parse()?))),
        _ => bail!("expected: <snapshot.json> <league_id> [jornada]"),
    }
}

fn three_args_opt_jornada(
    rest: &[String],
) -> anyhow::Result<(String, String, String, Option<u32>)> {
    match rest {
        [a, b, c] => Ok((a.clone(), b.clone(), c.clone(), None)),
        [a, b, c, j] => Ok((a.clone(), b.clone(), c.clone(), Some(j.parse()?))),
        _ => bail!("expected: <snapshot.json> <league_id> <user_id> [jornada]"),
    }
}

fn load_store(path: &str) -> anyhow::Result<LeagueStore> {
    // A missing snapshot starts empty; ingest can build one from scratch.
    if !Path::new(path).exists() {
        info!(path, "Snapshot not found, starting empty");
        return Ok(LeagueStore::new());
    }
    let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let snapshot: Snapshot =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    Ok(LeagueStore::from_snapshot(snapshot))
}

fn save_store(path: &str, store: &LeagueStore) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(&store.to_snapshot())?;
    fs::write(path, text).with_context(|| format!("writing {path}"))?;
    info!(path, "Snapshot saved");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(settings: &Settings) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    if settings.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}
