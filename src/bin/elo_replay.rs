use std::path::PathBuf;

use anyhow::{Context, Result};

use matchcast::domain::RankContext;
use matchcast::elo::{EloBook, EloConfig};
use matchcast::history::{self, InMemoryHistory};
use matchcast::rankings;
use matchcast::synthetic::{self, SeasonSpec};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    matchcast::init_tracing();

    let history = match parse_str_arg("--matches") {
        Some(path) => InMemoryHistory::load_json(&PathBuf::from(path))?,
        None => InMemoryHistory::new(synthetic::generate_season(&SeasonSpec::default())),
    };

    let mut cfg = EloConfig::default();
    if let Some(k) = parse_str_arg("--k") {
        cfg.k = k
            .parse()
            .with_context(|| format!("--k expects a number, got {k}"))?;
    }

    let mut book = EloBook::new(cfg);
    let applied = book.replay(history.matches());
    println!("Elo after {applied} matches (k={})", cfg.k);
    for (idx, (team, rating)) in book.leaderboard().iter().enumerate() {
        println!("{:>3}. team {team:>6}  {rating}", idx + 1);
    }

    let table = history::league_table(history.matches());
    for context in RankContext::ALL {
        println!();
        println!("{context:?} table");
        for row in rankings::rank(&table, context) {
            let rec = row.team.venue(context);
            println!(
                "{:>3}. team {:>6}  P{:>3} W{:>3} D{:>3} L{:>3}  GD {:+4}  Pts {:>3}",
                row.position,
                row.team.team_id,
                rec.played,
                rec.won,
                rec.drawn,
                rec.lost,
                rec.goal_diff(),
                rec.points
            );
        }
    }
    Ok(())
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
