use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};

use matchcast::domain::MatchObservation;
use matchcast::estimator::{self, EstimatorConfig, FitStatus};
use matchcast::history::InMemoryHistory;
use matchcast::league_params::{self, LeagueParams};
use matchcast::synthetic::{self, SeasonSpec};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    matchcast::init_tracing();

    let history = match parse_str_arg("--matches") {
        Some(path) => InMemoryHistory::load_json(&PathBuf::from(path))?,
        None => InMemoryHistory::new(synthetic::generate_season(&SeasonSpec::default())),
    };
    let last = history
        .matches()
        .iter()
        .filter(|m| m.is_concluded())
        .map(|m| m.kickoff)
        .max()
        .ok_or_else(|| anyhow!("no concluded matches to fit"))?;
    let reference = parse_date_arg("--as-of")?.unwrap_or(last);

    let mut cfg = EstimatorConfig::default();
    if let Some(xi) = parse_f64_arg("--xi")? {
        cfg.xi = xi;
    }
    if let Some(iters) = parse_str_arg("--max-iter") {
        cfg.max_iterations = iters
            .parse()
            .with_context(|| format!("--max-iter expects an integer, got {iters}"))?;
    }

    let mut by_league: BTreeMap<u32, Vec<MatchObservation>> = BTreeMap::new();
    for m in history.matches() {
        by_league.entry(m.league_id).or_default().push(m.clone());
    }
    if let Some(only) = parse_str_arg("--league") {
        let only: u32 = only
            .parse()
            .with_context(|| format!("--league expects an id, got {only}"))?;
        by_league.retain(|id, _| *id == only);
    }

    let apply = has_flag("--apply");
    let mut cache = if apply {
        league_params::load_cached_params()
    } else {
        Default::default()
    };

    for (league_id, matches) in by_league {
        let outcome = match estimator::fit(league_id, &matches, reference, &cfg) {
            Ok(outcome) => outcome,
            Err(err) => {
                eprintln!("league {league_id}: {err}");
                continue;
            }
        };

        println!(
            "league {league_id}: matches={} iterations={} loglik={:.3} home={:.3} rho={:.3} {}",
            outcome.matches_used,
            outcome.iterations,
            outcome.log_likelihood,
            outcome.params.home_advantage,
            outcome.params.rho,
            match outcome.status {
                FitStatus::Converged => "converged",
                FitStatus::NotConverged => "NOT CONVERGED",
            }
        );
        let mut teams: Vec<_> = outcome.params.teams.iter().collect();
        teams.sort_by(|a, b| {
            (b.1.attack - b.1.defense)
                .partial_cmp(&(a.1.attack - a.1.defense))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (team, s) in teams {
            println!("  team {team:>6}  att={:+.3}  def={:+.3}", s.attack, s.defense);
        }

        if apply {
            if outcome.status == FitStatus::NotConverged {
                eprintln!("league {league_id}: skipping cache write for a fit that did not converge");
                continue;
            }
            let entry = cache
                .entry(league_id)
                .or_insert_with(|| LeagueParams::defaults(league_id));
            entry.sample_matches = outcome.matches_used;
            entry.dixon_coles = Some(outcome.params);
            entry.fitted_at = Some(reference);
        }
    }

    if apply {
        league_params::save_cached_params(&cache)?;
        if let Some(path) = league_params::params_path() {
            println!("saved {}", path.display());
        }
    }
    Ok(())
}

fn parse_date_arg(name: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = parse_str_arg(name) else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("{name} expects YYYY-MM-DD, got {raw}"))?;
    Ok(date.and_hms_opt(23, 59, 59).map(|t| t.and_utc()))
}

fn parse_f64_arg(name: &str) -> Result<Option<f64>> {
    let Some(raw) = parse_str_arg(name) else {
        return Ok(None);
    };
    let value: f64 = raw
        .parse()
        .with_context(|| format!("{name} expects a number, got {raw}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!("{name} must be a non-negative number"));
    }
    Ok(Some(value))
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

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
