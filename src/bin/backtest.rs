use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};

use matchcast::backtest::{BacktestReport, Backtester, ScorelineSource};
use matchcast::calibration::{self, CalibrationSample, CalibrationUpdate};
use matchcast::config::BacktestConfig;
use matchcast::history::InMemoryHistory;
use matchcast::league_params::{self, LeagueParams};
use matchcast::synthetic::{self, SeasonSpec};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    matchcast::init_tracing();

    let history = match parse_path_arg("--matches") {
        Some(path) => InMemoryHistory::load_json(&path)?,
        // Without a match file, replay a generated season so the pipeline can be exercised offline.
        None => InMemoryHistory::new(synthetic::generate_season(&SeasonSpec::default())),
    };
    if history.matches().is_empty() {
        return Err(anyhow!("match file has no rows"));
    }

    let config = match parse_path_arg("--config") {
        Some(path) => BacktestConfig::load_json(&path)?,
        None => BacktestConfig::from_env(),
    };

    let first = history.matches().first().map(|m| m.kickoff);
    let last = history.matches().last().map(|m| m.kickoff);
    let from = parse_date_arg("--from")?
        .or(first)
        .context("no start date")?;
    let to = parse_date_arg("--to")?.or(last).context("no end date")?;

    let mut backtester = Backtester::new(&history, config);
    // Cached leagues predict with their stored calibration and dated scoreline fit.
    if has_flag("--use-cache") {
        backtester = backtester.with_league_params(league_params::load_cached_params());
    }
    let report = backtester.run_backtest(from, to)?;
    print_report(&report);

    if has_flag("--apply") {
        apply_calibration(&report)?;
    }

    Ok(())
}

fn print_report(report: &BacktestReport) {
    println!("Walk-forward backtest {} .. {}", report.from, report.to);
    println!(
        "evaluated={} skipped={} correct={:.1}%",
        report.evaluated,
        report.skipped,
        report.correct_rate * 100.0
    );
    println!(
        "power-score brier={:.4} ll={:.4} acc={:.3} ece={:.4}",
        report.mean_brier, report.metrics.log_loss, report.metrics.accuracy, report.ece
    );
    println!(
        "scoreline   brier={:.4} ll={:.4} acc={:.3}",
        report.mean_brier_scoreline,
        report.metrics_scoreline.log_loss,
        report.metrics_scoreline.accuracy
    );
    let fitted = report
        .rows
        .iter()
        .filter(|r| r.scoreline_source == ScorelineSource::Fitted)
        .count();
    if fitted > 0 {
        println!("scoreline from cached fit: {fitted}/{}", report.evaluated);
    }
}

/// One calibration step per league seen in the backtest window.
fn apply_calibration(report: &BacktestReport) -> Result<()> {
    let mut by_league: BTreeMap<u32, Vec<CalibrationSample>> = BTreeMap::new();
    for row in &report.rows {
        by_league
            .entry(row.league_id)
            .or_default()
            .push(calibration::favourite_sample(row.prediction.as_prob3(), row.outcome));
    }

    let mut params = league_params::load_cached_params();
    for (league_id, samples) in by_league {
        let entry = params
            .entry(league_id)
            .or_insert_with(|| LeagueParams::defaults(league_id));
        let update = calibration::update_parameters(&mut entry.calibration, &samples);
        entry.sample_matches = entry.sample_matches.max(samples.len());
        println!(
            "league {league_id}: calibration {} (a={:.2}, b={:.2})",
            match update {
                CalibrationUpdate::Dampened => "dampened",
                CalibrationUpdate::Unchanged => "unchanged",
                CalibrationUpdate::NoData => "no data",
            },
            entry.calibration.a,
            entry.calibration.b
        );
    }
    league_params::save_cached_params(&params)?;
    Ok(())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_str_arg(name).map(PathBuf::from)
}

fn parse_date_arg(name: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = parse_str_arg(name) else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("{name} expects YYYY-MM-DD, got {raw}"))?;
    let end_of_day = name == "--to";
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.map(|t| t.and_utc()))
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
