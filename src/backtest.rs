use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::{self, CalibrationParameters, CalibrationSample, CalibrationUpdate, Metrics};
use crate::config::{BacktestConfig, EngineConfig};
use crate::dixon_coles;
use crate::domain::{MatchId, MatchObservation, Outcome, PredictionResult, Prob3, RankContext, TeamId};
use crate::error::{ModelError, ModelResult};
use crate::evaluator;
use crate::history::{self, MatchHistory};
use crate::league_params::LeagueParams;
use crate::prediction::PredictionEngine;
use crate::rankings;

/// League-wide scoring needs this many matches before it fully replaces the configured average.
const LEAGUE_MIN_N: f64 = 60.0;
const RATE_MIN: f64 = 0.10;
const RATE_MAX: f64 = 5.0;

/// Where a row's `(λ, μ)` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorelineSource {
    /// Recent scoring rates against the league average.
    Rates,
    /// A cached Dixon-Coles fit dated before kickoff.
    Fitted,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestRow {
    pub match_id: MatchId,
    pub league_id: u32,
    pub kickoff: DateTime<Utc>,
    pub home_id: TeamId,
    pub away_id: TeamId,
    pub outcome: Outcome,
    pub prediction: PredictionResult,
    pub scoreline: Prob3,
    pub scoreline_source: ScorelineSource,
    pub lambda: f64,
    pub mu: f64,
    pub brier: f64,
    pub brier_scoreline: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub evaluated: usize,
    /// Matches left out because a side had no history before kickoff.
    pub skipped: usize,
    pub mean_brier: f64,
    pub mean_brier_scoreline: f64,
    pub metrics: Metrics,
    pub metrics_scoreline: Metrics,
    pub ece: f64,
    pub correct_rate: f64,
    pub rows: Vec<BacktestRow>,
    pub calibration_samples: Vec<CalibrationSample>,
}

impl BacktestReport {
    /// Feed this run's samples into a league's calibration pair.
    pub fn update_calibration(&self, params: &mut CalibrationParameters) -> CalibrationUpdate {
        calibration::update_parameters(params, &self.calibration_samples)
    }
}

/// Replays concluded matches, rebuilding each prediction only from what was known before kickoff.
pub struct Backtester<'a, H> {
    history: &'a H,
    config: BacktestConfig,
    engine: PredictionEngine,
    league_params: HashMap<u32, LeagueParams>,
}

impl<'a, H: MatchHistory + Sync> Backtester<'a, H> {
    pub fn new(history: &'a H, config: BacktestConfig) -> Self {
        Self {
            history,
            config,
            engine: PredictionEngine::new(config.engine),
            league_params: HashMap::new(),
        }
    }

    /// Per-league overrides. A cached league predicts with its own calibration pair, and its
    /// Dixon-Coles fit prices the scoreline for matches kicking off after `fitted_at`.
    pub fn with_league_params(mut self, params: HashMap<u32, LeagueParams>) -> Self {
        self.league_params = params;
        self
    }

    fn engine_for(&self, league_id: u32) -> PredictionEngine {
        match self.league_params.get(&league_id) {
            Some(lp) => PredictionEngine::new(EngineConfig {
                calibration: Some(lp.calibration),
                ..self.config.engine
            }),
            None => self.engine,
        }
    }

    /// `(λ, μ, ρ)` from a cached fit, only if it was made strictly before `m` kicked off.
    fn fitted_rates(&self, m: &MatchObservation) -> Option<(f64, f64, f64)> {
        let lp = self.league_params.get(&m.league_id)?;
        let dc = lp.dixon_coles.as_ref()?;
        if !lp.fitted_at.is_some_and(|at| at < m.kickoff) {
            return None;
        }
        let (lambda, mu) = dc.expected_goals(m.home_id, m.away_id)?;
        Some((
            lambda.clamp(RATE_MIN, RATE_MAX),
            mu.clamp(RATE_MIN, RATE_MAX),
            dc.rho,
        ))
    }

    pub fn run_backtest(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ModelResult<BacktestReport> {
        if from > to {
            return Err(ModelError::InvalidInput(format!(
                "backtest range is inverted ({from} > {to})"
            )));
        }
        let start = Instant::now();
        let matches = self.history.find_concluded_matches(from, to);

        // Each match filters its own history, so there is no shared cursor to protect.
        let results: Vec<Option<BacktestRow>> =
            matches.par_iter().map(|m| self.predict_at(m)).collect();

        let total = results.len();
        let rows: Vec<BacktestRow> = results.into_iter().flatten().collect();
        let skipped = total - rows.len();
        if rows.is_empty() {
            return Err(ModelError::DataUnavailable(format!(
                "no match between {from} and {to} had prior history ({total} candidates)"
            )));
        }

        let n = rows.len() as f64;
        let mean_brier = rows.iter().map(|r| r.brier).sum::<f64>() / n;
        let mean_brier_scoreline = rows.iter().map(|r| r.brier_scoreline).sum::<f64>() / n;
        let correct_rate =
            rows.iter().filter(|r| r.prediction.correct == Some(true)).count() as f64 / n;

        let outcomes: Vec<Outcome> = rows.iter().map(|r| r.outcome).collect();
        let preds: Vec<Prob3> = rows.iter().map(|r| r.prediction.as_prob3()).collect();
        let scorelines: Vec<Prob3> = rows.iter().map(|r| r.scoreline).collect();
        let calibration_samples = preds
            .iter()
            .zip(&outcomes)
            .map(|(p, o)| calibration::favourite_sample(*p, *o))
            .collect();

        let report = BacktestReport {
            from,
            to,
            evaluated: rows.len(),
            skipped,
            mean_brier,
            mean_brier_scoreline,
            metrics: calibration::evaluate_probs(&preds, &outcomes),
            metrics_scoreline: calibration::evaluate_probs(&scorelines, &outcomes),
            ece: calibration::ece_1x2(&preds, &outcomes, 10),
            correct_rate,
            rows,
            calibration_samples,
        };

        info!(
            evaluated = report.evaluated,
            skipped = report.skipped,
            mean_brier = report.mean_brier,
            mean_brier_scoreline = report.mean_brier_scoreline,
            elapsed = ?start.elapsed(),
            "backtest finished"
        );
        Ok(report)
    }

    /// Rebuild the forecast for one match from history strictly before its kickoff.
    /// `None` when either side has no earlier match.
    pub fn predict_at(&self, m: &MatchObservation) -> Option<BacktestRow> {
        let (home_goals, away_goals) = m.score()?;
        let t = m.kickoff;
        let limit = self.config.recent_limit;

        let home_recent = self.history.find_recent_matches(m.home_id, t, limit);
        let away_recent = self.history.find_recent_matches(m.away_id, t, limit);
        if home_recent.is_empty() || away_recent.is_empty() {
            debug!(match_id = m.id, "skipping match without prior history");
            return None;
        }
        let h2h = self.history.find_matches_between(m.home_id, m.away_id, t);
        let league: Vec<MatchObservation> = self
            .history
            .find_matches_before(t)
            .into_iter()
            .filter(|x| x.league_id == m.league_id)
            .collect();

        let table = history::league_table(&league);
        let positions: HashMap<TeamId, u32> = rankings::rank(&table, RankContext::Overall)
            .into_iter()
            .map(|r| (r.team.team_id, r.position))
            .collect();
        let row_for = |team: TeamId| table.iter().find(|r| r.team_id == team);

        let home_stats = history::team_stats_from_history(
            m.home_id,
            row_for(m.home_id),
            &home_recent,
            positions.get(&m.home_id).copied(),
        );
        let away_stats = history::team_stats_from_history(
            m.away_id,
            row_for(m.away_id),
            &away_recent,
            positions.get(&m.away_id).copied(),
        );

        let engine = self.engine_for(m.league_id);
        let mut prediction = match engine.calculate_match_prediction(&home_stats, &away_stats) {
            Ok(p) => p,
            Err(err) => {
                warn!(match_id = m.id, %err, "prediction failed; match excluded");
                return None;
            }
        };
        let evaluation = match evaluator::evaluate(&mut prediction, home_goals, away_goals) {
            Ok(e) => e,
            Err(err) => {
                warn!(match_id = m.id, %err, "evaluation failed; match excluded");
                return None;
            }
        };

        let (lambda, mu, rho, scoreline_source) = match self.fitted_rates(m) {
            Some((lambda, mu, rho)) => (lambda, mu, rho, ScorelineSource::Fitted),
            None => {
                let (lambda, mu) =
                    self.expected_goals(m, &league, &home_recent, &away_recent, &h2h)?;
                (lambda, mu, self.config.rho, ScorelineSource::Rates)
            }
        };
        let scoreline = dixon_coles::outcome_probs(lambda, mu, rho, self.config.max_goals);

        Some(BacktestRow {
            match_id: m.id,
            league_id: m.league_id,
            kickoff: t,
            home_id: m.home_id,
            away_id: m.away_id,
            outcome: evaluation.outcome,
            brier: evaluation.brier_score,
            brier_scoreline: scoreline.brier(evaluation.outcome),
            prediction,
            scoreline,
            scoreline_source,
            lambda,
            mu,
        })
    }

    /// `(λ, μ)` from recent attack/defense rates relative to the league average, blended
    /// with the head-to-head scoring rate as meetings accumulate.
    fn expected_goals(
        &self,
        m: &MatchObservation,
        league: &[MatchObservation],
        home_recent: &[MatchObservation],
        away_recent: &[MatchObservation],
        h2h: &[MatchObservation],
    ) -> Option<(f64, f64)> {
        let (avg_home, avg_away) = self.league_goal_averages(league);
        let avg_team = ((avg_home + avg_away) / 2.0).max(1e-6);

        let (home_scored, home_conceded) = history::scoring_rates(m.home_id, home_recent)?;
        let (away_scored, away_conceded) = history::scoring_rates(m.away_id, away_recent)?;

        let mut lambda = avg_home * (home_scored / avg_team) * (away_conceded / avg_team);
        let mut mu = avg_away * (away_scored / avg_team) * (home_conceded / avg_team);

        if let Some((h2h_home, h2h_away)) = history::scoring_rates(m.home_id, h2h) {
            let share = self.config.h2h_max_share
                * (h2h.len() as f64 / self.config.h2h_full_weight.max(1.0)).min(1.0);
            lambda = (1.0 - share) * lambda + share * h2h_home;
            mu = (1.0 - share) * mu + share * h2h_away;
        }

        Some((lambda.clamp(RATE_MIN, RATE_MAX), mu.clamp(RATE_MIN, RATE_MAX)))
    }

    /// Home and away goals per match, shrunk toward the configured league average on small samples.
    fn league_goal_averages(&self, league: &[MatchObservation]) -> (f64, f64) {
        let prior = self.config.engine.weights.league_average_goals / 2.0;
        let mut n = 0usize;
        let mut home = 0.0_f64;
        let mut away = 0.0_f64;
        for m in league {
            let Some((hg, ag)) = m.score() else { continue };
            home += hg as f64;
            away += ag as f64;
            n += 1;
        }
        if n == 0 {
            return (prior, prior);
        }
        let w = (n as f64 / LEAGUE_MIN_N).clamp(0.0, 1.0);
        (
            (1.0 - w) * prior + w * home / n as f64,
            (1.0 - w) * prior + w * away / n as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{DixonColesParameters, TeamStrength};
    use crate::history::InMemoryHistory;
    use crate::synthetic::{self, SeasonSpec};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 15, 0, 0).unwrap() + Duration::days(day)
    }

    fn obs(id: u64, day: i64, h: TeamId, a: TeamId, hg: u32, ag: u32) -> MatchObservation {
        MatchObservation {
            id,
            league_id: 1,
            home_id: h,
            away_id: a,
            kickoff: at(day),
            home_goals: Some(hg),
            away_goals: Some(ag),
            detail: None,
        }
    }

    #[test]
    fn first_meetings_are_skipped() {
        let history = InMemoryHistory::new(vec![obs(1, 0, 1, 2, 1, 0), obs(2, 7, 2, 1, 2, 2)]);
        let bt = Backtester::new(&history, BacktestConfig::default());
        let report = bt.run_backtest(at(0), at(7)).unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.rows[0].match_id, 2);
        assert_eq!(report.calibration_samples.len(), 1);
    }

    #[test]
    fn no_history_at_all_is_unavailable() {
        let history = InMemoryHistory::new(vec![obs(1, 0, 1, 2, 1, 0)]);
        let bt = Backtester::new(&history, BacktestConfig::default());
        assert!(matches!(
            bt.run_backtest(at(0), at(1)),
            Err(ModelError::DataUnavailable(_))
        ));
        assert!(matches!(
            bt.run_backtest(at(5), at(1)),
            Err(ModelError::InvalidInput(_))
        ));
    }

    #[test]
    fn brier_scores_stay_in_range() {
        let history = InMemoryHistory::new(vec![
            obs(1, 0, 1, 2, 3, 0),
            obs(2, 0, 3, 4, 0, 0),
            obs(3, 7, 2, 3, 1, 2),
            obs(4, 7, 4, 1, 0, 4),
            obs(5, 14, 1, 3, 2, 1),
            obs(6, 14, 2, 4, 1, 1),
        ]);
        let bt = Backtester::new(&history, BacktestConfig::default());
        let report = bt.run_backtest(at(0), at(30)).unwrap();
        assert_eq!(report.evaluated + report.skipped, 6);
        for row in &report.rows {
            assert!((0.0..=2.0 / 3.0).contains(&row.brier));
            assert!((0.0..=2.0 / 3.0).contains(&row.brier_scoreline));
            assert!(row.lambda >= RATE_MIN && row.mu >= RATE_MIN);
            assert!(row.prediction.is_evaluated());
        }
    }

    fn season() -> (InMemoryHistory, DateTime<Utc>, DateTime<Utc>) {
        let matches = synthetic::generate_season(&SeasonSpec::default());
        let from = matches[0].kickoff;
        let to = matches[matches.len() - 1].kickoff;
        (InMemoryHistory::new(matches), from, to)
    }

    fn mean_favourite(report: &BacktestReport) -> f64 {
        let n = report.calibration_samples.len() as f64;
        report.calibration_samples.iter().map(|s| s.predicted).sum::<f64>() / n
    }

    fn cached(league_id: u32, b: f64) -> HashMap<u32, LeagueParams> {
        let mut lp = LeagueParams::defaults(league_id);
        lp.calibration.b = b;
        HashMap::from([(league_id, lp)])
    }

    fn flat_fit(fitted_at: DateTime<Utc>) -> HashMap<u32, LeagueParams> {
        let teams: BTreeMap<TeamId, TeamStrength> = (1..=SeasonSpec::default().teams)
            .map(|id| {
                let attack = 0.05 * id as f64;
                (id, TeamStrength { attack, defense: -attack })
            })
            .collect();
        let mut lp = LeagueParams::defaults(1);
        lp.dixon_coles = Some(DixonColesParameters {
            league_id: 1,
            teams,
            home_advantage: 0.3,
            rho: -0.05,
        });
        lp.fitted_at = Some(fitted_at);
        HashMap::from([(1, lp)])
    }

    #[test]
    fn cached_calibration_changes_the_next_run() {
        let (history, from, to) = season();
        let config = BacktestConfig::default();
        let base = Backtester::new(&history, config)
            .with_league_params(cached(1, 2.0))
            .run_backtest(from, to)
            .unwrap();
        let damped = Backtester::new(&history, config)
            .with_league_params(cached(1, 2.5))
            .run_backtest(from, to)
            .unwrap();
        assert_eq!(base.evaluated, damped.evaluated);
        assert!(mean_favourite(&damped) < mean_favourite(&base));
    }

    #[test]
    fn other_leagues_in_the_cache_are_ignored() {
        let (history, from, to) = season();
        let config = BacktestConfig::default();
        let plain = Backtester::new(&history, config).run_backtest(from, to).unwrap();
        let foreign = Backtester::new(&history, config)
            .with_league_params(cached(2, 3.0))
            .run_backtest(from, to)
            .unwrap();
        for (a, b) in plain.rows.iter().zip(&foreign.rows) {
            assert_eq!(a.prediction.home_win_probability, b.prediction.home_win_probability);
            assert_eq!(a.prediction.away_win_probability, b.prediction.away_win_probability);
        }
    }

    #[test]
    fn fit_dated_after_kickoff_is_ignored() {
        let (history, from, to) = season();
        let config = BacktestConfig::default();
        let plain = Backtester::new(&history, config).run_backtest(from, to).unwrap();
        let late = Backtester::new(&history, config)
            .with_league_params(flat_fit(to + Duration::days(1)))
            .run_backtest(from, to)
            .unwrap();
        assert_eq!(plain.rows.len(), late.rows.len());
        for (a, b) in plain.rows.iter().zip(&late.rows) {
            assert_eq!(b.scoreline_source, ScorelineSource::Rates);
            assert_eq!(a.lambda, b.lambda);
            assert_eq!(a.mu, b.mu);
            assert_eq!(a.scoreline, b.scoreline);
        }
    }

    #[test]
    fn fit_is_used_only_after_its_date() {
        let (history, from, to) = season();
        let matches = history.matches();
        let cutoff = matches[matches.len() / 2].kickoff;
        let report = Backtester::new(&history, BacktestConfig::default())
            .with_league_params(flat_fit(cutoff))
            .run_backtest(from, to)
            .unwrap();
        assert!(report.rows.iter().any(|r| r.kickoff == cutoff));
        for row in &report.rows {
            let expected = if row.kickoff > cutoff {
                ScorelineSource::Fitted
            } else {
                ScorelineSource::Rates
            };
            assert_eq!(row.scoreline_source, expected, "match {}", row.match_id);
        }
    }

    #[test]
    fn fit_dated_before_kickoff_prices_the_scoreline() {
        let (history, from, to) = season();
        let cache = flat_fit(from - Duration::days(1));
        let dc = cache[&1].dixon_coles.clone().unwrap();
        let config = BacktestConfig::default();
        let report = Backtester::new(&history, config)
            .with_league_params(cache)
            .run_backtest(from, to)
            .unwrap();
        for row in &report.rows {
            assert_eq!(row.scoreline_source, ScorelineSource::Fitted);
            let (lambda, mu) = dc.expected_goals(row.home_id, row.away_id).unwrap();
            assert!((row.lambda - lambda).abs() < 1e-12);
            assert!((row.mu - mu).abs() < 1e-12);
            let expected = dixon_coles::outcome_probs(lambda, mu, dc.rho, config.max_goals);
            assert!((row.scoreline.home - expected.home).abs() < 1e-12);
        }
    }
}
