use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dixon_coles::{self, ScoreGrid};
use crate::domain::{MatchObservation, TeamId};
use crate::error::{ModelError, ModelResult};
use crate::optimizer::{NelderMeadConfig, nelder_mead};

/// Per-day decay of a match's weight in the likelihood.
pub const DEFAULT_XI: f64 = 0.0019;

/// Log-likelihood floor for cells the correction drives to zero probability.
const MIN_CELL_PROB: f64 = 1e-12;
/// Bounds on the exponent of the rate link, so wild simplex vertices stay finite.
const LOG_RATE_MIN: f64 = -10.0;
const LOG_RATE_MAX: f64 = 4.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub xi: f64,
    pub max_iterations: usize,
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
    pub initial_step: f64,
    pub initial_home_advantage: f64,
    pub initial_rho: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            xi: DEFAULT_XI,
            max_iterations: 20_000,
            abs_tolerance: 1e-7,
            rel_tolerance: 1e-9,
            initial_step: 0.1,
            initial_home_advantage: 0.25,
            initial_rho: -0.13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStrength {
    pub attack: f64,
    pub defense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DixonColesParameters {
    pub league_id: u32,
    pub teams: BTreeMap<TeamId, TeamStrength>,
    pub home_advantage: f64,
    pub rho: f64,
}

impl DixonColesParameters {
    /// `(λ, μ)` for a fixture; `None` when either team was not in the fit.
    pub fn expected_goals(&self, home: TeamId, away: TeamId) -> Option<(f64, f64)> {
        let h = self.teams.get(&home)?;
        let a = self.teams.get(&away)?;
        Some(rates(h.attack, h.defense, a.attack, a.defense, self.home_advantage))
    }

    pub fn score_grid(&self, home: TeamId, away: TeamId, max_goals: u32) -> Option<ScoreGrid> {
        let (lambda, mu) = self.expected_goals(home, away)?;
        Some(ScoreGrid::new(lambda, mu, self.rho, max_goals))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Converged,
    NotConverged,
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: DixonColesParameters,
    pub status: FitStatus,
    pub iterations: usize,
    pub log_likelihood: f64,
    pub matches_used: usize,
}

impl FitOutcome {
    /// Strict view: a fit that ran out of iterations becomes an error.
    pub fn into_converged(self) -> ModelResult<DixonColesParameters> {
        match self.status {
            FitStatus::Converged => Ok(self.params),
            FitStatus::NotConverged => Err(ModelError::NotConverged {
                iterations: self.iterations,
                best: -self.log_likelihood,
            }),
        }
    }
}

struct WeightedMatch {
    home: usize,
    away: usize,
    home_goals: u32,
    away_goals: u32,
    weight: f64,
}

/// Time-decay weight for a match played `days_ago` days before the fit date.
pub fn decay_weight(days_ago: f64, xi: f64) -> f64 {
    (-xi * days_ago.max(0.0)).exp()
}

/// Fit attack/defense per team, a shared home advantage and `rho` by weighted maximum
/// likelihood. Matches after `reference` or without a score are ignored.
pub fn fit(
    league_id: u32,
    matches: &[MatchObservation],
    reference: DateTime<Utc>,
    cfg: &EstimatorConfig,
) -> ModelResult<FitOutcome> {
    let mut team_ids: Vec<TeamId> = Vec::new();
    let mut index: HashMap<TeamId, usize> = HashMap::new();
    let mut rows: Vec<WeightedMatch> = Vec::new();

    for m in matches {
        let Some((hg, ag)) = m.score() else { continue };
        if m.kickoff > reference || m.home_id == m.away_id {
            continue;
        }
        let mut slot = |team: TeamId| {
            *index.entry(team).or_insert_with(|| {
                team_ids.push(team);
                team_ids.len() - 1
            })
        };
        let home = slot(m.home_id);
        let away = slot(m.away_id);
        let days_ago = (reference - m.kickoff).num_seconds() as f64 / 86_400.0;
        rows.push(WeightedMatch {
            home,
            away,
            home_goals: hg,
            away_goals: ag,
            weight: decay_weight(days_ago, cfg.xi),
        });
    }

    if rows.is_empty() {
        return Err(ModelError::DataUnavailable(format!(
            "no concluded matches before {reference} for league {league_id}"
        )));
    }

    let n_teams = team_ids.len();
    // [attack.., defense.., home, rho]
    let mut init = vec![0.0; 2 * n_teams + 2];
    init[2 * n_teams] = cfg.initial_home_advantage;
    init[2 * n_teams + 1] = cfg.initial_rho;

    let nm_cfg = NelderMeadConfig {
        max_iterations: cfg.max_iterations,
        abs_tolerance: cfg.abs_tolerance,
        rel_tolerance: cfg.rel_tolerance,
        initial_step: cfg.initial_step,
    };

    let start = Instant::now();
    let outcome = nelder_mead(&init, &nm_cfg, |x| -log_likelihood(x, n_teams, &rows));
    let elapsed = start.elapsed();

    let status = if outcome.converged {
        FitStatus::Converged
    } else {
        FitStatus::NotConverged
    };
    if status == FitStatus::NotConverged {
        warn!(
            league_id,
            iterations = outcome.iterations,
            best = outcome.optimal_residual,
            "dixon-coles fit did not converge; using best point found"
        );
    }
    debug!(
        league_id,
        teams = n_teams,
        matches = rows.len(),
        iterations = outcome.iterations,
        evaluations = outcome.evaluations,
        ?elapsed,
        "dixon-coles fit finished"
    );

    let x = &outcome.optimal_values;
    let mean_attack = x[..n_teams].iter().sum::<f64>() / n_teams as f64;
    let teams = team_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            (
                *id,
                TeamStrength {
                    attack: x[i] - mean_attack,
                    defense: x[n_teams + i],
                },
            )
        })
        .collect();

    Ok(FitOutcome {
        params: DixonColesParameters {
            league_id,
            teams,
            home_advantage: x[2 * n_teams],
            rho: x[2 * n_teams + 1],
        },
        status,
        iterations: outcome.iterations,
        log_likelihood: -outcome.optimal_residual,
        matches_used: rows.len(),
    })
}

fn rates(att_h: f64, def_h: f64, att_a: f64, def_a: f64, home: f64) -> (f64, f64) {
    let lambda = (att_h - def_a + home).clamp(LOG_RATE_MIN, LOG_RATE_MAX).exp();
    let mu = (att_a - def_h).clamp(LOG_RATE_MIN, LOG_RATE_MAX).exp();
    (lambda, mu)
}

fn log_likelihood(x: &[f64], n_teams: usize, rows: &[WeightedMatch]) -> f64 {
    // Attacks are only identified up to a shared offset; pin their mean to zero.
    let mean_attack = x[..n_teams].iter().sum::<f64>() / n_teams as f64;
    let home = x[2 * n_teams];
    let rho = x[2 * n_teams + 1];

    rows.iter()
        .map(|m| {
            let (lambda, mu) = rates(
                x[m.home] - mean_attack,
                x[n_teams + m.home],
                x[m.away] - mean_attack,
                x[n_teams + m.away],
                home,
            );
            let p = dixon_coles::probability(m.home_goals, m.away_goals, lambda, mu, rho);
            m.weight * p.max(MIN_CELL_PROB).ln()
        })
        .sum()
}
