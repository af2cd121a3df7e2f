//! Bivariate Poisson scoreline model with the Dixon-Coles low-score correction.

use crate::domain::Prob3;

/// `λ^k e^(−λ) / k!`. A non-positive rate puts all mass on zero goals.
pub fn poisson_pmf(goals: u32, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if goals == 0 { 1.0 } else { 0.0 };
    }
    // Log space keeps large k from overflowing the factorial.
    let ln_fact: f64 = (2..=goals).map(|k| (k as f64).ln()).sum();
    (goals as f64 * lambda.ln() - lambda - ln_fact).exp()
}

/// Correction factor for the four low-score cells; 1 everywhere else.
pub fn tau(home_goals: u32, away_goals: u32, lambda: f64, mu: f64, rho: f64) -> f64 {
    match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda * mu * rho,
        (0, 1) => 1.0 + lambda * rho,
        (1, 0) => 1.0 + mu * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

/// Probability of the exact score `x`-`y`. Clamped at zero, since τ can go negative for
/// extreme `rho`.
pub fn probability(x: u32, y: u32, lambda: f64, mu: f64, rho: f64) -> f64 {
    let base = poisson_pmf(x, lambda) * poisson_pmf(y, mu);
    (base * tau(x, y, lambda, mu, rho)).max(0.0)
}

/// Exact-score probabilities for `0..=max_goals` on both sides, indexed `[home][away]`.
#[derive(Debug, Clone)]
pub struct ScoreGrid {
    cells: Vec<Vec<f64>>,
}

impl ScoreGrid {
    pub fn new(lambda: f64, mu: f64, rho: f64, max_goals: u32) -> Self {
        let cells = (0..=max_goals)
            .map(|x| {
                (0..=max_goals)
                    .map(|y| probability(x, y, lambda, mu, rho))
                    .collect()
            })
            .collect();
        Self { cells }
    }

    pub fn max_goals(&self) -> u32 {
        self.cells.len().saturating_sub(1) as u32
    }

    pub fn get(&self, home_goals: u32, away_goals: u32) -> f64 {
        self.cells
            .get(home_goals as usize)
            .and_then(|row| row.get(away_goals as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Mass covered by the grid. The remainder is the truncated tail.
    pub fn total(&self) -> f64 {
        self.cells.iter().flatten().sum()
    }

    /// Home/draw/away probabilities, renormalized over the grid.
    pub fn outcome_probs(&self) -> Prob3 {
        let mut p_home = 0.0_f64;
        let mut p_draw = 0.0_f64;
        let mut p_away = 0.0_f64;
        for (h, row) in self.cells.iter().enumerate() {
            for (a, p) in row.iter().enumerate() {
                if h > a {
                    p_home += p;
                } else if h == a {
                    p_draw += p;
                } else {
                    p_away += p;
                }
            }
        }
        let sum = p_home + p_draw + p_away;
        if sum <= 0.0 {
            return Prob3::uniform();
        }
        Prob3 {
            home: p_home / sum,
            draw: p_draw / sum,
            away: p_away / sum,
        }
    }

    /// Most probable exact score; the lower total wins exact ties.
    pub fn most_likely_score(&self) -> (u32, u32, f64) {
        let mut best = (0u32, 0u32, f64::NEG_INFINITY);
        for (h, row) in self.cells.iter().enumerate() {
            for (a, p) in row.iter().enumerate() {
                if *p > best.2 {
                    best = (h as u32, a as u32, *p);
                }
            }
        }
        best
    }
}

pub fn outcome_probs(lambda: f64, mu: f64, rho: f64, max_goals: u32) -> Prob3 {
    ScoreGrid::new(lambda, mu, rho, max_goals).outcome_probs()
}
