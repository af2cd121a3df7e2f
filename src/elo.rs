use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{MatchObservation, TeamId};

pub const DEFAULT_RATING: i32 = 1500;
pub const DEFAULT_K: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EloConfig {
    pub k: f64,
    pub initial_rating: i32,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            initial_rating: DEFAULT_RATING,
        }
    }
}

/// New `(home, away)` ratings after one result, with the default K.
pub fn update_ratings(home_rating: i32, away_rating: i32, home_goals: u32, away_goals: u32) -> (i32, i32) {
    update_ratings_with(home_rating, away_rating, home_goals, away_goals, DEFAULT_K)
}

/// Integer-domain Elo step. The base delta is rounded before the margin multiplier is applied
/// and the amplified value is truncated again, so both teams always move by the same amount.
pub fn update_ratings_with(
    home_rating: i32,
    away_rating: i32,
    home_goals: u32,
    away_goals: u32,
    k: f64,
) -> (i32, i32) {
    let actual_home = if home_goals > away_goals {
        1.0
    } else if home_goals < away_goals {
        0.0
    } else {
        0.5
    };
    let expected_home = expected_score(home_rating, away_rating);

    let mut delta = (k * (actual_home - expected_home)).round() as i32;
    let goal_diff = home_goals.abs_diff(away_goals);
    if goal_diff > 1 {
        delta = (delta as f64 * ((goal_diff + 1) as f64).ln()).trunc() as i32;
    }

    (home_rating + delta, away_rating - delta)
}

pub fn expected_score(r_a: i32, r_b: i32) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((r_b - r_a) as f64 / 400.0))
}

/// Ratings for every team seen so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EloBook {
    cfg: EloConfig,
    ratings: HashMap<TeamId, i32>,
}

impl EloBook {
    pub fn new(cfg: EloConfig) -> Self {
        Self {
            cfg,
            ratings: HashMap::new(),
        }
    }

    pub fn rating(&self, team: TeamId) -> i32 {
        self.ratings
            .get(&team)
            .copied()
            .unwrap_or(self.cfg.initial_rating)
    }

    pub fn ratings(&self) -> &HashMap<TeamId, i32> {
        &self.ratings
    }

    /// Apply one concluded match. Unplayed fixtures are ignored and return `false`.
    pub fn apply(&mut self, m: &MatchObservation) -> bool {
        let Some((hg, ag)) = m.score() else {
            return false;
        };
        let rh = self.rating(m.home_id);
        let ra = self.rating(m.away_id);
        let (nh, na) = update_ratings_with(rh, ra, hg, ag, self.cfg.k);
        self.ratings.insert(m.home_id, nh);
        self.ratings.insert(m.away_id, na);
        true
    }

    /// Replay concluded matches in kickoff order. Returns how many were applied.
    pub fn replay(&mut self, matches: &[MatchObservation]) -> usize {
        let mut ordered: Vec<&MatchObservation> =
            matches.iter().filter(|m| m.is_concluded()).collect();
        ordered.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));

        let mut applied = 0usize;
        for m in ordered {
            if self.apply(m) {
                applied += 1;
            }
        }
        debug!(applied, teams = self.ratings.len(), "elo replay");
        applied
    }

    /// Teams ordered by rating, highest first; ties by id.
    pub fn leaderboard(&self) -> Vec<(TeamId, i32)> {
        let mut rows: Vec<(TeamId, i32)> = self.ratings.iter().map(|(k, v)| (*k, *v)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        rows
    }
}
