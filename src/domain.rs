use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

pub type TeamId = u32;
pub type MatchId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

pub fn classify_outcome(home_goals: u32, away_goals: u32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// Probability triple in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn one_hot(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Home => Self {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Outcome::Draw => Self {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Outcome::Away => Self {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn argmax(&self) -> Outcome {
        if self.home >= self.draw && self.home >= self.away {
            Outcome::Home
        } else if self.draw >= self.away {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }

    /// Mean squared error against the one-hot actual outcome, averaged over the three classes.
    pub fn brier(&self, actual: Outcome) -> f64 {
        let y = Prob3::one_hot(actual);
        ((self.home - y.home).powi(2) + (self.draw - y.draw).powi(2) + (self.away - y.away).powi(2))
            / 3.0
    }
}

/// Per-match detail stats, when the upstream feed has them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchDetailStats {
    #[serde(default)]
    pub home_shots: Option<u32>,
    #[serde(default)]
    pub away_shots: Option<u32>,
    #[serde(default)]
    pub home_shots_on_target: Option<u32>,
    #[serde(default)]
    pub away_shots_on_target: Option<u32>,
    #[serde(default)]
    pub home_xg: Option<f64>,
    #[serde(default)]
    pub away_xg: Option<f64>,
    #[serde(default)]
    pub home_yellow_cards: Option<u32>,
    #[serde(default)]
    pub away_yellow_cards: Option<u32>,
    #[serde(default)]
    pub home_red_cards: Option<u32>,
    #[serde(default)]
    pub away_red_cards: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchObservation {
    pub id: MatchId,
    #[serde(default)]
    pub league_id: u32,
    pub home_id: TeamId,
    pub away_id: TeamId,
    pub kickoff: DateTime<Utc>,
    #[serde(default)]
    pub home_goals: Option<u32>,
    #[serde(default)]
    pub away_goals: Option<u32>,
    #[serde(default)]
    pub detail: Option<MatchDetailStats>,
}

impl MatchObservation {
    pub fn score(&self) -> Option<(u32, u32)> {
        match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.score().is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.score().map(|(h, a)| classify_outcome(h, a))
    }

    pub fn involves(&self, team: TeamId) -> bool {
        self.home_id == team || self.away_id == team
    }

    /// Goals scored and conceded from `team`'s point of view.
    pub fn goals_for_team(&self, team: TeamId) -> Option<(u32, u32)> {
        let (h, a) = self.score()?;
        if team == self.home_id {
            Some((h, a))
        } else if team == self.away_id {
            Some((a, h))
        } else {
            None
        }
    }

    pub fn xg_for_team(&self, team: TeamId) -> Option<f64> {
        let detail = self.detail.as_ref()?;
        if team == self.home_id {
            detail.home_xg
        } else if team == self.away_id {
            detail.away_xg
        } else {
            None
        }
    }
}

/// Points earned from a single result.
pub fn result_points(goals_for: u32, goals_against: u32) -> u32 {
    if goals_for > goals_against {
        3
    } else if goals_for == goals_against {
        1
    } else {
        0
    }
}

/// Statistical profile of one team, recomputed from its match history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    #[serde(default)]
    pub rank: Option<u32>,
    pub points: u32,
    pub home_points: u32,
    pub away_points: u32,
    pub matches_played: u32,
    pub home_matches_played: u32,
    pub away_matches_played: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub home_goals_for: u32,
    pub home_goals_against: u32,
    pub away_goals_for: u32,
    pub away_goals_against: u32,
    pub last5_points: u32,
    pub last5_goals_for: u32,
    pub last5_goals_against: u32,
    #[serde(default)]
    pub xg: Option<f64>,
}

impl TeamStats {
    pub fn goal_diff(&self) -> i64 {
        self.goals_for as i64 - self.goals_against as i64
    }

    pub fn validate(&self) -> ModelResult<()> {
        let checks = [
            (self.points, self.matches_played, "overall"),
            (self.home_points, self.home_matches_played, "home"),
            (self.away_points, self.away_matches_played, "away"),
        ];
        for (points, played, label) in checks {
            if points > played.saturating_mul(3) {
                return Err(ModelError::InvalidInput(format!(
                    "{label} points {points} exceed 3 x {played} matches"
                )));
            }
        }
        if let Some(xg) = self.xg
            && !(xg.is_finite() && xg >= 0.0)
        {
            return Err(ModelError::InvalidInput(format!("xg rate {xg} is not a valid rate")));
        }
        Ok(())
    }
}

/// One venue slice of a team's season record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,
}

impl VenueRecord {
    pub fn goal_diff(&self) -> i64 {
        self.goals_for as i64 - self.goals_against as i64
    }

    pub fn record(&mut self, goals_for: u32, goals_against: u32) {
        self.played += 1;
        self.goals_for += goals_for;
        self.goals_against += goals_against;
        match classify_outcome(goals_for, goals_against) {
            Outcome::Home => self.won += 1,
            Outcome::Draw => self.drawn += 1,
            Outcome::Away => self.lost += 1,
        }
        self.points += result_points(goals_for, goals_against);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankContext {
    Overall,
    Home,
    Away,
}

impl RankContext {
    pub const ALL: [RankContext; 3] = [RankContext::Overall, RankContext::Home, RankContext::Away];
}

/// Aggregated league-table row for one team.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAggregate {
    pub team_id: TeamId,
    pub overall: VenueRecord,
    pub home: VenueRecord,
    pub away: VenueRecord,
}

impl TeamAggregate {
    pub fn new(team_id: TeamId) -> Self {
        Self {
            team_id,
            ..Self::default()
        }
    }

    pub fn venue(&self, context: RankContext) -> &VenueRecord {
        match context {
            RankContext::Overall => &self.overall,
            RankContext::Home => &self.home,
            RankContext::Away => &self.away,
        }
    }
}

/// Output of the prediction engine. Probabilities are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub home_win_probability: f64,
    pub draw_probability: f64,
    pub away_win_probability: f64,
    pub home_power_score: f64,
    pub away_power_score: f64,
    #[serde(default)]
    pub brier_score: Option<f64>,
    #[serde(default)]
    pub correct: Option<bool>,
}

impl PredictionResult {
    pub fn as_prob3(&self) -> Prob3 {
        Prob3 {
            home: (self.home_win_probability / 100.0).clamp(0.0, 1.0),
            draw: (self.draw_probability / 100.0).clamp(0.0, 1.0),
            away: (self.away_win_probability / 100.0).clamp(0.0, 1.0),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.brier_score.is_some()
    }
}
