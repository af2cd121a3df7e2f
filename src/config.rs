use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationParameters;

/// Weights for the power-score formula. Passed explicitly into every call so a league or a
/// backtest run can override them without touching shared state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub base_score: f64,
    pub home_advantage: f64,
    pub rank_weight: f64,
    pub points_weight: f64,
    pub form_weight: f64,
    pub xg_weight: f64,
    pub goal_diff_weight: f64,
    pub league_average_goals: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            base_score: 10.0,
            home_advantage: 5.0,
            rank_weight: 1.0,
            points_weight: 0.1,
            form_weight: 0.5,
            xg_weight: 5.0,
            goal_diff_weight: 0.0,
            league_average_goals: 2.60,
        }
    }
}

impl WeightConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_score: env_f64("APP_WEIGHT_BASE_SCORE").unwrap_or(d.base_score),
            home_advantage: env_f64("APP_WEIGHT_HOME_ADVANTAGE").unwrap_or(d.home_advantage),
            rank_weight: env_f64("APP_WEIGHT_RANK").unwrap_or(d.rank_weight),
            points_weight: env_f64("APP_WEIGHT_POINTS").unwrap_or(d.points_weight),
            form_weight: env_f64("APP_WEIGHT_FORM").unwrap_or(d.form_weight),
            xg_weight: env_f64("APP_WEIGHT_XG").unwrap_or(d.xg_weight),
            goal_diff_weight: env_f64("APP_WEIGHT_GOAL_DIFF").unwrap_or(d.goal_diff_weight),
            league_average_goals: env_f64("APP_LEAGUE_AVERAGE_GOALS")
                .unwrap_or(d.league_average_goals)
                .clamp(0.5, 8.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: WeightConfig,
    /// Percentage reserved for the draw before the win probabilities are scaled.
    pub draw_probability: f64,
    /// Applied to the win probabilities when present.
    pub calibration: Option<CalibrationParameters>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: WeightConfig::default(),
            draw_probability: 25.0,
            calibration: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let calibration = match (env_f64("APP_CALIBRATION_A"), env_f64("APP_CALIBRATION_B")) {
            (Some(a), Some(b)) => Some(CalibrationParameters { a, b }),
            _ => None,
        };
        Self {
            weights: WeightConfig::from_env(),
            draw_probability: env_f64("APP_DRAW_PROBABILITY")
                .unwrap_or(25.0)
                .clamp(0.0, 100.0),
            calibration,
        }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub engine: EngineConfig,
    /// Most-recent matches per team used to rebuild form and scoring rates.
    pub recent_limit: usize,
    /// Dixon-Coles correlation used for the scoreline forecast.
    pub rho: f64,
    pub max_goals: u32,
    /// Head-to-head matches needed before the pairing history gets full weight.
    pub h2h_full_weight: f64,
    /// Weight of the head-to-head scoring rate once fully trusted.
    pub h2h_max_share: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            recent_limit: 10,
            rho: -0.13,
            max_goals: 10,
            h2h_full_weight: 6.0,
            h2h_max_share: 0.30,
        }
    }
}

impl BacktestConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            engine: EngineConfig::from_env(),
            recent_limit: env_usize("APP_BACKTEST_RECENT_LIMIT")
                .unwrap_or(d.recent_limit)
                .clamp(1, 100),
            rho: env_f64("APP_BACKTEST_RHO").unwrap_or(d.rho).clamp(-0.5, 0.5),
            max_goals: d.max_goals,
            h2h_full_weight: d.h2h_full_weight,
            h2h_max_share: d.h2h_max_share,
        }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

pub(crate) fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub(crate) fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"draw_probability": 27.5, "weights": {"xg_weight": 3.0}}"#)
                .unwrap();
        assert_eq!(cfg.draw_probability, 27.5);
        assert_eq!(cfg.weights.xg_weight, 3.0);
        assert_eq!(cfg.weights.base_score, WeightConfig::default().base_score);
        assert!(cfg.calibration.is_none());
    }
}
