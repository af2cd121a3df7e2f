use tracing::debug;

use crate::calibration::CalibrationParameters;
use crate::config::EngineConfig;
use crate::domain::{PredictionResult, TeamStats};
use crate::error::{ModelError, ModelResult};
use crate::score_model::power_score;

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionEngine {
    config: EngineConfig,
}

impl PredictionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn calculate_match_prediction(
        &self,
        home_stats: &TeamStats,
        away_stats: &TeamStats,
    ) -> ModelResult<PredictionResult> {
        home_stats.validate()?;
        away_stats.validate()?;
        let weights = &self.config.weights;
        let home_score = power_score(home_stats, true, weights);
        let away_score = power_score(away_stats, false, weights);
        if !home_score.is_finite() || !away_score.is_finite() {
            return Err(ModelError::InvalidInput(format!(
                "power scores must be finite (home={home_score}, away={away_score})"
            )));
        }

        // A negative score has no meaning as a share of the total.
        let h = home_score.max(0.0);
        let a = away_score.max(0.0);
        let total = h + a;
        if total <= 0.0 {
            return Err(ModelError::InvalidInput(format!(
                "both power scores are non-positive (home={home_score}, away={away_score})"
            )));
        }

        let mut raw_home = h / total * 100.0;
        let mut raw_away = a / total * 100.0;

        if let Some(params) = self.config.calibration {
            (raw_home, raw_away) = calibrate_shares(raw_home, raw_away, &params);
        }

        let draw = self.config.draw_probability.clamp(0.0, 100.0);
        let scale = (100.0 - draw) / 100.0;

        let home_win_probability = round2(raw_home * scale);
        let away_win_probability = round2(raw_away * scale);
        // Rounding residue goes to the draw so the three always add up to 100.
        let draw_probability = round2(100.0 - home_win_probability - away_win_probability).max(0.0);

        debug!(
            home_score,
            away_score,
            home_win_probability,
            draw_probability,
            away_win_probability,
            "match prediction"
        );

        Ok(PredictionResult {
            home_win_probability,
            draw_probability,
            away_win_probability,
            home_power_score: home_score,
            away_power_score: away_score,
            brier_score: None,
            correct: None,
        })
    }
}

/// Only the favourite's share goes through the logistic map; the other side takes the rest.
/// The favourite is floored at an even split, so raising `b` can only pull it toward 50.
fn calibrate_shares(raw_home: f64, raw_away: f64, params: &CalibrationParameters) -> (f64, f64) {
    if raw_home >= raw_away {
        let fav = params.apply(raw_home).clamp(50.0, 100.0);
        (fav, 100.0 - fav)
    } else {
        let fav = params.apply(raw_away).clamp(50.0, 100.0);
        (100.0 - fav, fav)
    }
}

/// Slack for decimal midpoints that land a hair below `.5` in binary (`1.005 * 100`).
const ROUND_EPS: f64 = 1e-9;

/// Two decimal places, half away from zero, with decimal midpoints treated as midpoints.
pub fn round2(v: f64) -> f64 {
    let scaled = v * 100.0;
    (scaled + ROUND_EPS.copysign(scaled)).round() / 100.0
}
