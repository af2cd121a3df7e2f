use crate::domain::{Outcome, PredictionResult, classify_outcome};
use crate::error::{ModelError, ModelResult};

/// A home or away call counts as correct at this probability even if it was not the favourite.
pub const WIN_CONFIDENCE_BAR: f64 = 40.0;
/// Draws are harder to call, so the bar is lower.
pub const DRAW_CONFIDENCE_BAR: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub brier_score: f64,
    pub correct: bool,
}

/// Score a prediction against the final result without touching it.
pub fn score(prediction: &PredictionResult, home_goals: u32, away_goals: u32) -> Evaluation {
    let outcome = classify_outcome(home_goals, away_goals);
    let prob = prediction.as_prob3();
    let brier_score = prob.brier(outcome);

    let p_actual = prob.get(outcome) * 100.0;
    // Shared maximum counts as holding it.
    let is_max = p_actual >= prob.home.max(prob.draw).max(prob.away) * 100.0;
    let bar = match outcome {
        Outcome::Draw => DRAW_CONFIDENCE_BAR,
        Outcome::Home | Outcome::Away => WIN_CONFIDENCE_BAR,
    };

    Evaluation {
        outcome,
        brier_score,
        correct: is_max || p_actual >= bar,
    }
}

/// Record the Brier score and correctness flag on a prediction once its match is over.
/// A prediction can only be evaluated once.
pub fn evaluate(
    prediction: &mut PredictionResult,
    home_goals: u32,
    away_goals: u32,
) -> ModelResult<Evaluation> {
    if prediction.is_evaluated() {
        return Err(ModelError::InvalidInput(
            "prediction has already been evaluated".to_string(),
        ));
    }
    let evaluation = score(prediction, home_goals, away_goals);
    prediction.brier_score = Some(evaluation.brier_score);
    prediction.correct = Some(evaluation.correct);
    Ok(evaluation)
}
