use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Outcome, Prob3};

/// Fixed nudge applied to `b` when the model runs hot.
pub const B_STEP: f64 = 0.1;

/// Logistic remap `1 / (1 + exp(a*p + b))` of a probability `p` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub a: f64,
    pub b: f64,
}

impl Default for CalibrationParameters {
    /// Maps 50% to itself and stays close to identity across 25..75%.
    fn default() -> Self {
        Self { a: -4.0, b: 2.0 }
    }
}

impl CalibrationParameters {
    pub fn apply(&self, raw_percent: f64) -> f64 {
        calibrate(raw_percent, self.a, self.b)
    }
}

/// One emitted probability and whether the event it priced happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Percent, 0..100.
    pub predicted: f64,
    pub actual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationUpdate {
    NoData,
    Unchanged,
    Dampened,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

pub fn calibrate(raw_percent: f64, a: f64, b: f64) -> f64 {
    let p = (raw_percent / 100.0).clamp(0.0, 1.0);
    100.0 / (1.0 + (a * p + b).exp())
}

/// Bias-correction step over a batch of samples. This is a fixed-step heuristic and not a
/// maximum-likelihood Platt fit: only systematic overconfidence moves `b`.
pub fn update_parameters(
    params: &mut CalibrationParameters,
    samples: &[CalibrationSample],
) -> CalibrationUpdate {
    if samples.is_empty() {
        return CalibrationUpdate::NoData;
    }
    let n = samples.len() as f64;
    let mean_pred = samples
        .iter()
        .map(|s| (s.predicted / 100.0).clamp(0.0, 1.0))
        .sum::<f64>()
        / n;
    let mean_actual = samples.iter().filter(|s| s.actual).count() as f64 / n;

    debug!(
        samples = samples.len(),
        mean_pred, mean_actual, a = params.a, b = params.b, "calibration update"
    );

    if mean_pred > mean_actual {
        params.b += B_STEP;
        CalibrationUpdate::Dampened
    } else {
        CalibrationUpdate::Unchanged
    }
}

/// The favourite's probability and whether it came in. Pooling all three classes would pin
/// both means at 1/3, so only the argmax is sampled.
pub fn favourite_sample(prob: Prob3, actual: Outcome) -> CalibrationSample {
    let favourite = prob.argmax();
    CalibrationSample {
        predicted: prob.get(favourite) * 100.0,
        actual: favourite == actual,
    }
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::default();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        brier_sum += p.brier(*outcome);
        let actual_prob = p.get(*outcome).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();
        if p.argmax() == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.get(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Expected calibration error averaged over the three outcome classes.
pub fn ece_1x2(preds: &[Prob3], outcomes: &[Outcome], bins: usize) -> f64 {
    if preds.is_empty() || preds.len() != outcomes.len() || bins == 0 {
        return 0.0;
    }
    let n = preds.len() as f64;
    let mut sum = 0.0;
    for class in [Outcome::Home, Outcome::Draw, Outcome::Away] {
        for b in calibration_bins(preds, outcomes, class, bins) {
            if b.count == 0 {
                continue;
            }
            sum += (b.count as f64 / n) * (b.avg_pred - b.actual_rate).abs();
        }
    }
    sum / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_with_zero_params_is_fifty() {
        assert!((calibrate(50.0, 0.0, 0.0) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn calibrate_decreases_in_linear_term() {
        let mut last = f64::INFINITY;
        for step in -20..=20 {
            let b = step as f64 / 4.0;
            let v = calibrate(60.0, 1.0, b);
            assert!(v < last);
            last = v;
        }
    }

    #[test]
    fn default_params_fix_the_midpoint() {
        let p = CalibrationParameters::default();
        assert!((p.apply(50.0) - 50.0).abs() < 1e-9);
        assert!(p.apply(70.0) > 60.0);
    }

    #[test]
    fn overconfident_history_nudges_b_up() {
        let mut params = CalibrationParameters { a: 0.0, b: 0.0 };
        let samples = vec![
            CalibrationSample {
                predicted: 80.0,
                actual: false,
            },
            CalibrationSample {
                predicted: 70.0,
                actual: true,
            },
        ];
        assert_eq!(update_parameters(&mut params, &samples), CalibrationUpdate::Dampened);
        assert!((params.b - 0.1).abs() < 1e-12);
    }

    #[test]
    fn underconfident_history_leaves_params_alone() {
        let mut params = CalibrationParameters::default();
        let samples = vec![CalibrationSample {
            predicted: 30.0,
            actual: true,
        }];
        assert_eq!(update_parameters(&mut params, &samples), CalibrationUpdate::Unchanged);
        assert_eq!(params, CalibrationParameters::default());
        assert_eq!(update_parameters(&mut params, &[]), CalibrationUpdate::NoData);
    }

    #[test]
    fn favourite_sample_tracks_the_argmax() {
        let prob = Prob3 {
            home: 0.2,
            draw: 0.3,
            away: 0.5,
        };
        let hit = favourite_sample(prob, Outcome::Away);
        assert!((hit.predicted - 50.0).abs() < 1e-9);
        assert!(hit.actual);
        assert!(!favourite_sample(prob, Outcome::Home).actual);
    }

    fn home_prob(home: f64) -> Prob3 {
        let rest = (1.0 - home) / 2.0;
        Prob3 {
            home,
            draw: rest,
            away: rest,
        }
    }

    #[test]
    fn bins_split_by_class_probability() {
        let preds = vec![home_prob(0.2), home_prob(0.4), home_prob(0.7), home_prob(0.9)];
        let outcomes = vec![Outcome::Away, Outcome::Home, Outcome::Draw, Outcome::Home];
        let bins = calibration_bins(&preds, &outcomes, Outcome::Home, 2);
        assert_eq!(bins.len(), 2);

        assert_eq!(bins[0].count, 2);
        assert!((bins[0].bucket_end - 0.5).abs() < 1e-12);
        assert!((bins[0].avg_pred - 0.3).abs() < 1e-12);
        assert!((bins[0].actual_rate - 0.5).abs() < 1e-12);

        assert_eq!(bins[1].count, 2);
        assert!((bins[1].avg_pred - 0.8).abs() < 1e-12);
        assert!((bins[1].actual_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn certain_predictions_land_in_the_top_bin() {
        let preds = vec![Prob3::one_hot(Outcome::Away)];
        let bins = calibration_bins(&preds, &[Outcome::Away], Outcome::Away, 1);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].count, 0);
        assert_eq!(bins[0].avg_pred, 0.0);
        assert_eq!(bins[1].count, 1);
        assert!((bins[1].actual_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn one_hot_hits_have_no_calibration_error() {
        let preds = vec![
            Prob3::one_hot(Outcome::Home),
            Prob3::one_hot(Outcome::Draw),
            Prob3::one_hot(Outcome::Away),
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        assert!(ece_1x2(&preds, &outcomes, 10) < 1e-12);
    }

    #[test]
    fn uniform_predictions_on_home_wins_have_known_error() {
        let uniform = Prob3 {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        };
        let preds = vec![uniform, uniform];
        let outcomes = vec![Outcome::Home, Outcome::Home];
        // Home misses by 2/3, draw and away by 1/3 each.
        assert!((ece_1x2(&preds, &outcomes, 10) - 4.0 / 9.0).abs() < 1e-12);
        assert_eq!(ece_1x2(&preds, &outcomes[..1], 10), 0.0);
        assert_eq!(ece_1x2(&[], &[], 10), 0.0);
    }

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3::one_hot(Outcome::Home),
            Prob3::one_hot(Outcome::Draw),
            Prob3::one_hot(Outcome::Away),
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert!((m.accuracy - 1.0).abs() < 1e-12);
    }
}
