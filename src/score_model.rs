use crate::config::WeightConfig;
use crate::domain::TeamStats;

/// Rank term is counted from this position, so 1st gets 20 and 21st or lower gets nothing.
const RANK_CEILING: f64 = 21.0;

/// Scalar strength estimate for one side of a fixture. Missing optional inputs add nothing.
pub fn power_score(stats: &TeamStats, is_home: bool, weights: &WeightConfig) -> f64 {
    let mut score = weights.base_score;
    if is_home {
        score += weights.home_advantage;
    }
    score += stats.points as f64 * weights.points_weight;
    score += stats.last5_points as f64 * weights.form_weight;
    if let Some(xg) = stats.xg {
        score += xg * weights.xg_weight;
    }
    if let Some(rank) = stats.rank {
        score += (RANK_CEILING - rank as f64) * weights.rank_weight;
    }
    score += stats.goal_diff() as f64 * weights.goal_diff_weight;
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_score_base_plus_home() {
        let w = WeightConfig::default();
        let stats = TeamStats::default();
        assert_eq!(power_score(&stats, false, &w), w.base_score);
        assert_eq!(power_score(&stats, true, &w), w.base_score + w.home_advantage);
    }

    #[test]
    fn each_term_uses_its_weight() {
        let w = WeightConfig {
            base_score: 0.0,
            home_advantage: 0.0,
            rank_weight: 2.0,
            points_weight: 1.0,
            form_weight: 3.0,
            xg_weight: 4.0,
            goal_diff_weight: 0.5,
            league_average_goals: 2.6,
        };
        let stats = TeamStats {
            rank: Some(11),
            points: 30,
            last5_points: 7,
            xg: Some(1.5),
            goals_for: 20,
            goals_against: 14,
            ..TeamStats::default()
        };
        // 30 + 21 + 6 + 20 + 3
        assert!((power_score(&stats, false, &w) - 80.0).abs() < 1e-9);
    }
}
