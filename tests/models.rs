use matchcast::ModelError;
use matchcast::config::EngineConfig;
use matchcast::dixon_coles::{self, ScoreGrid};
use matchcast::domain::{RankContext, TeamStats};
use matchcast::elo::{self, EloBook, EloConfig};
use matchcast::estimator::{self, EstimatorConfig};
use matchcast::history;
use matchcast::prediction::PredictionEngine;
use matchcast::rankings;
use matchcast::synthetic::{self, SeasonSpec};

fn stats(points: u32, played: u32, last5: u32, rank: u32, xg: f64) -> TeamStats {
    TeamStats {
        rank: Some(rank),
        points,
        matches_played: played,
        last5_points: last5,
        xg: Some(xg),
        ..TeamStats::default()
    }
}

#[test]
fn prediction_is_a_distribution_for_many_profiles() {
    let engine = PredictionEngine::new(EngineConfig::default());
    for points in [0, 5, 20, 45, 70] {
        for rank in [1, 8, 20] {
            let home = stats(points, 30, points.min(15), rank, 1.2);
            let away = stats(70 - points, 30, 7, 21 - rank, 1.0);
            let p = engine.calculate_match_prediction(&home, &away).unwrap();
            let total = p.home_win_probability + p.draw_probability + p.away_win_probability;
            assert!((total - 100.0).abs() < 1e-6, "total {total}");
            for v in [p.home_win_probability, p.draw_probability, p.away_win_probability] {
                assert!((0.0..=100.0).contains(&v));
            }
            assert!(p.brier_score.is_none() && p.correct.is_none());
        }
    }
}

#[test]
fn stronger_home_side_is_favoured() {
    let engine = PredictionEngine::new(EngineConfig::default());
    let strong = stats(60, 25, 13, 1, 2.1);
    let weak = stats(15, 25, 2, 19, 0.8);
    let p = engine.calculate_match_prediction(&strong, &weak).unwrap();
    assert!(p.home_win_probability > p.away_win_probability);
    assert!(p.home_power_score > p.away_power_score);

    let flipped = engine.calculate_match_prediction(&weak, &strong).unwrap();
    assert!(flipped.away_win_probability > flipped.home_win_probability);
}

#[test]
fn impossible_stats_are_rejected() {
    let engine = PredictionEngine::new(EngineConfig::default());
    let broken = TeamStats {
        points: 40,
        matches_played: 5,
        ..TeamStats::default()
    };
    let err = engine
        .calculate_match_prediction(&broken, &TeamStats::default())
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidInput(_)));
}

#[test]
fn scoreline_grid_sums_near_one() {
    for (lambda, mu, rho) in [(1.4, 1.1, -0.13), (2.8, 0.4, -0.05), (0.3, 0.3, 0.1)] {
        let grid = ScoreGrid::new(lambda, mu, rho, 10);
        assert!((grid.total() - 1.0).abs() < 1e-3, "total {}", grid.total());
        for x in 0..=10 {
            for y in 0..=10 {
                assert!(grid.get(x, y) >= 0.0);
            }
        }
        let p = dixon_coles::outcome_probs(lambda, mu, rho, 10);
        assert!((p.home + p.draw + p.away - 1.0).abs() < 1e-9);
    }
}

#[test]
fn dropping_points_never_lifts_a_team() {
    let season = synthetic::generate_season(&SeasonSpec::default());
    let table = history::league_table(&season);
    let before = rankings::rank_all(&table);

    for team in [1, 4, 7, 10] {
        let mut worse = table.clone();
        let row = worse
            .iter_mut()
            .find(|r| r.team_id == team)
            .expect("team in table");
        row.overall.points = row.overall.points.saturating_sub(6);
        let after = rankings::rank_all(&worse);
        assert!(
            after.get(RankContext::Overall, team) >= before.get(RankContext::Overall, team),
            "team {team} moved up"
        );
    }
}

#[test]
fn every_context_ranks_every_team_once() {
    let season = synthetic::generate_season(&SeasonSpec::default());
    let table = history::league_table(&season);
    for context in RankContext::ALL {
        let ranked = rankings::rank(&table, context);
        assert_eq!(ranked.len(), table.len());
        let positions: Vec<u32> = ranked.iter().map(|r| r.position).collect();
        assert_eq!(positions, (1..=table.len() as u32).collect::<Vec<_>>());
    }
}

#[test]
fn estimator_recovers_the_strength_order() {
    let spec = SeasonSpec {
        teams: 8,
        seed: 11,
        strength_spread: 0.6,
        ..SeasonSpec::default()
    };
    let season = synthetic::generate_season(&spec);
    let reference = season[season.len() - 1].kickoff;
    let outcome = estimator::fit(spec.league_id, &season, reference, &EstimatorConfig::default())
        .expect("fit runs");

    assert_eq!(outcome.matches_used, season.len());
    let teams = &outcome.params.teams;
    let overall = |id: u32| teams[&id].attack + teams[&id].defense;
    assert!(overall(1) > overall(8));
    assert!(outcome.params.rho.is_finite());
    assert!(outcome.params.home_advantage.is_finite());

    let grid = outcome.params.score_grid(1, 8, 10).expect("both teams fitted");
    let p = grid.outcome_probs();
    assert!(p.home > p.away);
}

#[test]
fn elo_replay_is_zero_sum_and_orders_the_season() {
    let season = synthetic::generate_season(&SeasonSpec {
        strength_spread: 0.6,
        ..SeasonSpec::default()
    });
    let mut book = EloBook::new(EloConfig::default());
    assert_eq!(book.replay(&season), season.len());

    let total: i32 = book.ratings().values().sum();
    assert_eq!(total, elo::DEFAULT_RATING * book.ratings().len() as i32);
    assert!(book.rating(1) > book.rating(10));
    assert_eq!(book.rating(999), elo::DEFAULT_RATING);
}
