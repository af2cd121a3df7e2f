use std::path::PathBuf;

use matchcast::backtest::Backtester;
use matchcast::config::BacktestConfig;
use matchcast::domain::RankContext;
use matchcast::history::{self, InMemoryHistory, MatchHistory};
use matchcast::rankings;

fn load() -> InMemoryHistory {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/matches.json");
    InMemoryHistory::load_json(&path).expect("fixture parses")
}

#[test]
fn fixture_loads_with_optional_detail() {
    let history = load();
    assert_eq!(history.matches().len(), 13);
    assert_eq!(history.team_ids(), vec![10, 20, 30, 40]);
    let first = &history.matches()[0];
    assert_eq!(first.id, 1000);
    assert_eq!(first.xg_for_team(10), Some(2.0));
    assert!(!history.matches()[12].is_concluded());
}

#[test]
fn table_and_positions_match_the_results() {
    let history = load();
    let table = history::league_table(history.matches());
    let order: Vec<u32> = rankings::rank(&table, RankContext::Overall)
        .iter()
        .map(|r| r.team.team_id)
        .collect();
    assert_eq!(order, vec![10, 30, 20, 40]);

    let leader = table.iter().find(|r| r.team_id == 10).expect("team 10");
    assert_eq!(leader.overall.points, 16);
    assert_eq!(leader.overall.goals_for, 11);
    assert_eq!(leader.overall.goals_against, 3);

    let home = history
        .find_aggregated_stats(10, RankContext::Home)
        .expect("team 10 played at home");
    assert_eq!(home.home.played, 3);
    assert_eq!(home.home.points, 7);
}

#[test]
fn recent_matches_come_newest_first() {
    let history = load();
    let upcoming = history.matches()[12].kickoff;
    let ids: Vec<u64> = history
        .find_recent_matches(10, upcoming, 3)
        .iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![1010, 1009, 1006]);
}

#[test]
fn fixture_backtest_skips_opening_round_and_unplayed() {
    let history = load();
    let matches = history.matches();
    let report = Backtester::new(&history, BacktestConfig::default())
        .run_backtest(matches[0].kickoff, matches[12].kickoff)
        .expect("fixture backtest");
    assert_eq!(report.evaluated, 10);
    assert_eq!(report.skipped, 2);
    assert!(report.rows.iter().all(|r| r.match_id != 1012));
}
