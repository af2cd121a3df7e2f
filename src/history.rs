use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::domain::{MatchObservation, RankContext, TeamAggregate, TeamId, TeamStats, result_points};

/// Form window used for the `last5_*` fields.
pub const FORM_MATCHES: usize = 5;

/// Read access to concluded matches. Every query that takes `before` must only return matches
/// kicking off strictly earlier than it.
pub trait MatchHistory {
    /// Head-to-head meetings in either orientation, oldest first.
    fn find_matches_between(
        &self,
        team_a: TeamId,
        team_b: TeamId,
        before: DateTime<Utc>,
    ) -> Vec<MatchObservation>;

    /// Most recent first.
    fn find_recent_matches(
        &self,
        team: TeamId,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Vec<MatchObservation>;

    /// `None` when the team has no concluded match in that context.
    fn find_aggregated_stats(&self, team: TeamId, context: RankContext) -> Option<TeamAggregate>;

    /// Concluded matches with `from <= kickoff <= to`, oldest first.
    fn find_concluded_matches(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<MatchObservation>;

    /// All concluded matches before `before`, oldest first.
    fn find_matches_before(&self, before: DateTime<Utc>) -> Vec<MatchObservation>;
}

/// Arena of matches with a per-team index. Teams and matches only reference each other by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    matches: Vec<MatchObservation>,
    by_team: HashMap<TeamId, Vec<usize>>,
}

impl InMemoryHistory {
    pub fn new(mut matches: Vec<MatchObservation>) -> Self {
        matches.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));
        let mut by_team: HashMap<TeamId, Vec<usize>> = HashMap::new();
        for (idx, m) in matches.iter().enumerate() {
            by_team.entry(m.home_id).or_default().push(idx);
            if m.away_id != m.home_id {
                by_team.entry(m.away_id).or_default().push(idx);
            }
        }
        Self { matches, by_team }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let matches: Vec<MatchObservation> =
            serde_json::from_str(raw).context("invalid match observations json")?;
        Ok(Self::new(matches))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read match file {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parse match file {}", path.display()))
    }

    pub fn matches(&self) -> &[MatchObservation] {
        &self.matches
    }

    pub fn team_ids(&self) -> Vec<TeamId> {
        let mut ids: Vec<TeamId> = self.by_team.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn team_matches(&self, team: TeamId) -> impl DoubleEndedIterator<Item = &MatchObservation> {
        self.by_team
            .get(&team)
            .into_iter()
            .flatten()
            .map(|idx| &self.matches[*idx])
    }
}

impl MatchHistory for InMemoryHistory {
    fn find_matches_between(
        &self,
        team_a: TeamId,
        team_b: TeamId,
        before: DateTime<Utc>,
    ) -> Vec<MatchObservation> {
        self.team_matches(team_a)
            .filter(|m| m.involves(team_b) && m.kickoff < before && m.is_concluded())
            .cloned()
            .collect()
    }

    fn find_recent_matches(
        &self,
        team: TeamId,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Vec<MatchObservation> {
        self.team_matches(team)
            .rev()
            .filter(|m| m.kickoff < before && m.is_concluded())
            .take(limit)
            .cloned()
            .collect()
    }

    fn find_aggregated_stats(&self, team: TeamId, context: RankContext) -> Option<TeamAggregate> {
        let played: Vec<MatchObservation> = self.team_matches(team).cloned().collect();
        let table = league_table(&played);
        table
            .into_iter()
            .find(|row| row.team_id == team)
            .filter(|row| row.venue(context).played > 0)
    }

    fn find_concluded_matches(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<MatchObservation> {
        self.matches
            .iter()
            .filter(|m| m.kickoff >= from && m.kickoff <= to && m.is_concluded())
            .cloned()
            .collect()
    }

    fn find_matches_before(&self, before: DateTime<Utc>) -> Vec<MatchObservation> {
        self.matches
            .iter()
            .take_while(|m| m.kickoff < before)
            .filter(|m| m.is_concluded())
            .cloned()
            .collect()
    }
}

/// League table rows for every team in `matches`, ordered by team id. Unplayed fixtures
/// are skipped.
pub fn league_table(matches: &[MatchObservation]) -> Vec<TeamAggregate> {
    let mut rows: BTreeMap<TeamId, TeamAggregate> = BTreeMap::new();
    for m in matches {
        let Some((hg, ag)) = m.score() else { continue };
        let home = rows
            .entry(m.home_id)
            .or_insert_with(|| TeamAggregate::new(m.home_id));
        home.overall.record(hg, ag);
        home.home.record(hg, ag);
        let away = rows
            .entry(m.away_id)
            .or_insert_with(|| TeamAggregate::new(m.away_id));
        away.overall.record(ag, hg);
        away.away.record(ag, hg);
    }
    rows.into_values().collect()
}

/// Build a team's statistical profile from its season record and its recent matches
/// (most recent first).
pub fn team_stats_from_history(
    team: TeamId,
    season: Option<&TeamAggregate>,
    recent: &[MatchObservation],
    rank: Option<u32>,
) -> TeamStats {
    let mut stats = TeamStats {
        rank,
        ..TeamStats::default()
    };

    if let Some(row) = season {
        stats.points = row.overall.points;
        stats.home_points = row.home.points;
        stats.away_points = row.away.points;
        stats.matches_played = row.overall.played;
        stats.home_matches_played = row.home.played;
        stats.away_matches_played = row.away.played;
        stats.goals_for = row.overall.goals_for;
        stats.goals_against = row.overall.goals_against;
        stats.home_goals_for = row.home.goals_for;
        stats.home_goals_against = row.home.goals_against;
        stats.away_goals_for = row.away.goals_for;
        stats.away_goals_against = row.away.goals_against;
    }

    for m in recent.iter().take(FORM_MATCHES) {
        let Some((gf, ga)) = m.goals_for_team(team) else { continue };
        stats.last5_points += result_points(gf, ga);
        stats.last5_goals_for += gf;
        stats.last5_goals_against += ga;
    }

    let xgs: Vec<f64> = recent.iter().filter_map(|m| m.xg_for_team(team)).collect();
    if !xgs.is_empty() {
        stats.xg = Some(xgs.iter().sum::<f64>() / xgs.len() as f64);
    }

    stats
}

/// Mean goals scored and conceded per match by `team` over `matches`.
pub fn scoring_rates(team: TeamId, matches: &[MatchObservation]) -> Option<(f64, f64)> {
    let mut n = 0usize;
    let mut scored = 0.0_f64;
    let mut conceded = 0.0_f64;
    for m in matches {
        let Some((gf, ga)) = m.goals_for_team(team) else { continue };
        scored += gf as f64;
        conceded += ga as f64;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    Some((scored / n as f64, conceded / n as f64))
}
