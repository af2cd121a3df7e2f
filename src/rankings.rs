use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{RankContext, TeamAggregate, TeamId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedTeam {
    pub position: u32,
    pub team: TeamAggregate,
}

/// League positions for every context. A team without matches in a context has no entry there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPositions {
    pub overall: HashMap<TeamId, u32>,
    pub home: HashMap<TeamId, u32>,
    pub away: HashMap<TeamId, u32>,
}

impl ContextPositions {
    pub fn get(&self, context: RankContext, team: TeamId) -> Option<u32> {
        let map = match context {
            RankContext::Overall => &self.overall,
            RankContext::Home => &self.home,
            RankContext::Away => &self.away,
        };
        map.get(&team).copied()
    }
}

/// Order teams for one context: points, then goal difference, then goals scored, all
/// descending. Remaining ties keep their input order. Positions run 1..N with no gaps.
pub fn rank(teams: &[TeamAggregate], context: RankContext) -> Vec<RankedTeam> {
    let mut rows: Vec<&TeamAggregate> = teams
        .iter()
        .filter(|t| t.venue(context).played > 0)
        .collect();

    // `sort_by` is stable.
    rows.sort_by(|a, b| compare(a, b, context));

    rows.into_iter()
        .enumerate()
        .map(|(idx, team)| RankedTeam {
            position: idx as u32 + 1,
            team: team.clone(),
        })
        .collect()
}

/// Runs `rank` once per context. The three tables are independent.
pub fn rank_all(teams: &[TeamAggregate]) -> ContextPositions {
    let positions = |context| {
        rank(teams, context)
            .into_iter()
            .map(|r| (r.team.team_id, r.position))
            .collect::<HashMap<_, _>>()
    };
    ContextPositions {
        overall: positions(RankContext::Overall),
        home: positions(RankContext::Home),
        away: positions(RankContext::Away),
    }
}

fn compare(a: &TeamAggregate, b: &TeamAggregate, context: RankContext) -> Ordering {
    let va = a.venue(context);
    let vb = b.venue(context);
    vb.points
        .cmp(&va.points)
        .then_with(|| vb.goal_diff().cmp(&va.goal_diff()))
        .then_with(|| vb.goals_for.cmp(&va.goals_for))
}
