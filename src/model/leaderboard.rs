//! Standings: points first, ties broken by questions answered, then by who got there first.

use super::{TeamId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub team_id: TeamId,
    pub name: String,
    pub points: u32,
    /// Questions answered (or photo-completed) so far.
    pub progress: u32,
    pub total_questions: usize,
    pub progress_percent: u32,
}

/// Unranked input row.
#[derive(Debug, Clone)]
pub struct Standing {
    pub team_id: TeamId,
    pub name: String,
    pub points: u32,
    pub questions_answered: u32,
    pub total_questions: usize,
    pub last_update: Option<Timestamp>,
}

pub fn progress_percent(progress: u32, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let percent = (f64::from(progress) / total as f64 * 100.0).round() as u32;
    percent.min(100)
}

fn compare(a: &Standing, b: &Standing) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.questions_answered.cmp(&a.questions_answered))
        .then_with(|| match (a.last_update, b.last_update) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.name.cmp(&b.name))
}

pub fn rank(mut rows: Vec<Standing>) -> Vec<LeaderboardEntry> {
    rows.sort_by(compare);
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| LeaderboardEntry {
            rank: index + 1,
            team_id: row.team_id,
            progress_percent: progress_percent(row.questions_answered, row.total_questions),
            name: row.name,
            points: row.points,
            progress: row.questions_answered,
            total_questions: row.total_questions,
        })
        .collect()
}
