use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::action::{Action, ActionType};
use crate::models::daily_log::DailyLog;
use crate::services::dates;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CountStep {
    Increment,
    Decrement,
}

/// What a single count step achieved relative to the action's target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Increment that reached (or passed) the target.
    Completed,
    /// Increment that left the count one short of the target.
    OneAway,
    Decremented,
    Progress,
}

pub fn points_for(progress_points: i32, count: i32) -> i32 {
    progress_points.saturating_mul(count)
}

pub fn next_count(current: i32, step: CountStep) -> i32 {
    match step {
        CountStep::Increment => current.saturating_add(1),
        CountStep::Decrement => current.saturating_sub(1).max(0),
    }
}

pub fn is_complete(count: i32, target: i32) -> bool {
    count >= target
}

pub fn milestone(step: CountStep, new_count: i32, target: i32) -> Milestone {
    match step {
        CountStep::Decrement => Milestone::Decremented,
        CountStep::Increment if is_complete(new_count, target) => Milestone::Completed,
        CountStep::Increment if new_count == target - 1 => Milestone::OneAway,
        CountStep::Increment => Milestone::Progress,
    }
}

pub fn day_score(logs: &[DailyLog]) -> i64 {
    logs.iter().map(|l| l.points as i64).sum()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TypeCompletion {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreSummary {
    pub date: NaiveDate,
    pub score: i64,
    pub previous_score: i64,
    pub difference: i64,
    pub encourage: TypeCompletion,
    pub avoid: TypeCompletion,
}

/// Score for `date` compared with the previous day, plus how many actions of
/// each type reached their target on `date`.
pub fn summarize(
    date: NaiveDate,
    actions: &[Action],
    logs_for_date: &[DailyLog],
    logs_for_previous: &[DailyLog],
) -> ScoreSummary {
    let score = day_score(logs_for_date);
    let previous_score = day_score(logs_for_previous);

    let counts: HashMap<Uuid, i32> = logs_for_date
        .iter()
        .map(|l| (l.action_id, l.count))
        .collect();

    let mut encourage = TypeCompletion::default();
    let mut avoid = TypeCompletion::default();
    for action in actions {
        let bucket = match action.action_type {
            ActionType::Encourage => &mut encourage,
            ActionType::Avoid => &mut avoid,
        };
        bucket.total += 1;
        let count = counts.get(&action.id).copied().unwrap_or(0);
        if count > 0 && is_complete(count, action.target_count) {
            bucket.completed += 1;
        }
    }

    ScoreSummary {
        date,
        score,
        previous_score,
        difference: score - previous_score,
        encourage,
        avoid,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub label: String,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyTrend {
    pub days: Vec<TrendPoint>,
    pub total: i64,
    pub average: f64,
    pub max: i64,
    pub all_zero: bool,
}

/// Per-day score over `days` (oldest first). Logs outside `days` are ignored.
pub fn weekly_trend(days: &[NaiveDate], today: NaiveDate, logs: &[DailyLog]) -> WeeklyTrend {
    let mut by_date: HashMap<NaiveDate, i64> = HashMap::new();
    for log in logs {
        *by_date.entry(log.date).or_insert(0) += log.points as i64;
    }

    let points: Vec<TrendPoint> = days
        .iter()
        .map(|d| TrendPoint {
            date: *d,
            label: dates::weekday_label(*d, today),
            score: by_date.get(d).copied().unwrap_or(0),
        })
        .collect();

    let total: i64 = points.iter().map(|p| p.score).sum();
    let average = if points.is_empty() {
        0.0
    } else {
        total as f64 / points.len() as f64
    };
    let max = points.iter().map(|p| p.score).max().unwrap_or(0);
    let all_zero = points.iter().all(|p| p.score == 0);

    WeeklyTrend {
        days: points,
        total,
        average,
        max,
        all_zero,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub count: i32,
    pub target: i32,
    pub is_completed: bool,
    pub is_partial: bool,
    pub completion_percentage: f64,
    pub is_first_of_month: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionHistory {
    pub action_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<HistoryDay>,
    pub completed_days: usize,
    pub can_go_next: bool,
}

pub const DEFAULT_HISTORY_DAYS: u32 = 30;

/// Day-by-day history of one action over `window` days ending at `end`.
pub fn action_history(
    action: &Action,
    end: NaiveDate,
    window: u32,
    today: NaiveDate,
    logs: &[DailyLog],
) -> ActionHistory {
    let counts: HashMap<NaiveDate, i32> = logs
        .iter()
        .filter(|l| l.action_id == action.id)
        .map(|l| (l.date, l.count))
        .collect();

    let target = action.target_count;
    let days: Vec<HistoryDay> = dates::days_ending(end, window)
        .into_iter()
        .map(|date| {
            let count = counts.get(&date).copied().unwrap_or(0);
            let is_completed = count > 0 && is_complete(count, target);
            let completion_percentage = if target > 0 {
                (count as f64 / target as f64 * 100.0).min(100.0)
            } else {
                0.0
            };
            HistoryDay {
                date,
                count,
                target,
                is_completed,
                is_partial: count > 0 && !is_completed,
                completion_percentage,
                is_first_of_month: date.day() == 1,
            }
        })
        .collect();

    let start = days.first().map(|d| d.date).unwrap_or(end);
    let completed_days = days.iter().filter(|d| d.is_completed).count();

    ActionHistory {
        action_id: action.id,
        start,
        end,
        days,
        completed_days,
        can_go_next: end + Duration::days(window as i64) <= today,
    }
}
