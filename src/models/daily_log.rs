use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::scoring::{CountStep, Milestone};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct DailyLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action_id: Uuid,
    pub count: i32,
    pub points: i32,
    #[sqlx(rename = "log_date")]
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Set an absolute count for an action on a day.
#[derive(Debug, Deserialize)]
pub struct SetCountRequest {
    pub action_id: Uuid,
    pub date: Option<NaiveDate>,
    pub count: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustCountRequest {
    pub action_id: Uuid,
    pub date: Option<NaiveDate>,
    pub step: CountStep,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdjustCountResponse {
    pub log: DailyLog,
    pub milestone: Milestone,
    pub is_complete: bool,
}

#[derive(Debug, Deserialize)]
pub struct DailyLogQuery {
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_serializes_as_calendar_day() {
        let now = Utc::now();
        let log = DailyLog {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            action_id: Uuid::nil(),
            count: 2,
            points: 6,
            date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["date"], "2025-03-09");
        assert_eq!(json["points"], 6);
    }

    #[test]
    fn test_adjust_request_deserializes_step() {
        let json = r#"{"action_id":"00000000-0000-0000-0000-000000000000","step":"decrement"}"#;
        let req: AdjustCountRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.step, CountStep::Decrement);
        assert!(req.date.is_none());
    }
}
