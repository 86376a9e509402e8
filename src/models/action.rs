use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Action {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub progress_points: i32,
    pub target_count: i32,
    pub frequency: Frequency,
    pub time_of_day: TimeOfDay,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, Default)]
#[sqlx(type_name = "action_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    #[default]
    Encourage,
    Avoid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "action_frequency", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    #[sqlx(rename = "ONETIME")]
    #[serde(rename = "ONETIME")]
    OneTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "time_of_day", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeOfDay {
    #[default]
    Anytime,
    Morning,
    Afternoon,
    Evening,
}

impl Frequency {
    /// One-time actions are done once, whatever target was submitted.
    pub fn effective_target(self, requested: i32) -> i32 {
        match self {
            Frequency::OneTime => 1,
            _ => requested,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateActionRequest {
    #[validate(length(min = 1, max = 100, message = "Action name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description too long"))]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub action_type: Option<ActionType>,
    #[validate(range(min = 1, max = 5, message = "Progress points must be between 1 and 5"))]
    pub progress_points: Option<i32>,
    #[validate(range(min = 1, max = 100, message = "Target count must be between 1 and 100"))]
    pub target_count: Option<i32>,
    pub frequency: Option<Frequency>,
    pub time_of_day: Option<TimeOfDay>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateActionRequest {
    #[validate(length(min = 1, max = 100, message = "Action name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Description too long"))]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub action_type: Option<ActionType>,
    #[validate(range(min = 1, max = 5, message = "Progress points must be between 1 and 5"))]
    pub progress_points: Option<i32>,
    #[validate(range(min = 1, max = 100, message = "Target count must be between 1 and 100"))]
    pub target_count: Option<i32>,
    pub frequency: Option<Frequency>,
    pub time_of_day: Option<TimeOfDay>,
    pub completed: Option<bool>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    #[serde(rename = "type")]
    pub action_type: Option<ActionType>,
    pub frequency: Option<Frequency>,
    pub time_of_day: Option<TimeOfDay>,
    pub include_completed: Option<bool>,
}

impl ActionQuery {
    pub fn matches(&self, action: &Action) -> bool {
        if let Some(t) = self.action_type {
            if action.action_type != t {
                return false;
            }
        }
        if let Some(f) = self.frequency {
            if action.frequency != f {
                return false;
            }
        }
        if let Some(tod) = self.time_of_day {
            if action.time_of_day != tod {
                return false;
            }
        }
        if !self.include_completed.unwrap_or(true) && action.completed {
            return false;
        }
        true
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub end: Option<chrono::NaiveDate>,
    pub days: Option<u32>,
}

#[cfg(test)]
pub(crate) fn sample_action(action_type: ActionType, progress_points: i32, target_count: i32) -> Action {
    let now = Utc::now();
    Action {
        id: Uuid::new_v4(),
        user_id: Uuid::nil(),
        name: "Drink water".into(),
        description: None,
        action_type,
        progress_points,
        target_count,
        frequency: Frequency::Daily,
        time_of_day: TimeOfDay::Anytime,
        completed: false,
        completed_at: None,
        order_index: 0,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_wire_names() {
        assert_eq!(serde_json::to_value(ActionType::Avoid).unwrap(), "AVOID");
        assert_eq!(serde_json::to_value(Frequency::OneTime).unwrap(), "ONETIME");
        assert_eq!(serde_json::to_value(TimeOfDay::Evening).unwrap(), "EVENING");
    }

    #[test]
    fn test_one_time_forces_single_target() {
        assert_eq!(Frequency::OneTime.effective_target(4), 1);
        assert_eq!(Frequency::Weekly.effective_target(4), 4);
    }

    #[test]
    fn test_create_request_rejects_out_of_range_points() {
        let req: CreateActionRequest =
            serde_json::from_str(r#"{"name":"Read","progress_points":9}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_defaults_are_optional() {
        let req: CreateActionRequest =
            serde_json::from_str(r#"{"name":"Read","type":"AVOID"}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.action_type, Some(ActionType::Avoid));
        assert!(req.frequency.is_none());
    }

    #[test]
    fn test_query_filters_by_type_and_completion() {
        let mut action = sample_action(ActionType::Avoid, 2, 1);
        action.completed = true;

        let by_type = ActionQuery {
            action_type: Some(ActionType::Encourage),
            ..Default::default()
        };
        assert!(!by_type.matches(&action));

        let hide_done = ActionQuery {
            include_completed: Some(false),
            ..Default::default()
        };
        assert!(!hide_done.matches(&action));

        assert!(ActionQuery::default().matches(&action));
    }
}
