use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::api::{ClientError, LogBackend};
use super::cache::LogsCache;
use crate::models::action::Action;
use crate::models::daily_log::{AdjustCountResponse, DailyLog};
use crate::services::dates;
use crate::services::events::{ChangeOp, SyncEvent};
use crate::services::scoring::{next_count, points_for, CountStep};

#[derive(Debug, Clone, PartialEq)]
pub enum AdjustOutcome {
    /// Another adjustment for the same action had not finished yet.
    Skipped,
    Applied(AdjustCountResponse),
}

const LOAD_ATTEMPTS: usize = 3;

/// What an optimistic write replaced, and which load of the day it went into.
struct Optimistic {
    previous: Option<DailyLog>,
    stamp: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    cache: LogsCache,
    days_back: u32,
    in_flight: HashSet<Uuid>,
}

/// Tracks the selected day's logs with optimistic count updates.
pub struct DailyTracker<B> {
    backend: B,
    tz: Tz,
    max_days_back: u32,
    state: Mutex<TrackerState>,
}

impl<B: LogBackend> DailyTracker<B> {
    pub fn new(backend: B, tz: Tz, max_days_back: u32) -> Self {
        Self {
            backend,
            tz,
            max_days_back,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn days_back(&self) -> u32 {
        self.state.lock().await.days_back
    }

    pub async fn selected_date(&self) -> NaiveDate {
        let days_back = self.days_back().await;
        dates::date_in(days_back as i64, self.tz, Utc::now())
    }

    /// Move one day further into the past. False when already at the limit.
    pub async fn go_back(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.days_back >= self.max_days_back {
            return false;
        }
        state.days_back += 1;
        true
    }

    /// Move one day towards today. False when already on today.
    pub async fn go_forward(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.days_back == 0 {
            return false;
        }
        state.days_back -= 1;
        true
    }

    pub async fn set_days_back(&self, days_back: u32) {
        self.state.lock().await.days_back = days_back.min(self.max_days_back);
    }

    /// Fetch a day's logs unless they are already cached.
    pub async fn load_day(&self, date: NaiveDate) -> Result<Vec<DailyLog>, ClientError> {
        {
            let state = self.state.lock().await;
            if state.cache.is_loaded(date) {
                return Ok(state.cache.logs_for(date).to_vec());
            }
        }

        let logs = self.backend.fetch_day(date).await?;
        tracing::debug!(%date, count = logs.len(), "Loaded daily logs");

        let mut state = self.state.lock().await;
        state.cache.insert_day(date, logs.clone());
        Ok(logs)
    }

    pub async fn load_selected(&self) -> Result<Vec<DailyLog>, ClientError> {
        let date = self.selected_date().await;
        self.load_day(date).await
    }

    /// Drop a cached day, e.g. after a change event for it arrives.
    pub async fn invalidate(&self, date: NaiveDate) {
        self.state.lock().await.cache.invalidate(date);
    }

    pub async fn count_for(&self, action_id: Uuid, date: NaiveDate) -> i32 {
        self.state.lock().await.cache.count_for(action_id, date)
    }

    pub async fn day_score(&self, date: NaiveDate) -> i64 {
        self.state.lock().await.cache.day_score(date)
    }

    pub async fn log_for(&self, action_id: Uuid, date: NaiveDate) -> Option<DailyLog> {
        self.state.lock().await.cache.log_for(action_id, date).cloned()
    }

    pub async fn adjust(&self, action: &Action, step: CountStep) -> Result<AdjustOutcome, ClientError> {
        let date = self.selected_date().await;
        self.adjust_on(action, date, step).await
    }

    pub async fn adjust_on(
        &self,
        action: &Action,
        date: NaiveDate,
        step: CountStep,
    ) -> Result<AdjustOutcome, ClientError> {
        if !self.state.lock().await.in_flight.insert(action.id) {
            tracing::debug!(action_id = %action.id, "Adjustment already in flight, skipping");
            return Ok(AdjustOutcome::Skipped);
        }

        let applied = match self.apply_optimistic(action, date, step).await {
            Ok(applied) => applied,
            Err(e) => {
                self.state.lock().await.in_flight.remove(&action.id);
                return Err(e);
            }
        };

        let result = self.backend.write_step(action.id, date, step).await;

        let mut state = self.state.lock().await;
        state.in_flight.remove(&action.id);
        match result {
            Ok(response) => {
                state.cache.replace(response.log.clone());
                Ok(AdjustOutcome::Applied(response))
            }
            Err(e) => {
                tracing::error!(action_id = %action.id, %date, "Failed to update count: {}", e);
                // A reloaded day already holds server rows; leave it alone
                if let Some(applied) = applied {
                    if state.cache.stamp(date) == Some(applied.stamp) {
                        state.cache.restore(action.id, date, applied.previous);
                    }
                }
                Err(e)
            }
        }
    }

    /// Write the optimistic row into the loaded day. `None` when the day kept
    /// being invalidated and no row was written.
    async fn apply_optimistic(
        &self,
        action: &Action,
        date: NaiveDate,
        step: CountStep,
    ) -> Result<Option<Optimistic>, ClientError> {
        for _ in 0..LOAD_ATTEMPTS {
            self.load_day(date).await?;

            let mut state = self.state.lock().await;
            // Checked under the same lock as the write below
            let Some(stamp) = state.cache.stamp(date) else {
                continue;
            };
            let previous = state.cache.log_for(action.id, date).cloned();
            state
                .cache
                .upsert(optimistic_row(action, date, step, previous.as_ref()));
            return Ok(Some(Optimistic { previous, stamp }));
        }

        tracing::debug!(action_id = %action.id, %date, "Day kept changing, sending without optimistic update");
        Ok(None)
    }

    /// Drop whatever a change from the live feed made stale.
    pub async fn apply_event(&self, event: &SyncEvent) {
        let mut state = self.state.lock().await;
        match event {
            SyncEvent::DailyLogChanged { date, .. } => state.cache.invalidate(*date),
            SyncEvent::ActionChanged {
                op: ChangeOp::Created,
                ..
            } => {}
            SyncEvent::ActionChanged { .. } | SyncEvent::DataCleared { .. } => state.cache.clear(),
        }
    }
}

fn optimistic_row(
    action: &Action,
    date: NaiveDate,
    step: CountStep,
    previous: Option<&DailyLog>,
) -> DailyLog {
    let now = Utc::now();
    let count = next_count(previous.map(|l| l.count).unwrap_or(0), step);
    match previous {
        Some(log) => DailyLog {
            count,
            points: points_for(action.progress_points, count),
            updated_at: now,
            ..log.clone()
        },
        None => DailyLog {
            // Placeholder until the server row comes back
            id: Uuid::new_v4(),
            user_id: action.user_id,
            action_id: action.id,
            count,
            points: points_for(action.progress_points, count),
            date,
            created_at: now,
            updated_at: now,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::cache::sample_log;
    use crate::models::action::{sample_action, ActionType};
    use crate::services::scoring::{is_complete, milestone};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::sync::Notify;

    const SERVER_ID: Uuid = Uuid::from_u128(42);

    #[derive(Default)]
    struct FakeBackend {
        fail_writes: bool,
        gate: Option<Arc<Notify>>,
        started: Arc<Notify>,
        fetches: AtomicUsize,
        days: StdMutex<HashMap<NaiveDate, Vec<DailyLog>>>,
        progress_points: i32,
    }

    impl FakeBackend {
        fn with_logs(logs: Vec<DailyLog>) -> Self {
            let mut days: HashMap<NaiveDate, Vec<DailyLog>> = HashMap::new();
            for log in logs {
                days.entry(log.date).or_default().push(log);
            }
            Self {
                days: StdMutex::new(days),
                ..Default::default()
            }
        }
    }

    impl LogBackend for FakeBackend {
        async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<DailyLog>, ClientError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.days.lock().unwrap().get(&date).cloned().unwrap_or_default())
        }

        async fn write_step(
            &self,
            action_id: Uuid,
            date: NaiveDate,
            step: CountStep,
        ) -> Result<AdjustCountResponse, ClientError> {
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_writes {
                return Err(ClientError::Api {
                    status: 500,
                    message: "Internal server error".into(),
                });
            }
            let current = self
                .days
                .lock()
                .unwrap()
                .get(&date)
                .and_then(|logs| logs.iter().find(|l| l.action_id == action_id))
                .map(|l| l.count)
                .unwrap_or(0);
            let count = next_count(current, step);
            let mut log = sample_log(action_id, date, count, points_for(self.progress_points, count));
            log.id = SERVER_ID;
            Ok(AdjustCountResponse {
                log,
                milestone: milestone(step, count, 2),
                is_complete: is_complete(count, 2),
            })
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[tokio::test]
    async fn test_load_day_uses_cache() {
        let tracker = DailyTracker::new(FakeBackend::default(), chrono_tz::UTC, 7);
        tracker.load_day(day()).await.unwrap();
        tracker.load_day(day()).await.unwrap();
        assert_eq!(tracker.backend().fetches.load(Ordering::SeqCst), 1);

        tracker.invalidate(day()).await;
        tracker.load_day(day()).await.unwrap();
        assert_eq!(tracker.backend().fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_navigation_is_bounded() {
        let tracker = DailyTracker::new(FakeBackend::default(), chrono_tz::UTC, 2);
        assert!(!tracker.go_forward().await);
        assert!(tracker.go_back().await);
        assert!(tracker.go_back().await);
        assert!(!tracker.go_back().await);
        assert_eq!(tracker.days_back().await, 2);

        tracker.set_days_back(30).await;
        assert_eq!(tracker.days_back().await, 2);
        assert!(tracker.go_forward().await);
        assert_eq!(tracker.days_back().await, 1);
    }

    #[tokio::test]
    async fn test_successful_adjust_keeps_server_row() {
        let action = sample_action(ActionType::Encourage, 3, 2);
        let backend = FakeBackend {
            progress_points: 3,
            ..Default::default()
        };
        let tracker = DailyTracker::new(backend, chrono_tz::UTC, 7);
        tracker.load_day(day()).await.unwrap();

        let outcome = tracker
            .adjust_on(&action, day(), CountStep::Increment)
            .await
            .unwrap();
        let AdjustOutcome::Applied(response) = outcome else {
            panic!("expected applied outcome");
        };
        assert!(!response.is_complete);

        let log = tracker.log_for(action.id, day()).await.unwrap();
        assert_eq!(log.id, SERVER_ID);
        assert_eq!(log.count, 1);
        assert_eq!(tracker.day_score(day()).await, 3);
    }

    #[tokio::test]
    async fn test_failed_adjust_rolls_back() {
        let action = sample_action(ActionType::Encourage, 2, 3);
        let existing = sample_log(action.id, day(), 1, 2);
        let backend = FakeBackend {
            fail_writes: true,
            ..FakeBackend::with_logs(vec![existing.clone()])
        };
        let tracker = DailyTracker::new(backend, chrono_tz::UTC, 7);
        tracker.load_day(day()).await.unwrap();

        let err = tracker
            .adjust_on(&action, day(), CountStep::Increment)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 500, .. }));
        assert_eq!(tracker.log_for(action.id, day()).await, Some(existing));

        // A fresh row is removed again rather than left at zero
        let other = sample_action(ActionType::Avoid, 1, 1);
        let _ = tracker.adjust_on(&other, day(), CountStep::Increment).await;
        assert!(tracker.log_for(other.id, day()).await.is_none());
        assert_eq!(tracker.day_score(day()).await, 2);
    }

    #[tokio::test]
    async fn test_second_adjust_skipped_while_in_flight() {
        let action = sample_action(ActionType::Encourage, 1, 2);
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let backend = FakeBackend {
            gate: Some(gate.clone()),
            started: started.clone(),
            progress_points: 1,
            ..Default::default()
        };
        let tracker = Arc::new(DailyTracker::new(backend, chrono_tz::UTC, 7));

        let first = {
            let tracker = tracker.clone();
            let action = action.clone();
            tokio::spawn(async move { tracker.adjust_on(&action, day(), CountStep::Increment).await })
        };
        started.notified().await;

        // Optimistic count is visible before the write lands
        assert_eq!(tracker.count_for(action.id, day()).await, 1);

        let second = tracker
            .adjust_on(&action, day(), CountStep::Increment)
            .await
            .unwrap();
        assert_eq!(second, AdjustOutcome::Skipped);

        gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, AdjustOutcome::Applied(_)));
        assert_eq!(tracker.count_for(action.id, day()).await, 1);
    }

    #[tokio::test]
    async fn test_change_events_invalidate_cache() {
        let tracker = DailyTracker::new(FakeBackend::default(), chrono_tz::UTC, 7);
        let other_day = day() - chrono::Duration::days(1);
        tracker.load_day(day()).await.unwrap();
        tracker.load_day(other_day).await.unwrap();

        let created = SyncEvent::ActionChanged {
            user_id: Uuid::nil(),
            action_id: Uuid::new_v4(),
            op: ChangeOp::Created,
        };
        tracker.apply_event(&created).await;
        tracker.load_day(day()).await.unwrap();
        assert_eq!(tracker.backend().fetches.load(Ordering::SeqCst), 2);

        let changed = SyncEvent::DailyLogChanged {
            user_id: Uuid::nil(),
            action_id: Uuid::new_v4(),
            date: day(),
        };
        tracker.apply_event(&changed).await;
        tracker.load_day(day()).await.unwrap();
        tracker.load_day(other_day).await.unwrap();
        assert_eq!(tracker.backend().fetches.load(Ordering::SeqCst), 3);

        tracker.apply_event(&SyncEvent::DataCleared { user_id: Uuid::nil() }).await;
        tracker.load_day(other_day).await.unwrap();
        assert_eq!(tracker.backend().fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_adjust_after_invalidation_refetches_whole_day() {
        let action = sample_action(ActionType::Encourage, 1, 3);
        let other = sample_action(ActionType::Encourage, 2, 3);
        let backend = FakeBackend {
            progress_points: 1,
            ..FakeBackend::with_logs(vec![sample_log(other.id, day(), 2, 4)])
        };
        let tracker = DailyTracker::new(backend, chrono_tz::UTC, 7);
        tracker.load_day(day()).await.unwrap();

        tracker
            .apply_event(&SyncEvent::DailyLogChanged {
                user_id: Uuid::nil(),
                action_id: other.id,
                date: day(),
            })
            .await;
        tracker
            .adjust_on(&action, day(), CountStep::Increment)
            .await
            .unwrap();

        assert_eq!(tracker.backend().fetches.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.count_for(other.id, day()).await, 2);
        assert_eq!(tracker.count_for(action.id, day()).await, 1);
        assert_eq!(tracker.day_score(day()).await, 5);
    }

    #[tokio::test]
    async fn test_failed_adjust_keeps_day_reloaded_mid_write() {
        let action = sample_action(ActionType::Encourage, 2, 5);
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let backend = FakeBackend {
            fail_writes: true,
            gate: Some(gate.clone()),
            started: started.clone(),
            ..FakeBackend::with_logs(vec![sample_log(action.id, day(), 1, 2)])
        };
        let tracker = Arc::new(DailyTracker::new(backend, chrono_tz::UTC, 7));
        tracker.load_day(day()).await.unwrap();

        let write = {
            let tracker = tracker.clone();
            let action = action.clone();
            tokio::spawn(async move { tracker.adjust_on(&action, day(), CountStep::Increment).await })
        };
        started.notified().await;
        assert_eq!(tracker.count_for(action.id, day()).await, 2);

        // Another device moved the count while our write was pending
        tracker
            .backend()
            .days
            .lock()
            .unwrap()
            .insert(day(), vec![sample_log(action.id, day(), 4, 8)]);
        tracker.invalidate(day()).await;
        tracker.load_day(day()).await.unwrap();

        gate.notify_one();
        assert!(write.await.unwrap().is_err());
        assert_eq!(tracker.count_for(action.id, day()).await, 4);
        assert_eq!(tracker.day_score(day()).await, 8);
    }

    #[test]
    fn test_decrement_optimistic_row_never_negative() {
        let action = sample_action(ActionType::Avoid, 4, 1);
        let row = optimistic_row(&action, day(), CountStep::Decrement, None);
        assert_eq!(row.count, 0);
        assert_eq!(row.points, 0);
        assert_eq!(row.action_id, action.id);
    }
}
