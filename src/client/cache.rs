use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::daily_log::DailyLog;
use crate::services::scoring::day_score;

#[derive(Debug, Clone)]
struct Day {
    stamp: u64,
    logs: Vec<DailyLog>,
}

/// Daily logs keyed by calendar day. A day is "loaded" once its logs have been
/// fetched, even if it had none. Row writes only land in loaded days.
#[derive(Debug, Default, Clone)]
pub struct LogsCache {
    days: HashMap<NaiveDate, Day>,
    loads: u64,
}

impl LogsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    pub fn insert_day(&mut self, date: NaiveDate, logs: Vec<DailyLog>) {
        self.loads += 1;
        self.days.insert(
            date,
            Day {
                stamp: self.loads,
                logs,
            },
        );
    }

    /// Identifies one particular load of `date`; changes whenever the day is
    /// re-fetched or dropped.
    pub fn stamp(&self, date: NaiveDate) -> Option<u64> {
        self.days.get(&date).map(|d| d.stamp)
    }

    pub fn logs_for(&self, date: NaiveDate) -> &[DailyLog] {
        self.days.get(&date).map(|d| d.logs.as_slice()).unwrap_or(&[])
    }

    pub fn log_for(&self, action_id: Uuid, date: NaiveDate) -> Option<&DailyLog> {
        self.logs_for(date).iter().find(|l| l.action_id == action_id)
    }

    pub fn count_for(&self, action_id: Uuid, date: NaiveDate) -> i32 {
        self.log_for(action_id, date).map(|l| l.count).unwrap_or(0)
    }

    pub fn day_score(&self, date: NaiveDate) -> i64 {
        day_score(self.logs_for(date))
    }

    /// Insert or overwrite the row for the log's (action, date). Returns the
    /// row it replaced. Ignored when the day is not loaded.
    pub fn upsert(&mut self, log: DailyLog) -> Option<DailyLog> {
        let logs = &mut self.days.get_mut(&log.date)?.logs;
        match logs.iter_mut().find(|l| l.action_id == log.action_id) {
            Some(existing) => Some(std::mem::replace(existing, log)),
            None => {
                logs.push(log);
                None
            }
        }
    }

    /// Swap in a server row for whatever is cached for its (action, date).
    pub fn replace(&mut self, log: DailyLog) {
        self.upsert(log);
    }

    /// Drop the cached row for (action, date), leaving the day loaded.
    pub fn remove(&mut self, action_id: Uuid, date: NaiveDate) -> Option<DailyLog> {
        let logs = &mut self.days.get_mut(&date)?.logs;
        let idx = logs.iter().position(|l| l.action_id == action_id)?;
        Some(logs.remove(idx))
    }

    /// Put back a previous row, or remove the slot if there was none.
    pub fn restore(&mut self, action_id: Uuid, date: NaiveDate, previous: Option<DailyLog>) {
        match previous {
            Some(log) => {
                self.upsert(log);
            }
            None => {
                self.remove(action_id, date);
            }
        }
    }

    /// Forget a day so the next load re-fetches it.
    pub fn invalidate(&mut self, date: NaiveDate) {
        self.days.remove(&date);
    }

    pub fn clear(&mut self) {
        self.days.clear();
    }
}

#[cfg(test)]
pub(crate) fn sample_log(action_id: Uuid, date: NaiveDate, count: i32, points: i32) -> DailyLog {
    let now = chrono::Utc::now();
    DailyLog {
        id: Uuid::new_v4(),
        user_id: Uuid::nil(),
        action_id,
        count,
        points,
        date,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_empty_day_counts_as_loaded() {
        let mut cache = LogsCache::new();
        assert!(!cache.is_loaded(day(1)));
        cache.insert_day(day(1), vec![]);
        assert!(cache.is_loaded(day(1)));
        assert_eq!(cache.day_score(day(1)), 0);
    }

    #[test]
    fn test_count_and_score_per_day() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut cache = LogsCache::new();
        cache.insert_day(day(1), vec![sample_log(a, day(1), 2, 6), sample_log(b, day(1), 1, 1)]);
        cache.insert_day(day(2), vec![sample_log(a, day(2), 5, 15)]);

        assert_eq!(cache.count_for(a, day(1)), 2);
        assert_eq!(cache.count_for(a, day(2)), 5);
        assert_eq!(cache.count_for(b, day(2)), 0);
        assert_eq!(cache.day_score(day(1)), 7);
        assert_eq!(cache.day_score(day(3)), 0);
    }

    #[test]
    fn test_upsert_keeps_one_row_per_action() {
        let a = Uuid::new_v4();
        let mut cache = LogsCache::new();
        cache.insert_day(day(1), vec![]);
        assert!(cache.upsert(sample_log(a, day(1), 1, 2)).is_none());
        let previous = cache.upsert(sample_log(a, day(1), 2, 4)).unwrap();
        assert_eq!(previous.count, 1);
        assert_eq!(cache.logs_for(day(1)).len(), 1);
        assert_eq!(cache.count_for(a, day(1)), 2);
    }

    #[test]
    fn test_restore_without_previous_removes_row() {
        let a = Uuid::new_v4();
        let mut cache = LogsCache::new();
        cache.insert_day(day(1), vec![]);
        cache.upsert(sample_log(a, day(1), 1, 1));
        cache.restore(a, day(1), None);
        assert!(cache.is_loaded(day(1)));
        assert!(cache.logs_for(day(1)).is_empty());
    }

    #[test]
    fn test_upsert_never_marks_a_day_loaded() {
        let a = Uuid::new_v4();
        let mut cache = LogsCache::new();
        assert!(cache.upsert(sample_log(a, day(1), 1, 2)).is_none());
        assert!(!cache.is_loaded(day(1)));
        assert_eq!(cache.count_for(a, day(1)), 0);
    }

    #[test]
    fn test_stamp_changes_on_reload() {
        let mut cache = LogsCache::new();
        assert_eq!(cache.stamp(day(1)), None);
        cache.insert_day(day(1), vec![]);
        let first = cache.stamp(day(1));
        cache.insert_day(day(2), vec![]);
        assert_eq!(cache.stamp(day(1)), first);
        cache.invalidate(day(1));
        cache.insert_day(day(1), vec![]);
        assert_ne!(cache.stamp(day(1)), first);
    }

    #[test]
    fn test_invalidate_forgets_day() {
        let a = Uuid::new_v4();
        let mut cache = LogsCache::new();
        cache.insert_day(day(1), vec![sample_log(a, day(1), 1, 1)]);
        cache.invalidate(day(1));
        assert!(!cache.is_loaded(day(1)));
        assert_eq!(cache.count_for(a, day(1)), 0);
    }
}
