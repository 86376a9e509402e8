//! Calendar-day bucketing in the user's timezone.
//!
//! A count belongs to the calendar day on which it was logged *in the user's
//! timezone*, not in UTC. All helpers take the current instant explicitly so
//! callers can pin it in tests.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// Timezones offered in profile settings, as (IANA name, label).
pub const COMMON_TIMEZONES: &[(&str, &str)] = &[
    ("America/Anchorage", "Alaska Time (Anchorage)"),
    ("America/Los_Angeles", "Pacific Time (Los Angeles)"),
    ("America/Denver", "Mountain Time (Denver)"),
    ("America/Chicago", "Central Time (Chicago)"),
    ("America/New_York", "Eastern Time (New York)"),
    ("America/Toronto", "Eastern Time (Toronto)"),
    ("America/Vancouver", "Pacific Time (Vancouver)"),
    ("America/Mexico_City", "Central Time (Mexico City)"),
    ("America/Sao_Paulo", "Brasília Time (São Paulo)"),
    ("America/Argentina/Buenos_Aires", "Argentina Time (Buenos Aires)"),
    ("Europe/London", "London (GMT/BST)"),
    ("Europe/Dublin", "Dublin (GMT/IST)"),
    ("Europe/Paris", "Paris (CET/CEST)"),
    ("Europe/Berlin", "Berlin (CET/CEST)"),
    ("Europe/Madrid", "Madrid (CET/CEST)"),
    ("Europe/Amsterdam", "Amsterdam (CET/CEST)"),
    ("Europe/Stockholm", "Stockholm (CET/CEST)"),
    ("Europe/Warsaw", "Warsaw (CET/CEST)"),
    ("Europe/Athens", "Athens (EET/EEST)"),
    ("Europe/Helsinki", "Helsinki (EET/EEST)"),
    ("Europe/Moscow", "Moscow (MSK)"),
    ("Europe/Istanbul", "Istanbul (TRT)"),
    ("Asia/Dubai", "Dubai (GST)"),
    ("Asia/Karachi", "Karachi (PKT)"),
    ("Asia/Kolkata", "Mumbai/Delhi (IST)"),
    ("Asia/Dhaka", "Dhaka (BST)"),
    ("Asia/Bangkok", "Bangkok (ICT)"),
    ("Asia/Jakarta", "Jakarta (WIB)"),
    ("Asia/Manila", "Manila (PHT)"),
    ("Asia/Shanghai", "Shanghai (CST)"),
    ("Asia/Hong_Kong", "Hong Kong (HKT)"),
    ("Asia/Singapore", "Singapore (SGT)"),
    ("Asia/Seoul", "Seoul (KST)"),
    ("Asia/Tokyo", "Tokyo (JST)"),
    ("Australia/Perth", "Perth (AWST)"),
    ("Australia/Sydney", "Sydney (AEST/AEDT)"),
    ("Pacific/Auckland", "Auckland (NZST/NZDT)"),
    ("Pacific/Honolulu", "Hawaii Time (Honolulu)"),
    ("Africa/Cairo", "Cairo (EET)"),
    ("Africa/Johannesburg", "Johannesburg (SAST)"),
    ("Africa/Lagos", "Lagos (WAT)"),
    ("Africa/Nairobi", "Nairobi (EAT)"),
    ("Africa/Casablanca", "Casablanca (WET)"),
    ("UTC", "Coordinated Universal Time"),
];

pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| AppError::Validation(format!("Unknown timezone: {}", name)))
}

/// Timezone for a stored profile value, or `fallback` when the stored name no
/// longer parses.
pub fn timezone_or_default(name: &str, fallback: Tz) -> Tz {
    name.parse::<Tz>().unwrap_or(fallback)
}

pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// `offset` days before today in `tz` (0 = today, 1 = yesterday).
pub fn date_in(offset: i64, tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    let today = today_in(tz, now);
    today
        .checked_sub_signed(Duration::days(offset))
        .unwrap_or(NaiveDate::MIN)
}

/// `days` calendar days before `date`. Dates come from clients, so running
/// off the start of the calendar is a validation error.
pub fn days_before(date: NaiveDate, days: i64) -> AppResult<NaiveDate> {
    date.checked_sub_signed(Duration::days(days))
        .ok_or_else(|| AppError::Validation(format!("Date out of range: {}", date)))
}

pub fn yesterday_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    date_in(1, tz, now)
}

/// The last `n` calendar days ending today, oldest first.
pub fn last_n_days(n: u32, tz: Tz, now: DateTime<Utc>) -> Vec<NaiveDate> {
    days_ending(today_in(tz, now), n)
}

/// `n` consecutive days ending at `end`, oldest first. Stops at the first
/// representable date.
pub fn days_ending(end: NaiveDate, n: u32) -> Vec<NaiveDate> {
    (0..n as i64)
        .rev()
        .filter_map(|offset| end.checked_sub_signed(Duration::days(offset)))
        .collect()
}

pub fn weekday_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        return "Today".to_string();
    }
    short_weekday(date.weekday()).to_string()
}

fn short_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

pub fn parse_date(s: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date (expected YYYY-MM-DD): {}", s)))
}

/// Reject dates in the future or further back than `window_days`.
pub fn ensure_within_window(date: NaiveDate, today: NaiveDate, window_days: i64) -> AppResult<()> {
    if date > today {
        return Err(AppError::Validation("Cannot log counts for a future date".into()));
    }
    if (today - date).num_days() > window_days {
        return Err(AppError::Validation(format!(
            "Counts can only be logged for the last {} days",
            window_days
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_same_instant_lands_on_different_days() {
        // 2025-03-10 05:30 UTC is still the 9th on the US west coast.
        let now = instant(2025, 3, 10, 5, 30);
        let la = parse_timezone("America/Los_Angeles").unwrap();
        let tokyo = parse_timezone("Asia/Tokyo").unwrap();
        assert_eq!(today_in(la, now), ymd(2025, 3, 9));
        assert_eq!(today_in(tokyo, now), ymd(2025, 3, 10));
        assert_eq!(today_in(Tz::UTC, now), ymd(2025, 3, 10));
    }

    #[test]
    fn test_offsets_cross_month_boundary() {
        let now = instant(2025, 3, 1, 20, 0);
        assert_eq!(date_in(0, Tz::UTC, now), ymd(2025, 3, 1));
        assert_eq!(yesterday_in(Tz::UTC, now), ymd(2025, 2, 28));
        assert_eq!(date_in(7, Tz::UTC, now), ymd(2025, 2, 22));
    }

    #[test]
    fn test_last_n_days_is_oldest_first_and_ends_today() {
        let now = instant(2025, 1, 3, 12, 0);
        let days = last_n_days(7, Tz::UTC, now);
        assert_eq!(days.len(), 7);
        assert_eq!(days.first(), Some(&ymd(2024, 12, 28)));
        assert_eq!(days.last(), Some(&ymd(2025, 1, 3)));
        for pair in days.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
    }

    #[test]
    fn test_last_zero_days_is_empty() {
        assert!(last_n_days(0, Tz::UTC, Utc::now()).is_empty());
    }

    #[test]
    fn test_weekday_label() {
        let today = ymd(2025, 3, 12); // Wednesday
        assert_eq!(weekday_label(today, today), "Today");
        assert_eq!(weekday_label(ymd(2025, 3, 10), today), "Mon");
        assert_eq!(weekday_label(ymd(2025, 3, 9), today), "Sun");
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
        assert_eq!(timezone_or_default("nope", Tz::Europe__Paris), Tz::Europe__Paris);
        assert_eq!(timezone_or_default("Asia/Tokyo", Tz::UTC), Tz::Asia__Tokyo);
    }

    #[test]
    fn test_subtraction_at_calendar_start_does_not_panic() {
        assert!(days_before(NaiveDate::MIN, 1).is_err());
        assert_eq!(days_before(ymd(2025, 3, 1), 1).unwrap(), ymd(2025, 2, 28));
        assert_eq!(days_ending(NaiveDate::MIN, 7), vec![NaiveDate::MIN]);
    }

    #[test]
    fn test_common_timezones_all_parse() {
        for (name, _) in COMMON_TIMEZONES {
            assert!(parse_timezone(name).is_ok(), "{} should parse", name);
        }
        assert!(parse_timezone(DEFAULT_TIMEZONE).is_ok());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-02-28").unwrap(), ymd(2025, 2, 28));
        assert!(parse_date("2025-02-30").is_err());
        assert!(parse_date("02/28/2025").is_err());
    }

    #[test]
    fn test_log_window() {
        let today = ymd(2025, 3, 12);
        assert!(ensure_within_window(today, today, 7).is_ok());
        assert!(ensure_within_window(ymd(2025, 3, 5), today, 7).is_ok());
        assert!(ensure_within_window(ymd(2025, 3, 4), today, 7).is_err());
        assert!(ensure_within_window(ymd(2025, 3, 13), today, 7).is_err());
    }
}
