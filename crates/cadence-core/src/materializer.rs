//! Expansion of weekly templates into dated sessions

use cadence_api::{InvalidValue, ScheduleTemplate, Session};
use cadence_store::{SessionRepository, StoreResult};
use cadence_util::dates_inclusive;
use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

/// Expand `templates` into one `scheduled` candidate per matching weekday in
/// `[start, end]` inclusive. Pure; ids are fresh on every call, so callers
/// rely on the slot uniqueness of the store, not on ids, for idempotency.
pub fn materialize(templates: &[ScheduleTemplate], start: NaiveDate, end: NaiveDate) -> Vec<Session> {
    let mut sessions = Vec::new();
    for date in dates_inclusive(start, end) {
        for template in templates.iter().filter(|t| t.day_of_week.matches(date)) {
            sessions.push(Session::scheduled_from(template, date));
        }
    }
    sessions
}

/// Conditionally insert candidates. Colliding slots are skipped; any other
/// failure aborts the whole batch.
pub fn persist<R>(store: &R, sessions: &[Session]) -> StoreResult<usize>
where
    R: SessionRepository + ?Sized,
{
    if sessions.is_empty() {
        return Ok(0);
    }
    let inserted = store.insert_sessions_if_absent(sessions)?;
    debug!(
        candidates = sessions.len(),
        inserted,
        skipped = sessions.len() - inserted,
        "Materialized sessions persisted"
    );
    Ok(inserted)
}

/// Materialize `[today, today + horizon_days]` for the given templates.
///
/// A horizon running past the calendar is an error, nothing is inserted.
pub fn extend_horizon<R>(
    store: &R,
    templates: &[ScheduleTemplate],
    today: NaiveDate,
    horizon_days: u32,
) -> StoreResult<usize>
where
    R: SessionRepository + ?Sized,
{
    let end = today
        .checked_add_signed(Duration::days(horizon_days.into()))
        .ok_or_else(|| InvalidValue::new("horizon_days", horizon_days.to_string()))?;
    let candidates = materialize(templates, today, end);
    let inserted = persist(store, &candidates)?;
    info!(
        from = %today,
        to = %end,
        templates = templates.len(),
        inserted,
        "Horizon extended"
    );
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_api::{SessionKind, SessionStatus};
    use cadence_store::{SqliteStore, StoreError};
    use cadence_util::{AthleteId, DayOfWeek, WallClock};
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(athlete: &str, day: DayOfWeek, start: (u8, u8), end: (u8, u8)) -> ScheduleTemplate {
        ScheduleTemplate::new(
            AthleteId::new(athlete),
            day,
            WallClock::new(start.0, start.1).unwrap(),
            WallClock::new(end.0, end.1).unwrap(),
            SessionKind::Practice,
        )
    }

    #[test]
    fn test_expands_matching_weekdays_inclusive() {
        // 2024-01-08 is a Monday
        let templates = vec![
            template("a1", DayOfWeek::MONDAY, (15, 0), (17, 0)),
            template("a1", DayOfWeek::WEDNESDAY, (6, 0), (7, 0)),
        ];
        let sessions = materialize(&templates, date(2024, 1, 8), date(2024, 1, 15));

        let dates: Vec<_> = sessions.iter().map(|s| s.scheduled_date).collect();
        assert_eq!(dates, vec![date(2024, 1, 8), date(2024, 1, 10), date(2024, 1, 15)]);
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Scheduled));
        assert!(sessions.iter().all(|s| s.absence_reason.is_none()));
    }

    #[test]
    fn test_empty_range_and_no_templates() {
        let templates = vec![template("a1", DayOfWeek::MONDAY, (15, 0), (17, 0))];
        assert!(materialize(&templates, date(2024, 1, 9), date(2024, 1, 8)).is_empty());
        assert!(materialize(&[], date(2024, 1, 1), date(2024, 1, 31)).is_empty());
    }

    #[test]
    fn test_two_templates_same_day_yield_two_sessions() {
        let templates = vec![
            template("a1", DayOfWeek::MONDAY, (6, 0), (7, 0)),
            template("a1", DayOfWeek::MONDAY, (15, 0), (17, 0)),
        ];
        let sessions = materialize(&templates, date(2024, 1, 8), date(2024, 1, 8));
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_horizon_past_calendar_is_an_error() {
        let store = SqliteStore::in_memory().unwrap();
        let templates = vec![template("a1", DayOfWeek::MONDAY, (15, 0), (17, 0))];

        let result = extend_horizon(&store, &templates, NaiveDate::MAX - Duration::days(3), 7);
        assert!(matches!(result, Err(StoreError::InvalidValue(_))));
        assert!(extend_horizon(&store, &templates, date(2024, 1, 8), u32::MAX).is_err());
        assert!(store
            .list_sessions(&AthleteId::new("a1"), date(2024, 1, 1), date(2024, 12, 31))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_repeated_materialization_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let athlete = AthleteId::new("a1");
        let templates = vec![
            template("a1", DayOfWeek::MONDAY, (15, 0), (17, 0)),
            template("a1", DayOfWeek::THURSDAY, (18, 0), (19, 30)),
            template("a1", DayOfWeek::SATURDAY, (23, 0), (1, 0)),
        ];
        let today = date(2024, 1, 8);

        let first = extend_horizon(&store, &templates, today, 7).unwrap();
        let after_first: HashSet<_> = store
            .list_sessions(&athlete, today, date(2024, 1, 31))
            .unwrap()
            .into_iter()
            .map(|s| s.slot())
            .collect();

        let second = extend_horizon(&store, &templates, today, 7).unwrap();
        let after_second: Vec<_> = store
            .list_sessions(&athlete, today, date(2024, 1, 31))
            .unwrap()
            .into_iter()
            .map(|s| s.slot())
            .collect();

        assert_eq!(first, 4); // Mon 8, Thu 11, Sat 13, Mon 15
        assert_eq!(second, 0);
        assert_eq!(after_second.len(), after_first.len());
        assert_eq!(after_second.into_iter().collect::<HashSet<_>>(), after_first);
        assert!(store.find_duplicate_slots().unwrap().is_empty());
    }

    #[test]
    fn test_overlapping_horizon_only_adds_new_dates() {
        let store = SqliteStore::in_memory().unwrap();
        let templates = vec![template("a1", DayOfWeek::MONDAY, (15, 0), (17, 0))];

        assert_eq!(extend_horizon(&store, &templates, date(2024, 1, 8), 7).unwrap(), 2);
        // A day later the horizon reaches Tuesday 16th; only Monday 15th overlaps
        assert_eq!(extend_horizon(&store, &templates, date(2024, 1, 9), 7).unwrap(), 0);
        assert_eq!(extend_horizon(&store, &templates, date(2024, 1, 15), 7).unwrap(), 1);
    }

    #[test]
    fn test_persist_empty_batch() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(persist(&store, &[]).unwrap(), 0);
    }
}
