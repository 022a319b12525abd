//! Analytics aggregator
//!
//! Read-only metrics over session history. The metric functions are pure;
//! [`AnalyticsAggregator`] only fetches their inputs from the store.

use cadence_api::{AnalyticsSummary, Checkin, Goal, Rating, Session, SessionStatus};
use cadence_store::Store;
use cadence_util::{days_between, AthleteId};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::debug;

use crate::CoreResult;

/// Default rolling consistency window
pub const DEFAULT_CONSISTENCY_WINDOW_DAYS: u32 = 28;

/// Default goal completion window
pub const DEFAULT_GOAL_WINDOW_DAYS: u32 = 7;

/// Consecutive days with a completed session, anchored to today or yesterday.
///
/// `dates` must be sorted newest first; repeated dates count once. Dates after
/// `today` are ignored.
pub fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut days = dates.iter().copied().filter(|d| *d <= today);

    let Some(mut previous) = days.next() else {
        return 0;
    };
    if days_between(previous, today) > 1 {
        return 0;
    }

    let mut streak = 1;
    for date in days {
        match days_between(date, previous) {
            0 => continue,
            1 => {
                streak += 1;
                previous = date;
            }
            _ => break,
        }
    }
    streak
}

/// Longest run of consecutive completed days anywhere in the history.
/// `dates` may be in any order.
pub fn longest_streak(dates: &[NaiveDate]) -> u32 {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for date in sorted {
        run = match previous {
            Some(p) if days_between(p, date) == 1 => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }
    longest
}

/// Rounded `part / whole` percentage; an empty whole yields 0.
pub fn percentage(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

/// Completed sessions over all sessions (any status), rounded percent
pub fn consistency_percent(sessions: &[Session]) -> u32 {
    let completed = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .count();
    percentage(completed, sessions.len())
}

/// Achieved goals over all goals, rounded percent. Unassessed goals count
/// in the denominator.
pub fn goal_completion_percent(goals: &[Goal]) -> u32 {
    let achieved = goals.iter().filter(|g| g.achieved == Some(true)).count();
    percentage(achieved, goals.len())
}

fn average(ratings: impl Iterator<Item = Rating>) -> Option<f64> {
    let (sum, count) = ratings.fold((0u32, 0u32), |(sum, count), r| {
        (sum + r.value() as u32, count + 1)
    });
    (count > 0).then(|| sum as f64 / count as f64)
}

/// Mean energy and mindset over a set of check-ins
pub fn average_ratings(checkins: &[Checkin]) -> (Option<f64>, Option<f64>) {
    (
        average(checkins.iter().map(|c| c.energy_level)),
        average(checkins.iter().map(|c| c.mindset_level)),
    )
}

/// First day of a window of `days` calendar days ending on `today`
fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today - Duration::days(days.saturating_sub(1) as i64)
}

/// Builds [`AnalyticsSummary`] views from the store
pub struct AnalyticsAggregator {
    store: Arc<dyn Store>,
    consistency_window_days: u32,
    goal_window_days: u32,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            consistency_window_days: DEFAULT_CONSISTENCY_WINDOW_DAYS,
            goal_window_days: DEFAULT_GOAL_WINDOW_DAYS,
        }
    }

    pub fn with_windows(mut self, consistency_days: u32, goal_days: u32) -> Self {
        self.consistency_window_days = consistency_days.max(1);
        self.goal_window_days = goal_days.max(1);
        self
    }

    pub fn current_streak(&self, athlete_id: &AthleteId, today: NaiveDate) -> CoreResult<u32> {
        let dates = self.store.completed_dates(athlete_id, today)?;
        Ok(current_streak(&dates, today))
    }

    /// Consistency over the window ending today, inclusive
    pub fn consistency(&self, athlete_id: &AthleteId, today: NaiveDate) -> CoreResult<u32> {
        let from = window_start(today, self.consistency_window_days);
        let sessions = self.store.list_sessions(athlete_id, from, today)?;
        Ok(consistency_percent(&sessions))
    }

    pub fn goal_completion(&self, athlete_id: &AthleteId, today: NaiveDate) -> CoreResult<u32> {
        let from = window_start(today, self.goal_window_days);
        let goals = self.store.list_goals_of_completed(athlete_id, from, today)?;
        Ok(goal_completion_percent(&goals))
    }

    pub fn summary(&self, athlete_id: &AthleteId, today: NaiveDate) -> CoreResult<AnalyticsSummary> {
        let dates = self.store.completed_dates(athlete_id, today)?;

        let consistency_from = window_start(today, self.consistency_window_days);
        let sessions = self.store.list_sessions(athlete_id, consistency_from, today)?;
        let checkins = self.store.list_checkins(athlete_id, consistency_from, today)?;

        let goal_from = window_start(today, self.goal_window_days);
        let goals = self.store.list_goals_of_completed(athlete_id, goal_from, today)?;

        let (average_energy, average_mindset) = average_ratings(&checkins);
        let summary = AnalyticsSummary {
            as_of: today,
            current_streak: current_streak(&dates, today),
            longest_streak: longest_streak(&dates),
            consistency_window_days: self.consistency_window_days,
            consistency_percent: consistency_percent(&sessions),
            goal_window_days: self.goal_window_days,
            goal_completion_percent: goal_completion_percent(&goals),
            average_energy,
            average_mindset,
        };

        debug!(
            athlete_id = %athlete_id,
            streak = summary.current_streak,
            consistency = summary.consistency_percent,
            goals = summary.goal_completion_percent,
            "Analytics summary computed"
        );
        Ok(summary)
    }
}
