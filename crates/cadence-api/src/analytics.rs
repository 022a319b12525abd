//! Longitudinal analytics views

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Dashboard metrics for one athlete as of `as_of`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub as_of: NaiveDate,
    /// Consecutive days with a completed session, anchored to today or yesterday
    pub current_streak: u32,
    pub longest_streak: u32,
    pub consistency_window_days: u32,
    /// Completed / scheduled over the consistency window, rounded percent
    pub consistency_percent: u32,
    pub goal_window_days: u32,
    /// Achieved / total goals of completed sessions in the goal window, rounded percent
    pub goal_completion_percent: u32,
    pub average_energy: Option<f64>,
    pub average_mindset: Option<f64>,
}
