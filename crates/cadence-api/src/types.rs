//! Domain records shared between the store, the engine and callers

use cadence_util::{AthleteId, DayOfWeek, SessionId, SessionWindow, TemplateId, WallClock};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stored value that does not belong to its closed set of legal values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {value}")]
pub struct InvalidValue {
    pub field: &'static str,
    pub value: String,
}

impl InvalidValue {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// Kind of training a template or session represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Practice,
    Lesson,
    Game,
    Conditioning,
    Recovery,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Practice => "practice",
            SessionKind::Lesson => "lesson",
            SessionKind::Game => "game",
            SessionKind::Conditioning => "conditioning",
            SessionKind::Recovery => "recovery",
        }
    }
}

impl FromStr for SessionKind {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "practice" => Ok(SessionKind::Practice),
            "lesson" => Ok(SessionKind::Lesson),
            "game" => Ok(SessionKind::Game),
            "conditioning" => Ok(SessionKind::Conditioning),
            "recovery" => Ok(SessionKind::Recovery),
            other => Err(InvalidValue::new("session kind", other)),
        }
    }
}

/// Persisted session status; the authoritative terminal/non-terminal marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Absent,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Absent => "absent",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Scheduled | SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "absent" => Ok(SessionStatus::Absent),
            other => Err(InvalidValue::new("session status", other)),
        }
    }
}

/// Weekly recurring availability rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTemplate {
    pub id: TemplateId,
    pub athlete_id: AthleteId,
    pub day_of_week: DayOfWeek,
    pub start_time: WallClock,
    pub end_time: WallClock,
    pub kind: SessionKind,
}

impl ScheduleTemplate {
    pub fn new(
        athlete_id: AthleteId,
        day_of_week: DayOfWeek,
        start_time: WallClock,
        end_time: WallClock,
        kind: SessionKind,
    ) -> Self {
        Self {
            id: TemplateId::new(),
            athlete_id,
            day_of_week,
            start_time,
            end_time,
            kind,
        }
    }
}

/// Uniqueness tuple: at most one session exists per slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionSlot {
    pub athlete_id: AthleteId,
    pub scheduled_date: NaiveDate,
    pub start_time: WallClock,
    pub end_time: WallClock,
}

/// One concrete, dated occurrence of training
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub athlete_id: AthleteId,
    pub scheduled_date: NaiveDate,
    pub start_time: WallClock,
    pub end_time: WallClock,
    pub kind: SessionKind,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absence_reason: Option<String>,
}

impl Session {
    /// A freshly materialized session for `template` on `date`
    pub fn scheduled_from(template: &ScheduleTemplate, date: NaiveDate) -> Self {
        Self {
            id: SessionId::new(),
            athlete_id: template.athlete_id.clone(),
            scheduled_date: date,
            start_time: template.start_time,
            end_time: template.end_time,
            kind: template.kind,
            status: SessionStatus::Scheduled,
            absence_reason: None,
        }
    }

    pub fn window(&self) -> SessionWindow {
        SessionWindow::resolve(self.scheduled_date, self.start_time, self.end_time)
    }

    pub fn slot(&self) -> SessionSlot {
        SessionSlot {
            athlete_id: self.athlete_id.clone(),
            scheduled_date: self.scheduled_date,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// A 1 to 5 self-assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value).ok_or_else(|| InvalidValue::new("rating", value.to_string()))
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

/// Pre-session readiness report, at most one per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkin {
    pub session_id: SessionId,
    pub energy_level: Rating,
    pub mindset_level: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_criteria: Option<String>,
    pub submitted_at: NaiveDateTime,
}

/// Session goal; `achieved == None` means not yet assessed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub session_id: SessionId,
    pub text: String,
    pub achieved: Option<bool>,
}

/// Free-form note attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNote {
    pub id: i64,
    pub session_id: SessionId,
    pub body: String,
    pub created_at: NaiveDateTime,
}

/// Post-session reflection, written once at completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub session_id: SessionId,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_rating: Option<Rating>,
    pub created_at: NaiveDateTime,
}

/// Exactly five labels, one per rating value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingScale(pub [String; 5]);

impl RatingScale {
    pub fn label(&self, rating: Rating) -> &str {
        &self.0[(rating.value() - Rating::MIN) as usize]
    }

    /// Every label must carry visible text
    pub fn validate(&self) -> Result<(), InvalidValue> {
        match self.0.iter().position(|l| l.trim().is_empty()) {
            Some(idx) => Err(InvalidValue::new(
                "rating label",
                format!("label {} is empty", idx + 1),
            )),
            None => Ok(()),
        }
    }
}

/// Per-athlete display labels for check-in ratings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingLabels {
    pub energy: RatingScale,
    pub mindset: RatingScale,
}

impl RatingLabels {
    pub fn validate(&self) -> Result<(), InvalidValue> {
        self.energy.validate()?;
        self.mindset.validate()
    }
}

impl Default for RatingLabels {
    fn default() -> Self {
        Self {
            energy: RatingScale(
                ["Exhausted", "Tired", "Okay", "Good", "Energised"].map(String::from),
            ),
            mindset: RatingScale(
                ["Distracted", "Unsettled", "Neutral", "Focused", "Locked in"].map(String::from),
            ),
        }
    }
}
