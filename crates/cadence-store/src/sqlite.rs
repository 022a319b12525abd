//! SQLite-based store implementation

use cadence_api::{
    Checkin, Goal, Rating, RatingLabels, Reflection, ScheduleTemplate, Session, SessionNote,
    SessionSlot, SessionStatus,
};
use cadence_util::{AthleteId, DayOfWeek, SessionId, TemplateId, WallClock};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    AuditEvent, Completion, CompletionOutcome, ScheduleRepository, SessionRepository, Store,
    StoreError, StoreResult, TemplateRemoval,
};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SESSION_COLUMNS: &str =
    "id, athlete_id, scheduled_date, start_time, end_time, kind, status, absence_reason";

/// Resolved end of a session as `YYYY-MM-DD HH:MM:SS` text; sessions whose
/// end clock time is not after their start end on the next day.
const SESSION_END_SQL: &str = "(CASE WHEN end_time <= start_time \
     THEN date(scheduled_date, '+1 day') ELSE scheduled_date END) || ' ' || end_time || ':00'";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Weekly templates
            CREATE TABLE IF NOT EXISTS schedule_templates (
                id TEXT PRIMARY KEY,
                athlete_id TEXT NOT NULL,
                day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                kind TEXT NOT NULL
            );

            -- Dated sessions; one per slot
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                athlete_id TEXT NOT NULL,
                scheduled_date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                absence_reason TEXT,
                UNIQUE (athlete_id, scheduled_date, start_time, end_time)
            );

            CREATE TABLE IF NOT EXISTS checkins (
                session_id TEXT PRIMARY KEY REFERENCES sessions(id) ON DELETE CASCADE,
                energy_level INTEGER NOT NULL CHECK (energy_level BETWEEN 1 AND 5),
                mindset_level INTEGER NOT NULL CHECK (mindset_level BETWEEN 1 AND 5),
                reward_criteria TEXT,
                submitted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS goals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                achieved INTEGER
            );

            CREATE TABLE IF NOT EXISTS session_notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reflections (
                session_id TEXT PRIMARY KEY REFERENCES sessions(id) ON DELETE CASCADE,
                notes TEXT NOT NULL,
                session_rating INTEGER CHECK (session_rating BETWEEN 1 AND 5),
                created_at TEXT NOT NULL
            );

            -- Stars outlive pruned sessions
            CREATE TABLE IF NOT EXISTS star_awards (
                session_id TEXT PRIMARY KEY,
                athlete_id TEXT NOT NULL,
                awarded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rating_labels (
                athlete_id TEXT PRIMARY KEY,
                labels_json TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_status_date ON sessions(status, scheduled_date);
            CREATE INDEX IF NOT EXISTS idx_sessions_athlete_date ON sessions(athlete_id, scheduled_date);
            CREATE INDEX IF NOT EXISTS idx_templates_athlete ON schedule_templates(athlete_id);
            CREATE INDEX IF NOT EXISTS idx_goals_session ON goals(session_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| conversion_error(idx, format!("column {}: {}", idx, e)))
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad date '{}': {}", raw, e)))
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{}': {}", raw, e)))
}

fn rating_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Rating> {
    let raw: u8 = row.get(idx)?;
    Rating::new(raw).ok_or_else(|| conversion_error(idx, format!("rating out of range: {}", raw)))
}

fn session_id_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<SessionId> {
    let raw: String = row.get(idx)?;
    SessionId::parse(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: session_id_column(row, 0)?,
        athlete_id: AthleteId::new(row.get::<_, String>(1)?),
        scheduled_date: date_column(row, 2)?,
        start_time: parse_column::<WallClock>(row, 3)?,
        end_time: parse_column::<WallClock>(row, 4)?,
        kind: parse_column(row, 5)?,
        status: parse_column(row, 6)?,
        absence_reason: row.get(7)?,
    })
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleTemplate> {
    let id: String = row.get(0)?;
    let day: u8 = row.get(2)?;
    Ok(ScheduleTemplate {
        id: TemplateId::parse(&id).map_err(|e| conversion_error(0, e.to_string()))?,
        athlete_id: AthleteId::new(row.get::<_, String>(1)?),
        day_of_week: DayOfWeek::new(day)
            .ok_or_else(|| conversion_error(2, format!("day of week out of range: {}", day)))?,
        start_time: parse_column::<WallClock>(row, 3)?,
        end_time: parse_column::<WallClock>(row, 4)?,
        kind: parse_column(row, 5)?,
    })
}

fn checkin_from_row(row: &Row<'_>) -> rusqlite::Result<Checkin> {
    Ok(Checkin {
        session_id: session_id_column(row, 0)?,
        energy_level: rating_column(row, 1)?,
        mindset_level: rating_column(row, 2)?,
        reward_criteria: row.get(3)?,
        submitted_at: datetime_column(row, 4)?,
    })
}

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: row.get(0)?,
        session_id: session_id_column(row, 1)?,
        text: row.get(2)?,
        achieved: row.get(3)?,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> StoreResult<Vec<T>> {
    rows.map(|r| r.map_err(StoreError::from)).collect()
}

impl ScheduleRepository for SqliteStore {
    fn create_template(&self, template: &ScheduleTemplate) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO schedule_templates (id, athlete_id, day_of_week, start_time, end_time, kind)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                template.id.to_string(),
                template.athlete_id.as_str(),
                template.day_of_week.value(),
                template.start_time.to_string(),
                template.end_time.to_string(),
                template.kind.as_str(),
            ],
        )?;

        debug!(template_id = %template.id, athlete_id = %template.athlete_id, "Template created");
        Ok(())
    }

    fn get_template(&self, id: &TemplateId) -> StoreResult<Option<ScheduleTemplate>> {
        let conn = self.conn()?;
        let template = conn
            .query_row(
                "SELECT id, athlete_id, day_of_week, start_time, end_time, kind \
                 FROM schedule_templates WHERE id = ?",
                [id.to_string()],
                template_from_row,
            )
            .optional()?;
        Ok(template)
    }

    fn list_templates(&self, athlete_id: &AthleteId) -> StoreResult<Vec<ScheduleTemplate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, athlete_id, day_of_week, start_time, end_time, kind \
             FROM schedule_templates WHERE athlete_id = ? ORDER BY day_of_week, start_time",
        )?;
        let rows = stmt.query_map([athlete_id.as_str()], template_from_row)?;
        collect(rows)
    }

    fn list_all_templates(&self) -> StoreResult<Vec<ScheduleTemplate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, athlete_id, day_of_week, start_time, end_time, kind \
             FROM schedule_templates ORDER BY athlete_id, day_of_week, start_time",
        )?;
        let rows = stmt.query_map([], template_from_row)?;
        collect(rows)
    }

    fn delete_template(&self, id: &TemplateId, from: NaiveDate) -> StoreResult<TemplateRemoval> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let template = tx
            .query_row(
                "SELECT id, athlete_id, day_of_week, start_time, end_time, kind \
                 FROM schedule_templates WHERE id = ?",
                [id.to_string()],
                template_from_row,
            )
            .optional()?;

        let Some(template) = template else {
            return Ok(TemplateRemoval::default());
        };

        // strftime('%w') numbers days the same way templates do: 0 = Sunday
        let sessions_removed = tx.execute(
            r#"
            DELETE FROM sessions
            WHERE athlete_id = ?1
              AND CAST(strftime('%w', scheduled_date) AS INTEGER) = ?2
              AND start_time = ?3
              AND end_time = ?4
              AND scheduled_date >= ?5
              AND status = 'scheduled'
              AND NOT EXISTS (SELECT 1 FROM checkins c WHERE c.session_id = sessions.id)
            "#,
            params![
                template.athlete_id.as_str(),
                template.day_of_week.value(),
                template.start_time.to_string(),
                template.end_time.to_string(),
                fmt_date(from),
            ],
        )?;
        tx.execute("DELETE FROM schedule_templates WHERE id = ?", [id.to_string()])?;
        tx.commit()?;

        debug!(template_id = %id, sessions_removed, "Template deleted");
        Ok(TemplateRemoval {
            template_deleted: true,
            sessions_removed,
        })
    }
}

impl SessionRepository for SqliteStore {
    fn insert_sessions_if_absent(&self, sessions: &[Session]) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO sessions
                    (id, athlete_id, scheduled_date, start_time, end_time, kind, status, absence_reason)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (athlete_id, scheduled_date, start_time, end_time) DO NOTHING
                "#,
            )?;
            for session in sessions {
                inserted += stmt.execute(params![
                    session.id.to_string(),
                    session.athlete_id.as_str(),
                    fmt_date(session.scheduled_date),
                    session.start_time.to_string(),
                    session.end_time.to_string(),
                    session.kind.as_str(),
                    session.status.as_str(),
                    session.absence_reason,
                ])?;
            }
        }
        tx.commit()?;

        debug!(candidates = sessions.len(), inserted, "Sessions inserted");
        Ok(inserted)
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS),
                [id.to_string()],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn list_sessions(
        &self,
        athlete_id: &AthleteId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions \
             WHERE athlete_id = ? AND scheduled_date BETWEEN ? AND ? \
             ORDER BY scheduled_date, start_time",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![athlete_id.as_str(), fmt_date(from), fmt_date(to)],
            session_from_row,
        )?;
        collect(rows)
    }

    fn transition_status(
        &self,
        id: &SessionId,
        from: SessionStatus,
        to: SessionStatus,
        absence_reason: Option<&str>,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, absence_reason = COALESCE(?2, absence_reason) \
             WHERE id = ?3 AND status = ?4",
            params![to.as_str(), absence_reason, id.to_string(), from.as_str()],
        )?;

        if changed == 0 {
            debug!(session_id = %id, from = %from, to = %to, "Status transition lost compare-and-swap");
        }
        Ok(changed == 1)
    }

    fn mark_ended_sessions_absent(
        &self,
        now: NaiveDateTime,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "UPDATE sessions SET status = 'absent', absence_reason = ?2 \
             WHERE status IN ('scheduled', 'in_progress') AND {} < ?1 \
             RETURNING id",
            SESSION_END_SQL
        ))?;
        let rows = stmt.query_map(params![fmt_datetime(now), reason], |row| {
            session_id_column(row, 0)
        })?;
        collect(rows)
    }

    fn delete_resolved_before(&self, cutoff: NaiveDate) -> StoreResult<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sessions \
             WHERE status IN ('completed', 'absent', 'cancelled') AND scheduled_date < ?",
            [fmt_date(cutoff)],
        )?;
        Ok(deleted)
    }

    fn find_duplicate_slots(&self) -> StoreResult<Vec<SessionSlot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT athlete_id, scheduled_date, start_time, end_time FROM sessions \
             GROUP BY athlete_id, scheduled_date, start_time, end_time HAVING COUNT(*) > 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSlot {
                athlete_id: AthleteId::new(row.get::<_, String>(0)?),
                scheduled_date: date_column(row, 1)?,
                start_time: parse_column::<WallClock>(row, 2)?,
                end_time: parse_column::<WallClock>(row, 3)?,
            })
        })?;
        collect(rows)
    }

    fn completed_dates(
        &self,
        athlete_id: &AthleteId,
        up_to: NaiveDate,
    ) -> StoreResult<Vec<NaiveDate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT scheduled_date FROM sessions \
             WHERE athlete_id = ? AND status = 'completed' AND scheduled_date <= ? \
             ORDER BY scheduled_date DESC",
        )?;
        let rows = stmt.query_map(params![athlete_id.as_str(), fmt_date(up_to)], |row| {
            date_column(row, 0)
        })?;
        collect(rows)
    }

    fn get_checkin(&self, session_id: &SessionId) -> StoreResult<Option<Checkin>> {
        let conn = self.conn()?;
        let checkin = conn
            .query_row(
                "SELECT session_id, energy_level, mindset_level, reward_criteria, submitted_at \
                 FROM checkins WHERE session_id = ?",
                [session_id.to_string()],
                checkin_from_row,
            )
            .optional()?;
        Ok(checkin)
    }

    fn upsert_checkin(&self, checkin: &Checkin) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO checkins (session_id, energy_level, mindset_level, reward_criteria, submitted_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id)
            DO UPDATE SET energy_level = excluded.energy_level,
                          mindset_level = excluded.mindset_level,
                          reward_criteria = excluded.reward_criteria,
                          submitted_at = excluded.submitted_at
            "#,
            params![
                checkin.session_id.to_string(),
                checkin.energy_level.value(),
                checkin.mindset_level.value(),
                checkin.reward_criteria,
                fmt_datetime(checkin.submitted_at),
            ],
        )?;

        debug!(session_id = %checkin.session_id, "Check-in saved");
        Ok(())
    }

    fn list_checkins(
        &self,
        athlete_id: &AthleteId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Checkin>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.session_id, c.energy_level, c.mindset_level, c.reward_criteria, c.submitted_at \
             FROM checkins c JOIN sessions s ON s.id = c.session_id \
             WHERE s.athlete_id = ? AND s.scheduled_date BETWEEN ? AND ? \
             ORDER BY s.scheduled_date",
        )?;
        let rows = stmt.query_map(
            params![athlete_id.as_str(), fmt_date(from), fmt_date(to)],
            checkin_from_row,
        )?;
        collect(rows)
    }

    fn add_goal(&self, session_id: &SessionId, text: &str) -> StoreResult<Goal> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO goals (session_id, text, achieved) VALUES (?, ?, NULL)",
            params![session_id.to_string(), text],
        )?;
        Ok(Goal {
            id: conn.last_insert_rowid(),
            session_id: *session_id,
            text: text.to_string(),
            achieved: None,
        })
    }

    fn update_goal_text(&self, goal_id: i64, text: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE goals SET text = ? WHERE id = ?", params![text, goal_id])?;
        Ok(changed == 1)
    }

    fn delete_goal(&self, goal_id: i64) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM goals WHERE id = ?", params![goal_id])?;
        Ok(changed == 1)
    }

    fn set_goal_achieved(&self, goal_id: i64, achieved: Option<bool>) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE goals SET achieved = ? WHERE id = ?",
            params![achieved, goal_id],
        )?;
        Ok(changed == 1)
    }

    fn list_goals(&self, session_id: &SessionId) -> StoreResult<Vec<Goal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, text, achieved FROM goals WHERE session_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map([session_id.to_string()], goal_from_row)?;
        collect(rows)
    }

    fn list_goals_of_completed(
        &self,
        athlete_id: &AthleteId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Goal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT g.id, g.session_id, g.text, g.achieved \
             FROM goals g JOIN sessions s ON s.id = g.session_id \
             WHERE s.athlete_id = ? AND s.status = 'completed' \
               AND s.scheduled_date BETWEEN ? AND ? \
             ORDER BY g.id",
        )?;
        let rows = stmt.query_map(
            params![athlete_id.as_str(), fmt_date(from), fmt_date(to)],
            goal_from_row,
        )?;
        collect(rows)
    }

    fn add_note(
        &self,
        session_id: &SessionId,
        body: &str,
        at: NaiveDateTime,
    ) -> StoreResult<SessionNote> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO session_notes (session_id, body, created_at) VALUES (?, ?, ?)",
            params![session_id.to_string(), body, fmt_datetime(at)],
        )?;
        Ok(SessionNote {
            id: conn.last_insert_rowid(),
            session_id: *session_id,
            body: body.to_string(),
            created_at: at,
        })
    }

    fn list_notes(&self, session_id: &SessionId) -> StoreResult<Vec<SessionNote>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, body, created_at FROM session_notes \
             WHERE session_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map([session_id.to_string()], |row| {
            Ok(SessionNote {
                id: row.get(0)?,
                session_id: session_id_column(row, 1)?,
                body: row.get(2)?,
                created_at: datetime_column(row, 3)?,
            })
        })?;
        collect(rows)
    }

    fn complete_session(&self, completion: &Completion) -> StoreResult<CompletionOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let session_id = completion.session_id.to_string();

        let transitioned = tx.execute(
            "UPDATE sessions SET status = 'completed' WHERE id = ? AND status = ?",
            params![session_id, completion.from.as_str()],
        )? == 1;

        if !transitioned {
            let current: Option<String> = tx
                .query_row("SELECT status FROM sessions WHERE id = ?", [&session_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if current.as_deref() != Some(SessionStatus::Completed.as_str()) {
                // Lost the race to a different transition; write nothing.
                return Ok(CompletionOutcome::default());
            }
        }

        let reflection_written = tx.execute(
            r#"
            INSERT INTO reflections (session_id, notes, session_rating, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
            params![
                session_id,
                completion.reflection.notes,
                completion.reflection.session_rating.map(|r| r.value()),
                fmt_datetime(completion.reflection.created_at),
            ],
        )? == 1;

        if transitioned {
            for (goal_id, achieved) in &completion.goal_outcomes {
                tx.execute(
                    "UPDATE goals SET achieved = ? WHERE id = ? AND session_id = ?",
                    params![achieved, goal_id, session_id],
                )?;
            }
        }

        let star_awarded = tx.execute(
            "INSERT INTO star_awards (session_id, athlete_id, awarded_at) VALUES (?, ?, ?) \
             ON CONFLICT(session_id) DO NOTHING",
            params![
                session_id,
                completion.athlete_id.as_str(),
                fmt_datetime(completion.at)
            ],
        )? == 1;

        tx.commit()?;

        debug!(
            session_id = %completion.session_id,
            transitioned,
            reflection_written,
            star_awarded,
            "Session completion applied"
        );
        Ok(CompletionOutcome {
            transitioned,
            reflection_written,
            star_awarded,
        })
    }

    fn get_reflection(&self, session_id: &SessionId) -> StoreResult<Option<Reflection>> {
        let conn = self.conn()?;
        let reflection = conn
            .query_row(
                "SELECT session_id, notes, session_rating, created_at FROM reflections \
                 WHERE session_id = ?",
                [session_id.to_string()],
                |row| {
                    let rating: Option<u8> = row.get(2)?;
                    Ok(Reflection {
                        session_id: session_id_column(row, 0)?,
                        notes: row.get(1)?,
                        session_rating: rating.and_then(Rating::new),
                        created_at: datetime_column(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(reflection)
    }

    fn award_star(
        &self,
        session_id: &SessionId,
        athlete_id: &AthleteId,
        at: NaiveDateTime,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO star_awards (session_id, athlete_id, awarded_at) VALUES (?, ?, ?) \
             ON CONFLICT(session_id) DO NOTHING",
            params![session_id.to_string(), athlete_id.as_str(), fmt_datetime(at)],
        )?;
        Ok(inserted == 1)
    }

    fn star_count_for_session(&self, session_id: &SessionId) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM star_awards WHERE session_id = ?",
            [session_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn total_stars(&self, athlete_id: &AthleteId) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM star_awards WHERE athlete_id = ?",
            [athlete_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn completed_sessions_without_star(&self) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions s \
             WHERE s.status = 'completed' \
               AND NOT EXISTS (SELECT 1 FROM star_awards a WHERE a.session_id = s.id) \
             ORDER BY s.scheduled_date",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map([], session_from_row)?;
        collect(rows)
    }

    fn get_rating_labels(&self, athlete_id: &AthleteId) -> StoreResult<Option<RatingLabels>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT labels_json FROM rating_labels WHERE athlete_id = ?",
                [athlete_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => {
                let labels: RatingLabels = serde_json::from_str(&s)?;
                labels.validate()?;
                Ok(Some(labels))
            }
            None => Ok(None),
        }
    }

    fn set_rating_labels(&self, athlete_id: &AthleteId, labels: &RatingLabels) -> StoreResult<()> {
        labels.validate()?;
        let json = serde_json::to_string(labels)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO rating_labels (athlete_id, labels_json)
            VALUES (?, ?)
            ON CONFLICT(athlete_id)
            DO UPDATE SET labels_json = excluded.labels_json
            "#,
            params![athlete_id.as_str(), json],
        )?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![fmt_datetime(event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp = datetime_column(row, 1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_json) = row?;
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;
            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
