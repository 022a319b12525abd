//! Daily maintenance sweep
//!
//! Phases run in strict order:
//! 1. reconcile overdue sessions (non-fatal)
//! 2. extend the materialized horizon (fatal)
//! 3. retention cleanup (non-fatal)
//! 4. duplicate-slot invariant check (alert only)
//!
//! Each phase runs on the blocking pool under a timeout; a timeout counts as
//! a failure of that phase. A timed-out phase keeps the sweep locked until
//! its blocking task has finished.

use cadence_api::SweepResponse;
use cadence_config::SweepPolicy;
use cadence_store::{AuditEvent, AuditEventType, Store, StoreResult};
use chrono::{DateTime, Duration, Local, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::{extend_horizon, SweepError};

/// What started a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    Http,
    Scheduled,
    Manual,
}

impl fmt::Display for SweepTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SweepTrigger::Http => "http",
            SweepTrigger::Scheduled => "scheduled",
            SweepTrigger::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Outcome of a sweep that did not fail fatally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Local>,
    pub overdue_marked: u64,
    pub materialized: u64,
    pub pruned: u64,
    /// Non-fatal phase failures and invariant alerts
    pub warnings: Vec<String>,
}

impl SweepReport {
    pub fn to_response(&self) -> SweepResponse {
        SweepResponse {
            success: true,
            overdue_sessions_marked: self.overdue_marked,
            timestamp: self.started_at.to_rfc3339(),
            sessions_materialized: self.materialized,
            sessions_pruned: self.pruned,
            warnings: self.warnings.clone(),
        }
    }
}

/// Held for the length of a sweep and by any phase that outlives it
type RunGuard = Arc<OwnedMutexGuard<()>>;

/// The maintenance orchestrator, shared by every trigger
pub struct MaintenanceSweep {
    store: Arc<dyn Store>,
    policy: SweepPolicy,
    guard: Arc<Mutex<()>>,
}

impl MaintenanceSweep {
    pub fn new(store: Arc<dyn Store>, policy: SweepPolicy) -> Self {
        Self {
            store,
            policy,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn policy(&self) -> &SweepPolicy {
        &self.policy
    }

    /// Run one sweep as of `now`. Overlapping calls are rejected with
    /// [`SweepError::AlreadyRunning`].
    pub async fn run(
        &self,
        now: DateTime<Local>,
        trigger: SweepTrigger,
    ) -> Result<SweepReport, SweepError> {
        let running: RunGuard = Arc::new(
            self.guard
                .clone()
                .try_lock_owned()
                .map_err(|_| SweepError::AlreadyRunning)?,
        );

        let store = self.store.clone();
        let healthy = tokio::task::spawn_blocking(move || store.is_healthy())
            .await
            .unwrap_or(false);
        if !healthy {
            error!("Store is not usable, sweep aborted before any phase");
            return Err(SweepError::Configuration("store is not usable".into()));
        }

        info!(trigger = %trigger, now = %now, "Maintenance sweep started");
        self.audit(AuditEventType::SweepStarted {
            trigger: trigger.to_string(),
        });

        let today = now.date_naive();
        let now_local = now.naive_local();
        let mut report = SweepReport {
            started_at: now,
            overdue_marked: 0,
            materialized: 0,
            pruned: 0,
            warnings: Vec::new(),
        };

        // 1. Reconcile overdue
        let reason = self.policy.absence_reason.clone();
        match self
            .run_phase("reconcile", &running, move |store| {
                store.mark_ended_sessions_absent(now_local, &reason)
            })
            .await
        {
            Ok(marked) => {
                report.overdue_marked = marked.len() as u64;
                info!(marked = marked.len(), "Overdue sessions reconciled");
            }
            Err(e) => self.phase_failed("reconcile", e, &mut report),
        }

        // 2. Extend horizon
        let horizon_days = self.policy.horizon_days;
        match self
            .run_phase("materialize", &running, move |store| {
                let templates = store.list_all_templates()?;
                extend_horizon(&*store, &templates, today, horizon_days)
            })
            .await
        {
            Ok(inserted) => report.materialized = inserted as u64,
            Err(details) => {
                error!(error = %details, "Materialization failed, sweep aborted");
                self.audit(AuditEventType::SweepPhaseFailed {
                    phase: "materialize".into(),
                    error: details.clone(),
                });
                return Err(SweepError::Materialization { details });
            }
        }

        // 3. Retention cleanup
        match retention_cutoff(today, self.policy.retention_days) {
            Some(cutoff) => match self
                .run_phase("cleanup", &running, move |store| {
                    store.delete_resolved_before(cutoff)
                })
                .await
            {
                Ok(deleted) => {
                    report.pruned = deleted as u64;
                    info!(cutoff = %cutoff, deleted, "Resolved sessions pruned");
                }
                Err(e) => self.phase_failed("cleanup", e, &mut report),
            },
            None => self.phase_failed(
                "cleanup",
                format!(
                    "retention window of {} days runs past the calendar",
                    self.policy.retention_days
                ),
                &mut report,
            ),
        }

        // 4. Invariant check
        match self
            .run_phase("invariant_check", &running, |store| {
                store.find_duplicate_slots()
            })
            .await
        {
            Ok(duplicates) => {
                for slot in duplicates {
                    let message = format!(
                        "duplicate sessions for athlete {} on {} {}-{}",
                        slot.athlete_id, slot.scheduled_date, slot.start_time, slot.end_time
                    );
                    error!(alert = true, "{}", message);
                    self.audit(AuditEventType::InvariantViolation {
                        message: message.clone(),
                    });
                    report.warnings.push(message);
                }
            }
            Err(e) => self.phase_failed("invariant_check", e, &mut report),
        }

        info!(
            overdue_marked = report.overdue_marked,
            materialized = report.materialized,
            pruned = report.pruned,
            warnings = report.warnings.len(),
            "Maintenance sweep finished"
        );
        self.audit(AuditEventType::SweepFinished {
            overdue_marked: report.overdue_marked,
            materialized: report.materialized,
            pruned: report.pruned,
            warnings: report.warnings.clone(),
        });

        Ok(report)
    }

    async fn run_phase<T, F>(
        &self,
        phase: &'static str,
        running: &RunGuard,
        f: F,
    ) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn Store>) -> StoreResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        let mut task = tokio::task::spawn_blocking(move || f(store));

        match tokio::time::timeout(self.policy.phase_timeout, &mut task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_error)) => Err(format!("{} task failed: {}", phase, join_error)),
            Err(_) => {
                // Blocking tasks cannot be aborted; the straggler keeps the guard
                let running = running.clone();
                tokio::spawn(async move {
                    if let Err(e) = task.await {
                        warn!(phase, error = %e, "Timed-out sweep phase failed");
                    }
                    drop(running);
                });
                Err(format!(
                    "{} timed out after {}s",
                    phase,
                    self.policy.phase_timeout.as_secs_f64()
                ))
            }
        }
    }

    fn phase_failed(&self, phase: &str, error: String, report: &mut SweepReport) {
        warn!(phase, error = %error, "Sweep phase failed, continuing");
        self.audit(AuditEventType::SweepPhaseFailed {
            phase: phase.to_string(),
            error: error.clone(),
        });
        report.warnings.push(format!("{}: {}", phase, error));
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

/// Sessions dated before this are eligible for cleanup; `None` when the
/// window reaches before the start of the calendar
pub fn retention_cutoff(today: NaiveDate, retention_days: u32) -> Option<NaiveDate> {
    today.checked_sub_signed(Duration::days(retention_days.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_api::{ScheduleTemplate, Session, SessionKind, SessionStatus};
    use cadence_store::{ScheduleRepository, SessionRepository, SqliteStore};
    use cadence_util::{AthleteId, DayOfWeek, SessionId, WallClock};
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn local(d: NaiveDate, h: u32, m: u32) -> DateTime<Local> {
        Local
            .from_local_datetime(&d.and_hms_opt(h, m, 0).unwrap())
            .earliest()
            .unwrap()
    }

    fn session(d: NaiveDate, start: u8, end: u8, status: SessionStatus) -> Session {
        Session {
            id: SessionId::new(),
            athlete_id: AthleteId::new("a1"),
            scheduled_date: d,
            start_time: WallClock::new(start, 0).unwrap(),
            end_time: WallClock::new(end, 0).unwrap(),
            kind: SessionKind::Practice,
            status,
            absence_reason: None,
        }
    }

    fn sweep_over(store: Arc<SqliteStore>) -> MaintenanceSweep {
        MaintenanceSweep::new(store, SweepPolicy::default())
    }

    #[tokio::test]
    async fn test_reconciles_overdue_and_leaves_completed() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let yesterday = date(2024, 1, 9);
        let stale = session(yesterday, 15, 17, SessionStatus::Scheduled);
        let done = session(yesterday, 18, 19, SessionStatus::Completed);
        store.insert_sessions_if_absent(&[stale.clone(), done.clone()]).unwrap();

        let report = sweep_over(store.clone())
            .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Manual)
            .await
            .unwrap();

        assert_eq!(report.overdue_marked, 1);
        let stale = store.get_session(&stale.id).unwrap().unwrap();
        assert_eq!(stale.status, SessionStatus::Absent);
        assert_eq!(stale.absence_reason.as_deref(), Some(SweepPolicy::default().absence_reason.as_str()));
        assert_eq!(
            store.get_session(&done.id).unwrap().unwrap(),
            done
        );
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_extends_horizon_and_is_idempotent() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let athlete = AthleteId::new("a1");
        for day in [DayOfWeek::WEDNESDAY, DayOfWeek::FRIDAY] {
            store
                .create_template(&ScheduleTemplate::new(
                    athlete.clone(),
                    day,
                    WallClock::new(15, 0).unwrap(),
                    WallClock::new(17, 0).unwrap(),
                    SessionKind::Practice,
                ))
                .unwrap();
        }
        let sweep = sweep_over(store.clone());
        let now = local(date(2024, 1, 10), 0, 5);

        let first = sweep.run(now, SweepTrigger::Scheduled).await.unwrap();
        // Wed 10, Fri 12, Wed 17
        assert_eq!(first.materialized, 3);

        let second = sweep.run(now, SweepTrigger::Http).await.unwrap();
        assert_eq!(second.materialized, 0);
        assert_eq!(second.overdue_marked, 0);
        assert_eq!(
            store
                .list_sessions(&athlete, date(2024, 1, 1), date(2024, 1, 31))
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn test_prunes_resolved_sessions_past_retention() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let old_done = session(date(2023, 12, 1), 8, 9, SessionStatus::Completed);
        let recent_done = session(date(2024, 1, 5), 8, 9, SessionStatus::Completed);
        let old_pending = session(date(2023, 12, 1), 10, 11, SessionStatus::Scheduled);
        store
            .insert_sessions_if_absent(&[old_done.clone(), recent_done.clone(), old_pending.clone()])
            .unwrap();

        let report = sweep_over(store.clone())
            .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Manual)
            .await
            .unwrap();

        // The old pending session is reconciled to absent first, then pruned
        assert_eq!(report.overdue_marked, 1);
        assert_eq!(report.pruned, 2);
        assert!(store.get_session(&old_done.id).unwrap().is_none());
        assert!(store.get_session(&old_pending.id).unwrap().is_none());
        assert!(store.get_session(&recent_done.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sweep = sweep_over(store);
        let _held = sweep.guard.try_lock().unwrap();

        assert!(matches!(
            sweep.run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Http).await,
            Err(SweepError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_sweep_is_audited() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        sweep_over(store.clone())
            .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Scheduled)
            .await
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert!(matches!(events[0].event, AuditEventType::SweepFinished { .. }));
        assert!(matches!(
            &events[1].event,
            AuditEventType::SweepStarted { trigger } if trigger == "scheduled"
        ));
    }

    #[test]
    fn test_report_maps_to_response_contract() {
        let report = SweepReport {
            started_at: local(date(2024, 1, 10), 0, 5),
            overdue_marked: 2,
            materialized: 5,
            pruned: 1,
            warnings: vec![],
        };
        let response = report.to_response();
        assert!(response.success);
        assert_eq!(response.overdue_sessions_marked, 2);
        assert!(response.timestamp.starts_with("2024-01-10T00:05:00"));
    }

    #[test]
    fn test_retention_cutoff() {
        assert_eq!(retention_cutoff(date(2024, 1, 31), 30), Some(date(2024, 1, 1)));
        assert_eq!(retention_cutoff(NaiveDate::MIN, 1), None);
    }

    #[tokio::test]
    async fn test_oversized_policy_fails_phases_instead_of_panicking() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .create_template(&ScheduleTemplate::new(
                AthleteId::new("a1"),
                DayOfWeek::WEDNESDAY,
                WallClock::new(15, 0).unwrap(),
                WallClock::new(17, 0).unwrap(),
                SessionKind::Practice,
            ))
            .unwrap();
        let now = local(date(2024, 1, 10), 0, 5);

        let retention = MaintenanceSweep::new(
            store.clone(),
            SweepPolicy {
                retention_days: u32::MAX,
                ..SweepPolicy::default()
            },
        );
        let report = retention.run(now, SweepTrigger::Manual).await.unwrap();
        assert_eq!(report.materialized, 2);
        assert!(report.warnings.iter().any(|w| w.starts_with("cleanup:")));
        let events = store.get_recent_audits(1).unwrap();
        assert!(matches!(events[0].event, AuditEventType::SweepFinished { .. }));

        let horizon = MaintenanceSweep::new(
            store,
            SweepPolicy {
                horizon_days: u32::MAX,
                ..SweepPolicy::default()
            },
        );
        match horizon.run(now, SweepTrigger::Manual).await {
            Err(SweepError::Materialization { details }) => {
                assert!(details.contains("horizon_days"), "{}", details)
            }
            other => panic!("expected materialization failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timed_out_phase_holds_the_guard_until_it_finishes() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sweep = MaintenanceSweep::new(
            store,
            SweepPolicy {
                phase_timeout: std::time::Duration::from_millis(50),
                ..SweepPolicy::default()
            },
        );
        let running: RunGuard = Arc::new(sweep.guard.clone().try_lock_owned().unwrap());

        let result = sweep
            .run_phase("reconcile", &running, |_| {
                std::thread::sleep(std::time::Duration::from_millis(400));
                Ok(())
            })
            .await;
        assert_eq!(result, Err("reconcile timed out after 0.05s".to_string()));

        drop(running);
        assert!(matches!(
            sweep.run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Http).await,
            Err(SweepError::AlreadyRunning)
        ));

        tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
        assert!(sweep.guard.try_lock().is_ok());
    }

    mod failures {
        use super::*;

        /// On-disk store plus a side connection for sabotaging it
        fn sabotaged(sql: &str) -> (tempfile::TempDir, Arc<SqliteStore>) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("cadence.db");
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            let side = rusqlite::Connection::open(&path).unwrap();
            side.execute_batch(sql).unwrap();
            (dir, store)
        }

        #[tokio::test]
        async fn test_reconcile_failure_is_not_fatal() {
            let (_dir, store) = sabotaged(
                "CREATE TRIGGER no_updates BEFORE UPDATE ON sessions \
                 BEGIN SELECT RAISE(ABORT, 'updates disabled'); END;",
            );
            store
                .insert_sessions_if_absent(&[session(date(2024, 1, 9), 15, 17, SessionStatus::Scheduled)])
                .unwrap();

            let report = sweep_over(store)
                .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Manual)
                .await
                .unwrap();

            assert_eq!(report.overdue_marked, 0);
            assert_eq!(report.warnings.len(), 1);
            assert!(report.warnings[0].starts_with("reconcile:"));
        }

        #[tokio::test]
        async fn test_cleanup_failure_is_not_fatal() {
            let (_dir, store) = sabotaged(
                "CREATE TRIGGER no_deletes BEFORE DELETE ON sessions \
                 BEGIN SELECT RAISE(ABORT, 'deletes disabled'); END;",
            );
            store
                .insert_sessions_if_absent(&[session(date(2023, 11, 1), 8, 9, SessionStatus::Completed)])
                .unwrap();

            let report = sweep_over(store)
                .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Manual)
                .await
                .unwrap();

            assert_eq!(report.pruned, 0);
            assert!(report.warnings.iter().any(|w| w.starts_with("cleanup:")));
        }

        /// Store whose `event` statements on `sessions` grind through a large
        /// cross join before running
        fn stalled_on(event: &str) -> (tempfile::TempDir, Arc<SqliteStore>) {
            sabotaged(&format!(
                "CREATE TABLE stall(x INTEGER); \
                 WITH RECURSIVE n(x) AS \
                   (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 1000) \
                 INSERT INTO stall SELECT x FROM n; \
                 CREATE TABLE stall_small(x INTEGER); \
                 INSERT INTO stall_small SELECT x FROM stall WHERE x <= 20; \
                 CREATE TRIGGER slow_{event} BEFORE {event} ON sessions \
                 BEGIN SELECT count(*) FROM stall a, stall b, stall_small c; END;",
                event = event
            ))
        }

        fn impatient(store: Arc<SqliteStore>) -> MaintenanceSweep {
            MaintenanceSweep::new(
                store,
                SweepPolicy {
                    phase_timeout: std::time::Duration::from_millis(50),
                    ..SweepPolicy::default()
                },
            )
        }

        #[tokio::test]
        async fn test_reconcile_timeout_is_not_fatal() {
            let (_dir, store) = stalled_on("UPDATE");
            store
                .insert_sessions_if_absent(&[session(date(2024, 1, 9), 15, 17, SessionStatus::Scheduled)])
                .unwrap();

            let report = impatient(store)
                .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Manual)
                .await
                .unwrap();

            assert_eq!(report.overdue_marked, 0);
            assert!(
                report
                    .warnings
                    .iter()
                    .any(|w| w.starts_with("reconcile:") && w.contains("reconcile timed out")),
                "{:?}",
                report.warnings
            );
        }

        #[tokio::test]
        async fn test_cleanup_timeout_is_not_fatal() {
            let (_dir, store) = stalled_on("DELETE");
            store
                .insert_sessions_if_absent(&[session(date(2023, 11, 1), 8, 9, SessionStatus::Completed)])
                .unwrap();

            let report = impatient(store)
                .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Manual)
                .await
                .unwrap();

            assert_eq!(report.pruned, 0);
            assert!(
                report.warnings.iter().any(|w| w.contains("cleanup timed out")),
                "{:?}",
                report.warnings
            );
        }

        #[tokio::test]
        async fn test_materialize_timeout_is_fatal() {
            let (_dir, store) = stalled_on("INSERT");
            store
                .create_template(&ScheduleTemplate::new(
                    AthleteId::new("a1"),
                    DayOfWeek::WEDNESDAY,
                    WallClock::new(15, 0).unwrap(),
                    WallClock::new(17, 0).unwrap(),
                    SessionKind::Practice,
                ))
                .unwrap();

            match impatient(store)
                .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Http)
                .await
            {
                Err(SweepError::Materialization { details }) => {
                    assert!(details.contains("materialize timed out"), "{}", details)
                }
                other => panic!("expected materialization failure, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_materialization_failure_is_fatal() {
            let (_dir, store) = sabotaged("DROP TABLE schedule_templates;");

            let result = sweep_over(store.clone())
                .run(local(date(2024, 1, 10), 0, 5), SweepTrigger::Http)
                .await;

            assert!(matches!(result, Err(SweepError::Materialization { .. })));
            let events = store.get_recent_audits(1).unwrap();
            assert!(matches!(
                &events[0].event,
                AuditEventType::SweepPhaseFailed { phase, .. } if phase == "materialize"
            ));
        }
    }
}
