//! Template management and per-athlete settings

use cadence_api::{RatingLabels, ScheduleTemplate, SessionKind};
use cadence_store::{AuditEvent, AuditEventType, Store, TemplateRemoval};
use cadence_util::{AthleteId, DayOfWeek, TemplateId, WallClock};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

use crate::{CoreError, CoreResult};

pub struct ScheduleManager {
    store: Arc<dyn Store>,
    default_labels: RatingLabels,
}

impl ScheduleManager {
    pub fn new(store: Arc<dyn Store>, default_labels: RatingLabels) -> Self {
        Self {
            store,
            default_labels,
        }
    }

    /// Create a weekly template. Sessions appear on the next sweep.
    pub fn create_template(
        &self,
        athlete_id: AthleteId,
        day_of_week: DayOfWeek,
        start_time: WallClock,
        end_time: WallClock,
        kind: SessionKind,
    ) -> CoreResult<ScheduleTemplate> {
        if athlete_id.as_str().trim().is_empty() {
            return Err(CoreError::Validation("athlete id is empty".into()));
        }
        if start_time == end_time {
            return Err(CoreError::Validation(format!(
                "template start and end are both {}",
                start_time
            )));
        }

        let template = ScheduleTemplate::new(athlete_id, day_of_week, start_time, end_time, kind);
        self.store.create_template(&template)?;

        info!(
            template_id = %template.id,
            athlete_id = %template.athlete_id,
            day = day_of_week.value(),
            start = %start_time,
            end = %end_time,
            "Template created"
        );
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TemplateCreated {
            template_id: template.id,
            athlete_id: template.athlete_id.clone(),
        }));
        Ok(template)
    }

    pub fn list_templates(&self, athlete_id: &AthleteId) -> CoreResult<Vec<ScheduleTemplate>> {
        Ok(self.store.list_templates(athlete_id)?)
    }

    /// Delete a template and its unstarted sessions from `today` onward
    pub fn delete_template(&self, id: &TemplateId, today: NaiveDate) -> CoreResult<TemplateRemoval> {
        let removal = self.store.delete_template(id, today)?;
        if !removal.template_deleted {
            return Err(CoreError::TemplateNotFound(*id));
        }

        info!(template_id = %id, sessions_removed = removal.sessions_removed, "Template deleted");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TemplateDeleted {
            template_id: *id,
            sessions_removed: removal.sessions_removed,
        }));
        Ok(removal)
    }

    /// Stored labels of the athlete, or the configured defaults
    pub fn rating_labels(&self, athlete_id: &AthleteId) -> CoreResult<RatingLabels> {
        Ok(self
            .store
            .get_rating_labels(athlete_id)?
            .unwrap_or_else(|| self.default_labels.clone()))
    }

    pub fn set_rating_labels(&self, athlete_id: &AthleteId, labels: &RatingLabels) -> CoreResult<()> {
        labels.validate()?;
        self.store.set_rating_labels(athlete_id, labels)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_api::RatingScale;
    use cadence_store::{SessionRepository, SqliteStore};
    use crate::extend_horizon;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock(h: u8, m: u8) -> WallClock {
        WallClock::new(h, m).unwrap()
    }

    fn manager() -> (Arc<SqliteStore>, ScheduleManager) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let manager = ScheduleManager::new(store.clone(), RatingLabels::default());
        (store, manager)
    }

    #[test]
    fn test_create_rejects_empty_range() {
        let (_store, manager) = manager();
        assert!(matches!(
            manager.create_template(
                AthleteId::new("a1"),
                DayOfWeek::MONDAY,
                clock(15, 0),
                clock(15, 0),
                SessionKind::Practice
            ),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_create_list_delete() {
        let (store, manager) = manager();
        let athlete = AthleteId::new("a1");
        let template = manager
            .create_template(
                athlete.clone(),
                DayOfWeek::MONDAY,
                clock(15, 0),
                clock(17, 0),
                SessionKind::Practice,
            )
            .unwrap();
        assert_eq!(manager.list_templates(&athlete).unwrap().len(), 1);

        // Mondays 2024-01-08 and 2024-01-15
        let today = date(2024, 1, 8);
        extend_horizon(&*store, &[template.clone()], today, 7).unwrap();
        assert_eq!(store.list_sessions(&athlete, today, date(2024, 1, 31)).unwrap().len(), 2);

        let removal = manager.delete_template(&template.id, today).unwrap();
        assert_eq!(removal.sessions_removed, 2);
        assert!(manager.list_templates(&athlete).unwrap().is_empty());

        assert!(matches!(
            manager.delete_template(&template.id, today),
            Err(CoreError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_rating_labels_fall_back_to_defaults() {
        let (_store, manager) = manager();
        let athlete = AthleteId::new("a1");
        assert_eq!(manager.rating_labels(&athlete).unwrap(), RatingLabels::default());

        let custom = RatingLabels {
            energy: RatingScale(["1", "2", "3", "4", "5"].map(String::from)),
            ..RatingLabels::default()
        };
        manager.set_rating_labels(&athlete, &custom).unwrap();
        assert_eq!(manager.rating_labels(&athlete).unwrap(), custom);

        let invalid = RatingLabels {
            mindset: RatingScale(["a", "", "c", "d", "e"].map(String::from)),
            ..RatingLabels::default()
        };
        assert!(matches!(
            manager.set_rating_labels(&athlete, &invalid),
            Err(CoreError::Validation(_))
        ));
    }
}
