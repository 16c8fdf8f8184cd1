use async_trait::async_trait;
use chrono::NaiveDate;
use model::{
    default_horizon, expand_occurrences, today, Appointment, AppointmentQuery, AppointmentSeries,
    AppointmentStatus, AppointmentUpdate, ConflictInfo, Error, NewAppointment, NewSeries,
    Occurrence, Page, ScheduleUpdate, SeriesQuery, SeriesWithDays, TimeOfDay,
};
use tracing::debug;
use uuid::Uuid;

use crate::conflict::ensure_no_conflicts;
use crate::saga::{Compensation, Saga};
use crate::store::{AppointmentInsert, SeriesInsert};
use crate::{Appointments, BookingStore, ConflictPolicy, SchedulingManager, SeriesScheduling};

#[async_trait]
impl<S: BookingStore> Appointments for SchedulingManager<S> {
    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Appointment, Error> {
        appointment.validate()?;

        if self.policy == ConflictPolicy::Enforce {
            let taken = self
                .store
                .slot_holder(appointment.date, appointment.time, None)
                .await?;
            if taken.is_some() {
                return Err(slot_conflict(appointment.date, appointment.time));
            }
        }

        self.store
            .insert_appointment(AppointmentInsert {
                name: appointment.name,
                email: appointment.email,
                phone: appointment.phone,
                date: appointment.date,
                time: appointment.time,
                service: appointment.service,
                message: appointment.message,
                status: AppointmentStatus::Pending,
                series_id: None,
            })
            .await
    }

    async fn update_appointment(&self, update: AppointmentUpdate) -> Result<Appointment, Error> {
        update.validate()?;

        // Moving onto an occupied slot is always rejected; the appointment's
        // own current slot is excluded from the check.
        let taken = self
            .store
            .slot_holder(update.date, update.time, Some(update.id))
            .await?;
        if taken.is_some() {
            return Err(slot_conflict(update.date, update.time));
        }

        self.store.update_appointment(&update).await
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), Error> {
        self.store.delete_appointment(id).await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, Error> {
        self.store.get_appointment(id).await
    }

    async fn list_appointments(&self, query: AppointmentQuery) -> Result<Page<Appointment>, Error> {
        self.store.list_appointments(&query).await
    }

    async fn booked_times(&self, date: NaiveDate) -> Result<Vec<TimeOfDay>, Error> {
        self.store.booked_times_on(date).await
    }
}

#[async_trait]
impl<S: BookingStore> SeriesScheduling for SchedulingManager<S> {
    async fn create_series(&self, series: NewSeries) -> Result<SeriesWithDays, Error> {
        series.validate()?;

        let start = series.start_date;
        let end = series.end_date.unwrap_or_else(|| default_horizon(start));
        let occurrences = expand_occurrences(start, end, &series.schedule);
        ensure_no_conflicts(&self.store, &occurrences, None).await?;

        let header = self
            .store
            .insert_series(SeriesInsert {
                name: series.name.clone(),
                email: series.email.clone(),
                phone: series.phone.clone(),
                service: series.service.clone(),
                message: series.message.clone(),
                start_date: start,
                end_date: series.end_date,
                is_active: true,
            })
            .await?;

        let mut saga = Saga::new(&self.store);
        saga.record(Compensation::DeleteSeries(header.id));

        let days = series.schedule.entries().collect();
        if let Err(e) = self.store.insert_series_days(header.id, days).await {
            return Err(saga.abort("series days insert", e).await);
        }

        let rows: Vec<_> = occurrences
            .iter()
            .map(|occ| series_row(&header, *occ))
            .collect();
        if !rows.is_empty() {
            if let Err(e) = self.store.insert_appointments(rows).await {
                return Err(saga.abort("series appointments insert", e).await);
            }
        }
        saga.commit();

        debug!(series_id = %header.id, occurrences = occurrences.len(), "series created");
        self.store.get_series(header.id).await
    }

    async fn update_series_schedule(&self, update: ScheduleUpdate) -> Result<SeriesWithDays, Error> {
        update.validate()?;
        let existing = self.store.get_series(update.series_id).await?;

        // Past occurrences are never regenerated or deleted; the effective
        // start is clamped to today.
        let today = today();
        let effective_start = update.start_date.max(today);
        let occurrences = expand_occurrences(effective_start, update.end_date, &update.schedule);
        ensure_no_conflicts(&self.store, &occurrences, Some(update.series_id)).await?;

        // From here on failures surface immediately without compensation:
        // re-running the update with corrected input converges the state.
        self.store
            .update_series_range(update.series_id, update.start_date, Some(update.end_date))
            .await?;
        self.store.delete_series_days(update.series_id).await?;
        self.store
            .insert_series_days(update.series_id, update.schedule.entries().collect())
            .await?;
        self.store
            .delete_series_appointments(update.series_id, Some(today))
            .await?;

        if !occurrences.is_empty() {
            let rows = occurrences
                .iter()
                .map(|occ| series_row(&existing.series, *occ))
                .collect();
            self.store.insert_appointments(rows).await?;
        }

        debug!(series_id = %update.series_id, occurrences = occurrences.len(), "series schedule updated");
        self.store.get_series(update.series_id).await
    }

    async fn set_series_active(&self, id: Uuid, active: bool) -> Result<AppointmentSeries, Error> {
        self.store.set_series_active(id, active).await
    }

    async fn delete_series(&self, id: Uuid) -> Result<(), Error> {
        // Dependent appointments go first; if that fails the header stays.
        self.store.delete_series_appointments(id, None).await?;
        self.store.delete_series(id).await
    }

    async fn get_series(&self, id: Uuid) -> Result<SeriesWithDays, Error> {
        self.store.get_series(id).await
    }

    async fn list_series(&self, query: SeriesQuery) -> Result<Page<SeriesWithDays>, Error> {
        self.store.list_series(&query).await
    }
}

fn slot_conflict(date: NaiveDate, time: TimeOfDay) -> Error {
    Error::Conflict(ConflictInfo {
        samples: vec![Occurrence { date, time }],
        total: 1,
    })
}

fn series_row(series: &AppointmentSeries, occurrence: Occurrence) -> AppointmentInsert {
    AppointmentInsert {
        name: series.name.clone(),
        email: series.email.clone(),
        phone: series.phone.clone(),
        date: occurrence.date,
        time: occurrence.time,
        service: series.service.clone(),
        message: series.message.clone(),
        status: AppointmentStatus::Pending,
        series_id: Some(series.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailPoint, MemStore};
    use chrono::{Datelike, Duration};
    use model::{
        AppointmentQueryBuilder, AppointmentSort, OriginFilter, SeriesQueryBuilder, Weekday,
        WeeklySchedule, SERVICES,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(s: &str) -> TimeOfDay {
        TimeOfDay::parse(s).unwrap()
    }

    fn manager() -> SchedulingManager<MemStore> {
        SchedulingManager::new(MemStore::new())
    }

    fn single(date_: NaiveDate, time_: &str) -> NewAppointment {
        NewAppointment {
            name: "Alice".into(),
            email: "alice@example.com".into(),
            phone: "5512345678".into(),
            date: date_,
            time: time(time_),
            service: SERVICES[0].into(),
            message: Some("first session".into()),
        }
    }

    fn mon_wed_series() -> NewSeries {
        NewSeries {
            name: "Bob".into(),
            email: "bob@example.com".into(),
            phone: "5587654321".into(),
            service: SERVICES[1].into(),
            message: None,
            start_date: date(2025, 3, 3),
            end_date: Some(date(2025, 3, 14)),
            schedule: WeeklySchedule::new()
                .set(Weekday::Monday, time("09:00"))
                .set(Weekday::Wednesday, time("10:00")),
        }
    }

    async fn seed_slot(manager: &SchedulingManager<MemStore>, date_: NaiveDate, time_: &str) {
        manager
            .store()
            .insert_appointment(AppointmentInsert {
                name: "Taken".into(),
                email: "taken@example.com".into(),
                phone: "5500000000".into(),
                date: date_,
                time: time(time_),
                service: SERVICES[0].into(),
                message: None,
                status: AppointmentStatus::Pending,
                series_id: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_and_get_single_appointment() {
        let manager = manager();
        let created = manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap();
        assert_eq!(created.status, AppointmentStatus::Pending);
        assert_eq!(created.series_id, None);

        let fetched = manager.get_appointment(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn single_create_rejects_taken_slot_under_enforce() {
        let manager = manager();
        manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap();

        let err = manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn admin_policy_allows_double_booking() {
        let manager =
            SchedulingManager::with_policy(MemStore::new(), ConflictPolicy::AllowDoubleBooking);
        manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap();
        manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap();

        let page = manager
            .list_appointments(AppointmentQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn update_rejects_occupied_slot_but_allows_own() {
        let manager = manager();
        let first = manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap();
        let second = manager
            .create_appointment(single(date(2025, 3, 4), "12:00"))
            .await
            .unwrap();

        let mut update = AppointmentUpdate {
            id: second.id,
            name: second.name.clone(),
            email: second.email.clone(),
            phone: second.phone.clone(),
            date: second.date,
            time: first.time,
            service: second.service.clone(),
            message: None,
        };
        let err = manager.update_appointment(update.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // keeping its own slot is not a conflict with itself
        update.time = second.time;
        update.name = "Renamed".into();
        let updated = manager.update_appointment(update).await.unwrap();
        assert_eq!(updated.name, "Renamed");
    }

    #[tokio::test]
    async fn delete_single_appointment() {
        let manager = manager();
        let created = manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap();
        manager.delete_appointment(created.id).await.unwrap();
        let err = manager.get_appointment(created.id).await.unwrap_err();
        assert_eq!(err, Error::NotFound);
    }

    #[tokio::test]
    async fn booked_times_lists_taken_slots() {
        let manager = manager();
        manager
            .create_appointment(single(date(2025, 3, 4), "11:00"))
            .await
            .unwrap();
        manager
            .create_appointment(single(date(2025, 3, 4), "13:00"))
            .await
            .unwrap();
        manager
            .create_appointment(single(date(2025, 3, 5), "11:00"))
            .await
            .unwrap();

        let times = manager.booked_times(date(2025, 3, 4)).await.unwrap();
        assert_eq!(times, vec![time("11:00"), time("13:00")]);
    }

    #[tokio::test]
    async fn listing_paginates_filters_and_sorts() {
        let manager = manager();
        for day in 1..=5 {
            manager
                .create_appointment(single(date(2025, 3, day), "11:00"))
                .await
                .unwrap();
        }
        manager.create_series(mon_wed_series()).await.unwrap();

        let singles = manager
            .list_appointments(
                AppointmentQueryBuilder::default()
                    .filter(OriginFilter::Single)
                    .sort_by(AppointmentSort::Date)
                    .desc(false)
                    .limit(3i64)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(singles.total, 5);
        assert_eq!(singles.data.len(), 3);
        assert_eq!(singles.data[0].date, date(2025, 3, 1));
        assert!(singles.data.iter().all(|a| a.series_id.is_none()));

        let from_series = manager
            .list_appointments(
                AppointmentQueryBuilder::default()
                    .filter(OriginFilter::Series)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(from_series.total, 4);
        assert!(from_series.data.iter().all(|a| a.series_id.is_some()));

        let second_page = manager
            .list_appointments(
                AppointmentQueryBuilder::default()
                    .filter(OriginFilter::Single)
                    .desc(false)
                    .limit(3i64)
                    .offset(3i64)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second_page.data.len(), 2);
    }

    #[tokio::test]
    async fn series_create_expands_two_weeks() {
        let manager = manager();
        let created = manager.create_series(mon_wed_series()).await.unwrap();
        assert!(created.series.is_active);
        assert_eq!(created.days.len(), 2);

        let page = manager
            .list_appointments(
                AppointmentQueryBuilder::default()
                    .desc(false)
                    .limit(20i64)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        let slots: Vec<_> = page
            .data
            .iter()
            .map(|a| (a.date, a.time.short()))
            .collect();
        assert_eq!(
            slots,
            vec![
                (date(2025, 3, 3), "09:00".to_string()),
                (date(2025, 3, 5), "10:00".to_string()),
                (date(2025, 3, 10), "09:00".to_string()),
                (date(2025, 3, 12), "10:00".to_string()),
            ]
        );
        assert!(page
            .data
            .iter()
            .all(|a| a.series_id == Some(created.series.id)));
    }

    #[tokio::test]
    async fn open_ended_series_expands_to_default_horizon() {
        let manager = manager();
        let mut series = mon_wed_series();
        series.end_date = None;
        let created = manager.create_series(series).await.unwrap();
        assert_eq!(created.series.end_date, None);

        let page = manager
            .list_appointments(
                AppointmentQueryBuilder::default().limit(200i64).build().unwrap(),
            )
            .await
            .unwrap();
        // 12 weeks of mondays and wednesdays, plus the starting monday's week
        assert_eq!(page.total, 25);
    }

    #[tokio::test]
    async fn series_create_reports_conflict_sample() {
        let manager = manager();
        seed_slot(&manager, date(2025, 3, 5), "10:00:00").await;

        let err = manager.create_series(mon_wed_series()).await.unwrap_err();
        match err {
            Error::Conflict(info) => {
                assert_eq!(info.total, 1);
                assert!(!info.truncated());
                assert_eq!(
                    info.samples,
                    vec![Occurrence {
                        date: date(2025, 3, 5),
                        time: time("10:00"),
                    }]
                );
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn conflict_sample_is_truncated_to_three() {
        let manager = manager();
        for day in [3, 5, 10, 12] {
            let t = if day == 3 || day == 10 { "09:00" } else { "10:00" };
            seed_slot(&manager, date(2025, 3, day), t).await;
        }

        let err = manager.create_series(mon_wed_series()).await.unwrap_err();
        match err {
            Error::Conflict(info) => {
                assert_eq!(info.total, 4);
                assert_eq!(info.samples.len(), 3);
                assert!(info.truncated());
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn editing_a_series_never_conflicts_with_itself() {
        let manager = manager();
        let today = today();
        let end = today + Duration::days(13);
        // every weekday booked so the upcoming two weeks are full
        let schedule = Weekday::ALL
            .into_iter()
            .fold(WeeklySchedule::new(), |s, d| s.set(d, time("09:00")));

        let series = NewSeries {
            start_date: today,
            end_date: Some(end),
            schedule: schedule.clone(),
            ..mon_wed_series()
        };
        let created = manager.create_series(series).await.unwrap();

        // a second series over the same slots does conflict
        let rival = NewSeries {
            start_date: today,
            end_date: Some(end),
            schedule: schedule.clone(),
            ..mon_wed_series()
        };
        assert!(matches!(
            manager.create_series(rival).await.unwrap_err(),
            Error::Conflict(_)
        ));

        // but re-submitting the same schedule for the series itself does not
        let update = ScheduleUpdate {
            series_id: created.series.id,
            start_date: today,
            end_date: end,
            schedule,
        };
        manager.update_series_schedule(update).await.unwrap();
    }

    #[tokio::test]
    async fn selected_day_without_time_fails_before_any_write() {
        let manager = manager();
        let mut series = mon_wed_series();
        series.schedule = WeeklySchedule::new().select(Weekday::Tuesday);

        let err = manager.create_series(series).await.unwrap_err();
        assert_eq!(err, Error::Validation("Missing time for tuesday".into()));

        let page = manager.list_series(SeriesQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn days_insert_failure_rolls_back_the_header() {
        let manager = manager();
        manager.store().fail_once(FailPoint::InsertSeriesDays);

        let err = manager.create_series(mon_wed_series()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        let page = manager.list_series(SeriesQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        let appointments = manager
            .list_appointments(AppointmentQuery::default())
            .await
            .unwrap();
        assert_eq!(appointments.total, 0);
    }

    #[tokio::test]
    async fn failed_compensation_surfaces_partial_write() {
        let manager = manager();
        manager.store().fail_once(FailPoint::InsertSeriesDays);
        manager.store().fail_once(FailPoint::DeleteSeries);

        let err = manager.create_series(mon_wed_series()).await.unwrap_err();
        match err {
            Error::PartialWrite {
                step, compensated, ..
            } => {
                assert_eq!(step, "series days insert");
                assert!(!compensated);
            }
            other => panic!("expected partial write, got {:?}", other),
        }

        // the compensating delete failed, so the orphaned header remains
        let page = manager.list_series(SeriesQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn appointments_insert_failure_rolls_back_the_header() {
        let manager = manager();
        manager.store().fail_once(FailPoint::InsertAppointments);

        let err = manager.create_series(mon_wed_series()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        let page = manager.list_series(SeriesQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn deleting_a_series_removes_its_appointments() {
        let manager = manager();
        let created = manager.create_series(mon_wed_series()).await.unwrap();

        manager.delete_series(created.series.id).await.unwrap();

        assert_eq!(
            manager.get_series(created.series.id).await.unwrap_err(),
            Error::NotFound
        );
        let page = manager
            .list_appointments(AppointmentQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn series_delete_keeps_header_when_appointment_delete_fails() {
        let manager = manager();
        let created = manager.create_series(mon_wed_series()).await.unwrap();
        manager
            .store()
            .fail_once(FailPoint::DeleteSeriesAppointments);

        let err = manager.delete_series(created.series.id).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(manager.get_series(created.series.id).await.is_ok());
    }

    #[tokio::test]
    async fn set_series_active_toggles_only_the_flag() {
        let manager = manager();
        let created = manager.create_series(mon_wed_series()).await.unwrap();

        let paused = manager
            .set_series_active(created.series.id, false)
            .await
            .unwrap();
        assert!(!paused.is_active);
        assert_eq!(paused.start_date, created.series.start_date);

        let resumed = manager
            .set_series_active(created.series.id, true)
            .await
            .unwrap();
        assert!(resumed.is_active);
    }

    #[tokio::test]
    async fn schedule_update_preserves_past_appointments() {
        let manager = manager();
        let today = today();
        let start = today - Duration::weeks(2);
        let end = today + Duration::weeks(2);

        let series = NewSeries {
            start_date: start,
            end_date: Some(end),
            schedule: WeeklySchedule::new().set(Weekday::Monday, time("09:00")),
            ..mon_wed_series()
        };
        let created = manager.create_series(series).await.unwrap();

        let update = ScheduleUpdate {
            series_id: created.series.id,
            start_date: start,
            end_date: end,
            schedule: WeeklySchedule::new().set(Weekday::Wednesday, time("10:00")),
        };
        manager.update_series_schedule(update).await.unwrap();

        let page = manager
            .list_appointments(
                AppointmentQueryBuilder::default().limit(100i64).build().unwrap(),
            )
            .await
            .unwrap();
        for appointment in &page.data {
            if appointment.date < today {
                assert_eq!(appointment.date.weekday(), chrono::Weekday::Mon);
                assert_eq!(appointment.time, time("09:00"));
            } else {
                assert_eq!(appointment.date.weekday(), chrono::Weekday::Wed);
                assert_eq!(appointment.time, time("10:00"));
            }
        }
    }

    #[tokio::test]
    async fn schedule_update_fully_in_the_past_generates_nothing() {
        let manager = manager();
        let today = today();
        let start = today - Duration::weeks(4);
        let end = today - Duration::weeks(2);

        let series = NewSeries {
            start_date: start,
            end_date: Some(end),
            schedule: WeeklySchedule::new().set(Weekday::Monday, time("09:00")),
            ..mon_wed_series()
        };
        let created = manager.create_series(series).await.unwrap();
        let before = manager
            .list_appointments(AppointmentQueryBuilder::default().limit(100i64).build().unwrap())
            .await
            .unwrap();

        let update = ScheduleUpdate {
            series_id: created.series.id,
            start_date: start,
            end_date: end,
            schedule: WeeklySchedule::new().set(Weekday::Friday, time("12:00")),
        };
        let updated = manager.update_series_schedule(update).await.unwrap();

        // days replaced, past rows untouched, nothing regenerated
        assert_eq!(updated.days.len(), 1);
        assert_eq!(updated.days[0].day_of_week, Weekday::Friday);
        let after = manager
            .list_appointments(AppointmentQueryBuilder::default().limit(100i64).build().unwrap())
            .await
            .unwrap();
        assert_eq!(after.total, before.total);
    }

    #[tokio::test]
    async fn updating_an_unknown_series_is_not_found() {
        let manager = manager();
        let update = ScheduleUpdate {
            series_id: Uuid::new_v4(),
            start_date: date(2025, 3, 3),
            end_date: date(2025, 3, 14),
            schedule: WeeklySchedule::new().set(Weekday::Monday, time("09:00")),
        };
        assert_eq!(
            manager.update_series_schedule(update).await.unwrap_err(),
            Error::NotFound
        );
    }

    #[tokio::test]
    async fn series_listing_sorts_and_paginates() {
        let manager = manager();
        for (name, start) in [("Ana", 3), ("Bruno", 10), ("Carla", 17)] {
            let series = NewSeries {
                name: name.into(),
                start_date: date(2025, 3, start),
                end_date: Some(date(2025, 3, start + 4)),
                schedule: WeeklySchedule::new().set(Weekday::Monday, time("09:00")),
                ..mon_wed_series()
            };
            manager.create_series(series).await.unwrap();
        }

        let page = manager
            .list_series(
                SeriesQueryBuilder::default()
                    .sort_by(model::SeriesSort::StartDate)
                    .desc(false)
                    .limit(2i64)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].series.name, "Ana");
        assert_eq!(page.data[1].series.name, "Bruno");
    }
}
