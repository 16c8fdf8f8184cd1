use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use model::{
    Appointment, AppointmentQuery, AppointmentSeries, AppointmentSort, AppointmentUpdate, Error,
    OriginFilter, Page, SeriesDay, SeriesQuery, SeriesSort, SeriesWithDays, TimeOfDay, Weekday,
};
use uuid::Uuid;

use crate::store::{AppointmentInsert, BookedSlot, BookingStore, SeriesInsert};

/// Store operations that can be made to fail once, for partial-write tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertSeries,
    InsertSeriesDays,
    InsertAppointments,
    DeleteSeries,
    DeleteSeriesAppointments,
}

/// In-memory [`BookingStore`] with the same observable semantics as the
/// Postgres store, including the cascade on series deletion.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    appointments: Vec<Appointment>,
    series: Vec<AppointmentSeries>,
    days: Vec<SeriesDay>,
    fail_queue: Vec<FailPoint>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a single-shot failure for the next call hitting `point`. Armed
    /// points form a queue, so a step failure and the failure of its
    /// compensating delete can both be staged.
    pub fn fail_once(&self, point: FailPoint) {
        self.inner.lock().unwrap().fail_queue.push(point);
    }
}

fn trip(inner: &mut Inner, point: FailPoint) -> Result<(), Error> {
    if inner.fail_queue.first() == Some(&point) {
        inner.fail_queue.remove(0);
        return Err(Error::Storage(format!("injected failure at {:?}", point)));
    }
    Ok(())
}

fn page_bounds(limit: i64, offset: i64) -> (usize, usize) {
    (offset.max(0) as usize, limit.max(0) as usize)
}

#[async_trait]
impl BookingStore for MemStore {
    async fn insert_appointment(&self, row: AppointmentInsert) -> Result<Appointment, Error> {
        let mut inner = self.inner.lock().unwrap();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            name: row.name,
            email: row.email,
            phone: row.phone,
            date: row.date,
            time: row.time,
            service: row.service,
            message: row.message,
            status: row.status,
            series_id: row.series_id,
            created_at: Utc::now(),
        };
        inner.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn insert_appointments(&self, rows: Vec<AppointmentInsert>) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        trip(&mut inner, FailPoint::InsertAppointments)?;
        for row in rows {
            let appointment = Appointment {
                id: Uuid::new_v4(),
                name: row.name,
                email: row.email,
                phone: row.phone,
                date: row.date,
                time: row.time,
                service: row.service,
                message: row.message,
                status: row.status,
                series_id: row.series_id,
                created_at: Utc::now(),
            };
            inner.appointments.push(appointment);
        }
        Ok(())
    }

    async fn update_appointment(&self, update: &AppointmentUpdate) -> Result<Appointment, Error> {
        let mut inner = self.inner.lock().unwrap();
        let appointment = inner
            .appointments
            .iter_mut()
            .find(|a| a.id == update.id)
            .ok_or(Error::NotFound)?;
        appointment.name = update.name.clone();
        appointment.email = update.email.clone();
        appointment.phone = update.phone.clone();
        appointment.date = update.date;
        appointment.time = update.time;
        appointment.service = update.service.clone();
        appointment.message = update.message.clone();
        Ok(appointment.clone())
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.appointments.len();
        inner.appointments.retain(|a| a.id != id);
        if inner.appointments.len() == before {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, Error> {
        let inner = self.inner.lock().unwrap();
        inner
            .appointments
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn list_appointments(
        &self,
        query: &AppointmentQuery,
    ) -> Result<Page<Appointment>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut data: Vec<Appointment> = inner
            .appointments
            .iter()
            .filter(|a| match query.filter {
                OriginFilter::All => true,
                OriginFilter::Single => a.series_id.is_none(),
                OriginFilter::Series => a.series_id.is_some(),
            })
            .cloned()
            .collect();
        let total = data.len() as i64;

        data.sort_by(|a, b| {
            let ordering = match query.sort_by {
                AppointmentSort::Name => a.name.cmp(&b.name),
                AppointmentSort::Email => a.email.cmp(&b.email),
                AppointmentSort::Date => a.date.cmp(&b.date).then(a.time.cmp(&b.time)),
                AppointmentSort::Time => a.time.cmp(&b.time),
                AppointmentSort::Service => a.service.cmp(&b.service),
            };
            if query.desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let (offset, limit) = page_bounds(query.limit, query.offset);
        let data = data.into_iter().skip(offset).take(limit).collect();
        Ok(Page { data, total })
    }

    async fn booked_slots_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        exclude_series: Option<Uuid>,
    ) -> Result<Vec<BookedSlot>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .appointments
            .iter()
            .filter(|a| a.date >= from && a.date <= to)
            .filter(|a| match (exclude_series, a.series_id) {
                (Some(excluded), Some(owner)) => owner != excluded,
                _ => true,
            })
            .map(|a| BookedSlot {
                date: a.date,
                time: a.time,
                series_id: a.series_id,
            })
            .collect())
    }

    async fn slot_holder(
        &self,
        date: NaiveDate,
        time: TimeOfDay,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .appointments
            .iter()
            .find(|a| a.date == date && a.time == time && Some(a.id) != exclude)
            .map(|a| a.id))
    }

    async fn booked_times_on(&self, date: NaiveDate) -> Result<Vec<TimeOfDay>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut times: Vec<TimeOfDay> = inner
            .appointments
            .iter()
            .filter(|a| a.date == date)
            .map(|a| a.time)
            .collect();
        times.sort();
        times.dedup();
        Ok(times)
    }

    async fn insert_series(&self, row: SeriesInsert) -> Result<AppointmentSeries, Error> {
        let mut inner = self.inner.lock().unwrap();
        trip(&mut inner, FailPoint::InsertSeries)?;
        let series = AppointmentSeries {
            id: Uuid::new_v4(),
            name: row.name,
            email: row.email,
            phone: row.phone,
            service: row.service,
            message: row.message,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            created_at: Utc::now(),
        };
        inner.series.push(series.clone());
        Ok(series)
    }

    async fn get_series(&self, id: Uuid) -> Result<SeriesWithDays, Error> {
        let inner = self.inner.lock().unwrap();
        let series = inner
            .series
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(Error::NotFound)?;
        let mut days: Vec<SeriesDay> = inner
            .days
            .iter()
            .filter(|d| d.series_id == id)
            .cloned()
            .collect();
        days.sort_by_key(|d| d.day_of_week.index());
        Ok(SeriesWithDays { series, days })
    }

    async fn list_series(&self, query: &SeriesQuery) -> Result<Page<SeriesWithDays>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut headers: Vec<AppointmentSeries> = inner.series.to_vec();
        let total = headers.len() as i64;

        headers.sort_by(|a, b| {
            let ordering = match query.sort_by {
                SeriesSort::Name => a.name.cmp(&b.name),
                SeriesSort::Service => a.service.cmp(&b.service),
                SeriesSort::StartDate => a.start_date.cmp(&b.start_date),
                SeriesSort::EndDate => a.end_date.cmp(&b.end_date),
                SeriesSort::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            if query.desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let (offset, limit) = page_bounds(query.limit, query.offset);
        let data = headers
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|series| {
                let mut days: Vec<SeriesDay> = inner
                    .days
                    .iter()
                    .filter(|d| d.series_id == series.id)
                    .cloned()
                    .collect();
                days.sort_by_key(|d| d.day_of_week.index());
                SeriesWithDays { series, days }
            })
            .collect();
        Ok(Page { data, total })
    }

    async fn update_series_range(
        &self,
        id: Uuid,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let series = inner
            .series
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(Error::NotFound)?;
        series.start_date = start;
        series.end_date = end;
        Ok(())
    }

    async fn set_series_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<AppointmentSeries, Error> {
        let mut inner = self.inner.lock().unwrap();
        let series = inner
            .series
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(Error::NotFound)?;
        series.is_active = active;
        Ok(series.clone())
    }

    async fn delete_series(&self, id: Uuid) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        trip(&mut inner, FailPoint::DeleteSeries)?;
        let before = inner.series.len();
        inner.series.retain(|s| s.id != id);
        if inner.series.len() == before {
            return Err(Error::NotFound);
        }
        // mirror the FK cascade of the Postgres schema
        inner.days.retain(|d| d.series_id != id);
        inner.appointments.retain(|a| a.series_id != Some(id));
        Ok(())
    }

    async fn delete_series_days(&self, id: Uuid) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.days.retain(|d| d.series_id != id);
        Ok(())
    }

    async fn insert_series_days(
        &self,
        id: Uuid,
        days: Vec<(Weekday, TimeOfDay)>,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        trip(&mut inner, FailPoint::InsertSeriesDays)?;
        for (day_of_week, time) in days {
            inner.days.push(SeriesDay {
                id: Uuid::new_v4(),
                series_id: id,
                day_of_week,
                time,
            });
        }
        Ok(())
    }

    async fn delete_series_appointments(
        &self,
        id: Uuid,
        from: Option<NaiveDate>,
    ) -> Result<u64, Error> {
        let mut inner = self.inner.lock().unwrap();
        trip(&mut inner, FailPoint::DeleteSeriesAppointments)?;
        let before = inner.appointments.len();
        inner.appointments.retain(|a| {
            a.series_id != Some(id) || from.map_or(false, |cutoff| a.date < cutoff)
        });
        Ok((before - inner.appointments.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn range_fetch_excludes_the_given_series_only() {
        let store = MemStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        let time = TimeOfDay::parse("10:00").unwrap();
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();

        for series_id in [None, Some(own), Some(other)] {
            store
                .insert_appointment(AppointmentInsert {
                    name: "x".into(),
                    email: "x@example.com".into(),
                    phone: "5500000000".into(),
                    date,
                    time,
                    service: "Individual therapy".into(),
                    message: None,
                    status: Default::default(),
                    series_id,
                })
                .await
                .unwrap();
        }

        let slots = store
            .booked_slots_in_range(date, date, Some(own))
            .await
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| s.series_id != Some(own)));
    }

    #[tokio::test]
    async fn future_only_delete_keeps_past_rows() {
        let store = MemStore::new();
        let series = Uuid::new_v4();
        // no FK enforcement in memory, rows can reference any id
        for day in [3, 10, 17] {
            store
                .insert_appointment(AppointmentInsert {
                    name: "x".into(),
                    email: "x@example.com".into(),
                    phone: "5500000000".into(),
                    date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                    time: TimeOfDay::parse("09:00").unwrap(),
                    service: "Individual therapy".into(),
                    message: None,
                    status: Default::default(),
                    series_id: Some(series),
                })
                .await
                .unwrap();
        }

        let removed = store
            .delete_series_appointments(
                series,
                Some(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let remaining = store
            .booked_slots_in_range(
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            remaining[0].date,
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
        );
    }
}
