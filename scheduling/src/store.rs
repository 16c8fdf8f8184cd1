use async_trait::async_trait;
use chrono::NaiveDate;
use model::{
    Appointment, AppointmentQuery, AppointmentSeries, AppointmentStatus, AppointmentUpdate, Error,
    Page, SeriesQuery, SeriesWithDays, TimeOfDay, Weekday,
};
use uuid::Uuid;

/// Row payload for inserting an appointment. Series-generated rows carry the
/// owning series id; one-off bookings leave it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentInsert {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub service: String,
    pub message: Option<String>,
    pub status: AppointmentStatus,
    pub series_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesInsert {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub service: String,
    pub message: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

/// Minimal projection the conflict checker works on.
#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct BookedSlot {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub series_id: Option<Uuid>,
}

/// Row-oriented storage contract over the three booking collections.
///
/// Implemented by [`crate::PgStore`] for Postgres and by the in-memory store
/// used in tests, so the writers and the conflict checker stay testable
/// without a database.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_appointment(&self, row: AppointmentInsert) -> Result<Appointment, Error>;
    async fn insert_appointments(&self, rows: Vec<AppointmentInsert>) -> Result<(), Error>;
    async fn update_appointment(&self, update: &AppointmentUpdate) -> Result<Appointment, Error>;
    async fn delete_appointment(&self, id: Uuid) -> Result<(), Error>;
    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, Error>;
    async fn list_appointments(&self, query: &AppointmentQuery)
        -> Result<Page<Appointment>, Error>;

    /// Booked slots with `date` in the inclusive range. With `exclude_series`
    /// set, rows of that series are dropped (rows with no series reference or
    /// a different one are kept).
    async fn booked_slots_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        exclude_series: Option<Uuid>,
    ) -> Result<Vec<BookedSlot>, Error>;

    /// Id of an appointment already holding `(date, time)`, ignoring
    /// `exclude` (the appointment being edited).
    async fn slot_holder(
        &self,
        date: NaiveDate,
        time: TimeOfDay,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, Error>;

    async fn booked_times_on(&self, date: NaiveDate) -> Result<Vec<TimeOfDay>, Error>;

    async fn insert_series(&self, row: SeriesInsert) -> Result<AppointmentSeries, Error>;
    async fn get_series(&self, id: Uuid) -> Result<SeriesWithDays, Error>;
    async fn list_series(&self, query: &SeriesQuery) -> Result<Page<SeriesWithDays>, Error>;
    async fn update_series_range(
        &self,
        id: Uuid,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<(), Error>;
    async fn set_series_active(&self, id: Uuid, active: bool)
        -> Result<AppointmentSeries, Error>;

    /// Delete the header; day rows and remaining appointment rows of the
    /// series go with it (FK cascade in Postgres, mirrored in memory).
    async fn delete_series(&self, id: Uuid) -> Result<(), Error>;
    async fn delete_series_days(&self, id: Uuid) -> Result<(), Error>;
    async fn insert_series_days(
        &self,
        id: Uuid,
        days: Vec<(Weekday, TimeOfDay)>,
    ) -> Result<(), Error>;

    /// Delete the series's appointments, all of them or only those with
    /// `date >= from`. Returns how many rows were removed.
    async fn delete_series_appointments(
        &self,
        id: Uuid,
        from: Option<NaiveDate>,
    ) -> Result<u64, Error>;
}
