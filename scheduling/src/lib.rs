mod conflict;
mod manager;
#[cfg(any(test, feature = "test_utils"))]
mod memory;
mod pg;
mod saga;
mod store;

use async_trait::async_trait;
use chrono::NaiveDate;
use model::{
    Appointment, AppointmentQuery, AppointmentSeries, AppointmentUpdate, Error, NewAppointment,
    NewSeries, Page, ScheduleUpdate, SeriesQuery, SeriesWithDays, TimeOfDay,
};
use uuid::Uuid;

#[cfg(any(test, feature = "test_utils"))]
pub use memory::{FailPoint, MemStore};
pub use pg::PgStore;
pub use store::{AppointmentInsert, BookedSlot, BookingStore, SeriesInsert};

/// Whether creating a one-off appointment enforces the slot conflict check.
///
/// The administrative path may deliberately double-book to block out a slot;
/// updates always enforce the check regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Enforce,
    AllowDoubleBooking,
}

#[derive(Debug)]
pub struct SchedulingManager<S> {
    store: S,
    policy: ConflictPolicy,
}

impl<S: BookingStore> SchedulingManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: ConflictPolicy::Enforce,
        }
    }

    pub fn with_policy(store: S, policy: ConflictPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
pub trait Appointments {
    /// book a one-off appointment
    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Appointment, Error>;
    /// update every mutable field, rejecting a move onto an occupied slot
    async fn update_appointment(&self, update: AppointmentUpdate) -> Result<Appointment, Error>;
    /// delete by id, no cascade
    async fn delete_appointment(&self, id: Uuid) -> Result<(), Error>;
    /// get an appointment by id
    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, Error>;
    /// paginated, filtered, sorted listing with a total count
    async fn list_appointments(&self, query: AppointmentQuery) -> Result<Page<Appointment>, Error>;
    /// times already taken on a date, for the public availability filter
    async fn booked_times(&self, date: NaiveDate) -> Result<Vec<TimeOfDay>, Error>;
}

#[async_trait]
pub trait SeriesScheduling {
    /// create a series with its days and expanded appointments, atomically
    async fn create_series(&self, series: NewSeries) -> Result<SeriesWithDays, Error>;
    /// replace a series's schedule, regenerating future appointments only
    async fn update_series_schedule(&self, update: ScheduleUpdate) -> Result<SeriesWithDays, Error>;
    /// toggle the active flag, independent of schedule mutation
    async fn set_series_active(&self, id: Uuid, active: bool) -> Result<AppointmentSeries, Error>;
    /// delete dependent appointments first, then the header (fail-fast)
    async fn delete_series(&self, id: Uuid) -> Result<(), Error>;
    /// get a series with its days
    async fn get_series(&self, id: Uuid) -> Result<SeriesWithDays, Error>;
    /// paginated, sorted listing with a total count
    async fn list_series(&self, query: SeriesQuery) -> Result<Page<SeriesWithDays>, Error>;
}
