use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{
    error::BoxDynError,
    postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef},
    Decode, Encode, Postgres, Type,
};
use uuid::Uuid;

use crate::Error;

/// Bookable services, by display title. Payload validation checks membership.
pub const SERVICES: &[&str] = &["Individual therapy", "Couples therapy", "Group therapy"];

/// Time slots offered to the public booking form. The administrative path is
/// not restricted to these.
pub const TIME_SLOTS: &[&str] = &[
    "10:00", "11:00", "12:00", "13:00", "14:00", "15:00", "16:00", "17:00",
];

/// Business weekdays a series can recur on. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
        }
    }

    /// Ordinal used to index the fixed slots of a [`WeeklySchedule`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Weekends are not bookable and map to `None`.
    pub fn from_chrono(day: chrono::Weekday) -> Option<Weekday> {
        match day {
            chrono::Weekday::Mon => Some(Weekday::Monday),
            chrono::Weekday::Tue => Some(Weekday::Tuesday),
            chrono::Weekday::Wed => Some(Weekday::Wednesday),
            chrono::Weekday::Thu => Some(Weekday::Thursday),
            chrono::Weekday::Fri => Some(Weekday::Friday),
            _ => None,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monday" => Ok(Weekday::Monday),
            "tuesday" => Ok(Weekday::Tuesday),
            "wednesday" => Ok(Weekday::Wednesday),
            "thursday" => Ok(Weekday::Thursday),
            "friday" => Ok(Weekday::Friday),
            _ => Err(Error::Validation(format!("`{}` is not a valid weekday", s))),
        }
    }
}

/// Single internal time-of-day representation.
///
/// Parses both the short form (`"10:00"`) and the seconds-suffixed storage
/// form (`"10:00:00"`); equal wall-clock times compare equal regardless of
/// which form they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn parse(value: &str) -> Result<Self, Error> {
        NaiveTime::parse_from_str(value, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
            .map(TimeOfDay)
            .map_err(|_| Error::Validation(format!("`{}` is not a valid time", value)))
    }

    /// Seconds-suffixed form written to storage, e.g. `10:00:00`.
    pub fn storage(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }

    /// Short display form, e.g. `10:00`.
    pub fn short(&self) -> String {
        self.0.format("%H:%M").to_string()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        TimeOfDay(t)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeOfDay::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.storage())
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TimeOfDay::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Type<Postgres> for TimeOfDay {
    fn type_info() -> PgTypeInfo {
        <NaiveTime as Type<Postgres>>::type_info()
    }
}

impl Encode<'_, Postgres> for TimeOfDay {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> sqlx::encode::IsNull {
        self.0.encode_by_ref(buf)
    }
}

impl<'r> Decode<'r, Postgres> for TimeOfDay {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        Ok(TimeOfDay(NaiveTime::decode(value)?))
    }
}

/// Weekly recurrence pattern: which weekdays are selected and at what time.
///
/// Fixed five-slot structure so that "selected but no time yet" is a real,
/// detectable state during interactive schedule editing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    selected: [bool; 5],
    times: [Option<TimeOfDay>; 5],
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `day` and configure its time.
    pub fn set(mut self, day: Weekday, time: TimeOfDay) -> Self {
        self.selected[day.index()] = true;
        self.times[day.index()] = Some(time);
        self
    }

    /// Select `day` without a time (partial configuration).
    pub fn select(mut self, day: Weekday) -> Self {
        self.selected[day.index()] = true;
        self
    }

    pub fn is_selected(&self, day: Weekday) -> bool {
        self.selected[day.index()]
    }

    /// Time for `day`, only if the day is selected.
    pub fn time_for(&self, day: Weekday) -> Option<TimeOfDay> {
        if self.selected[day.index()] {
            self.times[day.index()]
        } else {
            None
        }
    }

    pub fn selected_days(&self) -> Vec<Weekday> {
        Weekday::ALL
            .into_iter()
            .filter(|d| self.is_selected(*d))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.selected.iter().any(|s| *s)
    }

    /// Selected days that have a configured time, in weekday order.
    pub fn entries(&self) -> impl Iterator<Item = (Weekday, TimeOfDay)> + '_ {
        Weekday::ALL
            .into_iter()
            .filter_map(|d| self.time_for(d).map(|t| (d, t)))
    }

    /// Reject empty selections and selected days without a configured time.
    pub fn validate(&self) -> Result<(), Error> {
        if self.is_empty() {
            return Err(Error::Validation("Select at least one day".into()));
        }
        for day in self.selected_days() {
            if self.time_for(day).is_none() {
                return Err(Error::Validation(format!("Missing time for {}", day)));
            }
        }
        Ok(())
    }
}

/// One concrete slot implied by a series definition. Ephemeral: used for
/// conflict checking and appointment-row generation, never persisted itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

impl Occurrence {
    /// Normalized comparison key, `YYYY-MM-DD|HH:MM:SS`.
    pub fn slot_key(&self) -> String {
        format!("{}|{}", self.date, self.time.storage())
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub service: String,
    pub message: Option<String>,
    pub status: AppointmentStatus,
    /// Back-reference to the owning series; `None` for one-off bookings.
    pub series_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AppointmentSeries {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub service: String,
    pub message: Option<String>,
    pub start_date: NaiveDate,
    /// `None` means open-ended; callers expand up to a default horizon.
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeriesDay {
    pub id: Uuid,
    pub series_id: Uuid,
    pub day_of_week: Weekday,
    pub time: TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesWithDays {
    pub series: AppointmentSeries,
    pub days: Vec<SeriesDay>,
}

impl SeriesWithDays {
    pub fn schedule(&self) -> WeeklySchedule {
        self.days
            .iter()
            .fold(WeeklySchedule::new(), |s, d| s.set(d.day_of_week, d.time))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub service: String,
    pub message: Option<String>,
}

impl NewAppointment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_contact(&self.name, &self.email, &self.phone, &self.service)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentUpdate {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub service: String,
    pub message: Option<String>,
}

impl AppointmentUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_contact(&self.name, &self.email, &self.phone, &self.service)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSeries {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub service: String,
    pub message: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub schedule: WeeklySchedule,
}

impl NewSeries {
    pub fn validate(&self) -> Result<(), Error> {
        validate_contact(&self.name, &self.email, &self.phone, &self.service)?;
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(Error::Validation(
                    "The end date must be on or after the start date".into(),
                ));
            }
        }
        self.schedule.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub series_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub schedule: WeeklySchedule,
}

impl ScheduleUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.end_date < self.start_date {
            return Err(Error::Validation(
                "The end date must be on or after the start date".into(),
            ));
        }
        self.schedule.validate()
    }
}

fn validate_contact(name: &str, email: &str, phone: &str, service: &str) -> Result<(), Error> {
    if name.trim().len() < 2 {
        return Err(Error::Validation("A name is required".into()));
    }
    if !email.contains('@') || !email.contains('.') {
        return Err(Error::Validation("Invalid email address".into()));
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if !(10..=15).contains(&digits) {
        return Err(Error::Validation(
            "Invalid phone number, 10 digits are required".into(),
        ));
    }
    if !SERVICES.contains(&service) {
        return Err(Error::Validation(format!("Unknown service `{}`", service)));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OriginFilter {
    #[default]
    All,
    /// One-off bookings only (no series back-reference).
    Single,
    /// Series-generated bookings only.
    Series,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentSort {
    Name,
    Email,
    #[default]
    Date,
    Time,
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSort {
    Name,
    Service,
    StartDate,
    EndDate,
    #[default]
    CreatedAt,
}

#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct AppointmentQuery {
    #[builder(default = "10")]
    pub limit: i64,
    #[builder(default)]
    pub offset: i64,
    #[builder(default)]
    pub filter: OriginFilter,
    #[builder(default)]
    pub sort_by: AppointmentSort,
    #[builder(default = "true")]
    pub desc: bool,
}

impl AppointmentQueryBuilder {
    fn validate(&self) -> Result<(), String> {
        validate_paging(self.limit, self.offset)
    }
}

impl Default for AppointmentQuery {
    fn default() -> Self {
        AppointmentQueryBuilder::default().build().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SeriesQuery {
    #[builder(default = "10")]
    pub limit: i64,
    #[builder(default)]
    pub offset: i64,
    #[builder(default)]
    pub sort_by: SeriesSort,
    #[builder(default = "true")]
    pub desc: bool,
}

impl SeriesQueryBuilder {
    fn validate(&self) -> Result<(), String> {
        validate_paging(self.limit, self.offset)
    }
}

impl Default for SeriesQuery {
    fn default() -> Self {
        SeriesQueryBuilder::default().build().unwrap()
    }
}

fn validate_paging(limit: Option<i64>, offset: Option<i64>) -> Result<(), String> {
    if limit.map_or(false, |l| l < 0) {
        return Err("limit must be non-negative".into());
    }
    if offset.map_or(false, |o| o < 0) {
        return Err("offset must be non-negative".into());
    }
    Ok(())
}

/// One page of results plus the total matching count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
}
