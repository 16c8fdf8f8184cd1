use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use model::{
    Appointment, AppointmentQuery, AppointmentSeries, AppointmentSort, AppointmentUpdate,
    DbConfig, Error, OriginFilter, Page, SeriesDay, SeriesQuery, SeriesSort, SeriesWithDays,
    TimeOfDay, Weekday,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{AppointmentInsert, BookedSlot, BookingStore, SeriesInsert};

/// Postgres-backed [`BookingStore`]. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url())
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn appointment_sort_column(sort: AppointmentSort) -> &'static str {
    match sort {
        AppointmentSort::Name => "name",
        AppointmentSort::Email => "email",
        AppointmentSort::Date => "date",
        AppointmentSort::Time => "time",
        AppointmentSort::Service => "service",
    }
}

fn series_sort_column(sort: SeriesSort) -> &'static str {
    match sort {
        SeriesSort::Name => "name",
        SeriesSort::Service => "service",
        SeriesSort::StartDate => "start_date",
        SeriesSort::EndDate => "end_date",
        SeriesSort::CreatedAt => "created_at",
    }
}

fn origin_clause(filter: OriginFilter) -> &'static str {
    match filter {
        OriginFilter::All => "",
        OriginFilter::Single => "WHERE series_id IS NULL",
        OriginFilter::Series => "WHERE series_id IS NOT NULL",
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_appointment(&self, row: AppointmentInsert) -> Result<Appointment, Error> {
        let appointment = sqlx::query_as(
            "INSERT INTO appointments (name, email, phone, date, time, service, message, status, series_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(row.name)
        .bind(row.email)
        .bind(row.phone)
        .bind(row.date)
        .bind(row.time)
        .bind(row.service)
        .bind(row.message)
        .bind(row.status)
        .bind(row.series_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(appointment)
    }

    async fn insert_appointments(&self, rows: Vec<AppointmentInsert>) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO appointments (name, email, phone, date, time, service, message, status, series_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(row.name)
            .bind(row.email)
            .bind(row.phone)
            .bind(row.date)
            .bind(row.time)
            .bind(row.service)
            .bind(row.message)
            .bind(row.status)
            .bind(row.series_id)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_appointment(&self, update: &AppointmentUpdate) -> Result<Appointment, Error> {
        let appointment = sqlx::query_as(
            "UPDATE appointments SET name = $1, email = $2, phone = $3, date = $4, time = $5, \
             service = $6, message = $7 WHERE id = $8 RETURNING *",
        )
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(update.date)
        .bind(update.time)
        .bind(&update.service)
        .bind(&update.message)
        .bind(update.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(appointment)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, Error> {
        let appointment = sqlx::query_as("SELECT * FROM appointments WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(appointment)
    }

    async fn list_appointments(
        &self,
        query: &AppointmentQuery,
    ) -> Result<Page<Appointment>, Error> {
        let clause = origin_clause(query.filter);
        let direction = if query.desc { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT * FROM appointments {} ORDER BY {} {} LIMIT $1 OFFSET $2",
            clause,
            appointment_sort_column(query.sort_by),
            direction,
        );
        // negative LIMIT/OFFSET is a Postgres error; treat it as zero, like
        // the in-memory store does
        let data = sqlx::query_as(&sql)
            .bind(query.limit.max(0))
            .bind(query.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM appointments {}", clause);
        let (total,): (i64,) = sqlx::query_as(&count_sql).fetch_one(&self.pool).await?;
        Ok(Page { data, total })
    }

    async fn booked_slots_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        exclude_series: Option<Uuid>,
    ) -> Result<Vec<BookedSlot>, Error> {
        let slots = match exclude_series {
            Some(excluded) => {
                sqlx::query_as(
                    "SELECT date, time, series_id FROM appointments \
                     WHERE date >= $1 AND date <= $2 AND (series_id IS NULL OR series_id <> $3)",
                )
                .bind(from)
                .bind(to)
                .bind(excluded)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT date, time, series_id FROM appointments \
                     WHERE date >= $1 AND date <= $2",
                )
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(slots)
    }

    async fn slot_holder(
        &self,
        date: NaiveDate,
        time: TimeOfDay,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, Error> {
        let holder: Option<(Uuid,)> = match exclude {
            Some(excluded) => {
                sqlx::query_as(
                    "SELECT id FROM appointments WHERE date = $1 AND time = $2 AND id <> $3 LIMIT 1",
                )
                .bind(date)
                .bind(time)
                .bind(excluded)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT id FROM appointments WHERE date = $1 AND time = $2 LIMIT 1")
                    .bind(date)
                    .bind(time)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(holder.map(|(id,)| id))
    }

    async fn booked_times_on(&self, date: NaiveDate) -> Result<Vec<TimeOfDay>, Error> {
        let times: Vec<(TimeOfDay,)> =
            sqlx::query_as("SELECT DISTINCT time FROM appointments WHERE date = $1 ORDER BY time")
                .bind(date)
                .fetch_all(&self.pool)
                .await?;
        Ok(times.into_iter().map(|(time,)| time).collect())
    }

    async fn insert_series(&self, row: SeriesInsert) -> Result<AppointmentSeries, Error> {
        let series = sqlx::query_as(
            "INSERT INTO appointment_series (name, email, phone, service, message, start_date, end_date, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(row.name)
        .bind(row.email)
        .bind(row.phone)
        .bind(row.service)
        .bind(row.message)
        .bind(row.start_date)
        .bind(row.end_date)
        .bind(row.is_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(series)
    }

    async fn get_series(&self, id: Uuid) -> Result<SeriesWithDays, Error> {
        let series: AppointmentSeries =
            sqlx::query_as("SELECT * FROM appointment_series WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        let mut days: Vec<SeriesDay> =
            sqlx::query_as("SELECT * FROM appointment_series_days WHERE series_id = $1")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        days.sort_by_key(|d| d.day_of_week.index());
        Ok(SeriesWithDays { series, days })
    }

    async fn list_series(&self, query: &SeriesQuery) -> Result<Page<SeriesWithDays>, Error> {
        let direction = if query.desc { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT * FROM appointment_series ORDER BY {} {} LIMIT $1 OFFSET $2",
            series_sort_column(query.sort_by),
            direction,
        );
        let headers: Vec<AppointmentSeries> = sqlx::query_as(&sql)
            .bind(query.limit.max(0))
            .bind(query.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM appointment_series")
            .fetch_one(&self.pool)
            .await?;

        let ids: Vec<Uuid> = headers.iter().map(|s| s.id).collect();
        let days: Vec<SeriesDay> =
            sqlx::query_as("SELECT * FROM appointment_series_days WHERE series_id = ANY($1)")
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?;
        let mut by_series: HashMap<Uuid, Vec<SeriesDay>> = HashMap::new();
        for day in days {
            by_series.entry(day.series_id).or_default().push(day);
        }

        let data = headers
            .into_iter()
            .map(|series| {
                let mut days = by_series.remove(&series.id).unwrap_or_default();
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
        let result =
            sqlx::query("UPDATE appointment_series SET start_date = $1, end_date = $2 WHERE id = $3")
                .bind(start)
                .bind(end)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn set_series_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<AppointmentSeries, Error> {
        let series = sqlx::query_as(
            "UPDATE appointment_series SET is_active = $1 WHERE id = $2 RETURNING *",
        )
        .bind(active)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(series)
    }

    async fn delete_series(&self, id: Uuid) -> Result<(), Error> {
        // days and remaining appointment rows go with the header (FK cascade)
        let result = sqlx::query("DELETE FROM appointment_series WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn delete_series_days(&self, id: Uuid) -> Result<(), Error> {
        sqlx::query("DELETE FROM appointment_series_days WHERE series_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_series_days(
        &self,
        id: Uuid,
        days: Vec<(Weekday, TimeOfDay)>,
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        for (day_of_week, time) in days {
            sqlx::query(
                "INSERT INTO appointment_series_days (series_id, day_of_week, time) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(day_of_week)
            .bind(time)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_series_appointments(
        &self,
        id: Uuid,
        from: Option<NaiveDate>,
    ) -> Result<u64, Error> {
        let result = match from {
            Some(cutoff) => {
                sqlx::query("DELETE FROM appointments WHERE series_id = $1 AND date >= $2")
                    .bind(id)
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM appointments WHERE series_id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}
