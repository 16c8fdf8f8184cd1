use std::collections::HashSet;

use model::{ConflictInfo, Error, Occurrence};
use uuid::Uuid;

use crate::BookingStore;

/// How many colliding slots a [`ConflictInfo`] carries for display.
const MAX_CONFLICT_SAMPLES: usize = 3;

/// Fail with [`Error::Conflict`] if any candidate slot is already booked.
///
/// The fetch is bounded to [min date, max date] of the candidates; no
/// candidate can collide outside that range. `exclude_series` keeps a series
/// being edited from conflicting with its own rows.
pub(crate) async fn ensure_no_conflicts<S: BookingStore>(
    store: &S,
    occurrences: &[Occurrence],
    exclude_series: Option<Uuid>,
) -> Result<(), Error> {
    let Some(min) = occurrences.iter().map(|o| o.date).min() else {
        return Ok(());
    };
    let Some(max) = occurrences.iter().map(|o| o.date).max() else {
        return Ok(());
    };

    let candidates: HashSet<_> = occurrences.iter().map(|o| (o.date, o.time)).collect();
    let booked = store.booked_slots_in_range(min, max, exclude_series).await?;

    let mut conflicts: Vec<Occurrence> = booked
        .into_iter()
        .filter(|slot| candidates.contains(&(slot.date, slot.time)))
        .map(|slot| Occurrence {
            date: slot.date,
            time: slot.time,
        })
        .collect();

    if conflicts.is_empty() {
        return Ok(());
    }

    conflicts.sort();
    conflicts.dedup();
    let total = conflicts.len();
    conflicts.truncate(MAX_CONFLICT_SAMPLES);
    Err(Error::Conflict(ConflictInfo {
        samples: conflicts,
        total,
    }))
}
