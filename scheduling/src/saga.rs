use model::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::BookingStore;

/// Compensating action recorded while a multi-step series write proceeds.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Compensation {
    /// Remove a just-created series header, cascading its day rows and any
    /// appointment rows already inserted for it.
    DeleteSeries(Uuid),
}

/// Stand-in for a native transaction: each completed step records its
/// compensation, and on the first failure the recorded compensations run in
/// reverse order.
pub(crate) struct Saga<'a, S> {
    store: &'a S,
    compensations: Vec<Compensation>,
}

impl<'a, S: BookingStore> Saga<'a, S> {
    pub(crate) fn new(store: &'a S) -> Self {
        Self {
            store,
            compensations: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Unwind after `step` failed with `cause`.
    ///
    /// Returns the original cause once the unwind completes, or
    /// [`Error::PartialWrite`] when a compensation itself fails and storage
    /// is left inconsistent.
    pub(crate) async fn abort(self, step: &str, cause: Error) -> Error {
        warn!(step, %cause, "series write failed, compensating");
        for compensation in self.compensations.into_iter().rev() {
            let result = match compensation {
                Compensation::DeleteSeries(id) => self.store.delete_series(id).await,
            };
            if let Err(e) = result {
                error!(%e, "compensation failed, storage left inconsistent");
                return Error::PartialWrite {
                    step: step.to_string(),
                    detail: cause.to_string(),
                    compensated: false,
                };
            }
        }
        cause
    }

    /// All steps succeeded; drop the recorded compensations.
    pub(crate) fn commit(self) {}
}
