use std::fmt;

use thiserror::Error;

use crate::Occurrence;

/// Bounded sample of colliding slots carried by [`Error::Conflict`].
///
/// `total` is the true number of collisions; `samples` keeps at most the
/// first few of them for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub samples: Vec<Occurrence>,
    pub total: usize,
}

impl ConflictInfo {
    pub fn truncated(&self) -> bool {
        self.total > self.samples.len()
    }
}

impl fmt::Display for ConflictInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.samples.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", slot)?;
        }
        if self.truncated() {
            write!(f, " and {} more", self.total - self.samples.len())?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("There is a scheduling conflict with existing appointments: {0}")]
    Conflict(ConflictInfo),

    #[error("The requested record was not found")]
    NotFound,

    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// A multi-step write failed after some steps succeeded. `compensated`
    /// tells whether the compensating deletes ran to completion.
    #[error("The booking could not be saved completely (failed at {step}): {detail}")]
    PartialWrite {
        step: String,
        detail: String,
        compensated: bool,
    },

    #[error("Notification could not be sent: {0}")]
    Notification(String),

    #[error("Config file could not be read: {0}")]
    ConfigRead(String),

    #[error("Config file is malformed: {0}")]
    ConfigParse(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound,
            _ => Error::Storage(e.to_string()),
        }
    }
}
