mod config;
mod error;
mod types;
mod utils;

pub use config::{Config, DbConfig, MailConfig};
pub use error::{ConflictInfo, Error};
pub use types::*;
pub use utils::*;
