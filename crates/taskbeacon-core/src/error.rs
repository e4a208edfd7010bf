use thiserror::Error;

use crate::entry::EntryId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("Config entry not found: {0}")]
    NotFound(EntryId),

    #[error("Config entry already exists: {0}")]
    AlreadyExists(EntryId),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

pub type Result<T> = std::result::Result<T, EntryError>;
