//! Repository layer: typed access to elements, attributes and measurements.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from the formula engine and lifecycle
//!   orchestration.
//!
//! # Invariants
//! - Repositories never open their own transaction unless documented; callers
//!   bind them to a connection or an open transaction.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::{AttributeId, ElementId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod attribute_repo;
pub mod element_repo;
pub mod measurement_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    ElementNotFound(ElementId),
    AttributeNotFound(AttributeId),
    /// Caller-supplied value rejected before any SQL ran.
    InvalidInput(String),
    /// Persisted row cannot be converted to a valid model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ElementNotFound(id) => write!(f, "element not found: {id}"),
            Self::AttributeNotFound(id) => write!(f, "attribute not found: {id}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::ElementNotFound(_) => None,
            Self::AttributeNotFound(_) => None,
            Self::InvalidInput(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Trims a display name and rejects blank values.
pub(crate) fn normalize_name(value: &str, what: &str) -> RepoResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RepoError::InvalidInput(format!("{what} name must not be blank")));
    }
    Ok(trimmed.to_string())
}
