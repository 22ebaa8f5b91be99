//! Core of the derived attribute engine.
//! This crate is the single source of truth for formula, rule and archive
//! invariants.

pub mod compiler;
pub mod consistency;
pub mod db;
pub mod formula;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use formula::{parse_formula, validate_formula, FormulaError, ValidatedFormula};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::attribute::{Attribute, AttributeKind};
pub use model::element::Element;
pub use model::measurement::{MeasurementRecord, TimeRange};
pub use model::{AttributeId, ElementId, Timestamp};
pub use repo::{RepoError, RepoResult};
pub use service::lifecycle::{
    AttributeLifecycle, CreateAttributeRequest, LifecycleError, LifecycleResult,
    UpdateAttributeRequest,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
