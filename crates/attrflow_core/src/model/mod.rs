//! Domain model for the element/attribute hierarchy and its measurements.
//!
//! # Responsibility
//! - Define the records shared by repositories, the formula engine and the
//!   lifecycle manager.
//!
//! # Invariants
//! - Elements form a strict tree; only the root has no parent.
//! - An attribute is derived iff it carries a formula.
//! - At most one measurement exists per `(attribute_id, timestamp)`.

pub mod attribute;
pub mod element;
pub mod measurement;

/// Identifier of an [`element::Element`] row.
pub type ElementId = i64;

/// Identifier of an [`attribute::Attribute`] row.
///
/// Formulas reference attributes by this value (`$<id>`), never by position.
pub type AttributeId = i64;

/// Unix epoch milliseconds.
pub type Timestamp = i64;
