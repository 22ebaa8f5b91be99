//! Attribute (time-series channel) model.
//!
//! # Invariants
//! - `formula.is_some()` classifies the attribute as derived.
//! - `dependencies` is always derived from `formula`, never supplied on its own.
//! - `rule_name` is present only while a maintenance rule is installed.

use super::{AttributeId, ElementId};
use serde::{Deserialize, Serialize};

/// Named time-series channel attached to an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub attribute_id: AttributeId,
    pub element_id: ElementId,
    pub name: String,
    /// Optional external plant code (KKS-style identifier).
    pub code: Option<String>,
    /// Arithmetic formula over `$<id>` references; `None` for source attributes.
    pub formula: Option<String>,
    /// Referenced attribute ids in first-appearance order, de-duplicated.
    pub dependencies: Vec<AttributeId>,
    /// Handle of the installed maintenance rule, if any.
    pub rule_name: Option<String>,
}

impl Attribute {
    /// Returns whether this attribute is computed from a formula.
    pub fn is_derived(&self) -> bool {
        self.formula.is_some()
    }

    /// Returns whether a maintenance rule is currently installed.
    pub fn has_rule(&self) -> bool {
        self.rule_name.is_some()
    }
}

/// Classification of an attribute by how its values are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Values written by external ingestion.
    Source,
    /// Values computed from a formula.
    Derived,
}

impl From<&Attribute> for AttributeKind {
    fn from(value: &Attribute) -> Self {
        if value.is_derived() {
            Self::Derived
        } else {
            Self::Source
        }
    }
}
