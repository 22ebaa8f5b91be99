//! Attribute lifecycle manager.
//!
//! # Responsibility
//! - Create, update and delete attributes together with their compiled
//!   artifacts.
//! - Run backfills and answer dependency queries for collaborators.
//!
//! # Invariants
//! - Every mutating operation runs in one `IMMEDIATE` transaction; a failure
//!   at any step leaves no partial state behind.
//! - Formula validation finishes before the first write.
//! - Only derived attributes accept formula updates; name and code stay
//!   editable on every attribute through `rename_attribute`.
//! - An old rule is dropped before its replacement is installed.
//! - Attributes that others depend on cannot be deleted.

use crate::compiler::{self, BackfillPlan};
use crate::consistency::{self, ConsistencyError};
use crate::formula::{parse_formula, FormulaError, ValidatedFormula};
use crate::model::attribute::Attribute;
use crate::model::{AttributeId, ElementId, Timestamp};
use crate::repo::attribute_repo::{AttributeRepository, NewAttribute, SqliteAttributeRepository};
use crate::repo::element_repo::{ElementRepository, SqliteElementRepository};
use crate::repo::measurement_repo::{MeasurementRepository, SqliteMeasurementRepository};
use crate::repo::RepoError;
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Failure of one lifecycle operation.
///
/// Validation variants are returned before any write happens.
#[derive(Debug)]
pub enum LifecycleError {
    FormulaSyntax { position: usize, message: String },
    UnknownAttributeReference(Vec<AttributeId>),
    SelfReference(AttributeId),
    EmptyDependencySet,
    /// The new formula would make `attribute_id` depend on itself through
    /// `dependency`.
    CycleDetected {
        attribute_id: AttributeId,
        dependency: AttributeId,
    },
    /// Formula operations on a source attribute.
    NotDerived(AttributeId),
    AttributeNotFound(AttributeId),
    ElementNotFound(ElementId),
    ElementHasChildren(ElementId),
    /// Deletion refused because other attributes reference this one.
    HasDependents {
        attribute_id: AttributeId,
        dependents: Vec<AttributeId>,
    },
    /// Update request without any field to change.
    EmptyUpdate,
    ConstraintMissing(rusqlite::Error),
    RuleInstallation {
        attribute_id: AttributeId,
        source: rusqlite::Error,
    },
    RuleRemoval {
        attribute_id: AttributeId,
        source: rusqlite::Error,
    },
    Backfill {
        attribute_id: AttributeId,
        source: rusqlite::Error,
    },
    Repo(RepoError),
}

impl LifecycleError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FormulaSyntax { .. } => "formula_syntax",
            Self::UnknownAttributeReference(_) => "unknown_attribute_reference",
            Self::SelfReference(_) => "self_reference",
            Self::EmptyDependencySet => "empty_dependency_set",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::NotDerived(_) => "not_derived",
            Self::AttributeNotFound(_) => "attribute_not_found",
            Self::ElementNotFound(_) => "element_not_found",
            Self::ElementHasChildren(_) => "element_has_children",
            Self::HasDependents { .. } => "has_dependents",
            Self::EmptyUpdate => "empty_update",
            Self::ConstraintMissing(_) => "constraint_missing",
            Self::RuleInstallation { .. } => "rule_installation",
            Self::RuleRemoval { .. } => "rule_removal",
            Self::Backfill { .. } => "backfill",
            Self::Repo(_) => "repo",
        }
    }

    /// Returns whether the error was raised before any write.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::FormulaSyntax { .. }
                | Self::UnknownAttributeReference(_)
                | Self::SelfReference(_)
                | Self::EmptyDependencySet
                | Self::CycleDetected { .. }
                | Self::EmptyUpdate
        )
    }
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FormulaSyntax { position, message } => {
                write!(f, "formula syntax error at offset {position}: {message}")
            }
            Self::UnknownAttributeReference(ids) => {
                write!(f, "formula references unknown attributes: {ids:?}")
            }
            Self::SelfReference(id) => write!(f, "formula of attribute {id} references itself"),
            Self::EmptyDependencySet => {
                write!(f, "formula must reference at least one attribute")
            }
            Self::CycleDetected {
                attribute_id,
                dependency,
            } => write!(
                f,
                "formula of attribute {attribute_id} would form a cycle through attribute {dependency}"
            ),
            Self::NotDerived(id) => write!(f, "attribute {id} is not derived"),
            Self::AttributeNotFound(id) => write!(f, "attribute not found: {id}"),
            Self::ElementNotFound(id) => write!(f, "element not found: {id}"),
            Self::ElementHasChildren(id) => write!(f, "element {id} still has child elements"),
            Self::HasDependents {
                attribute_id,
                dependents,
            } => write!(
                f,
                "attribute {attribute_id} is referenced by derived attributes {dependents:?}"
            ),
            Self::EmptyUpdate => write!(f, "update request does not change any field"),
            Self::ConstraintMissing(err) => write!(
                f,
                "uniqueness constraint on archive(attribute_id, timestamp) could not be created: {err}"
            ),
            Self::RuleInstallation {
                attribute_id,
                source,
            } => write!(
                f,
                "failed to install maintenance rule for attribute {attribute_id}: {source}"
            ),
            Self::RuleRemoval {
                attribute_id,
                source,
            } => write!(
                f,
                "failed to remove maintenance rule for attribute {attribute_id}: {source}"
            ),
            Self::Backfill {
                attribute_id,
                source,
            } => write!(f, "backfill of attribute {attribute_id} failed: {source}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConstraintMissing(err) => Some(err),
            Self::RuleInstallation { source, .. } => Some(source),
            Self::RuleRemoval { source, .. } => Some(source),
            Self::Backfill { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FormulaError> for LifecycleError {
    fn from(value: FormulaError) -> Self {
        match value {
            FormulaError::Syntax { position, message } => Self::FormulaSyntax { position, message },
            FormulaError::UnknownAttributeReference(ids) => Self::UnknownAttributeReference(ids),
            FormulaError::SelfReference(id) => Self::SelfReference(id),
            FormulaError::EmptyDependencySet => Self::EmptyDependencySet,
        }
    }
}

impl From<RepoError> for LifecycleError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::AttributeNotFound(id) => Self::AttributeNotFound(id),
            RepoError::ElementNotFound(id) => Self::ElementNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<ConsistencyError> for LifecycleError {
    fn from(value: ConsistencyError) -> Self {
        match value {
            ConsistencyError::ConstraintMissing(err) => Self::ConstraintMissing(err),
            ConsistencyError::RuleInstallation {
                attribute_id,
                source,
            } => Self::RuleInstallation {
                attribute_id,
                source,
            },
            ConsistencyError::RuleRemoval {
                attribute_id,
                source,
            } => Self::RuleRemoval {
                attribute_id,
                source,
            },
            ConsistencyError::Db(err) => Self::Repo(err.into()),
        }
    }
}

impl From<rusqlite::Error> for LifecycleError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

/// Input of [`AttributeLifecycle::create_attribute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAttributeRequest {
    pub element_id: ElementId,
    pub name: String,
    pub code: Option<String>,
    /// `None` creates a source attribute.
    pub formula: Option<String>,
}

/// Input of [`AttributeLifecycle::update_attribute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAttributeRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub formula: Option<String>,
    /// Replace stored values with a backfill of the new formula.
    pub recompute_archive: bool,
    /// Install a rule for the new formula; `false` leaves the attribute rule-less.
    pub recreate_rule: bool,
}

impl Default for UpdateAttributeRequest {
    fn default() -> Self {
        Self {
            name: None,
            code: None,
            formula: None,
            recompute_archive: true,
            recreate_rule: true,
        }
    }
}

impl UpdateAttributeRequest {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.code.is_none() && self.formula.is_none()
    }
}

/// Attribute field reported as changed by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeField {
    Name,
    Code,
    Formula,
}

/// Effect of an update on the attribute's maintenance rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleChange {
    Unchanged,
    /// Old rule (if any) dropped, new rule installed.
    Replaced,
    /// Old rule dropped, none installed.
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOutcome {
    pub attribute: Attribute,
    pub rows_computed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub attribute: Attribute,
    pub changed_fields: Vec<AttributeField>,
    pub rows_deleted: usize,
    pub rows_computed: usize,
    pub rule: RuleChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub attribute_id: AttributeId,
    pub rule_removed: bool,
    pub rows_deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillOutcome {
    pub attribute_id: AttributeId,
    pub rows_computed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementDeleteOutcome {
    pub element_id: ElementId,
    /// Deleted attributes, dependents before their dependencies.
    pub attributes: Vec<DeleteOutcome>,
}

/// Lifecycle manager bound to one store connection.
///
/// Holds no state of its own; two managers on different connections to the
/// same file serialize through SQLite's writer lock.
pub struct AttributeLifecycle<'conn> {
    conn: &'conn Connection,
}

impl<'conn> AttributeLifecycle<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates a source or derived attribute.
    ///
    /// A derived attribute is backfilled and gets its rule installed before
    /// the transaction commits.
    pub fn create_attribute(
        &self,
        request: &CreateAttributeRequest,
    ) -> LifecycleResult<CreateOutcome> {
        let started_at = Instant::now();
        let result = self.create_attribute_inner(request);
        log_result(
            "attribute_create",
            result.as_ref().ok().map(|outcome| outcome.attribute.attribute_id),
            started_at,
            &result,
        );
        if let Some(formula) = &request.formula {
            if let Err(err) = &result {
                if err.is_validation() {
                    warn!(
                        "event=formula_rejected module=lifecycle error_code={} formula_len={}",
                        err.kind(),
                        formula.len()
                    );
                }
            }
        }
        result
    }

    fn create_attribute_inner(
        &self,
        request: &CreateAttributeRequest,
    ) -> LifecycleResult<CreateOutcome> {
        let tx = begin(self.conn)?;
        let attributes = SqliteAttributeRepository::new(&tx);

        let formula = match request.formula.as_deref() {
            Some(text) => Some(validate_against_store(&attributes, text, None)?),
            None => None,
        };

        let mut attribute = attributes.insert_attribute(&NewAttribute {
            element_id: request.element_id,
            name: &request.name,
            code: request.code.as_deref(),
            formula: formula.as_ref().map(ValidatedFormula::source),
            dependencies: formula
                .as_ref()
                .map(ValidatedFormula::dependencies)
                .unwrap_or_default(),
        })?;

        let mut rows_computed = 0;
        if let Some(formula) = &formula {
            let artifacts = compiler::compile(attribute.attribute_id, formula);
            rows_computed = run_backfill(&tx, &artifacts.backfill, formula)?;
            consistency::install_rule(&tx, &artifacts.rule)?;
            attributes.set_rule_name(attribute.attribute_id, Some(&artifacts.rule.rule_name))?;
            attribute.rule_name = Some(artifacts.rule.rule_name);
        }

        tx.commit()?;
        Ok(CreateOutcome {
            attribute,
            rows_computed,
        })
    }

    /// Updates a derived attribute.
    ///
    /// A formula equal to the stored one is not a change. When the formula
    /// changes the old rule is always dropped; the flags on `request` decide
    /// whether stored values are recomputed and whether a new rule is
    /// installed.
    pub fn update_attribute(
        &self,
        attribute_id: AttributeId,
        request: &UpdateAttributeRequest,
    ) -> LifecycleResult<UpdateOutcome> {
        let started_at = Instant::now();
        let result = self.update_attribute_inner(attribute_id, request);
        log_result("attribute_update", Some(attribute_id), started_at, &result);
        if let Ok(outcome) = &result {
            info!(
                "event=attribute_update_detail module=lifecycle attribute_id={} changed_fields={:?} rows_deleted={} rows_computed={} rule={:?}",
                attribute_id,
                outcome.changed_fields,
                outcome.rows_deleted,
                outcome.rows_computed,
                outcome.rule
            );
        }
        result
    }

    fn update_attribute_inner(
        &self,
        attribute_id: AttributeId,
        request: &UpdateAttributeRequest,
    ) -> LifecycleResult<UpdateOutcome> {
        if request.is_empty() {
            return Err(LifecycleError::EmptyUpdate);
        }

        let tx = begin(self.conn)?;
        let attributes = SqliteAttributeRepository::new(&tx);
        let current = load_attribute(&attributes, attribute_id)?;
        let Some(stored_formula) = current.formula.as_deref() else {
            return Err(LifecycleError::NotDerived(attribute_id));
        };

        let new_formula = match request.formula.as_deref() {
            Some(text) => {
                let formula = validate_against_store(&attributes, text, Some(attribute_id))?;
                if formula.source() == stored_formula {
                    None
                } else {
                    ensure_acyclic(&attributes, attribute_id, formula.dependencies())?;
                    Some(formula)
                }
            }
            None => None,
        };

        let mut changed_fields = Vec::new();
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| *name != current.name);
        if name.is_some() {
            changed_fields.push(AttributeField::Name);
        }
        let code = request
            .code
            .as_deref()
            .filter(|code| current.code.as_deref() != Some(*code));
        if code.is_some() {
            changed_fields.push(AttributeField::Code);
        }
        if name.is_some() || code.is_some() {
            attributes.set_names(attribute_id, name, code)?;
        }

        let mut rows_deleted = 0;
        let mut rows_computed = 0;
        let mut rule = RuleChange::Unchanged;
        if let Some(formula) = &new_formula {
            changed_fields.push(AttributeField::Formula);
            let artifacts = compiler::compile(attribute_id, formula);

            consistency::remove_rule(&tx, attribute_id)?;
            attributes.set_formula(attribute_id, formula.source(), formula.dependencies())?;

            if request.recompute_archive {
                rows_deleted =
                    SqliteMeasurementRepository::new(&tx).delete_for_attribute(attribute_id)?;
                rows_computed = run_backfill(&tx, &artifacts.backfill, formula)?;
            }

            if request.recreate_rule {
                consistency::install_rule(&tx, &artifacts.rule)?;
                attributes.set_rule_name(attribute_id, Some(&artifacts.rule.rule_name))?;
                rule = RuleChange::Replaced;
            } else {
                attributes.set_rule_name(attribute_id, None)?;
                rule = RuleChange::Removed;
            }
        }

        if changed_fields.is_empty() {
            // Nothing differs from the stored row; leave the store untouched.
            return Ok(UpdateOutcome {
                attribute: current,
                changed_fields,
                rows_deleted,
                rows_computed,
                rule,
            });
        }

        let attribute = load_attribute(&attributes, attribute_id)?;
        tx.commit()?;
        Ok(UpdateOutcome {
            attribute,
            changed_fields,
            rows_deleted,
            rows_computed,
            rule,
        })
    }

    /// Edits name and/or code of any attribute, source or derived.
    pub fn rename_attribute(
        &self,
        attribute_id: AttributeId,
        name: Option<&str>,
        code: Option<&str>,
    ) -> LifecycleResult<Attribute> {
        let started_at = Instant::now();
        let result = self.rename_attribute_inner(attribute_id, name, code);
        log_result("attribute_rename", Some(attribute_id), started_at, &result);
        result
    }

    fn rename_attribute_inner(
        &self,
        attribute_id: AttributeId,
        name: Option<&str>,
        code: Option<&str>,
    ) -> LifecycleResult<Attribute> {
        if name.is_none() && code.is_none() {
            return Err(LifecycleError::EmptyUpdate);
        }
        let tx = begin(self.conn)?;
        let attributes = SqliteAttributeRepository::new(&tx);
        attributes.set_names(attribute_id, name, code)?;
        let attribute = load_attribute(&attributes, attribute_id)?;
        tx.commit()?;
        Ok(attribute)
    }

    /// Deletes an attribute: rule first, then its records, then the row.
    pub fn delete_attribute(&self, attribute_id: AttributeId) -> LifecycleResult<DeleteOutcome> {
        let started_at = Instant::now();
        let result = self.delete_attribute_inner(attribute_id);
        log_result("attribute_delete", Some(attribute_id), started_at, &result);
        result
    }

    fn delete_attribute_inner(&self, attribute_id: AttributeId) -> LifecycleResult<DeleteOutcome> {
        let tx = begin(self.conn)?;
        let attributes = SqliteAttributeRepository::new(&tx);
        load_attribute(&attributes, attribute_id)?;

        let dependents = attributes.dependents_of(attribute_id)?;
        if !dependents.is_empty() {
            return Err(LifecycleError::HasDependents {
                attribute_id,
                dependents,
            });
        }

        let outcome = delete_attribute_cascade(&tx, attribute_id)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Deletes a leaf element and every attribute it owns.
    ///
    /// Refused when the element has child elements or when an attribute of
    /// another element depends on one of its attributes.
    pub fn delete_element(&self, element_id: ElementId) -> LifecycleResult<ElementDeleteOutcome> {
        let started_at = Instant::now();
        let result = self.delete_element_inner(element_id);
        log_result("element_delete", Some(element_id), started_at, &result);
        result
    }

    fn delete_element_inner(&self, element_id: ElementId) -> LifecycleResult<ElementDeleteOutcome> {
        let tx = begin(self.conn)?;
        let elements = SqliteElementRepository::new(&tx);
        let attributes = SqliteAttributeRepository::new(&tx);

        elements
            .get_element(element_id)?
            .ok_or(LifecycleError::ElementNotFound(element_id))?;
        if !elements.list_children(Some(element_id))?.is_empty() {
            return Err(LifecycleError::ElementHasChildren(element_id));
        }

        let owned = attributes.list_by_element(element_id)?;
        let owned_ids = owned
            .iter()
            .map(|attribute| attribute.attribute_id)
            .collect::<BTreeSet<_>>();

        let mut pending = Vec::with_capacity(owned.len());
        for attribute in &owned {
            let dependents = attributes.dependents_of(attribute.attribute_id)?;
            let outside = dependents
                .iter()
                .copied()
                .filter(|dependent| !owned_ids.contains(dependent))
                .collect::<Vec<_>>();
            if !outside.is_empty() {
                return Err(LifecycleError::HasDependents {
                    attribute_id: attribute.attribute_id,
                    dependents: outside,
                });
            }
            pending.push((attribute.attribute_id, dependents));
        }

        let mut deleted = BTreeSet::new();
        let mut outcomes = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending
                .iter()
                .position(|(_, dependents)| dependents.iter().all(|id| deleted.contains(id)));
            let Some(index) = ready else {
                let (attribute_id, dependents) = pending.swap_remove(0);
                return Err(LifecycleError::HasDependents {
                    attribute_id,
                    dependents,
                });
            };
            let (attribute_id, _) = pending.remove(index);
            outcomes.push(delete_attribute_cascade(&tx, attribute_id)?);
            deleted.insert(attribute_id);
        }

        elements.delete_element(element_id)?;
        tx.commit()?;
        Ok(ElementDeleteOutcome {
            element_id,
            attributes: outcomes,
        })
    }

    /// Recomputes every historical value of a derived attribute.
    ///
    /// Leaves the rule untouched. Values at timestamps where a dependency is
    /// now missing are not retracted.
    pub fn backfill(&self, attribute_id: AttributeId) -> LifecycleResult<BackfillOutcome> {
        let started_at = Instant::now();
        let result = self.backfill_inner(attribute_id);
        log_result("attribute_backfill", Some(attribute_id), started_at, &result);
        result
    }

    fn backfill_inner(&self, attribute_id: AttributeId) -> LifecycleResult<BackfillOutcome> {
        let tx = begin(self.conn)?;
        let attributes = SqliteAttributeRepository::new(&tx);
        let attribute = load_attribute(&attributes, attribute_id)?;
        let Some(stored_formula) = attribute.formula.as_deref() else {
            return Err(LifecycleError::NotDerived(attribute_id));
        };

        let formula = validate_against_store(&attributes, stored_formula, Some(attribute_id))?;
        let artifacts = compiler::compile(attribute_id, &formula);
        let rows_computed = run_backfill(&tx, &artifacts.backfill, &formula)?;

        tx.commit()?;
        Ok(BackfillOutcome {
            attribute_id,
            rows_computed,
        })
    }

    /// Returns the ordered dependency set; empty for source attributes.
    pub fn get_dependencies(&self, attribute_id: AttributeId) -> LifecycleResult<Vec<AttributeId>> {
        let attributes = SqliteAttributeRepository::new(self.conn);
        Ok(load_attribute(&attributes, attribute_id)?.dependencies)
    }

    /// Returns whether the attribute carries a formula.
    pub fn is_derived(&self, attribute_id: AttributeId) -> LifecycleResult<bool> {
        let attributes = SqliteAttributeRepository::new(self.conn);
        Ok(load_attribute(&attributes, attribute_id)?.is_derived())
    }
}

fn begin(conn: &Connection) -> LifecycleResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}

fn load_attribute(
    attributes: &impl AttributeRepository,
    attribute_id: AttributeId,
) -> LifecycleResult<Attribute> {
    attributes
        .get_attribute(attribute_id)?
        .ok_or(LifecycleError::AttributeNotFound(attribute_id))
}

fn validate_against_store(
    attributes: &impl AttributeRepository,
    text: &str,
    target: Option<AttributeId>,
) -> LifecycleResult<ValidatedFormula> {
    let parsed = parse_formula(text)?;
    let known = attributes.existing_ids(parsed.dependencies())?;
    Ok(parsed.validate(&known, target)?)
}

/// Rejects `dependencies` when any of them already reaches `attribute_id`.
fn ensure_acyclic(
    attributes: &impl AttributeRepository,
    attribute_id: AttributeId,
    dependencies: &[AttributeId],
) -> LifecycleResult<()> {
    for &dependency in dependencies {
        let mut visited = HashSet::new();
        let mut stack = vec![dependency];
        while let Some(current) = stack.pop() {
            if current == attribute_id {
                return Err(LifecycleError::CycleDetected {
                    attribute_id,
                    dependency,
                });
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(attributes.dependencies_of(current)?);
        }
    }
    Ok(())
}

/// Evaluates the backfill join in-process and upserts every result.
fn run_backfill(
    conn: &Connection,
    plan: &BackfillPlan,
    formula: &ValidatedFormula,
) -> LifecycleResult<usize> {
    consistency::ensure_unique_constraint(conn)?;

    let attribute_id = plan.target;
    let backfill_failed = |source| LifecycleError::Backfill {
        attribute_id,
        source,
    };

    let rows = read_joined_rows(conn, plan).map_err(backfill_failed)?;
    let values = rows
        .into_iter()
        .map(|(timestamp, inputs)| {
            let lookup = |id: AttributeId| {
                plan.dependencies
                    .iter()
                    .position(|dependency| *dependency == id)
                    .and_then(|index| inputs.get(index).copied())
            };
            (timestamp, formula.expr().evaluate(&lookup))
        })
        .collect::<Vec<_>>();

    consistency::upsert_derived_values(conn, attribute_id, &values).map_err(backfill_failed)
}

fn read_joined_rows(
    conn: &Connection,
    plan: &BackfillPlan,
) -> rusqlite::Result<Vec<(Timestamp, Vec<f64>)>> {
    let mut stmt = conn.prepare(&plan.select_sql)?;
    let mut rows = stmt.query([])?;
    let mut joined = Vec::new();
    while let Some(row) = rows.next()? {
        let timestamp: Timestamp = row.get(0)?;
        let mut inputs = Vec::with_capacity(plan.dependencies.len());
        for column in 1..=plan.dependencies.len() {
            inputs.push(row.get::<_, f64>(column)?);
        }
        joined.push((timestamp, inputs));
    }
    Ok(joined)
}

fn delete_attribute_cascade(
    conn: &Connection,
    attribute_id: AttributeId,
) -> LifecycleResult<DeleteOutcome> {
    let rule_removed = consistency::remove_rule(conn, attribute_id)?;
    let rows_deleted = SqliteMeasurementRepository::new(conn).delete_for_attribute(attribute_id)?;
    SqliteAttributeRepository::new(conn).delete_attribute(attribute_id)?;
    Ok(DeleteOutcome {
        attribute_id,
        rule_removed,
        rows_deleted,
    })
}

fn log_result<T>(
    event: &str,
    subject_id: Option<i64>,
    started_at: Instant,
    result: &LifecycleResult<T>,
) {
    let subject = subject_id.map_or_else(|| "none".to_string(), |id| id.to_string());
    match result {
        Ok(_) => info!(
            "event={} module=lifecycle status=ok id={} duration_ms={}",
            event,
            subject,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={} module=lifecycle status=error id={} duration_ms={} error_code={} error={}",
            event,
            subject,
            started_at.elapsed().as_millis(),
            err.kind(),
            err
        ),
    }
}
