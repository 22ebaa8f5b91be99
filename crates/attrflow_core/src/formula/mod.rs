//! Formula language for derived attributes.
//!
//! # Responsibility
//! - Parse `$<id>` arithmetic formulas into an expression tree.
//! - Validate references against existing attributes without touching the store.
//! - Evaluate expressions in-process with the same null semantics as the store.
//!
//! # Invariants
//! - Validation is total: either a [`ValidatedFormula`] or one typed error.
//! - Dependencies are listed in first-appearance order, de-duplicated.
//! - A formula without any attribute reference is rejected.

use crate::model::AttributeId;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod eval;
mod parser;

pub use parser::parse_expression;

pub type FormulaResult<T> = Result<T, FormulaError>;

/// Validation failure for one formula string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    /// Malformed token stream or unbalanced parentheses.
    Syntax { position: usize, message: String },
    /// Referenced ids that do not exist, ascending.
    UnknownAttributeReference(Vec<AttributeId>),
    /// The formula references the attribute being defined or edited.
    SelfReference(AttributeId),
    /// The formula references no attribute at all.
    EmptyDependencySet,
}

impl FormulaError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

impl Display for FormulaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax { position, message } => {
                write!(f, "formula syntax error at offset {position}: {message}")
            }
            Self::UnknownAttributeReference(ids) => {
                let rendered = ids
                    .iter()
                    .map(|id| format!("${id}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "formula references unknown attributes: {rendered}")
            }
            Self::SelfReference(id) => {
                write!(f, "formula of attribute {id} references itself")
            }
            Self::EmptyDependencySet => {
                write!(f, "formula must reference at least one attribute")
            }
        }
    }
}

impl Error for FormulaError {}

/// Arithmetic operator of a binary node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(f64),
    Reference(AttributeId),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Returns referenced attribute ids in first-appearance order.
    pub fn references(&self) -> Vec<AttributeId> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        self.collect_references(&mut seen, &mut ordered);
        ordered
    }

    fn collect_references(&self, seen: &mut BTreeSet<AttributeId>, out: &mut Vec<AttributeId>) {
        match self {
            Self::Constant(_) => {}
            Self::Reference(id) => {
                if seen.insert(*id) {
                    out.push(*id);
                }
            }
            Self::Negate(inner) => inner.collect_references(seen, out),
            Self::Binary { left, right, .. } => {
                left.collect_references(seen, out);
                right.collect_references(seen, out);
            }
        }
    }
}

/// Syntactically valid formula that has not been checked against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    source: String,
    expr: Expr,
    dependencies: Vec<AttributeId>,
}

impl ParsedFormula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn dependencies(&self) -> &[AttributeId] {
        &self.dependencies
    }

    /// Checks references against `known` ids and the attribute being defined.
    ///
    /// `target` is `None` on creation, when the id does not exist yet.
    pub fn validate(
        self,
        known: &BTreeSet<AttributeId>,
        target: Option<AttributeId>,
    ) -> FormulaResult<ValidatedFormula> {
        if let Some(target) = target {
            if self.dependencies.contains(&target) {
                return Err(FormulaError::SelfReference(target));
            }
        }

        let mut unknown = self
            .dependencies
            .iter()
            .copied()
            .filter(|id| !known.contains(id))
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(FormulaError::UnknownAttributeReference(unknown));
        }

        Ok(ValidatedFormula(self))
    }
}

/// Formula whose references are known to exist and exclude its own attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFormula(ParsedFormula);

impl ValidatedFormula {
    pub fn source(&self) -> &str {
        self.0.source()
    }

    pub fn expr(&self) -> &Expr {
        self.0.expr()
    }

    pub fn dependencies(&self) -> &[AttributeId] {
        self.0.dependencies()
    }
}

/// Parses a formula and extracts its dependency set.
///
/// Surrounding whitespace is dropped from the stored source text.
pub fn parse_formula(text: &str) -> FormulaResult<ParsedFormula> {
    let expr = parse_expression(text)?;
    let dependencies = expr.references();
    if dependencies.is_empty() {
        return Err(FormulaError::EmptyDependencySet);
    }
    Ok(ParsedFormula {
        source: text.trim().to_string(),
        expr,
        dependencies,
    })
}

/// Parses and validates in one step.
pub fn validate_formula(
    text: &str,
    known: &BTreeSet<AttributeId>,
    target: Option<AttributeId>,
) -> FormulaResult<ValidatedFormula> {
    parse_formula(text)?.validate(known, target)
}
