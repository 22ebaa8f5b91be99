//! Artifact compiler for derived attributes.
//!
//! # Responsibility
//! - Turn a validated formula into a backfill plan and a maintenance rule.
//! - Own the deterministic naming of store-side artifacts.
//!
//! # Invariants
//! - Compilation is pure: no store access, same input gives byte-identical SQL.
//! - Artifact names depend only on the target attribute id, so installation and
//!   removal can find previous artifacts without extra bookkeeping.
//! - Dependency ids are rendered as integer literals; no caller text reaches SQL.

use crate::formula::ValidatedFormula;
use crate::model::AttributeId;

mod sql;

/// Prefix shared by every compiled function (view) name.
pub const FUNCTION_PREFIX: &str = "compute_derived_attr_";
/// Prefix shared by every installed rule (trigger) name.
pub const RULE_PREFIX: &str = "trigger_compute_derived_attr_";
/// Suffix of the companion trigger covering overwrites.
pub const UPDATE_RULE_SUFFIX: &str = "_update";

/// Name of the view computing derived values per timestamp.
pub fn function_name(attribute_id: AttributeId) -> String {
    format!("{FUNCTION_PREFIX}{attribute_id}")
}

/// Name of the insert trigger; also stored as the attribute's rule handle.
pub fn rule_name(attribute_id: AttributeId) -> String {
    format!("{RULE_PREFIX}{attribute_id}")
}

/// Name of the trigger reacting to overwritten dependency values.
pub fn update_rule_name(attribute_id: AttributeId) -> String {
    format!("{RULE_PREFIX}{attribute_id}{UPDATE_RULE_SUFFIX}")
}

/// Query joining all dependency records on equal timestamp.
///
/// Each row is `(timestamp, value_0, ..., value_n)` with values in
/// `dependencies` order, all non-NULL, ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillPlan {
    pub target: AttributeId,
    pub dependencies: Vec<AttributeId>,
    pub select_sql: String,
}

/// Store-side incremental maintenance artifacts for one derived attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceRule {
    pub target: AttributeId,
    pub function_name: String,
    pub rule_name: String,
    pub update_rule_name: String,
    pub create_function_sql: String,
    pub create_insert_trigger_sql: String,
    pub create_update_trigger_sql: String,
}

impl MaintenanceRule {
    /// DDL statements in installation order.
    pub fn install_statements(&self) -> [&str; 3] {
        [
            self.create_function_sql.as_str(),
            self.create_insert_trigger_sql.as_str(),
            self.create_update_trigger_sql.as_str(),
        ]
    }
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifacts {
    pub backfill: BackfillPlan,
    pub rule: MaintenanceRule,
}

/// Compiles a validated formula for `target`.
pub fn compile(target: AttributeId, formula: &ValidatedFormula) -> CompiledArtifacts {
    let dependencies = formula.dependencies().to_vec();
    let join = sql::JoinClause::new(&dependencies);
    let value_sql = sql::render_expression(formula.expr(), &dependencies);

    let function_name = function_name(target);
    let rule_name = rule_name(target);
    let update_rule_name = update_rule_name(target);

    CompiledArtifacts {
        backfill: BackfillPlan {
            target,
            select_sql: sql::backfill_select(&join),
            dependencies: dependencies.clone(),
        },
        rule: MaintenanceRule {
            target,
            create_function_sql: sql::create_view(&function_name, &join, &value_sql),
            create_insert_trigger_sql: sql::create_trigger(
                &rule_name,
                sql::TriggerEvent::Insert,
                target,
                &function_name,
                &dependencies,
            ),
            create_update_trigger_sql: sql::create_trigger(
                &update_rule_name,
                sql::TriggerEvent::UpdateOfValue,
                target,
                &function_name,
                &dependencies,
            ),
            function_name,
            rule_name,
            update_rule_name,
        },
    }
}

/// Statements removing every artifact of `target`, triggers before the view.
///
/// Each statement uses `IF EXISTS`, so running them on a rule-less attribute
/// is a no-op.
pub fn drop_statements(target: AttributeId) -> [String; 3] {
    [
        format!("DROP TRIGGER IF EXISTS {};", rule_name(target)),
        format!("DROP TRIGGER IF EXISTS {};", update_rule_name(target)),
        format!("DROP VIEW IF EXISTS {};", function_name(target)),
    ]
}

#[cfg(test)]
mod tests {
    use super::{compile, drop_statements, function_name, rule_name, update_rule_name};
    use crate::formula::validate_formula;

    fn compiled(text: &str, target: i64) -> super::CompiledArtifacts {
        let known = [7, 8, 11].into_iter().collect();
        let formula = validate_formula(text, &known, Some(target)).unwrap();
        compile(target, &formula)
    }

    #[test]
    fn names_derive_from_target_id() {
        assert_eq!(function_name(42), "compute_derived_attr_42");
        assert_eq!(rule_name(42), "trigger_compute_derived_attr_42");
        assert_eq!(update_rule_name(42), "trigger_compute_derived_attr_42_update");
    }

    #[test]
    fn backfill_joins_every_dependency_on_timestamp() {
        let artifacts = compiled("$7 + $8", 9);
        assert_eq!(artifacts.backfill.dependencies, vec![7, 8]);
        assert_eq!(
            artifacts.backfill.select_sql,
            "SELECT d0.timestamp, d0.value, d1.value\n\
             FROM archive AS d0\n\
             INNER JOIN archive AS d1 ON d1.attribute_id = 8 AND d1.timestamp = d0.timestamp\n\
             WHERE d0.attribute_id = 7\n  \
             AND d0.value IS NOT NULL\n  \
             AND d1.value IS NOT NULL\n\
             ORDER BY d0.timestamp ASC;"
        );
    }

    #[test]
    fn view_renders_fully_parenthesized_real_arithmetic() {
        let artifacts = compiled("($7 - 3) * -$8 / 2", 9);
        assert_eq!(
            artifacts.rule.create_function_sql,
            "CREATE VIEW compute_derived_attr_9 AS\n\
             SELECT d0.timestamp AS timestamp, (((d0.value - 3.0) * (-d1.value)) / 2.0) AS value\n\
             FROM archive AS d0\n\
             INNER JOIN archive AS d1 ON d1.attribute_id = 8 AND d1.timestamp = d0.timestamp\n\
             WHERE d0.attribute_id = 7\n  \
             AND d0.value IS NOT NULL\n  \
             AND d1.value IS NOT NULL;"
        );
    }

    #[test]
    fn triggers_fire_only_for_dependency_writes_and_upsert() {
        let artifacts = compiled("$11 * $7", 12);
        assert_eq!(
            artifacts.rule.create_insert_trigger_sql,
            "CREATE TRIGGER trigger_compute_derived_attr_12\n\
             AFTER INSERT ON archive\n\
             FOR EACH ROW\n\
             WHEN NEW.attribute_id IN (11, 7)\n\
             BEGIN\n    \
             INSERT INTO archive (attribute_id, timestamp, value)\n    \
             SELECT 12, timestamp, value\n    \
             FROM compute_derived_attr_12\n    \
             WHERE timestamp = NEW.timestamp\n    \
             ON CONFLICT (attribute_id, timestamp) DO UPDATE SET value = excluded.value;\n\
             END;"
        );
        assert!(artifacts
            .rule
            .create_update_trigger_sql
            .starts_with("CREATE TRIGGER trigger_compute_derived_attr_12_update\nAFTER UPDATE OF value ON archive\n"));
    }

    #[test]
    fn single_dependency_needs_no_join() {
        let artifacts = compiled("$7 * 1.5", 9);
        assert_eq!(
            artifacts.backfill.select_sql,
            "SELECT d0.timestamp, d0.value\n\
             FROM archive AS d0\n\
             WHERE d0.attribute_id = 7\n  \
             AND d0.value IS NOT NULL\n\
             ORDER BY d0.timestamp ASC;"
        );
    }

    #[test]
    fn repeated_reference_reuses_one_alias() {
        let artifacts = compiled("$7 * $7 + $8", 9);
        assert!(artifacts
            .rule
            .create_function_sql
            .contains("((d0.value * d0.value) + d1.value)"));
    }

    #[test]
    fn drop_statements_remove_triggers_before_view() {
        let statements = drop_statements(9);
        assert_eq!(
            statements,
            [
                "DROP TRIGGER IF EXISTS trigger_compute_derived_attr_9;".to_string(),
                "DROP TRIGGER IF EXISTS trigger_compute_derived_attr_9_update;".to_string(),
                "DROP VIEW IF EXISTS compute_derived_attr_9;".to_string(),
            ]
        );
    }
}
