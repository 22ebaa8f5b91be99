use attrflow_core::consistency::{installed_rule_ids, rule_installed, UNIQUE_INDEX_NAME};
use attrflow_core::db::open_db_in_memory;
use attrflow_core::repo::attribute_repo::{AttributeRepository, SqliteAttributeRepository};
use attrflow_core::repo::element_repo::{ElementRepository, SqliteElementRepository};
use attrflow_core::repo::measurement_repo::{MeasurementRepository, SqliteMeasurementRepository};
use attrflow_core::service::lifecycle::{AttributeField, CreateOutcome, RuleChange};
use attrflow_core::{
    AttributeId, AttributeLifecycle, CreateAttributeRequest, ElementId, LifecycleError,
    MeasurementRecord, TimeRange, Timestamp, UpdateAttributeRequest,
};
use rusqlite::Connection;

const T1: Timestamp = 1_700_000_000_000;
const T2: Timestamp = 1_700_000_060_000;
const T3: Timestamp = 1_700_000_120_000;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn element(conn: &Connection, name: &str) -> ElementId {
    SqliteElementRepository::new(conn)
        .create_element(name, None)
        .unwrap()
        .element_id
}

fn source(conn: &Connection, element_id: ElementId, name: &str) -> AttributeId {
    AttributeLifecycle::new(conn)
        .create_attribute(&CreateAttributeRequest {
            element_id,
            name: name.to_string(),
            code: None,
            formula: None,
        })
        .unwrap()
        .attribute
        .attribute_id
}

fn try_derived(
    conn: &Connection,
    element_id: ElementId,
    name: &str,
    formula: &str,
) -> Result<CreateOutcome, LifecycleError> {
    AttributeLifecycle::new(conn).create_attribute(&CreateAttributeRequest {
        element_id,
        name: name.to_string(),
        code: None,
        formula: Some(formula.to_string()),
    })
}

fn derived(conn: &Connection, element_id: ElementId, name: &str, formula: &str) -> CreateOutcome {
    try_derived(conn, element_id, name, formula).unwrap()
}

fn write(conn: &Connection, attribute_id: AttributeId, timestamp: Timestamp, value: Option<f64>) {
    SqliteMeasurementRepository::new(conn)
        .upsert_measurement(&MeasurementRecord::new(attribute_id, timestamp, value))
        .unwrap();
}

fn series(conn: &Connection, attribute_id: AttributeId) -> Vec<(Timestamp, Option<f64>)> {
    SqliteMeasurementRepository::new(conn)
        .list_measurements(attribute_id, TimeRange::all())
        .unwrap()
        .into_iter()
        .map(|record| (record.timestamp, record.value))
        .collect()
}

fn attribute_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM attribute;", [], |row| row.get(0))
        .unwrap()
}

/// Element with sources `a` and `b`, where a=10 and b=20 at T1.
fn seeded() -> (Connection, ElementId, AttributeId, AttributeId) {
    let conn = setup();
    let plant = element(&conn, "Plant");
    let a = source(&conn, plant, "A");
    let b = source(&conn, plant, "B");
    write(&conn, a, T1, Some(10.0));
    write(&conn, b, T1, Some(20.0));
    (conn, plant, a, b)
}

#[test]
fn concrete_scenario_backfills_then_maintains_incrementally() {
    let (conn, plant, a, b) = seeded();

    let created = derived(&conn, plant, "Sum", &format!("${a}+${b}"));
    let sum = created.attribute.attribute_id;
    assert_eq!(created.rows_computed, 1);
    assert_eq!(created.attribute.dependencies, vec![a, b]);
    assert!(created.attribute.rule_name.is_some());
    assert_eq!(series(&conn, sum), vec![(T1, Some(30.0))]);

    write(&conn, a, T2, Some(5.0));
    assert_eq!(series(&conn, sum), vec![(T1, Some(30.0))]);

    write(&conn, b, T2, Some(15.0));
    assert_eq!(series(&conn, sum), vec![(T1, Some(30.0)), (T2, Some(20.0))]);
}

#[test]
fn insertion_order_does_not_change_the_derived_row() {
    let (conn, plant, a, b) = seeded();
    let product = derived(&conn, plant, "Product", &format!("${a} * ${b} - 1"))
        .attribute
        .attribute_id;

    write(&conn, a, 100, Some(3.0));
    write(&conn, b, 100, Some(4.0));
    write(&conn, b, 200, Some(4.0));
    write(&conn, a, 200, Some(3.0));

    let rows = series(&conn, product);
    assert_eq!(
        rows,
        vec![(100, Some(11.0)), (200, Some(11.0)), (T1, Some(199.0))]
    );
}

#[test]
fn overwriting_a_dependency_recomputes_without_duplicates() {
    let (conn, plant, a, b) = seeded();
    let sum = derived(&conn, plant, "Sum", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    write(&conn, a, T1, Some(11.0));
    write(&conn, a, T1, Some(12.0));

    assert_eq!(series(&conn, sum), vec![(T1, Some(32.0))]);
}

#[test]
fn value_absent_dependency_blocks_computation() {
    let (conn, plant, a, b) = seeded();
    let sum = derived(&conn, plant, "Sum", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    write(&conn, a, T2, None);
    write(&conn, b, T2, Some(1.0));

    assert_eq!(series(&conn, sum), vec![(T1, Some(30.0))]);
}

#[test]
fn division_by_zero_stores_a_value_absent_record_on_both_paths() {
    let (conn, plant, a, b) = seeded();
    write(&conn, b, T2, Some(0.0));
    write(&conn, a, T2, Some(1.0));

    let ratio = derived(&conn, plant, "Ratio", &format!("${a} / ${b}"))
        .attribute
        .attribute_id;
    assert_eq!(series(&conn, ratio), vec![(T1, Some(0.5)), (T2, None)]);

    write(&conn, a, T3, Some(4.0));
    write(&conn, b, T3, Some(0.0));
    assert_eq!(series(&conn, ratio).last(), Some(&(T3, None)));
}

#[test]
fn integer_looking_literals_use_real_arithmetic() {
    let (conn, plant, a, _) = seeded();
    write(&conn, a, T2, Some(3.0));

    let half = derived(&conn, plant, "Half", &format!("${a} / 2"))
        .attribute
        .attribute_id;
    write(&conn, a, 500, Some(3.0));

    assert_eq!(
        series(&conn, half),
        vec![(500, Some(1.5)), (T1, Some(5.0)), (T2, Some(1.5))]
    );
}

#[test]
fn backfill_is_idempotent() {
    let (conn, plant, a, b) = seeded();
    write(&conn, a, T2, Some(1.0));
    write(&conn, b, T2, Some(2.0));
    let sum = derived(&conn, plant, "Sum", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;
    let lifecycle = AttributeLifecycle::new(&conn);

    let first = lifecycle.backfill(sum).unwrap();
    let after_first = series(&conn, sum);
    let second = lifecycle.backfill(sum).unwrap();

    assert_eq!(first.rows_computed, 2);
    assert_eq!(second.rows_computed, 2);
    assert_eq!(series(&conn, sum), after_first);
    assert_eq!(after_first, vec![(T1, Some(30.0)), (T2, Some(3.0))]);
}

#[test]
fn backfill_does_not_touch_the_rule() {
    let (conn, plant, a, b) = seeded();
    let sum = derived(&conn, plant, "Sum", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    AttributeLifecycle::new(&conn).backfill(sum).unwrap();

    assert!(rule_installed(&conn, sum).unwrap());
}

#[test]
fn update_with_recompute_replaces_history_and_rule() {
    let (conn, plant, a, b) = seeded();
    let target = derived(&conn, plant, "Target", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    let outcome = AttributeLifecycle::new(&conn)
        .update_attribute(
            target,
            &UpdateAttributeRequest {
                formula: Some(format!("${a} * ${b}")),
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap();

    assert_eq!(outcome.changed_fields, vec![AttributeField::Formula]);
    assert_eq!(outcome.rows_deleted, 1);
    assert_eq!(outcome.rows_computed, 1);
    assert_eq!(outcome.rule, RuleChange::Replaced);
    assert_eq!(outcome.attribute.formula, Some(format!("${a} * ${b}")));
    assert_eq!(series(&conn, target), vec![(T1, Some(200.0))]);

    write(&conn, a, T2, Some(2.0));
    write(&conn, b, T2, Some(3.0));
    assert_eq!(series(&conn, target), vec![(T1, Some(200.0)), (T2, Some(6.0))]);
}

#[test]
fn update_without_recompute_keeps_history_and_uses_new_formula_forward() {
    let (conn, plant, a, b) = seeded();
    let target = derived(&conn, plant, "Target", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    let outcome = AttributeLifecycle::new(&conn)
        .update_attribute(
            target,
            &UpdateAttributeRequest {
                formula: Some(format!("${a} * ${b}")),
                recompute_archive: false,
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap();
    assert_eq!(outcome.rows_deleted, 0);
    assert_eq!(outcome.rows_computed, 0);

    write(&conn, a, T2, Some(2.0));
    write(&conn, b, T2, Some(3.0));
    assert_eq!(series(&conn, target), vec![(T1, Some(30.0)), (T2, Some(6.0))]);
}

#[test]
fn update_can_narrow_dependencies_to_one_attribute() {
    let (conn, plant, a, b) = seeded();
    let target = derived(&conn, plant, "Target", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    let outcome = AttributeLifecycle::new(&conn)
        .update_attribute(
            target,
            &UpdateAttributeRequest {
                formula: Some(format!("-${a}")),
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap();
    assert_eq!(outcome.attribute.dependencies, vec![a]);

    write(&conn, b, T2, Some(1.0));
    write(&conn, a, T2, Some(4.0));
    assert_eq!(series(&conn, target), vec![(T1, Some(-10.0)), (T2, Some(-4.0))]);
}

#[test]
fn update_without_rule_leaves_attribute_derived_but_inert() {
    let (conn, plant, a, b) = seeded();
    let target = derived(&conn, plant, "Target", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;
    let lifecycle = AttributeLifecycle::new(&conn);

    let outcome = lifecycle
        .update_attribute(
            target,
            &UpdateAttributeRequest {
                formula: Some(format!("${a} - ${b}")),
                recreate_rule: false,
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap();

    assert_eq!(outcome.rule, RuleChange::Removed);
    assert_eq!(outcome.attribute.rule_name, None);
    assert!(lifecycle.is_derived(target).unwrap());
    assert!(!rule_installed(&conn, target).unwrap());
    assert!(!installed_rule_ids(&conn).unwrap().contains(&target));

    write(&conn, a, T2, Some(2.0));
    write(&conn, b, T2, Some(3.0));
    assert_eq!(series(&conn, target), vec![(T1, Some(-10.0))]);
}

#[test]
fn update_with_identical_formula_changes_nothing() {
    let (conn, plant, a, b) = seeded();
    let formula = format!("${a} + ${b}");
    let target = derived(&conn, plant, "Target", &formula).attribute.attribute_id;

    let outcome = AttributeLifecycle::new(&conn)
        .update_attribute(
            target,
            &UpdateAttributeRequest {
                formula: Some(format!("  {formula} ")),
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap();

    assert!(outcome.changed_fields.is_empty());
    assert_eq!(outcome.rule, RuleChange::Unchanged);
    assert_eq!(outcome.rows_deleted, 0);
    assert!(rule_installed(&conn, target).unwrap());
}

#[test]
fn update_reports_name_and_code_changes_on_derived_attribute() {
    let (conn, plant, a, b) = seeded();
    let target = derived(&conn, plant, "Target", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    let outcome = AttributeLifecycle::new(&conn)
        .update_attribute(
            target,
            &UpdateAttributeRequest {
                name: Some(" Renamed ".to_string()),
                code: Some("10LBA10CP001".to_string()),
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap();

    assert_eq!(
        outcome.changed_fields,
        vec![AttributeField::Name, AttributeField::Code]
    );
    assert_eq!(outcome.attribute.name, "Renamed");
    assert_eq!(outcome.attribute.code.as_deref(), Some("10LBA10CP001"));
    assert_eq!(outcome.rule, RuleChange::Unchanged);
}

#[test]
fn empty_update_is_rejected() {
    let (conn, plant, a, b) = seeded();
    let target = derived(&conn, plant, "Target", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    let err = AttributeLifecycle::new(&conn)
        .update_attribute(target, &UpdateAttributeRequest::default())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::EmptyUpdate));
}

#[test]
fn source_attributes_reject_formula_operations_and_stay_unchanged() {
    let (conn, _, a, b) = seeded();
    let repo = SqliteAttributeRepository::new(&conn);
    let before = repo.get_attribute(a).unwrap();
    let lifecycle = AttributeLifecycle::new(&conn);

    let err = lifecycle
        .update_attribute(
            a,
            &UpdateAttributeRequest {
                formula: Some(format!("${b} * 2")),
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotDerived(id) if id == a));

    let err = lifecycle.backfill(a).unwrap_err();
    assert!(matches!(err, LifecycleError::NotDerived(id) if id == a));

    assert_eq!(repo.get_attribute(a).unwrap(), before);
    assert_eq!(series(&conn, a), vec![(T1, Some(10.0))]);
    assert!(installed_rule_ids(&conn).unwrap().is_empty());
}

#[test]
fn source_attributes_can_be_renamed() {
    let (conn, _, a, _) = seeded();
    let lifecycle = AttributeLifecycle::new(&conn);

    let renamed = lifecycle
        .rename_attribute(a, Some("Inlet pressure"), Some("10LBA10CP001"))
        .unwrap();
    assert_eq!(renamed.name, "Inlet pressure");
    assert_eq!(renamed.code.as_deref(), Some("10LBA10CP001"));
    assert!(!lifecycle.is_derived(a).unwrap());

    let err = lifecycle.rename_attribute(a, None, None).unwrap_err();
    assert!(matches!(err, LifecycleError::EmptyUpdate));
}

#[test]
fn validation_failures_leave_no_attribute_behind() {
    let (conn, plant, a, _) = seeded();
    let before = attribute_count(&conn);

    let err = try_derived(&conn, plant, "Bad", &format!("(${a} + 1")).unwrap_err();
    assert!(matches!(err, LifecycleError::FormulaSyntax { position: 0, .. }));

    let err = try_derived(&conn, plant, "Bad", &format!("${a} + $999")).unwrap_err();
    assert!(matches!(err, LifecycleError::UnknownAttributeReference(ref ids) if ids == &vec![999]));

    let err = try_derived(&conn, plant, "Bad", "1 + 2").unwrap_err();
    assert!(matches!(err, LifecycleError::EmptyDependencySet));

    let err = try_derived(&conn, plant, "Bad", &format!("abs(${a})")).unwrap_err();
    assert!(err.is_validation());

    assert_eq!(attribute_count(&conn), before);
    assert!(installed_rule_ids(&conn).unwrap().is_empty());
}

#[test]
fn create_on_unknown_element_fails_cleanly() {
    let (conn, _, a, _) = seeded();
    let before = attribute_count(&conn);

    let err = try_derived(&conn, 404, "Orphan", &format!("${a} * 2")).unwrap_err();

    assert!(matches!(err, LifecycleError::ElementNotFound(404)));
    assert_eq!(attribute_count(&conn), before);
}

#[test]
fn self_reference_is_rejected_on_update() {
    let (conn, plant, a, _) = seeded();
    let target = derived(&conn, plant, "Target", &format!("${a} * 2"))
        .attribute
        .attribute_id;

    let err = AttributeLifecycle::new(&conn)
        .update_attribute(
            target,
            &UpdateAttributeRequest {
                formula: Some(format!("${target} + ${a}")),
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap_err();

    assert!(matches!(err, LifecycleError::SelfReference(id) if id == target));
    assert_eq!(series(&conn, target), vec![(T1, Some(20.0))]);
}

#[test]
fn chained_derivation_propagates_in_either_write_order() {
    let (conn, plant, a, b) = seeded();
    let doubled = derived(&conn, plant, "Doubled", &format!("${a} * 2"))
        .attribute
        .attribute_id;
    let chained = derived(&conn, plant, "Chained", &format!("${doubled} + ${b}"));
    assert_eq!(chained.rows_computed, 1);
    let chained = chained.attribute.attribute_id;
    assert_eq!(series(&conn, chained), vec![(T1, Some(40.0))]);

    write(&conn, a, 100, Some(3.0));
    write(&conn, b, 100, Some(4.0));
    write(&conn, b, 200, Some(4.0));
    write(&conn, a, 200, Some(3.0));

    assert_eq!(
        series(&conn, chained),
        vec![(100, Some(10.0)), (200, Some(10.0)), (T1, Some(40.0))]
    );
}

#[test]
fn cycles_across_the_graph_are_rejected() {
    let (conn, plant, a, _) = seeded();
    let first = derived(&conn, plant, "First", &format!("${a} * 2"))
        .attribute
        .attribute_id;
    let second = derived(&conn, plant, "Second", &format!("${first} + 1"))
        .attribute
        .attribute_id;

    let err = AttributeLifecycle::new(&conn)
        .update_attribute(
            first,
            &UpdateAttributeRequest {
                formula: Some(format!("${second} - 1")),
                ..UpdateAttributeRequest::default()
            },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::CycleDetected { attribute_id, dependency }
            if attribute_id == first && dependency == second
    ));
    assert_eq!(
        AttributeLifecycle::new(&conn).get_dependencies(first).unwrap(),
        vec![a]
    );
}

#[test]
fn delete_removes_rule_then_records_then_row() {
    let (conn, plant, a, b) = seeded();
    let sum = derived(&conn, plant, "Sum", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;
    let lifecycle = AttributeLifecycle::new(&conn);

    let outcome = lifecycle.delete_attribute(sum).unwrap();

    assert!(outcome.rule_removed);
    assert_eq!(outcome.rows_deleted, 1);
    assert!(SqliteAttributeRepository::new(&conn)
        .get_attribute(sum)
        .unwrap()
        .is_none());
    assert!(installed_rule_ids(&conn).unwrap().is_empty());

    write(&conn, a, T2, Some(1.0));
    write(&conn, b, T2, Some(1.0));
    assert!(series(&conn, sum).is_empty());
    assert!(matches!(
        lifecycle.is_derived(sum).unwrap_err(),
        LifecycleError::AttributeNotFound(id) if id == sum
    ));
}

#[test]
fn deleting_a_dependency_is_refused_until_dependents_are_gone() {
    let (conn, plant, a, b) = seeded();
    let sum = derived(&conn, plant, "Sum", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;
    let lifecycle = AttributeLifecycle::new(&conn);

    let err = lifecycle.delete_attribute(a).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::HasDependents { attribute_id, ref dependents }
            if attribute_id == a && dependents == &vec![sum]
    ));
    assert_eq!(series(&conn, a), vec![(T1, Some(10.0))]);

    lifecycle.delete_attribute(sum).unwrap();
    let outcome = lifecycle.delete_attribute(a).unwrap();
    assert!(!outcome.rule_removed);
    assert_eq!(outcome.rows_deleted, 1);
}

#[test]
fn delete_element_removes_dependents_before_dependencies() {
    let conn = setup();
    let unit = element(&conn, "Unit");
    let a = source(&conn, unit, "A");
    let doubled = derived(&conn, unit, "Doubled", &format!("${a} * 2"))
        .attribute
        .attribute_id;
    let quadrupled = derived(&conn, unit, "Quadrupled", &format!("${doubled} * 2"))
        .attribute
        .attribute_id;
    write(&conn, a, T1, Some(1.0));
    assert_eq!(series(&conn, quadrupled), vec![(T1, Some(4.0))]);

    let outcome = AttributeLifecycle::new(&conn).delete_element(unit).unwrap();

    let order = outcome
        .attributes
        .iter()
        .map(|deleted| deleted.attribute_id)
        .collect::<Vec<_>>();
    assert_eq!(order, vec![quadrupled, doubled, a]);
    assert_eq!(attribute_count(&conn), 0);
    assert!(installed_rule_ids(&conn).unwrap().is_empty());
    assert!(SqliteElementRepository::new(&conn)
        .get_element(unit)
        .unwrap()
        .is_none());
}

#[test]
fn delete_element_refuses_children_and_outside_dependents() {
    let conn = setup();
    let root = element(&conn, "Root");
    let child = SqliteElementRepository::new(&conn)
        .create_element("Child", Some(root))
        .unwrap()
        .element_id;
    let other = element(&conn, "Other");
    let a = source(&conn, child, "A");
    derived(&conn, other, "Outside", &format!("${a} + 1"));
    let lifecycle = AttributeLifecycle::new(&conn);

    assert!(matches!(
        lifecycle.delete_element(root).unwrap_err(),
        LifecycleError::ElementHasChildren(id) if id == root
    ));
    assert!(matches!(
        lifecycle.delete_element(child).unwrap_err(),
        LifecycleError::HasDependents { attribute_id, .. } if attribute_id == a
    ));
    assert_eq!(attribute_count(&conn), 2);
}

#[test]
fn missing_uniqueness_constraint_with_duplicates_fails_without_partial_state() {
    let (conn, plant, a, b) = seeded();
    conn.execute_batch(&format!("DROP INDEX {UNIQUE_INDEX_NAME};"))
        .unwrap();
    conn.execute(
        "INSERT INTO archive (attribute_id, timestamp, value) VALUES (?1, ?2, 11.0);",
        rusqlite::params![a, T1],
    )
    .unwrap();
    let before = attribute_count(&conn);

    let err = try_derived(&conn, plant, "Sum", &format!("${a} + ${b}")).unwrap_err();

    assert!(matches!(err, LifecycleError::ConstraintMissing(_)));
    assert_eq!(attribute_count(&conn), before);
    assert!(installed_rule_ids(&conn).unwrap().is_empty());
}

#[test]
fn missing_uniqueness_constraint_is_recreated_on_demand() {
    let (conn, plant, a, b) = seeded();
    conn.execute_batch(&format!("DROP INDEX {UNIQUE_INDEX_NAME};"))
        .unwrap();

    let sum = derived(&conn, plant, "Sum", &format!("${a} + ${b}"))
        .attribute
        .attribute_id;

    assert!(attrflow_core::consistency::unique_constraint_present(&conn).unwrap());
    write(&conn, a, T1, Some(1.0));
    assert_eq!(series(&conn, sum), vec![(T1, Some(21.0))]);
}

#[test]
fn failed_rule_installation_rolls_back_row_and_backfill() {
    let (conn, plant, a, b) = seeded();
    let next_id: AttributeId = conn
        .query_row(
            "SELECT COALESCE(MAX(attribute_id), 0) + 1 FROM attribute;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    // An unrelated table squatting on the view name makes installation fail.
    conn.execute_batch(&format!(
        "CREATE TABLE compute_derived_attr_{next_id} (placeholder INTEGER);"
    ))
    .unwrap();
    let before = attribute_count(&conn);

    let err = try_derived(&conn, plant, "Sum", &format!("${a} + ${b}")).unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::RuleInstallation { attribute_id, .. } if attribute_id == next_id
    ));
    assert_eq!(attribute_count(&conn), before);
    assert!(series(&conn, next_id).is_empty());
    assert!(!rule_installed(&conn, next_id).unwrap());
}

#[test]
fn dependencies_are_reported_in_formula_order() {
    let (conn, plant, a, b) = seeded();
    let target = derived(&conn, plant, "Target", &format!("(${b} - ${a}) / ${b}"))
        .attribute
        .attribute_id;
    let lifecycle = AttributeLifecycle::new(&conn);

    assert_eq!(lifecycle.get_dependencies(target).unwrap(), vec![b, a]);
    assert!(lifecycle.get_dependencies(a).unwrap().is_empty());
    assert!(lifecycle.is_derived(target).unwrap());
    assert!(!lifecycle.is_derived(b).unwrap());
}
