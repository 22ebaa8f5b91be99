//! SQL text generation for compiled artifacts.

use crate::formula::Expr;
use crate::model::AttributeId;
use std::fmt::Write;

/// Self-join of `archive` over every dependency, aliased `d0..dn`.
pub(super) struct JoinClause {
    from_sql: String,
    value_columns: Vec<String>,
}

impl JoinClause {
    pub(super) fn new(dependencies: &[AttributeId]) -> Self {
        let mut from_sql = String::from("FROM archive AS d0\n");
        for (index, dependency) in dependencies.iter().enumerate().skip(1) {
            let _ = writeln!(
                from_sql,
                "INNER JOIN archive AS d{index} ON d{index}.attribute_id = {dependency} AND d{index}.timestamp = d0.timestamp"
            );
        }
        let first = dependencies.first().copied().unwrap_or_default();
        let _ = write!(from_sql, "WHERE d0.attribute_id = {first}");
        for index in 0..dependencies.len() {
            let _ = write!(from_sql, "\n  AND d{index}.value IS NOT NULL");
        }

        Self {
            from_sql,
            value_columns: (0..dependencies.len())
                .map(|index| format!("d{index}.value"))
                .collect(),
        }
    }
}

pub(super) fn backfill_select(join: &JoinClause) -> String {
    format!(
        "SELECT d0.timestamp, {}\n{}\nORDER BY d0.timestamp ASC;",
        join.value_columns.join(", "),
        join.from_sql
    )
}

pub(super) fn create_view(name: &str, join: &JoinClause, value_sql: &str) -> String {
    format!(
        "CREATE VIEW {name} AS\nSELECT d0.timestamp AS timestamp, {value_sql} AS value\n{};",
        join.from_sql
    )
}

#[derive(Debug, Clone, Copy)]
pub(super) enum TriggerEvent {
    Insert,
    UpdateOfValue,
}

impl TriggerEvent {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::UpdateOfValue => "UPDATE OF value",
        }
    }
}

pub(super) fn create_trigger(
    name: &str,
    event: TriggerEvent,
    target: AttributeId,
    function_name: &str,
    dependencies: &[AttributeId],
) -> String {
    let watched = dependencies
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TRIGGER {name}\n\
         AFTER {event} ON archive\n\
         FOR EACH ROW\n\
         WHEN NEW.attribute_id IN ({watched})\n\
         BEGIN\n    \
         INSERT INTO archive (attribute_id, timestamp, value)\n    \
         SELECT {target}, timestamp, value\n    \
         FROM {function_name}\n    \
         WHERE timestamp = NEW.timestamp\n    \
         ON CONFLICT (attribute_id, timestamp) DO UPDATE SET value = excluded.value;\n\
         END;",
        event = event.as_sql(),
    )
}

/// Renders `expr` with every reference mapped to its join alias.
pub(super) fn render_expression(expr: &Expr, dependencies: &[AttributeId]) -> String {
    let mut out = String::new();
    render_into(expr, dependencies, &mut out);
    out
}

fn render_into(expr: &Expr, dependencies: &[AttributeId], out: &mut String) {
    match expr {
        Expr::Constant(value) => out.push_str(&render_literal(*value)),
        Expr::Reference(id) => {
            let index = dependencies
                .iter()
                .position(|dependency| dependency == id)
                .unwrap_or_default();
            let _ = write!(out, "d{index}.value");
        }
        Expr::Negate(inner) => {
            out.push_str("(-");
            render_into(inner, dependencies, out);
            out.push(')');
        }
        Expr::Binary { op, left, right } => {
            out.push('(');
            render_into(left, dependencies, out);
            let _ = write!(out, " {} ", op.symbol());
            render_into(right, dependencies, out);
            out.push(')');
        }
    }
}

/// Literals always carry a fractional part so the store computes in REAL.
fn render_literal(value: f64) -> String {
    let rendered = value.to_string();
    if rendered.contains(['.', 'e', 'E']) {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::render_literal;

    #[test]
    fn literals_render_as_reals() {
        assert_eq!(render_literal(3.0), "3.0");
        assert_eq!(render_literal(0.25), "0.25");
        assert_eq!(render_literal(1200.0), "1200.0");
    }
}
