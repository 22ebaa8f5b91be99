//! Attribute repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist attribute rows together with their ordered dependency set.
//! - Answer the read-only existence and dependency queries the formula
//!   validator and lifecycle manager need.
//!
//! # Invariants
//! - `attribute_dependency` rows are written only alongside a formula.
//! - A persisted rule name without a formula is rejected as invalid data.

use super::{normalize_name, RepoError, RepoResult};
use crate::model::attribute::Attribute;
use crate::model::element::Element;
use crate::model::{AttributeId, ElementId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};

const ATTRIBUTE_SELECT_SQL: &str = "SELECT
    attribute_id,
    element_id,
    name,
    code,
    formula,
    rule_name
FROM attribute";

/// Insert payload for one attribute row.
#[derive(Debug, Clone, Copy)]
pub struct NewAttribute<'a> {
    pub element_id: ElementId,
    pub name: &'a str,
    pub code: Option<&'a str>,
    pub formula: Option<&'a str>,
    pub dependencies: &'a [AttributeId],
}

/// Repository interface for attribute persistence.
pub trait AttributeRepository {
    /// Inserts one attribute and its dependency rows.
    fn insert_attribute(&self, attribute: &NewAttribute<'_>) -> RepoResult<Attribute>;
    /// Loads one attribute with its dependency set.
    fn get_attribute(&self, attribute_id: AttributeId) -> RepoResult<Option<Attribute>>;
    /// Loads the first attribute with an exact name, optionally within one element.
    fn find_by_name(
        &self,
        name: &str,
        element_id: Option<ElementId>,
    ) -> RepoResult<Option<Attribute>>;
    /// Case-insensitive `LIKE` search, optionally within one element.
    fn search_by_name(
        &self,
        pattern: &str,
        element_id: Option<ElementId>,
    ) -> RepoResult<Vec<Attribute>>;
    /// Lists attributes owned by one element.
    fn list_by_element(&self, element_id: ElementId) -> RepoResult<Vec<Attribute>>;
    /// Returns the subset of `candidates` that exist.
    fn existing_ids(&self, candidates: &[AttributeId]) -> RepoResult<BTreeSet<AttributeId>>;
    /// Returns the ordered dependency set of one attribute.
    fn dependencies_of(&self, attribute_id: AttributeId) -> RepoResult<Vec<AttributeId>>;
    /// Returns ids of attributes whose formula references `attribute_id`.
    fn dependents_of(&self, attribute_id: AttributeId) -> RepoResult<Vec<AttributeId>>;
    /// Updates name and/or code. `None` keeps the stored value.
    fn set_names(
        &self,
        attribute_id: AttributeId,
        name: Option<&str>,
        code: Option<&str>,
    ) -> RepoResult<()>;
    /// Replaces formula and dependency set.
    fn set_formula(
        &self,
        attribute_id: AttributeId,
        formula: &str,
        dependencies: &[AttributeId],
    ) -> RepoResult<()>;
    /// Records or clears the installed rule handle.
    fn set_rule_name(&self, attribute_id: AttributeId, rule_name: Option<&str>)
        -> RepoResult<()>;
    /// Deletes the attribute row; dependency rows cascade.
    fn delete_attribute(&self, attribute_id: AttributeId) -> RepoResult<()>;
    /// Maps full hierarchy paths (`\\Root|Child|Attribute`) to attribute ids.
    fn path_mapping(&self) -> RepoResult<BTreeMap<String, AttributeId>>;
}

/// SQLite-backed attribute repository.
pub struct SqliteAttributeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttributeRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Attribute>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut attributes = Vec::new();
        while let Some(row) = rows.next()? {
            attributes.push(parse_attribute_row(row)?);
        }
        drop(rows);

        for attribute in &mut attributes {
            attribute.dependencies = self.dependencies_of(attribute.attribute_id)?;
        }
        Ok(attributes)
    }
}

impl AttributeRepository for SqliteAttributeRepository<'_> {
    fn insert_attribute(&self, attribute: &NewAttribute<'_>) -> RepoResult<Attribute> {
        let name = normalize_name(attribute.name, "attribute")?;
        if attribute.formula.is_none() && !attribute.dependencies.is_empty() {
            return Err(RepoError::InvalidInput(
                "dependencies require a formula".to_string(),
            ));
        }

        let element_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM element WHERE element_id = ?1);",
            [attribute.element_id],
            |row| row.get(0),
        )?;
        if element_exists != 1 {
            return Err(RepoError::ElementNotFound(attribute.element_id));
        }

        self.conn.execute(
            "INSERT INTO attribute (element_id, name, code, formula, rule_name)
             VALUES (?1, ?2, ?3, ?4, NULL);",
            params![
                attribute.element_id,
                name,
                attribute.code,
                attribute.formula
            ],
        )?;
        let attribute_id = self.conn.last_insert_rowid();
        write_dependencies(self.conn, attribute_id, attribute.dependencies)?;

        Ok(Attribute {
            attribute_id,
            element_id: attribute.element_id,
            name,
            code: attribute.code.map(str::to_string),
            formula: attribute.formula.map(str::to_string),
            dependencies: attribute.dependencies.to_vec(),
            rule_name: None,
        })
    }

    fn get_attribute(&self, attribute_id: AttributeId) -> RepoResult<Option<Attribute>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ATTRIBUTE_SELECT_SQL} WHERE attribute_id = ?1;"))?;
        let attribute = stmt
            .query_row([attribute_id], |row| Ok(parse_attribute_row(row)))
            .optional()?
            .transpose()?;

        match attribute {
            Some(mut attribute) => {
                attribute.dependencies = self.dependencies_of(attribute_id)?;
                Ok(Some(attribute))
            }
            None => Ok(None),
        }
    }

    fn find_by_name(
        &self,
        name: &str,
        element_id: Option<ElementId>,
    ) -> RepoResult<Option<Attribute>> {
        let mut sql = format!("{ATTRIBUTE_SELECT_SQL} WHERE name = ?");
        let mut bind_values = vec![Value::Text(name.to_string())];
        if let Some(element_id) = element_id {
            sql.push_str(" AND element_id = ?");
            bind_values.push(Value::Integer(element_id));
        }
        sql.push_str(" ORDER BY attribute_id ASC LIMIT 1;");

        Ok(self.collect(&sql, bind_values)?.into_iter().next())
    }

    fn search_by_name(
        &self,
        pattern: &str,
        element_id: Option<ElementId>,
    ) -> RepoResult<Vec<Attribute>> {
        let mut sql = format!("{ATTRIBUTE_SELECT_SQL} WHERE LOWER(name) LIKE LOWER(?)");
        let mut bind_values = vec![Value::Text(pattern.to_string())];
        if let Some(element_id) = element_id {
            sql.push_str(" AND element_id = ?");
            bind_values.push(Value::Integer(element_id));
        }
        sql.push_str(" ORDER BY element_id ASC, name ASC, attribute_id ASC;");

        self.collect(&sql, bind_values)
    }

    fn list_by_element(&self, element_id: ElementId) -> RepoResult<Vec<Attribute>> {
        self.collect(
            &format!(
                "{ATTRIBUTE_SELECT_SQL}
                 WHERE element_id = ?
                 ORDER BY name ASC, attribute_id ASC;"
            ),
            vec![Value::Integer(element_id)],
        )
    }

    fn existing_ids(&self, candidates: &[AttributeId]) -> RepoResult<BTreeSet<AttributeId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT EXISTS(SELECT 1 FROM attribute WHERE attribute_id = ?1);")?;
        let mut existing = BTreeSet::new();
        for candidate in candidates {
            let exists: i64 = stmt.query_row([candidate], |row| row.get(0))?;
            if exists == 1 {
                existing.insert(*candidate);
            }
        }
        Ok(existing)
    }

    fn dependencies_of(&self, attribute_id: AttributeId) -> RepoResult<Vec<AttributeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT depends_on
             FROM attribute_dependency
             WHERE attribute_id = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([attribute_id])?;
        let mut dependencies = Vec::new();
        while let Some(row) = rows.next()? {
            dependencies.push(row.get(0)?);
        }
        Ok(dependencies)
    }

    fn dependents_of(&self, attribute_id: AttributeId) -> RepoResult<Vec<AttributeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT attribute_id
             FROM attribute_dependency
             WHERE depends_on = ?1
             ORDER BY attribute_id ASC;",
        )?;
        let mut rows = stmt.query([attribute_id])?;
        let mut dependents = Vec::new();
        while let Some(row) = rows.next()? {
            dependents.push(row.get(0)?);
        }
        Ok(dependents)
    }

    fn set_names(
        &self,
        attribute_id: AttributeId,
        name: Option<&str>,
        code: Option<&str>,
    ) -> RepoResult<()> {
        let name = name.map(|value| normalize_name(value, "attribute")).transpose()?;
        let changed = self.conn.execute(
            "UPDATE attribute
             SET name = COALESCE(?2, name),
                 code = COALESCE(?3, code)
             WHERE attribute_id = ?1;",
            params![attribute_id, name, code],
        )?;
        if changed == 0 {
            return Err(RepoError::AttributeNotFound(attribute_id));
        }
        Ok(())
    }

    fn set_formula(
        &self,
        attribute_id: AttributeId,
        formula: &str,
        dependencies: &[AttributeId],
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE attribute SET formula = ?2 WHERE attribute_id = ?1;",
            params![attribute_id, formula],
        )?;
        if changed == 0 {
            return Err(RepoError::AttributeNotFound(attribute_id));
        }
        self.conn.execute(
            "DELETE FROM attribute_dependency WHERE attribute_id = ?1;",
            [attribute_id],
        )?;
        write_dependencies(self.conn, attribute_id, dependencies)
    }

    fn set_rule_name(
        &self,
        attribute_id: AttributeId,
        rule_name: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE attribute SET rule_name = ?2 WHERE attribute_id = ?1;",
            params![attribute_id, rule_name],
        )?;
        if changed == 0 {
            return Err(RepoError::AttributeNotFound(attribute_id));
        }
        Ok(())
    }

    fn delete_attribute(&self, attribute_id: AttributeId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM attribute WHERE attribute_id = ?1;", [attribute_id])?;
        if changed == 0 {
            return Err(RepoError::AttributeNotFound(attribute_id));
        }
        Ok(())
    }

    fn path_mapping(&self) -> RepoResult<BTreeMap<String, AttributeId>> {
        let mut elements = BTreeMap::<i64, Element>::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT element_id, name, level, parent_id FROM element;")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let element = Element {
                    element_id: row.get(0)?,
                    name: row.get(1)?,
                    level: row.get(2)?,
                    parent_id: row.get(3)?,
                };
                elements.insert(element.element_id, element);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT attribute_id, element_id, name
             FROM attribute
             ORDER BY attribute_id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut mapping = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let attribute_id: AttributeId = row.get(0)?;
            let element_id: ElementId = row.get(1)?;
            let name: String = row.get(2)?;
            let element_path = element_path(&elements, element_id)?;
            mapping.insert(format!("\\\\{element_path}|{name}"), attribute_id);
        }
        Ok(mapping)
    }
}

fn write_dependencies(
    conn: &Connection,
    attribute_id: AttributeId,
    dependencies: &[AttributeId],
) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO attribute_dependency (attribute_id, position, depends_on)
         VALUES (?1, ?2, ?3);",
    )?;
    for (position, depends_on) in dependencies.iter().enumerate() {
        stmt.execute(params![attribute_id, position as i64, depends_on])?;
    }
    Ok(())
}

fn element_path(elements: &BTreeMap<i64, Element>, element_id: ElementId) -> RepoResult<String> {
    let mut parts = Vec::new();
    let mut cursor = Some(element_id);
    while let Some(current) = cursor {
        let element = elements.get(&current).ok_or_else(|| {
            RepoError::InvalidData(format!("dangling element reference {current}"))
        })?;
        parts.push(element.name.as_str());
        if parts.len() > elements.len() {
            return Err(RepoError::InvalidData(format!(
                "element hierarchy cycle through {current}"
            )));
        }
        cursor = element.parent_id;
    }
    parts.reverse();
    Ok(parts.join("|"))
}

fn parse_attribute_row(row: &Row<'_>) -> RepoResult<Attribute> {
    let attribute = Attribute {
        attribute_id: row.get("attribute_id")?,
        element_id: row.get("element_id")?,
        name: row.get("name")?,
        code: row.get("code")?,
        formula: row.get("formula")?,
        dependencies: Vec::new(),
        rule_name: row.get("rule_name")?,
    };
    if attribute.rule_name.is_some() && attribute.formula.is_none() {
        return Err(RepoError::InvalidData(format!(
            "attribute {} has a rule but no formula",
            attribute.attribute_id
        )));
    }
    Ok(attribute)
}
