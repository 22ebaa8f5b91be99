//! Element hierarchy repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide read/insert APIs over the `element` tree.
//! - Keep hierarchy ordering deterministic for browsing callers.
//!
//! # Invariants
//! - `level` of a new element is its parent's level plus one, 0 at the root.
//! - Listings are ordered `level ASC, name ASC, element_id ASC`.

use super::{normalize_name, RepoError, RepoResult};
use crate::model::element::Element;
use crate::model::ElementId;
use rusqlite::{params, Connection, OptionalExtension, Row};

const ELEMENT_SELECT_SQL: &str = "SELECT
    element_id,
    name,
    level,
    parent_id
FROM element";

/// Repository interface for the element tree.
pub trait ElementRepository {
    /// Inserts one element under an optional parent.
    fn create_element(&self, name: &str, parent_id: Option<ElementId>) -> RepoResult<Element>;
    /// Loads one element by id.
    fn get_element(&self, element_id: ElementId) -> RepoResult<Option<Element>>;
    /// Loads the first element with an exact name.
    fn find_by_name(&self, name: &str) -> RepoResult<Option<Element>>;
    /// Case-insensitive `LIKE` search (`%` and `_` wildcards).
    fn search_by_name(&self, pattern: &str) -> RepoResult<Vec<Element>>;
    /// Lists every element.
    fn list_elements(&self) -> RepoResult<Vec<Element>>;
    /// Lists direct children; `None` lists roots.
    fn list_children(&self, parent_id: Option<ElementId>) -> RepoResult<Vec<Element>>;
    /// Deletes the element row only. Callers clear attributes first.
    fn delete_element(&self, element_id: ElementId) -> RepoResult<()>;
}

/// SQLite-backed element repository.
pub struct SqliteElementRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteElementRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ElementRepository for SqliteElementRepository<'_> {
    fn create_element(&self, name: &str, parent_id: Option<ElementId>) -> RepoResult<Element> {
        let name = normalize_name(name, "element")?;
        let level = match parent_id {
            Some(parent_id) => {
                let parent = self
                    .get_element(parent_id)?
                    .ok_or(RepoError::ElementNotFound(parent_id))?;
                parent.level + 1
            }
            None => 0,
        };

        self.conn.execute(
            "INSERT INTO element (name, level, parent_id) VALUES (?1, ?2, ?3);",
            params![name, level, parent_id],
        )?;

        Ok(Element {
            element_id: self.conn.last_insert_rowid(),
            name,
            level,
            parent_id,
        })
    }

    fn get_element(&self, element_id: ElementId) -> RepoResult<Option<Element>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ELEMENT_SELECT_SQL} WHERE element_id = ?1;"))?;
        let element = stmt
            .query_row([element_id], |row| Ok(parse_element_row(row)))
            .optional()?;
        element.transpose()
    }

    fn find_by_name(&self, name: &str) -> RepoResult<Option<Element>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ELEMENT_SELECT_SQL} WHERE name = ?1 ORDER BY element_id ASC LIMIT 1;"
        ))?;
        let element = stmt
            .query_row([name], |row| Ok(parse_element_row(row)))
            .optional()?;
        element.transpose()
    }

    fn search_by_name(&self, pattern: &str) -> RepoResult<Vec<Element>> {
        collect_elements(
            self.conn,
            &format!(
                "{ELEMENT_SELECT_SQL}
                 WHERE LOWER(name) LIKE LOWER(?1)
                 ORDER BY name ASC, element_id ASC;"
            ),
            params![pattern],
        )
    }

    fn list_elements(&self) -> RepoResult<Vec<Element>> {
        collect_elements(
            self.conn,
            &format!("{ELEMENT_SELECT_SQL} ORDER BY level ASC, name ASC, element_id ASC;"),
            params![],
        )
    }

    fn list_children(&self, parent_id: Option<ElementId>) -> RepoResult<Vec<Element>> {
        match parent_id {
            Some(parent_id) => collect_elements(
                self.conn,
                &format!(
                    "{ELEMENT_SELECT_SQL}
                     WHERE parent_id = ?1
                     ORDER BY name ASC, element_id ASC;"
                ),
                params![parent_id],
            ),
            None => collect_elements(
                self.conn,
                &format!(
                    "{ELEMENT_SELECT_SQL}
                     WHERE parent_id IS NULL
                     ORDER BY name ASC, element_id ASC;"
                ),
                params![],
            ),
        }
    }

    fn delete_element(&self, element_id: ElementId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM element WHERE element_id = ?1;", [element_id])?;
        if changed == 0 {
            return Err(RepoError::ElementNotFound(element_id));
        }
        Ok(())
    }
}

fn collect_elements(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> RepoResult<Vec<Element>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut elements = Vec::new();
    while let Some(row) = rows.next()? {
        elements.push(parse_element_row(row)?);
    }
    Ok(elements)
}

fn parse_element_row(row: &Row<'_>) -> RepoResult<Element> {
    let level: i64 = row.get("level")?;
    if level < 0 {
        return Err(RepoError::InvalidData(format!(
            "invalid level `{level}` in element.level"
        )));
    }
    let element = Element {
        element_id: row.get("element_id")?,
        name: row.get("name")?,
        level,
        parent_id: row.get("parent_id")?,
    };
    if element.parent_id == Some(element.element_id) {
        return Err(RepoError::InvalidData(format!(
            "element {} is its own parent",
            element.element_id
        )));
    }
    Ok(element)
}
