//! Consistency layer for derived values.
//!
//! # Responsibility
//! - Guarantee the `(attribute_id, timestamp)` uniqueness constraint that
//!   every derived write relies on.
//! - Own the single upsert statement shared by ingestion, backfill and rules.
//! - Install and remove maintenance rules idempotently.
//!
//! # Invariants
//! - No rule is installed unless the uniqueness constraint exists.
//! - Installing over an existing rule replaces it; triggers are dropped before
//!   the view they read, and recreated after it.
//! - Removing a rule that does not exist is a no-op.
//! - Functions here never open transactions; callers pass a connection or an
//!   open transaction.

use crate::compiler::{self, MaintenanceRule};
use crate::model::{AttributeId, Timestamp};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Name of the uniqueness index created when no equivalent index exists.
pub const UNIQUE_INDEX_NAME: &str = "archive_attribute_timestamp_unique";

/// Insert-or-overwrite of one archive record.
pub const UPSERT_ARCHIVE_SQL: &str = "INSERT INTO archive (attribute_id, timestamp, value)
VALUES (?1, ?2, ?3)
ON CONFLICT (attribute_id, timestamp) DO UPDATE SET value = excluded.value;";

static ARTIFACT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:trigger_)?compute_derived_attr_(\d+)(?:_update)?$")
        .expect("valid artifact name regex")
});

pub type ConsistencyResult<T> = Result<T, ConsistencyError>;

/// Store-side failure while guarding or maintaining derived values.
#[derive(Debug)]
pub enum ConsistencyError {
    /// The uniqueness constraint is absent and could not be created, usually
    /// because duplicate `(attribute_id, timestamp)` rows already exist.
    ConstraintMissing(rusqlite::Error),
    /// Creating a rule's view or triggers failed.
    RuleInstallation {
        attribute_id: AttributeId,
        source: rusqlite::Error,
    },
    /// Dropping a rule's view or triggers failed.
    RuleRemoval {
        attribute_id: AttributeId,
        source: rusqlite::Error,
    },
    /// Any other store failure.
    Db(rusqlite::Error),
}

impl Display for ConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstraintMissing(err) => write!(
                f,
                "uniqueness constraint on archive(attribute_id, timestamp) is missing and could not be created: {err}"
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
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConsistencyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConstraintMissing(err) => Some(err),
            Self::RuleInstallation { source, .. } => Some(source),
            Self::RuleRemoval { source, .. } => Some(source),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for ConsistencyError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(value)
    }
}

/// Returns whether a full (non-partial) unique index covers exactly
/// `(attribute_id, timestamp)` on the archive, under any name.
pub fn unique_constraint_present(conn: &Connection) -> ConsistencyResult<bool> {
    let mut list_stmt = conn.prepare(
        "SELECT name FROM pragma_index_list('archive') WHERE \"unique\" = 1 AND partial = 0;",
    )?;
    let index_names = list_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut info_stmt = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno;")?;
    for index_name in index_names {
        let columns = info_stmt
            .query_map([index_name.as_str()], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if columns
            == [
                Some("attribute_id".to_string()),
                Some("timestamp".to_string()),
            ]
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Creates the uniqueness constraint unless an equivalent one exists.
///
/// Returns `true` when the index was created by this call.
pub fn ensure_unique_constraint(conn: &Connection) -> ConsistencyResult<bool> {
    if unique_constraint_present(conn)? {
        return Ok(false);
    }

    let sql = format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {UNIQUE_INDEX_NAME} ON archive(attribute_id, timestamp);"
    );
    match conn.execute_batch(&sql) {
        Ok(()) => {
            info!(
                "event=constraint_create module=consistency status=ok index={}",
                UNIQUE_INDEX_NAME
            );
            Ok(true)
        }
        Err(err) => {
            warn!(
                "event=constraint_create module=consistency status=error index={} error_code=constraint_missing error={}",
                UNIQUE_INDEX_NAME, err
            );
            Err(ConsistencyError::ConstraintMissing(err))
        }
    }
}

/// Upserts a batch of computed values for one attribute.
///
/// Returns the number of records written.
pub fn upsert_derived_values(
    conn: &Connection,
    attribute_id: AttributeId,
    values: &[(Timestamp, Option<f64>)],
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(UPSERT_ARCHIVE_SQL)?;
    for (timestamp, value) in values {
        stmt.execute(params![attribute_id, timestamp, value])?;
    }
    Ok(values.len())
}

/// Installs `rule`, replacing any artifacts left by a previous installation.
pub fn install_rule(conn: &Connection, rule: &MaintenanceRule) -> ConsistencyResult<()> {
    ensure_unique_constraint(conn)?;

    let attribute_id = rule.target;
    let installation_failed = |source| ConsistencyError::RuleInstallation {
        attribute_id,
        source,
    };
    for statement in compiler::drop_statements(attribute_id) {
        conn.execute_batch(&statement).map_err(installation_failed)?;
    }
    for statement in rule.install_statements() {
        conn.execute_batch(statement).map_err(installation_failed)?;
    }

    debug!(
        "event=rule_install module=consistency status=ok attribute_id={} rule={}",
        attribute_id, rule.rule_name
    );
    Ok(())
}

/// Drops every artifact of `attribute_id`'s rule.
///
/// Returns whether a rule trigger existed before the call.
pub fn remove_rule(conn: &Connection, attribute_id: AttributeId) -> ConsistencyResult<bool> {
    let existed = rule_installed(conn, attribute_id)?;
    for statement in compiler::drop_statements(attribute_id) {
        conn.execute_batch(&statement)
            .map_err(|source| ConsistencyError::RuleRemoval {
                attribute_id,
                source,
            })?;
    }

    debug!(
        "event=rule_remove module=consistency status=ok attribute_id={} existed={}",
        attribute_id, existed
    );
    Ok(existed)
}

/// Returns whether the insert trigger of `attribute_id` exists.
pub fn rule_installed(conn: &Connection, attribute_id: AttributeId) -> ConsistencyResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'trigger' AND name = ?1);",
        [compiler::rule_name(attribute_id)],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Lists attribute ids owning at least one compiled artifact in the store.
pub fn installed_rule_ids(conn: &Connection) -> ConsistencyResult<BTreeSet<AttributeId>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type IN ('trigger', 'view');")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(names
        .iter()
        .filter_map(|name| ARTIFACT_NAME_RE.captures(name))
        .filter_map(|captures| captures.get(1))
        .filter_map(|id| id.as_str().parse::<AttributeId>().ok())
        .collect())
}

/// Drops artifacts whose attribute row is gone or no longer records a rule.
///
/// Returns the ids whose artifacts were removed.
pub fn remove_orphaned_rules(conn: &Connection) -> ConsistencyResult<Vec<AttributeId>> {
    let mut removed = Vec::new();
    for attribute_id in installed_rule_ids(conn)? {
        let recorded: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM attribute WHERE attribute_id = ?1 AND rule_name IS NOT NULL
            );",
            [attribute_id],
            |row| row.get(0),
        )?;
        if recorded == 1 {
            continue;
        }
        remove_rule(conn, attribute_id)?;
        removed.push(attribute_id);
    }

    if !removed.is_empty() {
        warn!(
            "event=rule_sweep module=consistency status=ok removed_count={}",
            removed.len()
        );
    }
    Ok(removed)
}
