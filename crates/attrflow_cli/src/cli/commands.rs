//! # CLI Command Implementations

use super::{AttrCommand, Cli, Commands, ElementCommand, RulesCommand, UpdateArgs};
use attrflow_core::consistency::{self, ConsistencyError};
use attrflow_core::repo::attribute_repo::{AttributeRepository, SqliteAttributeRepository};
use attrflow_core::repo::element_repo::{ElementRepository, SqliteElementRepository};
use attrflow_core::repo::measurement_repo::{MeasurementRepository, SqliteMeasurementRepository};
use attrflow_core::{
    open_db, AttributeKind, AttributeLifecycle, CreateAttributeRequest, DbError, LifecycleError,
    MeasurementRecord, RepoError, TimeRange, UpdateAttributeRequest,
};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure of one CLI command.
#[derive(Debug)]
pub enum CliError {
    Db(DbError),
    Repo(RepoError),
    Lifecycle(LifecycleError),
    Consistency(ConsistencyError),
    NotFound(String),
    Json(serde_json::Error),
}

impl CliError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Db(_) => "db",
            Self::Repo(_) => "repo",
            Self::Lifecycle(err) => err.kind(),
            Self::Consistency(_) => "consistency",
            Self::NotFound(_) => "not_found",
            Self::Json(_) => "json",
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Lifecycle(err) => write!(f, "{err}"),
            Self::Consistency(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Lifecycle(err) => Some(err),
            Self::Consistency(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Json(err) => Some(err),
        }
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<LifecycleError> for CliError {
    fn from(value: LifecycleError) -> Self {
        Self::Lifecycle(value)
    }
}

impl From<ConsistencyError> for CliError {
    fn from(value: ConsistencyError) -> Self {
        Self::Consistency(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Executes one parsed command and returns its JSON result.
pub fn run(cli: Cli) -> Result<Value, CliError> {
    let conn = open_db(&cli.db)?;
    info!(
        "event=cli_command module=cli status=start db={}",
        cli.db.display()
    );

    match cli.command {
        Commands::Element(command) => run_element(&conn, command),
        Commands::Attr(command) => run_attr(&conn, command),
        Commands::Ingest {
            attribute_id,
            timestamp,
            value,
        } => {
            let record = MeasurementRecord::new(attribute_id, timestamp, value);
            SqliteMeasurementRepository::new(&conn).upsert_measurement(&record)?;
            Ok(serde_json::to_value(record)?)
        }
        Commands::Series {
            attribute_id,
            from,
            to,
        } => {
            let records = SqliteMeasurementRepository::new(&conn).list_measurements(
                attribute_id,
                TimeRange {
                    start: from,
                    end: to,
                },
            )?;
            Ok(serde_json::to_value(records)?)
        }
        Commands::Rules(command) => run_rules(&conn, command),
    }
}

fn run_element(conn: &Connection, command: ElementCommand) -> Result<Value, CliError> {
    let elements = SqliteElementRepository::new(conn);
    match command {
        ElementCommand::Add { name, parent } => {
            Ok(serde_json::to_value(elements.create_element(&name, parent)?)?)
        }
        ElementCommand::List { search } => {
            let listed = match search {
                Some(pattern) => elements.search_by_name(&pattern)?,
                None => elements.list_elements()?,
            };
            Ok(serde_json::to_value(listed)?)
        }
        ElementCommand::Delete { element_id } => Ok(serde_json::to_value(
            AttributeLifecycle::new(conn).delete_element(element_id)?,
        )?),
    }
}

fn run_attr(conn: &Connection, command: AttrCommand) -> Result<Value, CliError> {
    let lifecycle = AttributeLifecycle::new(conn);
    let attributes = SqliteAttributeRepository::new(conn);
    match command {
        AttrCommand::Create {
            element,
            name,
            code,
            formula,
        } => Ok(serde_json::to_value(lifecycle.create_attribute(
            &CreateAttributeRequest {
                element_id: element,
                name,
                code,
                formula,
            },
        )?)?),
        AttrCommand::Update(args) => {
            let UpdateArgs {
                attribute_id,
                name,
                code,
                formula,
                keep_archive,
                no_rule,
            } = args;
            let request = UpdateAttributeRequest {
                name,
                code,
                formula,
                recompute_archive: !keep_archive,
                recreate_rule: !no_rule,
            };
            Ok(serde_json::to_value(
                lifecycle.update_attribute(attribute_id, &request)?,
            )?)
        }
        AttrCommand::Rename {
            attribute_id,
            name,
            code,
        } => Ok(serde_json::to_value(lifecycle.rename_attribute(
            attribute_id,
            name.as_deref(),
            code.as_deref(),
        )?)?),
        AttrCommand::Delete { attribute_id } => {
            Ok(serde_json::to_value(lifecycle.delete_attribute(attribute_id)?)?)
        }
        AttrCommand::Backfill { attribute_id } => {
            Ok(serde_json::to_value(lifecycle.backfill(attribute_id)?)?)
        }
        AttrCommand::Deps { attribute_id } => {
            let kind = if lifecycle.is_derived(attribute_id)? {
                AttributeKind::Derived
            } else {
                AttributeKind::Source
            };
            Ok(json!({
                "attribute_id": attribute_id,
                "kind": kind,
                "dependencies": lifecycle.get_dependencies(attribute_id)?,
            }))
        }
        AttrCommand::Show { attribute_id } => {
            let attribute = attributes
                .get_attribute(attribute_id)?
                .ok_or_else(|| CliError::NotFound(format!("attribute {attribute_id}")))?;
            let range = SqliteMeasurementRepository::new(conn).timestamp_range(attribute_id)?;
            Ok(json!({
                "kind": AttributeKind::from(&attribute),
                "attribute": attribute,
                "rule_installed": consistency::rule_installed(conn, attribute_id)?,
                "first_timestamp": range.map(|(first, _)| first),
                "last_timestamp": range.map(|(_, last)| last),
            }))
        }
        AttrCommand::List { element, search } => {
            let listed = match (search, element) {
                (Some(pattern), element) => attributes.search_by_name(&pattern, element)?,
                (None, Some(element)) => attributes.list_by_element(element)?,
                (None, None) => attributes.search_by_name("%", None)?,
            };
            Ok(serde_json::to_value(listed)?)
        }
        AttrCommand::Paths => Ok(serde_json::to_value(attributes.path_mapping()?)?),
    }
}

fn run_rules(conn: &Connection, command: RulesCommand) -> Result<Value, CliError> {
    match command {
        RulesCommand::List => Ok(serde_json::to_value(consistency::installed_rule_ids(
            conn,
        )?)?),
        RulesCommand::Sweep => Ok(json!({
            "removed": consistency::remove_orphaned_rules(conn)?,
        })),
    }
}
