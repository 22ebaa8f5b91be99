//! # attrflow CLI
//!
//! Operator surface over the derived attribute engine.
//!
//! ## Available Commands
//!
//! - `element` - add, list and delete hierarchy elements
//! - `attr` - create, update, rename, delete, backfill and inspect attributes
//! - `ingest` - write one measurement the way an ingestion process would
//! - `series` - read the stored values of one attribute
//! - `rules` - list installed maintenance rules and sweep orphans
//!
//! Every command prints one JSON document on stdout.

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use commands::{run, CliError};

/// Derived attribute engine command line.
#[derive(Parser, Debug)]
#[command(name = "attrflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the SQLite store
    #[arg(long, global = true, env = "ATTRFLOW_DB", default_value = "attrflow.db")]
    pub db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ATTRFLOW_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files; logs go to stderr when unset
    #[arg(long, global = true, env = "ATTRFLOW_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage hierarchy elements
    #[command(subcommand)]
    Element(ElementCommand),

    /// Manage attributes and their formulas
    #[command(subcommand)]
    Attr(AttrCommand),

    /// Write one measurement; omit VALUE to store a value-absent record
    Ingest {
        attribute_id: i64,
        /// Unix epoch milliseconds
        timestamp: i64,
        #[arg(allow_negative_numbers = true)]
        value: Option<f64>,
    },

    /// Print stored values of one attribute
    Series {
        attribute_id: i64,
        /// Inclusive lower bound, epoch milliseconds
        #[arg(long)]
        from: Option<i64>,
        /// Inclusive upper bound, epoch milliseconds
        #[arg(long)]
        to: Option<i64>,
    },

    /// Inspect or clean up installed maintenance rules
    #[command(subcommand)]
    Rules(RulesCommand),
}

#[derive(Subcommand, Debug)]
pub enum ElementCommand {
    /// Add an element, optionally under a parent
    Add {
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// List elements, optionally filtered by a LIKE pattern
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete a leaf element with all of its attributes
    Delete { element_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum AttrCommand {
    /// Create a source attribute, or a derived one with --formula
    Create {
        #[arg(long)]
        element: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        formula: Option<String>,
    },
    /// Update a derived attribute
    Update(UpdateArgs),
    /// Change name and/or code of any attribute
    Rename {
        attribute_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        code: Option<String>,
    },
    /// Delete an attribute, its rule and its values
    Delete { attribute_id: i64 },
    /// Recompute every historical value of a derived attribute
    Backfill { attribute_id: i64 },
    /// Print the dependency set
    Deps { attribute_id: i64 },
    /// Print one attribute
    Show { attribute_id: i64 },
    /// List attributes of one element or matching a LIKE pattern
    List {
        #[arg(long)]
        element: Option<i64>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Print the `\\Root|Child|Attribute` path of every attribute
    Paths,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub attribute_id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub code: Option<String>,
    #[arg(long)]
    pub formula: Option<String>,
    /// Keep stored values instead of recomputing them
    #[arg(long)]
    pub keep_archive: bool,
    /// Do not install a rule for the new formula
    #[arg(long)]
    pub no_rule: bool,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// List attribute ids with compiled artifacts in the store
    List,
    /// Drop artifacts whose attribute is gone or records no rule
    Sweep,
}
