//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository, compiler and consistency calls into use-case
//!   level APIs.
//! - Keep the CLI decoupled from storage details.

pub mod lifecycle;
