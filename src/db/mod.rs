//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer: the transactional store behind every workflow

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{AuditFilter, Repository};
