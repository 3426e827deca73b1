//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - User and connected-repository models

mod database;
mod models;

pub use database::{Database, UserPatch, is_unique_violation};
pub use models::*;

#[cfg(test)]
mod database_test;
