//! # CrewBoard Shared Library
//!
//! This crate contains the types, database layer, and business logic shared
//! by the CrewBoard API server and its tests.
//!
//! ## Module Organization
//!
//! - `models`: Database models and CRUD operations
//! - `auth`: Password hashing, JWT tokens, and request authentication
//! - `policy`: Access predicates and the per-entity authorization policy set
//! - `events`: In-process change feed and re-fetch debouncing
//! - `db`: Connection pooling and migrations

pub mod auth;
pub mod db;
pub mod events;
pub mod models;
pub mod policy;

/// Current version of the CrewBoard shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
