//! core
//!
//! Core domain types, configuration, path routing, and locking.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Revnum, NodeRevId, FsPath, etc.
//! - [`ops`] - Repository locking
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for repository storage
//! - [`hex_bytes`] - Serde helpers for byte strings inside JSON records
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Malformed input is rejected, never normalized

pub mod config;
pub mod hex_bytes;
pub mod ops;
pub mod paths;
pub mod types;
