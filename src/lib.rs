//! revfs - A versioned filesystem engine
//!
//! revfs stores an append-only sequence of immutable revisions of a
//! hierarchical namespace. New revisions are built in transactions: private
//! copy-on-write trees that share every unchanged node with the revision they
//! started from and become the next revision at commit.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - `revfs-admin` command-line interface (parses args, delegates to fs)
//! - [`fs`] - Repository, revisions, transactions, copy-on-write trees
//! - [`backend`] - Pluggable key-addressed storage with atomic batches
//! - [`core`] - Domain types, configuration, path routing, and locking
//!
//! # Correctness Invariants
//!
//! revfs maintains the following invariants:
//!
//! 1. A committed revision's tree never changes
//! 2. A commit is published by one atomic backend batch, or not at all
//! 3. Revision numbers are consecutive from 0
//! 4. Persisted records that fail validation are reported, never repaired

pub mod backend;
pub mod cli;
pub mod core;
pub mod fs;
