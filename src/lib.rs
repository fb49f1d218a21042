//! Drive Server Library
//!
//! Synchronization roots and change summaries over a document repository.
//! The server binary is in main.rs.
//!
//! # Modules
//!
//! - `repository`: Documents, sessions and path-inherited access control
//! - `audit`: Audit trail and the change finder querying it
//! - `drive`: Synchronization root manager, change summaries, blacklist
//! - `routes`: HTTP API

pub mod audit;
pub mod config;
pub mod db;
pub mod drive;
pub mod error;
pub mod repository;
pub mod routes;
pub mod state;
