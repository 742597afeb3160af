//! Infrastructure layer for quickpoll.
//!
//! Contains the SQLite implementation of the storage ports defined in
//! `quickpoll-core`, plus data-directory and `config.toml` resolution.

pub mod config;
pub mod sqlite;
