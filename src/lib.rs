//! BoardCore - Rust implementation of the Board collaborative whiteboard core.
//!
//! This library provides the core functionality for Board:
//! - Data models (Note, Reply, agenda items)
//! - Local reconciler: optimistic mutations merged with the remote change feed
//! - Note lifecycle operations (add, move, resize, reply, duplicate, delete)
//! - Pan/zoom coordinate transforms for the infinite canvas
//! - Remote store and file storage adapters (HTTP and in-memory)
//! - Configuration management
//!
//! The rendering layer is not part of this crate: a UI embeds [`BoardClient`],
//! drives its operations from user input, and feeds change notifications from
//! the store subscription back through [`BoardClient::apply_event`].
//!
//! # Feature Flags
//!
//! - `server`: Include the board server (axum) that serves the row-store
//!   protocol consumed by the HTTP adapters. Not needed for pure clients.

pub mod agenda;
pub mod board;
pub mod client;
pub mod config;
pub mod error;
pub mod file_storage;
pub mod file_storage_http;
pub mod models;
pub mod store;
pub mod store_http;
pub mod store_memory;
pub mod validation;
pub mod viewport;

#[cfg(feature = "server")]
pub mod server;

/// Number of identity characters kept when truncating UUIDs in log lines.
pub const UUID_SHORT_LEN: usize = 8;

// Re-export commonly used types
pub use board::Board;
pub use client::BoardClient;
pub use config::Config;
pub use error::{BoardError, BoardResult};
pub use models::{Note, NoteColor, NoteKind, NotePatch, Reply};
pub use store::{ChangeEvent, ChangeKind, RemoteStore};
pub use viewport::Viewport;
