//! XMPP HTTP Upload service library.
//! Exposes the service modules for integration testing;
//! the binary entry point is in main.rs.

pub mod api;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod context;
pub mod error;
pub mod server;
