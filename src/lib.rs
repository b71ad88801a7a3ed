pub mod config;
pub mod db;
pub mod error;

// Domain modules
pub mod auth;
pub mod cache;
pub mod notifications;
pub mod progress;
pub mod publisher;

// Search
pub mod indexer;

// HTTP API
pub mod api;

// Command-line interface
pub mod cli;

// Utilities
pub mod utils;

// Re-exports
pub use config::Settings;
pub use error::{Error, Result};
