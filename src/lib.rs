//! Imagemill - HTTP image format conversion service
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod convert;
pub mod error;
pub mod mapping;
pub mod server;

pub use error::{Error, Result};
