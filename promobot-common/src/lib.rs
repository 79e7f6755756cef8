//! # promobot Common Library
//!
//! Shared code for the promobot service crates:
//! - Error type and result alias
//! - TOML/environment configuration
//! - Database pool setup
//! - API response envelope and pagination

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod pagination;

pub use error::{Error, Result};
