//! Test helper utilities
//!
//! Shared fixtures and fakes for the promobot-robot integration tests

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{
    at_hour, build_orchestrator, create_test_db, listing, memory_pool, no_sources, seed_approved_product, seed_default_template,
    seed_group, test_config,
};
pub use fakes::{FakeSource, FailingSource, ScriptedTransport, SlowSource};
