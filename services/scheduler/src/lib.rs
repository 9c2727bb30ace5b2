//! Runner scheduler library.
//!
//! This crate primarily ships a `runner-scheduler` binary, but exposes a
//! library surface so the HTTP layer can be driven from integration tests.

pub mod api;
pub mod config;
pub mod orchestrator;
pub mod reaper;
pub mod signature;
pub mod state;
