//! Fleet backend client.
//!
//! The scheduler never talks to the compute platform directly. It goes
//! through the [`FleetClient`] trait, which exposes just enough to manage
//! one application and the runner services inside it:
//!
//! - `KoyebClient`: REST adapter for the Koyeb API
//! - `InMemoryFleet`: recording in-memory backend for tests and local runs

mod client;
mod error;
mod koyeb;
mod memory;

pub use client::{EnvVar, FleetClient, Scaling, ServiceSpec};
pub use error::FleetError;
pub use koyeb::{KoyebClient, DEFAULT_API_URL};
pub use memory::{FleetCall, InMemoryFleet};
