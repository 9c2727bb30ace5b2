//! # runner-events
//!
//! Workflow job webhook events and the label routing convention used to
//! decide which runner a job should land on.
//!
//! ## Design Principles
//!
//! - Decoding is tolerant: unknown fields are ignored and missing fields
//!   fall back to empty values, so newer payload versions keep decoding
//! - Routing is pure: a label set maps to at most one [`Target`] with no I/O
//! - Action values are never validated here; deciding what an action means
//!   is left to the consumer
//!
//! ## Label Convention
//!
//! A job targets a runner through a label shaped `<prefix>-<region>-<class>`,
//! for example `koyeb-fra-small`. The first matching label wins, even when
//! its region or class segment is empty.

mod error;
mod routing;
mod types;

pub use error::EventError;
pub use routing::{route, Target, DEFAULT_LABEL_PREFIX};
pub use types::*;
