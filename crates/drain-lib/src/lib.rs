//! Library for gracefully draining service containers
//!
//! This crate provides the core functionality for:
//! - Container inventory discovery from the container runtime
//! - Per service-instance drain history tracking
//! - Cooldown-aware drain scheduling on a virtual clock
//! - Plan (script) and live execution of drain actions
//! - Metrics and structured logging

pub mod emitter;
pub mod error;
pub mod exec;
pub mod history;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod scheduler;

pub use error::{DrainError, Result};
pub use history::DrainHistory;
pub use models::*;
pub use observability::{DrainMetrics, StructuredLogger};
pub use scheduler::{DrainPolicy, DrainScheduler};
