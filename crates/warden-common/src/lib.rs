//! Common types and utilities for the Warden health supervisor
//!
//! This crate provides the shared data model, configuration,
//! error taxonomy, and the circuit breaker used across all
//! Warden subsystems.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod types;

pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerSnapshot, BreakerStatus, CircuitBreaker,
};
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
