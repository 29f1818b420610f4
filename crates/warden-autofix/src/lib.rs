//! Automated remediation for the Warden supervisor
//!
//! Failing probe outcomes are classified into stable pattern keys,
//! matched against a learned knowledge store, and remediated through
//! the target's admin surface. Every application feeds its outcome
//! back into the store, so fixes that keep working are preferred and
//! fixes that stop working decay out of favour.

pub mod actions;
pub mod engine;
pub mod patterns;
pub mod store;

pub use actions::{FixContext, FixOutcome};
pub use engine::{AutoFixEngine, RemediationReport, FALLBACK_LADDER};
pub use patterns::{pattern_key, pattern_metadata, severity_for_key};
pub use store::{KnowledgeStore, PiecesEntry};
