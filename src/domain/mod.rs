//! Domain layer for Rule Warden
//!
//! CDD Principle: Domain Model - Pure data and invariants for rule evaluation results
//! - Contains findings, violations, per-pair results and the run summary
//! - Independent of configuration formats, plugins and storage
//! - Expresses the ubiquitous language of validators, rules and overrides

pub mod violations;

// Re-export main domain types for convenience
pub use violations::*;
