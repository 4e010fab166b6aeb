//! Candidate–job matching and hiring pipeline engine.
//!
//! The crate ranks candidates against a job's competency requirements, then drives each
//! candidate-job pairing through a guarded pipeline with privacy-gated disclosure, a
//! post-hire warranty and success-fee billing.

pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
