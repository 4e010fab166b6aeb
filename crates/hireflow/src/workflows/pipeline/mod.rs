//! Hiring pipeline for a single candidate-job pairing.
//!
//! The transition graph lives in [`transitions::TRANSITIONS`]; [`PipelineService`] is the
//! only writer of pairing state and applies each edge's guard and effects together with the
//! audit row in one unit of work. Disclosure rules are centralized in
//! [`VisibilityPolicy`].

pub mod audit;
pub mod domain;
pub mod notifications;
pub mod repository;
pub mod router;
pub mod service;
pub mod sweeps;
pub mod transitions;
pub mod visibility;

#[cfg(test)]
mod tests;

pub use audit::{AuditTrail, NewTransition, TransitionRecord};
pub use domain::{
    Actor, ActorRole, CandidacyRecord, CandidatePairingView, CompanyPairingView, MatchMetadata,
    NewCandidacy, PairingView, PipelineState,
};
pub use notifications::{
    NotificationDispatcher, NotificationError, NotificationEvent, NotificationPolicy,
    NotificationReceipt, NotificationRequest,
};
pub use repository::{CandidacyRepository, CandidacyTransaction, ChargeLedger, CommitReceipt};
pub use router::{pipeline_router, PipelineApi};
pub use service::{
    PipelineError, PipelineService, TransitionOutcome, TransitionRequest, TransitionView,
    PAYMENT_ACTOR,
};
pub use sweeps::{
    ChargeSweepReport, ReminderNotice, SweepFailure, WarrantySweepReport, WARRANTY_SWEEP_ACTOR,
};
pub use transitions::{rule_for, targets_from, Effect, Guard, TransitionRule, TRANSITIONS};
pub use visibility::{Disclosure, VisibilityPolicy};
