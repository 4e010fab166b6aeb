//! Two-tier candidate ranking against a job's competency requirements.

pub mod domain;
mod engine;
pub mod import;
pub mod repository;
pub mod service;

pub use domain::{
    CandidateProfile, CompetencyEvidence, CompetencyLevel, EvidenceSource, Exclusion,
    ExclusionReason, FunctionalArea, JobPosting, JobRequirement, MatchResult, MatchTier,
    RequirementMatch, ScoredCandidate,
};
pub use engine::{MatchEngine, MatchingConfig};
pub use import::{evidence_from_path, read_evidence, EvidenceImportError};
pub use repository::{CandidatePool, CompetencyStore, JobCatalog};
pub use service::{
    CompanyRankedCandidate, CompanyRanking, MatchOutcome, MatchRun, MatchingError,
    MatchingService, PairingRef,
};
