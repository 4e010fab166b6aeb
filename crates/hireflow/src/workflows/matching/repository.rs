use super::domain::{
    CandidateProfile, CompetencyEvidence, FunctionalArea, JobPosting, JobRequirement,
};
use crate::store::RepositoryError;
use crate::workflows::domain::{CandidateId, JobId};

/// Jobs and their requirement sets, owned by the job subsystem.
pub trait JobCatalog: Send + Sync {
    fn job(&self, id: JobId) -> Result<Option<JobPosting>, RepositoryError>;
    fn requirements(&self, id: JobId) -> Result<Vec<JobRequirement>, RepositoryError>;
}

/// Candidate profiles, owned by the onboarding subsystem.
pub trait CandidatePool: Send + Sync {
    fn candidate(&self, id: CandidateId) -> Result<Option<CandidateProfile>, RepositoryError>;
    fn candidates_in_area(
        &self,
        area: &FunctionalArea,
    ) -> Result<Vec<CandidateProfile>, RepositoryError>;
}

/// Read-only view of the competency evidence feed.
pub trait CompetencyStore: Send + Sync {
    fn evidence_for(
        &self,
        candidates: &[CandidateId],
    ) -> Result<Vec<CompetencyEvidence>, RepositoryError>;
}
