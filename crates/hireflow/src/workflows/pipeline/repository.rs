use super::audit::{NewTransition, TransitionRecord};
use super::domain::{CandidacyRecord, NewCandidacy, PipelineState};
use crate::store::RepositoryError;
use crate::workflows::billing::Charge;
use crate::workflows::domain::{CandidacyId, CandidateId, ChargeId, JobId};

/// Pairing storage with explicit foreign-key lookups and row-locked transactions.
pub trait CandidacyRepository: Send + Sync {
    /// Inserts a pairing in its initial state together with the opening audit row.
    /// Fails with [`RepositoryError::Duplicate`] when the (job, candidate) pair exists.
    fn open(&self, draft: NewCandidacy) -> Result<CandidacyRecord, RepositoryError>;

    fn fetch(&self, id: CandidacyId) -> Result<Option<CandidacyRecord>, RepositoryError>;

    fn find_by_pair(
        &self,
        job_id: JobId,
        candidate_id: CandidateId,
    ) -> Result<Option<CandidacyRecord>, RepositoryError>;

    fn for_job(&self, job_id: JobId) -> Result<Vec<CandidacyRecord>, RepositoryError>;

    fn for_candidate(
        &self,
        candidate_id: CandidateId,
    ) -> Result<Vec<CandidacyRecord>, RepositoryError>;

    fn in_state(&self, state: PipelineState) -> Result<Vec<CandidacyRecord>, RepositoryError>;

    /// Locks the pairing row without waiting. A second `begin` on the same pairing fails
    /// with [`RepositoryError::Locked`] until the first transaction commits or is dropped.
    /// Dropping an uncommitted transaction discards everything it staged.
    fn begin(
        &self,
        id: CandidacyId,
    ) -> Result<Box<dyn CandidacyTransaction + '_>, RepositoryError>;
}

/// Charge lookups; charges are mutated only inside a pairing transaction.
pub trait ChargeLedger: Send + Sync {
    fn charge(&self, id: ChargeId) -> Result<Option<Charge>, RepositoryError>;
    fn open_charges(&self) -> Result<Vec<Charge>, RepositoryError>;
}

/// Unit of work over one locked pairing row.
pub trait CandidacyTransaction {
    /// Pairing as read under the lock, including any staged changes.
    fn record(&self) -> &CandidacyRecord;

    fn latest_transition(&self) -> Option<&TransitionRecord>;

    /// Charge linked to the pairing, including any staged changes.
    fn charge(&self) -> Option<&Charge>;

    fn allocate_charge_id(&mut self) -> Result<ChargeId, RepositoryError>;

    /// Next consent sequence number for the pairing's job.
    fn allocate_match_sequence(&mut self) -> Result<u32, RepositoryError>;

    fn stage_record(&mut self, record: CandidacyRecord);

    fn stage_charge(&mut self, charge: Charge);

    fn stage_transition(&mut self, transition: NewTransition);

    /// Shows or hides the candidate's public profile in future matching runs.
    fn stage_profile_activity(&mut self, candidate_id: CandidateId, active: bool);

    /// Applies every staged change atomically and releases the lock.
    fn commit(self: Box<Self>) -> Result<CommitReceipt, RepositoryError>;
}

/// What a successful commit persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub record: CandidacyRecord,
    pub charge: Option<Charge>,
    pub transitions: Vec<TransitionRecord>,
}
