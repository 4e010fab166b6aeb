use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::RepositoryError;
use crate::workflows::billing::Charge;
use crate::workflows::domain::{
    CandidacyId, CandidateId, ChargeId, CompetencyId, JobId, TransitionId,
};
use crate::workflows::matching::domain::{
    CandidateProfile, CompetencyEvidence, EvidenceSource, FunctionalArea, JobPosting,
    JobRequirement,
};
use crate::workflows::matching::repository::{CandidatePool, CompetencyStore, JobCatalog};
use crate::workflows::pipeline::audit::{AuditTrail, NewTransition, TransitionRecord};
use crate::workflows::pipeline::domain::{
    ActorRole, CandidacyRecord, NewCandidacy, PipelineState,
};
use crate::workflows::pipeline::repository::{
    CandidacyRepository, CandidacyTransaction, ChargeLedger, CommitReceipt,
};

/// Actor recorded on the audit row written when a pairing is opened.
pub const OPENING_ACTOR: &str = "matching-engine";

type EvidenceKey = (CandidateId, CompetencyId, EvidenceSource);

/// In-process store backing every repository trait. Used by the service binary, the demo
/// and tests; a database-backed store would implement the same traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: BTreeMap<JobId, JobPosting>,
    requirements: BTreeMap<JobId, Vec<JobRequirement>>,
    candidates: BTreeMap<CandidateId, CandidateProfile>,
    evidence: BTreeMap<EvidenceKey, CompetencyEvidence>,
    candidacies: BTreeMap<CandidacyId, CandidacyRecord>,
    pairs: HashMap<(JobId, CandidateId), CandidacyId>,
    charges: BTreeMap<ChargeId, Charge>,
    transitions: Vec<TransitionRecord>,
    match_sequences: HashMap<JobId, u32>,
    locked: HashSet<CandidacyId>,
    last_candidacy: u64,
    last_charge: u64,
    last_transition: u64,
}

impl Inner {
    fn next_transition_id(&mut self) -> TransitionId {
        self.last_transition += 1;
        TransitionId(self.last_transition)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, RepositoryError> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    /// Inserts or replaces a job together with its full requirement set.
    pub fn upsert_job(
        &self,
        job: JobPosting,
        requirements: Vec<JobRequirement>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        inner.requirements.insert(job.job_id, requirements);
        inner.jobs.insert(job.job_id, job);
        Ok(())
    }

    pub fn upsert_candidate(&self, profile: CandidateProfile) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        inner.candidates.insert(profile.candidate_id, profile);
        Ok(())
    }

    /// Stores an evidence row, replacing any row with the same candidate, competency and
    /// source.
    pub fn record_evidence(&self, evidence: CompetencyEvidence) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        inner.evidence.insert(
            (evidence.candidate_id, evidence.competency_id, evidence.source),
            evidence,
        );
        Ok(())
    }

    pub fn evidence_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.lock()?.evidence.len())
    }
}

impl JobCatalog for MemoryStore {
    fn job(&self, id: JobId) -> Result<Option<JobPosting>, RepositoryError> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    fn requirements(&self, id: JobId) -> Result<Vec<JobRequirement>, RepositoryError> {
        Ok(self
            .lock()?
            .requirements
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

impl CandidatePool for MemoryStore {
    fn candidate(&self, id: CandidateId) -> Result<Option<CandidateProfile>, RepositoryError> {
        Ok(self.lock()?.candidates.get(&id).cloned())
    }

    fn candidates_in_area(
        &self,
        area: &FunctionalArea,
    ) -> Result<Vec<CandidateProfile>, RepositoryError> {
        Ok(self
            .lock()?
            .candidates
            .values()
            .filter(|profile| &profile.functional_area == area)
            .cloned()
            .collect())
    }
}

impl CompetencyStore for MemoryStore {
    fn evidence_for(
        &self,
        candidates: &[CandidateId],
    ) -> Result<Vec<CompetencyEvidence>, RepositoryError> {
        let wanted: HashSet<CandidateId> = candidates.iter().copied().collect();
        Ok(self
            .lock()?
            .evidence
            .values()
            .filter(|row| wanted.contains(&row.candidate_id))
            .copied()
            .collect())
    }
}

impl CandidacyRepository for MemoryStore {
    fn open(&self, draft: NewCandidacy) -> Result<CandidacyRecord, RepositoryError> {
        let mut inner = self.lock()?;
        let pair = (draft.job_id, draft.candidate_id);
        if inner.pairs.contains_key(&pair) {
            return Err(RepositoryError::Duplicate(format!(
                "{} / {}",
                draft.job_id, draft.candidate_id
            )));
        }

        inner.last_candidacy += 1;
        let id = CandidacyId(inner.last_candidacy);
        let record = CandidacyRecord::open(id, &draft);

        let transition_id = inner.next_transition_id();
        let opening = NewTransition {
            previous_state: None,
            new_state: record.state,
            actor_id: OPENING_ACTOR.to_string(),
            actor_role: ActorRole::System,
            reason: Some("candidate qualified for job".to_string()),
            recorded_at: draft.opened_at,
            automatic: true,
        };
        inner.transitions.push(opening.into_record(transition_id, id));
        inner.pairs.insert(pair, id);
        inner.candidacies.insert(id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: CandidacyId) -> Result<Option<CandidacyRecord>, RepositoryError> {
        Ok(self.lock()?.candidacies.get(&id).cloned())
    }

    fn find_by_pair(
        &self,
        job_id: JobId,
        candidate_id: CandidateId,
    ) -> Result<Option<CandidacyRecord>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .pairs
            .get(&(job_id, candidate_id))
            .and_then(|id| inner.candidacies.get(id))
            .cloned())
    }

    fn for_job(&self, job_id: JobId) -> Result<Vec<CandidacyRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .candidacies
            .values()
            .filter(|record| record.job_id == job_id)
            .cloned()
            .collect())
    }

    fn for_candidate(
        &self,
        candidate_id: CandidateId,
    ) -> Result<Vec<CandidacyRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .candidacies
            .values()
            .filter(|record| record.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    fn in_state(&self, state: PipelineState) -> Result<Vec<CandidacyRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .candidacies
            .values()
            .filter(|record| record.state == state)
            .cloned()
            .collect())
    }

    fn begin(
        &self,
        id: CandidacyId,
    ) -> Result<Box<dyn CandidacyTransaction + '_>, RepositoryError> {
        let mut inner = self.lock()?;
        let record = inner
            .candidacies
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        if !inner.locked.insert(id) {
            return Err(RepositoryError::Locked(id));
        }

        let latest = inner
            .transitions
            .iter()
            .rev()
            .find(|row| row.candidacy_id == id)
            .cloned();
        let charge = record
            .charge_id
            .and_then(|charge_id| inner.charges.get(&charge_id))
            .cloned();

        Ok(Box::new(MemoryTransaction {
            store: self,
            record,
            latest,
            charge,
            charge_changed: false,
            transitions: Vec::new(),
            profile_changes: Vec::new(),
        }))
    }
}

impl ChargeLedger for MemoryStore {
    fn charge(&self, id: ChargeId) -> Result<Option<Charge>, RepositoryError> {
        Ok(self.lock()?.charges.get(&id).cloned())
    }

    fn open_charges(&self) -> Result<Vec<Charge>, RepositoryError> {
        Ok(self
            .lock()?
            .charges
            .values()
            .filter(|charge| charge.is_open())
            .cloned()
            .collect())
    }
}

impl AuditTrail for MemoryStore {
    fn history(&self, candidacy_id: CandidacyId) -> Result<Vec<TransitionRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .transitions
            .iter()
            .filter(|row| row.candidacy_id == candidacy_id)
            .cloned()
            .collect())
    }

    fn latest(
        &self,
        candidacy_id: CandidacyId,
    ) -> Result<Option<TransitionRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .transitions
            .iter()
            .rev()
            .find(|row| row.candidacy_id == candidacy_id)
            .cloned())
    }

    fn entered_state(
        &self,
        state: PipelineState,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TransitionRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .transitions
            .iter()
            .filter(|row| row.new_state == state && row.recorded_at >= from && row.recorded_at < to)
            .cloned()
            .collect())
    }
}

/// Staged changes for one locked pairing. Nothing reaches the store before `commit`.
struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    record: CandidacyRecord,
    latest: Option<TransitionRecord>,
    charge: Option<Charge>,
    charge_changed: bool,
    transitions: Vec<NewTransition>,
    profile_changes: Vec<(CandidateId, bool)>,
}

impl CandidacyTransaction for MemoryTransaction<'_> {
    fn record(&self) -> &CandidacyRecord {
        &self.record
    }

    fn latest_transition(&self) -> Option<&TransitionRecord> {
        self.latest.as_ref()
    }

    fn charge(&self) -> Option<&Charge> {
        self.charge.as_ref()
    }

    // Sequences are not rolled back, so an aborted unit of work leaves a gap.
    fn allocate_charge_id(&mut self) -> Result<ChargeId, RepositoryError> {
        let mut inner = self.store.lock()?;
        inner.last_charge += 1;
        Ok(ChargeId(inner.last_charge))
    }

    fn allocate_match_sequence(&mut self) -> Result<u32, RepositoryError> {
        let mut inner = self.store.lock()?;
        let sequence = inner.match_sequences.entry(self.record.job_id).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    fn stage_record(&mut self, record: CandidacyRecord) {
        self.record = record;
    }

    fn stage_charge(&mut self, charge: Charge) {
        self.charge = Some(charge);
        self.charge_changed = true;
    }

    fn stage_transition(&mut self, transition: NewTransition) {
        self.transitions.push(transition);
    }

    fn stage_profile_activity(&mut self, candidate_id: CandidateId, active: bool) {
        self.profile_changes.push((candidate_id, active));
    }

    fn commit(mut self: Box<Self>) -> Result<CommitReceipt, RepositoryError> {
        let mut inner = self.store.lock()?;
        let id = self.record.id;

        let charge = if self.charge_changed {
            self.charge.take()
        } else {
            None
        };
        if let Some(charge) = &charge {
            inner.charges.insert(charge.id, charge.clone());
        }

        let mut written = Vec::with_capacity(self.transitions.len());
        for transition in self.transitions.drain(..) {
            let transition_id = inner.next_transition_id();
            let row = transition.into_record(transition_id, id);
            inner.transitions.push(row.clone());
            written.push(row);
        }

        for (candidate_id, active) in self.profile_changes.drain(..) {
            if let Some(profile) = inner.candidates.get_mut(&candidate_id) {
                profile.profile_active = active;
            }
        }

        inner.candidacies.insert(id, self.record.clone());
        drop(inner);

        Ok(CommitReceipt {
            record: self.record.clone(),
            charge,
            transitions: written,
        })
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        let mut inner = self
            .store
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inner.locked.remove(&self.record.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::matching::domain::MatchTier;
    use crate::workflows::pipeline::domain::MatchMetadata;
    use chrono::TimeZone;

    fn opened_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("valid timestamp")
    }

    fn draft(job: u64, candidate: u64) -> NewCandidacy {
        NewCandidacy {
            job_id: JobId(job),
            candidate_id: CandidateId(candidate),
            matching: MatchMetadata {
                tier: MatchTier::Certified,
                score: 9,
                match_sequence_number: None,
            },
            opened_at: opened_at(),
        }
    }

    fn step(from: PipelineState, to: PipelineState) -> NewTransition {
        NewTransition {
            previous_state: Some(from),
            new_state: to,
            actor_id: "ops".to_string(),
            actor_role: ActorRole::System,
            reason: None,
            recorded_at: opened_at(),
            automatic: false,
        }
    }

    #[test]
    fn opening_writes_the_initial_audit_row() {
        let store = MemoryStore::new();
        let record = store.open(draft(1, 1)).expect("opens");

        let history = store.history(record.id).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_state, None);
        assert_eq!(history[0].new_state, PipelineState::CompetencyReview);
        assert_eq!(history[0].actor_id, OPENING_ACTOR);
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let store = MemoryStore::new();
        store.open(draft(1, 1)).expect("opens");

        assert!(matches!(
            store.open(draft(1, 1)),
            Err(RepositoryError::Duplicate(_))
        ));
        assert!(store.open(draft(2, 1)).is_ok());
    }

    #[test]
    fn second_begin_fails_fast_until_the_first_is_released() {
        let store = MemoryStore::new();
        let record = store.open(draft(1, 1)).expect("opens");

        let first = store.begin(record.id).expect("first lock");
        assert_eq!(
            store.begin(record.id).err(),
            Some(RepositoryError::Locked(record.id))
        );
        drop(first);
        assert!(store.begin(record.id).is_ok());
    }

    #[test]
    fn dropped_transactions_leave_no_trace() {
        let store = MemoryStore::new();
        let record = store.open(draft(1, 1)).expect("opens");

        {
            let mut tx = store.begin(record.id).expect("lock");
            let mut staged = tx.record().clone();
            staged.state = PipelineState::TestsDone;
            tx.stage_record(staged);
            tx.stage_transition(step(PipelineState::CompetencyReview, PipelineState::TestsDone));
        }

        let stored = store.fetch(record.id).expect("fetch").expect("present");
        assert_eq!(stored.state, PipelineState::CompetencyReview);
        assert_eq!(store.history(record.id).expect("history").len(), 1);
    }

    #[test]
    fn commit_applies_record_and_audit_together() {
        let store = MemoryStore::new();
        let record = store.open(draft(1, 1)).expect("opens");

        let mut tx = store.begin(record.id).expect("lock");
        let mut staged = tx.record().clone();
        staged.state = PipelineState::TestsDone;
        tx.stage_record(staged);
        tx.stage_transition(step(PipelineState::CompetencyReview, PipelineState::TestsDone));
        let receipt = tx.commit().expect("commits");

        assert_eq!(receipt.transitions.len(), 1);
        assert_eq!(
            store.latest(record.id).expect("latest").map(|row| row.new_state),
            Some(PipelineState::TestsDone)
        );
        assert!(store.begin(record.id).is_ok(), "commit releases the lock");
    }

    #[test]
    fn match_sequences_count_per_job() {
        let store = MemoryStore::new();
        let a = store.open(draft(1, 1)).expect("opens");
        let b = store.open(draft(1, 2)).expect("opens");
        let c = store.open(draft(2, 3)).expect("opens");

        let first = store
            .begin(a.id)
            .and_then(|mut tx| tx.allocate_match_sequence())
            .expect("sequence");
        let second = store
            .begin(b.id)
            .and_then(|mut tx| tx.allocate_match_sequence())
            .expect("sequence");
        let other_job = store
            .begin(c.id)
            .and_then(|mut tx| tx.allocate_match_sequence())
            .expect("sequence");

        assert_eq!((first, second, other_job), (1, 2, 1));
    }

    #[test]
    fn entered_state_uses_a_half_open_window() {
        let store = MemoryStore::new();
        store.open(draft(1, 1)).expect("opens");

        let hits = store
            .entered_state(
                PipelineState::CompetencyReview,
                opened_at(),
                opened_at() + chrono::Duration::hours(1),
            )
            .expect("query");
        let misses = store
            .entered_state(
                PipelineState::CompetencyReview,
                opened_at() - chrono::Duration::hours(1),
                opened_at(),
            )
            .expect("query");

        assert_eq!(hits.len(), 1);
        assert!(misses.is_empty());
    }
}
