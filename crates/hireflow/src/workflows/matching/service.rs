use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::domain::{CandidateProfile, MatchResult, MatchTier, RequirementMatch, ScoredCandidate};
use super::engine::{MatchEngine, MatchingConfig};
use super::repository::{CandidatePool, CompetencyStore, JobCatalog};
use crate::clock::Clock;
use crate::store::RepositoryError;
use crate::workflows::domain::{CandidacyId, CandidateId, JobId};
use crate::workflows::pipeline::domain::{
    CandidacyRecord, MatchMetadata, NewCandidacy, PipelineState,
};
use crate::workflows::pipeline::repository::CandidacyRepository;

/// Error raised by the matching service.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("matching configuration error: {0}")]
    Configuration(String),
    #[error("{0} not found")]
    NotFound(JobId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Link between a ranked candidate and the pairing that tracks them for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairingRef {
    pub candidate_id: CandidateId,
    pub candidacy_id: CandidacyId,
}

/// Ranking plus the pairing bookkeeping it caused.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub result: MatchResult,
    pub pairings: Vec<PairingRef>,
    pub opened: usize,
    pub refreshed: usize,
    pub flagged_excluded: usize,
}

/// Ranked candidate as shown to the hiring company. The candidate is named only once
/// their pairing for this job discloses identity.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyRankedCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidacy_id: Option<CandidacyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<CandidateId>,
    pub tier: MatchTier,
    pub score: u32,
    pub formal_test_bonus: u32,
    pub contributions: Vec<RequirementMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyRanking {
    pub job_id: JobId,
    pub tier1: Vec<CompanyRankedCandidate>,
    pub tier2: Vec<CompanyRankedCandidate>,
    pub excluded_count: usize,
}

/// Company-facing result of a matching run that opened or refreshed pairings.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRun {
    #[serde(flatten)]
    pub ranking: CompanyRanking,
    pub opened: usize,
    pub refreshed: usize,
    pub flagged_excluded: usize,
}

/// Runs the matching engine against stored jobs, candidates and evidence, and keeps the
/// pairings for a job in step with the latest ranking.
pub struct MatchingService<S> {
    store: Arc<S>,
    engine: MatchEngine,
    clock: Arc<dyn Clock>,
}

impl<S> MatchingService<S>
where
    S: JobCatalog + CandidatePool + CompetencyStore + CandidacyRepository + 'static,
{
    pub fn new(store: Arc<S>, config: MatchingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            engine: MatchEngine::new(config),
            clock,
        }
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    /// Ranks the job's population without touching any pairing.
    pub fn preview(&self, job_id: JobId) -> Result<MatchResult, MatchingError> {
        let job = self
            .store
            .job(job_id)?
            .ok_or(MatchingError::NotFound(job_id))?;
        let requirements = self.store.requirements(job_id)?;

        let mut population = Vec::new();
        for profile in self.store.candidates_in_area(&job.functional_area)? {
            if self.available_for(job_id, &profile)? {
                population.push(profile);
            }
        }

        let ids: Vec<CandidateId> = population.iter().map(|p| p.candidate_id).collect();
        let evidence = self.store.evidence_for(&ids)?;

        self.engine.rank(&job, &requirements, &population, &evidence)
    }

    /// Ranks the job and opens, refreshes or flags the corresponding pairings.
    pub fn match_job(&self, job_id: JobId) -> Result<MatchOutcome, MatchingError> {
        let result = self.preview(job_id)?;
        let mut outcome = MatchOutcome {
            pairings: Vec::with_capacity(result.qualifying_count()),
            opened: 0,
            refreshed: 0,
            flagged_excluded: 0,
            result,
        };

        let ranked: Vec<ScoredCandidate> = outcome.result.ranked().cloned().collect();
        for scored in &ranked {
            let candidacy_id = match self.store.find_by_pair(job_id, scored.candidate_id)? {
                Some(existing) => {
                    if self.refresh(&existing, scored)? {
                        outcome.refreshed += 1;
                    }
                    existing.id
                }
                None => {
                    let record = self.store.open(NewCandidacy {
                        job_id,
                        candidate_id: scored.candidate_id,
                        matching: MatchMetadata {
                            tier: scored.tier,
                            score: scored.score,
                            match_sequence_number: None,
                        },
                        opened_at: self.clock.now(),
                    })?;
                    outcome.opened += 1;
                    record.id
                }
            };
            outcome.pairings.push(PairingRef {
                candidate_id: scored.candidate_id,
                candidacy_id,
            });
        }

        for exclusion in &outcome.result.exclusions {
            let Some(existing) = self.store.find_by_pair(job_id, exclusion.candidate_id)? else {
                continue;
            };
            if existing.state != PipelineState::CompetencyReview || existing.excluded {
                continue;
            }
            if self.update(existing.id, |record| {
                record.excluded = true;
                record.exclusion_reason = Some(exclusion.reason.summary());
            })? {
                outcome.flagged_excluded += 1;
            }
        }

        info!(
            %job_id,
            tier1 = outcome.result.tier1.len(),
            tier2 = outcome.result.tier2.len(),
            excluded = outcome.result.excluded_count,
            opened = outcome.opened,
            flagged = outcome.flagged_excluded,
            "job matched"
        );

        Ok(outcome)
    }

    /// Redacts a ranking for the hiring company using each pairing's disclosure.
    pub fn company_ranking(&self, result: &MatchResult) -> Result<CompanyRanking, MatchingError> {
        let tier = |scored: &[ScoredCandidate]| {
            scored
                .iter()
                .map(|candidate| self.company_entry(result.job_id, candidate))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(CompanyRanking {
            job_id: result.job_id,
            tier1: tier(result.tier1.as_slice())?,
            tier2: tier(result.tier2.as_slice())?,
            excluded_count: result.excluded_count,
        })
    }

    /// Runs [`Self::match_job`] and returns the company-facing summary.
    pub fn run_for_company(&self, job_id: JobId) -> Result<MatchRun, MatchingError> {
        let outcome = self.match_job(job_id)?;
        Ok(MatchRun {
            ranking: self.company_ranking(&outcome.result)?,
            opened: outcome.opened,
            refreshed: outcome.refreshed,
            flagged_excluded: outcome.flagged_excluded,
        })
    }

    fn company_entry(
        &self,
        job_id: JobId,
        scored: &ScoredCandidate,
    ) -> Result<CompanyRankedCandidate, MatchingError> {
        let pairing = self.store.find_by_pair(job_id, scored.candidate_id)?;
        Ok(CompanyRankedCandidate {
            candidacy_id: pairing.as_ref().map(|record| record.id),
            candidate_id: pairing
                .filter(|record| record.visibility.company_sees_identity)
                .map(|record| record.candidate_id),
            tier: scored.tier,
            score: scored.score,
            formal_test_bonus: scored.formal_test_bonus,
            contributions: scored.contributions.clone(),
        })
    }

    /// A candidate selected or hired elsewhere is withheld from every other job.
    fn available_for(
        &self,
        job_id: JobId,
        profile: &CandidateProfile,
    ) -> Result<bool, MatchingError> {
        Ok(self
            .store
            .for_candidate(profile.candidate_id)?
            .iter()
            .filter(|record| record.job_id != job_id)
            .all(|record| record.visibility.candidate_visible_to_other_jobs))
    }

    fn refresh(
        &self,
        existing: &CandidacyRecord,
        scored: &ScoredCandidate,
    ) -> Result<bool, MatchingError> {
        let unflag = existing.excluded && existing.state == PipelineState::CompetencyReview;
        if existing.matching.tier == scored.tier && existing.matching.score == scored.score && !unflag
        {
            return Ok(false);
        }

        self.update(existing.id, |record| {
            record.matching.tier = scored.tier;
            record.matching.score = scored.score;
            if record.state == PipelineState::CompetencyReview {
                record.excluded = false;
                record.exclusion_reason = None;
            }
        })
    }

    /// Applies a metadata-only change under the pairing lock. A pairing busy with a
    /// transition is left alone and picked up by the next matching run.
    fn update<F>(&self, id: CandidacyId, change: F) -> Result<bool, MatchingError>
    where
        F: FnOnce(&mut CandidacyRecord),
    {
        let mut tx = match self.store.begin(id) {
            Ok(tx) => tx,
            Err(RepositoryError::Locked(_)) => {
                debug!(%id, "pairing locked; skipping match refresh");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        let mut record = tx.record().clone();
        change(&mut record);
        record.updated_at = self.clock.now();
        tx.stage_record(record);
        tx.commit()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;
    use crate::workflows::domain::{CompanyId, CompetencyId, Money};
    use crate::workflows::matching::domain::{
        CompetencyEvidence, CompetencyLevel, EvidenceSource, FunctionalArea, JobPosting,
        JobRequirement, MatchTier,
    };
    use crate::workflows::pipeline::visibility::VisibilityPolicy;
    use chrono::{TimeZone, Utc};

    const X: CompetencyId = CompetencyId(1);

    fn level(value: u8) -> CompetencyLevel {
        CompetencyLevel::new(value).expect("valid level")
    }

    fn job(id: u64) -> JobPosting {
        JobPosting {
            job_id: JobId(id),
            company_id: CompanyId(1),
            title: "Data Analyst".to_string(),
            functional_area: FunctionalArea::new("analytics"),
            annual_salary: Some(Money::from_major(45_000)),
        }
    }

    fn seeded() -> (Arc<MemoryStore>, MatchingService<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for id in [1, 2] {
            store
                .upsert_job(
                    job(id),
                    vec![JobRequirement {
                        job_id: JobId(id),
                        competency_id: X,
                        minimum_level: level(2),
                        test_required: false,
                    }],
                )
                .expect("job stored");
        }
        for id in 1..=2 {
            store
                .upsert_candidate(CandidateProfile {
                    candidate_id: CandidateId(id),
                    functional_area: FunctionalArea::new("analytics"),
                    profile_completed_at: Utc.with_ymd_and_hms(2025, 1, id as u32, 0, 0, 0).single(),
                    completed_formal_tests: 0,
                    profile_active: true,
                })
                .expect("candidate stored");
        }
        evidence(&store, 1, 3, EvidenceSource::Certified);
        evidence(&store, 2, 2, EvidenceSource::SelfDeclared);

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).single().expect("valid"),
        ));
        let service = MatchingService::new(store.clone(), MatchingConfig::default(), clock);
        (store, service)
    }

    fn evidence(store: &MemoryStore, candidate: u64, value: u8, source: EvidenceSource) {
        store
            .record_evidence(CompetencyEvidence {
                candidate_id: CandidateId(candidate),
                competency_id: X,
                level: level(value),
                source,
            })
            .expect("evidence stored");
    }

    #[test]
    fn matching_opens_one_pairing_per_qualifying_candidate() {
        let (store, service) = seeded();

        let first = service.match_job(JobId(1)).expect("match runs");
        let second = service.match_job(JobId(1)).expect("match runs");

        assert_eq!(first.opened, 2);
        assert_eq!(second.opened, 0);
        assert_eq!(first.pairings, second.pairings);
        assert_eq!(store.for_job(JobId(1)).expect("pairings").len(), 2);
        let tier1 = &first.result.tier1[0];
        assert_eq!(tier1.candidate_id, CandidateId(1));
        assert_eq!(tier1.score, 9);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (_, service) = seeded();

        assert!(matches!(
            service.preview(JobId(99)),
            Err(MatchingError::NotFound(JobId(99)))
        ));
    }

    #[test]
    fn job_without_requirements_is_a_configuration_error() {
        let (store, service) = seeded();
        store.upsert_job(job(3), Vec::new()).expect("job stored");

        assert!(matches!(
            service.match_job(JobId(3)),
            Err(MatchingError::Configuration(_))
        ));
    }

    #[test]
    fn rematching_refreshes_scores_and_flags_dropouts() {
        let (store, service) = seeded();
        service.match_job(JobId(1)).expect("match runs");

        evidence(&store, 1, 4, EvidenceSource::Certified);
        evidence(&store, 2, 1, EvidenceSource::SelfDeclared);
        let outcome = service.match_job(JobId(1)).expect("match runs");

        assert_eq!(outcome.refreshed, 1);
        assert_eq!(outcome.flagged_excluded, 1);
        let improved = store
            .find_by_pair(JobId(1), CandidateId(1))
            .expect("lookup")
            .expect("present");
        assert_eq!(improved.matching.score, 12);
        assert_eq!(improved.matching.tier, MatchTier::Certified);
        let dropped = store
            .find_by_pair(JobId(1), CandidateId(2))
            .expect("lookup")
            .expect("present");
        assert!(dropped.excluded);
        assert!(dropped.exclusion_reason.is_some());
        assert_eq!(dropped.state, PipelineState::CompetencyReview);
    }

    #[test]
    fn candidates_selected_elsewhere_are_withheld() {
        let (store, service) = seeded();
        let outcome = service.match_job(JobId(1)).expect("match runs");
        let pairing = outcome.pairings[0].candidacy_id;

        let mut tx = store.begin(pairing).expect("lock");
        let mut record = tx.record().clone();
        record.state = PipelineState::Selected;
        record.visibility = VisibilityPolicy::disclosure_for(PipelineState::Selected);
        tx.stage_record(record);
        tx.commit().expect("commit");

        let other = service.preview(JobId(2)).expect("preview");
        assert!(other.ranked().all(|scored| scored.candidate_id != CandidateId(1)));
        assert_eq!(other.qualifying_count(), 1);
    }

    #[test]
    fn company_ranking_names_candidates_only_after_consent() {
        let (store, service) = seeded();

        let preview = service.preview(JobId(1)).expect("preview");
        let unopened = service.company_ranking(&preview).expect("ranking");
        assert!(unopened.tier1[0].candidacy_id.is_none());
        assert!(unopened.tier1[0].candidate_id.is_none());
        assert!(store.for_job(JobId(1)).expect("pairings").is_empty());

        let run = service.run_for_company(JobId(1)).expect("match runs");
        assert_eq!(run.opened, 2);
        let pairing = run.ranking.tier1[0].candidacy_id.expect("pairing opened");
        assert!(run
            .ranking
            .tier1
            .iter()
            .chain(&run.ranking.tier2)
            .all(|entry| entry.candidate_id.is_none()));

        let mut tx = store.begin(pairing).expect("lock");
        let mut record = tx.record().clone();
        record.state = PipelineState::InterviewAccepted;
        record.visibility = VisibilityPolicy::disclosure_for(PipelineState::InterviewAccepted);
        tx.stage_record(record);
        tx.commit().expect("commit");

        let consented = service.company_ranking(&preview).expect("ranking");
        assert_eq!(consented.tier1[0].candidate_id, Some(CandidateId(1)));
        assert!(consented.tier2[0].candidate_id.is_none());
    }
}
