use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::clock::{Clock, FixedClock};
use crate::store::MemoryStore;
use crate::workflows::billing::{AddOnService, BillingEngine, Charge, PaymentConfirmation};
use crate::workflows::domain::{CandidacyId, CandidateId, CompanyId, CompetencyId, JobId, Money};
use crate::workflows::matching::domain::{
    CandidateProfile, CompetencyEvidence, CompetencyLevel, EvidenceSource, FunctionalArea,
    JobPosting, JobRequirement,
};
use crate::workflows::matching::{MatchingConfig, MatchingService};
use crate::workflows::pipeline::{
    pipeline_router, Actor, ActorRole, CandidacyRepository, NotificationDispatcher,
    NotificationError, NotificationEvent, NotificationRequest, PipelineService, PipelineState,
    TransitionOutcome, TransitionRequest,
};

pub(super) const JOB: JobId = JobId(1);
/// Same functional area as [`JOB`] but without a posted salary.
pub(super) const UNPRICED_JOB: JobId = JobId(2);
pub(super) const SQL: CompetencyId = CompetencyId(1);

pub(super) fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn company() -> Actor {
    Actor::new("recruiter-ana", ActorRole::Company)
}

pub(super) fn candidate() -> Actor {
    Actor::new("candidate-self", ActorRole::Candidate)
}

pub(super) fn system() -> Actor {
    Actor::system("ops-automation")
}

fn level(value: u8) -> CompetencyLevel {
    CompetencyLevel::new(value).expect("valid level")
}

fn job(job_id: JobId, annual_salary: Option<Money>) -> JobPosting {
    JobPosting {
        job_id,
        company_id: CompanyId(1),
        title: "Data Analyst".to_string(),
        functional_area: FunctionalArea::new("analytics"),
        annual_salary,
    }
}

fn requirement(job_id: JobId) -> JobRequirement {
    JobRequirement {
        job_id,
        competency_id: SQL,
        minimum_level: level(2),
        test_required: false,
    }
}

fn profile(id: u64) -> CandidateProfile {
    CandidateProfile {
        candidate_id: CandidateId(id),
        functional_area: FunctionalArea::new("analytics"),
        profile_completed_at: Some(started_at() - chrono::Duration::days(30 - id as i64)),
        completed_formal_tests: 0,
        profile_active: true,
    }
}

/// Three qualifying analysts: 1 and 3 certified, 2 self-declared.
pub(super) fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_job(job(JOB, Some(Money::from_major(45_000))), vec![requirement(JOB)])
        .expect("job stored");
    store
        .upsert_job(job(UNPRICED_JOB, None), vec![requirement(UNPRICED_JOB)])
        .expect("job stored");

    for (id, value, source) in [
        (1, 3, EvidenceSource::Certified),
        (2, 3, EvidenceSource::SelfDeclared),
        (3, 4, EvidenceSource::Certified),
    ] {
        store.upsert_candidate(profile(id)).expect("candidate stored");
        store
            .record_evidence(CompetencyEvidence {
                candidate_id: CandidateId(id),
                competency_id: SQL,
                level: level(value),
                source,
            })
            .expect("evidence stored");
    }
    store
}

pub(super) struct Harness<N> {
    pub(super) store: Arc<MemoryStore>,
    pub(super) dispatcher: Arc<N>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) pipeline: Arc<PipelineService<MemoryStore, N>>,
    pub(super) matching: Arc<MatchingService<MemoryStore>>,
}

pub(super) fn harness() -> Harness<RecordingDispatcher> {
    harness_with(Arc::new(RecordingDispatcher::default()))
}

/// Builds the services over a seeded store and runs matching for [`JOB`] once.
pub(super) fn harness_with<N>(dispatcher: Arc<N>) -> Harness<N>
where
    N: NotificationDispatcher + 'static,
{
    let store = seeded_store();
    let clock = Arc::new(FixedClock::new(started_at()));
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let pipeline = Arc::new(PipelineService::new(
        store.clone(),
        dispatcher.clone(),
        Arc::new(BillingEngine::standard()),
        shared_clock.clone(),
    ));
    let matching = Arc::new(MatchingService::new(
        store.clone(),
        MatchingConfig::default(),
        shared_clock,
    ));
    matching.match_job(JOB).expect("seed matching runs");

    Harness {
        store,
        dispatcher,
        clock,
        pipeline,
        matching,
    }
}

impl<N> Harness<N>
where
    N: NotificationDispatcher + 'static,
{
    pub(super) fn pairing(&self, candidate: u64) -> CandidacyId {
        self.store
            .find_by_pair(JOB, CandidateId(candidate))
            .expect("lookup succeeds")
            .expect("pairing opened by matching")
            .id
    }

    pub(super) fn state(&self, id: CandidacyId) -> PipelineState {
        self.pipeline.get(id).expect("pairing exists").state
    }

    pub(super) fn open_charge(&self, id: CandidacyId) -> Charge {
        self.pipeline
            .charge_for(id)
            .expect("charge lookup")
            .expect("charge opened at hire")
    }

    pub(super) fn router(&self) -> axum::Router {
        pipeline_router(self.pipeline.clone(), self.matching.clone())
    }

    /// Walks the happy path until the pairing reaches `target`.
    pub(super) fn advance_to(&self, id: CandidacyId, target: PipelineState) {
        let path = [
            PipelineState::TestsDone,
            PipelineState::CompanyInterest,
            PipelineState::InterviewAccepted,
            PipelineState::Selected,
            PipelineState::Hired,
            PipelineState::UnderWarranty,
        ];

        for next in path {
            if self.state(id) == target {
                return;
            }
            self.step(id, next)
                .unwrap_or_else(|err| panic!("moving {id} to {next} failed: {err}"));
        }
        assert_eq!(self.state(id), target, "{target} is not on the happy path");
    }

    pub(super) fn step(
        &self,
        id: CandidacyId,
        next: PipelineState,
    ) -> Result<TransitionOutcome, crate::workflows::pipeline::PipelineError> {
        match next {
            PipelineState::TestsDone => self
                .pipeline
                .transition(id, TransitionRequest::new(next, system())),
            PipelineState::InterviewAccepted => self
                .pipeline
                .transition(id, TransitionRequest::new(next, candidate())),
            PipelineState::Hired => self.pipeline.transition(
                id,
                TransitionRequest::new(next, company()).with_add_ons([AddOnService::SoftSkillsTest]),
            ),
            PipelineState::UnderWarranty => {
                let payment = payment_for(&self.open_charge(id));
                self.pipeline.confirm_payment(id, payment)
            }
            _ => self
                .pipeline
                .transition(id, TransitionRequest::new(next, company())),
        }
    }
}

pub(super) fn payment_for(charge: &Charge) -> PaymentConfirmation {
    PaymentConfirmation {
        charge_id: charge.id,
        method: "wire".to_string(),
        external_transaction_id: format!("txn-{}", charge.id.0),
        amount_paid: charge.amount_total,
    }
}

#[derive(Default)]
pub(super) struct RecordingDispatcher {
    sent: Mutex<Vec<NotificationRequest>>,
}

impl RecordingDispatcher {
    pub(super) fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().expect("dispatcher mutex poisoned").clone()
    }

    pub(super) fn events(&self) -> Vec<(NotificationEvent, ActorRole)> {
        self.sent()
            .into_iter()
            .map(|request| (request.event_type, request.recipient_role))
            .collect()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(request);
        Ok(())
    }
}

pub(super) struct FailingDispatcher;

impl NotificationDispatcher for FailingDispatcher {
    fn dispatch(&self, _request: NotificationRequest) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
