use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::visibility::{Disclosure, VisibilityPolicy};
use crate::workflows::billing::RefundQuote;
use crate::workflows::domain::{CandidacyId, CandidateId, ChargeId, JobId};
use crate::workflows::matching::domain::MatchTier;

/// Pipeline states of a candidate-job pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    CompetencyReview,
    TestsPending,
    TestsDone,
    CompanyInterest,
    InterviewAccepted,
    Selected,
    Hired,
    UnderWarranty,
    RefundRequested,
    WarrantyCompleted,
    Rejected,
}

impl PipelineState {
    pub const ALL: [PipelineState; 11] = [
        PipelineState::CompetencyReview,
        PipelineState::TestsPending,
        PipelineState::TestsDone,
        PipelineState::CompanyInterest,
        PipelineState::InterviewAccepted,
        PipelineState::Selected,
        PipelineState::Hired,
        PipelineState::UnderWarranty,
        PipelineState::RefundRequested,
        PipelineState::WarrantyCompleted,
        PipelineState::Rejected,
    ];

    pub const INITIAL: PipelineState = PipelineState::CompetencyReview;

    pub const fn label(self) -> &'static str {
        match self {
            PipelineState::CompetencyReview => "competency_review",
            PipelineState::TestsPending => "tests_pending",
            PipelineState::TestsDone => "tests_done",
            PipelineState::CompanyInterest => "company_interest",
            PipelineState::InterviewAccepted => "interview_accepted",
            PipelineState::Selected => "selected",
            PipelineState::Hired => "hired",
            PipelineState::UnderWarranty => "under_warranty",
            PipelineState::RefundRequested => "refund_requested",
            PipelineState::WarrantyCompleted => "warranty_completed",
            PipelineState::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::WarrantyCompleted | PipelineState::Rejected
        )
    }

    pub const fn is_warranty(self) -> bool {
        matches!(
            self,
            PipelineState::UnderWarranty | PipelineState::RefundRequested
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Party invoking a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Company,
    Candidate,
    System,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Company => "company",
            ActorRole::Candidate => "candidate",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn system(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::System)
    }
}

/// Ranking metadata captured when the pairing was (re)matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub tier: MatchTier,
    pub score: u32,
    /// Order in which candidates consented to interview for this job.
    pub match_sequence_number: Option<u32>,
}

/// The pairing of one candidate with one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidacyRecord {
    pub id: CandidacyId,
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub state: PipelineState,
    /// Cached `VisibilityPolicy::disclosure_for(state)`.
    pub visibility: Disclosure,
    pub matching: MatchMetadata,
    pub interest_at: Option<DateTime<Utc>>,
    pub consent_at: Option<DateTime<Utc>>,
    pub charge_id: Option<ChargeId>,
    pub hired_on: Option<NaiveDate>,
    pub warranty_start: Option<NaiveDate>,
    pub warranty_end: Option<NaiveDate>,
    pub warranty_active: bool,
    pub refund: Option<RefundQuote>,
    pub excluded: bool,
    pub exclusion_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidacyRecord {
    /// Fresh pairing in the initial pipeline state.
    pub fn open(id: CandidacyId, draft: &NewCandidacy) -> Self {
        Self {
            id,
            job_id: draft.job_id,
            candidate_id: draft.candidate_id,
            state: PipelineState::INITIAL,
            visibility: VisibilityPolicy::disclosure_for(PipelineState::INITIAL),
            matching: draft.matching,
            interest_at: None,
            consent_at: None,
            charge_id: None,
            hired_on: None,
            warranty_start: None,
            warranty_end: None,
            warranty_active: false,
            refund: None,
            excluded: false,
            exclusion_reason: None,
            created_at: draft.opened_at,
            updated_at: draft.opened_at,
        }
    }

    pub fn company_view(&self) -> CompanyPairingView {
        let visibility = VisibilityPolicy::disclosure_for(self.state);
        CompanyPairingView {
            candidacy_id: self.id,
            job_id: self.job_id,
            candidate_id: visibility.company_sees_identity.then_some(self.candidate_id),
            state: self.state.label(),
            tier: self.matching.tier.label(),
            score: self.matching.score,
            resume_visible: visibility.company_sees_resume,
            test_results_visible: visibility.company_sees_test_results,
            charge_id: self.charge_id,
            warranty_end: self.warranty_end,
            refund: self.refund.clone(),
        }
    }

    pub fn candidate_view(&self) -> CandidatePairingView {
        let visibility = VisibilityPolicy::disclosure_for(self.state);
        CandidatePairingView {
            candidacy_id: self.id,
            job_id: visibility.candidate_sees_company.then_some(self.job_id),
            state: self.state.label(),
            visible_to_other_jobs: visibility.candidate_visible_to_other_jobs,
        }
    }

    /// The pairing as `role` may see it. Only the system gets the unredacted record.
    pub fn view_for(&self, role: ActorRole) -> PairingView {
        match role {
            ActorRole::Company => PairingView::Company(self.company_view()),
            ActorRole::Candidate => PairingView::Candidate(self.candidate_view()),
            ActorRole::System => PairingView::Full(self.clone()),
        }
    }
}

/// Input for opening a pairing the first time a candidate qualifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewCandidacy {
    pub job_id: JobId,
    pub candidate_id: CandidateId,
    pub matching: MatchMetadata,
    pub opened_at: DateTime<Utc>,
}

/// Pairing as exposed to the hiring company; identity is redacted until consent.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyPairingView {
    pub candidacy_id: CandidacyId,
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<CandidateId>,
    pub state: &'static str,
    pub tier: &'static str,
    pub score: u32,
    pub resume_visible: bool,
    pub test_results_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<ChargeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund: Option<RefundQuote>,
}

/// Pairing as exposed to the candidate; the job is hidden until a company shows interest.
#[derive(Debug, Clone, Serialize)]
pub struct CandidatePairingView {
    pub candidacy_id: CandidacyId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub state: &'static str,
    pub visible_to_other_jobs: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PairingView {
    Full(CandidacyRecord),
    Company(CompanyPairingView),
    Candidate(CandidatePairingView),
}
