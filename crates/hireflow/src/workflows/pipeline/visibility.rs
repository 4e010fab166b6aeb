use serde::{Deserialize, Serialize};

use super::domain::PipelineState;

/// What each party may see for a pairing in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Disclosure {
    pub company_sees_identity: bool,
    pub company_sees_resume: bool,
    pub company_sees_test_results: bool,
    pub candidate_sees_company: bool,
    pub candidate_visible_to_other_jobs: bool,
}

impl Disclosure {
    const fn new(
        company_sees_identity: bool,
        company_sees_resume: bool,
        company_sees_test_results: bool,
        candidate_sees_company: bool,
        candidate_visible_to_other_jobs: bool,
    ) -> Self {
        Self {
            company_sees_identity,
            company_sees_resume,
            company_sees_test_results,
            candidate_sees_company,
            candidate_visible_to_other_jobs,
        }
    }
}

/// Single source of truth for disclosure rules.
///
/// Identity and resume are only revealed once the candidate has accepted an interview.
/// Rejection revokes every company-side disclosure and returns the candidate to the open
/// market, whatever state the rejection came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityPolicy;

impl VisibilityPolicy {
    pub const fn disclosure_for(state: PipelineState) -> Disclosure {
        match state {
            PipelineState::CompetencyReview | PipelineState::TestsPending => {
                Disclosure::new(false, false, false, false, true)
            }
            PipelineState::TestsDone => Disclosure::new(false, false, true, false, true),
            PipelineState::CompanyInterest => Disclosure::new(false, false, true, true, true),
            PipelineState::InterviewAccepted => Disclosure::new(true, true, true, true, true),
            PipelineState::Selected
            | PipelineState::Hired
            | PipelineState::UnderWarranty
            | PipelineState::RefundRequested
            | PipelineState::WarrantyCompleted => Disclosure::new(true, true, true, true, false),
            PipelineState::Rejected => Disclosure::new(false, false, false, false, true),
        }
    }
}
