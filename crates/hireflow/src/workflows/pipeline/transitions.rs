use super::domain::{ActorRole, PipelineState};
use super::notifications::NotificationEvent;

/// Precondition evaluated against the locked pairing before any effect runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    None,
    /// The latest matching run still ranks the candidate for the job.
    NotExcluded,
    /// An annual salary is available from the request or the job posting.
    SalaryKnown,
    /// The request carries a payment confirmation matching the open charge.
    PaymentMatchesCharge,
    /// The warranty end date has passed.
    WarrantyElapsed,
    /// The warranty is active and its end date has not passed.
    WithinWarranty,
}

/// Side effect applied inside the transition's unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RecordInterest,
    RecordConsent,
    AssignMatchSequence,
    OpenSuccessFeeCharge,
    DeactivateProfile,
    /// Puts the candidate's public profile back into matching.
    ReactivateProfile,
    ConfirmPayment,
    OpenWarranty,
    CloseWarranty,
    QuoteRefund,
    ResolveRefund,
    CancelOpenCharge,
    Notify(NotificationEvent, ActorRole),
    /// Notifies whichever party did not invoke the transition.
    NotifyCounterpart(NotificationEvent),
}

/// One edge of the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: PipelineState,
    pub to: PipelineState,
    pub actors: &'static [ActorRole],
    pub guard: Guard,
    pub effects: &'static [Effect],
}

impl TransitionRule {
    pub fn permits(&self, role: ActorRole) -> bool {
        self.actors.contains(&role)
    }
}

const SYSTEM: &[ActorRole] = &[ActorRole::System];
const COMPANY: &[ActorRole] = &[ActorRole::Company];
const CANDIDATE: &[ActorRole] = &[ActorRole::Candidate];
const SYSTEM_OR_COMPANY: &[ActorRole] = &[ActorRole::System, ActorRole::Company];
const ANY_PARTY: &[ActorRole] = &[ActorRole::Company, ActorRole::Candidate, ActorRole::System];

const REJECT: &[Effect] = &[Effect::NotifyCounterpart(NotificationEvent::CandidacyRejected)];

const fn rejection(from: PipelineState) -> TransitionRule {
    TransitionRule {
        from,
        to: PipelineState::Rejected,
        actors: ANY_PARTY,
        guard: Guard::None,
        effects: REJECT,
    }
}

/// The complete transition graph. Any (from, to) pair not listed is invalid.
pub const TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        from: PipelineState::CompetencyReview,
        to: PipelineState::TestsDone,
        actors: SYSTEM_OR_COMPANY,
        guard: Guard::NotExcluded,
        effects: &[],
    },
    TransitionRule {
        from: PipelineState::CompetencyReview,
        to: PipelineState::TestsPending,
        actors: SYSTEM_OR_COMPANY,
        guard: Guard::NotExcluded,
        effects: &[],
    },
    TransitionRule {
        from: PipelineState::TestsPending,
        to: PipelineState::TestsDone,
        actors: SYSTEM,
        guard: Guard::NotExcluded,
        effects: &[],
    },
    TransitionRule {
        from: PipelineState::TestsDone,
        to: PipelineState::CompanyInterest,
        actors: COMPANY,
        guard: Guard::None,
        effects: &[
            Effect::RecordInterest,
            Effect::Notify(NotificationEvent::CompanyInterest, ActorRole::Candidate),
        ],
    },
    TransitionRule {
        from: PipelineState::CompanyInterest,
        to: PipelineState::InterviewAccepted,
        actors: CANDIDATE,
        guard: Guard::None,
        effects: &[
            Effect::RecordConsent,
            Effect::AssignMatchSequence,
            Effect::Notify(NotificationEvent::InterviewAccepted, ActorRole::Company),
        ],
    },
    TransitionRule {
        from: PipelineState::InterviewAccepted,
        to: PipelineState::Selected,
        actors: COMPANY,
        guard: Guard::None,
        effects: &[Effect::Notify(
            NotificationEvent::CandidateSelected,
            ActorRole::Candidate,
        )],
    },
    TransitionRule {
        from: PipelineState::Selected,
        to: PipelineState::Hired,
        actors: COMPANY,
        guard: Guard::SalaryKnown,
        effects: &[
            Effect::OpenSuccessFeeCharge,
            Effect::DeactivateProfile,
            Effect::Notify(NotificationEvent::CandidateHired, ActorRole::Company),
            Effect::Notify(NotificationEvent::CandidateHired, ActorRole::Candidate),
        ],
    },
    TransitionRule {
        from: PipelineState::Hired,
        to: PipelineState::UnderWarranty,
        actors: SYSTEM,
        guard: Guard::PaymentMatchesCharge,
        effects: &[
            Effect::ConfirmPayment,
            Effect::OpenWarranty,
            Effect::Notify(NotificationEvent::WarrantyStarted, ActorRole::Company),
        ],
    },
    TransitionRule {
        from: PipelineState::UnderWarranty,
        to: PipelineState::WarrantyCompleted,
        actors: SYSTEM,
        guard: Guard::WarrantyElapsed,
        effects: &[
            Effect::CloseWarranty,
            Effect::Notify(NotificationEvent::WarrantyCompleted, ActorRole::Company),
        ],
    },
    TransitionRule {
        from: PipelineState::UnderWarranty,
        to: PipelineState::RefundRequested,
        actors: COMPANY,
        guard: Guard::WithinWarranty,
        effects: &[Effect::QuoteRefund],
    },
    TransitionRule {
        from: PipelineState::RefundRequested,
        to: PipelineState::WarrantyCompleted,
        actors: SYSTEM,
        guard: Guard::None,
        effects: &[
            Effect::ResolveRefund,
            Effect::CloseWarranty,
            Effect::Notify(NotificationEvent::RefundResolved, ActorRole::Company),
        ],
    },
    rejection(PipelineState::CompetencyReview),
    rejection(PipelineState::TestsPending),
    rejection(PipelineState::TestsDone),
    rejection(PipelineState::CompanyInterest),
    rejection(PipelineState::InterviewAccepted),
    rejection(PipelineState::Selected),
    TransitionRule {
        from: PipelineState::Hired,
        to: PipelineState::Rejected,
        actors: ANY_PARTY,
        guard: Guard::None,
        effects: &[
            Effect::CancelOpenCharge,
            Effect::ReactivateProfile,
            Effect::NotifyCounterpart(NotificationEvent::CandidacyRejected),
        ],
    },
];

pub fn rule_for(from: PipelineState, to: PipelineState) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.from == from && rule.to == to)
}

/// States reachable from `from` in one step.
pub fn targets_from(from: PipelineState) -> impl Iterator<Item = PipelineState> {
    TRANSITIONS
        .iter()
        .filter(move |rule| rule.from == from)
        .map(|rule| rule.to)
}
