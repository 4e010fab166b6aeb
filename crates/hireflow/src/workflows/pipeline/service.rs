use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::{AuditTrail, NewTransition, TransitionRecord};
use super::domain::{Actor, ActorRole, CandidacyRecord, PairingView, PipelineState};
use super::notifications::{
    deliver_all, NotificationDispatcher, NotificationEvent, NotificationPolicy,
    NotificationReceipt, NotificationRequest,
};
use super::repository::{CandidacyRepository, CandidacyTransaction, ChargeLedger};
use super::transitions::{rule_for, Effect, Guard};
use super::visibility::VisibilityPolicy;
use crate::clock::Clock;
use crate::store::RepositoryError;
use crate::workflows::billing::{
    AddOnService, BillingEngine, BillingError, Charge, PaymentConfirmation,
};
use crate::workflows::domain::{CandidacyId, Money};
use crate::workflows::matching::repository::JobCatalog;

/// Actor id recorded when the payment processor confirms a charge.
pub const PAYMENT_ACTOR: &str = "payment-processor";

/// Request to move one pairing to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target: PipelineState,
    pub actor: Actor,
    #[serde(default)]
    pub reason: Option<String>,
    /// State the caller last observed; a mismatch is reported as a conflict.
    #[serde(default)]
    pub expected_state: Option<PipelineState>,
    /// Overrides the job's posted salary when hiring.
    #[serde(default)]
    pub annual_salary: Option<Money>,
    #[serde(default)]
    pub add_ons: Vec<AddOnService>,
    #[serde(default)]
    pub payment: Option<PaymentConfirmation>,
    #[serde(default)]
    pub automatic: bool,
}

impl TransitionRequest {
    pub fn new(target: PipelineState, actor: Actor) -> Self {
        Self {
            target,
            actor,
            reason: None,
            expected_state: None,
            annual_salary: None,
            add_ons: Vec::new(),
            payment: None,
            automatic: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn expecting(mut self, state: PipelineState) -> Self {
        self.expected_state = Some(state);
        self
    }

    pub fn with_salary(mut self, annual_salary: Money) -> Self {
        self.annual_salary = Some(annual_salary);
        self
    }

    pub fn with_add_ons(mut self, add_ons: impl IntoIterator<Item = AddOnService>) -> Self {
        self.add_ons = add_ons.into_iter().collect();
        self
    }

    pub fn with_payment(mut self, payment: PaymentConfirmation) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn automatic(mut self) -> Self {
        self.automatic = true;
        self
    }
}

/// Committed result of a transition plus what happened to its notifications.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub record: CandidacyRecord,
    pub transition: TransitionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<Charge>,
    pub notifications: Vec<NotificationReceipt>,
}

impl TransitionOutcome {
    /// Renders the outcome for the party that requested it. Companies and candidates get
    /// their redacted pairing view and candidates never see the charge.
    pub fn view_for(&self, role: ActorRole) -> TransitionView {
        TransitionView {
            record: self.record.view_for(role),
            transition: self.transition.clone(),
            charge: match role {
                ActorRole::Candidate => None,
                ActorRole::Company | ActorRole::System => self.charge.clone(),
            },
            notifications: self.notifications.clone(),
        }
    }
}

/// [`TransitionOutcome`] as returned over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionView {
    pub record: PairingView,
    pub transition: TransitionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<Charge>,
    pub notifications: Vec<NotificationReceipt>,
}

/// Error raised by the pipeline service. Nothing is persisted when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("transition {from} -> {to} is not defined")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },
    #[error("{role} may not move a pairing from {from} to {to}")]
    Permission {
        role: ActorRole,
        from: PipelineState,
        to: PipelineState,
    },
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("external dependency rejected the request: {0}")]
    ExternalDependency(String),
    #[error("{0} not found")]
    NotFound(CandidacyId),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl PipelineError {
    pub const fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidTransition { .. } => "invalid_transition",
            PipelineError::Permission { .. } => "permission",
            PipelineError::Precondition(_) => "precondition",
            PipelineError::Conflict(_) => "conflict",
            PipelineError::Configuration(_) => "configuration",
            PipelineError::ExternalDependency(_) => "external_dependency",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Repository(_) => "repository",
        }
    }
}

impl From<RepositoryError> for PipelineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Locked(id) => {
                PipelineError::Conflict(format!("{id} is being changed by another request"))
            }
            other => PipelineError::Repository(other),
        }
    }
}

impl From<BillingError> for PipelineError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::MissingPrice(_) | BillingError::InvalidSchedule(_) => {
                PipelineError::Configuration(err.to_string())
            }
            BillingError::ZeroSalary | BillingError::Charge(_) => {
                PipelineError::Precondition(err.to_string())
            }
        }
    }
}

/// Guarded state machine over candidate-job pairings.
///
/// Every transition locks the pairing row, checks the edge, the actor's role and the
/// edge's guard, applies its effects, recomputes visibility and appends one audit row, all
/// inside a single unit of work. Notifications go out only after the commit.
pub struct PipelineService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    billing: Arc<BillingEngine>,
    notifications: NotificationPolicy,
    clock: Arc<dyn Clock>,
}

impl<S, N> PipelineService<S, N>
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        billing: Arc<BillingEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            billing,
            notifications: NotificationPolicy::standard(),
            clock,
        }
    }

    pub fn with_notification_policy(mut self, policy: NotificationPolicy) -> Self {
        self.notifications = policy;
        self
    }

    pub fn billing(&self) -> &BillingEngine {
        &self.billing
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn notifier(&self) -> &N {
        &self.notifier
    }

    pub(crate) fn notification_policy(&self) -> &NotificationPolicy {
        &self.notifications
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn transition(
        &self,
        id: CandidacyId,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, PipelineError> {
        let mut tx = self.begin(id)?;
        let from = tx.record().state;
        let to = request.target;

        if let Some(expected) = request.expected_state {
            if expected != from {
                return Err(PipelineError::Conflict(format!(
                    "{id} is {from}, expected {expected}"
                )));
            }
        }
        if tx.latest_transition().map(|row| row.new_state) != Some(from) {
            return Err(PipelineError::Conflict(format!(
                "audit trail for {id} does not end in {from}"
            )));
        }

        let rule = rule_for(from, to).ok_or(PipelineError::InvalidTransition { from, to })?;
        if !rule.permits(request.actor.role) {
            return Err(PipelineError::Permission {
                role: request.actor.role,
                from,
                to,
            });
        }

        let now = self.clock.now();
        let today = self.clock.today();
        let mut record = tx.record().clone();
        let mut charge = tx.charge().cloned();
        let mut charge_changed = false;
        let mut recipients = Vec::new();

        let salary = self.check_guard(rule.guard, &record, charge.as_ref(), &request, today)?;

        for effect in rule.effects {
            match *effect {
                Effect::RecordInterest => record.interest_at = Some(now),
                Effect::RecordConsent => record.consent_at = Some(now),
                Effect::AssignMatchSequence => {
                    record.matching.match_sequence_number = Some(tx.allocate_match_sequence()?);
                }
                Effect::OpenSuccessFeeCharge => {
                    let salary = salary.ok_or_else(|| {
                        PipelineError::Precondition("annual salary is unknown".to_string())
                    })?;
                    let charge_id = tx.allocate_charge_id()?;
                    let opened = self.billing.open_success_fee(
                        charge_id,
                        record.id,
                        salary,
                        &request.add_ons,
                        today,
                    )?;
                    record.charge_id = Some(charge_id);
                    record.hired_on = Some(today);
                    charge = Some(opened);
                    charge_changed = true;
                }
                Effect::DeactivateProfile => {
                    tx.stage_profile_activity(record.candidate_id, false)
                }
                Effect::ReactivateProfile => tx.stage_profile_activity(record.candidate_id, true),
                Effect::ConfirmPayment => {
                    let payment = request.payment.as_ref().ok_or_else(|| {
                        PipelineError::Precondition("payment confirmation is required".to_string())
                    })?;
                    let open = charge.as_mut().ok_or_else(|| missing_charge(id))?;
                    open.mark_paid(payment, today)
                        .map_err(|err| PipelineError::ExternalDependency(err.to_string()))?;
                    charge_changed = true;
                }
                Effect::OpenWarranty => {
                    let start = record.hired_on.unwrap_or(today);
                    record.warranty_start = Some(start);
                    record.warranty_end = Some(self.billing.warranty_end(start));
                    record.warranty_active = true;
                }
                Effect::CloseWarranty => record.warranty_active = false,
                Effect::QuoteRefund => {
                    let paid = charge.as_ref().ok_or_else(|| missing_charge(id))?;
                    let start = record.warranty_start.ok_or_else(|| {
                        PipelineError::Precondition(format!("{id} has no warranty start date"))
                    })?;
                    record.refund = Some(self.billing.quote_refund(paid, start, today));
                }
                Effect::ResolveRefund => {
                    let quote = record.refund.as_mut().ok_or_else(|| {
                        PipelineError::Precondition(format!("{id} has no refund quote"))
                    })?;
                    let refunded = charge.as_mut().ok_or_else(|| missing_charge(id))?;
                    refunded
                        .mark_refunded(quote.amount)
                        .map_err(|err| PipelineError::Precondition(err.to_string()))?;
                    quote.resolved_on = Some(today);
                    charge_changed = true;
                }
                Effect::CancelOpenCharge => {
                    if let Some(open) = charge.as_mut().filter(|charge| charge.is_open()) {
                        open.cancel()
                            .map_err(|err| PipelineError::Precondition(err.to_string()))?;
                        charge_changed = true;
                    }
                }
                Effect::Notify(event, role) => recipients.push((event, role)),
                Effect::NotifyCounterpart(event) => match request.actor.role {
                    ActorRole::Company => recipients.push((event, ActorRole::Candidate)),
                    ActorRole::Candidate => recipients.push((event, ActorRole::Company)),
                    ActorRole::System => {
                        recipients.push((event, ActorRole::Company));
                        recipients.push((event, ActorRole::Candidate));
                    }
                },
            }
        }

        record.state = to;
        record.visibility = VisibilityPolicy::disclosure_for(to);
        record.updated_at = now;
        tx.stage_record(record);
        if charge_changed {
            if let Some(charge) = &charge {
                tx.stage_charge(charge.clone());
            }
        }
        tx.stage_transition(NewTransition {
            previous_state: Some(from),
            new_state: to,
            actor_id: request.actor.id.clone(),
            actor_role: request.actor.role,
            reason: request.reason.clone(),
            recorded_at: now,
            automatic: request.automatic,
        });

        let receipt = tx.commit()?;
        let transition = receipt.transitions.last().cloned().ok_or_else(|| {
            PipelineError::Repository(RepositoryError::Unavailable(
                "commit returned no audit row".to_string(),
            ))
        })?;

        info!(
            candidacy_id = %id,
            from = from.label(),
            to = to.label(),
            actor = %request.actor.id,
            role = request.actor.role.label(),
            "pipeline transition committed"
        );

        let requests =
            self.notification_requests(&receipt.record, from, charge.as_ref(), &recipients);
        let notifications = deliver_all(self.notifier.as_ref(), requests);

        Ok(TransitionOutcome {
            record: receipt.record,
            transition,
            charge,
            notifications,
        })
    }

    pub fn get(&self, id: CandidacyId) -> Result<CandidacyRecord, PipelineError> {
        self.store.fetch(id)?.ok_or(PipelineError::NotFound(id))
    }

    /// Audit rows for one pairing, oldest first.
    pub fn history(&self, id: CandidacyId) -> Result<Vec<TransitionRecord>, PipelineError> {
        self.get(id)?;
        Ok(self.store.history(id)?)
    }

    /// Transitions into `state` across all pairings within `[from, to)`.
    pub fn transitions_into(
        &self,
        state: PipelineState,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TransitionRecord>, PipelineError> {
        Ok(self.store.entered_state(state, from, to)?)
    }

    pub fn charge_for(&self, id: CandidacyId) -> Result<Option<Charge>, PipelineError> {
        match self.get(id)?.charge_id {
            Some(charge_id) => Ok(self.store.charge(charge_id)?),
            None => Ok(None),
        }
    }

    /// Company-initiated refund request during the warranty window.
    pub fn request_refund(
        &self,
        id: CandidacyId,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<TransitionOutcome, PipelineError> {
        let mut request = TransitionRequest::new(PipelineState::RefundRequested, actor)
            .expecting(PipelineState::UnderWarranty);
        request.reason = reason;
        self.transition(id, request)
    }

    /// Applies a payment confirmation from the payment processor, opening the warranty.
    pub fn confirm_payment(
        &self,
        id: CandidacyId,
        payment: PaymentConfirmation,
    ) -> Result<TransitionOutcome, PipelineError> {
        let request =
            TransitionRequest::new(PipelineState::UnderWarranty, Actor::system(PAYMENT_ACTOR))
                .expecting(PipelineState::Hired)
                .with_payment(payment)
                .automatic();
        self.transition(id, request)
    }

    fn begin(&self, id: CandidacyId) -> Result<Box<dyn CandidacyTransaction + '_>, PipelineError> {
        self.store.begin(id).map_err(|err| match err {
            RepositoryError::NotFound => PipelineError::NotFound(id),
            other => other.into(),
        })
    }

    /// Returns the salary to bill when the guard resolved one.
    fn check_guard(
        &self,
        guard: Guard,
        record: &CandidacyRecord,
        charge: Option<&Charge>,
        request: &TransitionRequest,
        today: NaiveDate,
    ) -> Result<Option<Money>, PipelineError> {
        match guard {
            Guard::None => Ok(None),
            Guard::NotExcluded if record.excluded => Err(PipelineError::Precondition(format!(
                "{} no longer qualifies: {}",
                record.id,
                record
                    .exclusion_reason
                    .as_deref()
                    .unwrap_or("excluded by the latest matching run")
            ))),
            Guard::NotExcluded => Ok(None),
            Guard::SalaryKnown => {
                let salary = match request.annual_salary {
                    Some(salary) => Some(salary),
                    None => self
                        .store
                        .job(record.job_id)?
                        .and_then(|job| job.annual_salary),
                };
                match salary {
                    Some(salary) if !salary.is_zero() => Ok(Some(salary)),
                    _ => Err(PipelineError::Precondition(format!(
                        "annual salary for {} is unknown",
                        record.job_id
                    ))),
                }
            }
            Guard::PaymentMatchesCharge => {
                let payment = request.payment.as_ref().ok_or_else(|| {
                    PipelineError::Precondition("payment confirmation is required".to_string())
                })?;
                let open = charge
                    .filter(|charge| charge.is_open())
                    .ok_or_else(|| missing_charge(record.id))?;
                open.validate_payment(payment)
                    .map_err(|err| PipelineError::ExternalDependency(err.to_string()))?;
                Ok(None)
            }
            Guard::WarrantyElapsed => match record.warranty_end {
                Some(end) if record.warranty_active && today > end => Ok(None),
                Some(end) => Err(PipelineError::Precondition(format!(
                    "warranty for {} runs until {end}",
                    record.id
                ))),
                None => Err(PipelineError::Precondition(format!(
                    "{} has no warranty",
                    record.id
                ))),
            },
            Guard::WithinWarranty => match record.warranty_end {
                Some(end) if record.warranty_active && today <= end => Ok(None),
                _ => Err(PipelineError::Precondition(format!(
                    "{} is outside its warranty window",
                    record.id
                ))),
            },
        }
    }

    fn notification_requests(
        &self,
        record: &CandidacyRecord,
        from: PipelineState,
        charge: Option<&Charge>,
        recipients: &[(NotificationEvent, ActorRole)],
    ) -> Vec<NotificationRequest> {
        recipients
            .iter()
            .filter_map(|&(event, recipient_role)| {
                let template = self.notifications.template_for(event)?.to_string();
                Some(NotificationRequest {
                    event_type: event,
                    template,
                    recipient_role,
                    candidacy_id: record.id,
                    template_data: template_data(record, from, charge, event, recipient_role),
                })
            })
            .collect()
    }
}

/// Only fields the recipient is allowed to see under the new state's disclosure.
fn template_data(
    record: &CandidacyRecord,
    from: PipelineState,
    charge: Option<&Charge>,
    event: NotificationEvent,
    recipient: ActorRole,
) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert("candidacy_id".to_string(), record.id.to_string());
    data.insert("previous_state".to_string(), from.label().to_string());
    data.insert("state".to_string(), record.state.label().to_string());

    let disclosure = record.visibility;
    if recipient != ActorRole::Candidate || disclosure.candidate_sees_company {
        data.insert("job_id".to_string(), record.job_id.to_string());
    }
    if disclosure.company_sees_identity {
        data.insert("candidate_id".to_string(), record.candidate_id.to_string());
    }

    match event {
        NotificationEvent::CandidateHired if recipient == ActorRole::Company => {
            if let Some(charge) = charge {
                data.insert("amount_due".to_string(), charge.amount_total.to_string());
                data.insert("due_on".to_string(), charge.due_on.to_string());
            }
        }
        NotificationEvent::WarrantyStarted => {
            if let Some(end) = record.warranty_end {
                data.insert("warranty_end".to_string(), end.to_string());
            }
        }
        NotificationEvent::RefundResolved => {
            if let Some(quote) = &record.refund {
                data.insert("refund_amount".to_string(), quote.amount.to_string());
            }
        }
        _ => {}
    }

    data
}

fn missing_charge(id: CandidacyId) -> PipelineError {
    PipelineError::Precondition(format!("{id} has no open charge"))
}
