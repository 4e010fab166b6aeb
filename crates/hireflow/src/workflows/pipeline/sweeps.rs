use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::audit::AuditTrail;
use super::domain::{Actor, ActorRole, PipelineState};
use super::notifications::{
    deliver_all, NotificationDispatcher, NotificationEvent, NotificationReceipt,
    NotificationRequest,
};
use super::repository::{CandidacyRepository, ChargeLedger};
use super::service::{PipelineError, PipelineService, TransitionRequest};
use crate::store::RepositoryError;
use crate::workflows::billing::{due_reminder, record_reminder, Charge, ReminderKind};
use crate::workflows::domain::{CandidacyId, ChargeId};
use crate::workflows::matching::repository::JobCatalog;

pub const WARRANTY_SWEEP_ACTOR: &str = "warranty-sweep";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub candidacy_id: CandidacyId,
    pub error: String,
}

/// Pairings moved by one warranty sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarrantySweepReport {
    pub completed: Vec<CandidacyId>,
    pub refunds_resolved: Vec<CandidacyId>,
    /// Pairings busy with another transition; retried on the next sweep.
    pub skipped: Vec<CandidacyId>,
    pub failed: Vec<SweepFailure>,
}

impl WarrantySweepReport {
    fn record_miss(&mut self, candidacy_id: CandidacyId, step: SweepStep) {
        match step {
            SweepStep::Moved => {}
            SweepStep::Skipped => self.skipped.push(candidacy_id),
            SweepStep::Failed(error) => self.failed.push(SweepFailure {
                candidacy_id,
                error,
            }),
        }
    }
}

enum SweepStep {
    Moved,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReminderNotice {
    pub charge_id: ChargeId,
    pub kind: ReminderKind,
}

/// Charges touched by one billing sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChargeSweepReport {
    pub overdue: Vec<ChargeId>,
    pub reminders: Vec<ReminderNotice>,
    pub skipped: Vec<ChargeId>,
    pub notifications: Vec<NotificationReceipt>,
}

impl<S, N> PipelineService<S, N>
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    /// Closes warranties whose window has elapsed and resolves pending refunds, using the
    /// same transition entry point as interactive callers.
    pub fn sweep_warranties(&self) -> Result<WarrantySweepReport, PipelineError> {
        let today = self.clock().today();
        let mut report = WarrantySweepReport::default();

        for record in self.store().in_state(PipelineState::UnderWarranty)? {
            let elapsed = record.warranty_end.is_some_and(|end| today > end);
            if !elapsed {
                continue;
            }
            let request = system_request(PipelineState::WarrantyCompleted, record.state)
                .with_reason("warranty window elapsed");
            match self.apply_sweep(record.id, request) {
                SweepStep::Moved => report.completed.push(record.id),
                step => report.record_miss(record.id, step),
            }
        }

        for record in self.store().in_state(PipelineState::RefundRequested)? {
            let request = system_request(PipelineState::WarrantyCompleted, record.state)
                .with_reason("refund resolved");
            match self.apply_sweep(record.id, request) {
                SweepStep::Moved => report.refunds_resolved.push(record.id),
                step => report.record_miss(record.id, step),
            }
        }

        info!(
            completed = report.completed.len(),
            refunds_resolved = report.refunds_resolved.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "warranty sweep finished"
        );
        Ok(report)
    }

    /// Marks past-due charges overdue and sends at most one reminder per checkpoint.
    pub fn sweep_charges(&self) -> Result<ChargeSweepReport, PipelineError> {
        let today = self.clock().today();
        let mut report = ChargeSweepReport::default();
        let mut requests = Vec::new();

        for listed in self.store().open_charges()? {
            let mut tx = match self.store().begin(listed.candidacy_id) {
                Ok(tx) => tx,
                Err(RepositoryError::Locked(_)) => {
                    debug!(charge_id = %listed.id, "pairing locked; charge left for next sweep");
                    report.skipped.push(listed.id);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            // Re-read under the lock; the listing may be stale.
            let Some(mut charge) = tx.charge().filter(|c| c.id == listed.id).cloned() else {
                continue;
            };
            if !charge.is_open() {
                continue;
            }

            let became_overdue = charge.mark_overdue(today);
            let reminder = due_reminder(&charge, today);
            if let Some(kind) = reminder {
                record_reminder(&mut charge, kind);
            }
            if !became_overdue && reminder.is_none() {
                continue;
            }

            tx.stage_charge(charge.clone());
            tx.commit()?;

            if became_overdue {
                report.overdue.push(charge.id);
            }
            if let Some(kind) = reminder {
                report.reminders.push(ReminderNotice {
                    charge_id: charge.id,
                    kind,
                });
                if let Some(request) = self.reminder_request(&charge, kind) {
                    requests.push(request);
                }
            }
        }

        report.notifications = deliver_all(self.notifier(), requests);
        info!(
            overdue = report.overdue.len(),
            reminders = report.reminders.len(),
            skipped = report.skipped.len(),
            "billing sweep finished"
        );
        Ok(report)
    }

    fn apply_sweep(&self, id: CandidacyId, request: TransitionRequest) -> SweepStep {
        match self.transition(id, request) {
            Ok(_) => SweepStep::Moved,
            Err(PipelineError::Conflict(reason)) => {
                debug!(candidacy_id = %id, %reason, "sweep skipped pairing");
                SweepStep::Skipped
            }
            Err(err) => {
                warn!(candidacy_id = %id, error = %err, "sweep transition failed");
                SweepStep::Failed(err.to_string())
            }
        }
    }

    fn reminder_request(
        &self,
        charge: &Charge,
        kind: ReminderKind,
    ) -> Option<NotificationRequest> {
        let template = self
            .notification_policy()
            .template_for(NotificationEvent::PaymentReminder)?
            .to_string();

        let mut template_data = BTreeMap::new();
        template_data.insert("charge_id".to_string(), charge.id.to_string());
        template_data.insert("reminder".to_string(), kind.label().to_string());
        template_data.insert("amount_due".to_string(), charge.amount_total.to_string());
        template_data.insert("due_on".to_string(), charge.due_on.to_string());
        template_data.insert("status".to_string(), charge.status.label().to_string());

        Some(NotificationRequest {
            event_type: NotificationEvent::PaymentReminder,
            template,
            recipient_role: ActorRole::Company,
            candidacy_id: charge.candidacy_id,
            template_data,
        })
    }
}

fn system_request(target: PipelineState, expected: PipelineState) -> TransitionRequest {
    TransitionRequest::new(target, Actor::system(WARRANTY_SWEEP_ACTOR))
        .expecting(expected)
        .automatic()
}
