use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::ActorRole;
use crate::workflows::domain::CandidacyId;

/// Pipeline events that may be surfaced to a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    CompanyInterest,
    InterviewAccepted,
    CandidateSelected,
    CandidateHired,
    WarrantyStarted,
    RefundRequested,
    RefundResolved,
    WarrantyCompleted,
    CandidacyRejected,
    PaymentReminder,
}

impl NotificationEvent {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationEvent::CompanyInterest => "company_interest",
            NotificationEvent::InterviewAccepted => "interview_accepted",
            NotificationEvent::CandidateSelected => "candidate_selected",
            NotificationEvent::CandidateHired => "candidate_hired",
            NotificationEvent::WarrantyStarted => "warranty_started",
            NotificationEvent::RefundRequested => "refund_requested",
            NotificationEvent::RefundResolved => "refund_resolved",
            NotificationEvent::WarrantyCompleted => "warranty_completed",
            NotificationEvent::CandidacyRejected => "candidacy_rejected",
            NotificationEvent::PaymentReminder => "payment_reminder",
        }
    }
}

/// Fire-and-forget request handed to the dispatcher after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub event_type: NotificationEvent,
    pub template: String,
    pub recipient_role: ActorRole,
    pub candidacy_id: CandidacyId,
    pub template_data: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound delivery hook (e-mail, push, webhooks). Delivery and retries belong to the
/// implementation.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, request: NotificationRequest) -> Result<(), NotificationError>;
}

/// Template names per event; disabled events are never dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    templates: BTreeMap<NotificationEvent, String>,
    disabled: BTreeSet<NotificationEvent>,
}

impl NotificationPolicy {
    pub fn standard() -> Self {
        let templates = [
            NotificationEvent::CompanyInterest,
            NotificationEvent::InterviewAccepted,
            NotificationEvent::CandidateSelected,
            NotificationEvent::CandidateHired,
            NotificationEvent::WarrantyStarted,
            NotificationEvent::RefundRequested,
            NotificationEvent::RefundResolved,
            NotificationEvent::WarrantyCompleted,
            NotificationEvent::CandidacyRejected,
            NotificationEvent::PaymentReminder,
        ]
        .into_iter()
        .map(|event| (event, format!("pipeline/{}", event.label())))
        .collect();

        Self {
            templates,
            disabled: BTreeSet::new(),
        }
    }

    pub fn with_template(mut self, event: NotificationEvent, template: impl Into<String>) -> Self {
        self.templates.insert(event, template.into());
        self
    }

    pub fn disable(mut self, event: NotificationEvent) -> Self {
        self.disabled.insert(event);
        self
    }

    pub fn template_for(&self, event: NotificationEvent) -> Option<&str> {
        if self.disabled.contains(&event) {
            return None;
        }
        self.templates.get(&event).map(String::as_str)
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Delivery result reported back to the caller; failures never fail the transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReceipt {
    pub event_type: NotificationEvent,
    pub recipient_role: ActorRole,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub(crate) fn deliver_all<N>(
    dispatcher: &N,
    requests: Vec<NotificationRequest>,
) -> Vec<NotificationReceipt>
where
    N: NotificationDispatcher + ?Sized,
{
    requests
        .into_iter()
        .map(|request| {
            let event_type = request.event_type;
            let recipient_role = request.recipient_role;
            let candidacy_id = request.candidacy_id;
            match dispatcher.dispatch(request) {
                Ok(()) => NotificationReceipt {
                    event_type,
                    recipient_role,
                    delivered: true,
                    error: None,
                },
                Err(err) => {
                    warn!(
                        %candidacy_id,
                        event = event_type.label(),
                        recipient = recipient_role.label(),
                        error = %err,
                        "notification dispatch failed"
                    );
                    NotificationReceipt {
                        event_type,
                        recipient_role,
                        delivered: false,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}
