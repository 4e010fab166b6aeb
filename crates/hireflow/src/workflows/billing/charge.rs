use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::fees::AddOnService;
use super::reminders::ReminderKind;
use crate::workflows::domain::{CandidacyId, ChargeId, Money};

/// What a charge bills for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    SuccessFee,
    AddOnService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
    Refunded,
}

impl ChargeStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Paid => "paid",
            ChargeStatus::Overdue => "overdue",
            ChargeStatus::Cancelled => "cancelled",
            ChargeStatus::Refunded => "refunded",
        }
    }
}

/// Add-on service priced at charge creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOnLine {
    pub service: AddOnService,
    pub price: Money,
}

/// Payment notice supplied by the external payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub charge_id: ChargeId,
    pub method: String,
    pub external_transaction_id: String,
    pub amount_paid: Money,
}

/// Settled payment metadata stored on the charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub method: String,
    pub external_transaction_id: String,
    pub amount_paid: Money,
    pub paid_on: NaiveDate,
}

/// Billable obligation tied to a pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: ChargeId,
    pub candidacy_id: CandidacyId,
    pub kind: ChargeKind,
    pub status: ChargeStatus,
    pub fee: Money,
    pub add_ons: Vec<AddOnLine>,
    /// Fee plus add-ons, fixed when the charge is created.
    pub amount_total: Money,
    pub created_on: NaiveDate,
    pub due_on: NaiveDate,
    pub payment: Option<PaymentRecord>,
    pub refunded_amount: Option<Money>,
    #[serde(default)]
    pub reminders_sent: BTreeSet<ReminderKind>,
}

/// Violations of the charge sub-lifecycle or payment validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChargeError {
    #[error("{charge_id} is {status} and cannot be {action}")]
    InvalidStatus {
        charge_id: ChargeId,
        status: &'static str,
        action: &'static str,
    },
    #[error("payment references {found} but the open charge is {expected}")]
    ChargeMismatch { expected: ChargeId, found: ChargeId },
    #[error("payment of {paid} does not match the amount due {expected}")]
    AmountMismatch { expected: Money, paid: Money },
    #[error("payment is missing an external transaction id")]
    MissingTransactionId,
}

impl Charge {
    pub fn is_open(&self) -> bool {
        matches!(self.status, ChargeStatus::Pending | ChargeStatus::Overdue)
    }

    pub fn add_on_total(&self) -> Money {
        self.add_ons.iter().map(|line| line.price).sum()
    }

    /// Checks a payment notice against this charge without mutating it.
    pub fn validate_payment(&self, payment: &PaymentConfirmation) -> Result<(), ChargeError> {
        if payment.charge_id != self.id {
            return Err(ChargeError::ChargeMismatch {
                expected: self.id,
                found: payment.charge_id,
            });
        }
        if !self.is_open() {
            return Err(self.invalid("paid"));
        }
        if payment.external_transaction_id.trim().is_empty() {
            return Err(ChargeError::MissingTransactionId);
        }
        if payment.amount_paid != self.amount_total {
            return Err(ChargeError::AmountMismatch {
                expected: self.amount_total,
                paid: payment.amount_paid,
            });
        }
        Ok(())
    }

    pub fn mark_paid(
        &mut self,
        payment: &PaymentConfirmation,
        paid_on: NaiveDate,
    ) -> Result<(), ChargeError> {
        self.validate_payment(payment)?;
        self.status = ChargeStatus::Paid;
        self.payment = Some(PaymentRecord {
            method: payment.method.clone(),
            external_transaction_id: payment.external_transaction_id.clone(),
            amount_paid: payment.amount_paid,
            paid_on,
        });
        Ok(())
    }

    /// Flags a pending charge as overdue once its due date has passed. Returns whether the
    /// status changed.
    pub fn mark_overdue(&mut self, today: NaiveDate) -> bool {
        if self.status == ChargeStatus::Pending && today > self.due_on {
            self.status = ChargeStatus::Overdue;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) -> Result<(), ChargeError> {
        if !self.is_open() {
            return Err(self.invalid("cancelled"));
        }
        self.status = ChargeStatus::Cancelled;
        Ok(())
    }

    pub fn mark_refunded(&mut self, amount: Money) -> Result<(), ChargeError> {
        if self.status != ChargeStatus::Paid {
            return Err(self.invalid("refunded"));
        }
        self.status = ChargeStatus::Refunded;
        self.refunded_amount = Some(amount);
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> ChargeError {
        ChargeError::InvalidStatus {
            charge_id: self.id,
            status: self.status.label(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge() -> Charge {
        Charge {
            id: ChargeId(7),
            candidacy_id: CandidacyId(3),
            kind: ChargeKind::SuccessFee,
            status: ChargeStatus::Pending,
            fee: Money::from_major(4_500),
            add_ons: vec![AddOnLine {
                service: AddOnService::SoftSkillsTest,
                price: Money::from_major(150),
            }],
            amount_total: Money::from_major(4_650),
            created_on: NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid"),
            due_on: NaiveDate::from_ymd_opt(2025, 5, 31).expect("valid"),
            payment: None,
            refunded_amount: None,
            reminders_sent: BTreeSet::new(),
        }
    }

    fn payment(amount: Money) -> PaymentConfirmation {
        PaymentConfirmation {
            charge_id: ChargeId(7),
            method: "wire".to_string(),
            external_transaction_id: "tx-991".to_string(),
            amount_paid: amount,
        }
    }

    #[test]
    fn payment_must_match_amount_due() {
        let mut charge = charge();

        match charge.mark_paid(&payment(Money::from_major(4_500)), charge.due_on) {
            Err(ChargeError::AmountMismatch { expected, paid }) => {
                assert_eq!(expected, Money::from_major(4_650));
                assert_eq!(paid, Money::from_major(4_500));
            }
            other => panic!("expected amount mismatch, got {other:?}"),
        }
        assert_eq!(charge.status, ChargeStatus::Pending);

        charge
            .mark_paid(&payment(Money::from_major(4_650)), charge.due_on)
            .expect("exact payment settles");
        assert_eq!(charge.status, ChargeStatus::Paid);
        assert_eq!(charge.add_on_total(), Money::from_major(150));
    }

    #[test]
    fn overdue_charges_can_still_be_paid_but_not_refunded() {
        let mut charge = charge();
        let late = charge.due_on.succ_opt().expect("valid");

        assert!(!charge.mark_overdue(charge.due_on));
        assert!(charge.mark_overdue(late));
        assert!(!charge.mark_overdue(late));
        assert!(matches!(
            charge.mark_refunded(Money::ZERO),
            Err(ChargeError::InvalidStatus { .. })
        ));

        charge
            .mark_paid(&payment(Money::from_major(4_650)), late)
            .expect("overdue charge accepts payment");
        charge
            .mark_refunded(Money::from_major(2_250))
            .expect("paid charge refunds");
        assert_eq!(charge.refunded_amount, Some(Money::from_major(2_250)));
    }

    #[test]
    fn cancelled_charges_reject_payment() {
        let mut charge = charge();
        charge.cancel().expect("pending charge cancels");

        assert!(matches!(
            charge.validate_payment(&payment(Money::from_major(4_650))),
            Err(ChargeError::InvalidStatus { action: "paid", .. })
        ));
        assert!(charge.cancel().is_err());
    }
}
