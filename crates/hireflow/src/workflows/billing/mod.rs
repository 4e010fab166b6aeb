//! Success-fee billing, refund proration and the charge sub-lifecycle.
//!
//! Fee brackets, add-on prices and refund tiers are injected into [`BillingEngine`] so
//! tenants and tests can supply their own tables.

pub mod charge;
mod engine;
mod fees;
mod refunds;
mod reminders;

pub use charge::{
    AddOnLine, Charge, ChargeError, ChargeKind, ChargeStatus, PaymentConfirmation, PaymentRecord,
};
pub use engine::{BillingConfig, BillingEngine, BillingError};
pub use fees::{AddOnService, FeeBracket, FeeSchedule, PriceTable};
pub use refunds::{RefundBase, RefundQuote, RefundSchedule, RefundTier};
pub use reminders::{due_reminder, record_reminder, ReminderKind};
