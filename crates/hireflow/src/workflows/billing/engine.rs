use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::charge::{AddOnLine, Charge, ChargeError, ChargeKind, ChargeStatus};
use super::fees::{AddOnService, FeeSchedule, PriceTable};
use super::refunds::{RefundBase, RefundQuote, RefundSchedule};
use crate::workflows::domain::{CandidacyId, ChargeId, Money};

const DEFAULT_DUE_IN_DAYS: i64 = 30;
const DEFAULT_WARRANTY_DAYS: i64 = 90;

/// Calendar and refund policy knobs for billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingConfig {
    pub due_in_days: i64,
    pub warranty_days: i64,
    pub refund_base: RefundBase,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            due_in_days: DEFAULT_DUE_IN_DAYS,
            warranty_days: DEFAULT_WARRANTY_DAYS,
            refund_base: RefundBase::FeeOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    #[error("no price configured for add-on service {}", .0.label())]
    MissingPrice(AddOnService),
    #[error("invalid billing schedule: {0}")]
    InvalidSchedule(String),
    #[error("annual salary must be greater than zero")]
    ZeroSalary,
    #[error(transparent)]
    Charge(#[from] ChargeError),
}

/// Computes success fees, add-on totals, warranty windows and refund quotes.
#[derive(Debug)]
pub struct BillingEngine {
    schedule: FeeSchedule,
    refunds: RefundSchedule,
    prices: RwLock<PriceTable>,
    config: BillingConfig,
}

impl BillingEngine {
    pub fn new(
        schedule: FeeSchedule,
        refunds: RefundSchedule,
        prices: PriceTable,
        config: BillingConfig,
    ) -> Self {
        Self {
            schedule,
            refunds,
            prices: RwLock::new(prices),
            config,
        }
    }

    pub fn standard() -> Self {
        Self::new(
            FeeSchedule::standard(),
            RefundSchedule::standard(),
            PriceTable::standard(),
            BillingConfig::default(),
        )
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn fee_for(&self, annual_salary: Money) -> Money {
        self.schedule.fee_for(annual_salary)
    }

    pub fn set_price(&self, service: AddOnService, price: Money) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_price(service, price);
    }

    pub fn remove_price(&self, service: AddOnService) -> Option<Money> {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_price(service)
    }

    pub fn price_of(&self, service: AddOnService) -> Result<Money, BillingError> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .price_of(service)
            .ok_or(BillingError::MissingPrice(service))
    }

    /// Opens the pending success-fee charge raised when a hire is confirmed.
    pub fn open_success_fee(
        &self,
        id: ChargeId,
        candidacy_id: CandidacyId,
        annual_salary: Money,
        add_ons: &[AddOnService],
        today: NaiveDate,
    ) -> Result<Charge, BillingError> {
        if annual_salary.is_zero() {
            return Err(BillingError::ZeroSalary);
        }

        let services: BTreeSet<AddOnService> = add_ons.iter().copied().collect();
        let add_ons = services
            .into_iter()
            .map(|service| {
                self.price_of(service)
                    .map(|price| AddOnLine { service, price })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fee = self.fee_for(annual_salary);
        let amount_total = fee + add_ons.iter().map(|line| line.price).sum::<Money>();

        Ok(Charge {
            id,
            candidacy_id,
            kind: ChargeKind::SuccessFee,
            status: ChargeStatus::Pending,
            fee,
            add_ons,
            amount_total,
            created_on: today,
            due_on: today + Duration::days(self.config.due_in_days),
            payment: None,
            refunded_amount: None,
            reminders_sent: BTreeSet::new(),
        })
    }

    pub fn warranty_end(&self, warranty_start: NaiveDate) -> NaiveDate {
        warranty_start + Duration::days(self.config.warranty_days)
    }

    /// Prorates the refundable base by days elapsed since the warranty started.
    pub fn quote_refund(
        &self,
        charge: &Charge,
        warranty_start: NaiveDate,
        requested_on: NaiveDate,
    ) -> RefundQuote {
        let elapsed_days = (requested_on - warranty_start).num_days().max(0);
        let rate_bps = self.refunds.rate_for(elapsed_days);
        let base = self.config.refund_base;
        let base_amount = base.amount_of(charge);

        RefundQuote {
            requested_on,
            elapsed_days,
            rate_bps,
            base,
            base_amount,
            amount: base_amount.apply_rate(rate_bps),
            resolved_on: None,
        }
    }
}

impl Default for BillingEngine {
    fn default() -> Self {
        Self::standard()
    }
}
