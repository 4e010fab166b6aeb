use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::charge::Charge;
use crate::workflows::domain::Money;

/// Which part of a charge is subject to warranty proration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundBase {
    #[default]
    FeeOnly,
    FeeAndAddOns,
}

impl RefundBase {
    pub fn amount_of(self, charge: &Charge) -> Money {
        match self {
            RefundBase::FeeOnly => charge.fee,
            RefundBase::FeeAndAddOns => charge.fee + charge.add_on_total(),
        }
    }
}

/// Refund rate applied up to and including `through_day` of the warranty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTier {
    pub through_day: i64,
    pub rate_bps: u32,
}

/// Day-based proration table; requests past the last tier refund nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSchedule {
    tiers: Vec<RefundTier>,
}

impl RefundSchedule {
    pub fn new(mut tiers: Vec<RefundTier>) -> Self {
        tiers.sort_by_key(|tier| tier.through_day);
        Self { tiers }
    }

    /// 0–30 days → 100%, 31–60 → 50%, 61–90 → 25%, later → 0%.
    pub fn standard() -> Self {
        Self::new(vec![
            RefundTier {
                through_day: 30,
                rate_bps: 10_000,
            },
            RefundTier {
                through_day: 60,
                rate_bps: 5_000,
            },
            RefundTier {
                through_day: 90,
                rate_bps: 2_500,
            },
        ])
    }

    pub fn rate_for(&self, elapsed_days: i64) -> u32 {
        let elapsed_days = elapsed_days.max(0);
        self.tiers
            .iter()
            .find(|tier| elapsed_days <= tier.through_day)
            .map_or(0, |tier| tier.rate_bps)
    }
}

impl Default for RefundSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// Refund computed once when the company requests it and never re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundQuote {
    pub requested_on: NaiveDate,
    pub elapsed_days: i64,
    pub rate_bps: u32,
    pub base: RefundBase,
    pub base_amount: Money,
    pub amount: Money,
    pub resolved_on: Option<NaiveDate>,
}
