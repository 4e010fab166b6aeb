use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::engine::BillingError;
use crate::workflows::domain::Money;

/// Upper salary bound (inclusive) and the success-fee rate applied below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBracket {
    /// `None` marks the open-ended top bracket.
    pub up_to: Option<Money>,
    pub rate_bps: u32,
}

/// Annual salary brackets mapped to a success-fee percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    brackets: Vec<FeeBracket>,
}

impl FeeSchedule {
    /// Validates that bounds ascend strictly and that exactly the last bracket is open-ended.
    pub fn new(brackets: Vec<FeeBracket>) -> Result<Self, BillingError> {
        let Some((last, bounded)) = brackets.split_last() else {
            return Err(BillingError::InvalidSchedule(
                "fee schedule needs at least one bracket".to_string(),
            ));
        };

        if last.up_to.is_some() {
            return Err(BillingError::InvalidSchedule(
                "last fee bracket must be open-ended".to_string(),
            ));
        }

        let mut previous: Option<Money> = None;
        for bracket in bounded {
            let Some(bound) = bracket.up_to else {
                return Err(BillingError::InvalidSchedule(
                    "only the last fee bracket may be open-ended".to_string(),
                ));
            };
            if previous.is_some_and(|prev| bound <= prev) {
                return Err(BillingError::InvalidSchedule(format!(
                    "fee bracket bound {bound} is not above the previous bound"
                )));
            }
            previous = Some(bound);
        }

        Ok(Self { brackets })
    }

    /// ≤60k → 10%, ≤120k → 12%, ≤240k → 15%, above → 18%.
    pub fn standard() -> Self {
        Self {
            brackets: vec![
                FeeBracket {
                    up_to: Some(Money::from_major(60_000)),
                    rate_bps: 1_000,
                },
                FeeBracket {
                    up_to: Some(Money::from_major(120_000)),
                    rate_bps: 1_200,
                },
                FeeBracket {
                    up_to: Some(Money::from_major(240_000)),
                    rate_bps: 1_500,
                },
                FeeBracket {
                    up_to: None,
                    rate_bps: 1_800,
                },
            ],
        }
    }

    pub fn rate_for(&self, annual_salary: Money) -> u32 {
        self.brackets
            .iter()
            .find(|bracket| bracket.up_to.map_or(true, |bound| annual_salary <= bound))
            .map_or(0, |bracket| bracket.rate_bps)
    }

    pub fn fee_for(&self, annual_salary: Money) -> Money {
        annual_salary.apply_rate(self.rate_for(annual_salary))
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// Optional services billed on top of the success fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnService {
    SoftSkillsTest,
    TechnicalInterview,
}

impl AddOnService {
    pub const ALL: [AddOnService; 2] = [
        AddOnService::SoftSkillsTest,
        AddOnService::TechnicalInterview,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            AddOnService::SoftSkillsTest => "soft_skills_test",
            AddOnService::TechnicalInterview => "technical_interview",
        }
    }
}

/// Price list for add-on services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    prices: BTreeMap<AddOnService, Money>,
}

impl PriceTable {
    pub fn standard() -> Self {
        Self::default()
            .with_price(AddOnService::SoftSkillsTest, Money::from_major(150))
            .with_price(AddOnService::TechnicalInterview, Money::from_major(250))
    }

    pub fn with_price(mut self, service: AddOnService, price: Money) -> Self {
        self.prices.insert(service, price);
        self
    }

    pub fn set_price(&mut self, service: AddOnService, price: Money) {
        self.prices.insert(service, price);
    }

    pub fn remove_price(&mut self, service: AddOnService) -> Option<Money> {
        self.prices.remove(&service)
    }

    pub fn price_of(&self, service: AddOnService) -> Option<Money> {
        self.prices.get(&service).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_schedule_applies_bracket_rates_inclusively() {
        let schedule = FeeSchedule::standard();

        assert_eq!(schedule.rate_for(Money::from_major(60_000)), 1_000);
        assert_eq!(schedule.rate_for(Money::from_major(60_001)), 1_200);
        assert_eq!(schedule.rate_for(Money::from_major(240_000)), 1_500);
        assert_eq!(schedule.rate_for(Money::from_major(300_000)), 1_800);
        assert_eq!(
            schedule.fee_for(Money::from_major(100_000)),
            Money::from_major(12_000)
        );
    }

    #[test]
    fn schedule_rejects_unordered_or_closed_brackets() {
        let unordered = FeeSchedule::new(vec![
            FeeBracket {
                up_to: Some(Money::from_major(100)),
                rate_bps: 100,
            },
            FeeBracket {
                up_to: Some(Money::from_major(50)),
                rate_bps: 200,
            },
            FeeBracket {
                up_to: None,
                rate_bps: 300,
            },
        ]);
        assert!(matches!(unordered, Err(BillingError::InvalidSchedule(_))));

        let closed = FeeSchedule::new(vec![FeeBracket {
            up_to: Some(Money::from_major(100)),
            rate_bps: 100,
        }]);
        assert!(matches!(closed, Err(BillingError::InvalidSchedule(_))));
    }
}
