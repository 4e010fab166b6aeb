//! Identifiers and money shared by the matching, pipeline and billing workflows.
//!
//! Job, company and candidate identities are owned by external subsystems; this crate only
//! stores them as foreign keys.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

identifier!(
    /// Job opening owned by the job catalog.
    JobId,
    "job"
);
identifier!(
    /// Company owning one or more jobs.
    CompanyId,
    "company"
);
identifier!(
    /// Candidate owned by the onboarding subsystem.
    CandidateId,
    "candidate"
);
identifier!(
    /// Competency (skill) referenced by requirements and evidence.
    CompetencyId,
    "competency"
);
identifier!(
    /// Pairing of one candidate with one job.
    CandidacyId,
    "candidacy"
);
identifier!(
    /// Billable obligation tied to a pairing.
    ChargeId,
    "charge"
);
identifier!(
    /// Audit trail entry.
    TransitionId,
    "transition"
);

/// Amount in minor currency units (cents).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn from_major(units: u64) -> Self {
        Self(units * 100)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Applies a rate expressed in basis points, rounding half up to the cent.
    pub fn apply_rate(self, rate_bps: u32) -> Money {
        let scaled = u128::from(self.0) * u128::from(rate_bps);
        let rounded = (scaled + 5_000) / 10_000;
        Money(u64::try_from(rounded).unwrap_or(u64::MAX))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_rate_rounds_half_up_to_the_cent() {
        assert_eq!(
            Money::from_major(45_000).apply_rate(1_000),
            Money::from_major(4_500)
        );
        assert_eq!(Money::from_cents(5).apply_rate(5_000), Money::from_cents(3));
        assert_eq!(Money::from_cents(4).apply_rate(5_000), Money::from_cents(2));
    }

    #[test]
    fn identifiers_render_with_their_prefix() {
        assert_eq!(CandidacyId(42).to_string(), "candidacy-42");
        assert_eq!(Money::from_cents(465_000).to_string(), "4650.00");
    }
}
