use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::charge::Charge;

/// Payment reminder checkpoints, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    SevenDaysBefore,
    ThreeDaysBefore,
    OneDayBefore,
    Overdue,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 4] = [
        ReminderKind::SevenDaysBefore,
        ReminderKind::ThreeDaysBefore,
        ReminderKind::OneDayBefore,
        ReminderKind::Overdue,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ReminderKind::SevenDaysBefore => "seven_days_before",
            ReminderKind::ThreeDaysBefore => "three_days_before",
            ReminderKind::OneDayBefore => "one_day_before",
            ReminderKind::Overdue => "overdue",
        }
    }

    fn reached(self, days_until_due: i64) -> bool {
        match self {
            ReminderKind::SevenDaysBefore => days_until_due <= 7,
            ReminderKind::ThreeDaysBefore => days_until_due <= 3,
            ReminderKind::OneDayBefore => days_until_due <= 1,
            ReminderKind::Overdue => days_until_due < 0,
        }
    }
}

/// Most urgent reminder that is due for an open charge and has not fired yet.
pub fn due_reminder(charge: &Charge, today: NaiveDate) -> Option<ReminderKind> {
    if !charge.is_open() {
        return None;
    }

    let days_until_due = (charge.due_on - today).num_days();
    let most_urgent = ReminderKind::ALL
        .into_iter()
        .rev()
        .find(|kind| kind.reached(days_until_due))?;

    if charge.reminders_sent.contains(&most_urgent) {
        None
    } else {
        Some(most_urgent)
    }
}

/// Marks `kind` as fired along with every less urgent checkpoint it supersedes.
pub fn record_reminder(charge: &mut Charge, kind: ReminderKind) {
    for earlier in ReminderKind::ALL.into_iter().filter(|other| *other <= kind) {
        charge.reminders_sent.insert(earlier);
    }
}
