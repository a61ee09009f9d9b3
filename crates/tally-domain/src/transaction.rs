//! Domain models for atomic monetary entries.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// One atomic monetary entry recorded against a ledger.
///
/// `amount` is always stored as an unsigned magnitude; the sign is carried
/// by `kind` and recovered through [`Transaction::signed_amount`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub ledger_id: Uuid,
    pub amount: f64,
    pub kind: TransactionKind,
    pub activity: Activity,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Transaction {
    pub fn new(
        ledger_id: Uuid,
        amount: f64,
        kind: TransactionKind,
        activity: Activity,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ledger_id,
            amount,
            kind,
            activity,
            date,
            reference: None,
            description: None,
        }
    }

    /// Amount with the sign implied by the kind: income positive, expense negative.
    pub fn signed_amount(&self) -> f64 {
        self.kind.apply_sign(self.amount)
    }

    /// The (kind, activity) pair a transaction is bucketed under.
    pub fn classification(&self) -> (TransactionKind, Activity) {
        (self.kind, self.activity)
    }
}

impl Identifiable for Transaction {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Displayable for Transaction {
    fn display_label(&self) -> String {
        let reference = self.reference.as_deref().unwrap_or("-");
        format!(
            "{} {} {} {:.2} ({})",
            self.date, reference, self.kind, self.amount, self.activity
        )
    }
}

/// Direction of a monetary entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn apply_sign(self, magnitude: f64) -> f64 {
        match self {
            TransactionKind::Income => magnitude,
            TransactionKind::Expense => -magnitude,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionKind::Income => "Income",
            TransactionKind::Expense => "Expense",
        };
        f.write_str(label)
    }
}

/// Cashflow activity classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Activity {
    Operating,
    Investing,
    Financing,
}

impl Activity {
    /// Every activity in statement order.
    pub const ALL: [Activity; 3] = [Activity::Operating, Activity::Investing, Activity::Financing];

    /// Position of the activity inside a statement's activity totals.
    pub fn index(self) -> usize {
        match self {
            Activity::Operating => 0,
            Activity::Investing => 1,
            Activity::Financing => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Activity::Operating => "Operating",
            Activity::Investing => "Investing",
            Activity::Financing => "Financing",
        };
        f.write_str(label)
    }
}
