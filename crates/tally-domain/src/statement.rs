//! Cashflow statement snapshots and reporting periods.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;
use crate::transaction::Activity;

/// Reporting period a statement was classified under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
    FiscalYear,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Period::Daily => "Daily",
            Period::Weekly => "Weekly",
            Period::Monthly => "Monthly",
            Period::Quarterly => "Quarterly",
            Period::SemiAnnual => "Semi-annual",
            Period::Annual => "Annual",
            Period::FiscalYear => "Fiscal year",
        };
        f.write_str(label)
    }
}

/// Point-in-time snapshot of a ledger's activity.
///
/// `activity_totals` is ordered `[operating, investing, financing]`
/// (see [`Activity::index`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    pub id: Uuid,
    pub ledger_id: Uuid,
    pub period: Option<Period>,
    pub start_balance: f64,
    pub end_balance: f64,
    pub net_change: f64,
    pub activity_totals: [f64; 3],
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub transaction_ids: Vec<Uuid>,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Statement {
    pub fn new(
        ledger_id: Uuid,
        period: Option<Period>,
        date: NaiveDate,
        start_balance: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ledger_id,
            period,
            start_balance,
            end_balance: start_balance,
            net_change: 0.0,
            activity_totals: [0.0; 3],
            date,
            label: None,
            transaction_ids: Vec::new(),
            group_ids: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn activity_total(&self, activity: Activity) -> f64 {
        self.activity_totals[activity.index()]
    }

    /// Stores new activity totals and derives net change and end balance from them.
    pub fn apply_totals(&mut self, totals: [f64; 3], precision: u8, at: DateTime<Utc>) {
        self.activity_totals = totals.map(|value| round_to(value, precision));
        self.net_change = round_to(self.activity_totals.iter().sum(), precision);
        self.end_balance = round_to(self.start_balance + self.net_change, precision);
        self.updated_at = at;
    }

    /// Moves the statement to a new opening balance, keeping its net change.
    pub fn rebase(&mut self, start_balance: f64, precision: u8, at: DateTime<Utc>) {
        self.start_balance = round_to(start_balance, precision);
        self.end_balance = round_to(self.start_balance + self.net_change, precision);
        self.updated_at = at;
    }

    /// Returns `true` when totals, net change and balances agree.
    pub fn is_consistent(&self, precision: u8) -> bool {
        let net = round_to(self.activity_totals.iter().sum(), precision);
        let end = round_to(self.start_balance + self.net_change, precision);
        net == self.net_change && end == self.end_balance
    }
}

impl Identifiable for Statement {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Displayable for Statement {
    fn display_label(&self) -> String {
        let period = self
            .period
            .map(|period| period.to_string())
            .unwrap_or_else(|| "Unclassified".into());
        match self.label.as_deref() {
            Some(label) => format!("{label} · {period} · {}", self.date),
            None => format!("{period} · {}", self.date),
        }
    }
}
