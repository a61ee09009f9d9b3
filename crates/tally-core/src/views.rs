//! Serializable read models returned to callers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tally_domain::{Activity, Group, LedgerEntries, Period, Statement, Transaction, TransactionKind};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSummary {
    pub id: Uuid,
    pub date: NaiveDate,
    pub amount: f64,
    pub signed_amount: f64,
    pub kind: TransactionKind,
    pub activity: Activity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl From<&Transaction> for TransactionSummary {
    fn from(txn: &Transaction) -> Self {
        Self {
            id: txn.id,
            date: txn.date,
            amount: txn.amount,
            signed_amount: txn.signed_amount(),
            kind: txn.kind,
            activity: txn.activity,
            reference: txn.reference.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub balance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

impl GroupSummary {
    pub fn of(group: &Group, entries: &LedgerEntries) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            balance: group.balance,
            parent_id: entries.parent_edge(group.id).map(|edge| edge.parent_id),
        }
    }
}

/// One group with its direct transactions and nested children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupNode {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub balance: f64,
    pub transactions: Vec<TransactionSummary>,
    pub children: Vec<GroupNode>,
}

impl GroupNode {
    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(GroupNode::size).sum::<usize>()
    }

    pub fn find(&self, name: &str) -> Option<&GroupNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupTree {
    pub roots: Vec<GroupNode>,
    /// Groups that were only reachable through a cycle in the edge table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Uuid>,
}

impl GroupTree {
    pub fn find(&self, name: &str) -> Option<&GroupNode> {
        self.roots.iter().find_map(|root| root.find(name))
    }
}

/// Fully hydrated statement with plain numeric fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementView {
    pub id: Uuid,
    pub ledger_id: Uuid,
    pub period: Option<Period>,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub start_balance: f64,
    pub end_balance: f64,
    pub net_change: f64,
    pub activity_totals: [f64; 3],
    pub operating_total: f64,
    pub investing_total: f64,
    pub financing_total: f64,
    pub transactions: Vec<TransactionSummary>,
    pub groups: Vec<GroupSummary>,
}

impl StatementView {
    pub fn hydrate(statement: &Statement, entries: &LedgerEntries) -> Self {
        let transactions = statement
            .transaction_ids
            .iter()
            .filter_map(|id| entries.transaction(*id))
            .map(TransactionSummary::from)
            .collect();
        let groups = statement
            .group_ids
            .iter()
            .filter_map(|id| entries.group(*id))
            .map(|group| GroupSummary::of(group, entries))
            .collect();
        Self {
            id: statement.id,
            ledger_id: statement.ledger_id,
            period: statement.period,
            date: statement.date,
            label: statement.label.clone(),
            start_balance: statement.start_balance,
            end_balance: statement.end_balance,
            net_change: statement.net_change,
            activity_totals: statement.activity_totals,
            operating_total: statement.activity_total(Activity::Operating),
            investing_total: statement.activity_total(Activity::Investing),
            financing_total: statement.activity_total(Activity::Financing),
            transactions,
            groups,
        }
    }
}
