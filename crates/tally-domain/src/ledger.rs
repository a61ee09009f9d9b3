//! Ledger rows and the in-memory tables that make up a book.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    common::*,
    group::{Group, GroupEdge, GroupMembership},
    statement::Statement,
    transaction::Transaction,
};

/// A client's top-level book of transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ledger {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ledger {
    pub fn new(name: impl Into<String>, owner_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
            is_default: false,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

impl Identifiable for Ledger {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for Ledger {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Displayable for Ledger {
    fn display_label(&self) -> String {
        if self.is_default {
            format!("{} (default)", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Every row that belongs to one ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntries {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub edges: Vec<GroupEdge>,
    #[serde(default)]
    pub memberships: Vec<GroupMembership>,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl LedgerEntries {
    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.transactions.iter().find(|txn| txn.id == id)
    }

    pub fn transaction_mut(&mut self, id: Uuid) -> Option<&mut Transaction> {
        self.transactions.iter_mut().find(|txn| txn.id == id)
    }

    pub fn group(&self, id: Uuid) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn group_mut(&mut self, id: Uuid) -> Option<&mut Group> {
        self.groups.iter_mut().find(|group| group.id == id)
    }

    pub fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.name == name)
    }

    /// The edge that attaches `child_id` to its parent, if any.
    pub fn parent_edge(&self, child_id: Uuid) -> Option<&GroupEdge> {
        self.edges.iter().find(|edge| edge.child_id == child_id)
    }

    pub fn children_of(&self, parent_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.edges
            .iter()
            .filter(move |edge| edge.parent_id == parent_id)
            .map(|edge| edge.child_id)
    }

    /// Transactions directly linked to the group, in link order.
    pub fn members_of(&self, group_id: Uuid) -> Vec<&Transaction> {
        self.memberships
            .iter()
            .filter(|link| link.group_id == group_id)
            .filter_map(|link| self.transaction(link.transaction_id))
            .collect()
    }

    pub fn is_linked(&self, group_id: Uuid, transaction_id: Uuid) -> bool {
        self.memberships
            .iter()
            .any(|link| link.group_id == group_id && link.transaction_id == transaction_id)
    }

    pub fn statement(&self, id: Uuid) -> Option<&Statement> {
        self.statements.iter().find(|stmt| stmt.id == id)
    }

    pub fn statement_mut(&mut self, id: Uuid) -> Option<&mut Statement> {
        self.statements.iter_mut().find(|stmt| stmt.id == id)
    }
}

/// The complete persisted state: ledger catalog plus per-ledger tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Book {
    #[serde(default)]
    pub ledgers: Vec<Ledger>,
    #[serde(default)]
    pub entries: BTreeMap<Uuid, LedgerEntries>,
}

impl Book {
    pub fn ledger(&self, id: Uuid) -> Option<&Ledger> {
        self.ledgers.iter().find(|ledger| ledger.id == id)
    }

    pub fn entries(&self, ledger_id: Uuid) -> Option<&LedgerEntries> {
        self.entries.get(&ledger_id)
    }

    /// Finds the ledger that owns the given group.
    pub fn locate_group(&self, group_id: Uuid) -> Option<Uuid> {
        self.entries
            .iter()
            .find(|(_, entries)| entries.group(group_id).is_some())
            .map(|(ledger_id, _)| *ledger_id)
    }

    /// Finds the ledger that owns the given statement.
    pub fn locate_statement(&self, statement_id: Uuid) -> Option<Uuid> {
        self.entries
            .iter()
            .find(|(_, entries)| entries.statement(statement_id).is_some())
            .map(|(ledger_id, _)| *ledger_id)
    }

    /// Finds the ledger that owns the given transaction.
    pub fn locate_transaction(&self, transaction_id: Uuid) -> Option<Uuid> {
        self.entries
            .iter()
            .find(|(_, entries)| entries.transaction(transaction_id).is_some())
            .map(|(ledger_id, _)| *ledger_id)
    }

    pub fn group_count(&self) -> usize {
        self.entries.values().map(|entries| entries.groups.len()).sum()
    }
}
