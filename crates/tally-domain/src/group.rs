//! Domain types for hierarchical transaction groups (sub-accounts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// A named aggregation node that belongs to one ledger.
///
/// `balance` is a persisted cache: the signed sum of the directly linked
/// transactions at the time they were linked, plus every delta propagated
/// up from descendant groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: Uuid,
    pub ledger_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(ledger_id: Uuid, name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ledger_id,
            name: name.into(),
            description: None,
            balance: 0.0,
            created_at: at,
            updated_at: at,
        }
    }

    /// Adds `delta` to the cached balance, keeping `precision` decimals.
    pub fn apply_delta(&mut self, delta: f64, precision: u8, at: DateTime<Utc>) {
        self.balance = round_to(self.balance + delta, precision);
        self.updated_at = at;
    }
}

impl Identifiable for Group {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for Group {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Displayable for Group {
    fn display_label(&self) -> String {
        format!("{} ({:.2})", self.name, self.balance)
    }
}

/// Directed parent → child link between two groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEdge {
    pub parent_id: Uuid,
    pub child_id: Uuid,
    pub label: String,
}

impl GroupEdge {
    pub fn new(parent: &Group, child: &Group) -> Self {
        Self {
            parent_id: parent.id,
            child_id: child.id,
            label: Self::label_for(&parent.name, &child.name),
        }
    }

    pub fn label_for(parent: &str, child: &str) -> String {
        format!("{parent} → {child}")
    }
}

/// Join row linking a transaction to a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupMembership {
    pub group_id: Uuid,
    pub transaction_id: Uuid,
}

impl GroupMembership {
    pub fn new(group_id: Uuid, transaction_id: Uuid) -> Self {
        Self {
            group_id,
            transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_delta_rounds_and_touches() {
        let created = Utc::now();
        let mut group = Group::new(Uuid::new_v4(), "Utilities", created);
        let later = created + chrono::Duration::seconds(5);
        group.apply_delta(-100.004, 2, later);
        group.apply_delta(-50.006, 2, later);
        assert_eq!(group.balance, -150.01);
        assert_eq!(group.updated_at, later);
    }

    #[test]
    fn edge_label_names_both_ends() {
        let now = Utc::now();
        let ledger = Uuid::new_v4();
        let parent = Group::new(ledger, "Utilities", now);
        let child = Group::new(ledger, "Office", now);
        let edge = GroupEdge::new(&parent, &child);
        assert_eq!(edge.label, "Utilities → Office");
        assert_eq!(edge.parent_id, parent.id);
    }
}
