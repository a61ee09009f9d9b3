use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tally_domain::Book;

use crate::CoreError;

/// Describes a persisted backup artifact for a book.
#[derive(Debug, Clone)]
pub struct BookBackupInfo {
    pub book: String,
    pub id: String,
    pub created_at: String,
    pub path: PathBuf,
}

/// Abstraction over persistence backends capable of storing books and backups.
pub trait BookStorage: Send + Sync {
    fn save_book(&self, name: &str, book: &Book) -> Result<(), CoreError>;
    fn load_book(&self, name: &str) -> Result<Book, CoreError>;
    fn list_books(&self) -> Result<Vec<String>, CoreError>;
    fn delete_book(&self, name: &str) -> Result<(), CoreError>;
    fn save_book_to_path(&self, book: &Book, path: &Path) -> Result<(), CoreError>;
    fn load_book_from_path(&self, path: &Path) -> Result<Book, CoreError>;
    fn backup_book(
        &self,
        name: &str,
        book: &Book,
        note: Option<&str>,
    ) -> Result<BookBackupInfo, CoreError>;
    fn list_backups(&self, name: &str) -> Result<Vec<BookBackupInfo>, CoreError>;
    fn restore_backup(&self, backup: &BookBackupInfo) -> Result<Book, CoreError>;
}

/// Detects dangling references and broken invariants within a book snapshot.
pub fn book_warnings(book: &Book) -> Vec<String> {
    let ledger_ids: HashSet<_> = book.ledgers.iter().map(|l| l.id).collect();
    let mut warnings = Vec::new();

    for ledger_id in book.entries.keys() {
        if !ledger_ids.contains(ledger_id) {
            warnings.push(format!("entries stored for unknown ledger {ledger_id}"));
        }
    }

    for (ledger_id, entries) in &book.entries {
        let txn_ids: HashSet<_> = entries.transactions.iter().map(|t| t.id).collect();
        let group_ids: HashSet<_> = entries.groups.iter().map(|g| g.id).collect();

        for link in &entries.memberships {
            if !group_ids.contains(&link.group_id) {
                warnings.push(format!(
                    "membership references missing group {}",
                    link.group_id
                ));
            }
            if !txn_ids.contains(&link.transaction_id) {
                warnings.push(format!(
                    "membership references missing transaction {}",
                    link.transaction_id
                ));
            }
        }

        let mut children = HashSet::new();
        for edge in &entries.edges {
            if !group_ids.contains(&edge.parent_id) || !group_ids.contains(&edge.child_id) {
                warnings.push(format!("edge {} is dangling", edge.label));
            }
            if !children.insert(edge.child_id) {
                warnings.push(format!("group {} has more than one parent", edge.child_id));
            }
        }

        for statement in &entries.statements {
            if statement.ledger_id != *ledger_id {
                warnings.push(format!(
                    "statement {} filed under ledger {} but belongs to {}",
                    statement.id, ledger_id, statement.ledger_id
                ));
            }
            if !statement.net_change.is_finite() || !statement.end_balance.is_finite() {
                warnings.push(format!("statement {} has non-finite balances", statement.id));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_domain::{Group, GroupEdge, GroupMembership, Ledger, LedgerEntries};
    use uuid::Uuid;

    #[test]
    fn clean_book_has_no_warnings() {
        let ledger = Ledger::new("Clean", Uuid::new_v4(), Utc::now());
        let mut book = Book::default();
        book.entries.insert(ledger.id, LedgerEntries::default());
        book.ledgers.push(ledger);
        assert!(book_warnings(&book).is_empty());
    }

    #[test]
    fn dangling_links_and_double_parents_are_reported() {
        let ledger = Ledger::new("Messy", Uuid::new_v4(), Utc::now());
        let now = Utc::now();
        let a = Group::new(ledger.id, "a", now);
        let b = Group::new(ledger.id, "b", now);
        let c = Group::new(ledger.id, "c", now);
        let mut entries = LedgerEntries::default();
        entries.edges.push(GroupEdge::new(&a, &c));
        entries.edges.push(GroupEdge::new(&b, &c));
        entries
            .memberships
            .push(GroupMembership::new(a.id, Uuid::new_v4()));
        entries.groups.extend([a, b, c]);
        let mut book = Book::default();
        book.entries.insert(ledger.id, entries);
        book.ledgers.push(ledger);

        let warnings = book_warnings(&book);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("more than one parent")));
        assert!(warnings.iter().any(|w| w.contains("missing transaction")));
    }
}
