//! Transactional in-memory book store.
//!
//! Writers operate on a private copy of one ledger's tables and commit it
//! atomically; readers only ever observe committed books. Mutations of the
//! same ledger are serialized by a per-ledger lock.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use tally_domain::{Book, Ledger, LedgerEntries};
use tracing::debug;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Working state handed to a write closure.
pub struct UnitOfWork<'a> {
    pub ledger: Ledger,
    pub entries: LedgerEntries,
    book: &'a Book,
}

impl UnitOfWork<'_> {
    /// Global group-name check against other ledgers plus this working copy.
    pub fn group_name_taken(&self, name: &str, exclude: Option<Uuid>) -> bool {
        let elsewhere = self
            .book
            .entries
            .iter()
            .filter(|(ledger_id, _)| **ledger_id != self.ledger.id)
            .any(|(_, entries)| entries.groups.iter().any(|group| group.name == name));
        elsewhere
            || self
                .entries
                .groups
                .iter()
                .any(|group| group.name == name && exclude != Some(group.id))
    }
}

/// Shared handle to the committed book.
#[derive(Clone, Default)]
pub struct BookStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: RwLock<Arc<Book>>,
    ledger_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_book(book: Book) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(Arc::new(book)),
                ledger_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the latest committed book.
    pub fn snapshot(&self) -> CoreResult<Arc<Book>> {
        let state = self
            .inner
            .state
            .read()
            .map_err(|_| CoreError::Storage("book store lock poisoned".into()))?;
        Ok(Arc::clone(&state))
    }

    /// Runs `op` against a read-only view of the committed book.
    pub fn read<T>(&self, op: impl FnOnce(&Book) -> CoreResult<T>) -> CoreResult<T> {
        let book = self.snapshot()?;
        op(&book)
    }

    /// Runs `op` as one atomic unit of work over a single ledger's tables.
    ///
    /// Nothing `op` changes becomes visible unless it returns `Ok`.
    pub fn write<T>(
        &self,
        ledger_id: Uuid,
        op: impl FnOnce(&mut UnitOfWork<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let lock = self.ledger_lock(ledger_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| CoreError::Storage("ledger lock poisoned".into()))?;

        let book = self.snapshot()?;
        let ledger = book
            .ledger(ledger_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("ledger {ledger_id}")))?;
        let entries = book.entries(ledger_id).cloned().unwrap_or_default();
        let mut uow = UnitOfWork {
            ledger,
            entries,
            book: &book,
        };
        let value = op(&mut uow)?;
        let UnitOfWork { entries, .. } = uow;
        self.commit_entries(ledger_id, entries)?;
        Ok(value)
    }

    /// Atomically mutates the ledger catalog.
    pub fn write_catalog<T>(
        &self,
        op: impl FnOnce(&mut Vec<Ledger>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut state = self
            .inner
            .state
            .write()
            .map_err(|_| CoreError::Storage("book store lock poisoned".into()))?;
        let mut ledgers = state.ledgers.clone();
        let value = op(&mut ledgers)?;
        let mut next = Book::clone(&state);
        for ledger in &ledgers {
            next.entries.entry(ledger.id).or_default();
        }
        next.ledgers = ledgers;
        *state = Arc::new(next);
        Ok(value)
    }

    /// Replaces the whole committed book, e.g. after loading from storage.
    pub fn replace(&self, book: Book) -> CoreResult<()> {
        let mut state = self
            .inner
            .state
            .write()
            .map_err(|_| CoreError::Storage("book store lock poisoned".into()))?;
        *state = Arc::new(book);
        Ok(())
    }

    fn commit_entries(&self, ledger_id: Uuid, entries: LedgerEntries) -> CoreResult<()> {
        let mut state = self
            .inner
            .state
            .write()
            .map_err(|_| CoreError::Storage("book store lock poisoned".into()))?;
        // Another ledger may have claimed one of our new names since we began.
        for group in &entries.groups {
            let clash = state
                .entries
                .iter()
                .filter(|(id, _)| **id != ledger_id)
                .any(|(_, other)| other.groups.iter().any(|g| g.name == group.name));
            if clash {
                return Err(CoreError::NameConflict(group.name.clone()));
            }
        }
        let mut next = Book::clone(&state);
        next.entries.insert(ledger_id, entries);
        *state = Arc::new(next);
        debug!(%ledger_id, "committed ledger unit of work");
        Ok(())
    }

    fn ledger_lock(&self, ledger_id: Uuid) -> CoreResult<Arc<Mutex<()>>> {
        let mut locks = self
            .inner
            .ledger_locks
            .lock()
            .map_err(|_| CoreError::Storage("ledger lock registry poisoned".into()))?;
        Ok(Arc::clone(locks.entry(ledger_id).or_default()))
    }
}
