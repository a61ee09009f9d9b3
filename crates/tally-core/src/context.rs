//! Everything a service call needs beyond its arguments.

use std::sync::Arc;

use serde_json::Value;
use tally_domain::{Actor, Book, Ledger, DEFAULT_PRECISION};
use uuid::Uuid;

use crate::{
    collaborators::{
        ArchiveRecord, AuditRecord, Collaborators, Invalidator, SideChannel,
        DEFAULT_QUEUE_CAPACITY,
    },
    store::BookStore,
    time::{Clock, SystemClock},
    CoreError, CoreResult,
};

/// Shared handles used by every service.
#[derive(Clone)]
pub struct CoreContext {
    pub store: BookStore,
    pub clock: Arc<dyn Clock>,
    pub precision: u8,
    side_channel: Arc<SideChannel>,
    invalidator: Arc<dyn Invalidator>,
}

impl CoreContext {
    pub fn new(store: BookStore, collaborators: Collaborators) -> Self {
        Self::builder(store, collaborators).build()
    }

    pub fn builder(store: BookStore, collaborators: Collaborators) -> CoreContextBuilder {
        CoreContextBuilder {
            store,
            collaborators,
            clock: Arc::new(SystemClock),
            precision: DEFAULT_PRECISION,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Queues an audit record for the acting user.
    pub fn audit(&self, actor: &Actor, action: &str, payload: Value) {
        self.side_channel.audit(AuditRecord::new(
            actor.id,
            action,
            payload,
            self.clock.now(),
        ));
    }

    /// Queues a recoverable snapshot of an entity about to be removed.
    pub fn archive(
        &self,
        actor: &Actor,
        ledger_id: Uuid,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        snapshot: Value,
    ) {
        self.side_channel.archive(ArchiveRecord {
            actor_id: actor.id,
            ledger_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            snapshot,
        });
    }

    pub fn invalidate(&self, paths: &[String]) {
        for path in paths {
            self.invalidator.invalidate(path);
        }
    }

    /// Waits for queued audit and archive records to be delivered.
    pub fn flush_side_channel(&self) {
        self.side_channel.flush();
    }
}

pub struct CoreContextBuilder {
    store: BookStore,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    precision: u8,
    queue_capacity: usize,
}

impl CoreContextBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> CoreContext {
        let Collaborators {
            audit,
            archive,
            invalidator,
        } = self.collaborators;
        CoreContext {
            store: self.store,
            clock: self.clock,
            precision: self.precision,
            side_channel: Arc::new(SideChannel::spawn(audit, archive, self.queue_capacity)),
            invalidator,
        }
    }
}

/// Mutations are reserved for staff.
pub fn ensure_staff(actor: &Actor) -> CoreResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "actor {} lacks the staff role",
            actor.id
        )))
    }
}

/// A ledger owned by someone else is reported as missing.
pub fn ensure_owner(ledger: &Ledger, actor: &Actor) -> CoreResult<()> {
    if ledger.owner_id == actor.id {
        Ok(())
    } else {
        Err(CoreError::NotFound(format!("ledger {}", ledger.id)))
    }
}

/// Looks up a ledger the actor owns inside a committed book.
pub fn owned_ledger<'a>(book: &'a Book, ledger_id: Uuid, actor: &Actor) -> CoreResult<&'a Ledger> {
    let ledger = book
        .ledger(ledger_id)
        .ok_or_else(|| CoreError::NotFound(format!("ledger {ledger_id}")))?;
    ensure_owner(ledger, actor)?;
    Ok(ledger)
}
