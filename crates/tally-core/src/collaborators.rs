//! Narrow contracts for the collaborators the core notifies after it commits.
//!
//! Audit and archive records travel over a bounded channel to a worker
//! thread. Their failures are logged and never reach the caller of the
//! primary operation.

use std::{
    fmt,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Failure reported by an audit or archive sink. Never fatal.
#[derive(Debug, Clone, Error)]
#[error("side channel failure: {0}")]
pub struct SideChannelError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub actor_id: Uuid,
    pub action: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor_id: Uuid,
        action: impl Into<String>,
        payload: Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor_id,
            action: action.into(),
            payload,
            timestamp: at,
        }
    }

    /// Replacement record written when the original could not be delivered.
    pub fn degraded(&self, reason: &SideChannelError) -> Self {
        Self {
            actor_id: self.actor_id,
            action: format!("{}.degraded", self.action),
            payload: serde_json::json!({ "reason": reason.0 }),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveRecord {
    pub actor_id: Uuid,
    pub ledger_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub snapshot: Value,
}

pub trait AuditLog: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), SideChannelError>;
}

pub trait Archive: Send + Sync {
    fn archive(&self, record: &ArchiveRecord) -> Result<(), SideChannelError>;
}

/// Tells the presentation layer which views are stale.
pub trait Invalidator: Send + Sync {
    fn invalidate(&self, path: &str);
}

/// Audit sink that only emits a structured log line.
#[derive(Debug, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<(), SideChannelError> {
        info!(actor = %record.actor_id, action = %record.action, "audit");
        Ok(())
    }
}

/// Archive and invalidation sink that drops everything.
#[derive(Debug, Default)]
pub struct Discard;

impl Archive for Discard {
    fn archive(&self, _record: &ArchiveRecord) -> Result<(), SideChannelError> {
        Ok(())
    }
}

impl Invalidator for Discard {
    fn invalidate(&self, _path: &str) {}
}

/// Keeps audit records in memory; can be told to fail for the first `n` writes.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
    failures_left: Mutex<usize>,
}

impl MemoryAuditLog {
    pub fn failing(times: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failures_left: Mutex::new(times),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.action).collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<(), SideChannelError> {
        if let Ok(mut left) = self.failures_left.lock() {
            if *left > 0 {
                *left -= 1;
                return Err(SideChannelError("audit store unavailable".into()));
            }
        }
        self.records
            .lock()
            .map_err(|_| SideChannelError("audit buffer poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: Mutex<Vec<ArchiveRecord>>,
}

impl MemoryArchive {
    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Archive for MemoryArchive {
    fn archive(&self, record: &ArchiveRecord) -> Result<(), SideChannelError> {
        self.records
            .lock()
            .map_err(|_| SideChannelError("archive buffer poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryInvalidator {
    paths: Mutex<Vec<String>>,
}

impl MemoryInvalidator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Invalidator for MemoryInvalidator {
    fn invalidate(&self, path: &str) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.push(path.to_string());
        }
    }
}

/// Stale-view paths understood by the presentation layer.
pub mod paths {
    use uuid::Uuid;

    pub const LEDGERS: &str = "/ledgers";

    pub fn ledger(id: Uuid) -> String {
        format!("/ledgers/{id}")
    }

    pub fn statement(id: Uuid) -> String {
        format!("/statements/{id}")
    }
}

/// The set of collaborators a context is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub audit: Arc<dyn AuditLog>,
    pub archive: Arc<dyn Archive>,
    pub invalidator: Arc<dyn Invalidator>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            audit: Arc::new(TracingAuditLog),
            archive: Arc::new(Discard),
            invalidator: Arc::new(Discard),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

enum SideEffect {
    Audit(AuditRecord),
    Archive(ArchiveRecord),
    Flush(Sender<()>),
}

/// Fire-and-forget delivery of audit and archive records.
pub struct SideChannel {
    tx: Option<Sender<SideEffect>>,
    worker: Option<JoinHandle<()>>,
}

impl SideChannel {
    pub fn spawn(audit: Arc<dyn AuditLog>, archive: Arc<dyn Archive>, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        let worker = thread::Builder::new()
            .name("tally-side-channel".into())
            .spawn(move || run_worker(rx, audit, archive))
            .map_err(|err| warn!(error = %err, "side channel worker failed to start"))
            .ok();
        Self {
            tx: worker.as_ref().map(|_| tx),
            worker,
        }
    }

    pub fn audit(&self, record: AuditRecord) {
        self.enqueue(SideEffect::Audit(record));
    }

    pub fn archive(&self, record: ArchiveRecord) {
        self.enqueue(SideEffect::Archive(record));
    }

    /// Blocks until everything queued before this call has been delivered.
    pub fn flush(&self) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(SideEffect::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    fn enqueue(&self, effect: SideEffect) {
        let Some(tx) = self.tx.as_ref() else {
            warn!("side channel offline; record dropped");
            return;
        };
        match tx.try_send(effect) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("side channel queue full; record dropped"),
            Err(TrySendError::Disconnected(_)) => warn!("side channel closed; record dropped"),
        }
    }
}

impl Drop for SideChannel {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(rx: Receiver<SideEffect>, audit: Arc<dyn AuditLog>, archive: Arc<dyn Archive>) {
    while let Ok(effect) = rx.recv() {
        match effect {
            SideEffect::Audit(record) => {
                if let Err(err) = audit.record(&record) {
                    warn!(action = %record.action, error = %err, "audit record failed");
                    if let Err(err) = audit.record(&record.degraded(&err)) {
                        warn!(
                            action = %record.action,
                            error = %err,
                            "degraded audit record failed"
                        );
                    }
                }
            }
            SideEffect::Archive(record) => {
                if let Err(err) = archive.archive(&record) {
                    warn!(
                        entity = %record.entity_type,
                        id = %record.entity_id,
                        error = %err,
                        "archive snapshot failed"
                    );
                    let fallback = AuditRecord::new(
                        record.actor_id,
                        format!("{}.archive", record.action),
                        serde_json::json!({ "entity_id": record.entity_id }),
                        Utc::now(),
                    );
                    let degraded = fallback.degraded(&err);
                    if let Err(err) = audit.record(&degraded) {
                        warn!(error = %err, "degraded archive audit failed");
                    }
                }
            }
            SideEffect::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingArchive;

    impl Archive for FailingArchive {
        fn archive(&self, _record: &ArchiveRecord) -> Result<(), SideChannelError> {
            Err(SideChannelError("archive offline".into()))
        }
    }

    fn record(action: &str) -> AuditRecord {
        AuditRecord::new(Uuid::nil(), action, serde_json::json!({}), Utc::now())
    }

    #[test]
    fn audit_records_are_delivered_after_flush() {
        let audit = Arc::new(MemoryAuditLog::default());
        let channel = SideChannel::spawn(audit.clone(), Arc::new(Discard), 8);
        channel.audit(record("group.create"));
        channel.flush();
        assert_eq!(audit.actions(), vec!["group.create".to_string()]);
    }

    #[test]
    fn failed_audit_is_relogged_as_degraded() {
        let audit = Arc::new(MemoryAuditLog::failing(1));
        let channel = SideChannel::spawn(audit.clone(), Arc::new(Discard), 8);
        channel.audit(record("group.delete"));
        channel.flush();
        assert_eq!(audit.actions(), vec!["group.delete.degraded".to_string()]);
    }

    #[test]
    fn failed_archive_leaves_degraded_audit_entry() {
        let audit = Arc::new(MemoryAuditLog::default());
        let channel = SideChannel::spawn(audit.clone(), Arc::new(FailingArchive), 8);
        channel.archive(ArchiveRecord {
            actor_id: Uuid::nil(),
            ledger_id: Uuid::nil(),
            action: "group.delete".into(),
            entity_type: "group".into(),
            entity_id: Uuid::nil(),
            snapshot: serde_json::json!({}),
        });
        channel.flush();
        assert_eq!(
            audit.actions(),
            vec!["group.delete.archive.degraded".to_string()]
        );
    }
}
