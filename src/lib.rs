#![doc(test(attr(deny(warnings))))]

//! Tally groups a client's transactions into nested sub-accounts and rolls
//! them up into chained cashflow statements.
//!
//! [`Bookkeeper`] is the entry point. It wraps the services in `tally-core`
//! and maps their failures onto [`TallyError`].

pub mod bookkeeper;
pub mod errors;
pub mod utils;

use std::sync::Once;

pub use bookkeeper::{Bookkeeper, BookkeeperBuilder};
pub use errors::{Result, TallyError};
pub use tally_config::{Config, ConfigManager};
pub use tally_core::{
    collaborators::{AuditLog, Archive, Collaborators, Invalidator},
    CreateOutcome, GroupCreated, GroupDeleted, GroupInput, GroupNode, GroupTree, NewTransaction,
    StatementMeta, StatementUpdated, StatementView,
};
pub use tally_domain::{Activity, Actor, Period, Role, TransactionKind};

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing with the default filter and emits a startup log.
pub fn init() {
    init_with(&Config::default());
}

/// Initializes global tracing with `config.log_filter` on top of `RUST_LOG`.
pub fn init_with(config: &Config) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing(&config.log_filter);
        tracing::info!("Tally tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
        super::init();
    }
}
