//! tally-core
//!
//! Group hierarchy, statement and cascade services for Tally.
//! Depends on tally-domain. No terminal I/O and no direct filesystem access;
//! persistence goes through the [`storage::BookStorage`] trait.

pub mod cascade_service;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod hierarchy_service;
pub mod ledger_service;
pub mod period;
pub mod statement_service;
pub mod storage;
pub mod store;
pub mod time;
pub mod transaction_service;
pub mod validation;
pub mod views;

pub use cascade_service::*;
pub use context::{CoreContext, CoreContextBuilder};
pub use error::{CoreError, CoreResult};
pub use hierarchy_service::*;
pub use ledger_service::*;
pub use statement_service::*;
pub use store::{BookStore, UnitOfWork};
pub use transaction_service::*;
pub use views::*;

#[cfg(test)]
mod tests;
