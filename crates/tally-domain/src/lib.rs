//! tally-domain
//!
//! Pure domain models (Ledger, Transaction, Group, Statement, Actor).
//! No I/O, no storage, no services. Only data types and core enums.

pub mod actor;
pub mod common;
pub mod group;
pub mod ledger;
pub mod statement;
pub mod transaction;

pub use actor::*;
pub use common::*;
pub use group::*;
pub use ledger::*;
pub use statement::*;
pub use transaction::*;
