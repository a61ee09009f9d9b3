//! Recording and reconciling transactions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use tally_domain::{round_to, Activity, Actor, Transaction, TransactionKind};

use crate::{
    collaborators::paths,
    context::{ensure_owner, ensure_staff, CoreContext},
    validation, CoreError, CoreResult,
};

/// Fields of a transaction about to be recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: f64,
    pub kind: TransactionKind,
    pub activity: Activity,
    pub date: NaiveDate,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTransaction {
    pub fn new(amount: f64, kind: TransactionKind, activity: Activity, date: NaiveDate) -> Self {
        Self {
            amount,
            kind,
            activity,
            date,
            reference: None,
            description: None,
        }
    }
}

pub struct TransactionService;

impl TransactionService {
    pub fn record(
        ctx: &CoreContext,
        ledger_id: Uuid,
        input: NewTransaction,
        actor: &Actor,
    ) -> CoreResult<Transaction> {
        ensure_staff(actor)?;
        validation::ensure_amount(input.amount)?;
        let txn = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let mut txn = Transaction::new(
                ledger_id,
                round_to(input.amount, ctx.precision),
                input.kind,
                input.activity,
                input.date,
            );
            txn.reference = input.reference.clone();
            txn.description = input.description.clone();
            uow.entries.transactions.push(txn.clone());
            Ok(txn)
        })?;

        info!(
            %ledger_id,
            transaction = %txn.id,
            amount = txn.amount,
            kind = %txn.kind,
            "transaction recorded"
        );
        ctx.audit(
            actor,
            "transaction.record",
            json!({ "ledger_id": ledger_id, "transaction_id": txn.id, "amount": txn.amount }),
        );
        ctx.invalidate(&[paths::ledger(ledger_id)]);
        Ok(txn)
    }

    /// Reconciliation edit of amount and kind.
    ///
    /// Fails with `KindMismatch` when the new kind would mix kinds inside a
    /// group that holds the transaction. Group balances that already include
    /// this transaction are not adjusted.
    pub fn retype(
        ctx: &CoreContext,
        transaction_id: Uuid,
        amount: f64,
        kind: TransactionKind,
        actor: &Actor,
    ) -> CoreResult<Transaction> {
        ensure_staff(actor)?;
        validation::ensure_amount(amount)?;
        let ledger_id = ctx
            .store
            .snapshot()?
            .locate_transaction(transaction_id)
            .ok_or_else(|| CoreError::NotFound(format!("transaction {transaction_id}")))?;
        let (txn, groups) = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let groups: Vec<Uuid> = uow
                .entries
                .memberships
                .iter()
                .filter(|link| link.transaction_id == transaction_id)
                .map(|link| link.group_id)
                .collect();
            let txn = uow
                .entries
                .transaction_mut(transaction_id)
                .ok_or_else(|| CoreError::NotFound(format!("transaction {transaction_id}")))?;
            txn.amount = round_to(amount, ctx.precision);
            txn.kind = kind;
            let txn = txn.clone();
            // Every group holding the transaction must stay single-kind.
            for group_id in &groups {
                validation::ensure_homogeneous(&uow.entries.members_of(*group_id))?;
            }
            Ok((txn, groups))
        })?;
        let grouped = !groups.is_empty();

        if grouped {
            warn!(
                transaction = %transaction_id,
                "retyped a grouped transaction; group balances unchanged"
            );
        }
        ctx.audit(
            actor,
            "transaction.retype",
            json!({
                "transaction_id": transaction_id,
                "amount": txn.amount,
                "kind": txn.kind,
                "groups": groups,
            }),
        );
        ctx.invalidate(&[paths::ledger(ledger_id)]);
        Ok(txn)
    }
}
