//! Cashflow statements built from transactions and groups.
//!
//! Only [`StatementService::commit_membership_change`] recascades later
//! statements. The narrow balance mutators overwrite fields and stop there.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use tally_domain::{
    round_to, Activity, Actor, Group, LedgerEntries, Period, Statement, Transaction,
    TransactionKind,
};

use crate::{
    cascade_service::recascade,
    collaborators::paths,
    context::{ensure_owner, ensure_staff, owned_ledger, CoreContext},
    hierarchy_service::first_transaction,
    period,
    store::UnitOfWork,
    validation,
    views::StatementView,
    CoreError, CoreResult,
};

/// Optional presentation attributes of a new statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementMeta {
    /// Ordering date inside the period bucket. Defaults to the latest
    /// contributing date, or today when nothing contributes a date.
    pub date: Option<NaiveDate>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementUpdated {
    pub statement: StatementView,
    /// Later statements of the same period that were rebased.
    pub cascaded: usize,
}

/// A selected group and the buckets it contributes its balance to.
struct GroupContribution<'a> {
    group: &'a Group,
    classes: Vec<(TransactionKind, Activity)>,
    representative: Option<&'a Transaction>,
}

/// Resolved statement membership.
struct Selection<'a> {
    transactions: Vec<&'a Transaction>,
    groups: Vec<GroupContribution<'a>>,
}

impl<'a> Selection<'a> {
    fn load(
        entries: &'a LedgerEntries,
        transaction_ids: &[Uuid],
        group_ids: &[Uuid],
    ) -> CoreResult<Self> {
        let transactions = unique(transaction_ids)
            .into_iter()
            .map(|id| {
                entries
                    .transaction(id)
                    .ok_or_else(|| CoreError::NotFound(format!("transaction {id}")))
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let mut groups = Vec::new();
        for id in unique(group_ids) {
            let group = entries
                .group(id)
                .ok_or_else(|| CoreError::NotFound(format!("group {id}")))?;
            let representative = first_transaction(entries, id, &mut HashSet::new());
            let mut classes: Vec<(TransactionKind, Activity)> = Vec::new();
            let members = entries.members_of(id);
            let sampled = if members.is_empty() {
                representative.into_iter().collect()
            } else {
                members
            };
            for txn in sampled {
                let class = txn.classification();
                if !classes.contains(&class) {
                    classes.push(class);
                }
            }
            groups.push(GroupContribution {
                group,
                classes,
                representative,
            });
        }
        Ok(Self {
            transactions,
            groups,
        })
    }

    /// Direct transaction dates plus one representative date per group.
    fn dates(&self) -> Vec<NaiveDate> {
        self.transactions
            .iter()
            .map(|txn| txn.date)
            .chain(
                self.groups
                    .iter()
                    .filter_map(|g| g.representative.map(|txn| txn.date)),
            )
            .collect()
    }

    /// Per-activity totals, income minus expense.
    ///
    /// A group adds its signed cached balance once to every activity its
    /// members fall into, so a parent whose descendants mix kinds still
    /// nets to its balance.
    fn totals(&self) -> CoreResult<[f64; 3]> {
        validation::sum_amounts(&self.transactions)?;
        let mut income = [0.0_f64; 3];
        let mut expense = [0.0_f64; 3];
        let mut add = |kind: TransactionKind, activity: Activity, amount: f64| match kind {
            TransactionKind::Income => income[activity.index()] += amount,
            TransactionKind::Expense => expense[activity.index()] += amount,
        };
        for txn in &self.transactions {
            add(txn.kind, txn.activity, txn.amount);
        }
        for contribution in &self.groups {
            let balance = contribution.group.balance;
            if !balance.is_finite() {
                return Err(CoreError::InvalidAmount(format!(
                    "group {} has a non-finite balance",
                    contribution.group.name
                )));
            }
            for (kind, activity) in &contribution.classes {
                let signed = match kind {
                    TransactionKind::Income => balance,
                    TransactionKind::Expense => -balance,
                };
                add(*kind, *activity, signed);
            }
        }
        Ok([0, 1, 2].map(|index| income[index] - expense[index]))
    }

    fn transaction_ids(&self) -> Vec<Uuid> {
        self.transactions.iter().map(|txn| txn.id).collect()
    }

    fn group_ids(&self) -> Vec<Uuid> {
        self.groups.iter().map(|g| g.group.id).collect()
    }
}

pub struct StatementService;

impl StatementService {
    /// Computes, classifies and stores a new statement.
    pub fn build_statement(
        ctx: &CoreContext,
        ledger_id: Uuid,
        transaction_ids: &[Uuid],
        group_ids: &[Uuid],
        start_balance: f64,
        meta: StatementMeta,
        actor: &Actor,
    ) -> CoreResult<StatementView> {
        ensure_staff(actor)?;
        if !start_balance.is_finite() || start_balance == 0.0 {
            return Err(CoreError::InvalidBalance(format!(
                "start balance must be a non-zero number, got {start_balance}"
            )));
        }
        let now = ctx.clock.now();
        let today = ctx.clock.today();
        let precision = ctx.precision;

        let view = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let statement = {
                let selection = Selection::load(&uow.entries, transaction_ids, group_ids)?;
                let dates = selection.dates();
                let period = period::classify(dates.iter().copied());
                let date = meta
                    .date
                    .or_else(|| dates.iter().max().copied())
                    .unwrap_or(today);
                let mut statement = Statement::new(
                    ledger_id,
                    period,
                    date,
                    round_to(start_balance, precision),
                    now,
                );
                statement.label = meta.label.clone();
                statement.transaction_ids = selection.transaction_ids();
                statement.group_ids = selection.group_ids();
                statement.apply_totals(selection.totals()?, precision, now);
                statement
            };
            let view = StatementView::hydrate(&statement, &uow.entries);
            uow.entries.statements.push(statement);
            Ok(view)
        })?;

        info!(
            %ledger_id,
            statement = %view.id,
            period = ?view.period,
            net_change = view.net_change,
            "statement built"
        );
        ctx.audit(
            actor,
            "statement.create",
            json!({
                "ledger_id": ledger_id,
                "statement_id": view.id,
                "period": view.period,
                "transactions": view.transactions.len(),
                "groups": view.groups.len(),
            }),
        );
        ctx.invalidate(&[paths::ledger(ledger_id), paths::statement(view.id)]);
        Ok(view)
    }

    /// Replaces a statement's membership, recomputes it and recascades.
    pub fn update_statement(
        ctx: &CoreContext,
        statement_id: Uuid,
        transaction_ids: &[Uuid],
        group_ids: &[Uuid],
        actor: &Actor,
    ) -> CoreResult<StatementUpdated> {
        ensure_staff(actor)?;
        let ledger_id = locate_statement(ctx, statement_id)?;
        let now = ctx.clock.now();
        let updated = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            Self::commit_membership_change(
                uow,
                statement_id,
                transaction_ids,
                group_ids,
                ctx.precision,
                now,
            )
        })?;

        info!(
            %ledger_id,
            statement = %statement_id,
            cascaded = updated.cascaded,
            "statement membership updated"
        );
        ctx.audit(
            actor,
            "statement.update",
            json!({
                "statement_id": statement_id,
                "transactions": transaction_ids,
                "groups": group_ids,
                "cascaded": updated.cascaded,
            }),
        );
        ctx.invalidate(&[paths::ledger(ledger_id), paths::statement(statement_id)]);
        Ok(updated)
    }

    /// The only path that recascades: recomputes totals over the new
    /// membership, keeps start balance and period, then rebases every later
    /// statement of the same period.
    pub fn commit_membership_change(
        uow: &mut UnitOfWork<'_>,
        statement_id: Uuid,
        transaction_ids: &[Uuid],
        group_ids: &[Uuid],
        precision: u8,
        at: DateTime<Utc>,
    ) -> CoreResult<StatementUpdated> {
        if uow.entries.statement(statement_id).is_none() {
            return Err(CoreError::NotFound(format!("statement {statement_id}")));
        }
        let (totals, transaction_ids, group_ids) = {
            let selection = Selection::load(&uow.entries, transaction_ids, group_ids)?;
            (
                selection.totals()?,
                selection.transaction_ids(),
                selection.group_ids(),
            )
        };

        let statement = uow
            .entries
            .statement_mut(statement_id)
            .ok_or_else(|| CoreError::NotFound(format!("statement {statement_id}")))?;
        statement.transaction_ids = transaction_ids;
        statement.group_ids = group_ids;
        statement.apply_totals(totals, precision, at);
        let (period, date, end_balance) = (statement.period, statement.date, statement.end_balance);

        let cascaded = recascade(&mut uow.entries, period, date, end_balance, precision, at);
        let statement = uow
            .entries
            .statement(statement_id)
            .ok_or_else(|| CoreError::NotFound(format!("statement {statement_id}")))?;
        Ok(StatementUpdated {
            statement: StatementView::hydrate(statement, &uow.entries),
            cascaded,
        })
    }

    pub fn set_net_change(
        ctx: &CoreContext,
        statement_id: Uuid,
        value: f64,
        actor: &Actor,
    ) -> CoreResult<StatementView> {
        Self::overwrite(ctx, statement_id, actor, "statement.set_net_change", |s, p| {
            s.net_change = round_to(finite(value)?, p);
            Ok(())
        })
    }

    pub fn set_start_balance(
        ctx: &CoreContext,
        statement_id: Uuid,
        value: f64,
        actor: &Actor,
    ) -> CoreResult<StatementView> {
        Self::overwrite(ctx, statement_id, actor, "statement.set_start_balance", |s, p| {
            s.start_balance = round_to(finite(value)?, p);
            Ok(())
        })
    }

    pub fn set_end_balance(
        ctx: &CoreContext,
        statement_id: Uuid,
        value: f64,
        actor: &Actor,
    ) -> CoreResult<StatementView> {
        Self::overwrite(ctx, statement_id, actor, "statement.set_end_balance", |s, p| {
            s.end_balance = round_to(finite(value)?, p);
            Ok(())
        })
    }

    pub fn set_activity_total(
        ctx: &CoreContext,
        statement_id: Uuid,
        bucket: Activity,
        value: f64,
        actor: &Actor,
    ) -> CoreResult<StatementView> {
        Self::overwrite(ctx, statement_id, actor, "statement.set_activity_total", |s, p| {
            s.activity_totals[bucket.index()] = round_to(finite(value)?, p);
            Ok(())
        })
    }

    pub fn set_all_balances(
        ctx: &CoreContext,
        statement_id: Uuid,
        start_balance: f64,
        net_change: f64,
        end_balance: f64,
        actor: &Actor,
    ) -> CoreResult<StatementView> {
        Self::overwrite(ctx, statement_id, actor, "statement.set_all_balances", |s, p| {
            s.start_balance = round_to(finite(start_balance)?, p);
            s.net_change = round_to(finite(net_change)?, p);
            s.end_balance = round_to(finite(end_balance)?, p);
            Ok(())
        })
    }

    pub fn fetch_statement(
        ctx: &CoreContext,
        statement_id: Uuid,
        actor: &Actor,
    ) -> CoreResult<StatementView> {
        ctx.store.read(|book| {
            let ledger_id = book
                .locate_statement(statement_id)
                .ok_or_else(|| CoreError::NotFound(format!("statement {statement_id}")))?;
            owned_ledger(book, ledger_id, actor)?;
            let entries = book
                .entries(ledger_id)
                .ok_or_else(|| CoreError::NotFound(format!("ledger {ledger_id}")))?;
            let statement = entries
                .statement(statement_id)
                .ok_or_else(|| CoreError::NotFound(format!("statement {statement_id}")))?;
            Ok(StatementView::hydrate(statement, entries))
        })
    }

    /// Statements of a ledger in chain order, optionally for one period only.
    pub fn list_statements(
        ctx: &CoreContext,
        ledger_id: Uuid,
        period: Option<Period>,
        actor: &Actor,
    ) -> CoreResult<Vec<StatementView>> {
        ctx.store.read(|book| {
            owned_ledger(book, ledger_id, actor)?;
            let Some(entries) = book.entries(ledger_id) else {
                return Ok(Vec::new());
            };
            let mut statements: Vec<&Statement> = entries
                .statements
                .iter()
                .filter(|s| period.is_none() || s.period == period)
                .collect();
            statements.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
            Ok(statements
                .into_iter()
                .map(|s| StatementView::hydrate(s, entries))
                .collect())
        })
    }

    /// Removes a statement after archiving it. Later statements keep their balances.
    pub fn delete_statement(
        ctx: &CoreContext,
        statement_id: Uuid,
        actor: &Actor,
    ) -> CoreResult<Statement> {
        ensure_staff(actor)?;
        let ledger_id = locate_statement(ctx, statement_id)?;
        let (removed, snapshot) = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let position = uow
                .entries
                .statements
                .iter()
                .position(|s| s.id == statement_id)
                .ok_or_else(|| CoreError::NotFound(format!("statement {statement_id}")))?;
            let snapshot = serde_json::to_value(&uow.entries.statements[position])?;
            Ok((uow.entries.statements.remove(position), snapshot))
        })?;
        ctx.archive(
            actor,
            ledger_id,
            "statement.delete",
            "statement",
            statement_id,
            snapshot,
        );

        warn!(%ledger_id, statement = %statement_id, "statement deleted; chain not recascaded");
        ctx.audit(
            actor,
            "statement.delete",
            json!({ "ledger_id": ledger_id, "statement_id": statement_id }),
        );
        ctx.invalidate(&[paths::ledger(ledger_id), paths::statement(statement_id)]);
        Ok(removed)
    }

    fn overwrite(
        ctx: &CoreContext,
        statement_id: Uuid,
        actor: &Actor,
        action: &str,
        apply: impl FnOnce(&mut Statement, u8) -> CoreResult<()>,
    ) -> CoreResult<StatementView> {
        ensure_staff(actor)?;
        let ledger_id = locate_statement(ctx, statement_id)?;
        let now = ctx.clock.now();
        let view = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let statement = uow
                .entries
                .statement_mut(statement_id)
                .ok_or_else(|| CoreError::NotFound(format!("statement {statement_id}")))?;
            apply(&mut *statement, ctx.precision)?;
            statement.updated_at = now;
            let statement = statement.clone();
            Ok(StatementView::hydrate(&statement, &uow.entries))
        })?;

        info!(%ledger_id, statement = %statement_id, action, "statement field overwritten");
        ctx.audit(
            actor,
            action,
            json!({
                "statement_id": statement_id,
                "start_balance": view.start_balance,
                "net_change": view.net_change,
                "end_balance": view.end_balance,
                "activity_totals": view.activity_totals,
            }),
        );
        ctx.invalidate(&[paths::statement(statement_id)]);
        Ok(view)
    }
}

fn locate_statement(ctx: &CoreContext, statement_id: Uuid) -> CoreResult<Uuid> {
    ctx.store
        .snapshot()?
        .locate_statement(statement_id)
        .ok_or_else(|| CoreError::NotFound(format!("statement {statement_id}")))
}

fn finite(value: f64) -> CoreResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoreError::InvalidBalance(format!("{value} is not a number")))
    }
}

/// Ids in first-seen order without repeats.
fn unique(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
