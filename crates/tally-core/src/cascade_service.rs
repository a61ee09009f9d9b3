//! Keeps each period's statement chain continuous.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use tally_domain::{Actor, LedgerEntries, Period, Statement};

use crate::{
    collaborators::paths,
    context::{ensure_owner, ensure_staff, CoreContext},
    CoreResult,
};

pub struct CascadeService;

impl CascadeService {
    /// Re-chains every statement of `period` dated after `after_date`,
    /// starting from `new_end_balance`. Returns how many were rebased.
    pub fn run(
        ctx: &CoreContext,
        ledger_id: Uuid,
        period: Option<Period>,
        after_date: NaiveDate,
        new_end_balance: f64,
        actor: &Actor,
    ) -> CoreResult<usize> {
        ensure_staff(actor)?;
        let now = ctx.clock.now();
        let touched = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            Ok(recascade(
                &mut uow.entries,
                period,
                after_date,
                new_end_balance,
                ctx.precision,
                now,
            ))
        })?;
        info!(%ledger_id, ?period, %after_date, touched, "statement chain recascaded");
        if touched > 0 {
            ctx.audit(
                actor,
                "statement.recascade",
                json!({
                    "ledger_id": ledger_id,
                    "period": period,
                    "after": after_date,
                    "touched": touched,
                }),
            );
            ctx.invalidate(&[paths::ledger(ledger_id)]);
        }
        Ok(touched)
    }
}

/// Rebases the later statements of one period bucket in date order.
///
/// Each statement keeps its net change; its start becomes the previous end.
/// Same-day statements are ordered by creation time. Unclassified statements
/// form no chain, so `period == None` touches nothing.
pub fn recascade(
    entries: &mut LedgerEntries,
    period: Option<Period>,
    after_date: NaiveDate,
    new_end_balance: f64,
    precision: u8,
    at: DateTime<Utc>,
) -> usize {
    let Some(period) = period else {
        return 0;
    };
    let mut chain: Vec<&mut Statement> = entries
        .statements
        .iter_mut()
        .filter(|statement| statement.period == Some(period) && statement.date > after_date)
        .collect();
    chain.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));

    let mut start = new_end_balance;
    for statement in chain.iter_mut() {
        statement.rebase(start, precision, at);
        debug!(
            statement = %statement.id,
            date = %statement.date,
            start = statement.start_balance,
            end = statement.end_balance,
            "rebased statement"
        );
        start = statement.end_balance;
    }
    chain.len()
}
