//! Ledger catalog maintenance.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use tally_domain::{Actor, Ledger};

use crate::{
    collaborators::paths,
    context::{ensure_owner, ensure_staff, CoreContext},
    CoreError, CoreResult,
};

/// Creates, renames and lists ledgers.
pub struct LedgerService;

impl LedgerService {
    /// Creates a ledger owned by `actor`. An owner's first ledger becomes the default.
    pub fn create_ledger(ctx: &CoreContext, name: &str, actor: &Actor) -> CoreResult<Ledger> {
        ensure_staff(actor)?;
        let name = ledger_name(name)?;
        let now = ctx.clock.now();
        let ledger = ctx.store.write_catalog(|ledgers| {
            ensure_unique(ledgers, &name, None)?;
            let mut ledger = Ledger::new(name.clone(), actor.id, now);
            ledger.is_default = !ledgers.iter().any(|l| l.owner_id == actor.id);
            ledgers.push(ledger.clone());
            Ok(ledger)
        })?;

        info!(ledger = %ledger.id, name = %ledger.name, "ledger created");
        ctx.audit(
            actor,
            "ledger.create",
            json!({ "ledger_id": ledger.id, "name": ledger.name }),
        );
        ctx.invalidate(&[paths::LEDGERS.to_string()]);
        Ok(ledger)
    }

    pub fn rename_ledger(
        ctx: &CoreContext,
        ledger_id: Uuid,
        new_name: &str,
        actor: &Actor,
    ) -> CoreResult<Ledger> {
        ensure_staff(actor)?;
        let name = ledger_name(new_name)?;
        let now = ctx.clock.now();
        let ledger = ctx.store.write_catalog(|ledgers| {
            ensure_unique(ledgers, &name, Some(ledger_id))?;
            let ledger = find_owned(ledgers, ledger_id, actor)?;
            ledger.name = name.clone();
            ledger.touch(now);
            Ok(ledger.clone())
        })?;

        info!(ledger = %ledger_id, name = %ledger.name, "ledger renamed");
        ctx.audit(
            actor,
            "ledger.rename",
            json!({ "ledger_id": ledger_id, "name": ledger.name }),
        );
        ctx.invalidate(&[paths::LEDGERS.to_string(), paths::ledger(ledger_id)]);
        Ok(ledger)
    }

    /// Marks one ledger as the owner's default and clears the flag on the rest.
    pub fn set_default(ctx: &CoreContext, ledger_id: Uuid, actor: &Actor) -> CoreResult<Ledger> {
        ensure_staff(actor)?;
        let now = ctx.clock.now();
        let ledger = ctx.store.write_catalog(|ledgers| {
            find_owned(ledgers, ledger_id, actor)?;
            let mut chosen = None;
            for ledger in ledgers.iter_mut().filter(|l| l.owner_id == actor.id) {
                let is_default = ledger.id == ledger_id;
                if ledger.is_default != is_default {
                    ledger.is_default = is_default;
                    ledger.touch(now);
                }
                if is_default {
                    chosen = Some(ledger.clone());
                }
            }
            chosen.ok_or_else(|| CoreError::NotFound(format!("ledger {ledger_id}")))
        })?;

        ctx.audit(actor, "ledger.set_default", json!({ "ledger_id": ledger_id }));
        ctx.invalidate(&[paths::LEDGERS.to_string()]);
        Ok(ledger)
    }

    /// Ledgers owned by `actor`, default first, then by name.
    pub fn list_ledgers(ctx: &CoreContext, actor: &Actor) -> CoreResult<Vec<Ledger>> {
        ctx.store.read(|book| {
            let mut owned: Vec<Ledger> = book
                .ledgers
                .iter()
                .filter(|ledger| ledger.owner_id == actor.id)
                .cloned()
                .collect();
            owned.sort_by(|a, b| {
                b.is_default
                    .cmp(&a.is_default)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            });
            Ok(owned)
        })
    }
}

fn ledger_name(raw: &str) -> CoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput("ledger name cannot be blank".into()));
    }
    Ok(trimmed.to_string())
}

fn ensure_unique(ledgers: &[Ledger], name: &str, exclude: Option<Uuid>) -> CoreResult<()> {
    let clash = ledgers
        .iter()
        .filter(|ledger| Some(ledger.id) != exclude)
        .any(|ledger| ledger.name.eq_ignore_ascii_case(name));
    if clash {
        Err(CoreError::NameConflict(name.to_string()))
    } else {
        Ok(())
    }
}

fn find_owned<'a>(
    ledgers: &'a mut [Ledger],
    ledger_id: Uuid,
    actor: &Actor,
) -> CoreResult<&'a mut Ledger> {
    let ledger = ledgers
        .iter_mut()
        .find(|ledger| ledger.id == ledger_id)
        .ok_or_else(|| CoreError::NotFound(format!("ledger {ledger_id}")))?;
    ensure_owner(ledger, actor)?;
    Ok(ledger)
}
