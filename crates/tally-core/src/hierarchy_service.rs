//! Group (sub-account) hierarchy maintenance.
//!
//! Groups form a tree per ledger. Every walk over parent edges carries an
//! explicit visited set so corrupted edge tables terminate instead of looping.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use tally_domain::{
    round_to, Actor, Group, GroupEdge, GroupMembership, LedgerEntries, Transaction,
};

use crate::{
    collaborators::paths,
    context::{ensure_owner, ensure_staff, owned_ledger, CoreContext},
    store::UnitOfWork,
    validation,
    views::{GroupNode, GroupTree, TransactionSummary},
    CoreError, CoreResult,
};

/// Caller-supplied attributes for [`HierarchyService::create_group`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupInput {
    /// Name of a new group. Absent means "insert into the parent only".
    pub name: Option<String>,
    /// Existing group to attach the new group (or the selection) to.
    pub parent_name: Option<String>,
    pub description: Option<String>,
}

impl GroupInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn into_parent(parent: impl Into<String>) -> Self {
        Self {
            parent_name: Some(parent.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CreateOutcome {
    NewGroup,
    InsertedIntoExisting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupCreated {
    /// The new group, or the existing parent the selection was inserted into.
    pub group: Group,
    pub outcome: CreateOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDeleted {
    pub group: Group,
    /// Former children, now roots. Their amounts were not moved anywhere.
    pub orphaned_children: Vec<Uuid>,
}

pub struct HierarchyService;

impl HierarchyService {
    /// Creates a group from the selected transactions, or inserts them into
    /// an existing parent, as one atomic unit of work.
    pub fn create_group(
        ctx: &CoreContext,
        selected: &[Uuid],
        input: GroupInput,
        ledger_id: Uuid,
        actor: &Actor,
    ) -> CoreResult<GroupCreated> {
        ensure_staff(actor)?;
        let now = ctx.clock.now();
        let created = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            Self::apply_create(uow, selected, &input, now, ctx.precision)
        })?;

        let action = match created.outcome {
            CreateOutcome::NewGroup => "group.create",
            CreateOutcome::InsertedIntoExisting => "group.insert",
        };
        info!(
            %ledger_id,
            group = %created.group.id,
            name = %created.group.name,
            linked = selected.len(),
            action,
            "group hierarchy updated"
        );
        ctx.audit(
            actor,
            action,
            json!({
                "ledger_id": ledger_id,
                "group_id": created.group.id,
                "name": created.group.name,
                "parent": input.parent_name,
                "transactions": selected,
            }),
        );
        ctx.invalidate(&[paths::LEDGERS.to_string(), paths::ledger(ledger_id)]);
        Ok(created)
    }

    /// The mutation behind [`Self::create_group`], applied to a unit of work.
    pub fn apply_create(
        uow: &mut UnitOfWork<'_>,
        selected: &[Uuid],
        input: &GroupInput,
        now: DateTime<Utc>,
        precision: u8,
    ) -> CoreResult<GroupCreated> {
        let name = non_blank(input.name.as_deref());
        let parent_name = non_blank(input.parent_name.as_deref());
        if name.is_none() && parent_name.is_none() {
            return Err(CoreError::InvalidInput(
                "either a group name or a parent name is required".into(),
            ));
        }
        if let Some(name) = name {
            if uow.group_name_taken(name, None) {
                return Err(CoreError::NameConflict(name.to_string()));
            }
        }

        let transactions = load_transactions(&uow.entries, selected)?;
        let refs: Vec<&Transaction> = transactions.iter().collect();
        validation::ensure_homogeneous(&refs)?;
        let delta = round_to(validation::sum_amounts(&refs)?, precision);

        let parent = match parent_name {
            Some(parent_name) => Some(
                uow.entries
                    .group_by_name(parent_name)
                    .cloned()
                    .ok_or_else(|| CoreError::ParentNotFound(parent_name.to_string()))?,
            ),
            None => None,
        };
        if let Some(parent) = parent.as_ref() {
            let existing = uow.entries.members_of(parent.id);
            validation::ensure_compatible(&existing, &refs)?;
        }

        let (target_id, outcome) = match name {
            Some(name) => {
                let mut group = Group::new(uow.ledger.id, name, now);
                group.description = input.description.clone();
                group.balance = delta;
                let id = group.id;
                uow.entries.groups.push(group);
                (id, CreateOutcome::NewGroup)
            }
            None => {
                let parent = parent.as_ref().ok_or_else(|| {
                    CoreError::InvalidInput("a parent name is required".into())
                })?;
                (parent.id, CreateOutcome::InsertedIntoExisting)
            }
        };

        for txn in &transactions {
            if uow.entries.is_linked(target_id, txn.id) {
                return Err(CoreError::AlreadyLinked {
                    group: target_id,
                    transaction: txn.id,
                });
            }
            uow.entries
                .memberships
                .push(GroupMembership::new(target_id, txn.id));
        }

        if let Some(parent) = parent.as_ref() {
            if outcome == CreateOutcome::NewGroup {
                let child = uow
                    .entries
                    .group(target_id)
                    .ok_or_else(|| CoreError::NotFound(format!("group {target_id}")))?;
                let edge = GroupEdge::new(parent, child);
                uow.entries.edges.push(edge);
            }
            let mut visited = HashSet::new();
            propagate_balance(&mut uow.entries, parent.id, delta, &mut visited, precision, now)?;
        }

        let group = uow
            .entries
            .group(target_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("group {target_id}")))?;
        Ok(GroupCreated { group, outcome })
    }

    /// Removes a group, its memberships and its edges.
    ///
    /// Descendants are kept (they become roots) and ancestor balances are not
    /// recomputed; the audit record flags the deletion for an amount review.
    pub fn delete_group(
        ctx: &CoreContext,
        group_id: Uuid,
        actor: &Actor,
    ) -> CoreResult<GroupDeleted> {
        ensure_staff(actor)?;
        let ledger_id = ctx
            .store
            .snapshot()?
            .locate_group(group_id)
            .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;

        let (deleted, snapshot) = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let group = uow
                .entries
                .group(group_id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;
            let orphaned_children: Vec<Uuid> = uow.entries.children_of(group_id).collect();
            let members: Vec<Uuid> = uow
                .entries
                .members_of(group_id)
                .iter()
                .map(|txn| txn.id)
                .collect();
            let snapshot = json!({
                "group": group,
                "transactions": members,
                "children": orphaned_children,
                "parent": uow.entries.parent_edge(group_id).map(|edge| edge.parent_id),
            });

            uow.entries.groups.retain(|g| g.id != group_id);
            uow.entries
                .memberships
                .retain(|link| link.group_id != group_id);
            uow.entries
                .edges
                .retain(|edge| edge.child_id != group_id && edge.parent_id != group_id);
            let deleted = GroupDeleted {
                group,
                orphaned_children,
            };
            Ok((deleted, snapshot))
        })?;
        ctx.archive(actor, ledger_id, "group.delete", "group", group_id, snapshot);

        warn!(
            %ledger_id,
            group = %group_id,
            orphaned = deleted.orphaned_children.len(),
            "group deleted; ancestor balances were not recomputed"
        );
        ctx.audit(
            actor,
            "group.delete",
            json!({
                "ledger_id": ledger_id,
                "group_id": group_id,
                "name": deleted.group.name,
                "balance": deleted.group.balance,
                "orphaned_children": deleted.orphaned_children,
                "review_amounts": true,
            }),
        );
        ctx.invalidate(&[paths::LEDGERS.to_string(), paths::ledger(ledger_id)]);
        Ok(deleted)
    }

    /// Removes one transaction from a group. Balances are left as they are.
    pub fn unlink_transaction(
        ctx: &CoreContext,
        group_id: Uuid,
        transaction_id: Uuid,
        actor: &Actor,
    ) -> CoreResult<()> {
        ensure_staff(actor)?;
        let ledger_id = ctx
            .store
            .snapshot()?
            .locate_group(group_id)
            .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;
        ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let position = uow
                .entries
                .memberships
                .iter()
                .position(|link| link.group_id == group_id && link.transaction_id == transaction_id)
                .ok_or_else(|| {
                    CoreError::NotFound(format!(
                        "transaction {transaction_id} in group {group_id}"
                    ))
                })?;
            uow.entries.memberships.remove(position);
            Ok(())
        })?;

        info!(%ledger_id, group = %group_id, transaction = %transaction_id, "transaction unlinked");
        ctx.audit(
            actor,
            "group.unlink",
            json!({ "group_id": group_id, "transaction_id": transaction_id }),
        );
        ctx.invalidate(&[paths::ledger(ledger_id)]);
        Ok(())
    }

    /// Renames a group; names stay unique across every ledger.
    pub fn rename_group(
        ctx: &CoreContext,
        group_id: Uuid,
        new_name: &str,
        actor: &Actor,
    ) -> CoreResult<Group> {
        ensure_staff(actor)?;
        let name = non_blank(Some(new_name))
            .ok_or_else(|| CoreError::InvalidInput("group name cannot be blank".into()))?
            .to_string();
        let ledger_id = ctx
            .store
            .snapshot()?
            .locate_group(group_id)
            .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;
        let now = ctx.clock.now();
        let renamed = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            if uow.group_name_taken(&name, Some(group_id)) {
                return Err(CoreError::NameConflict(name.clone()));
            }
            let group = uow
                .entries
                .group_mut(group_id)
                .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;
            group.name = name.clone();
            group.updated_at = now;
            let renamed = group.clone();
            relabel_edges(&mut uow.entries, group_id);
            Ok(renamed)
        })?;

        ctx.audit(
            actor,
            "group.rename",
            json!({ "group_id": group_id, "name": renamed.name }),
        );
        ctx.invalidate(&[paths::ledger(ledger_id)]);
        Ok(renamed)
    }

    pub fn describe_group(
        ctx: &CoreContext,
        group_id: Uuid,
        description: Option<String>,
        actor: &Actor,
    ) -> CoreResult<Group> {
        ensure_staff(actor)?;
        let ledger_id = ctx
            .store
            .snapshot()?
            .locate_group(group_id)
            .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;
        let now = ctx.clock.now();
        let group = ctx.store.write(ledger_id, |uow| {
            ensure_owner(&uow.ledger, actor)?;
            let group = uow
                .entries
                .group_mut(group_id)
                .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;
            group.description = description;
            group.updated_at = now;
            Ok(group.clone())
        })?;
        ctx.audit(actor, "group.describe", json!({ "group_id": group_id }));
        ctx.invalidate(&[paths::ledger(ledger_id)]);
        Ok(group)
    }

    /// Read-only view of every root group with nested children.
    pub fn fetch_group_tree(
        ctx: &CoreContext,
        ledger_id: Uuid,
        actor: &Actor,
    ) -> CoreResult<GroupTree> {
        ctx.store.read(|book| {
            owned_ledger(book, ledger_id, actor)?;
            let tree = match book.entries(ledger_id) {
                Some(entries) => build_tree(entries),
                None => GroupTree::default(),
            };
            if !tree.cycles.is_empty() {
                error!(%ledger_id, cycles = ?tree.cycles, "group edges contain a cycle");
            }
            Ok(tree)
        })
    }

    /// Parent chain of a group, nearest first.
    pub fn ancestors(ctx: &CoreContext, group_id: Uuid, actor: &Actor) -> CoreResult<Vec<Uuid>> {
        ctx.store.read(|book| {
            let ledger_id = book
                .locate_group(group_id)
                .ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))?;
            owned_ledger(book, ledger_id, actor)?;
            match book.entries(ledger_id) {
                Some(entries) => ancestors_of(entries, group_id),
                None => Ok(Vec::new()),
            }
        })
    }
}

/// Adds `delta` to `group_id` and to every ancestor above it, exactly once each.
///
/// `visited` carries the ids already adjusted; meeting one of them again means
/// the edge table has a cycle, which aborts the walk with `CycleDetected`.
/// Returns the number of groups adjusted.
pub fn propagate_balance(
    entries: &mut LedgerEntries,
    group_id: Uuid,
    delta: f64,
    visited: &mut HashSet<Uuid>,
    precision: u8,
    at: DateTime<Utc>,
) -> CoreResult<usize> {
    let limit = entries.groups.len();
    let mut current = group_id;
    let mut touched = 0;
    loop {
        if !visited.insert(current) || touched > limit {
            error!(group = %current, origin = %group_id, "cycle in group hierarchy");
            return Err(CoreError::CycleDetected(current));
        }
        entries
            .group_mut(current)
            .ok_or_else(|| CoreError::NotFound(format!("group {current}")))?
            .apply_delta(delta, precision, at);
        touched += 1;
        match entries.parent_edge(current) {
            Some(edge) => current = edge.parent_id,
            None => return Ok(touched),
        }
    }
}

/// Parent chain of `group_id`, nearest first, cycle-guarded.
pub fn ancestors_of(entries: &LedgerEntries, group_id: Uuid) -> CoreResult<Vec<Uuid>> {
    let mut visited = HashSet::from([group_id]);
    let mut chain = Vec::new();
    let mut current = group_id;
    while let Some(edge) = entries.parent_edge(current) {
        if !visited.insert(edge.parent_id) {
            return Err(CoreError::CycleDetected(edge.parent_id));
        }
        chain.push(edge.parent_id);
        current = edge.parent_id;
    }
    Ok(chain)
}

/// First transaction found under a group: its own members first, then each
/// child branch depth-first.
pub fn first_transaction<'a>(
    entries: &'a LedgerEntries,
    group_id: Uuid,
    visited: &mut HashSet<Uuid>,
) -> Option<&'a Transaction> {
    if !visited.insert(group_id) {
        return None;
    }
    if let Some(txn) = entries.members_of(group_id).into_iter().next() {
        return Some(txn);
    }
    let children: Vec<Uuid> = entries.children_of(group_id).collect();
    children
        .into_iter()
        .find_map(|child| first_transaction(entries, child, visited))
}

pub fn build_tree(entries: &LedgerEntries) -> GroupTree {
    let mut visited = HashSet::new();
    let mut cycles = Vec::new();
    let roots = entries
        .groups
        .iter()
        .filter(|group| entries.parent_edge(group.id).is_none())
        .map(|group| build_node(entries, group, &mut visited, &mut cycles))
        .collect();
    for group in &entries.groups {
        if !visited.contains(&group.id) && !cycles.contains(&group.id) {
            cycles.push(group.id);
        }
    }
    GroupTree { roots, cycles }
}

fn build_node(
    entries: &LedgerEntries,
    group: &Group,
    visited: &mut HashSet<Uuid>,
    cycles: &mut Vec<Uuid>,
) -> GroupNode {
    visited.insert(group.id);
    let mut children = Vec::new();
    let child_ids: Vec<Uuid> = entries.children_of(group.id).collect();
    for child_id in child_ids {
        if visited.contains(&child_id) {
            if !cycles.contains(&child_id) {
                cycles.push(child_id);
            }
            continue;
        }
        if let Some(child) = entries.group(child_id) {
            children.push(build_node(entries, child, visited, cycles));
        }
    }
    GroupNode {
        id: group.id,
        name: group.name.clone(),
        description: group.description.clone(),
        balance: group.balance,
        transactions: entries
            .members_of(group.id)
            .into_iter()
            .map(TransactionSummary::from)
            .collect(),
        children,
    }
}

fn load_transactions(entries: &LedgerEntries, ids: &[Uuid]) -> CoreResult<Vec<Transaction>> {
    ids.iter()
        .map(|id| {
            entries
                .transaction(*id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(format!("transaction {id}")))
        })
        .collect()
}

fn relabel_edges(entries: &mut LedgerEntries, group_id: Uuid) {
    let names: Vec<(Uuid, String)> = entries
        .groups
        .iter()
        .map(|group| (group.id, group.name.clone()))
        .collect();
    let name_of = |id: Uuid| {
        names
            .iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, name)| name.as_str())
            .unwrap_or("?")
    };
    for edge in entries
        .edges
        .iter_mut()
        .filter(|edge| edge.parent_id == group_id || edge.child_id == group_id)
    {
        edge.label = GroupEdge::label_for(name_of(edge.parent_id), name_of(edge.child_id));
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
