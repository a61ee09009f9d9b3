use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    cascade_service::CascadeService,
    collaborators::{paths, Collaborators, MemoryArchive, MemoryAuditLog, MemoryInvalidator},
    context::CoreContext,
    hierarchy_service::{CreateOutcome, GroupCreated, GroupInput, HierarchyService},
    ledger_service::LedgerService,
    statement_service::{StatementMeta, StatementService},
    store::BookStore,
    time::FixedClock,
    transaction_service::{NewTransaction, TransactionService},
    CoreError,
};
use tally_domain::{Activity, Actor, Group, GroupEdge, Period, TransactionKind};

struct Harness {
    ctx: CoreContext,
    staff: Actor,
    ledger_id: Uuid,
    audit: Arc<MemoryAuditLog>,
    archive: Arc<MemoryArchive>,
    invalidator: Arc<MemoryInvalidator>,
}

impl Harness {
    fn new() -> Self {
        Self::with_audit(MemoryAuditLog::default())
    }

    fn with_audit(audit: MemoryAuditLog) -> Self {
        let audit = Arc::new(audit);
        let archive = Arc::new(MemoryArchive::default());
        let invalidator = Arc::new(MemoryInvalidator::default());
        let collaborators = Collaborators {
            audit: audit.clone(),
            archive: archive.clone(),
            invalidator: invalidator.clone(),
        };
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let ctx = CoreContext::builder(BookStore::new(), collaborators)
            .clock(Arc::new(FixedClock(now)))
            .build();
        let staff = Actor::staff(Uuid::new_v4());
        let ledger = LedgerService::create_ledger(&ctx, "Acme Ltd", &staff).expect("ledger");
        Self {
            ctx,
            staff,
            ledger_id: ledger.id,
            audit,
            archive,
            invalidator,
        }
    }

    fn record(
        &self,
        amount: f64,
        kind: TransactionKind,
        activity: Activity,
        date: NaiveDate,
    ) -> Uuid {
        TransactionService::record(
            &self.ctx,
            self.ledger_id,
            NewTransaction::new(amount, kind, activity, date),
            &self.staff,
        )
        .expect("record transaction")
        .id
    }

    fn expense(&self, amount: f64, date: NaiveDate) -> Uuid {
        self.record(amount, TransactionKind::Expense, Activity::Operating, date)
    }

    fn group(&self, selected: &[Uuid], input: GroupInput) -> Result<GroupCreated, CoreError> {
        HierarchyService::create_group(&self.ctx, selected, input, self.ledger_id, &self.staff)
    }

    fn balance(&self, name: &str) -> f64 {
        let tree = HierarchyService::fetch_group_tree(&self.ctx, self.ledger_id, &self.staff)
            .expect("tree");
        tree.find(name).expect("group in tree").balance
    }

    fn group_count(&self) -> usize {
        self.ctx.store.snapshot().expect("snapshot").group_count()
    }

    /// Every stored statement nets its activity totals and closes on start + net.
    fn assert_statements_consistent(&self) {
        let book = self.ctx.store.snapshot().expect("snapshot");
        let entries = book.entries(self.ledger_id).expect("ledger entries");
        for statement in &entries.statements {
            assert!(
                statement.is_consistent(self.ctx.precision),
                "statement {} is inconsistent: {statement:?}",
                statement.id
            );
        }
    }
}

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

#[test]
fn utilities_and_office_scenario() {
    let h = Harness::new();
    let t1 = h.expense(100.0, date(3, 1));
    let t2 = h.expense(50.0, date(3, 4));

    let utilities = h
        .group(&[t1, t2], GroupInput::named("Utilities"))
        .expect("utilities");
    assert_eq!(utilities.outcome, CreateOutcome::NewGroup);
    assert_eq!(utilities.group.balance, -150.0);

    let office = h
        .group(&[], GroupInput::named("Office").under("Utilities"))
        .expect("office");
    assert_eq!(office.outcome, CreateOutcome::NewGroup);
    assert_eq!(office.group.balance, 0.0);
    assert_eq!(h.balance("Utilities"), -150.0);

    let tree = HierarchyService::fetch_group_tree(&h.ctx, h.ledger_id, &h.staff).unwrap();
    assert_eq!(tree.roots.len(), 1);
    assert_eq!(tree.roots[0].children[0].name, "Office");
    assert_eq!(tree.roots[0].transactions.len(), 2);

    let statement = StatementService::build_statement(
        &h.ctx,
        h.ledger_id,
        &[],
        &[utilities.group.id],
        1000.0,
        StatementMeta::default(),
        &h.staff,
    )
    .expect("statement");
    assert_eq!(statement.operating_total, -150.0);
    assert_eq!(statement.investing_total, 0.0);
    assert_eq!(statement.net_change, -150.0);
    assert_eq!(statement.end_balance, 850.0);
    assert_eq!(statement.period, Some(Period::Daily));
    assert_eq!(statement.date, date(3, 1));
    h.assert_statements_consistent();
}

#[test]
fn nested_deltas_reach_every_ancestor() {
    let h = Harness::new();
    let t1 = h.expense(40.0, date(1, 5));
    let t2 = h.expense(10.0, date(1, 6));
    let t3 = h.expense(5.0, date(1, 7));

    h.group(&[], GroupInput::named("Overheads")).unwrap();
    h.group(&[t1], GroupInput::named("Premises").under("Overheads"))
        .unwrap();
    h.group(&[t2], GroupInput::named("Cleaning").under("Premises"))
        .unwrap();
    assert_eq!(h.balance("Cleaning"), -10.0);
    assert_eq!(h.balance("Premises"), -50.0);
    assert_eq!(h.balance("Overheads"), -50.0);

    let inserted = h.group(&[t3], GroupInput::into_parent("Premises")).unwrap();
    assert_eq!(inserted.outcome, CreateOutcome::InsertedIntoExisting);
    assert_eq!(h.balance("Premises"), -55.0);
    assert_eq!(h.balance("Overheads"), -55.0);
    assert_eq!(h.balance("Cleaning"), -10.0);

    let book = h.ctx.store.snapshot().unwrap();
    let entries = book.entries(h.ledger_id).unwrap();
    let cleaning = entries.group_by_name("Cleaning").unwrap();
    let chain = HierarchyService::ancestors(&h.ctx, cleaning.id, &h.staff).unwrap();
    assert_eq!(chain.len(), 2);
}

#[test]
fn mixed_selection_is_rejected_without_side_effects() {
    let h = Harness::new();
    let rent = h.expense(900.0, date(2, 1));
    let fees = h.record(200.0, TransactionKind::Income, Activity::Operating, date(2, 2));
    let equipment = h.record(300.0, TransactionKind::Expense, Activity::Investing, date(2, 3));

    let err = h
        .group(&[rent, fees], GroupInput::named("Mixed"))
        .expect_err("kinds differ");
    assert!(matches!(err, CoreError::KindMismatch { .. }));

    let err = h
        .group(&[rent, equipment], GroupInput::named("Mixed"))
        .expect_err("activities differ");
    assert!(matches!(err, CoreError::ActivityMismatch { .. }));
    assert_eq!(h.group_count(), 0);
}

#[test]
fn insertion_must_match_the_parents_members() {
    let h = Harness::new();
    let rent = h.expense(900.0, date(2, 1));
    let fees = h.record(200.0, TransactionKind::Income, Activity::Operating, date(2, 2));
    h.group(&[rent], GroupInput::named("Rent")).unwrap();

    let err = h
        .group(&[fees], GroupInput::named("Fees").under("Rent"))
        .expect_err("parent holds expenses");
    assert!(matches!(err, CoreError::KindMismatch { .. }));
    assert_eq!(h.group_count(), 1);
    assert_eq!(h.balance("Rent"), -900.0);
}

#[test]
fn duplicate_links_roll_back_the_whole_unit() {
    let h = Harness::new();
    let t1 = h.expense(100.0, date(3, 1));
    let t2 = h.expense(25.0, date(3, 2));
    h.group(&[t1], GroupInput::named("Utilities")).unwrap();

    let err = h
        .group(&[t2, t1], GroupInput::into_parent("Utilities"))
        .expect_err("t1 already linked");
    assert!(matches!(err, CoreError::AlreadyLinked { .. }));
    assert_eq!(h.balance("Utilities"), -100.0);
    let book = h.ctx.store.snapshot().unwrap();
    assert_eq!(book.entries(h.ledger_id).unwrap().memberships.len(), 1);
}

#[test]
fn group_names_are_unique_across_ledgers() {
    let h = Harness::new();
    h.group(&[], GroupInput::named("Payroll")).unwrap();
    let other = LedgerService::create_ledger(&h.ctx, "Second Client", &h.staff).unwrap();
    assert!(!other.is_default);

    let err = HierarchyService::create_group(
        &h.ctx,
        &[],
        GroupInput::named("Payroll"),
        other.id,
        &h.staff,
    )
    .expect_err("global names");
    assert!(matches!(err, CoreError::NameConflict(_)));
}

#[test]
fn input_errors_are_reported() {
    let h = Harness::new();
    let err = h
        .group(&[], GroupInput::named("Orphan").under("Missing"))
        .expect_err("no parent");
    assert!(matches!(err, CoreError::ParentNotFound(_)));

    let err = h.group(&[], GroupInput::default()).expect_err("no names");
    assert!(matches!(err, CoreError::InvalidInput(_)));

    let err = h
        .group(&[Uuid::new_v4()], GroupInput::named("Ghost"))
        .expect_err("unknown transaction");
    assert!(matches!(err, CoreError::NotFound(_)));
    assert_eq!(h.group_count(), 0);
}

#[test]
fn viewers_and_strangers_cannot_mutate() {
    let h = Harness::new();
    let viewer = Actor::viewer(h.staff.id);
    let err = HierarchyService::create_group(
        &h.ctx,
        &[],
        GroupInput::named("Nope"),
        h.ledger_id,
        &viewer,
    )
    .expect_err("viewer");
    assert!(matches!(err, CoreError::Forbidden(_)));

    let stranger = Actor::staff(Uuid::new_v4());
    let err = HierarchyService::create_group(
        &h.ctx,
        &[],
        GroupInput::named("Nope"),
        h.ledger_id,
        &stranger,
    )
    .expect_err("not the owner");
    assert!(matches!(err, CoreError::NotFound(_)));

    assert!(HierarchyService::fetch_group_tree(&h.ctx, h.ledger_id, &viewer).is_ok());
    let rent = h.group(&[], GroupInput::named("Rent")).unwrap().group;
    assert!(HierarchyService::ancestors(&h.ctx, rent.id, &viewer).is_ok());
    let err = HierarchyService::ancestors(&h.ctx, rent.id, &stranger).expect_err("foreign chain");
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[test]
fn corrupted_edges_stop_propagation() {
    let h = Harness::new();
    let t1 = h.expense(10.0, date(4, 1));
    h.group(&[], GroupInput::named("A")).unwrap();
    h.group(&[], GroupInput::named("B").under("A")).unwrap();
    h.ctx
        .store
        .write(h.ledger_id, |uow| {
            let a = uow.entries.group_by_name("A").cloned().unwrap();
            let b = uow.entries.group_by_name("B").cloned().unwrap();
            uow.entries.edges.push(GroupEdge::new(&b, &a));
            Ok(())
        })
        .unwrap();

    let err = h
        .group(&[t1], GroupInput::into_parent("A"))
        .expect_err("cycle");
    assert!(matches!(err, CoreError::CycleDetected(_)));

    let tree = HierarchyService::fetch_group_tree(&h.ctx, h.ledger_id, &h.staff).unwrap();
    assert!(tree.roots.is_empty());
    assert_eq!(tree.cycles.len(), 2);
    let book = h.ctx.store.snapshot().unwrap();
    assert!(book.entries(h.ledger_id).unwrap().memberships.is_empty());
}

#[test]
fn deleting_a_group_orphans_children_and_archives_it() {
    let h = Harness::new();
    let t1 = h.expense(60.0, date(5, 1));
    h.group(&[], GroupInput::named("Travel")).unwrap();
    let flights = h
        .group(&[t1], GroupInput::named("Flights").under("Travel"))
        .unwrap();
    let travel_id = h
        .ctx
        .store
        .snapshot()
        .unwrap()
        .entries(h.ledger_id)
        .and_then(|e| e.group_by_name("Travel").map(|g| g.id))
        .unwrap();

    let deleted = HierarchyService::delete_group(&h.ctx, travel_id, &h.staff).unwrap();
    assert_eq!(deleted.group.balance, -60.0);
    assert_eq!(deleted.orphaned_children, vec![flights.group.id]);

    let tree = HierarchyService::fetch_group_tree(&h.ctx, h.ledger_id, &h.staff).unwrap();
    assert_eq!(tree.roots.len(), 1);
    assert_eq!(tree.roots[0].name, "Flights");
    assert_eq!(tree.roots[0].balance, -60.0);

    h.ctx.flush_side_channel();
    let archived = h.archive.records();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].entity_id, travel_id);
    assert!(h.audit.actions().contains(&"group.delete".to_string()));
    assert!(h.invalidator.paths().contains(&paths::ledger(h.ledger_id)));
}

#[test]
fn unlinking_keeps_balances() {
    let h = Harness::new();
    let t1 = h.expense(30.0, date(5, 2));
    let created = h.group(&[t1], GroupInput::named("Misc")).unwrap();

    HierarchyService::unlink_transaction(&h.ctx, created.group.id, t1, &h.staff).unwrap();
    assert_eq!(h.balance("Misc"), -30.0);
    let err = HierarchyService::unlink_transaction(&h.ctx, created.group.id, t1, &h.staff)
        .expect_err("already unlinked");
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[test]
fn renaming_updates_edge_labels() {
    let h = Harness::new();
    h.group(&[], GroupInput::named("Ops")).unwrap();
    let child = h.group(&[], GroupInput::named("Fleet").under("Ops")).unwrap();
    HierarchyService::rename_group(&h.ctx, child.group.id, "Vehicles", &h.staff).unwrap();

    let book = h.ctx.store.snapshot().unwrap();
    let entries = book.entries(h.ledger_id).unwrap();
    assert_eq!(entries.edges[0].label, "Ops → Vehicles");

    let err = HierarchyService::rename_group(&h.ctx, child.group.id, "Ops", &h.staff)
        .expect_err("taken");
    assert!(matches!(err, CoreError::NameConflict(_)));
}

#[test]
fn membership_change_recascades_the_period_chain() {
    let h = Harness::new();
    let a = h.record(100.0, TransactionKind::Income, Activity::Operating, date(6, 1));
    let b = h.expense(30.0, date(6, 2));
    let c = h.record(10.0, TransactionKind::Income, Activity::Financing, date(6, 3));
    let extra = h.record(50.0, TransactionKind::Income, Activity::Operating, date(6, 1));
    let monthly_a = h.expense(5.0, date(6, 4));
    let monthly_b = h.expense(5.0, date(6, 20));

    let build = |ids: &[Uuid], start: f64| {
        StatementService::build_statement(
            &h.ctx,
            h.ledger_id,
            ids,
            &[],
            start,
            StatementMeta::default(),
            &h.staff,
        )
        .unwrap()
    };
    let first = build(&[a], 1000.0);
    let second = build(&[b], 1.0);
    let third = build(&[c], 1.0);
    let monthly = build(&[monthly_a, monthly_b], 1.0);
    assert_eq!(first.period, Some(Period::Daily));
    assert_eq!(monthly.period, Some(Period::Monthly));

    let updated =
        StatementService::update_statement(&h.ctx, first.id, &[a, extra], &[], &h.staff).unwrap();
    assert_eq!(updated.cascaded, 2);
    assert_eq!(updated.statement.net_change, 150.0);
    assert_eq!(updated.statement.end_balance, 1150.0);
    assert_eq!(updated.statement.start_balance, 1000.0);

    let chain =
        StatementService::list_statements(&h.ctx, h.ledger_id, Some(Period::Daily), &h.staff)
            .unwrap();
    let ids: Vec<Uuid> = chain.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
    for pair in chain.windows(2) {
        assert_eq!(pair[0].end_balance, pair[1].start_balance);
    }
    assert_eq!(chain[2].end_balance, 1130.0);

    let untouched = StatementService::fetch_statement(&h.ctx, monthly.id, &h.staff).unwrap();
    assert_eq!(untouched.start_balance, 1.0);
    h.assert_statements_consistent();

    CascadeService::run(&h.ctx, h.ledger_id, Some(Period::Daily), date(5, 31), 40.0, &h.staff)
        .unwrap();
    h.assert_statements_consistent();
}

#[test]
fn narrow_mutators_never_cascade() {
    let h = Harness::new();
    let a = h.expense(10.0, date(7, 1));
    let b = h.expense(20.0, date(7, 2));
    let build = |id: Uuid| {
        StatementService::build_statement(
            &h.ctx,
            h.ledger_id,
            &[id],
            &[],
            500.0,
            StatementMeta::default(),
            &h.staff,
        )
        .unwrap()
    };
    let first = build(a);
    let second = build(b);

    let changed = StatementService::set_end_balance(&h.ctx, first.id, 9999.0, &h.staff).unwrap();
    assert_eq!(changed.end_balance, 9999.0);
    StatementService::set_activity_total(&h.ctx, first.id, Activity::Financing, 3.333, &h.staff)
        .unwrap();
    let first = StatementService::fetch_statement(&h.ctx, first.id, &h.staff).unwrap();
    assert_eq!(first.financing_total, 3.33);
    assert_eq!(first.net_change, -10.0);

    let second = StatementService::fetch_statement(&h.ctx, second.id, &h.staff).unwrap();
    assert_eq!(second.start_balance, 500.0);

    let touched = CascadeService::run(
        &h.ctx,
        h.ledger_id,
        Some(Period::Daily),
        date(7, 1),
        9999.0,
        &h.staff,
    )
    .unwrap();
    assert_eq!(touched, 1);
    let second = StatementService::fetch_statement(&h.ctx, second.id, &h.staff).unwrap();
    assert_eq!(second.start_balance, 9999.0);
    assert_eq!(second.end_balance, 9979.0);
}

#[test]
fn statement_start_balance_must_be_a_non_zero_number() {
    let h = Harness::new();
    for start in [0.0, f64::NAN, f64::INFINITY] {
        let err = StatementService::build_statement(
            &h.ctx,
            h.ledger_id,
            &[],
            &[],
            start,
            StatementMeta::default(),
            &h.staff,
        )
        .expect_err("bad start balance");
        assert!(matches!(err, CoreError::InvalidBalance(_)));
    }
}

#[test]
fn empty_statement_has_no_period_and_defaults_to_today() {
    let h = Harness::new();
    let statement = StatementService::build_statement(
        &h.ctx,
        h.ledger_id,
        &[],
        &[],
        250.0,
        StatementMeta {
            date: None,
            label: Some("Opening".into()),
        },
        &h.staff,
    )
    .unwrap();
    assert_eq!(statement.period, None);
    assert_eq!(statement.date, date(6, 30));
    assert_eq!(statement.end_balance, 250.0);

    let updated =
        StatementService::update_statement(&h.ctx, statement.id, &[], &[], &h.staff).unwrap();
    assert_eq!(updated.cascaded, 0);
}

#[test]
fn half_year_selection_is_semi_annual() {
    let h = Harness::new();
    let jan = h.expense(1.0, date(1, 15));
    let jun = h.expense(1.0, date(6, 20));
    let statement = StatementService::build_statement(
        &h.ctx,
        h.ledger_id,
        &[jan, jun],
        &[],
        10.0,
        StatementMeta::default(),
        &h.staff,
    )
    .unwrap();
    assert_eq!(statement.period, Some(Period::SemiAnnual));
    h.assert_statements_consistent();
}

#[test]
fn deleted_statements_are_archived() {
    let h = Harness::new();
    let statement = StatementService::build_statement(
        &h.ctx,
        h.ledger_id,
        &[],
        &[],
        1.0,
        StatementMeta::default(),
        &h.staff,
    )
    .unwrap();
    StatementService::delete_statement(&h.ctx, statement.id, &h.staff).unwrap();
    let err = StatementService::fetch_statement(&h.ctx, statement.id, &h.staff)
        .expect_err("gone");
    assert!(matches!(err, CoreError::NotFound(_)));

    h.ctx.flush_side_channel();
    assert_eq!(h.archive.records()[0].entity_type, "statement");
}

#[test]
fn failing_audit_never_fails_the_operation() {
    let h = Harness::with_audit(MemoryAuditLog::failing(1));
    let t1 = h.expense(12.0, date(8, 1));
    h.group(&[t1], GroupInput::named("Supplies")).unwrap();

    h.ctx.flush_side_channel();
    let actions = h.audit.actions();
    assert_eq!(actions[0], "ledger.create.degraded");
    assert!(actions.contains(&"group.create".to_string()));
}

#[test]
fn ledgers_keep_one_default_and_unique_names() {
    let h = Harness::new();
    let second = LedgerService::create_ledger(&h.ctx, "Beta Co", &h.staff).unwrap();
    let err = LedgerService::create_ledger(&h.ctx, "ACME LTD", &h.staff).expect_err("clash");
    assert!(matches!(err, CoreError::NameConflict(_)));

    LedgerService::set_default(&h.ctx, second.id, &h.staff).unwrap();
    let listed = LedgerService::list_ledgers(&h.ctx, &h.staff).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed.iter().filter(|l| l.is_default).count(), 1);

    let err = LedgerService::rename_ledger(&h.ctx, second.id, "acme ltd", &h.staff)
        .expect_err("rename clash");
    assert!(matches!(err, CoreError::NameConflict(_)));
    let renamed = LedgerService::rename_ledger(&h.ctx, second.id, "Beta Holdings", &h.staff)
        .unwrap();
    assert_eq!(renamed.name, "Beta Holdings");

    let stranger = Actor::staff(Uuid::new_v4());
    assert!(LedgerService::list_ledgers(&h.ctx, &stranger).unwrap().is_empty());
    assert!(h.invalidator.paths().contains(&paths::LEDGERS.to_string()));
}

#[test]
fn describing_and_retyping_leave_balances_alone() {
    let h = Harness::new();
    let t1 = h.expense(100.0, date(2, 1));
    let rent = h.group(&[t1], GroupInput::named("Rent")).unwrap().group;
    let deposit = h
        .group(&[], GroupInput::named("Deposit").under("Rent"))
        .unwrap()
        .group;

    HierarchyService::describe_group(&h.ctx, rent.id, Some("Office lease".into()), &h.staff)
        .unwrap();
    let tree = HierarchyService::fetch_group_tree(&h.ctx, h.ledger_id, &h.staff).unwrap();
    assert_eq!(
        tree.find("Rent").unwrap().description.as_deref(),
        Some("Office lease")
    );

    let txn = TransactionService::retype(&h.ctx, t1, 120.0, TransactionKind::Income, &h.staff)
        .unwrap();
    assert_eq!(txn.amount, 120.0);
    assert_eq!(txn.kind, TransactionKind::Income);
    assert_eq!(h.balance("Rent"), -100.0);

    let err = TransactionService::retype(&h.ctx, t1, -1.0, TransactionKind::Income, &h.staff)
        .expect_err("negative amount");
    assert!(matches!(err, CoreError::InvalidAmount(_)));

    let ancestors = HierarchyService::ancestors(&h.ctx, deposit.id, &h.staff).unwrap();
    assert_eq!(ancestors, vec![rent.id]);
}

#[test]
fn retyping_cannot_mix_kinds_inside_a_group() {
    let h = Harness::new();
    let t1 = h.expense(100.0, date(3, 1));
    let t2 = h.expense(50.0, date(3, 4));
    h.group(&[t1, t2], GroupInput::named("Utilities")).unwrap();

    let err = TransactionService::retype(&h.ctx, t1, 100.0, TransactionKind::Income, &h.staff)
        .expect_err("mixed kinds");
    assert!(matches!(err, CoreError::KindMismatch { .. }));

    let book = h.ctx.store.snapshot().unwrap();
    let entries = book.entries(h.ledger_id).unwrap();
    assert_eq!(entries.transaction(t1).unwrap().kind, TransactionKind::Expense);
    assert_eq!(h.balance("Utilities"), -150.0);

    let same_kind = TransactionService::retype(&h.ctx, t1, 90.0, TransactionKind::Expense, &h.staff)
        .unwrap();
    assert_eq!(same_kind.amount, 90.0);
}

#[test]
fn parent_with_mixed_children_contributes_its_signed_balance() {
    let h = Harness::new();
    let sale = h.record(50.0, TransactionKind::Income, Activity::Operating, date(3, 1));
    let refund = h.expense(200.0, date(3, 2));
    let parent = h.group(&[], GroupInput::named("Parent")).unwrap().group;
    h.group(&[sale], GroupInput::named("Sales").under("Parent"))
        .unwrap();
    h.group(&[refund], GroupInput::named("Refunds").under("Parent"))
        .unwrap();
    assert_eq!(h.balance("Parent"), -150.0);

    let statement = StatementService::build_statement(
        &h.ctx,
        h.ledger_id,
        &[],
        &[parent.id],
        1000.0,
        StatementMeta::default(),
        &h.staff,
    )
    .unwrap();
    assert_eq!(statement.operating_total, -150.0);
    assert_eq!(statement.end_balance, 850.0);
    h.assert_statements_consistent();
}

#[test]
fn failed_delete_sends_no_archive_record() {
    let h = Harness::new();
    let other = LedgerService::create_ledger(&h.ctx, "Second Client", &h.staff).unwrap();
    h.group(&[], GroupInput::named("Shared")).unwrap();
    let doomed = h.group(&[], GroupInput::named("Doomed")).unwrap().group;

    // Plant a clashing name in the other ledger so the commit is refused.
    let mut book = (*h.ctx.store.snapshot().unwrap()).clone();
    book.entries
        .get_mut(&other.id)
        .unwrap()
        .groups
        .push(Group::new(other.id, "Shared", Utc::now()));
    h.ctx.store.replace(book).unwrap();

    let err = HierarchyService::delete_group(&h.ctx, doomed.id, &h.staff).expect_err("clash");
    assert!(matches!(err, CoreError::NameConflict(_)));
    h.ctx.flush_side_channel();
    assert!(h.archive.records().is_empty());
    assert_eq!(h.group_count(), 3);

    h.ctx
        .store
        .write(other.id, |uow| {
            uow.entries.groups.clear();
            Ok(())
        })
        .unwrap();
    HierarchyService::delete_group(&h.ctx, doomed.id, &h.staff).unwrap();
    h.ctx.flush_side_channel();
    assert_eq!(h.archive.records().len(), 1);
    assert_eq!(h.archive.records()[0].entity_id, doomed.id);
}
