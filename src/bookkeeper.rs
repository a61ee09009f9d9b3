//! Facade over the core services with persistence and the public error envelope.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use tally_config::Config;
use tally_core::{
    collaborators::Collaborators,
    storage::{book_warnings, BookBackupInfo, BookStorage},
    time::Clock,
    BookStore, CascadeService, CoreContext, CoreError, GroupCreated, GroupDeleted, GroupInput,
    GroupTree, HierarchyService, LedgerService, NewTransaction, StatementMeta, StatementService,
    StatementUpdated, StatementView, TransactionService,
};
use tally_domain::{
    Activity, Actor, Book, Group, Ledger, Period, Statement, Transaction, TransactionKind,
};
use tally_storage_json::{JsonBookStorage, StoragePaths};

use crate::errors::{Result, TallyError};

const DEFAULT_BOOK: &str = "default";

/// Entry point for callers: every operation returns [`crate::Result`].
pub struct Bookkeeper {
    ctx: CoreContext,
    storage: Option<Arc<dyn BookStorage>>,
    book_name: String,
}

pub struct BookkeeperBuilder {
    config: Config,
    collaborators: Collaborators,
    clock: Option<Arc<dyn Clock>>,
    data_root: Option<PathBuf>,
    book_name: Option<String>,
}

impl BookkeeperBuilder {
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the data root resolved from the configuration.
    pub fn data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = Some(root.into());
        self
    }

    pub fn book(mut self, name: impl Into<String>) -> Self {
        self.book_name = Some(name.into());
        self
    }

    /// A bookkeeper that lives in memory only.
    pub fn build(self) -> Result<Bookkeeper> {
        self.config.validate()?;
        let book_name = self.resolved_book_name();
        Ok(Bookkeeper {
            ctx: self.context(BookStore::new()),
            storage: None,
            book_name,
        })
    }

    /// A bookkeeper backed by JSON files under the data root.
    pub fn open(self) -> Result<Bookkeeper> {
        self.config.validate()?;
        let root = self
            .data_root
            .clone()
            .unwrap_or_else(|| self.config.resolve_data_root());
        let storage = JsonBookStorage::with_retention(
            StoragePaths::under(&root),
            self.config.backup_retention,
        )?;
        let book_name = self.resolved_book_name();
        let book = load_or_empty(&storage, &book_name)?;
        for warning in book_warnings(&book) {
            warn!(book = %book_name, %warning, "book loaded with warnings");
        }
        info!(
            book = %book_name,
            root = %root.display(),
            ledgers = book.ledgers.len(),
            "book opened"
        );
        Ok(Bookkeeper {
            ctx: self.context(BookStore::from_book(book)),
            storage: Some(Arc::new(storage)),
            book_name,
        })
    }

    fn resolved_book_name(&self) -> String {
        self.book_name
            .clone()
            .or_else(|| self.config.last_opened_book.clone())
            .unwrap_or_else(|| DEFAULT_BOOK.to_string())
    }

    fn context(&self, store: BookStore) -> CoreContext {
        let mut builder = CoreContext::builder(store, self.collaborators.clone())
            .precision(self.config.amount_precision)
            .queue_capacity(self.config.audit_queue_capacity);
        if let Some(clock) = self.clock.clone() {
            builder = builder.clock(clock);
        }
        builder.build()
    }
}

fn load_or_empty(storage: &JsonBookStorage, name: &str) -> Result<Book> {
    match storage.load_book(name) {
        Ok(book) => Ok(book),
        Err(CoreError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(Book::default()),
        Err(err) => Err(err.into()),
    }
}

impl Bookkeeper {
    pub fn builder(config: Config) -> BookkeeperBuilder {
        BookkeeperBuilder {
            config,
            collaborators: Collaborators::default(),
            clock: None,
            data_root: None,
            book_name: None,
        }
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn open(config: Config) -> Result<Self> {
        Self::builder(config).open()
    }

    pub fn open_at(config: Config, root: &Path) -> Result<Self> {
        Self::builder(config).data_root(root).open()
    }

    pub fn context(&self) -> &CoreContext {
        &self.ctx
    }

    pub fn book_name(&self) -> &str {
        &self.book_name
    }

    /// Committed state as of now.
    pub fn snapshot(&self) -> Result<Arc<Book>> {
        Ok(self.ctx.store.snapshot()?)
    }

    /// Writes the committed book to storage, backing up the previous file.
    pub fn persist(&self) -> Result<()> {
        let storage = self.storage()?;
        let book = self.ctx.store.snapshot()?;
        storage.save_book(&self.book_name, &book)?;
        info!(book = %self.book_name, "book persisted");
        Ok(())
    }

    pub fn backup(&self, note: Option<&str>) -> Result<BookBackupInfo> {
        let storage = self.storage()?;
        let book = self.ctx.store.snapshot()?;
        Ok(storage.backup_book(&self.book_name, &book, note)?)
    }

    pub fn list_backups(&self) -> Result<Vec<BookBackupInfo>> {
        Ok(self.storage()?.list_backups(&self.book_name)?)
    }

    /// Replaces the in-memory book with a backup.
    pub fn restore(&self, backup: &BookBackupInfo) -> Result<()> {
        let book = self.storage()?.restore_backup(backup)?;
        self.ctx.store.replace(book)?;
        info!(book = %self.book_name, backup = %backup.id, "book restored");
        Ok(())
    }

    /// Waits for queued audit and archive records.
    pub fn flush(&self) {
        self.ctx.flush_side_channel();
    }

    pub fn create_ledger(&self, name: &str, actor: &Actor) -> Result<Ledger> {
        Ok(LedgerService::create_ledger(&self.ctx, name, actor)?)
    }

    pub fn rename_ledger(&self, ledger_id: Uuid, name: &str, actor: &Actor) -> Result<Ledger> {
        Ok(LedgerService::rename_ledger(&self.ctx, ledger_id, name, actor)?)
    }

    pub fn set_default_ledger(&self, ledger_id: Uuid, actor: &Actor) -> Result<Ledger> {
        Ok(LedgerService::set_default(&self.ctx, ledger_id, actor)?)
    }

    pub fn list_ledgers(&self, actor: &Actor) -> Result<Vec<Ledger>> {
        Ok(LedgerService::list_ledgers(&self.ctx, actor)?)
    }

    pub fn record_transaction(
        &self,
        ledger_id: Uuid,
        input: NewTransaction,
        actor: &Actor,
    ) -> Result<Transaction> {
        Ok(TransactionService::record(&self.ctx, ledger_id, input, actor)?)
    }

    pub fn retype_transaction(
        &self,
        transaction_id: Uuid,
        amount: f64,
        kind: TransactionKind,
        actor: &Actor,
    ) -> Result<Transaction> {
        Ok(TransactionService::retype(
            &self.ctx,
            transaction_id,
            amount,
            kind,
            actor,
        )?)
    }

    pub fn create_group(
        &self,
        selected: &[Uuid],
        input: GroupInput,
        ledger_id: Uuid,
        actor: &Actor,
    ) -> Result<GroupCreated> {
        Ok(HierarchyService::create_group(
            &self.ctx, selected, input, ledger_id, actor,
        )?)
    }

    pub fn delete_group(&self, group_id: Uuid, actor: &Actor) -> Result<GroupDeleted> {
        Ok(HierarchyService::delete_group(&self.ctx, group_id, actor)?)
    }

    pub fn unlink_transaction(
        &self,
        group_id: Uuid,
        transaction_id: Uuid,
        actor: &Actor,
    ) -> Result<()> {
        Ok(HierarchyService::unlink_transaction(
            &self.ctx,
            group_id,
            transaction_id,
            actor,
        )?)
    }

    pub fn rename_group(&self, group_id: Uuid, name: &str, actor: &Actor) -> Result<Group> {
        Ok(HierarchyService::rename_group(&self.ctx, group_id, name, actor)?)
    }

    pub fn describe_group(
        &self,
        group_id: Uuid,
        description: Option<String>,
        actor: &Actor,
    ) -> Result<Group> {
        Ok(HierarchyService::describe_group(
            &self.ctx,
            group_id,
            description,
            actor,
        )?)
    }

    pub fn fetch_group_tree(&self, ledger_id: Uuid, actor: &Actor) -> Result<GroupTree> {
        Ok(HierarchyService::fetch_group_tree(&self.ctx, ledger_id, actor)?)
    }

    pub fn group_ancestors(&self, group_id: Uuid, actor: &Actor) -> Result<Vec<Uuid>> {
        Ok(HierarchyService::ancestors(&self.ctx, group_id, actor)?)
    }

    pub fn build_statement(
        &self,
        ledger_id: Uuid,
        transaction_ids: &[Uuid],
        group_ids: &[Uuid],
        start_balance: f64,
        meta: StatementMeta,
        actor: &Actor,
    ) -> Result<StatementView> {
        Ok(StatementService::build_statement(
            &self.ctx,
            ledger_id,
            transaction_ids,
            group_ids,
            start_balance,
            meta,
            actor,
        )?)
    }

    pub fn update_statement(
        &self,
        statement_id: Uuid,
        transaction_ids: &[Uuid],
        group_ids: &[Uuid],
        actor: &Actor,
    ) -> Result<StatementUpdated> {
        Ok(StatementService::update_statement(
            &self.ctx,
            statement_id,
            transaction_ids,
            group_ids,
            actor,
        )?)
    }

    pub fn set_net_change(
        &self,
        statement_id: Uuid,
        value: f64,
        actor: &Actor,
    ) -> Result<StatementView> {
        Ok(StatementService::set_net_change(&self.ctx, statement_id, value, actor)?)
    }

    pub fn set_start_balance(
        &self,
        statement_id: Uuid,
        value: f64,
        actor: &Actor,
    ) -> Result<StatementView> {
        Ok(StatementService::set_start_balance(&self.ctx, statement_id, value, actor)?)
    }

    pub fn set_end_balance(
        &self,
        statement_id: Uuid,
        value: f64,
        actor: &Actor,
    ) -> Result<StatementView> {
        Ok(StatementService::set_end_balance(&self.ctx, statement_id, value, actor)?)
    }

    pub fn set_activity_total(
        &self,
        statement_id: Uuid,
        bucket: Activity,
        value: f64,
        actor: &Actor,
    ) -> Result<StatementView> {
        Ok(StatementService::set_activity_total(
            &self.ctx,
            statement_id,
            bucket,
            value,
            actor,
        )?)
    }

    pub fn set_all_balances(
        &self,
        statement_id: Uuid,
        start_balance: f64,
        net_change: f64,
        end_balance: f64,
        actor: &Actor,
    ) -> Result<StatementView> {
        Ok(StatementService::set_all_balances(
            &self.ctx,
            statement_id,
            start_balance,
            net_change,
            end_balance,
            actor,
        )?)
    }

    pub fn fetch_statement(&self, statement_id: Uuid, actor: &Actor) -> Result<StatementView> {
        Ok(StatementService::fetch_statement(&self.ctx, statement_id, actor)?)
    }

    pub fn list_statements(
        &self,
        ledger_id: Uuid,
        period: Option<Period>,
        actor: &Actor,
    ) -> Result<Vec<StatementView>> {
        Ok(StatementService::list_statements(&self.ctx, ledger_id, period, actor)?)
    }

    pub fn delete_statement(&self, statement_id: Uuid, actor: &Actor) -> Result<Statement> {
        Ok(StatementService::delete_statement(&self.ctx, statement_id, actor)?)
    }

    pub fn recascade(
        &self,
        ledger_id: Uuid,
        period: Option<Period>,
        after_date: NaiveDate,
        new_end_balance: f64,
        actor: &Actor,
    ) -> Result<usize> {
        Ok(CascadeService::run(
            &self.ctx,
            ledger_id,
            period,
            after_date,
            new_end_balance,
            actor,
        )?)
    }

    fn storage(&self) -> Result<&Arc<dyn BookStorage>> {
        self.storage
            .as_ref()
            .ok_or_else(|| TallyError::InvalidInput("bookkeeper has no storage attached".into()))
    }
}
