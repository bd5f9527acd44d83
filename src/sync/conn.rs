//! Synchronous connection.

use tracing::{debug, error, info, warn};

use crate::driver::{Driver, RawConnection, ResultSetOf, StatementOf};
use crate::error::{Error, Result};
use crate::handle::{NativeHandle, RawId};
use crate::opts::Opts;

use super::bind_result::BindResult;
use super::char_result::CharResult;
use super::prepared::PreparedStatement;
use super::transaction::Transaction;

type RollbackFailureHook = Box<dyn FnMut(&str)>;

/// A connection to one server session.
///
/// Owns the native connection and releases it on drop. At most one
/// transaction is open at a time. After an error that indicates a lost link
/// the connection is broken: every operation fails with
/// [`Error::Connection`] until [`Connection::reconnect`] succeeds.
pub struct Connection<D: Driver> {
    driver: D,
    opts: Opts,
    handle: NativeHandle<D::Connection>,
    transaction_active: bool,
    /// Bumped by every successful START TRANSACTION
    transaction_generation: u64,
    is_broken: bool,
    rollback_failure_hook: Option<RollbackFailureHook>,
}

impl<D: Driver> Connection<D> {
    /// Connect through `driver`.
    pub fn new<O: TryInto<Opts>>(driver: D, opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let raw = driver.connect(&opts)?;
        let conn = Self {
            driver,
            opts,
            handle: NativeHandle::new(raw),
            transaction_active: false,
            transaction_generation: 0,
            is_broken: false,
            rollback_failure_hook: None,
        };
        debug!(connection_id = conn.connection_id(), "connected");
        Ok(conn)
    }

    /// Identity of the native connection. Zero after close.
    pub fn connection_id(&self) -> RawId {
        self.handle.raw_id().unwrap_or(0)
    }

    /// Options the connection was opened with.
    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// The driver this connection was opened with.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Check if the connection saw a lost link.
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Check if a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction_active
    }

    /// Identifies the open transaction, if any.
    pub(crate) fn transaction_generation(&self) -> u64 {
        self.transaction_generation
    }

    /// Replace the native connection with a fresh one.
    ///
    /// The old connection is released. Any open transaction is gone with it.
    pub fn reconnect(&mut self) -> Result<()> {
        let raw = self.driver.connect(&self.opts)?;
        if self.transaction_active {
            warn!("reconnecting discards an unfinished transaction");
        }
        self.handle = NativeHandle::new(raw);
        self.transaction_active = false;
        self.is_broken = false;
        info!(connection_id = self.connection_id(), "reconnected");
        Ok(())
    }

    /// Release the native connection now.
    pub fn close(mut self) {
        if self.transaction_active {
            warn!("closing connection with an unfinished transaction");
        }
        self.handle.reset();
    }

    fn raw(&mut self) -> Result<&mut D::Connection> {
        if self.is_broken {
            return Err(Error::Connection(
                "connection is broken; reconnect before reuse".into(),
            ));
        }
        self.handle
            .get_mut()
            .ok_or_else(|| Error::Connection("connection is closed".into()))
    }

    /// Mark the connection broken if `result` carries a lost-link error.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.as_ref().is_err_and(Error::is_connection_broken) {
            warn!("connection lost");
            self.is_broken = true;
        }
        result
    }

    fn log_statement(&self, sql: &str) {
        if self.opts.debug {
            debug!(statement = sql, "sending statement");
        }
    }

    fn query(&mut self, sql: &str) -> Result<Option<ResultSetOf<D>>> {
        self.log_statement(sql);
        let result = self.raw()?.query(sql);
        self.track(result)
    }

    // === Direct execution ===

    /// Run a statement and discard any result.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.query(sql)?;
        Ok(())
    }

    /// Run a SELECT and return its rows.
    ///
    /// Returns [`Error::InvalidUsage`] if the statement produced no result set.
    pub fn select(&mut self, sql: &str) -> Result<CharResult<'_, ResultSetOf<D>>> {
        let Some(result) = self.query(sql)? else {
            return Err(Error::InvalidUsage(format!(
                "statement produced no result set: {}",
                sql
            )));
        };
        Ok(CharResult::new(result, &mut self.is_broken))
    }

    /// Run an INSERT and return the generated identifier, if any.
    pub fn insert(&mut self, sql: &str) -> Result<Option<u64>> {
        self.query(sql)?;
        Ok(self.raw()?.last_insert_id())
    }

    /// Run an UPDATE and return the number of rows changed.
    pub fn update(&mut self, sql: &str) -> Result<u64> {
        self.query(sql)?;
        Ok(self.raw()?.affected_rows())
    }

    /// Run a DELETE and return the number of rows removed.
    pub fn remove(&mut self, sql: &str) -> Result<u64> {
        self.update(sql)
    }

    /// Escape a string for inclusion in a quoted SQL literal.
    pub fn escape(&self, text: &str) -> Result<String> {
        self.handle
            .get()
            .map(|raw| raw.escape(text))
            .ok_or_else(|| Error::Connection("connection is closed".into()))
    }

    // === Prepared execution ===

    fn prepare(
        &mut self,
        sql: &str,
        parameter_count: usize,
        result_column_count: usize,
    ) -> Result<PreparedStatement<StatementOf<D>>> {
        self.log_statement(sql);
        let result = self.raw()?.prepare(sql);
        let raw = self.track(result)?;
        PreparedStatement::new(
            raw,
            self.connection_id(),
            sql,
            parameter_count,
            result_column_count,
        )
    }

    /// Prepare a SELECT with `parameter_count` parameters returning
    /// `result_column_count` columns.
    pub fn prepare_select(
        &mut self,
        sql: &str,
        parameter_count: usize,
        result_column_count: usize,
    ) -> Result<PreparedStatement<StatementOf<D>>> {
        self.prepare(sql, parameter_count, result_column_count)
    }

    /// Prepare an INSERT with `parameter_count` parameters.
    pub fn prepare_insert(
        &mut self,
        sql: &str,
        parameter_count: usize,
    ) -> Result<PreparedStatement<StatementOf<D>>> {
        self.prepare(sql, parameter_count, 0)
    }

    /// Prepare an UPDATE with `parameter_count` parameters.
    pub fn prepare_update(
        &mut self,
        sql: &str,
        parameter_count: usize,
    ) -> Result<PreparedStatement<StatementOf<D>>> {
        self.prepare(sql, parameter_count, 0)
    }

    /// Prepare a DELETE with `parameter_count` parameters.
    pub fn prepare_remove(
        &mut self,
        sql: &str,
        parameter_count: usize,
    ) -> Result<PreparedStatement<StatementOf<D>>> {
        self.prepare(sql, parameter_count, 0)
    }

    fn run_prepared(&mut self, stmt: &mut PreparedStatement<StatementOf<D>>) -> Result<()> {
        // Validate usability before looking at the statement.
        self.raw()?;
        if stmt.connection_id() != self.connection_id() {
            return Err(Error::InvalidUsage(format!(
                "statement was prepared on connection {}, not {}",
                stmt.connection_id(),
                self.connection_id()
            )));
        }
        self.log_statement(stmt.sql());
        let result = stmt.execute();
        self.track(result)
    }

    /// Execute a prepared SELECT with its bound parameters.
    pub fn run_prepared_select<'a>(
        &'a mut self,
        stmt: &'a mut PreparedStatement<StatementOf<D>>,
    ) -> Result<BindResult<'a, StatementOf<D>>> {
        self.run_prepared(stmt)?;
        Ok(BindResult::new(stmt, &mut self.is_broken))
    }

    /// Execute a prepared INSERT and return the generated identifier, if any.
    pub fn run_prepared_insert(
        &mut self,
        stmt: &mut PreparedStatement<StatementOf<D>>,
    ) -> Result<Option<u64>> {
        self.run_prepared(stmt)?;
        Ok(stmt.last_insert_id())
    }

    /// Execute a prepared UPDATE and return the number of rows changed.
    pub fn run_prepared_update(
        &mut self,
        stmt: &mut PreparedStatement<StatementOf<D>>,
    ) -> Result<u64> {
        self.run_prepared(stmt)?;
        Ok(stmt.affected_rows())
    }

    /// Execute a prepared DELETE and return the number of rows removed.
    pub fn run_prepared_remove(
        &mut self,
        stmt: &mut PreparedStatement<StatementOf<D>>,
    ) -> Result<u64> {
        self.run_prepared_update(stmt)
    }

    // === Transactions ===

    /// Open a transaction.
    ///
    /// Returns [`Error::TransactionState`] if one is already open.
    pub fn start_transaction(&mut self) -> Result<()> {
        if self.transaction_active {
            return Err(Error::TransactionState(
                "cannot have more than one open transaction per connection".into(),
            ));
        }
        self.execute("START TRANSACTION")?;
        self.transaction_active = true;
        self.transaction_generation += 1;
        Ok(())
    }

    /// Commit the open transaction.
    ///
    /// Returns [`Error::TransactionState`] if none is open. If the server
    /// rejects the commit the transaction stays open.
    pub fn commit_transaction(&mut self) -> Result<()> {
        if !self.transaction_active {
            return Err(Error::TransactionState(
                "cannot commit a finished or failed transaction".into(),
            ));
        }
        self.execute("COMMIT")?;
        self.transaction_active = false;
        Ok(())
    }

    /// Roll back the open transaction.
    ///
    /// With `report` set, a warning is logged that an unfinished transaction
    /// is being rolled back. Returns [`Error::TransactionState`] if none is
    /// open. If the server rejects the rollback the transaction stays open.
    pub fn rollback_transaction(&mut self, report: bool) -> Result<()> {
        if !self.transaction_active {
            return Err(Error::TransactionState(
                "cannot rollback a finished or failed transaction".into(),
            ));
        }
        if report {
            warn!("rolling back unfinished transaction");
        }
        self.execute("ROLLBACK")?;
        self.transaction_active = false;
        Ok(())
    }

    /// Report a rollback that failed where no error can be returned.
    ///
    /// Logs the message and passes it to the hook set with
    /// [`set_rollback_failure_hook`](Self::set_rollback_failure_hook).
    pub fn report_rollback_failure(&mut self, message: &str) {
        error!(reason = message, "rollback failed");
        if let Some(hook) = self.rollback_failure_hook.as_mut() {
            hook(message);
        }
    }

    /// Install a callback for rollback failures that cannot be returned as errors.
    pub fn set_rollback_failure_hook<F: FnMut(&str) + 'static>(&mut self, hook: F) {
        self.rollback_failure_hook = Some(Box::new(hook));
    }

    /// Open a transaction guarded by the returned value.
    ///
    /// Dropping the guard without [`Transaction::commit`] or
    /// [`Transaction::rollback`] rolls the transaction back.
    pub fn transaction(&mut self) -> Result<Transaction<'_, D>> {
        Transaction::begin(self)
    }

    /// Execute a closure within a transaction.
    ///
    /// If the closure returns `Ok`, the transaction is committed.
    /// If the closure returns `Err`, the transaction is rolled back and the
    /// closure's error is returned; a failing rollback is reported through
    /// [`report_rollback_failure`](Self::report_rollback_failure).
    pub fn run_transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection<D>) -> Result<R>,
    {
        let mut tx = self.transaction()?;
        match f(&mut tx) {
            Ok(value) => {
                if tx.owns_open_transaction() {
                    tx.commit()?;
                }
                Ok(value)
            }
            Err(err) => {
                let rollback = if tx.owns_open_transaction() {
                    tx.rollback()
                } else {
                    drop(tx);
                    Ok(())
                };
                if let Err(rollback_err) = rollback {
                    self.report_rollback_failure(&rollback_err.to_string());
                }
                Err(err)
            }
        }
    }
}
