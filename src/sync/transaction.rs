//! Scoped transactions.

use std::ops::{Deref, DerefMut};

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::types::TransactionState;

use super::Connection;

/// A transaction bound to a scope.
///
/// Created by [`Connection::transaction`]. The connection stays usable
/// through the guard. If the guard is dropped while the transaction is still
/// open, it is rolled back; a failure of that rollback cannot be returned and
/// goes to [`Connection::report_rollback_failure`] instead.
///
/// The guard only ever finishes the transaction it started. If that
/// transaction is ended through the connection and another one is opened,
/// the guard leaves the new one alone.
pub struct Transaction<'c, D: Driver> {
    conn: &'c mut Connection<D>,
    state: TransactionState,
    generation: u64,
    report_unfinished: bool,
}

impl<'c, D: Driver> Transaction<'c, D> {
    pub(crate) fn begin(conn: &'c mut Connection<D>) -> Result<Self> {
        let mut tx = Self {
            conn,
            state: TransactionState::Inactive,
            generation: 0,
            report_unfinished: true,
        };
        tx.conn.start_transaction()?;
        tx.state = TransactionState::Active;
        tx.generation = tx.conn.transaction_generation();
        Ok(tx)
    }

    /// Whether an automatic rollback on drop logs a warning. Default: `true`.
    #[must_use]
    pub fn report_unfinished(mut self, report: bool) -> Self {
        self.report_unfinished = report;
        self
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Check if the transaction this guard started is still open.
    pub(crate) fn owns_open_transaction(&self) -> bool {
        self.state == TransactionState::Active
            && self.conn.in_transaction()
            && self.conn.transaction_generation() == self.generation
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::TransactionState(format!(
                "transaction is {:?}",
                self.state
            )));
        }
        if self.conn.transaction_generation() != self.generation {
            return Err(Error::TransactionState(
                "transaction was finished through the connection".into(),
            ));
        }
        Ok(())
    }

    /// Commit. If the commit fails the guard rolls back on drop.
    pub fn commit(mut self) -> Result<()> {
        self.ensure_active()?;
        self.conn.commit_transaction()?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Roll back. A failure is returned and not retried on drop.
    pub fn rollback(mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionState::RolledBack;
        self.conn.rollback_transaction(false)
    }
}

impl<D: Driver> Deref for Transaction<'_, D> {
    type Target = Connection<D>;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

impl<D: Driver> DerefMut for Transaction<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
    }
}

impl<D: Driver> Drop for Transaction<'_, D> {
    fn drop(&mut self) {
        if !self.owns_open_transaction() {
            return;
        }
        match self.conn.rollback_transaction(self.report_unfinished) {
            Ok(()) => self.state = TransactionState::RolledBack,
            Err(e) => {
                let message = format!("automatic rollback failed: {}", e);
                self.conn.report_rollback_failure(&message);
            }
        }
    }
}
