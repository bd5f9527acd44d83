//! Result of an executed prepared SELECT.

use crate::driver::{ColumnInfo, RawStatement};
use crate::error::Result;
use crate::row::FromRow;

use super::cursor::RowCursor;
use super::prepared::PreparedStatement;

/// Rows of a binary-protocol result.
///
/// Borrows the prepared statement whose result buffers it reads. Unread
/// records are discarded when the result is dropped, leaving the statement
/// ready for its next execution.
pub struct BindResult<'a, S: RawStatement> {
    stmt: &'a mut PreparedStatement<S>,
    is_broken: &'a mut bool,
    exhausted: bool,
}

impl<'a, S: RawStatement> BindResult<'a, S> {
    pub(crate) fn new(stmt: &'a mut PreparedStatement<S>, is_broken: &'a mut bool) -> Self {
        Self {
            stmt,
            is_broken,
            exhausted: false,
        }
    }

    /// Result column metadata of the statement.
    pub fn columns(&self) -> &[ColumnInfo] {
        self.stmt.columns()
    }

    /// Check if end of data has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<S: RawStatement> RowCursor for BindResult<'_, S> {
    fn fetch<T: FromRow>(&mut self) -> Result<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.stmt.fetch_bound() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => {
                if e.is_connection_broken() {
                    *self.is_broken = true;
                }
                Err(e)
            }
        }
    }
}

impl<S: RawStatement> Drop for BindResult<'_, S> {
    fn drop(&mut self) {
        self.stmt.free_result();
    }
}
