//! Result of a directly executed SELECT.

use crate::conversion::Cell;
use crate::driver::{ColumnInfo, RawResultSet};
use crate::error::{Error, Result};
use crate::handle::NativeHandle;
use crate::row::{FromRow, decode_row};

use super::cursor::RowCursor;

/// Rows of a text-protocol result set.
///
/// Owns the native result set and releases it when dropped. Borrows the
/// connection it came from, so the connection cannot send another statement
/// while the result is alive.
pub struct CharResult<'c, R: RawResultSet> {
    handle: NativeHandle<R>,
    columns: Vec<ColumnInfo>,
    is_broken: &'c mut bool,
    exhausted: bool,
}

impl<'c, R: RawResultSet> CharResult<'c, R> {
    pub(crate) fn new(result: R, is_broken: &'c mut bool) -> Self {
        let columns = result.columns().to_vec();
        Self {
            handle: NativeHandle::new(result),
            columns,
            is_broken,
            exhausted: false,
        }
    }

    /// Column metadata of the result.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Check if end of data has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<R: RawResultSet> RowCursor for CharResult<'_, R> {
    fn fetch<T: FromRow>(&mut self) -> Result<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(result) = self.handle.get_mut() else {
            self.exhausted = true;
            return Ok(None);
        };
        let raw = match result.fetch_row() {
            Ok(raw) => raw,
            Err(e) => {
                if e.is_connection_broken() {
                    *self.is_broken = true;
                }
                return Err(e);
            }
        };
        let Some(raw) = raw else {
            self.exhausted = true;
            return Ok(None);
        };
        if raw.len() != self.columns.len() {
            return Err(Error::Decode(format!(
                "record has {} fields, result has {} columns",
                raw.len(),
                self.columns.len()
            )));
        }
        let cells: Vec<Cell<'_>> = raw.iter().map(Cell::text).collect();
        decode_row(&self.columns, &cells).map(Some)
    }
}

impl<R: RawResultSet> PartialEq for CharResult<'_, R> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}
