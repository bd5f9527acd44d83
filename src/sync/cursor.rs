//! Row-by-row consumption shared by both result kinds.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::error::Result;
use crate::row::{FromRow, Row};

/// A forward-only stream of result records.
///
/// Once end of data has been reached every further fetch reports end of data
/// again without touching the driver.
pub trait RowCursor {
    /// Fetch and decode the next record. `Ok(None)` means end of data.
    fn fetch<T: FromRow>(&mut self) -> Result<Option<T>>;

    /// Advance `row` to the next record.
    ///
    /// On success every field of `row` is overwritten and the row is marked
    /// valid. At end of data, and on any error, the row is marked invalid.
    fn next<T: FromRow>(&mut self, row: &mut Row<T>) -> Result<()> {
        match self.fetch::<T>() {
            Ok(Some(fields)) => {
                row.assign(fields);
                Ok(())
            }
            Ok(None) => {
                row.invalidate();
                Ok(())
            }
            Err(e) => {
                row.invalidate();
                Err(e)
            }
        }
    }

    /// Fetch every remaining record.
    fn collect<T: FromRow>(&mut self) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Iterate over the remaining records.
    ///
    /// The iterator ends after end of data or after yielding the first error.
    fn rows<T: FromRow>(&mut self) -> Rows<'_, Self, T>
    where
        Self: Sized,
    {
        Rows {
            cursor: self,
            done: false,
            _row: PhantomData,
        }
    }
}

/// Iterator returned by [`RowCursor::rows`].
pub struct Rows<'a, C, T> {
    cursor: &'a mut C,
    done: bool,
    _row: PhantomData<fn() -> T>,
}

impl<C: RowCursor, T: FromRow> Iterator for Rows<'_, C, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.fetch() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<C: RowCursor, T: FromRow> FusedIterator for Rows<'_, C, T> {}
