//! Row decoding traits and implementations.
//!
//! Decoding is positional: the Nth field of a row type receives the Nth
//! column of the result. The result must have exactly as many columns as
//! the row type declares.

use crate::conversion::{Cell, FromColumn};
use crate::driver::ColumnInfo;
use crate::error::{Error, Result};

/// Trait for decoding a result record into a Rust type.
///
/// Implemented for tuples up to 12 elements. Application structs implement
/// it by calling [`decode_column`] once per field, in select order:
///
/// ```
/// use sqlbind::conversion::Cell;
/// use sqlbind::driver::ColumnInfo;
/// use sqlbind::row::{FromRow, decode_column};
///
/// struct Sample {
///     alpha: Option<i64>,
///     beta: Option<String>,
/// }
///
/// impl FromRow for Sample {
///     const COLUMNS: usize = 2;
///
///     fn from_cells(cols: &[ColumnInfo], cells: &[Cell<'_>]) -> sqlbind::Result<Self> {
///         Ok(Self {
///             alpha: decode_column(cols, cells, 0)?,
///             beta: decode_column(cols, cells, 1)?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Number of fields, which must equal the result's column count.
    const COLUMNS: usize;

    /// Decode from one cell per column. The column count has already been checked.
    fn from_cells(cols: &[ColumnInfo], cells: &[Cell<'_>]) -> Result<Self>;
}

/// Check the column count, then decode.
pub(crate) fn decode_row<T: FromRow>(cols: &[ColumnInfo], cells: &[Cell<'_>]) -> Result<T> {
    if cells.len() != T::COLUMNS || cols.len() != cells.len() {
        return Err(Error::Decode(format!(
            "column count mismatch: row has {} fields, result has {} columns",
            T::COLUMNS,
            cells.len()
        )));
    }
    T::from_cells(cols, cells)
}

/// Decode the column at `idx`.
///
/// A NULL into a type without a NULL representation, a type mismatch, or a
/// missing column is a decode error naming the column.
pub fn decode_column<T: FromColumn>(cols: &[ColumnInfo], cells: &[Cell<'_>], idx: usize) -> Result<T> {
    let (Some(col), Some(cell)) = (cols.get(idx), cells.get(idx)) else {
        return Err(Error::Decode(format!("no column at position {}", idx)));
    };
    T::from_cell(col, *cell).map_err(|e| match e {
        Error::Decode(msg) => Error::Decode(format!("column {} ({}): {}", idx, col.name, msg)),
        other => other,
    })
}

/// Typed row fields plus a validity flag.
///
/// A valid row holds the values of the most recent fetch. An invalid row marks
/// end of data; its fields keep whatever they held before and carry no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row<T> {
    fields: T,
    valid: bool,
}

impl<T> Row<T> {
    /// An invalid row with the given initial fields.
    pub fn new(fields: T) -> Self {
        Self {
            fields,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The fields, or `None` if the row is invalid.
    pub fn get(&self) -> Option<&T> {
        self.valid.then_some(&self.fields)
    }

    /// The fields regardless of validity.
    pub fn fields(&self) -> &T {
        &self.fields
    }

    /// Take the fields if the row is valid.
    pub fn into_fields(self) -> Option<T> {
        self.valid.then_some(self.fields)
    }

    /// Overwrite every field and mark the row valid.
    pub fn assign(&mut self, fields: T) {
        self.fields = fields;
        self.valid = true;
    }

    /// Mark the row invalid without touching the fields.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

// === Tuple implementations ===

/// Implementation for empty tuple - used for statements that don't return rows
impl FromRow for () {
    const COLUMNS: usize = 0;

    fn from_cells(_cols: &[ColumnInfo], _cells: &[Cell<'_>]) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_from_row_tuple {
    ($count:literal: $($idx:tt => $T:ident),+) => {
        impl<$($T: FromColumn),+> FromRow for ($($T,)+) {
            const COLUMNS: usize = $count;

            fn from_cells(cols: &[ColumnInfo], cells: &[Cell<'_>]) -> Result<Self> {
                Ok(($(
                    decode_column::<$T>(cols, cells, $idx)?,
                )+))
            }
        }
    };
}

impl_from_row_tuple!(1: 0 => T1);
impl_from_row_tuple!(2: 0 => T1, 1 => T2);
impl_from_row_tuple!(3: 0 => T1, 1 => T2, 2 => T3);
impl_from_row_tuple!(4: 0 => T1, 1 => T2, 2 => T3, 3 => T4);
impl_from_row_tuple!(5: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5);
impl_from_row_tuple!(6: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6);
impl_from_row_tuple!(7: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7);
impl_from_row_tuple!(8: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8);
impl_from_row_tuple!(9: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9);
impl_from_row_tuple!(10: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9, 9 => T10);
impl_from_row_tuple!(11: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9, 9 => T10, 10 => T11);
impl_from_row_tuple!(12: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9, 9 => T10, 10 => T11, 11 => T12);
