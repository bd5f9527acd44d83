//! Boundary to the native client library.
//!
//! The traits here are the only primitives the typed layer needs from a
//! driver: connect, query, fetch, prepare, bind, execute, escape, close.
//! Closing is expressed through [`NativeResource::release`] and is driven by
//! [`NativeHandle`](crate::handle::NativeHandle).

pub mod memory;

use crate::error::Result;
use crate::handle::NativeResource;
use crate::opts::Opts;
use crate::types::ColumnType;

/// Entry point of a native driver.
pub trait Driver {
    /// Native connection resource.
    type Connection: RawConnection;

    /// Establish a connection.
    fn connect(&self, opts: &Opts) -> Result<Self::Connection>;
}

/// A native server connection.
pub trait RawConnection: NativeResource {
    /// Native result set produced by [`RawConnection::query`].
    type ResultSet: RawResultSet;
    /// Native prepared statement produced by [`RawConnection::prepare`].
    type Statement: RawStatement;

    /// Send a statement over the text protocol.
    ///
    /// Returns `None` for statements that produce no result set.
    fn query(&mut self, sql: &str) -> Result<Option<Self::ResultSet>>;

    /// Rows changed by the last statement.
    fn affected_rows(&self) -> u64;

    /// Identifier generated by the last statement, if it generated one.
    fn last_insert_id(&self) -> Option<u64>;

    /// Compile a statement for repeated execution.
    fn prepare(&mut self, sql: &str) -> Result<Self::Statement>;

    /// Escape a string for inclusion in a quoted SQL literal. Does not add quotes.
    fn escape(&self, text: &str) -> String;
}

/// A native text-protocol result set.
pub trait RawResultSet: NativeResource {
    /// Column metadata.
    fn columns(&self) -> &[ColumnInfo];

    /// Fetch the next record, or `None` at end of data.
    fn fetch_row(&mut self) -> Result<Option<RawRow<'_>>>;
}

/// A native prepared statement.
pub trait RawStatement: NativeResource {
    /// Native type of each `?` parameter, discovered at preparation.
    fn param_types(&self) -> &[ColumnType];

    /// Result column metadata, discovered at preparation. Empty for non-SELECT.
    fn columns(&self) -> &[ColumnInfo];

    /// Bind one buffer per parameter for the next execution.
    fn bind_params(&mut self, params: &[BindBuffer]) -> Result<()>;

    /// Execute with the currently bound parameters.
    fn execute(&mut self) -> Result<()>;

    /// Rows changed by the last execution.
    fn affected_rows(&self) -> u64;

    /// Identifier generated by the last execution, if it generated one.
    fn last_insert_id(&self) -> Option<u64>;

    /// Copy the next result record into `buffers`. Returns `false` at end of data.
    fn fetch_bound_row(&mut self, buffers: &mut [BindBuffer]) -> Result<bool>;

    /// Discard any unread result records.
    fn free_result(&mut self);
}

/// Column flag: NOT NULL.
pub const NOT_NULL_FLAG: u16 = 1;
/// Column flag: UNSIGNED.
pub const UNSIGNED_FLAG: u16 = 32;
/// Column flag: AUTO_INCREMENT.
pub const AUTO_INCREMENT_FLAG: u16 = 512;

/// Metadata of a result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name (or alias)
    pub name: String,
    /// Native type
    pub column_type: ColumnType,
    /// Bitmask of `*_FLAG` constants
    pub flags: u16,
}

impl ColumnInfo {
    /// Create column metadata with no flags.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            flags: 0,
        }
    }

    /// Add flags.
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.flags & NOT_NULL_FLAG == 0
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & UNSIGNED_FLAG != 0
    }

    pub fn is_auto_increment(&self) -> bool {
        self.flags & AUTO_INCREMENT_FLAG != 0
    }
}

/// One text-protocol record: a value (or NULL) per column.
#[derive(Debug, Clone)]
pub struct RawRow<'a> {
    fields: Vec<Option<&'a [u8]>>,
}

impl<'a> RawRow<'a> {
    pub fn new(fields: Vec<Option<&'a [u8]>>) -> Self {
        Self { fields }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw value at a position, `None` for NULL.
    pub fn get(&self, idx: usize) -> Option<&'a [u8]> {
        self.fields.get(idx).copied().flatten()
    }

    /// Iterate over the field values.
    pub fn iter(&self) -> impl Iterator<Item = Option<&'a [u8]>> + '_ {
        self.fields.iter().copied()
    }
}

/// A fixed binary-protocol buffer for one parameter or result column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindBuffer {
    /// Native type of the data
    pub column_type: ColumnType,
    /// Little-endian fixed-width value, or raw bytes for string types
    pub data: Vec<u8>,
    /// Null indicator
    pub is_null: bool,
    /// Integer data is unsigned
    pub is_unsigned: bool,
}

impl BindBuffer {
    /// An empty buffer for a column of the given type.
    pub fn for_type(column_type: ColumnType) -> Self {
        Self {
            column_type,
            data: Vec::with_capacity(column_type.fixed_width().unwrap_or(0)),
            is_null: false,
            is_unsigned: false,
        }
    }

    /// A NULL value of the given type.
    pub fn null(column_type: ColumnType) -> Self {
        Self {
            column_type,
            data: Vec::new(),
            is_null: true,
            is_unsigned: false,
        }
    }

    /// Replace the contents with a non-NULL value.
    pub fn set(&mut self, column_type: ColumnType, data: &[u8]) {
        self.column_type = column_type;
        self.data.clear();
        self.data.extend_from_slice(data);
        self.is_null = false;
        self.is_unsigned = false;
    }

    /// Replace the contents with an unsigned integer value.
    pub fn set_unsigned(&mut self, column_type: ColumnType, data: &[u8]) {
        self.set(column_type, data);
        self.is_unsigned = true;
    }

    /// Mark as NULL.
    pub fn set_null(&mut self) {
        self.data.clear();
        self.is_null = true;
    }

    /// Length of the value in bytes.
    pub fn length(&self) -> usize {
        self.data.len()
    }
}

/// Native result set type of a driver.
pub type ResultSetOf<D> = <<D as Driver>::Connection as RawConnection>::ResultSet;

/// Native prepared statement type of a driver.
pub type StatementOf<D> = <<D as Driver>::Connection as RawConnection>::Statement;
