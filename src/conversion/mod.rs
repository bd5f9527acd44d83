//! Type encoding and decoding for the text and binary protocols.
//!
//! Direct execution delivers every value as text, prepared execution as
//! fixed binary buffers. Both decode through [`FromColumn`]; parameters
//! encode through [`ToParam`].

mod bytes;
mod primitives;
mod string;
pub(crate) mod temporal;

#[cfg(feature = "with-chrono")]
mod chrono;

use zerocopy::FromBytes;

use crate::driver::{BindBuffer, ColumnInfo};
use crate::error::{Error, Result};
use crate::types::ColumnType;

/// A single column value as delivered by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell<'a> {
    /// SQL NULL
    Null,
    /// Text protocol: the value's textual representation
    Text(&'a [u8]),
    /// Binary protocol: the value's fixed buffer
    Binary(&'a [u8]),
}

impl<'a> Cell<'a> {
    /// Cell for a text-protocol field.
    pub fn text(value: Option<&'a [u8]>) -> Self {
        value.map_or(Cell::Null, Cell::Text)
    }

    /// Cell for a bound result buffer, honoring its null indicator.
    pub fn binary(buffer: &'a BindBuffer) -> Self {
        if buffer.is_null {
            Cell::Null
        } else {
            Cell::Binary(&buffer.data)
        }
    }
}

/// Decoding of one column value into a Rust type.
///
/// A value reaches the decoder in one of three shapes, see [`Cell`]. The
/// column metadata is passed along so that an incompatible column is
/// rejected with a message naming it rather than misread, and so that a
/// binary integer is read with the column's signedness.
pub trait FromColumn: Sized {
    /// Decode SQL NULL. Fails unless the type has a NULL representation.
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode the textual form sent by direct execution.
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self>;

    /// Decode from a binary buffer. Fixed-width values are little-endian.
    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self>;

    /// Decode a cell of either format.
    fn from_cell(column: &ColumnInfo, cell: Cell<'_>) -> Result<Self> {
        match cell {
            Cell::Null => Self::from_null(),
            Cell::Text(bytes) => Self::from_text(column, bytes),
            Cell::Binary(bytes) => Self::from_binary(column, bytes),
        }
    }
}

/// Trait for encoding Rust values into parameter buffers.
///
/// - `natural_type()` returns the column type this value naturally binds as
/// - `encode()` fills the buffer for a specific target type, with range
///   checking. A target of [`ColumnType::Null`] means the statement did not
///   declare a type, and the natural type is used.
pub trait ToParam {
    /// The column type this value naturally binds as.
    fn natural_type(&self) -> ColumnType;

    /// Encode this value for the given target type.
    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()>;
}

/// Trait for encoding a full parameter list.
pub trait ToParams {
    /// Number of parameters.
    fn param_count(&self) -> usize;

    /// Encode all parameters, one buffer each, against the statement's
    /// declared parameter types.
    fn encode(&self, targets: &[ColumnType], bufs: &mut Vec<BindBuffer>) -> Result<()>;
}

/// Resolve an undeclared target type to the value's natural type.
pub(crate) fn resolve_target(target: ColumnType, natural: ColumnType) -> ColumnType {
    if target == ColumnType::Null {
        natural
    } else {
        target
    }
}

/// Read a little-endian fixed-width value from a binary buffer.
pub(crate) fn read_le<T: FromBytes>(bytes: &[u8], what: &str) -> Result<T> {
    T::read_from_bytes(bytes)
        .map_err(|_| Error::Decode(format!("invalid {} length: {}", what, bytes.len())))
}

/// Validate text-protocol bytes as UTF-8.
pub(crate) fn text_str(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

// === Option<T> - NULL handling ===

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        T::from_text(column, bytes).map(Some)
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        T::from_binary(column, bytes).map(Some)
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn natural_type(&self) -> ColumnType {
        match self {
            Some(v) => v.natural_type(),
            None => ColumnType::Null,
        }
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        match self {
            Some(v) => v.encode(target, buf),
            None => {
                buf.column_type = target;
                buf.set_null();
                Ok(())
            }
        }
    }
}

// === Reference support ===

impl<T: ToParam + ?Sized> ToParam for &T {
    fn natural_type(&self) -> ColumnType {
        (*self).natural_type()
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        (*self).encode(target, buf)
    }
}

// === ToParams implementations ===

impl ToParams for () {
    fn param_count(&self) -> usize {
        0
    }

    fn encode(&self, _targets: &[ColumnType], bufs: &mut Vec<BindBuffer>) -> Result<()> {
        bufs.clear();
        Ok(())
    }
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn param_count(&self) -> usize {
        (*self).param_count()
    }

    fn encode(&self, targets: &[ColumnType], bufs: &mut Vec<BindBuffer>) -> Result<()> {
        (*self).encode(targets, bufs)
    }
}

// Tuple implementations via macro
macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToParam),+> ToParams for ($($T,)+) {
            fn param_count(&self) -> usize {
                $count
            }

            fn encode(&self, targets: &[ColumnType], bufs: &mut Vec<BindBuffer>) -> Result<()> {
                bufs.clear();
                $(
                    let target = targets.get($idx).copied().unwrap_or_default();
                    let mut buf = BindBuffer::default();
                    self.$idx.encode(target, &mut buf).map_err(|e| match e {
                        Error::ParameterBinding(msg) => {
                            Error::ParameterBinding(format!("parameter {}: {}", $idx, msg))
                        }
                        other => other,
                    })?;
                    bufs.push(buf);
                )+
                Ok(())
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_to_params!(9, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_to_params!(10, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_to_params!(11, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_to_params!(12, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);
