//! Primitive type implementations (bool, integers, floats).

use zerocopy::byteorder::{F32, F64, I16, I32, I64, LittleEndian as LE, U16, U32, U64};

use crate::driver::{BindBuffer, ColumnInfo};
use crate::error::{Error, Result};
use crate::types::ColumnType;

use super::{FromColumn, ToParam, read_le, resolve_target, text_str};

/// Read an integer column buffer with the column's signedness.
fn read_integer(column: &ColumnInfo, bytes: &[u8]) -> Result<i128> {
    let value = match (column.column_type, column.is_unsigned()) {
        (ColumnType::Tiny, false) => i128::from(i8::from_le_bytes(one_byte(bytes)?)),
        (ColumnType::Tiny, true) => i128::from(u8::from_le_bytes(one_byte(bytes)?)),
        (ColumnType::Short, false) => i128::from(read_le::<I16<LE>>(bytes, "SHORT")?.get()),
        (ColumnType::Short, true) => i128::from(read_le::<U16<LE>>(bytes, "SHORT")?.get()),
        (ColumnType::Long, false) => i128::from(read_le::<I32<LE>>(bytes, "LONG")?.get()),
        (ColumnType::Long, true) => i128::from(read_le::<U32<LE>>(bytes, "LONG")?.get()),
        (ColumnType::LongLong, false) => {
            i128::from(read_le::<I64<LE>>(bytes, "LONGLONG")?.get())
        }
        (ColumnType::LongLong, true) => {
            i128::from(read_le::<U64<LE>>(bytes, "LONGLONG")?.get())
        }
        (other, _) => {
            return Err(Error::Decode(format!(
                "cannot decode {:?} column as integer",
                other
            )));
        }
    };
    Ok(value)
}

fn one_byte(bytes: &[u8]) -> Result<[u8; 1]> {
    bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid TINY length: {}", bytes.len())))
}

fn check_numeric_text(column_type: ColumnType, rust_type: &str) -> Result<()> {
    if column_type.is_integer() || column_type == ColumnType::Decimal {
        Ok(())
    } else {
        Err(Error::Decode(format!(
            "cannot decode {:?} column as {}",
            column_type, rust_type
        )))
    }
}

/// Write one integer width: signed when the value fits, otherwise unsigned.
macro_rules! put_integer {
    ($buf:expr, $target:expr, $value:expr, $signed:ty, $unsigned:ty, $overflow:expr) => {
        match <$signed>::try_from($value) {
            Ok(v) => $buf.set($target, &v.to_le_bytes()),
            Err(_) => {
                let v = <$unsigned>::try_from($value).map_err(|_| $overflow())?;
                $buf.set_unsigned($target, &v.to_le_bytes());
            }
        }
    };
}

/// Write an integer into a parameter buffer of the target type, range checked.
fn encode_integer(value: i128, from: &str, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
    let overflow = || Error::overflow(from, target);
    match target {
        ColumnType::Tiny => put_integer!(buf, target, value, i8, u8, overflow),
        ColumnType::Short => put_integer!(buf, target, value, i16, u16, overflow),
        ColumnType::Long => put_integer!(buf, target, value, i32, u32, overflow),
        ColumnType::LongLong => put_integer!(buf, target, value, i64, u64, overflow),
        ColumnType::Decimal => {
            buf.set(target, value.to_string().as_bytes());
        }
        _ => {
            return Err(Error::ParameterBinding(format!(
                "cannot bind {} value to a {:?} parameter",
                from, target
            )));
        }
    }
    Ok(())
}

// === Boolean ===

impl FromColumn for bool {
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        check_numeric_text(column.column_type, "bool")?;
        match bytes {
            b"1" | b"t" | b"true" | b"TRUE" => Ok(true),
            b"0" | b"f" | b"false" | b"FALSE" => Ok(false),
            _ => text_str(bytes)?
                .parse::<i64>()
                .map(|v| v != 0)
                .map_err(|_| {
                    Error::Decode(format!(
                        "invalid boolean: {:?}",
                        String::from_utf8_lossy(bytes)
                    ))
                }),
        }
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        read_integer(column, bytes).map(|v| v != 0)
    }
}

impl ToParam for bool {
    fn natural_type(&self) -> ColumnType {
        ColumnType::Tiny
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        let target = resolve_target(target, self.natural_type());
        if !target.is_integer() {
            return Err(Error::type_mismatch(self.natural_type(), target));
        }
        encode_integer(i128::from(*self), "bool", target, buf)
    }
}

// === Integer types ===

macro_rules! impl_integer {
    ($($t:ty => $natural:ident);+ $(;)?) => {
        $(
            impl FromColumn for $t {
                fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
                    check_numeric_text(column.column_type, stringify!($t))?;
                    text_str(bytes)?
                        .parse()
                        .map_err(|e| Error::Decode(format!("invalid {}: {}", stringify!($t), e)))
                }

                fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
                    if column.column_type == ColumnType::Decimal {
                        return Self::from_text(column, bytes);
                    }
                    let value = read_integer(column, bytes)?;
                    <$t>::try_from(value).map_err(|_| {
                        Error::Decode(format!(
                            "{:?} value {} out of range for {}",
                            column.column_type, value, stringify!($t)
                        ))
                    })
                }
            }

            impl ToParam for $t {
                fn natural_type(&self) -> ColumnType {
                    ColumnType::$natural
                }

                fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
                    let target = resolve_target(target, self.natural_type());
                    encode_integer(i128::from(*self), stringify!($t), target, buf)
                }
            }
        )+
    };
}

impl_integer! {
    i8 => Tiny;
    i16 => Short;
    i32 => Long;
    i64 => LongLong;
    u8 => Short;
    u16 => Long;
    u32 => LongLong;
    u64 => LongLong;
}

// === Floating point ===

impl FromColumn for f32 {
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        if !matches!(column.column_type, ColumnType::Float | ColumnType::Decimal) {
            return Err(Error::Decode(format!(
                "cannot decode {:?} column as f32",
                column.column_type
            )));
        }
        text_str(bytes)?
            .parse()
            .map_err(|e| Error::Decode(format!("invalid f32: {}", e)))
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        match column.column_type {
            ColumnType::Float => Ok(read_le::<F32<LE>>(bytes, "FLOAT")?.get()),
            ColumnType::Decimal => Self::from_text(column, bytes),
            other => Err(Error::Decode(format!(
                "cannot decode {:?} column as f32",
                other
            ))),
        }
    }
}

impl FromColumn for f64 {
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        if !matches!(
            column.column_type,
            ColumnType::Float | ColumnType::Double | ColumnType::Decimal
        ) {
            return Err(Error::Decode(format!(
                "cannot decode {:?} column as f64",
                column.column_type
            )));
        }
        text_str(bytes)?
            .parse()
            .map_err(|e| Error::Decode(format!("invalid f64: {}", e)))
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        match column.column_type {
            ColumnType::Float => Ok(f64::from(read_le::<F32<LE>>(bytes, "FLOAT")?.get())),
            ColumnType::Double => Ok(read_le::<F64<LE>>(bytes, "DOUBLE")?.get()),
            ColumnType::Decimal => Self::from_text(column, bytes),
            other => Err(Error::Decode(format!(
                "cannot decode {:?} column as f64",
                other
            ))),
        }
    }
}

impl ToParam for f32 {
    fn natural_type(&self) -> ColumnType {
        ColumnType::Float
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        match resolve_target(target, self.natural_type()) {
            ColumnType::Float => buf.set(ColumnType::Float, &self.to_le_bytes()),
            ColumnType::Double => buf.set(ColumnType::Double, &f64::from(*self).to_le_bytes()),
            other => return Err(Error::type_mismatch(self.natural_type(), other)),
        }
        Ok(())
    }
}

impl ToParam for f64 {
    fn natural_type(&self) -> ColumnType {
        ColumnType::Double
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        match resolve_target(target, self.natural_type()) {
            ColumnType::Double => buf.set(ColumnType::Double, &self.to_le_bytes()),
            ColumnType::Decimal => buf.set(ColumnType::Decimal, self.to_string().as_bytes()),
            other => return Err(Error::type_mismatch(self.natural_type(), other)),
        }
        Ok(())
    }
}
