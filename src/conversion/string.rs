//! String type implementations (&str, String).

use crate::driver::{BindBuffer, ColumnInfo};
use crate::error::{Error, Result};
use crate::types::ColumnType;

use super::temporal::{binary_to_text, text_to_binary};
use super::{FromColumn, ToParam, resolve_target, text_str};

fn is_textual(column_type: ColumnType) -> bool {
    column_type.is_string() || column_type == ColumnType::Decimal
}

fn is_temporal(column_type: ColumnType) -> bool {
    matches!(column_type, ColumnType::Date | ColumnType::DateTime)
}

impl FromColumn for String {
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        if !is_textual(column.column_type) && !is_temporal(column.column_type) {
            return Err(Error::Decode(format!(
                "cannot decode {:?} column as String",
                column.column_type
            )));
        }
        text_str(bytes).map(str::to_owned)
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        match column.column_type {
            t if is_textual(t) => text_str(bytes).map(str::to_owned),
            // packed in the binary protocol
            t if is_temporal(t) => binary_to_text(t, bytes),
            other => Err(Error::Decode(format!(
                "cannot decode {:?} column as String",
                other
            ))),
        }
    }
}

impl ToParam for str {
    fn natural_type(&self) -> ColumnType {
        ColumnType::VarString
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        let target = resolve_target(target, self.natural_type());
        if is_textual(target) {
            buf.set(target, self.as_bytes());
        } else if is_temporal(target) {
            let packed = text_to_binary(target, self).ok_or_else(|| {
                Error::ParameterBinding(format!("invalid {:?} value: {:?}", target, self))
            })?;
            buf.set(target, &packed);
        } else {
            return Err(Error::type_mismatch(self.natural_type(), target));
        }
        Ok(())
    }
}

impl ToParam for String {
    fn natural_type(&self) -> ColumnType {
        self.as_str().natural_type()
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        self.as_str().encode(target, buf)
    }
}
