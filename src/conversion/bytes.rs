//! Byte type implementations (`&[u8]`, `Vec<u8>`).

use crate::driver::{BindBuffer, ColumnInfo};
use crate::error::{Error, Result};
use crate::types::ColumnType;

use super::{FromColumn, ToParam, resolve_target};

impl FromColumn for Vec<u8> {
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        Self::from_binary(column, bytes)
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        if !column.column_type.is_string() {
            return Err(Error::Decode(format!(
                "cannot decode {:?} column as Vec<u8>",
                column.column_type
            )));
        }
        Ok(bytes.to_vec())
    }
}

impl ToParam for [u8] {
    fn natural_type(&self) -> ColumnType {
        ColumnType::Blob
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        let target = resolve_target(target, self.natural_type());
        if !target.is_string() {
            return Err(Error::type_mismatch(self.natural_type(), target));
        }
        buf.set(target, self);
        Ok(())
    }
}

impl ToParam for Vec<u8> {
    fn natural_type(&self) -> ColumnType {
        self.as_slice().natural_type()
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        self.as_slice().encode(target, buf)
    }
}
