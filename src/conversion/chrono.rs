//! Chrono crate type implementations (NaiveDate, NaiveDateTime).

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use zerocopy::IntoBytes;
use zerocopy::byteorder::{U16, U32};

use crate::driver::{BindBuffer, ColumnInfo};
use crate::error::{Error, Result};
use crate::types::ColumnType;

use super::temporal::{BinaryDate, BinaryDateTime};
use super::{FromColumn, ToParam, read_le, resolve_target, text_str};

fn pack_date(date: NaiveDate) -> Result<BinaryDate> {
    let year = u16::try_from(date.year())
        .map_err(|_| Error::ParameterBinding(format!("year out of range: {}", date.year())))?;
    Ok(BinaryDate {
        year: U16::new(year),
        month: date.month() as u8,
        day: date.day() as u8,
    })
}

fn unpack_date(raw: BinaryDate) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::from(raw.year.get()),
        u32::from(raw.month),
        u32::from(raw.day),
    )
    .ok_or_else(|| Error::Decode("invalid date".into()))
}

fn decode_binary_datetime(column_type: ColumnType, bytes: &[u8]) -> Result<NaiveDateTime> {
    match column_type {
        ColumnType::Date => Ok(unpack_date(read_le::<BinaryDate>(bytes, "DATE")?)?
            .and_time(NaiveTime::MIN)),
        ColumnType::DateTime => {
            let raw = read_le::<BinaryDateTime>(bytes, "DATETIME")?;
            let time = NaiveTime::from_hms_micro_opt(
                u32::from(raw.hour),
                u32::from(raw.minute),
                u32::from(raw.second),
                raw.microsecond.get(),
            )
            .ok_or_else(|| Error::Decode("invalid time".into()))?;
            Ok(unpack_date(raw.date)?.and_time(time))
        }
        _ => Err(Error::Decode(format!(
            "cannot decode {:?} column as date/time",
            column_type
        ))),
    }
}

impl FromColumn for NaiveDate {
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        match column.column_type {
            ColumnType::Date => NaiveDate::parse_from_str(text_str(bytes)?, "%Y-%m-%d")
                .map_err(|e| Error::Decode(format!("invalid date: {}", e))),
            ColumnType::DateTime => NaiveDateTime::from_text(column, bytes).map(|dt| dt.date()),
            other => Err(Error::Decode(format!(
                "cannot decode {:?} column as NaiveDate",
                other
            ))),
        }
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        decode_binary_datetime(column.column_type, bytes).map(|dt| dt.date())
    }
}

impl FromColumn for NaiveDateTime {
    fn from_text(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        let s = text_str(bytes)?;
        match column.column_type {
            ColumnType::DateTime => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .map_err(|e| Error::Decode(format!("invalid datetime: {}", e))),
            ColumnType::Date => NaiveDate::from_text(column, bytes)
                .map(|d| d.and_time(NaiveTime::MIN)),
            other => Err(Error::Decode(format!(
                "cannot decode {:?} column as NaiveDateTime",
                other
            ))),
        }
    }

    fn from_binary(column: &ColumnInfo, bytes: &[u8]) -> Result<Self> {
        decode_binary_datetime(column.column_type, bytes)
    }
}

impl ToParam for NaiveDate {
    fn natural_type(&self) -> ColumnType {
        ColumnType::Date
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        match resolve_target(target, self.natural_type()) {
            ColumnType::Date => {
                buf.set(ColumnType::Date, pack_date(*self)?.as_bytes());
            }
            ColumnType::DateTime => {
                self.and_time(NaiveTime::MIN).encode(ColumnType::DateTime, buf)?;
            }
            other if other.is_string() => {
                buf.set(other, self.format("%Y-%m-%d").to_string().as_bytes());
            }
            other => return Err(Error::type_mismatch(self.natural_type(), other)),
        }
        Ok(())
    }
}

impl ToParam for NaiveDateTime {
    fn natural_type(&self) -> ColumnType {
        ColumnType::DateTime
    }

    fn encode(&self, target: ColumnType, buf: &mut BindBuffer) -> Result<()> {
        match resolve_target(target, self.natural_type()) {
            ColumnType::DateTime => {
                let raw = BinaryDateTime {
                    date: pack_date(self.date())?,
                    hour: self.hour() as u8,
                    minute: self.minute() as u8,
                    second: self.second() as u8,
                    microsecond: U32::new(self.nanosecond() / 1000),
                };
                buf.set(ColumnType::DateTime, raw.as_bytes());
            }
            other if other.is_string() => {
                buf.set(other, self.format("%Y-%m-%d %H:%M:%S%.6f").to_string().as_bytes());
            }
            other => return Err(Error::type_mismatch(self.natural_type(), other)),
        }
        Ok(())
    }
}
