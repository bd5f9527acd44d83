//! Packed DATE/DATETIME buffers of the binary protocol.
//!
//! A DATE buffer is 4 bytes (year, month, day); a DATETIME buffer appends
//! hour, minute, second and a 4-byte microsecond count. The text forms are
//! `YYYY-MM-DD` and `YYYY-MM-DD HH:MM:SS[.ffffff]`.

use zerocopy::byteorder::{LittleEndian as LE, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};
use crate::types::ColumnType;

use super::read_le;

/// Binary DATE buffer (4 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub(crate) struct BinaryDate {
    pub(crate) year: U16<LE>,
    pub(crate) month: u8,
    pub(crate) day: u8,
}

/// Binary DATETIME buffer (11 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub(crate) struct BinaryDateTime {
    pub(crate) date: BinaryDate,
    pub(crate) hour: u8,
    pub(crate) minute: u8,
    pub(crate) second: u8,
    pub(crate) microsecond: U32<LE>,
}

impl BinaryDate {
    fn format(self) -> String {
        let year = self.year.get();
        format!("{:04}-{:02}-{:02}", year, self.month, self.day)
    }
}

impl BinaryDateTime {
    fn format(self) -> String {
        let micros = self.microsecond.get();
        let mut out = format!(
            "{} {:02}:{:02}:{:02}",
            self.date.format(),
            self.hour,
            self.minute,
            self.second
        );
        if micros != 0 {
            out.push_str(&format!(".{:06}", micros));
        }
        out
    }
}

/// A run of ASCII digits no greater than `max`.
fn field<T: TryFrom<u32>>(part: Option<&str>, max: u32) -> Option<T> {
    let part = part?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = part.parse().ok()?;
    if value > max {
        return None;
    }
    T::try_from(value).ok()
}

fn parse_date(text: &str) -> Option<BinaryDate> {
    let mut parts = text.split('-');
    let year: u16 = field(parts.next(), 9999)?;
    let month: u8 = field(parts.next(), 12)?;
    let day: u8 = field(parts.next(), 31)?;
    if parts.next().is_some() || month == 0 || day == 0 {
        return None;
    }
    Some(BinaryDate {
        year: U16::new(year),
        month,
        day,
    })
}

fn parse_datetime(text: &str) -> Option<BinaryDateTime> {
    let (date, time) = match text.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };
    let date = parse_date(date)?;
    let Some(time) = time else {
        return Some(BinaryDateTime {
            date,
            hour: 0,
            minute: 0,
            second: 0,
            microsecond: U32::new(0),
        });
    };
    let (clock, fraction) = match time.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (time, None),
    };
    let mut parts = clock.split(':');
    let hour: u8 = field(parts.next(), 23)?;
    let minute: u8 = field(parts.next(), 59)?;
    let second: u8 = field(parts.next(), 59)?;
    if parts.next().is_some() {
        return None;
    }
    let microsecond = match fraction {
        None => 0,
        Some(f) if (1..=6).contains(&f.len()) => {
            let digits: u32 = field(Some(f), 999_999)?;
            digits * 10_u32.pow(6 - f.len() as u32)
        }
        Some(_) => return None,
    };
    Some(BinaryDateTime {
        date,
        hour,
        minute,
        second,
        microsecond: U32::new(microsecond),
    })
}

/// Text form of a packed DATE or DATETIME buffer.
pub(crate) fn binary_to_text(column_type: ColumnType, bytes: &[u8]) -> Result<String> {
    match column_type {
        ColumnType::Date => Ok(read_le::<BinaryDate>(bytes, "DATE")?.format()),
        ColumnType::DateTime => Ok(read_le::<BinaryDateTime>(bytes, "DATETIME")?.format()),
        other => Err(Error::Decode(format!(
            "{:?} is not a date/time type",
            other
        ))),
    }
}

/// Packed buffer for the text form of a DATE or DATETIME value.
///
/// A DATE accepts only `YYYY-MM-DD`; a DATETIME also accepts a bare date.
pub(crate) fn text_to_binary(column_type: ColumnType, text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    match column_type {
        ColumnType::Date => parse_date(text).map(|d| d.as_bytes().to_vec()),
        ColumnType::DateTime => parse_datetime(text).map(|dt| dt.as_bytes().to_vec()),
        _ => None,
    }
}
