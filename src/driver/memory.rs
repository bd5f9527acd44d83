//! A scriptable in-memory driver.
//!
//! `MemoryServer` holds tables and a script per SQL text. It does not parse
//! SQL: each statement the application will send is registered up front with
//! a [`Script`] that says what it does. `?` parameters of prepared statements
//! are expressed as [`Operand::Param`].
//!
//! `START TRANSACTION`/`BEGIN`, `COMMIT` and `ROLLBACK` are built in. A
//! transaction snapshots every table; rollback restores the snapshot.
//!
//! Writes are checked the way a strict-mode server checks them: integers
//! must fit the column's width and signedness, DATE/DATETIME values must
//! parse. Dates are stored in their canonical text form and sent packed in
//! the binary protocol.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use tracing::warn;
use zerocopy::byteorder::{F32, F64, I16, I32, I64, LittleEndian as LE, U16, U32, U64};

use crate::conversion::read_le;
use crate::conversion::temporal::{binary_to_text, text_to_binary};
use crate::error::{CR_SERVER_LOST, Error, Result, ServerError};
use crate::handle::{NativeResource, RawId};
use crate::opts::Opts;
use crate::types::ColumnType;

use super::{BindBuffer, ColumnInfo, Driver, RawConnection, RawResultSet, RawRow, RawStatement};

const ER_PARSE_ERROR: u16 = 1064;
const ER_NO_SUCH_TABLE: u16 = 1146;
const ER_BAD_FIELD_ERROR: u16 = 1054;
const ER_BAD_NULL_ERROR: u16 = 1048;
const ER_TRUNCATED_WRONG_VALUE: u16 = 1366;
const ER_WARN_DATA_OUT_OF_RANGE: u16 = 1264;
const ER_WRONG_ARGUMENTS: u16 = 1210;
const CR_CONN_HOST_ERROR: u16 = 2003;

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    /// Unsigned values above `i64::MAX`
    UInt(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::from_integer(i128::from(v)).unwrap_or(Value::UInt(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Value {
    fn from_integer(v: i128) -> Option<Self> {
        match i64::try_from(v) {
            Ok(v) => Some(Value::Int(v)),
            Err(_) => u64::try_from(v).ok().map(Value::UInt),
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(i128::from(*v)),
            Value::UInt(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// SQL `=`: NULL never matches; numbers compare across Int/UInt/Double.
    fn sql_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Double(d), v) | (v, Value::Double(d)) => {
                v.as_integer().is_some_and(|i| (i as f64) == *d)
            }
            (Value::Text(a), Value::Bytes(b)) | (Value::Bytes(b), Value::Text(a)) => {
                a.as_bytes() == b.as_slice()
            }
            (a, b) => match (a.as_integer(), b.as_integer()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }

    fn render_text(&self) -> Option<Vec<u8>> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(v.to_string().into_bytes()),
            Value::UInt(v) => Some(v.to_string().into_bytes()),
            Value::Double(v) => Some(v.to_string().into_bytes()),
            Value::Text(v) => Some(v.as_bytes().to_vec()),
            Value::Bytes(v) => Some(v.clone()),
        }
    }

    fn render_binary(&self, col: &ColumnInfo, buf: &mut BindBuffer) -> Result<()> {
        let column_type = col.column_type;
        buf.column_type = column_type;
        match (self, column_type) {
            (Value::Null, _) => buf.set_null(),
            (v, t) if t.is_integer() => {
                let value = v.as_integer().ok_or_else(|| incorrect_value(v, col))?;
                render_integer(value, col, buf)?;
            }
            (Value::Double(v), ColumnType::Float) => {
                buf.set(column_type, &(*v as f32).to_le_bytes());
            }
            (Value::Double(v), ColumnType::Double) => buf.set(column_type, &v.to_le_bytes()),
            (Value::Text(text), ColumnType::Date | ColumnType::DateTime) => {
                let packed = text_to_binary(column_type, text)
                    .ok_or_else(|| incorrect_value(self, col))?;
                buf.set(column_type, &packed);
            }
            (other, _) => {
                let bytes = other.render_text().unwrap_or_default();
                buf.set(column_type, &bytes);
            }
        }
        Ok(())
    }

    /// Convert a bound parameter buffer into a stored value.
    fn from_param(buf: &BindBuffer) -> Result<Self> {
        if buf.is_null {
            return Ok(Value::Null);
        }
        let bytes = buf.data.as_slice();
        let integer = match (buf.column_type, buf.is_unsigned) {
            (ColumnType::Tiny, false) => match bytes {
                [b] => Some(i128::from(i8::from_le_bytes([*b]))),
                _ => return Err(wrong_arguments("invalid TINY parameter")),
            },
            (ColumnType::Tiny, true) => match bytes {
                [b] => Some(i128::from(*b)),
                _ => return Err(wrong_arguments("invalid TINY parameter")),
            },
            (ColumnType::Short, false) => Some(i128::from(read_le::<I16<LE>>(bytes, "SHORT")?.get())),
            (ColumnType::Short, true) => Some(i128::from(read_le::<U16<LE>>(bytes, "SHORT")?.get())),
            (ColumnType::Long, false) => Some(i128::from(read_le::<I32<LE>>(bytes, "LONG")?.get())),
            (ColumnType::Long, true) => Some(i128::from(read_le::<U32<LE>>(bytes, "LONG")?.get())),
            (ColumnType::LongLong, false) => {
                Some(i128::from(read_le::<I64<LE>>(bytes, "LONGLONG")?.get()))
            }
            (ColumnType::LongLong, true) => {
                Some(i128::from(read_le::<U64<LE>>(bytes, "LONGLONG")?.get()))
            }
            _ => None,
        };
        if let Some(v) = integer {
            return Value::from_integer(v).ok_or_else(|| wrong_arguments("integer out of range"));
        }
        let value = match buf.column_type {
            ColumnType::Float => Value::Double(f64::from(read_le::<F32<LE>>(bytes, "FLOAT")?.get())),
            ColumnType::Double => Value::Double(read_le::<F64<LE>>(bytes, "DOUBLE")?.get()),
            ColumnType::Blob => Value::Bytes(bytes.to_vec()),
            ColumnType::Date | ColumnType::DateTime => Value::Text(
                binary_to_text(buf.column_type, bytes)
                    .map_err(|_| wrong_arguments("invalid date/time parameter"))?,
            ),
            ColumnType::Null => return Err(wrong_arguments("untyped non-NULL parameter")),
            _ => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        };
        Ok(value)
    }

    /// Coerce a value into a column, as the server would on write.
    fn coerce(self, col: &ColumnInfo) -> Result<Self> {
        if self == Value::Null {
            if !col.is_nullable() && !col.is_auto_increment() {
                return Err(server_error(
                    ER_BAD_NULL_ERROR,
                    format!("Column '{}' cannot be null", col.name),
                ));
            }
            return Ok(Value::Null);
        }
        match col.column_type {
            t if t.is_integer() => {
                let value = match &self {
                    Value::Text(s) => s.trim().parse::<i128>().ok(),
                    other => other.as_integer(),
                }
                .ok_or_else(|| incorrect_value(&self, col))?;
                let (min, max) = integer_range(col);
                if value < min || value > max {
                    return Err(server_error(
                        ER_WARN_DATA_OUT_OF_RANGE,
                        format!("Out of range value for column '{}' at row 1", col.name),
                    ));
                }
                Value::from_integer(value).ok_or_else(|| incorrect_value(&self, col))
            }
            ColumnType::Float | ColumnType::Double => match self {
                Value::Double(_) => Ok(self),
                Value::Int(v) => Ok(Value::Double(v as f64)),
                Value::UInt(v) => Ok(Value::Double(v as f64)),
                Value::Text(ref s) => s
                    .trim()
                    .parse()
                    .map(Value::Double)
                    .map_err(|_| incorrect_value(&self, col)),
                ref other => Err(incorrect_value(other, col)),
            },
            ColumnType::Date | ColumnType::DateTime => {
                let text = match &self {
                    Value::Text(s) => Some(s.as_str()),
                    Value::Bytes(b) => simdutf8::compat::from_utf8(b).ok(),
                    _ => None,
                };
                // stored in canonical text form
                text.and_then(|t| text_to_binary(col.column_type, t))
                    .and_then(|packed| binary_to_text(col.column_type, &packed).ok())
                    .map(Value::Text)
                    .ok_or_else(|| incorrect_value(&self, col))
            }
            ColumnType::Blob => match self {
                Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
                other => Ok(other),
            },
            _ => match self {
                Value::Int(v) => Ok(Value::Text(v.to_string())),
                Value::UInt(v) => Ok(Value::Text(v.to_string())),
                Value::Double(v) => Ok(Value::Text(v.to_string())),
                Value::Bytes(b) => Ok(Value::Text(String::from_utf8_lossy(&b).into_owned())),
                other => Ok(other),
            },
        }
    }
}

/// Inclusive bounds of an integer column.
fn integer_range(col: &ColumnInfo) -> (i128, i128) {
    let bits = match col.column_type {
        ColumnType::Tiny => 8,
        ColumnType::Short => 16,
        ColumnType::Long => 32,
        _ => 64,
    };
    if col.is_unsigned() {
        (0, (1_i128 << bits) - 1)
    } else {
        (-(1_i128 << (bits - 1)), (1_i128 << (bits - 1)) - 1)
    }
}

/// Write an integer in the column's width and signedness.
fn render_integer(value: i128, col: &ColumnInfo, buf: &mut BindBuffer) -> Result<()> {
    let out_of_range = || {
        server_error(
            ER_WARN_DATA_OUT_OF_RANGE,
            format!("Out of range value for column '{}'", col.name),
        )
    };
    let column_type = col.column_type;
    let bytes = match (column_type, col.is_unsigned()) {
        (ColumnType::Tiny, false) => i8::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        (ColumnType::Tiny, true) => u8::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        (ColumnType::Short, false) => i16::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        (ColumnType::Short, true) => u16::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        (ColumnType::Long, false) => i32::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        (ColumnType::Long, true) => u32::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        (_, false) => i64::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
        (_, true) => u64::try_from(value).map_err(|_| out_of_range())?.to_le_bytes().to_vec(),
    };
    if col.is_unsigned() {
        buf.set_unsigned(column_type, &bytes);
    } else {
        buf.set(column_type, &bytes);
    }
    Ok(())
}

fn incorrect_value(value: &Value, col: &ColumnInfo) -> Error {
    server_error(
        ER_TRUNCATED_WRONG_VALUE,
        format!("Incorrect value {:?} for column '{}'", value, col.name),
    )
}

/// Right-hand side of an assignment or comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal value
    Value(Value),
    /// The n-th `?` parameter of a prepared statement
    Param(usize),
}

macro_rules! impl_operand_from {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::Value(v.into())
                }
            }
        )+
    };
}

impl_operand_from!(Value, i64, u64, bool, f64, &str, Vec<u8>);

/// `column = operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operand: Operand,
}

/// What a registered statement does.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    /// Succeeds without effect (DDL, SET, ...)
    Noop,
    Select {
        table: String,
        columns: Vec<String>,
        filter: Option<Filter>,
    },
    Insert {
        table: String,
        values: Vec<(String, Operand)>,
    },
    Update {
        table: String,
        set: Vec<(String, Operand)>,
        filter: Option<Filter>,
    },
    Delete {
        table: String,
        filter: Option<Filter>,
    },
}

impl Script {
    pub fn select(table: &str, columns: &[&str]) -> Self {
        Script::Select {
            table: table.into(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            filter: None,
        }
    }

    pub fn insert<O: Into<Operand>>(table: &str, values: impl IntoIterator<Item = (&'static str, O)>) -> Self {
        Script::Insert {
            table: table.into(),
            values: values.into_iter().map(|(c, v)| (c.to_owned(), v.into())).collect(),
        }
    }

    pub fn update<O: Into<Operand>>(table: &str, set: impl IntoIterator<Item = (&'static str, O)>) -> Self {
        Script::Update {
            table: table.into(),
            set: set.into_iter().map(|(c, v)| (c.to_owned(), v.into())).collect(),
            filter: None,
        }
    }

    pub fn delete(table: &str) -> Self {
        Script::Delete {
            table: table.into(),
            filter: None,
        }
    }

    /// Restrict a select, update or delete to rows where `column = operand`.
    pub fn filter(mut self, column: &str, operand: impl Into<Operand>) -> Self {
        let new = Some(Filter {
            column: column.into(),
            operand: operand.into(),
        });
        match &mut self {
            Script::Select { filter, .. }
            | Script::Update { filter, .. }
            | Script::Delete { filter, .. } => *filter = new,
            Script::Noop | Script::Insert { .. } => {}
        }
        self
    }

    fn table(&self) -> Option<&str> {
        match self {
            Script::Noop => None,
            Script::Select { table, .. }
            | Script::Insert { table, .. }
            | Script::Update { table, .. }
            | Script::Delete { table, .. } => Some(table),
        }
    }

    /// Every `(column, operand)` pair the script reads or writes.
    fn operands(&self) -> Vec<(&str, &Operand)> {
        let mut out: Vec<(&str, &Operand)> = Vec::new();
        match self {
            Script::Noop => {}
            Script::Insert { values, .. } => {
                out.extend(values.iter().map(|(c, o)| (c.as_str(), o)));
            }
            Script::Update { set, .. } => {
                out.extend(set.iter().map(|(c, o)| (c.as_str(), o)));
            }
            Script::Select { .. } | Script::Delete { .. } => {}
        }
        if let Script::Select { filter: Some(f), .. }
        | Script::Update { filter: Some(f), .. }
        | Script::Delete { filter: Some(f), .. } = self
        {
            out.push((f.column.as_str(), &f.operand));
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    next_id: i64,
}

impl Table {
    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| server_error(ER_BAD_FIELD_ERROR, format!("Unknown column '{}' in 'field list'", name)))
    }
}

fn row_matches(row: &[Value], filter: Option<(usize, &Value)>) -> bool {
    match filter {
        None => true,
        Some((idx, value)) => row.get(idx).is_some_and(|v| v.sql_eq(value)),
    }
}

/// Effect of one executed statement.
#[derive(Debug, Default)]
struct Outcome {
    columns: Vec<ColumnInfo>,
    rows: Option<Vec<Vec<Value>>>,
    affected: u64,
    insert_id: Option<u64>,
}

#[derive(Debug, Default)]
struct ServerState {
    tables: BTreeMap<String, Table>,
    scripts: HashMap<String, Script>,
    failures: HashMap<String, ServerError>,
    snapshot: Option<BTreeMap<String, Table>>,
    fetch_failure: Option<ServerError>,
    refuse_connections: bool,
    link_lost: bool,
    next_id: RawId,
    open: BTreeSet<RawId>,
    connections: BTreeSet<RawId>,
    double_releases: u32,
    log: Vec<String>,
}

fn server_error(code: u16, message: impl Into<String>) -> Error {
    Error::Query(ServerError::new(code, message))
}

fn wrong_arguments(message: &str) -> Error {
    server_error(
        ER_WRONG_ARGUMENTS,
        format!("Incorrect arguments to mysqld_stmt_execute: {}", message),
    )
}

fn lost_link() -> Error {
    Error::Connection(format!(
        "ERROR {}: Lost connection to MySQL server during query",
        CR_SERVER_LOST
    ))
}

impl ServerState {
    fn allocate(&mut self) -> RawId {
        self.next_id += 1;
        self.open.insert(self.next_id);
        self.next_id
    }

    fn release(&mut self, id: RawId) {
        if !self.open.remove(&id) {
            warn!(resource_id = id, "release of a resource that is not open");
            self.double_releases += 1;
        }
        self.connections.remove(&id);
    }

    fn check_link(&self, connection_id: RawId) -> Result<()> {
        if self.link_lost {
            return Err(lost_link());
        }
        if !self.connections.contains(&connection_id) {
            return Err(Error::Connection("connection is closed".into()));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| server_error(ER_NO_SUCH_TABLE, format!("Table '{}' doesn't exist", name)))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| server_error(ER_NO_SUCH_TABLE, format!("Table '{}' doesn't exist", name)))
    }

    /// Text-protocol entry: built-ins, failures, then the registered script.
    fn query(&mut self, sql: &str) -> Result<Outcome> {
        self.log.push(sql.to_owned());
        if let Some(err) = self.failures.get(sql) {
            return Err(Error::Query(err.clone()));
        }
        match sql.trim().to_ascii_uppercase().as_str() {
            "START TRANSACTION" | "BEGIN" => {
                self.snapshot = Some(self.tables.clone());
                return Ok(Outcome::default());
            }
            "COMMIT" => {
                self.snapshot = None;
                return Ok(Outcome::default());
            }
            "ROLLBACK" => {
                if let Some(tables) = self.snapshot.take() {
                    self.tables = tables;
                }
                return Ok(Outcome::default());
            }
            _ => {}
        }
        let script = self.script(sql)?.clone();
        self.run(&script, &[])
    }

    fn script(&self, sql: &str) -> Result<&Script> {
        self.scripts.get(sql).ok_or_else(|| {
            server_error(
                ER_PARSE_ERROR,
                format!("You have an error in your SQL syntax near '{}'", sql),
            )
        })
    }

    fn run(&mut self, script: &Script, params: &[Value]) -> Result<Outcome> {
        let resolve = |operand: &Operand| -> Result<Value> {
            match operand {
                Operand::Value(v) => Ok(v.clone()),
                Operand::Param(idx) => params
                    .get(*idx)
                    .cloned()
                    .ok_or_else(|| wrong_arguments("parameter not bound")),
            }
        };
        let resolve_filter = |table: &Table, filter: &Option<Filter>| -> Result<Option<(usize, Value)>> {
            filter
                .as_ref()
                .map(|f| Ok((table.column_index(&f.column)?, resolve(&f.operand)?)))
                .transpose()
        };

        match script {
            Script::Noop => Ok(Outcome::default()),
            Script::Select {
                table,
                columns,
                filter,
            } => {
                let table = self.table(table)?;
                let indices = columns
                    .iter()
                    .map(|c| table.column_index(c))
                    .collect::<Result<Vec<_>>>()?;
                let filter = resolve_filter(table, filter)?;
                let rows = table
                    .rows
                    .iter()
                    .filter(|row| row_matches(row, filter.as_ref().map(|(i, v)| (*i, v))))
                    .map(|row| {
                        indices
                            .iter()
                            .map(|i| row.get(*i).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
                Ok(Outcome {
                    columns: indices
                        .iter()
                        .filter_map(|i| table.columns.get(*i).cloned())
                        .collect(),
                    rows: Some(rows),
                    ..Outcome::default()
                })
            }
            Script::Insert { table, values } => {
                let resolved = values
                    .iter()
                    .map(|(c, o)| Ok((c.as_str(), resolve(o)?)))
                    .collect::<Result<Vec<_>>>()?;
                let table = self.table_mut(table)?;
                let mut row = vec![Value::Null; table.columns.len()];
                for (name, value) in resolved {
                    let idx = table.column_index(name)?;
                    if let (Some(slot), Some(col)) = (row.get_mut(idx), table.columns.get(idx)) {
                        *slot = value.coerce(col)?;
                    }
                }
                let mut insert_id = None;
                for (slot, col) in row.iter_mut().zip(&table.columns) {
                    if !col.is_auto_increment() {
                        if *slot == Value::Null && !col.is_nullable() {
                            return Err(server_error(
                                ER_BAD_NULL_ERROR,
                                format!("Field '{}' doesn't have a default value", col.name),
                            ));
                        }
                        continue;
                    }
                    match slot {
                        Value::Null => {
                            table.next_id += 1;
                            *slot = Value::Int(table.next_id);
                            insert_id = u64::try_from(table.next_id).ok();
                        }
                        Value::Int(v) => table.next_id = table.next_id.max(*v),
                        _ => {}
                    }
                }
                table.rows.push(row);
                Ok(Outcome {
                    affected: 1,
                    insert_id,
                    ..Outcome::default()
                })
            }
            Script::Update { table, set, filter } => {
                let resolved = set
                    .iter()
                    .map(|(c, o)| Ok((c.as_str(), resolve(o)?)))
                    .collect::<Result<Vec<_>>>()?;
                let table = self.table_mut(table)?;
                let filter = resolve_filter(table, filter)?;
                let assignments = resolved
                    .into_iter()
                    .map(|(name, value)| {
                        let idx = table.column_index(name)?;
                        let col = table.columns.get(idx).cloned().unwrap_or_else(|| ColumnInfo::new(name, ColumnType::Null));
                        Ok((idx, value.coerce(&col)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let filter_ref = filter.as_ref().map(|(i, v)| (*i, v));
                let mut affected = 0;
                let matching: Vec<usize> = table
                    .rows
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| row_matches(row, filter_ref))
                    .map(|(i, _)| i)
                    .collect();
                for row_idx in matching {
                    let Some(row) = table.rows.get_mut(row_idx) else {
                        continue;
                    };
                    let mut changed = false;
                    for (idx, value) in &assignments {
                        if let Some(slot) = row.get_mut(*idx).filter(|slot| **slot != *value) {
                            *slot = value.clone();
                            changed = true;
                        }
                    }
                    if changed {
                        affected += 1;
                    }
                }
                Ok(Outcome {
                    affected,
                    ..Outcome::default()
                })
            }
            Script::Delete { table, filter } => {
                let table = self.table_mut(table)?;
                let filter = resolve_filter(table, filter)?;
                let before = table.rows.len();
                let filter_ref = filter.as_ref().map(|(i, v)| (*i, v));
                table.rows.retain(|row| !row_matches(row, filter_ref));
                Ok(Outcome {
                    affected: (before - table.rows.len()) as u64,
                    ..Outcome::default()
                })
            }
        }
    }

    /// Parameter types and result columns of a script, as a server reports them at prepare.
    fn describe(&self, script: &Script) -> Result<(Vec<ColumnType>, Vec<ColumnInfo>)> {
        let Some(table_name) = script.table() else {
            return Ok((Vec::new(), Vec::new()));
        };
        let table = self.table(table_name)?;
        let mut params: Vec<ColumnType> = Vec::new();
        for (column, operand) in script.operands() {
            let col = table.columns.get(table.column_index(column)?);
            if let (Operand::Param(idx), Some(col)) = (operand, col) {
                if params.len() <= *idx {
                    params.resize(*idx + 1, ColumnType::Null);
                }
                if let Some(slot) = params.get_mut(*idx) {
                    *slot = col.column_type;
                }
            }
        }
        let columns = match script {
            Script::Select { columns, .. } => columns
                .iter()
                .map(|c| Ok(table.columns.get(table.column_index(c)?).cloned()))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect(),
            _ => Vec::new(),
        };
        Ok((params, columns))
    }
}

/// Handle to an in-memory server shared by the driver, the resources it
/// hands out, and the test that inspects it.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Rc<RefCell<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, name: &str, columns: Vec<ColumnInfo>) {
        self.state.borrow_mut().tables.insert(
            name.to_owned(),
            Table {
                columns,
                rows: Vec::new(),
                next_id: 0,
            },
        );
    }

    /// Register what a SQL text does.
    pub fn script(&self, sql: &str, script: Script) {
        self.state.borrow_mut().scripts.insert(sql.to_owned(), script);
    }

    /// Make every execution of `sql` fail with `error` until cleared.
    pub fn fail_statement(&self, sql: &str, error: ServerError) {
        self.state.borrow_mut().failures.insert(sql.to_owned(), error);
    }

    pub fn clear_failure(&self, sql: &str) {
        self.state.borrow_mut().failures.remove(sql);
    }

    /// Make row fetches fail (`Some`) or succeed again (`None`).
    pub fn fail_fetches(&self, error: Option<ServerError>) {
        self.state.borrow_mut().fetch_failure = error;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.borrow_mut().refuse_connections = refuse;
    }

    /// Simulate a lost network link. Every operation fails until restored.
    pub fn drop_link(&self) {
        self.state.borrow_mut().link_lost = true;
    }

    pub fn restore_link(&self) {
        self.state.borrow_mut().link_lost = false;
    }

    /// Number of native resources currently open.
    pub fn open_resources(&self) -> usize {
        self.state.borrow().open.len()
    }

    /// Number of release calls for resources that were not open.
    pub fn double_releases(&self) -> u32 {
        self.state.borrow().double_releases
    }

    /// Every statement text received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Current (possibly uncommitted) rows of a table.
    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.state
            .borrow()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn release(&self, id: RawId) {
        self.state.borrow_mut().release(id);
    }
}

/// Driver backed by a [`MemoryServer`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    server: MemoryServer,
}

impl MemoryDriver {
    pub fn new(server: MemoryServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &MemoryServer {
        &self.server
    }
}

impl Driver for MemoryDriver {
    type Connection = MemoryConnection;

    fn connect(&self, opts: &Opts) -> Result<MemoryConnection> {
        let mut state = self.server.state.borrow_mut();
        if state.refuse_connections || state.link_lost {
            return Err(Error::Connection(format!(
                "ERROR {}: Can't connect to MySQL server on '{}'",
                CR_CONN_HOST_ERROR,
                opts.endpoint()
            )));
        }
        let id = state.allocate();
        state.connections.insert(id);
        drop(state);
        Ok(MemoryConnection {
            server: self.server.clone(),
            id,
            affected: 0,
            insert_id: None,
        })
    }
}

/// Native connection of the in-memory driver.
#[derive(Debug)]
pub struct MemoryConnection {
    server: MemoryServer,
    id: RawId,
    affected: u64,
    insert_id: Option<u64>,
}

impl NativeResource for MemoryConnection {
    fn raw_id(&self) -> RawId {
        self.id
    }

    fn release(&mut self) {
        self.server.release(self.id);
    }
}

impl RawConnection for MemoryConnection {
    type ResultSet = MemoryResultSet;
    type Statement = MemoryStatement;

    fn query(&mut self, sql: &str) -> Result<Option<MemoryResultSet>> {
        let mut state = self.server.state.borrow_mut();
        state.check_link(self.id)?;
        let outcome = state.query(sql)?;
        self.affected = outcome.affected;
        self.insert_id = outcome.insert_id;
        let Some(rows) = outcome.rows else {
            return Ok(None);
        };
        let id = state.allocate();
        drop(state);
        Ok(Some(MemoryResultSet {
            server: self.server.clone(),
            id,
            columns: outcome.columns,
            rows: rows
                .iter()
                .map(|row| row.iter().map(Value::render_text).collect())
                .collect(),
            cursor: 0,
        }))
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.insert_id
    }

    fn prepare(&mut self, sql: &str) -> Result<MemoryStatement> {
        let mut state = self.server.state.borrow_mut();
        state.check_link(self.id)?;
        state.log.push(sql.to_owned());
        let script = state.script(sql)?.clone();
        let (param_types, columns) = state.describe(&script)?;
        let id = state.allocate();
        drop(state);
        Ok(MemoryStatement {
            server: self.server.clone(),
            id,
            connection_id: self.id,
            sql: sql.to_owned(),
            script,
            param_types,
            columns,
            bound: Vec::new(),
            rows: Vec::new(),
            cursor: 0,
            affected: 0,
            insert_id: None,
        })
    }

    fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            match ch {
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\x1a' => out.push_str("\\Z"),
                c => out.push(c),
            }
        }
        out
    }
}

/// Native text-protocol result set of the in-memory driver.
#[derive(Debug)]
pub struct MemoryResultSet {
    server: MemoryServer,
    id: RawId,
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Option<Vec<u8>>>>,
    cursor: usize,
}

impl NativeResource for MemoryResultSet {
    fn raw_id(&self) -> RawId {
        self.id
    }

    fn release(&mut self) {
        self.server.release(self.id);
    }
}

impl RawResultSet for MemoryResultSet {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn fetch_row(&mut self) -> Result<Option<RawRow<'_>>> {
        {
            let state = self.server.state.borrow();
            if state.link_lost {
                return Err(lost_link());
            }
            if let Some(err) = &state.fetch_failure {
                return Err(Error::Query(err.clone()));
            }
        }
        let Some(fields) = self.rows.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(RawRow::new(fields.iter().map(Option::as_deref).collect())))
    }
}

/// Native prepared statement of the in-memory driver.
#[derive(Debug)]
pub struct MemoryStatement {
    server: MemoryServer,
    id: RawId,
    connection_id: RawId,
    sql: String,
    script: Script,
    param_types: Vec<ColumnType>,
    columns: Vec<ColumnInfo>,
    bound: Vec<Value>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
    affected: u64,
    insert_id: Option<u64>,
}

impl NativeResource for MemoryStatement {
    fn raw_id(&self) -> RawId {
        self.id
    }

    fn release(&mut self) {
        self.server.release(self.id);
    }
}

impl RawStatement for MemoryStatement {
    fn param_types(&self) -> &[ColumnType] {
        &self.param_types
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn bind_params(&mut self, params: &[BindBuffer]) -> Result<()> {
        if params.len() != self.param_types.len() {
            return Err(wrong_arguments("parameter count mismatch"));
        }
        self.bound = params.iter().map(Value::from_param).collect::<Result<_>>()?;
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let mut state = self.server.state.borrow_mut();
        state.check_link(self.connection_id)?;
        state.log.push(self.sql.clone());
        if let Some(err) = state.failures.get(&self.sql) {
            return Err(Error::Query(err.clone()));
        }
        let outcome = state.run(&self.script, &self.bound)?;
        self.affected = outcome.affected;
        self.insert_id = outcome.insert_id;
        self.rows = outcome.rows.unwrap_or_default();
        self.cursor = 0;
        Ok(())
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.insert_id
    }

    fn fetch_bound_row(&mut self, buffers: &mut [BindBuffer]) -> Result<bool> {
        {
            let state = self.server.state.borrow();
            if state.link_lost {
                return Err(lost_link());
            }
            if let Some(err) = &state.fetch_failure {
                return Err(Error::Query(err.clone()));
            }
        }
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(false);
        };
        self.cursor += 1;
        for ((buf, value), col) in buffers.iter_mut().zip(row).zip(&self.columns) {
            value.render_binary(col, buf)?;
        }
        Ok(true)
    }

    fn free_result(&mut self) {
        self.rows.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AUTO_INCREMENT_FLAG, NOT_NULL_FLAG};

    fn server() -> MemoryServer {
        let server = MemoryServer::new();
        server.create_table(
            "t",
            vec![
                ColumnInfo::new("id", ColumnType::LongLong).with_flags(AUTO_INCREMENT_FLAG | NOT_NULL_FLAG),
                ColumnInfo::new("name", ColumnType::VarString),
            ],
        );
        server
    }

    #[test]
    fn test_escape() {
        let driver = MemoryDriver::new(server());
        let conn = driver.connect(&Opts::default()).unwrap();
        assert_eq!(conn.escape("it's \"x\"\n"), "it\\'s \\\"x\\\"\\n");
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let server = server();
        server.script("INS", Script::insert("t", [("name", "a")]));
        let mut conn = MemoryDriver::new(server.clone()).connect(&Opts::default()).unwrap();
        conn.query("INS").unwrap();
        conn.query("START TRANSACTION").unwrap();
        conn.query("INS").unwrap();
        assert_eq!(server.rows("t").len(), 2);
        conn.query("ROLLBACK").unwrap();
        assert_eq!(server.rows("t").len(), 1);
    }

    #[test]
    fn test_auto_increment() {
        let server = server();
        server.script("INS", Script::insert("t", [("name", "a")]));
        let mut conn = MemoryDriver::new(server).connect(&Opts::default()).unwrap();
        conn.query("INS").unwrap();
        conn.query("INS").unwrap();
        assert_eq!(conn.last_insert_id(), Some(2));
    }

    #[test]
    fn test_unknown_statement() {
        let mut conn = MemoryDriver::new(server()).connect(&Opts::default()).unwrap();
        let err = conn.query("SELECT nonsense").unwrap_err();
        assert_eq!(err.server_code(), Some(ER_PARSE_ERROR));
    }

    #[test]
    fn test_binary_rendering() {
        let mut buf = BindBuffer::default();
        let unsigned = ColumnInfo::new("u", ColumnType::Tiny).with_flags(crate::driver::UNSIGNED_FLAG);
        Value::Int(200).render_binary(&unsigned, &mut buf).unwrap();
        assert_eq!(buf.data, [200]);
        assert!(buf.is_unsigned);

        let signed = ColumnInfo::new("s", ColumnType::Tiny);
        assert!(Value::Int(200).render_binary(&signed, &mut buf).is_err());

        let date = ColumnInfo::new("d", ColumnType::Date);
        Value::from("2024-01-02").render_binary(&date, &mut buf).unwrap();
        assert_eq!(buf.data, [0xe8, 0x07, 1, 2]);
    }

    #[test]
    fn test_coerce_checks_range_and_dates() {
        let signed = ColumnInfo::new("s", ColumnType::Tiny);
        let err = Value::Int(300).coerce(&signed).unwrap_err();
        assert_eq!(err.server_code(), Some(ER_WARN_DATA_OUT_OF_RANGE));
        assert_eq!(Value::from("-5").coerce(&signed).unwrap(), Value::Int(-5));

        let stamp = ColumnInfo::new("ts", ColumnType::DateTime);
        assert_eq!(
            Value::from("2024-01-02").coerce(&stamp).unwrap(),
            Value::from("2024-01-02 00:00:00")
        );
        let err = Value::from("soon").coerce(&stamp).unwrap_err();
        assert_eq!(err.server_code(), Some(ER_TRUNCATED_WRONG_VALUE));
    }

    #[test]
    fn test_describe_params() {
        let server = server();
        server.script(
            "UPD",
            Script::update("t", [("name", Operand::Param(0))]).filter("id", Operand::Param(1)),
        );
        let mut conn = MemoryDriver::new(server).connect(&Opts::default()).unwrap();
        let stmt = conn.prepare("UPD").unwrap();
        assert_eq!(
            stmt.param_types(),
            &[ColumnType::VarString, ColumnType::LongLong]
        );
        assert!(stmt.columns().is_empty());
    }
}
