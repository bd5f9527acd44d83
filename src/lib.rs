//! Typed result binding, prepared statements and transactions over a
//! MySQL-style client driver.
//!
//! # Features
//!
//! - **Positional row decoding**: result columns map onto tuple or struct
//!   fields in select order, with NULL and type checks per column
//! - **Two execution paths**: direct text-protocol statements and prepared
//!   binary-protocol statements yield identical rows
//! - **Scoped transactions**: a guard rolls back on drop unless committed
//! - **Driver boundary**: the native client sits behind a small set of
//!   traits; [`driver::memory`] provides an in-memory implementation
//!
//! # Example
//!
//! ```
//! use sqlbind::driver::memory::{MemoryDriver, MemoryServer, Operand, Script};
//! use sqlbind::driver::ColumnInfo;
//! use sqlbind::{ColumnType, Connection, RowCursor};
//!
//! fn main() -> sqlbind::Result<()> {
//!     let server = MemoryServer::new();
//!     server.create_table(
//!         "tab_sample",
//!         vec![
//!             ColumnInfo::new("alpha", ColumnType::LongLong),
//!             ColumnInfo::new("beta", ColumnType::VarString),
//!         ],
//!     );
//!     server.script(
//!         "INSERT INTO tab_sample (alpha, beta) VALUES (1, 'cheese')",
//!         Script::insert(
//!             "tab_sample",
//!             [("alpha", Operand::from(1_i64)), ("beta", Operand::from("cheese"))],
//!         ),
//!     );
//!     server.script(
//!         "SELECT alpha, beta FROM tab_sample",
//!         Script::select("tab_sample", &["alpha", "beta"]),
//!     );
//!
//!     let mut conn = Connection::new(MemoryDriver::new(server), "mysql://localhost/sample")?;
//!     conn.insert("INSERT INTO tab_sample (alpha, beta) VALUES (1, 'cheese')")?;
//!
//!     let mut result = conn.select("SELECT alpha, beta FROM tab_sample")?;
//!     let rows: Vec<(i64, String)> = result.collect()?;
//!     assert_eq!(rows, vec![(1, "cheese".to_string())]);
//!     Ok(())
//! }
//! ```

pub mod conversion;
pub mod driver;
pub mod error;
pub mod handle;
pub mod opts;
pub mod row;
pub mod sync;
pub mod types;

pub use conversion::{FromColumn, ToParam, ToParams};
pub use driver::{ColumnInfo, Driver};
pub use error::{Error, Result, ServerError};
pub use handle::NativeHandle;
pub use opts::Opts;
pub use row::{FromRow, Row};
pub use sync::{
    BindResult, CharResult, Connection, PreparedStatement, RowCursor, Rows, Transaction,
};
pub use types::{ColumnType, TransactionState};
