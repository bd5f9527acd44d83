//! Prepared statements.

use crate::conversion::{Cell, ToParams};
use crate::driver::{BindBuffer, ColumnInfo, RawStatement};
use crate::error::{Error, Result};
use crate::handle::{NativeHandle, RawId};
use crate::row::{FromRow, decode_row};
use crate::types::ColumnType;

/// A statement compiled once on the server and executed many times.
///
/// Created by the `prepare_*` methods of [`Connection`](super::Connection)
/// and executed by the matching `run_prepared_*` method of the same
/// connection. Parameters are bound with [`PreparedStatement::bind`] before
/// each execution; an execution consumes the binding.
pub struct PreparedStatement<S: RawStatement> {
    handle: NativeHandle<S>,
    connection_id: RawId,
    sql: String,
    param_types: Vec<ColumnType>,
    params: Vec<BindBuffer>,
    params_bound: bool,
    columns: Vec<ColumnInfo>,
    results: Vec<BindBuffer>,
}

impl<S: RawStatement> PreparedStatement<S> {
    /// Wrap a native statement, checking the counts the caller declared
    /// against what the server reported.
    pub(crate) fn new(
        raw: S,
        connection_id: RawId,
        sql: &str,
        parameter_count: usize,
        result_column_count: usize,
    ) -> Result<Self> {
        // Wrap first so the native statement is released on the error paths.
        let handle = NativeHandle::new(raw);
        let (param_types, columns) = handle
            .get()
            .map(|raw| (raw.param_types().to_vec(), raw.columns().to_vec()))
            .unwrap_or_default();
        if param_types.len() != parameter_count {
            return Err(Error::ParameterBinding(format!(
                "statement declares {} parameters, server reports {}",
                parameter_count,
                param_types.len()
            )));
        }
        if columns.len() != result_column_count {
            return Err(Error::Decode(format!(
                "statement declares {} result columns, server reports {}",
                result_column_count,
                columns.len()
            )));
        }
        let results = columns.iter().map(|c| BindBuffer::for_type(c.column_type)).collect();
        Ok(Self {
            handle,
            connection_id,
            sql: sql.to_owned(),
            param_types,
            params: Vec::with_capacity(parameter_count),
            params_bound: parameter_count == 0,
            columns,
            results,
        })
    }

    /// The statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` parameters.
    pub fn parameter_count(&self) -> usize {
        self.param_types.len()
    }

    /// Number of result columns. Zero for non-SELECT statements.
    pub fn result_column_count(&self) -> usize {
        self.columns.len()
    }

    /// Native parameter types reported by the server.
    pub fn param_types(&self) -> &[ColumnType] {
        &self.param_types
    }

    /// Result column metadata reported by the server.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Identity of the connection this statement was prepared on.
    pub fn connection_id(&self) -> RawId {
        self.connection_id
    }

    /// Check if parameters are bound for the next execution.
    pub fn is_bound(&self) -> bool {
        self.params_bound
    }

    /// Bind the parameters for the next execution.
    ///
    /// The number of parameters must equal [`parameter_count`](Self::parameter_count),
    /// and each value must fit the type the server declared for its slot.
    /// On error nothing is bound.
    pub fn bind<P: ToParams>(&mut self, params: P) -> Result<()> {
        if params.param_count() != self.param_types.len() {
            return Err(Error::ParameterBinding(format!(
                "statement takes {} parameters, {} given",
                self.param_types.len(),
                params.param_count()
            )));
        }
        self.params_bound = false;
        params.encode(&self.param_types, &mut self.params)?;
        self.params_bound = true;
        Ok(())
    }

    /// Send the bound parameters and execute. Clears the binding.
    pub(crate) fn execute(&mut self) -> Result<()> {
        if !self.params_bound {
            return Err(Error::ParameterBinding(
                "parameters must be bound before each execution".into(),
            ));
        }
        if !self.param_types.is_empty() {
            self.params_bound = false;
        }
        let Some(raw) = self.handle.get_mut() else {
            return Err(Error::InvalidUsage("statement is closed".into()));
        };
        raw.free_result();
        let result = raw.bind_params(&self.params).and_then(|()| raw.execute());
        self.params.clear();
        result
    }

    pub(crate) fn affected_rows(&self) -> u64 {
        self.handle.get().map_or(0, RawStatement::affected_rows)
    }

    pub(crate) fn last_insert_id(&self) -> Option<u64> {
        self.handle.get().and_then(RawStatement::last_insert_id)
    }

    /// Fetch the next record into the result buffers and decode it.
    pub(crate) fn fetch_bound<T: FromRow>(&mut self) -> Result<Option<T>> {
        let Some(raw) = self.handle.get_mut() else {
            return Ok(None);
        };
        if !raw.fetch_bound_row(&mut self.results)? {
            return Ok(None);
        }
        let cells: Vec<Cell<'_>> = self.results.iter().map(Cell::binary).collect();
        decode_row(&self.columns, &cells).map(Some)
    }

    /// Discard unread records of the current execution.
    pub(crate) fn free_result(&mut self) {
        if let Some(raw) = self.handle.get_mut() {
            raw.free_result();
        }
    }

    /// Release the native statement now.
    pub fn close(mut self) {
        self.handle.reset();
    }
}

impl<S: RawStatement> PartialEq for PreparedStatement<S> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}
