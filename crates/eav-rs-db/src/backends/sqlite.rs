//! SQLite database backend using `rusqlite`.
//!
//! Features:
//! - WAL mode for file-based databases
//! - In-memory database support via `:memory:` path (great for testing)
//! - Simple `Mutex`-based concurrency control
//! - UNIQUE/CHECK/FOREIGN KEY failures surface as
//!   [`EavError::IntegrityError`]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use eav_rs_core::{EavError, EavResult};

use crate::row::Row;
use crate::value::{Value, DATETIME_FORMAT, DATE_FORMAT};

/// A SQLite database backend.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    /// The connection, guarded by a mutex.
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteBackend {
    /// Opens a new SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created. WAL
    /// journal mode is enabled for file-based databases.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl Into<PathBuf>, foreign_keys: bool) -> EavResult<Self> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| EavError::OperationalError(format!("SQLite open failed: {e}")))?;

        let mut pragmas = String::new();
        if !in_memory {
            pragmas.push_str("PRAGMA journal_mode=WAL; ");
        }
        pragmas.push_str(if foreign_keys {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA foreign_keys=OFF;"
        });
        conn.execute_batch(&pragmas)
            .map_err(|e| EavError::OperationalError(format!("Failed to set pragmas: {e}")))?;

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn memory() -> EavResult<Self> {
        Self::open(":memory:", true)
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if preparing, binding, or executing fails.
    pub fn execute(&self, sql: &str, params: &[Value]) -> EavResult<usize> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        Self::bind_params(&mut stmt, params)?;
        stmt.raw_execute().map_err(map_error)
    }

    /// Executes an INSERT and returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns an error if preparing, binding, or executing fails.
    pub fn insert_returning_id(&self, sql: &str, params: &[Value]) -> EavResult<i64> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        Self::bind_params(&mut stmt, params)?;
        stmt.raw_execute().map_err(map_error)?;
        Ok(conn.last_insert_rowid())
    }

    /// Runs a query and returns all rows.
    ///
    /// # Errors
    ///
    /// Returns an error if preparing, binding, or stepping fails.
    pub fn query(&self, sql: &str, params: &[Value]) -> EavResult<Vec<Row>> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        let mut stmt = conn.prepare(sql).map_err(map_error)?;

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        Self::bind_params(&mut stmt, params)?;

        let mut raw_rows = stmt.raw_query();
        let mut rows = Vec::new();
        while let Some(row) = raw_rows.next().map_err(map_error)? {
            rows.push(Self::convert_row(row, &column_names));
        }
        Ok(rows)
    }

    /// Executes one or more parameterless statements.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn execute_batch(&self, sql: &str) -> EavResult<()> {
        let conn = self.conn.lock().expect("sqlite connection lock poisoned");
        conn.execute_batch(sql).map_err(map_error)
    }

    /// Binds ORM `Value` types to a `rusqlite` statement.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> EavResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, i64::from(*b)),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Date(d) => {
                    stmt.raw_bind_parameter(idx, d.format(DATE_FORMAT).to_string())
                }
                Value::DateTime(dt) => {
                    stmt.raw_bind_parameter(idx, dt.format(DATETIME_FORMAT).to_string())
                }
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
                Value::List(vals) => {
                    let json = serde_json::to_string(
                        &vals.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    )?;
                    stmt.raw_bind_parameter(idx, json)
                }
            }
            .map_err(|e| EavError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to our generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                match sqlite_row
                    .get_ref(i)
                    .unwrap_or(rusqlite::types::ValueRef::Null)
                {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) | rusqlite::types::ValueRef::Blob(b) => {
                        Value::String(String::from_utf8_lossy(b).to_string())
                    }
                }
            })
            .collect();

        Row::new(column_names.to_vec(), values)
    }
}

fn map_error(err: rusqlite::Error) -> EavError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            EavError::IntegrityError(err.to_string())
        }
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            EavError::OperationalError(err.to_string())
        }
        _ => EavError::DatabaseError(err.to_string()),
    }
}
