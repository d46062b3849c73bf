//! SQLite adapter for the relational sink port.
//!
//! Each [`SqliteConnection`] opens its own handle on the database file, so the
//! write session's connection lifecycle maps directly onto SQLite
//! connections. Transactions begin lazily on the first executed batch.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use geo::Point;
use log::{info, warn};
use osmload_core::{InsertStatement, RelationalSink, SinkConnection, SinkError, SqlValue};
use rusqlite::{Connection, Error as SqliteError, params_from_iter, types::Value};
use thiserror::Error;

mod schema;

/// Errors raised while preparing or finalising the SQLite database.
///
/// Errors during the load itself surface as [`SinkError`]s through the write
/// session.
#[derive(Debug, Error)]
pub enum SqliteSinkError {
    /// Failed to create the parent directory for the database file.
    #[error("failed to create parent directory {path:?}")]
    CreateDirectory {
        /// Path of the directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Destination database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Applying a pragma failed.
    #[error("failed to set SQLite pragma {pragma}")]
    Pragma {
        /// Pragma being set.
        pragma: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A schema statement failed.
    #[error("failed to execute schema step '{step}'")]
    Migration {
        /// Step being executed.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

/// SQLite database receiving a bulk load.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use osmload_data::SqliteSink;
///
/// # fn main() -> Result<(), osmload_data::SqliteSinkError> {
/// let sink = SqliteSink::create(Utf8Path::new("target/osm.db"))?;
/// // ... load through a `WriteSession` ...
/// sink.create_indexes()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: Utf8PathBuf,
}

impl SqliteSink {
    /// Create the database file and its tables if missing.
    ///
    /// Parent directories are created automatically and the journal is
    /// switched to WAL.
    pub fn create(path: &Utf8Path) -> Result<Self, SqliteSinkError> {
        ensure_parent_dir(path)?;
        let mut connection = open_database(path)?;
        connection
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|source| SqliteSinkError::Pragma {
                pragma: "journal_mode",
                source,
            })?;
        schema::bootstrap(&mut connection)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Location of the database file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Build the lookup indexes omitted during the load.
    pub fn create_indexes(&self) -> Result<(), SqliteSinkError> {
        let mut connection = open_database(&self.path)?;
        schema::create_indexes(&mut connection)?;
        info!("Created indexes in {}", self.path);
        Ok(())
    }
}

impl RelationalSink for SqliteSink {
    type Connection = SqliteConnection;

    fn open(&mut self) -> Result<Self::Connection, SinkError> {
        let connection = Connection::open(self.path.as_std_path())
            .map_err(|source| SinkError::new("open connection", source))?;
        apply_bulk_pragmas(&connection)
            .map_err(|source| SinkError::new("configure connection", source))?;
        Ok(SqliteConnection {
            connection,
            statement: None,
            pending: Vec::new(),
        })
    }
}

/// One SQLite handle with at most one prepared insert.
#[derive(Debug)]
pub struct SqliteConnection {
    connection: Connection,
    statement: Option<PreparedInsert>,
    pending: Vec<Vec<SqlValue>>,
}

#[derive(Debug)]
struct PreparedInsert {
    statement: InsertStatement,
    sql: String,
}

impl SinkConnection for SqliteConnection {
    fn prepare(&mut self, statement: InsertStatement) -> Result<(), SinkError> {
        let sql = insert_sql(statement);
        // Compiled into the statement cache; reused by every batch.
        self.connection
            .prepare_cached(&sql)
            .map_err(|source| SinkError::new("prepare insert", source))?;
        self.pending.clear();
        self.statement = Some(PreparedInsert { statement, sql });
        Ok(())
    }

    fn add_row(&mut self, row: Vec<SqlValue>) -> Result<(), SinkError> {
        let Some(prepared) = &self.statement else {
            return Err(SinkError::new("bind row", "no insert prepared"));
        };
        let expected = prepared.statement.arity();
        if row.len() != expected {
            return Err(SinkError::new(
                "bind row",
                format!(
                    "{} expects {expected} parameters, got {}",
                    prepared.statement.table,
                    row.len()
                ),
            ));
        }
        self.pending.push(row);
        Ok(())
    }

    fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    fn clear_batch(&mut self) {
        self.pending.clear();
    }

    fn execute_batch(&mut self) -> Result<usize, SinkError> {
        let rows = std::mem::take(&mut self.pending);
        let Some(prepared) = &self.statement else {
            return Err(SinkError::new("execute batch", "no insert prepared"));
        };
        if self.connection.is_autocommit() {
            self.connection
                .execute_batch("BEGIN")
                .map_err(|source| SinkError::new("begin transaction", source))?;
        }
        // A failed batch leaves no rows behind in the open transaction.
        self.connection
            .execute_batch("SAVEPOINT batch")
            .map_err(|source| SinkError::new("execute batch", source))?;
        match insert_rows(&self.connection, &prepared.sql, rows) {
            Ok(count) => {
                self.connection
                    .execute_batch("RELEASE batch")
                    .map_err(|source| SinkError::new("execute batch", source))?;
                Ok(count)
            }
            Err(source) => {
                if let Err(undo) = self
                    .connection
                    .execute_batch("ROLLBACK TO batch; RELEASE batch")
                {
                    warn!("Failed to undo partial batch: {undo}");
                }
                Err(SinkError::new("execute batch", source))
            }
        }
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        if self.connection.is_autocommit() {
            return Ok(());
        }
        self.connection
            .execute_batch("COMMIT")
            .map_err(|source| SinkError::new("commit", source))
    }

    fn rollback(&mut self) -> Result<(), SinkError> {
        if self.connection.is_autocommit() {
            return Ok(());
        }
        self.connection
            .execute_batch("ROLLBACK")
            .map_err(|source| SinkError::new("roll back", source))
    }

    fn close(self) -> Result<(), SinkError> {
        self.connection
            .close()
            .map_err(|(_, source)| SinkError::new("close connection", source))
    }
}

/// Encode a point as EWKT in WGS84.
///
/// # Examples
/// ```
/// use geo::Point;
/// use osmload_data::sqlite::point_ewkt;
///
/// assert_eq!(point_ewkt(Point::new(-0.5, 51.25)), "SRID=4326;POINT(-0.5 51.25)");
/// ```
#[must_use]
pub fn point_ewkt(point: Point<f64>) -> String {
    format!("SRID=4326;POINT({} {})", point.x(), point.y())
}

fn insert_rows(
    connection: &Connection,
    sql: &str,
    rows: Vec<Vec<SqlValue>>,
) -> Result<usize, SqliteError> {
    let mut statement = connection.prepare_cached(sql)?;
    let mut count = 0;
    for row in rows {
        count += statement.execute(params_from_iter(row.into_iter().map(to_sqlite_value)))?;
    }
    Ok(count)
}

fn to_sqlite_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => Value::Integer(number),
        SqlValue::Text(text) => Value::Text(text),
        SqlValue::Point(point) => Value::Text(point_ewkt(point)),
    }
}

fn insert_sql(statement: InsertStatement) -> String {
    let placeholders: Vec<String> = (1..=statement.arity()).map(|n| format!("?{n}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        statement.table,
        statement.columns.join(", "),
        placeholders.join(", ")
    )
}

fn apply_bulk_pragmas(connection: &Connection) -> Result<(), SqliteError> {
    connection.pragma_update(None, "synchronous", "OFF")?;
    connection.pragma_update(None, "temp_store", "MEMORY")
}

fn open_database(path: &Utf8Path) -> Result<Connection, SqliteSinkError> {
    Connection::open(path.as_std_path()).map_err(|source| SqliteSinkError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), SqliteSinkError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base, relative) = if parent.is_absolute() {
        ("/", parent.strip_prefix("/").unwrap_or(parent))
    } else {
        (".", parent)
    };
    let create_error = |source| SqliteSinkError::CreateDirectory {
        path: parent.to_path_buf(),
        source,
    };
    fs_utf8::Dir::open_ambient_dir(base, ambient_authority())
        .map_err(create_error)?
        .create_dir_all(relative)
        .map_err(create_error)
}
