//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define per-entity data access contracts.
//! - Isolate SQLite query details from service orchestration.
//! - Apply ownership scoping inside every query, never after it.
//!
//! # Invariants
//! - Every read and write takes the calling identity and resolves visibility
//!   through [`crate::scope::ScopeResolver`].
//! - Writes naming zone/anchor references validate them inside the same
//!   transaction that persists the row.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

use crate::db::migrations::latest_version;
use crate::db::{BusyError, DbError};
use crate::model::{CallerId, ValidationError};
use crate::scope::{ResourceKind, ScopeFilter};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod anchor_repo;
pub mod breadcrumb_repo;
pub mod capture_repo;
pub mod item_repo;
pub mod routeset_repo;
pub mod scan_repo;
pub mod zone_repo;

pub use anchor_repo::{AnchorListQuery, AnchorRepository, SqliteAnchorRepository};
pub use breadcrumb_repo::{
    normalize_history_limit, BreadcrumbRepository, SessionStart, SqliteBreadcrumbRepository,
    DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};
pub use capture_repo::{
    CaptureListQuery, CaptureRepository, SqliteCaptureRepository, MAX_CAPTURE_PAGE,
};
pub use item_repo::{ItemListQuery, ItemRepository, SqliteItemRepository};
pub use routeset_repo::{RouteSetRepository, SqliteRouteSetRepository};
pub use scan_repo::{ScanLogRepository, SqliteScanLogRepository};
pub use zone_repo::{SqliteZoneRepository, ZoneDeletion, ZoneRepository};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by every entity store.
#[derive(Debug)]
pub enum RepoError {
    /// Input failed model validation.
    Validation(ValidationError),
    /// SQLite transport failure.
    Db(DbError),
    /// Resource absent or outside the caller's ownership closure.
    NotFound { kind: ResourceKind, id: String },
    /// Uniqueness violation on a globally unique field.
    Conflict { field: &'static str, value: String },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted row violates model invariants.
    InvalidData(String),
}

/// Coarse classification the boundary layer maps to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    Invalid,
    Internal,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Invalid => "invalid",
            Self::Internal => "internal",
        }
    }
}

impl RepoError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::Validation(_) => ErrorClass::Invalid,
            Self::Db(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::InvalidData(_) => ErrorClass::Internal,
        }
    }

    /// Message safe to show outside the process.
    ///
    /// Internal failures collapse to a generic text so SQL details and row
    /// contents are never echoed.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn not_found(kind: ResourceKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Conflict { field, value } => {
                write!(f, "`{field}` already in use: `{value}`")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl BusyError for RepoError {
    fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

/// Returns the `table.column` named by a `UNIQUE` constraint failure.
pub(crate) fn unique_violation(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(code, Some(message))
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            message
                .strip_prefix("UNIQUE constraint failed: ")
                .map(|columns| columns.split(',').next().unwrap_or(columns).trim())
        }
        _ => None,
    }
}

/// Runs `op` inside an immediate transaction on a shared connection.
///
/// The write lock is taken before `op` reads anything, so reference checks
/// and the write they guard observe the same snapshot. Dropping the
/// transaction on error rolls back.
pub(crate) fn write_unit<T, F>(conn: &Connection, op: F) -> RepoResult<T>
where
    F: FnOnce(&Transaction<'_>) -> RepoResult<T>,
{
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Runs `SELECT <columns> FROM <scoped source> WHERE <scope> <tail>`.
///
/// `tail` continues the `WHERE` clause (`AND ...`, `ORDER BY ...`) and its
/// placeholders bind to `extra`, after the scope's own binds.
pub(crate) fn query_scoped<T, F>(
    conn: &Connection,
    filter: ScopeFilter,
    columns: &str,
    tail: &str,
    extra: Vec<Value>,
    parse: F,
) -> RepoResult<Vec<T>>
where
    F: Fn(&Row<'_>) -> RepoResult<T>,
{
    let sql = format!("SELECT {columns} {} {tail};", filter.from_where());
    let mut binds = filter.into_binds();
    binds.extend(extra);

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse(row)?);
    }
    Ok(records)
}

/// Appends `LIMIT`/`OFFSET` the way list queries page.
pub(crate) fn push_page(
    tail: &mut String,
    bind_values: &mut Vec<Value>,
    limit: Option<u32>,
    offset: u32,
) {
    if let Some(limit) = limit {
        tail.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
        if offset > 0 {
            tail.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(offset)));
        }
    } else if offset > 0 {
        tail.push_str(" LIMIT -1 OFFSET ?");
        bind_values.push(Value::Integer(i64::from(offset)));
    }
}

/// Verifies the connection went through [`crate::db::open_db`] bootstrap.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn parse_uuid(row: &Row<'_>, column: &str, table: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{text}` in {table}.{column}"))
    })
}

pub(crate) fn parse_optional_uuid(
    row: &Row<'_>,
    column: &str,
    table: &str,
) -> RepoResult<Option<Uuid>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => Uuid::parse_str(&text).map(Some).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{text}` in {table}.{column}"))
        }),
        None => Ok(None),
    }
}

pub(crate) fn parse_caller(row: &Row<'_>, column: &str, table: &str) -> RepoResult<CallerId> {
    let text: String = row.get(column)?;
    CallerId::new(text)
        .map_err(|_| RepoError::InvalidData(format!("blank identity in {table}.{column}")))
}

pub(crate) fn parse_code<T>(
    row: &Row<'_>,
    column: &str,
    table: &str,
    parse: fn(&str) -> Option<T>,
) -> RepoResult<T> {
    let text: String = row.get(column)?;
    parse(&text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid value `{text}` in {table}.{column}"))
    })
}

pub(crate) fn uuid_param(id: Option<Uuid>) -> Option<String> {
    id.map(|value| value.to_string())
}
