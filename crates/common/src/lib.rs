//! Types shared by every crate in the engine: the `Rid` record handle, the
//! nested `DbError` taxonomy, runtime `Config`, and the `Row`/`RecordBatch`
//! result-set shape.

#[cfg(test)]
mod tests;

pub mod pretty;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use types::Value;

/// A record's stable on-disk address: the page it lives on and its slot
/// within that page's record array. `Rid` never changes for a given record
/// across updates, only across delete/re-insert.
///
/// The sentinel `Rid::NULL` (`page_id == 0`) stands for "no record" — used
/// by `.refed`/`.refing` sidecar slots that have not been filled in and by
/// callers representing "not found" without an `Option` wrapper on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: u64,
    pub slot_id: u64,
}

impl Rid {
    pub const NULL: Rid = Rid {
        page_id: 0,
        slot_id: 0,
    };

    pub fn new(page_id: u64, slot_id: u64) -> Self {
        Self { page_id, slot_id }
    }

    pub fn is_null(&self) -> bool {
        *self == Rid::NULL
    }
}

/// A single decoded row, positional and aligned with its table's declared
/// field order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    #[serde(skip)]
    rid: Option<Rid>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn with_rid(mut self, rid: Rid) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn rid(&self) -> Option<Rid> {
        self.rid
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// A `SELECT`/`DESC`/`SHOW` result set: column labels paired with rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RecordBatch {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// A single-column, single-row batch reporting how many records an
    /// INSERT/DELETE/UPDATE affected.
    pub fn affected(label: &str, count: u64) -> Self {
        Self {
            columns: vec![label.to_string()],
            rows: vec![Row::new(vec![Value::U64(count)])],
        }
    }
}

/// Structured payload for a failed `CREATE`/`DROP`/`USE DATABASE`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    #[error("a file or directory already exists at that path")]
    PathExisted,
    #[error("failed to remove the database directory")]
    RemoveDbFailed,
    #[error("no database with that name exists")]
    DbNotExists,
}

/// Structured payload for a failed FK column declaration on `CREATE TABLE`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForeignKeyErrorKind {
    #[error("the referenced table has no primary key")]
    PrimaryKeyRequired,
    #[error("the referencing and referenced column types do not match")]
    TypesDismatch,
    #[error("the referencing and referenced column lengths do not match")]
    LengthsDismatch,
}

/// Structured payload for a failed `CREATE TABLE`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreateTableErrorKind {
    #[error("field name exceeds the maximum field name length")]
    FieldNameTooLong,
    #[error("field declares an unsupported type")]
    UnsupportedType,
    #[error("a variable-length field requires an explicit length")]
    FieldLengthRequired,
    #[error("duplicate field name in the same table")]
    DuplicateFieldName,
    #[error("the declared primary key does not name a field of this table")]
    InvalidPrimaryKey,
    #[error("foreign key declaration is invalid: {0}")]
    ForeignKeyFailed(ForeignKeyErrorKind),
}

/// Structured payload for a failed `DROP TABLE`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropTableErrorKind {
    #[error("table is referenced by a foreign key on another table")]
    TableReferenced,
    #[error("failed to remove the table's files")]
    RemoveTableFailed,
}

/// Structured payload for a failed INSERT or UPDATE.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordWriteErrorKind {
    #[error("value list does not match the table's field count")]
    WrongTupleSize,
    #[error("a literal could not be parsed as its field's declared type")]
    LiteralParseFailed,
    #[error("a literal is out of range for its field's declared type or length")]
    LiteralOutOfRange,
    #[error("a non-nullable field was given a NULL value")]
    NotNullExpected,
    #[error("a record with that primary key already exists")]
    DuplicatePrimaryKey,
    #[error("a CHECK constraint rejected the new value")]
    CheckConstraintFailed,
    #[error("a foreign key value does not exist in the referenced table")]
    ReferencedNotExists,
    #[error("another table's foreign key still references this row's current primary key value")]
    OldValueStillReferenced,
}

/// Structured payload for a failed DELETE.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeleteRecordErrorKind {
    #[error("record is referenced by a foreign key in another table")]
    RecordReferenced,
}

/// Structured payload for a failed single-table `SELECT`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelectErrorKind {
    #[error("an aggregate function could not be applied")]
    AggregateFailed,
    #[error("GROUP BY and ORDER BY cannot both be present")]
    BothGroupAndOrder,
}

/// Structured payload for a failed multi-table `SELECT`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComplexSelectErrorKind {
    #[error("the same table name appears more than once in FROM")]
    DuplicateTableName,
}

/// Structured payload for an invalid `WHERE` condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionErrorKind {
    #[error("unsupported comparison operator")]
    InvalidConditionOperator,
    #[error("condition operand does not name a known field or a valid literal")]
    InvalidConditionOperand,
}

/// Canonical, nested error taxonomy shared by every subsystem. Each `*Failed`
/// variant carries a structured `kind` describing which specific way the
/// operation failed plus an optional `cause`, the lower-level error (if any)
/// that triggered it — e.g. `InsertRecordFailed` wrapping an `Io` failure
/// while appending a record page.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to parse SQL: {message}")]
    ParseFailed { message: String },

    #[error("failed to create database: {kind}")]
    CreateDbFailed {
        kind: DatabaseErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to drop database: {kind}")]
    DropDbFailed {
        kind: DatabaseErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to use database: {kind}")]
    UseDbFailed {
        kind: DatabaseErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("no database is currently open")]
    DbNotOpened,

    #[error("failed to create table: {kind}")]
    CreateTableFailed {
        kind: CreateTableErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to drop table: {kind}")]
    DropTableFailed {
        kind: DropTableErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to create index")]
    CreateIndexFailed {
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to drop index")]
    DropIndexFailed {
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to open table")]
    OpenTableFailed {
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("invalid field name")]
    InvalidFieldName,

    #[error("failed to insert record: {kind}")]
    InsertRecordFailed {
        kind: RecordWriteErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to delete record: {kind}")]
    DeleteRecordFailed {
        kind: DeleteRecordErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("failed to update record: {kind}")]
    UpdateRecordFailed {
        kind: RecordWriteErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("select failed: {kind}")]
    SimpleSelectFailed {
        kind: SimpleSelectErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("select failed: {kind}")]
    ComplexSelectFailed {
        kind: ComplexSelectErrorKind,
        #[source]
        cause: Option<Box<DbError>>,
    },

    #[error("invalid condition: {kind}")]
    InvalidCondition { kind: ConditionErrorKind },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration shared by storage, buffer, and btree.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(4096)
///     .buffer_pool_pages(64)
///     .btree_buffer_frames(16)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory under which each database gets its own subdirectory.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes for table/index files.
    #[builder(default = 4096)]
    pub page_size: u64,
    /// Number of table-file pages the buffer pool keeps resident.
    #[builder(default = 64)]
    pub buffer_pool_pages: usize,
    /// Fixed node size in bytes for B+-tree index pages.
    #[builder(default = 2048)]
    pub btree_node_size: u64,
    /// Number of B+-tree node frames the index buffer pool keeps resident.
    #[builder(default = 16)]
    pub btree_buffer_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_pages: 64,
            btree_node_size: 2048,
            btree_buffer_frames: 16,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, RecordBatch, Rid, Row};
    pub use types::{SqlType, Value};
}
