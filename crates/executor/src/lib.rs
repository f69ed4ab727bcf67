//! Table/index orchestration (spec §4.4-§4.6): opens tables through a
//! process-private cache, maintains each table's secondary indexes and
//! constraint sidecars, and implements DDL, DML (with rollback-on-partial-
//! failure), and the `SELECT` pipeline (condition evaluation, sargable
//! index lookups, join, group/aggregate, sort, project).
//!
//! This crate does not own a `Statement` dispatcher — `database::Engine`
//! wires parsed statements to the functions here, which only need a
//! [`TableSet`] (the open-table cache for one database directory) and
//! whatever foreign-key catalog the caller is tracking.

pub mod ddl;
pub mod dml;
pub mod select;
pub mod temp_table;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use btree::BTreeIndex;
use catalog::{CheckConstraints, IndexCatalog};
use common::{DbError, DbResult};
use storage::{FieldDescriptor, Table};
use types::SqlType;

/// Name of the hidden auto-generated primary key field synthesized when
/// `CREATE TABLE` declares no `PRIMARY KEY` (spec §3: "a hidden 9-byte
/// auto-key: 1-byte non-null flag + 8-byte monotone unique number").
pub const AUTO_PK_NAME: &str = "__auto_pk";

fn table_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.tb"))
}

fn pk_index_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.pk.idx"))
}

fn index_path(dir: &Path, table: &str, index_name: &str) -> PathBuf {
    dir.join(format!("{table}.{index_name}.idx"))
}

fn chk_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.chk"))
}

fn idxcat_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.idxcat"))
}

/// The database-wide foreign-key multimap lives at the database directory's
/// root rather than alongside any one table, since a relationship always
/// names two tables.
pub fn fk_paths(dir: &Path) -> (PathBuf, PathBuf) {
    (dir.join("foreign_keys.refed"), dir.join("foreign_keys.refing"))
}

/// A byte offset, length, and type for one field within an encoded record,
/// derived from cumulative field lengths (field descriptors carry no
/// on-disk offset, matching `original_source/src/db_fields.h`).
pub fn field_offset(fields: &[FieldDescriptor], field_id: u64) -> Option<(usize, usize, SqlType)> {
    let mut offset = 0usize;
    for f in fields {
        if f.field_id == field_id {
            return Some((offset, f.length as usize, f.ty));
        }
        offset += f.length as usize;
    }
    None
}

fn field_by_name<'a>(fields: &'a [FieldDescriptor], name: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

/// `expr::FieldLookup` over one already-encoded record, addressed by the
/// table's own field descriptors (in declaration order).
pub struct RecordFields<'a> {
    pub fields: &'a [FieldDescriptor],
    pub bytes: &'a [u8],
}

impl<'a> expr::FieldLookup for RecordFields<'a> {
    fn field(&self, field_id: u64) -> Option<(SqlType, &[u8])> {
        let (offset, len, ty) = field_offset(self.fields, field_id)?;
        Some((ty, &self.bytes[offset..offset + len]))
    }
}

/// Resolve a SQL type keyword to its `types::SqlType`, matching
/// `types::SqlType::name()`'s own spelling plus the common synonyms
/// `sqlparser`'s generic dialect produces (`INTEGER`, `BOOLEAN`, `TEXT`, …).
/// `types::SqlType` has no reverse lookup of its own since only the
/// executor's `CREATE TABLE` path ever needs to go from text to type.
pub fn resolve_sql_type(name: &str) -> Option<SqlType> {
    Some(match name.to_ascii_uppercase().as_str() {
        "INT8" | "TINYINT" => SqlType::I8,
        "UINT8" => SqlType::U8,
        "INT16" | "SMALLINT" => SqlType::I16,
        "UINT16" => SqlType::U16,
        "INT" | "INTEGER" | "INT32" => SqlType::I32,
        "UINT" | "UINT32" => SqlType::U32,
        "BIGINT" | "INT64" | "LONG" => SqlType::I64,
        "UBIGINT" | "UINT64" => SqlType::U64,
        "BOOL" | "BOOLEAN" => SqlType::Bool,
        "CHAR" | "VARCHAR" | "TEXT" | "STRING" | "CHARACTER VARYING" => SqlType::Char,
        "UCHAR" | "UVARCHAR" => SqlType::UChar,
        "FLOAT" | "REAL" => SqlType::Float,
        "DOUBLE" | "DOUBLE PRECISION" => SqlType::Double,
        _ => return None,
    })
}

/// `ColumnInfo` list for every field of a table, used to bind `WHERE`/
/// `CHECK` leaves via `expr::parse_simple_condition`.
pub fn column_infos(fields: &[FieldDescriptor]) -> Vec<expr::ColumnInfo> {
    fields
        .iter()
        .map(|f| expr::ColumnInfo {
            field_id: f.field_id,
            name: f.name.clone(),
            ty: f.ty,
            length: f.length,
        })
        .collect()
}

fn compare_op_to_str(op: expr::CompareOp) -> &'static str {
    use expr::CompareOp::*;
    match op {
        Eq => "=",
        Ne => "!=",
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        Like => "like",
        NotLike => "not like",
        IsNull => "is",
        IsNotNull => "is not",
    }
}

fn compare_op_from_str(s: &str) -> Option<expr::CompareOp> {
    use expr::CompareOp::*;
    Some(match s {
        "=" => Eq,
        "!=" => Ne,
        "<" => Lt,
        "<=" => Le,
        ">" => Gt,
        ">=" => Ge,
        "like" => Like,
        "not like" => NotLike,
        "is" => IsNull,
        "is not" => IsNotNull,
        _ => return None,
    })
}

/// Round-trip a bound `WHERE`/`CHECK` condition through the catalog crate's
/// storage-agnostic `CheckCondition` shape (`catalog` cannot depend on
/// `expr`, since `expr` already depends on `common`/`types` and a cycle
/// would result).
pub fn to_check_condition(cond: &expr::Condition) -> catalog::CheckCondition {
    catalog::CheckCondition {
        cond_type: cond.cond_type.to_u64(),
        left_field_id: cond.left_field_id,
        right_field_id: cond.right_field_id,
        op: compare_op_to_str(cond.op).to_string(),
        literal: cond.right_bytes.clone(),
    }
}

pub fn from_check_condition(check: &catalog::CheckCondition) -> DbResult<expr::Condition> {
    let cond_type = expr::CondType::from_u64(check.cond_type).ok_or(DbError::InvalidFieldName)?;
    let op = compare_op_from_str(&check.op).ok_or(DbError::InvalidFieldName)?;
    Ok(expr::Condition {
        cond_type,
        left_field_id: check.left_field_id,
        right_field_id: check.right_field_id,
        op,
        right_bytes: check.literal.clone(),
    })
}

pub fn seed_counter() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

/// One open table: its record file, every secondary index plus the always-
/// present primary-key index (keyed by field id), the `.idxcat`/`.chk`
/// sidecars, and the monotone counter backing a synthesized auto-PK (spec
/// §9: "an explicit monotonic counter ... seeded at startup from wall
/// time").
pub struct OpenTable {
    pub table: Table,
    pub indexes: HashMap<u64, BTreeIndex>,
    pub index_catalog: IndexCatalog,
    pub checks: CheckConstraints,
    next_auto_pk: u64,
}

impl OpenTable {
    fn open(dir: &Path, name: &str) -> DbResult<Self> {
        let table = Table::open(&table_path(dir, name))?;
        let pk = table
            .fields()
            .iter()
            .find(|f| f.is_pk)
            .expect("every table has exactly one primary key field")
            .clone();
        let mut indexes = HashMap::new();
        indexes.insert(
            pk.field_id,
            BTreeIndex::open(&pk_index_path(dir, name), pk.ty, pk.length as usize)?,
        );
        let index_catalog = IndexCatalog::load(&idxcat_path(dir, name))?;
        for (field_id, index_name) in &index_catalog.entries {
            let field = table
                .fields()
                .iter()
                .find(|f| f.field_id == *field_id)
                .ok_or(DbError::InvalidFieldName)?;
            indexes.insert(
                *field_id,
                BTreeIndex::open(
                    &index_path(dir, name, index_name),
                    field.ty,
                    field.length as usize,
                )?,
            );
        }
        let checks = CheckConstraints::load(&chk_path(dir, name))?;
        Ok(Self {
            table,
            indexes,
            index_catalog,
            checks,
            next_auto_pk: seed_counter(),
        })
    }

    fn next_auto_pk(&mut self) -> u64 {
        let id = self.next_auto_pk;
        self.next_auto_pk += 1;
        id
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        self.table.fields()
    }

    /// Remove one record and every index entry keyed by its field values
    /// (spec §4.4 `remove_record`).
    pub fn remove_record(&mut self, rid: common::Rid) -> DbResult<()> {
        let bytes = self.table.get(rid)?;
        for (field_id, index) in self.indexes.iter_mut() {
            let (offset, len, _ty) = field_offset(self.table.fields(), *field_id)
                .expect("indexed field always exists on its own table");
            index.remove(&bytes[offset..offset + len], rid)?;
        }
        self.table.delete(rid)
    }
}

/// The open-table cache for one database directory (spec §5: `tables_inuse`).
/// Every table is opened lazily on first reference and stays open (and its
/// buffer pool warm) until `close`/`close_all` is called, which `database`
/// does on `USE DATABASE`/shutdown.
pub struct TableSet {
    dir: PathBuf,
    tables: HashMap<String, OpenTable>,
}

impl TableSet {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            tables: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self, name: &str) -> bool {
        self.tables.contains_key(name) || table_path(&self.dir, name).exists()
    }

    /// Open `name` if it is not already cached, and return it.
    pub fn open(&mut self, name: &str) -> DbResult<&mut OpenTable> {
        if !self.tables.contains_key(name) {
            if !table_path(&self.dir, name).exists() {
                return Err(DbError::OpenTableFailed { cause: None });
            }
            let opened = OpenTable::open(&self.dir, name)?;
            self.tables.insert(name.to_string(), opened);
        }
        Ok(self.tables.get_mut(name).expect("just inserted"))
    }

    /// Install an already-constructed `OpenTable` (used by `ddl::create_table`,
    /// which builds one directly rather than round-tripping through disk).
    pub fn insert_open(&mut self, name: String, open: OpenTable) {
        self.tables.insert(name, open);
    }

    pub fn close(&mut self, name: &str) -> DbResult<()> {
        if let Some(mut open) = self.tables.remove(name) {
            open.table.flush()?;
            for index in open.indexes.values_mut() {
                index.flush()?;
            }
        }
        Ok(())
    }

    pub fn close_all(&mut self) -> DbResult<()> {
        let names: Vec<String> = self.tables.keys().cloned().collect();
        for name in names {
            self.close(&name)?;
        }
        Ok(())
    }

    pub fn forget(&mut self, name: &str) {
        self.tables.remove(name);
    }
}
