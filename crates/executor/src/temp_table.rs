//! RAII scratch tables backing join/group intermediate results (spec §4.6
//! steps 4/6): a plain [`storage::Table`] under a throwaway name, removed
//! from disk as soon as its guard drops, win or lose.

use std::path::{Path, PathBuf};

use storage::{FieldDescriptor, Table};

/// A [`storage::Table`] that exists only for the lifetime of one `SELECT`
/// pipeline stage. Unlike a real table it carries no indexes, no
/// constraints, and no catalog entry — callers insert pre-encoded rows and
/// scan them back in whatever order `Table::scan` returns.
pub struct TempTableGuard {
    path: PathBuf,
    table: Option<Table>,
}

impl TempTableGuard {
    /// Create a new temp table at `dir/<unique_name>.tmp` with `fields` as
    /// its schema. `unique_name` must not collide with any other temp table
    /// concurrently live in `dir` within this process.
    pub fn create(dir: &Path, unique_name: &str, fields: Vec<FieldDescriptor>) -> common::DbResult<Self> {
        let path = dir.join(format!("{unique_name}.tmp"));
        let table = Table::create(&path, unique_name, fields)?;
        Ok(Self {
            path,
            table: Some(table),
        })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        self.table.as_ref().expect("not yet dropped").fields()
    }

    /// Append one already-encoded record (the concatenation of its fields'
    /// fixed-length slots, matching `fields()`'s order).
    pub fn insert_raw(&mut self, encoded_record: &[u8]) -> common::DbResult<common::Rid> {
        self.table.as_mut().expect("not yet dropped").insert(encoded_record)
    }

    /// Every record currently in the temp table, in page/slot order.
    pub fn scan(&mut self) -> common::DbResult<Vec<(common::Rid, Vec<u8>)>> {
        self.table.as_mut().expect("not yet dropped").scan()
    }
}

impl Drop for TempTableGuard {
    fn drop(&mut self) {
        if let Some(mut table) = self.table.take() {
            let _ = table.flush();
        }
        let _ = Table::remove(&self.path);
    }
}
