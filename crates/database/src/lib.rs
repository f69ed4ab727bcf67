//! Database-level orchestration: `Engine` owns the active database
//! directory, the open-table cache (`executor::TableSet`), and the
//! foreign-key multimap, and is the one place that dispatches a parsed
//! [`parser::Statement`] to the `executor` function that implements it.
//!
//! `executor` deliberately has no `Statement` dispatcher of its own (it only
//! knows about `TableSet`/`ForeignKeyCatalog`), so `Engine::execute` is where
//! the database-level statements (`CREATE`/`DROP`/`USE DATABASE`, `SHOW
//! DATABASES`/`TABLES`) meet the table-level ones.

use std::fs;
use std::path::PathBuf;

use catalog::ForeignKeyCatalog;
use common::{Config, DatabaseErrorKind, DbError, DbResult, RecordBatch};
use executor::{ddl, dml, fk_paths, select, TableSet};
use parser::Statement;

fn create_db_err(kind: DatabaseErrorKind) -> DbError {
    DbError::CreateDbFailed { kind, cause: None }
}

fn drop_db_err(kind: DatabaseErrorKind) -> DbError {
    DbError::DropDbFailed { kind, cause: None }
}

fn use_db_err(kind: DatabaseErrorKind) -> DbError {
    DbError::UseDbFailed { kind, cause: None }
}

/// The currently-opened database: its directory, the `TableSet` caching its
/// open tables, and the foreign-key catalog for that directory.
struct OpenDatabase {
    name: String,
    tableset: TableSet,
    fk_catalog: ForeignKeyCatalog,
}

/// Top-level entry point wired to a parsed statement stream. One `Engine`
/// owns at most one open database at a time (spec §5: no concurrent,
/// multi-database access within a single process) and every table it has
/// opened stays resident until `USE DATABASE` switches away or the engine
/// is dropped.
pub struct Engine {
    root: PathBuf,
    current: Option<OpenDatabase>,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.data_dir.clone(),
            current: None,
        }
    }

    fn db_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Name of the currently open database, if any.
    pub fn current_database(&self) -> Option<&str> {
        self.current.as_ref().map(|db| db.name.as_str())
    }

    fn require_open(&mut self) -> DbResult<&mut OpenDatabase> {
        self.current.as_mut().ok_or(DbError::DbNotOpened)
    }

    fn create_database(&mut self, name: &str) -> DbResult<()> {
        let path = self.db_path(name);
        if path.exists() {
            return Err(create_db_err(DatabaseErrorKind::PathExisted));
        }
        fs::create_dir_all(&path)?;
        Ok(())
    }

    fn drop_database(&mut self, name: &str) -> DbResult<()> {
        let path = self.db_path(name);
        if !path.exists() {
            return Err(drop_db_err(DatabaseErrorKind::DbNotExists));
        }
        if self.current.as_ref().is_some_and(|db| db.name == name) {
            self.current = None;
        }
        fs::remove_dir_all(&path).map_err(|_| drop_db_err(DatabaseErrorKind::RemoveDbFailed))?;
        Ok(())
    }

    fn use_database(&mut self, name: &str) -> DbResult<()> {
        let path = self.db_path(name);
        if !path.exists() {
            return Err(use_db_err(DatabaseErrorKind::DbNotExists));
        }
        if let Some(mut db) = self.current.take() {
            db.tableset.close_all()?;
        }
        let (refed, _) = fk_paths(&path);
        let fk_catalog = ForeignKeyCatalog::load(&refed)?;
        self.current = Some(OpenDatabase {
            name: name.to_string(),
            tableset: TableSet::new(path),
            fk_catalog,
        });
        Ok(())
    }

    fn show_databases(&self) -> DbResult<RecordBatch> {
        let mut names = Vec::new();
        if self.root.exists() {
            for entry in fs::read_dir(&self.root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(RecordBatch {
            columns: vec!["database".to_string()],
            rows: names
                .into_iter()
                .map(|n| common::Row::new(vec![types::Value::Char(n)]))
                .collect(),
        })
    }

    fn show_tables(&self) -> DbResult<RecordBatch> {
        let db = self.current.as_ref().ok_or(DbError::DbNotOpened)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(db.tableset.dir())? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("tb") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(RecordBatch {
            columns: vec!["table".to_string()],
            rows: names
                .into_iter()
                .map(|n| common::Row::new(vec![types::Value::Char(n)]))
                .collect(),
        })
    }

    /// Parse and run exactly one statement, returning its result set (empty
    /// for DDL, an affected-row count for DML, and the projected rows for a
    /// `SELECT`/`DESC`/`SHOW`).
    pub fn execute(&mut self, sql: &str) -> DbResult<RecordBatch> {
        let mut statements = parser::parse_sql(sql)?;
        if statements.len() != 1 {
            return Err(DbError::ParseFailed {
                message: "expected exactly one statement".to_string(),
            });
        }
        self.execute_statement(statements.remove(0))
    }

    /// Parse and run every `;`-separated statement in `sql` in order,
    /// stopping at (and returning) the first error. Used by the REPL to feed
    /// a whole pasted script or file through in one call.
    pub fn execute_script(&mut self, sql: &str) -> DbResult<Vec<RecordBatch>> {
        let statements = parser::parse_sql(sql)?;
        statements
            .into_iter()
            .map(|stmt| self.execute_statement(stmt))
            .collect()
    }

    fn execute_statement(&mut self, statement: Statement) -> DbResult<RecordBatch> {
        match statement {
            Statement::CreateDatabase { name } => {
                self.create_database(&name)?;
                Ok(RecordBatch::empty())
            }
            Statement::DropDatabase { name } => {
                self.drop_database(&name)?;
                Ok(RecordBatch::empty())
            }
            Statement::UseDatabase { name } => {
                self.use_database(&name)?;
                Ok(RecordBatch::empty())
            }
            Statement::ShowDatabases => self.show_databases(),
            Statement::ShowTables => self.show_tables(),
            Statement::CreateTable {
                name,
                columns,
                primary_key,
                checks,
                foreign_keys,
            } => {
                let db = self.require_open()?;
                ddl::create_table(
                    &mut db.tableset,
                    &mut db.fk_catalog,
                    &name,
                    &columns,
                    primary_key.as_deref(),
                    &checks,
                    &foreign_keys,
                )?;
                Ok(RecordBatch::empty())
            }
            Statement::DropTable { name } => {
                let db = self.require_open()?;
                ddl::drop_table(&mut db.tableset, &mut db.fk_catalog, &name)?;
                Ok(RecordBatch::empty())
            }
            Statement::DescTable { name } => {
                let db = self.require_open()?;
                ddl::desc_table(&mut db.tableset, &name)
            }
            Statement::CreateIndex { name, table, column } => {
                let db = self.require_open()?;
                ddl::create_index(&mut db.tableset, &table, &name, &column)?;
                Ok(RecordBatch::empty())
            }
            Statement::DropIndex { name, table } => {
                let db = self.require_open()?;
                ddl::drop_index(&mut db.tableset, &table, &name)?;
                Ok(RecordBatch::empty())
            }
            Statement::Insert { table, rows } => {
                let db = self.require_open()?;
                let n = dml::insert(&mut db.tableset, &db.fk_catalog, &table, &rows)?;
                Ok(RecordBatch::affected("inserted", n))
            }
            Statement::Delete { table, selection } => {
                let db = self.require_open()?;
                let n = dml::delete(&mut db.tableset, &db.fk_catalog, &table, selection.as_ref())?;
                Ok(RecordBatch::affected("deleted", n))
            }
            Statement::Update {
                table,
                assignments,
                selection,
            } => {
                let db = self.require_open()?;
                let n = dml::update(
                    &mut db.tableset,
                    &db.fk_catalog,
                    &table,
                    &assignments,
                    selection.as_ref(),
                )?;
                Ok(RecordBatch::affected("updated", n))
            }
            Statement::Select {
                items,
                tables,
                selection,
                group_by,
                order_by,
            } => {
                let db = self.require_open()?;
                select::select(
                    &mut db.tableset,
                    &items,
                    &tables,
                    selection.as_ref(),
                    group_by.as_deref(),
                    order_by.as_ref(),
                )
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(db) = self.current.as_mut() {
            let _ = db.tableset.close_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine() -> (tempfile::TempDir, Engine) {
        let dir = tempdir().unwrap();
        let config = Config::builder().data_dir(dir.path().to_path_buf()).build();
        (dir, Engine::new(&config))
    }

    #[test]
    fn create_use_and_show_databases() {
        let (_dir, mut db) = engine();
        db.execute("CREATE DATABASE shop").unwrap();
        db.execute("CREATE DATABASE crm").unwrap();
        let batch = db.execute("SHOW DATABASES").unwrap();
        let names: Vec<String> = batch
            .rows
            .iter()
            .map(|r| match &r.values[0] {
                types::Value::Char(s) => s.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["crm".to_string(), "shop".to_string()]);

        db.execute("USE DATABASE shop").unwrap();
        assert_eq!(db.current_database(), Some("shop"));
    }

    #[test]
    fn creating_an_existing_database_is_rejected() {
        let (_dir, mut db) = engine();
        db.execute("CREATE DATABASE shop").unwrap();
        let err = db.execute("CREATE DATABASE shop").unwrap_err();
        assert!(matches!(err, DbError::CreateDbFailed { .. }));
    }

    #[test]
    fn using_an_unknown_database_is_rejected() {
        let (_dir, mut db) = engine();
        let err = db.execute("USE DATABASE ghost").unwrap_err();
        assert!(matches!(err, DbError::UseDbFailed { .. }));
    }

    #[test]
    fn statements_require_an_open_database() {
        let (_dir, mut db) = engine();
        let err = db
            .execute("CREATE TABLE users (id INT PRIMARY KEY, name CHAR(10) NOT NULL)")
            .unwrap_err();
        assert!(matches!(err, DbError::DbNotOpened));
    }

    #[test]
    fn drop_database_closes_tables_and_forgets_current() {
        let (_dir, mut db) = engine();
        db.execute("CREATE DATABASE shop").unwrap();
        db.execute("USE DATABASE shop").unwrap();
        db.execute("CREATE TABLE users (id INT PRIMARY KEY, name CHAR(10) NOT NULL)")
            .unwrap();
        db.execute("DROP DATABASE shop").unwrap();
        assert_eq!(db.current_database(), None);
        let batches = db
            .execute_script("CREATE DATABASE shop; USE DATABASE shop; SHOW TABLES")
            .unwrap();
        assert_eq!(batches.last().unwrap().rows.len(), 0);
    }

    #[test]
    fn end_to_end_script_creates_inserts_and_selects() {
        let (_dir, mut db) = engine();
        db.execute("CREATE DATABASE shop").unwrap();
        db.execute("USE DATABASE shop").unwrap();
        let results = db
            .execute_script(
                "CREATE TABLE users (id INT PRIMARY KEY, name CHAR(20) NOT NULL); \
                 INSERT INTO users VALUES (1, 'ada'); \
                 INSERT INTO users VALUES (2, 'grace'); \
                 SELECT * FROM users WHERE id = 1",
            )
            .unwrap();
        let select_batch = results.last().unwrap();
        assert_eq!(select_batch.rows.len(), 1);
        assert_eq!(
            select_batch.rows[0].values[1],
            types::Value::Char("ada".to_string())
        );
    }

    #[test]
    fn show_tables_lists_only_current_database() {
        let (_dir, mut db) = engine();
        db.execute("CREATE DATABASE shop").unwrap();
        db.execute("USE DATABASE shop").unwrap();
        db.execute("CREATE TABLE users (id INT PRIMARY KEY, name CHAR(10) NOT NULL)")
            .unwrap();
        db.execute("CREATE TABLE orders (id INT PRIMARY KEY, amount INT NOT NULL)")
            .unwrap();
        let batch = db.execute("SHOW TABLES").unwrap();
        let names: Vec<String> = batch
            .rows
            .iter()
            .map(|r| match &r.values[0] {
                types::Value::Char(s) => s.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["orders".to_string(), "users".to_string()]);
    }
}
