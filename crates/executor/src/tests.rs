use catalog::ForeignKeyCatalog;
use common::{DbError, DbResult, RecordBatch};
use parser::Statement;
use tempfile::tempdir;
use types::Value;

use crate::{ddl, dml, select, TableSet};

/// Minimal SQL dispatcher standing in for `database::Engine::execute`,
/// enough to drive the executor crate's own tests end to end.
fn exec(tableset: &mut TableSet, fk_catalog: &mut ForeignKeyCatalog, sql: &str) -> DbResult<RecordBatch> {
    let mut statements = parser::parse_sql(sql)?;
    assert_eq!(statements.len(), 1, "test helper expects one statement at a time");
    match statements.remove(0) {
        Statement::CreateTable {
            name,
            columns,
            primary_key,
            checks,
            foreign_keys,
        } => {
            ddl::create_table(
                tableset,
                fk_catalog,
                &name,
                &columns,
                primary_key.as_deref(),
                &checks,
                &foreign_keys,
            )?;
            Ok(RecordBatch::empty())
        }
        Statement::DropTable { name } => {
            ddl::drop_table(tableset, fk_catalog, &name)?;
            Ok(RecordBatch::empty())
        }
        Statement::DescTable { name } => ddl::desc_table(tableset, &name),
        Statement::CreateIndex { name, table, column } => {
            ddl::create_index(tableset, &table, &name, &column)?;
            Ok(RecordBatch::empty())
        }
        Statement::DropIndex { name, table } => {
            ddl::drop_index(tableset, &table, &name)?;
            Ok(RecordBatch::empty())
        }
        Statement::Insert { table, rows } => {
            let n = dml::insert(tableset, fk_catalog, &table, &rows)?;
            Ok(RecordBatch::affected("inserted", n))
        }
        Statement::Delete { table, selection } => {
            let n = dml::delete(tableset, fk_catalog, &table, selection.as_ref())?;
            Ok(RecordBatch::affected("deleted", n))
        }
        Statement::Update {
            table,
            assignments,
            selection,
        } => {
            let n = dml::update(tableset, fk_catalog, &table, &assignments, selection.as_ref())?;
            Ok(RecordBatch::affected("updated", n))
        }
        Statement::Select {
            items,
            tables,
            selection,
            group_by,
            order_by,
        } => select::select(
            tableset,
            &items,
            &tables,
            selection.as_ref(),
            group_by.as_deref(),
            order_by.as_ref(),
        ),
        other => panic!("test helper does not support {other:?}"),
    }
}

fn harness() -> (tempfile::TempDir, TableSet, ForeignKeyCatalog) {
    let dir = tempdir().unwrap();
    let tableset = TableSet::new(dir.path().to_path_buf());
    (dir, tableset, ForeignKeyCatalog::default())
}

#[test]
fn insert_then_select_round_trips_values() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE users (id INT PRIMARY KEY, name CHAR(20) NOT NULL)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO users VALUES (1, 'alice')").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO users VALUES (2, 'bob')").unwrap();

    let batch = exec(&mut ts, &mut fk, "SELECT * FROM users").unwrap();
    assert_eq!(batch.rows.len(), 2);
    assert!(batch.rows.iter().any(|r| r.values == vec![Value::I32(1), Value::Char("alice".into())]));
    assert!(batch.rows.iter().any(|r| r.values == vec![Value::I32(2), Value::Char("bob".into())]));
}

#[test]
fn duplicate_primary_key_is_rejected() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE users (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO users VALUES (1, 'alice')").unwrap();

    let err = exec(&mut ts, &mut fk, "INSERT INTO users VALUES (1, 'carol')").unwrap_err();
    assert!(matches!(err, DbError::InsertRecordFailed { .. }));

    // the table must be unchanged after the rejected insert.
    let batch = exec(&mut ts, &mut fk, "SELECT * FROM users").unwrap();
    assert_eq!(batch.rows.len(), 1);
}

#[test]
fn multi_row_insert_rolls_back_entirely_on_later_failure() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE users (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO users VALUES (1, 'alice')").unwrap();

    // second row in this statement collides with the already-committed row.
    let err = exec(
        &mut ts,
        &mut fk,
        "INSERT INTO users VALUES (2, 'bob'), (1, 'dup')",
    )
    .unwrap_err();
    assert!(matches!(err, DbError::InsertRecordFailed { .. }));

    let batch = exec(&mut ts, &mut fk, "SELECT * FROM users").unwrap();
    assert_eq!(batch.rows.len(), 1, "row 2 inserted earlier in the statement must be rolled back");
}

#[test]
fn not_null_violation_is_rejected() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE users (id INT PRIMARY KEY, name CHAR(20) NOT NULL)").unwrap();
    let err = exec(&mut ts, &mut fk, "INSERT INTO users VALUES (1, NULL)").unwrap_err();
    assert!(matches!(err, DbError::InsertRecordFailed { .. }));
}

#[test]
fn check_constraint_rejects_invalid_value() {
    let (_dir, mut ts, mut fk) = harness();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE accounts (id INT PRIMARY KEY, balance INT CHECK (balance >= 0))",
    )
    .unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO accounts VALUES (1, 100)").unwrap();
    let err = exec(&mut ts, &mut fk, "INSERT INTO accounts VALUES (2, -5)").unwrap_err();
    assert!(matches!(err, DbError::InsertRecordFailed { .. }));
}

#[test]
fn foreign_key_insert_is_validated_against_referenced_table() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE depts (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE emps (id INT PRIMARY KEY, dept_id INT, FOREIGN KEY (dept_id) REFERENCES depts(id))",
    )
    .unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO depts VALUES (1, 'eng')").unwrap();

    exec(&mut ts, &mut fk, "INSERT INTO emps VALUES (1, 1)").unwrap();
    let err = exec(&mut ts, &mut fk, "INSERT INTO emps VALUES (2, 99)").unwrap_err();
    assert!(matches!(err, DbError::InsertRecordFailed { .. }));
}

#[test]
fn drop_table_blocked_while_referenced() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE depts (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE emps (id INT PRIMARY KEY, dept_id INT, FOREIGN KEY (dept_id) REFERENCES depts(id))",
    )
    .unwrap();

    let err = exec(&mut ts, &mut fk, "DROP TABLE depts").unwrap_err();
    assert!(matches!(err, DbError::DropTableFailed { .. }));

    exec(&mut ts, &mut fk, "DROP TABLE emps").unwrap();
    exec(&mut ts, &mut fk, "DROP TABLE depts").unwrap();
}

#[test]
fn delete_blocked_while_row_is_referenced() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE depts (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE emps (id INT PRIMARY KEY, dept_id INT, FOREIGN KEY (dept_id) REFERENCES depts(id))",
    )
    .unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO depts VALUES (1, 'eng')").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO emps VALUES (1, 1)").unwrap();

    let err = exec(&mut ts, &mut fk, "DELETE FROM depts WHERE id = 1").unwrap_err();
    assert!(matches!(err, DbError::DeleteRecordFailed { .. }));

    exec(&mut ts, &mut fk, "DELETE FROM emps WHERE id = 1").unwrap();
    exec(&mut ts, &mut fk, "DELETE FROM depts WHERE id = 1").unwrap();
    let batch = exec(&mut ts, &mut fk, "SELECT * FROM depts").unwrap();
    assert!(batch.rows.is_empty());
}

#[test]
fn update_rolls_back_all_rows_on_later_duplicate_pk() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE users (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO users VALUES (1, 'alice')").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO users VALUES (2, 'bob')").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO users VALUES (3, 'carol')").unwrap();

    let err = exec(&mut ts, &mut fk, "UPDATE users SET id = 3 WHERE id = 2").unwrap_err();
    assert!(matches!(err, DbError::UpdateRecordFailed { .. }));

    let batch = exec(&mut ts, &mut fk, "SELECT * FROM users WHERE id = 2").unwrap();
    assert_eq!(batch.rows.len(), 1, "the row must still carry its original id after the rejected update");
}

#[test]
fn update_old_value_still_referenced_blocks_pk_change() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE depts (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE emps (id INT PRIMARY KEY, dept_id INT, FOREIGN KEY (dept_id) REFERENCES depts(id))",
    )
    .unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO depts VALUES (1, 'eng')").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO emps VALUES (1, 1)").unwrap();

    let err = exec(&mut ts, &mut fk, "UPDATE depts SET id = 2 WHERE id = 1").unwrap_err();
    assert!(matches!(err, DbError::UpdateRecordFailed { .. }));
}

#[test]
fn sargable_equality_select_uses_primary_key_index() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE users (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    for i in 0..5 {
        exec(&mut ts, &mut fk, &format!("INSERT INTO users VALUES ({i}, 'n{i}')")).unwrap();
    }
    let batch = exec(&mut ts, &mut fk, "SELECT name FROM users WHERE id = 3").unwrap();
    assert_eq!(batch.rows.len(), 1);
    assert_eq!(batch.rows[0].values, vec![Value::Char("n3".into())]);
}

#[test]
fn range_select_over_secondary_index() {
    let (_dir, mut ts, mut fk) = harness();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE users (id INT PRIMARY KEY, age INT)",
    )
    .unwrap();
    exec(&mut ts, &mut fk, "CREATE INDEX idx_age ON users(age)").unwrap();
    for (id, age) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
        exec(&mut ts, &mut fk, &format!("INSERT INTO users VALUES ({id}, {age})")).unwrap();
    }

    let batch = exec(&mut ts, &mut fk, "SELECT id FROM users WHERE age >= 20 AND age < 40").unwrap();
    let ids: Vec<i64> = batch.rows.iter().map(|r| r.values[0].as_i64().unwrap()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(sorted, vec![2, 3]);
}

#[test]
fn is_null_and_is_not_null_conditions() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE t (id INT PRIMARY KEY, note CHAR(10))").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO t VALUES (1, NULL)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO t VALUES (2, 'hi')").unwrap();

    let nulls = exec(&mut ts, &mut fk, "SELECT id FROM t WHERE note IS NULL").unwrap();
    assert_eq!(nulls.rows.len(), 1);
    assert_eq!(nulls.rows[0].values[0], Value::I32(1));

    let not_nulls = exec(&mut ts, &mut fk, "SELECT id FROM t WHERE note IS NOT NULL").unwrap();
    assert_eq!(not_nulls.rows.len(), 1);
    assert_eq!(not_nulls.rows[0].values[0], Value::I32(2));
}

#[test]
fn group_by_with_count_and_sum() {
    let (_dir, mut ts, mut fk) = harness();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE orders (id INT PRIMARY KEY, dept CHAR(10), amount INT)",
    )
    .unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO orders VALUES (1, 'eng', 100)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO orders VALUES (2, 'eng', 50)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO orders VALUES (3, 'sales', 30)").unwrap();

    let batch = exec(
        &mut ts,
        &mut fk,
        "SELECT dept, COUNT(*), SUM(amount) FROM orders GROUP BY dept",
    )
    .unwrap();
    assert_eq!(batch.rows.len(), 2);
    for row in &batch.rows {
        let dept = match &row.values[0] {
            Value::Char(s) => s.trim_end_matches('\0').to_string(),
            other => panic!("unexpected dept value: {other:?}"),
        };
        match dept.as_str() {
            "eng" => {
                assert_eq!(row.values[1], Value::U64(2));
                assert_eq!(row.values[2].as_i64(), Some(150));
            }
            "sales" => {
                assert_eq!(row.values[1], Value::U64(1));
                assert_eq!(row.values[2].as_i64(), Some(30));
            }
            other => panic!("unexpected dept {other}"),
        }
    }
}

#[test]
fn order_by_sorts_rows() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE t (id INT PRIMARY KEY, score INT)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO t VALUES (1, 30)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO t VALUES (2, 10)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO t VALUES (3, 20)").unwrap();

    let batch = exec(&mut ts, &mut fk, "SELECT id FROM t ORDER BY score").unwrap();
    let ids: Vec<i64> = batch.rows.iter().map(|r| r.values[0].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 3, 1]);

    let desc = exec(&mut ts, &mut fk, "SELECT id FROM t ORDER BY score DESC").unwrap();
    let ids_desc: Vec<i64> = desc.rows.iter().map(|r| r.values[0].as_i64().unwrap()).collect();
    assert_eq!(ids_desc, vec![1, 3, 2]);
}

#[test]
fn two_table_join_on_equality() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE depts (id INT PRIMARY KEY, name CHAR(20))").unwrap();
    exec(
        &mut ts,
        &mut fk,
        "CREATE TABLE emps (id INT PRIMARY KEY, dept_id INT, FOREIGN KEY (dept_id) REFERENCES depts(id))",
    )
    .unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO depts VALUES (1, 'eng')").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO depts VALUES (2, 'sales')").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO emps VALUES (10, 1)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO emps VALUES (11, 2)").unwrap();

    let batch = exec(
        &mut ts,
        &mut fk,
        "SELECT emps.id, depts.name FROM emps, depts WHERE emps.dept_id = depts.id",
    )
    .unwrap();
    assert_eq!(batch.rows.len(), 2);
    assert!(batch
        .rows
        .iter()
        .any(|r| r.values[0] == Value::I32(10) && r.values[1] == Value::Char("eng".into())));
    assert!(batch
        .rows
        .iter()
        .any(|r| r.values[0] == Value::I32(11) && r.values[1] == Value::Char("sales".into())));
}

#[test]
fn self_join_through_aliases() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE t (id INT PRIMARY KEY, iq INT)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO t VALUES (1, 100)").unwrap();
    exec(&mut ts, &mut fk, "INSERT INTO t VALUES (2, 130)").unwrap();

    let batch = exec(
        &mut ts,
        &mut fk,
        "SELECT a.id, b.iq FROM t a, t b WHERE a.id = b.id",
    )
    .unwrap();
    assert_eq!(batch.rows.len(), 2);
    assert!(batch
        .rows
        .iter()
        .any(|r| r.values[0] == Value::I32(1) && r.values[1] == Value::I32(100)));
    assert!(batch
        .rows
        .iter()
        .any(|r| r.values[0] == Value::I32(2) && r.values[1] == Value::I32(130)));
}

#[test]
fn group_by_and_order_by_together_is_rejected() {
    let (_dir, mut ts, mut fk) = harness();
    exec(&mut ts, &mut fk, "CREATE TABLE t (id INT PRIMARY KEY, g CHAR(10))").unwrap();
    let err = exec(&mut ts, &mut fk, "SELECT g FROM t GROUP BY g ORDER BY g").unwrap_err();
    assert!(matches!(err, DbError::SimpleSelectFailed { .. }));
}
