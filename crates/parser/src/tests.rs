use super::*;
use expr::CompareOp;

#[test]
fn meta_statements() {
    let stmts = parse_sql(
        "CREATE DATABASE shop; USE DATABASE shop; SHOW TABLES; SHOW DATABASES; DESC widgets;",
    )
    .expect("meta statements should parse");
    assert_eq!(stmts.len(), 5);
    assert_eq!(stmts[0], Statement::CreateDatabase { name: "shop".into() });
    assert_eq!(stmts[1], Statement::UseDatabase { name: "shop".into() });
    assert_eq!(stmts[2], Statement::ShowTables);
    assert_eq!(stmts[3], Statement::ShowDatabases);
    assert_eq!(stmts[4], Statement::DescTable { name: "widgets".into() });
}

#[test]
fn use_without_database_keyword() {
    let stmts = parse_sql("USE shop;").unwrap();
    assert_eq!(stmts[0], Statement::UseDatabase { name: "shop".into() });
}

#[test]
fn create_index_and_drop_index() {
    let stmts = parse_sql("CREATE INDEX idx_name ON widgets (name); DROP INDEX idx_name ON widgets;")
        .unwrap();
    assert_eq!(
        stmts[0],
        Statement::CreateIndex {
            name: "idx_name".into(),
            table: "widgets".into(),
            column: "name".into(),
        }
    );
    assert_eq!(
        stmts[1],
        Statement::DropIndex {
            name: "idx_name".into(),
            table: "widgets".into(),
        }
    );
}

#[test]
fn create_table_with_pk_check_and_fk() {
    let sql = "CREATE TABLE widgets (\
        id INT PRIMARY KEY, \
        name CHAR(20) NOT NULL, \
        price INT CHECK (price > 0), \
        owner_id INT, \
        FOREIGN KEY (owner_id) REFERENCES users(id)\
    );";
    let stmts = parse_sql(sql).expect("create table should parse");
    match &stmts[0] {
        Statement::CreateTable {
            name,
            columns,
            primary_key,
            checks,
            foreign_keys,
        } => {
            assert_eq!(name, "widgets");
            assert_eq!(columns.len(), 4);
            assert_eq!(columns[1].ty, "CHAR");
            assert_eq!(columns[1].length, Some(20));
            assert!(columns[1].not_null);
            assert_eq!(primary_key.as_deref(), Some(&["id".to_string()][..]));
            assert_eq!(checks.len(), 1);
            assert_eq!(foreign_keys.len(), 1);
            assert_eq!(foreign_keys[0].field, "owner_id");
            assert_eq!(foreign_keys[0].ref_table, "users");
            assert_eq!(foreign_keys[0].ref_field, "id");
        }
        other => panic!("expected CreateTable, got {other:?}"),
    }
}

#[test]
fn multi_row_insert() {
    let stmts = parse_sql("INSERT INTO widgets VALUES (1, 'a'), (2, 'b');").unwrap();
    match &stmts[0] {
        Statement::Insert { table, rows } => {
            assert_eq!(table, "widgets");
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[1][1], Expr::Literal("b".into()));
        }
        other => panic!("expected Insert, got {other:?}"),
    }
}

#[test]
fn select_multi_table_with_where_group_and_order() {
    let stmts = parse_sql(
        "SELECT a.id, SUM(b.amount) FROM a, b WHERE a.id = b.owner_id GROUP BY a.id;",
    )
    .unwrap();
    match &stmts[0] {
        Statement::Select {
            items,
            tables,
            selection,
            group_by,
            order_by,
        } => {
            assert_eq!(
                tables,
                &vec![
                    TableRef { name: "a".to_string(), alias: "a".to_string() },
                    TableRef { name: "b".to_string(), alias: "b".to_string() },
                ]
            );
            assert_eq!(items.len(), 2);
            assert_eq!(
                items[1],
                SelectItem::Aggregate {
                    func: AggregateFnName::Sum,
                    table: Some("b".into()),
                    column: "amount".into(),
                }
            );
            assert!(selection.is_some());
            assert_eq!(group_by.as_deref(), Some("id"));
            assert!(order_by.is_none());
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn count_star() {
    let stmts = parse_sql("SELECT COUNT(*) FROM widgets;").unwrap();
    match &stmts[0] {
        Statement::Select { items, .. } => {
            assert_eq!(
                items[0],
                SelectItem::Aggregate {
                    func: AggregateFnName::Count,
                    table: None,
                    column: "*".into(),
                }
            );
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn order_by_desc() {
    let stmts = parse_sql("SELECT * FROM widgets ORDER BY price DESC;").unwrap();
    match &stmts[0] {
        Statement::Select { order_by, .. } => {
            let order_by = order_by.as_ref().unwrap();
            assert_eq!(order_by.column, "price");
            assert_eq!(order_by.direction, SortDirection::Desc);
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn where_like_and_is_null() {
    let stmts = parse_sql("SELECT * FROM widgets WHERE name LIKE 'bolt%' AND price IS NOT NULL;")
        .unwrap();
    match &stmts[0] {
        Statement::Select { selection, .. } => {
            let leaves = selection.as_ref().unwrap().flatten_and();
            assert_eq!(leaves.len(), 2);
            match leaves[0] {
                Expr::Compare { op, .. } => assert_eq!(*op, CompareOp::Like),
                other => panic!("expected Compare, got {other:?}"),
            }
            match leaves[1] {
                Expr::IsNull { negated, .. } => assert!(negated),
                other => panic!("expected IsNull, got {other:?}"),
            }
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn bare_boolean_where_folds_to_bool_literal() {
    let stmts = parse_sql("DELETE FROM widgets WHERE true;").unwrap();
    match &stmts[0] {
        Statement::Delete { selection, .. } => {
            assert_eq!(selection, &Some(Expr::BoolLiteral(true)));
        }
        other => panic!("expected Delete, got {other:?}"),
    }
}

#[test]
fn rejects_or_in_where() {
    let err = parse_sql("SELECT * FROM widgets WHERE id = 1 OR id = 2;").unwrap_err();
    assert!(matches!(err, DbError::ParseFailed { .. }));
}

#[test]
fn rejects_explicit_join_syntax() {
    let err = parse_sql("SELECT * FROM a JOIN b ON a.id = b.a_id;").unwrap_err();
    assert!(matches!(err, DbError::ParseFailed { .. }));
}

#[test]
fn update_and_delete() {
    let stmts = parse_sql("UPDATE widgets SET price = 9 WHERE id = 1; DELETE FROM widgets WHERE id = 1;")
        .unwrap();
    match &stmts[0] {
        Statement::Update {
            table, assignments, ..
        } => {
            assert_eq!(table, "widgets");
            assert_eq!(assignments[0].0, "price");
        }
        other => panic!("expected Update, got {other:?}"),
    }
    assert!(matches!(stmts[1], Statement::Delete { .. }));
}

#[test]
fn self_join_carries_distinct_aliases() {
    let stmts = parse_sql("SELECT a.id, b.iq FROM t a, t b WHERE a.id = b.id;").unwrap();
    match &stmts[0] {
        Statement::Select { tables, .. } => {
            assert_eq!(
                tables,
                &vec![
                    TableRef { name: "t".to_string(), alias: "a".to_string() },
                    TableRef { name: "t".to_string(), alias: "b".to_string() },
                ]
            );
        }
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn from_table_without_alias_keeps_name_as_alias() {
    let stmts = parse_sql("SELECT * FROM widgets;").unwrap();
    match &stmts[0] {
        Statement::Select { tables, .. } => {
            assert_eq!(tables, &vec![TableRef { name: "widgets".to_string(), alias: "widgets".to_string() }]);
        }
        other => panic!("expected Select, got {other:?}"),
    }
}
