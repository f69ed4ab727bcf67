use super::*;
use parser::SortDirection;

fn col(table: &str, name: &str) -> Expr {
    Expr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

fn lit(text: &str) -> Expr {
    Expr::Literal(text.to_string())
}

fn cmp(left: Expr, op: CompareOp, right: Expr) -> Expr {
    Expr::Compare {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[test]
fn single_table_binds_unqualified_columns() {
    let from = vec!["widgets".to_string()];
    let where_clause = cmp(
        Expr::Column { table: None, name: "price".into() },
        CompareOp::Gt,
        lit("10"),
    );
    let split = split_where(Some(&where_clause), &from).unwrap();
    assert_eq!(split.per_table["widgets"].len(), 1);
    assert!(split.complex.is_empty());
}

#[test]
fn two_table_splits_simple_and_complex() {
    let from = vec!["orders".to_string(), "customers".to_string()];
    let where_clause = Expr::And(
        Box::new(cmp(col("orders", "status"), CompareOp::Eq, lit("'shipped'"))),
        Box::new(cmp(
            col("orders", "customer_id"),
            CompareOp::Eq,
            col("customers", "id"),
        )),
    );
    let split = split_where(Some(&where_clause), &from).unwrap();
    assert_eq!(split.per_table["orders"].len(), 1);
    assert_eq!(split.per_table["customers"].len(), 0);
    assert_eq!(split.complex.len(), 1);

    let complex = complex_condition(&split.complex[0]).unwrap();
    assert_eq!(complex.left_table, "orders");
    assert_eq!(complex.left_field, "customer_id");
    assert_eq!(complex.right_table, "customers");
    assert_eq!(complex.right_field, "id");
}

#[test]
fn no_where_clause_seeds_every_table_empty() {
    let from = vec!["a".to_string(), "b".to_string()];
    let split = split_where(None, &from).unwrap();
    assert_eq!(split.per_table.len(), 2);
    assert!(split.per_table["a"].is_empty());
    assert!(split.per_table["b"].is_empty());
    assert!(split.complex.is_empty());
}

#[test]
fn leaf_naming_unknown_table_is_rejected() {
    let from = vec!["orders".to_string(), "customers".to_string()];
    let where_clause = cmp(col("shipments", "id"), CompareOp::Eq, lit("1"));
    let err = split_where(Some(&where_clause), &from).unwrap_err();
    assert!(matches!(err, DbError::InvalidCondition { .. }));
}

#[test]
fn leaf_spanning_two_of_three_from_tables_is_complex() {
    let from = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let where_clause = cmp(col("a", "x"), CompareOp::Eq, col("b", "y"));
    let split = split_where(Some(&where_clause), &from).unwrap();
    assert_eq!(split.complex.len(), 1);
}

#[test]
fn duplicate_from_table_rejected() {
    let err = check_no_duplicate_tables(&["a".to_string(), "b".to_string(), "a".to_string()])
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::ComplexSelectFailed {
            kind: ComplexSelectErrorKind::DuplicateTableName,
            ..
        }
    ));
}

#[test]
fn distinct_from_tables_allowed() {
    check_no_duplicate_tables(&["a".to_string(), "b".to_string()]).unwrap();
}

#[test]
fn group_by_and_order_by_together_rejected() {
    let order = OrderByExpr {
        column: "id".into(),
        direction: SortDirection::Asc,
    };
    let err = check_group_and_order(Some("category"), Some(&order)).unwrap_err();
    assert!(matches!(
        err,
        DbError::SimpleSelectFailed {
            kind: SimpleSelectErrorKind::BothGroupAndOrder,
            ..
        }
    ));
}

#[test]
fn group_by_alone_is_fine() {
    check_group_and_order(Some("category"), None).unwrap();
}

#[test]
fn order_by_alone_is_fine() {
    let order = OrderByExpr {
        column: "id".into(),
        direction: SortDirection::Asc,
    };
    check_group_and_order(None, Some(&order)).unwrap();
}

#[test]
fn complex_condition_rejects_non_compare() {
    let err = complex_condition(&Expr::BoolLiteral(true)).unwrap_err();
    assert!(matches!(err, DbError::InvalidCondition { .. }));
}
