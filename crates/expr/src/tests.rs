use super::*;
use types::SqlType;

fn columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo {
            field_id: 0,
            name: "id".into(),
            ty: SqlType::U32,
            length: 5,
        },
        ColumnInfo {
            field_id: 1,
            name: "name".into(),
            ty: SqlType::Char,
            length: 17,
        },
        ColumnInfo {
            field_id: 2,
            name: "score".into(),
            ty: SqlType::I32,
            length: 5,
        },
    ]
}

fn col_expr(name: &str) -> Expr {
    Expr::Column {
        table: None,
        name: name.into(),
    }
}

fn encode_field(ty: SqlType, length: usize, value: &types::Value) -> Vec<u8> {
    let mut buf = vec![0u8; length];
    types::encode(value, ty, length, &mut buf).unwrap();
    buf
}

struct Record(Vec<(u64, SqlType, Vec<u8>)>);

impl FieldLookup for Record {
    fn field(&self, field_id: u64) -> Option<(SqlType, &[u8])> {
        self.0
            .iter()
            .find(|(id, _, _)| *id == field_id)
            .map(|(_, ty, bytes)| (*ty, bytes.as_slice()))
    }
}

#[test]
fn binds_literal_comparison() {
    let cols = columns();
    let expr = Expr::Compare {
        left: Box::new(col_expr("id")),
        op: CompareOp::Eq,
        right: Box::new(Expr::Literal("7".into())),
    };
    let cond = parse_simple_condition(&expr, &cols).unwrap();
    assert_eq!(cond.cond_type, CondType::RightIsLiteral);
    assert_eq!(cond.left_field_id, 0);
    assert_eq!(cond.op, CompareOp::Eq);
}

#[test]
fn normalizes_literal_on_left() {
    let cols = columns();
    let expr = Expr::Compare {
        left: Box::new(Expr::Literal("7".into())),
        op: CompareOp::Lt,
        right: Box::new(col_expr("id")),
    };
    let cond = parse_simple_condition(&expr, &cols).unwrap();
    // `7 < id` normalizes to `id > 7`.
    assert_eq!(cond.left_field_id, 0);
    assert_eq!(cond.op, CompareOp::Gt);
}

#[test]
fn bool_literals_fold_to_constants() {
    let cols = columns();
    assert_eq!(
        parse_simple_condition(&Expr::BoolLiteral(true), &cols).unwrap(),
        Condition::const_true()
    );
    assert_eq!(
        parse_simple_condition(&Expr::BoolLiteral(false), &cols).unwrap(),
        Condition::const_false()
    );
}

#[test]
fn field_to_field_requires_matching_type() {
    let cols = columns();
    let expr = Expr::Compare {
        left: Box::new(col_expr("id")),
        op: CompareOp::Eq,
        right: Box::new(col_expr("name")),
    };
    assert!(parse_simple_condition(&expr, &cols).is_err());
}

#[test]
fn field_to_field_requires_same_numeric_type() {
    let cols = columns();
    let expr = Expr::Compare {
        left: Box::new(col_expr("id")),
        op: CompareOp::Lt,
        right: Box::new(col_expr("score")),
    };
    // id is U32, score is I32 -- different declared types, rejected.
    assert!(parse_simple_condition(&expr, &cols).is_err());
}

#[test]
fn is_null_binds_against_null_flag() {
    let cols = columns();
    let expr = Expr::IsNull {
        expr: Box::new(col_expr("name")),
        negated: false,
    };
    let cond = parse_simple_condition(&expr, &cols).unwrap();
    assert_eq!(cond.op, CompareOp::IsNull);
    assert!(!cond.op.is_sargable());
}

#[test]
fn like_requires_string_literal() {
    let cols = columns();
    let bad = Expr::Compare {
        left: Box::new(col_expr("id")),
        op: CompareOp::Like,
        right: Box::new(Expr::Literal("5".into())),
    };
    assert!(parse_simple_condition(&bad, &cols).is_err());

    let ok = Expr::Compare {
        left: Box::new(col_expr("name")),
        op: CompareOp::Like,
        right: Box::new(Expr::Literal("a%".into())),
    };
    assert!(parse_simple_condition(&ok, &cols).is_ok());
}

#[test]
fn like_matches_wildcards_case_insensitively() {
    assert!(like_matches("Alice", "al%"));
    assert!(like_matches("bob", "b_b"));
    assert!(!like_matches("carol", "b_b"));
    assert!(like_matches("anything", "%"));
}

#[test]
fn meets_evaluates_conjunction() {
    let cols = columns();
    let id_eq_7 = parse_simple_condition(
        &Expr::Compare {
            left: Box::new(col_expr("id")),
            op: CompareOp::Eq,
            right: Box::new(Expr::Literal("7".into())),
        },
        &cols,
    )
    .unwrap();
    let score_gt_0 = parse_simple_condition(
        &Expr::Compare {
            left: Box::new(col_expr("score")),
            op: CompareOp::Gt,
            right: Box::new(Expr::Literal("0".into())),
        },
        &cols,
    )
    .unwrap();

    let matching = Record(vec![
        (0, SqlType::U32, encode_field(SqlType::U32, 5, &types::Value::U32(7))),
        (2, SqlType::I32, encode_field(SqlType::I32, 5, &types::Value::I32(10))),
    ]);
    assert!(meets(&matching, &[id_eq_7.clone(), score_gt_0.clone()]));

    let non_matching = Record(vec![
        (0, SqlType::U32, encode_field(SqlType::U32, 5, &types::Value::U32(8))),
        (2, SqlType::I32, encode_field(SqlType::I32, 5, &types::Value::I32(10))),
    ]);
    assert!(!meets(&non_matching, &[id_eq_7, score_gt_0]));
}

#[test]
fn null_comparand_is_never_true_except_is_null() {
    let cols = columns();
    let score_gt_0 = parse_simple_condition(
        &Expr::Compare {
            left: Box::new(col_expr("score")),
            op: CompareOp::Gt,
            right: Box::new(Expr::Literal("0".into())),
        },
        &cols,
    )
    .unwrap();
    let is_null = parse_simple_condition(
        &Expr::IsNull {
            expr: Box::new(col_expr("score")),
            negated: false,
        },
        &cols,
    )
    .unwrap();

    let record = Record(vec![(2, SqlType::I32, encode_field(SqlType::I32, 5, &types::Value::Null))]);
    assert!(!meets(&record, &[score_gt_0]));
    assert!(meets(&record, &[is_null]));
}

#[test]
fn flatten_and_collects_leaves_in_order() {
    let a = col_expr("id");
    let b = col_expr("name");
    let c = col_expr("score");
    let tree = Expr::And(
        Box::new(Expr::And(Box::new(a.clone()), Box::new(b.clone()))),
        Box::new(c.clone()),
    );
    let leaves = tree.flatten_and();
    assert_eq!(leaves, vec![&a, &b, &c]);
}
