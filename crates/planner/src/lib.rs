//! Statement-shape validation shared by every multi-table operation (spec
//! §4.6): splitting a `WHERE`/selection clause into per-table simple
//! conditions and cross-table complex conditions, and the structural checks
//! (`GROUP BY`+`ORDER BY`, duplicate `FROM` tables) the executor would
//! otherwise have to repeat for every statement kind.
//!
//! This crate does not bind against a catalog: a simple condition here is
//! still an unbound [`expr::Expr`] leaf, keyed by the table name the leaf's
//! column(s) named it belongs to. The executor resolves those leaves against
//! a table's actual columns (via `expr::parse_simple_condition`) once it has
//! opened the table and knows its field ids.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use common::{ComplexSelectErrorKind, ConditionErrorKind, DbError, DbResult, SimpleSelectErrorKind};
use expr::{CompareOp, Expr};
use parser::OrderByExpr;

/// One cross-table leaf left over after [`split_where`]: both sides name a
/// column, each qualified to a *different* `FROM` table. The executor turns
/// these into an ordinary per-table condition once the left-hand table's
/// value is fixed during the nested-loop join (spec §4.6 step 5).
#[derive(Clone, Debug, PartialEq)]
pub struct ComplexCondition {
    pub left_table: String,
    pub left_field: String,
    pub op: CompareOp,
    pub right_table: String,
    pub right_field: String,
}

/// Result of splitting a selection clause across the tables named in `FROM`
/// (spec §4.6 step 2).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitWhere {
    /// Leaves that only reference one table, keyed by that table's `FROM`
    /// name. Every name in `from_tables` is present, possibly with an empty
    /// `Vec`.
    pub per_table: HashMap<String, Vec<Expr>>,
    /// Leaves that reference exactly two different tables.
    pub complex: Vec<Expr>,
}

fn invalid_operand() -> DbError {
    DbError::InvalidCondition {
        kind: ConditionErrorKind::InvalidConditionOperand,
    }
}

/// Every table name a `Column` reference inside `expr` names explicitly, in
/// first-seen order and without duplicates. An unqualified column does not
/// contribute a name — the caller resolves it against the single table in
/// scope.
fn qualified_tables(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Column { table: Some(t), .. } => {
            if !out.iter().any(|n| n == t) {
                out.push(t.clone());
            }
        }
        Expr::Column { table: None, .. } | Expr::Literal(_) | Expr::BoolLiteral(_) => {}
        Expr::And(l, r) => {
            qualified_tables(l, out);
            qualified_tables(r, out);
        }
        Expr::Compare { left, right, .. } => {
            qualified_tables(left, out);
            qualified_tables(right, out);
        }
        Expr::IsNull { expr, .. } => qualified_tables(expr, out),
    }
}

/// Split a selection clause's conjunction into per-table simple conditions
/// and cross-table complex conditions (spec §4.6 step 2). `from_tables` is
/// the table name list in `FROM` order. A single-table `FROM` binds every
/// leaf to that table regardless of whether its columns are qualified.
pub fn split_where(selection: Option<&Expr>, from_tables: &[String]) -> DbResult<SplitWhere> {
    let mut out = SplitWhere::default();
    for name in from_tables {
        out.per_table.entry(name.clone()).or_default();
    }
    let Some(selection) = selection else {
        return Ok(out);
    };

    for leaf in selection.flatten_and() {
        if from_tables.len() == 1 {
            out.per_table
                .get_mut(&from_tables[0])
                .expect("seeded above")
                .push(leaf.clone());
            continue;
        }

        let mut tables = Vec::new();
        qualified_tables(leaf, &mut tables);
        match tables.len() {
            0 => return Err(invalid_operand()),
            1 => {
                let table = &tables[0];
                if !from_tables.iter().any(|n| n == table) {
                    return Err(invalid_operand());
                }
                out.per_table
                    .get_mut(table)
                    .expect("seeded above")
                    .push(leaf.clone());
            }
            2 => out.complex.push(leaf.clone()),
            _ => return Err(invalid_operand()),
        }
    }
    Ok(out)
}

/// Decompose a complex leaf into its two sides' `(table, field)` references.
/// Fails if `expr` is not a plain `table.field op table.field` comparison —
/// the only shape [`split_where`] ever classifies as complex.
pub fn complex_condition(expr: &Expr) -> DbResult<ComplexCondition> {
    let Expr::Compare { left, op, right } = expr else {
        return Err(invalid_operand());
    };
    let (
        Expr::Column {
            table: Some(lt),
            name: lf,
        },
        Expr::Column {
            table: Some(rt),
            name: rf,
        },
    ) = (left.as_ref(), right.as_ref())
    else {
        return Err(invalid_operand());
    };
    Ok(ComplexCondition {
        left_table: lt.clone(),
        left_field: lf.clone(),
        op: *op,
        right_table: rt.clone(),
        right_field: rf.clone(),
    })
}

/// Reject a `FROM` clause that names the same table twice (spec §4.6 step 1).
pub fn check_no_duplicate_tables(tables: &[String]) -> DbResult<()> {
    let mut seen: Vec<&String> = Vec::new();
    for t in tables {
        if seen.contains(&t) {
            return Err(DbError::ComplexSelectFailed {
                kind: ComplexSelectErrorKind::DuplicateTableName,
                cause: None,
            });
        }
        seen.push(t);
    }
    Ok(())
}

/// Reject `GROUP BY` combined with `ORDER BY` (spec §4.6 step 7).
pub fn check_group_and_order(
    group_by: Option<&str>,
    order_by: Option<&OrderByExpr>,
) -> DbResult<()> {
    if group_by.is_some() && order_by.is_some() {
        return Err(DbError::SimpleSelectFailed {
            kind: SimpleSelectErrorKind::BothGroupAndOrder,
            cause: None,
        });
    }
    Ok(())
}
