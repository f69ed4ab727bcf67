//! `SELECT` (spec §4.6.a-b simple/complex select): sargable per-table
//! narrowing through whichever secondary indexes apply, nested-loop join
//! across the remaining `FROM` tables, then in-memory group/aggregate,
//! order, and projection.

use std::collections::HashMap;

use common::{DbError, DbResult, Rid, SimpleSelectErrorKind};
use parser::{AggregateFnName, OrderByExpr, SelectItem, SortDirection, TableRef};
use storage::FieldDescriptor;
use types::SqlType;

use crate::temp_table::TempTableGuard;
use crate::{column_infos, field_offset, OpenTable, RecordFields, TableSet};

fn intersect_rids(a: Vec<Rid>, b: Vec<Rid>) -> Vec<Rid> {
    a.into_iter().filter(|r| b.contains(r)).collect()
}

/// Every `Rid` of `open`'s table that satisfies `conditions`, narrowed
/// through whichever conditions are sargable against an existing index
/// before falling back to a full scan, then always re-checked with
/// `expr::meets` (spec §4.6.a: index lookups are a safe superset, never the
/// final word — `>` is boundary-inclusive through the index and `<=`/`!=`
/// are not narrowed through it at all).
pub fn candidate_rids_for_table(open: &mut OpenTable, conditions: &[expr::Condition]) -> DbResult<Vec<Rid>> {
    let fields = open.table.fields().to_vec();
    let mut narrowed: Option<Vec<Rid>> = None;

    for cond in conditions {
        if cond.cond_type != expr::CondType::RightIsLiteral {
            continue;
        }
        let Some(field) = fields.iter().find(|f| f.field_id == cond.left_field_id).cloned() else {
            continue;
        };
        if !open.indexes.contains_key(&field.field_id) {
            continue;
        }
        let len = field.length as usize;
        let index = open.indexes.get_mut(&field.field_id).expect("checked above");
        let rids = match cond.op {
            expr::CompareOp::Eq => index.search(&cond.right_bytes)?,
            expr::CompareOp::Lt => index.range(&types::min_value(field.ty, len), &cond.right_bytes)?,
            expr::CompareOp::Ge => index.range(&cond.right_bytes, &types::max_value(field.ty, len))?,
            expr::CompareOp::Gt => index.range(&cond.right_bytes, &types::max_value(field.ty, len))?,
            _ => continue,
        };
        narrowed = Some(match narrowed {
            None => rids,
            Some(existing) => intersect_rids(existing, rids),
        });
    }

    let candidates: Vec<Rid> = match narrowed {
        Some(rids) => rids,
        None => open.table.scan()?.into_iter().map(|(rid, _)| rid).collect(),
    };

    let mut out = Vec::with_capacity(candidates.len());
    for rid in candidates {
        let bytes = open.table.get(rid)?;
        let lookup = RecordFields { fields: &fields, bytes: &bytes };
        if expr::meets(&lookup, conditions) {
            out.push(rid);
        }
    }
    Ok(out)
}

fn resolve_field<'a>(
    schema: &'a [(String, FieldDescriptor)],
    table: Option<&str>,
    name: &str,
) -> Option<(usize, &'a FieldDescriptor)> {
    let mut offset = 0usize;
    for (t, f) in schema {
        let name_matches = f.name.eq_ignore_ascii_case(name);
        let table_matches = table.map_or(true, |want| want.eq_ignore_ascii_case(t));
        if name_matches && table_matches {
            return Some((offset, f));
        }
        offset += f.length as usize;
    }
    None
}

fn table_in_schema(schema: &[(String, FieldDescriptor)], name: &str) -> bool {
    schema.iter().any(|(t, _)| t == name)
}

fn joined_field_bytes<'a>(
    schema: &'a [(String, FieldDescriptor)],
    bytes: &'a [u8],
    table: &str,
    field_name: &str,
) -> Option<(SqlType, &'a [u8])> {
    let mut offset = 0usize;
    for (t, f) in schema {
        if t == table && f.name.eq_ignore_ascii_case(field_name) {
            return Some((f.ty, &bytes[offset..offset + f.length as usize]));
        }
        offset += f.length as usize;
    }
    None
}

fn compare_with_op(lbytes: &[u8], rbytes: &[u8], ty: SqlType, op: expr::CompareOp) -> bool {
    if lbytes.first() == Some(&0x00) || rbytes.first() == Some(&0x00) {
        return false;
    }
    let ord = types::compare(lbytes, rbytes, ty);
    match op {
        expr::CompareOp::Eq => ord == std::cmp::Ordering::Equal,
        expr::CompareOp::Ne => ord != std::cmp::Ordering::Equal,
        expr::CompareOp::Lt => ord == std::cmp::Ordering::Less,
        expr::CompareOp::Le => ord != std::cmp::Ordering::Greater,
        expr::CompareOp::Gt => ord == std::cmp::Ordering::Greater,
        expr::CompareOp::Ge => ord != std::cmp::Ordering::Less,
        _ => false,
    }
}

/// Does a cross-table condition hold between a row already folded into the
/// join (`old_bytes`, spanning `old_schema`) and a fresh row of the table
/// being folded in next (`new_bytes`, spanning `new_fields`)? `cc` names its
/// operands by table, so whichever side matches `new_table` decides which
/// way (and, for a non-symmetric operator, whether to flip) the comparison
/// runs (spec §4.6.b: complex conditions compare two named tables).
#[allow(clippy::too_many_arguments)]
fn complex_cond_holds(
    cc: &planner::ComplexCondition,
    old_schema: &[(String, FieldDescriptor)],
    old_bytes: &[u8],
    new_table: &str,
    new_fields: &[FieldDescriptor],
    new_bytes: &[u8],
) -> bool {
    let (old_table, old_field, new_field, op) = if table_in_schema(old_schema, &cc.left_table) && cc.right_table == new_table {
        (cc.left_table.as_str(), cc.left_field.as_str(), cc.right_field.as_str(), cc.op)
    } else if table_in_schema(old_schema, &cc.right_table) && cc.left_table == new_table {
        let Some(flipped) = cc.op.flip() else {
            return false;
        };
        (cc.right_table.as_str(), cc.right_field.as_str(), cc.left_field.as_str(), flipped)
    } else {
        return true;
    };

    let Some((ty, lbytes)) = joined_field_bytes(old_schema, old_bytes, old_table, old_field) else {
        return false;
    };
    let Some(new_field_desc) = new_fields.iter().find(|f| f.name.eq_ignore_ascii_case(new_field)) else {
        return false;
    };
    let Some((offset, len, _)) = field_offset(new_fields, new_field_desc.field_id) else {
        return false;
    };
    compare_with_op(lbytes, &new_bytes[offset..offset + len], ty, op)
}

fn to_aggregate_fn(f: AggregateFnName) -> types::AggregateFn {
    match f {
        AggregateFnName::Sum => types::AggregateFn::Sum,
        AggregateFnName::Avg => types::AggregateFn::Avg,
        AggregateFnName::Max => types::AggregateFn::Max,
        AggregateFnName::Min => types::AggregateFn::Min,
        AggregateFnName::Count => types::AggregateFn::Count,
    }
}

fn agg_label(func: AggregateFnName, column: &str) -> String {
    let name = match func {
        AggregateFnName::Sum => "SUM",
        AggregateFnName::Avg => "AVG",
        AggregateFnName::Max => "MAX",
        AggregateFnName::Min => "MIN",
        AggregateFnName::Count => "COUNT",
    };
    format!("{name}({column})")
}

fn aggregate_failed() -> DbError {
    DbError::SimpleSelectFailed {
        kind: SimpleSelectErrorKind::AggregateFailed,
        cause: None,
    }
}

/// Projection when at least one `SelectItem::Aggregate` or a `GROUP BY` is
/// present: rows are partitioned by the group key (or, with no `GROUP BY`,
/// treated as a single implicit group) and every select item is evaluated
/// once per group.
fn project_grouped(
    items: &[SelectItem],
    schema: &[(String, FieldDescriptor)],
    rows: &[Vec<u8>],
    group_field: Option<(usize, FieldDescriptor)>,
) -> DbResult<common::RecordBatch> {
    let mut groups: Vec<(Vec<u8>, Vec<&Vec<u8>>)> = Vec::new();
    if let Some((offset, field)) = &group_field {
        for row in rows {
            let key = row[*offset..*offset + field.length as usize].to_vec();
            match groups.iter_mut().find(|(k, _)| k == &key) {
                Some(entry) => entry.1.push(row),
                None => groups.push((key, vec![row])),
            }
        }
    } else if !rows.is_empty() {
        groups.push((Vec::new(), rows.iter().collect()));
    }

    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        columns.push(match item {
            SelectItem::Wildcard => return Err(aggregate_failed()),
            SelectItem::Column { name, .. } => name.clone(),
            SelectItem::Aggregate { func, column, .. } => agg_label(*func, column),
        });
    }

    let mut out_rows = Vec::with_capacity(groups.len());
    for (_, group_rows) in &groups {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let value = match item {
                SelectItem::Wildcard => unreachable!("rejected while building columns"),
                SelectItem::Column { table, name } => {
                    let (offset, field) =
                        resolve_field(schema, table.as_deref(), name).ok_or(DbError::InvalidFieldName)?;
                    types::decode(&group_rows[0][offset..offset + field.length as usize], field.ty)
                        .map_err(|_| DbError::InvalidFieldName)?
                }
                SelectItem::Aggregate { func, table, column } => {
                    if *func == AggregateFnName::Count && column == "*" {
                        types::Value::U64(group_rows.len() as u64)
                    } else {
                        let (offset, field) =
                            resolve_field(schema, table.as_deref(), column).ok_or_else(aggregate_failed)?;
                        let values: Vec<types::Value> = group_rows
                            .iter()
                            .map(|r| {
                                types::decode(&r[offset..offset + field.length as usize], field.ty)
                                    .unwrap_or(types::Value::Null)
                            })
                            .collect();
                        types::aggregate(to_aggregate_fn(*func), &values)
                    }
                }
            };
            values.push(value);
        }
        out_rows.push(common::Row::new(values));
    }
    Ok(common::RecordBatch { columns, rows: out_rows })
}

/// Projection with no aggregate/group: a straight column list (or
/// wildcard, expanded against the joined schema) over every row, sorted
/// first if `ORDER BY` is present.
fn project_plain(
    items: &[SelectItem],
    schema: &[(String, FieldDescriptor)],
    mut rows: Vec<Vec<u8>>,
    order_by: Option<&OrderByExpr>,
    qualify: bool,
) -> DbResult<common::RecordBatch> {
    if let Some(ob) = order_by {
        let (offset, field) = resolve_field(schema, None, &ob.column).ok_or(DbError::InvalidFieldName)?;
        let (offset, len, ty) = (offset, field.length as usize, field.ty);
        rows.sort_by(|a, b| {
            let ord = types::compare(&a[offset..offset + len], &b[offset..offset + len], ty);
            if ob.direction == SortDirection::Desc {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let mut cols: Vec<(usize, FieldDescriptor, String)> = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard => {
                let mut offset = 0usize;
                for (t, f) in schema {
                    let label = if qualify { format!("{t}.{}", f.name) } else { f.name.clone() };
                    cols.push((offset, f.clone(), label));
                    offset += f.length as usize;
                }
            }
            SelectItem::Column { table, name } => {
                let (offset, f) = resolve_field(schema, table.as_deref(), name).ok_or(DbError::InvalidFieldName)?;
                cols.push((offset, f.clone(), name.clone()));
            }
            SelectItem::Aggregate { .. } => return Err(aggregate_failed()),
        }
    }

    let columns = cols.iter().map(|(_, _, label)| label.clone()).collect();
    let mut out_rows = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut values = Vec::with_capacity(cols.len());
        for (offset, field, _) in &cols {
            values.push(
                types::decode(&row[*offset..*offset + field.length as usize], field.ty)
                    .map_err(|_| DbError::InvalidFieldName)?,
            );
        }
        out_rows.push(common::Row::new(values));
    }
    Ok(common::RecordBatch { columns, rows: out_rows })
}

/// `SELECT ... FROM t1[, t2, ...] [WHERE ...] [GROUP BY ...|ORDER BY ...]`
/// (spec §4.6.a-b). Single-table conditions narrow through each table's
/// indexes before anything is joined; cross-table conditions are applied as
/// a nested-loop join over on-disk scratch tables so arbitrarily large
/// intermediates never need to live in memory at once; only the final
/// joined row set is materialized for group/aggregate/order/projection.
///
/// Each `FROM` entry names the real table to open and the alias everything
/// downstream (schema, conditions, projection) keys by; they differ only
/// when the query aliases a table, which is also the only way the same
/// table can appear twice in one `FROM` (a self-join).
pub fn select(
    tableset: &mut TableSet,
    items: &[SelectItem],
    tables: &[TableRef],
    selection: Option<&expr::Expr>,
    group_by: Option<&str>,
    order_by: Option<&OrderByExpr>,
) -> DbResult<common::RecordBatch> {
    let aliases: Vec<String> = tables.iter().map(|t| t.alias.clone()).collect();
    planner::check_no_duplicate_tables(&aliases)?;
    planner::check_group_and_order(group_by, order_by)?;
    let split = planner::split_where(selection, &aliases)?;

    let dir = tableset.dir().to_path_buf();
    let mut seq = crate::seed_counter();

    let mut per_table_fields: HashMap<String, Vec<FieldDescriptor>> = HashMap::new();
    let mut per_table_tmp: HashMap<String, TempTableGuard> = HashMap::new();

    for table_ref in tables {
        let leaves = split.per_table.get(&table_ref.alias).cloned().unwrap_or_default();
        let open = tableset.open(&table_ref.name)?;
        let fields = open.fields().to_vec();
        let infos = column_infos(&fields);
        let mut conditions = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            conditions.push(expr::parse_simple_condition(leaf, &infos)?);
        }
        let candidates = candidate_rids_for_table(open, &conditions)?;

        seq = seq.wrapping_add(1);
        let mut tmp = TempTableGuard::create(&dir, &format!("__scan_{seq:x}"), fields.clone())?;
        for rid in candidates {
            let bytes = open.table.get(rid)?;
            tmp.insert_raw(&bytes)?;
        }
        per_table_fields.insert(table_ref.alias.clone(), fields);
        per_table_tmp.insert(table_ref.alias.clone(), tmp);
    }

    let mut joined_schema: Vec<(String, FieldDescriptor)> = Vec::new();
    let mut joined_tmp: Option<TempTableGuard> = None;

    for (i, table_ref) in tables.iter().enumerate() {
        let alias = &table_ref.alias;
        let table_fields = per_table_fields.remove(alias).expect("populated above");
        let mut table_tmp = per_table_tmp.remove(alias).expect("populated above");

        if i == 0 {
            joined_schema = table_fields.iter().map(|f| (alias.clone(), f.clone())).collect();
            joined_tmp = Some(table_tmp);
            continue;
        }

        let table_rows: Vec<Vec<u8>> = table_tmp.scan()?.into_iter().map(|(_, b)| b).collect();
        drop(table_tmp);

        let applicable: Vec<planner::ComplexCondition> = split
            .complex
            .iter()
            .filter_map(|e| planner::complex_condition(e).ok())
            .filter(|cc| {
                (table_in_schema(&joined_schema, &cc.left_table) && cc.right_table == *alias)
                    || (table_in_schema(&joined_schema, &cc.right_table) && cc.left_table == *alias)
            })
            .collect();

        let old_rows: Vec<Vec<u8>> = joined_tmp
            .as_mut()
            .expect("set at first iteration")
            .scan()?
            .into_iter()
            .map(|(_, b)| b)
            .collect();

        let mut new_schema = joined_schema.clone();
        new_schema.extend(table_fields.iter().map(|f| (alias.clone(), f.clone())));

        seq = seq.wrapping_add(1);
        let mut new_tmp = TempTableGuard::create(
            &dir,
            &format!("__join_{seq:x}"),
            new_schema.iter().map(|(_, f)| f.clone()).collect(),
        )?;
        for old_row in &old_rows {
            for new_row in &table_rows {
                if applicable
                    .iter()
                    .all(|cc| complex_cond_holds(cc, &joined_schema, old_row, alias, &table_fields, new_row))
                {
                    let mut combined = old_row.clone();
                    combined.extend_from_slice(new_row);
                    new_tmp.insert_raw(&combined)?;
                }
            }
        }
        joined_schema = new_schema;
        joined_tmp = Some(new_tmp);
    }

    let mut joined_tmp = joined_tmp.expect("FROM always names at least one table");
    let final_rows: Vec<Vec<u8>> = joined_tmp.scan()?.into_iter().map(|(_, b)| b).collect();

    let has_aggregate = items.iter().any(|it| matches!(it, SelectItem::Aggregate { .. }));
    let group_field = match group_by {
        Some(name) => {
            let (offset, field) = resolve_field(&joined_schema, None, name).ok_or(DbError::InvalidFieldName)?;
            Some((offset, field.clone()))
        }
        None => None,
    };

    if has_aggregate || group_field.is_some() {
        project_grouped(items, &joined_schema, &final_rows, group_field)
    } else {
        project_plain(items, &joined_schema, final_rows, order_by, tables.len() > 1)
    }
}
