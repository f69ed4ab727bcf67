//! `INSERT`/`DELETE`/`UPDATE` (spec §4.6 DML statements): constraint
//! enforcement (`NOT NULL`, `CHECK`, primary key uniqueness, foreign keys)
//! plus the secondary-index maintenance each write implies, with
//! rollback-on-partial-failure across a multi-row statement.

use std::cmp::Ordering;

use catalog::{FkRelationship, ForeignKeyCatalog};
use common::{DbError, DbResult, DeleteRecordErrorKind, RecordWriteErrorKind, Rid};
use storage::FieldDescriptor;
use types::LiteralOutcome;

use crate::{column_infos, field_offset, from_check_condition, OpenTable, RecordFields, TableSet, AUTO_PK_NAME};

fn insert_err(kind: RecordWriteErrorKind) -> DbError {
    DbError::InsertRecordFailed { kind, cause: None }
}

fn update_err(kind: RecordWriteErrorKind) -> DbError {
    DbError::UpdateRecordFailed { kind, cause: None }
}

fn delete_err(kind: DeleteRecordErrorKind) -> DbError {
    DbError::DeleteRecordFailed { kind, cause: None }
}

fn bind_conditions(selection: Option<&expr::Expr>, infos: &[expr::ColumnInfo]) -> DbResult<Vec<expr::Condition>> {
    let Some(sel) = selection else {
        return Ok(Vec::new());
    };
    sel.flatten_and()
        .into_iter()
        .map(|leaf| expr::parse_simple_condition(leaf, infos))
        .collect()
}

/// Encode one `VALUES`/`SET` literal against its target field, applying
/// `NOT NULL` and the type/length range checks a literal must pass (spec
/// §4.6 `insert_record`/`update_record`).
fn literal_to_bytes(e: &expr::Expr, field: &FieldDescriptor) -> Result<Vec<u8>, RecordWriteErrorKind> {
    let text = match e {
        expr::Expr::Literal(t) => t.clone(),
        expr::Expr::BoolLiteral(b) => b.to_string(),
        _ => return Err(RecordWriteErrorKind::LiteralParseFailed),
    };
    let value = match types::literal_parse(&text, field.ty, field.length as usize) {
        LiteralOutcome::Value(v) => v,
        LiteralOutcome::ParseFailed => return Err(RecordWriteErrorKind::LiteralParseFailed),
        LiteralOutcome::OutOfRange => return Err(RecordWriteErrorKind::LiteralOutOfRange),
    };
    if field.not_null && value.is_null() {
        return Err(RecordWriteErrorKind::NotNullExpected);
    }
    let mut buf = vec![0u8; field.length as usize];
    types::encode(&value, field.ty, field.length as usize, &mut buf)
        .map_err(|_| RecordWriteErrorKind::LiteralOutOfRange)?;
    Ok(buf)
}

/// Does `rel`'s referenced table already hold a live primary key equal to
/// `value_bytes`? The referenced field is always a primary key, so it is
/// always indexed.
fn fk_value_exists(tableset: &mut TableSet, rel: &FkRelationship, value_bytes: &[u8]) -> DbResult<bool> {
    let refed = tableset.open(&rel.refed_table)?;
    let index = refed
        .indexes
        .get_mut(&rel.refed_field_id)
        .expect("referenced primary key is always indexed");
    Ok(!index.search(value_bytes)?.is_empty())
}

/// Does any live row of `rel`'s referencing table still carry `pk_bytes` in
/// its foreign-key field? The referencing field is an ordinary column, not
/// necessarily indexed, so this walks every row.
fn is_referenced_scan(tableset: &mut TableSet, rel: &FkRelationship, pk_bytes: &[u8]) -> DbResult<bool> {
    let refing = tableset.open(&rel.refing_table)?;
    let fields = refing.table.fields().to_vec();
    let (offset, len, ty) = field_offset(&fields, rel.refing_field_id).expect("fk field exists on its own table");
    for (_, bytes) in refing.table.scan()? {
        let candidate = &bytes[offset..offset + len];
        if candidate[0] != 0x00 && types::compare(candidate, pk_bytes, ty) == Ordering::Equal {
            return Ok(true);
        }
    }
    Ok(false)
}

fn insert_one(
    tableset: &mut TableSet,
    fk_catalog: &ForeignKeyCatalog,
    table_name: &str,
    values: &[expr::Expr],
) -> DbResult<Rid> {
    let fk_rels: Vec<FkRelationship> = fk_catalog.references_of(table_name).cloned().collect();

    let (record, fk_checks): (Vec<u8>, Vec<(FkRelationship, Vec<u8>)>) = {
        let open = tableset.open(table_name)?;
        let fields = open.fields().to_vec();
        let user_fields: Vec<&FieldDescriptor> = fields.iter().filter(|f| f.name != AUTO_PK_NAME).collect();
        if values.len() != user_fields.len() {
            return Err(insert_err(RecordWriteErrorKind::WrongTupleSize));
        }

        let total_len: usize = fields.iter().map(|f| f.length as usize).sum();
        let mut record = vec![0u8; total_len];
        for (field, value_expr) in user_fields.iter().zip(values.iter()) {
            let (offset, len, _) = field_offset(&fields, field.field_id).expect("field of its own table");
            let bytes = literal_to_bytes(value_expr, field).map_err(insert_err)?;
            record[offset..offset + len].copy_from_slice(&bytes);
        }
        if let Some(auto_field) = fields.iter().find(|f| f.name == AUTO_PK_NAME) {
            let (offset, len, _) = field_offset(&fields, auto_field.field_id).expect("auto key field present");
            let id = open.next_auto_pk();
            let mut buf = vec![0u8; len];
            types::encode(&types::Value::U64(id), auto_field.ty, len, &mut buf)
                .expect("u64 always fits its own 9-byte field");
            record[offset..offset + len].copy_from_slice(&buf);
        }

        let lookup = RecordFields { fields: &fields, bytes: &record };
        for check in &open.checks.conditions {
            let cond = from_check_condition(check)?;
            if !expr::meets(&lookup, std::slice::from_ref(&cond)) {
                return Err(insert_err(RecordWriteErrorKind::CheckConstraintFailed));
            }
        }

        let pk_field = fields.iter().find(|f| f.is_pk).expect("pk present").clone();
        let (pk_off, pk_len, _) = field_offset(&fields, pk_field.field_id).expect("pk field present");
        let pk_bytes = record[pk_off..pk_off + pk_len].to_vec();
        let pk_index = open.indexes.get_mut(&pk_field.field_id).expect("pk index always present");
        if !pk_index.search(&pk_bytes)?.is_empty() {
            return Err(insert_err(RecordWriteErrorKind::DuplicatePrimaryKey));
        }

        let mut fk_checks = Vec::with_capacity(fk_rels.len());
        for rel in &fk_rels {
            let (offset, len, _) = field_offset(&fields, rel.refing_field_id).expect("fk field present");
            fk_checks.push((rel.clone(), record[offset..offset + len].to_vec()));
        }
        (record, fk_checks)
    };

    for (rel, value_bytes) in &fk_checks {
        if value_bytes[0] == 0x00 {
            continue;
        }
        if !fk_value_exists(tableset, rel, value_bytes)? {
            return Err(insert_err(RecordWriteErrorKind::ReferencedNotExists));
        }
    }

    let open = tableset.open(table_name)?;
    let rid = open.table.insert(&record)?;
    let fields = open.table.fields().to_vec();
    for (field_id, index) in open.indexes.iter_mut() {
        let (offset, len, _) = field_offset(&fields, *field_id).expect("indexed field present");
        index.insert(&record[offset..offset + len], rid)?;
    }
    Ok(rid)
}

/// `INSERT INTO table VALUES (...), (...)` (spec §4.6 `insert_record`). Rows
/// are applied left to right; if any row fails every row already applied by
/// this statement is undone so the table is left exactly as it was found.
pub fn insert(
    tableset: &mut TableSet,
    fk_catalog: &ForeignKeyCatalog,
    table_name: &str,
    rows: &[Vec<expr::Expr>],
) -> DbResult<u64> {
    let mut done: Vec<Rid> = Vec::with_capacity(rows.len());
    for row in rows {
        match insert_one(tableset, fk_catalog, table_name, row) {
            Ok(rid) => done.push(rid),
            Err(e) => {
                if let Ok(open) = tableset.open(table_name) {
                    for rid in done.into_iter().rev() {
                        let _ = open.remove_record(rid);
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(done.len() as u64)
}

/// `DELETE FROM table WHERE ...` (spec §4.6 `delete_record`). Checks every
/// candidate row against the tables that reference this one *before*
/// deleting anything: re-inserting a deleted row to undo a partial delete
/// would assign it a new `Rid`, which would violate record-identity
/// stability, so deletion itself is all-or-nothing by construction rather
/// than by rollback.
pub fn delete(
    tableset: &mut TableSet,
    fk_catalog: &ForeignKeyCatalog,
    table_name: &str,
    selection: Option<&expr::Expr>,
) -> DbResult<u64> {
    let rids = {
        let open = tableset.open(table_name)?;
        let fields = open.fields().to_vec();
        let infos = column_infos(&fields);
        let conditions = bind_conditions(selection, &infos)?;
        crate::select::candidate_rids_for_table(open, &conditions)?
    };

    let refs: Vec<FkRelationship> = fk_catalog.referenced_by(table_name).cloned().collect();
    if !refs.is_empty() {
        let pk_values: Vec<Vec<u8>> = {
            let open = tableset.open(table_name)?;
            let fields = open.table.fields().to_vec();
            let pk_field = fields.iter().find(|f| f.is_pk).expect("pk present").clone();
            let (offset, len, _) = field_offset(&fields, pk_field.field_id).expect("pk present");
            let mut out = Vec::with_capacity(rids.len());
            for &rid in &rids {
                out.push(open.table.get(rid)?[offset..offset + len].to_vec());
            }
            out
        };
        for rel in &refs {
            for pk in &pk_values {
                if is_referenced_scan(tableset, rel, pk)? {
                    return Err(delete_err(DeleteRecordErrorKind::RecordReferenced));
                }
            }
        }
    }

    let open = tableset.open(table_name)?;
    for &rid in &rids {
        open.remove_record(rid)?;
    }
    Ok(rids.len() as u64)
}

#[allow(clippy::too_many_arguments)]
fn update_one(
    tableset: &mut TableSet,
    table_name: &str,
    fields: &[FieldDescriptor],
    assign_fields: &[(FieldDescriptor, expr::Expr)],
    fk_rels: &[FkRelationship],
    refs: &[FkRelationship],
    pk_changing: bool,
    rid: Rid,
    old_bytes: &[u8],
) -> DbResult<()> {
    let mut new_bytes = old_bytes.to_vec();
    for (field, value_expr) in assign_fields {
        let (offset, len, _) = field_offset(fields, field.field_id).expect("field of its own table");
        let bytes = literal_to_bytes(value_expr, field).map_err(update_err)?;
        new_bytes[offset..offset + len].copy_from_slice(&bytes);
    }

    let check_conditions = tableset.open(table_name)?.checks.conditions.clone();
    let lookup = RecordFields { fields, bytes: &new_bytes };
    for check in &check_conditions {
        let cond = from_check_condition(check)?;
        if !expr::meets(&lookup, std::slice::from_ref(&cond)) {
            return Err(update_err(RecordWriteErrorKind::CheckConstraintFailed));
        }
    }

    let pk_field = fields.iter().find(|f| f.is_pk).expect("pk present");
    let (pk_off, pk_len, _) = field_offset(fields, pk_field.field_id).expect("pk present");
    let old_pk_bytes = old_bytes[pk_off..pk_off + pk_len].to_vec();
    let new_pk_bytes = new_bytes[pk_off..pk_off + pk_len].to_vec();

    if pk_changing {
        for rel in refs {
            if is_referenced_scan(tableset, rel, &old_pk_bytes)? {
                return Err(update_err(RecordWriteErrorKind::OldValueStillReferenced));
            }
        }
        let open = tableset.open(table_name)?;
        let pk_index = open.indexes.get_mut(&pk_field.field_id).expect("pk index present");
        if pk_index.search(&new_pk_bytes)?.iter().any(|&r| r != rid) {
            return Err(update_err(RecordWriteErrorKind::DuplicatePrimaryKey));
        }
    }

    for rel in fk_rels {
        if !assign_fields.iter().any(|(f, _)| f.field_id == rel.refing_field_id) {
            continue;
        }
        let (offset, len, _) = field_offset(fields, rel.refing_field_id).expect("fk field present");
        let value_bytes = &new_bytes[offset..offset + len];
        if value_bytes[0] == 0x00 {
            continue;
        }
        if !fk_value_exists(tableset, rel, value_bytes)? {
            return Err(update_err(RecordWriteErrorKind::ReferencedNotExists));
        }
    }

    let open = tableset.open(table_name)?;
    open.table.update(rid, &new_bytes)?;
    for (field_id, index) in open.indexes.iter_mut() {
        let (offset, len, _) = field_offset(fields, *field_id).expect("indexed field present");
        let old_key = &old_bytes[offset..offset + len];
        let new_key = &new_bytes[offset..offset + len];
        if old_key != new_key {
            index.remove(old_key, rid)?;
            index.insert(new_key, rid)?;
        }
    }
    Ok(())
}

fn revert_one(open: &mut OpenTable, fields: &[FieldDescriptor], rid: Rid, old_bytes: &[u8]) -> DbResult<()> {
    let current = open.table.get(rid)?;
    open.table.update(rid, old_bytes)?;
    for (field_id, index) in open.indexes.iter_mut() {
        let (offset, len, _) = field_offset(fields, *field_id).expect("indexed field present");
        let current_key = &current[offset..offset + len];
        let old_key = &old_bytes[offset..offset + len];
        if current_key != old_key {
            index.remove(current_key, rid)?;
            index.insert(old_key, rid)?;
        }
    }
    Ok(())
}

/// `UPDATE table SET ... WHERE ...` (spec §4.6 `update_record`). Each
/// candidate row is validated and applied independently; if one fails,
/// every row this statement already changed is reverted to its prior bytes
/// and index entries before the error is returned.
pub fn update(
    tableset: &mut TableSet,
    fk_catalog: &ForeignKeyCatalog,
    table_name: &str,
    assignments: &[(String, expr::Expr)],
    selection: Option<&expr::Expr>,
) -> DbResult<u64> {
    let fk_rels: Vec<FkRelationship> = fk_catalog.references_of(table_name).cloned().collect();
    let refs: Vec<FkRelationship> = fk_catalog.referenced_by(table_name).cloned().collect();

    let (fields, candidates): (Vec<FieldDescriptor>, Vec<(Rid, Vec<u8>)>) = {
        let open = tableset.open(table_name)?;
        let fields = open.fields().to_vec();
        let infos = column_infos(&fields);
        let conditions = bind_conditions(selection, &infos)?;
        let rids = crate::select::candidate_rids_for_table(open, &conditions)?;
        let mut rows = Vec::with_capacity(rids.len());
        for rid in rids {
            rows.push((rid, open.table.get(rid)?));
        }
        (fields, rows)
    };

    let mut assign_fields = Vec::with_capacity(assignments.len());
    for (name, value_expr) in assignments {
        let field = fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or(DbError::InvalidFieldName)?;
        assign_fields.push((field, value_expr.clone()));
    }
    let pk_field = fields.iter().find(|f| f.is_pk).expect("pk present").clone();
    let pk_changing = assign_fields.iter().any(|(f, _)| f.field_id == pk_field.field_id);

    let mut applied: Vec<(Rid, Vec<u8>)> = Vec::with_capacity(candidates.len());
    for (rid, old_bytes) in &candidates {
        match update_one(
            tableset,
            table_name,
            &fields,
            &assign_fields,
            &fk_rels,
            &refs,
            pk_changing,
            *rid,
            old_bytes,
        ) {
            Ok(()) => applied.push((*rid, old_bytes.clone())),
            Err(e) => {
                if let Ok(open) = tableset.open(table_name) {
                    for (rid2, old2) in applied.iter().rev() {
                        let _ = revert_one(open, &fields, *rid2, old2);
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(applied.len() as u64)
}
