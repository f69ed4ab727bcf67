//! `CREATE`/`DROP TABLE`, `CREATE`/`DROP INDEX`, `DESC TABLE` (spec §4.4,
//! §4.6 DDL statements).

use std::collections::HashMap;
use std::fs;

use catalog::{CheckConstraints, FkRelationship, ForeignKeyCatalog, IndexCatalog};
use common::{
    CreateTableErrorKind, DbError, DbResult, DropTableErrorKind, ForeignKeyErrorKind, RecordBatch,
    Row,
};
use parser::{ColumnDef, ForeignKeyDef};
use storage::{FieldDescriptor, Table};
use types::Value;

use crate::{
    chk_path, column_infos, field_offset, fk_paths, idxcat_path, index_path, pk_index_path,
    table_path, to_check_condition, OpenTable, TableSet, AUTO_PK_NAME,
};

fn create_table_err(kind: CreateTableErrorKind) -> DbError {
    DbError::CreateTableFailed { kind, cause: None }
}

/// `CREATE TABLE name (...)`, including `PRIMARY KEY`/`CHECK`/`FOREIGN KEY`
/// resolution and the hidden auto-key fallback (spec §3/§9: a table
/// declaring no `PRIMARY KEY` gets a synthesized single `UBIGINT` key field,
/// appended last and fed by a per-table counter).
pub fn create_table(
    tableset: &mut TableSet,
    fk_catalog: &mut ForeignKeyCatalog,
    name: &str,
    columns: &[ColumnDef],
    primary_key: Option<&[String]>,
    checks: &[expr::Expr],
    foreign_keys: &[ForeignKeyDef],
) -> DbResult<()> {
    if let Some(pk) = primary_key {
        if pk.len() > 1 {
            return Err(create_table_err(CreateTableErrorKind::InvalidPrimaryKey));
        }
    }

    let mut seen_names: Vec<String> = Vec::new();
    let mut fields = Vec::with_capacity(columns.len() + 1);
    for (idx, col) in columns.iter().enumerate() {
        if seen_names.iter().any(|n| n.eq_ignore_ascii_case(&col.name)) {
            return Err(create_table_err(CreateTableErrorKind::DuplicateFieldName));
        }
        seen_names.push(col.name.clone());

        let ty = crate::resolve_sql_type(&col.ty)
            .ok_or_else(|| create_table_err(CreateTableErrorKind::UnsupportedType))?;
        let length = if ty.is_string() {
            col.length
                .map(|n| n + 1)
                .ok_or_else(|| create_table_err(CreateTableErrorKind::FieldLengthRequired))?
        } else {
            ty.default_field_length().expect("fixed-width type")
        };
        let is_pk = primary_key
            .map(|pk| pk.iter().any(|n| n.eq_ignore_ascii_case(&col.name)))
            .unwrap_or(false);
        fields.push(FieldDescriptor {
            field_id: idx as u64,
            ty,
            length,
            is_pk,
            not_null: col.not_null,
            name: col.name.clone(),
        });
    }

    if let Some(pk) = primary_key {
        if !fields.iter().any(|f| f.is_pk) {
            let _ = pk;
            return Err(create_table_err(CreateTableErrorKind::InvalidPrimaryKey));
        }
    } else {
        fields.push(FieldDescriptor {
            field_id: columns.len() as u64,
            ty: types::SqlType::U64,
            length: 9,
            is_pk: true,
            not_null: true,
            name: AUTO_PK_NAME.to_string(),
        });
    }

    let mut relationships = Vec::new();
    for fk in foreign_keys {
        let local = fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(&fk.field))
            .ok_or(DbError::InvalidFieldName)?
            .clone();
        let ref_open = tableset.open(&fk.ref_table)?;
        let ref_pk = ref_open
            .fields()
            .iter()
            .find(|f| f.is_pk)
            .expect("every table has exactly one primary key field")
            .clone();
        if !ref_pk.name.eq_ignore_ascii_case(&fk.ref_field) {
            return Err(create_table_err(CreateTableErrorKind::ForeignKeyFailed(
                ForeignKeyErrorKind::PrimaryKeyRequired,
            )));
        }
        if ref_pk.ty != local.ty {
            return Err(create_table_err(CreateTableErrorKind::ForeignKeyFailed(
                ForeignKeyErrorKind::TypesDismatch,
            )));
        }
        if ref_pk.length != local.length {
            return Err(create_table_err(CreateTableErrorKind::ForeignKeyFailed(
                ForeignKeyErrorKind::LengthsDismatch,
            )));
        }
        relationships.push(FkRelationship {
            refed_table: fk.ref_table.clone(),
            refed_field_id: ref_pk.field_id,
            refing_table: name.to_string(),
            refing_field_id: local.field_id,
        });
    }

    let dir = tableset.dir().to_path_buf();
    let table = Table::create(&table_path(&dir, name), name, fields.clone())?;

    let pk_field = fields.iter().find(|f| f.is_pk).expect("pk present").clone();
    let mut indexes = HashMap::new();
    indexes.insert(
        pk_field.field_id,
        btree::BTreeIndex::create(&pk_index_path(&dir, name), pk_field.ty, pk_field.length as usize)?,
    );

    let infos = column_infos(&fields);
    let mut check_conditions = Vec::with_capacity(checks.len());
    for check_expr in checks {
        let cond = expr::parse_simple_condition(check_expr, &infos)?;
        check_conditions.push(to_check_condition(&cond));
    }
    let check_constraints = CheckConstraints {
        conditions: check_conditions,
    };
    check_constraints.save(&chk_path(&dir, name))?;

    let index_catalog = IndexCatalog::default();
    index_catalog.save(&idxcat_path(&dir, name))?;

    for rel in relationships {
        fk_catalog.add(rel);
    }
    let (refed, refing) = fk_paths(&dir);
    fk_catalog.save(&refed, &refing)?;

    tableset.insert_open(
        name.to_string(),
        OpenTable {
            table,
            indexes,
            index_catalog,
            checks: check_constraints,
            next_auto_pk: crate::seed_counter(),
        },
    );
    Ok(())
}

/// `DROP TABLE name` (spec §4.4/§4.6): refused while another table's foreign
/// key still references this one.
pub fn drop_table(tableset: &mut TableSet, fk_catalog: &mut ForeignKeyCatalog, name: &str) -> DbResult<()> {
    if fk_catalog.referenced_by(name).next().is_some() {
        return Err(DbError::DropTableFailed {
            kind: DropTableErrorKind::TableReferenced,
            cause: None,
        });
    }
    let dir = tableset.dir().to_path_buf();
    tableset.close(name)?;
    tableset.forget(name);

    let index_catalog = IndexCatalog::load(&idxcat_path(&dir, name))?;
    for (_, index_name) in &index_catalog.entries {
        let _ = btree::BTreeIndex::remove_file(&index_path(&dir, name, index_name));
    }
    let _ = btree::BTreeIndex::remove_file(&pk_index_path(&dir, name));
    Table::remove(&table_path(&dir, name)).map_err(|e| DbError::DropTableFailed {
        kind: DropTableErrorKind::RemoveTableFailed,
        cause: Some(Box::new(e)),
    })?;
    let _ = fs::remove_file(chk_path(&dir, name));
    let _ = fs::remove_file(idxcat_path(&dir, name));

    fk_catalog.remove_table(name);
    let (refed, refing) = fk_paths(&dir);
    fk_catalog.save(&refed, &refing)?;
    Ok(())
}

/// `CREATE INDEX name ON table(column)` (spec §4.4 `create_index`): builds
/// the `.idx` file from the table's current contents and records the
/// mapping in `.idxcat`.
pub fn create_index(tableset: &mut TableSet, table_name: &str, index_name: &str, column_name: &str) -> DbResult<()> {
    let dir = tableset.dir().to_path_buf();
    let open = tableset.open(table_name)?;
    let field = open
        .fields()
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(column_name))
        .cloned()
        .ok_or(DbError::InvalidFieldName)?;

    open.index_catalog
        .add(field.field_id, index_name.to_string())
        .map_err(|_| DbError::CreateIndexFailed { cause: None })?;

    let mut index = btree::BTreeIndex::create(
        &index_path(&dir, table_name, index_name),
        field.ty,
        field.length as usize,
    )?;
    for (rid, bytes) in open.table.scan()? {
        let (offset, len, _) =
            field_offset(open.table.fields(), field.field_id).expect("field exists on its own table");
        index.insert(&bytes[offset..offset + len], rid)?;
    }
    open.indexes.insert(field.field_id, index);
    open.index_catalog.save(&idxcat_path(&dir, table_name))?;
    Ok(())
}

/// `DROP INDEX name ON table` (spec §4.4 `drop_index`).
pub fn drop_index(tableset: &mut TableSet, table_name: &str, index_name: &str) -> DbResult<()> {
    let dir = tableset.dir().to_path_buf();
    let open = tableset.open(table_name)?;
    let field_id = open
        .index_catalog
        .remove_by_name(index_name)
        .map_err(|_| DbError::DropIndexFailed { cause: None })?;
    open.indexes.remove(&field_id);
    let _ = btree::BTreeIndex::remove_file(&index_path(&dir, table_name, index_name));
    open.index_catalog.save(&idxcat_path(&dir, table_name))?;
    Ok(())
}

/// `DESC TABLE name`: one row per field, reporting its type, length,
/// whether it is the primary key, `NOT NULL`, and whether a (possibly
/// implicit, for the primary key) index backs it.
pub fn desc_table(tableset: &mut TableSet, table_name: &str) -> DbResult<RecordBatch> {
    let open = tableset.open(table_name)?;
    let columns = vec![
        "field".to_string(),
        "type".to_string(),
        "length".to_string(),
        "primary_key".to_string(),
        "not_null".to_string(),
        "indexed".to_string(),
    ];
    let rows = open
        .fields()
        .iter()
        .map(|f| {
            Row::new(vec![
                Value::Char(f.name.clone()),
                Value::Char(f.ty.name().to_string()),
                Value::U64(f.length),
                Value::Bool(f.is_pk),
                Value::Bool(f.not_null),
                Value::Bool(f.is_pk || open.index_catalog.is_indexed(f.field_id)),
            ])
        })
        .collect();
    Ok(RecordBatch { columns, rows })
}
