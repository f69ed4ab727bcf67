//! Constraint sidecars that live alongside a table's `.tb`/`.idx` files:
//! the `.chk` CHECK-condition list, the `.refed`/`.refing` foreign-key
//! multimaps, and the `.idxcat` record of which fields carry a secondary
//! index (spec §3 "Constraints artifacts", §6 sidecar byte layouts).
//!
//! Field descriptors themselves are not duplicated here — `storage::Table`
//! is their source of truth, read straight from a table's header pages.
//! This crate only owns the metadata a table's own header pages have no
//! room for.

use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
};

use common::{DbError, DbResult};

fn read_u64(buf: &[u8], off: &mut usize) -> u64 {
    let v = u64::from_be_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    v
}

fn read_len_prefixed(buf: &[u8], off: &mut usize) -> Vec<u8> {
    let len = read_u64(buf, off) as usize;
    let bytes = buf[*off..*off + len].to_vec();
    *off += len;
    bytes
}

fn push_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// One CHECK-clause condition, exactly as stored in a table's `.chk` file
/// (spec §6): `type | left_id | right_id | op_len | op_bytes | lit_len |
/// lit_bytes`. `cond_type` mirrors `expr::Condition`'s four-variant
/// discriminant (0 const_false, 1 const_true, 2 right_is_literal, 3
/// right_is_field) without this crate depending on `expr`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckCondition {
    pub cond_type: u64,
    pub left_field_id: u64,
    pub right_field_id: u64,
    pub op: String,
    /// Already-encoded field value (same fixed-length byte layout the
    /// field's own records use), present only when `cond_type ==
    /// right_is_literal`.
    pub literal: Vec<u8>,
}

impl CheckCondition {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.cond_type.to_be_bytes());
        out.extend_from_slice(&self.left_field_id.to_be_bytes());
        out.extend_from_slice(&self.right_field_id.to_be_bytes());
        push_len_prefixed(out, self.op.as_bytes());
        push_len_prefixed(out, &self.literal);
    }

    fn decode(buf: &[u8], off: &mut usize) -> Self {
        let cond_type = read_u64(buf, off);
        let left_field_id = read_u64(buf, off);
        let right_field_id = read_u64(buf, off);
        let op = String::from_utf8_lossy(&read_len_prefixed(buf, off)).into_owned();
        let literal = read_len_prefixed(buf, off);
        Self {
            cond_type,
            left_field_id,
            right_field_id,
            op,
            literal,
        }
    }
}

/// A table's `.chk` sidecar: the conjunction of CHECK conditions declared on
/// `CREATE TABLE`. Empty means "no CHECK constraint".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckConstraints {
    pub conditions: Vec<CheckCondition>,
}

impl CheckConstraints {
    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let buf = fs::read(path)?;
        let mut off = 0usize;
        let count = read_u64(&buf, &mut off);
        let mut conditions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            conditions.push(CheckCondition::decode(&buf, &mut off));
        }
        Ok(Self { conditions })
    }

    pub fn save(&self, path: &Path) -> DbResult<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.conditions.len() as u64).to_be_bytes());
        for cond in &self.conditions {
            cond.encode(&mut out);
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// One foreign-key relationship: `refing_table.refing_field` must reference
/// a live primary key in `refed_table.refed_field`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FkRelationship {
    pub refed_table: String,
    pub refed_field_id: u64,
    pub refing_table: String,
    pub refing_field_id: u64,
}

impl FkRelationship {
    fn encode(&self, out: &mut Vec<u8>) {
        push_len_prefixed(out, self.refed_table.as_bytes());
        out.extend_from_slice(&self.refed_field_id.to_be_bytes());
        push_len_prefixed(out, self.refing_table.as_bytes());
        out.extend_from_slice(&self.refing_field_id.to_be_bytes());
    }

    fn decode(buf: &[u8], off: &mut usize) -> Self {
        let refed_table = String::from_utf8_lossy(&read_len_prefixed(buf, off)).into_owned();
        let refed_field_id = read_u64(buf, off);
        let refing_table = String::from_utf8_lossy(&read_len_prefixed(buf, off)).into_owned();
        let refing_field_id = read_u64(buf, off);
        Self {
            refed_table,
            refed_field_id,
            refing_table,
            refing_field_id,
        }
    }
}

/// The database-wide foreign-key multimap (spec §3: `<db>.refed` /
/// `<db>.refing`), kept as two on-disk views of the same relationship set:
/// `.refed` is consulted by `DROP TABLE`/`DELETE` ("is this table/row
/// referenced?"), `.refing` by `INSERT`/`UPDATE` ("does this table reference
/// anything, and by which field?"). Both files carry identical content; the
/// split only documents which lookup direction each name answers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForeignKeyCatalog {
    pub relationships: Vec<FkRelationship>,
}

impl ForeignKeyCatalog {
    pub fn load(refed_path: &Path) -> DbResult<Self> {
        if !refed_path.exists() {
            return Ok(Self::default());
        }
        let buf = fs::read(refed_path)?;
        let mut off = 0usize;
        let count = read_u64(&buf, &mut off);
        let mut relationships = Vec::with_capacity(count as usize);
        for _ in 0..count {
            relationships.push(FkRelationship::decode(&buf, &mut off));
        }
        Ok(Self { relationships })
    }

    /// Persist the relationship set to both the `.refed` and `.refing`
    /// sidecars, called after every CREATE/DROP TABLE that touches a
    /// foreign key (spec §4.6: "rewritten after every CREATE/DROP TABLE
    /// affecting foreign keys").
    pub fn save(&self, refed_path: &Path, refing_path: &Path) -> DbResult<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.relationships.len() as u64).to_be_bytes());
        for rel in &self.relationships {
            rel.encode(&mut out);
        }
        fs::write(refed_path, &out)?;
        fs::write(refing_path, &out)?;
        Ok(())
    }

    /// Relationships where `table` is the referenced side — non-empty
    /// blocks `DROP TABLE table` and gates every `DELETE`/PK `UPDATE` on
    /// `table`.
    pub fn referenced_by(&self, table: &str) -> impl Iterator<Item = &FkRelationship> {
        self.relationships
            .iter()
            .filter(move |rel| rel.refed_table == table)
    }

    /// Relationships where `table` is the referencing side — consulted on
    /// `INSERT`/`UPDATE` into `table` to validate FK values.
    pub fn references_of(&self, table: &str) -> impl Iterator<Item = &FkRelationship> {
        self.relationships
            .iter()
            .filter(move |rel| rel.refing_table == table)
    }

    pub fn add(&mut self, rel: FkRelationship) {
        self.relationships.push(rel);
    }

    /// Drop every relationship mentioning `table` on either side, called
    /// when `table` itself is dropped.
    pub fn remove_table(&mut self, table: &str) {
        self.relationships
            .retain(|rel| rel.refed_table != table && rel.refing_table != table);
    }
}

/// Which fields of a table carry a secondary B+-tree index, and under what
/// name (spec §4.4 `create_index`/§4.6 `CREATE/DROP INDEX`). Persisted next
/// to the table as `<table>.idxcat` so `USE DATABASE` can rediscover
/// existing indexes without re-scanning every `.idx` file's contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexCatalog {
    pub entries: Vec<(u64, String)>,
}

impl IndexCatalog {
    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let buf = fs::read(path)?;
        let mut off = 0usize;
        let count = read_u64(&buf, &mut off);
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let field_id = read_u64(&buf, &mut off);
            let name = String::from_utf8_lossy(&read_len_prefixed(&buf, &mut off)).into_owned();
            entries.push((field_id, name));
        }
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> DbResult<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u64).to_be_bytes());
        for (field_id, name) in &self.entries {
            out.extend_from_slice(&field_id.to_be_bytes());
            push_len_prefixed(&mut out, name.as_bytes());
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn field_id_for(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| *id)
    }

    pub fn name_for_field(&self, field_id: u64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(id, _)| *id == field_id)
            .map(|(_, n)| n.as_str())
    }

    pub fn is_indexed(&self, field_id: u64) -> bool {
        self.entries.iter().any(|(id, _)| *id == field_id)
    }

    /// Guard against the "refuses when an index already exists on that
    /// field" rule (spec §4.4 `create_index`).
    pub fn add(&mut self, field_id: u64, name: String) -> DbResult<()> {
        if self.is_indexed(field_id) {
            return Err(DbError::CreateIndexFailed { cause: None });
        }
        if self.entries.iter().any(|(_, n)| *n == name) {
            return Err(DbError::CreateIndexFailed { cause: None });
        }
        self.entries.push((field_id, name));
        Ok(())
    }

    pub fn remove_by_name(&mut self, name: &str) -> DbResult<u64> {
        let idx = self
            .entries
            .iter()
            .position(|(_, n)| n == name)
            .ok_or(DbError::DropIndexFailed { cause: None })?;
        Ok(self.entries.remove(idx).0)
    }
}

/// A corrupt sidecar file is reported through the shared `Io` variant
/// (there is no dedicated "bad catalog" kind in spec §7) so callers still
/// get a `DbError` without this crate inventing a new taxonomy branch.
pub fn corrupt(message: impl Into<String>) -> DbError {
    DbError::Io(io::Error::new(io::ErrorKind::InvalidData, message.into()))
}

/// Thin wrapper used by tests that want a scratch `.chk`/`.refed` pair
/// without wiring up a whole database directory.
pub fn write_all(path: &Path, bytes: &[u8]) -> DbResult<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    Ok(())
}

pub fn read_all(path: &Path) -> DbResult<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
