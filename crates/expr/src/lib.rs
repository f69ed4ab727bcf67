//! Condition parsing and evaluation (spec §4.6): the flat four-variant
//! `Condition` shape a `WHERE`/`CHECK` comparison normalizes to, and `meets`,
//! the three-valued evaluator every selection, join, and constraint check
//! shares.
//!
//! The SQL frontend (`parser`) produces the looser [`Expr`] tree first —
//! literal text is not yet resolved to a type, and columns are named rather
//! than numbered. [`parse_simple_condition`] binds one `Expr` comparison
//! against a table's columns into a `Condition`; anything that is not a
//! single comparison (a cross-table reference, a `LIKE`, ...) is handled by
//! the caller per spec §4.6 step 2/§4.6.a.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use common::{ConditionErrorKind, DbError, DbResult};
use regex::RegexBuilder;
use types::{LiteralOutcome, SqlType};

/// Comparison operator a `WHERE`/`CHECK` condition may use. `IsNull`/
/// `IsNotNull` are not part of spec §4.6.a's sargable set — they are always
/// evaluated by `meets`, never answered by an index range scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    /// `true` for the six operators spec §4.6.a answers via index range
    /// scans when the left field is indexed.
    pub fn is_sargable(self) -> bool {
        matches!(
            self,
            CompareOp::Eq
                | CompareOp::Ne
                | CompareOp::Lt
                | CompareOp::Le
                | CompareOp::Gt
                | CompareOp::Ge
        )
    }

    /// Swap operand order: `a OP b` holds iff `b a.flip() a` holds. `None`
    /// for operators with no left/right-swapped equivalent (`Like`,
    /// `NotLike`, `IsNull`, `IsNotNull`).
    pub fn flip(self) -> Option<CompareOp> {
        Some(match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            _ => return None,
        })
    }
}

/// Unbound expression tree produced by the SQL frontend. Literal text is
/// carried verbatim (quotes already stripped by the tokenizer, escapes
/// still literal) so binding can defer to `types::literal_parse` once the
/// target column's type is known. There is no `Or` variant: spec §4.6
/// states conjunction is the only connective a `WHERE`/`CHECK` clause
/// supports, so the frontend rejects `OR` at parse time.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(String),
    BoolLiteral(bool),
    Column {
        table: Option<String>,
        name: String,
    },
    And(Box<Expr>, Box<Expr>),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    /// Flatten a conjunction into its leaf comparisons, in left-to-right
    /// order. A bare leaf (not wrapped in `And`) flattens to itself.
    pub fn flatten_and(&self) -> Vec<&Expr> {
        match self {
            Expr::And(l, r) => {
                let mut out = l.flatten_and();
                out.extend(r.flatten_and());
                out
            }
            other => vec![other],
        }
    }
}

/// One column a `Condition` may bind against: its id, name (for resolving
/// an unqualified or qualified [`Expr::Column`]), declared type, and
/// on-disk field length.
#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub field_id: u64,
    pub name: String,
    pub ty: SqlType,
    pub length: u64,
}

/// Which side of a bound [`Condition`] the right operand is (spec §4.6's
/// four-variant discriminant).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CondType {
    ConstFalse,
    ConstTrue,
    RightIsLiteral,
    RightIsField,
}

impl CondType {
    pub fn to_u64(self) -> u64 {
        match self {
            CondType::ConstFalse => 0,
            CondType::ConstTrue => 1,
            CondType::RightIsLiteral => 2,
            CondType::RightIsField => 3,
        }
    }

    pub fn from_u64(v: u64) -> Option<Self> {
        Some(match v {
            0 => CondType::ConstFalse,
            1 => CondType::ConstTrue,
            2 => CondType::RightIsLiteral,
            3 => CondType::RightIsField,
            _ => return None,
        })
    }
}

/// A bound, single-table condition (spec §4.6): `left_field_id` always
/// names a field of the table this condition was bound against; the right
/// side is either an already-encoded literal (`right_bytes`, valid when
/// `cond_type == RightIsLiteral`) or another field of the same table
/// (`right_field_id`, valid when `cond_type == RightIsField`).
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub cond_type: CondType,
    pub left_field_id: u64,
    pub right_field_id: u64,
    pub op: CompareOp,
    pub right_bytes: Vec<u8>,
}

impl Condition {
    pub const fn const_true() -> Self {
        Condition {
            cond_type: CondType::ConstTrue,
            left_field_id: 0,
            right_field_id: 0,
            op: CompareOp::Eq,
            right_bytes: Vec::new(),
        }
    }

    pub const fn const_false() -> Self {
        Condition {
            cond_type: CondType::ConstFalse,
            ..Condition::const_true()
        }
    }
}

fn resolve_column(expr: &Expr, columns: &[ColumnInfo]) -> DbResult<ColumnInfo> {
    let Expr::Column { table: _, name } = expr else {
        return Err(DbError::InvalidCondition {
            kind: ConditionErrorKind::InvalidConditionOperand,
        });
    };
    columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .cloned()
        .ok_or(DbError::InvalidCondition {
            kind: ConditionErrorKind::InvalidConditionOperand,
        })
}

fn null_literal(length: u64) -> Vec<u8> {
    vec![0u8; length as usize]
}

fn encode_literal(text: &str, col: &ColumnInfo) -> DbResult<Vec<u8>> {
    let value = match types::literal_parse(text, col.ty, col.length as usize) {
        LiteralOutcome::Value(v) => v,
        LiteralOutcome::ParseFailed => {
            return Err(DbError::InvalidCondition {
                kind: ConditionErrorKind::InvalidConditionOperand,
            });
        }
        LiteralOutcome::OutOfRange => {
            return Err(DbError::InvalidCondition {
                kind: ConditionErrorKind::InvalidConditionOperand,
            });
        }
    };
    let mut buf = vec![0u8; col.length as usize];
    types::encode(&value, col.ty, col.length as usize, &mut buf).map_err(|_| {
        DbError::InvalidCondition {
            kind: ConditionErrorKind::InvalidConditionOperand,
        }
    })?;
    Ok(buf)
}

/// Bind one leaf `Expr` (already split out of a conjunction) against
/// `columns`, normalizing per spec §4.6: `true`/`false` literals fold to
/// `ConstTrue`/`ConstFalse`; `IS NULL` becomes an `IsNull` comparison
/// against the field's own null flag, `IS NOT NULL` becomes `IsNotNull`;
/// `LIKE`/`NOT LIKE` require a quoted string literal on the right; when
/// both sides are field references they must share a type.
pub fn parse_simple_condition(expr: &Expr, columns: &[ColumnInfo]) -> DbResult<Condition> {
    match expr {
        Expr::BoolLiteral(true) => Ok(Condition::const_true()),
        Expr::BoolLiteral(false) => Ok(Condition::const_false()),

        Expr::IsNull { expr, negated } => {
            let col = resolve_column(expr, columns)?;
            Ok(Condition {
                cond_type: CondType::RightIsLiteral,
                left_field_id: col.field_id,
                right_field_id: 0,
                op: if *negated {
                    CompareOp::IsNotNull
                } else {
                    CompareOp::IsNull
                },
                right_bytes: null_literal(col.length),
            })
        }

        Expr::Compare { left, op, right } => {
            // Normalize `literal op column` to `column op literal` so the
            // bound `Condition`'s left side is always a field reference.
            let (left, op, right) = match (left.as_ref(), right.as_ref()) {
                (Expr::Literal(_), Expr::Column { .. }) => {
                    let flipped = op.flip().ok_or(DbError::InvalidCondition {
                        kind: ConditionErrorKind::InvalidConditionOperator,
                    })?;
                    (right.as_ref(), flipped, left.as_ref())
                }
                _ => (left.as_ref(), *op, right.as_ref()),
            };

            let left_col = resolve_column(left, columns)?;

            match right {
                Expr::Column { .. } => {
                    if matches!(op, CompareOp::Like | CompareOp::NotLike) {
                        return Err(DbError::InvalidCondition {
                            kind: ConditionErrorKind::InvalidConditionOperator,
                        });
                    }
                    let right_col = resolve_column(right, columns)?;
                    if right_col.ty != left_col.ty {
                        return Err(DbError::InvalidCondition {
                            kind: ConditionErrorKind::InvalidConditionOperand,
                        });
                    }
                    Ok(Condition {
                        cond_type: CondType::RightIsField,
                        left_field_id: left_col.field_id,
                        right_field_id: right_col.field_id,
                        op,
                        right_bytes: Vec::new(),
                    })
                }
                Expr::Literal(text) => {
                    if matches!(op, CompareOp::Like | CompareOp::NotLike) && !left_col.ty.is_string()
                    {
                        return Err(DbError::InvalidCondition {
                            kind: ConditionErrorKind::InvalidConditionOperator,
                        });
                    }
                    let right_bytes = if matches!(op, CompareOp::Like | CompareOp::NotLike) {
                        encode_string_literal(text, &left_col)?
                    } else {
                        encode_literal(text, &left_col)?
                    };
                    Ok(Condition {
                        cond_type: CondType::RightIsLiteral,
                        left_field_id: left_col.field_id,
                        right_field_id: 0,
                        op,
                        right_bytes,
                    })
                }
                _ => Err(DbError::InvalidCondition {
                    kind: ConditionErrorKind::InvalidConditionOperand,
                }),
            }
        }

        Expr::Literal(_) | Expr::Column { .. } | Expr::And(..) => Err(DbError::InvalidCondition {
            kind: ConditionErrorKind::InvalidConditionOperand,
        }),
    }
}

fn encode_string_literal(text: &str, col: &ColumnInfo) -> DbResult<Vec<u8>> {
    // LIKE patterns are stored with the same fixed-length encoding as any
    // other string literal, unescaped the same way, but never range-checked
    // against the column's payload capacity the way an INSERT value would
    // be -- a pattern longer than the column can hold simply never matches.
    let unescaped = unescape(text).ok_or(DbError::InvalidCondition {
        kind: ConditionErrorKind::InvalidConditionOperand,
    })?;
    let length = col.length.max(unescaped.len() as u64 + 1) as usize;
    let mut buf = vec![0u8; length];
    buf[0] = 0xff;
    let bytes = unescaped.as_bytes();
    buf[1..1 + bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'b' => out.push('\u{8}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            _ => return None,
        }
    }
    Some(out)
}

fn decode_string(buf: &[u8]) -> Option<String> {
    if buf.is_empty() || buf[0] == 0x00 {
        return None;
    }
    let end = buf[1..].iter().position(|&b| b == 0).map_or(buf.len() - 1, |p| p);
    Some(String::from_utf8_lossy(&buf[1..1 + end]).into_owned())
}

/// Translate a SQL `LIKE` pattern (`%` any run, `_` any single char) into a
/// case-insensitive, fully-anchored regular expression and test `text`
/// against it.
pub fn like_matches(text: &str, pattern: &str) -> bool {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    match RegexBuilder::new(&re).case_insensitive(true).dot_matches_new_line(true).build() {
        Ok(r) => r.is_match(text),
        Err(_) => false,
    }
}

/// Look up a field's type and raw encoded bytes by id, as exposed by
/// whatever record representation the caller holds (a table row, a join's
/// concatenated tuple, ...).
pub trait FieldLookup {
    fn field(&self, field_id: u64) -> Option<(SqlType, &[u8])>;
}

/// Evaluate the conjunction of `conditions` against one record through
/// `fields` (spec §4.6 `meets`): three-valued logic flattened to `false` on
/// any null comparand, except `IS NULL`/`IS NOT NULL` which interrogate the
/// null flag directly. The conjunction of all conditions must hold.
pub fn meets(fields: &dyn FieldLookup, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| eval_one(fields, c))
}

fn eval_one(fields: &dyn FieldLookup, c: &Condition) -> bool {
    match c.cond_type {
        CondType::ConstFalse => false,
        CondType::ConstTrue => true,
        CondType::RightIsLiteral | CondType::RightIsField => {
            let Some((ty, left_bytes)) = fields.field(c.left_field_id) else {
                return false;
            };
            match c.op {
                CompareOp::IsNull => left_bytes.first() == Some(&0x00),
                CompareOp::IsNotNull => left_bytes.first().is_some_and(|&b| b != 0x00),
                CompareOp::Like | CompareOp::NotLike => {
                    let Some(text) = decode_string(left_bytes) else {
                        return false;
                    };
                    let Some(pattern) = decode_string(&c.right_bytes) else {
                        return false;
                    };
                    let matched = like_matches(&text, &pattern);
                    if c.op == CompareOp::Like { matched } else { !matched }
                }
                _ => {
                    let right_bytes = match c.cond_type {
                        CondType::RightIsLiteral => c.right_bytes.clone(),
                        CondType::RightIsField => match fields.field(c.right_field_id) {
                            Some((_, b)) => b.to_vec(),
                            None => return false,
                        },
                        _ => unreachable!(),
                    };
                    if left_bytes.first() == Some(&0x00) || right_bytes.first() == Some(&0x00) {
                        return false;
                    }
                    let ord = types::compare(left_bytes, &right_bytes, ty);
                    match c.op {
                        CompareOp::Eq => ord == Ordering::Equal,
                        CompareOp::Ne => ord != Ordering::Equal,
                        CompareOp::Lt => ord == Ordering::Less,
                        CompareOp::Le => ord != Ordering::Greater,
                        CompareOp::Gt => ord == Ordering::Greater,
                        CompareOp::Ge => ord != Ordering::Less,
                        CompareOp::IsNull | CompareOp::IsNotNull | CompareOp::Like | CompareOp::NotLike => {
                            unreachable!()
                        }
                    }
                }
            }
        }
    }
}

/// Convenience `FieldLookup` over an already-decoded `(SqlType, Vec<u8>)`
/// map, used by callers that have materialized a record's field bytes
/// rather than holding the table's own raw buffer.
pub struct OwnedFields(pub Vec<(u64, SqlType, Vec<u8>)>);

impl FieldLookup for OwnedFields {
    fn field(&self, field_id: u64) -> Option<(SqlType, &[u8])> {
        self.0
            .iter()
            .find(|(id, _, _)| *id == field_id)
            .map(|(_, ty, bytes)| (*ty, bytes.as_slice()))
    }
}
