use crate::{RecordBatch, Rid, Row};
use tabled::{Table, Tabled, builder::Builder, settings};
use types::Value;

/// Predefined output styles that map to `tabled` styles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TableStyleKind {
    #[default]
    Modern,
    Ascii,
    Plain,
}

impl TableStyleKind {
    fn apply(self, table: &mut Table) {
        match self {
            Self::Modern => table.with(settings::Style::modern()),
            Self::Ascii => table.with(settings::Style::ascii()),
            Self::Plain => table.with(settings::Style::empty()),
        };
    }
}

/// Render a `RecordBatch` into a human-friendly table string, the way the
/// REPL prints `SELECT`/`DESC`/`SHOW` results.
pub fn render_record_batch(batch: &RecordBatch, style: TableStyleKind) -> String {
    if batch.columns.is_empty() && batch.rows.is_empty() {
        return "<empty>".into();
    }

    let mut builder = Builder::default();
    builder.push_record(batch.columns.iter().cloned());
    for row in &batch.rows {
        builder.push_record(row.values.iter().map(format_value));
    }

    let mut table = builder.build();
    style.apply(&mut table);
    table.to_string()
}

/// Render arbitrary string rows with the provided style.
pub fn render_string_table(
    headers: &[&str],
    rows: Vec<Vec<String>>,
    style: TableStyleKind,
) -> String {
    if headers.is_empty() && rows.is_empty() {
        return "<empty>".into();
    }

    let mut builder = Builder::default();
    if !headers.is_empty() {
        builder.push_record(headers.iter().copied());
    }
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();
    style.apply(&mut table);
    table.to_string()
}

/// Render any `Tabled` rows with the provided style.
pub fn render_structured_rows<T>(rows: &[T], style: TableStyleKind) -> String
where
    T: Tabled + Clone,
{
    if rows.is_empty() {
        return "<empty>".into();
    }

    let mut table = Table::new(rows.to_vec());
    style.apply(&mut table);
    table.to_string()
}

/// Format a full row into a comma-separated string.
pub fn format_row(values: &[Value]) -> String {
    values
        .iter()
        .map(format_value)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a single value for display the way `literal_render` formats an
/// on-disk field, but straight from the already-decoded `Value`.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::I8(v) => v.to_string(),
        Value::U8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Char(s) | Value::UChar(s) => format!("'{s}'"),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Null => "NULL".into(),
    }
}

/// Format a `Rid` as `(page_id, slot_id)`.
pub fn format_rid(rid: &Rid) -> String {
    format!("({}, {})", rid.page_id, rid.slot_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_batch_with_columns_renders_headers() {
        let batch = RecordBatch {
            columns: vec!["id".into(), "name".into()],
            rows: vec![Row::new(vec![Value::I32(1), Value::Char("Ada".into())])],
        };

        let rendered = render_record_batch(&batch, TableStyleKind::Modern);
        assert!(rendered.contains("id"));
        assert!(rendered.contains("'Ada'"));
    }

    #[test]
    fn empty_batch_renders_placeholder() {
        let batch = RecordBatch::empty();
        assert_eq!(render_record_batch(&batch, TableStyleKind::Plain), "<empty>");
    }

    #[test]
    fn format_rid_uses_page_and_slot() {
        let rid = Rid::new(3, 7);
        assert_eq!(format_rid(&rid), "(3, 7)");
    }
}
