use crate::value::Value;

/// The five aggregate functions a `SELECT` with `GROUP BY` (or a bare
/// whole-table aggregate) may apply to one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFn {
    Sum,
    Avg,
    Max,
    Min,
    Count,
}

/// Fold `values` (one group's column values, already extracted from each
/// matching row) through `func`. SQL NULLs are skipped by every function
/// except `Count`'s special `COUNT(*)` caller, which passes every row's
/// placeholder and never nulls — ordinary `COUNT(col)` still skips nulls
/// here. Widening: `Sum` promotes integers to `i64` and floats to `f64`;
/// `Avg` always produces `f64`; `Count` always produces `u64`; `Max`/`Min`
/// preserve the source column's own type.
pub fn aggregate(func: AggregateFn, values: &[Value]) -> Value {
    let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    match func {
        AggregateFn::Count => Value::U64(non_null.len() as u64),
        AggregateFn::Sum => {
            if non_null.is_empty() {
                return Value::Null;
            }
            if non_null.iter().any(|v| matches!(v, Value::Float(_) | Value::Double(_))) {
                Value::Double(non_null.iter().filter_map(|v| v.as_f64()).sum())
            } else {
                Value::I64(non_null.iter().filter_map(|v| v.as_i64()).sum())
            }
        }
        AggregateFn::Avg => {
            if non_null.is_empty() {
                return Value::Null;
            }
            let sum: f64 = non_null.iter().filter_map(|v| v.as_f64()).sum();
            Value::Double(sum / non_null.len() as f64)
        }
        AggregateFn::Max => non_null
            .into_iter()
            .cloned()
            .reduce(|a, b| if value_lt(&a, &b) { b } else { a })
            .unwrap_or(Value::Null),
        AggregateFn::Min => non_null
            .into_iter()
            .cloned()
            .reduce(|a, b| if value_lt(&b, &a) { b } else { a })
            .unwrap_or(Value::Null),
    }
}

fn value_lt(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Char(x), Value::Char(y)) | (Value::UChar(x), Value::UChar(y)) => x < y,
        (Value::Bool(x), Value::Bool(y)) => !x & y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x < y,
            _ => false,
        },
    }
}
