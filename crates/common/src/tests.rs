use super::*;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.buffer_pool_pages, 64);
    assert_eq!(cfg.btree_buffer_frames, 16);
}

#[test]
fn config_builder_overrides_defaults() {
    let cfg = Config::builder()
        .data_dir(PathBuf::from("./x"))
        .page_size(8192)
        .build();
    assert_eq!(cfg.page_size, 8192);
    assert_eq!(cfg.buffer_pool_pages, 64, "unset fields keep their default");
}

#[test]
fn rid_null_is_the_zero_sentinel() {
    assert!(Rid::NULL.is_null());
    assert!(!Rid::new(1, 0).is_null());
}

#[test]
fn nested_error_carries_kind_and_cause() {
    let io_err = DbError::Io(std::io::Error::other("disk full"));
    let err = DbError::InsertRecordFailed {
        kind: RecordWriteErrorKind::WrongTupleSize,
        cause: Some(Box::new(io_err)),
    };
    assert!(format!("{err}").contains("insert"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn condition_error_has_no_cause_field() {
    let err = DbError::InvalidCondition {
        kind: ConditionErrorKind::InvalidConditionOperator,
    };
    assert!(format!("{err}").contains("condition"));
}

#[test]
fn row_carries_its_rid_separately_from_values() {
    let row = Row::new(vec![Value::I32(1)]).with_rid(Rid::new(4, 2));
    assert_eq!(row.rid(), Some(Rid::new(4, 2)));
    assert_eq!(row.into_values().len(), 1);
}

#[test]
fn record_batch_affected_reports_count() {
    let rb = RecordBatch::affected("rows_affected", 3);
    assert_eq!(rb.columns, vec!["rows_affected".to_string()]);
    assert!(matches!(rb.rows[0].values[0], Value::U64(3)));
}

#[test]
fn io_error_converts() {
    let e = std::io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}
