//! Tests for prepared statements and BindResult decoding

use sqlbind::driver::memory::{MemoryDriver, MemoryServer, Operand, Script};
use sqlbind::driver::{AUTO_INCREMENT_FLAG, ColumnInfo, NOT_NULL_FLAG};
use sqlbind::error::ServerError;
use sqlbind::{ColumnType, Connection, Error, Row, RowCursor};

const INSERT: &str = "INSERT INTO tab_sample (beta, gamma, delta) VALUES (?, ?, ?)";
const SELECT_ALL: &str = "SELECT alpha, beta, gamma, delta FROM tab_sample";
const SELECT_BY_BETA: &str = "SELECT alpha, beta, gamma, delta FROM tab_sample WHERE beta = ?";
const UPDATE_BY_BETA: &str = "UPDATE tab_sample SET gamma = true WHERE beta = ?";
const DELETE_BY_ALPHA: &str = "DELETE FROM tab_sample WHERE alpha = ?";

type SampleRow = (i64, Option<String>, bool, f64);

fn setup() -> (MemoryServer, Connection<MemoryDriver>) {
    let server = MemoryServer::new();
    server.create_table(
        "tab_sample",
        vec![
            ColumnInfo::new("alpha", ColumnType::LongLong)
                .with_flags(AUTO_INCREMENT_FLAG | NOT_NULL_FLAG),
            ColumnInfo::new("beta", ColumnType::VarString),
            ColumnInfo::new("gamma", ColumnType::Tiny),
            ColumnInfo::new("delta", ColumnType::Double),
        ],
    );
    server.script(
        INSERT,
        Script::insert(
            "tab_sample",
            [
                ("beta", Operand::Param(0)),
                ("gamma", Operand::Param(1)),
                ("delta", Operand::Param(2)),
            ],
        ),
    );
    server.script(
        SELECT_ALL,
        Script::select("tab_sample", &["alpha", "beta", "gamma", "delta"]),
    );
    server.script(
        SELECT_BY_BETA,
        Script::select("tab_sample", &["alpha", "beta", "gamma", "delta"])
            .filter("beta", Operand::Param(0)),
    );
    server.script(
        UPDATE_BY_BETA,
        Script::update("tab_sample", [("gamma", Operand::from(true))])
            .filter("beta", Operand::Param(0)),
    );
    server.script(
        DELETE_BY_ALPHA,
        Script::delete("tab_sample").filter("alpha", Operand::Param(0)),
    );
    let conn = Connection::new(MemoryDriver::new(server.clone()), "mysql://localhost/sample")
        .expect("Failed to connect");
    (server, conn)
}

fn insert_samples(conn: &mut Connection<MemoryDriver>) {
    let mut stmt = conn.prepare_insert(INSERT, 3).unwrap();
    stmt.bind(("cheese", true, 1.5)).unwrap();
    assert_eq!(conn.run_prepared_insert(&mut stmt).unwrap(), Some(1));
    stmt.bind((None::<&str>, false, -2.25)).unwrap();
    assert_eq!(conn.run_prepared_insert(&mut stmt).unwrap(), Some(2));
    stmt.bind(("cake", false, 0.0)).unwrap();
    assert_eq!(conn.run_prepared_insert(&mut stmt).unwrap(), Some(3));
}

#[test]
fn test_direct_and_prepared_rows_match() {
    let (_server, mut conn) = setup();
    insert_samples(&mut conn);

    let direct: Vec<SampleRow> = conn.select(SELECT_ALL).unwrap().collect().unwrap();

    let mut stmt = conn.prepare_select(SELECT_ALL, 0, 4).unwrap();
    let prepared: Vec<SampleRow> = conn
        .run_prepared_select(&mut stmt)
        .unwrap()
        .collect()
        .unwrap();

    assert_eq!(direct.len(), 3);
    assert_eq!(direct, prepared);
    assert_eq!(prepared[1], (2, None, false, -2.25));
}

#[test]
fn test_select_with_parameter() {
    let (_server, mut conn) = setup();
    insert_samples(&mut conn);

    let mut stmt = conn.prepare_select(SELECT_BY_BETA, 1, 4).unwrap();
    stmt.bind(("cake",)).unwrap();
    let mut result = conn.run_prepared_select(&mut stmt).unwrap();
    let mut row = Row::<SampleRow>::default();

    result.next(&mut row).unwrap();
    assert_eq!(row.get(), Some(&(3, Some("cake".to_string()), false, 0.0)));
    result.next(&mut row).unwrap();
    assert!(!row.is_valid());
    result.next(&mut row).unwrap();
    assert!(!row.is_valid());
}

#[test]
fn test_update_matching_no_rows() {
    let (_server, mut conn) = setup();
    insert_samples(&mut conn);

    let mut stmt = conn.prepare_update(UPDATE_BY_BETA, 1).unwrap();
    stmt.bind(("nothing matches this",)).unwrap();
    assert_eq!(conn.run_prepared_update(&mut stmt).unwrap(), 0);

    stmt.bind(("cake",)).unwrap();
    assert_eq!(conn.run_prepared_update(&mut stmt).unwrap(), 1);
}

#[test]
fn test_remove() {
    let (server, mut conn) = setup();
    insert_samples(&mut conn);

    let mut stmt = conn.prepare_remove(DELETE_BY_ALPHA, 1).unwrap();
    stmt.bind((2_i64,)).unwrap();
    assert_eq!(conn.run_prepared_remove(&mut stmt).unwrap(), 1);
    stmt.bind((2_i64,)).unwrap();
    assert_eq!(conn.run_prepared_remove(&mut stmt).unwrap(), 0);
    assert_eq!(server.rows("tab_sample").len(), 2);
}

#[test]
fn test_parameters_must_be_rebound() {
    let (_server, mut conn) = setup();
    let mut stmt = conn.prepare_insert(INSERT, 3).unwrap();

    let err = conn.run_prepared_insert(&mut stmt).unwrap_err();
    assert!(matches!(err, Error::ParameterBinding(_)));

    stmt.bind(("cheese", true, 1.5)).unwrap();
    assert!(stmt.is_bound());
    conn.run_prepared_insert(&mut stmt).unwrap();
    assert!(!stmt.is_bound());

    let err = conn.run_prepared_insert(&mut stmt).unwrap_err();
    assert!(matches!(err, Error::ParameterBinding(_)));
}

#[test]
fn test_wrong_parameter_arity() {
    let (_server, mut conn) = setup();
    let mut stmt = conn.prepare_insert(INSERT, 3).unwrap();

    let err = stmt.bind(("cheese", true)).unwrap_err();
    assert!(matches!(err, Error::ParameterBinding(_)));
    assert!(!stmt.is_bound());
}

#[test]
fn test_untranslatable_parameter() {
    let (_server, mut conn) = setup();
    let mut stmt = conn.prepare_insert(INSERT, 3).unwrap();

    // gamma is TINY; a string has no integer binding
    let err = stmt.bind(("cheese", "yes", 1.5)).unwrap_err();
    assert!(matches!(err, Error::ParameterBinding(ref msg) if msg.starts_with("parameter 1")));

    // 300 does not fit TINY
    let err = stmt.bind(("cheese", 300_i64, 1.5)).unwrap_err();
    assert!(matches!(err, Error::ParameterBinding(_)));
}

#[test]
fn test_declared_counts_checked_at_prepare() {
    let (server, mut conn) = setup();

    let err = conn.prepare_insert(INSERT, 2).err().unwrap();
    assert!(matches!(err, Error::ParameterBinding(_)));

    let err = conn.prepare_select(SELECT_ALL, 0, 3).err().unwrap();
    assert!(matches!(err, Error::Decode(_)));

    // The rejected native statements were released
    assert_eq!(server.open_resources(), 1);
}

#[test]
fn test_statement_from_other_connection() {
    let (server, mut conn) = setup();
    let mut other =
        Connection::new(MemoryDriver::new(server.clone()), "mysql://localhost/sample").unwrap();

    let mut stmt = other.prepare_select(SELECT_ALL, 0, 4).unwrap();
    let err = conn.run_prepared_select(&mut stmt).err().unwrap();
    assert!(matches!(err, Error::InvalidUsage(_)));
}

#[test]
fn test_execution_failure_keeps_connection_usable() {
    let (server, mut conn) = setup();
    server.fail_statement(INSERT, ServerError::new(1062, "Duplicate entry"));

    let mut stmt = conn.prepare_insert(INSERT, 3).unwrap();
    stmt.bind(("cheese", true, 1.5)).unwrap();
    let err = conn.run_prepared_insert(&mut stmt).unwrap_err();
    assert_eq!(err.server_code(), Some(1062));
    assert!(!conn.is_broken());

    server.clear_failure(INSERT);
    stmt.bind(("cheese", true, 1.5)).unwrap();
    assert_eq!(conn.run_prepared_insert(&mut stmt).unwrap(), Some(1));
}

#[test]
fn test_unread_rows_discarded_between_runs() {
    let (_server, mut conn) = setup();
    insert_samples(&mut conn);

    let mut stmt = conn.prepare_select(SELECT_ALL, 0, 4).unwrap();
    {
        let mut result = conn.run_prepared_select(&mut stmt).unwrap();
        let first: SampleRow = result.fetch().unwrap().unwrap();
        assert_eq!(first.0, 1);
    }
    let rows: Vec<SampleRow> = conn
        .run_prepared_select(&mut stmt)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn test_statement_handles_released() {
    let (server, mut conn) = setup();
    {
        let stmt = conn.prepare_select(SELECT_ALL, 0, 4).unwrap();
        assert_eq!(server.open_resources(), 2);
        drop(stmt);
    }
    let stmt = conn.prepare_update(UPDATE_BY_BETA, 1).unwrap();
    stmt.close();
    assert_eq!(server.open_resources(), 1);
    assert_eq!(server.double_releases(), 0);
}
