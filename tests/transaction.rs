//! Tests for transactions and the transaction guard

use std::cell::RefCell;
use std::rc::Rc;

use sqlbind::driver::memory::{MemoryDriver, MemoryServer, Operand, Script};
use sqlbind::driver::{AUTO_INCREMENT_FLAG, ColumnInfo, NOT_NULL_FLAG};
use sqlbind::error::ServerError;
use sqlbind::{ColumnType, Connection, Error, RowCursor, TransactionState};

const INSERT: &str = "INSERT INTO tab_sample (beta) VALUES ('cheese')";
const COUNT_ALL: &str = "SELECT alpha FROM tab_sample";

fn setup() -> (MemoryServer, Connection<MemoryDriver>) {
    let server = MemoryServer::new();
    server.create_table(
        "tab_sample",
        vec![
            ColumnInfo::new("alpha", ColumnType::LongLong)
                .with_flags(AUTO_INCREMENT_FLAG | NOT_NULL_FLAG),
            ColumnInfo::new("beta", ColumnType::VarString),
        ],
    );
    server.script(INSERT, Script::insert("tab_sample", [("beta", Operand::from("cheese"))]));
    server.script(COUNT_ALL, Script::select("tab_sample", &["alpha"]));
    let conn = Connection::new(MemoryDriver::new(server.clone()), "mysql://localhost/sample")
        .expect("Failed to connect");
    (server, conn)
}

fn visible_rows(conn: &mut Connection<MemoryDriver>) -> usize {
    let rows: Vec<(i64,)> = conn.select(COUNT_ALL).unwrap().collect().unwrap();
    rows.len()
}

fn capture_reports(conn: &mut Connection<MemoryDriver>) -> Rc<RefCell<Vec<String>>> {
    let reports = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reports);
    conn.set_rollback_failure_hook(move |msg| sink.borrow_mut().push(msg.to_string()));
    reports
}

#[test]
fn test_start_twice_fails() {
    let (_server, mut conn) = setup();
    conn.start_transaction().unwrap();
    let err = conn.start_transaction().unwrap_err();
    assert!(matches!(err, Error::TransactionState(_)));
    assert!(conn.in_transaction());
}

#[test]
fn test_finish_after_finish_fails() {
    let (_server, mut conn) = setup();
    conn.start_transaction().unwrap();
    conn.rollback_transaction(false).unwrap();
    assert!(matches!(
        conn.commit_transaction().unwrap_err(),
        Error::TransactionState(_)
    ));
    assert!(matches!(
        conn.rollback_transaction(false).unwrap_err(),
        Error::TransactionState(_)
    ));

    conn.start_transaction().unwrap();
    conn.commit_transaction().unwrap();
    assert!(matches!(
        conn.rollback_transaction(false).unwrap_err(),
        Error::TransactionState(_)
    ));
    assert!(matches!(
        conn.commit_transaction().unwrap_err(),
        Error::TransactionState(_)
    ));
}

#[test]
fn test_explicit_rollback_discards_inserts() {
    let (server, mut conn) = setup();
    let mut tx = conn.transaction().unwrap();
    assert_eq!(tx.state(), TransactionState::Active);
    tx.insert(INSERT).unwrap();
    tx.insert(INSERT).unwrap();
    assert_eq!(visible_rows(&mut tx), 2);
    tx.rollback().unwrap();

    assert_eq!(visible_rows(&mut conn), 0);
    assert!(server.rows("tab_sample").is_empty());
    assert!(!conn.in_transaction());
}

#[test]
fn test_commit_keeps_inserts() {
    let (_server, mut conn) = setup();
    let mut tx = conn.transaction().unwrap();
    tx.insert(INSERT).unwrap();
    tx.commit().unwrap();

    assert_eq!(visible_rows(&mut conn), 1);
    assert!(!conn.in_transaction());
}

#[test]
fn test_guard_rolls_back_on_drop() {
    let (server, mut conn) = setup();
    let reports = capture_reports(&mut conn);
    {
        let mut tx = conn.transaction().unwrap();
        tx.insert(INSERT).unwrap();
    }
    assert_eq!(visible_rows(&mut conn), 0);
    assert!(!conn.in_transaction());
    assert!(reports.borrow().is_empty());
    assert_eq!(server.statements().last().map(String::as_str), Some(COUNT_ALL));
    assert!(server.statements().iter().any(|s| s == "ROLLBACK"));
}

#[test]
fn test_failed_implicit_rollback_is_reported_once() {
    let (server, mut conn) = setup();
    let reports = capture_reports(&mut conn);
    server.fail_statement("ROLLBACK", ServerError::new(1205, "Lock wait timeout exceeded"));
    {
        let mut tx = conn.transaction().unwrap();
        tx.insert(INSERT).unwrap();
        // Dropped without commit; rollback fails; nothing is raised
    }
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_empty());
    assert!(reports[0].contains("1205"));
    // The failed rollback left the transaction open
    assert!(conn.in_transaction());
}

#[test]
fn test_failed_explicit_rollback_raises() {
    let (server, mut conn) = setup();
    let reports = capture_reports(&mut conn);
    server.fail_statement("ROLLBACK", ServerError::new(1205, "Lock wait timeout exceeded"));

    let tx = conn.transaction().unwrap();
    let err = tx.rollback().unwrap_err();
    assert_eq!(err.server_code(), Some(1205));
    // Not retried, not reported
    assert!(reports.borrow().is_empty());
}

#[test]
fn test_failed_commit_rolls_back_on_drop() {
    let (server, mut conn) = setup();
    server.fail_statement("COMMIT", ServerError::new(1213, "Deadlock found"));

    let mut tx = conn.transaction().unwrap();
    tx.insert(INSERT).unwrap();
    let err = tx.commit().unwrap_err();
    assert_eq!(err.server_code(), Some(1213));

    assert!(!conn.in_transaction());
    assert_eq!(visible_rows(&mut conn), 0);
}

#[test]
fn test_guard_while_active_fails() {
    let (_server, mut conn) = setup();
    conn.start_transaction().unwrap();
    let err = conn.transaction().err().unwrap();
    assert!(matches!(err, Error::TransactionState(_)));
    // The failed guard did not roll back the outer transaction
    assert!(conn.in_transaction());
}

#[test]
fn test_guard_leaves_later_transaction_alone() {
    let (server, mut conn) = setup();
    let mut tx = conn.transaction().unwrap();
    tx.commit_transaction().unwrap();
    tx.start_transaction().unwrap();
    tx.insert(INSERT).unwrap();
    drop(tx);

    assert_eq!(server.statements().last().map(String::as_str), Some(INSERT));
    assert!(conn.in_transaction());
    conn.commit_transaction().unwrap();
    assert_eq!(visible_rows(&mut conn), 1);
}

#[test]
fn test_guard_cannot_finish_later_transaction() {
    let (_server, mut conn) = setup();
    let mut tx = conn.transaction().unwrap();
    tx.rollback_transaction(false).unwrap();
    tx.start_transaction().unwrap();
    tx.insert(INSERT).unwrap();
    assert!(matches!(tx.commit().unwrap_err(), Error::TransactionState(_)));

    assert!(conn.in_transaction());
    conn.rollback_transaction(false).unwrap();
    assert_eq!(visible_rows(&mut conn), 0);
}

#[test]
fn test_run_transaction_commits() {
    let (_server, mut conn) = setup();
    let id = conn
        .run_transaction(|conn| {
            conn.insert(INSERT)?;
            conn.insert(INSERT)
        })
        .unwrap();
    assert_eq!(id, Some(2));
    assert_eq!(visible_rows(&mut conn), 2);
}

#[test]
fn test_run_transaction_rolls_back_on_error() {
    let (_server, mut conn) = setup();
    let err = conn
        .run_transaction(|conn| -> sqlbind::Result<()> {
            conn.insert(INSERT)?;
            conn.execute("SELECT no_such_statement")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Query(_)));
    assert_eq!(visible_rows(&mut conn), 0);
    assert!(!conn.in_transaction());
}

#[test]
fn test_run_transaction_reports_failed_rollback() {
    let (server, mut conn) = setup();
    let reports = capture_reports(&mut conn);
    server.fail_statement("ROLLBACK", ServerError::new(1205, "Lock wait timeout exceeded"));

    let err = conn
        .run_transaction(|_| -> sqlbind::Result<()> {
            Err(Error::InvalidUsage("closure failed".into()))
        })
        .unwrap_err();
    // The closure's error wins
    assert!(matches!(err, Error::InvalidUsage(_)));
    assert_eq!(reports.borrow().len(), 1);
}
