//! Tests that direct and prepared execution decode column types alike

use sqlbind::driver::memory::{MemoryDriver, MemoryServer, Operand, Script};
use sqlbind::driver::{ColumnInfo, UNSIGNED_FLAG};
use sqlbind::{ColumnType, Connection, Error, RowCursor};

const INSERT_NUMBERS: &str = "INSERT INTO tab_numbers VALUES (200, -1, 18446744073709551615)";
const INSERT_NUMBERS_BOUND: &str = "INSERT INTO tab_numbers VALUES (?, ?, ?)";
const INSERT_WIDE: &str = "INSERT INTO tab_numbers (s_tiny) VALUES (300)";
const SELECT_NUMBERS: &str = "SELECT u_tiny, s_tiny, u_big FROM tab_numbers";
const SELECT_SIGNED: &str = "SELECT s_tiny FROM tab_numbers";
const INSERT_DATES: &str = "INSERT INTO tab_dates VALUES ('2024-01-02', '2024-01-02 03:04:05')";
const INSERT_DATES_BOUND: &str = "INSERT INTO tab_dates VALUES (?, ?)";
const SELECT_DATES: &str = "SELECT d, ts FROM tab_dates";

const ER_WARN_DATA_OUT_OF_RANGE: u16 = 1264;

fn setup() -> (MemoryServer, Connection<MemoryDriver>) {
    let server = MemoryServer::new();
    server.create_table(
        "tab_numbers",
        vec![
            ColumnInfo::new("u_tiny", ColumnType::Tiny).with_flags(UNSIGNED_FLAG),
            ColumnInfo::new("s_tiny", ColumnType::Tiny),
            ColumnInfo::new("u_big", ColumnType::LongLong).with_flags(UNSIGNED_FLAG),
        ],
    );
    server.create_table(
        "tab_dates",
        vec![
            ColumnInfo::new("d", ColumnType::Date),
            ColumnInfo::new("ts", ColumnType::DateTime),
        ],
    );
    server.script(
        INSERT_NUMBERS,
        Script::insert(
            "tab_numbers",
            [
                ("u_tiny", Operand::from(200_i64)),
                ("s_tiny", Operand::from(-1_i64)),
                ("u_big", Operand::from(u64::MAX)),
            ],
        ),
    );
    server.script(
        INSERT_NUMBERS_BOUND,
        Script::insert(
            "tab_numbers",
            [
                ("u_tiny", Operand::Param(0)),
                ("s_tiny", Operand::Param(1)),
                ("u_big", Operand::Param(2)),
            ],
        ),
    );
    server.script(
        INSERT_WIDE,
        Script::insert("tab_numbers", [("s_tiny", Operand::from(300_i64))]),
    );
    server.script(
        SELECT_NUMBERS,
        Script::select("tab_numbers", &["u_tiny", "s_tiny", "u_big"]),
    );
    server.script(SELECT_SIGNED, Script::select("tab_numbers", &["s_tiny"]));
    server.script(
        INSERT_DATES,
        Script::insert(
            "tab_dates",
            [
                ("d", Operand::from("2024-01-02")),
                ("ts", Operand::from("2024-01-02 03:04:05")),
            ],
        ),
    );
    server.script(
        INSERT_DATES_BOUND,
        Script::insert(
            "tab_dates",
            [("d", Operand::Param(0)), ("ts", Operand::Param(1))],
        ),
    );
    server.script(SELECT_DATES, Script::select("tab_dates", &["d", "ts"]));
    let conn = Connection::new(MemoryDriver::new(server.clone()), "mysql://localhost/sample")
        .expect("Failed to connect");
    (server, conn)
}

fn both_paths<T: sqlbind::FromRow>(
    conn: &mut Connection<MemoryDriver>,
    sql: &str,
    columns: usize,
) -> (sqlbind::Result<Vec<T>>, sqlbind::Result<Vec<T>>) {
    let text = conn.select(sql).unwrap().collect();
    let mut stmt = conn.prepare_select(sql, 0, columns).unwrap();
    let binary = conn.run_prepared_select(&mut stmt).unwrap().collect();
    (text, binary)
}

#[test]
fn test_signedness_follows_column() {
    let (_server, mut conn) = setup();
    conn.insert(INSERT_NUMBERS).unwrap();

    let (text, binary) = both_paths::<(i32, i32, u64)>(&mut conn, SELECT_NUMBERS, 3);
    let expected = vec![(200, -1, u64::MAX)];
    assert_eq!(text.unwrap(), expected);
    assert_eq!(binary.unwrap(), expected);

    // A signed -1 has no u8 value on either path
    let (text, binary) = both_paths::<(u8,)>(&mut conn, SELECT_SIGNED, 1);
    assert!(matches!(text.unwrap_err(), Error::Decode(_)));
    assert!(matches!(binary.unwrap_err(), Error::Decode(_)));
}

#[test]
fn test_unsigned_parameters() {
    let (server, mut conn) = setup();
    let mut stmt = conn.prepare_insert(INSERT_NUMBERS_BOUND, 3).unwrap();
    stmt.bind((200_u8, -1_i8, u64::MAX)).unwrap();
    conn.run_prepared_insert(&mut stmt).unwrap();

    let (text, binary) = both_paths::<(u8, i8, u64)>(&mut conn, SELECT_NUMBERS, 3);
    assert_eq!(text.unwrap(), vec![(200, -1, u64::MAX)]);
    assert_eq!(binary.unwrap(), vec![(200, -1, u64::MAX)]);
    assert_eq!(server.rows("tab_numbers").len(), 1);
}

#[test]
fn test_out_of_range_write_rejected() {
    let (server, mut conn) = setup();

    let err = conn.insert(INSERT_WIDE).unwrap_err();
    assert_eq!(err.server_code(), Some(ER_WARN_DATA_OUT_OF_RANGE));

    // 200 binds as an unsigned TINY, which the signed column cannot hold
    let mut stmt = conn.prepare_insert(INSERT_NUMBERS_BOUND, 3).unwrap();
    stmt.bind((1_u8, 200_u8, 1_u64)).unwrap();
    let err = conn.run_prepared_insert(&mut stmt).unwrap_err();
    assert_eq!(err.server_code(), Some(ER_WARN_DATA_OUT_OF_RANGE));

    assert!(server.rows("tab_numbers").is_empty());
    assert!(!conn.is_broken());
}

#[test]
fn test_dates_as_strings() {
    let (_server, mut conn) = setup();
    conn.insert(INSERT_DATES).unwrap();

    let (text, binary) = both_paths::<(String, String)>(&mut conn, SELECT_DATES, 2);
    let expected = vec![("2024-01-02".to_string(), "2024-01-02 03:04:05".to_string())];
    assert_eq!(text.unwrap(), expected);
    assert_eq!(binary.unwrap(), expected);
}

#[test]
fn test_date_parameters_from_strings() {
    let (_server, mut conn) = setup();
    let mut stmt = conn.prepare_insert(INSERT_DATES_BOUND, 2).unwrap();
    stmt.bind(("2024-01-02", "2024-01-02")).unwrap();
    conn.run_prepared_insert(&mut stmt).unwrap();

    let (text, binary) = both_paths::<(String, String)>(&mut conn, SELECT_DATES, 2);
    let expected = vec![("2024-01-02".to_string(), "2024-01-02 00:00:00".to_string())];
    assert_eq!(text.unwrap(), expected);
    assert_eq!(binary.unwrap(), expected);

    let err = stmt.bind(("tomorrow", "2024-01-02")).unwrap_err();
    assert!(matches!(err, Error::ParameterBinding(_)));
}

#[cfg(feature = "with-chrono")]
#[test]
fn test_chrono_round_trip() {
    use chrono::{NaiveDate, NaiveDateTime};

    let (_server, mut conn) = setup();
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let stamp = date.and_hms_micro_opt(3, 4, 5, 250).unwrap();

    let mut stmt = conn.prepare_insert(INSERT_DATES_BOUND, 2).unwrap();
    stmt.bind((date, stamp)).unwrap();
    conn.run_prepared_insert(&mut stmt).unwrap();

    let (text, binary) = both_paths::<(NaiveDate, NaiveDateTime)>(&mut conn, SELECT_DATES, 2);
    assert_eq!(text.unwrap(), vec![(date, stamp)]);
    assert_eq!(binary.unwrap(), vec![(date, stamp)]);
}
