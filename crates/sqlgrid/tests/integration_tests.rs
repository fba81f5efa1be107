//! End-to-end tests: split a script, run it, edit the result and commit.

mod common;

use common::{get_test_database_url, TestDatabase, TestSqlite};
use sqlgrid::config::GridConfig;
use sqlgrid::driver::{AnyDriver, Driver, TableRef, Value};
use sqlgrid::grid::{GridKeyResult, ResultGrid};
use sqlgrid::runner::QueryRunner;
use sqlgrid::sql::{resolve_to_nearest_statement, split_sql_query, SqlDocument};
use sqlgrid::{CommitEngine, CommitError};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn texts(script: &str) -> Vec<String> {
    split_sql_query(&SqlDocument::new(script))
        .unwrap()
        .into_iter()
        .map(|s| s.text)
        .collect()
}

async fn load_people<D: Driver>(driver: &D) -> ResultGrid {
    let result = driver
        .query("SELECT id, name, score FROM people ORDER BY id")
        .await
        .unwrap();
    let schema = driver.table_schema(&TableRef::new("people")).await.unwrap();
    ResultGrid::from_result(&result, Some(&schema), &GridConfig::default())
}

#[tokio::test]
async fn test_script_runs_statement_by_statement() {
    let db = TestSqlite::new().await;
    let statements = texts(common::PEOPLE_SCHEMA);
    assert_eq!(statements.len(), 4);

    let mut seen = Vec::new();
    let outcome = QueryRunner::new(&db.driver)
        .run(&statements, |p| seen.push((p.progress, p.error)))
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.logs.len(), 4);
    assert!(outcome.logs.iter().all(|l| l.is_success()));
    assert_eq!(seen.len(), 8);
    assert_eq!(seen.last(), Some(&(4, false)));
    // No statement produced columns.
    assert!(outcome.last().is_none());
}

#[tokio::test]
async fn test_trigger_body_is_one_statement() {
    let db = TestSqlite::with_people().await;
    let script = "
CREATE TABLE audit (person_id INTEGER, note TEXT);
CREATE TRIGGER people_audit AFTER UPDATE ON people
BEGIN
    INSERT INTO audit VALUES (NEW.id, 'updated');
    UPDATE audit SET note = 'seen' WHERE person_id = -1;
END;
UPDATE people SET score = 1.0 WHERE id = 2;
SELECT person_id, note FROM audit;
";
    let statements = texts(script);
    assert_eq!(statements.len(), 4);
    assert!(statements[1].starts_with("CREATE TRIGGER"));
    assert!(statements[1].trim_end().ends_with("END;"));

    let outcome = QueryRunner::new(&db.driver).run(&statements, |_| {}).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    let last = outcome.last().unwrap();
    assert_eq!(last.rows, vec![vec![Value::Integer(2), Value::from("updated")]]);
}

#[tokio::test]
async fn test_failure_keeps_partial_results() {
    let db = TestSqlite::with_people().await;
    let statements = texts("SELECT 1 AS one; SELECT * FROM nowhere; SELECT 2 AS two;");

    let outcome = QueryRunner::new(&db.driver).run(&statements, |_| {}).await;
    let error = outcome.error.clone().unwrap();
    assert_eq!(error.order, 2);
    assert!(error.message.contains("nowhere"), "got: {}", error.message);
    assert_eq!(outcome.logs.len(), 2);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.last().unwrap().headers[0].name, "one");
}

#[tokio::test]
async fn test_nearest_statement_runs_alone() {
    let db = TestSqlite::with_people().await;
    let script = "SELECT name FROM people WHERE id = 1;\n\n\n\nSELECT name FROM people WHERE id = 3;";
    // Cursor on the blank line right after the first statement.
    let cursor = script.find('\n').unwrap() + 1;

    let span = resolve_to_nearest_statement(&SqlDocument::with_cursor(script, cursor), None)
        .unwrap()
        .unwrap();
    let result = db.driver.query(&span.text).await.unwrap();
    assert_eq!(result.rows[0][0], Value::from("Ada"));
}

#[tokio::test]
async fn test_edit_and_commit_round_trip() {
    let db = TestSqlite::with_people().await;
    let mut grid = load_people(&db.driver).await;

    // Rename Linus through the keyboard editing path.
    assert!(grid.set_focus(1, 1));
    grid.handle_key(key(KeyCode::Enter));
    assert!(grid.is_editing());
    for _ in 0.."Linus".len() {
        grid.handle_key(key(KeyCode::Backspace));
    }
    for c in "Torvalds".chars() {
        grid.handle_key(key(KeyCode::Char(c)));
    }
    grid.handle_key(key(KeyCode::Enter));
    assert!(!grid.is_editing());

    grid.remove_row(Some(2));
    let new_row = grid.insert_new_row(Some(3), None).unwrap();
    grid.change_value(new_row, 1, Value::from("Barbara"));

    let summary = CommitEngine::new(&db.driver)
        .commit(&mut grid, &TableRef::new("people"))
        .await
        .unwrap();
    assert_eq!(summary.total(), 3);
    assert!(!grid.has_changes());

    // The grid now mirrors the table, server-assigned id included.
    let fresh = load_people(&db.driver).await;
    assert_eq!(fresh.row_count(), grid.row_count());
    for y in 0..fresh.row_count() {
        for x in 0..fresh.column_count() {
            assert_eq!(grid.get_value(y, x), fresh.get_value(y, x), "cell ({}, {})", y, x);
        }
    }
    assert_eq!(grid.get_value(1, 1), Some(&Value::from("Torvalds")));
    // rowid reuse: id 3 was deleted in the same transaction.
    assert_eq!(grid.get_value(2, 0), Some(&Value::Integer(3)));
    assert_eq!(grid.get_value(2, 1), Some(&Value::from("Barbara")));
}

#[tokio::test]
async fn test_rollback_leaves_database_and_grid_alone() {
    let db = TestSqlite::with_people().await;
    let mut grid = load_people(&db.driver).await;

    grid.change_value(0, 2, Value::Real(1.0));
    // Duplicate primary key makes the batch fail.
    let idx = grid.insert_new_row(Some(0), None).unwrap();
    grid.change_value(idx, 0, Value::Integer(3));
    grid.change_value(idx, 1, Value::from("Clone"));
    let before = grid.get_changed_rows();

    let err = CommitEngine::new(&db.driver)
        .commit(&mut grid, &TableRef::new("people"))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Driver(_)));
    assert_eq!(grid.get_changed_rows(), before);

    let fresh = load_people(&db.driver).await;
    assert_eq!(fresh.row_count(), 3);
    assert_eq!(fresh.get_value(0, 2), Some(&Value::Real(9.5)));
}

#[tokio::test]
async fn test_copy_selection_from_query_result() {
    let db = TestSqlite::with_people().await;
    let mut grid = load_people(&db.driver).await;

    grid.set_focus(0, 1);
    let shift_down = KeyEvent::new(KeyCode::Down, KeyModifiers::SHIFT);
    grid.handle_key(shift_down);
    grid.handle_key(shift_down);
    let copied = grid.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert_eq!(
        copied,
        GridKeyResult::CopyToClipboard("Ada\nLinus\nGrace".to_string())
    );
}

#[tokio::test]
async fn test_any_driver_opens_sqlite_url() {
    let db = TestSqlite::with_people().await;
    let driver = AnyDriver::connect(&db.url).await.unwrap();
    let result = driver.query("SELECT count(*) AS n FROM people").await.unwrap();
    assert_eq!(result.rows[0][0], Value::Integer(3));
    assert!(AnyDriver::connect("mysql://localhost/db").await.is_err());
}

#[tokio::test]
async fn test_postgres_commit_round_trip() {
    let Some(admin_url) = get_test_database_url() else {
        eprintln!("Skipping: TEST_DATABASE_URL not set");
        return;
    };

    let test_db = TestDatabase::new(&admin_url).await.unwrap();
    let driver = AnyDriver::connect(&test_db.url).await.unwrap();

    let setup = texts(
        "CREATE TABLE people (id SERIAL PRIMARY KEY, name TEXT NOT NULL, score REAL);
         INSERT INTO people (name, score) VALUES ('Ada', 9.5), ('Linus', NULL);",
    );
    let outcome = QueryRunner::new(&driver).run(&setup, |_| {}).await;
    assert!(outcome.is_success(), "{:?}", outcome.error);

    let mut grid = load_people(&driver).await;
    assert!(grid.headers()[0].is_primary_key);
    grid.change_value(1, 1, Value::from("Torvalds"));
    let idx = grid.insert_new_row(Some(2), None).unwrap();
    grid.change_value(idx, 1, Value::from("Grace"));

    CommitEngine::new(&driver)
        .commit(&mut grid, &TableRef::new("people"))
        .await
        .unwrap();

    // Simple-query values come back as text.
    assert_eq!(grid.get_value(1, 1), Some(&Value::from("Torvalds")));
    assert_eq!(grid.get_value(2, 0), Some(&Value::from("3")));

    drop(driver);
    test_db.cleanup().await;
}
