/// Integration tests for loading single feed files
mod common;

use common::Fixture;
use feedload_core::{Connection, FeedloadError, IdentifierPolicy, Value};
use feedload_interchange::{BulkLoader, FailurePolicy, LoadOutcome, LoaderConfig};
use indoc::indoc;
use pretty_assertions::assert_eq;

fn s(text: &str) -> Value {
    Value::String(text.to_string())
}

#[tokio::test]
async fn test_missing_source_issues_no_statements() {
    let fx = Fixture::new().await;
    let loader = BulkLoader::default();

    let outcome = loader
        .load(&fx.conn, &fx.feeds_root(), "F", "agency.txt", "agency")
        .await
        .expect("a missing file is not an error");

    assert_eq!(
        outcome,
        LoadOutcome::SourceMissing {
            path: fx.feeds_root().join("F").join("agency.txt")
        }
    );
    assert_eq!(outcome.rows_inserted(), 0);
    assert!(fx.conn.executed().is_empty());
}

#[tokio::test]
async fn test_round_trip_tags_rows_with_feed() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "T.txt", "a,b\n1,\n2,x\n");

    let outcome = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .expect("load should succeed");

    let summary = outcome.summary().expect("file was loaded");
    assert_eq!(summary.rows_inserted, 2);
    assert_eq!(summary.columns, vec!["a", "b"]);
    assert_eq!(summary.feed, "F");
    assert_eq!(summary.table, "T");

    assert_eq!(
        fx.rows("SELECT feed, a, b FROM T ORDER BY a").await,
        vec![
            vec![s("F"), Value::Int64(1), Value::Null],
            vec![s("F"), Value::Int64(2), s("x")],
        ]
    );
}

#[tokio::test]
async fn test_statement_order_is_pragma_begin_inserts_commit() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "T.txt", "a,b\n1,2\n3,4\n");

    BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .unwrap();

    let executed = fx.conn.executed();
    let insert = r#"INSERT INTO "T" ("feed", "a", "b") VALUES (:feed, :c0, :c1)"#;
    assert_eq!(
        executed,
        vec!["PRAGMA defer_foreign_keys = ON", "BEGIN", insert, insert, "COMMIT"]
    );
    assert!(!fx.in_transaction());
}

#[tokio::test]
async fn test_header_only_file_still_commits() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "agency.txt", "agency_id,agency_name\n");

    let outcome = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "agency.txt", "agency")
        .await
        .unwrap();

    assert!(outcome.is_loaded());
    assert_eq!(outcome.rows_inserted(), 0);
    assert_eq!(
        fx.conn.executed(),
        vec!["PRAGMA defer_foreign_keys = ON", "BEGIN", "COMMIT"]
    );
}

#[tokio::test]
async fn test_constraint_violation_leaves_no_rows() {
    let fx = Fixture::new().await;
    fx.write_feed_file(
        "F",
        "agency.txt",
        indoc! {"
            agency_id,agency_name
            A1,Metro
            A2,Bus
            A1,Duplicate
        "},
    );

    let err = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "agency.txt", "agency")
        .await
        .expect_err("duplicate key must fail the load");

    match err {
        FeedloadError::Statement(message) => {
            assert!(message.contains("UNIQUE constraint failed"), "{message}")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.count("agency").await, 0);
    assert!(!fx.in_transaction());
    assert_eq!(fx.conn.executed().last().unwrap(), "ROLLBACK");
}

#[tokio::test]
async fn test_child_rows_may_precede_their_parent() {
    let fx = Fixture::new().await;
    fx.write_feed_file(
        "F",
        "stops.txt",
        indoc! {"
            stop_id,stop_name,parent_station
            S2,Platform 1,S1
            S3,Platform 2,S1
            S1,Central,
        "},
    );

    let outcome = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "stops.txt", "stops")
        .await
        .expect("deferred foreign keys allow any row order");

    assert_eq!(outcome.rows_inserted(), 3);
    assert_eq!(
        fx.rows("SELECT stop_id, parent_station FROM stops ORDER BY stop_id").await,
        vec![
            vec![s("S1"), Value::Null],
            vec![s("S2"), s("S1")],
            vec![s("S3"), s("S1")],
        ]
    );
}

#[tokio::test]
async fn test_dangling_reference_fails_at_commit() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "routes.txt", "route_id,agency_id\nR1,nowhere\n");

    let err = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "routes.txt", "routes")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("FOREIGN KEY constraint failed"), "{err}");
    assert_eq!(fx.count("routes").await, 0);
    assert!(!fx.in_transaction());
}

#[tokio::test]
async fn test_leave_open_policy_keeps_transaction() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "agency.txt", "agency_id\nA1\nA1\n");
    let loader = BulkLoader::new(&LoaderConfig {
        failure_policy: FailurePolicy::LeaveOpen,
        ..LoaderConfig::default()
    })
    .unwrap();

    let err = loader
        .load(&fx.conn, &fx.feeds_root(), "F", "agency.txt", "agency")
        .await
        .unwrap_err();
    assert!(err.is_statement_error());
    assert!(fx.in_transaction(), "transaction is left for the caller");
    assert!(!fx.conn.executed().contains(&"ROLLBACK".to_string()));

    fx.conn
        .execute("ROLLBACK", &feedload_core::Params::None)
        .await
        .unwrap();
    assert_eq!(fx.count("agency").await, 0);
}

#[tokio::test]
async fn test_malformed_file_is_parse_error_and_rolls_back() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "T.txt", "a,b\n1,2\n3\n");

    let err = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .unwrap_err();

    match err {
        FeedloadError::Parse { path, line, .. } => {
            assert_eq!(path, fx.feeds_root().join("F").join("T.txt"));
            assert_eq!(line, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.count("T").await, 0);
    assert!(!fx.in_transaction());
}

#[tokio::test]
async fn test_directory_in_place_of_file_is_rejected() {
    let fx = Fixture::new().await;
    std::fs::create_dir_all(fx.feeds_root().join("F").join("agency.txt")).unwrap();

    let err = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "agency.txt", "agency")
        .await
        .unwrap_err();

    assert!(matches!(err, FeedloadError::Probe { .. }), "{err}");
    assert!(fx.conn.executed().is_empty());
}

#[tokio::test]
async fn test_loading_twice_duplicates_rows_until_feed_is_cleared() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "T.txt", "a,b\n1,\n2,x\n");
    fx.write_feed_file("G", "T.txt", "a,b\n9,y\n");
    let loader = BulkLoader::default();

    for feed in ["F", "F", "G"] {
        loader
            .load(&fx.conn, &fx.feeds_root(), feed, "T.txt", "T")
            .await
            .unwrap();
    }
    assert_eq!(fx.count("T").await, 5);

    let removed = loader.clear_feed(&fx.conn, "F", "T").await.unwrap();
    assert_eq!(removed, 4);
    assert_eq!(
        fx.rows("SELECT feed, a, b FROM T").await,
        vec![vec![s("G"), Value::Int64(9), s("y")]]
    );

    loader
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .unwrap();
    assert_eq!(fx.count("T").await, 3);
}

#[tokio::test]
async fn test_unusual_headers_are_quoted() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "odd.txt", "stop name,\"x\"\"y\"\nCentral,1.5\n");

    BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "odd.txt", "odd")
        .await
        .unwrap();

    assert_eq!(
        fx.rows(r#"SELECT "stop name", "x""y" FROM odd"#).await,
        vec![vec![s("Central"), s("1.5")]]
    );
}

#[tokio::test]
async fn test_strict_policy_rejects_table_name_before_touching_store() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "odd.txt", "a\n1\n");
    let loader = BulkLoader::new(&LoaderConfig {
        identifier_policy: IdentifierPolicy::Strict,
        ..LoaderConfig::default()
    })
    .unwrap();

    let err = loader
        .load(&fx.conn, &fx.feeds_root(), "F", "odd.txt", "odd table")
        .await
        .unwrap_err();
    assert!(matches!(err, FeedloadError::Identifier { .. }));
    assert!(fx.conn.executed().is_empty());
}

#[tokio::test]
async fn test_mixed_type_columns_are_reported() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "T.txt", "a,b\n1,x\nfirst,y\n");

    let outcome = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .unwrap();

    assert_eq!(outcome.summary().unwrap().mixed_type_columns, vec!["a"]);
    assert_eq!(
        fx.rows("SELECT a FROM T ORDER BY rowid").await.len(),
        2
    );
}

#[tokio::test]
async fn test_closed_connection_fails_without_rollback() {
    let fx = Fixture::new().await;
    fx.write_feed_file("F", "T.txt", "a,b\n1,2\n");
    fx.conn.close().await.unwrap();

    let err = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .unwrap_err();

    assert!(matches!(err, FeedloadError::Closed));
    assert_eq!(fx.conn.executed(), vec!["PRAGMA defer_foreign_keys = ON"]);
}

#[tokio::test]
async fn test_small_in_flight_window_loads_every_row() {
    let fx = Fixture::new().await;
    let mut contents = String::from("a,b\n");
    for i in 0..500 {
        contents.push_str(&format!("{i},row {i}\n"));
    }
    fx.write_feed_file("F", "T.txt", &contents);
    let loader = BulkLoader::new(&LoaderConfig {
        max_in_flight: 3,
        ..LoaderConfig::default()
    })
    .unwrap();

    let outcome = loader
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .unwrap();

    assert_eq!(outcome.rows_inserted(), 500);
    assert_eq!(fx.count("T").await, 500);
}

#[tokio::test]
async fn test_adjacent_long_numeric_ids_stay_distinct() {
    let fx = Fixture::new().await;
    fx.write_feed_file(
        "F",
        "agency.txt",
        "agency_id,agency_name\n12345678901234567,North\n12345678901234568,South\n",
    );
    fx.write_feed_file("F", "T.txt", "a,b\n12345678901234567,x\n12345678901234568,y\n");
    let loader = BulkLoader::default();

    let outcome = loader
        .load(&fx.conn, &fx.feeds_root(), "F", "agency.txt", "agency")
        .await
        .expect("ids differ in the last digit and must not collide");
    assert_eq!(outcome.rows_inserted(), 2);
    assert_eq!(
        fx.rows("SELECT agency_id FROM agency ORDER BY agency_name").await,
        vec![vec![s("12345678901234567")], vec![s("12345678901234568")]]
    );

    loader
        .load(&fx.conn, &fx.feeds_root(), "F", "T.txt", "T")
        .await
        .unwrap();
    assert_eq!(
        fx.rows("SELECT a FROM T ORDER BY b").await,
        vec![
            vec![Value::Int64(12345678901234567)],
            vec![Value::Int64(12345678901234568)],
        ]
    );
}

#[tokio::test]
async fn test_failed_insert_stops_reading_further_rows() {
    let fx = Fixture::new().await;
    let mut contents = String::from("agency_id,agency_name\nA1,Metro\nA1,Duplicate\n");
    for i in 0..200 {
        contents.push_str(&format!("B{i},Bus {i}\n"));
    }
    fx.write_feed_file("F", "agency.txt", &contents);

    let err = BulkLoader::default()
        .load(&fx.conn, &fx.feeds_root(), "F", "agency.txt", "agency")
        .await
        .unwrap_err();

    assert!(err.is_statement_error());
    let inserts = fx
        .conn
        .executed()
        .iter()
        .filter(|sql| sql.starts_with("INSERT"))
        .count();
    assert_eq!(inserts, 2, "no insert is submitted after the duplicate fails");
    assert_eq!(fx.conn.executed().last().unwrap(), "ROLLBACK");
    assert_eq!(fx.count("agency").await, 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_up_front() {
    let err = BulkLoader::new(&LoaderConfig {
        delimiter: 'é',
        ..LoaderConfig::default()
    })
    .unwrap_err();

    match err {
        FeedloadError::Configuration(message) => {
            assert!(message.contains("delimiter"), "{message}")
        }
        other => panic!("unexpected error: {other}"),
    }
}
