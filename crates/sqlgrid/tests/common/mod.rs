//! Test utilities for sqlgrid integration tests.
//!
//! SQLite databases live in temporary files so each test gets its own.
//! PostgreSQL tests create a uniquely named database on the server behind
//! `TEST_DATABASE_URL` and drop it in `cleanup`.

#![allow(dead_code)]

use sqlgrid::driver::{Driver, SqliteDriver};
use tempfile::TempDir;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

/// Seed script shared by the SQLite tests.
pub const PEOPLE_SCHEMA: &str = "
CREATE TABLE people (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    score REAL
);
INSERT INTO people (id, name, score) VALUES (1, 'Ada', 9.5);
INSERT INTO people (id, name, score) VALUES (2, 'Linus', NULL);
INSERT INTO people (id, name, score) VALUES (3, 'Grace', 7.0);
";

/// A SQLite file in a temporary directory, removed on drop.
pub struct TestSqlite {
    pub driver: SqliteDriver,
    pub url: String,
    _dir: TempDir,
}

impl TestSqlite {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let driver = SqliteDriver::open(&path).await.unwrap();
        Self {
            driver,
            url: format!("sqlite:{}", path.display()),
            _dir: dir,
        }
    }

    /// Database seeded with the `people` table.
    pub async fn with_people() -> Self {
        let db = Self::new().await;
        for statement in PEOPLE_SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            db.driver.query(statement).await.unwrap();
        }
        db
    }
}

/// A PostgreSQL database created for one test.
pub struct TestDatabase {
    pub url: String,
    pub db_name: String,
    admin_client: Client,
}

impl TestDatabase {
    /// Creates a new database with a unique name using an admin URL that
    /// has CREATEDB privileges.
    pub async fn new(admin_url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (admin_client, connection) = tokio_postgres::connect(admin_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("Admin connection error: {}", e);
            }
        });

        let db_name = format!("sqlgrid_test_{}", Uuid::new_v4().simple());
        admin_client
            .batch_execute(&format!("CREATE DATABASE {}", db_name))
            .await?;

        let url = build_test_url(admin_url, &db_name)?;
        Ok(Self {
            url,
            db_name,
            admin_client,
        })
    }

    /// Terminates remaining sessions and drops the database.
    pub async fn cleanup(self) {
        let _ = self
            .admin_client
            .batch_execute(&format!(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
                self.db_name
            ))
            .await;
        let _ = self
            .admin_client
            .batch_execute(&format!("DROP DATABASE IF EXISTS {}", self.db_name))
            .await;
    }
}

/// Swap the database name at the end of a connection URL.
fn build_test_url(
    admin_url: &str,
    db_name: &str,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let without_query = admin_url.split('?').next().unwrap_or(admin_url);
    match without_query.rfind('/') {
        Some(last_slash) if last_slash > "postgres://".len() => {
            Ok(format!("{}{}", &without_query[..last_slash + 1], db_name))
        }
        _ => Err("Invalid database URL format".into()),
    }
}

/// `TEST_DATABASE_URL`, loaded from `.env` when present.
pub fn get_test_database_url() -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var("TEST_DATABASE_URL").ok()
}
