use crate::backend::{DatabaseBackend, QueryResult, QueryRow};
use crate::error::{OrmError, Result};
use crate::schema::Dialect;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Row, ValueRef};
use std::str::FromStr;

/// SQLite backend on a single connection, so BEGIN/COMMIT apply to every
/// statement run in between.
pub struct SqliteBackend {
    conn: SqliteConnection,
    in_transaction: bool,
    last_insert_id: Option<i64>,
}

impl SqliteBackend {
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let conn = options.connect().await?;

        Ok(Self {
            conn,
            in_transaction: false,
            last_insert_id: None,
        })
    }

    /// Create an in-memory SQLite database
    pub async fn memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Create a file-based SQLite database
    pub async fn file(path: &str) -> Result<Self> {
        Self::new(&format!("sqlite://{}", path)).await
    }

    /// Convert SQLite row to QueryRow
    fn convert_row(row: &SqliteRow) -> QueryRow {
        let mut query_row = QueryRow::new();

        for column in row.columns() {
            let ordinal = column.ordinal();
            let name = column.name().to_string();

            let is_null = row
                .try_get_raw(ordinal)
                .map(|raw| raw.is_null())
                .unwrap_or(true);

            let value = if is_null {
                Value::Null
            } else if let Ok(value) = row.try_get::<i64, _>(ordinal) {
                Value::from(value)
            } else if let Ok(value) = row.try_get::<f64, _>(ordinal) {
                Value::from(value)
            } else if let Ok(value) = row.try_get::<String, _>(ordinal) {
                Value::String(value)
            } else if let Ok(value) = row.try_get::<Vec<u8>, _>(ordinal) {
                // Binary data comes back base64 encoded
                Value::String(BASE64.encode(value))
            } else {
                Value::Null
            };

            query_row.insert(name, value);
        }

        query_row
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            Value::Array(_) | Value::Object(_) => query.bind(param.to_string()),
        };
    }
    query
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
    async fn connect(url: &str) -> Result<Self> {
        Self::new(url).await
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.execute_with(sql, &[]).await
    }

    async fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await?;

        if result.last_insert_rowid() != 0 {
            self.last_insert_id = Some(result.last_insert_rowid());
        }

        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        self.query_with(sql, &[]).await
    }

    async fn query_with(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await?;

        Ok(rows.iter().map(Self::convert_row).collect())
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(OrmError::Transaction(
                "Already in transaction".to_string(),
            ));
        }

        self.execute("BEGIN TRANSACTION").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(OrmError::Transaction("Not in transaction".to_string()));
        }

        if let Err(err) = self.execute("COMMIT").await {
            // A failed COMMIT (deferred constraint, busy) leaves the transaction open
            self.in_transaction = false;
            if let Err(rollback_err) = self.execute("ROLLBACK").await {
                tracing::debug!(error = %rollback_err, "rollback after failed commit");
            }
            return Err(err);
        }

        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(OrmError::Transaction("Not in transaction".to_string()));
        }

        self.in_transaction = false;
        self.execute("ROLLBACK").await?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut self.conn)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(OrmError::from))
            .collect()
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_memory() {
        let backend = SqliteBackend::memory().await;
        assert!(backend.is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_create_table() {
        let mut backend = SqliteBackend::memory().await.unwrap();

        backend
            .execute("CREATE TABLE test_table (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .await
            .unwrap();

        let tables = backend.list_tables().await.unwrap();
        assert_eq!(tables, vec!["test_table".to_string()]);
    }

    #[tokio::test]
    async fn test_sqlite_bound_insert_query() {
        let mut backend = SqliteBackend::memory().await.unwrap();

        backend
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
            .await
            .unwrap();

        let affected = backend
            .execute_with(
                "INSERT INTO users (id, name, age) VALUES (?, ?, ?)",
                &[json!(1), json!("O'Brien"), json!(30)],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(backend.last_insert_id(), Some(1));

        let results = backend
            .query_with("SELECT * FROM users WHERE name = ?", &[json!("O'Brien")])
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get_i64("id"), Some(1));
        assert_eq!(results[0].get_string("name"), Some("O'Brien".to_string()));
        assert_eq!(results[0].get_i64("age"), Some(30));
    }

    #[tokio::test]
    async fn test_sqlite_transaction_rollback() {
        let mut backend = SqliteBackend::memory().await.unwrap();

        backend
            .execute("CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER)")
            .await
            .unwrap();

        backend.begin_transaction().await.unwrap();
        assert!(backend.in_transaction());
        assert!(backend.begin_transaction().await.is_err());

        backend
            .execute("INSERT INTO accounts (id, balance) VALUES (1, 100)")
            .await
            .unwrap();
        backend.rollback().await.unwrap();
        assert!(!backend.in_transaction());

        let results = backend.query("SELECT COUNT(*) AS n FROM accounts").await.unwrap();
        assert_eq!(results[0].get_i64("n"), Some(0));
        assert!(backend.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_sqlite_blob_and_null() {
        let mut backend = SqliteBackend::memory().await.unwrap();

        backend
            .execute("CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB, note TEXT)")
            .await
            .unwrap();
        backend
            .execute("INSERT INTO files (id, data, note) VALUES (1, X'48656c6c6f', NULL)")
            .await
            .unwrap();

        let results = backend.query("SELECT data, note FROM files WHERE id = 1").await.unwrap();

        assert_eq!(results[0].get_string("data"), Some("SGVsbG8=".to_string()));
        assert_eq!(results[0].columns["note"], Value::Null);
    }

    #[tokio::test]
    async fn test_sqlite_truncate_and_dump() {
        let mut backend = SqliteBackend::memory().await.unwrap();

        backend
            .execute("CREATE TABLE items (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        for id in 1..=5 {
            backend
                .execute_with("INSERT INTO items (id) VALUES (?)", &[json!(id)])
                .await
                .unwrap();
        }

        let page = backend.dump_table("items", 1, Some(3)).await.unwrap();
        let ids: Vec<i64> = page.iter().filter_map(|r| r.get_i64("id")).collect();
        assert_eq!(ids, vec![2, 3]);

        assert_eq!(backend.truncate_table("items").await.unwrap(), 5);
        assert!(backend.dump_table("items", 0, None).await.unwrap().is_empty());
    }
}
