use crate::builder::{format_value, SelectBuilder, Statement};
use crate::error::{OrmError, Result};
use crate::schema::{validate_identifier, Dialect};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Row from a query result, columns in result order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRow {
    pub columns: IndexMap<String, Value>,
}

impl QueryRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.columns.insert(key, value);
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.columns
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.columns
            .get(key)
            .and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.columns.get(key).and_then(|v| v.as_i64())
    }

    /// First column of the row, whatever its name
    pub fn first(&self) -> Option<&Value> {
        self.columns.values().next()
    }
}

/// Result of a query
pub type QueryResult = Vec<QueryRow>;

/// Database backend trait
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Connect to the database
    async fn connect(url: &str) -> Result<Self>
    where
        Self: Sized;

    /// Execute a SQL statement (no results)
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Execute a statement with positional `?` parameters, returning affected rows
    async fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Query and return results
    async fn query(&mut self, sql: &str) -> Result<QueryResult>;

    /// Query with positional `?` parameters
    async fn query_with(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Begin a transaction
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the current transaction
    async fn commit(&mut self) -> Result<()>;

    /// Rollback the current transaction
    async fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Names of the user tables
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Remove every row of a table
    async fn truncate_table(&mut self, table: &str) -> Result<u64> {
        validate_identifier(table)?;
        self.execute(&format!("DELETE FROM {}", table)).await
    }

    /// Rows `[start, end)` of a table; `end = None` reads to the last row
    async fn dump_table(
        &mut self,
        table: &str,
        start: usize,
        end: Option<usize>,
    ) -> Result<QueryResult> {
        validate_identifier(table)?;

        let mut select = SelectBuilder::new(table).offset(start);
        if let Some(end) = end {
            if end < start {
                return Err(OrmError::Parameter(format!(
                    "End {} is before start {}",
                    end, start
                )));
            }
            select = select.limit(end - start);
        }

        let stmt = select.build()?;
        self.query_with(&stmt.sql, &stmt.params).await
    }

    /// Quote a value as a SQL literal
    fn quote(&self, value: &Value) -> String {
        format_value(value)
    }

    /// Id generated by the last INSERT, if any
    fn last_insert_id(&self) -> Option<i64> {
        None
    }

    fn dialect(&self) -> Dialect;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(self) -> Result<()>;
}

/// Transaction guard. Dropping it before `commit`/`rollback` only logs:
/// rolling back needs an await.
pub struct Transaction<'a, B: DatabaseBackend> {
    backend: &'a mut B,
    finished: bool,
}

impl<'a, B: DatabaseBackend> Transaction<'a, B> {
    pub async fn begin(backend: &'a mut B) -> Result<Self> {
        backend.begin_transaction().await?;
        Ok(Self {
            backend,
            finished: false,
        })
    }

    /// The backend, for running statements inside the transaction
    pub fn backend(&mut self) -> &mut B {
        &mut *self.backend
    }

    /// Commit, rolling back instead when the commit fails and leaves the
    /// transaction open
    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        let Err(err) = self.backend.commit().await else {
            return Ok(());
        };

        if self.backend.in_transaction() {
            if let Err(rollback_err) = self.backend.rollback().await {
                tracing::error!(error = %rollback_err, "rollback after failed commit");
            }
        }
        Err(err)
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.backend.rollback().await
    }
}

impl<'a, B: DatabaseBackend> Drop for Transaction<'a, B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("transaction dropped without commit or rollback");
        }
    }
}

/// Shared handle to one backend connection.
///
/// Clones share the same connection; statements are serialised by the lock.
pub struct Database<B: DatabaseBackend> {
    backend: Arc<Mutex<B>>,
    print_sql: bool,
}

impl<B: DatabaseBackend> Clone for Database<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            print_sql: self.print_sql,
        }
    }
}

impl<B: DatabaseBackend> Database<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            print_sql: false,
        }
    }

    /// Print every statement with its parameters inlined before running it
    pub fn with_print_sql(mut self, print_sql: bool) -> Self {
        self.print_sql = print_sql;
        self
    }

    pub fn print_sql(&self) -> bool {
        self.print_sql
    }

    /// Exclusive access to the connection until the guard is dropped
    pub async fn lock(&self) -> MutexGuard<'_, B> {
        self.backend.lock().await
    }

    pub async fn execute(&self, stmt: &Statement) -> Result<u64> {
        let mut backend = self.lock().await;
        self.execute_on(&mut *backend, stmt).await
    }

    pub async fn query(&self, stmt: &Statement) -> Result<QueryResult> {
        let mut backend = self.lock().await;
        self.query_on(&mut *backend, stmt).await
    }

    /// Run a statement on an already locked backend
    pub async fn execute_on(&self, backend: &mut B, stmt: &Statement) -> Result<u64> {
        self.trace(backend, stmt);
        backend.execute_with(&stmt.sql, &stmt.params).await
    }

    pub async fn query_on(&self, backend: &mut B, stmt: &Statement) -> Result<QueryResult> {
        self.trace(backend, stmt);
        backend.query_with(&stmt.sql, &stmt.params).await
    }

    fn trace(&self, backend: &B, stmt: &Statement) {
        if self.print_sql {
            tracing::info!(sql = %stmt.interpolate(|v| backend.quote(v)), "statement");
        } else {
            tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), "statement");
        }
    }

    /// Close the connection once no other handle is left
    pub async fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.backend) {
            Ok(mutex) => mutex.into_inner().close().await,
            Err(_) => Err(OrmError::Store(
                "Database is still shared, cannot close".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingBackend {
        statements: Vec<(String, Vec<Value>)>,
        in_transaction: bool,
        fail_commit: bool,
        rollbacks: usize,
    }

    #[async_trait]
    impl DatabaseBackend for RecordingBackend {
        async fn connect(_url: &str) -> Result<Self> {
            Ok(Self::default())
        }

        async fn execute(&mut self, sql: &str) -> Result<u64> {
            self.execute_with(sql, &[]).await
        }

        async fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
            self.statements.push((sql.to_string(), params.to_vec()));
            Ok(1)
        }

        async fn query(&mut self, sql: &str) -> Result<QueryResult> {
            self.query_with(sql, &[]).await
        }

        async fn query_with(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
            self.statements.push((sql.to_string(), params.to_vec()));
            Ok(vec![])
        }

        async fn begin_transaction(&mut self) -> Result<()> {
            self.in_transaction = true;
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            if self.fail_commit {
                return Err(OrmError::Store("deferred constraint failed".to_string()));
            }
            self.in_transaction = false;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            self.rollbacks += 1;
            self.in_transaction = false;
            Ok(())
        }

        fn in_transaction(&self) -> bool {
            self.in_transaction
        }

        async fn list_tables(&mut self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn close(self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_query_row_accessors() {
        let mut row = QueryRow::new();
        row.insert("id".to_string(), json!(1));
        row.insert("name".to_string(), json!("Alice"));

        assert_eq!(row.get_i64("id"), Some(1));
        assert_eq!(row.get_string("name"), Some("Alice".to_string()));
        assert_eq!(row.get::<String>("name"), Some("Alice".to_string()));
        assert_eq!(row.first(), Some(&json!(1)));
        assert_eq!(row.get_i64("missing"), None);
    }

    #[tokio::test]
    async fn test_dump_table_pages() {
        let mut backend = RecordingBackend::default();

        backend.dump_table("users", 10, Some(15)).await.unwrap();
        backend.dump_table("users", 0, None).await.unwrap();

        assert_eq!(backend.statements[0].0, "SELECT * FROM users LIMIT 5 OFFSET 10");
        assert_eq!(
            backend.statements[1].0,
            format!("SELECT * FROM users LIMIT {} OFFSET 0", i64::MAX)
        );
        assert!(backend.dump_table("users", 5, Some(2)).await.is_err());
        assert!(backend.dump_table("users x", 0, None).await.is_err());
    }

    #[tokio::test]
    async fn test_truncate_validates_name() {
        let mut backend = RecordingBackend::default();

        backend.truncate_table("users").await.unwrap();
        assert_eq!(backend.statements[0].0, "DELETE FROM users");
        assert!(backend.truncate_table("users; --").await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_guard() {
        let mut backend = RecordingBackend::default();

        let mut tx = Transaction::begin(&mut backend).await.unwrap();
        assert!(tx.backend().in_transaction());
        tx.backend().execute("DELETE FROM users").await.unwrap();
        tx.commit().await.unwrap();

        assert!(!backend.in_transaction());
        assert_eq!(backend.statements.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let mut backend = RecordingBackend {
            fail_commit: true,
            ..Default::default()
        };

        let tx = Transaction::begin(&mut backend).await.unwrap();
        assert!(matches!(tx.commit().await, Err(OrmError::Store(_))));

        assert!(!backend.in_transaction());
        assert_eq!(backend.rollbacks, 1);

        backend.fail_commit = false;
        let tx = Transaction::begin(&mut backend).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(backend.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_database_shares_one_backend() {
        let db = Database::new(RecordingBackend::default()).with_print_sql(true);
        let other = db.clone();

        db.execute(&Statement::with_params("DELETE FROM t WHERE id = ?", vec![json!(1)]))
            .await
            .unwrap();
        other.query(&Statement::new("SELECT 1")).await.unwrap();

        assert_eq!(db.lock().await.statements.len(), 2);
        assert!(db.close().await.is_err());
        assert!(other.close().await.is_ok());
    }
}
