use crate::error::{OrmError, Result};
use serde_json::Value;

/// A SQL statement with `?` placeholders and its parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Statement without parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Render the statement with each placeholder replaced by its quoted parameter.
    ///
    /// Only meant for printing; placeholders inside quoted literals are left alone.
    pub fn interpolate<F>(&self, quote: F) -> String
    where
        F: Fn(&Value) -> String,
    {
        let mut out = String::with_capacity(self.sql.len());
        let mut params = self.params.iter();
        let mut in_literal = false;

        for ch in self.sql.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(ch);
                }
                '?' if !in_literal => match params.next() {
                    Some(value) => out.push_str(&quote(value)),
                    None => out.push(ch),
                },
                _ => out.push(ch),
            }
        }

        out
    }
}

/// WHERE condition
#[derive(Debug, Clone)]
pub enum Condition {
    /// `column = ?`, or `column IS NULL` for a null value
    Eq { column: String, value: Value },
    /// Conjunction, rendered in order
    And(Vec<Condition>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Condition::Eq {
            column: column.into(),
            value,
        }
    }

    /// Conjunction of `column = value` pairs, in order
    pub fn all_eq<I, K>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut conditions: Vec<Condition> = pairs
            .into_iter()
            .map(|(column, value)| Condition::eq(column, value))
            .collect();

        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::And(conditions)),
        }
    }

    /// Append this condition to `sql`, pushing bound values in placeholder order
    pub fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Condition::Eq { column, value: Value::Null } => {
                sql.push_str(&format!("{} IS NULL", column));
            }
            Condition::Eq { column, value } => {
                sql.push_str(&format!("{} = ?", column));
                params.push(value.clone());
            }
            Condition::And(conditions) => {
                if conditions.is_empty() {
                    sql.push_str("1 = 1");
                    return;
                }

                sql.push('(');
                for (i, condition) in conditions.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    condition.render(sql, params);
                }
                sql.push(')');
            }
        }
    }
}

/// SELECT query builder
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    columns: String,
    where_clause: Option<Condition>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl SelectBuilder {
    /// Create a new SELECT query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            where_clause: None,
            limit: None,
            offset: None,
        }
    }

    /// Select `COUNT(*) AS alias` instead of the rows
    pub fn count(mut self, alias: &str) -> Self {
        self.columns = format!("COUNT(*) AS {}", alias);
        self
    }

    /// Replace the WHERE condition
    pub fn where_clause(mut self, condition: Condition) -> Self {
        self.where_clause = Some(condition);
        self
    }

    /// Set LIMIT
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build the statement
    pub fn build(self) -> Result<Statement> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", self.columns, self.table);

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            where_clause.render(&mut sql, &mut params);
        }

        match (self.limit, self.offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            // OFFSET alone is not valid SQL on every backend
            (None, Some(_)) => sql.push_str(&format!(" LIMIT {}", i64::MAX)),
            (None, None) => {}
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok(Statement::with_params(sql, params))
    }
}

/// INSERT query builder; columns are always named explicitly
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    values: Vec<(String, Value)>,
}

impl InsertBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    /// Bind a column value
    pub fn value(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.push((column.into(), value));
        self
    }

    pub fn build(self) -> Result<Statement> {
        if self.values.is_empty() {
            return Err(OrmError::Parameter("INSERT must have at least one value".to_string()));
        }

        let (columns, params): (Vec<String>, Vec<Value>) = self.values.into_iter().unzip();
        let marks = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            marks
        );

        Ok(Statement::with_params(sql, params))
    }
}

/// UPDATE query builder
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set_values: Vec<(String, Value)>,
    where_clause: Option<Condition>,
}

impl UpdateBuilder {
    /// Create a new UPDATE query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set_values: Vec::new(),
            where_clause: None,
        }
    }

    /// Set multiple column values
    pub fn set_many<I, K>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (col, val) in values {
            self.set_values.push((col.into(), val));
        }
        self
    }

    /// Replace the WHERE condition
    pub fn where_clause(mut self, condition: Condition) -> Self {
        self.where_clause = Some(condition);
        self
    }

    /// Build the statement
    pub fn build(self) -> Result<Statement> {
        if self.set_values.is_empty() {
            return Err(OrmError::Parameter(
                "UPDATE must have at least one SET value".to_string(),
            ));
        }

        let mut params = Vec::with_capacity(self.set_values.len());
        let set_clauses: Vec<String> = self
            .set_values
            .into_iter()
            .map(|(col, val)| {
                params.push(val);
                format!("{} = ?", col)
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, set_clauses.join(", "));

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            where_clause.render(&mut sql, &mut params);
        }

        Ok(Statement::with_params(sql, params))
    }
}

/// DELETE query builder
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    where_clause: Option<Condition>,
}

impl DeleteBuilder {
    /// Create a new DELETE query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Replace the WHERE condition
    pub fn where_clause(mut self, condition: Condition) -> Self {
        self.where_clause = Some(condition);
        self
    }

    /// Build the statement
    pub fn build(self) -> Result<Statement> {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.table);

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            where_clause.render(&mut sql, &mut params);
        }

        Ok(Statement::with_params(sql, params))
    }
}

/// Format a JSON value as an ANSI SQL literal
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => {
            format!("'{}'", value.to_string().replace('\'', "''"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_basic() {
        let stmt = SelectBuilder::new("users").build().unwrap();

        assert_eq!(stmt.sql, "SELECT * FROM users");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_count_where() {
        let stmt = SelectBuilder::new("users")
            .count("total")
            .where_clause(Condition::eq("id", json!(1)))
            .build()
            .unwrap();

        assert_eq!(stmt.sql, "SELECT COUNT(*) AS total FROM users WHERE id = ?");
        assert_eq!(stmt.params, vec![json!(1)]);
    }

    #[test]
    fn test_select_page() {
        let stmt = SelectBuilder::new("users")
            .limit(10)
            .offset(20)
            .build()
            .unwrap();

        assert_eq!(stmt.sql, "SELECT * FROM users LIMIT 10 OFFSET 20");
    }

    #[test]
    fn test_select_offset_without_limit() {
        let stmt = SelectBuilder::new("users").offset(5).build().unwrap();

        assert_eq!(
            stmt.sql,
            format!("SELECT * FROM users LIMIT {} OFFSET 5", i64::MAX)
        );
    }

    #[test]
    fn test_all_eq() {
        assert!(Condition::all_eq(Vec::<(String, Value)>::new()).is_none());
        assert!(matches!(
            Condition::all_eq(vec![("id", json!(1))]),
            Some(Condition::Eq { .. })
        ));

        let mut sql = String::new();
        let mut params = Vec::new();
        Condition::And(Vec::new()).render(&mut sql, &mut params);
        assert_eq!(sql, "1 = 1");
    }

    #[test]
    fn test_insert_names_columns() {
        let stmt = InsertBuilder::new("users")
            .value("id", json!(1))
            .value("name", json!("Alice"))
            .build()
            .unwrap();

        assert_eq!(stmt.sql, "INSERT INTO users (id, name) VALUES (?, ?)");
        assert_eq!(stmt.params, vec![json!(1), json!("Alice")]);
    }

    #[test]
    fn test_insert_requires_values() {
        assert!(InsertBuilder::new("users").build().is_err());
    }

    #[test]
    fn test_update_multiple() {
        let stmt = UpdateBuilder::new("users")
            .set_many(vec![("name", json!("Alice")), ("age", json!(30))])
            .where_clause(Condition::eq("id", json!(1)))
            .build()
            .unwrap();

        assert_eq!(stmt.sql, "UPDATE users SET name = ?, age = ? WHERE id = ?");
        assert_eq!(stmt.params, vec![json!("Alice"), json!(30), json!(1)]);
    }

    #[test]
    fn test_update_requires_set() {
        let result = UpdateBuilder::new("users")
            .where_clause(Condition::eq("id", json!(1)))
            .build();
        assert!(matches!(result, Err(OrmError::Parameter(_))));
    }

    #[test]
    fn test_delete_composite() {
        let condition = Condition::all_eq(vec![("a", json!(1)), ("b", json!(2))]).unwrap();
        let stmt = DeleteBuilder::new("pairs")
            .where_clause(condition)
            .build()
            .unwrap();

        assert_eq!(stmt.sql, "DELETE FROM pairs WHERE (a = ? AND b = ?)");
        assert_eq!(stmt.params, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_null_comparison_becomes_is_null() {
        let stmt = DeleteBuilder::new("users")
            .where_clause(Condition::eq("deleted_at", Value::Null))
            .build()
            .unwrap();

        assert_eq!(stmt.sql, "DELETE FROM users WHERE deleted_at IS NULL");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_interpolate() {
        let stmt = Statement::with_params(
            "INSERT INTO t (a, b, c) VALUES (?, ?, '?')",
            vec![json!("O'Reilly"), json!(3)],
        );

        assert_eq!(
            stmt.interpolate(format_value),
            "INSERT INTO t (a, b, c) VALUES ('O''Reilly', 3, '?')"
        );
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&json!(true)), "TRUE");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!("test's")), "'test''s'");
    }
}
