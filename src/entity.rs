use crate::error::{OrmError, Result};
use crate::indent::{Aligner, Pad};
use crate::schema::{ColumnDef, PrimaryKey, TableSchema};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Identity of an entity: the value of its primary key column(s)
#[derive(Debug, Clone, PartialEq)]
pub enum EntityId {
    Single(Value),
    /// Values in primary key declaration order
    Composite(Vec<Value>),
}

impl EntityId {
    /// Index key: canonical JSON for a single value, SHA-256 hex digest for a composite id.
    ///
    /// Integral floats key like integers (`1.0` and `1` match). Strings keep
    /// their own type, so `"1"` and `1` are different ids.
    pub fn key(&self) -> String {
        match self {
            EntityId::Single(value) => canonical_id(value).to_string(),
            EntityId::Composite(values) => {
                let encoded = Value::Array(values.iter().map(canonical_id).collect()).to_string();
                format!("{:x}", Sha256::digest(encoded.as_bytes()))
            }
        }
    }
}

fn canonical_id(value: &Value) -> Value {
    match value.as_f64() {
        Some(f) if value.is_f64()
            && f.fract() == 0.0
            && f >= i64::MIN as f64
            && f < i64::MAX as f64 =>
        {
            Value::from(f as i64)
        }
        _ => value.clone(),
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn plain(value: &Value) -> String {
            match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        }

        match self {
            EntityId::Single(value) => f.write_str(&plain(value)),
            EntityId::Composite(values) => {
                let parts: Vec<String> = values.iter().map(plain).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

impl From<Value> for EntityId {
    fn from(value: Value) -> Self {
        EntityId::Single(value)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Single(Value::from(value))
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Single(Value::from(value))
    }
}

/// New id for [`Entity::set_id_value`]
#[derive(Debug, Clone, PartialEq)]
pub enum IdValue {
    Scalar(Value),
    Composite(IndexMap<String, Value>),
}

impl From<Value> for IdValue {
    fn from(value: Value) -> Self {
        IdValue::Scalar(value)
    }
}

impl From<i64> for IdValue {
    fn from(value: i64) -> Self {
        IdValue::Scalar(Value::from(value))
    }
}

impl From<IndexMap<String, Value>> for IdValue {
    fn from(values: IndexMap<String, Value>) -> Self {
        IdValue::Composite(values)
    }
}

/// A record bound to one table schema
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    schema: Arc<TableSchema>,
    // Same keys, same order as schema.columns
    values: IndexMap<String, Value>,
}

impl Entity {
    /// Every declared column starts out `NULL`
    pub fn new(schema: Arc<TableSchema>) -> Self {
        let values = schema
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::Null))
            .collect();

        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn entity_name(&self) -> &str {
        &self.schema.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.schema.name
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.schema.primary_key
    }

    pub fn column_attributes(&self) -> &[ColumnDef] {
        &self.schema.columns
    }

    /// Column values in declared order
    pub fn columns_value(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn get(&self, column: &str) -> Result<&Value> {
        self.values
            .get(column)
            .ok_or_else(|| OrmError::undefined(self.entity_name(), column))
    }

    /// Deserialize a column value; `None` when it is `NULL`
    pub fn get_as<T>(&self, column: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(column)? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    pub fn get_i64(&self, column: &str) -> Result<Option<i64>> {
        Ok(self.get(column)?.as_i64())
    }

    pub fn get_str(&self, column: &str) -> Result<Option<&str>> {
        Ok(self.get(column)?.as_str())
    }

    /// Overwrite a column value. The value is not checked against the column type.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        let entity_name = &self.schema.entity_name;
        let slot = self
            .values
            .get_mut(column)
            .ok_or_else(|| OrmError::undefined(entity_name, column))?;
        *slot = value.into();
        Ok(())
    }

    /// Builder-style [`Entity::set`]
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(column, value)?;
        Ok(self)
    }

    /// Primary key column names
    pub fn id_key(&self) -> Vec<&str> {
        self.schema.primary_key.columns()
    }

    pub fn id_value(&self) -> EntityId {
        match &self.schema.primary_key {
            PrimaryKey::Single(key) => {
                EntityId::Single(self.values.get(key).cloned().unwrap_or(Value::Null))
            }
            PrimaryKey::Composite(keys) => EntityId::Composite(
                keys.iter()
                    .map(|k| self.values.get(k).cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }

    /// Primary key name -> value, in key order
    pub fn id_key_value(&self) -> IndexMap<String, Value> {
        self.id_key()
            .into_iter()
            .map(|k| {
                let value = self.values.get(k).cloned().unwrap_or(Value::Null);
                (k.to_string(), value)
            })
            .collect()
    }

    pub fn set_id_value(&mut self, id: impl Into<IdValue>) -> Result<()> {
        let keys: Vec<String> = self.id_key().into_iter().map(String::from).collect();

        match (id.into(), keys.len()) {
            (IdValue::Scalar(value), 1) => self.set(&keys[0], value),
            (IdValue::Scalar(_), _) => Err(OrmError::Parameter(format!(
                "The id is on several columns, pass a map with keys ({})",
                keys.join(", ")
            ))),
            (IdValue::Composite(values), _) => {
                if let Some(bad) = values.keys().find(|k| !keys.contains(k)) {
                    return Err(OrmError::Parameter(format!(
                        "Id key {} must be one of: {}",
                        bad,
                        keys.join(", ")
                    )));
                }
                for (key, value) in values {
                    self.set(&key, value)?;
                }
                Ok(())
            }
        }
    }

    /// Non-key columns and their values, in declared order
    pub fn columns_key_value_no_primary(&self) -> IndexMap<String, Value> {
        let primary_key = &self.schema.primary_key;

        self.values
            .iter()
            .filter(|(name, _)| !primary_key.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.values.clone()
    }

    /// Aligned dump of every column: name, type(size) and value
    pub fn to_table(&self, aligner: &mut Aligner) -> Result<String> {
        let columns = &self.schema.columns;
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let types: Vec<&str> = columns.iter().map(|c| c.sql_type.to_sql()).collect();
        let sizes: Vec<String> = columns.iter().map(|c| c.size_label()).collect();

        aligner.set_max_size("columnName", &names, 0);
        aligner.set_max_size("columnType", &types, 0);
        aligner.set_max_size("columnSize", &sizes, 0);

        let mut out = format!("[{}]\n", self.entity_name());
        for column in columns {
            let value = self.values.get(&column.name).unwrap_or(&Value::Null);
            out.push_str(&format!(
                "  {}  {}  = {}\n",
                aligner.smart_align(&column.name, &["columnName"], 0, Pad::Right)?,
                aligner.smart_align(
                    &column.type_label(),
                    &["columnType", "columnSize"],
                    2,
                    Pad::Right
                )?,
                display_value(value)
            ));
        }

        Ok(out)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.to_table(&mut Aligner::new()).map_err(|_| fmt::Error)?;
        f.write_str(&table)
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}
