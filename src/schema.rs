use crate::builder::format_value;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Name of the reserved table-level section in a schema declaration
pub const TABLE_SECTION: &str = "table";

/// SQL dialect used to render DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

/// SQL type mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Char,
    Varchar,
    Text,
    Boolean,
    Date,
    DateTime,
    Timestamp,
    Blob,
    Json,
}

impl SqlType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Int => "INT",
            SqlType::BigInt => "BIGINT",
            SqlType::Float => "FLOAT",
            SqlType::Double => "DOUBLE",
            SqlType::Decimal => "DECIMAL",
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::Text => "TEXT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Date => "DATE",
            SqlType::DateTime => "DATETIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Blob => "BLOB",
            SqlType::Json => "JSON",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Int | SqlType::BigInt
        )
    }

    fn accepts_size(&self) -> bool {
        self.is_integer() || matches!(self, SqlType::Decimal | SqlType::Char | SqlType::Varchar)
    }
}

impl FromStr for SqlType {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        let sql_type = match s.trim().to_ascii_uppercase().as_str() {
            "TINYINT" => SqlType::TinyInt,
            "SMALLINT" => SqlType::SmallInt,
            "INT" | "INTEGER" | "MEDIUMINT" => SqlType::Int,
            "BIGINT" => SqlType::BigInt,
            "FLOAT" | "REAL" => SqlType::Float,
            "DOUBLE" | "DOUBLE PRECISION" => SqlType::Double,
            "DECIMAL" | "NUMERIC" => SqlType::Decimal,
            "CHAR" => SqlType::Char,
            "VARCHAR" => SqlType::Varchar,
            "TEXT" | "MEDIUMTEXT" | "LONGTEXT" => SqlType::Text,
            "BOOL" | "BOOLEAN" => SqlType::Boolean,
            "DATE" => SqlType::Date,
            "DATETIME" => SqlType::DateTime,
            "TIMESTAMP" => SqlType::Timestamp,
            "BLOB" | "BINARY" | "VARBINARY" => SqlType::Blob,
            "JSON" => SqlType::Json,
            other => return Err(OrmError::Schema(format!("Unknown column type {}", other))),
        };

        Ok(sql_type)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub size: Option<u32>,
    pub nullable: bool,
    pub default: Option<Value>,
    pub unsigned: bool,
    pub auto_increment: bool,
    pub comment: Option<String>,
    pub storage: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            size: None,
            nullable: true,
            default: None,
            unsigned: false,
            auto_increment: false,
            comment: None,
            storage: None,
        }
    }

    /// `TYPE(size)` as shown in dumps and DDL
    pub fn type_label(&self) -> String {
        match self.size {
            Some(size) if self.sql_type.accepts_size() => format!("{}({})", self.sql_type, size),
            _ => self.sql_type.to_string(),
        }
    }

    /// Size as text, empty when undeclared
    pub fn size_label(&self) -> String {
        self.size.map(|s| s.to_string()).unwrap_or_default()
    }
}

/// Primary key of a table, on one or several columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(name) => vec![name.as_str()],
            PrimaryKey::Composite(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite(_))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }
}

/// Table schema
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub entity_name: String,
    pub name: String,
    pub primary_key: PrimaryKey,
    pub columns: Vec<ColumnDef>,
    pub engine: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TableDecl {
    name: String,
    primary_key: Option<KeyDecl>,
    engine: Option<String>,
    charset: Option<String>,
    collation: Option<String>,
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyDecl {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ColumnDecl {
    #[serde(rename = "type")]
    sql_type: String,
    size: Option<u32>,
    #[serde(default = "default_nullable")]
    is_null: bool,
    default: Option<toml::Value>,
    #[serde(default)]
    unsigned: bool,
    #[serde(default)]
    auto_increment: bool,
    comment: Option<String>,
    storage: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl TableSchema {
    /// Build a schema and check its invariants
    pub fn new(
        entity_name: impl Into<String>,
        name: impl Into<String>,
        primary_key: PrimaryKey,
        columns: Vec<ColumnDef>,
    ) -> Result<Self> {
        let schema = Self {
            entity_name: entity_name.into(),
            name: name.into(),
            primary_key,
            columns,
            engine: None,
            charset: None,
            collation: None,
            comment: None,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Parse a schema declaration. Column order follows the document order.
    pub fn from_toml_str(entity_name: &str, content: &str) -> Result<Self> {
        let document: toml::Table = content.parse()?;

        let mut table: Option<TableDecl> = None;
        let mut columns = Vec::new();

        for (section, value) in document {
            if section == TABLE_SECTION {
                table = Some(value.try_into()?);
                continue;
            }

            let decl: ColumnDecl = value.try_into().map_err(|e| {
                OrmError::Schema(format!("Column {} of {}: {}", section, entity_name, e))
            })?;

            let storage = match decl.storage {
                Some(storage) => {
                    let storage = storage.to_ascii_uppercase();
                    if storage != "DISK" && storage != "MEMORY" {
                        return Err(OrmError::Schema(format!(
                            "Column {} storage must be DISK or MEMORY",
                            section
                        )));
                    }
                    Some(storage)
                }
                None => None,
            };

            columns.push(ColumnDef {
                sql_type: decl.sql_type.parse()?,
                size: decl.size,
                nullable: decl.is_null,
                default: decl.default.map(toml_to_json),
                unsigned: decl.unsigned,
                auto_increment: decl.auto_increment,
                comment: decl.comment,
                storage,
                name: section,
            });
        }

        let table = table.ok_or_else(|| {
            OrmError::Schema(format!("Entity {} has no [{}] section", entity_name, TABLE_SECTION))
        })?;

        let primary_key = match table.primary_key {
            Some(KeyDecl::One(name)) => PrimaryKey::Single(name),
            Some(KeyDecl::Many(mut names)) if names.len() == 1 => {
                PrimaryKey::Single(names.remove(0))
            }
            Some(KeyDecl::Many(names)) => PrimaryKey::Composite(names),
            None => {
                return Err(OrmError::Schema(format!(
                    "Entity {} declares no primaryKey",
                    entity_name
                )))
            }
        };

        let schema = Self {
            entity_name: entity_name.to_string(),
            name: table.name,
            primary_key,
            columns,
            engine: table.engine,
            charset: table.charset,
            collation: table.collation,
            comment: table.comment,
        };
        schema.validate()?;

        Ok(schema)
    }

    /// Read and parse `<path>`
    pub fn from_file(entity_name: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(entity_name, &content)
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;

        if self.columns.is_empty() {
            return Err(OrmError::Schema(format!(
                "Entity {} declares no column",
                self.entity_name
            )));
        }

        for (i, column) in self.columns.iter().enumerate() {
            validate_identifier(&column.name)?;
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(OrmError::Schema(format!("Column {} declared twice", column.name)));
            }
        }

        let keys = self.primary_key.columns();
        if keys.is_empty() {
            return Err(OrmError::Schema("Empty primary key".to_string()));
        }
        for key in keys {
            if self.column(key).is_none() {
                return Err(OrmError::Schema(format!(
                    "Primary key {} is not a column of {}",
                    key, self.name
                )));
            }
        }

        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Generate CREATE TABLE SQL
    pub fn create_table_sql(&self, dialect: Dialect) -> String {
        let keys = self.primary_key.columns();

        // SQLite only auto-increments an inline INTEGER PRIMARY KEY
        let inline_key = match (dialect, &self.primary_key) {
            (Dialect::Sqlite, PrimaryKey::Single(key)) => self
                .column(key)
                .filter(|c| c.auto_increment && c.sql_type.is_integer())
                .map(|c| c.name.clone()),
            _ => None,
        };

        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| match dialect {
                Dialect::MySql => mysql_column(col),
                Dialect::Sqlite => sqlite_column(col, inline_key.as_deref() == Some(col.name.as_str())),
            })
            .collect();

        if inline_key.is_none() {
            defs.push(format!("    PRIMARY KEY ({})", keys.join(", ")));
        }

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.name,
            defs.join(",\n")
        );

        if dialect == Dialect::MySql {
            if let Some(engine) = &self.engine {
                sql.push_str(&format!(" ENGINE = {}", engine));
            }
            if let Some(charset) = &self.charset {
                sql.push_str(&format!(" DEFAULT CHARSET = {}", charset));
            }
            if let Some(collation) = &self.collation {
                sql.push_str(&format!(" COLLATE = {}", collation));
            }
            if let Some(comment) = &self.comment {
                sql.push_str(&format!(" COMMENT = {}", quote_text(comment)));
            }
        }

        sql
    }

    /// Generate DROP TABLE SQL
    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }
}

fn mysql_column(col: &ColumnDef) -> String {
    let mut def = format!("    {} {}", col.name, col.type_label());

    if col.unsigned {
        def.push_str(" UNSIGNED");
    }
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        def.push_str(&format!(" DEFAULT {}", default_literal(default)));
    }
    if col.auto_increment {
        def.push_str(" AUTO_INCREMENT");
    }
    if let Some(comment) = &col.comment {
        def.push_str(&format!(" COMMENT {}", quote_text(comment)));
    }
    if let Some(storage) = &col.storage {
        def.push_str(&format!(" STORAGE {}", storage));
    }

    def
}

fn sqlite_column(col: &ColumnDef, inline_key: bool) -> String {
    if inline_key {
        return format!("    {} INTEGER PRIMARY KEY AUTOINCREMENT", col.name);
    }

    let mut def = format!("    {} {}", col.name, col.type_label());

    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        def.push_str(&format!(" DEFAULT {}", default_literal(default)));
    }

    def
}

fn default_literal(value: &Value) -> String {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("CURRENT_TIMESTAMP") => s.to_ascii_uppercase(),
        other => format_value(other),
    }
}

fn quote_text(text: &str) -> String {
    format_value(&Value::String(text.to_string()))
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Reject anything but `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(OrmError::Schema(format!("Invalid identifier {:?}", name)))
    }
}

/// Loads and caches schema declarations from `<root>/<Entity>.toml`
pub struct SchemaRegistry {
    root: PathBuf,
    schemas: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            schemas: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register a schema built in code
    pub fn register(&mut self, schema: TableSchema) -> Result<Arc<TableSchema>> {
        if self.schemas.contains_key(&schema.entity_name) {
            return Err(OrmError::Schema(format!(
                "Entity {} already registered",
                schema.entity_name
            )));
        }

        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.entity_name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Get a schema, reading its declaration file on first use
    pub fn load(&mut self, entity_name: &str) -> Result<Arc<TableSchema>> {
        if let Some(schema) = self.schemas.get(entity_name) {
            return Ok(Arc::clone(schema));
        }

        validate_identifier(entity_name)?;
        let path = self.root.join(format!("{}.toml", entity_name));
        if !path.is_file() {
            return Err(OrmError::NotFound(format!(
                "No schema declaration for {} at {}",
                entity_name,
                path.display()
            )));
        }

        tracing::debug!(entity = entity_name, path = %path.display(), "loading schema");
        let schema = Arc::new(TableSchema::from_file(entity_name, &path)?);
        self.schemas
            .insert(entity_name.to_string(), Arc::clone(&schema));

        Ok(schema)
    }

    /// Load every `*.toml` declaration under the root, returning the entity names sorted
    pub fn load_all(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        for name in &names {
            self.load(name)?;
        }

        Ok(names)
    }

    pub fn get(&self, entity_name: &str) -> Option<Arc<TableSchema>> {
        self.schemas.get(entity_name).cloned()
    }

    /// A fresh entity of the named schema
    pub fn entity(&mut self, entity_name: &str) -> Result<Entity> {
        Ok(Entity::new(self.load(entity_name)?))
    }

    /// List all registered entity names, sorted
    pub fn list_entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// CREATE TABLE statements for every registered schema, sorted by entity name
    pub fn ddl_statements(&self, dialect: Dialect) -> Vec<String> {
        self.list_entities()
            .iter()
            .filter_map(|name| self.schemas.get(name))
            .map(|schema| schema.create_table_sql(dialect))
            .collect()
    }
}
