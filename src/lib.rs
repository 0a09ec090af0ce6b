//! entity-orm - schema-declared entities over SQL backends
//!
//! Tables are declared in TOML files, one per entity. A declaration becomes a
//! [`TableSchema`], which hydrates [`Entity`] records. Entities are grouped in
//! id-unique [`Collection`]s and persisted by an [`EntityManager`].
//!
//! # Architecture
//!
//! - **Config Store**: [`config::Settings`] (figment) and [`SchemaRegistry`]
//!   for schema declaration files
//! - **Entity / Collection**: runtime records and their id-indexed container
//! - **EntityManager**: exists-check, insert, update, delete, upsert, and
//!   transactional batch save
//! - **Backends**: SQLite and MySQL behind the [`DatabaseBackend`] trait,
//!   shared through a [`Database`] handle
//!
//! # Example
//!
//! ```rust,no_run
//! use entity_orm::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut registry = SchemaRegistry::new("entities");
//!
//!     #[cfg(feature = "sqlite")]
//!     {
//!         let db = Database::new(SqliteBackend::connect("sqlite://app.db").await?);
//!         let mut manager = EntityManager::scoped(db, "User");
//!
//!         let user = registry.entity("User")?.with("id", 1)?.with("name", "Alice")?;
//!         manager.create_table(Some(&user)).await?;
//!
//!         manager.set_entity(user)?;
//!         manager.save(None).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backend Support
//!
//! ```toml
//! [dependencies]
//! entity-orm = { version = "0.1", features = ["sqlite", "mysql"] }
//! ```

pub mod backend;
pub mod builder;
pub mod collection;
pub mod config;
pub mod console;
pub mod entity;
pub mod error;
pub mod indent;
pub mod manager;
pub mod schema;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{Database, DatabaseBackend, QueryResult, QueryRow, Transaction};
pub use builder::{
    Condition, DeleteBuilder, InsertBuilder, SelectBuilder, Statement, UpdateBuilder,
};
pub use collection::Collection;
pub use console::{Console, ConsoleCommand};
pub use entity::{Entity, EntityId, IdValue};
pub use error::{OrmError, Result};
pub use indent::{Aligner, Pad};
pub use manager::{BatchReport, EntityManager, Focus, SaveOutcome};
pub use schema::{ColumnDef, Dialect, PrimaryKey, SchemaRegistry, SqlType, TableSchema};

#[cfg(feature = "mysql")]
pub use mysql::MySqlBackend;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Prelude for common imports
pub mod prelude {
    pub use crate::backend::{Database, DatabaseBackend, QueryResult, QueryRow};
    pub use crate::collection::Collection;
    pub use crate::console::Console;
    pub use crate::entity::{Entity, EntityId};
    pub use crate::error::{OrmError, Result};
    pub use crate::manager::{BatchReport, EntityManager, SaveOutcome};
    pub use crate::schema::{Dialect, SchemaRegistry, SqlType, TableSchema};

    #[cfg(feature = "mysql")]
    pub use crate::mysql::MySqlBackend;

    #[cfg(feature = "sqlite")]
    pub use crate::sqlite::SqliteBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _sql_type = SqlType::Text;
        let _condition = Condition::eq("id", serde_json::json!(1));
        let _collection = Collection::new();
        let _report = BatchReport::default();
        assert!(SchemaRegistry::new("entities").list_entities().is_empty());
    }
}
