//! Persistence of entities and collections.
//!
//! An [`EntityManager`] is bound to one entity or one collection at a time
//! and turns them into statements run through a [`Database`].

use crate::backend::{Database, DatabaseBackend, Transaction};
use crate::builder::{Condition, DeleteBuilder, InsertBuilder, SelectBuilder, Statement, UpdateBuilder};
use crate::collection::Collection;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use serde_json::Value;

/// What a manager is currently bound to
#[derive(Debug, Clone)]
pub enum Focus {
    Entity(Entity),
    Collection(Collection),
}

/// Which statement [`EntityManager::save`] ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
}

/// Outcome of a committed [`EntityManager::save_collection`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

pub struct EntityManager<B: DatabaseBackend> {
    db: Database<B>,
    scope: Option<String>,
    focus: Option<Focus>,
}

impl<B: DatabaseBackend> EntityManager<B> {
    /// Manager accepting entities of any kind
    pub fn new(db: Database<B>) -> Self {
        Self {
            db,
            scope: None,
            focus: None,
        }
    }

    /// Manager restricted to entities named `entity_name`
    pub fn scoped(db: Database<B>, entity_name: impl Into<String>) -> Self {
        Self {
            db,
            scope: Some(entity_name.into()),
            focus: None,
        }
    }

    pub fn database(&self) -> &Database<B> {
        &self.db
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Bind an entity, replacing whatever was bound
    pub fn set_entity(&mut self, entity: Entity) -> Result<()> {
        self.check_scope(&entity)?;
        self.focus = Some(Focus::Entity(entity));
        Ok(())
    }

    /// Bind a collection, replacing whatever was bound
    pub fn set_entity_collection(&mut self, collection: Collection) -> Result<()> {
        for entity in &collection {
            self.check_scope(entity)?;
        }
        self.focus = Some(Focus::Collection(collection));
        Ok(())
    }

    pub fn entity(&self) -> Option<&Entity> {
        match &self.focus {
            Some(Focus::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        match &mut self.focus {
            Some(Focus::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn collection(&self) -> Option<&Collection> {
        match &self.focus {
            Some(Focus::Collection(collection)) => Some(collection),
            _ => None,
        }
    }

    pub fn collection_mut(&mut self) -> Option<&mut Collection> {
        match &mut self.focus {
            Some(Focus::Collection(collection)) => Some(collection),
            _ => None,
        }
    }

    /// Unbind and return the focus
    pub fn take_focus(&mut self) -> Option<Focus> {
        self.focus.take()
    }

    /// Whether a row with the entity's id exists
    pub async fn exists_in_store(&self, entity: Option<&Entity>) -> Result<bool> {
        let entity = self.resolve(entity)?;
        let mut backend = self.db.lock().await;
        self.exists_on(&mut *backend, entity).await
    }

    /// Insert every column of the entity, returning the affected row count
    pub async fn insert(&self, entity: Option<&Entity>) -> Result<u64> {
        let entity = self.resolve(entity)?;
        let mut backend = self.db.lock().await;
        self.insert_on(&mut *backend, entity).await
    }

    /// Update the non-key columns of the row with the entity's id
    pub async fn update(&self, entity: Option<&Entity>) -> Result<u64> {
        let entity = self.resolve(entity)?;
        let mut backend = self.db.lock().await;
        self.update_on(&mut *backend, entity).await
    }

    /// Delete the row with the entity's id; true iff exactly one row went away
    pub async fn delete(&self, entity: Option<&Entity>) -> Result<bool> {
        let entity = self.resolve(entity)?;
        let stmt = delete_statement(entity)?;

        let mut backend = self.db.lock().await;
        let affected = self.db.execute_on(&mut *backend, &stmt).await?;

        if affected != 1 {
            tracing::warn!(
                entity = entity.entity_name(),
                id = %entity.id_value(),
                affected,
                "delete did not remove exactly one row"
            );
        }

        Ok(affected == 1)
    }

    /// Insert or update depending on whether the id is already stored
    pub async fn save(&self, entity: Option<&Entity>) -> Result<SaveOutcome> {
        let entity = self.resolve(entity)?;
        let mut backend = self.db.lock().await;
        self.save_on(&mut *backend, entity).await
    }

    /// Save every entity of the collection inside one transaction.
    ///
    /// The first failure rolls the whole batch back and is returned.
    pub async fn save_collection(&self, collection: Option<&Collection>) -> Result<BatchReport> {
        let collection = match collection {
            Some(collection) => {
                for entity in collection {
                    self.check_scope(entity)?;
                }
                collection
            }
            None => self.collection().ok_or_else(|| {
                OrmError::Parameter("No entity collection is bound to this manager".to_string())
            })?,
        };

        let mut backend = self.db.lock().await;
        let mut tx = Transaction::begin(&mut *backend).await?;
        let mut report = BatchReport::default();

        for entity in collection {
            match self.save_on(tx.backend(), entity).await {
                Ok(SaveOutcome::Inserted) => report.inserted += 1,
                Ok(SaveOutcome::Updated) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(
                        entity = entity.entity_name(),
                        id = %entity.id_value(),
                        error = %e,
                        "rolling back collection save"
                    );
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::error!(error = %rollback_err, "rollback failed");
                    }
                    return Err(e);
                }
            }
        }

        tx.commit().await?;
        tracing::info!(
            inserted = report.inserted,
            updated = report.updated,
            "collection saved"
        );

        Ok(report)
    }

    /// Create the entity's table in the backend's dialect
    pub async fn create_table(&self, entity: Option<&Entity>) -> Result<()> {
        let entity = self.resolve(entity)?;
        let mut backend = self.db.lock().await;

        let stmt = Statement::new(entity.schema().create_table_sql(backend.dialect()));
        self.db.execute_on(&mut *backend, &stmt).await?;
        tracing::info!(table = entity.table_name(), "table created");
        Ok(())
    }

    pub async fn drop_table(&self, entity: Option<&Entity>) -> Result<()> {
        let entity = self.resolve(entity)?;
        let mut backend = self.db.lock().await;

        let stmt = Statement::new(entity.schema().drop_table_sql());
        self.db.execute_on(&mut *backend, &stmt).await?;
        tracing::info!(table = entity.table_name(), "table dropped");
        Ok(())
    }

    async fn exists_on(&self, backend: &mut B, entity: &Entity) -> Result<bool> {
        let stmt = exists_statement(entity)?;
        let rows = self.db.query_on(backend, &stmt).await?;

        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0);

        Ok(count >= 1)
    }

    async fn insert_on(&self, backend: &mut B, entity: &Entity) -> Result<u64> {
        let stmt = insert_statement(entity)?;
        self.db.execute_on(backend, &stmt).await
    }

    async fn update_on(&self, backend: &mut B, entity: &Entity) -> Result<u64> {
        match update_statement(entity)? {
            Some(stmt) => self.db.execute_on(backend, &stmt).await,
            None => {
                tracing::debug!(entity = entity.entity_name(), "no column to update");
                Ok(0)
            }
        }
    }

    async fn save_on(&self, backend: &mut B, entity: &Entity) -> Result<SaveOutcome> {
        if self.exists_on(backend, entity).await? {
            self.update_on(backend, entity).await?;
            Ok(SaveOutcome::Updated)
        } else {
            self.insert_on(backend, entity).await?;
            Ok(SaveOutcome::Inserted)
        }
    }

    fn resolve<'a>(&'a self, entity: Option<&'a Entity>) -> Result<&'a Entity> {
        match entity {
            Some(entity) => {
                self.check_scope(entity)?;
                Ok(entity)
            }
            None => self.entity().ok_or_else(|| {
                OrmError::Parameter("No entity is bound to this manager".to_string())
            }),
        }
    }

    fn check_scope(&self, entity: &Entity) -> Result<()> {
        match &self.scope {
            Some(scope) if scope != entity.entity_name() => Err(OrmError::TypeMismatch {
                expected: scope.clone(),
                found: entity.entity_name().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

fn id_condition(entity: &Entity) -> Result<Condition> {
    Condition::all_eq(entity.id_key_value()).ok_or_else(|| {
        OrmError::Schema(format!("Entity {} has no primary key", entity.entity_name()))
    })
}

/// `SELECT COUNT(*)` over the entity's id
pub fn exists_statement(entity: &Entity) -> Result<Statement> {
    SelectBuilder::new(entity.table_name())
        .count("count")
        .where_clause(id_condition(entity)?)
        .build()
}

/// INSERT naming every declared column, in declared order
pub fn insert_statement(entity: &Entity) -> Result<Statement> {
    entity
        .columns_value()
        .iter()
        .fold(InsertBuilder::new(entity.table_name()), |insert, (column, value)| {
            insert.value(column.as_str(), value.clone())
        })
        .build()
}

/// UPDATE of the non-key columns; `None` when every column is part of the key
pub fn update_statement(entity: &Entity) -> Result<Option<Statement>> {
    let columns = entity.columns_key_value_no_primary();
    if columns.is_empty() {
        return Ok(None);
    }

    UpdateBuilder::new(entity.table_name())
        .set_many(columns)
        .where_clause(id_condition(entity)?)
        .build()
        .map(Some)
}

pub fn delete_statement(entity: &Entity) -> Result<Statement> {
    DeleteBuilder::new(entity.table_name())
        .where_clause(id_condition(entity)?)
        .build()
}
