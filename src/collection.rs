use crate::entity::{Entity, EntityId};
use crate::error::{OrmError, Result};
use std::collections::HashMap;
use std::ops::Index;

/// Ordered entities, unique by id, with an external cursor.
///
/// Positions (insertion order) and ids are two separate ways to address an
/// entity: `get`/`seek` take positions, `get_entity_by_id` takes ids.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
    position: usize,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity; its id must not be in the collection yet.
    ///
    /// Ids compare by [`EntityId::key`]: `1` and `1.0` are the same id, `"1"` is not.
    pub fn add(&mut self, entity: Entity) -> Result<()> {
        let id = entity.id_value();
        let key = id.key();

        if self.index.contains_key(&key) {
            return Err(OrmError::DuplicateId(id.to_string()));
        }

        self.index.insert(key, self.entities.len());
        self.entities.push(entity);
        Ok(())
    }

    pub fn get_entity_by_id(&self, id: &EntityId) -> Result<&Entity> {
        self.index
            .get(&id.key())
            .map(|&pos| &self.entities[pos])
            .ok_or_else(|| OrmError::NotFound(format!("This entity id({}) is not in the collection", id)))
    }

    pub fn contains_id(&self, id: &EntityId) -> bool {
        self.index.contains_key(&id.key())
    }

    /// Mutate the entity with the given id. Changing its id is refused and undone.
    pub fn modify<F, R>(&mut self, id: &EntityId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Entity) -> Result<R>,
    {
        let key = id.key();
        let pos = *self
            .index
            .get(&key)
            .ok_or_else(|| OrmError::NotFound(format!("This entity id({}) is not in the collection", id)))?;

        let entity = &mut self.entities[pos];
        let backup = entity.clone();
        let result = f(entity);

        if entity.id_value().key() != key {
            *entity = backup;
            return Err(OrmError::Parameter(format!(
                "The id of entity {} cannot change inside a collection",
                id
            )));
        }

        result
    }

    /// Entity at a position
    pub fn get(&self, position: usize) -> Option<&Entity> {
        self.entities.get(position)
    }

    pub fn offset_exists(&self, position: usize) -> bool {
        position < self.entities.len()
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    /// Entity under the cursor
    pub fn current(&self) -> Option<&Entity> {
        self.entities.get(self.position)
    }

    /// Cursor position
    pub fn key(&self) -> usize {
        self.position
    }

    pub fn next(&mut self) {
        self.position += 1;
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn valid(&self) -> bool {
        self.position < self.entities.len()
    }

    /// Move the cursor to `position`, which must hold an entity
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if !self.offset_exists(position) {
            return Err(OrmError::OutOfRange {
                position,
                count: self.entities.len(),
            });
        }

        self.position = position;
        Ok(())
    }
}

impl Index<usize> for Collection {
    type Output = Entity;

    fn index(&self, position: usize) -> &Entity {
        &self.entities[position]
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::{membership_schema, user};
    use serde_json::json;

    fn users(ids: &[i64]) -> Collection {
        let mut collection = Collection::new();
        for id in ids {
            collection.add(user(*id, &format!("User_{}", id))).unwrap();
        }
        collection
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut collection = users(&[1, 2]);
        assert_eq!(collection.count(), 2);

        let result = collection.add(user(2, "Other"));
        assert!(matches!(result, Err(OrmError::DuplicateId(ref id)) if id == "2"));
        assert_eq!(collection.count(), 2);

        collection.add(user(3, "Third")).unwrap();
        assert_eq!(collection.count(), 3);
    }

    #[test]
    fn test_integral_float_id_is_a_duplicate() {
        let mut collection = users(&[1]);

        let mut same = user(5, "Float");
        same.set("id", json!(1.0)).unwrap();
        assert!(matches!(collection.add(same), Err(OrmError::DuplicateId(_))));

        let found = collection
            .get_entity_by_id(&EntityId::from(json!(1.0)))
            .unwrap();
        assert_eq!(found.get_str("name").unwrap(), Some("User_1"));
    }

    #[test]
    fn test_get_by_id() {
        let collection = users(&[10, 20]);

        let entity = collection.get_entity_by_id(&EntityId::from(20)).unwrap();
        assert_eq!(entity.get_str("name").unwrap(), Some("User_20"));

        assert!(matches!(
            collection.get_entity_by_id(&EntityId::from(30)),
            Err(OrmError::NotFound(_))
        ));
    }

    #[test]
    fn test_positions_and_ids_are_distinct() {
        let collection = users(&[5, 0]);

        // position 0 holds id 5, id 0 sits at position 1
        assert_eq!(collection[0].get_i64("id").unwrap(), Some(5));
        assert_eq!(
            collection
                .get_entity_by_id(&EntityId::from(0))
                .unwrap()
                .get_i64("id")
                .unwrap(),
            Some(0)
        );
        assert!(collection.offset_exists(1));
        assert!(!collection.offset_exists(2));
        assert!(collection.get(2).is_none());
    }

    #[test]
    fn test_cursor_visits_in_insertion_order() {
        let mut collection = users(&[3, 1, 2]);
        let mut seen = Vec::new();

        collection.rewind();
        while collection.valid() {
            let entity = collection.current().unwrap();
            seen.push((collection.key(), entity.get_i64("id").unwrap().unwrap()));
            collection.next();
        }

        assert_eq!(seen, vec![(0, 3), (1, 1), (2, 2)]);
        assert!(collection.current().is_none());
    }

    #[test]
    fn test_seek() {
        let mut collection = users(&[1, 2, 3]);

        collection.seek(2).unwrap();
        assert_eq!(collection.key(), 2);
        assert_eq!(collection.current().unwrap().get_i64("id").unwrap(), Some(3));

        let count = collection.count();
        assert!(matches!(
            collection.seek(count),
            Err(OrmError::OutOfRange { position: 3, count: 3 })
        ));
        assert_eq!(collection.key(), 2);
    }

    #[test]
    fn test_iter() {
        let collection = users(&[1, 2]);
        let ids: Vec<i64> = collection
            .iter()
            .map(|e| e.get_i64("id").unwrap().unwrap())
            .collect();

        assert_eq!(ids, vec![1, 2]);
        assert_eq!((&collection).into_iter().count(), 2);
    }

    #[test]
    fn test_composite_ids() {
        let mut collection = Collection::new();
        for (user_id, group_id) in [(1, 1), (1, 2), (2, 1)] {
            let mut entity = Entity::new(membership_schema());
            entity.set("user_id", user_id).unwrap();
            entity.set("group_id", group_id).unwrap();
            collection.add(entity).unwrap();
        }

        let mut duplicate = Entity::new(membership_schema());
        duplicate.set("user_id", 1).unwrap();
        duplicate.set("group_id", 2).unwrap();
        assert!(collection.add(duplicate).is_err());

        let id = EntityId::Composite(vec![json!(2), json!(1)]);
        assert!(collection.contains_id(&id));
    }

    #[test]
    fn test_modify_keeps_id_stable() {
        let mut collection = users(&[1, 2]);
        let id = EntityId::from(1);

        collection
            .modify(&id, |e| e.set("name", "Renamed"))
            .unwrap();
        assert_eq!(
            collection.get_entity_by_id(&id).unwrap().get_str("name").unwrap(),
            Some("Renamed")
        );

        let result = collection.modify(&id, |e| e.set("id", 2));
        assert!(matches!(result, Err(OrmError::Parameter(_))));
        assert_eq!(collection[0].get_i64("id").unwrap(), Some(1));
    }
}
