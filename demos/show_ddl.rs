use entity_orm::schema::{ColumnDef, Dialect, PrimaryKey, SchemaRegistry, SqlType, TableSchema};
use entity_orm::Entity;
use serde_json::json;

fn main() -> entity_orm::Result<()> {
    let mut registry = SchemaRegistry::new("entities");

    let mut id = ColumnDef::new("id", SqlType::Int);
    id.size = Some(11);
    id.nullable = false;
    id.unsigned = true;
    id.auto_increment = true;

    let mut name = ColumnDef::new("name", SqlType::Varchar);
    name.size = Some(64);
    name.nullable = false;

    let mut score = ColumnDef::new("score", SqlType::Int);
    score.default = Some(json!(0));

    let mut player = TableSchema::new(
        "Player",
        "players",
        PrimaryKey::Single("id".to_string()),
        vec![id, name, score],
    )?;
    player.engine = Some("InnoDB".to_string());
    player.charset = Some("utf8mb4".to_string());
    let player = registry.register(player)?;

    registry.register(TableSchema::new(
        "Inventory",
        "inventories",
        PrimaryKey::Composite(vec!["player_id".to_string(), "item_name".to_string()]),
        vec![
            ColumnDef::new("player_id", SqlType::Int),
            ColumnDef::new("item_name", SqlType::Varchar),
            ColumnDef::new("quantity", SqlType::Int),
        ],
    )?)?;

    for dialect in [Dialect::Sqlite, Dialect::MySql] {
        println!("-- {:?}", dialect);
        for statement in registry.ddl_statements(dialect) {
            println!("{};\n", statement);
        }
    }

    let entity = Entity::new(player).with("id", 1)?.with("name", "Alice")?;
    println!("{}", entity);

    Ok(())
}
