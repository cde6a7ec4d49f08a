//! Shared fixtures for unit tests.

use odataql_core::{
    Cardinality, EdmType, EntityMetadata, JoinTable, MetadataRegistry, NavigationProperty,
    PropertyMetadata,
};
use serde_json::{Map, Value};

use crate::connection::SqliteConnection;
use crate::context::RequestContext;

fn navigation(name: &str, target: &str, local: &str, referenced: &str, cardinality: Cardinality) -> NavigationProperty {
    NavigationProperty {
        name: name.into(),
        target: target.into(),
        local_property: local.into(),
        referenced_property: referenced.into(),
        cardinality,
        join_table: None,
    }
}

/// Products, Categories, Items and Tags
pub fn catalog() -> MetadataRegistry {
    let mut tags = navigation("Tags", "Tags", "ID", "ID", Cardinality::Many);
    tags.join_table = Some(JoinTable {
        table: "product_tags".into(),
        local_column: "product_id".into(),
        target_column: "tag_id".into(),
    });

    MetadataRegistry::new()
        .with(EntityMetadata {
            name: "Products".into(),
            table: "products".into(),
            keys: vec!["ID".into()],
            properties: vec![
                PropertyMetadata::new("ID", "id", EdmType::Int64),
                PropertyMetadata::new("Name", "name", EdmType::String),
                PropertyMetadata::new("Price", "price", EdmType::Double),
                PropertyMetadata::new("Active", "active", EdmType::Boolean),
                PropertyMetadata::new("CreatedAt", "created_at", EdmType::DateTime),
                PropertyMetadata::new("CategoryID", "category_id", EdmType::Int64),
            ],
            navigations: vec![
                navigation("Category", "Categories", "CategoryID", "ID", Cardinality::One),
                navigation("Items", "Items", "ID", "ProductID", Cardinality::Many),
                tags,
            ],
        })
        .with(EntityMetadata {
            name: "Categories".into(),
            table: "categories".into(),
            keys: vec!["ID".into()],
            properties: vec![
                PropertyMetadata::new("ID", "id", EdmType::Int64),
                PropertyMetadata::new("Title", "title", EdmType::String),
                PropertyMetadata::new("ParentID", "parent_id", EdmType::Int64),
            ],
            navigations: vec![
                navigation("Products", "Products", "ID", "CategoryID", Cardinality::Many),
                navigation("Parent", "Categories", "ParentID", "ID", Cardinality::One),
            ],
        })
        .with(EntityMetadata {
            name: "Items".into(),
            table: "items".into(),
            keys: vec!["ID".into()],
            properties: vec![
                PropertyMetadata::new("ID", "id", EdmType::Int64),
                PropertyMetadata::new("ProductID", "product_id", EdmType::Int64),
                PropertyMetadata::new("Sku", "sku", EdmType::String),
                PropertyMetadata::new("Quantity", "quantity", EdmType::Int32),
            ],
            navigations: vec![],
        })
        .with(EntityMetadata {
            name: "Tags".into(),
            table: "tags".into(),
            keys: vec!["ID".into()],
            properties: vec![
                PropertyMetadata::new("ID", "id", EdmType::Int64),
                PropertyMetadata::new("Label", "label", EdmType::String),
            ],
            navigations: vec![],
        })
}

const SCHEMA: &str = "
    CREATE TABLE categories (id INTEGER PRIMARY KEY, title TEXT NOT NULL, parent_id INTEGER);
    CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        price REAL,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT,
        category_id INTEGER REFERENCES categories(id)
    );
    CREATE TABLE items (id INTEGER PRIMARY KEY, product_id INTEGER NOT NULL, sku TEXT, quantity INTEGER);
    CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
    CREATE TABLE product_tags (product_id INTEGER NOT NULL, tag_id INTEGER NOT NULL);

    INSERT INTO categories VALUES (1, 'Tools', NULL), (2, 'Garden', 1), (3, 'Empty', NULL);
    INSERT INTO products VALUES
        (1, 'Hammer', 12.5, 1, '2024-01-05T10:00:00Z', 1),
        (2, 'Gadget', 30.0, 1, '2024-03-01T08:30:00Z', 1),
        (3, 'Rake', 8.0, 0, '2023-11-20T12:00:00Z', 2),
        (4, 'Orphan', 2.0, 1, NULL, NULL);
    INSERT INTO items VALUES (1, 1, 'H-1', 5), (2, 1, 'H-2', 0), (3, 2, 'G-1', 7), (4, 3, 'R-1', 2);
    INSERT INTO tags VALUES (1, 'new'), (2, 'sale');
    INSERT INTO product_tags VALUES (1, 1), (1, 2), (2, 2);
";

/// In-memory database seeded to match [`catalog`]
pub fn seeded() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().expect("open in-memory database");
    conn.execute_batch(SCHEMA, &RequestContext::new())
        .expect("seed schema");
    conn
}

pub fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}
