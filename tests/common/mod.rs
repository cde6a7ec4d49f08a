//! Common test utilities for integration tests
//!
//! Provides shared helpers for:
//! - Creating seeded SQLite databases
//! - Loading the shop metadata
//! - Counting the statements a request issues

#![allow(dead_code)]

use std::cell::RefCell;

use odataql::connection::ExecuteOutcome;
use odataql::odataql_core::MetadataRegistry;
use odataql::{DbResult, DialectKind, RequestContext, SqlConnection, SqlValue, SqliteConnection};
use tempfile::TempDir;

pub const METADATA: &str = r#"[
    {
        "name": "Customers",
        "table": "customers",
        "keys": ["ID"],
        "properties": [
            { "name": "ID", "column": "id", "type": "Int64", "nullable": false },
            { "name": "Name", "column": "name", "type": "String", "nullable": false },
            { "name": "City", "column": "city", "type": "String" }
        ],
        "navigations": [
            { "name": "Orders", "target": "Orders", "local_property": "ID",
              "referenced_property": "CustomerID", "cardinality": "many" }
        ]
    },
    {
        "name": "Orders",
        "table": "orders",
        "keys": ["ID"],
        "properties": [
            { "name": "ID", "column": "id", "type": "Int64", "nullable": false },
            { "name": "CustomerID", "column": "customer_id", "type": "Int64" },
            { "name": "Total", "column": "total", "type": "Double" },
            { "name": "Status", "column": "status", "type": "String" },
            { "name": "PlacedAt", "column": "placed_at", "type": "DateTime" }
        ],
        "navigations": [
            { "name": "Customer", "target": "Customers", "local_property": "CustomerID",
              "referenced_property": "ID", "cardinality": "one" },
            { "name": "Lines", "target": "Lines", "local_property": "ID",
              "referenced_property": "OrderID", "cardinality": "many" }
        ]
    },
    {
        "name": "Lines",
        "table": "order_lines",
        "keys": ["ID"],
        "properties": [
            { "name": "ID", "column": "id", "type": "Int64", "nullable": false },
            { "name": "OrderID", "column": "order_id", "type": "Int64" },
            { "name": "Product", "column": "product", "type": "String" },
            { "name": "Quantity", "column": "quantity", "type": "Int32" }
        ]
    }
]"#;

const SCHEMA: &str = "
    CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT);
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER REFERENCES customers(id),
        total REAL,
        status TEXT,
        placed_at TEXT
    );
    CREATE TABLE order_lines (id INTEGER PRIMARY KEY, order_id INTEGER NOT NULL, product TEXT, quantity INTEGER);

    INSERT INTO customers VALUES (1, 'Alice', 'Paris'), (2, 'Bob', 'Lyon'), (3, 'Chloe', NULL);
    INSERT INTO orders VALUES
        (10, 1, 120.0, 'open', '2024-02-01T09:00:00Z'),
        (11, 1, 35.5, 'shipped', '2024-02-03T10:30:00Z'),
        (12, 2, 80.0, 'open', '2024-03-11T16:45:00Z'),
        (13, NULL, 5.0, 'draft', NULL);
    INSERT INTO order_lines VALUES
        (100, 10, 'Desk', 1), (101, 10, 'Lamp', 2), (102, 11, 'Pen', 10), (103, 12, 'Chair', 0);
";

pub fn metadata() -> MetadataRegistry {
    MetadataRegistry::from_json(METADATA).expect("Failed to parse metadata")
}

pub fn create_test_db() -> (SqliteConnection, TempDir) {
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let conn = SqliteConnection::open(tmp_dir.path().join("shop.db"))
        .expect("Failed to open database");
    (conn, tmp_dir)
}

pub fn create_seeded_db() -> (SqliteConnection, TempDir) {
    let (conn, tmp) = create_test_db();
    conn.execute_batch(SCHEMA, &RequestContext::new())
        .expect("Failed to seed database");
    (conn, tmp)
}

pub fn count_rows(conn: &SqliteConnection, table: &str) -> i64 {
    let rows = conn
        .query(&format!("SELECT COUNT(*) FROM {}", table), &[], &RequestContext::new())
        .expect("Failed to count rows");
    match rows[0][0] {
        SqlValue::Integer(n) => n,
        ref other => panic!("unexpected count {:?}", other),
    }
}

/// Wraps a connection and records every SELECT it runs
pub struct CountingConnection<C> {
    inner: C,
    queries: RefCell<Vec<String>>,
}

impl<C: SqlConnection> CountingConnection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.borrow().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }

    pub fn reset(&self) {
        self.queries.borrow_mut().clear();
    }
}

impl<C: SqlConnection> SqlConnection for CountingConnection<C> {
    fn dialect(&self) -> DialectKind {
        self.inner.dialect()
    }

    fn query(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<Vec<Vec<SqlValue>>> {
        self.queries.borrow_mut().push(sql.to_string());
        self.inner.query(sql, params, ctx)
    }

    fn execute(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<ExecuteOutcome> {
        self.inner.execute(sql, params, ctx)
    }

    fn begin(&self, ctx: &RequestContext) -> DbResult<()> {
        self.inner.begin(ctx)
    }

    fn commit(&self, ctx: &RequestContext) -> DbResult<()> {
        self.inner.commit(ctx)
    }

    fn rollback(&self) -> DbResult<()> {
        self.inner.rollback()
    }
}
