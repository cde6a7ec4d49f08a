//! The same request compiled for each supported dialect

mod common;

use common::metadata;
use odataql::odataql_core::{MetadataProvider, ParserConfig, QueryParser};
use odataql::{compile_select, DialectKind, ServiceConfig, SqlValue};

const QUERY: &str = "$select=Total&$expand=Customer($select=Name)&$filter=Status eq 'open' and endswith(Customer/Name,'e') eq false&$orderby=Total desc&$skip=1&$top=2";

fn compile(dialect: DialectKind, query: &str) -> odataql::sql::CompiledQuery {
    let registry = metadata();
    let orders = registry.require_entity("Orders").unwrap();
    let options = QueryParser::new(ParserConfig::default())
        .parse_for_entity(query, orders, &registry)
        .unwrap();
    let config = ServiceConfig {
        dialect,
        ..ServiceConfig::default()
    };
    compile_select(&config, &registry, orders, &options).unwrap()
}

#[test]
fn test_config_dialect_from_toml() {
    let config = ServiceConfig::from_toml_str("dialect = \"sqlserver\"\n[parser]\nmax_top = 50\n").unwrap();
    assert_eq!(config.dialect, DialectKind::SqlServer);
    assert_eq!(config.parser.max_top, 50);
    assert!(ServiceConfig::from_toml_str("dialect = \"oracle\"").is_err());
}

#[test]
fn test_sqlite_spelling() {
    let q = compile(DialectKind::Sqlite, "$select=Total&$expand=Customer($select=Name)&$filter=Status eq 'open'&$orderby=Total desc&$skip=1&$top=2");
    assert!(q.sql.starts_with("SELECT t0.\"id\" AS \"ID\", t0.\"customer_id\" AS \"CustomerID\", t0.\"total\" AS \"Total\""));
    assert!(q.sql.contains("FROM \"orders\" t0 LEFT JOIN \"customers\" t1 ON t1.\"id\" = t0.\"customer_id\""));
    assert!(q.sql.contains("WHERE (t0.\"status\" = ?1)"));
    assert!(q.sql.ends_with("ORDER BY t0.\"total\" DESC LIMIT 2 OFFSET 1"));
    assert_eq!(q.params, vec![SqlValue::Text("open".into())]);
}

#[test]
fn test_postgres_spelling() {
    let q = compile(DialectKind::Postgres, "$filter=Status eq 'open' and year(PlacedAt) eq 2024&$orderby=ID&$top=5");
    assert!(q.sql.contains("WHERE ((t0.\"status\" = $1) AND ("));
    assert!(q.sql.contains("$2"));
    assert!(q.sql.ends_with("ORDER BY t0.\"id\" ASC LIMIT 5"));
    assert_eq!(q.params.len(), 2);
}

#[test]
fn test_sqlserver_spelling() {
    let q = compile(DialectKind::SqlServer, "$filter=Status eq 'open'&$skip=3&$top=4");
    assert!(q.sql.contains("FROM [orders] t0"));
    assert!(q.sql.contains("WHERE (t0.[status] = @p1)"));
    assert!(q.sql.ends_with("ORDER BY t0.[id] ASC OFFSET 3 ROWS FETCH NEXT 4 ROWS ONLY"));
}

#[test]
fn test_navigation_paths_in_filter_are_rejected() {
    let registry = metadata();
    let orders = registry.require_entity("Orders").unwrap();
    let result = QueryParser::new(ParserConfig::default()).parse_for_entity(QUERY, orders, &registry);
    assert!(result.is_err());
}
