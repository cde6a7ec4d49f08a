//! $expand resolution: joins, 2-query batching and nested options

mod common;

use common::{create_seeded_db, metadata, CountingConnection};
use odataql::odataql_core::{MetadataProvider, ParserConfig, QueryParser};
use odataql::{DbError, ExpandStrategy, QueryExecutor, QueryResponse, RequestContext, SqliteConnection};
use serde_json::{json, Value};

fn run(
    conn: &CountingConnection<&SqliteConnection>,
    strategy: ExpandStrategy,
    entity: &str,
    query: &str,
) -> Result<QueryResponse, DbError> {
    let registry = metadata();
    let entity = registry.require_entity(entity)?;
    let options = QueryParser::new(ParserConfig::default()).parse_for_entity(query, entity, &registry)?;
    QueryExecutor::new(conn, &registry)
        .with_strategy(strategy)
        .query(entity, &options, &RequestContext::new())
}

fn field(response: &QueryResponse, name: &str) -> Vec<Value> {
    response.value.iter().map(|r| r[name].clone()).collect()
}

#[test]
fn test_to_many_batch_issues_exactly_two_queries() {
    let (db, _tmp) = create_seeded_db();
    let conn = CountingConnection::new(&db);

    let response = run(
        &conn,
        ExpandStrategy::Auto,
        "Customers",
        "$expand=Orders($filter=Status eq 'open';$select=ID)&$orderby=ID",
    )
    .unwrap();

    assert_eq!(conn.query_count(), 2);
    assert!(conn.queries()[1].contains(" IN ("));
    assert_eq!(
        field(&response, "Orders"),
        vec![json!([{ "ID": 10 }]), json!([{ "ID": 12 }]), json!([])]
    );
}

#[test]
fn test_to_one_without_match_is_null_in_both_strategies() {
    let (db, _tmp) = create_seeded_db();

    for (strategy, queries) in [(ExpandStrategy::Auto, 1), (ExpandStrategy::Batch, 2)] {
        let conn = CountingConnection::new(&db);
        let response = run(&conn, strategy, "Orders", "$expand=Customer($select=Name)&$orderby=ID").unwrap();
        assert_eq!(conn.query_count(), queries, "{:?}", strategy);
        assert_eq!(
            field(&response, "Customer"),
            vec![
                json!({ "Name": "Alice" }),
                json!({ "Name": "Alice" }),
                json!({ "Name": "Bob" }),
                Value::Null,
            ],
            "{:?}",
            strategy
        );
    }
}

#[test]
fn test_join_and_batch_agree() {
    let (db, _tmp) = create_seeded_db();
    let query = "$expand=Customer&$filter=Total gt 10&$orderby=Total desc";
    let joined = run(&CountingConnection::new(&db), ExpandStrategy::Join, "Orders", query).unwrap();
    let batched = run(&CountingConnection::new(&db), ExpandStrategy::Batch, "Orders", query).unwrap();
    assert_eq!(joined.value, batched.value);
}

#[test]
fn test_nested_expand_filter_select() {
    let (db, _tmp) = create_seeded_db();
    let conn = CountingConnection::new(&db);

    let response = run(
        &conn,
        ExpandStrategy::Auto,
        "Customers",
        "$select=Name&$expand=Orders($select=ID;$orderby=ID;$expand=Lines($filter=Quantity gt 0;$select=Product))&$filter=ID lt 3&$orderby=ID",
    )
    .unwrap();

    assert_eq!(conn.query_count(), 3);
    assert_eq!(
        Value::Array(response.value.into_iter().map(Value::Object).collect()),
        json!([
            { "Name": "Alice", "Orders": [
                { "ID": 10, "Lines": [{ "Product": "Desk" }, { "Product": "Lamp" }] },
                { "ID": 11, "Lines": [{ "Product": "Pen" }] }
            ]},
            { "Name": "Bob", "Orders": [
                { "ID": 12, "Lines": [] }
            ]}
        ])
    );
}

#[test]
fn test_nested_top_applies_per_parent() {
    let (db, _tmp) = create_seeded_db();
    let conn = CountingConnection::new(&db);
    let response = run(
        &conn,
        ExpandStrategy::Batch,
        "Customers",
        "$expand=Orders($orderby=Total desc;$top=1;$select=Total)&$orderby=ID",
    )
    .unwrap();
    assert_eq!(
        field(&response, "Orders"),
        vec![json!([{ "Total": 120.0 }]), json!([{ "Total": 80.0 }]), json!([])]
    );
}

#[test]
fn test_multi_segment_path_expands_each_level() {
    let (db, _tmp) = create_seeded_db();
    let conn = CountingConnection::new(&db);
    let response = run(&conn, ExpandStrategy::Auto, "Lines", "$expand=Order/Customer&$filter=ID eq 102");
    // Lines declares no navigation named Order
    assert!(response.is_err());

    let response = run(&conn, ExpandStrategy::Auto, "Orders", "$expand=Customer/Orders($select=ID)&$filter=ID eq 12").unwrap();
    assert_eq!(
        response.value[0]["Customer"]["Orders"],
        json!([{ "ID": 12 }])
    );
}

#[test]
fn test_expand_depth_limit() {
    let (db, _tmp) = create_seeded_db();
    let conn = CountingConnection::new(&db);
    let err = run(
        &conn,
        ExpandStrategy::Auto,
        "Customers",
        "$expand=Orders($expand=Customer($expand=Orders($expand=Customer($expand=Orders($expand=Customer)))))",
    )
    .unwrap_err();
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(conn.query_count(), 0);
}

#[test]
fn test_nested_filter_matches_like_top_level() {
    let (db, _tmp) = create_seeded_db();
    let conn = CountingConnection::new(&db);

    for (needle, expected) in [("ali", None), ("Ali", Some("Alice"))] {
        let filter = format!("contains(Name,'{}')", needle);
        let top = run(&conn, ExpandStrategy::Auto, "Customers", &format!("$filter={}", filter)).unwrap();
        assert_eq!(
            field(&top, "Name").first().and_then(Value::as_str),
            expected,
            "{}",
            needle
        );

        for strategy in [ExpandStrategy::Auto, ExpandStrategy::Batch] {
            let nested = run(
                &conn,
                strategy,
                "Orders",
                &format!("$expand=Customer($filter={};$select=Name)&$filter=ID eq 10", filter),
            )
            .unwrap();
            assert_eq!(
                nested.value[0]["Customer"]["Name"].as_str(),
                expected,
                "{} {:?}",
                needle,
                strategy
            );
        }
    }
}
