//! Query execution over a host-supplied connection.

pub(crate) mod rows;

use odataql_core::{EntityMetadata, MetadataProvider, NavigationProperty, QueryOptions, Record};
use serde_json::{Map, Value};

use crate::config::{ExpandStrategy, ServiceConfig};
use crate::connection::SqlConnection;
use crate::context::RequestContext;
use crate::error::{DbError, DbResult};
use crate::expand::{ExpandPlan, ExpandPlanner, ExpansionEngine};
use crate::sql::{Assignments, CompiledQuery, ParentLink, SelectSpec, SqlCompiler, SqlValue};
use rows::Projection;

/// Rows of a collection request plus the optional `$count`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResponse {
    pub value: Vec<Record>,
    pub count: Option<u64>,
}

impl QueryResponse {
    /// `{"@odata.count": n, "value": [...]}`
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        if let Some(count) = self.count {
            body.insert("@odata.count".to_string(), Value::from(count));
        }
        body.insert(
            "value".to_string(),
            Value::Array(self.value.iter().cloned().map(Value::Object).collect()),
        );
        Value::Object(body)
    }
}

pub struct QueryExecutor<'a> {
    conn: &'a dyn SqlConnection,
    metadata: &'a dyn MetadataProvider,
    strategy: ExpandStrategy,
    max_expand_depth: usize,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(conn: &'a dyn SqlConnection, metadata: &'a dyn MetadataProvider) -> Self {
        Self {
            conn,
            metadata,
            strategy: ExpandStrategy::Auto,
            max_expand_depth: 5,
        }
    }

    pub fn with_strategy(mut self, strategy: ExpandStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_expand_depth(mut self, depth: usize) -> Self {
        self.max_expand_depth = depth;
        self
    }

    pub fn connection(&self) -> &'a dyn SqlConnection {
        self.conn
    }

    pub fn metadata(&self) -> &'a dyn MetadataProvider {
        self.metadata
    }

    /// Collection query with every option applied
    pub fn query(
        &self,
        entity: &EntityMetadata,
        options: &QueryOptions,
        ctx: &RequestContext,
    ) -> DbResult<QueryResponse> {
        self.run(entity, options, &[], None, true, ctx)
    }

    /// Single entity by key; `$select`, `$expand` and `$compute` apply
    pub fn get(
        &self,
        entity: &EntityMetadata,
        key: &Assignments<'_>,
        options: &QueryOptions,
        ctx: &RequestContext,
    ) -> DbResult<Record> {
        let mut options = options.clone();
        options.filter = None;
        options.search = None;
        options.count = false;
        self.run(entity, &options, key, None, false, ctx)?
            .value
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(describe(entity, key)))
    }

    /// Entities reached from one parent through `nav`
    pub fn related(
        &self,
        entity: &EntityMetadata,
        key: &Assignments<'_>,
        nav: &NavigationProperty,
        options: &QueryOptions,
        ctx: &RequestContext,
    ) -> DbResult<QueryResponse> {
        let local = entity.require_property(&nav.local_property)?;
        let mut spec = SelectSpec::new(entity);
        spec.properties = vec![local];
        spec.key = key.to_vec();
        let parent = rows::fetch(self.conn, &spec, ctx)?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(describe(entity, key)))?;

        let value = parent.get(&local.name).cloned().unwrap_or(Value::Null);
        if value.is_null() {
            return Ok(QueryResponse {
                value: Vec::new(),
                count: options.count.then_some(0),
            });
        }

        let target = self.metadata.require_entity(&nav.target)?;
        let link = ParentLink {
            navigation: nav,
            keys: vec![SqlValue::from_record(&value)],
        };
        self.run(target, options, &[], Some(link), true, ctx)
    }

    fn engine(&self) -> ExpansionEngine<'a> {
        ExpansionEngine::new(self.conn, self.metadata, self.strategy, self.max_expand_depth)
    }

    fn run(
        &self,
        entity: &EntityMetadata,
        options: &QueryOptions,
        key: &Assignments<'_>,
        parent: Option<ParentLink<'_>>,
        paginate: bool,
        ctx: &RequestContext,
    ) -> DbResult<QueryResponse> {
        let engine = self.engine();
        let plan = engine.plan(entity, &options.expand, 1)?;
        let projection = Projection::new(&options.select);

        let mut spec = primary_spec(entity, options, &plan, paginate);
        spec.key = key.to_vec();
        spec.parent = parent;

        let mut records = rows::fetch(self.conn, &spec, ctx)?;
        engine.complete(entity, &mut records, &plan, 1, ctx)?;
        let names = plan.names();
        for record in records.iter_mut() {
            projection.apply(record, &names);
        }

        let count = if options.count {
            Some(rows::count(self.conn, &spec, ctx)?)
        } else {
            None
        };
        tracing::debug!("Query on {} returned {} rows", entity.name, records.len());
        Ok(QueryResponse {
            value: records,
            count,
        })
    }
}

/// SELECT of the requested rows with joined navigations; the batched
/// expansion queries depend on the returned keys and are not included
pub fn compile_select(
    config: &ServiceConfig,
    metadata: &dyn MetadataProvider,
    entity: &EntityMetadata,
    options: &QueryOptions,
) -> DbResult<CompiledQuery> {
    let planner = ExpandPlanner::new(metadata, config.expand_strategy, config.parser.max_expand_depth);
    let plan = planner.plan(entity, &options.expand, 1)?;
    let spec = primary_spec(entity, options, &plan, true);
    SqlCompiler::new(config.dialect.dialect()).select(&spec)
}

fn primary_spec<'s>(
    entity: &'s EntityMetadata,
    options: &'s QueryOptions,
    plan: &ExpandPlan<'s>,
    paginate: bool,
) -> SelectSpec<'s> {
    let mut spec = SelectSpec::new(entity);
    spec.properties = Projection::new(&options.select).columns(entity, &plan.required());
    spec.compute = &options.compute;
    spec.filter = options.filter.as_ref();
    spec.search = options.search.as_ref();
    spec.orderby = &options.orderby;
    if paginate {
        spec.skip = options.skip;
        spec.top = Some(options.top);
    }
    spec.joins = plan.join_specs();
    spec
}

/// `Products(ID=1)` style label for errors
pub(crate) fn describe(entity: &EntityMetadata, key: &Assignments<'_>) -> String {
    let parts: Vec<String> = key
        .iter()
        .map(|(p, v)| {
            let value = match v {
                SqlValue::Text(s) => format!("'{}'", s),
                SqlValue::Integer(i) => i.to_string(),
                SqlValue::Real(f) => f.to_string(),
                SqlValue::Boolean(b) => b.to_string(),
                SqlValue::Null => "null".to_string(),
                SqlValue::Blob(_) => "binary".to_string(),
            };
            format!("{}={}", p.name, value)
        })
        .collect();
    format!("{}({})", entity.name, parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog, seeded};
    use odataql_core::QueryParser;
    use serde_json::json;

    fn names(response: &QueryResponse) -> Vec<Value> {
        response.value.iter().map(|r| r["Name"].clone()).collect()
    }

    #[test]
    fn test_query_filter_order_page_count() {
        let registry = catalog();
        let conn = seeded();
        let products = registry.require_entity("Products").unwrap();
        let options = QueryParser::default()
            .parse_for_entity(
                "$filter=Price gt 5&$orderby=Price desc&$skip=1&$top=2&$count=true&$select=Name",
                products,
                &registry,
            )
            .unwrap();
        let response = QueryExecutor::new(&conn, &registry)
            .query(products, &options, &RequestContext::new())
            .unwrap();
        assert_eq!(names(&response), vec![json!("Hammer"), json!("Rake")]);
        assert_eq!(response.count, Some(3));
        assert_eq!(response.value[0].len(), 1);
        assert_eq!(response.to_json()["@odata.count"], 3);
    }

    #[test]
    fn test_get_by_key_and_not_found() {
        let registry = catalog();
        let conn = seeded();
        let products = registry.require_entity("Products").unwrap();
        let id = products.property("ID").unwrap();
        let executor = QueryExecutor::new(&conn, &registry);
        let options = QueryOptions::default();

        let record = executor
            .get(products, &[(id, SqlValue::Integer(2))], &options, &RequestContext::new())
            .unwrap();
        assert_eq!(record["Name"], "Gadget");

        let err = executor
            .get(products, &[(id, SqlValue::Integer(99))], &options, &RequestContext::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Not found: Products(ID=99)");
    }

    #[test]
    fn test_compile_select_uses_configured_dialect() {
        let registry = catalog();
        let products = registry.require_entity("Products").unwrap();
        let options = QueryParser::default()
            .parse_for_entity("$filter=Name eq 'Rake'&$select=Name&$expand=Category", products, &registry)
            .unwrap();
        let config = ServiceConfig {
            dialect: crate::sql::DialectKind::Postgres,
            ..ServiceConfig::default()
        };
        let query = compile_select(&config, &registry, products, &options).unwrap();
        assert!(query.sql.contains("LEFT JOIN"));
        assert!(query.sql.contains("$1"));
        assert_eq!(query.params[0], SqlValue::Text("Rake".into()));
    }

    #[test]
    fn test_related_through_join_table() {
        let registry = catalog();
        let conn = seeded();
        let products = registry.require_entity("Products").unwrap();
        let id = products.property("ID").unwrap();
        let nav = products.navigation("Tags").unwrap();
        let options = QueryParser::default().parse_query_string("$orderby=Label").unwrap();
        let response = QueryExecutor::new(&conn, &registry)
            .related(products, &[(id, SqlValue::Integer(1))], nav, &options, &RequestContext::new())
            .unwrap();
        let labels: Vec<Value> = response.value.iter().map(|r| r["Label"].clone()).collect();
        assert_eq!(labels, vec![json!("new"), json!("sale")]);
        assert!(response.value[0].get("@parent").is_none());
    }
}
