//! Entity-set operations: collection and entity reads, create, update,
//! delete, plus dispatch of `(method, url, body)` triples as they arrive in
//! batch payloads.

use std::fmt;
use std::str::FromStr;

use axum::http::StatusCode;
use odataql_core::{
    EntityKey, EntityMetadata, MetadataProvider, NavigationProperty, PropertyMetadata,
    QueryOptions, QueryParser, Record, ResourcePath,
};
use serde_json::{Map, Value};

use crate::config::ServiceConfig;
use crate::connection::SqlConnection;
use crate::context::RequestContext;
use crate::error::{DbError, DbResult};
use crate::executor::{describe, QueryExecutor, QueryResponse};
use crate::sql::{SqlCompiler, SqlValue};
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    /// Legacy spelling of PATCH
    Merge,
    Delete,
}

impl Method {
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Merge => "MERGE",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "MERGE" => Ok(Method::Merge),
            "DELETE" => Ok(Method::Delete),
            other => Err(DbError::BadRequest(format!("unsupported method '{}'", other))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PATCH keeps absent properties, PUT resets them to null
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Merge,
    Replace,
}

/// Outcome of one dispatched operation
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ServiceResponse {
    fn new(status: StatusCode, body: Option<Value>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    pub fn error(err: &DbError) -> Self {
        Self::new(err.status_code(), Some(err.to_body()))
    }
}

pub struct EntityService<'a> {
    conn: &'a dyn SqlConnection,
    metadata: &'a dyn MetadataProvider,
    config: &'a ServiceConfig,
    parser: QueryParser,
    /// Set when the caller already holds an open transaction
    in_transaction: bool,
}

impl<'a> EntityService<'a> {
    pub fn new(
        conn: &'a dyn SqlConnection,
        metadata: &'a dyn MetadataProvider,
        config: &'a ServiceConfig,
    ) -> Self {
        Self {
            conn,
            metadata,
            config,
            parser: QueryParser::new(config.parser.clone()),
            in_transaction: false,
        }
    }

    /// Service for operations running inside a caller-owned transaction
    pub fn in_transaction(mut self) -> Self {
        self.in_transaction = true;
        self
    }

    /// Run a multi-statement write atomically, opening a transaction
    /// unless one is already active
    fn atomically<T>(&self, ctx: &RequestContext, write: impl FnOnce() -> DbResult<T>) -> DbResult<T> {
        if self.in_transaction {
            return write();
        }
        let tx = Transaction::begin(self.conn, ctx)?;
        let value = write()?;
        tx.commit(ctx)?;
        Ok(value)
    }

    pub fn config(&self) -> &'a ServiceConfig {
        self.config
    }

    pub fn executor(&self) -> QueryExecutor<'a> {
        QueryExecutor::new(self.conn, self.metadata)
            .with_strategy(self.config.expand_strategy)
            .with_max_expand_depth(self.config.parser.max_expand_depth)
    }

    fn options(&self, query: &str, entity: &EntityMetadata) -> DbResult<QueryOptions> {
        Ok(self.parser.parse_for_entity(query, entity, self.metadata)?)
    }

    /// Parse `url`, run the operation and shape the response
    pub fn handle(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        ctx: &RequestContext,
    ) -> DbResult<ServiceResponse> {
        let path = ResourcePath::parse(url, &self.config.service_root)?;
        let entity = self.metadata.require_entity(&path.entity_set)?;
        tracing::debug!("{} {}", method, url);

        match (method, &path.key, &path.navigation) {
            (Method::Get, None, None) => {
                let response = self.query(entity, &path.query, ctx)?;
                Ok(ServiceResponse::new(StatusCode::OK, Some(response.to_json())))
            }
            (Method::Get, Some(key), None) => {
                let record = self.get(entity, key, &path.query, ctx)?;
                let id = canonical_id(entity, &bind_key(entity, key)?);
                Ok(ServiceResponse::new(
                    StatusCode::OK,
                    Some(Value::Object(annotate(Some(id), record))),
                ))
            }
            (Method::Get, Some(key), Some(nav)) => {
                let nav = entity.require_navigation(nav)?;
                let response = self.related(entity, key, nav, &path.query, ctx)?;
                if nav.is_collection() {
                    return Ok(ServiceResponse::new(StatusCode::OK, Some(response.to_json())));
                }
                let target = self.metadata.require_entity(&nav.target)?;
                Ok(match response.value.into_iter().next() {
                    Some(record) => {
                        let id = entity_id(target, &record);
                        ServiceResponse::new(StatusCode::OK, Some(Value::Object(annotate(id, record))))
                    }
                    None => ServiceResponse::new(StatusCode::NO_CONTENT, None),
                })
            }
            (Method::Post, None, None) => {
                let record = self.create(entity, require_body(body)?, ctx)?;
                Ok(created(entity, record))
            }
            (Method::Post, Some(key), Some(nav)) => {
                let nav = entity.require_navigation(nav)?;
                let target = self.metadata.require_entity(&nav.target)?;
                let record = self.create_related(entity, key, nav, require_body(body)?, ctx)?;
                Ok(created(target, record))
            }
            (Method::Patch | Method::Merge, Some(key), None) => {
                self.update(entity, key, require_body(body)?, UpdateMode::Merge, ctx)?;
                Ok(ServiceResponse::new(StatusCode::NO_CONTENT, None))
            }
            (Method::Put, Some(key), None) => {
                self.update(entity, key, require_body(body)?, UpdateMode::Replace, ctx)?;
                Ok(ServiceResponse::new(StatusCode::NO_CONTENT, None))
            }
            (Method::Delete, Some(key), None) => {
                self.delete(entity, key, ctx)?;
                Ok(ServiceResponse::new(StatusCode::NO_CONTENT, None))
            }
            (method, _, _) => Err(DbError::OperationNotSupported(format!(
                "{} on '{}'",
                method, url
            ))),
        }
    }

    pub fn query(&self, entity: &EntityMetadata, query: &str, ctx: &RequestContext) -> DbResult<QueryResponse> {
        let options = self.options(query, entity)?;
        self.executor().query(entity, &options, ctx)
    }

    pub fn get(&self, entity: &EntityMetadata, key: &EntityKey, query: &str, ctx: &RequestContext) -> DbResult<Record> {
        let options = self.options(query, entity)?;
        let key = bind_key(entity, key)?;
        self.executor().get(entity, &key, &options, ctx)
    }

    pub fn related(
        &self,
        entity: &EntityMetadata,
        key: &EntityKey,
        nav: &NavigationProperty,
        query: &str,
        ctx: &RequestContext,
    ) -> DbResult<QueryResponse> {
        let target = self.metadata.require_entity(&nav.target)?;
        let options = self.options(query, target)?;
        let key = bind_key(entity, key)?;
        self.executor().related(entity, &key, nav, &options, ctx)
    }

    /// Insert one entity and read it back
    pub fn create(&self, entity: &EntityMetadata, body: &Map<String, Value>, ctx: &RequestContext) -> DbResult<Record> {
        let mut values = Vec::new();
        for (name, value) in body {
            if name.starts_with('@') {
                continue;
            }
            let property = writable(entity, name)?;
            if value.is_null() && !property.nullable {
                return Err(DbError::validation(format!(
                    "property '{}' of '{}' is not nullable",
                    property.name, entity.name
                )));
            }
            values.push((property, SqlValue::from_json(value, property.edm_type, &property.name)?));
        }

        let stmt = SqlCompiler::new(self.conn.dialect().dialect()).insert(entity, &values);
        tracing::debug!("SQL: {} ({} params)", stmt.sql, stmt.params.len());
        let outcome = self.conn.execute(&stmt.sql, &stmt.params, ctx)?;

        let keys = entity.key_properties();
        let mut key = Vec::with_capacity(keys.len());
        for property in keys {
            match values.iter().find(|(p, _)| p.name == property.name) {
                Some((_, value)) if !value.is_null() => key.push((property, value.clone())),
                _ => match outcome.last_insert_id {
                    Some(id) if entity.keys.len() == 1 => key.push((property, SqlValue::Integer(id))),
                    _ => {
                        return Err(DbError::InternalError(format!(
                            "cannot determine the key of the new '{}' entity",
                            entity.name
                        )))
                    }
                },
            }
        }
        self.executor()
            .get(entity, &key, &QueryOptions::default(), ctx)
    }

    /// POST to `Set(key)/Nav`: create the target and link it to the parent
    pub fn create_related(
        &self,
        entity: &EntityMetadata,
        key: &EntityKey,
        nav: &NavigationProperty,
        body: &Map<String, Value>,
        ctx: &RequestContext,
    ) -> DbResult<Record> {
        let target = self.metadata.require_entity(&nav.target)?;
        let parent_key = bind_key(entity, key)?;
        let parent = self
            .executor()
            .get(entity, &parent_key, &QueryOptions::default(), ctx)?;
        let local = entity.require_property(&nav.local_property)?;
        let local_value = parent.get(&local.name).cloned().unwrap_or(Value::Null);
        let referenced = target.require_property(&nav.referenced_property)?;

        if let Some(join_table) = &nav.join_table {
            return self.atomically(ctx, || {
                let record = self.create(target, body, ctx)?;
                let target_value = record.get(&referenced.name).cloned().unwrap_or(Value::Null);
                let stmt = SqlCompiler::new(self.conn.dialect().dialect()).link(
                    join_table,
                    SqlValue::from_record(&local_value),
                    SqlValue::from_record(&target_value),
                );
                self.conn.execute(&stmt.sql, &stmt.params, ctx)?;
                Ok(record)
            });
        }

        if nav.is_collection() {
            // the foreign key lives on the new entity
            let mut body = body.clone();
            body.insert(referenced.name.clone(), local_value);
            return self.create(target, &body, ctx);
        }

        // the foreign key lives on the parent
        self.atomically(ctx, || {
            let record = self.create(target, body, ctx)?;
            let target_value = record.get(&referenced.name).cloned().unwrap_or(Value::Null);
            let values = vec![(
                local,
                SqlValue::from_json(&target_value, local.edm_type, &local.name)?,
            )];
            let stmt = SqlCompiler::new(self.conn.dialect().dialect())
                .update(entity, &values, &parent_key)?;
            self.conn.execute(&stmt.sql, &stmt.params, ctx)?;
            Ok(record)
        })
    }

    pub fn update(
        &self,
        entity: &EntityMetadata,
        key: &EntityKey,
        body: &Map<String, Value>,
        mode: UpdateMode,
        ctx: &RequestContext,
    ) -> DbResult<()> {
        let key = bind_key(entity, key)?;
        let mut values = Vec::new();

        for (name, value) in body {
            if name.starts_with('@') {
                continue;
            }
            let property = writable(entity, name)?;
            let bound = SqlValue::from_json(value, property.edm_type, &property.name)?;
            if let Some((_, current)) = key.iter().find(|(k, _)| k.name == property.name) {
                if !same_key(current, &bound) {
                    return Err(DbError::validation(format!(
                        "key property '{}' cannot be changed",
                        property.name
                    )));
                }
                continue;
            }
            if bound.is_null() && !property.nullable {
                return Err(DbError::validation(format!(
                    "property '{}' of '{}' is not nullable",
                    property.name, entity.name
                )));
            }
            values.push((property, bound));
        }

        if mode == UpdateMode::Replace {
            for property in &entity.properties {
                let is_key = entity.keys.iter().any(|k| k.eq_ignore_ascii_case(&property.name));
                if is_key || values.iter().any(|(p, _)| p.name == property.name) {
                    continue;
                }
                if !property.nullable {
                    return Err(DbError::validation(format!(
                        "PUT must supply non-nullable property '{}'",
                        property.name
                    )));
                }
                values.push((property, SqlValue::Null));
            }
        }

        if values.is_empty() {
            // nothing to write; still report missing entities
            self.executor()
                .get(entity, &key, &QueryOptions::default(), ctx)?;
            return Ok(());
        }

        let stmt = SqlCompiler::new(self.conn.dialect().dialect()).update(entity, &values, &key)?;
        tracing::debug!("SQL: {} ({} params)", stmt.sql, stmt.params.len());
        let outcome = self.conn.execute(&stmt.sql, &stmt.params, ctx)?;
        if outcome.rows_affected == 0 {
            return Err(DbError::NotFound(describe(entity, &key)));
        }
        Ok(())
    }

    pub fn delete(&self, entity: &EntityMetadata, key: &EntityKey, ctx: &RequestContext) -> DbResult<()> {
        let key = bind_key(entity, key)?;
        let stmt = SqlCompiler::new(self.conn.dialect().dialect()).delete(entity, &key);
        tracing::debug!("SQL: {} ({} params)", stmt.sql, stmt.params.len());
        let outcome = self.conn.execute(&stmt.sql, &stmt.params, ctx)?;
        if outcome.rows_affected == 0 {
            return Err(DbError::NotFound(describe(entity, &key)));
        }
        Ok(())
    }
}

fn require_body(body: Option<&Value>) -> DbResult<&Map<String, Value>> {
    match body {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(DbError::BadRequest("request body must be a JSON object".to_string())),
        None => Err(DbError::BadRequest("request body is required".to_string())),
    }
}

/// Structural property accepted in a payload
fn writable<'e>(entity: &'e EntityMetadata, name: &str) -> DbResult<&'e PropertyMetadata> {
    if entity.navigation(name).is_some() {
        return Err(DbError::validation(format!(
            "'{}' is a navigation property; deep insert and update are not supported",
            name
        )));
    }
    Ok(entity.require_property(name)?)
}

fn bind_key<'e>(
    entity: &'e EntityMetadata,
    key: &EntityKey,
) -> DbResult<Vec<(&'e PropertyMetadata, SqlValue)>> {
    key.resolve(entity)?
        .into_iter()
        .map(|(property, literal)| Ok((property, SqlValue::from(literal.value()?))))
        .collect()
}

fn same_key(a: &SqlValue, b: &SqlValue) -> bool {
    match (a, b) {
        (SqlValue::Integer(x), SqlValue::Real(y)) | (SqlValue::Real(y), SqlValue::Integer(x)) => {
            *x as f64 == *y
        }
        _ => a == b,
    }
}

/// Canonical entity URL, e.g. `Products(5)` or `Lines(OrderID=1,Line=2)`
pub fn canonical_id(entity: &EntityMetadata, key: &[(&PropertyMetadata, SqlValue)]) -> String {
    let literal = |value: &SqlValue| match value {
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Boolean(b) => b.to_string(),
        SqlValue::Null | SqlValue::Blob(_) => "null".to_string(),
    };
    let parts: Vec<String> = match key {
        [(_, value)] => vec![literal(value)],
        _ => key
            .iter()
            .map(|(p, v)| format!("{}={}", p.name, literal(v)))
            .collect(),
    };
    format!("{}({})", entity.name, parts.join(","))
}

/// [`canonical_id`] from the key properties present in `record`
pub fn entity_id(entity: &EntityMetadata, record: &Record) -> Option<String> {
    let keys = entity.key_properties();
    if keys.is_empty() {
        return None;
    }
    let mut key = Vec::with_capacity(keys.len());
    for property in keys {
        match record.get(&property.name) {
            Some(value) if !value.is_null() => key.push((property, SqlValue::from_record(value))),
            _ => return None,
        }
    }
    Some(canonical_id(entity, &key))
}

fn annotate(id: Option<String>, record: Record) -> Record {
    let Some(id) = id else {
        return record;
    };
    let mut out = Map::new();
    out.insert("@odata.id".to_string(), Value::String(id));
    out.extend(record);
    out
}

fn created(entity: &EntityMetadata, record: Record) -> ServiceResponse {
    let record = annotate(entity_id(entity, &record), record);
    let mut response = ServiceResponse::new(StatusCode::CREATED, None);
    if let Some(Value::String(id)) = record.get("@odata.id") {
        response.headers.push(("Location".to_string(), id.clone()));
    }
    response.body = Some(Value::Object(record));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;
    use crate::test_support::{catalog, seeded};
    use serde_json::json;

    fn run(service: &EntityService<'_>, method: Method, url: &str, body: Option<Value>) -> DbResult<ServiceResponse> {
        service.handle(method, url, body.as_ref(), &RequestContext::new())
    }

    #[test]
    fn test_method_names() {
        assert_eq!("merge".parse::<Method>().unwrap(), Method::Merge);
        assert!("TRACE".parse::<Method>().is_err());
        assert!(Method::Get.is_read());
        assert!(!Method::Patch.is_read());
    }

    #[test]
    fn test_get_collection_and_entity() {
        let registry = catalog();
        let conn = seeded();
        let config = ServiceConfig::default();
        let service = EntityService::new(&conn, &registry, &config);

        let response = run(&service, Method::Get, "/Products?$filter=Active eq false&$select=Name", None).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.unwrap(), json!({ "value": [{ "Name": "Rake" }] }));

        let response = run(&service, Method::Get, "Products(1)?$select=Name&$expand=Category($select=Title)", None).unwrap();
        assert_eq!(
            response.body.unwrap(),
            json!({ "@odata.id": "Products(1)", "Name": "Hammer", "Category": { "Title": "Tools" } })
        );

        let err = run(&service, Method::Get, "Products(42)", None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_to_one_navigation_without_target() {
        let registry = catalog();
        let conn = seeded();
        let config = ServiceConfig::default();
        let service = EntityService::new(&conn, &registry, &config);

        let response = run(&service, Method::Get, "Products(4)/Category", None).unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        let response = run(&service, Method::Get, "Products(1)/Category", None).unwrap();
        assert_eq!(response.body.unwrap()["Title"], "Tools");
    }

    #[test]
    fn test_create_update_delete() {
        let registry = catalog();
        let conn = seeded();
        let config = ServiceConfig::default();
        let service = EntityService::new(&conn, &registry, &config);

        let response = run(&service, Method::Post, "Products", Some(json!({ "Name": "Saw", "Price": 9.5 }))).unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        let body = response.body.unwrap();
        assert_eq!(body["@odata.id"], "Products(5)");
        assert_eq!(body["ID"], 5);
        assert_eq!(body["Active"], true);
        assert_eq!(response.headers, vec![("Location".to_string(), "Products(5)".to_string())]);

        let response = run(&service, Method::Patch, "Products(5)", Some(json!({ "Price": 11 }))).unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        let record = run(&service, Method::Get, "Products(5)", None).unwrap().body.unwrap();
        assert_eq!(record["Price"], 11.0);
        assert_eq!(record["Name"], "Saw");

        let err = run(&service, Method::Put, "Products(5)", Some(json!({ "Price": 1 }))).unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));

        run(&service, Method::Delete, "Products(5)", None).unwrap();
        let err = run(&service, Method::Delete, "Products(5)", None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_payload_validation() {
        let registry = catalog();
        let conn = seeded();
        let config = ServiceConfig::default();
        let service = EntityService::new(&conn, &registry, &config);

        let err = run(&service, Method::Post, "Products", Some(json!({ "Colour": "red" }))).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        let err = run(&service, Method::Post, "Products", Some(json!({ "Category": {} }))).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        let err = run(&service, Method::Patch, "Products(1)", Some(json!({ "ID": 7 }))).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        let err = run(&service, Method::Post, "Products", None).unwrap_err();
        assert_eq!(err.kind(), "BadRequest");
        let err = run(&service, Method::Delete, "Products", None).unwrap_err();
        assert_eq!(err.kind(), "OperationNotSupported");
    }

    #[test]
    fn test_create_related() {
        let registry = catalog();
        let conn = seeded();
        let config = ServiceConfig::default();
        let service = EntityService::new(&conn, &registry, &config);

        let body = run(&service, Method::Post, "Products(4)/Items", Some(json!({ "Sku": "O-1", "Quantity": 1 })))
            .unwrap()
            .body
            .unwrap();
        assert_eq!(body["ProductID"], 4);

        run(&service, Method::Post, "Products(4)/Category", Some(json!({ "Title": "Misc" }))).unwrap();
        let product = run(&service, Method::Get, "Products(4)?$expand=Category", None).unwrap().body.unwrap();
        assert_eq!(product["Category"]["Title"], "Misc");

        run(&service, Method::Post, "Products(3)/Tags", Some(json!({ "Label": "outdoor" }))).unwrap();
        let tags = run(&service, Method::Get, "Products(3)/Tags", None).unwrap().body.unwrap();
        assert_eq!(tags["value"][0]["Label"], "outdoor");
    }

    fn count(conn: &SqliteConnection, table: &str) -> SqlValue {
        conn.query(&format!("SELECT COUNT(*) FROM {}", table), &[], &RequestContext::new())
            .unwrap()
            .remove(0)
            .remove(0)
    }

    #[test]
    fn test_create_related_is_atomic() {
        let registry = catalog();
        let conn = seeded();
        let config = ServiceConfig::default();
        let service = EntityService::new(&conn, &registry, &config);
        let ctx = RequestContext::new();

        conn.execute_batch("DROP TABLE product_tags", &ctx).unwrap();
        let err = run(&service, Method::Post, "Products(3)/Tags", Some(json!({ "Label": "outdoor" }))).unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
        assert_eq!(count(&conn, "tags"), SqlValue::Integer(2));

        conn.execute_batch(
            "CREATE TRIGGER frozen BEFORE UPDATE ON products BEGIN SELECT RAISE(ABORT, 'frozen'); END",
            &ctx,
        )
        .unwrap();
        assert!(run(&service, Method::Post, "Products(4)/Category", Some(json!({ "Title": "Misc" }))).is_err());
        assert_eq!(count(&conn, "categories"), SqlValue::Integer(3));
    }

    #[test]
    fn test_create_related_joins_caller_transaction() {
        let registry = catalog();
        let conn = seeded();
        let config = ServiceConfig::default();
        let service = EntityService::new(&conn, &registry, &config).in_transaction();
        let ctx = RequestContext::new();

        let tx = Transaction::begin(&conn, &ctx).unwrap();
        run(&service, Method::Post, "Products(3)/Tags", Some(json!({ "Label": "outdoor" }))).unwrap();
        tx.rollback();
        assert_eq!(count(&conn, "tags"), SqlValue::Integer(2));
        assert_eq!(count(&conn, "product_tags"), SqlValue::Integer(3));
    }

    #[test]
    fn test_entity_id() {
        let registry = catalog();
        let products = registry.require_entity("Products").unwrap();
        let record = crate::test_support::record(json!({ "ID": 3, "Name": "x" }));
        assert_eq!(entity_id(products, &record).as_deref(), Some("Products(3)"));
        let name = products.property("Name").unwrap();
        let id = products.property("ID").unwrap();
        assert_eq!(
            canonical_id(products, &[(id, SqlValue::Integer(1)), (name, SqlValue::Text("it's".into()))]),
            "Products(ID=1,Name='it''s')"
        );
    }
}
