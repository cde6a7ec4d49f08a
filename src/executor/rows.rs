//! Running compiled SELECTs and turning rows into records.

use std::collections::HashSet;

use odataql_core::{EntityMetadata, PropertyMetadata, Record, SelectItem};
use serde_json::{Map, Value};

use crate::connection::SqlConnection;
use crate::context::RequestContext;
use crate::error::DbResult;
use crate::sql::{CompiledQuery, SelectSpec, SqlCompiler, SqlValue, PARENT_KEY_COLUMN};

/// Compile `spec` for the connection's dialect, run it and map every row
pub(crate) fn fetch(conn: &dyn SqlConnection, spec: &SelectSpec<'_>, ctx: &RequestContext) -> DbResult<Vec<Record>> {
    let query = SqlCompiler::new(conn.dialect().dialect()).select(spec)?;
    tracing::debug!("SQL: {} ({} params)", query.sql, query.params.len());
    let rows = conn.query(&query.sql, &query.params, ctx)?;
    Ok(rows
        .into_iter()
        .map(|row| map_row(&query, spec, row))
        .collect())
}

/// `SELECT COUNT(*)` with the same restrictions as `spec`
pub(crate) fn count(conn: &dyn SqlConnection, spec: &SelectSpec<'_>, ctx: &RequestContext) -> DbResult<u64> {
    let stmt = SqlCompiler::new(conn.dialect().dialect()).count(spec)?;
    tracing::debug!("SQL: {} ({} params)", stmt.sql, stmt.params.len());
    let rows = conn.query(&stmt.sql, &stmt.params, ctx)?;
    Ok(match rows.first().and_then(|row| row.first()) {
        Some(SqlValue::Integer(n)) => (*n).max(0) as u64,
        Some(SqlValue::Real(n)) => n.max(0.0) as u64,
        _ => 0,
    })
}

/// Place each cell by its output column; joined columns nest under the
/// navigation name, null when the related key is null
fn map_row(query: &CompiledQuery, spec: &SelectSpec<'_>, row: Vec<SqlValue>) -> Record {
    let mut record = Map::new();
    let mut joined: Vec<(String, Record)> = Vec::new();

    for (column, cell) in query.columns.iter().zip(row) {
        let value = cell.into_json(column.edm_type);
        match &column.join {
            None => {
                record.insert(column.name.clone(), value);
            }
            Some(navigation) => {
                match joined.iter_mut().find(|(name, _)| name == navigation) {
                    Some((_, nested)) => {
                        nested.insert(column.name.clone(), value);
                    }
                    None => {
                        let mut nested = Map::new();
                        nested.insert(column.name.clone(), value);
                        joined.push((navigation.clone(), nested));
                    }
                }
            }
        }
    }

    for join in &spec.joins {
        let name = &join.navigation.name;
        let nested = joined
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| joined.swap_remove(i).1)
            .unwrap_or_default();
        let missing = join
            .target
            .key_properties()
            .iter()
            .all(|key| nested.get(&key.name).map_or(true, Value::is_null));
        let value = if missing { Value::Null } else { Value::Object(nested) };
        record.insert(name.clone(), value);
    }
    record
}

/// Which record fields survive `$select`
#[derive(Debug, Clone)]
pub(crate) struct Projection {
    /// Lowercased names; `None` keeps everything
    names: Option<HashSet<String>>,
}

impl Projection {
    pub fn new(select: &[SelectItem]) -> Self {
        if select.is_empty() || select.iter().any(|s| matches!(s, SelectItem::All)) {
            return Self { names: None };
        }
        let names = select
            .iter()
            .filter_map(|item| match item {
                SelectItem::Property(path) => Some(path.first().to_ascii_lowercase()),
                SelectItem::All => None,
            })
            .collect();
        Self { names: Some(names) }
    }

    /// Columns to read: the selection plus keys and anything in `required`
    pub fn columns<'m>(&self, entity: &'m EntityMetadata, required: &[&str]) -> Vec<&'m PropertyMetadata> {
        let Some(names) = &self.names else {
            return entity.properties.iter().collect();
        };
        entity
            .properties
            .iter()
            .filter(|p| {
                names.contains(&p.name.to_ascii_lowercase())
                    || entity.keys.iter().any(|k| k.eq_ignore_ascii_case(&p.name))
                    || required.iter().any(|r| r.eq_ignore_ascii_case(&p.name))
            })
            .collect()
    }

    /// Drop fields read only for keys or joins; `expanded` navigations stay
    pub fn apply(&self, record: &mut Record, expanded: &[String]) {
        record.remove(PARENT_KEY_COLUMN);
        if let Some(names) = &self.names {
            record.retain(|key, _| {
                names.contains(&key.to_ascii_lowercase()) || expanded.iter().any(|e| e == key)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::JoinedNavigation;
    use crate::test_support::{catalog, seeded};
    use odataql_core::{MetadataProvider, PropertyPath};
    use serde_json::json;

    #[test]
    fn test_projection_columns_keep_keys() {
        let registry = catalog();
        let products = registry.require_entity("Products").unwrap();
        let projection = Projection::new(&[SelectItem::Property(PropertyPath::single("name"))]);
        let names: Vec<&str> = projection
            .columns(products, &["CategoryID"])
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["ID", "Name", "CategoryID"]);

        let mut record = crate::test_support::record(json!({
            "ID": 1, "Name": "Hammer", "CategoryID": 1, "Category": null
        }));
        projection.apply(&mut record, &["Category".to_string()]);
        assert_eq!(Value::Object(record), json!({ "Name": "Hammer", "Category": null }));
    }

    #[test]
    fn test_fetch_maps_types_and_joins() {
        let registry = catalog();
        let products = registry.require_entity("Products").unwrap();
        let categories = registry.require_entity("Categories").unwrap();
        let conn = seeded();

        let mut spec = SelectSpec::new(products);
        spec.properties = vec![
            products.property("ID").unwrap(),
            products.property("Active").unwrap(),
        ];
        spec.joins.push(JoinedNavigation {
            navigation: products.navigation("Category").unwrap(),
            target: categories,
            properties: categories.properties.iter().take(2).collect(),
        });
        spec.top = Some(10);
        let records = fetch(&conn, &spec, &RequestContext::new()).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(
            Value::Object(records[0].clone()),
            json!({ "ID": 1, "Active": true, "Category": { "ID": 1, "Title": "Tools" } })
        );
        assert_eq!(records[3]["Category"], Value::Null);
    }

    #[test]
    fn test_count() {
        let registry = catalog();
        let items = registry.require_entity("Items").unwrap();
        let conn = seeded();
        let spec = SelectSpec::new(items);
        assert_eq!(count(&conn, &spec, &RequestContext::new()).unwrap(), 4);
    }
}
