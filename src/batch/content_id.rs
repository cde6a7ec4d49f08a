//! Content-ID bookkeeping for one batch request.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{DbError, DbResult};

static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(\w+)\}|\$(\w+)").expect("static Content-ID pattern"));

/// Response bodies of earlier operations, keyed by Content-ID
#[derive(Debug, Default)]
pub struct ContentIdMap {
    entries: HashMap<String, Value>,
}

impl ContentIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Record a response body; each id may be written once per batch
    pub fn insert(&mut self, id: &str, body: Value) -> DbResult<()> {
        if self.entries.contains_key(id) {
            return Err(DbError::validation(format!(
                "duplicate Content-ID '{}' in batch",
                id
            )));
        }
        self.entries.insert(id.to_string(), body);
        Ok(())
    }

    /// Forget an id, used when its changeset rolls back
    pub fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace `$id` / `${id}` in the resource path with the identifier of
    /// the referenced response. The query string is left untouched. Unknown
    /// ids and bodies without an identifier stay verbatim.
    pub fn resolve(&self, url: &str) -> String {
        let (path, query) = match url.find('?') {
            Some(at) => url.split_at(at),
            None => (url, ""),
        };
        let path = REFERENCE
            .replace_all(path, |caps: &Captures<'_>| {
                let braced = caps.get(1).is_some();
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match self.entries.get(name).and_then(identifier) {
                    Some(id) => id,
                    None => {
                        if braced || self.entries.contains_key(name) {
                            tracing::warn!("Unresolved Content-ID reference '{}' in {}", &caps[0], url);
                        }
                        caps[0].to_string()
                    }
                }
            });
        format!("{}{}", path, query)
    }
}

/// `ID`, `id`, `Id`, then the key of the trailing `@odata.id` segment
fn identifier(body: &Value) -> Option<String> {
    let object = body.as_object()?;
    for field in ["ID", "id", "Id"] {
        match object.get(field) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            Some(Value::Bool(b)) => return Some(b.to_string()),
            _ => {}
        }
    }

    let odata_id = object.get("@odata.id")?.as_str()?;
    let segment = odata_id.trim_end_matches('/').rsplit('/').next()?;
    match (segment.find('('), segment.ends_with(')')) {
        (Some(open), true) => Some(segment[open + 1..segment.len() - 1].to_string()),
        _ if segment.is_empty() => None,
        _ => Some(segment.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dollar_and_braced_references() {
        let mut ids = ContentIdMap::new();
        ids.insert("1", json!({ "ID": 123, "Name": "x" })).unwrap();
        assert_eq!(ids.resolve("/Products($1)/Items"), "/Products(123)/Items");
        assert_eq!(ids.resolve("Products(${1})"), "Products(123)");
    }

    #[test]
    fn test_identifier_field_order() {
        assert_eq!(identifier(&json!({ "id": 4, "Id": 5 })), Some("4".into()));
        assert_eq!(identifier(&json!({ "Id": "abc" })), Some("abc".into()));
        assert_eq!(
            identifier(&json!({ "@odata.id": "http://host/svc/Products(77)" })),
            Some("77".into())
        );
        assert_eq!(identifier(&json!({ "@odata.id": "Products/9" })), Some("9".into()));
        assert_eq!(identifier(&json!({ "Name": "x" })), None);
        assert_eq!(identifier(&json!([1, 2])), None);
    }

    #[test]
    fn test_unresolved_references_stay_verbatim() {
        let mut ids = ContentIdMap::new();
        ids.insert("noid", json!({ "Name": "x" })).unwrap();
        assert_eq!(ids.resolve("Products($2)"), "Products($2)");
        assert_eq!(ids.resolve("Products($noid)"), "Products($noid)");
        assert_eq!(
            ids.resolve("Products?$filter=ID eq 1&$top=2"),
            "Products?$filter=ID eq 1&$top=2"
        );
    }

    #[test]
    fn test_query_options_are_not_references() {
        let mut ids = ContentIdMap::new();
        ids.insert("top", json!({ "ID": 7 })).unwrap();
        ids.insert("1", json!({ "ID": 3 })).unwrap();
        assert_eq!(
            ids.resolve("Customers?$top=2&$orderby=ID"),
            "Customers?$top=2&$orderby=ID"
        );
        assert_eq!(
            ids.resolve("Customers($1)/Orders?$filter=Total gt 1&$top=1"),
            "Customers(3)/Orders?$filter=Total gt 1&$top=1"
        );
    }

    #[test]
    fn test_ids_are_write_once() {
        let mut ids = ContentIdMap::new();
        ids.insert("a", json!({ "ID": 1 })).unwrap();
        assert!(ids.insert("a", json!({ "ID": 2 })).is_err());
        ids.remove("a");
        assert!(ids.is_empty());
        ids.insert("a", json!({ "ID": 2 })).unwrap();
        assert_eq!(ids.resolve("X($a)"), "X(2)");
    }
}
