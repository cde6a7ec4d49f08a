//! OData JSON batch format.
//!
//! Request: `{"requests": [{"id", "method", "url", "headers", "body",
//! "atomicityGroup"}]}`. Adjacent requests sharing an `atomicityGroup` form
//! one changeset.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::model::{
    BatchOperation, BatchPart, BatchRequest, BatchResponse, ChangeSet, OperationResponse,
    PartResponse,
};
use crate::error::{DbError, DbResult};

#[derive(Debug, Deserialize)]
struct JsonBatch {
    requests: Vec<JsonRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRequest {
    #[serde(default)]
    id: Option<String>,
    method: String,
    url: String,
    #[serde(default)]
    headers: Map<String, Value>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    atomicity_group: Option<String>,
}

pub fn parse_request(payload: &Value) -> DbResult<BatchRequest> {
    let batch: JsonBatch = serde_json::from_value(payload.clone())
        .map_err(|e| DbError::BadRequest(format!("invalid JSON batch: {}", e)))?;

    let mut parts: Vec<BatchPart> = Vec::new();
    let mut closed_groups: Vec<String> = Vec::new();

    for request in batch.requests {
        let group = request.atomicity_group.clone();
        let operation = operation(request)?;

        let Some(group) = group else {
            close_open_group(&parts, &mut closed_groups);
            parts.push(BatchPart::Operation(operation));
            continue;
        };

        match parts.last_mut() {
            Some(BatchPart::ChangeSet(cs)) if cs.id.as_deref() == Some(group.as_str()) => {
                cs.operations.push(operation);
            }
            _ => {
                close_open_group(&parts, &mut closed_groups);
                if closed_groups.contains(&group) {
                    return Err(DbError::BadRequest(format!(
                        "requests of atomicityGroup '{}' must be adjacent",
                        group
                    )));
                }
                parts.push(BatchPart::ChangeSet(ChangeSet {
                    id: Some(group),
                    operations: vec![operation],
                }));
            }
        }
    }

    Ok(BatchRequest { parts })
}

fn close_open_group(parts: &[BatchPart], closed: &mut Vec<String>) {
    if let Some(BatchPart::ChangeSet(ChangeSet { id: Some(id), .. })) = parts.last() {
        if !closed.contains(id) {
            closed.push(id.clone());
        }
    }
}

fn operation(request: JsonRequest) -> DbResult<BatchOperation> {
    let headers: Vec<(String, String)> = request
        .headers
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect();

    let content_id = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-id"))
        .map(|(_, value)| value.clone())
        .or_else(|| request.id.clone());

    Ok(BatchOperation {
        method: request.method.parse()?,
        url: request.url,
        headers,
        body: request.body.filter(|b| !b.is_null()),
        content_id,
        request_id: request.id,
    })
}

pub fn write_response(response: &BatchResponse) -> Value {
    let mut out = Vec::new();
    for part in &response.parts {
        match part {
            PartResponse::Operation(op) => out.push(entry(op, None)),
            PartResponse::ChangeSet(cs) => {
                for op in &cs.responses {
                    out.push(entry(op, cs.id.as_deref()));
                }
            }
        }
    }
    serde_json::json!({ "responses": out })
}

fn entry(op: &OperationResponse, group: Option<&str>) -> Value {
    let mut object = Map::new();
    if let Some(id) = op.request_id.as_ref().or(op.content_id.as_ref()) {
        object.insert("id".to_string(), Value::String(id.clone()));
    }
    if let Some(group) = group {
        object.insert("atomicityGroup".to_string(), Value::String(group.to_string()));
    }
    object.insert("status".to_string(), Value::from(op.status.as_u16()));
    if !op.headers.is_empty() {
        let headers: Map<String, Value> = op
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        object.insert("headers".to_string(), Value::Object(headers));
    }
    if let Some(body) = &op.body {
        object.insert("body".to_string(), body.clone());
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::model::ChangeSetResponse;
    use crate::service::Method;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_groups_adjacent_requests_into_changesets() {
        let payload = json!({
            "requests": [
                { "id": "r0", "method": "get", "url": "Products" },
                { "id": "1", "method": "POST", "url": "Products", "atomicityGroup": "g1",
                  "body": { "Name": "Drill" } },
                { "id": "2", "method": "POST", "url": "$1/Tags", "atomicityGroup": "g1",
                  "headers": { "Content-ID": "tag" }, "body": { "Label": "x" } },
                { "id": "r3", "method": "DELETE", "url": "Products(3)" }
            ]
        });
        let request = parse_request(&payload).unwrap();
        assert_eq!(request.parts.len(), 3);
        assert_eq!(request.operation_count(), 4);

        let BatchPart::ChangeSet(cs) = &request.parts[1] else {
            panic!("expected changeset");
        };
        assert_eq!(cs.id.as_deref(), Some("g1"));
        assert_eq!(cs.operations[0].method, Method::Post);
        assert_eq!(cs.operations[0].content_id.as_deref(), Some("1"));
        assert_eq!(cs.operations[1].content_id.as_deref(), Some("tag"));
        assert_eq!(cs.operations[1].request_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_split_atomicity_group_is_rejected() {
        let payload = json!({
            "requests": [
                { "id": "1", "method": "POST", "url": "A", "atomicityGroup": "g" },
                { "id": "2", "method": "GET", "url": "A" },
                { "id": "3", "method": "POST", "url": "A", "atomicityGroup": "g" }
            ]
        });
        assert!(matches!(parse_request(&payload), Err(DbError::BadRequest(_))));
        assert!(parse_request(&json!({ "requests": [{ "method": "TRACE", "url": "A" }] })).is_err());
        assert!(parse_request(&json!({ "ops": [] })).is_err());
    }

    #[test]
    fn test_response_entries_carry_group_and_status() {
        let response = BatchResponse {
            parts: vec![PartResponse::ChangeSet(ChangeSetResponse {
                id: Some("g1".into()),
                committed: true,
                responses: vec![OperationResponse {
                    status: StatusCode::CREATED,
                    headers: vec![("Location".into(), "Products(7)".into())],
                    body: Some(json!({ "ID": 7 })),
                    content_id: Some("1".into()),
                    request_id: Some("1".into()),
                }],
            })],
        };
        let json = write_response(&response);
        assert_eq!(
            json["responses"][0],
            json!({
                "id": "1",
                "atomicityGroup": "g1",
                "status": 201,
                "headers": { "Location": "Products(7)" },
                "body": { "ID": 7 }
            })
        );
    }
}
