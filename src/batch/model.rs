use axum::http::StatusCode;
use serde_json::Value;

use crate::error::DbError;
use crate::service::{Method, ServiceResponse};

/// One request inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOperation {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Client token later operations reference as `$id`
    pub content_id: Option<String>,
    /// `id` of a JSON batch request, echoed in its response
    pub request_id: Option<String>,
}

impl BatchOperation {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            content_id: None,
            request_id: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_content_id(mut self, id: impl Into<String>) -> Self {
        self.content_id = Some(id.into());
        self
    }
}

/// Operations that commit or roll back together
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    /// `atomicityGroup` or multipart boundary
    pub id: Option<String>,
    pub operations: Vec<BatchOperation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchPart {
    Operation(BatchOperation),
    ChangeSet(ChangeSet),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchRequest {
    pub parts: Vec<BatchPart>,
}

impl BatchRequest {
    pub fn operation_count(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                BatchPart::Operation(_) => 1,
                BatchPart::ChangeSet(cs) => cs.operations.len(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub content_id: Option<String>,
    pub request_id: Option<String>,
}

impl OperationResponse {
    pub fn from_service(op: &BatchOperation, response: ServiceResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            content_id: op.content_id.clone(),
            request_id: op.request_id.clone(),
        }
    }

    pub fn error(op: &BatchOperation, err: &DbError) -> Self {
        Self::from_service(op, ServiceResponse::error(err))
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Either one response per operation, or a single error when rolled back
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSetResponse {
    pub id: Option<String>,
    pub committed: bool,
    pub responses: Vec<OperationResponse>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartResponse {
    Operation(OperationResponse),
    ChangeSet(ChangeSetResponse),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResponse {
    pub parts: Vec<PartResponse>,
}

impl BatchResponse {
    /// Every operation response in order, changesets flattened
    pub fn responses(&self) -> Vec<&OperationResponse> {
        self.parts
            .iter()
            .flat_map(|part| match part {
                PartResponse::Operation(op) => std::slice::from_ref(op).iter(),
                PartResponse::ChangeSet(cs) => cs.responses.iter(),
            })
            .collect()
    }
}
