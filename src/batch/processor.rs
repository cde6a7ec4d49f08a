use odataql_core::MetadataProvider;
use serde_json::Value;

use super::content_id::ContentIdMap;
use super::model::{
    BatchOperation, BatchPart, BatchRequest, BatchResponse, ChangeSet, ChangeSetResponse,
    OperationResponse, PartResponse,
};
use super::{json, multipart};
use crate::config::ServiceConfig;
use crate::connection::SqlConnection;
use crate::context::RequestContext;
use crate::error::{DbError, DbResult};
use crate::service::{EntityService, ServiceResponse};
use crate::transaction::Transaction;

/// Runs batch requests in order against one connection.
///
/// Standalone operations run outside any transaction. Each changeset runs
/// in its own transaction; the first failing operation rolls it back and
/// the changeset answers with that single error.
pub struct BatchProcessor<'a> {
    conn: &'a dyn SqlConnection,
    service: EntityService<'a>,
    /// Dispatches changeset operations inside the changeset's transaction
    transactional: EntityService<'a>,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        conn: &'a dyn SqlConnection,
        metadata: &'a dyn MetadataProvider,
        config: &'a ServiceConfig,
    ) -> Self {
        Self {
            conn,
            service: EntityService::new(conn, metadata, config),
            transactional: EntityService::new(conn, metadata, config).in_transaction(),
        }
    }

    pub fn process(&self, request: &BatchRequest, ctx: &RequestContext) -> BatchResponse {
        let mut ids = ContentIdMap::new();
        let mut parts = Vec::with_capacity(request.parts.len());
        let mut failed = 0usize;

        for part in &request.parts {
            let response = match part {
                BatchPart::Operation(op) => {
                    let response = self.standalone(op, &mut ids, ctx);
                    if !response.is_success() {
                        failed += 1;
                    }
                    PartResponse::Operation(response)
                }
                BatchPart::ChangeSet(cs) => {
                    let response = self.changeset(cs, &mut ids, ctx);
                    if !response.committed {
                        failed += 1;
                    }
                    PartResponse::ChangeSet(response)
                }
            };
            parts.push(response);
        }

        tracing::info!(
            "Batch processed: {} parts, {} operations, {} failed",
            request.parts.len(),
            request.operation_count(),
            failed
        );
        BatchResponse { parts }
    }

    /// JSON batch in, JSON batch out
    pub fn process_json(&self, payload: &Value, ctx: &RequestContext) -> DbResult<Value> {
        let request = json::parse_request(payload)?;
        Ok(json::write_response(&self.process(&request, ctx)))
    }

    /// Multipart batch in; returns `(content_type, body)`
    pub fn process_multipart(
        &self,
        body: &str,
        content_type: &str,
        ctx: &RequestContext,
    ) -> DbResult<(String, String)> {
        let request = multipart::parse_request(body, content_type)?;
        Ok(multipart::write_response(&self.process(&request, ctx)))
    }

    fn standalone(
        &self,
        op: &BatchOperation,
        ids: &mut ContentIdMap,
        ctx: &RequestContext,
    ) -> OperationResponse {
        let result = self
            .check_content_id(op, ids)
            .and_then(|()| self.dispatch(&self.service, op, ids, ctx))
            .and_then(|response| {
                record(op, &response, ids)?;
                Ok(response)
            });
        match result {
            Ok(response) => OperationResponse::from_service(op, response),
            Err(e) => {
                tracing::debug!("Batch operation {} {} failed: {}", op.method, op.url, e);
                OperationResponse::error(op, &e)
            }
        }
    }

    fn changeset(
        &self,
        cs: &ChangeSet,
        ids: &mut ContentIdMap,
        ctx: &RequestContext,
    ) -> ChangeSetResponse {
        let fail = |op: &BatchOperation, err: &DbError| ChangeSetResponse {
            id: cs.id.clone(),
            committed: false,
            responses: vec![OperationResponse::error(op, err)],
        };

        let Some(first) = cs.operations.first() else {
            return ChangeSetResponse {
                id: cs.id.clone(),
                committed: true,
                responses: Vec::new(),
            };
        };
        if let Some(read) = cs.operations.iter().find(|op| op.method.is_read()) {
            return fail(
                read,
                &DbError::validation(format!(
                    "{} {} is not allowed inside a changeset",
                    read.method, read.url
                )),
            );
        }

        let tx = match Transaction::begin(self.conn, ctx) {
            Ok(tx) => tx,
            Err(e) => return fail(first, &e),
        };

        let mut recorded: Vec<&str> = Vec::new();
        let mut responses = Vec::with_capacity(cs.operations.len());
        for op in &cs.operations {
            let result = self
                .check_content_id(op, ids)
                .and_then(|()| self.dispatch(&self.transactional, op, ids, ctx))
                .and_then(|response| {
                    record(op, &response, ids)?;
                    Ok(response)
                });
            match result {
                Ok(response) => {
                    if let Some(id) = op.content_id.as_deref() {
                        recorded.push(id);
                    }
                    responses.push(OperationResponse::from_service(op, response));
                }
                Err(e) => {
                    tracing::warn!(
                        "Changeset rolled back at {} {}: {}",
                        op.method,
                        op.url,
                        e
                    );
                    tx.rollback();
                    discard(&recorded, ids);
                    return fail(op, &e);
                }
            }
        }

        if let Err(e) = tx.commit(ctx) {
            tracing::warn!("Changeset commit failed: {}", e);
            discard(&recorded, ids);
            return fail(first, &e);
        }

        ChangeSetResponse {
            id: cs.id.clone(),
            committed: true,
            responses,
        }
    }

    fn check_content_id(&self, op: &BatchOperation, ids: &ContentIdMap) -> DbResult<()> {
        match op.content_id.as_deref() {
            Some(id) if ids.contains(id) => Err(DbError::validation(format!(
                "duplicate Content-ID '{}' in batch",
                id
            ))),
            _ => Ok(()),
        }
    }

    fn dispatch(
        &self,
        service: &EntityService<'_>,
        op: &BatchOperation,
        ids: &ContentIdMap,
        ctx: &RequestContext,
    ) -> DbResult<ServiceResponse> {
        let url = ids.resolve(&op.url);
        if url != op.url {
            tracing::debug!("Content-ID reference resolved: {} -> {}", op.url, url);
        }
        service.handle(op.method, &url, op.body.as_ref(), ctx)
    }
}

/// Keep the response body under the operation's Content-ID
fn record(op: &BatchOperation, response: &ServiceResponse, ids: &mut ContentIdMap) -> DbResult<()> {
    match op.content_id.as_deref() {
        Some(id) => ids.insert(id, response.body.clone().unwrap_or(Value::Null)),
        None => Ok(()),
    }
}

fn discard(recorded: &[&str], ids: &mut ContentIdMap) {
    for id in recorded {
        ids.remove(id);
    }
}
