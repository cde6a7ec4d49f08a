//! `multipart/mixed` batch format with nested changeset boundaries.

use axum::http::StatusCode;
use serde_json::Value;

use super::model::{
    BatchOperation, BatchPart, BatchRequest, BatchResponse, ChangeSet, OperationResponse,
    PartResponse,
};
use crate::error::{DbError, DbResult};

const CRLF: &str = "\r\n";

/// `boundary` parameter of a `multipart/mixed` content type
pub fn boundary_from_content_type(content_type: &str) -> DbResult<String> {
    let mut params = content_type.split(';').map(str::trim);
    let media = params.next().unwrap_or_default();
    if !media.eq_ignore_ascii_case("multipart/mixed") {
        return Err(DbError::BadRequest(format!(
            "expected multipart/mixed, got '{}'",
            media
        )));
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| DbError::BadRequest("multipart/mixed without boundary".to_string()))
}

pub fn parse_request(body: &str, content_type: &str) -> DbResult<BatchRequest> {
    let boundary = boundary_from_content_type(content_type)?;
    let body = body.replace(CRLF, "\n");

    let mut parts = Vec::new();
    for part in split_parts(&body, &boundary)? {
        let (headers, content) = split_headers(part);
        match nested_boundary(&headers)? {
            Some(changeset) => {
                let mut operations = Vec::new();
                for inner in split_parts(content, &changeset)? {
                    let (inner_headers, inner_content) = split_headers(inner);
                    operations.push(operation(&inner_headers, inner_content)?);
                }
                parts.push(BatchPart::ChangeSet(ChangeSet {
                    id: Some(changeset),
                    operations,
                }));
            }
            None => parts.push(BatchPart::Operation(operation(&headers, content)?)),
        }
    }
    Ok(BatchRequest { parts })
}

/// Bodies between `--boundary` delimiters, up to `--boundary--`
fn split_parts<'b>(body: &'b str, boundary: &str) -> DbResult<Vec<&'b str>> {
    let delimiter = format!("--{}", boundary);
    let missing = || DbError::BadRequest(format!("missing boundary '{}'", boundary));

    let start = body.find(&delimiter).ok_or_else(missing)?;
    let mut rest = &body[start + delimiter.len()..];
    let mut parts = Vec::new();
    loop {
        if rest.starts_with("--") {
            return Ok(parts);
        }
        let end = rest.find(&delimiter).ok_or_else(missing)?;
        parts.push(rest[..end].trim_start_matches([' ', '\t']).trim_start_matches('\n'));
        rest = &rest[end + delimiter.len()..];
    }
}

/// Header block and the content after the first blank line
fn split_headers(text: &str) -> (Vec<(String, String)>, &str) {
    let (head, content) = match text.find("\n\n") {
        Some(i) => (&text[..i], &text[i + 2..]),
        None => (text.trim_end(), ""),
    };
    let headers = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();
    (headers, content)
}

fn header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn nested_boundary(headers: &[(String, String)]) -> DbResult<Option<String>> {
    match header(headers, "Content-Type") {
        Some(ct) if ct.to_ascii_lowercase().starts_with("multipart/mixed") => {
            boundary_from_content_type(ct).map(Some)
        }
        _ => Ok(None),
    }
}

/// `application/http` part: request line, headers, blank line, JSON body
fn operation(part_headers: &[(String, String)], content: &str) -> DbResult<BatchOperation> {
    let content = content.trim_start_matches('\n');
    let (request_line, rest) = content.split_once('\n').unwrap_or((content, ""));
    let mut words = request_line.split_whitespace();
    let (Some(method), Some(url)) = (words.next(), words.next()) else {
        return Err(DbError::BadRequest(format!(
            "invalid request line '{}'",
            request_line
        )));
    };

    let (headers, body) = split_headers(rest);
    let body = body.trim();
    let body = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(body)
                .map_err(|e| DbError::BadRequest(format!("invalid JSON body: {}", e)))?,
        )
    };

    let content_id = header(part_headers, "Content-ID")
        .or_else(|| header(&headers, "Content-ID"))
        .map(str::to_string);

    Ok(BatchOperation {
        method: method.parse()?,
        url: url.to_string(),
        headers,
        body,
        content_id,
        request_id: None,
    })
}

/// Serialize responses; returns `(content_type, body)`
pub fn write_response(response: &BatchResponse) -> (String, String) {
    let boundary = format!("batchresponse_{}", uuid::Uuid::new_v4());
    let mut out = String::new();

    for part in &response.parts {
        out.push_str(&format!("--{}{}", boundary, CRLF));
        match part {
            PartResponse::Operation(op) => write_operation(&mut out, op),
            PartResponse::ChangeSet(cs) if !cs.committed => {
                // A failed changeset answers with one plain error part
                if let Some(op) = cs.responses.first() {
                    write_operation(&mut out, op);
                }
            }
            PartResponse::ChangeSet(cs) => {
                let changeset = format!("changesetresponse_{}", uuid::Uuid::new_v4());
                out.push_str(&format!(
                    "Content-Type: multipart/mixed; boundary={}{}{}",
                    changeset, CRLF, CRLF
                ));
                for op in &cs.responses {
                    out.push_str(&format!("--{}{}", changeset, CRLF));
                    write_operation(&mut out, op);
                }
                out.push_str(&format!("--{}--{}", changeset, CRLF));
            }
        }
    }
    out.push_str(&format!("--{}--{}", boundary, CRLF));

    (format!("multipart/mixed; boundary={}", boundary), out)
}

fn write_operation(out: &mut String, op: &OperationResponse) {
    out.push_str("Content-Type: application/http");
    out.push_str(CRLF);
    out.push_str("Content-Transfer-Encoding: binary");
    out.push_str(CRLF);
    if let Some(id) = &op.content_id {
        out.push_str(&format!("Content-ID: {}{}", id, CRLF));
    }
    out.push_str(CRLF);

    out.push_str(&format!("HTTP/1.1 {}{}", status_line(op.status), CRLF));
    for (name, value) in &op.headers {
        out.push_str(&format!("{}: {}{}", name, value, CRLF));
    }
    match &op.body {
        Some(body) => {
            out.push_str(&format!("Content-Type: application/json{}{}", CRLF, CRLF));
            out.push_str(&body.to_string());
            out.push_str(CRLF);
        }
        None => out.push_str(CRLF),
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
