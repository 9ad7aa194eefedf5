pub mod canary;
pub mod compile;
pub mod execute;
pub mod executions;
pub mod health;
pub mod pipelines;
pub mod versions;

use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};
use skein_core::error::SkeinError;

/// Render an error in the stable wire shape.
pub(crate) fn error_response(err: &SkeinError) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = json!({
        "success": false,
        "error": err.kind(),
        "message": err.to_string(),
    });
    if let SkeinError::CompileError(diags) = err {
        body["errors"] = json!(diags);
    }
    (status, Json(body))
}

/// Required string field of a JSON body.
pub(crate) fn require_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, SkeinError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| SkeinError::InvalidInput(format!("missing required field `{field}`")))
}

/// Optional string field, accepting the first present key of `fields`
/// (legacy clients send `dagName` where newer ones send `name`/`ref`).
pub(crate) fn first_str<'a>(body: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields.iter().find_map(|f| body.get(*f).and_then(Value::as_str))
}
