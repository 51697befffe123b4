use crate::calc::MAX_SUBJECT_MARKS;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn db(code: &'static str, e: anyhow::Error) -> Self {
        Self {
            code,
            message: format!("{e:#}"),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        tracing::warn!(code = self.code, message = %self.message, "request failed");
        err(id, self.code, self.message, self.details)
    }
}

/// Runs `f` against the open workspace connection and wraps the outcome.
pub fn with_db<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => crate::ipc::error::ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

/// Rolls arrive as strings or bare numbers; both key the same student.
pub fn get_roll(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let roll = match params.get("roll") {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(HandlerErr::bad_params("missing roll")),
    };
    if roll.is_empty() {
        return Err(HandlerErr::bad_params("roll must not be empty"));
    }
    Ok(roll)
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

/// Status token as stored: strings verbatim, booleans and numbers by their
/// JSON text. Null or absent is rejected.
pub fn get_status_token(params: &serde_json::Value) -> Result<String, HandlerErr> {
    match params.get("status") {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Bool(b)) => Ok(b.to_string()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HandlerErr::bad_params("missing status")),
    }
}

/// Optional integer that may be sent as a number or a numeric string.
/// Null, absent and empty strings all mean "not supplied".
pub fn get_optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(_) => Err(HandlerErr {
            code: "bad_params",
            message: format!("{} must be an integer", key),
            details: Some(json!({ "key": key })),
        }),
    }
}

pub fn get_optional_u32(params: &serde_json::Value, key: &str) -> Result<Option<u32>, HandlerErr> {
    get_optional_i64(params, key)?
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| HandlerErr::bad_params(format!("{} must not be negative", key)))
        })
        .transpose()
}

pub fn get_optional_i32(params: &serde_json::Value, key: &str) -> Result<Option<i32>, HandlerErr> {
    get_optional_i64(params, key)?
        .map(|v| {
            i32::try_from(v).map_err(|_| HandlerErr::bad_params(format!("{} out of range", key)))
        })
        .transpose()
}

/// Marks are whole numbers out of 100 per subject.
pub fn parse_score(v: &serde_json::Value, subject: &str) -> Result<i64, HandlerErr> {
    match v.as_i64() {
        Some(n) if (0..=MAX_SUBJECT_MARKS).contains(&n) => Ok(n),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: format!("marks must be whole numbers between 0 and {}", MAX_SUBJECT_MARKS),
            details: Some(json!({ "subject": subject, "value": v })),
        }),
    }
}

pub fn load_student(
    conn: &Connection,
    roll: &str,
) -> Result<crate::calc::Student, HandlerErr> {
    crate::db::find_student(conn, roll)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))
}
