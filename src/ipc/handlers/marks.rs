use crate::db;
use crate::ipc::helpers::{get_required_str, get_roll, parse_score, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

fn require_student(conn: &Connection, roll: &str) -> Result<(), HandlerErr> {
    let exists =
        db::student_exists(conn, roll).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(())
}

/// Replaces the student's whole subject -> marks mapping.
fn marks_set(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_roll(params)?;
    let Some(raw) = params.get("marks").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing marks"));
    };
    let mut marks = BTreeMap::new();
    for (subject, v) in raw {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(HandlerErr::bad_params("subject must not be empty"));
        }
        marks.insert(subject.to_string(), parse_score(v, subject)?);
    }

    require_student(conn, &roll)?;
    db::update_marks(conn, &roll, &marks).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "table": "student_marks" })),
    })?;
    tracing::info!(roll = %roll, subjects = marks.len(), "marks replaced");
    Ok(json!({ "roll": roll, "marks": marks }))
}

fn marks_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_roll(params)?;
    let subject = get_required_str(params, "subject")?;
    let Some(v) = params.get("marks") else {
        return Err(HandlerErr::bad_params("missing marks"));
    };
    let score = parse_score(v, &subject)?;

    require_student(conn, &roll)?;
    db::set_subject_mark(conn, &roll, &subject, score).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "table": "student_marks" })),
    })?;
    tracing::info!(roll = %roll, subject = %subject, score, "mark updated");
    Ok(json!({ "roll": roll, "subject": subject, "marks": score }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.set" => Some(with_db(state, req, marks_set)),
        "marks.update" => Some(with_db(state, req, marks_update)),
        _ => None,
    }
}
