use crate::calc::{self, AttendanceEntry, DEFAULT_SEMESTER_MONTHS};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_optional_i32, get_optional_i64, get_optional_u32, get_roll, get_status_token,
    load_student, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::AttendanceLedger;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

/// Longest semester window accepted, in months.
const MAX_SEMESTER_MONTHS: u32 = 120;

/// Date for a new attendance mark.
///
/// An explicit `date` wins: normalised when it parses, kept verbatim when it
/// does not. Otherwise a complete `day`/`month`/`year` triple is used, falling
/// back to today when any part is missing, unreadable or out of range.
fn resolve_mark_date(params: &serde_json::Value) -> String {
    if let Some(raw) = params.get("date").and_then(|v| v.as_str()) {
        if !raw.is_empty() {
            return match calc::parse_entry_date(raw) {
                Some(d) => calc::iso_date(d),
                None => raw.to_string(),
            };
        }
    }

    calc::iso_date(date_from_parts(params).unwrap_or_else(calc::today))
}

fn date_from_parts(params: &serde_json::Value) -> Option<NaiveDate> {
    let part = |key: &str| get_optional_i64(params, key).ok().flatten();
    let day = u32::try_from(part("day")?).ok()?;
    let month = u32::try_from(part("month")?).ok()?;
    let year = i32::try_from(part("year")?).ok()?;
    if year == 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn attendance_mark(
    conn: &Connection,
    ledger: &mut AttendanceLedger,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_roll(params)?;
    let status = get_status_token(params)?;
    let date = resolve_mark_date(params);

    let exists =
        db::student_exists(conn, &roll).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if !exists {
        return Err(HandlerErr::not_found("student not found"));
    }

    let entry = AttendanceEntry::Dated {
        status: Some(status.clone()),
        date: date.clone(),
    };
    db::append_attendance(conn, &roll, &entry).map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "table": "attendance_entries" })),
    })?;
    let recorded = ledger.record(&roll, &status, Some(&date));
    tracing::info!(roll = %roll, date = %date, "attendance marked");
    Ok(json!({ "entry": recorded }))
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_mark(conn, &mut state.ledger, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

/// Pops the ledger only; the stored attendance list is left as is.
fn handle_attendance_undo(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.ledger.is_empty() {
        tracing::debug!("undo requested with an empty ledger");
    }
    let undone = state.ledger.undo();
    ok(&req.id, json!({ "undone": undone }))
}

fn attendance_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_roll(params)?;
    let day = get_optional_u32(params, "day")?;
    let month = get_optional_u32(params, "month")?;
    let year = get_optional_i32(params, "year")?;

    let student = load_student(conn, &roll)?;
    Ok(json!({
        "roll": roll,
        "attendanceRecords": student.attendance_by(day, month, year),
        "attendancePercentage": student.attendance_percentage(),
    }))
}

fn attendance_semester(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_roll(params)?;
    let months = get_optional_u32(params, "months")?.unwrap_or(DEFAULT_SEMESTER_MONTHS);
    if months > MAX_SEMESTER_MONTHS {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("months must be at most {}", MAX_SEMESTER_MONTHS),
            details: Some(json!({ "months": months })),
        });
    }

    let student = load_student(conn, &roll)?;
    let summary = student.semester_summary_at(calc::today(), months);
    Ok(json!({
        "roll": roll,
        "name": student.name,
        "semesterMonths": months,
        "semesterStart": summary.start,
        "semesterEnd": summary.end,
        "semesterAttendancePercentage": summary.percentage,
        "presentDays": summary.present_days,
        "totalWorkingDays": summary.total_working_days,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.undo" => Some(handle_attendance_undo(state, req)),
        "attendance.list" => Some(with_db(state, req, attendance_list)),
        "attendance.semester" => Some(with_db(state, req, attendance_semester)),
        _ => None,
    }
}
