use crate::calc::{self, Student};
use crate::db;
use crate::ipc::helpers::{
    get_optional_i32, get_optional_u32, get_required_str, get_roll, load_student, with_db,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::Datelike;
use rusqlite::Connection;
use serde_json::json;

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_roll(params)?;
    let name = get_required_str(params, "name")?;

    let exists = db::student_exists(conn, &roll)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists {
        return Err(HandlerErr {
            code: "already_exists",
            message: "a student with this roll already exists".to_string(),
            details: Some(json!({ "roll": roll })),
        });
    }

    db::insert_student(conn, &Student::new(roll.clone(), name))
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    tracing::info!(roll = %roll, "student created");
    Ok(json!({ "roll": roll }))
}

fn students_list(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let students = db::list_students(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let overviews: Vec<calc::StudentOverview> = students.iter().map(|s| s.overview()).collect();
    Ok(json!({ "students": overviews }))
}

/// Student detail plus a month calendar; month/year default to the current one.
fn students_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = get_roll(params)?;
    let today = calc::today();
    let month = get_optional_u32(params, "month")?.unwrap_or(today.month());
    let year = get_optional_i32(params, "year")?.unwrap_or(today.year());
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params("month must be between 1 and 12"));
    }

    let student = load_student(conn, &roll)?;
    let Some(period) = student.working_days_in_month(year, month) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "year/month is not a valid calendar month".to_string(),
            details: Some(json!({ "year": year, "month": month })),
        });
    };

    let mut result = serde_json::to_value(student.overview()).map_err(|e| HandlerErr {
        code: "serialize_failed",
        message: e.to_string(),
        details: None,
    })?;
    result["attendancePeriod"] = json!({ "month": month, "year": year });
    result["attendancePeriodSummary"] = json!({
        "presentDays": period.present_days,
        "totalDays": period.total_working_days,
        "percentage": period.percentage,
        "records": period.records,
    });
    result["calendar"] = json!(period.days);
    result["calendarMeta"] = json!({ "monthStartWeekday": period.month_start_weekday });
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_db(state, req, students_create)),
        "students.list" => Some(with_db(state, req, students_list)),
        "students.get" => Some(with_db(state, req, students_get)),
        _ => None,
    }
}
