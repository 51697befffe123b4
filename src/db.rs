use crate::calc::{AttendanceEntry, Student};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

pub const DB_FILE_NAME: &str = "studentd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            roll TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_marks(
            roll TEXT NOT NULL,
            subject TEXT NOT NULL,
            score INTEGER NOT NULL,
            PRIMARY KEY(roll, subject),
            FOREIGN KEY(roll) REFERENCES students(roll)
        )",
        [],
    )?;

    // status/date are nullable: legacy rows carry no date, and a null status
    // is kept rather than rejected.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_entries(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            roll TEXT NOT NULL,
            status TEXT,
            date TEXT,
            FOREIGN KEY(roll) REFERENCES students(roll)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_entries_roll ON attendance_entries(roll)",
        [],
    )?;
    Ok(())
}

pub fn student_exists(conn: &Connection, roll: &str) -> anyhow::Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM students WHERE roll = ?", [roll], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// Inserts a student together with any marks and attendance it carries.
pub fn insert_student(conn: &Connection, student: &Student) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO students(roll, name, created_at) VALUES(?, ?, datetime('now'))",
        (&student.roll, &student.name),
    )?;
    for (subject, score) in &student.marks {
        tx.execute(
            "INSERT INTO student_marks(roll, subject, score) VALUES(?, ?, ?)",
            (&student.roll, subject, score),
        )?;
    }
    for entry in &student.attendance {
        insert_attendance_row(&tx, &student.roll, entry)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn find_student(conn: &Connection, roll: &str) -> anyhow::Result<Option<Student>> {
    let name: Option<String> = conn
        .query_row("SELECT name FROM students WHERE roll = ?", [roll], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(name) = name else {
        return Ok(None);
    };
    Ok(Some(Student {
        roll: roll.to_string(),
        name,
        marks: load_marks(conn, roll)?,
        attendance: load_attendance(conn, roll)?,
    }))
}

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare("SELECT roll, name FROM students ORDER BY rowid")?;
    let heads = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(heads.len());
    for (roll, name) in heads {
        out.push(Student {
            marks: load_marks(conn, &roll)?,
            attendance: load_attendance(conn, &roll)?,
            roll,
            name,
        });
    }
    Ok(out)
}

fn load_marks(conn: &Connection, roll: &str) -> anyhow::Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare("SELECT subject, score FROM student_marks WHERE roll = ?")?;
    let rows = stmt
        .query_map([roll], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

fn load_attendance(conn: &Connection, roll: &str) -> anyhow::Result<Vec<AttendanceEntry>> {
    let mut stmt =
        conn.prepare("SELECT status, date FROM attendance_entries WHERE roll = ? ORDER BY id")?;
    let rows = stmt
        .query_map([roll], |r| {
            let status: Option<String> = r.get(0)?;
            let date: Option<String> = r.get(1)?;
            Ok(match date {
                Some(date) => AttendanceEntry::Dated { status, date },
                None => AttendanceEntry::Legacy { status },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replaces the whole subject -> score mapping.
pub fn update_marks(
    conn: &Connection,
    roll: &str,
    marks: &BTreeMap<String, i64>,
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM student_marks WHERE roll = ?", [roll])?;
    for (subject, score) in marks {
        tx.execute(
            "INSERT INTO student_marks(roll, subject, score) VALUES(?, ?, ?)",
            (roll, subject, score),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn set_subject_mark(
    conn: &Connection,
    roll: &str,
    subject: &str,
    score: i64,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO student_marks(roll, subject, score)
         VALUES(?, ?, ?)
         ON CONFLICT(roll, subject) DO UPDATE SET
           score = excluded.score",
        (roll, subject, score),
    )?;
    Ok(())
}

pub fn append_attendance(
    conn: &Connection,
    roll: &str,
    entry: &AttendanceEntry,
) -> anyhow::Result<()> {
    insert_attendance_row(conn, roll, entry)
}

fn insert_attendance_row(
    conn: &Connection,
    roll: &str,
    entry: &AttendanceEntry,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO attendance_entries(roll, status, date) VALUES(?, ?, ?)",
        (roll, entry.status(), entry.raw_date()),
    )?;
    Ok(())
}
