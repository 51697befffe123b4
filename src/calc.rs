use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const MAX_SUBJECT_MARKS: i64 = 100;

/// Five subjects at 100 points each.
pub const MAX_TOTAL_MARKS: i64 = 5 * MAX_SUBJECT_MARKS;

pub const DEFAULT_SEMESTER_MONTHS: u32 = 6;

const PRESENT_TOKENS: [&str; 5] = ["p", "present", "1", "true", "yes"];
const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Status tokens are free-form; only the present-token set counts as present.
pub fn is_present(status: &str) -> bool {
    let t = status.trim().to_lowercase();
    PRESENT_TOKENS.contains(&t.as_str())
}

fn is_present_opt(status: Option<&str>) -> bool {
    status.map(is_present).unwrap_or(false)
}

/// Lenient date parsing for stored attendance dates.
///
/// Accepts `YYYY-MM-DD`, basic `YYYYMMDD`, ISO date-times (`T` or space
/// separated, optional seconds and fraction, optional `Z` or numeric offset)
/// and RFC 3339 timestamps. The calendar date is taken as written, offsets
/// are not applied. Anything else is `None` and the caller skips the entry.
pub fn parse_entry_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local().date());
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.naive_local().date())
}

pub fn iso_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn is_working_day(d: NaiveDate) -> bool {
    d.weekday().num_days_from_monday() < 5
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceEntry {
    Dated {
        status: Option<String>,
        date: String,
    },
    /// Entries written before dates were tracked.
    Legacy { status: Option<String> },
}

impl AttendanceEntry {
    pub fn status(&self) -> Option<&str> {
        match self {
            AttendanceEntry::Dated { status, .. } | AttendanceEntry::Legacy { status } => {
                status.as_deref()
            }
        }
    }

    pub fn raw_date(&self) -> Option<&str> {
        match self {
            AttendanceEntry::Dated { date, .. } => Some(date.as_str()),
            AttendanceEntry::Legacy { .. } => None,
        }
    }

    pub fn to_record(&self) -> AttendanceRecord {
        AttendanceRecord {
            date: self.raw_date().map(|s| s.to_string()),
            status: self.status().map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

pub fn grade_for_percentage(p: f64) -> Grade {
    if p >= 90.0 {
        Grade::A
    } else if p >= 75.0 {
        Grade::B
    } else if p >= 60.0 {
        Grade::C
    } else {
        Grade::D
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Student {
    pub roll: String,
    pub name: String,
    pub marks: BTreeMap<String, i64>,
    pub attendance: Vec<AttendanceEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverview {
    pub roll: String,
    pub name: String,
    pub marks: BTreeMap<String, i64>,
    pub total: i64,
    pub max_marks: i64,
    pub percentage: f64,
    pub attendance_percentage: f64,
    pub grade: Grade,
    pub attendance: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub day: u32,
    pub date: String,
    pub weekday: &'static str,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub year: i32,
    pub month: u32,
    /// 0 = Monday.
    pub month_start_weekday: u32,
    pub days: Vec<CalendarDay>,
    pub present_days: usize,
    pub total_working_days: usize,
    pub percentage: f64,
    pub records: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSummary {
    pub months: u32,
    pub start: String,
    pub end: String,
    pub present_days: usize,
    pub total_working_days: usize,
    pub percentage: f64,
}

fn ratio_percent(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    (num as f64 / denom as f64) * 100.0
}

impl Student {
    pub fn new(roll: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            roll: roll.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn total_marks(&self) -> i64 {
        self.marks
            .values()
            .fold(0i64, |acc, v| acc.saturating_add(*v))
    }

    pub fn percentage(&self) -> f64 {
        if self.marks.is_empty() {
            return 0.0;
        }
        (self.total_marks() as f64 / MAX_TOTAL_MARKS as f64) * 100.0
    }

    pub fn grade(&self) -> Grade {
        grade_for_percentage(self.percentage())
    }

    pub fn attendance_percentage(&self) -> f64 {
        let mut total = 0usize;
        let mut present = 0usize;
        for status in self.attendance.iter().filter_map(|a| a.status()) {
            total += 1;
            if is_present(status) {
                present += 1;
            }
        }
        ratio_percent(present, total)
    }

    /// Attendance records matching every supplied date component.
    ///
    /// With no filter, legacy entries are included with a null date. Entries
    /// whose date cannot be parsed are skipped.
    pub fn attendance_by(
        &self,
        day: Option<u32>,
        month: Option<u32>,
        year: Option<i32>,
    ) -> Vec<AttendanceRecord> {
        let unfiltered = day.is_none() && month.is_none() && year.is_none();
        let mut out = Vec::new();
        for entry in &self.attendance {
            match entry {
                AttendanceEntry::Dated { status, date } => {
                    let Some(dt) = parse_entry_date(date) else {
                        continue;
                    };
                    if day.is_some_and(|d| dt.day() != d)
                        || month.is_some_and(|m| dt.month() != m)
                        || year.is_some_and(|y| dt.year() != y)
                    {
                        continue;
                    }
                    out.push(AttendanceRecord {
                        date: Some(iso_date(dt)),
                        status: status.clone(),
                    });
                }
                AttendanceEntry::Legacy { status } => {
                    if unfiltered {
                        out.push(AttendanceRecord {
                            date: None,
                            status: status.clone(),
                        });
                    }
                }
            }
        }
        out
    }

    /// Calendar grid for one month. `None` when year/month is not a real month.
    pub fn working_days_in_month(&self, year: i32, month: u32) -> Option<MonthSummary> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let records = self.attendance_by(None, Some(month), Some(year));

        let (days, present_days, total_working_days) = {
            // Later entries for the same date win.
            let mut by_date: HashMap<&str, Option<&str>> = HashMap::new();
            for r in &records {
                if let Some(d) = r.date.as_deref() {
                    by_date.insert(d, r.status.as_deref());
                }
            }

            let mut days = Vec::new();
            let mut present_days = 0usize;
            let mut total_working_days = 0usize;
            for d in first.iter_days().take_while(|d| d.month() == month) {
                let date = iso_date(d);
                let status = by_date.get(date.as_str()).copied().flatten();
                if is_working_day(d) {
                    total_working_days += 1;
                    if is_present_opt(status) {
                        present_days += 1;
                    }
                }
                days.push(CalendarDay {
                    day: d.day(),
                    weekday: WEEKDAY_NAMES[d.weekday().num_days_from_monday() as usize],
                    status: status.map(|s| s.to_string()),
                    date,
                });
            }
            (days, present_days, total_working_days)
        };

        Some(MonthSummary {
            year,
            month,
            month_start_weekday: first.weekday().num_days_from_monday(),
            days,
            present_days,
            total_working_days,
            percentage: ratio_percent(present_days, total_working_days),
            records,
        })
    }

    pub fn semester_attendance_percentage(&self, months: u32) -> f64 {
        self.semester_summary_at(today(), months).percentage
    }

    /// Working-day attendance over `[today - 30*months days, today]`.
    pub fn semester_summary_at(&self, today: NaiveDate, months: u32) -> SemesterSummary {
        let start = today
            .checked_sub_days(Days::new(30 * u64::from(months)))
            .unwrap_or(today);

        let mut by_date: HashMap<NaiveDate, Option<&str>> = HashMap::new();
        for entry in &self.attendance {
            let AttendanceEntry::Dated { status, date } = entry else {
                continue;
            };
            let Some(dt) = parse_entry_date(date) else {
                continue;
            };
            if start <= dt && dt <= today {
                by_date.insert(dt, status.as_deref());
            }
        }

        let mut present_days = 0usize;
        let mut total_working_days = 0usize;
        for d in start.iter_days().take_while(|d| *d <= today) {
            if !is_working_day(d) {
                continue;
            }
            total_working_days += 1;
            if is_present_opt(by_date.get(&d).copied().flatten()) {
                present_days += 1;
            }
        }

        SemesterSummary {
            months,
            start: iso_date(start),
            end: iso_date(today),
            present_days,
            total_working_days,
            percentage: ratio_percent(present_days, total_working_days),
        }
    }

    pub fn overview(&self) -> StudentOverview {
        StudentOverview {
            roll: self.roll.clone(),
            name: self.name.clone(),
            marks: self.marks.clone(),
            total: self.total_marks(),
            max_marks: MAX_TOTAL_MARKS,
            percentage: self.percentage(),
            attendance_percentage: self.attendance_percentage(),
            grade: self.grade(),
            attendance: self.attendance.iter().map(|a| a.to_record()).collect(),
        }
    }
}
