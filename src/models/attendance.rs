// src/models/attendance.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{AttendanceStatus, Class, DateRange, Student};
use crate::attendance::AttendanceSummary;

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: i32,
    pub student_id: i32,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub marked_by: i32,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 考勤记录 + 学生/班级/标记教师
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attendance: Attendance,
    pub student_name: String,
    pub roll_number: String,
    pub class_id: i32,
    pub class_name: String,
    pub teacher_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceFilter {
    pub class_id: Option<i32>,
    pub student_id: Option<i32>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceSchema {
    #[validate(range(min = 1, message = "Student ID, date, and status are required"))]
    pub student_id: i32,
    pub date: NaiveDate,
    pub status: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkSchema {
    pub class_id: Option<i32>,
    pub date: NaiveDate,
    /// 原始条目, 由 BulkEntry::screen 逐条解析
    pub attendance_records: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct BulkMarkResponse {
    pub message: String,
    pub count: usize,
    pub records: Vec<Attendance>,
}

/// 班级某一天的考勤: 未标记的学生 attendance 为 null
#[derive(Debug, Serialize)]
pub struct DailyAttendanceRow {
    pub student: Student,
    pub attendance: Option<AttendanceDetail>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub id: i32,
    pub name: String,
    pub roll_number: String,
}

#[derive(Debug, Serialize)]
pub struct StudentReportRow {
    pub student: StudentRef,
    pub summary: AttendanceSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAttendanceReport {
    pub class: Class,
    pub date_range: DateRange,
    pub report: Vec<StudentReportRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceSummary {
    pub student: Student,
    pub class_name: String,
    pub summary: AttendanceSummary,
    pub recent_records: Vec<Attendance>,
}
