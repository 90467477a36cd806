// src/handlers/attendance.rs
use std::collections::{HashMap, HashSet};

use axum::extract::State;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::classes::find_class;
use super::students::find_student;
use crate::attendance::{AcceptedEntry, AttendanceSummary, BulkEntry};
use crate::auth::AuthUser;
use crate::models::{
    Attendance, AttendanceDetail, AttendanceFilter, AttendanceStatus, BulkMarkResponse, BulkMarkSchema,
    ClassAttendanceReport, DailyAttendanceRow, DateRange, MarkAttendanceSchema, MessageResponse, Role,
    Student, StudentAttendanceSummary, StudentRef, StudentReportRow,
};
use crate::response::{ok, ApiResult, Created};
use crate::validation::{PathParams, QueryParams, ValidatedJson};
use crate::{AppError, AppState};

const RECENT_RECORDS: usize = 30;

const DETAIL: &str = "SELECT a.*, s.name AS student_name, s.roll_number, s.class_id,
            c.name AS class_name, u.name AS teacher_name
     FROM attendance a
     JOIN students s ON s.id = a.student_id
     JOIN classes c ON c.id = s.class_id
     JOIN teachers t ON t.id = a.marked_by
     JOIN users u ON u.id = t.user_id";

/// 以 (student_id, date) 为键写入; 已存在时覆盖状态、备注和标记人
async fn upsert(
    db: &PgPool,
    teacher_id: i32,
    date: NaiveDate,
    entry: &AcceptedEntry,
) -> Result<Attendance, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(
        "INSERT INTO attendance (student_id, date, status, marked_by, remarks)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (student_id, date) DO UPDATE SET
            status = EXCLUDED.status,
            remarks = EXCLUDED.remarks,
            marked_by = EXCLUDED.marked_by,
            updated_at = NOW()
         RETURNING *",
    )
    .bind(entry.student_id)
    .bind(date)
    .bind(entry.status)
    .bind(teacher_id)
    .bind(&entry.remarks)
    .fetch_one(db)
    .await
}

async fn find_detail(db: &PgPool, id: i32) -> Result<AttendanceDetail, AppError> {
    sqlx::query_as::<_, AttendanceDetail>(&format!("{} WHERE a.id = $1", DETAIL))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Attendance record not found".into()))
}

fn push_date_range(qb: &mut QueryBuilder<'_, Postgres>, range: &DateRange) {
    if let Some(from) = range.date_from {
        qb.push(" AND a.date >= ").push_bind(from);
    }
    if let Some(to) = range.date_to {
        qb.push(" AND a.date <= ").push_bind(to);
    }
}

// --- 1. 查询 (GET /attendance) ---
pub async fn list_attendance(
    _auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<AttendanceFilter>,
) -> ApiResult<Vec<AttendanceDetail>> {
    let mut qb = QueryBuilder::<Postgres>::new(DETAIL);
    qb.push(" WHERE TRUE");
    if let Some(class_id) = filter.class_id {
        qb.push(" AND s.class_id = ").push_bind(class_id);
    }
    if let Some(student_id) = filter.student_id {
        qb.push(" AND a.student_id = ").push_bind(student_id);
    }
    push_date_range(
        &mut qb,
        &DateRange {
            date_from: filter.date_from,
            date_to: filter.date_to,
        },
    );
    if let Some(status) = filter.status {
        qb.push(" AND a.status = ").push_bind(status);
    }
    qb.push(" ORDER BY a.date DESC, s.roll_number ASC");

    let rows = qb
        .build_query_as::<AttendanceDetail>()
        .fetch_all(&state.db)
        .await?;
    ok(rows)
}

// --- 2. 单条标记 (POST /attendance, /attendance/mark) ---
#[instrument(skip(state, auth, body), fields(student_id = body.student_id, date = %body.date))]
pub async fn mark_attendance(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<MarkAttendanceSchema>,
) -> Result<Created<AttendanceDetail>, AppError> {
    let teacher_id = auth.require_teacher("mark attendance")?;

    let status = body
        .status
        .parse::<AttendanceStatus>()
        .map_err(|_| AppError::BadRequest("Status must be PRESENT or ABSENT".into()))?;
    find_student(&state.db, body.student_id).await?;

    let entry = AcceptedEntry {
        student_id: body.student_id,
        status,
        remarks: body.remarks,
    };
    let attendance = upsert(&state.db, teacher_id, body.date, &entry).await?;

    tracing::info!(attendance_id = attendance.id, ?status, "attendance marked");
    Ok(Created(find_detail(&state.db, attendance.id).await?))
}

// --- 3. 批量标记 (POST /attendance/bulk-mark) ---
// 不合法的条目直接跳过; 单条写入失败只记日志, 不中断整批
#[instrument(skip(state, auth, body), fields(date = %body.date, entries = body.attendance_records.len()))]
pub async fn bulk_mark_attendance(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<BulkMarkSchema>,
) -> ApiResult<BulkMarkResponse> {
    let teacher_id = auth.require_teacher("mark attendance")?;

    // 指定班级时, 只接受该班学生
    let roster: Option<HashSet<i32>> = match body.class_id {
        Some(class_id) => {
            find_class(&state.db, class_id).await?;
            let ids: Vec<(i32,)> = sqlx::query_as("SELECT id FROM students WHERE class_id = $1")
                .bind(class_id)
                .fetch_all(&state.db)
                .await?;
            Some(ids.into_iter().map(|(id,)| id).collect())
        }
        None => None,
    };

    let mut records = Vec::new();
    for raw in body.attendance_records {
        let Some(entry) = BulkEntry::screen(raw) else {
            tracing::debug!("skipping malformed attendance entry");
            continue;
        };
        if roster.as_ref().is_some_and(|ids| !ids.contains(&entry.student_id)) {
            tracing::warn!(student_id = entry.student_id, "student is not in the class, skipped");
            continue;
        }

        match upsert(&state.db, teacher_id, body.date, &entry).await {
            Ok(attendance) => records.push(attendance),
            Err(e) => {
                tracing::error!(student_id = entry.student_id, "failed to mark attendance: {}", e);
            }
        }
    }

    let count = records.len();
    tracing::info!(count, "bulk attendance marked");
    ok(BulkMarkResponse {
        message: format!("Successfully marked attendance for {} students", count),
        count,
        records,
    })
}

// --- 4. 删除 (DELETE /attendance/:id), 教师只能删除自己标记的记录 ---
#[instrument(skip(state, auth))]
pub async fn delete_attendance(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<MessageResponse> {
    auth.require_any(
        &[Role::Admin, Role::Teacher],
        "Only teachers and admins can delete attendance records",
    )?;

    let attendance = sqlx::query_as::<_, Attendance>("SELECT * FROM attendance WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Attendance record not found".into()))?;

    if auth.role == Role::Teacher && auth.teacher_id != Some(attendance.marked_by) {
        return Err(AppError::Forbidden(
            "You can only delete attendance records you marked".into(),
        ));
    }

    sqlx::query("DELETE FROM attendance WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    tracing::info!(attendance_id = id, "attendance deleted");
    ok(MessageResponse::new("Attendance record deleted successfully"))
}

// --- 5. 班级某日考勤: 每个在读学生一行, 未标记为 null ---
pub async fn class_attendance_for_date(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams((class_id, date)): PathParams<(i32, NaiveDate)>,
) -> ApiResult<Vec<DailyAttendanceRow>> {
    find_class(&state.db, class_id).await?;

    let students = sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE class_id = $1 AND is_active = TRUE ORDER BY roll_number ASC",
    )
    .bind(class_id)
    .fetch_all(&state.db)
    .await?;

    let marked = sqlx::query_as::<_, AttendanceDetail>(&format!(
        "{} WHERE s.class_id = $1 AND a.date = $2",
        DETAIL
    ))
    .bind(class_id)
    .bind(date)
    .fetch_all(&state.db)
    .await?;
    let mut by_student: HashMap<i32, AttendanceDetail> = marked
        .into_iter()
        .map(|a| (a.attendance.student_id, a))
        .collect();

    let rows = students
        .into_iter()
        .map(|student| DailyAttendanceRow {
            attendance: by_student.remove(&student.id),
            student,
        })
        .collect();
    ok(rows)
}

// --- 6. 班级考勤报表 (可选日期区间) ---
pub async fn class_attendance_report(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(class_id): PathParams<i32>,
    QueryParams(range): QueryParams<DateRange>,
) -> ApiResult<ClassAttendanceReport> {
    let class = find_class(&state.db, class_id).await?;

    let students = sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE class_id = $1 AND is_active = TRUE ORDER BY roll_number ASC",
    )
    .bind(class_id)
    .fetch_all(&state.db)
    .await?;

    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT a.student_id, a.status FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE s.class_id = ",
    );
    qb.push_bind(class_id);
    push_date_range(&mut qb, &range);
    let marks: Vec<(i32, AttendanceStatus)> = qb.build_query_as().fetch_all(&state.db).await?;

    let mut by_student: HashMap<i32, Vec<AttendanceStatus>> = HashMap::new();
    for (student_id, status) in marks {
        by_student.entry(student_id).or_default().push(status);
    }

    let report = students
        .into_iter()
        .map(|student| StudentReportRow {
            summary: AttendanceSummary::from_statuses(by_student.remove(&student.id).unwrap_or_default()),
            student: StudentRef {
                id: student.id,
                name: student.name,
                roll_number: student.roll_number,
            },
        })
        .collect();

    ok(ClassAttendanceReport {
        class,
        date_range: range,
        report,
    })
}

// --- 7. 学生考勤汇总 ---
pub async fn student_attendance_summary(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(student_id): PathParams<i32>,
) -> ApiResult<StudentAttendanceSummary> {
    let student = find_student(&state.db, student_id).await?;
    let class = find_class(&state.db, student.class_id).await?;

    let mut records = sqlx::query_as::<_, Attendance>(
        "SELECT * FROM attendance WHERE student_id = $1 ORDER BY date DESC",
    )
    .bind(student_id)
    .fetch_all(&state.db)
    .await?;

    let summary = AttendanceSummary::from_statuses(records.iter().map(|a| a.status));
    records.truncate(RECENT_RECORDS);

    ok(StudentAttendanceSummary {
        student,
        class_name: class.name,
        summary,
        recent_records: records,
    })
}
