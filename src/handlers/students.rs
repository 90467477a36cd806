// src/handlers/students.rs
use axum::extract::State;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::classes::find_class;
use crate::auth::AuthUser;
use crate::fees::month_ordinal;
use crate::models::{
    Attendance, CreateStudentSchema, FeeRecord, MessageResponse, Student, StudentDetail,
    StudentFilter, StudentWithClass, UpdateStudentSchema,
};
use crate::response::{ok, ApiResult, Created};
use crate::validation::{PathParams, QueryParams, ValidatedJson};
use crate::{AppError, AppState};

/// 学生详情中附带的最近考勤条数
const RECENT_ATTENDANCE: i64 = 30;

pub(crate) async fn find_student(db: &PgPool, id: i32) -> Result<Student, AppError> {
    sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".into()))
}

async fn roll_number_taken(db: &PgPool, roll_number: &str) -> Result<bool, AppError> {
    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM students WHERE roll_number = $1")
        .bind(roll_number)
        .fetch_optional(db)
        .await?;
    Ok(existing.is_some())
}

/// 把过滤条件翻译成 WHERE 子句
fn push_student_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &StudentFilter) {
    qb.push(" WHERE TRUE");
    if let Some(class_id) = filter.class_id {
        qb.push(" AND s.class_id = ").push_bind(class_id);
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND s.is_active = ").push_bind(is_active);
    }
}

// --- 1. 学生列表 (GET /students?classId=&isActive=) ---
pub async fn list_students(
    _auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<StudentFilter>,
) -> ApiResult<Vec<StudentWithClass>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT s.*, c.name AS class_name FROM students s JOIN classes c ON c.id = s.class_id",
    );
    push_student_filter(&mut qb, &filter);
    qb.push(" ORDER BY s.class_id ASC, s.roll_number ASC");

    let students = qb
        .build_query_as::<StudentWithClass>()
        .fetch_all(&state.db)
        .await?;
    ok(students)
}

// --- 2. 新增学生 (POST /students) ---
#[instrument(skip(state, auth, body), fields(roll_number = %body.roll_number))]
pub async fn create_student(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateStudentSchema>,
) -> Result<Created<StudentWithClass>, AppError> {
    auth.require_admin("create students")?;

    let fees = body.fees.or_zero();
    fees.ensure_valid()?;

    if roll_number_taken(&state.db, &body.roll_number).await? {
        return Err(AppError::Conflict("Roll number already exists".into()));
    }
    let class = find_class(&state.db, body.class_id).await?;

    let student = sqlx::query_as::<_, Student>(
        "INSERT INTO students (
            name, father_name, date_of_birth, class_id, roll_number, phone_number, address,
            admission_date, tuition_fee, lab_fee, library_fee, sports_fee, exam_fee, other_fee,
            total_monthly_fee
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         RETURNING *",
    )
    .bind(&body.name)
    .bind(&body.father_name)
    .bind(body.date_of_birth)
    .bind(body.class_id)
    .bind(&body.roll_number)
    .bind(&body.phone_number)
    .bind(&body.address)
    .bind(body.admission_date.unwrap_or_else(|| Utc::now().date_naive()))
    .bind(fees.tuition_fee)
    .bind(fees.lab_fee)
    .bind(fees.library_fee)
    .bind(fees.sports_fee)
    .bind(fees.exam_fee)
    .bind(fees.other_fee)
    .bind(fees.total())
    .fetch_one(&state.db)
    .await?;

    tracing::info!(student_id = student.id, class_id = class.id, "student created");
    Ok(Created(StudentWithClass {
        student,
        class_name: class.name,
    }))
}

// --- 3. 学生详情 (GET /students/:id) ---
pub async fn get_student(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<StudentDetail> {
    let student = find_student(&state.db, id).await?;
    let class = find_class(&state.db, student.class_id).await?;

    let mut fee_records = sqlx::query_as::<_, FeeRecord>("SELECT * FROM fee_records WHERE student_id = $1")
        .bind(id)
        .fetch_all(&state.db)
        .await?;
    // 月份按自然月排序, 而不是字母序
    fee_records.sort_by(|a, b| {
        b.year
            .cmp(&a.year)
            .then_with(|| month_ordinal(&b.month).cmp(&month_ordinal(&a.month)))
    });

    let attendances = sqlx::query_as::<_, Attendance>(
        "SELECT * FROM attendance WHERE student_id = $1 ORDER BY date DESC LIMIT $2",
    )
    .bind(id)
    .bind(RECENT_ATTENDANCE)
    .fetch_all(&state.db)
    .await?;

    ok(StudentDetail {
        student,
        class,
        fee_records,
        attendances,
    })
}

// --- 4. 更新学生 (PUT /students/:id), 费用总额按合并后的分项重算 ---
#[instrument(skip(state, auth, body))]
pub async fn update_student(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<UpdateStudentSchema>,
) -> ApiResult<StudentWithClass> {
    auth.require_admin("update students")?;

    let existing = find_student(&state.db, id).await?;

    if let Some(roll_number) = body.roll_number.as_deref() {
        if roll_number != existing.roll_number && roll_number_taken(&state.db, roll_number).await? {
            return Err(AppError::Conflict("Roll number already exists".into()));
        }
    }

    let class_id = body.class_id.unwrap_or(existing.class_id);
    let class = find_class(&state.db, class_id).await?;

    let fees = body.fees.merged_onto(&existing.fees);
    fees.ensure_valid()?;

    let student = sqlx::query_as::<_, Student>(
        "UPDATE students SET
            name = COALESCE($1, name),
            father_name = COALESCE($2, father_name),
            date_of_birth = COALESCE($3, date_of_birth),
            class_id = $4,
            roll_number = COALESCE($5, roll_number),
            phone_number = COALESCE($6, phone_number),
            address = COALESCE($7, address),
            admission_date = COALESCE($8, admission_date),
            is_active = COALESCE($9, is_active),
            tuition_fee = $10,
            lab_fee = $11,
            library_fee = $12,
            sports_fee = $13,
            exam_fee = $14,
            other_fee = $15,
            total_monthly_fee = $16,
            updated_at = NOW()
         WHERE id = $17
         RETURNING *",
    )
    .bind(body.name)
    .bind(body.father_name)
    .bind(body.date_of_birth)
    .bind(class_id)
    .bind(body.roll_number)
    .bind(body.phone_number)
    .bind(body.address)
    .bind(body.admission_date)
    .bind(body.is_active)
    .bind(fees.tuition_fee)
    .bind(fees.lab_fee)
    .bind(fees.library_fee)
    .bind(fees.sports_fee)
    .bind(fees.exam_fee)
    .bind(fees.other_fee)
    .bind(fees.total())
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(student_id = id, "student updated");
    ok(StudentWithClass {
        student,
        class_name: class.name,
    })
}

// --- 5. 停用学生 (DELETE /students/:id), 保留历史记录 ---
#[instrument(skip(state, auth))]
pub async fn deactivate_student(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<MessageResponse> {
    auth.require_admin("delete students")?;

    let result = sqlx::query("UPDATE students SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not found".into()));
    }

    tracing::info!(student_id = id, "student deactivated");
    ok(MessageResponse::new("Student deactivated successfully"))
}

// --- 6. 彻底删除 (DELETE /students/:id/permanent), 级联删除费用与考勤 ---
#[instrument(skip(state, auth))]
pub async fn delete_student_permanently(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<MessageResponse> {
    auth.require_admin("permanently delete students")?;

    let result = sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not found".into()));
    }

    tracing::info!(student_id = id, "student permanently deleted");
    ok(MessageResponse::new("Student permanently deleted successfully"))
}
