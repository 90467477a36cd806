// src/handlers/teachers.rs
use std::collections::HashMap;

use axum::extract::State;
use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;

use super::classes::find_class;
use crate::auth::{hash_password, AuthUser};
use crate::models::{
    AssignClassSchema, AssignmentCreated, ClassAssignment, ClassTeacher, CreateTeacherSchema,
    MessageResponse, MyClass, Student, Teacher, TeacherDetail, TeacherWithAccount, UpdateTeacherSchema,
    User,
};
use crate::response::{ok, ApiResult, Created};
use crate::validation::{PathParams, ValidatedJson};
use crate::{AppError, AppState};

const WITH_ACCOUNT: &str = "SELECT t.*, u.email AS account_email, u.name AS account_name,
            u.role AS account_role, u.is_active AS account_is_active
     FROM teachers t
     JOIN users u ON u.id = t.user_id";

const ASSIGNMENTS: &str = "SELECT ct.*, c.name AS class_name, c.description AS class_description,
            c.is_active AS class_is_active,
            (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.is_active = TRUE) AS student_count
     FROM class_teachers ct
     JOIN classes c ON c.id = ct.class_id";

async fn find_teacher(db: &PgPool, id: i32) -> Result<TeacherWithAccount, AppError> {
    sqlx::query_as::<_, TeacherWithAccount>(&format!("{} WHERE t.id = $1", WITH_ACCOUNT))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Teacher not found".into()))
}

async fn assignments_of(db: &PgPool, teacher_id: i32) -> Result<Vec<ClassAssignment>, AppError> {
    let rows = sqlx::query_as::<_, ClassAssignment>(&format!(
        "{} WHERE ct.teacher_id = $1 ORDER BY c.name ASC",
        ASSIGNMENTS
    ))
    .bind(teacher_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

async fn load_detail(db: &PgPool, id: i32) -> Result<TeacherDetail, AppError> {
    let teacher = find_teacher(db, id).await?;
    let class_teachers = assignments_of(db, id).await?;
    Ok(TeacherDetail {
        teacher,
        class_teachers,
    })
}

async fn employee_id_taken(db: &PgPool, employee_id: &str) -> Result<bool, AppError> {
    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM teachers WHERE employee_id = $1")
        .bind(employee_id)
        .fetch_optional(db)
        .await?;
    Ok(existing.is_some())
}

async fn email_taken(db: &PgPool, email: &str) -> Result<bool, AppError> {
    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(db)
        .await?;
    Ok(existing.is_some())
}

// --- 1. 教师列表, 新入职在前 ---
pub async fn list_teachers(_auth: AuthUser, State(state): State<AppState>) -> ApiResult<Vec<TeacherDetail>> {
    let teachers = sqlx::query_as::<_, TeacherWithAccount>(&format!(
        "{} ORDER BY t.created_at DESC",
        WITH_ACCOUNT
    ))
    .fetch_all(&state.db)
    .await?;

    let assignments = sqlx::query_as::<_, ClassAssignment>(&format!("{} ORDER BY c.name ASC", ASSIGNMENTS))
        .fetch_all(&state.db)
        .await?;
    let mut by_teacher: HashMap<i32, Vec<ClassAssignment>> = HashMap::new();
    for a in assignments {
        by_teacher.entry(a.assignment.teacher_id).or_default().push(a);
    }

    let rows = teachers
        .into_iter()
        .map(|teacher| TeacherDetail {
            class_teachers: by_teacher.remove(&teacher.teacher.id).unwrap_or_default(),
            teacher,
        })
        .collect();
    ok(rows)
}

// --- 2. 新增教师: 账号与档案在同一事务中创建 ---
#[instrument(skip(state, auth, body), fields(email = %body.email))]
pub async fn create_teacher(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateTeacherSchema>,
) -> Result<Created<TeacherDetail>, AppError> {
    auth.require_admin("create teachers")?;

    if email_taken(&state.db, &body.email).await? {
        return Err(AppError::Conflict("Email already exists".into()));
    }
    if employee_id_taken(&state.db, &body.employee_id).await? {
        return Err(AppError::Conflict("Employee ID already exists".into()));
    }

    let password_hash = hash_password(&body.password)?;

    let mut tx = state.db.begin().await?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, name, role)
         VALUES ($1, $2, $3, 'TEACHER')
         RETURNING *",
    )
    .bind(&body.email)
    .bind(password_hash)
    .bind(&body.name)
    .fetch_one(&mut *tx)
    .await?;

    let teacher = sqlx::query_as::<_, Teacher>(
        "INSERT INTO teachers (user_id, employee_id, phone_number, address, qualification, joining_date)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(user.id)
    .bind(&body.employee_id)
    .bind(&body.phone_number)
    .bind(&body.address)
    .bind(&body.qualification)
    .bind(body.joining_date.unwrap_or_else(|| Utc::now().date_naive()))
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, teacher_id = teacher.id, "teacher created");
    Ok(Created(load_detail(&state.db, teacher.id).await?))
}

pub async fn get_teacher(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<TeacherDetail> {
    ok(load_detail(&state.db, id).await?)
}

// --- 3. 更新教师档案与账号信息 ---
#[instrument(skip(state, auth, body))]
pub async fn update_teacher(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<UpdateTeacherSchema>,
) -> ApiResult<TeacherDetail> {
    auth.require_admin("update teachers")?;

    let existing = find_teacher(&state.db, id).await?;

    if let Some(employee_id) = body.employee_id.as_deref() {
        if employee_id != existing.teacher.employee_id && employee_id_taken(&state.db, employee_id).await? {
            return Err(AppError::Conflict("Employee ID already exists".into()));
        }
    }
    if let Some(email) = body.email.as_deref() {
        if email != existing.user.email && email_taken(&state.db, email).await? {
            return Err(AppError::Conflict("Email already exists".into()));
        }
    }

    let mut tx = state.db.begin().await?;
    sqlx::query(
        "UPDATE teachers SET
            employee_id = COALESCE($1, employee_id),
            phone_number = COALESCE($2, phone_number),
            address = COALESCE($3, address),
            qualification = COALESCE($4, qualification),
            joining_date = COALESCE($5, joining_date),
            updated_at = NOW()
         WHERE id = $6",
    )
    .bind(body.employee_id)
    .bind(body.phone_number)
    .bind(body.address)
    .bind(body.qualification)
    .bind(body.joining_date)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE users SET
            name = COALESCE($1, name),
            email = COALESCE($2, email),
            is_active = COALESCE($3, is_active),
            updated_at = NOW()
         WHERE id = $4",
    )
    .bind(body.name)
    .bind(body.email)
    .bind(body.is_active)
    .bind(existing.teacher.user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(teacher_id = id, "teacher updated");
    ok(load_detail(&state.db, id).await?)
}

// --- 4. 停用教师 (账号置为 inactive, 档案保留) ---
#[instrument(skip(state, auth))]
pub async fn deactivate_teacher(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<MessageResponse> {
    auth.require_admin("delete teachers")?;

    let teacher = find_teacher(&state.db, id).await?;
    sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(teacher.teacher.user_id)
        .execute(&state.db)
        .await?;

    tracing::info!(teacher_id = id, "teacher deactivated");
    ok(MessageResponse::new("Teacher deactivated successfully"))
}

// --- 5. 任课关系 ---

#[instrument(skip(state, auth, body), fields(class_id = body.class_id))]
pub async fn assign_class(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<AssignClassSchema>,
) -> Result<Created<AssignmentCreated>, AppError> {
    auth.require_admin("assign classes")?;

    let teacher = find_teacher(&state.db, id).await?;
    let class = find_class(&state.db, body.class_id).await?;

    let existing: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM class_teachers WHERE teacher_id = $1 AND class_id = $2")
            .bind(id)
            .bind(body.class_id)
            .fetch_optional(&state.db)
            .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Teacher is already assigned to this class".into()));
    }

    let assignment = sqlx::query_as::<_, ClassTeacher>(
        "INSERT INTO class_teachers (teacher_id, class_id, subject, is_primary)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(id)
    .bind(body.class_id)
    .bind(&body.subject)
    .bind(body.is_primary.unwrap_or(false))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(teacher_id = id, "class assigned");
    Ok(Created(AssignmentCreated {
        assignment,
        class,
        teacher_name: teacher.user.name,
    }))
}

#[instrument(skip(state, auth))]
pub async fn remove_class(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams((id, class_id)): PathParams<(i32, i32)>,
) -> ApiResult<MessageResponse> {
    auth.require_admin("remove class assignments")?;

    let result = sqlx::query("DELETE FROM class_teachers WHERE teacher_id = $1 AND class_id = $2")
        .bind(id)
        .bind(class_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Class assignment not found".into()));
    }

    tracing::info!(teacher_id = id, class_id, "class assignment removed");
    ok(MessageResponse::new("Class assignment removed successfully"))
}

pub async fn teacher_classes(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<Vec<ClassAssignment>> {
    find_teacher(&state.db, id).await?;
    ok(assignments_of(&state.db, id).await?)
}

/// 当前教师的任课班级及在读学生
pub async fn my_classes(auth: AuthUser, State(state): State<AppState>) -> ApiResult<Vec<MyClass>> {
    let teacher_id = auth.require_teacher("view their classes")?;

    let assignments = assignments_of(&state.db, teacher_id).await?;
    let mut classes = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let students = sqlx::query_as::<_, Student>(
            "SELECT * FROM students WHERE class_id = $1 AND is_active = TRUE ORDER BY roll_number ASC",
        )
        .bind(assignment.assignment.class_id)
        .fetch_all(&state.db)
        .await?;
        classes.push(MyClass { assignment, students });
    }
    ok(classes)
}
