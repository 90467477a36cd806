// src/handlers/classes.rs
use axum::extract::State;
use tracing::instrument;

use crate::auth::AuthUser;
use crate::models::{
    Class, ClassDetail, ClassSummary, CreateClassSchema, FeeStructure, MessageResponse, Student,
    UpdateClassSchema,
};
use crate::response::{ok, ApiResult, Created};
use crate::validation::{PathParams, ValidatedJson};
use crate::{AppError, AppState};

const CLASS_WITH_COUNT: &str = "SELECT c.*, (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
     FROM classes c";

pub(crate) async fn find_class(db: &sqlx::PgPool, id: i32) -> Result<Class, AppError> {
    sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Class not found".into()))
}

async fn name_taken(db: &sqlx::PgPool, name: &str) -> Result<bool, AppError> {
    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM classes WHERE name = $1")
        .bind(name)
        .fetch_optional(db)
        .await?;
    Ok(existing.is_some())
}

// --- 1. 班级列表 (GET /classes) ---
pub async fn list_classes(_auth: AuthUser, State(state): State<AppState>) -> ApiResult<Vec<ClassSummary>> {
    let classes = sqlx::query_as::<_, ClassSummary>(&format!("{} ORDER BY c.name ASC", CLASS_WITH_COUNT))
        .fetch_all(&state.db)
        .await?;
    ok(classes)
}

// --- 2. 创建班级 (POST /classes) ---
#[instrument(skip(state, auth, body), fields(name = %body.name))]
pub async fn create_class(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateClassSchema>,
) -> Result<Created<Class>, AppError> {
    auth.require_admin("create classes")?;

    if name_taken(&state.db, &body.name).await? {
        return Err(AppError::Conflict("Class with this name already exists".into()));
    }

    let class = sqlx::query_as::<_, Class>(
        "INSERT INTO classes (name, description) VALUES ($1, $2) RETURNING *",
    )
    .bind(&body.name)
    .bind(&body.description)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(class_id = class.id, "class created");
    Ok(Created(class))
}

// --- 3. 班级详情 (GET /classes/:id) ---
pub async fn get_class(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<ClassDetail> {
    let class = find_class(&state.db, id).await?;

    let students = sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE class_id = $1 ORDER BY roll_number ASC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let fee_structure = sqlx::query_as::<_, FeeStructure>("SELECT * FROM fee_structures WHERE class_id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;

    let student_count = students.len() as i64;
    ok(ClassDetail {
        class,
        students,
        fee_structure,
        student_count,
    })
}

// --- 4. 更新班级 (PUT /classes/:id) ---
#[instrument(skip(state, auth, body))]
pub async fn update_class(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<UpdateClassSchema>,
) -> ApiResult<Class> {
    auth.require_admin("update classes")?;

    let existing = find_class(&state.db, id).await?;

    if let Some(name) = body.name.as_deref() {
        if name != existing.name && name_taken(&state.db, name).await? {
            return Err(AppError::Conflict("Class with this name already exists".into()));
        }
    }

    let class = sqlx::query_as::<_, Class>(
        "UPDATE classes SET
            name = COALESCE($1, name),
            description = COALESCE($2, description),
            is_active = COALESCE($3, is_active),
            updated_at = NOW()
         WHERE id = $4
         RETURNING *",
    )
    .bind(body.name)
    .bind(body.description)
    .bind(body.is_active)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(class_id = id, "class updated");
    ok(class)
}

// --- 5. 删除班级 (DELETE /classes/:id), 有学生时拒绝 ---
#[instrument(skip(state, auth))]
pub async fn delete_class(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<MessageResponse> {
    auth.require_admin("delete classes")?;

    let class = sqlx::query_as::<_, ClassSummary>(&format!("{} WHERE c.id = $1", CLASS_WITH_COUNT))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Class not found".into()))?;

    if class.student_count > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete class with students. Please transfer students first.".into(),
        ));
    }

    sqlx::query("DELETE FROM classes WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    tracing::info!(class_id = id, "class deleted");
    ok(MessageResponse::new("Class deleted successfully"))
}
