// src/handlers/auth.rs
use axum::extract::State;
use sqlx::PgPool;
use tracing::instrument;

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::models::{
    AuthResponse, ChangePasswordSchema, LoginSchema, MessageResponse, RegisterSchema, Teacher, User,
    UserProfile,
};
use crate::response::{ok, ApiResult, Created};
use crate::validation::ValidatedJson;
use crate::{AppError, AppState};

async fn load_teacher_profile(db: &PgPool, user_id: i32) -> Result<Option<Teacher>, AppError> {
    let teacher = sqlx::query_as::<_, Teacher>("SELECT * FROM teachers WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(teacher)
}

// --- 1. 登录 ---
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn login_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginSchema>,
) -> ApiResult<AuthResponse> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".into()));
    }

    let token = state.jwt.issue(&user)?;
    let teacher = load_teacher_profile(&state.db, user.id).await?;
    tracing::info!(user_id = user.id, "user logged in");

    ok(AuthResponse {
        token,
        user: UserProfile::new(user, teacher),
    })
}

// --- 2. 教师注册 (账号 + 教师档案, 同一事务) ---
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterSchema>,
) -> Result<Created<AuthResponse>, AppError> {
    let email_taken: Option<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.db)
        .await?;
    if email_taken.is_some() {
        return Err(AppError::Conflict("User with this email already exists".into()));
    }

    let employee_taken: Option<(i32,)> = sqlx::query_as("SELECT id FROM teachers WHERE employee_id = $1")
        .bind(&payload.employee_id)
        .fetch_optional(&state.db)
        .await?;
    if employee_taken.is_some() {
        return Err(AppError::Conflict("Employee ID already exists".into()));
    }

    let password_hash = hash_password(&payload.password)?;

    let mut tx = state.db.begin().await?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, name, role)
         VALUES ($1, $2, $3, 'TEACHER')
         RETURNING *",
    )
    .bind(&payload.email)
    .bind(password_hash)
    .bind(&payload.name)
    .fetch_one(&mut *tx)
    .await?;

    let teacher = sqlx::query_as::<_, Teacher>(
        "INSERT INTO teachers (user_id, employee_id, phone_number, address, qualification)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(user.id)
    .bind(&payload.employee_id)
    .bind(&payload.phone_number)
    .bind(&payload.address)
    .bind(&payload.qualification)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    let token = state.jwt.issue(&user)?;
    tracing::info!(user_id = user.id, teacher_id = teacher.id, "teacher registered");

    Ok(Created(AuthResponse {
        token,
        user: UserProfile::new(user, Some(teacher)),
    }))
}

// --- 3. 注销 (JWT 无状态, 由客户端丢弃令牌) ---
pub async fn logout_handler() -> ApiResult<MessageResponse> {
    ok(MessageResponse::new("Logged out successfully"))
}

// --- 4. 当前用户资料 ---
#[instrument(skip(state, auth), fields(user_id = auth.id))]
pub async fn profile_handler(auth: AuthUser, State(state): State<AppState>) -> ApiResult<UserProfile> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let teacher = load_teacher_profile(&state.db, user.id).await?;

    ok(UserProfile::new(user, teacher))
}

// --- 5. 修改密码 ---
#[instrument(skip(state, auth, payload), fields(user_id = auth.id))]
pub async fn change_password_handler(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ChangePasswordSchema>,
) -> ApiResult<MessageResponse> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !verify_password(&payload.current_password, &user.password_hash) {
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }

    let password_hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(password_hash)
        .bind(auth.id)
        .execute(&state.db)
        .await?;

    tracing::info!("password changed");
    ok(MessageResponse::new("Password changed successfully"))
}
