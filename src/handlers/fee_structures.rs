// src/handlers/fee_structures.rs
use axum::extract::State;
use sqlx::PgPool;
use tracing::instrument;

use super::classes::find_class;
use crate::auth::AuthUser;
use crate::models::{
    CreateFeeStructureSchema, FeeStructure, FeeStructureWithClass, MessageResponse,
    UpdateFeeStructureSchema,
};
use crate::response::{ok, ApiResult, Created};
use crate::validation::{PathParams, ValidatedJson};
use crate::{AppError, AppState};

const WITH_CLASS: &str = "SELECT fs.*, c.name AS class_name
     FROM fee_structures fs
     JOIN classes c ON c.id = fs.class_id";

async fn find_fee_structure(db: &PgPool, id: i32) -> Result<FeeStructureWithClass, AppError> {
    sqlx::query_as::<_, FeeStructureWithClass>(&format!("{} WHERE fs.id = $1", WITH_CLASS))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Fee structure not found".into()))
}

pub async fn list_fee_structures(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<FeeStructureWithClass>> {
    let rows = sqlx::query_as::<_, FeeStructureWithClass>(&format!("{} ORDER BY fs.class_id ASC", WITH_CLASS))
        .fetch_all(&state.db)
        .await?;
    ok(rows)
}

#[instrument(skip(state, auth, body), fields(class_id = body.class_id))]
pub async fn create_fee_structure(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateFeeStructureSchema>,
) -> Result<Created<FeeStructureWithClass>, AppError> {
    auth.require_admin("create fee structures")?;

    if body.fees.tuition_fee.is_none() {
        return Err(AppError::BadRequest("Class ID and tuition fee are required".into()));
    }
    let fees = body.fees.or_zero();
    fees.ensure_valid()?;

    let class = find_class(&state.db, body.class_id).await?;

    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM fee_structures WHERE class_id = $1")
        .bind(body.class_id)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Fee structure already exists for this class".into()));
    }

    let fee_structure = sqlx::query_as::<_, FeeStructure>(
        "INSERT INTO fee_structures (
            class_id, tuition_fee, lab_fee, library_fee, sports_fee, exam_fee, other_fee, total_monthly_fee
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING *",
    )
    .bind(body.class_id)
    .bind(fees.tuition_fee)
    .bind(fees.lab_fee)
    .bind(fees.library_fee)
    .bind(fees.sports_fee)
    .bind(fees.exam_fee)
    .bind(fees.other_fee)
    .bind(fees.total())
    .fetch_one(&state.db)
    .await?;

    tracing::info!(fee_structure_id = fee_structure.id, total = %fee_structure.total_monthly_fee, "fee structure created");
    Ok(Created(FeeStructureWithClass {
        fee_structure,
        class_name: class.name,
    }))
}

pub async fn get_fee_structure(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<FeeStructureWithClass> {
    ok(find_fee_structure(&state.db, id).await?)
}

/// 未提供的分项沿用原值, 总额重新求和
#[instrument(skip(state, auth, body))]
pub async fn update_fee_structure(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<UpdateFeeStructureSchema>,
) -> ApiResult<FeeStructureWithClass> {
    auth.require_admin("update fee structures")?;

    let existing = find_fee_structure(&state.db, id).await?;
    if body.fees.is_empty() {
        return ok(existing);
    }

    let fees = body.fees.merged_onto(&existing.fee_structure.fees);
    fees.ensure_valid()?;

    let fee_structure = sqlx::query_as::<_, FeeStructure>(
        "UPDATE fee_structures SET
            tuition_fee = $1,
            lab_fee = $2,
            library_fee = $3,
            sports_fee = $4,
            exam_fee = $5,
            other_fee = $6,
            total_monthly_fee = $7,
            updated_at = NOW()
         WHERE id = $8
         RETURNING *",
    )
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

    tracing::info!(fee_structure_id = id, total = %fee_structure.total_monthly_fee, "fee structure updated");
    ok(FeeStructureWithClass {
        fee_structure,
        class_name: existing.class_name,
    })
}

#[instrument(skip(state, auth))]
pub async fn delete_fee_structure(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<MessageResponse> {
    auth.require_admin("delete fee structures")?;

    let result = sqlx::query("DELETE FROM fee_structures WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Fee structure not found".into()));
    }

    tracing::info!(fee_structure_id = id, "fee structure deleted");
    ok(MessageResponse::new("Fee structure deleted successfully"))
}

pub async fn get_fee_structure_by_class(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(class_id): PathParams<i32>,
) -> ApiResult<FeeStructureWithClass> {
    let row = sqlx::query_as::<_, FeeStructureWithClass>(&format!("{} WHERE fs.class_id = $1", WITH_CLASS))
        .bind(class_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Fee structure not found for this class".into()))?;
    ok(row)
}
