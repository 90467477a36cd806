// src/handlers/fee_records.rs
use axum::extract::State;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::classes::find_class;
use crate::auth::AuthUser;
use crate::fees::{self, Ledger};
use crate::models::{
    AddFeesSchema, FeeRecord, FeeRecordDetail, FeeRecordFilter, FeeStatus, GenerateFeeRecordsResponse,
    GenerateFeeRecordsSchema, OverdueSweepResponse, PaymentMode, RecordPaymentSchema, SkippedRecord, StudentWithClass,
    UpdateFeeStatusSchema,
};
use crate::response::{ok, ApiResult, Created};
use crate::validation::{PathParams, QueryParams, ValidatedJson};
use crate::{AppError, AppState};

const DETAIL: &str = "SELECT fr.*, s.name AS student_name, s.roll_number, s.class_id, c.name AS class_name
     FROM fee_records fr
     JOIN students s ON s.id = fr.student_id
     JOIN classes c ON c.id = s.class_id";

/// 月份按日历顺序排序 (月份以英文全称存储)
const MONTH_ORDER: &str = "array_position(ARRAY['January','February','March','April','May','June','July',\
     'August','September','October','November','December']::text[], fr.month)";

async fn find_detail(db: &PgPool, id: i32) -> Result<FeeRecordDetail, AppError> {
    sqlx::query_as::<_, FeeRecordDetail>(&format!("{} WHERE fr.id = $1", DETAIL))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Fee record not found".into()))
}

fn optional_amount(name: &str, value: Option<Decimal>) -> Result<Decimal, AppError> {
    fees::check_amount(name, value.unwrap_or_default())
}

/// 类型化的过滤条件 -> WHERE 子句
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: FeeRecordFilter) -> Result<(), AppError> {
    qb.push(" WHERE TRUE");
    if let Some(student_id) = filter.student_id {
        qb.push(" AND fr.student_id = ").push_bind(student_id);
    }
    if let Some(month) = filter.month.as_deref() {
        let month = fees::parse_month(month)?;
        qb.push(" AND fr.month = ").push_bind(month.name());
    }
    if let Some(year) = filter.year {
        qb.push(" AND fr.year = ").push_bind(year);
    }
    if let Some(status) = filter.status {
        qb.push(" AND fr.status = ").push_bind(status);
    }
    if let Some(class_id) = filter.class_id {
        qb.push(" AND s.class_id = ").push_bind(class_id);
    }
    Ok(())
}

async fn list_by_status(db: &PgPool, status: FeeStatus) -> Result<Vec<FeeRecordDetail>, AppError> {
    let rows = sqlx::query_as::<_, FeeRecordDetail>(&format!(
        "{} WHERE fr.status = $1 ORDER BY fr.due_date ASC",
        DETAIL
    ))
    .bind(status)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

// --- 1. 查询 ---

pub async fn list_fee_records(
    _auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<FeeRecordFilter>,
) -> ApiResult<Vec<FeeRecordDetail>> {
    let mut qb = QueryBuilder::<Postgres>::new(DETAIL);
    push_filter(&mut qb, filter)?;
    qb.push(format!(" ORDER BY fr.year DESC, {} DESC, fr.student_id ASC", MONTH_ORDER));

    let rows = qb
        .build_query_as::<FeeRecordDetail>()
        .fetch_all(&state.db)
        .await?;
    ok(rows)
}

pub async fn get_fee_record(
    _auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
) -> ApiResult<FeeRecordDetail> {
    ok(find_detail(&state.db, id).await?)
}

pub async fn list_overdue(_auth: AuthUser, State(state): State<AppState>) -> ApiResult<Vec<FeeRecordDetail>> {
    ok(list_by_status(&state.db, FeeStatus::Overdue).await?)
}

pub async fn list_pending(_auth: AuthUser, State(state): State<AppState>) -> ApiResult<Vec<FeeRecordDetail>> {
    ok(list_by_status(&state.db, FeeStatus::Pending).await?)
}

// --- 2. 生成月度账单 ---
// 逐个学生插入, 不包在单个事务里; 已存在的 (学生, 月, 年) 记为跳过
#[instrument(skip(state, auth, body), fields(month = %body.month, year = body.year))]
pub async fn generate_fee_records(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<GenerateFeeRecordsSchema>,
) -> Result<Created<GenerateFeeRecordsResponse>, AppError> {
    auth.require_admin("generate fee records")?;

    let month = fees::parse_month(&body.month)?;
    let month_name = month.name();
    let extra_exam = optional_amount("additionalExamFee", body.additional_exam_fee)?;
    let extra_other = optional_amount("additionalOtherFee", body.additional_other_fee)?;
    let due_date = match body.due_date {
        Some(due_date) => due_date,
        None => fees::default_due_date(month, body.year)?,
    };

    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT s.*, c.name AS class_name FROM students s JOIN classes c ON c.id = s.class_id
         WHERE s.is_active = TRUE",
    );
    if let Some(class_id) = body.class_id {
        find_class(&state.db, class_id).await?;
        qb.push(" AND s.class_id = ").push_bind(class_id);
    }
    qb.push(" ORDER BY s.class_id ASC, s.roll_number ASC");
    let students = qb
        .build_query_as::<StudentWithClass>()
        .fetch_all(&state.db)
        .await?;

    if students.is_empty() {
        return Err(AppError::NotFound("No active students found".into()));
    }

    let mut records = Vec::new();
    let mut skipped_records = Vec::new();

    for StudentWithClass { student, class_name } in students {
        let existing: Option<(i32,)> = sqlx::query_as(
            "SELECT id FROM fee_records WHERE student_id = $1 AND month = $2 AND year = $3",
        )
        .bind(student.id)
        .bind(month_name)
        .bind(body.year)
        .fetch_optional(&state.db)
        .await?;
        if existing.is_some() {
            skipped_records.push(SkippedRecord {
                student_id: student.id,
                student_name: student.name,
                reason: "Fee record already exists".into(),
            });
            continue;
        }

        let plan = fees::plan_fee_record(&student.fees, extra_exam, extra_other, due_date)?;
        let inserted = sqlx::query_as::<_, FeeRecord>(
            "INSERT INTO fee_records (
                student_id, month, year, tuition_fee, lab_fee, library_fee, sports_fee, exam_fee,
                other_fee, total_fee, amount_paid, balance, status, due_date
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $12, $13)
             ON CONFLICT (student_id, month, year) DO NOTHING
             RETURNING *",
        )
        .bind(student.id)
        .bind(month_name)
        .bind(body.year)
        .bind(plan.components.tuition_fee)
        .bind(plan.components.lab_fee)
        .bind(plan.components.library_fee)
        .bind(plan.components.sports_fee)
        .bind(plan.components.exam_fee)
        .bind(plan.components.other_fee)
        .bind(plan.total_fee)
        .bind(plan.balance)
        .bind(plan.status)
        .bind(plan.due_date)
        .fetch_optional(&state.db)
        .await?;

        match inserted {
            Some(record) => records.push(FeeRecordDetail {
                record,
                student_name: student.name,
                roll_number: student.roll_number,
                class_id: student.class_id,
                class_name,
            }),
            // 并发生成时被其他请求抢先写入
            None => skipped_records.push(SkippedRecord {
                student_id: student.id,
                student_name: student.name,
                reason: "Fee record already exists".into(),
            }),
        }
    }

    tracing::info!(created = records.len(), skipped = skipped_records.len(), "fee records generated");
    Ok(Created(GenerateFeeRecordsResponse {
        message: format!(
            "Generated {} fee records for {} {}",
            records.len(),
            month_name,
            body.year
        ),
        created: records.len(),
        skipped: skipped_records.len(),
        records,
        skipped_records,
    }))
}

// --- 3. 缴费与追加费用 ---

async fn save_ledger(
    tx: &mut sqlx::PgConnection,
    id: i32,
    ledger: &Ledger,
    payment_mode: Option<PaymentMode>,
    remarks: Option<String>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE fee_records SET
            exam_fee = $1,
            other_fee = $2,
            total_fee = $3,
            amount_paid = $4,
            balance = $5,
            status = $6,
            payment_date = $7,
            payment_mode = COALESCE($8, payment_mode),
            remarks = COALESCE($9, remarks),
            updated_at = NOW()
         WHERE id = $10",
    )
    .bind(ledger.components.exam_fee)
    .bind(ledger.components.other_fee)
    .bind(ledger.total_fee())
    .bind(ledger.amount_paid)
    .bind(ledger.balance())
    .bind(ledger.status)
    .bind(ledger.payment_date)
    .bind(payment_mode)
    .bind(remarks)
    .bind(id)
    .execute(tx)
    .await?;
    Ok(())
}

async fn lock_record(tx: &mut sqlx::PgConnection, id: i32) -> Result<FeeRecord, AppError> {
    sqlx::query_as::<_, FeeRecord>("SELECT * FROM fee_records WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Fee record not found".into()))
}

#[instrument(skip(state, auth, body), fields(amount = %body.amount_paid))]
pub async fn record_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<RecordPaymentSchema>,
) -> ApiResult<FeeRecordDetail> {
    auth.require_admin("record payments")?;

    if body.amount_paid <= Decimal::ZERO {
        return Err(AppError::BadRequest("Amount paid must be greater than zero".into()));
    }

    let mut tx = state.db.begin().await?;
    let record = lock_record(&mut tx, id).await?;

    let mut ledger = record.ledger();
    ledger.record_payment(body.amount_paid, Utc::now())?;
    save_ledger(&mut tx, id, &ledger, Some(body.payment_mode), body.remarks).await?;
    tx.commit().await?;

    tracing::info!(
        fee_record_id = id,
        balance = %ledger.balance(),
        status = ?ledger.status,
        "payment recorded"
    );
    ok(find_detail(&state.db, id).await?)
}

#[instrument(skip(state, auth, body))]
pub async fn add_fees(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<AddFeesSchema>,
) -> ApiResult<FeeRecordDetail> {
    auth.require_admin("add fees")?;

    if body.exam_fee.is_none() && body.other_fee.is_none() {
        return Err(AppError::BadRequest("Exam fee or other fee is required".into()));
    }
    let exam_fee = optional_amount("examFee", body.exam_fee)?;
    let other_fee = optional_amount("otherFee", body.other_fee)?;

    let mut tx = state.db.begin().await?;
    let record = lock_record(&mut tx, id).await?;

    let mut ledger = record.ledger();
    ledger.add_charges(exam_fee, other_fee)?;
    save_ledger(&mut tx, id, &ledger, None, None).await?;
    tx.commit().await?;

    tracing::info!(fee_record_id = id, total = %ledger.total_fee(), "fees added");
    ok(find_detail(&state.db, id).await?)
}

// --- 4. 状态维护 ---

/// 手动改状态: 只改 status 和 paymentDate, 不动金额
#[instrument(skip(state, auth))]
pub async fn update_status(
    auth: AuthUser,
    State(state): State<AppState>,
    PathParams(id): PathParams<i32>,
    ValidatedJson(body): ValidatedJson<UpdateFeeStatusSchema>,
) -> ApiResult<FeeRecordDetail> {
    auth.require_admin("update fee status")?;

    let result = sqlx::query(
        "UPDATE fee_records SET
            status = $1,
            payment_date = CASE WHEN $2 THEN NOW() ELSE NULL END,
            updated_at = NOW()
         WHERE id = $3",
    )
    .bind(body.status)
    .bind(body.status == FeeStatus::Paid)
    .bind(id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Fee record not found".into()));
    }

    tracing::info!(fee_record_id = id, status = ?body.status, "fee status updated");
    ok(find_detail(&state.db, id).await?)
}

/// 过期扫描: Pending 且已过到期日的记录改为 Overdue
#[instrument(skip(state, auth))]
pub async fn mark_overdue(auth: AuthUser, State(state): State<AppState>) -> ApiResult<OverdueSweepResponse> {
    auth.require_admin("update overdue records")?;

    let result = sqlx::query(
        "UPDATE fee_records SET status = 'Overdue', updated_at = NOW()
         WHERE status = 'Pending' AND due_date < NOW()",
    )
    .execute(&state.db)
    .await?;

    let count = result.rows_affected();
    tracing::info!(count, "overdue sweep finished");
    ok(OverdueSweepResponse {
        message: format!("Updated {} records to overdue", count),
        count,
    })
}
