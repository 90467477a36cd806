// src/handlers/dashboard.rs
// 只读汇总: 取出原始行后交给 reports 计算
use axum::extract::State;
use chrono::{Datelike, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::auth::AuthUser;
use crate::fees;
use crate::models::{
    ClassFeeRow, ClassRollupRow, ClassWiseStats, DashboardStats, FeeRecordDetail, FeeRollupRow,
    MonthlyTrend, PaymentModeReport, PeriodFilter, YearFilter,
};
use crate::reports;
use crate::response::{ok, ApiResult};
use crate::validation::QueryParams;
use crate::AppState;

const ROLLUP: &str = "SELECT month, total_fee, amount_paid, balance, status, payment_mode FROM fee_records";

const RECENT_OVERDUE: i64 = 10;

pub async fn stats(_auth: AuthUser, State(state): State<AppState>) -> ApiResult<DashboardStats> {
    let (total_students,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM students WHERE is_active = TRUE")
        .fetch_one(&state.db)
        .await?;

    let rows = sqlx::query_as::<_, FeeRollupRow>(ROLLUP)
        .fetch_all(&state.db)
        .await?;

    let recent_overdue = sqlx::query_as::<_, FeeRecordDetail>(
        "SELECT fr.*, s.name AS student_name, s.roll_number, s.class_id, c.name AS class_name
         FROM fee_records fr
         JOIN students s ON s.id = fr.student_id
         JOIN classes c ON c.id = s.class_id
         WHERE fr.status = 'Overdue'
         ORDER BY fr.due_date ASC
         LIMIT $1",
    )
    .bind(RECENT_OVERDUE)
    .fetch_all(&state.db)
    .await?;

    ok(DashboardStats {
        total_students,
        totals: reports::fee_totals(&rows),
        recent_overdue,
    })
}

pub async fn monthly_trend(
    _auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<YearFilter>,
) -> ApiResult<MonthlyTrend> {
    let year = filter.year.unwrap_or_else(|| Utc::now().year());

    let rows = sqlx::query_as::<_, FeeRollupRow>(&format!("{} WHERE year = $1", ROLLUP))
        .bind(year)
        .fetch_all(&state.db)
        .await?;

    ok(MonthlyTrend {
        year,
        monthly_data: reports::monthly_trend(&rows),
    })
}

/// 月份和年份同时给出时才按期间过滤
pub async fn class_wise(
    _auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<PeriodFilter>,
) -> ApiResult<Vec<ClassWiseStats>> {
    let classes = sqlx::query_as::<_, ClassRollupRow>(
        "SELECT c.id AS class_id, c.name AS class_name,
                (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.is_active = TRUE) AS total_students,
                fs.total_monthly_fee AS monthly_fee
         FROM classes c
         LEFT JOIN fee_structures fs ON fs.class_id = c.id
         WHERE c.is_active = TRUE
         ORDER BY c.name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT s.class_id, fr.total_fee, fr.amount_paid
         FROM fee_records fr
         JOIN students s ON s.id = fr.student_id
         WHERE s.is_active = TRUE",
    );
    if let (Some(month), Some(year)) = (filter.month.as_deref(), filter.year) {
        let month = fees::parse_month(month)?;
        qb.push(" AND fr.month = ").push_bind(month.name());
        qb.push(" AND fr.year = ").push_bind(year);
    }
    let fee_rows = qb
        .build_query_as::<ClassFeeRow>()
        .fetch_all(&state.db)
        .await?;

    ok(reports::class_wise(&classes, &fee_rows))
}

pub async fn payment_modes(
    _auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<PeriodFilter>,
) -> ApiResult<PaymentModeReport> {
    let month = filter
        .month
        .as_deref()
        .map(fees::parse_month)
        .transpose()?
        .map(|m| m.name().to_string());

    let mut qb = QueryBuilder::<Postgres>::new(ROLLUP);
    qb.push(" WHERE status = 'Paid' AND payment_mode IS NOT NULL");
    if let Some(month) = month.clone() {
        qb.push(" AND month = ").push_bind(month);
    }
    if let Some(year) = filter.year {
        qb.push(" AND year = ").push_bind(year);
    }
    let rows = qb
        .build_query_as::<FeeRollupRow>()
        .fetch_all(&state.db)
        .await?;

    let (payment_mode_data, summary) = reports::payment_modes(&rows);
    ok(PaymentModeReport {
        month,
        year: filter.year,
        payment_mode_data,
        summary,
    })
}
