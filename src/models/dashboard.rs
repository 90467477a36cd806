// src/models/dashboard.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{FeeRecordDetail, FeeStatus, PaymentMode};

/// 汇总计算所需的费用记录字段
#[derive(Debug, Clone, FromRow)]
pub struct FeeRollupRow {
    pub month: String,
    pub total_fee: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: FeeStatus,
    pub payment_mode: Option<PaymentMode>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct StatusBreakdown {
    pub paid: i64,
    pub pending: i64,
    pub overdue: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeTotals {
    pub total_collected: Decimal,
    pub total_expected: Decimal,
    pub pending_fees: Decimal,
    pub overdue_fees: Decimal,
    pub payment_status_breakdown: StatusBreakdown,
    pub collection_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: i64,
    #[serde(flatten)]
    pub totals: FeeTotals,
    pub recent_overdue: Vec<FeeRecordDetail>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrendPoint {
    pub month: &'static str,
    pub expected: Decimal,
    pub collected: Decimal,
    pub pending: Decimal,
    pub overdue: Decimal,
    pub collection_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrend {
    pub year: i32,
    pub monthly_data: Vec<MonthlyTrendPoint>,
}

/// 每个在用班级的收费情况 (原始行)
#[derive(Debug, Clone, FromRow)]
pub struct ClassRollupRow {
    pub class_id: i32,
    pub class_name: String,
    pub total_students: i64,
    pub monthly_fee: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassWiseStats {
    pub class_name: String,
    pub total_students: i64,
    pub total_collected: Decimal,
    pub total_expected: Decimal,
    pub total_pending: Decimal,
    pub monthly_fee: Decimal,
}

/// 班级维度汇总时用到的费用记录
#[derive(Debug, Clone, FromRow)]
pub struct ClassFeeRow {
    pub class_id: i32,
    pub total_fee: Decimal,
    pub amount_paid: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentModeStats {
    pub mode: PaymentMode,
    pub count: i64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentModeSummary {
    pub total_transactions: i64,
    pub total_amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentModeReport {
    pub month: Option<String>,
    pub year: Option<i32>,
    pub payment_mode_data: Vec<PaymentModeStats>,
    pub summary: PaymentModeSummary,
}

/// ?month=&year= 过滤
#[derive(Debug, Default, Deserialize)]
pub struct PeriodFilter {
    pub month: Option<String>,
    pub year: Option<i32>,
}

/// ?year= 过滤, 缺省为当年
#[derive(Debug, Default, Deserialize)]
pub struct YearFilter {
    pub year: Option<i32>,
}
