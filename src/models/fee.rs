// src/models/fee.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{FeeStatus, PaymentMode};
use crate::fees::{FeeComponents, FeeComponentsInput, Ledger};

// --- 1. 班级收费标准 ---

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStructure {
    pub id: i32,
    pub class_id: i32,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fees: FeeComponents,
    pub total_monthly_fee: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStructureWithClass {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fee_structure: FeeStructure,
    pub class_name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeeStructureSchema {
    #[validate(range(min = 1, message = "Class ID is required"))]
    pub class_id: i32,
    #[serde(flatten)]
    pub fees: FeeComponentsInput,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFeeStructureSchema {
    #[serde(flatten)]
    pub fees: FeeComponentsInput,
}

// --- 2. 月度费用记录 ---

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    pub id: i32,
    pub student_id: i32,
    pub month: String,
    pub year: i32,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fees: FeeComponents,
    pub total_fee: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub status: FeeStatus,
    pub due_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub payment_mode: Option<PaymentMode>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeeRecord {
    pub fn ledger(&self) -> Ledger {
        Ledger {
            components: self.fees,
            amount_paid: self.amount_paid,
            status: self.status,
            payment_date: self.payment_date,
        }
    }
}

/// 费用记录 + 学生/班级信息
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecordDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: FeeRecord,
    pub student_name: String,
    pub roll_number: String,
    pub class_id: i32,
    pub class_name: String,
}

/// GET /fee-records 的过滤条件
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecordFilter {
    pub student_id: Option<i32>,
    pub month: Option<String>,
    pub year: Option<i32>,
    pub status: Option<FeeStatus>,
    pub class_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFeeRecordsSchema {
    #[validate(length(min = 1, message = "Month and year are required"))]
    pub month: String,
    #[validate(range(min = 2000, max = 2100, message = "Year must be between 2000 and 2100"))]
    pub year: i32,
    pub class_id: Option<i32>,
    #[serde(default, deserialize_with = "crate::fees::deserialize_due_date")]
    pub due_date: Option<DateTime<Utc>>,
    pub additional_exam_fee: Option<Decimal>,
    pub additional_other_fee: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub student_id: i32,
    pub student_name: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFeeRecordsResponse {
    pub message: String,
    pub created: usize,
    pub skipped: usize,
    pub records: Vec<FeeRecordDetail>,
    pub skipped_records: Vec<SkippedRecord>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentSchema {
    pub amount_paid: Decimal,
    pub payment_mode: PaymentMode,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddFeesSchema {
    pub exam_fee: Option<Decimal>,
    pub other_fee: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFeeStatusSchema {
    pub status: FeeStatus,
}

#[derive(Debug, Serialize)]
pub struct OverdueSweepResponse {
    pub message: String,
    pub count: u64,
}
