// src/models/student.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{Attendance, Class, FeeRecord};
use crate::fees::{FeeComponents, FeeComponentsInput};

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i32,
    pub name: String,
    pub father_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub class_id: i32,
    pub roll_number: String,
    pub phone_number: String,
    pub address: Option<String>,
    pub admission_date: NaiveDate,
    pub is_active: bool,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fees: FeeComponents,
    pub total_monthly_fee: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 学生 + 所在班级名称
#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithClass {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub student: Student,
    pub class_name: String,
}

/// GET /students/:id 的完整返回
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetail {
    #[serde(flatten)]
    pub student: Student,
    pub class: Class,
    pub fee_records: Vec<FeeRecord>,
    pub attendances: Vec<Attendance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    pub class_id: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentSchema {
    #[validate(length(min = 1, message = "Student name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Father name is required"))]
    pub father_name: String,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Class ID is required"))]
    pub class_id: i32,
    #[validate(length(min = 1, message = "Roll number is required"))]
    pub roll_number: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone_number: String,
    pub address: Option<String>,
    pub admission_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub fees: FeeComponentsInput,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentSchema {
    #[validate(length(min = 1, message = "Student name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Father name cannot be empty"))]
    pub father_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub class_id: Option<i32>,
    #[validate(length(min = 1, message = "Roll number cannot be empty"))]
    pub roll_number: Option<String>,
    #[validate(length(min = 1, message = "Phone number cannot be empty"))]
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub admission_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub fees: FeeComponentsInput,
}
