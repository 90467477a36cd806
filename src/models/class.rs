// src/models/class.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{FeeStructure, Student};

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 班级 + 学生人数
#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub class: Class,
    pub student_count: i64,
}

/// GET /classes/:id 的完整返回
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetail {
    #[serde(flatten)]
    pub class: Class,
    pub students: Vec<Student>,
    pub fee_structure: Option<FeeStructure>,
    pub student_count: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassSchema {
    #[validate(length(min = 1, max = 100, message = "Class name is required"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassSchema {
    #[validate(length(min = 1, max = 100, message = "Class name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}
