// src/models/teacher.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{Class, Role, Student};

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: i32,
    pub user_id: i32,
    pub employee_id: String,
    pub phone_number: String,
    pub address: Option<String>,
    pub qualification: Option<String>,
    pub joining_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 教师关联的账号信息 (不含密码)
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAccount {
    #[sqlx(rename = "account_email")]
    pub email: String,
    #[sqlx(rename = "account_name")]
    pub name: String,
    #[sqlx(rename = "account_role")]
    pub role: Role,
    #[sqlx(rename = "account_is_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherWithAccount {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub teacher: Teacher,
    #[sqlx(flatten)]
    pub user: TeacherAccount,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDetail {
    #[serde(flatten)]
    pub teacher: TeacherWithAccount,
    pub class_teachers: Vec<ClassAssignment>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTeacher {
    pub id: i32,
    pub teacher_id: i32,
    pub class_id: i32,
    pub subject: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// 任课关系 + 班级信息 + 学生人数
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAssignment {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub assignment: ClassTeacher,
    pub class_name: String,
    pub class_description: Option<String>,
    pub class_is_active: bool,
    pub student_count: i64,
}

/// GET /teachers/my-classes: 任课班级及其在读学生
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyClass {
    #[serde(flatten)]
    pub assignment: ClassAssignment,
    pub students: Vec<Student>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentCreated {
    #[serde(flatten)]
    pub assignment: ClassTeacher,
    pub class: Class,
    pub teacher_name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeacherSchema {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Employee ID is required"))]
    pub employee_id: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone_number: String,
    pub address: Option<String>,
    pub qualification: Option<String>,
    pub joining_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeacherSchema {
    #[validate(length(min = 1, message = "Employee ID cannot be empty"))]
    pub employee_id: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub qualification: Option<String>,
    pub joining_date: Option<NaiveDate>,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "A valid email is required"))]
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignClassSchema {
    #[validate(range(min = 1, message = "Class ID is required"))]
    pub class_id: i32,
    pub subject: Option<String>,
    pub is_primary: Option<bool>,
}
