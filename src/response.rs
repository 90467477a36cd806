// src/response.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::AppError;

/// 成功返回体: {"data": ...}
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 201 Created + {"data": ...}
#[derive(Debug)]
pub struct Created<T>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(ApiResponse { data: self.0 })).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(ApiResponse { data })
}
