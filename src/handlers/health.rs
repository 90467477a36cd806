// src/handlers/health.rs
use serde_json::{json, Value};

use crate::response::{ok, ApiResult};

pub async fn health_check() -> ApiResult<Value> {
    ok(json!({ "status": "ok" }))
}
