// src/common/response.rs

use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

// Corpo padrão de sucesso: { "success": true, ...dados }
pub fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

pub fn success_with<T: Serialize>(key: &str, value: T) -> Json<Value> {
    Json(json!({ "success": true, key: value }))
}
