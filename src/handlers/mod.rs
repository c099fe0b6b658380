//! HTTP 处理器模块
//! 成功的写操作统一返回 { "message": ..., "<entity>": ... }

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::services::Committed;

pub mod access;
pub mod account;
pub mod billing_project;
pub mod consistency;
pub mod health;
pub mod history;
pub mod managed_group;
pub mod membership;
pub mod metrics;
pub mod workspace;

pub(crate) fn committed<T: Serialize>(key: &str, result: Committed<T>) -> Json<Value> {
    let mut body = Map::new();
    body.insert("message".to_string(), json!(result.message));
    body.insert(key.to_string(), json!(result.record));
    Json(Value::Object(body))
}

pub(crate) fn created<T: Serialize>(key: &str, result: Committed<T>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, committed(key, result))
}
