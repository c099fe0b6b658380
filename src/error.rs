//! 统一错误模型
//! 定义所有错误类型和错误响应格式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::adapters::AdapterError;
use crate::remote::RemoteError;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 账户生命周期中对远端组成员关系的同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Removing,
    Adding,
}

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 本地校验失败，未发起任何远端调用
    #[error("Validation error: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// 远端调用失败，消息原样保留
    #[error("AnVIL API Error: {0}")]
    Remote(#[from] RemoteError),

    /// 远端返回成功，但结果与预期状态不一致
    #[error("{0}")]
    RemoteInconsistency(String),

    /// 本地前置条件阻止了操作，未发起任何远端调用
    #[error("{0}")]
    Blocked(String),

    /// 账户停用/启用过程中某个组的远端调用失败，group 为失败的组
    #[error("{}", membership_sync_message(.action, .group, .error))]
    MembershipSync {
        action: SyncAction,
        group: String,
        error: RemoteError,
    },

    /// 存储层约束冲突（唯一性、外键）
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

fn membership_sync_message(action: &SyncAction, group: &str, error: &RemoteError) -> String {
    match action {
        SyncAction::Removing => format!(
            "Error removing account from group {}; manually verify group memberships on AnVIL. (AnVIL API Error: {})",
            group, error.message
        ),
        SyncAction::Adding => format!(
            "Error adding account to group {}; manually verify group memberships on AnVIL. (AnVIL API Error: {})",
            group, error.message
        ),
    }
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Blocked(_) | AppError::Constraint(_) => StatusCode::CONFLICT,
            AppError::Remote(_)
            | AppError::RemoteInconsistency(_)
            | AppError::MembershipSync { .. } => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    // 便捷方法
    pub fn not_found(msg: &str) -> Self {
        AppError::NotFound(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        AppError::Validation {
            field: None,
            message: msg.to_string(),
        }
    }

    pub fn field(field: &str, msg: &str) -> Self {
        AppError::Validation {
            field: Some(field.to_string()),
            message: msg.to_string(),
        }
    }

    pub fn blocked(msg: &str) -> Self {
        AppError::Blocked(msg.to_string())
    }

    pub fn inconsistent(msg: &str) -> Self {
        AppError::RemoteInconsistency(msg.to_string())
    }

    pub fn internal_error(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }

    /// 是否为本地校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }
}

/// 错误响应 DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4().to_string();
        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.user_message(),
                field,
                request_id,
            },
        };

        if status.is_server_error() {
            tracing::error!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Application error"
            );
        } else {
            tracing::warn!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Request rejected"
            );
        }

        (status, Json(error_response)).into_response()
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

/// 取第一个字段错误（按字段名排序，保证结果稳定）
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<(String, String)> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let field = field.to_string();
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("Invalid value for {}.", field));
                (field, message)
            })
            .collect();
        fields.sort();

        match fields.into_iter().next() {
            Some((field, message)) => AppError::Validation {
                field: Some(field),
                message,
            },
            None => AppError::validation("Invalid request."),
        }
    }
}

impl From<AdapterError> for AppError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::NotRegistered(_) => AppError::field(
                "workspace_type",
                "Value ``workspace_type`` is not a registered adapter type.",
            ),
            AdapterError::InvalidData { field, message } => AppError::Validation {
                field: Some(format!("data.{}", field)),
                message,
            },
            AdapterError::AlreadyRegistered(_) => AppError::Config(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::not_found("x").code(), 404);
        assert_eq!(AppError::validation("x").code(), 400);
        assert_eq!(AppError::blocked("x").code(), 409);
        assert_eq!(AppError::inconsistent("x").code(), 502);
        assert_eq!(AppError::Remote(RemoteError::new(500, "boom")).code(), 502);
    }

    #[test]
    fn test_remote_error_is_prefixed() {
        let error = AppError::Remote(RemoteError::new(409, "group already exists"));
        assert_eq!(error.user_message(), "AnVIL API Error: group already exists");
    }

    #[test]
    fn test_user_message_no_sensitive_info() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        let message = error.user_message();
        assert_eq!(message, "Database error occurred");
        assert!(!message.contains("sqlx"));
    }

    #[test]
    fn test_membership_sync_message() {
        let error = AppError::MembershipSync {
            action: SyncAction::Removing,
            group: "my-group".to_string(),
            error: RemoteError::new(500, "other error"),
        };
        let message = error.user_message();
        assert_eq!(
            message,
            "Error removing account from group my-group; manually verify group memberships on AnVIL. (AnVIL API Error: other error)"
        );

        let error = AppError::MembershipSync {
            action: SyncAction::Adding,
            group: "other-group".to_string(),
            error: RemoteError::new(404, "not found"),
        };
        assert_eq!(error.code(), 502);
        assert!(error.user_message().starts_with("Error adding account to group other-group;"));
    }
}
