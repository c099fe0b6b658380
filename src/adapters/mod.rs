//! 工作区适配器
//! 每种工作区类型由一个适配器描述：类型标签、显示名称、附加数据结构

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;
use thiserror::Error;

pub mod registry;

pub use registry::{AdapterRegistry, ScopedRegistration};

use crate::config::AdapterConfig;

/// 默认适配器的类型标签
pub const DEFAULT_WORKSPACE_TYPE: &str = "workspace";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("Adapter type {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Adapter type {0} is not registered")]
    NotRegistered(String),

    #[error("Invalid workspace data for {field}: {message}")]
    InvalidData { field: String, message: String },
}

/// 附加数据字段的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }
}

/// 附加数据中的一个字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

fn invalid(field: &str, message: &str) -> AdapterError {
    AdapterError::InvalidData {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// 工作区类型的描述
pub trait WorkspaceAdapter: Debug + Send + Sync {
    /// 唯一的类型标签
    fn workspace_type(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// 附加数据的字段定义
    fn data_fields(&self) -> &[DataField];

    /// 列表视图展示的列
    fn list_columns(&self) -> Vec<&str> {
        vec!["name", "billing_project", "number_groups"]
    }

    /// 校验附加数据并返回规范化后的对象
    ///
    /// null 视为空对象；不允许出现未声明的字段。
    fn validate_data(&self, data: &Value) -> Result<Value, AdapterError> {
        let object = match data {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(invalid("data", "Workspace data must be an object.")),
        };

        let fields = self.data_fields();
        if let Some(unknown) = object.keys().find(|k| !fields.iter().any(|f| &f.name == *k)) {
            return Err(invalid(unknown, "Unknown field."));
        }

        for field in fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(invalid(&field.name, "This field is required."));
                }
                Some(value) if !value.is_null() && !field.kind.accepts(value) => {
                    return Err(invalid(
                        &field.name,
                        &format!("Expected a {:?} value.", field.kind).to_lowercase(),
                    ));
                }
                _ => {}
            }
        }

        Ok(Value::Object(object))
    }
}

/// 没有附加数据的基础工作区类型
#[derive(Debug, Default)]
pub struct DefaultWorkspaceAdapter;

impl WorkspaceAdapter for DefaultWorkspaceAdapter {
    fn workspace_type(&self) -> &str {
        DEFAULT_WORKSPACE_TYPE
    }

    fn name(&self) -> &str {
        "Workspace"
    }

    fn description(&self) -> &str {
        "Default workspace adapter"
    }

    fn data_fields(&self) -> &[DataField] {
        &[]
    }
}

/// 由配置文件声明的适配器
#[derive(Debug, Clone)]
pub struct ConfiguredAdapter {
    workspace_type: String,
    name: String,
    description: String,
    fields: Vec<DataField>,
}

impl ConfiguredAdapter {
    pub fn new(workspace_type: &str, name: &str, fields: Vec<DataField>) -> Self {
        Self {
            workspace_type: workspace_type.to_string(),
            name: name.to_string(),
            description: String::new(),
            fields,
        }
    }
}

impl From<&AdapterConfig> for ConfiguredAdapter {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            workspace_type: config.workspace_type.clone(),
            name: config.name.clone(),
            description: config.description.clone(),
            fields: config.fields.clone(),
        }
    }
}

impl WorkspaceAdapter for ConfiguredAdapter {
    fn workspace_type(&self) -> &str {
        &self.workspace_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn data_fields(&self) -> &[DataField] {
        &self.fields
    }

    fn list_columns(&self) -> Vec<&str> {
        let mut columns = vec!["name", "billing_project", "number_groups"];
        columns.extend(self.fields.iter().map(|f| f.name.as_str()));
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn study_adapter() -> ConfiguredAdapter {
        ConfiguredAdapter::new(
            "study",
            "Study workspace",
            vec![
                DataField {
                    name: "study_name".to_string(),
                    kind: FieldKind::Text,
                    required: true,
                },
                DataField {
                    name: "consent_code".to_string(),
                    kind: FieldKind::Integer,
                    required: false,
                },
            ],
        )
    }

    #[test]
    fn test_default_adapter_accepts_empty_data() {
        let adapter = DefaultWorkspaceAdapter;
        assert_eq!(adapter.validate_data(&Value::Null).unwrap(), json!({}));
        assert_eq!(adapter.validate_data(&json!({})).unwrap(), json!({}));
        assert!(adapter.validate_data(&json!({"extra": 1})).is_err());
    }

    #[test]
    fn test_required_field() {
        let err = study_adapter().validate_data(&json!({})).unwrap_err();
        assert_eq!(
            err,
            AdapterError::InvalidData {
                field: "study_name".to_string(),
                message: "This field is required.".to_string(),
            }
        );
    }

    #[test]
    fn test_field_kind_mismatch() {
        let err = study_adapter()
            .validate_data(&json!({"study_name": "s", "consent_code": "abc"}))
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidData { field, .. } if field == "consent_code"));
    }

    #[test]
    fn test_valid_data_passes_through() {
        let data = json!({"study_name": "s", "consent_code": 3});
        assert_eq!(study_adapter().validate_data(&data).unwrap(), data);
    }

    #[test]
    fn test_configured_list_columns() {
        let adapter = study_adapter();
        assert!(adapter.list_columns().contains(&"study_name"));
    }
}
