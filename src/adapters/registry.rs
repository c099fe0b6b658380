//! 适配器注册表
//! 启动时构建，之后只读；测试中可以临时注册适配器

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{AdapterError, ConfiguredAdapter, DefaultWorkspaceAdapter, WorkspaceAdapter};
use crate::config::AdapterConfig;

/// 类型标签到适配器的映射
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: RwLock<BTreeMap<String, Arc<dyn WorkspaceAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只包含默认适配器
    pub fn with_default() -> Self {
        let registry = Self::new();
        registry
            .adapters
            .write()
            .insert(
                super::DEFAULT_WORKSPACE_TYPE.to_string(),
                Arc::new(DefaultWorkspaceAdapter),
            );
        registry
    }

    /// 默认适配器加上配置中声明的适配器
    pub fn from_config(configs: &[AdapterConfig]) -> Result<Self, AdapterError> {
        let registry = Self::with_default();
        for config in configs {
            registry.register(Arc::new(ConfiguredAdapter::from(config)))?;
        }
        Ok(registry)
    }

    pub fn register(&self, adapter: Arc<dyn WorkspaceAdapter>) -> Result<(), AdapterError> {
        let workspace_type = adapter.workspace_type().to_string();
        let mut adapters = self.adapters.write();
        if adapters.contains_key(&workspace_type) {
            warn!(workspace_type = %workspace_type, "Adapter already registered");
            return Err(AdapterError::AlreadyRegistered(workspace_type));
        }
        info!(workspace_type = %workspace_type, name = %adapter.name(), "Adapter registered");
        adapters.insert(workspace_type, adapter);
        Ok(())
    }

    /// 按类型标签注销
    pub fn unregister(&self, workspace_type: &str) -> Result<(), AdapterError> {
        match self.adapters.write().remove(workspace_type) {
            Some(_) => {
                info!(workspace_type = %workspace_type, "Adapter unregistered");
                Ok(())
            }
            None => Err(AdapterError::NotRegistered(workspace_type.to_string())),
        }
    }

    pub fn get(&self, workspace_type: &str) -> Result<Arc<dyn WorkspaceAdapter>, AdapterError> {
        self.adapters
            .read()
            .get(workspace_type)
            .cloned()
            .ok_or_else(|| AdapterError::NotRegistered(workspace_type.to_string()))
    }

    /// 类型标签 -> 显示名称
    pub fn registered_names(&self) -> BTreeMap<String, String> {
        self.adapters
            .read()
            .iter()
            .map(|(tag, adapter)| (tag.clone(), adapter.name().to_string()))
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn WorkspaceAdapter>> {
        self.adapters.read().values().cloned().collect()
    }

    /// 注册适配器，返回的守卫在 drop 时注销
    pub fn scoped(
        &self,
        adapter: Arc<dyn WorkspaceAdapter>,
    ) -> Result<ScopedRegistration<'_>, AdapterError> {
        let workspace_type = adapter.workspace_type().to_string();
        self.register(adapter)?;
        Ok(ScopedRegistration {
            registry: self,
            workspace_type,
        })
    }
}

/// 作用域内的临时注册
pub struct ScopedRegistration<'a> {
    registry: &'a AdapterRegistry,
    workspace_type: String,
}

impl Drop for ScopedRegistration<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.unregister(&self.workspace_type) {
            warn!(error = %e, "Scoped adapter was already removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DataField, FieldKind, DEFAULT_WORKSPACE_TYPE};

    fn study() -> Arc<dyn WorkspaceAdapter> {
        Arc::new(ConfiguredAdapter::new(
            "study",
            "Study workspace",
            vec![DataField {
                name: "study_name".to_string(),
                kind: FieldKind::Text,
                required: true,
            }],
        ))
    }

    #[test]
    fn test_with_default_registers_workspace_type() {
        let registry = AdapterRegistry::with_default();
        assert!(registry.get(DEFAULT_WORKSPACE_TYPE).is_ok());
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = AdapterRegistry::with_default();
        registry.register(study()).unwrap();

        let err = registry.register(study()).unwrap_err();
        assert_eq!(err, AdapterError::AlreadyRegistered("study".to_string()));
    }

    #[test]
    fn test_unregister_unknown_type() {
        let registry = AdapterRegistry::new();
        assert_eq!(
            registry.unregister("study").unwrap_err(),
            AdapterError::NotRegistered("study".to_string())
        );
        assert!(registry.get("study").is_err());
    }

    #[test]
    fn test_registered_names_are_sorted_by_type() {
        let registry = AdapterRegistry::with_default();
        registry.register(study()).unwrap();

        let names: Vec<_> = registry.registered_names().into_iter().collect();
        assert_eq!(
            names,
            vec![
                ("study".to_string(), "Study workspace".to_string()),
                ("workspace".to_string(), "Workspace".to_string()),
            ]
        );
    }

    #[test]
    fn test_scoped_registration_is_removed_on_drop() {
        let registry = AdapterRegistry::with_default();
        {
            let _guard = registry.scoped(study()).unwrap();
            assert!(registry.get("study").is_ok());
        }
        assert!(registry.get("study").is_err());
        assert!(registry.get(DEFAULT_WORKSPACE_TYPE).is_ok());
    }

    #[test]
    fn test_from_config_rejects_shadowing_default() {
        let configs = vec![AdapterConfig {
            workspace_type: DEFAULT_WORKSPACE_TYPE.to_string(),
            name: "Other".to_string(),
            description: String::new(),
            fields: vec![],
        }];
        assert!(matches!(
            AdapterRegistry::from_config(&configs),
            Err(AdapterError::AlreadyRegistered(_))
        ));
    }
}
