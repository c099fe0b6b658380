//! 工作区与共享的协调行为

use anvil_console::{
    error::AppError,
    models::{
        access::{GrantAccessRequest, UpdateAccessRequest, NO_ACCESS},
        workspace::{CreateWorkspaceRequest, ImportWorkspaceRequest, WorkspaceListFilters},
        WorkspaceAccessLevel,
    },
    remote::AclEntry,
    repository::Store,
    services::{access_service, workspace_service},
};
use serde_json::json;

mod common;
use common::*;

fn create_request(name: &str, auth_domains: &[&str]) -> CreateWorkspaceRequest {
    CreateWorkspaceRequest {
        billing_project: "bp".to_string(),
        name: name.to_string(),
        authorization_domains: auth_domains.iter().map(|d| d.to_string()).collect(),
        workspace_type: "workspace".to_string(),
        data: json!({}),
    }
}

fn import_request(namespace: &str, name: &str) -> ImportWorkspaceRequest {
    ImportWorkspaceRequest {
        billing_project: namespace.to_string(),
        name: name.to_string(),
        workspace_type: "workspace".to_string(),
        data: json!({}),
    }
}

fn grant(group: &str, access: WorkspaceAccessLevel, can_compute: bool) -> GrantAccessRequest {
    GrantAccessRequest {
        group: group.to_string(),
        access,
        can_compute,
    }
}

// ==================== 创建 ====================

#[tokio::test]
async fn test_create_sends_auth_domains_in_single_call() {
    let h = harness();
    seed_billing_project(h.store.as_ref(), "bp").await;
    seed_group(h.store.as_ref(), "consortium", true).await;
    seed_group(h.store.as_ref(), "study-a", false).await;

    let result = h
        .state
        .workspace_service
        .create(create_request("ws", &["consortium", "study-a"]))
        .await
        .unwrap();

    assert_eq!(result.message, workspace_service::MESSAGE_CREATED);
    assert_eq!(
        h.api.calls(),
        vec![Call::CreateWorkspace {
            namespace: "bp".to_string(),
            name: "ws".to_string(),
            auth_domains: vec!["consortium".to_string(), "study-a".to_string()],
        }]
    );

    let workspace = result.record.workspace;
    assert_eq!(h.store.authorization_domains(workspace.id).await.unwrap().len(), 2);
    let data = h.store.workspace_data(workspace.id).await.unwrap().unwrap();
    assert_eq!(data.workspace_type, "workspace");
}

#[tokio::test]
async fn test_create_validates_adapter_data_before_remote_call() {
    let h = harness();
    seed_billing_project(h.store.as_ref(), "bp").await;

    let mut request = create_request("ws", &[]);
    request.workspace_type = "unknown".to_string();
    let err = h.state.workspace_service.create(request).await.unwrap_err();
    assert!(err.is_validation());

    let mut request = create_request("ws", &[]);
    request.workspace_type = "study".to_string();
    request.data = json!({ "participants": 12 });
    let err = h.state.workspace_service.create(request).await.unwrap_err();
    assert!(err.is_validation());

    assert_eq!(h.api.call_count(), 0);
    assert_eq!(row_counts(h.store.as_ref()).await.workspaces, 0);
}

#[tokio::test]
async fn test_create_stores_adapter_data() {
    let h = harness();
    seed_billing_project(h.store.as_ref(), "bp").await;

    let mut request = create_request("study-ws", &[]);
    request.workspace_type = "study".to_string();
    request.data = json!({ "study_name": "Heart", "participants": 40 });
    let result = h.state.workspace_service.create(request).await.unwrap();

    let data = h
        .store
        .workspace_data(result.record.workspace.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data.workspace_type, "study");
    assert_eq!(data.data["study_name"], "Heart");

    let studies = h
        .state
        .workspace_service
        .list(&WorkspaceListFilters {
            workspace_type: Some("study".to_string()),
            billing_project: None,
        })
        .await
        .unwrap();
    assert_eq!(studies.len(), 1);
}

#[tokio::test]
async fn test_duplicate_workspace_is_rejected_case_insensitively() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;

    let err = h
        .state
        .workspace_service
        .create(create_request("WS", &[]))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(h.api.call_count(), 0);
}

// ==================== 导入 ====================

#[tokio::test]
async fn test_importable_lists_owned_workspaces_not_yet_local() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    seed_workspace(h.store.as_ref(), &bp, "local", &[]).await;
    h.api.remote_workspace("bp", "local", "OWNER", &[]);
    h.api.remote_workspace("bp", "owned", "OWNER", &[]);
    h.api.remote_workspace("other", "b-owned", "OWNER", &[]);
    h.api.remote_workspace("bp", "read-only", "READER", &[]);

    let keys = h.state.workspace_service.importable().await.unwrap();

    assert_eq!(keys, vec!["bp/owned".to_string(), "other/b-owned".to_string()]);
}

#[tokio::test]
async fn test_import_creates_billing_project_and_external_groups() {
    let h = harness();
    seed_group(h.store.as_ref(), "known", true).await;
    h.api.remote_workspace("new-bp", "ws", "OWNER", &["known", "unknown"]);
    h.api.fail("check_billing_project", Some("new-bp"), 500, "billing api down");

    let result = h
        .state
        .workspace_service
        .import(import_request("new-bp", "ws"))
        .await
        .unwrap();

    assert_eq!(result.message, workspace_service::MESSAGE_IMPORTED);
    let bp = h.store.billing_project_by_name("new-bp").await.unwrap().unwrap();
    assert!(!bp.has_app_as_user);
    let unknown = h.store.managed_group_by_name("unknown").await.unwrap().unwrap();
    assert!(!unknown.is_managed_by_app);
    let known = h.store.managed_group_by_name("known").await.unwrap().unwrap();
    assert!(known.is_managed_by_app);

    let workspace = result.record.workspace;
    assert_eq!(h.store.authorization_domains(workspace.id).await.unwrap().len(), 2);
    assert!(h.store.workspace_data(workspace.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_import_rejects_workspace_not_owned() {
    let h = harness();
    h.api.remote_workspace("bp", "ws", "WRITER", &[]);
    let before = row_counts(h.store.as_ref()).await;

    let err = h
        .state
        .workspace_service
        .import(import_request("bp", "ws"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RemoteInconsistency(_)));
    assert_eq!(err.to_string(), workspace_service::MESSAGE_NOT_OWNER);
    assert_eq!(row_counts(h.store.as_ref()).await, before);
}

#[tokio::test]
async fn test_import_of_invisible_workspace_writes_nothing() {
    let h = harness();
    let before = row_counts(h.store.as_ref()).await;

    let err = h
        .state
        .workspace_service
        .import(import_request("bp", "missing"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), workspace_service::MESSAGE_NO_ACCESS);
    assert_eq!(row_counts(h.store.as_ref()).await, before);
}

#[tokio::test]
async fn test_import_of_local_workspace_makes_no_remote_calls() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;

    let err = h
        .state
        .workspace_service
        .import(import_request("bp", "ws"))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(h.api.call_count(), 0);
}

// ==================== 克隆与删除 ====================

#[tokio::test]
async fn test_clone_requires_source_auth_domains() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let auth = seed_group(h.store.as_ref(), "auth", true).await;
    seed_group(h.store.as_ref(), "extra", true).await;
    seed_workspace(h.store.as_ref(), &bp, "source", &[&auth]).await;

    let err = h
        .state
        .workspace_service
        .clone_workspace("bp", "source", create_request("copy", &["extra"]))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.to_string(), format!("Validation error: {}", workspace_service::MESSAGE_MISSING_AUTH_DOMAINS));
    assert_eq!(h.api.call_count(), 0);

    let result = h
        .state
        .workspace_service
        .clone_workspace("bp", "source", create_request("copy", &["auth", "extra"]))
        .await
        .unwrap();
    assert_eq!(result.message, workspace_service::MESSAGE_CLONED);
    assert_eq!(
        h.api.calls(),
        vec![Call::CloneWorkspace {
            from: "bp/source".to_string(),
            namespace: "bp".to_string(),
            name: "copy".to_string(),
            auth_domains: vec!["auth".to_string(), "extra".to_string()],
        }]
    );
    assert_eq!(result.record.authorization_domains.len(), 2);
}

#[tokio::test]
async fn test_delete_cascades_local_rows_after_remote_delete() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let auth = seed_group(h.store.as_ref(), "auth", true).await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[&auth]).await;
    seed_access(h.store.as_ref(), &workspace, &auth, WorkspaceAccessLevel::Writer, false).await;

    h.state.workspace_service.delete("bp", "ws").await.unwrap();

    assert!(h.store.workspace_by_id(workspace.id).await.unwrap().is_none());
    assert!(h.store.authorization_domains(workspace.id).await.unwrap().is_empty());
    assert!(h.store.workspace_data(workspace.id).await.unwrap().is_none());
    assert!(h
        .store
        .workspace_group_accesses_for_group(auth.id)
        .await
        .unwrap()
        .is_empty());
    assert!(h.store.managed_group_by_id(auth.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_remote_delete_keeps_workspace() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    h.api.fail("delete_workspace", None, 403, "forbidden");

    let err = h.state.workspace_service.delete("bp", "ws").await.unwrap_err();

    assert_eq!(err.to_string(), "AnVIL API Error: forbidden");
    assert!(h.store.workspace_by_id(workspace.id).await.unwrap().is_some());
}

// ==================== 访问查询 ====================

#[tokio::test]
async fn test_access_follows_nested_groups() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let auth = seed_group(h.store.as_ref(), "auth", true).await;
    let readers = seed_group(h.store.as_ref(), "readers", true).await;
    let nested = seed_group(h.store.as_ref(), "nested", true).await;
    let outsider = seed_group(h.store.as_ref(), "outsider", true).await;
    // nested 同时属于授权域和被共享的组
    seed_group_membership(h.store.as_ref(), &auth, &nested).await;
    seed_group_membership(h.store.as_ref(), &readers, &nested).await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[&auth]).await;
    seed_access(h.store.as_ref(), &workspace, &readers, WorkspaceAccessLevel::Reader, false).await;
    seed_access(h.store.as_ref(), &workspace, &outsider, WorkspaceAccessLevel::Reader, false).await;

    let service = &h.state.workspace_service;
    assert!(service.has_access("bp", "ws", "nested").await.unwrap());
    assert!(service.is_shared("bp", "ws", "outsider").await.unwrap());
    assert!(!service.is_in_authorization_domain("bp", "ws", "outsider").await.unwrap());
    assert!(!service.has_access("bp", "ws", "outsider").await.unwrap());
    assert!(!service.is_shared("bp", "ws", "auth").await.unwrap());
}

// ==================== 共享 ====================

#[tokio::test]
async fn test_grant_patches_single_acl_entry() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    seed_group(h.store.as_ref(), "writers", true).await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;

    let result = h
        .state
        .access_service
        .grant("bp", "ws", grant("writers", WorkspaceAccessLevel::Writer, true))
        .await
        .unwrap();

    assert_eq!(result.message, access_service::MESSAGE_SHARED);
    assert_eq!(
        h.api.calls(),
        vec![Call::PatchAcl {
            namespace: "bp".to_string(),
            name: "ws".to_string(),
            entries: vec![AclEntry {
                email: "writers@firecloud.org".to_string(),
                access_level: "WRITER".to_string(),
                can_share: false,
                can_compute: true,
            }],
        }]
    );
    assert_eq!(
        h.store
            .workspace_group_accesses_for_workspace(workspace.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_acl_group_not_found_is_not_committed() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    seed_group(h.store.as_ref(), "ghost", true).await;
    seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    h.api.acl_outcome(AclOutcome::NotFound);
    let before = row_counts(h.store.as_ref()).await;

    let err = h
        .state
        .access_service
        .grant("bp", "ws", grant("ghost", WorkspaceAccessLevel::Reader, false))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RemoteInconsistency(_)));
    assert_eq!(err.to_string(), access_service::MESSAGE_GROUP_NOT_FOUND);
    assert_eq!(row_counts(h.store.as_ref()).await, before);
}

#[tokio::test]
async fn test_revoke_for_group_missing_on_anvil_removes_local_sharing() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let group = seed_group(h.store.as_ref(), "gone", true).await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    seed_access(h.store.as_ref(), &workspace, &group, WorkspaceAccessLevel::Writer, true).await;
    h.api.acl_outcome(AclOutcome::NotFound);

    let revoked = h.state.access_service.revoke("bp", "ws", "gone").await.unwrap();

    assert_eq!(revoked.message, access_service::MESSAGE_REMOVED);
    assert_eq!(row_counts(h.store.as_ref()).await.accesses, 0);

    // 共享记录删除后，组本身也可以删除
    h.state.managed_group_service.delete("gone").await.unwrap();
    assert!(h
        .store
        .managed_group_by_name("gone")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_revoke_not_confirmed_keeps_sharing() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let group = seed_group(h.store.as_ref(), "g", true).await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    seed_access(h.store.as_ref(), &workspace, &group, WorkspaceAccessLevel::Reader, false).await;
    h.api.acl_outcome(AclOutcome::Ignored);

    let err = h.state.access_service.revoke("bp", "ws", "g").await.unwrap_err();

    assert_eq!(err.to_string(), access_service::MESSAGE_NOT_CONFIRMED);
    assert_eq!(row_counts(h.store.as_ref()).await.accesses, 1);
}

#[tokio::test]
async fn test_acl_response_without_group_is_not_committed() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    seed_group(h.store.as_ref(), "g", true).await;
    seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    h.api.acl_outcome(AclOutcome::Ignored);

    let err = h
        .state
        .access_service
        .grant("bp", "ws", grant("g", WorkspaceAccessLevel::Reader, false))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RemoteInconsistency(_)));
    assert_eq!(row_counts(h.store.as_ref()).await.accesses, 0);
}

#[tokio::test]
async fn test_duplicate_grant_is_rejected_locally() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let group = seed_group(h.store.as_ref(), "g", true).await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    seed_access(h.store.as_ref(), &workspace, &group, WorkspaceAccessLevel::Reader, false).await;

    let err = h
        .state
        .access_service
        .grant("bp", "ws", grant("G", WorkspaceAccessLevel::Owner, true))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(h.api.call_count(), 0);
}

#[tokio::test]
async fn test_update_and_revoke() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "bp").await;
    let group = seed_group(h.store.as_ref(), "g", true).await;
    let workspace = seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    seed_access(h.store.as_ref(), &workspace, &group, WorkspaceAccessLevel::Reader, false).await;

    let updated = h
        .state
        .access_service
        .update(
            "bp",
            "ws",
            "g",
            UpdateAccessRequest {
                access: WorkspaceAccessLevel::Owner,
                can_compute: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.message, access_service::MESSAGE_UPDATED);
    assert_eq!(updated.record.access, WorkspaceAccessLevel::Owner);

    h.api.clear_calls();
    let revoked = h.state.access_service.revoke("bp", "ws", "g").await.unwrap();
    assert_eq!(revoked.message, access_service::MESSAGE_REMOVED);
    match &h.api.calls()[0] {
        Call::PatchAcl { entries, .. } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].access_level, NO_ACCESS);
            assert!(entries[0].can_compute);
        }
        other => panic!("unexpected call: {:?}", other),
    }
    assert!(h
        .store
        .workspace_group_accesses_for_workspace(workspace.id)
        .await
        .unwrap()
        .is_empty());

    let history = h
        .state
        .audit_service
        .query_history(&Default::default(), 10, 0)
        .await
        .unwrap();
    assert_eq!(history[0].summary.as_deref(), Some("workspace_access.delete"));
    assert_eq!(history[1].summary.as_deref(), Some("workspace_access.update"));
    assert_eq!(history[1].previous.as_ref().unwrap()["access"], "READER");
}
