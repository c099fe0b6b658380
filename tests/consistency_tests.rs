//! 一致性检查集成测试

mod common;

use anvil_console::models::*;
use anvil_console::repository::{Change, ChangeSet, Store};
use anvil_console::services::consistency_service::{
    ERROR_DIFFERENT_AUTH_DOMAINS, ERROR_DIFFERENT_ROLE, ERROR_NOT_IN_ANVIL,
    ERROR_NOT_OWNER_ON_ANVIL,
};
use common::*;

#[tokio::test]
async fn test_empty_store_and_remote_is_consistent() {
    let h = harness();

    let report = h.state.consistency_service.run().await.unwrap();

    assert!(report.ok());
    assert_eq!(h.store.list_billing_projects().await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_billing_projects_only_checked_when_app_is_user() {
    let h = harness();
    seed_billing_project(h.store.as_ref(), "good-project").await;
    seed_billing_project(h.store.as_ref(), "lost-project").await;
    let external = BillingProject::new("external-project", false);
    h.store
        .commit(ChangeSet::from(Change::InsertBillingProject(external)))
        .await
        .unwrap();
    h.api.not_user_of("lost-project");
    h.api.not_user_of("external-project");

    let report = h.state.consistency_service.billing_projects().await.unwrap();

    assert_eq!(report.verified, vec!["good-project".to_string()]);
    assert_eq!(
        report.errors.get("lost-project"),
        Some(&vec![ERROR_NOT_IN_ANVIL])
    );
    assert!(!report.errors.contains_key("external-project"));
    assert!(!h
        .api
        .calls()
        .contains(&Call::CheckBillingProject("external-project".to_string())));
}

#[tokio::test]
async fn test_inactive_accounts_are_skipped() {
    let h = harness();
    seed_account(h.store.as_ref(), "present@example.com").await;
    seed_account(h.store.as_ref(), "gone@example.com").await;
    let mut inactive = Account::new("old@example.com", false);
    inactive.status = AccountStatus::Inactive;
    h.store
        .commit(ChangeSet::from(Change::InsertAccount(inactive)))
        .await
        .unwrap();
    h.api.missing_account("gone@example.com");
    h.api.missing_account("old@example.com");

    let report = h.state.consistency_service.accounts().await.unwrap();

    assert_eq!(report.verified, vec!["present@example.com".to_string()]);
    assert_eq!(
        report.errors.get("gone@example.com"),
        Some(&vec![ERROR_NOT_IN_ANVIL])
    );
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_managed_group_roles_are_compared() {
    let h = harness();
    seed_group(h.store.as_ref(), "admins", true).await;
    seed_group(h.store.as_ref(), "demoted", true).await;
    seed_group(h.store.as_ref(), "readonly", false).await;
    seed_group(h.store.as_ref(), "vanished", true).await;
    h.api.member_of("admins", "Admin");
    // 同时以 Member 出现不影响管理员身份
    h.api.member_of("admins", "Member");
    h.api.member_of("demoted", "Member");
    h.api.member_of("readonly", "Member");

    let report = h.state.consistency_service.managed_groups().await.unwrap();

    let mut verified = report.verified.clone();
    verified.sort();
    assert_eq!(verified, vec!["admins".to_string(), "readonly".to_string()]);
    assert_eq!(report.errors.get("demoted"), Some(&vec![ERROR_DIFFERENT_ROLE]));
    assert_eq!(report.errors.get("vanished"), Some(&vec![ERROR_NOT_IN_ANVIL]));
    assert!(report.not_in_app.is_empty());
}

#[tokio::test]
async fn test_remote_admin_groups_missing_locally_are_reported() {
    let h = harness();
    h.api.member_of("zeta", "Admin");
    h.api.member_of("alpha", "Admin");
    h.api.member_of("just-member", "Member");

    let report = h.state.consistency_service.managed_groups().await.unwrap();

    assert_eq!(report.not_in_app, vec!["alpha".to_string(), "zeta".to_string()]);
    assert!(!report.ok());
}

#[tokio::test]
async fn test_workspace_ownership_and_auth_domains() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "my-project").await;
    let auth = seed_group(h.store.as_ref(), "auth", true).await;
    seed_workspace(h.store.as_ref(), &bp, "owned", &[&auth]).await;
    seed_workspace(h.store.as_ref(), &bp, "shared", &[]).await;
    seed_workspace(h.store.as_ref(), &bp, "drifted", &[&auth]).await;
    seed_workspace(h.store.as_ref(), &bp, "missing", &[]).await;
    h.api.remote_workspace("my-project", "owned", "OWNER", &["AUTH"]);
    h.api.remote_workspace("my-project", "shared", "READER", &[]);
    h.api.remote_workspace("my-project", "drifted", "OWNER", &[]);

    let report = h.state.consistency_service.workspaces().await.unwrap();

    assert_eq!(report.verified, vec!["my-project/owned".to_string()]);
    assert_eq!(
        report.errors.get("my-project/shared"),
        Some(&vec![ERROR_NOT_OWNER_ON_ANVIL])
    );
    assert_eq!(
        report.errors.get("my-project/drifted"),
        Some(&vec![ERROR_DIFFERENT_AUTH_DOMAINS])
    );
    assert_eq!(
        report.errors.get("my-project/missing"),
        Some(&vec![ERROR_NOT_IN_ANVIL])
    );
}

#[tokio::test]
async fn test_owned_remote_workspaces_missing_locally_are_reported() {
    let h = harness();
    h.api.remote_workspace("p", "b", "OWNER", &[]);
    h.api.remote_workspace("p", "a", "OWNER", &[]);
    h.api.remote_workspace("p", "readable", "READER", &[]);

    let report = h.state.consistency_service.workspaces().await.unwrap();

    assert_eq!(report.not_in_app, vec!["p/a".to_string(), "p/b".to_string()]);
}

#[tokio::test]
async fn test_consistency_check_never_writes() {
    let h = harness();
    let bp = seed_billing_project(h.store.as_ref(), "my-project").await;
    seed_workspace(h.store.as_ref(), &bp, "ws", &[]).await;
    h.api.not_user_of("my-project");
    let before = row_counts(h.store.as_ref()).await;

    let report = h.state.consistency_service.run().await.unwrap();

    assert!(!report.ok());
    assert_eq!(row_counts(h.store.as_ref()).await, before);
}

#[tokio::test]
async fn test_remote_failure_aborts_check() {
    let h = harness();
    seed_group(h.store.as_ref(), "admins", true).await;
    h.api.fail("list_my_groups", None, 500, "backend down");

    let err = h.state.consistency_service.managed_groups().await.unwrap_err();

    assert_eq!(err.to_string(), "AnVIL API Error: backend down");
}
