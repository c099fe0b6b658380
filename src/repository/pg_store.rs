//! PostgreSQL 存储

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{Change, ChangeSet, Store};
use crate::error::{AppError, Result};
use crate::models::*;

pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// 约束冲突单独映射，其他数据库错误保持原样
fn map_db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.is_check_violation()
        {
            return AppError::Constraint(db_err.message().to_string());
        }
    }
    AppError::Database(e)
}

async fn delete_row(conn: &mut PgConnection, table: &'static str, id: Uuid) -> Result<()> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", table))
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;

    if result.rows_affected() == 0 {
        return Err(AppError::Constraint(format!("{} row {} does not exist", table, id)));
    }
    Ok(())
}

async fn apply(conn: &mut PgConnection, change: Change) -> Result<()> {
    let query = match change {
        Change::InsertBillingProject(r) => sqlx::query(
            r#"
            INSERT INTO billing_projects (id, name, has_app_as_user, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(r.id)
        .bind(r.name)
        .bind(r.has_app_as_user)
        .bind(r.created_at)
        .bind(r.updated_at),
        Change::UpdateBillingProject { after: r, .. } => sqlx::query(
            "UPDATE billing_projects SET has_app_as_user = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(r.id)
        .bind(r.has_app_as_user)
        .bind(r.updated_at),
        Change::DeleteBillingProject(r) => return delete_row(conn, "billing_projects", r.id).await,

        Change::InsertAccount(r) => sqlx::query(
            r#"
            INSERT INTO accounts (id, email, is_service_account, status, deactivate_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(r.id)
        .bind(r.email)
        .bind(r.is_service_account)
        .bind(r.status.as_str())
        .bind(r.deactivate_date)
        .bind(r.created_at)
        .bind(r.updated_at),
        Change::UpdateAccount { after: r, .. } => sqlx::query(
            r#"
            UPDATE accounts
            SET email = $2, is_service_account = $3, status = $4, deactivate_date = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(r.id)
        .bind(r.email)
        .bind(r.is_service_account)
        .bind(r.status.as_str())
        .bind(r.deactivate_date)
        .bind(r.updated_at),
        Change::DeleteAccount(r) => return delete_row(conn, "accounts", r.id).await,

        Change::InsertManagedGroup(r) => sqlx::query(
            r#"
            INSERT INTO managed_groups (id, name, is_managed_by_app, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(r.id)
        .bind(r.name)
        .bind(r.is_managed_by_app)
        .bind(r.created_at)
        .bind(r.updated_at),
        Change::DeleteManagedGroup(r) => return delete_row(conn, "managed_groups", r.id).await,

        Change::InsertWorkspace(r) => sqlx::query(
            r#"
            INSERT INTO workspaces (id, billing_project_id, name, workspace_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(r.id)
        .bind(r.billing_project_id)
        .bind(r.name)
        .bind(r.workspace_type)
        .bind(r.created_at)
        .bind(r.updated_at),
        Change::DeleteWorkspace(r) => return delete_row(conn, "workspaces", r.id).await,
        Change::InsertAuthorizationDomain(r) => sqlx::query(
            r#"
            INSERT INTO workspace_authorization_domains (id, workspace_id, group_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(r.id)
        .bind(r.workspace_id)
        .bind(r.group_id)
        .bind(r.created_at),
        Change::DeleteAuthorizationDomain(r) => {
            return delete_row(conn, "workspace_authorization_domains", r.id).await
        }
        Change::InsertWorkspaceData(r) => sqlx::query(
            r#"
            INSERT INTO workspace_data (id, workspace_id, workspace_type, data, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(r.id)
        .bind(r.workspace_id)
        .bind(r.workspace_type)
        .bind(r.data)
        .bind(r.created_at),
        Change::DeleteWorkspaceData(r) => return delete_row(conn, "workspace_data", r.id).await,

        Change::InsertGroupGroupMembership(r) => sqlx::query(
            r#"
            INSERT INTO group_group_memberships (id, parent_group_id, child_group_id, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(r.id)
        .bind(r.parent_group_id)
        .bind(r.child_group_id)
        .bind(r.role.as_str())
        .bind(r.created_at),
        Change::DeleteGroupGroupMembership(r) => {
            return delete_row(conn, "group_group_memberships", r.id).await
        }
        Change::InsertGroupAccountMembership(r) => sqlx::query(
            r#"
            INSERT INTO group_account_memberships (id, group_id, account_id, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(r.id)
        .bind(r.group_id)
        .bind(r.account_id)
        .bind(r.role.as_str())
        .bind(r.created_at),
        Change::DeleteGroupAccountMembership(r) => {
            return delete_row(conn, "group_account_memberships", r.id).await
        }

        Change::InsertWorkspaceGroupAccess(r) => sqlx::query(
            r#"
            INSERT INTO workspace_group_accesses (id, workspace_id, group_id, access, can_compute, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(r.id)
        .bind(r.workspace_id)
        .bind(r.group_id)
        .bind(r.access.as_str())
        .bind(r.can_compute)
        .bind(r.created_at)
        .bind(r.updated_at),
        Change::UpdateWorkspaceGroupAccess { after: r, .. } => sqlx::query(
            r#"
            UPDATE workspace_group_accesses
            SET access = $2, can_compute = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(r.id)
        .bind(r.access.as_str())
        .bind(r.can_compute)
        .bind(r.updated_at),
        Change::DeleteWorkspaceGroupAccess(r) => {
            return delete_row(conn, "workspace_group_accesses", r.id).await
        }

        Change::AppendHistory(r) => sqlx::query(
            r#"
            INSERT INTO history_records (id, entity_type, entity_id, change_type, snapshot, previous, summary, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(r.id)
        .bind(r.entity_type.as_str())
        .bind(r.entity_id)
        .bind(r.change_type.as_str())
        .bind(r.snapshot)
        .bind(r.previous)
        .bind(r.summary)
        .bind(r.recorded_at),
    };

    let result = query.execute(&mut *conn).await.map_err(map_db_error)?;
    if result.rows_affected() == 0 {
        return Err(AppError::Constraint("update matched no rows".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        crate::db::record_pool_metrics(&self.db);
        Ok(())
    }

    async fn billing_project_by_name(&self, name: &str) -> Result<Option<BillingProject>> {
        let row = sqlx::query_as::<_, BillingProject>(
            "SELECT * FROM billing_projects WHERE lower(name) = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn billing_project_by_id(&self, id: Uuid) -> Result<Option<BillingProject>> {
        let row = sqlx::query_as::<_, BillingProject>("SELECT * FROM billing_projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_billing_projects(&self) -> Result<Vec<BillingProject>> {
        let rows = sqlx::query_as::<_, BillingProject>(
            "SELECT * FROM billing_projects ORDER BY lower(name)",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row =
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE lower(email) = lower($1)")
                .bind(email)
                .fetch_optional(&self.db)
                .await?;
        Ok(row)
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY email")
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn managed_group_by_name(&self, name: &str) -> Result<Option<ManagedGroup>> {
        let row = sqlx::query_as::<_, ManagedGroup>(
            "SELECT * FROM managed_groups WHERE lower(name) = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn managed_group_by_id(&self, id: Uuid) -> Result<Option<ManagedGroup>> {
        let row = sqlx::query_as::<_, ManagedGroup>("SELECT * FROM managed_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_managed_groups(&self) -> Result<Vec<ManagedGroup>> {
        let rows =
            sqlx::query_as::<_, ManagedGroup>("SELECT * FROM managed_groups ORDER BY lower(name)")
                .fetch_all(&self.db)
                .await?;
        Ok(rows)
    }

    async fn workspace_by_name(
        &self,
        billing_project_id: Uuid,
        name: &str,
    ) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, Workspace>(
            "SELECT * FROM workspaces WHERE billing_project_id = $1 AND lower(name) = lower($2)",
        )
        .bind(billing_project_id)
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn workspace_by_id(&self, id: Uuid) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces ORDER BY lower(name)")
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn workspaces_in_billing_project(
        &self,
        billing_project_id: Uuid,
    ) -> Result<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, Workspace>(
            "SELECT * FROM workspaces WHERE billing_project_id = $1 ORDER BY lower(name)",
        )
        .bind(billing_project_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn authorization_domains(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceAuthorizationDomain>> {
        let rows = sqlx::query_as::<_, WorkspaceAuthorizationDomain>(
            "SELECT * FROM workspace_authorization_domains WHERE workspace_id = $1 ORDER BY created_at",
        )
        .bind(workspace_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn authorization_domains_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<WorkspaceAuthorizationDomain>> {
        let rows = sqlx::query_as::<_, WorkspaceAuthorizationDomain>(
            "SELECT * FROM workspace_authorization_domains WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn workspace_data(&self, workspace_id: Uuid) -> Result<Option<WorkspaceData>> {
        let row = sqlx::query_as::<_, WorkspaceData>(
            "SELECT * FROM workspace_data WHERE workspace_id = $1",
        )
        .bind(workspace_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn group_group_memberships(&self) -> Result<Vec<GroupGroupMembership>> {
        let rows = sqlx::query_as::<_, GroupGroupMembership>(
            "SELECT * FROM group_group_memberships ORDER BY created_at",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn group_account_memberships_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<GroupAccountMembership>> {
        let rows = sqlx::query_as::<_, GroupAccountMembership>(
            "SELECT * FROM group_account_memberships WHERE group_id = $1 ORDER BY created_at",
        )
        .bind(group_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn group_account_memberships_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<GroupAccountMembership>> {
        let rows = sqlx::query_as::<_, GroupAccountMembership>(
            "SELECT * FROM group_account_memberships WHERE account_id = $1 ORDER BY created_at",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn workspace_group_accesses_for_workspace(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceGroupAccess>> {
        let rows = sqlx::query_as::<_, WorkspaceGroupAccess>(
            "SELECT * FROM workspace_group_accesses WHERE workspace_id = $1",
        )
        .bind(workspace_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn workspace_group_accesses_for_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<WorkspaceGroupAccess>> {
        let rows = sqlx::query_as::<_, WorkspaceGroupAccess>(
            "SELECT * FROM workspace_group_accesses WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn history(
        &self,
        filters: &HistoryFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryRecord>> {
        let mut query = String::from("SELECT * FROM history_records WHERE 1=1");
        let mut index = 0;

        if filters.entity_type.is_some() {
            index += 1;
            query.push_str(&format!(" AND entity_type = ${}", index));
        }
        if filters.entity_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND entity_id = ${}", index));
        }
        if filters.change_type.is_some() {
            index += 1;
            query.push_str(&format!(" AND change_type = ${}", index));
        }

        query.push_str(&format!(
            " ORDER BY recorded_at DESC LIMIT ${} OFFSET ${}",
            index + 1,
            index + 2
        ));

        let mut query_builder = sqlx::query_as::<_, HistoryRecord>(&query);
        if let Some(entity_type) = filters.entity_type {
            query_builder = query_builder.bind(entity_type.as_str());
        }
        if let Some(entity_id) = filters.entity_id {
            query_builder = query_builder.bind(entity_id);
        }
        if let Some(change_type) = filters.change_type {
            query_builder = query_builder.bind(change_type.as_str());
        }

        let rows = query_builder
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for change in changes {
            apply(&mut tx, change).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
