//! AnVIL REST 客户端

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{
    AccountLookup, AclEntry, AclPatchResponse, AnvilApi, RemoteError, RemoteGroup, RemoteResult,
    RemoteWorkspace,
};
use crate::config::RemoteConfig;
use crate::models::MembershipRole;

/// 远端未返回 message 字段时使用的消息
const FALLBACK_MESSAGE: &str = "other error";

/// 工作区列表只取需要的字段
const WORKSPACE_LIST_FIELDS: &str =
    "workspace.namespace,workspace.name,workspace.authorizationDomain,accessLevel";

/// 使用服务账户令牌访问远端平台
pub struct AnvilClient {
    client: Client,
    entry_point: String,
    access_token: Secret<String>,
    group_email_domain: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceEnvelope {
    #[serde(default)]
    access_level: String,
    workspace: WorkspaceBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceBody {
    namespace: String,
    name: String,
    #[serde(default)]
    authorization_domain: Vec<AuthDomainBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthDomainBody {
    members_group_name: String,
}

impl From<WorkspaceEnvelope> for RemoteWorkspace {
    fn from(envelope: WorkspaceEnvelope) -> Self {
        RemoteWorkspace {
            namespace: envelope.workspace.namespace,
            name: envelope.workspace.name,
            access_level: envelope.access_level,
            authorization_domains: envelope
                .workspace
                .authorization_domain
                .into_iter()
                .map(|d| d.members_group_name)
                .collect(),
        }
    }
}

fn auth_domain_body(authorization_domains: &[String]) -> Vec<Value> {
    authorization_domains
        .iter()
        .map(|name| json!({ "membersGroupName": name }))
        .collect()
}

/// 从错误响应体中提取 message 字段
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError {
        status: err.status().map(|s| s.as_u16()).unwrap_or(0),
        message: err.to_string(),
    }
}

impl AnvilClient {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("anvil-console/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            entry_point: config.entry_point.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            group_email_domain: config.group_email_domain.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.entry_point, path.trim_start_matches('/'))
    }

    /// 发送请求；只有状态码等于 expected 才算成功
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        expected: StatusCode,
    ) -> RemoteResult<reqwest::Response> {
        let url = self.url(path);
        debug!(method = %method, url = %url, body = ?body, "AnVIL request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(self.access_token.expose_secret());
        if let Some(body) = &body {
            request = request.json(body);
        }

        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            warn!(method = %method, url = %url, error = %e, "AnVIL request failed");
            transport_error(e)
        })?;

        let status = response.status();
        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis(),
            "AnVIL response"
        );
        metrics::counter!("anvil_requests_total", "method" => method.to_string()).increment(1);

        if status == expected {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = error_message(&text);
        warn!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            message = %message,
            "AnVIL returned an unexpected status"
        );
        metrics::counter!("anvil_errors_total").increment(1);

        Err(RemoteError {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> RemoteResult<T> {
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|e| RemoteError {
            status,
            message: format!("invalid response body: {}", e),
        })
    }

    /// 404 映射为 None
    async fn probe(&self, path: &str) -> RemoteResult<Option<reqwest::Response>> {
        match self.send(Method::GET, path, None, StatusCode::OK).await {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AnvilApi for AnvilClient {
    fn group_email_domain(&self) -> &str {
        &self.group_email_domain
    }

    async fn status(&self) -> RemoteResult<Value> {
        let response = self.send(Method::GET, "status", None, StatusCode::OK).await?;
        Self::json(response).await
    }

    async fn me(&self) -> RemoteResult<Value> {
        let response = self
            .send(Method::GET, "me?userDetailsOnly=true", None, StatusCode::OK)
            .await?;
        Self::json(response).await
    }

    async fn create_group(&self, group_name: &str) -> RemoteResult<()> {
        self.send(
            Method::POST,
            &format!("api/groups/{}", group_name),
            None,
            StatusCode::CREATED,
        )
        .await?;
        Ok(())
    }

    async fn delete_group(&self, group_name: &str) -> RemoteResult<()> {
        self.send(
            Method::DELETE,
            &format!("api/groups/{}", group_name),
            None,
            StatusCode::NO_CONTENT,
        )
        .await?;
        Ok(())
    }

    async fn group_exists(&self, group_name: &str) -> RemoteResult<bool> {
        Ok(self
            .probe(&format!("api/groups/{}", group_name))
            .await?
            .is_some())
    }

    async fn list_my_groups(&self) -> RemoteResult<Vec<RemoteGroup>> {
        let response = self.send(Method::GET, "api/groups", None, StatusCode::OK).await?;
        Self::json(response).await
    }

    async fn add_member(
        &self,
        group_name: &str,
        role: MembershipRole,
        email: &str,
    ) -> RemoteResult<()> {
        self.send(
            Method::PUT,
            &format!("api/groups/{}/{}/{}", group_name, role.as_str(), email),
            None,
            StatusCode::NO_CONTENT,
        )
        .await?;
        Ok(())
    }

    async fn remove_member(
        &self,
        group_name: &str,
        role: MembershipRole,
        email: &str,
    ) -> RemoteResult<()> {
        self.send(
            Method::DELETE,
            &format!("api/groups/{}/{}/{}", group_name, role.as_str(), email),
            None,
            StatusCode::NO_CONTENT,
        )
        .await?;
        Ok(())
    }

    async fn check_billing_project(&self, name: &str) -> RemoteResult<bool> {
        Ok(self
            .probe(&format!("api/billing/v2/{}", name))
            .await?
            .is_some())
    }

    async fn check_account(&self, email: &str) -> RemoteResult<AccountLookup> {
        match self.probe(&format!("api/proxyGroup/{}", email)).await? {
            Some(_) => Ok(AccountLookup::Found),
            None => Ok(AccountLookup::NotFound),
        }
    }

    async fn create_workspace(
        &self,
        namespace: &str,
        name: &str,
        authorization_domains: &[String],
    ) -> RemoteResult<()> {
        let body = json!({
            "namespace": namespace,
            "name": name,
            "attributes": {},
            "authorizationDomain": auth_domain_body(authorization_domains),
        });
        self.send(Method::POST, "api/workspaces", Some(body), StatusCode::CREATED)
            .await?;
        Ok(())
    }

    async fn clone_workspace(
        &self,
        source_namespace: &str,
        source_name: &str,
        namespace: &str,
        name: &str,
        authorization_domains: &[String],
    ) -> RemoteResult<()> {
        let body = json!({
            "namespace": namespace,
            "name": name,
            "attributes": {},
            "authorizationDomain": auth_domain_body(authorization_domains),
        });
        self.send(
            Method::POST,
            &format!("api/workspaces/{}/{}/clone", source_namespace, source_name),
            Some(body),
            StatusCode::CREATED,
        )
        .await?;
        Ok(())
    }

    async fn delete_workspace(&self, namespace: &str, name: &str) -> RemoteResult<()> {
        self.send(
            Method::DELETE,
            &format!("api/workspaces/{}/{}", namespace, name),
            None,
            StatusCode::ACCEPTED,
        )
        .await?;
        Ok(())
    }

    async fn list_workspaces(&self) -> RemoteResult<Vec<RemoteWorkspace>> {
        let response = self
            .send(
                Method::GET,
                &format!("api/workspaces?fields={}", WORKSPACE_LIST_FIELDS),
                None,
                StatusCode::OK,
            )
            .await?;
        let envelopes: Vec<WorkspaceEnvelope> = Self::json(response).await?;
        Ok(envelopes.into_iter().map(RemoteWorkspace::from).collect())
    }

    async fn get_workspace(&self, namespace: &str, name: &str) -> RemoteResult<RemoteWorkspace> {
        let response = self
            .send(
                Method::GET,
                &format!("api/workspaces/{}/{}", namespace, name),
                None,
                StatusCode::OK,
            )
            .await?;
        let envelope: WorkspaceEnvelope = Self::json(response).await?;
        Ok(envelope.into())
    }

    async fn patch_acl(
        &self,
        namespace: &str,
        name: &str,
        entries: &[AclEntry],
    ) -> RemoteResult<AclPatchResponse> {
        let body = serde_json::to_value(entries).map_err(|e| RemoteError {
            status: 0,
            message: e.to_string(),
        })?;
        let response = self
            .send(
                Method::PATCH,
                &format!(
                    "api/workspaces/{}/{}/acl?inviteUsersNotFound=false",
                    namespace, name
                ),
                Some(body),
                StatusCode::OK,
            )
            .await?;
        Self::json(response).await
    }
}
