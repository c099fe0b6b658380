//! Group membership models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;
use validator::Validate;

text_enum! {
    /// 组成员角色
    MembershipRole {
        Member => "MEMBER",
        Admin => "ADMIN",
    }
}

impl Default for MembershipRole {
    fn default() -> Self {
        MembershipRole::Member
    }
}

/// 组嵌套关系：child 以 role 身份成为 parent 的成员
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupGroupMembership {
    pub id: Uuid,
    pub parent_group_id: Uuid,
    pub child_group_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: MembershipRole,
    pub created_at: DateTime<Utc>,
}

impl GroupGroupMembership {
    pub fn new(parent_group_id: Uuid, child_group_id: Uuid, role: MembershipRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_group_id,
            child_group_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// 账户以 role 身份成为组成员
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupAccountMembership {
    pub id: Uuid,
    pub group_id: Uuid,
    pub account_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: MembershipRole,
    pub created_at: DateTime<Utc>,
}

impl GroupAccountMembership {
    pub fn new(group_id: Uuid, account_id: Uuid, role: MembershipRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            account_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// Create group-group membership request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupGroupMembershipRequest {
    #[validate(length(min = 1, message = "This field is required."))]
    pub parent_group: String,
    #[validate(length(min = 1, message = "This field is required."))]
    pub child_group: String,
    #[serde(default)]
    pub role: MembershipRole,
}

/// Create group-account membership request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupAccountMembershipRequest {
    #[validate(length(min = 1, message = "This field is required."))]
    pub group: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub account_email: String,
    #[serde(default)]
    pub role: MembershipRole,
}

/// 组嵌套关系的有向图（parent -> child），用于可达性查询
#[derive(Debug, Default)]
pub struct GroupGraph {
    children: HashMap<Uuid, Vec<Uuid>>,
    parents: HashMap<Uuid, Vec<Uuid>>,
}

impl GroupGraph {
    pub fn from_edges(edges: &[GroupGroupMembership]) -> Self {
        let mut graph = GroupGraph::default();
        for edge in edges {
            graph
                .children
                .entry(edge.parent_group_id)
                .or_default()
                .push(edge.child_group_id);
            graph
                .parents
                .entry(edge.child_group_id)
                .or_default()
                .push(edge.parent_group_id);
        }
        graph
    }

    /// 所有直接或间接的子组（不含自身）
    pub fn descendants(&self, group_id: Uuid) -> HashSet<Uuid> {
        walk(&self.children, group_id)
    }

    /// 所有直接或间接的父组（不含自身）
    pub fn ancestors(&self, group_id: Uuid) -> HashSet<Uuid> {
        walk(&self.parents, group_id)
    }

    /// 添加 parent -> child 是否会形成环
    pub fn would_create_cycle(&self, parent_id: Uuid, child_id: Uuid) -> bool {
        parent_id == child_id || self.descendants(child_id).contains(&parent_id)
    }
}

fn walk(adjacency: &HashMap<Uuid, Vec<Uuid>>, start: Uuid) -> HashSet<Uuid> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for next in adjacency.get(&current).into_iter().flatten() {
            if seen.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    seen.remove(&start);
    seen
}
