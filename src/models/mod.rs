//! 数据模型模块
//! 本地镜像的远端实体，以及操作请求 DTO

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use validator::ValidationError;

/// 以固定文本存储的枚举
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::models::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::UnknownVariant;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

pub mod access;
pub mod account;
pub mod billing_project;
pub mod history;
pub mod managed_group;
pub mod membership;
pub mod workspace;

pub use access::{WorkspaceAccessLevel, WorkspaceGroupAccess};
pub use account::{Account, AccountStatus};
pub use billing_project::BillingProject;
pub use history::{ChangeType, EntityKind, HistoryFilters, HistoryRecord};
pub use managed_group::ManagedGroup;
pub use membership::{GroupAccountMembership, GroupGraph, GroupGroupMembership, MembershipRole};
pub use workspace::{Workspace, WorkspaceAuthorizationDomain, WorkspaceData, WorkspaceDetail};

/// 远端平台对名称的限制：字母、数字、下划线和连字符
static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid"));

/// 名称的最大长度
pub const MAX_NAME_LENGTH: usize = 64;

/// 校验 slug 形式的名称
pub fn validate_slug(value: &str) -> Result<(), ValidationError> {
    if SLUG_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("slug").with_message(Cow::Borrowed(
            "Enter a valid \u{201c}slug\u{201d} consisting of letters, numbers, underscores or hyphens.",
        )))
    }
}

/// 文本列无法解析为枚举值
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
