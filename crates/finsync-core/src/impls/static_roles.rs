//! StaticRoleAssumer - 開発・テスト用の role 引き受け
//!
//! 拒否リストに載っている role ARN 以外はすべて成功します。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ScopedCredentials, SecretMaterial, SellerRef};
use crate::ports::{RoleAssumer, RoleError};

#[derive(Default, Clone)]
pub struct StaticRoleAssumer {
    denied: Arc<RwLock<HashSet<String>>>,
}

impl StaticRoleAssumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deny(&self, role_arn: impl Into<String>) {
        self.denied.write().await.insert(role_arn.into());
    }
}

#[async_trait]
impl RoleAssumer for StaticRoleAssumer {
    async fn assume(
        &self,
        role_arn: &str,
        seller: &SellerRef,
    ) -> Result<ScopedCredentials, RoleError> {
        if self.denied.read().await.contains(role_arn) {
            return Err(RoleError::AccessDenied {
                role_arn: role_arn.to_string(),
                reason: "denied by policy".to_string(),
            });
        }
        Ok(ScopedCredentials {
            role_arn: role_arn.to_string(),
            session_name: format!("finsync-{}", seller.seller_id),
            token: SecretMaterial::new(format!("session-token-{}", seller.seller_id)),
        })
    }
}
