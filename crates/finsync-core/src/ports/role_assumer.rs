//! RoleAssumer port - seller ごとの権限を引き受ける（STS AssumeRole 相当）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ErrorKind, ScopedCredentials, SellerRef};

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("access denied assuming {role_arn}: {reason}")]
    AccessDenied { role_arn: String, reason: String },

    #[error("role {0} does not exist")]
    NotFound(String),
}

impl RoleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoleError::AccessDenied { .. } => ErrorKind::AccessDenied,
            RoleError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

#[async_trait]
pub trait RoleAssumer: Send + Sync {
    /// `seller` is used for the session name only.
    async fn assume(
        &self,
        role_arn: &str,
        seller: &SellerRef,
    ) -> Result<ScopedCredentials, RoleError>;
}
