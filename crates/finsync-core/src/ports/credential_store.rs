//! CredentialStore port - seller credential の正本（外部所有）
//!
//! # 設計原則
//! - seller 一覧は paginated read（全件をメモリに載せない）
//! - core からは読み取り専用

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ErrorKind, SellerCredential, SellerRef};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential for seller {0}")]
    NotFound(SellerRef),

    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CredentialError::NotFound(_) => ErrorKind::NotFound,
            CredentialError::Unavailable(_) => ErrorKind::Infrastructure,
        }
    }
}

/// One page of the seller listing.
#[derive(Debug, Clone, Default)]
pub struct SellerPage {
    pub sellers: Vec<SellerCredential>,
    /// `None` when this is the last page.
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// List sellers starting at `page_token` (`None` = first page).
    async fn list_sellers(&self, page_token: Option<&str>) -> Result<SellerPage, CredentialError>;

    /// The credential of one seller. A `sellerKey` may group several
    /// sellers, so the lookup uses both halves of the identity.
    async fn get(&self, seller: &SellerRef) -> Result<SellerCredential, CredentialError>;
}
