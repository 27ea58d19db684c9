//! InMemoryCredentialStore - 開発・テスト用の seller credential 一覧
//!
//! page token は次ページ先頭の index を文字列にしたもの。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{SellerCredential, SellerKey, SellerRef};
use crate::ports::{CredentialError, CredentialStore, SellerPage};

#[derive(Clone)]
pub struct InMemoryCredentialStore {
    name: Option<Arc<str>>,
    sellers: Arc<RwLock<Vec<SellerCredential>>>,
    page_size: usize,
}

impl InMemoryCredentialStore {
    pub fn new(sellers: Vec<SellerCredential>, page_size: usize) -> Self {
        Self {
            name: None,
            sellers: Arc::new(RwLock::new(sellers)),
            page_size: page_size.max(1),
        }
    }

    pub fn with_table(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub async fn insert(&self, credential: SellerCredential) {
        self.sellers.write().await.push(credential);
    }

    /// Drop every credential under `seller_key`.
    pub async fn remove(&self, seller_key: &SellerKey) {
        self.sellers
            .write()
            .await
            .retain(|c| &c.seller_key != seller_key);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn list_sellers(&self, page_token: Option<&str>) -> Result<SellerPage, CredentialError> {
        let start = match page_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| CredentialError::Unavailable(format!("bad page token {token:?}")))?,
        };

        let sellers = self.sellers.read().await;
        tracing::trace!(table = ?self.name(), start, "listing sellers");
        let end = (start + self.page_size).min(sellers.len());
        let page = sellers.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < sellers.len()).then(|| end.to_string());

        Ok(SellerPage {
            sellers: page,
            next_page_token,
        })
    }

    async fn get(&self, seller: &SellerRef) -> Result<SellerCredential, CredentialError> {
        self.sellers
            .read()
            .await
            .iter()
            .find(|c| c.seller_key == seller.seller_key && c.seller_id == seller.seller_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(seller.clone()))
    }
}
