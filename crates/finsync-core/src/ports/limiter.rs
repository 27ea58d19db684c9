//! InvocationLimiter port - Worker 呼び出しレートの制御点
//!
//! リトライ・バックオフは業務ロジックに持たせない。upstream へのリクエスト
//! レートを外から監査できる場所をここ 1 か所にする。

use async_trait::async_trait;

#[async_trait]
pub trait InvocationLimiter: Send + Sync {
    /// Wait until one more invocation may be issued.
    async fn acquire(&self);
}
