//! ObjectStore port - 合成結果ファイルの置き場所（S3 など）
//!
//! rename プリミティブは無い前提。移動は copy してから delete します。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn copy_object(&self, source: &str, target: &str) -> Result<(), ObjectStoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError>;
}
