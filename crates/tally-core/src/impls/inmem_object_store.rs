//! InMemoryObjectStore - 開発・テスト用のオブジェクトストア

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::ports::{ObjectStore, ObjectStoreError};

#[derive(Debug, Default, Clone)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_object(&self, key: impl Into<String>, data: Vec<u8>) -> Result<(), ObjectStoreError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.insert(key.into(), data);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .map(|o| o.contains_key(key))
            .unwrap_or(false)
    }
}

fn poisoned() -> ObjectStoreError {
    ObjectStoreError::Backend("lock poisoned".to_string())
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn copy_object(&self, source: &str, target: &str) -> Result<(), ObjectStoreError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let data = objects
            .get(source)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(source.to_string()))?;
        objects.insert(target.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.remove(key);
        Ok(())
    }
}
