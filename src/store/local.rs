// src/store/local.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use super::{LocalStore, db_error};
use crate::error::AppError;

/// Device key/value pairs in the `local_storage` table.
#[derive(Clone)]
pub struct SqlLocalStore {
    pool: SqlitePool,
}

impl SqlLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocalStore for SqlLocalStore {
    async fn get(&self, device: &str, key: &str) -> Result<Option<String>, AppError> {
        sqlx::query_scalar("SELECT value FROM local_storage WHERE device_id = ? AND key = ?")
            .bind(device)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to read local storage"))
    }

    async fn set(&self, device: &str, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO local_storage (device_id, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (device_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(device)
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to write local storage"))?;
        Ok(())
    }

    async fn remove(&self, device: &str, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM local_storage WHERE device_id = ? AND key = ?")
            .bind(device)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete from local storage"))?;
        Ok(())
    }
}

/// In-process store, used where nothing needs to outlive the process.
#[derive(Default, Clone)]
pub struct MemoryLocalStore {
    entries: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, device: &str, key: &str) -> Result<Option<String>, AppError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&(device.to_string(), key.to_string())).cloned())
    }

    async fn set(&self, device: &str, key: &str, value: &str) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        entries.insert((device.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn remove(&self, device: &str, key: &str) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        entries.remove(&(device.to_string(), key.to_string()));
        Ok(())
    }
}

/// A `LocalStore` bound to one device namespace.
#[derive(Clone)]
pub struct DeviceStorage {
    store: Arc<dyn LocalStore>,
    device_id: String,
}

impl DeviceStorage {
    pub fn new(store: Arc<dyn LocalStore>, device_id: impl Into<String>) -> Self {
        Self {
            store,
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.store.get(&self.device_id, key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.store.set(&self.device_id, key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.store.remove(&self.device_id, key).await
    }

    /// Reads and decodes a JSON value. Undecodable values count as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable local value {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_pool;

    #[tokio::test]
    async fn sql_store_upserts_and_scopes_by_device() {
        let store = SqlLocalStore::new(test_pool().await);
        store.set("laptop", "k", "one").await.unwrap();
        store.set("laptop", "k", "two").await.unwrap();
        store.set("phone", "k", "other").await.unwrap();

        assert_eq!(store.get("laptop", "k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.get("phone", "k").await.unwrap().as_deref(), Some("other"));

        store.remove("laptop", "k").await.unwrap();
        assert_eq!(store.get("laptop", "k").await.unwrap(), None);
        assert!(store.get("phone", "k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn device_storage_treats_bad_json_as_absent() {
        let device = DeviceStorage::new(Arc::new(MemoryLocalStore::new()), "d1");
        device.set("k", "{not json").await.unwrap();
        let value: Option<Vec<u32>> = device.get_json("k").await.unwrap();
        assert_eq!(value, None);

        device.set_json("k", &vec![1u32, 2]).await.unwrap();
        let value: Option<Vec<u32>> = device.get_json("k").await.unwrap();
        assert_eq!(value, Some(vec![1, 2]));
    }
}
