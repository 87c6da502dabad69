use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by SQLite
///
/// Each top-level section of [`AppConfig`] (`server`, `signaling`, ...) is
/// one row holding that section as JSON, so a change notifies only the
/// sections that actually differ. Reads go through an `ArcSwap` cache.
#[derive(Clone)]
pub struct ConfigStore {
    pool: Pool<Sqlite>,
    cache: Arc<ArcSwap<AppConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// A configuration section was rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub section: String,
}

impl ConfigStore {
    /// Open (or create) the configuration database
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&format!("sqlite:{}?mode=rwc", db_path.display()))
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                section TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let (config, missing) = Self::load(&pool).await?;
        if !missing.is_empty() {
            debug!("Seeding config sections {:?} with defaults", missing);
            Self::write_sections(&pool, &sections(&config)?, &missing).await?;
        }

        let (change_tx, _) = broadcast::channel(16);
        Ok(Self {
            pool,
            cache: Arc::new(ArcSwap::from_pointee(config)),
            change_tx,
        })
    }

    /// Assemble the config from stored rows, returning sections absent on disk
    async fn load(pool: &Pool<Sqlite>) -> Result<(AppConfig, Vec<String>)> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT section, body FROM settings")
            .fetch_all(pool)
            .await?;

        let mut document = Map::new();
        for (section, body) in rows {
            let value: Value = serde_json::from_str(&body)
                .map_err(|e| AppError::Config(format!("section '{}': {}", section, e)))?;
            document.insert(section, value);
        }

        let config: AppConfig = serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| AppError::Config(e.to_string()))?;
        let missing = sections(&config)?
            .keys()
            .filter(|name| !document.contains_key(*name))
            .cloned()
            .collect();
        Ok((config, missing))
    }

    async fn write_sections(
        pool: &Pool<Sqlite>,
        all: &Map<String, Value>,
        names: &[String],
    ) -> Result<()> {
        let mut tx = pool.begin().await?;
        for name in names {
            let Some(value) = all.get(name) else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO settings (section, body, updated_at)
                VALUES (?1, ?2, datetime('now'))
                ON CONFLICT(section) DO UPDATE SET body = ?2, updated_at = datetime('now')
                "#,
            )
            .bind(name)
            .bind(serde_json::to_string(value)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the whole configuration, persisting only changed sections
    pub async fn set(&self, config: AppConfig) -> Result<()> {
        let before = sections(&self.cache.load_full())?;
        let after = sections(&config)?;
        let changed: Vec<String> = after
            .iter()
            .filter(|(name, value)| before.get(*name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        Self::write_sections(&self.pool, &after, &changed).await?;
        self.cache.store(Arc::new(config));
        for section in changed {
            let _ = self.change_tx.send(ConfigChange { section });
        }
        Ok(())
    }

    /// Read-modify-write update; the last concurrent writer wins
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (*self.cache.load_full()).clone();
        f(&mut config);
        self.set(config).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }
}

/// Split a config into its top-level sections
fn sections(config: &AppConfig) -> Result<Map<String, Value>> {
    match serde_json::to_value(config)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Internal("config did not serialize to an object".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_store_persists_sections() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("client.db");

        let store = ConfigStore::new(&db_path).await.unwrap();
        let mut changes = store.subscribe();
        assert_eq!(store.get().server.room_id, "android");

        store
            .update(|c| {
                c.server.room_id = "lobby".to_string();
                c.signaling.request_timeout_ms = 2500;
            })
            .await
            .unwrap();

        assert_eq!(store.get().server.room_id, "lobby");
        let mut changed = vec![
            changes.recv().await.unwrap().section,
            changes.recv().await.unwrap().section,
        ];
        changed.sort();
        assert_eq!(changed, vec!["server".to_string(), "signaling".to_string()]);
        assert!(changes.try_recv().is_err());

        drop(store);
        let reopened = ConfigStore::new(&db_path).await.unwrap();
        let config = reopened.get();
        assert_eq!(config.server.room_id, "lobby");
        assert_eq!(config.signaling.request_timeout_ms, 2500);
        assert!(config.stats.enabled);
    }

    #[tokio::test]
    async fn test_unchanged_set_is_silent() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("client.db")).await.unwrap();
        let mut changes = store.subscribe();

        store.set((*store.get()).clone()).await.unwrap();
        assert!(changes.try_recv().is_err());
    }
}
