use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// Storage key for the raw textarea contents.
pub const SAVED_URLS_KEY: &str = "savedFeedUrls";

/// Durable key-value storage for the reader's URL list.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn save(&self, text: &str) -> anyhow::Result<()>;
    async fn load(&self) -> anyhow::Result<Option<String>>;
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database gets its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PersistencePort for Database {
    async fn save(&self, text: &str) -> anyhow::Result<()> {
        self.set_setting(SAVED_URLS_KEY, text).await
    }

    async fn load(&self) -> anyhow::Result<Option<String>> {
        self.get_setting(SAVED_URLS_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db
    }

    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_database_creation() {
            let db = Database::new("sqlite::memory:").await;
            assert!(db.is_ok());
        }

        #[tokio::test]
        async fn test_initialize_is_idempotent() {
            let db = create_test_db().await;
            db.initialize().await.unwrap();
            assert_eq!(db.load().await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_invalid_database_url() {
            let db = Database::new("not-a-database-url").await;
            assert!(db.is_err());
        }
    }

    mod settings_tests {
        use super::*;

        #[tokio::test]
        async fn test_missing_key() {
            let db = create_test_db().await;
            assert_eq!(db.get_setting("absent").await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_set_then_overwrite() {
            let db = create_test_db().await;
            db.set_setting("k", "first").await.unwrap();
            db.set_setting("k", "second").await.unwrap();
            assert_eq!(db.get_setting("k").await.unwrap().as_deref(), Some("second"));
        }

        #[tokio::test]
        async fn test_keys_are_independent() {
            let db = create_test_db().await;
            db.set_setting("a", "1").await.unwrap();
            db.set_setting("b", "2").await.unwrap();
            assert_eq!(db.get_setting("a").await.unwrap().as_deref(), Some("1"));
            assert_eq!(db.get_setting("b").await.unwrap().as_deref(), Some("2"));
        }
    }

    mod persistence_port_tests {
        use super::*;

        #[tokio::test]
        async fn test_save_uses_fixed_key() {
            let db = create_test_db().await;
            db.save("https://a.blogspot.com").await.unwrap();
            assert_eq!(
                db.get_setting(SAVED_URLS_KEY).await.unwrap().as_deref(),
                Some("https://a.blogspot.com")
            );
        }

        #[tokio::test]
        async fn test_text_stored_exactly_as_typed() {
            let db = create_test_db().await;
            let raw = "  https://a.blogspot.com/ \n\n\thttps://b.blogspot.com\r\n";
            db.save(raw).await.unwrap();
            assert_eq!(db.load().await.unwrap().as_deref(), Some(raw));
        }

        #[tokio::test]
        async fn test_empty_text_is_stored() {
            let db = create_test_db().await;
            db.save("").await.unwrap();
            assert_eq!(db.load().await.unwrap().as_deref(), Some(""));
        }
    }
}
