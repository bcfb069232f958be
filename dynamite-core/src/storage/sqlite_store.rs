use super::{VersionRecord, VersionStore};
use crate::{DynamiteError, Member, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const IN_MEMORY: &str = ":memory:";

/// SQLite-backed version store.
///
/// All statements go through one connection behind a mutex, which serializes
/// appends; the blocking work runs on tokio's blocking pool.
pub struct SqliteVersionStore {
    location: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteVersionStore {
    /// A store backed by the database file at `path`. Nothing is opened until
    /// `init`.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            location: path.as_ref().to_string_lossy().to_string(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(IN_MEMORY)
    }

    /// The database file a node uses under `data_dir`, named after its identity.
    pub fn for_member(data_dir: &Path, member: &Member) -> Self {
        Self::open(Self::db_path(data_dir, member))
    }

    pub fn db_path(data_dir: &Path, member: &Member) -> PathBuf {
        let file_name: String = member
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        data_dir.join(format!("{}.db", file_name))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            let conn = guard
                .as_ref()
                .ok_or_else(|| DynamiteError::Storage("sqlite connection is not open".to_string()))?;
            op(conn)
        })
        .await
        .map_err(|e| DynamiteError::Storage(e.to_string()))?
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS key_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            value BLOB NOT NULL,
            date TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_key_values_key ON key_values(key)",
        [],
    )?;

    Ok(())
}

#[async_trait]
impl VersionStore for SqliteVersionStore {
    async fn init(&self) -> Result<()> {
        let conn = self.conn.clone();
        let location = self.location.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_none() {
                tracing::info!("Connecting to sqlite db {}", location);
                let opened = if location == IN_MEMORY {
                    Connection::open_in_memory()?
                } else {
                    if let Some(parent) = Path::new(&location).parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    Connection::open(&location)?
                };
                *guard = Some(opened);
            }

            match guard.as_ref() {
                Some(conn) => init_schema(conn),
                None => Err(DynamiteError::Internal("sqlite connection vanished".to_string())),
            }
        })
        .await
        .map_err(|e| DynamiteError::Storage(e.to_string()))?
    }

    async fn append_version(
        &self,
        key: &str,
        value: Bytes,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO key_values (key, value, date) VALUES (?1, ?2, ?3)",
                params![
                    key,
                    value.as_ref(),
                    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn read_versions(&self, key: &str) -> Result<Vec<VersionRecord>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, value, date FROM key_values WHERE key = ?1 ORDER BY id")?;

            let rows = stmt.query_map([&key], |row| {
                let sequence_id: i64 = row.get(0)?;
                let value: Vec<u8> = row.get(1)?;
                let date: String = row.get(2)?;

                let timestamp = DateTime::parse_from_rfc3339(&date)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc);

                Ok(VersionRecord::new(sequence_id, value, timestamp))
            })?;

            let mut versions = Vec::new();
            for row in rows {
                versions.push(row?);
            }
            Ok(versions)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.clone();
        let location = self.location.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let taken = conn.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(conn) = taken {
                conn.close().map_err(|(_, e)| DynamiteError::Sqlite(e))?;
                tracing::info!("Closed sqlite db {}", location);
            }
            Ok(())
        })
        .await
        .map_err(|e| DynamiteError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_store() -> SqliteVersionStore {
        let store = SqliteVersionStore::in_memory();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_simple_put_and_get() {
        let store = memory_store().await;
        let now = Utc::now();

        let id = store
            .append_version("foo", Bytes::from("this is my data"), now)
            .await
            .unwrap();
        assert_eq!(id, 1);

        let versions = store.read_versions("foo").await.unwrap();
        assert_eq!(versions, vec![VersionRecord::new(1, "this is my data", now)]);
    }

    #[tokio::test]
    async fn test_multiple_values_per_key() {
        let store = memory_store().await;
        let t1 = Utc::now();
        let t2 = t1 + Duration::milliseconds(5);

        store.append_version("foo", Bytes::from("this is my data"), t1).await.unwrap();
        store.append_version("bar", Bytes::from("other"), t1).await.unwrap();
        store.append_version("foo", Bytes::from("this is my data #2"), t2).await.unwrap();

        let versions = store.read_versions("foo").await.unwrap();
        let rows: Vec<(i64, &[u8])> = versions
            .iter()
            .map(|v| (v.sequence_id, v.value.as_ref()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, b"this is my data".as_slice()),
                (3, b"this is my data #2".as_slice())
            ]
        );
        assert_eq!(versions[1].timestamp, t2);
    }

    #[tokio::test]
    async fn test_unknown_key_is_empty() {
        let store = memory_store().await;
        assert!(store.read_versions("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = memory_store().await;
        store.append_version("foo", Bytes::from("bar"), Utc::now()).await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.read_versions("foo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_operations_fail_when_not_open() {
        let store = SqliteVersionStore::in_memory();
        assert!(matches!(
            store.read_versions("foo").await,
            Err(DynamiteError::Storage(_))
        ));

        store.init().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(
            store.append_version("foo", Bytes::from("bar"), Utc::now()).await,
            Err(DynamiteError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let member = Member::from("127.0.0.1:25000");
        let path = SqliteVersionStore::db_path(temp_dir.path(), &member);
        assert!(path.ends_with("127.0.0.1_25000.db"));

        let store = SqliteVersionStore::for_member(temp_dir.path(), &member);
        assert_eq!(store.location(), path.to_string_lossy());
        store.init().await.unwrap();
        store.append_version("foo", Bytes::from("bar"), Utc::now()).await.unwrap();
        store.close().await.unwrap();

        let reopened = SqliteVersionStore::for_member(temp_dir.path(), &member);
        reopened.init().await.unwrap();
        let versions = reopened.read_versions("foo").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].value, Bytes::from("bar"));
    }
}
