//! src/services/storage_service.rs
//!
//! SqliteObjectStore — the production [`ObjectStore`]: SQLite for object
//! metadata and local disk for payloads, sharded beneath
//! `base_path/{container}/{shard}/{shard}/{key}` where `base_path` is already
//! scoped to the storage account.

use super::object_store::{
    ObjectPage, ObjectStore, ReadinessCheck, StorageError, StorageResult,
};
use crate::models::{
    container::Container,
    object::{Object, ObjectInfo},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Idempotent schema, applied at startup and by `--migrate`.
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const CONTAINER_NAME_MIN_LEN: usize = 3;
const CONTAINER_NAME_MAX_LEN: usize = 63;
/// Upper bound on keys returned by one listing page.
pub const MAX_LIST_KEYS: usize = 1000;

/// Object store for a single container of a single account.
#[derive(Clone)]
pub struct SqliteObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Account-scoped directory on disk where payloads are stored.
    pub base_path: PathBuf,

    container: Container,
}

/// Apply the embedded schema statement by statement.
pub async fn run_migrations(db: &SqlitePool) -> StorageResult<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

impl SqliteObjectStore {
    /// Open (creating if needed) `container` for `account`.
    ///
    /// Payloads live under `storage_dir/{account}`; the container row and its
    /// directory are created on first use.
    pub async fn open(
        db: Arc<SqlitePool>,
        storage_dir: impl Into<PathBuf>,
        account: &str,
        container: &str,
    ) -> StorageResult<Self> {
        ensure_container_name_safe(container)?;

        sqlx::query(
            "INSERT INTO containers (id, account, name, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(account, name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(account)
        .bind(container)
        .bind(Utc::now())
        .execute(&*db)
        .await?;

        let container = sqlx::query_as::<_, Container>(
            "SELECT id, account, name, created_at
             FROM containers WHERE account = ? AND name = ?",
        )
        .bind(account)
        .bind(container)
        .fetch_one(&*db)
        .await?;

        let mut base_path: PathBuf = storage_dir.into();
        base_path.push(account);

        let store = Self {
            db,
            base_path,
            container,
        };
        fs::create_dir_all(store.container_root()).await?;
        debug!(
            "opened container {} for account {} at {}",
            store.container.name,
            store.container.account,
            store.container_root().display()
        );
        Ok(store)
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Compute the physical base folder path for the container.
    fn container_root(&self) -> PathBuf {
        self.base_path.join(&self.container.name)
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(container/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(container: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", container, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified object payload path.
    ///
    /// Combines base_path/container/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.container.name, key);
        let mut path = self.container_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Fetch an object metadata record.
    ///
    /// Returns ObjectNotFound if the row is missing.
    async fn fetch_object(&self, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, container_id, key, filename, content_type, size_bytes, etag,
                    last_modified
             FROM objects
             WHERE key = ? AND container_id = ?",
        )
        .bind(key)
        .bind(self.container.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => self.not_found(key),
            other => StorageError::Sqlx(other),
        })
    }

    fn not_found(&self, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            container: self.container.name.clone(),
            key: key.to_string(),
        }
    }

    /// Stream-upload an object to disk and update metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    /// - Upserts metadata row (overwrite semantics).
    ///
    /// Ensures durable writes (fsync) and cleans up temp files on errors.
    pub async fn upload_object_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let etag = format!("{:x}", digest.compute());

        let object = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, container_id, key, filename, content_type, size_bytes,
                etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(container_id, key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, container_id, key, filename, content_type, size_bytes,
                      etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.container.id)
        .bind(key)
        .bind(&filename)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        Ok(object)
    }

    /// List objects in lexicographic key order.
    ///
    /// The prefix is compared literally (no `LIKE` wildcards), so keys such
    /// as `input_2024/` are not confused with `input/`.
    pub async fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage> {
        let max_keys = max_keys.clamp(1, MAX_LIST_KEYS);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, container_id, key, filename, content_type, size_bytes, etag, \
             last_modified FROM objects WHERE container_id = ",
        );
        builder.push_bind(self.container.id);

        if !prefix.is_empty() {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(after) = start_after {
            builder.push(" AND key > ");
            builder.push_bind(after.to_string());
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<Object> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut next_start_after = None;
        if rows.len() == fetch_limit {
            rows.pop();
            next_start_after = rows.last().map(|obj| obj.key.clone());
        }

        Ok(ObjectPage {
            objects: rows.into_iter().map(ObjectInfo::from).collect(),
            next_start_after,
        })
    }

    /// SQLite round trip plus a write/read/delete under the container root.
    async fn run_readiness_checks(&self) -> Vec<ReadinessCheck> {
        let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => None,
            Ok(v) => Some(format!("unexpected result: {}", v)),
            Err(e) => Some(format!("error: {}", e)),
        };

        let tmp_path = self
            .container_root()
            .join(format!(".readyz-{}", Uuid::new_v4()));
        let disk = match fs::write(&tmp_path, b"readyz").await {
            Ok(_) => {
                let outcome = match fs::read(&tmp_path).await {
                    Ok(bytes) if bytes == b"readyz" => None,
                    Ok(_) => Some("file content mismatch".to_string()),
                    Err(e) => Some(format!("could not read tmp file: {}", e)),
                };
                // best-effort cleanup; a leftover probe file is harmless
                if let Err(e) = fs::remove_file(&tmp_path).await {
                    debug!("could not remove readiness probe {}: {}", tmp_path.display(), e);
                }
                outcome
            }
            Err(e) => Some(format!("could not write tmp file: {}", e)),
        };

        vec![
            ReadinessCheck {
                name: "sqlite",
                error: sqlite,
            },
            ReadinessCheck {
                name: "disk",
                error: disk,
            },
        ]
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage> {
        self.list_objects(prefix, start_after, max_keys).await
    }

    async fn stat(&self, key: &str) -> StorageResult<ObjectInfo> {
        ensure_key_safe(key)?;
        Ok(self.fetch_object(key).await?.into())
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        ensure_key_safe(key)?;
        self.fetch_object(key).await?;
        match fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(self.not_found(key)),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn write(
        &self,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectInfo> {
        let body = stream::once(async move { Ok::<_, io::Error>(content) });
        let object = self
            .upload_object_stream(key, content_type.map(str::to_string), body)
            .await?;
        Ok(object.into())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        ensure_key_safe(key)?;
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM objects WHERE container_id = ? AND key = ?)",
        )
        .bind(self.container.id)
        .bind(key)
        .fetch_one(&*self.db)
        .await?;
        Ok(found != 0)
    }

    async fn readiness(&self) -> Vec<ReadinessCheck> {
        self.run_readiness_checks().await
    }
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin or end with `/` or
/// contain `..`, and keys with control characters or backslashes.
fn ensure_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StorageError::InvalidObjectKey);
    }
    if key.starts_with('/') || key.ends_with('/') || key.contains("..") {
        return Err(StorageError::InvalidObjectKey);
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StorageError::InvalidObjectKey);
    }
    Ok(())
}

/// Validate container name format.
///
/// - 3–63 characters
/// - lowercase letters, digits and hyphens only
/// - must start and end with a letter or digit
/// - no consecutive hyphens
fn ensure_container_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidContainerName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(CONTAINER_NAME_MIN_LEN..=CONTAINER_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, and hyphens",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    if name.contains("--") {
        return Err(invalid("cannot contain consecutive hyphens"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn open_store() -> (SqliteObjectStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        let store = SqliteObjectStore::open(Arc::new(db), dir.path(), "devstoreaccount1", "cards")
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn write_then_read_round_trips_payload_and_metadata() {
        let (store, _dir) = open_store().await;
        let info = store
            .write("input/pikachu.png", Bytes::from_static(b"payload"), Some("image/png"))
            .await
            .unwrap();

        assert_eq!(info.key, "input/pikachu.png");
        assert_eq!(info.size_bytes, 7);
        assert_eq!(info.content_type.as_deref(), Some("image/png"));
        assert_eq!(info.etag.as_deref(), Some(format!("{:x}", md5::compute(b"payload")).as_str()));
        assert_eq!(store.read("input/pikachu.png").await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn write_overwrites_existing_object() {
        let (store, _dir) = open_store().await;
        store.write("processed/Mew/a.png", Bytes::from_static(b"old"), None).await.unwrap();
        let info = store
            .write("processed/Mew/a.png", Bytes::from_static(b"newer"), None)
            .await
            .unwrap();

        assert_eq!(info.size_bytes, 5);
        assert_eq!(store.read("processed/Mew/a.png").await.unwrap(), Bytes::from_static(b"newer"));
        let page = store.list_objects("processed/", None, 10).await.unwrap();
        assert_eq!(page.objects.len(), 1);
    }

    #[tokio::test]
    async fn exists_is_a_metadata_probe() {
        let (store, _dir) = open_store().await;
        assert!(!store.exists("processed/Mew/a.png").await.unwrap());
        store.write("processed/Mew/a.png", Bytes::from_static(b"x"), None).await.unwrap();
        assert!(store.exists("processed/Mew/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn read_missing_object_is_not_found() {
        let (store, _dir) = open_store().await;
        let err = store.read("input/missing.png").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { key, .. } if key == "input/missing.png"));
        let err = store.stat("input/missing.png").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn stat_reports_stored_metadata() {
        let (store, _dir) = open_store().await;
        let written = store
            .write("input/eevee.jpg", Bytes::from_static(b"jpeg-ish"), Some("image/jpeg"))
            .await
            .unwrap();
        let info = store.stat("input/eevee.jpg").await.unwrap();
        assert_eq!(info, written);
    }

    #[tokio::test]
    async fn listing_is_literal_prefix_and_paginates_without_gaps() {
        let (store, _dir) = open_store().await;
        for key in [
            "input/a.png",
            "input/b.png",
            "input/c.png",
            "input/d.png",
            "input_old/e.png",
            "inputX/f.png",
            "processed/Unknown/a.png",
        ] {
            store.write(key, Bytes::from_static(b"x"), None).await.unwrap();
        }

        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = store.list_objects("input/", cursor.as_deref(), 3).await.unwrap();
            keys.extend(page.objects.into_iter().map(|o| o.key));
            match page.next_start_after {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(keys, vec!["input/a.png", "input/b.png", "input/c.png", "input/d.png"]);

        let underscore = store.list_objects("input_", None, 10).await.unwrap();
        assert_eq!(underscore.objects.len(), 1);
        assert_eq!(underscore.objects[0].key, "input_old/e.png");
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let (store, _dir) = open_store().await;
        for key in ["", "/abs.png", "input/raw/", "input/../escape.png", "input\\win.png"] {
            let err = store.write(key, Bytes::from_static(b"x"), None).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidObjectKey), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn reopening_reuses_the_container_row() {
        let (store, dir) = open_store().await;
        store.write("input/a.png", Bytes::from_static(b"x"), None).await.unwrap();
        let again = SqliteObjectStore::open(store.db.clone(), dir.path(), "devstoreaccount1", "cards")
            .await
            .unwrap();
        assert_eq!(again.container().id, store.container().id);
        assert!(again.exists("input/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn readiness_checks_pass_on_healthy_store() {
        let (store, _dir) = open_store().await;
        let checks = store.readiness().await;
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| c.error.is_none()), "{checks:?}");
    }

    #[test]
    fn container_names_follow_naming_rules() {
        assert!(ensure_container_name_safe("trading-card-scanner").is_ok());
        for bad in ["ab", "Cards", "-cards", "cards-", "ca--rds", "cards.v2"] {
            assert!(
                matches!(
                    ensure_container_name_safe(bad),
                    Err(StorageError::InvalidContainerName { .. })
                ),
                "{bad}"
            );
        }
    }
}
