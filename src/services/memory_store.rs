//! In-memory [`ObjectStore`] fake with failure injection, for tests.

use super::object_store::{ObjectPage, ObjectStore, StorageError, StorageResult};
use crate::models::object::ObjectInfo;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashSet},
    io,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Debug, Clone)]
struct StoredObject {
    content: Bytes,
    info: ObjectInfo,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_exists: Mutex<HashSet<String>>,
    /// Listing fails once this many pages have been served.
    listing_fails_after: Mutex<Option<usize>>,
    pages_listed: AtomicUsize,
    reverse_listing: bool,
    writes: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages are served from the end of the key space backwards.
    pub fn with_reverse_listing() -> Self {
        Self {
            reverse_listing: true,
            ..Self::default()
        }
    }

    /// Seed an object without counting it as a write.
    pub fn insert(&self, key: &str, content: impl Into<Bytes>) {
        let content = content.into();
        let info = info_for(key, &content, None);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredObject { content, info });
    }

    pub fn fail_reads_of(&self, key: &str) {
        self.failing_reads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_writes_to(&self, key: &str) {
        self.failing_writes.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_exists_of(&self, key: &str) {
        self.failing_exists.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        self.fail_listing_after_pages(0);
    }

    pub fn fail_listing_after_pages(&self, pages: usize) {
        *self.listing_fails_after.lock().unwrap() = Some(pages);
    }

    pub fn content(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|obj| obj.content.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .and_then(|obj| obj.info.content_type.clone())
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

fn info_for(key: &str, content: &Bytes, content_type: Option<&str>) -> ObjectInfo {
    ObjectInfo {
        key: key.to_string(),
        size_bytes: content.len() as i64,
        content_type: content_type.map(str::to_string),
        etag: Some(format!("{:x}", md5::compute(content))),
        last_modified: Utc::now(),
    }
}

fn not_found(key: &str) -> StorageError {
    StorageError::ObjectNotFound {
        container: "memory".into(),
        key: key.to_string(),
    }
}

fn injected(what: &str, key: &str) -> StorageError {
    StorageError::Io(io::Error::other(format!("injected {} failure for {}", what, key)))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ObjectPage> {
        let served = self.pages_listed.fetch_add(1, Ordering::SeqCst);
        if matches!(*self.listing_fails_after.lock().unwrap(), Some(limit) if served >= limit) {
            return Err(StorageError::Io(io::Error::other("injected listing failure")));
        }
        let objects = self.objects.lock().unwrap();
        let mut matching: Vec<&StoredObject> = objects
            .values()
            .filter(|obj| obj.info.key.starts_with(prefix))
            .collect();
        if self.reverse_listing {
            matching.reverse();
        }

        let start = match start_after {
            Some(after) => matching
                .iter()
                .position(|obj| obj.info.key == after)
                .map_or(0, |idx| idx + 1),
            None => 0,
        };
        let page: Vec<ObjectInfo> = matching
            .iter()
            .skip(start)
            .take(max_keys.max(1))
            .map(|obj| obj.info.clone())
            .collect();
        let next_start_after = if start + page.len() < matching.len() {
            page.last().map(|info| info.key.clone())
        } else {
            None
        };
        Ok(ObjectPage {
            objects: page,
            next_start_after,
        })
    }

    async fn stat(&self, key: &str) -> StorageResult<ObjectInfo> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|obj| obj.info.clone())
            .ok_or_else(|| not_found(key))
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_reads.lock().unwrap().contains(key) {
            return Err(injected("read", key));
        }
        self.content(key).ok_or_else(|| not_found(key))
    }

    async fn write(
        &self,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<ObjectInfo> {
        if self.failing_writes.lock().unwrap().contains(key) {
            return Err(injected("write", key));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let info = info_for(key, &content, content_type);
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                content,
                info: info.clone(),
            },
        );
        Ok(info)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        if self.failing_exists.lock().unwrap().contains(key) {
            return Err(injected("exists", key));
        }
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}
