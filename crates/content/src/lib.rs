//! Key-addressed store for processed page bodies (§3, §4.7).
//!
//! Backed by `rocksdb`, the same embedded KV engine the rest of this stack
//! uses. Bodies are optionally `zstd`-compressed on write; `get` and
//! `batch_get` always return the decompressed canonical text, which is the
//! only contract the Content Store makes about compression (§9, "Content
//! store decompression policy").

mod error;
mod keys;
mod record;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

pub use error::ContentStoreError;
pub use record::ContentRecord;
use record::ContentMeta;
use wayline_primitives::VisitId;

/// Abstraction the Workflow Dispatcher writes through and later readers
/// (analysis, retrieval) read through. Mirrors the teacher's own
/// `Storage` trait shape (`get`/`set`/batched reads) over an
/// embedded KV engine.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(
        &self,
        visit_id: VisitId,
        url: &str,
        title: Option<&str>,
        body: &str,
    ) -> Result<(), ContentStoreError>;

    async fn get(&self, visit_id: VisitId) -> Result<Option<ContentRecord>, ContentStoreError>;

    async fn batch_get(
        &self,
        visit_ids: &[VisitId],
    ) -> Result<HashMap<VisitId, ContentRecord>, ContentStoreError>;
}

/// RocksDB-backed [`ContentStore`]. Compression threshold: bodies at or
/// above `compress_above_bytes` are zstd-compressed before the write;
/// shorter bodies are stored as plain UTF-8, since compression overhead
/// dominates the savings below a few hundred bytes.
pub struct RocksDbContentStore {
    db: rocksdb::DB,
    compress_above_bytes: usize,
}

impl RocksDbContentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContentStoreError> {
        Self::open_with_threshold(path, 512)
    }

    pub fn open_with_threshold<P: AsRef<Path>>(
        path: P,
        compress_above_bytes: usize,
    ) -> Result<Self, ContentStoreError> {
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);

        let db = rocksdb::DB::open(&options, path)?;
        Ok(Self { db, compress_above_bytes })
    }

    fn decode_body(
        visit_id: VisitId,
        meta: &ContentMeta,
        raw: Vec<u8>,
    ) -> Result<String, ContentStoreError> {
        let bytes = if meta.compressed {
            zstd::stream::decode_all(raw.as_slice()).map_err(|err| ContentStoreError::Corrupt {
                visit_id: visit_id.to_string(),
                reason: err.to_string(),
            })?
        } else {
            raw
        };
        String::from_utf8(bytes).map_err(|err| ContentStoreError::Corrupt {
            visit_id: visit_id.to_string(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for RocksDbContentStore {
    async fn put(
        &self,
        visit_id: VisitId,
        url: &str,
        title: Option<&str>,
        body: &str,
    ) -> Result<(), ContentStoreError> {
        let compressed = body.len() >= self.compress_above_bytes;
        let stored_body = if compressed {
            zstd::stream::encode_all(body.as_bytes(), 0)
                .map_err(|err| ContentStoreError::Io(err.to_string()))?
        } else {
            body.as_bytes().to_vec()
        };

        let meta = ContentMeta { url: url.to_owned(), title: title.map(str::to_owned), compressed };
        let meta_bytes = serde_json::to_vec(&meta)?;

        let mut batch = rocksdb::WriteBatch::default();
        batch.put(keys::meta_key(visit_id), meta_bytes);
        batch.put(keys::body_key(visit_id), stored_body);
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, visit_id: VisitId) -> Result<Option<ContentRecord>, ContentStoreError> {
        let Some(meta_bytes) = self.db.get(keys::meta_key(visit_id))? else {
            return Ok(None);
        };
        let meta: ContentMeta = serde_json::from_slice(&meta_bytes)?;

        let body_bytes = self.db.get(keys::body_key(visit_id))?.unwrap_or_default();
        let body = Self::decode_body(visit_id, &meta, body_bytes)?;

        Ok(Some(ContentRecord { url: meta.url, title: meta.title, body }))
    }

    async fn batch_get(
        &self,
        visit_ids: &[VisitId],
    ) -> Result<HashMap<VisitId, ContentRecord>, ContentStoreError> {
        let mut out = HashMap::with_capacity(visit_ids.len());
        for &visit_id in visit_ids {
            if let Some(record) = self.get(visit_id).await? {
                out.insert(visit_id, record);
            }
        }
        Ok(out)
    }
}

impl From<serde_json::Error> for ContentStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use wayline_primitives::Digest;

    use super::*;

    fn visit_id(seed: u8) -> VisitId {
        VisitId::from_digest(Digest::from_bytes([seed; 32]))
    }

    #[tokio::test]
    async fn short_body_round_trips_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbContentStore::open(dir.path()).unwrap();
        let id = visit_id(1);
        store.put(id, "https://a.com", Some("A"), "hello world").await.unwrap();

        let record = store.get(id).await.unwrap().expect("present");
        assert_eq!(record.body, "hello world");
        assert_eq!(record.title.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn long_body_round_trips_through_compression() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbContentStore::open_with_threshold(dir.path(), 16).unwrap();
        let id = visit_id(2);
        let body = "lorem ipsum ".repeat(50);
        store.put(id, "https://a.com/long", None, &body).await.unwrap();

        let record = store.get(id).await.unwrap().expect("present");
        assert_eq!(record.body, body);
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbContentStore::open(dir.path()).unwrap();
        assert!(store.get(visit_id(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_get_skips_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbContentStore::open(dir.path()).unwrap();
        store.put(visit_id(4), "https://a.com/4", None, "four").await.unwrap();

        let results = store.batch_get(&[visit_id(4), visit_id(5)]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[&visit_id(4)].body, "four");
    }
}
